//! Transport adapter: moves whole frames over a byte stream.
//!
//! A frame is a 4-byte big-endian length followed by that many payload bytes.
//! The transport knows nothing about payload contents.

use std::io::{self, Read, Write};

use tracing::{debug, trace};

pub const HEADER_LEN: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer closed the channel (clean EOF, broken pipe, reset).
    #[error("orchestrator channel closed")]
    Closed,
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: u32, max: u32 },
    #[error("transport i/o: {0}")]
    Io(#[source] io::Error),
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset => TransportError::Closed,
            _ => TransportError::Io(err),
        }
    }
}

/// Bidirectional frame channel to the orchestrator.
pub trait Transport {
    fn send(&mut self, payload: &[u8]) -> Result<(), TransportError>;
    fn receive(&mut self) -> Result<Vec<u8>, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        (**self).send(payload)
    }

    fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        (**self).receive()
    }
}

/// Length-prefixed framing over any reader/writer pair (stdio, unix socket, memory).
#[derive(Debug)]
pub struct FramedTransport<R, W> {
    reader: R,
    writer: W,
    max_frame_bytes: u32,
}

impl<R: Read, W: Write> FramedTransport<R, W> {
    pub fn new(reader: R, writer: W, max_frame_bytes: u32) -> Self {
        Self {
            reader,
            writer,
            max_frame_bytes,
        }
    }

    pub fn into_parts(self) -> (R, W) {
        (self.reader, self.writer)
    }

    /// Fill the header; `Ok(false)` means EOF before the first byte.
    fn read_header(&mut self, header: &mut [u8; HEADER_LEN]) -> Result<bool, TransportError> {
        let mut filled = 0;
        while filled < HEADER_LEN {
            match self.reader.read(&mut header[filled..]) {
                Ok(0) if filled == 0 => return Ok(false),
                Ok(0) => {
                    return Err(TransportError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "stream ended inside a frame header",
                    )));
                }
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(true)
    }
}

impl<R: Read, W: Write> Transport for FramedTransport<R, W> {
    fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let len = u32::try_from(payload.len()).map_err(|_| TransportError::FrameTooLarge {
            len: u32::MAX,
            max: u32::MAX,
        })?;
        self.writer.write_all(&len.to_be_bytes())?;
        self.writer.write_all(payload)?;
        self.writer.flush()?;
        trace!(len, "sent frame");
        Ok(())
    }

    fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut header = [0u8; HEADER_LEN];
        if !self.read_header(&mut header)? {
            debug!("peer closed channel");
            return Err(TransportError::Closed);
        }
        let len = u32::from_be_bytes(header);
        if len > self.max_frame_bytes {
            return Err(TransportError::FrameTooLarge {
                len,
                max: self.max_frame_bytes,
            });
        }
        let mut payload = vec![0u8; len as usize];
        self.reader.read_exact(&mut payload).map_err(|err| {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                TransportError::Io(err)
            } else {
                err.into()
            }
        })?;
        trace!(len, "received frame");
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn transport(input: Vec<u8>) -> FramedTransport<Cursor<Vec<u8>>, Vec<u8>> {
        FramedTransport::new(Cursor::new(input), Vec::new(), 1024)
    }

    fn sent(payloads: &[&[u8]]) -> Vec<u8> {
        let mut writer = transport(Vec::new());
        for payload in payloads {
            writer.send(payload).expect("send");
        }
        writer.into_parts().1
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn receives_frames_in_order_then_closed() {
        let mut transport = transport(sent(&[b"first", b"", b"third"]));

        assert_eq!(transport.receive().expect("first"), b"first");
        assert_eq!(transport.receive().expect("empty"), b"");
        assert_eq!(transport.receive().expect("third"), b"third");
        assert!(matches!(transport.receive(), Err(TransportError::Closed)));
    }

    #[test]
    fn send_writes_big_endian_length_prefix() {
        let mut transport = transport(Vec::new());
        transport.send(b"hi").expect("send");
        let (_, written) = transport.into_parts();
        assert_eq!(written, vec![0, 0, 0, 2, b'h', b'i']);
    }

    #[test]
    fn truncated_frames_are_io_errors() {
        let mut partial_header = transport(vec![0, 0]);
        match partial_header.receive() {
            Err(TransportError::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("expected eof error, got {other:?}"),
        }

        let mut partial_payload = transport(vec![0, 0, 0, 5, b'a', b'b']);
        match partial_payload.receive() {
            Err(TransportError::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("expected eof error, got {other:?}"),
        }
    }

    #[test]
    fn oversized_frames_are_rejected_before_reading() {
        let mut transport = transport(vec![0, 0, 4, 1]);
        assert!(matches!(
            transport.receive(),
            Err(TransportError::FrameTooLarge { len: 1025, max: 1024 })
        ));
    }

    #[test]
    fn broken_pipe_on_send_is_closed() {
        let mut transport = FramedTransport::new(io::empty(), ClosedPipe, 1024);
        assert!(matches!(transport.send(b"x"), Err(TransportError::Closed)));
    }
}
