//! Scripted fakes and scratch repositories for tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::proposal::ProposalParser;
use crate::core::transcript::Transcript;
use crate::core::types::{ActionRequest, ActionResult};
use crate::io::backend::{BridgeError, ReasoningBackend};
use crate::io::codec::{self, Message};
use crate::io::executor::{ActionError, Executor};
use crate::io::git::{Git, Identity};
use crate::io::transport::{FramedTransport, Transport, TransportError};

/// Backend that replays a fixed list of decisions.
///
/// Once the script runs out every call is `BackendUnavailable`.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    replies: RefCell<VecDeque<Result<ActionRequest, BridgeError>>>,
    seen: RefCell<Vec<usize>>,
}

impl ScriptedBackend {
    pub fn new(replies: impl IntoIterator<Item = Result<ActionRequest, BridgeError>>) -> Self {
        Self {
            replies: RefCell::new(replies.into_iter().collect()),
            seen: RefCell::new(Vec::new()),
        }
    }

    /// Script raw model replies, parsed the same way a real backend parses them.
    pub fn from_replies<'a>(raw: impl IntoIterator<Item = &'a str>) -> Self {
        let parser = ProposalParser::new();
        Self::new(
            raw.into_iter()
                .map(|reply| parser.parse(reply).map_err(BridgeError::from)),
        )
    }

    /// Transcript length observed on each `decide` call.
    pub fn transcript_lengths(&self) -> Vec<usize> {
        self.seen.borrow().clone()
    }
}

impl ReasoningBackend for ScriptedBackend {
    fn decide(&self, _goal: &str, transcript: &Transcript) -> Result<ActionRequest, BridgeError> {
        self.seen.borrow_mut().push(transcript.len());
        self.replies.borrow_mut().pop_front().unwrap_or_else(|| {
            Err(BridgeError::BackendUnavailable(
                "scripted backend exhausted".to_string(),
            ))
        })
    }
}

/// Executor that records requests and replays canned results.
///
/// Without a scripted result it answers `ActionResult::ok("")`.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    results: RefCell<VecDeque<Result<ActionResult, ActionError>>>,
    requests: RefCell<Vec<ActionRequest>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(results: impl IntoIterator<Item = Result<ActionResult, ActionError>>) -> Self {
        Self {
            results: RefCell::new(results.into_iter().collect()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ActionRequest> {
        self.requests.borrow().clone()
    }
}

impl Executor for RecordingExecutor {
    fn execute(&self, request: &ActionRequest) -> Result<ActionResult, ActionError> {
        self.requests.borrow_mut().push(request.clone());
        self.results
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Ok(ActionResult::ok("")))
    }
}

/// In-memory transport: reads scripted inbound bytes, collects outbound bytes.
pub type MemoryTransport = FramedTransport<Cursor<Vec<u8>>, Vec<u8>>;

pub fn memory_transport(inbound: Vec<u8>) -> MemoryTransport {
    FramedTransport::new(Cursor::new(inbound), Vec::new(), 1024 * 1024)
}

/// Encode messages as consecutive frames.
pub fn frames(messages: &[Message]) -> Vec<u8> {
    let mut transport = FramedTransport::new(io::empty(), Vec::new(), u32::MAX);
    for message in messages {
        transport
            .send(&codec::encode(message))
            .expect("frame length fits the header");
    }
    transport.into_parts().1
}

/// Decode every frame in `bytes`.
pub fn decode_frames(bytes: &[u8]) -> Vec<Message> {
    let mut transport = memory_transport(bytes.to_vec());
    let mut messages = Vec::new();
    loop {
        match transport.receive() {
            Ok(payload) => messages.push(codec::decode(&payload).expect("valid frame")),
            Err(TransportError::Closed) => return messages,
            Err(err) => panic!("bad frame stream: {err}"),
        }
    }
}

/// Transport whose peer has gone away after delivering `inbound`.
pub fn closing_transport(inbound: Vec<u8>) -> FramedTransport<Cursor<Vec<u8>>, ClosedWriter> {
    FramedTransport::new(Cursor::new(inbound), ClosedWriter, 1024 * 1024)
}

/// Writer that fails every write with `BrokenPipe`.
#[derive(Debug, Default)]
pub struct ClosedWriter;

impl std::io::Write for ClosedWriter {
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
        Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Scratch repository in a temp dir, removed on drop.
pub struct TestRepo {
    _temp: tempfile::TempDir,
    root: PathBuf,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create temp dir")?;
        let root = temp
            .path()
            .canonicalize()
            .context("canonicalize temp dir")?;
        Ok(Self { _temp: temp, root })
    }

    /// A repository with `git init` and one initial commit.
    pub fn with_git() -> Result<Self> {
        let repo = Self::new()?;
        let git = repo.git();
        git.init()?;
        repo.write(".gitkeep", "")?;
        git.commit_all("initial")?;
        Ok(repo)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn git(&self) -> Git {
        Git::new(&self.root).with_identity(Identity {
            name: "tester".to_string(),
            email: "tester@localhost".to_string(),
        })
    }

    pub fn write(&self, rel: &str, contents: &str) -> Result<()> {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }

    pub fn read(&self, rel: &str) -> Result<String> {
        let path = self.root.join(rel);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }
}
