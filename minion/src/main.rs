//! `minion`: runs one orchestrator-assigned task and exits.
//!
//! The orchestrator channel is stdin/stdout unless `--socket` names a unix
//! socket to connect to. Logs go to stderr.

use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use minion::exit_codes;
use minion::io::backend::HttpBackend;
use minion::io::config::{AgentConfig, load_config};
use minion::io::transport::FramedTransport;
use minion::logging;
use minion::session::{SessionError, serve};

#[derive(Parser)]
#[command(
    name = "minion",
    version,
    about = "Single-task coding agent driven by an orchestrator"
)]
struct Cli {
    /// TOML configuration file (defaults apply when missing).
    #[arg(long, value_name = "PATH", default_value = "minion.toml")]
    config: PathBuf,

    /// Connect to the orchestrator over this unix socket instead of stdio.
    #[arg(long, value_name = "PATH")]
    socket: Option<PathBuf>,
}

type Channel = FramedTransport<Box<dyn Read>, Box<dyn Write>>;

fn main() {
    logging::init();
    let cli = Cli::parse();
    std::process::exit(run(&cli));
}

fn run(cli: &Cli) -> i32 {
    let (config, backend, mut channel) = match startup(cli) {
        Ok(parts) => parts,
        Err(err) => {
            error!(err = %format!("{err:#}"), "startup failed");
            eprintln!("{err:#}");
            return exit_codes::STARTUP;
        }
    };

    match serve(&mut channel, &backend, &config) {
        Ok(report) => {
            info!(task_id = %report.task_id, steps = report.steps, "session finished");
            exit_codes::OK
        }
        Err(err) => {
            eprintln!("{err}");
            match err {
                SessionError::Malformed(_) => exit_codes::MALFORMED,
                SessionError::Closed => exit_codes::CLOSED,
                SessionError::Transport(_) => exit_codes::STARTUP,
            }
        }
    }
}

fn startup(cli: &Cli) -> Result<(AgentConfig, HttpBackend, Channel)> {
    let mut config = load_config(&cli.config)?;
    config.apply_env_overrides();
    config.validate().context("validate configuration overrides")?;
    let backend = HttpBackend::new(&config.backend)?;
    let channel = connect(cli, config.max_frame_bytes)?;
    Ok((config, backend, channel))
}

#[cfg(unix)]
fn connect(cli: &Cli, max_frame_bytes: u32) -> Result<Channel> {
    use std::os::unix::net::UnixStream;

    if let Some(path) = &cli.socket {
        let stream = UnixStream::connect(path)
            .with_context(|| format!("connect to orchestrator socket {}", path.display()))?;
        let reader = stream.try_clone().context("clone orchestrator socket")?;
        return Ok(FramedTransport::new(
            Box::new(reader),
            Box::new(stream),
            max_frame_bytes,
        ));
    }
    Ok(stdio(max_frame_bytes))
}

#[cfg(not(unix))]
fn connect(cli: &Cli, max_frame_bytes: u32) -> Result<Channel> {
    if cli.socket.is_some() {
        anyhow::bail!("--socket is only supported on unix");
    }
    Ok(stdio(max_frame_bytes))
}

fn stdio(max_frame_bytes: u32) -> Channel {
    FramedTransport::new(
        Box::new(io::stdin().lock()),
        Box::new(io::stdout().lock()),
        max_frame_bytes,
    )
}
