//! Control utility (spec §6.3): a thin client over the control socket.
//! The control channel's transport (nsd-control's TLS management
//! channel) is an out-of-scope external collaborator (spec §1); this
//! binary speaks the plaintext line protocol the [`wyrdns::supervisor`]
//! command set implies and leaves the TLS-secured transport to that
//! collaborator.
//!
//! Grounded on heimdall's `bin/stress_test.rs` for `clap` subcommand
//! usage and its `tracing_subscriber::fmt()` initialization.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

#[derive(Parser, Debug)]
#[command(name = "wyrdnsc", version)]
struct Cli {
    /// Control socket path (spec §6.4 `server.control-socket`).
    #[arg(short = 's', long = "socket", default_value = "/var/run/wyrdns/control.sock")]
    socket: PathBuf,
    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    Start,
    Stop,
    Reload,
    Reconfig,
    Status,
    Stats,
    Notify { zone: String },
    Transfer { zone: String },
    Addzone { name: String, pattern: Option<String> },
    Delzone { name: String },
    ForceTransfer { zone: String },
    LogReopen,
}

impl Action {
    fn to_line(&self) -> String {
        match self {
            Action::Start => "START".to_string(),
            Action::Stop => "STOP".to_string(),
            Action::Reload => "RELOAD".to_string(),
            Action::Reconfig => "RECONFIG".to_string(),
            Action::Status => "STATUS".to_string(),
            Action::Stats => "STATS".to_string(),
            Action::Notify { zone } => format!("NOTIFY {zone}"),
            Action::Transfer { zone } => format!("TRANSFER {zone}"),
            Action::Addzone { name, pattern } => match pattern {
                Some(p) => format!("ADDZONE {name} {p}"),
                None => format!("ADDZONE {name}"),
            },
            Action::Delzone { name } => format!("DELZONE {name}"),
            Action::ForceTransfer { zone } => format!("FORCE_TRANSFER {zone}"),
            Action::LogReopen => "LOG_REOPEN".to_string(),
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter("warn").init();
    let cli = Cli::parse();
    match run(&cli).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("wyrdnsc: {e}");
            std::process::exit(2);
        }
    }
}

async fn run(cli: &Cli) -> std::io::Result<()> {
    let stream = UnixStream::connect(&cli.socket).await.map_err(|e| {
        std::io::Error::new(
            e.kind(),
            format!("connecting to control socket {}: {}", cli.socket.display(), e),
        )
    })?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let line = format!("{}\n", cli.action.to_line());
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;

    let mut response = String::new();
    loop {
        let mut chunk = String::new();
        let n = reader.read_line(&mut chunk).await?;
        if n == 0 || chunk.trim().is_empty() {
            break;
        }
        response.push_str(&chunk);
    }
    print!("{response}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addzone_with_pattern_includes_pattern_name() {
        let action = Action::Addzone {
            name: "example.com".to_string(),
            pattern: Some("secondary".to_string()),
        };
        assert_eq!(action.to_line(), "ADDZONE example.com secondary");
    }

    #[test]
    fn notify_line_carries_zone_name() {
        let action = Action::Notify { zone: "example.com".to_string() };
        assert_eq!(action.to_line(), "NOTIFY example.com");
    }
}
