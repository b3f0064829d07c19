use admin_ipc::{send_request, AdminRequest, AdminResponse, DEFAULT_SOCKET_PATH};
use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, env = "ADMIN_SOCKET", default_value = DEFAULT_SOCKET_PATH)]
    socket: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print fetch state and snapshot summary.
    Status,
    /// Stop scheduling orderbook refreshes.
    Pause,
    /// Restart the refresh loop.
    Resume,
    /// Run one refresh cycle now.
    Refresh,
}

impl From<Command> for AdminRequest {
    fn from(command: Command) -> Self {
        match command {
            Command::Status => AdminRequest::Status,
            Command::Pause => AdminRequest::Pause,
            Command::Resume => AdminRequest::Resume,
            Command::Refresh => AdminRequest::Refresh,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let resp = send_request(&cli.socket, &cli.command.into()).await?;
    println!("{}", serde_json::to_string(&resp)?);
    if let AdminResponse::Error(message) = resp {
        bail!("estimatord rejected the request: {message}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subcommands() {
        let cli = Cli::parse_from(["estimatorctl", "--socket", "/tmp/x.sock", "refresh"]);
        assert_eq!(cli.socket, "/tmp/x.sock");
        assert_eq!(AdminRequest::from(cli.command), AdminRequest::Refresh);
    }
}
