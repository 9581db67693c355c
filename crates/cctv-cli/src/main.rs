use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod client;

use client::DaemonClient;

#[derive(Parser)]
#[command(name = "cctv", about = "IoT CCTV command-line client")]
struct Cli {
    /// Base URL of the cctvd HTTP API
    #[arg(long, env = "CCTV_SERVER", default_value = "http://127.0.0.1:5000")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon, model and camera status
    Status,
    /// List recent detections, newest first
    History {
        /// Maximum number of records
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Upload an image (png/jpg/jpeg) for detection
    Process {
        /// Image file to analyse
        file: PathBuf,
    },
    /// Send a test Telegram notification
    TestTelegram,
    /// Sound the camera buzzer for 3 seconds
    TestBuzzer,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = DaemonClient::new(&cli.server);

    let reply = match cli.command {
        Commands::Status => client.status().await?,
        Commands::History { limit } => client.history(limit).await?,
        Commands::Process { file } => client.process(&file).await?,
        Commands::TestTelegram => client.test_telegram().await?,
        Commands::TestBuzzer => client.test_buzzer().await?,
    };

    println!("{}", serde_json::to_string_pretty(&reply)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_history_limit() {
        let cli = Cli::try_parse_from(["cctv", "--server", "http://cam:5000", "history", "-l", "3"]).unwrap();
        assert_eq!(cli.server, "http://cam:5000");
        assert!(matches!(cli.command, Commands::History { limit: 3 }));
    }

    #[test]
    fn test_parse_kebab_case_subcommands() {
        let cli = Cli::try_parse_from(["cctv", "test-buzzer"]).unwrap();
        assert!(matches!(cli.command, Commands::TestBuzzer));
        assert!(Cli::try_parse_from(["cctv", "process"]).is_err());
    }
}
