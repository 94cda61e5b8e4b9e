use std::path::PathBuf;

use clap::Parser;
use idioticio::app::{self, Overrides};

#[derive(Debug, Parser)]
#[command(name = "idioticio", version, about = "Account and OAuth authorization broker")]
struct Cli {
    /// YAML configuration file
    config: Option<PathBuf>,
    /// Port to listen on, overriding the configuration
    #[arg(long)]
    port: Option<u16>,
    /// SQLite database path, overriding the configuration
    #[arg(long)]
    db: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    app::run(
        cli.config.as_deref(),
        Overrides {
            port: cli.port,
            db: cli.db,
        },
    )
    .await
}
