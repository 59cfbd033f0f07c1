use clap::{Parser, Subcommand};

pub mod config;
pub mod demo;
pub mod init_config;
pub mod run;
pub mod verify;
pub mod version;

#[derive(Parser)]
#[command(name = "trustchain")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Invite-tree trust network service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API service
    Run {
        /// Path to config file (default: <data_dir>/trustchain/config.toml)
        #[arg(long)]
        config: Option<String>,

        /// Listen address, overrides [server] bind
        #[arg(long)]
        bind: Option<String>,
    },

    /// Write a default config file
    InitConfig {
        /// Where to write it (default: <data_dir>/trustchain/config.toml)
        #[arg(long)]
        path: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Walk through admission and voting in memory
    Demo,

    /// Check the stored state against every trust invariant
    Verify {
        /// Path to config file (default: <data_dir>/trustchain/config.toml)
        #[arg(long)]
        config: Option<String>,
    },

    /// Display version information
    Version,
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Run { config, bind } => run::execute(config, bind).await,
        Commands::InitConfig { path, force } => init_config::execute(path, force),
        Commands::Demo => demo::execute().await,
        Commands::Verify { config } => verify::execute(config).await,
        Commands::Version => {
            version::execute();
            Ok(())
        }
    }
}
