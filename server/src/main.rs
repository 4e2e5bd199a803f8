mod config;
mod http;
mod report;

use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use platform_db::{self, DatabaseSettings};
use platform_docstore::{DocStoreSettings, MongoOrderStore};
use platform_obs::{ObsConfig, init_tracing};

use crate::{
    config::AppConfig,
    http::{AppState, ServeConfig},
};

#[derive(Parser, Debug)]
#[command(name = "reportes-server", version, about = "Microservicio de Reportes (Híbrido)")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP reporting server.
    Serve(ServeCommand),
}

#[derive(Args, Debug)]
struct ServeCommand {
    #[arg(long, default_value = "0.0.0.0")]
    host: std::net::IpAddr,
    #[arg(long, default_value_t = 8002)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(ObsConfig::for_service("reportes-server"))?;
    let cli = Cli::parse();
    let config = Arc::new(AppConfig::load());
    match cli.command {
        Command::Serve(cmd) => run_server(cmd, config).await,
    }
}

async fn run_server(cmd: ServeCommand, config: Arc<AppConfig>) -> Result<()> {
    let db_settings = DatabaseSettings::from_env()?;
    let pool = platform_db::connect(&db_settings).await?;

    let doc_settings = DocStoreSettings::from_env()?;
    let orders = MongoOrderStore::connect(&doc_settings).await?;

    let state = AppState {
        pool,
        orders: Arc::new(orders),
        config,
    };
    http::serve(ServeConfig::new(cmd.host, cmd.port), state).await
}
