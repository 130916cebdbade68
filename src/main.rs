use anyhow::Context;
use auctioneer::cli::output::{self, OutputMode};
use auctioneer::cli::{self, Cli, Commands, Session};
use auctioneer::config::AppConfig;
use auctioneer::engine::AuctionEngine;
use auctioneer::store::PostgresStore;
use clap::Parser;
use tracing::info;

mod main_runtime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let config = AppConfig::load_from(&args.config)
        .with_context(|| format!("failed to load configuration from {}", args.config))?;
    if let Err(errors) = config.validate() {
        anyhow::bail!("invalid configuration: {}", errors.join("; "));
    }

    let session = Session {
        mode: OutputMode::from_json_flag(args.json),
        admin: args.admin.clone(),
    };

    match args.command {
        Commands::Migrate => {
            main_runtime::init_logging(&config.logging);
            let db = config
                .database
                .as_ref()
                .context("migrate needs a [database] section or AUCTION__DATABASE__URL")?;
            let store = PostgresStore::new(&db.url, db.max_connections).await?;
            store.migrate().await?;
            info!("Migrations applied");
            output::print_success("Migrations applied");
        }
        Commands::Shell => {
            main_runtime::init_logging(&config.logging);
            let store = main_runtime::open_store(&config).await?;
            let engine = AuctionEngine::new(store, config.auction);
            cli::shell::run(&engine, &session).await?;
        }
        Commands::Auction(command) => {
            main_runtime::init_logging_simple();
            let store = main_runtime::open_store(&config).await?;
            let engine = AuctionEngine::new(store, config.auction);
            if let Err(e) = cli::run(&engine, command, &session).await {
                output::print_error(&format!("{e}"));
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
