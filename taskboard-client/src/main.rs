//! Taskboard CLI.
//!
//! Commands:
//! - `taskboard show [board] [--filter <query>]`: print lists and cards in order
//! - `taskboard move <board> <card> --over <card>|--list <list>`: reorder a card
//! - `taskboard add-card <board> <list> <title>`: append a card to a list
//!
//! Exit codes:
//! - 0: Success
//! - 1: Error

use std::sync::Arc;

use clap::Parser;

use taskboard_client::config::{default_config_path, load_config, try_load_config, ClientConfig};
use taskboard_client::{commands, logging, Cli, ClientError, Commands, RestStore};
use taskboard_core::BoardStore;

fn resolve_board(board: Option<String>, config: &ClientConfig) -> Result<String, ClientError> {
    board
        .or_else(|| config.default_board.clone())
        .ok_or(ClientError::NoBoard)
}

async fn run(cli: Cli) -> Result<(), ClientError> {
    // An explicit --config path must exist and parse; the default one may not.
    let config = match &cli.config {
        Some(path) => try_load_config(path)?,
        None => load_config(&default_config_path()),
    }
    .with_env_overrides();
    log::debug!("[taskboard.cli] store at {}", config.store_url);

    let store: Arc<dyn BoardStore> = Arc::new(RestStore::from_config(&config));

    match cli.command {
        Commands::Show { board, filter } => {
            let board_id = resolve_board(board, &config)?;
            let mut session = commands::open_session(store, &config.reconcile, &board_id).await?;
            print!("{}", commands::show(&mut session, filter.as_deref()));
        }
        Commands::Move {
            board,
            card,
            target,
        } => {
            let mut session = commands::open_session(store, &config.reconcile, &board).await?;
            match commands::move_card(&mut session, &card, &target).await? {
                Some(report) => println!(
                    "Moved {}: {} position write(s) persisted",
                    card,
                    report.succeeded()
                ),
                None => println!("Nothing to move"),
            }
        }
        Commands::AddCard { board, list, title } => {
            let mut session = commands::open_session(store, &config.reconcile, &board).await?;
            let created = commands::add_card(&mut session, &list, &title).await?;
            println!(
                "Added {} to {} at position {}",
                created.id, list, created.position
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.debug) {
        eprintln!("failed to initialize logger: {}", e);
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
