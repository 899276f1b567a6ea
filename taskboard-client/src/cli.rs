//! CLI definition for the `taskboard` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Taskboard - inspect and reorder a hosted kanban board.
///
/// The store URL and API key come from ~/.config/taskboard/client.json,
/// overridable with TASKBOARD_STORE_URL and TASKBOARD_API_KEY.
#[derive(Parser, Debug)]
#[command(name = "taskboard")]
#[command(version)]
#[command(about = "Inspect and reorder a hosted kanban board")]
pub struct Cli {
    /// Enable debug output to stderr
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Read configuration from this file instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the board's lists and cards in order
    Show {
        /// Board id (defaults to default_board from the config)
        board: Option<String>,
        /// Filter query, e.g. `"login bug" label:ui is:open`
        #[arg(long)]
        filter: Option<String>,
    },

    /// Move a card and wait until the new order is persisted
    Move {
        /// Board id
        board: String,
        /// Card to move
        card: String,
        #[command(flatten)]
        target: MoveTarget,
    },

    /// Append a new card to a list
    AddCard {
        /// Board id
        board: String,
        /// List id
        list: String,
        /// Card title
        title: String,
    },
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct MoveTarget {
    /// Drop onto this card (takes its slot)
    #[arg(long, value_name = "CARD")]
    pub over: Option<String>,
    /// Drop onto this list (appends at the end)
    #[arg(long, value_name = "LIST")]
    pub list: Option<String>,
}
