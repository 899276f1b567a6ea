use taskboard_core::StoreError;

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("No board given and no default_board configured")]
    NoBoard,

    #[error("{entity} not found on board {board_id}: {id}")]
    NotOnBoard {
        entity: &'static str,
        id: String,
        board_id: String,
    },

    #[error("Reconciliation left {failed} write(s) unpersisted")]
    Unpersisted { failed: usize },
}
