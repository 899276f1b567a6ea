pub mod memory;

use async_trait::async_trait;

use crate::types::{BoardList, Card, CardPositionWrite, ListPositionWrite, NewCard, NewList};

/// The narrow slice of the hosted relational store the board core needs.
/// Implementations: MemoryStore (in-process), RestStore (taskboard-client).
///
/// Ordering by `position` ascending is the store's job; callers assume
/// fetched lists and their cards arrive pre-sorted.
#[async_trait]
pub trait BoardStore: Send + Sync {
    /// All lists of a board, each with its cards.
    async fn fetch_lists_with_cards(&self, board_id: &str) -> Result<Vec<BoardList>, StoreError>;

    /// Full-row position update for one card (may reassign `list_id`).
    async fn update_card_position(&self, write: &CardPositionWrite) -> Result<(), StoreError>;

    async fn update_list_position(&self, write: &ListPositionWrite) -> Result<(), StoreError>;

    /// Whether the `update_*_positions` batch methods are transactional.
    fn supports_batch(&self) -> bool {
        false
    }

    /// Apply every card write or none of them.
    async fn update_card_positions(&self, _writes: &[CardPositionWrite]) -> Result<(), StoreError> {
        Err(StoreError::Unsupported("multi-row card position update"))
    }

    /// Apply every list write or none of them.
    async fn update_list_positions(&self, _writes: &[ListPositionWrite]) -> Result<(), StoreError> {
        Err(StoreError::Unsupported("multi-row list position update"))
    }

    async fn insert_card(&self, card: &NewCard) -> Result<Card, StoreError>;

    async fn insert_list(&self, list: &NewList) -> Result<BoardList, StoreError>;
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Malformed store response: {0}")]
    Decode(String),

    #[error("Unsupported by this store: {0}")]
    Unsupported(&'static str),
}

impl StoreError {
    /// Transport failures and server-side (5xx) rejections may succeed on
    /// a later attempt; everything else will not.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Transport(_) => true,
            StoreError::Rejected { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(StoreError::Transport("reset".into()).is_retryable());
        assert!(StoreError::Rejected {
            status: 503,
            message: "busy".into()
        }
        .is_retryable());
        assert!(!StoreError::Rejected {
            status: 403,
            message: "row level security".into()
        }
        .is_retryable());
        assert!(!StoreError::NotFound {
            entity: "card",
            id: "c1".into()
        }
        .is_retryable());
    }
}
