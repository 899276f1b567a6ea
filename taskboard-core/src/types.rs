use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::position::append_position;

/// A board row. Owns its lists (cascade delete in the store).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Board {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub owner_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    pub board_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    /// Reassigned on a cross-list move.
    pub list_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Advisory ordering within the list. Dense (`0..n-1`) only after a
    /// reconciliation pass.
    pub position: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub label_ids: Vec<String>,
}

/// A list row together with its cards, ordered by `position` ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardList {
    pub id: String,
    pub board_id: String,
    pub title: String,
    pub position: u32,
    #[serde(default)]
    pub cards: Vec<Card>,
}

/// Fields for a card insert. The store generates the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCard {
    pub list_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub position: u32,
}

/// Fields for a list insert. The store generates the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewList {
    pub board_id: String,
    pub title: String,
    pub position: u32,
}

/// One full-row position update for a card, keyed by card id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardPositionWrite {
    pub id: String,
    pub list_id: String,
    pub position: u32,
}

/// One position update for a list, keyed by list id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListPositionWrite {
    pub id: String,
    pub position: u32,
}

impl BoardList {
    pub fn card(&self, card_id: &str) -> Option<&Card> {
        self.cards.iter().find(|c| c.id == card_id)
    }

    pub fn card_index(&self, card_id: &str) -> Option<usize> {
        self.cards.iter().position(|c| c.id == card_id)
    }

    pub fn contains(&self, card_id: &str) -> bool {
        self.card_index(card_id).is_some()
    }
}

impl NewCard {
    /// Insert fields for a card placed last in `list`.
    pub fn append_to(list: &BoardList, title: impl Into<String>) -> Self {
        Self {
            list_id: list.id.clone(),
            title: title.into(),
            description: None,
            position: append_position(list.cards.len()),
        }
    }
}

impl NewList {
    /// Insert fields for a list placed after `existing` lists.
    pub fn append_to(board_id: impl Into<String>, existing: usize, title: impl Into<String>) -> Self {
        Self {
            board_id: board_id.into(),
            title: title.into(),
            position: append_position(existing),
        }
    }
}
