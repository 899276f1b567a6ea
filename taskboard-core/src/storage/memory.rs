/// In-process board store.
///
/// Keeps list and card rows in hash maps keyed by id, mirroring the hosted
/// store's contract:
/// - fetches return rows ordered by `position`, ties by insertion order
/// - single-row updates are independent of each other
/// - batch updates are all-or-nothing when the store is `transactional()`
///
/// Fault injection hooks let tests exercise partial-failure reconciliation.
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{BoardStore, StoreError};
use crate::types::{BoardList, Card, CardPositionWrite, ListPositionWrite, NewCard, NewList};

#[derive(Debug, Clone)]
struct ListRow {
    board_id: String,
    title: String,
    position: u32,
    seq: u64,
}

#[derive(Debug, Clone)]
struct CardRow {
    card: Card,
    seq: u64,
}

#[derive(Debug, Default)]
struct Faults {
    failing_ids: HashSet<String>,
    fail_next: u32,
    fail_fetch: bool,
}

pub struct MemoryStore {
    lists: RwLock<HashMap<String, ListRow>>,
    cards: RwLock<HashMap<String, CardRow>>,
    /// Monotonic insertion counter, the tie-break for equal positions.
    next_seq: AtomicU64,
    transactional: bool,
    faults: Mutex<Faults>,
    batches: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            lists: RwLock::new(HashMap::new()),
            cards: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(1),
            transactional: false,
            faults: Mutex::new(Faults::default()),
            batches: AtomicUsize::new(0),
        }
    }

    /// Seed rows from already-built lists, keeping their ids and positions.
    /// Cards are stored under the list that contains them.
    pub fn with_lists(lists: Vec<BoardList>) -> Self {
        let store = Self::new();
        {
            let mut list_rows = store.lists.write().unwrap_or_else(PoisonError::into_inner);
            let mut card_rows = store.cards.write().unwrap_or_else(PoisonError::into_inner);
            for list in lists {
                list_rows.insert(
                    list.id.clone(),
                    ListRow {
                        board_id: list.board_id.clone(),
                        title: list.title.clone(),
                        position: list.position,
                        seq: store.next_seq(),
                    },
                );
                for mut card in list.cards {
                    card.list_id = list.id.clone();
                    card_rows.insert(
                        card.id.clone(),
                        CardRow {
                            card,
                            seq: store.next_seq(),
                        },
                    );
                }
            }
        }
        store
    }

    /// Advertise and honor all-or-nothing batch updates.
    pub fn transactional(mut self) -> Self {
        self.transactional = true;
        self
    }

    /// Every write touching `id` fails until cleared.
    pub fn fail_writes_for(&self, id: &str) {
        self.faults().failing_ids.insert(id.to_string());
    }

    /// The next `count` write calls fail with a transport error.
    pub fn fail_next_writes(&self, count: u32) {
        self.faults().fail_next = count;
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.faults().fail_fetch = fail;
    }

    /// Number of batch calls received, successful or not.
    pub fn batch_count(&self) -> usize {
        self.batches.load(Ordering::Relaxed)
    }

    /// Current row for a card.
    pub fn card(&self, card_id: &str) -> Option<Card> {
        self.cards
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(card_id)
            .map(|row| row.card.clone())
    }

    fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consume one injected fault for a write touching `id`, if any.
    fn check_write(&self, id: &str) -> Result<(), StoreError> {
        let mut faults = self.faults();
        if faults.fail_next > 0 {
            faults.fail_next -= 1;
            return Err(StoreError::Transport("injected transient failure".to_string()));
        }
        if faults.failing_ids.contains(id) {
            return Err(StoreError::Transport(format!("injected failure for {}", id)));
        }
        Ok(())
    }

    fn validate_card_write(
        &self,
        write: &CardPositionWrite,
        lists: &HashMap<String, ListRow>,
        cards: &HashMap<String, CardRow>,
    ) -> Result<(), StoreError> {
        self.check_write(&write.id)?;
        if !lists.contains_key(&write.list_id) {
            return Err(StoreError::Rejected {
                status: 409,
                message: format!("list {} does not exist", write.list_id),
            });
        }
        if !cards.contains_key(&write.id) {
            return Err(StoreError::NotFound {
                entity: "card",
                id: write.id.clone(),
            });
        }
        Ok(())
    }

    fn validate_list_write(
        &self,
        write: &ListPositionWrite,
        lists: &HashMap<String, ListRow>,
    ) -> Result<(), StoreError> {
        self.check_write(&write.id)?;
        if !lists.contains_key(&write.id) {
            return Err(StoreError::NotFound {
                entity: "list",
                id: write.id.clone(),
            });
        }
        Ok(())
    }
}

fn apply_card_write(cards: &mut HashMap<String, CardRow>, write: &CardPositionWrite) {
    if let Some(row) = cards.get_mut(&write.id) {
        row.card.list_id = write.list_id.clone();
        row.card.position = write.position;
    }
}

fn apply_list_write(lists: &mut HashMap<String, ListRow>, write: &ListPositionWrite) {
    if let Some(row) = lists.get_mut(&write.id) {
        row.position = write.position;
    }
}

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a row id (16 hex chars).
/// An atomic counter gives intra-process uniqueness; mixed with a nanosecond
/// timestamp and hashed via SHA-256 for uniform distribution.
pub fn generate_id() -> String {
    let seq = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let mut hasher = Sha256::new();
    hasher.update(seq.to_le_bytes());
    hasher.update(ts.to_le_bytes());
    hex::encode(&hasher.finalize()[..8])
}

#[async_trait]
impl BoardStore for MemoryStore {
    async fn fetch_lists_with_cards(&self, board_id: &str) -> Result<Vec<BoardList>, StoreError> {
        if self.faults().fail_fetch {
            return Err(StoreError::Transport("injected fetch failure".to_string()));
        }
        let lists = self.lists.read().unwrap_or_else(PoisonError::into_inner);
        let cards = self.cards.read().unwrap_or_else(PoisonError::into_inner);

        let mut rows: Vec<(&String, &ListRow)> = lists
            .iter()
            .filter(|(_, row)| row.board_id == board_id)
            .collect();
        rows.sort_by_key(|(_, row)| (row.position, row.seq));

        let mut grouped: HashMap<&str, Vec<&CardRow>> = HashMap::new();
        for row in cards.values() {
            grouped.entry(row.card.list_id.as_str()).or_default().push(row);
        }

        Ok(rows
            .into_iter()
            .map(|(id, row)| {
                let mut list_cards = grouped.remove(id.as_str()).unwrap_or_default();
                list_cards.sort_by_key(|c| (c.card.position, c.seq));
                BoardList {
                    id: id.clone(),
                    board_id: row.board_id.clone(),
                    title: row.title.clone(),
                    position: row.position,
                    cards: list_cards.into_iter().map(|c| c.card.clone()).collect(),
                }
            })
            .collect())
    }

    async fn update_card_position(&self, write: &CardPositionWrite) -> Result<(), StoreError> {
        let lists = self.lists.read().unwrap_or_else(PoisonError::into_inner);
        let mut cards = self.cards.write().unwrap_or_else(PoisonError::into_inner);
        self.validate_card_write(write, &lists, &cards)?;
        apply_card_write(&mut cards, write);
        Ok(())
    }

    async fn update_list_position(&self, write: &ListPositionWrite) -> Result<(), StoreError> {
        let mut lists = self.lists.write().unwrap_or_else(PoisonError::into_inner);
        self.validate_list_write(write, &lists)?;
        apply_list_write(&mut lists, write);
        Ok(())
    }

    fn supports_batch(&self) -> bool {
        self.transactional
    }

    async fn update_card_positions(&self, writes: &[CardPositionWrite]) -> Result<(), StoreError> {
        if !self.transactional {
            return Err(StoreError::Unsupported("multi-row card position update"));
        }
        self.batches.fetch_add(1, Ordering::Relaxed);
        let lists = self.lists.read().unwrap_or_else(PoisonError::into_inner);
        let mut cards = self.cards.write().unwrap_or_else(PoisonError::into_inner);
        for write in writes {
            self.validate_card_write(write, &lists, &cards)?;
        }
        for write in writes {
            apply_card_write(&mut cards, write);
        }
        Ok(())
    }

    async fn update_list_positions(&self, writes: &[ListPositionWrite]) -> Result<(), StoreError> {
        if !self.transactional {
            return Err(StoreError::Unsupported("multi-row list position update"));
        }
        self.batches.fetch_add(1, Ordering::Relaxed);
        let mut lists = self.lists.write().unwrap_or_else(PoisonError::into_inner);
        for write in writes {
            self.validate_list_write(write, &lists)?;
        }
        for write in writes {
            apply_list_write(&mut lists, write);
        }
        Ok(())
    }

    async fn insert_card(&self, new: &NewCard) -> Result<Card, StoreError> {
        if !self
            .lists
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&new.list_id)
        {
            return Err(StoreError::NotFound {
                entity: "list",
                id: new.list_id.clone(),
            });
        }
        let card = Card {
            id: generate_id(),
            list_id: new.list_id.clone(),
            title: new.title.clone(),
            description: new.description.clone(),
            due_date: None,
            completed: false,
            color: None,
            position: new.position,
            label_ids: Vec::new(),
        };
        self.cards.write().unwrap_or_else(PoisonError::into_inner).insert(
            card.id.clone(),
            CardRow {
                card: card.clone(),
                seq: self.next_seq(),
            },
        );
        Ok(card)
    }

    async fn insert_list(&self, new: &NewList) -> Result<BoardList, StoreError> {
        let list = BoardList {
            id: generate_id(),
            board_id: new.board_id.clone(),
            title: new.title.clone(),
            position: new.position,
            cards: Vec::new(),
        };
        self.lists.write().unwrap_or_else(PoisonError::into_inner).insert(
            list.id.clone(),
            ListRow {
                board_id: list.board_id.clone(),
                title: list.title.clone(),
                position: list.position,
                seq: self.next_seq(),
            },
        );
        Ok(list)
    }
}
