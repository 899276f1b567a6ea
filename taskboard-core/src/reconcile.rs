/// Persistence reconciler.
///
/// Phase two of a drag: turn the committed in-memory order into position
/// writes, issue them, then refetch the board so the store's answer wins.
///
/// Writes are computed by diffing a dense renumbering of every affected
/// list against the hierarchy as of drag-start; rows whose
/// `(list_id, position)` did not change are not written. Failed writes are
/// logged and collected in the report, never raised: the refetch that
/// follows every batch is what restores consistency.
use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;

use crate::config::ReconcileConfig;
use crate::position::{dense_renumber, Renumbered};
use crate::storage::{BoardStore, StoreError};
use crate::types::{BoardList, CardPositionWrite, ListPositionWrite};

/// Final state handed over by the reorder engine at drag-end.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitHandoff {
    pub board_id: String,
    pub scope: CommitScope,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommitScope {
    /// A card gesture: the one or two affected lists (source, then target)
    /// after the move, and the same lists as they were at drag-start.
    Cards {
        lists: Vec<BoardList>,
        baseline: Vec<BoardList>,
    },
    /// A list gesture: every list of the board (cards omitted) after and
    /// before the move.
    Lists {
        lists: Vec<BoardList>,
        baseline: Vec<BoardList>,
    },
}

impl CommitHandoff {
    pub fn affected_list_ids(&self) -> Vec<&str> {
        match &self.scope {
            CommitScope::Cards { lists, .. } | CommitScope::Lists { lists, .. } => {
                lists.iter().map(|l| l.id.as_str()).collect()
            }
        }
    }
}

/// The writes one gesture needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WritePlan {
    pub cards: Vec<CardPositionWrite>,
    pub lists: Vec<ListPositionWrite>,
}

impl WritePlan {
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty() && self.lists.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cards.len() + self.lists.len()
    }
}

/// Dense `0..n-1` renumbering of one list's cards, also pinning every card's
/// `list_id` to the list it now sits in.
pub fn renumber_list(list: &mut BoardList) -> Vec<Renumbered> {
    for card in &mut list.cards {
        if card.list_id != list.id {
            card.list_id = list.id.clone();
        }
    }
    dense_renumber(&mut list.cards)
}

/// Compute the minimal write set for a handoff.
pub fn plan_writes(handoff: &CommitHandoff) -> WritePlan {
    match &handoff.scope {
        CommitScope::Cards { lists, baseline } => {
            let previous: HashMap<&str, (&str, u32)> = baseline
                .iter()
                .flat_map(|list| list.cards.iter())
                .map(|card| (card.id.as_str(), (card.list_id.as_str(), card.position)))
                .collect();

            let mut cards = Vec::new();
            for list in lists {
                let mut list = list.clone();
                renumber_list(&mut list);
                for card in &list.cards {
                    let current = (card.list_id.as_str(), card.position);
                    if previous.get(card.id.as_str()) != Some(&current) {
                        cards.push(CardPositionWrite {
                            id: card.id.clone(),
                            list_id: card.list_id.clone(),
                            position: card.position,
                        });
                    }
                }
            }
            WritePlan {
                cards,
                lists: Vec::new(),
            }
        }
        CommitScope::Lists { lists, baseline } => {
            let previous: HashMap<&str, u32> = baseline
                .iter()
                .map(|list| (list.id.as_str(), list.position))
                .collect();

            let mut ordered = lists.clone();
            let renumbered = dense_renumber(&mut ordered);
            let lists = renumbered
                .into_iter()
                .filter(|r| previous.get(r.id.as_str()) != Some(&r.new_position))
                .map(|r| ListPositionWrite {
                    id: r.id,
                    position: r.new_position,
                })
                .collect();
            WritePlan {
                cards: Vec::new(),
                lists,
            }
        }
    }
}

/// A write that was given up on.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedWrite {
    /// Card or list id.
    pub id: String,
    pub attempts: u32,
    pub error: String,
}

/// Outcome of one reconciliation batch.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub board_id: String,
    pub attempted: usize,
    pub failed: Vec<FailedWrite>,
    /// Authoritative lists fetched after the writes settled.
    pub refreshed: Option<Vec<BoardList>>,
    pub refresh_error: Option<String>,
}

impl ReconcileReport {
    pub fn succeeded(&self) -> usize {
        self.attempted - self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.refresh_error.is_none()
    }
}

/// Issues position writes against a [`BoardStore`] and refetches.
pub struct Reconciler {
    store: Arc<dyn BoardStore>,
    config: ReconcileConfig,
}

impl Reconciler {
    pub fn new(store: Arc<dyn BoardStore>, config: ReconcileConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<dyn BoardStore> {
        &self.store
    }

    /// Persist a committed gesture, then refetch the board.
    pub async fn reconcile(&self, handoff: CommitHandoff) -> ReconcileReport {
        let plan = plan_writes(&handoff);
        log::debug!(
            "[taskboard.reconcile] board {}: {} card writes, {} list writes for lists {:?}",
            handoff.board_id,
            plan.cards.len(),
            plan.lists.len(),
            handoff.affected_list_ids()
        );

        let failed = self.execute(&plan).await;
        for failure in &failed {
            log::warn!(
                "[taskboard.reconcile] write for {} failed after {} attempt(s): {}",
                failure.id,
                failure.attempts,
                failure.error
            );
        }

        let mut report = ReconcileReport {
            board_id: handoff.board_id.clone(),
            attempted: plan.len(),
            failed,
            refreshed: None,
            refresh_error: None,
        };

        match self.store.fetch_lists_with_cards(&handoff.board_id).await {
            Ok(lists) => report.refreshed = Some(lists),
            Err(e) => {
                log::warn!(
                    "[taskboard.reconcile] refetch of board {} failed: {}",
                    handoff.board_id,
                    e
                );
                report.refresh_error = Some(e.to_string());
            }
        }

        log::info!(
            "[taskboard.reconcile] board {}: {}/{} writes applied",
            report.board_id,
            report.succeeded(),
            report.attempted
        );
        report
    }

    /// Run every write in the plan; returns the ones that failed.
    pub async fn execute(&self, plan: &WritePlan) -> Vec<FailedWrite> {
        if plan.is_empty() {
            return Vec::new();
        }
        if self.config.prefer_batch && self.store.supports_batch() {
            return self.execute_batch(plan).await;
        }

        let writes = plan
            .cards
            .iter()
            .map(|w| self.run(w.id.clone(), WriteOp::Card(w)))
            .chain(
                plan.lists
                    .iter()
                    .map(|w| self.run(w.id.clone(), WriteOp::List(w))),
            );
        join_all(writes)
            .await
            .into_iter()
            .filter_map(Result::err)
            .collect()
    }

    /// One multi-row transaction per entity kind: all rows land or none do.
    async fn execute_batch(&self, plan: &WritePlan) -> Vec<FailedWrite> {
        let mut failed = Vec::new();
        if !plan.cards.is_empty() {
            let label = format!("batch of {} cards", plan.cards.len());
            if let Err(failure) = self.run(label, WriteOp::CardBatch(&plan.cards)).await {
                failed.extend(plan.cards.iter().map(|w| FailedWrite {
                    id: w.id.clone(),
                    ..failure.clone()
                }));
            }
        }
        if !plan.lists.is_empty() {
            let label = format!("batch of {} lists", plan.lists.len());
            if let Err(failure) = self.run(label, WriteOp::ListBatch(&plan.lists)).await {
                failed.extend(plan.lists.iter().map(|w| FailedWrite {
                    id: w.id.clone(),
                    ..failure.clone()
                }));
            }
        }
        failed
    }

    /// Run one write, retrying retryable errors per the configured policy.
    async fn run(&self, id: String, op: WriteOp<'_>) -> Result<(), FailedWrite> {
        let mut attempt: u32 = 0;
        loop {
            let error = match self.attempt(op).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            if attempt >= self.config.max_retries || !error.is_retryable() {
                return Err(FailedWrite {
                    id,
                    attempts: attempt + 1,
                    error: error.to_string(),
                });
            }
            let delay = self.config.backoff_for(attempt);
            log::debug!(
                "[taskboard.reconcile] retrying {} in {:?} after: {}",
                id,
                delay,
                error
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn attempt(&self, op: WriteOp<'_>) -> Result<(), StoreError> {
        match op {
            WriteOp::Card(write) => self.store.update_card_position(write).await,
            WriteOp::List(write) => self.store.update_list_position(write).await,
            WriteOp::CardBatch(writes) => self.store.update_card_positions(writes).await,
            WriteOp::ListBatch(writes) => self.store.update_list_positions(writes).await,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum WriteOp<'a> {
    Card(&'a CardPositionWrite),
    List(&'a ListPositionWrite),
    CardBatch(&'a [CardPositionWrite]),
    ListBatch(&'a [ListPositionWrite]),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::test_support::list;
    use crate::hierarchy::HierarchyIndex;
    use crate::reorder::{BoardState, DragEvent, DragItem, DropTarget};
    use crate::storage::memory::MemoryStore;

    fn commit(lists: Vec<BoardList>, events: Vec<DragEvent>) -> CommitHandoff {
        let mut state = BoardState::new("b1", HierarchyIndex::from_lists(lists));
        for event in events {
            state = state.apply(event);
        }
        state.take_commit().expect("gesture should commit")
    }

    fn card_move(card: &str, over: &str) -> Vec<DragEvent> {
        vec![
            DragEvent::Start(DragItem::Card(card.to_string())),
            DragEvent::Over(DropTarget::Card(over.to_string())),
            DragEvent::End(Some(DropTarget::Card(over.to_string()))),
        ]
    }

    fn writes(plan: &WritePlan) -> Vec<(&str, &str, u32)> {
        plan.cards
            .iter()
            .map(|w| (w.id.as_str(), w.list_id.as_str(), w.position))
            .collect()
    }

    #[test]
    fn test_plan_same_list_reorder_writes_only_changed_cards() {
        let handoff = commit(vec![list("l1", 0, &["A", "B", "C", "D"])], card_move("A", "C"));
        let plan = plan_writes(&handoff);
        assert_eq!(
            writes(&plan),
            vec![("B", "l1", 0), ("C", "l1", 1), ("A", "l1", 2)]
        );
        assert!(plan.lists.is_empty());
    }

    #[test]
    fn test_plan_cross_list_move() {
        let handoff = commit(
            vec![list("L1", 0, &["X", "Y"]), list("L2", 1, &["Z"])],
            card_move("X", "Z"),
        );
        let plan = plan_writes(&handoff);
        assert_eq!(
            writes(&plan),
            vec![("Y", "L1", 0), ("X", "L2", 0), ("Z", "L2", 1)]
        );
    }

    #[test]
    fn test_plan_renumbers_sparse_baseline() {
        let mut l1 = list("l1", 0, &["A", "B", "C"]);
        l1.cards[0].position = 0;
        l1.cards[1].position = 5;
        l1.cards[2].position = 9;
        let handoff = commit(vec![l1], card_move("C", "B"));
        let plan = plan_writes(&handoff);
        assert_eq!(writes(&plan), vec![("C", "l1", 1), ("B", "l1", 2)]);
    }

    #[test]
    fn test_renumber_list_is_idempotent() {
        let mut l1 = list("l1", 0, &["A", "B", "C"]);
        renumber_list(&mut l1);
        let first = l1.clone();
        let changes = renumber_list(&mut l1);
        assert_eq!(l1, first);
        assert!(changes.iter().all(|r| !r.changed()));
    }

    #[test]
    fn test_plan_list_reorder() {
        let handoff = commit(
            vec![list("a", 0, &[]), list("b", 1, &[]), list("c", 2, &[])],
            vec![
                DragEvent::Start(DragItem::List("c".into())),
                DragEvent::End(Some(DropTarget::List("a".into()))),
            ],
        );
        let plan = plan_writes(&handoff);
        let lists: Vec<(&str, u32)> = plan
            .lists
            .iter()
            .map(|w| (w.id.as_str(), w.position))
            .collect();
        assert_eq!(lists, vec![("c", 0), ("a", 1), ("b", 2)]);
        assert!(plan.cards.is_empty());
    }

    fn seeded(lists: Vec<BoardList>) -> Arc<MemoryStore> {
        Arc::new(MemoryStore::with_lists(lists))
    }

    fn persisted(lists: &[BoardList], list_id: &str) -> Vec<(String, u32)> {
        lists
            .iter()
            .find(|l| l.id == list_id)
            .unwrap()
            .cards
            .iter()
            .map(|c| (c.id.clone(), c.position))
            .collect()
    }

    #[tokio::test]
    async fn test_reconcile_persists_and_refetches() {
        let store = seeded(vec![list("l1", 0, &["A", "B", "C", "D"])]);
        let reconciler = Reconciler::new(store.clone(), ReconcileConfig::default());
        let handoff = commit(vec![list("l1", 0, &["A", "B", "C", "D"])], card_move("A", "C"));

        let report = reconciler.reconcile(handoff).await;
        assert!(report.is_clean());
        assert_eq!(report.attempted, 3);

        let lists = report.refreshed.expect("refetched lists");
        assert_eq!(
            persisted(&lists, "l1"),
            vec![
                ("B".to_string(), 0),
                ("C".to_string(), 1),
                ("A".to_string(), 2),
                ("D".to_string(), 3)
            ]
        );
    }

    #[tokio::test]
    async fn test_reconcile_swallows_write_failures_and_still_refetches() {
        let initial = vec![list("L1", 0, &["X", "Y"]), list("L2", 1, &["Z"])];
        let store = seeded(initial.clone());
        store.fail_writes_for("X");
        let reconciler = Reconciler::new(store.clone(), ReconcileConfig::default());

        let report = reconciler.reconcile(commit(initial, card_move("X", "Z"))).await;
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].id, "X");
        assert_eq!(report.failed[0].attempts, 1);

        // The store never saw X move; the refetch reflects that.
        let lists = report.refreshed.unwrap();
        assert_eq!(persisted(&lists, "L1"), vec![("X".to_string(), 0), ("Y".to_string(), 0)]);
        assert_eq!(persisted(&lists, "L2"), vec![("Z".to_string(), 1)]);
    }

    #[tokio::test]
    async fn test_reconcile_retries_transient_failures() {
        let initial = vec![list("l1", 0, &["A", "B"])];
        let store = seeded(initial.clone());
        store.fail_next_writes(2);
        let config = ReconcileConfig {
            max_retries: 3,
            retry_backoff_ms: 1,
            prefer_batch: false,
        };
        let reconciler = Reconciler::new(store.clone(), config);

        let report = reconciler.reconcile(commit(initial, card_move("A", "B"))).await;
        assert!(report.is_clean(), "report: {:?}", report);
        assert_eq!(
            persisted(&report.refreshed.unwrap(), "l1"),
            vec![("B".to_string(), 0), ("A".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn test_reconcile_uses_atomic_batch_when_supported() {
        let initial = vec![list("L1", 0, &["X", "Y"]), list("L2", 1, &["Z"])];
        let store = Arc::new(MemoryStore::with_lists(initial.clone()).transactional());
        store.fail_writes_for("Z");
        let reconciler = Reconciler::new(store.clone(), ReconcileConfig::default());

        let report = reconciler.reconcile(commit(initial, card_move("X", "Z"))).await;
        // One bad row rejects the whole transaction.
        assert_eq!(report.failed.len(), 3);
        let lists = report.refreshed.unwrap();
        assert_eq!(persisted(&lists, "L1"), vec![("X".to_string(), 0), ("Y".to_string(), 1)]);
        assert_eq!(store.batch_count(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_reports_refetch_failure() {
        let initial = vec![list("l1", 0, &["A", "B"])];
        let store = seeded(initial.clone());
        store.fail_fetches(true);
        let reconciler = Reconciler::new(store.clone(), ReconcileConfig::default());

        let report = reconciler.reconcile(commit(initial, card_move("A", "B"))).await;
        assert!(report.failed.is_empty());
        assert!(report.refreshed.is_none());
        assert!(report.refresh_error.is_some());
    }
}
