/// Board session: the owner of one board view's local state.
///
/// Gesture events run synchronously through the reorder engine. A commit is
/// handed to the reconciler on a spawned task (fire-and-forget); its report,
/// including the authoritative refetch, comes back over a channel and is
/// installed by [`BoardSession::pump`] as a wholesale replacement.
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ReconcileConfig;
use crate::filter::CardFilter;
use crate::hierarchy::HierarchyIndex;
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::reorder::{self, BoardState, DragEvent, DragItem, DragPhase, DropTarget};
use crate::storage::{BoardStore, StoreError};
use crate::types::{BoardList, Card, NewCard, NewList};

pub struct BoardSession {
    state: BoardState,
    reconciler: Arc<Reconciler>,
    reports_tx: mpsc::UnboundedSender<ReconcileReport>,
    reports_rx: mpsc::UnboundedReceiver<ReconcileReport>,
    in_flight: usize,
    last_report: Option<ReconcileReport>,
}

impl BoardSession {
    pub fn new(
        board_id: impl Into<String>,
        store: Arc<dyn BoardStore>,
        config: ReconcileConfig,
    ) -> Self {
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        Self {
            state: BoardState::new(board_id, HierarchyIndex::default()),
            reconciler: Arc::new(Reconciler::new(store, config)),
            reports_tx,
            reports_rx,
            in_flight: 0,
            last_report: None,
        }
    }

    /// Create a session and perform the initial fetch.
    pub async fn open(
        board_id: impl Into<String>,
        store: Arc<dyn BoardStore>,
        config: ReconcileConfig,
    ) -> Result<Self, StoreError> {
        let mut session = Self::new(board_id, store, config);
        session.refresh().await?;
        Ok(session)
    }

    pub fn board_id(&self) -> &str {
        self.state.board_id()
    }

    pub fn state(&self) -> &BoardState {
        &self.state
    }

    pub fn hierarchy(&self) -> &HierarchyIndex {
        self.state.hierarchy()
    }

    pub fn phase(&self) -> &DragPhase {
        self.state.phase()
    }

    /// Reconciliations spawned whose report has not been pumped yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn last_report(&self) -> Option<&ReconcileReport> {
        self.last_report.as_ref()
    }

    pub fn visible_cards(&self, list_id: &str) -> Vec<&Card> {
        self.state.visible_cards(list_id)
    }

    pub fn filter(&self) -> &CardFilter {
        self.state.filter()
    }

    pub fn set_filter(&mut self, filter: CardFilter) {
        self.update(|state| state.with_filter(filter));
    }

    pub fn clear_filter(&mut self) {
        self.set_filter(CardFilter::default());
    }

    pub fn drag_start(&mut self, item: DragItem) {
        self.dispatch(DragEvent::Start(item));
    }

    pub fn drag_over(&mut self, target: DropTarget) {
        self.dispatch(DragEvent::Over(target));
    }

    pub fn drag_cancel(&mut self) {
        self.dispatch(DragEvent::Cancel);
    }

    /// Drop. When the gesture commits, reconciliation is spawned and its
    /// handle returned; callers are free to drop it.
    ///
    /// Must be called from within a tokio runtime when the drop can commit.
    pub fn drag_end(&mut self, target: Option<DropTarget>) -> Option<JoinHandle<()>> {
        self.dispatch(DragEvent::End(target));
        let handoff = self.state.take_commit()?;

        let reconciler = self.reconciler.clone();
        let sender = ReportSender {
            tx: self.reports_tx.clone(),
            board_id: handoff.board_id.clone(),
            sent: false,
        };
        self.in_flight += 1;
        Some(tokio::spawn(async move {
            let report = reconciler.reconcile(handoff).await;
            sender.send(report);
        }))
    }

    /// Install every report that has arrived so far. Returns how many.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(report) = self.reports_rx.try_recv() {
            self.install(report);
            applied += 1;
        }
        applied
    }

    /// Wait for the next reconciliation report and install it.
    /// Returns `None` when nothing is in flight.
    pub async fn settle_next(&mut self) -> Option<&ReconcileReport> {
        if self.in_flight == 0 {
            return None;
        }
        let report = self.reports_rx.recv().await?;
        self.install(report);
        self.last_report.as_ref()
    }

    /// Wait until every spawned reconciliation has reported.
    pub async fn settle(&mut self) {
        while self.settle_next().await.is_some() {}
    }

    /// Authoritative refetch, installed as a wholesale replacement.
    pub async fn refresh(&mut self) -> Result<(), StoreError> {
        let lists = self
            .reconciler
            .store()
            .fetch_lists_with_cards(self.state.board_id())
            .await?;
        self.replace(lists);
        Ok(())
    }

    /// Append a card to a list (position = current count), then refetch.
    pub async fn add_card(&mut self, list_id: &str, title: &str) -> Result<Card, StoreError> {
        let new_card = {
            let list = self
                .state
                .hierarchy()
                .list(list_id)
                .ok_or_else(|| StoreError::NotFound {
                    entity: "list",
                    id: list_id.to_string(),
                })?;
            NewCard::append_to(list, title)
        };
        let card = self.reconciler.store().insert_card(&new_card).await?;
        log::info!(
            "[taskboard.session] added card {} to list {} at position {}",
            card.id,
            list_id,
            card.position
        );
        self.refresh().await?;
        Ok(card)
    }

    /// Append a list to the board, then refetch.
    pub async fn add_list(&mut self, title: &str) -> Result<BoardList, StoreError> {
        let new_list = NewList::append_to(
            self.state.board_id(),
            self.state.hierarchy().lists().len(),
            title,
        );
        let list = self.reconciler.store().insert_list(&new_list).await?;
        self.refresh().await?;
        Ok(list)
    }

    fn install(&mut self, report: ReconcileReport) {
        self.in_flight = self.in_flight.saturating_sub(1);
        if !report.failed.is_empty() {
            log::warn!(
                "[taskboard.session] {} position write(s) on board {} did not persist; showing stored order",
                report.failed.len(),
                report.board_id
            );
        }
        if let Some(lists) = report.refreshed.clone() {
            self.replace(lists);
        }
        self.last_report = Some(report);
    }

    fn replace(&mut self, lists: Vec<BoardList>) {
        self.update(|state| reorder::refreshed(state, lists));
    }

    fn dispatch(&mut self, event: DragEvent) {
        self.update(|state| reorder::transition(state, event));
    }

    fn update(&mut self, f: impl FnOnce(BoardState) -> BoardState) {
        let state = std::mem::take(&mut self.state);
        self.state = f(state);
    }
}

/// Delivers exactly one report per spawned reconciliation, including one
/// that unwinds before finishing.
struct ReportSender {
    tx: mpsc::UnboundedSender<ReconcileReport>,
    board_id: String,
    sent: bool,
}

impl ReportSender {
    fn send(mut self, report: ReconcileReport) {
        self.sent = true;
        if self.tx.send(report).is_err() {
            log::debug!("[taskboard.session] session closed before reconciliation finished");
        }
    }
}

impl Drop for ReportSender {
    fn drop(&mut self) {
        if self.sent {
            return;
        }
        log::warn!(
            "[taskboard.session] reconciliation of board {} aborted",
            self.board_id
        );
        let _ = self.tx.send(ReconcileReport {
            board_id: std::mem::take(&mut self.board_id),
            refresh_error: Some("reconciliation aborted".to_string()),
            ..ReconcileReport::default()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::test_support::{card_ids, list};
    use crate::storage::memory::MemoryStore;
    use crate::types::{CardPositionWrite, ListPositionWrite};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves the first fetch, then panics on every later one.
    struct PanicsOnRefetch {
        inner: MemoryStore,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl BoardStore for PanicsOnRefetch {
        async fn fetch_lists_with_cards(
            &self,
            board_id: &str,
        ) -> Result<Vec<BoardList>, StoreError> {
            if self.fetches.fetch_add(1, Ordering::SeqCst) > 0 {
                panic!("store connection lost");
            }
            self.inner.fetch_lists_with_cards(board_id).await
        }

        async fn update_card_position(&self, write: &CardPositionWrite) -> Result<(), StoreError> {
            self.inner.update_card_position(write).await
        }

        async fn update_list_position(&self, write: &ListPositionWrite) -> Result<(), StoreError> {
            self.inner.update_list_position(write).await
        }

        async fn insert_card(&self, card: &NewCard) -> Result<Card, StoreError> {
            self.inner.insert_card(card).await
        }

        async fn insert_list(&self, list: &NewList) -> Result<BoardList, StoreError> {
            self.inner.insert_list(list).await
        }
    }

    async fn open(lists: Vec<BoardList>) -> (Arc<MemoryStore>, BoardSession) {
        let store = Arc::new(MemoryStore::with_lists(lists));
        let session = BoardSession::open("b1", store.clone(), ReconcileConfig::default())
            .await
            .unwrap();
        (store, session)
    }

    fn order(session: &BoardSession, list_id: &str) -> Vec<String> {
        card_ids(session.hierarchy().list(list_id).unwrap())
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    fn positions(session: &BoardSession, list_id: &str) -> Vec<(String, u32)> {
        session
            .hierarchy()
            .list(list_id)
            .unwrap()
            .cards
            .iter()
            .map(|c| (c.id.clone(), c.position))
            .collect()
    }

    fn card(id: &str) -> DragItem {
        DragItem::Card(id.to_string())
    }

    #[tokio::test]
    async fn test_same_list_reorder_end_to_end() {
        let (store, mut session) = open(vec![list("l1", 0, &["A", "B", "C", "D"])]).await;

        session.drag_start(card("A"));
        session.drag_over(DropTarget::Card("C".into()));
        let handle = session.drag_end(Some(DropTarget::Card("C".into())));
        assert!(session.state().is_idle());
        handle.unwrap().await.unwrap();
        session.settle().await;

        assert_eq!(
            positions(&session, "l1"),
            vec![
                ("B".to_string(), 0),
                ("C".to_string(), 1),
                ("A".to_string(), 2),
                ("D".to_string(), 3)
            ]
        );
        assert_eq!(store.card("A").unwrap().position, 2);
        assert!(session.last_report().unwrap().is_clean());
    }

    #[tokio::test]
    async fn test_drop_on_empty_list_end_to_end() {
        let (store, mut session) =
            open(vec![list("backlog", 0, &["card1", "card2"]), list("done", 1, &[])]).await;

        session.drag_start(card("card1"));
        session.drag_end(Some(DropTarget::List("done".into())));
        session.settle().await;

        assert_eq!(positions(&session, "backlog"), vec![("card2".to_string(), 0)]);
        assert_eq!(positions(&session, "done"), vec![("card1".to_string(), 0)]);
        assert_eq!(store.card("card1").unwrap().list_id, "done");
    }

    #[tokio::test]
    async fn test_failed_write_reverts_to_store_state() {
        let (store, mut session) = open(vec![list("L1", 0, &["X", "Y"]), list("L2", 1, &["Z"])]).await;
        store.fail_writes_for("X");

        session.drag_start(card("X"));
        session.drag_end(Some(DropTarget::Card("Z".into())));
        // Optimistic view right after the drop.
        assert_eq!(order(&session, "L2"), vec!["X", "Z"]);

        session.settle().await;
        // The move was not persisted; the refetch shows where X really is.
        assert_eq!(order(&session, "L1"), vec!["X", "Y"]);
        assert_eq!(order(&session, "L2"), vec!["Z"]);
        assert_eq!(session.last_report().unwrap().failed.len(), 1);
    }

    #[tokio::test]
    async fn test_new_drag_may_start_while_reconciling() {
        let (_store, mut session) = open(vec![list("l1", 0, &["A", "B", "C"])]).await;

        session.drag_start(card("A"));
        session.drag_end(Some(DropTarget::Card("B".into())));
        assert_eq!(session.in_flight(), 1);

        session.drag_start(card("C"));
        assert!(matches!(session.phase(), DragPhase::Dragging(_)));
        session.drag_end(Some(DropTarget::Card("B".into())));
        assert_eq!(session.in_flight(), 2);

        session.settle().await;
        assert_eq!(session.in_flight(), 0);
        assert_eq!(order(&session, "l1"), vec!["C", "B", "A"]);
    }

    #[tokio::test]
    async fn test_cancel_spawns_nothing() {
        let (_store, mut session) = open(vec![list("l1", 0, &["A", "B"])]).await;
        session.drag_start(card("A"));
        session.drag_over(DropTarget::Card("B".into()));
        session.drag_cancel();
        assert_eq!(order(&session, "l1"), vec!["A", "B"]);
        assert!(session.drag_end(None).is_none());
        assert_eq!(session.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_filter_blocks_drag_and_clearing_restores_order() {
        let mut todo = list("l1", 0, &["A", "B", "C"]);
        todo.cards[1].completed = true;
        let (_store, mut session) = open(vec![todo]).await;
        let before = session.hierarchy().clone();

        session.set_filter(CardFilter::parse("is:done"));
        let visible: Vec<&str> = session
            .visible_cards("l1")
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(visible, vec!["B"]);

        session.drag_start(card("B"));
        assert!(session.state().is_idle());

        session.clear_filter();
        assert_eq!(session.hierarchy(), &before);
        assert_eq!(session.visible_cards("l1").len(), 3);
    }

    #[tokio::test]
    async fn test_filter_set_mid_drag_spawns_nothing() {
        let (_store, mut session) = open(vec![list("l1", 0, &["A", "B", "C"])]).await;
        let before = session.hierarchy().clone();

        session.drag_start(card("A"));
        session.drag_over(DropTarget::Card("C".into()));
        session.set_filter(CardFilter::parse("\"Card B\""));
        assert!(session.drag_end(Some(DropTarget::Card("C".into()))).is_none());

        assert_eq!(session.in_flight(), 0);
        assert_eq!(session.hierarchy(), &before);
    }

    #[tokio::test]
    async fn test_aborted_reconciliation_still_reports() {
        let store = Arc::new(PanicsOnRefetch {
            inner: MemoryStore::with_lists(vec![list("l1", 0, &["A", "B"])]),
            fetches: AtomicUsize::new(0),
        });
        let mut session = BoardSession::open("b1", store, ReconcileConfig::default())
            .await
            .unwrap();

        session.drag_start(card("A"));
        let handle = session.drag_end(Some(DropTarget::Card("B".into()))).unwrap();
        assert!(handle.await.is_err());

        session.settle().await;
        assert_eq!(session.in_flight(), 0);
        let report = session.last_report().unwrap();
        assert!(report.refreshed.is_none());
        assert!(report.refresh_error.is_some());
        // No refetch arrived, so the optimistic order stays.
        assert_eq!(order(&session, "l1"), vec!["B", "A"]);
    }

    #[tokio::test]
    async fn test_add_card_appends() {
        let (_store, mut session) = open(vec![list("l1", 0, &["A", "B"])]).await;
        let created = session.add_card("l1", "Write tests").await.unwrap();
        assert_eq!(created.position, 2);
        assert_eq!(order(&session, "l1").last(), Some(&created.id));

        let missing = session.add_card("nope", "x").await;
        assert!(matches!(missing, Err(StoreError::NotFound { entity: "list", .. })));
    }

    #[tokio::test]
    async fn test_add_list_appends() {
        let (_store, mut session) = open(vec![list("l1", 0, &[])]).await;
        let created = session.add_list("Done").await.unwrap();
        assert_eq!(created.position, 1);
        assert_eq!(session.hierarchy().lists()[1].id, created.id);
    }

    #[tokio::test]
    async fn test_list_reorder_end_to_end() {
        let (_store, mut session) =
            open(vec![list("a", 0, &[]), list("b", 1, &[]), list("c", 2, &["x"])]).await;

        session.drag_start(DragItem::List("c".into()));
        session.drag_end(Some(DropTarget::List("a".into())));
        session.settle().await;

        let order: Vec<(&str, u32)> = session
            .hierarchy()
            .lists()
            .iter()
            .map(|l| (l.id.as_str(), l.position))
            .collect();
        assert_eq!(order, vec![("c", 0), ("a", 1), ("b", 2)]);
        assert_eq!(session.hierarchy().list("c").unwrap().cards.len(), 1);
    }
}
