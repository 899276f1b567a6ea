/// Drag-and-drop reorder engine.
///
/// Pure transitions over an owned [`BoardState`]:
///
///   Idle --Start--> Dragging --Over--> Dragging
///   Dragging --End(Some)--> Committing --take_commit--> Idle
///   Dragging --End(Some), order unchanged--> Idle (snapshot restored)
///   Dragging --End(None) | Cancel--> Idle (snapshot restored)
///
/// Installing an active filter while Dragging cancels the drag.
///
/// Nothing here talks to the store and nothing here fails: stale ids, self
/// drops and out-of-phase events all degrade to no-ops.
use crate::filter::CardFilter;
use crate::hierarchy::HierarchyIndex;
use crate::position::dense_renumber;
use crate::reconcile::{CommitHandoff, CommitScope};
use crate::types::{BoardList, Card};

/// What is being dragged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragItem {
    Card(String),
    List(String),
}

/// What the pointer is over. `List` is the list container itself, which is
/// the only target an empty list offers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropTarget {
    Card(String),
    List(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragEvent {
    Start(DragItem),
    Over(DropTarget),
    /// Pointer released. `None` means released outside any drop target.
    End(Option<DropTarget>),
    Cancel,
}

/// Copy of the dragged item taken at drag-start, for overlay rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum DragOverlay {
    Card(Card),
    List {
        id: String,
        title: String,
        card_count: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dragging {
    item: DragItem,
    overlay: DragOverlay,
    origin_list_id: Option<String>,
    /// Last hover target applied. Repeats of it are not re-applied, so a
    /// stream of identical drag-over events (or a drop on the slot already
    /// hovered) cannot bounce the item back and forth.
    last_target: Option<DropTarget>,
    /// Hierarchy as of drag-start. Restored on cancel, and the baseline the
    /// reconciler diffs against.
    snapshot: HierarchyIndex,
}

impl Dragging {
    pub fn item(&self) -> &DragItem {
        &self.item
    }

    pub fn overlay(&self) -> &DragOverlay {
        &self.overlay
    }

    pub fn origin_list_id(&self) -> Option<&str> {
        self.origin_list_id.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum DragPhase {
    #[default]
    Idle,
    Dragging(Box<Dragging>),
    Committing(CommitHandoff),
}

/// Everything the board view owns locally.
#[derive(Debug, Clone, Default)]
pub struct BoardState {
    board_id: String,
    hierarchy: HierarchyIndex,
    filter: CardFilter,
    phase: DragPhase,
}

impl BoardState {
    pub fn new(board_id: impl Into<String>, hierarchy: HierarchyIndex) -> Self {
        Self {
            board_id: board_id.into(),
            hierarchy,
            filter: CardFilter::default(),
            phase: DragPhase::Idle,
        }
    }

    pub fn board_id(&self) -> &str {
        &self.board_id
    }

    pub fn hierarchy(&self) -> &HierarchyIndex {
        &self.hierarchy
    }

    pub fn filter(&self) -> &CardFilter {
        &self.filter
    }

    pub fn phase(&self) -> &DragPhase {
        &self.phase
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.phase, DragPhase::Idle)
    }

    /// Swap the overlay. An active filter cancels an in-progress drag so
    /// hidden cards are never reordered.
    pub fn with_filter(mut self, filter: CardFilter) -> Self {
        if filter.is_active() {
            self.phase = match std::mem::take(&mut self.phase) {
                DragPhase::Dragging(drag) => {
                    log::debug!(
                        "[taskboard.reorder] filter set during drag of {:?}, cancelling",
                        drag.item
                    );
                    self.hierarchy = drag.snapshot;
                    DragPhase::Idle
                }
                other => other,
            };
        }
        self.filter = filter;
        self
    }

    /// Visible cards of a list: authoritative order narrowed by the filter.
    pub fn visible_cards(&self, list_id: &str) -> Vec<&Card> {
        self.hierarchy.cards_of(list_id, &self.filter)
    }

    pub fn apply(self, event: DragEvent) -> Self {
        transition(self, event)
    }

    /// Hand the pending commit to the caller and return to Idle.
    pub fn take_commit(&mut self) -> Option<CommitHandoff> {
        match std::mem::take(&mut self.phase) {
            DragPhase::Committing(handoff) => Some(handoff),
            other => {
                self.phase = other;
                None
            }
        }
    }
}

/// Advance the gesture state machine by one event.
pub fn transition(mut state: BoardState, event: DragEvent) -> BoardState {
    let phase = std::mem::take(&mut state.phase);
    state.phase = match (phase, event) {
        (DragPhase::Idle, DragEvent::Start(item)) => start(&state, item),
        (DragPhase::Dragging(mut drag), DragEvent::Over(target)) => {
            hover(&mut state.hierarchy, &mut drag, &target);
            DragPhase::Dragging(drag)
        }
        (DragPhase::Dragging(mut drag), DragEvent::End(Some(target))) => {
            hover(&mut state.hierarchy, &mut drag, &target);
            commit(&mut state, *drag)
        }
        (DragPhase::Dragging(drag), DragEvent::End(None) | DragEvent::Cancel) => {
            log::debug!("[taskboard.reorder] drag of {:?} cancelled", drag.item);
            state.hierarchy = drag.snapshot;
            DragPhase::Idle
        }
        (phase, event) => {
            log::debug!(
                "[taskboard.reorder] ignoring {:?} while {}",
                event,
                phase_name(&phase)
            );
            phase
        }
    };
    state
}

/// Install an authoritative fetch result as a wholesale replacement.
///
/// An in-progress drag is rebased onto the fresh hierarchy; if the dragged
/// item no longer exists the gesture is cancelled.
pub fn refreshed(mut state: BoardState, lists: Vec<BoardList>) -> BoardState {
    let fresh = HierarchyIndex::from_lists(lists);
    state.phase = match std::mem::take(&mut state.phase) {
        DragPhase::Dragging(mut drag) => match rebase(&fresh, &drag.item) {
            Some((overlay, origin_list_id)) => {
                drag.overlay = overlay;
                drag.origin_list_id = origin_list_id;
                drag.last_target = None;
                drag.snapshot = fresh.clone();
                DragPhase::Dragging(drag)
            }
            None => {
                log::debug!(
                    "[taskboard.reorder] {:?} vanished after refresh, cancelling drag",
                    drag.item
                );
                DragPhase::Idle
            }
        },
        other => other,
    };
    state.hierarchy = fresh;
    state
}

fn phase_name(phase: &DragPhase) -> &'static str {
    match phase {
        DragPhase::Idle => "idle",
        DragPhase::Dragging(_) => "dragging",
        DragPhase::Committing(_) => "committing",
    }
}

fn start(state: &BoardState, item: DragItem) -> DragPhase {
    if state.filter.is_active() {
        log::debug!("[taskboard.reorder] drag disabled while a filter is active");
        return DragPhase::Idle;
    }
    match rebase(&state.hierarchy, &item) {
        Some((overlay, origin_list_id)) => DragPhase::Dragging(Box::new(Dragging {
            item,
            overlay,
            origin_list_id,
            last_target: None,
            snapshot: state.hierarchy.clone(),
        })),
        None => {
            log::debug!("[taskboard.reorder] drag start on unknown {:?}", item);
            DragPhase::Idle
        }
    }
}

/// Locate the dragged item in `hierarchy`: its overlay copy and, for cards,
/// the containing list.
fn rebase(hierarchy: &HierarchyIndex, item: &DragItem) -> Option<(DragOverlay, Option<String>)> {
    match item {
        DragItem::Card(card_id) => {
            let list = hierarchy.find_list_containing(card_id)?;
            let card = list.card(card_id)?;
            Some((DragOverlay::Card(card.clone()), Some(list.id.clone())))
        }
        DragItem::List(list_id) => {
            let list = hierarchy.list(list_id)?;
            Some((
                DragOverlay::List {
                    id: list.id.clone(),
                    title: list.title.clone(),
                    card_count: list.cards.len(),
                },
                None,
            ))
        }
    }
}

fn hover(hierarchy: &mut HierarchyIndex, drag: &mut Dragging, target: &DropTarget) {
    // A list drag only cares which list is under the pointer.
    let key = match (&drag.item, target) {
        (DragItem::List(_), DropTarget::Card(card_id)) => {
            match hierarchy.find_list_containing(card_id) {
                Some(list) => DropTarget::List(list.id.clone()),
                None => return,
            }
        }
        _ => target.clone(),
    };
    if drag.last_target.as_ref() == Some(&key) {
        return;
    }
    drag_over(hierarchy, &drag.item, &key);
    drag.last_target = Some(key);
}

fn drag_over(hierarchy: &mut HierarchyIndex, item: &DragItem, target: &DropTarget) {
    match item {
        DragItem::Card(card_id) => move_card(hierarchy, card_id, target),
        DragItem::List(list_id) => move_list(hierarchy, list_id, target),
    }
}

/// Array-move the dragged card to the slot currently occupied by the target.
///
/// Same list: remove, then insert at the over card's former index (so the
/// neighbours shift toward the pointer rather than swapping). Other list:
/// remove from the source, reassign `list_id`, insert at the over card's
/// index. A list container target appends to the end.
fn move_card(hierarchy: &mut HierarchyIndex, card_id: &str, target: &DropTarget) {
    let Some(source) = hierarchy.list_index_containing(card_id) else {
        return;
    };
    let (dest, over_index) = match target {
        DropTarget::Card(over_id) => {
            if over_id == card_id {
                return;
            }
            let Some(dest) = hierarchy.list_index_containing(over_id) else {
                return;
            };
            (dest, hierarchy.lists()[dest].card_index(over_id))
        }
        DropTarget::List(list_id) => match hierarchy.list_index(list_id) {
            Some(dest) => (dest, None),
            None => return,
        },
    };

    let lists = hierarchy.lists_mut();
    let Some(from) = lists[source].card_index(card_id) else {
        return;
    };

    if source == dest {
        let cards = &mut lists[source].cards;
        let to = over_index.unwrap_or(cards.len() - 1);
        if from != to {
            let card = cards.remove(from);
            cards.insert(to, card);
        }
        return;
    }

    let mut card = lists[source].cards.remove(from);
    card.list_id = lists[dest].id.clone();
    let cards = &mut lists[dest].cards;
    let at = over_index.unwrap_or(cards.len()).min(cards.len());
    cards.insert(at, card);
}

/// Array-move the dragged list to the slot of the list under the pointer.
/// Hovering a card counts as hovering its list.
fn move_list(hierarchy: &mut HierarchyIndex, list_id: &str, target: &DropTarget) {
    let over_list = match target {
        DropTarget::List(id) => hierarchy.list_index(id),
        DropTarget::Card(card_id) => hierarchy.list_index_containing(card_id),
    };
    let (Some(from), Some(to)) = (hierarchy.list_index(list_id), over_list) else {
        return;
    };
    if from == to {
        return;
    }
    let lists = hierarchy.lists_mut();
    let list = lists.remove(from);
    lists.insert(to, list);
}

fn commit(state: &mut BoardState, drag: Dragging) -> DragPhase {
    if same_order(&state.hierarchy, &drag.snapshot) {
        log::debug!(
            "[taskboard.reorder] drop of {:?} left the order unchanged",
            drag.item
        );
        state.hierarchy = drag.snapshot;
        return DragPhase::Idle;
    }

    let scope = match &drag.item {
        DragItem::Card(card_id) => {
            let Some(current) = state
                .hierarchy
                .find_list_containing(card_id)
                .map(|l| l.id.clone())
            else {
                state.hierarchy = drag.snapshot;
                return DragPhase::Idle;
            };

            let mut affected = Vec::with_capacity(2);
            if let Some(origin) = drag.origin_list_id.clone() {
                affected.push(origin);
            }
            if !affected.contains(&current) {
                affected.push(current);
            }

            for list_id in &affected {
                if let Some(index) = state.hierarchy.list_index(list_id) {
                    dense_renumber(&mut state.hierarchy.lists_mut()[index].cards);
                }
            }

            CommitScope::Cards {
                lists: collect_lists(&state.hierarchy, &affected),
                baseline: collect_lists(&drag.snapshot, &affected),
            }
        }
        DragItem::List(_) => {
            dense_renumber(state.hierarchy.lists_mut());
            CommitScope::Lists {
                lists: list_headers(&state.hierarchy),
                baseline: list_headers(&drag.snapshot),
            }
        }
    };

    log::debug!(
        "[taskboard.reorder] committing drag of {:?} on board {}",
        drag.item,
        state.board_id
    );
    DragPhase::Committing(CommitHandoff {
        board_id: state.board_id.clone(),
        scope,
    })
}

/// Same lists in the same order, each holding the same cards in the same order.
fn same_order(current: &HierarchyIndex, snapshot: &HierarchyIndex) -> bool {
    current.lists().len() == snapshot.lists().len()
        && current
            .lists()
            .iter()
            .zip(snapshot.lists())
            .all(|(a, b)| {
                a.id == b.id
                    && a.cards.len() == b.cards.len()
                    && a.cards.iter().zip(&b.cards).all(|(x, y)| x.id == y.id)
            })
}

fn collect_lists(hierarchy: &HierarchyIndex, ids: &[String]) -> Vec<BoardList> {
    ids.iter()
        .filter_map(|id| hierarchy.list(id).cloned())
        .collect()
}

/// Lists without their cards; list-level commits never touch cards.
fn list_headers(hierarchy: &HierarchyIndex) -> Vec<BoardList> {
    hierarchy
        .lists()
        .iter()
        .map(|list| BoardList {
            cards: Vec::new(),
            ..list.clone()
        })
        .collect()
}
