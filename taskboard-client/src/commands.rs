use std::fmt::Write;
use std::sync::Arc;

use taskboard_core::config::ReconcileConfig;
use taskboard_core::reconcile::ReconcileReport;
use taskboard_core::types::Card;
use taskboard_core::{BoardSession, BoardStore, CardFilter, DragItem, DropTarget};

use crate::cli::MoveTarget;
use crate::error::ClientError;

pub async fn open_session(
    store: Arc<dyn BoardStore>,
    config: &ReconcileConfig,
    board_id: &str,
) -> Result<BoardSession, ClientError> {
    let session = BoardSession::open(board_id, store, config.clone()).await?;
    if session.hierarchy().is_empty() {
        log::warn!("[taskboard.cli] board {} has no lists", board_id);
    }
    Ok(session)
}

/// Text rendering of the visible board, one list header per list.
pub fn render_board(session: &BoardSession) -> String {
    let mut out = String::new();
    let filtered = session.filter().is_active();
    for list in session.hierarchy().lists() {
        let visible = session.visible_cards(&list.id);
        let count = if filtered {
            format!("{}/{}", visible.len(), list.cards.len())
        } else {
            list.cards.len().to_string()
        };
        let _ = writeln!(out, "{} [{}] ({})", list.title, list.id, count);
        for card in visible {
            let _ = writeln!(out, "  {}", render_card(card));
        }
    }
    out
}

fn render_card(card: &Card) -> String {
    let mut line = format!(
        "{:>3}. [{}] {} ({})",
        card.position,
        if card.completed { "x" } else { " " },
        card.title,
        card.id
    );
    if let Some(due) = card.due_date {
        let _ = write!(line, " due {}", due);
    }
    if !card.label_ids.is_empty() {
        let _ = write!(line, " #{}", card.label_ids.join(" #"));
    }
    line
}

pub fn show(session: &mut BoardSession, filter: Option<&str>) -> String {
    if let Some(query) = filter {
        session.set_filter(CardFilter::parse(query));
    }
    render_board(session)
}

/// Run a full drag gesture for one card and wait for its reconciliation.
/// Returns `None` when the gesture did not commit.
pub async fn move_card(
    session: &mut BoardSession,
    card_id: &str,
    target: &MoveTarget,
) -> Result<Option<ReconcileReport>, ClientError> {
    let hierarchy = session.hierarchy();
    if hierarchy.card(card_id).is_none() {
        return Err(not_on_board(session, "card", card_id));
    }
    let drop = match (&target.over, &target.list) {
        (Some(over), _) if hierarchy.card(over).is_some() => DropTarget::Card(over.clone()),
        (Some(over), _) => return Err(not_on_board(session, "card", over)),
        (None, Some(list)) if hierarchy.list(list).is_some() => DropTarget::List(list.clone()),
        (None, Some(list)) => return Err(not_on_board(session, "list", list)),
        (None, None) => return Ok(None),
    };

    session.drag_start(DragItem::Card(card_id.to_string()));
    session.drag_over(drop.clone());
    if session.drag_end(Some(drop)).is_none() {
        log::info!("[taskboard.cli] move of {} did not commit", card_id);
        return Ok(None);
    }

    let report = session.settle_next().await.cloned();
    if let Some(report) = &report {
        if !report.failed.is_empty() {
            return Err(ClientError::Unpersisted {
                failed: report.failed.len(),
            });
        }
    }
    Ok(report)
}

pub async fn add_card(
    session: &mut BoardSession,
    list_id: &str,
    title: &str,
) -> Result<Card, ClientError> {
    if session.hierarchy().list(list_id).is_none() {
        return Err(not_on_board(session, "list", list_id));
    }
    Ok(session.add_card(list_id, title).await?)
}

fn not_on_board(session: &BoardSession, entity: &'static str, id: &str) -> ClientError {
    ClientError::NotOnBoard {
        entity,
        id: id.to_string(),
        board_id: session.board_id().to_string(),
    }
}
