/// Integer ordering contract shared by cards (within a list) and lists
/// (within a board).
///
/// Persisted positions are advisory: duplicates and gaps are tolerated on
/// read, ties keep their original array order, and a reconciliation pass
/// always leaves a parent densely numbered `0..n-1`.
use crate::types::{BoardList, Card};

/// Anything ordered by a persisted integer position.
pub trait Positioned {
    fn id(&self) -> &str;
    fn position(&self) -> u32;
    fn set_position(&mut self, position: u32);
}

impl Positioned for Card {
    fn id(&self) -> &str {
        &self.id
    }

    fn position(&self) -> u32 {
        self.position
    }

    fn set_position(&mut self, position: u32) {
        self.position = position;
    }
}

impl Positioned for BoardList {
    fn id(&self) -> &str {
        &self.id
    }

    fn position(&self) -> u32 {
        self.position
    }

    fn set_position(&mut self, position: u32) {
        self.position = position;
    }
}

/// Position for a newly created child: last in its parent.
pub fn append_position(current_count: usize) -> u32 {
    u32::try_from(current_count).unwrap_or(u32::MAX)
}

/// Stable sort by position; equal positions keep their current order.
pub fn sort_by_position<T: Positioned>(items: &mut [T]) {
    items.sort_by_key(|item| item.position());
}

/// A position assignment produced by [`dense_renumber`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renumbered {
    pub id: String,
    pub old_position: u32,
    pub new_position: u32,
}

impl Renumbered {
    pub fn changed(&self) -> bool {
        self.old_position != self.new_position
    }
}

/// Assign `position = index` over the current array order.
/// Returns one entry per item, in array order.
pub fn dense_renumber<T: Positioned>(items: &mut [T]) -> Vec<Renumbered> {
    items
        .iter_mut()
        .enumerate()
        .map(|(index, item)| {
            let old_position = item.position();
            let new_position = append_position(index);
            item.set_position(new_position);
            Renumbered {
                id: item.id().to_string(),
                old_position,
                new_position,
            }
        })
        .collect()
}
