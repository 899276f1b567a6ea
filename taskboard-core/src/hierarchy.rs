/// In-memory list → cards index for one board.
///
/// A derived cache rebuilt wholesale from every authoritative fetch. It is
/// never patched incrementally from the store; only the reorder engine
/// mutates it, and only during a gesture.
use crate::filter::CardFilter;
use crate::position::sort_by_position;
use crate::types::{BoardList, Card};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HierarchyIndex {
    lists: Vec<BoardList>,
}

impl HierarchyIndex {
    /// Build from fetched lists. Lists and cards are stably sorted by
    /// position so ties keep the order the store returned them in.
    pub fn from_lists(mut lists: Vec<BoardList>) -> Self {
        sort_by_position(&mut lists);
        for list in &mut lists {
            sort_by_position(&mut list.cards);
        }
        Self { lists }
    }

    pub fn lists(&self) -> &[BoardList] {
        &self.lists
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    pub fn card_count(&self) -> usize {
        self.lists.iter().map(|l| l.cards.len()).sum()
    }

    pub fn list(&self, list_id: &str) -> Option<&BoardList> {
        self.lists.iter().find(|l| l.id == list_id)
    }

    pub fn list_index(&self, list_id: &str) -> Option<usize> {
        self.lists.iter().position(|l| l.id == list_id)
    }

    /// Which list currently holds `card_id`. Linear in the number of lists.
    pub fn find_list_containing(&self, card_id: &str) -> Option<&BoardList> {
        self.lists.iter().find(|l| l.contains(card_id))
    }

    pub fn list_index_containing(&self, card_id: &str) -> Option<usize> {
        self.lists.iter().position(|l| l.contains(card_id))
    }

    pub fn card(&self, card_id: &str) -> Option<&Card> {
        self.lists.iter().find_map(|l| l.card(card_id))
    }

    /// Cards of a list in authoritative order, narrowed by the overlay.
    /// Unknown list ids yield an empty sequence.
    pub fn cards_of(&self, list_id: &str, filter: &CardFilter) -> Vec<&Card> {
        self.list(list_id)
            .map(|list| filter.apply(&list.cards))
            .unwrap_or_default()
    }

    /// Full replacement with an authoritative fetch result.
    pub fn replace(&mut self, lists: Vec<BoardList>) {
        *self = Self::from_lists(lists);
    }

    pub(crate) fn lists_mut(&mut self) -> &mut Vec<BoardList> {
        &mut self.lists
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::types::{BoardList, Card};

    pub fn card(id: &str, list_id: &str, position: u32) -> Card {
        Card {
            id: id.to_string(),
            list_id: list_id.to_string(),
            title: format!("Card {}", id),
            description: None,
            due_date: None,
            completed: false,
            color: None,
            position,
            label_ids: Vec::new(),
        }
    }

    /// A list whose cards get positions `0..n-1` in the given order.
    pub fn list(id: &str, position: u32, card_ids: &[&str]) -> BoardList {
        BoardList {
            id: id.to_string(),
            board_id: "b1".to_string(),
            title: id.to_string(),
            position,
            cards: card_ids
                .iter()
                .enumerate()
                .map(|(i, c)| card(c, id, i as u32))
                .collect(),
        }
    }

    pub fn card_ids(list: &BoardList) -> Vec<&str> {
        list.cards.iter().map(|c| c.id.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_from_lists_sorts_lists_and_cards() {
        let mut todo = list("todo", 1, &["a", "b"]);
        todo.cards[0].position = 4;
        let done = list("done", 0, &["c"]);
        let index = HierarchyIndex::from_lists(vec![todo, done]);

        assert_eq!(index.lists()[0].id, "done");
        assert_eq!(card_ids(&index.lists()[1]), vec!["b", "a"]);
        assert_eq!(index.card_count(), 3);
    }

    #[test]
    fn test_find_list_containing() {
        let index = HierarchyIndex::from_lists(vec![
            list("todo", 0, &["a", "b"]),
            list("done", 1, &["c"]),
        ]);
        assert_eq!(index.find_list_containing("c").map(|l| l.id.as_str()), Some("done"));
        assert_eq!(index.list_index_containing("b"), Some(0));
        assert!(index.find_list_containing("zzz").is_none());
    }

    #[test]
    fn test_cards_of_applies_filter() {
        let mut todo = list("todo", 0, &["a", "b", "c"]);
        todo.cards[1].completed = true;
        let index = HierarchyIndex::from_lists(vec![todo]);

        let all = index.cards_of("todo", &CardFilter::new());
        assert_eq!(all.len(), 3);

        let done = index.cards_of("todo", &CardFilter::new().with_completed(true));
        assert_eq!(done.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), vec!["b"]);

        assert!(index.cards_of("missing", &CardFilter::new()).is_empty());
    }

    #[test]
    fn test_replace_discards_local_state() {
        let mut index = HierarchyIndex::from_lists(vec![list("todo", 0, &["a", "b"])]);
        index.lists_mut()[0].cards.reverse();

        index.replace(vec![list("todo", 0, &["a", "b"]), list("done", 1, &[])]);
        assert_eq!(card_ids(&index.lists()[0]), vec!["a", "b"]);
        assert_eq!(index.lists().len(), 2);
    }
}
