use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::types::Card;

/// Read-only view predicates applied on top of a list's full card array.
///
/// All active predicates must match. Filtering never touches `position` or
/// `list_id`; it only selects an order-preserving subsequence.
#[derive(Debug, Clone, Default)]
pub struct CardFilter {
    terms: Vec<ParsedTerm>,
    label_id: Option<String>,
    completed: Option<bool>,
}

#[derive(Debug, Clone)]
enum FilterTerm {
    Text(String),
    Regex(Regex),
}

#[derive(Debug, Clone)]
struct ParsedTerm {
    negate: bool,
    term: FilterTerm,
}

impl CardFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a free-text predicate on title and description.
    pub fn with_text(mut self, text: &str) -> Self {
        let text = text.trim();
        if !text.is_empty() {
            self.terms.push(ParsedTerm {
                negate: false,
                term: FilterTerm::Text(normalize_for_search(text)),
            });
        }
        self
    }

    pub fn with_label(mut self, label_id: impl Into<String>) -> Self {
        self.label_id = Some(label_id.into());
        self
    }

    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    /// Build a filter from a single search box query.
    ///
    /// Supports free text, `"quoted phrases"`, `label:<id>`, `is:done` /
    /// `is:open`, `/regex/`, and a leading `-` to negate a text term.
    pub fn parse(raw_query: &str) -> Self {
        let mut filter = Self::default();
        for token in split_query_tokens(raw_query.trim()) {
            filter.push_token(&token);
        }
        filter
    }

    fn push_token(&mut self, raw_token: &str) {
        let token = raw_token.trim();
        if token.is_empty() {
            return;
        }

        let (negate, token) = match token.strip_prefix('-') {
            Some(rest) if !rest.is_empty() => (true, rest),
            _ => (false, token),
        };

        if token.len() > 2 && token.starts_with('/') && token.ends_with('/') {
            if let Ok(regex) = Regex::new(&token[1..token.len() - 1]) {
                self.terms.push(ParsedTerm {
                    negate,
                    term: FilterTerm::Regex(regex),
                });
                return;
            }
        }

        if !negate {
            if let Some((key, value)) = token.split_once(':') {
                let value = value.trim();
                match key.to_ascii_lowercase().as_str() {
                    "label" if !value.is_empty() => {
                        self.label_id = Some(value.to_string());
                        return;
                    }
                    "is" => {
                        if let Some(completed) = parse_is_term(value) {
                            self.completed = Some(completed);
                            return;
                        }
                    }
                    _ => {}
                }
            }
        }

        self.terms.push(ParsedTerm {
            negate,
            term: FilterTerm::Text(normalize_for_search(token)),
        });
    }

    /// True when at least one predicate would exclude cards.
    pub fn is_active(&self) -> bool {
        !self.terms.is_empty() || self.label_id.is_some() || self.completed.is_some()
    }

    pub fn label_id(&self) -> Option<&str> {
        self.label_id.as_deref()
    }

    pub fn completed(&self) -> Option<bool> {
        self.completed
    }

    pub fn matches(&self, card: &Card) -> bool {
        if let Some(label_id) = &self.label_id {
            if !card.label_ids.iter().any(|id| id == label_id) {
                return false;
            }
        }
        if let Some(completed) = self.completed {
            if card.completed != completed {
                return false;
            }
        }
        self.terms.iter().all(|parsed| {
            let matched = matches_term(&parsed.term, card);
            matched != parsed.negate
        })
    }

    /// Ordered subsequence of `cards` matching every active predicate.
    pub fn apply<'a>(&self, cards: &'a [Card]) -> Vec<&'a Card> {
        cards.iter().filter(|card| self.matches(card)).collect()
    }
}

fn matches_term(term: &FilterTerm, card: &Card) -> bool {
    let description = card.description.as_deref().unwrap_or("");
    match term {
        FilterTerm::Text(needle) => {
            normalize_for_search(&card.title).contains(needle.as_str())
                || normalize_for_search(description).contains(needle.as_str())
        }
        FilterTerm::Regex(regex) => regex.is_match(&card.title) || regex.is_match(description),
    }
}

fn parse_is_term(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "done" | "completed" | "closed" | "checked" => Some(true),
        "open" | "todo" | "unchecked" => Some(false),
        _ => None,
    }
}

/// Lowercase, NFD-decompose and strip combining marks so "resume" finds
/// "Résumé".
fn normalize_for_search(value: &str) -> String {
    value
        .to_lowercase()
        .nfd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .collect()
}

fn split_query_tokens(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for ch in input.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        if ch == '\\' {
            escaped = true;
            continue;
        }
        if ch == '"' {
            in_quotes = !in_quotes;
            if !in_quotes && !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            continue;
        }
        if ch.is_whitespace() && !in_quotes {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            continue;
        }
        current.push(ch);
    }

    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}
