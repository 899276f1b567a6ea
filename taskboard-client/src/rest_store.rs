/// `BoardStore` over a PostgREST-style HTTP API.
///
/// Lists are fetched with their cards embedded; card label links come back
/// as an embedded `card_labels(label_id)` array and are flattened into
/// `Card::label_ids`. Writes use `Prefer: return=representation` so an
/// update that matched no row can be reported as `NotFound`.
use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use taskboard_core::position::sort_by_position;
use taskboard_core::storage::{BoardStore, StoreError};
use taskboard_core::types::{
    BoardList, Card, CardPositionWrite, ListPositionWrite, NewCard, NewList,
};

use crate::config::ClientConfig;

/// Characters left as-is inside a filter value.
const FILTER_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const LISTS_SELECT: &str = "*,cards(*,card_labels(label_id))";

pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl RestStore {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(&config.store_url, config.api_key.clone())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) => builder.header("apikey", key).bearer_auth(key),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, StoreError> {
        let resp = builder.send().await.map_err(transport_error)?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp.text().await.unwrap_or_default();
        Err(StoreError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, StoreError> {
        let body = self.send(builder).await?.text().await.map_err(transport_error)?;
        serde_json::from_str(&body).map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn patch_one(
        &self,
        entity: &'static str,
        url: String,
        id: &str,
        body: serde_json::Value,
    ) -> Result<(), StoreError> {
        let rows: Vec<serde_json::Value> = self
            .send_json(
                self.request(Method::PATCH, url)
                    .header("Prefer", "return=representation")
                    .json(&body),
            )
            .await?;
        if rows.is_empty() {
            return Err(StoreError::NotFound {
                entity,
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn insert_one<T: DeserializeOwned>(
        &self,
        table: &str,
        body: serde_json::Value,
    ) -> Result<T, StoreError> {
        let mut rows: Vec<T> = self
            .send_json(
                self.request(Method::POST, table_url(&self.base_url, table))
                    .header("Prefer", "return=representation")
                    .json(&body),
            )
            .await?;
        if rows.is_empty() {
            return Err(StoreError::Decode(format!("insert into {} returned no row", table)));
        }
        Ok(rows.swap_remove(0))
    }
}

fn transport_error(e: reqwest::Error) -> StoreError {
    if e.is_decode() {
        StoreError::Decode(e.to_string())
    } else {
        StoreError::Transport(e.to_string())
    }
}

fn encode_value(value: &str) -> String {
    utf8_percent_encode(value, FILTER_VALUE).to_string()
}

pub fn table_url(base_url: &str, table: &str) -> String {
    format!("{}/rest/v1/{}", base_url, table)
}

pub fn lists_url(base_url: &str, board_id: &str) -> String {
    format!(
        "{}?board_id=eq.{}&select={}&order=position.asc&cards.order=position.asc",
        table_url(base_url, "lists"),
        encode_value(board_id),
        utf8_percent_encode(LISTS_SELECT, FILTER_VALUE)
    )
}

pub fn row_url(base_url: &str, table: &str, id: &str) -> String {
    format!("{}?id=eq.{}", table_url(base_url, table), encode_value(id))
}

pub fn card_position_body(write: &CardPositionWrite) -> serde_json::Value {
    json!({ "list_id": write.list_id, "position": write.position })
}

pub fn list_position_body(write: &ListPositionWrite) -> serde_json::Value {
    json!({ "position": write.position })
}

#[derive(Debug, Deserialize)]
struct LabelLink {
    label_id: String,
}

#[derive(Debug, Deserialize)]
struct CardRow {
    #[serde(flatten)]
    card: Card,
    #[serde(default)]
    card_labels: Vec<LabelLink>,
}

impl From<CardRow> for Card {
    fn from(row: CardRow) -> Self {
        let mut card = row.card;
        if card.label_ids.is_empty() {
            card.label_ids = row.card_labels.into_iter().map(|l| l.label_id).collect();
        }
        card
    }
}

#[derive(Debug, Deserialize)]
struct ListRow {
    id: String,
    board_id: String,
    title: String,
    position: u32,
    #[serde(default)]
    cards: Vec<CardRow>,
}

impl From<ListRow> for BoardList {
    fn from(row: ListRow) -> Self {
        let mut cards: Vec<Card> = row.cards.into_iter().map(Card::from).collect();
        sort_by_position(&mut cards);
        BoardList {
            id: row.id,
            board_id: row.board_id,
            title: row.title,
            position: row.position,
            cards,
        }
    }
}

/// Decode a lists-with-cards response body. Rows are re-sorted stably by
/// position in case the server ignored the `order` parameters.
pub fn decode_lists(body: &str) -> Result<Vec<BoardList>, StoreError> {
    let rows: Vec<ListRow> =
        serde_json::from_str(body).map_err(|e| StoreError::Decode(e.to_string()))?;
    let mut lists: Vec<BoardList> = rows.into_iter().map(BoardList::from).collect();
    sort_by_position(&mut lists);
    Ok(lists)
}

#[async_trait]
impl BoardStore for RestStore {
    async fn fetch_lists_with_cards(&self, board_id: &str) -> Result<Vec<BoardList>, StoreError> {
        let url = lists_url(&self.base_url, board_id);
        log::debug!("[taskboard.rest] GET {}", url);
        let body = self
            .send(self.request(Method::GET, url))
            .await?
            .text()
            .await
            .map_err(transport_error)?;
        decode_lists(&body)
    }

    async fn update_card_position(&self, write: &CardPositionWrite) -> Result<(), StoreError> {
        self.patch_one(
            "card",
            row_url(&self.base_url, "cards", &write.id),
            &write.id,
            card_position_body(write),
        )
        .await
    }

    async fn update_list_position(&self, write: &ListPositionWrite) -> Result<(), StoreError> {
        self.patch_one(
            "list",
            row_url(&self.base_url, "lists", &write.id),
            &write.id,
            list_position_body(write),
        )
        .await
    }

    async fn insert_card(&self, card: &NewCard) -> Result<Card, StoreError> {
        let body = serde_json::to_value(card).map_err(|e| StoreError::Decode(e.to_string()))?;
        let row: CardRow = self.insert_one("cards", body).await?;
        Ok(row.into())
    }

    async fn insert_list(&self, list: &NewList) -> Result<BoardList, StoreError> {
        let body = serde_json::to_value(list).map_err(|e| StoreError::Decode(e.to_string()))?;
        let row: ListRow = self.insert_one("lists", body).await?;
        Ok(row.into())
    }
}
