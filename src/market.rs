//! Market records extracted from a fetched snapshot document.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::document::{navigate_or_default, MARKETS_PATH};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    pub id: String,
    pub question: String,
    pub img_url: Option<String>,
    pub end_date: Option<String>,
}

impl Market {
    pub fn new(id: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            question: question.into(),
            img_url: None,
            end_date: None,
        }
    }

    pub fn with_end_date(mut self, end_date: impl Into<String>) -> Self {
        self.end_date = Some(end_date.into());
        self
    }

    pub fn with_img_url(mut self, img_url: impl Into<String>) -> Self {
        self.img_url = Some(img_url.into());
        self
    }

    /// Builds a market from one source record. `fallback_id` is the record's
    /// key in the source mapping and is used when the record has no `id`.
    /// Returns `None` for records that are not JSON objects.
    pub fn from_record(record: &Value, fallback_id: Option<&str>) -> Option<Self> {
        let fields = record.as_object()?;

        let id = fields
            .get("id")
            .and_then(scalar_text)
            .or_else(|| fallback_id.map(str::to_string))
            .unwrap_or_default();

        Some(Self {
            id,
            question: string_field(fields, "question").unwrap_or_default(),
            img_url: string_field(fields, "imgUrl"),
            end_date: string_field(fields, "endDate"),
        })
    }
}

/// Markets in source order. Built once per load and never mutated.
pub type MarketCollection = Vec<Market>;

/// Extracts the market mapping from a parsed snapshot document. Missing
/// intermediate levels yield an empty collection.
pub fn extract_markets(document: &Value) -> MarketCollection {
    let empty = Value::Object(Map::new());
    let node = navigate_or_default(document, &MARKETS_PATH, &empty);

    let (markets, skipped) = match node {
        Value::Object(entries) => partition_records(
            entries
                .iter()
                .map(|(key, record)| Market::from_record(record, Some(key.as_str()))),
        ),
        Value::Array(records) => {
            partition_records(records.iter().map(|record| Market::from_record(record, None)))
        }
        _ => (Vec::new(), 0),
    };

    if skipped > 0 {
        debug!(
            component = "loader",
            event = "loader.extract.skipped_records",
            skipped,
            kept = markets.len()
        );
    }

    markets
}

fn partition_records(records: impl Iterator<Item = Option<Market>>) -> (MarketCollection, usize) {
    let mut markets = Vec::new();
    let mut skipped = 0usize;
    for record in records {
        match record {
            Some(market) => markets.push(market),
            None => skipped += 1,
        }
    }
    (markets, skipped)
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .filter(|raw| !raw.is_empty())
        .map(str::to_string)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(markets: Value) -> Value {
        json!({"props": {"pageProps": {"initialState": {"markets": markets}}}})
    }

    #[test]
    fn extracts_records_in_source_order() {
        let document = doc(json!({
            "z": {"id": "z", "question": "Last key first?", "endDate": "2024-03-15T12:00:00Z"},
            "a": {"id": "a", "question": "Second", "imgUrl": "https://img/a.png"}
        }));

        let markets = extract_markets(&document);
        assert_eq!(markets.len(), 2);
        assert_eq!(markets[0].id, "z");
        assert_eq!(markets[0].end_date.as_deref(), Some("2024-03-15T12:00:00Z"));
        assert_eq!(markets[1].id, "a");
        assert_eq!(markets[1].img_url.as_deref(), Some("https://img/a.png"));
        assert_eq!(markets[1].end_date, None);
    }

    #[test]
    fn missing_props_yields_empty_collection() {
        assert!(extract_markets(&json!({"unrelated": true})).is_empty());
    }

    #[test]
    fn numeric_id_and_missing_id_are_handled() {
        let document = doc(json!({
            "k1": {"id": 42, "question": "numeric"},
            "k2": {"question": "no id"}
        }));

        let markets = extract_markets(&document);
        assert_eq!(markets[0].id, "42");
        assert_eq!(markets[1].id, "k2");
    }

    #[test]
    fn empty_or_non_string_end_date_is_absent() {
        let document = doc(json!({
            "a": {"id": "a", "question": "q", "endDate": ""},
            "b": {"id": "b", "question": "q", "endDate": 1710000000000u64},
            "c": {"id": "c", "question": "q", "endDate": null}
        }));

        let markets = extract_markets(&document);
        assert!(markets.iter().all(|m| m.end_date.is_none()));
    }

    #[test]
    fn non_object_records_are_dropped() {
        let document = doc(json!({"a": {"id": "a", "question": "q"}, "b": 5, "c": "text"}));
        let markets = extract_markets(&document);
        assert_eq!(markets.len(), 1);
        assert_eq!(markets[0].id, "a");
    }

    #[test]
    fn array_of_records_is_accepted() {
        let document = doc(json!([{"id": "x", "question": "q"}]));
        let markets = extract_markets(&document);
        assert_eq!(markets, vec![Market::new("x", "q")]);
    }

    #[test]
    fn serializes_with_source_field_names() {
        let market = Market::new("1", "q")
            .with_img_url("https://img")
            .with_end_date("2024-01-01");
        let value = serde_json::to_value(&market).unwrap();
        assert_eq!(value["imgUrl"], "https://img");
        assert_eq!(value["endDate"], "2024-01-01");
    }
}
