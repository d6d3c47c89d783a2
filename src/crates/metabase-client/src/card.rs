//! Card (saved question) payloads and the values derived from them.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Queries older than this do not count as recent activity.
pub const ACTIVITY_WINDOW_DAYS: i64 = 365;

const RECENT_QUERY_POINTS: u32 = 10;
const DASHBOARD_POINTS_CAP: u32 = 5;
const PARAMETER_POINTS_CAP: u32 = 3;

/// A card as returned by `GET /api/card/{id}`.
///
/// Only the fields the pipeline reads are modeled; everything else in the
/// response is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: u64,
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub dataset_query: Value,

    #[serde(default)]
    pub query_type: Option<String>,

    #[serde(default)]
    pub created_at: Option<String>,

    #[serde(default)]
    pub updated_at: Option<String>,

    #[serde(default)]
    pub collection_id: Option<u64>,

    #[serde(default)]
    pub database_id: Option<u64>,

    #[serde(default)]
    pub last_query_start: Option<String>,

    #[serde(default, deserialize_with = "null_as_zero")]
    pub dashboard_count: u32,

    #[serde(default, deserialize_with = "null_as_zero")]
    pub parameter_usage_count: u32,

    #[serde(default)]
    pub archived: bool,
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<u32>::deserialize(deserializer)?.unwrap_or(0))
}

/// Usage signal computed from a card's query history and references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub score: u32,
    pub recently_used: bool,
}

impl Card {
    /// `native` for SQL questions, `query` for GUI-built ones.
    pub fn query_kind(&self) -> Option<&str> {
        self.dataset_query
            .get("type")
            .and_then(Value::as_str)
            .or(self.query_type.as_deref())
    }

    pub fn is_native(&self) -> bool {
        self.query_kind() == Some("native")
    }

    /// The SQL text behind this card, or a description of why there is none.
    ///
    /// GUI-built questions have no SQL; their structured query is rendered
    /// as pretty JSON instead.
    pub fn extract_sql(&self) -> String {
        match self.query_kind() {
            Some("native") => {
                let sql = self
                    .dataset_query
                    .pointer("/native/query")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .unwrap_or("");
                if sql.is_empty() {
                    "No SQL query found".to_string()
                } else {
                    sql.to_string()
                }
            }
            Some("query") => {
                let structured = self.dataset_query.get("query").cloned().unwrap_or(Value::Null);
                let rendered = serde_json::to_string_pretty(&structured)
                    .unwrap_or_else(|_| structured.to_string());
                format!("GUI Query: {}", rendered)
            }
            other => format!("Unknown query type: {}", other.unwrap_or("N/A")),
        }
    }

    /// Score recent use as of `now`.
    ///
    /// A query inside the activity window is worth 10 points; dashboard
    /// references add up to 5 and parameter usage up to 3. Any dashboard
    /// reference also marks the card as recently used.
    pub fn activity_at(&self, now: DateTime<Utc>) -> Activity {
        let mut score = 0;
        let mut recently_used = false;

        if let Some(raw) = self.last_query_start.as_deref().filter(|s| !s.is_empty()) {
            match parse_timestamp(raw) {
                Some(queried_at) => {
                    if queried_at >= now - ChronoDuration::days(ACTIVITY_WINDOW_DAYS) {
                        score += RECENT_QUERY_POINTS;
                        recently_used = true;
                    }
                }
                None => {
                    tracing::warn!(card_id = self.id, value = raw, "Could not parse last_query_start");
                }
            }
        }

        if self.dashboard_count > 0 {
            score += self.dashboard_count.min(DASHBOARD_POINTS_CAP);
            recently_used = true;
        }

        if self.parameter_usage_count > 0 {
            score += self.parameter_usage_count.min(PARAMETER_POINTS_CAP);
        }

        Activity {
            score,
            recently_used,
        }
    }

    pub fn activity(&self) -> Activity {
        self.activity_at(Utc::now())
    }
}

/// Accepts RFC 3339 (with `Z` or an offset) and naive timestamps, which are
/// taken as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn card(value: Value) -> Card {
        serde_json::from_value(value).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_minimal_card_deserializes_with_defaults() {
        let c = card(json!({"id": 7, "name": "Revenue", "dashboard_count": null}));
        assert_eq!(c.id, 7);
        assert_eq!(c.dashboard_count, 0);
        assert_eq!(c.parameter_usage_count, 0);
        assert!(!c.archived);
        assert!(c.dataset_query.is_null());
    }

    #[test]
    fn test_extract_native_sql_is_trimmed() {
        let c = card(json!({
            "id": 1,
            "name": "n",
            "dataset_query": {"type": "native", "native": {"query": "  SELECT 1\n"}}
        }));
        assert_eq!(c.extract_sql(), "SELECT 1");
    }

    #[test]
    fn test_extract_native_without_query() {
        let c = card(json!({
            "id": 1,
            "name": "n",
            "dataset_query": {"type": "native", "native": {}}
        }));
        assert_eq!(c.extract_sql(), "No SQL query found");
    }

    #[test]
    fn test_extract_gui_query() {
        let c = card(json!({
            "id": 1,
            "name": "n",
            "dataset_query": {"type": "query", "query": {"source-table": 4}}
        }));
        let sql = c.extract_sql();
        assert!(sql.starts_with("GUI Query: {"));
        assert!(sql.contains("\"source-table\": 4"));
    }

    #[test]
    fn test_extract_unknown_type() {
        let c = card(json!({"id": 1, "name": "n", "dataset_query": {"type": "weird"}}));
        assert_eq!(c.extract_sql(), "Unknown query type: weird");

        let c = card(json!({"id": 1, "name": "n"}));
        assert_eq!(c.extract_sql(), "Unknown query type: N/A");
    }

    #[test]
    fn test_list_level_query_type_is_used() {
        let c = card(json!({"id": 1, "name": "n", "query_type": "native"}));
        assert!(c.is_native());
        let c = card(json!({"id": 1, "name": "n", "query_type": "native", "dataset_query": {"type": "query"}}));
        assert_eq!(c.query_kind(), Some("query"));
        assert!(!c.is_native());
    }

    #[test]
    fn test_activity_recent_query_and_caps() {
        let c = card(json!({
            "id": 1,
            "name": "n",
            "last_query_start": "2024-05-20T08:00:00Z",
            "dashboard_count": 9,
            "parameter_usage_count": 7
        }));
        assert_eq!(
            c.activity_at(now()),
            Activity {
                score: 10 + 5 + 3,
                recently_used: true
            }
        );
    }

    #[test]
    fn test_activity_stale_query_only() {
        let c = card(json!({
            "id": 1,
            "name": "n",
            "last_query_start": "2022-01-01T00:00:00.000+02:00"
        }));
        assert_eq!(
            c.activity_at(now()),
            Activity {
                score: 0,
                recently_used: false
            }
        );
    }

    #[test]
    fn test_activity_dashboards_mark_recent_parameters_do_not() {
        let c = card(json!({"id": 1, "name": "n", "dashboard_count": 2}));
        assert_eq!(c.activity_at(now()), Activity { score: 2, recently_used: true });

        let c = card(json!({"id": 1, "name": "n", "parameter_usage_count": 1}));
        assert_eq!(c.activity_at(now()), Activity { score: 1, recently_used: false });
    }

    #[test]
    fn test_activity_unparseable_timestamp_is_ignored() {
        let c = card(json!({"id": 1, "name": "n", "last_query_start": "yesterday"}));
        assert_eq!(c.activity_at(now()).score, 0);
    }

    #[test]
    fn test_naive_timestamp_is_utc() {
        let c = card(json!({"id": 1, "name": "n", "last_query_start": "2024-05-31T12:00:00.123"}));
        assert!(c.activity_at(now()).recently_used);
    }
}
