//! Search DSL (§6 `POST /search`). A small default grammar over field
//! equality/range filters — "richer grammar as a documented extension
//! point" per §6 — grounded on the teacher's `api::routes` query-handler
//! shape (deserialize a typed request, walk the store, shape a response),
//! generalized from its single hardcoded filter to a field/op/value triple
//! evaluated against each stored [`crate::model::Flag`].

use serde::{Deserialize, Serialize};

use crate::model::{Flag, FlagStatus};

const MAX_SHOW: usize = 100;
const DEFAULT_SHOW: usize = 25;

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: Vec<Filter>,
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub show: Option<usize>,
    #[serde(default)]
    pub sort: Vec<SortKey>,
    #[serde(default)]
    pub hide_flags: Option<HideFlags>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HideFlags {
    On,
    Off,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Filter {
    pub field: String,
    #[serde(default = "default_op")]
    pub op: FilterOp,
    pub value: serde_json::Value,
}

fn default_op() -> FilterOp {
    FilterOp::Eq
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SortKey {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<Flag>,
    pub total: usize,
    pub page: usize,
    pub show: usize,
}

/// `ValidationError` per §7: an unknown field name in a filter or sort key is
/// malformed, not "no results".
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("unknown search field `{0}`")]
    UnknownField(String),
    #[error("`show` must not exceed {MAX_SHOW}")]
    ShowTooLarge,
}

fn field_str<'a>(flag: &'a Flag, field: &str) -> Result<&'a str, SearchError> {
    match field {
        "exploit" => Ok(flag.exploit.as_str()),
        "player" => Ok(flag.player.as_str()),
        "target" => Ok(flag.target.as_str()),
        _ => Err(SearchError::UnknownField(field.to_string())),
    }
}

fn matches_status(flag: &Flag, op: FilterOp, expected: FlagStatus) -> bool {
    match op {
        FilterOp::Eq => flag.status == expected,
        FilterOp::Ne => flag.status != expected,
        _ => false,
    }
}

fn matches_tick(flag: &Flag, op: FilterOp, expected: u64) -> bool {
    match op {
        FilterOp::Eq => flag.tick == expected,
        FilterOp::Ne => flag.tick != expected,
        FilterOp::Gt => flag.tick > expected,
        FilterOp::Gte => flag.tick >= expected,
        FilterOp::Lt => flag.tick < expected,
        FilterOp::Lte => flag.tick <= expected,
    }
}

fn matches_str(value: &str, op: FilterOp, expected: &str) -> bool {
    match op {
        FilterOp::Eq => value == expected,
        FilterOp::Ne => value != expected,
        FilterOp::Gt => value > expected,
        FilterOp::Gte => value >= expected,
        FilterOp::Lt => value < expected,
        FilterOp::Lte => value <= expected,
    }
}

fn apply_filter(flag: &Flag, filter: &Filter) -> Result<bool, SearchError> {
    match filter.field.as_str() {
        "status" => {
            let expected = filter
                .value
                .as_str()
                .and_then(|s| match s {
                    "queued" => Some(FlagStatus::Queued),
                    "accepted" => Some(FlagStatus::Accepted),
                    "rejected" => Some(FlagStatus::Rejected),
                    _ => None,
                })
                .ok_or_else(|| SearchError::UnknownField("status".to_string()))?;
            Ok(matches_status(flag, filter.op, expected))
        }
        "tick" => {
            let expected = filter
                .value
                .as_u64()
                .ok_or_else(|| SearchError::UnknownField("tick".to_string()))?;
            Ok(matches_tick(flag, filter.op, expected))
        }
        other => {
            let expected = filter.value.as_str().unwrap_or_default();
            Ok(matches_str(field_str(flag, other)?, filter.op, expected))
        }
    }
}

fn sort_key(flag: &Flag, field: &str) -> Result<String, SearchError> {
    match field {
        "exploit" => Ok(flag.exploit.clone()),
        "player" => Ok(flag.player.clone()),
        "target" => Ok(flag.target.clone()),
        "status" => Ok(format!("{:?}", flag.status)),
        "tick" => Ok(format!("{:020}", flag.tick)),
        other => Err(SearchError::UnknownField(other.to_string())),
    }
}

/// Runs a search over every stored flag: filter, sort, then paginate.
pub fn run_search(all: Vec<Flag>, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
    let show = request.show.unwrap_or(DEFAULT_SHOW);
    if show > MAX_SHOW {
        return Err(SearchError::ShowTooLarge);
    }
    let page = request.page.unwrap_or(0);

    let mut filtered = Vec::with_capacity(all.len());
    for flag in all {
        let hidden = matches!(request.hide_flags, Some(HideFlags::On));
        let mut keep = true;
        for filter in &request.query {
            if !apply_filter(&flag, filter)? {
                keep = false;
                break;
            }
        }
        if keep {
            filtered.push(if hidden { redact(flag) } else { flag });
        }
    }

    for sort in request.sort.iter().rev() {
        let mut err = None;
        filtered.sort_by(|a, b| {
            if err.is_some() {
                return std::cmp::Ordering::Equal;
            }
            let (ka, kb) = match (sort_key(a, &sort.field), sort_key(b, &sort.field)) {
                (Ok(ka), Ok(kb)) => (ka, kb),
                (Err(e), _) | (_, Err(e)) => {
                    err = Some(e);
                    return std::cmp::Ordering::Equal;
                }
            };
            let ordering = ka.cmp(&kb);
            if sort.direction == SortDirection::Desc {
                ordering.reverse()
            } else {
                ordering
            }
        });
        if let Some(e) = err {
            return Err(e);
        }
    }

    let total = filtered.len();
    let start = page.saturating_mul(show).min(total);
    let end = (start + show).min(total);

    Ok(SearchResponse {
        results: filtered[start..end].to_vec(),
        total,
        page,
        show,
    })
}

/// `hide_flags=on` masks the flag value itself while keeping every other
/// field searchable/sortable (useful for sharing a dashboard without leaking
/// live flags).
fn redact(mut flag: Flag) -> Flag {
    flag.value = "*".repeat(flag.value.len().min(8).max(1));
    flag
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn flag(value: &str, exploit: &str, player: &str, tick: u64, status: FlagStatus) -> Flag {
        Flag {
            value: value.into(),
            exploit: exploit.into(),
            player: player.into(),
            tick,
            target: "10.0.0.1".into(),
            timestamp: Utc::now(),
            status,
            response: None,
        }
    }

    #[test]
    fn filters_by_equality() {
        let flags = vec![
            flag("a", "e1", "alice", 0, FlagStatus::Queued),
            flag("b", "e2", "bob", 0, FlagStatus::Accepted),
        ];
        let request = SearchRequest {
            query: vec![Filter {
                field: "player".into(),
                op: FilterOp::Eq,
                value: serde_json::json!("alice"),
            }],
            page: None,
            show: None,
            sort: vec![],
            hide_flags: None,
        };
        let result = run_search(flags, &request).unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.results[0].value, "a");
    }

    #[test]
    fn filters_by_tick_range() {
        let flags = vec![
            flag("a", "e1", "alice", 0, FlagStatus::Queued),
            flag("b", "e1", "alice", 5, FlagStatus::Queued),
            flag("c", "e1", "alice", 10, FlagStatus::Queued),
        ];
        let request = SearchRequest {
            query: vec![Filter {
                field: "tick".into(),
                op: FilterOp::Gte,
                value: serde_json::json!(5),
            }],
            page: None,
            show: None,
            sort: vec![],
            hide_flags: None,
        };
        let result = run_search(flags, &request).unwrap();
        assert_eq!(result.total, 2);
    }

    #[test]
    fn rejects_show_above_max() {
        let request = SearchRequest {
            query: vec![],
            page: None,
            show: Some(500),
            sort: vec![],
            hide_flags: None,
        };
        assert!(matches!(run_search(vec![], &request), Err(SearchError::ShowTooLarge)));
    }

    #[test]
    fn hide_flags_redacts_value_but_keeps_other_fields() {
        let flags = vec![flag("supersecretflag", "e1", "alice", 0, FlagStatus::Queued)];
        let request = SearchRequest {
            query: vec![],
            page: None,
            show: None,
            sort: vec![],
            hide_flags: Some(HideFlags::On),
        };
        let result = run_search(flags, &request).unwrap();
        assert_ne!(result.results[0].value, "supersecretflag");
        assert_eq!(result.results[0].player, "alice");
    }

    #[test]
    fn sort_descending_by_tick() {
        let flags = vec![
            flag("a", "e1", "alice", 0, FlagStatus::Queued),
            flag("b", "e1", "alice", 5, FlagStatus::Queued),
        ];
        let request = SearchRequest {
            query: vec![],
            page: None,
            show: None,
            sort: vec![SortKey {
                field: "tick".into(),
                direction: SortDirection::Desc,
            }],
            hide_flags: None,
        };
        let result = run_search(flags, &request).unwrap();
        assert_eq!(result.results[0].value, "b");
    }
}
