/// Worker wire protocol
///
/// Requests and responses are JSON objects tagged by `type`:
///
/// ```text
/// -> {"type": "FILTER", "data": [...], "filters": [...]}
/// -> {"type": "SORT",   "data": [...], "sortConfig": {...}}
/// -> {"type": "GROUP",  "data": [...], "groups": [...], "expandedGroups": [...]}
/// <- {"type": "FILTER", "result": [...]}
/// <- {"type": "GROUP",  "result": null, "error": "..."}
/// ```
///
/// Rows cross the boundary by value. An optional `seq` field is only
/// written when requests are correlated by sequence number.

use crate::filter::FilterSpec;
use crate::group::GroupSpec;
use crate::row::{Aggregator, Row};
use crate::sort::SortSpec;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// The three offloadable pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageKind {
    Filter,
    Sort,
    Group,
}

impl StageKind {
    pub const PIPELINE: [StageKind; 3] = [StageKind::Filter, StageKind::Sort, StageKind::Group];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Filter => "FILTER",
            StageKind::Sort => "SORT",
            StageKind::Group => "GROUP",
        }
    }

    pub fn parse(name: &str) -> Option<StageKind> {
        StageKind::PIPELINE.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerRequest {
    Filter {
        data: Vec<Row>,
        #[serde(default)]
        filters: Vec<FilterSpec>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },
    Sort {
        data: Vec<Row>,
        #[serde(default, rename = "sortConfig")]
        sort_config: Option<SortSpec>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },
    Group {
        data: Vec<Row>,
        #[serde(default)]
        groups: Vec<GroupSpec>,
        #[serde(default, rename = "expandedGroups")]
        expanded_groups: Vec<String>,
        /// `(field, aggregator)` pairs computed on each header.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        aggregates: Vec<(String, Aggregator)>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },
}

impl WorkerRequest {
    pub fn kind(&self) -> StageKind {
        match self {
            WorkerRequest::Filter { .. } => StageKind::Filter,
            WorkerRequest::Sort { .. } => StageKind::Sort,
            WorkerRequest::Group { .. } => StageKind::Group,
        }
    }

    pub fn seq(&self) -> Option<u64> {
        match self {
            WorkerRequest::Filter { seq, .. }
            | WorkerRequest::Sort { seq, .. }
            | WorkerRequest::Group { seq, .. } => *seq,
        }
    }

    pub fn with_seq(mut self, next: Option<u64>) -> Self {
        match &mut self {
            WorkerRequest::Filter { seq, .. }
            | WorkerRequest::Sort { seq, .. }
            | WorkerRequest::Group { seq, .. } => *seq = next,
        }
        self
    }
}

/// Worker reply. `type` echoes the request's type verbatim, even when it was
/// not a known stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResponse {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub result: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl WorkerResponse {
    pub fn success(kind: impl Into<String>, result: JsonValue, seq: Option<u64>) -> Self {
        WorkerResponse {
            kind: kind.into(),
            result,
            error: None,
            seq,
        }
    }

    pub fn failure(kind: impl Into<String>, error: impl Into<String>, seq: Option<u64>) -> Self {
        WorkerResponse {
            kind: kind.into(),
            result: JsonValue::Null,
            error: Some(error.into()),
            seq,
        }
    }

    pub fn stage(&self) -> Option<StageKind> {
        StageKind::parse(&self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterOperator;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let request = WorkerRequest::Sort {
            data: vec![Row::new("1").with("sal", 100)],
            sort_config: Some(SortSpec::descending("sal")),
            seq: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            json!({
                "type": "SORT",
                "data": [{"id": "1", "sal": 100.0}],
                "sortConfig": {"field": "sal", "direction": "desc"}
            })
        );
    }

    #[test]
    fn test_group_request_from_wire() {
        let text = r#"{"type":"GROUP","data":[],"groups":[{"field":"dept","expanded":true}],"expandedGroups":["dept_A"]}"#;
        let request: WorkerRequest = serde_json::from_str(text).unwrap();
        assert_eq!(request.kind(), StageKind::Group);
        match request {
            WorkerRequest::Group { groups, expanded_groups, aggregates, seq, .. } => {
                assert_eq!(groups, vec![GroupSpec::new("dept")]);
                assert_eq!(expanded_groups, vec!["dept_A".to_string()]);
                assert!(aggregates.is_empty());
                assert_eq!(seq, None);
            }
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[test]
    fn test_optional_fields_default() {
        let request: WorkerRequest = serde_json::from_str(r#"{"type":"FILTER","data":[]}"#).unwrap();
        assert_eq!(
            request,
            WorkerRequest::Filter { data: vec![], filters: vec![], seq: None }
        );
    }

    #[test]
    fn test_seq_is_carried_when_set() {
        let request = WorkerRequest::Filter {
            data: vec![],
            filters: vec![FilterSpec::new("a", FilterOperator::Gt, 1)],
            seq: None,
        }
        .with_seq(Some(7));
        assert_eq!(request.seq(), Some(7));
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["seq"], 7);
    }

    #[test]
    fn test_response_shapes() {
        let ok = WorkerResponse::success("FILTER", json!([]), None);
        assert_eq!(serde_json::to_value(&ok).unwrap(), json!({"type": "FILTER", "result": []}));
        assert_eq!(ok.stage(), Some(StageKind::Filter));

        let err = WorkerResponse::failure("PIVOT", "boom", None);
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({"type": "PIVOT", "result": null, "error": "boom"})
        );
        assert_eq!(err.stage(), None);
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(StageKind::Group.to_string(), "GROUP");
        assert_eq!(StageKind::parse("SORT"), Some(StageKind::Sort));
        assert_eq!(StageKind::parse("sort"), None);
        assert_eq!(serde_json::to_value(StageKind::Filter).unwrap(), json!("FILTER"));
    }
}
