//! Inventory lookups against the CMDB, proxied through the Salt master.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::AuthError;
use crate::minion::AuthorityId;

/// Execution module function the master exposes for CMDB queries.
pub const QUERY_FUNCTION: &str = "servicenow.non_structured_query";

/// CMDB table holding registered servers.
pub const SERVER_CLASS: &str = "cmdb_ci_server";

/// One remote function call on the authority node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryRequest {
    pub target: String,
    pub function: String,
    pub args: Vec<String>,
}

impl InventoryRequest {
    /// Ask `authority` for server records whose name equals `key`.
    pub fn servers_named(authority: &AuthorityId, key: &str) -> Self {
        Self {
            target: authority.as_str().to_string(),
            function: QUERY_FUNCTION.to_string(),
            args: vec![SERVER_CLASS.to_string(), format!("name={key}")],
        }
    }
}

/// Transport that runs an [`InventoryRequest`] and returns the raw response.
///
/// The response is a mapping of responder id to that responder's return
/// value: a list of result-sets, each a mapping of CMDB field to value.
#[async_trait]
pub trait InventoryQuery: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn query(&self, request: &InventoryRequest) -> Result<Value, Self::Error>;
}

/// The record field that satisfied a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMatch {
    pub responder: String,
    pub field: String,
    pub value: String,
}

/// Scan a query response for a record naming `key`.
///
/// Walks responders, then result-sets, then fields, in response order. A
/// field qualifies when its name contains `name` and its value contains
/// `key`, both compared case-insensitively. The first qualifying field wins
/// and nothing after it is inspected, including malformed entries.
///
/// Values of fields whose name does not contain `name` are never inspected.
pub fn find_match(response: &Value, key: &str) -> Result<Option<RecordMatch>, AuthError> {
    let needle = key.to_lowercase();

    let responders = response
        .as_object()
        .ok_or_else(|| malformed("response", "a mapping of responders", response))?;

    for (responder, result) in responders {
        let sets = result
            .as_array()
            .ok_or_else(|| malformed(responder, "a list of records", result))?;

        for set in sets {
            let record = set
                .as_object()
                .ok_or_else(|| malformed(responder, "a record mapping", set))?;

            for (field, value) in record {
                if !field.contains("name") {
                    continue;
                }
                let text = value
                    .as_str()
                    .ok_or_else(|| malformed(field, "a string", value))?;
                if text.to_lowercase().contains(&needle) {
                    return Ok(Some(RecordMatch {
                        responder: responder.clone(),
                        field: field.clone(),
                        value: text.to_string(),
                    }));
                }
            }
        }
    }

    Ok(None)
}

fn malformed(at: &str, expected: &str, got: &Value) -> AuthError {
    AuthError::Malformed(format!("{at}: expected {expected}, got {}", kind(got)))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_targets_truncated_master() {
        let authority = AuthorityId::from_master_id("saltmaster_master").unwrap();
        let request = InventoryRequest::servers_named(&authority, "web01");

        assert_eq!(request.target, "saltmaster");
        assert_eq!(request.function, "servicenow.non_structured_query");
        assert_eq!(request.args, vec!["cmdb_ci_server", "name=web01"]);
    }

    #[test]
    fn case_insensitive_substring_match() {
        let response = json!({ "saltmaster": [{ "name": "WEB01-PROD" }] });

        let found = find_match(&response, "web01").unwrap().unwrap();
        assert_eq!(found.responder, "saltmaster");
        assert_eq!(found.field, "name");
        assert_eq!(found.value, "WEB01-PROD");
    }

    #[test]
    fn no_match_is_none() {
        let response = json!({ "saltmaster": [{ "name": "DB-SERVER-1" }] });
        assert!(find_match(&response, "web02").unwrap().is_none());
    }

    #[test]
    fn any_field_containing_name_qualifies() {
        let response = json!({
            "m": [{ "sys_id": "abc", "host_name": "app07.corp.local" }]
        });
        let found = find_match(&response, "app07").unwrap().unwrap();
        assert_eq!(found.field, "host_name");
    }

    #[test]
    fn value_match_in_other_field_ignored() {
        let response = json!({ "m": [{ "comments": "replaces web04", "name": "db09" }] });
        assert!(find_match(&response, "web04").unwrap().is_none());
    }

    #[test]
    fn non_string_values_outside_name_fields_are_skipped() {
        let response = json!({
            "m": [{ "cpu_count": 8, "install_status": null, "name": "web05" }]
        });
        assert!(find_match(&response, "web05").unwrap().is_some());
    }

    #[test]
    fn non_string_name_value_is_malformed() {
        let response = json!({ "m": [{ "name": null }] });
        assert!(matches!(
            find_match(&response, "web06"),
            Err(AuthError::Malformed(_))
        ));
    }

    #[test]
    fn first_match_wins_before_malformed_tail() {
        let response = json!({
            "m": [{ "name": "web08" }, "not a record", { "name": 12 }]
        });
        let found = find_match(&response, "web08").unwrap().unwrap();
        assert_eq!(found.value, "web08");
    }

    #[test]
    fn searches_every_result_set_and_responder() {
        let response = json!({
            "a": [{ "name": "db01" }, { "name": "db02" }],
            "b": [{ "name": "WEB09.corp.local" }]
        });
        let found = find_match(&response, "web09").unwrap().unwrap();
        assert_eq!(found.responder, "b");
    }

    #[test]
    fn string_return_is_malformed() {
        let response = json!({ "m": "'servicenow.non_structured_query' is not available." });
        let err = find_match(&response, "web10").unwrap_err();
        assert!(err.to_string().contains("expected a list of records, got string"));
    }

    #[test]
    fn non_mapping_response_is_malformed() {
        assert!(matches!(
            find_match(&json!([]), "web11"),
            Err(AuthError::Malformed(_))
        ));
    }

    #[test]
    fn empty_response_is_no_match() {
        assert!(find_match(&json!({}), "web12").unwrap().is_none());
    }
}
