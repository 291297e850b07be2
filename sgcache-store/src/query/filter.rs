//! The filter tree shape accepted in a read request.
//!
//! The upstream JSON-RPC API has historically accepted two shapes for
//! the same thing: a flat list of 3-tuples (`[path, relation, values]`,
//! implicit AND), and a `{filter_operator, filters}` tree supporting
//! nested `all`/`any` grouping. Both are accepted here and normalised
//! into [`Filter`].

use serde::Deserialize;
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOp {
    All,
    Any,
}

#[derive(Debug, Clone)]
pub struct Condition {
    pub path: String,
    pub relation: String,
    pub values: Vec<JsonValue>,
}

#[derive(Debug, Clone)]
pub enum Filter {
    Condition(Condition),
    Group {
        operator: LogicalOp,
        filters: Vec<Filter>,
    },
}

impl Filter {
    /// Parses either the flat legacy array form or the nested
    /// `filter_operator`/`filters` tree form.
    pub fn parse(value: &JsonValue) -> Option<Filter> {
        if let Some(arr) = value.as_array() {
            let conditions: Vec<Filter> = arr
                .iter()
                .filter_map(Filter::parse_condition_tuple)
                .collect();
            if conditions.is_empty() && !arr.is_empty() {
                return None;
            }
            return Some(Filter::Group {
                operator: LogicalOp::All,
                filters: conditions,
            });
        }

        if let Some(obj) = value.as_object() {
            let operator = obj
                .get("filter_operator")
                .and_then(|v| v.as_str())
                .map(|s| {
                    if s.eq_ignore_ascii_case("any") {
                        LogicalOp::Any
                    } else {
                        LogicalOp::All
                    }
                })
                .unwrap_or(LogicalOp::All);
            let filters = obj
                .get("filters")
                .and_then(|v| v.as_array())
                .map(|arr| arr.iter().filter_map(Filter::parse).collect())
                .unwrap_or_default();
            return Some(Filter::Group { operator, filters });
        }

        None
    }

    fn parse_condition_tuple(value: &JsonValue) -> Option<Filter> {
        let tuple = value.as_array()?;
        if tuple.len() < 2 {
            return None;
        }
        let path = tuple[0].as_str()?.to_string();
        let relation = tuple[1].as_str()?.to_string();
        let values = if tuple.len() > 2 {
            match &tuple[2] {
                JsonValue::Array(vals) => vals.clone(),
                other => vec![other.clone()],
            }
        } else {
            Vec::new()
        };
        Some(Filter::Condition(Condition {
            path,
            relation,
            values,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_array_form_is_implicit_and() {
        let raw = serde_json::json!([["code", "is", "sh010"], ["sg_status_list", "is", "ip"]]);
        let filter = Filter::parse(&raw).unwrap();
        match filter {
            Filter::Group { operator, filters } => {
                assert_eq!(operator, LogicalOp::All);
                assert_eq!(filters.len(), 2);
            }
            _ => panic!("expected a group"),
        }
    }

    #[test]
    fn nested_tree_form_parses_operator() {
        let raw = serde_json::json!({
            "filter_operator": "any",
            "filters": [["code", "is", "sh010"], ["code", "is", "sh020"]],
        });
        let filter = Filter::parse(&raw).unwrap();
        match filter {
            Filter::Group { operator, filters } => {
                assert_eq!(operator, LogicalOp::Any);
                assert_eq!(filters.len(), 2);
            }
            _ => panic!("expected a group"),
        }
    }
}
