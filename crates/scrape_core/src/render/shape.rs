use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Scalar,
    ScalarList,
    RecordList,
    Record,
}

/// A result field classified by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldShape {
    Scalar(Value),
    ScalarList(Vec<Value>),
    /// Rows are expected to be objects; columns come from the first row.
    RecordList {
        columns: Vec<String>,
        rows: Vec<Value>,
    },
    Record(Map<String, Value>),
}

impl FieldShape {
    /// Arrays are classified by their first element; an empty array is an
    /// empty scalar list.
    pub fn classify(value: &Value) -> Self {
        match value {
            Value::Array(items) => match items.first() {
                Some(Value::Object(first)) => FieldShape::RecordList {
                    columns: first.keys().cloned().collect(),
                    rows: items.clone(),
                },
                _ => FieldShape::ScalarList(items.clone()),
            },
            Value::Object(map) => FieldShape::Record(map.clone()),
            other => FieldShape::Scalar(other.clone()),
        }
    }

    pub fn kind(&self) -> ShapeKind {
        match self {
            FieldShape::Scalar(_) => ShapeKind::Scalar,
            FieldShape::ScalarList(_) => ShapeKind::ScalarList,
            FieldShape::RecordList { .. } => ShapeKind::RecordList,
            FieldShape::Record(_) => ShapeKind::Record,
        }
    }
}

/// Text used both for display and for filtering.
pub fn string_form(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

pub fn is_link(text: &str) -> bool {
    text.starts_with("http://") || text.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_each_shape() {
        assert_eq!(FieldShape::classify(&json!("x")).kind(), ShapeKind::Scalar);
        assert_eq!(FieldShape::classify(&json!(3)).kind(), ShapeKind::Scalar);
        assert_eq!(FieldShape::classify(&json!(["a"])).kind(), ShapeKind::ScalarList);
        assert_eq!(FieldShape::classify(&json!([])).kind(), ShapeKind::ScalarList);
        assert_eq!(FieldShape::classify(&json!({"a": 1})).kind(), ShapeKind::Record);

        match FieldShape::classify(&json!([{"text": "t", "href": "h"}, {"text": "u"}])) {
            FieldShape::RecordList { columns, rows } => {
                assert_eq!(columns, vec!["text", "href"]);
                assert_eq!(rows.len(), 2);
            }
            other => panic!("unexpected shape {other:?}"),
        }
    }

    #[test]
    fn string_form_and_links() {
        assert_eq!(string_form(&Value::Null), "");
        assert_eq!(string_form(&json!("abc")), "abc");
        assert_eq!(string_form(&json!(1.5)), "1.5");
        assert_eq!(string_form(&json!(true)), "true");
        assert!(is_link("https://example.com/a"));
        assert!(is_link("http://example.com"));
        assert!(!is_link("httpx://example.com"));
        assert!(!is_link("see https://example.com"));
    }
}
