use crate::types::checkpoint::Checkpoint;
use crate::types::document::DocumentData;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

/// A query already prepared for a storage engine
///
/// Only top-level equality selectors are understood here. Planning richer
/// queries is the engine's business.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreparedQuery {
    #[serde(default)]
    pub selector: Map<String, Value>,
    #[serde(default)]
    pub sort: Vec<SortField>,
    #[serde(default)]
    pub skip: usize,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl PreparedQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Match every document, sorted ascending by `field`
    pub fn all_sorted_by(field: impl Into<String>) -> Self {
        Self::new().sort_by(field, SortDirection::Asc)
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: Value) -> Self {
        self.selector.insert(field.into(), value);
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push(SortField {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, doc: &DocumentData) -> bool {
        self.selector
            .iter()
            .all(|(field, expected)| doc.get(field) == Some(expected))
    }

    /// Filter, sort, skip and limit `docs`
    pub fn execute<I>(&self, docs: I) -> Vec<DocumentData>
    where
        I: IntoIterator<Item = DocumentData>,
    {
        let mut matching: Vec<DocumentData> =
            docs.into_iter().filter(|doc| self.matches(doc)).collect();

        if !self.sort.is_empty() {
            matching.sort_by(|a, b| {
                for sort in &self.sort {
                    let ord = compare_values(a.get(&sort.field), b.get(&sort.field));
                    let ord = match sort.direction {
                        SortDirection::Asc => ord,
                        SortDirection::Desc => ord.reverse(),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let limit = self.limit.unwrap_or(usize::MAX);
        matching.into_iter().skip(self.skip).take(limit).collect()
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

/// Total order over JSON scalars: missing/null < bool < number < string
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub documents: Vec<DocumentData>,
}

/// A page of documents changed after a checkpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangedDocuments {
    pub documents: Vec<DocumentData>,
    /// Position after the last returned document, or the input checkpoint
    /// when nothing changed
    pub checkpoint: Option<Checkpoint>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> DocumentData {
        DocumentData::from_value(value).unwrap()
    }

    #[test]
    fn test_selector_sort_skip_limit() {
        let docs = vec![
            doc(json!({ "id": "a", "age": 30, "team": "x" })),
            doc(json!({ "id": "b", "age": 20, "team": "x" })),
            doc(json!({ "id": "c", "age": 40, "team": "y" })),
            doc(json!({ "id": "d", "age": 10, "team": "x" })),
        ];

        let query = PreparedQuery::new()
            .where_eq("team", json!("x"))
            .sort_by("age", SortDirection::Desc)
            .skip(1)
            .limit(1);

        let result = query.execute(docs);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].get("id"), Some(&json!("b")));
    }

    #[test]
    fn test_compare_mixed_types() {
        assert_eq!(
            compare_values(None, Some(&json!(1))),
            Ordering::Less
        );
        assert_eq!(
            compare_values(Some(&json!("a")), Some(&json!(5))),
            Ordering::Greater
        );
        assert_eq!(
            compare_values(Some(&json!(1.5)), Some(&json!(2))),
            Ordering::Less
        );
    }
}
