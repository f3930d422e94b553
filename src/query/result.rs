//! Result processor (spec §4.F): projects server responses into a uniform
//! record structure.

use serde::Deserialize;
use serde_json::Value;

/// One column's description (spec §3 "Column descriptor"), keyed on the
/// wire under `metadata.columns[]` the way
/// `core/metadata_processor.py`'s `_create_column_description` reads it.
/// The wire carries a single `length` field that this projects into both
/// `display_size` and `internal_size`, matching that function's reuse of
/// `col_info.get("length")` for both.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(from = "WireColumn")]
pub struct ColumnMetadata {
    pub name: String,
    pub type_code: String,
    pub display_size: Option<i64>,
    pub internal_size: Option<i64>,
    pub precision: Option<i64>,
    pub scale: Option<i64>,
    pub nullable: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct WireColumn {
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    type_code: String,
    #[serde(default)]
    length: Option<i64>,
    #[serde(default)]
    precision: Option<i64>,
    #[serde(default)]
    scale: Option<i64>,
    #[serde(default = "default_nullable")]
    nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl From<WireColumn> for ColumnMetadata {
    fn from(wire: WireColumn) -> Self {
        ColumnMetadata {
            name: wire.name,
            type_code: wire.type_code,
            display_size: wire.length,
            internal_size: wire.length,
            precision: wire.precision,
            scale: wire.scale,
            nullable: wire.nullable,
        }
    }
}

/// `metadata` block of a successful response: column descriptors plus an
/// optional update count for DML statements.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct QueryMetadata {
    #[serde(default)]
    pub columns: Vec<ColumnMetadata>,
    #[serde(default)]
    pub update_count: Option<i64>,
}

/// The direct projection of a server response (spec §3 "QueryResult").
#[derive(Debug, Clone, Deserialize, Default)]
pub struct QueryResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub is_done: bool,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub metadata: Option<QueryMetadata>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub sql_state: Option<String>,
    #[serde(default)]
    pub sql_rc: Option<i32>,
}

impl QueryResult {
    /// Derived, not stored on the wire (spec §3 "`has_results` is derived").
    pub fn has_results(&self) -> bool {
        !self.data.is_empty()
    }

    /// `fetchone` projection (spec §4.F): the first row, or `None`.
    pub fn fetch_one(&self) -> Option<&Value> {
        self.data.first()
    }

    /// `fetchmany(size)` projection (spec §4.F): the first `size` rows,
    /// plus whether the page is exhausted — true only when the server
    /// reports exhaustion AND nothing was withheld by the trim.
    pub fn fetch_many(&self, size: usize) -> (Vec<Value>, bool) {
        let withheld = size < self.data.len();
        let data = self.data.iter().take(size).cloned().collect();
        (data, self.is_done && !withheld)
    }

    /// Prefers `metadata.columns`; falls back to the keys of the first row
    /// when running in named (non-terse) mode; otherwise empty (spec §4.F
    /// `extract_column_names`).
    pub fn extract_column_names(&self) -> Vec<String> {
        if let Some(metadata) = &self.metadata {
            if !metadata.columns.is_empty() {
                return metadata.columns.iter().map(|c| c.name.clone()).collect();
            }
        }
        match self.data.first() {
            Some(Value::Object(map)) => map.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result_with(data: Vec<Value>, is_done: bool) -> QueryResult {
        QueryResult { success: true, data, is_done, ..Default::default() }
    }

    #[test]
    fn has_results_reflects_row_count() {
        assert!(!result_with(vec![], true).has_results());
        assert!(result_with(vec![json!({"a": 1})], true).has_results());
    }

    #[test]
    fn fetch_one_returns_first_row() {
        let result = result_with(vec![json!({"a": 1}), json!({"a": 2})], false);
        assert_eq!(result.fetch_one(), Some(&json!({"a": 1})));
    }

    #[test]
    fn fetch_many_marks_done_only_when_nothing_withheld() {
        let result = result_with(vec![json!(1), json!(2), json!(3)], true);
        let (page, done) = result.fetch_many(2);
        assert_eq!(page, vec![json!(1), json!(2)]);
        assert!(!done, "two of three rows trimmed off, so not actually done yet");

        let (page, done) = result.fetch_many(10);
        assert_eq!(page.len(), 3);
        assert!(done);
    }

    #[test]
    fn extract_column_names_prefers_metadata() {
        let mut result = result_with(vec![json!({"A": 1})], true);
        result.metadata = Some(QueryMetadata {
            columns: vec![ColumnMetadata {
                name: "ID".to_string(),
                type_code: "INTEGER".to_string(),
                display_size: None,
                internal_size: None,
                precision: None,
                scale: None,
                nullable: true,
            }],
            update_count: None,
        });
        assert_eq!(result.extract_column_names(), vec!["ID".to_string()]);
    }

    #[test]
    fn extract_column_names_falls_back_to_row_keys() {
        let result = result_with(vec![json!({"A": 1, "B": 2})], true);
        let mut names = result.extract_column_names();
        names.sort();
        assert_eq!(names, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn extract_column_names_empty_for_terse_rows_without_metadata() {
        let result = result_with(vec![json!([1, 2])], true);
        assert!(result.extract_column_names().is_empty());
    }
}
