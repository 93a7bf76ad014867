/// A single-row insert statement with its bound row values.
///
/// The statement text never embeds values: `sql` takes the row as one JSON
/// parameter (`$1`) whose keys are `columns`.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertFragment {
    sql: String,
    columns: Vec<String>,
    values: serde_json::Map<String, serde_json::Value>,
}

impl InsertFragment {
    pub fn new(
        sql: String,
        columns: Vec<String>,
        values: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            sql,
            columns,
            values,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.values
    }
}
