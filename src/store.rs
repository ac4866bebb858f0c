use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// One result or insert row, values in column order
pub type Row = Vec<Value>;

/// Trait for the persistent columnar store behind the state tables
///
/// Implementations only move rows; they know nothing about states. Every
/// failure is an opaque `anyhow::Error` that query callers surface as an
/// upstream error.
///
/// # Example
///
/// ```rust,ignore
/// let store = ClickHouseStore::new(client, settings);
/// if !store.exists("state").await? {
///     store.create_table("state", &columns, &["ENGINE MergeTree".into()]).await?;
/// }
/// let rows = store.query("SELECT COUNT(*) FROM state").await?;
/// ```
#[async_trait]
pub trait StoreGateway: Send + Sync {
    /// Whether a table with this name exists
    async fn exists(&self, table: &str) -> Result<bool>;

    /// Create a table from `name type` column definitions and engine clauses
    async fn create_table(
        &self,
        name: &str,
        column_defs: &[String],
        engine_clauses: &[String],
    ) -> Result<()>;

    /// Append rows whose values follow `column_names` order
    async fn insert(&self, table: &str, rows: Vec<Row>, column_names: &[String]) -> Result<()>;

    /// Run a SELECT and return its rows in the selected column order
    async fn query(&self, sql: &str) -> Result<Vec<Row>>;
}

/// Width of a `FixedString(N)` column type, nullable or not
pub fn fixed_string_width(column_type: &str) -> Option<usize> {
    let inner = column_type
        .strip_prefix("Nullable(")
        .and_then(|t| t.strip_suffix(')'))
        .unwrap_or(column_type);
    inner
        .strip_prefix("FixedString(")?
        .strip_suffix(')')?
        .parse()
        .ok()
}

/// First string value longer than its `FixedString` column allows
///
/// `columns` are `(name, type)` pairs in row order. Returns the column name,
/// its width and the offending length in bytes. The store rejects a whole
/// insert when one such value is present.
pub fn oversize_value<'a>(
    columns: &[(&'a str, &str)],
    row: &[Value],
) -> Option<(&'a str, usize, usize)> {
    columns
        .iter()
        .zip(row)
        .find_map(|((name, column_type), value)| {
            let width = fixed_string_width(column_type)?;
            let len = value.as_str()?.len();
            (len > width).then_some((*name, width, len))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fixed_string_width() {
        assert_eq!(fixed_string_width("FixedString(8)"), Some(8));
        assert_eq!(fixed_string_width("Nullable(FixedString(10))"), Some(10));
        assert_eq!(fixed_string_width("Nullable(String)"), None);
        assert_eq!(fixed_string_width("DateTime('UTC')"), None);
    }

    #[test]
    fn test_oversize_value() {
        let columns = [
            ("code", "FixedString(3)"),
            ("name", "String"),
            ("hub", "Nullable(FixedString(4))"),
        ];
        let fits = vec![json!("KLM"), json!("A very long airline name"), json!(null)];
        assert_eq!(oversize_value(&columns, &fits), None);

        let too_long = vec![json!("KL"), json!("x"), json!("EHAMX")];
        assert_eq!(oversize_value(&columns, &too_long), Some(("hub", 4, 5)));
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use anyhow::anyhow;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// In-memory store that records every call and replays canned query results
    #[derive(Default)]
    pub struct RecordingStore {
        pub tables: Mutex<Vec<String>>,
        pub created: Mutex<Vec<(String, Vec<String>, Vec<String>)>>,
        pub inserts: Mutex<Vec<(String, Vec<Row>, Vec<String>)>>,
        pub queries: Mutex<Vec<String>>,
        pub responses: Mutex<VecDeque<Result<Vec<Row>, String>>>,
        pub fail_inserts: Mutex<bool>,
    }

    impl RecordingStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue the rows returned by the next `query` call
        pub fn push_response(&self, rows: Vec<Row>) {
            self.responses.lock().unwrap().push_back(Ok(rows));
        }

        /// Queue a failure for the next `query` call
        pub fn push_error(&self, message: &str) {
            self.responses
                .lock()
                .unwrap()
                .push_back(Err(message.to_string()));
        }

        pub fn query_count(&self) -> usize {
            self.queries.lock().unwrap().len()
        }

        pub fn last_query(&self) -> Option<String> {
            self.queries.lock().unwrap().last().cloned()
        }

        pub fn insert_count(&self) -> usize {
            self.inserts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl StoreGateway for RecordingStore {
        async fn exists(&self, table: &str) -> Result<bool> {
            Ok(self.tables.lock().unwrap().iter().any(|t| t == table))
        }

        async fn create_table(
            &self,
            name: &str,
            column_defs: &[String],
            engine_clauses: &[String],
        ) -> Result<()> {
            self.tables.lock().unwrap().push(name.to_string());
            self.created.lock().unwrap().push((
                name.to_string(),
                column_defs.to_vec(),
                engine_clauses.to_vec(),
            ));
            Ok(())
        }

        async fn insert(&self, table: &str, rows: Vec<Row>, column_names: &[String]) -> Result<()> {
            if *self.fail_inserts.lock().unwrap() {
                return Err(anyhow!("insert into {} refused", table));
            }
            self.inserts
                .lock()
                .unwrap()
                .push((table.to_string(), rows, column_names.to_vec()));
            Ok(())
        }

        async fn query(&self, sql: &str) -> Result<Vec<Row>> {
            self.queries.lock().unwrap().push(sql.to_string());
            match self.responses.lock().unwrap().pop_front() {
                Some(Ok(rows)) => Ok(rows),
                Some(Err(message)) => Err(anyhow!(message)),
                None => Ok(Vec::new()),
            }
        }
    }
}
