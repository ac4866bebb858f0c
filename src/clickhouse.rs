use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::ClickHouseSettings;
use crate::store::{Row, StoreGateway};

/// Body of a `FORMAT JSONCompact` response; `meta` and statistics are ignored
#[derive(Debug, Deserialize)]
struct JsonCompactResponse {
    data: Vec<Row>,
}

/// Store gateway speaking the ClickHouse HTTP interface
#[derive(Clone)]
pub struct ClickHouseStore {
    client: Client,
    base_url: String,
    user: String,
    password: String,
    database: String,
    timeout: Duration,
}

impl ClickHouseStore {
    pub fn new(client: Client, settings: &ClickHouseSettings) -> Self {
        Self {
            client,
            base_url: settings.url.trim_end_matches('/').to_string(),
            user: settings.user.clone(),
            password: settings.password.clone(),
            database: settings.database.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }

    /// POST a statement and return the raw response body
    ///
    /// `query_param` carries the statement in the URL when the body holds data.
    async fn execute(&self, body: String, query_param: Option<&str>) -> Result<String> {
        let mut params = vec![("database", self.database.as_str())];
        if let Some(statement) = query_param {
            params.push(("query", statement));
        }

        let response = self
            .client
            .post(format!("{}/", self.base_url))
            .query(&params)
            .header("X-ClickHouse-User", &self.user)
            .header("X-ClickHouse-Key", &self.password)
            .timeout(self.timeout)
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed to send request to ClickHouse at {}", self.base_url))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read ClickHouse response body")?;

        if !status.is_success() {
            return Err(anyhow!("ClickHouse error {}: {}", status, text.trim()));
        }

        Ok(text)
    }
}

#[async_trait]
impl StoreGateway for ClickHouseStore {
    async fn exists(&self, table: &str) -> Result<bool> {
        let body = self.execute(format!("EXISTS TABLE {}", table), None).await?;
        Ok(body.trim() == "1")
    }

    async fn create_table(
        &self,
        name: &str,
        column_defs: &[String],
        engine_clauses: &[String],
    ) -> Result<()> {
        let sql = create_table_sql(name, column_defs, engine_clauses);
        info!("Creating ClickHouse table {}", name);
        debug!("{}", sql);
        self.execute(sql, None).await?;
        Ok(())
    }

    async fn insert(&self, table: &str, rows: Vec<Row>, column_names: &[String]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let statement = format!(
            "INSERT INTO {} ({}) FORMAT JSONCompactEachRow",
            table,
            column_names.join(", ")
        );
        let row_count = rows.len();
        let body = encode_each_row(&rows)?;

        self.execute(body, Some(&statement))
            .await
            .with_context(|| format!("Failed to insert {} rows into {}", row_count, table))?;

        debug!("Inserted {} rows into {}", row_count, table);
        Ok(())
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        let body = self.execute(format!("{} FORMAT JSONCompact", sql), None).await?;
        decode_json_compact(&body)
    }
}

fn create_table_sql(name: &str, column_defs: &[String], engine_clauses: &[String]) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({}) {}",
        name,
        column_defs.join(", "),
        engine_clauses.join(" ")
    )
}

/// One JSON array per line, as `JSONCompactEachRow` expects
fn encode_each_row(rows: &[Row]) -> Result<String> {
    let mut body = String::new();
    for row in rows {
        body.push_str(&serde_json::to_string(row).context("Failed to encode row")?);
        body.push('\n');
    }
    Ok(body)
}

fn decode_json_compact(body: &str) -> Result<Vec<Row>> {
    let response: JsonCompactResponse =
        serde_json::from_str(body).context("Failed to parse ClickHouse JSONCompact response")?;
    Ok(response.data)
}
