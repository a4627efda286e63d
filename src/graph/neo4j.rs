//! Neo4j adapter over the HTTP transactional endpoint.
//!
//! Each template is sent as a single Cypher statement to
//! `POST {url}/db/{database}/tx/commit`. The partition key and all string
//! values travel in the `parameters` object; only the range-checked hop
//! count is rendered into the statement text.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;

use crate::error::GraphError;

use super::{GraphResult, GraphStore, QueryParams, QueryTemplate, Record};

/// Connection settings for a Neo4j server.
#[derive(Debug, Clone)]
pub struct Neo4jConfig {
    /// Base URL of the HTTP API, e.g. `http://localhost:7474`.
    pub url: String,
    pub database: String,
    pub user: String,
    pub password: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:7474".into(),
            database: "neo4j".into(),
            user: "neo4j".into(),
            password: String::new(),
            timeout_secs: 30,
        }
    }
}

/// Graph store backed by a Neo4j server.
pub struct Neo4jHttpStore {
    config: Neo4jConfig,
    agent: ureq::Agent,
}

impl Neo4jHttpStore {
    pub fn new(config: Neo4jConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build();
        Self { config, agent }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/db/{}/tx/commit",
            self.config.url.trim_end_matches('/'),
            self.config.database
        )
    }

    fn auth_header(&self) -> String {
        format!(
            "Basic {}",
            STANDARD.encode(format!("{}:{}", self.config.user, self.config.password))
        )
    }
}

/// Build the transactional request body for one statement.
pub(crate) fn statement_body(template: QueryTemplate, params: &QueryParams) -> GraphResult<Value> {
    let hops = if template.is_bounded() {
        params.hops(template)?
    } else {
        1
    };
    let statement = template.cypher(hops)?;
    Ok(serde_json::json!({
        "statements": [{
            "statement": statement,
            "parameters": params.to_json(),
        }]
    }))
}

/// Turn a transactional response into records keyed by column name.
pub(crate) fn parse_response(body: &Value) -> GraphResult<Vec<Record>> {
    if let Some(errors) = body["errors"].as_array() {
        if !errors.is_empty() {
            let message = errors
                .iter()
                .map(|e| {
                    format!(
                        "{}: {}",
                        e["code"].as_str().unwrap_or("unknown"),
                        e["message"].as_str().unwrap_or("")
                    )
                })
                .collect::<Vec<_>>()
                .join("; ");
            return Err(GraphError::QueryFailed { message });
        }
    }

    let Some(result) = body["results"].as_array().and_then(|r| r.first()) else {
        return Ok(Vec::new());
    };
    let columns: Vec<String> = result["columns"]
        .as_array()
        .map(|cols| {
            cols.iter()
                .filter_map(|c| c.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let rows = result["data"].as_array().cloned().unwrap_or_default();
    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let values = row["row"].as_array()?.clone();
            Some(columns.iter().cloned().zip(values).collect::<Record>())
        })
        .collect())
}

impl GraphStore for Neo4jHttpStore {
    fn run_query(&self, template: QueryTemplate, params: &QueryParams) -> GraphResult<Vec<Record>> {
        let body = statement_body(template, params)?;
        let body_str = serde_json::to_string(&body).map_err(|e| GraphError::RequestFailed {
            message: format!("JSON serialize error: {e}"),
        })?;

        let resp = self
            .agent
            .post(&self.endpoint())
            .set("Content-Type", "application/json")
            .set("Accept", "application/json")
            .set("Authorization", &self.auth_header())
            .send_string(&body_str)
            .map_err(|e: ureq::Error| GraphError::RequestFailed {
                message: e.to_string(),
            })?;

        let resp_str = resp.into_string().map_err(|e| GraphError::RequestFailed {
            message: e.to_string(),
        })?;
        let json: Value = serde_json::from_str(&resp_str).map_err(|e| GraphError::RequestFailed {
            message: format!("invalid JSON from server: {e}"),
        })?;

        let records = parse_response(&json)?;
        tracing::debug!(
            template = %template,
            partition = %params.partition(),
            rows = records.len(),
            "neo4j query"
        );
        Ok(records)
    }
}

impl std::fmt::Debug for Neo4jHttpStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Neo4jHttpStore")
            .field("url", &self.config.url)
            .field("database", &self.config.database)
            .finish()
    }
}
