// ABOUTME: Cloud Spanner REST client implementing the dump collaborator traits
// ABOUTME: One session per dump, read-only snapshot transactions, streaming SQL

pub mod metadata;
pub mod stream;
pub mod value;

use crate::config::ConnectionSettings;
use crate::error::{DumpError, Result};
use crate::schema::TableDefinition;
use crate::source::{DdlSource, RowStream, SnapshotSource};
use crate::utils::retry_with_backoff;
use crate::value::Row;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::stream as futures_stream;
use futures::{StreamExt, TryStreamExt};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use value::ErrorEnvelope;

pub const DEFAULT_ENDPOINT: &str = "https://spanner.googleapis.com";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;
const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Which point in time the snapshot reads at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampBound {
    /// All data committed before the transaction began.
    Strong,
    /// Exactly the given commit timestamp.
    ReadTimestamp(DateTime<Utc>),
}

impl From<Option<DateTime<Utc>>> for TimestampBound {
    fn from(timestamp: Option<DateTime<Utc>>) -> Self {
        timestamp.map_or(TimestampBound::Strong, TimestampBound::ReadTimestamp)
    }
}

/// Request body for `beginTransaction`.
pub fn transaction_options(bound: TimestampBound) -> serde_json::Value {
    let read_only = match bound {
        TimestampBound::Strong => json!({"strong": true, "returnReadTimestamp": true}),
        TimestampBound::ReadTimestamp(ts) => json!({
            "readTimestamp": ts.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            "returnReadTimestamp": true,
        }),
    };
    json!({"options": {"readOnly": read_only}})
}

#[derive(Debug, Deserialize)]
struct DdlResponse {
    #[serde(default)]
    statements: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Session {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Transaction {
    id: String,
    #[serde(default)]
    read_timestamp: Option<String>,
}

/// Client for one database.
#[derive(Debug, Clone)]
pub struct SpannerClient {
    http: reqwest::Client,
    base_url: String,
    database_path: String,
    token: Option<String>,
}

impl SpannerClient {
    /// Build a client. Nothing is sent until the first request.
    ///
    /// With an emulator host the client talks plain HTTP without credentials.
    /// Otherwise an OAuth access token is required.
    pub fn new(settings: &ConnectionSettings) -> Result<Self> {
        let (base_url, token) = match settings.emulator_host.as_deref() {
            Some(host) if !host.trim().is_empty() => {
                let host = host.trim().trim_end_matches('/');
                let base = if host.starts_with("http://") || host.starts_with("https://") {
                    host.to_string()
                } else {
                    format!("http://{}", host)
                };
                tracing::info!("Using Spanner emulator at {}", base);
                (base, None)
            }
            _ => {
                let token = settings
                    .access_token
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| {
                        DumpError::Connection(
                            "an access token is required: pass --access-token or set \
                             SPANNER_ACCESS_TOKEN (e.g. from `gcloud auth print-access-token`)"
                                .to_string(),
                        )
                    })?;
                let base = settings
                    .endpoint
                    .as_deref()
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                    .unwrap_or(DEFAULT_ENDPOINT)
                    .trim_end_matches('/')
                    .to_string();
                (base, Some(token.to_string()))
            }
        };

        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("spanner-dump/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DumpError::Connection(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            database_path: settings.database_path(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn database_path(&self) -> &str {
        &self.database_path
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}/v1/{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(builder: RequestBuilder) -> Result<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let code = status.as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) => envelope.error.into_error(code),
            Err(_) => DumpError::Api {
                status: code,
                message: if body.trim().is_empty() {
                    status.canonical_reason().unwrap_or("no response body").to_string()
                } else {
                    body
                },
            },
        })
    }

    async fn send_json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T> {
        let response = Self::send(builder).await?;
        Ok(response.json().await?)
    }

    async fn create_session(&self) -> Result<Session> {
        let path = format!("{}/sessions", self.database_path);
        Self::send_json(self.request(Method::POST, &path).json(&json!({}))).await
    }

    async fn begin_transaction(&self, session: &str, bound: TimestampBound) -> Result<Transaction> {
        let path = format!("{}:beginTransaction", session);
        Self::send_json(
            self.request(Method::POST, &path)
                .json(&transaction_options(bound)),
        )
        .await
    }

    /// Open a session and a read-only transaction bound to `bound`.
    ///
    /// Transient failures are retried with exponential backoff.
    pub async fn begin_snapshot(&self, bound: TimestampBound) -> Result<SpannerSnapshot<'_>> {
        let session = retry_with_backoff(
            || self.create_session(),
            MAX_RETRIES,
            INITIAL_RETRY_DELAY,
            "Creating session",
        )
        .await?;
        tracing::debug!("Created session {}", session.name);

        let transaction = match retry_with_backoff(
            || self.begin_transaction(&session.name, bound),
            MAX_RETRIES,
            INITIAL_RETRY_DELAY,
            "Beginning read-only transaction",
        )
        .await
        {
            Ok(transaction) => transaction,
            Err(e) => {
                self.delete_session(&session.name).await;
                return Err(e);
            }
        };

        match &transaction.read_timestamp {
            Some(ts) => tracing::info!("Reading a consistent snapshot at {}", ts),
            None => tracing::info!("Reading a consistent snapshot"),
        }

        Ok(SpannerSnapshot {
            client: self,
            session: session.name,
            transaction_id: transaction.id,
            read_timestamp: transaction.read_timestamp,
        })
    }

    async fn delete_session(&self, session: &str) {
        if let Err(e) = Self::send(self.request(Method::DELETE, session)).await {
            tracing::warn!("Failed to delete session {}: {}", session, e);
        }
    }
}

#[async_trait]
impl DdlSource for SpannerClient {
    async fn list_ddl_statements(&self) -> Result<Vec<String>> {
        let path = format!("{}/ddl", self.database_path);
        let response: DdlResponse = Self::send_json(self.request(Method::GET, &path)).await?;
        Ok(response.statements)
    }
}

/// A read-only transaction on one session.
///
/// Call [`SpannerSnapshot::close`] when done; a snapshot that is only
/// dropped leaves its session to expire on the server.
pub struct SpannerSnapshot<'a> {
    client: &'a SpannerClient,
    session: String,
    transaction_id: String,
    read_timestamp: Option<String>,
}

impl<'a> SpannerSnapshot<'a> {
    /// Commit timestamp the snapshot reads at, as reported by the server.
    pub fn read_timestamp(&self) -> Option<&str> {
        self.read_timestamp.as_deref()
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        self.stream_rows(sql.to_string()).try_collect().await
    }

    /// Delete the session.
    pub async fn close(self) {
        self.client.delete_session(&self.session).await;
        tracing::debug!("Closed session {}", self.session);
    }
}

#[async_trait]
impl<'a> SnapshotSource for SpannerSnapshot<'a> {
    async fn list_table_definitions(&self) -> Result<Vec<TableDefinition>> {
        let tables = self.query(metadata::TABLES_QUERY).await?;
        let columns = self.query(metadata::COLUMNS_QUERY).await?;
        let primary_keys = self.query(metadata::PRIMARY_KEY_QUERY).await?;
        metadata::build_table_definitions(tables, columns, primary_keys)
    }

    fn stream_rows(&self, sql: String) -> RowStream<'_> {
        let path = format!("{}:executeStreamingSql", self.session);
        let request = self.client.request(Method::POST, &path).json(&json!({
            "sql": sql,
            "transaction": {"id": self.transaction_id},
            "requestOptions": {"priority": "PRIORITY_LOW"},
        }));

        futures_stream::once(async move {
            let response = SpannerClient::send(request).await?;
            Ok::<_, DumpError>(stream::rows_from_partial_result_sets(
                response.bytes_stream(),
            ))
        })
        .try_flatten()
        .boxed()
    }
}
