//! PostgREST-backed implementation of [`RemoteBackend`].
//!
//! Talks to a Supabase-style stack: `/rest/v1/{table}` for rows, with the
//! project API key sent both as `apikey` and as a bearer token. All write
//! calls ask for `return=minimal`; the pull path re-reads whole tables
//! anyway, so response bodies would only be discarded.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;

use duka_core::{Collection, RecordId};

use crate::backend::RemoteBackend;
use crate::error::{RemoteError, RemoteResult};

// Data calls are abandoned on expiry and ride the next cycle, so
// budgets stay short.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Reachability is polled often and must fail fast when the network is
/// down, so it gets a much tighter budget than data calls.
const REACHABLE_TIMEOUT: Duration = Duration::from_secs(1);

/// HTTP client for one PostgREST project.
#[derive(Debug, Clone)]
pub struct PostgrestClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl PostgrestClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> RemoteResult<Self> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| RemoteError::Network(err.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn table_url(&self, collection: Collection) -> String {
        format!("{}/rest/v1/{}", self.base_url, collection.as_table())
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }
}

#[async_trait]
impl RemoteBackend for PostgrestClient {
    async fn select_all(&self, collection: Collection) -> RemoteResult<Vec<Value>> {
        let url = format!("{}?select=*", self.table_url(collection));
        let response = self.authed(self.http.get(&url)).send().await.map_err(classify)?;

        check(response)
            .await?
            .json::<Vec<Value>>()
            .await
            .map_err(|err| RemoteError::Parse(err.to_string()))
    }

    async fn insert(&self, collection: Collection, row: &Value) -> RemoteResult<()> {
        let url = self.table_url(collection);
        let response = self
            .authed(self.http.post(&url))
            // merge-duplicates makes a replayed insert an update of the
            // same row instead of a duplicate-key error.
            .header("Prefer", "return=minimal,resolution=merge-duplicates")
            .json(row)
            .send()
            .await
            .map_err(classify)?;

        check(response).await?;
        Ok(())
    }

    async fn update(&self, collection: Collection, id: &RecordId, row: &Value) -> RemoteResult<()> {
        let url = format!("{}?id=eq.{}", self.table_url(collection), id);
        let response = self
            .authed(self.http.patch(&url))
            .header("Prefer", "return=minimal")
            .json(row)
            .send()
            .await
            .map_err(classify)?;

        check(response).await?;
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &RecordId) -> RemoteResult<()> {
        let url = format!("{}?id=eq.{}", self.table_url(collection), id);
        let response = self.authed(self.http.delete(&url)).send().await.map_err(classify)?;

        check(response).await?;
        Ok(())
    }

    async fn delete_many(&self, collection: Collection, ids: &[RecordId]) -> RemoteResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let joined: Vec<&str> = ids.iter().map(|id| id.as_str()).collect();
        let url = format!(
            "{}?id=in.({})",
            self.table_url(collection),
            joined.join(",")
        );
        let response = self.authed(self.http.delete(&url)).send().await.map_err(classify)?;

        check(response).await?;
        Ok(())
    }

    async fn probe(&self, collection: Collection) -> RemoteResult<()> {
        let url = format!("{}?select=id&limit=1", self.table_url(collection));
        let response = self.authed(self.http.get(&url)).send().await.map_err(classify)?;

        check(response).await?;
        Ok(())
    }

    async fn reachable(&self) -> bool {
        let url = format!("{}/rest/v1/", self.base_url);
        let result = self
            .authed(self.http.head(&url))
            .timeout(REACHABLE_TIMEOUT)
            .send()
            .await;

        // Any response at all means the backend answers; even a 401
        // proves the network path works.
        result.is_ok()
    }
}

pub(crate) fn classify(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Network(err.to_string())
    }
}

/// Turn a non-success response into the matching error.
pub(crate) async fn check(response: Response) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    if is_relation_not_found(&message) {
        return Err(RemoteError::RelationNotFound);
    }
    Err(RemoteError::Api(status.as_u16(), message))
}

/// Whether an error body says the table itself is missing.
///
/// PostgREST reports this as Postgres error `42P01` when it reaches the
/// database, or as `PGRST205` when the table is absent from its schema
/// cache. Both mean the backend is not provisioned for us yet.
fn is_relation_not_found(body: &str) -> bool {
    body.contains("42P01")
        || body.contains("PGRST205")
        || body.contains("does not exist")
        || body.contains("Could not find the table")
}
