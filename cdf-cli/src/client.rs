#![doc = "CDF backend for the CLI: implements the core `FilesBackend` contract against the Cognite Data Fusion REST API."]
//
//! # CDF client (CLI <-> Core)
//!
//! This module wires the [`FilesBackend`] trait from `cdf-cli-core` to the
//! CDF API v1 over `reqwest`. The core crate never sees HTTP; it only sees
//! the trait.
//!
//! ## Client Usage
//!
//! - Construct [`CdfClient`] from fully resolved [`ClientCredentials`]
//!   (see `cdf_cli_core::credentials`). Construction does no network I/O.
//! - The first request fetches an OAuth2 client-credentials token from Azure
//!   AD; it is cached until shortly before it expires.
//! - All transport failures and non-2xx responses become
//!   [`CdfError::Transport`].

use std::time::{Duration, Instant};

use async_trait::async_trait;
use cdf_cli_core::contract::{
    BatchOutcome, DataSet, FailedUpload, FileFilter, FileIdentity, FileMetadata, FileRecord,
    FileUnit, FilesBackend,
};
use cdf_cli_core::credentials::ClientCredentials;
use cdf_cli_core::CdfError;
use futures::stream::{self, StreamExt};
use futures::Future;
use reqwest::{header, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;

/// Maximum number of items per delete request accepted by the API.
const DELETE_CHUNK_SIZE: usize = 1000;
const LIST_PAGE_LIMIT: u32 = 1000;
/// Tokens are refreshed this long before their reported expiry.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);
/// Lifetime assumed when the reported expiry cannot be represented.
const FALLBACK_TOKEN_LIFETIME: Duration = Duration::from_secs(300);
/// Upper bound on concurrent file uploads within one batch.
const UPLOAD_CONCURRENCY: usize = 8;

struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedFile {
    #[serde(default)]
    upload_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemsPage<T> {
    items: Vec<T>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteBody<'a> {
    items: &'a [FileIdentity],
    ignore_unknown_ids: bool,
}

pub struct CdfClient {
    http: reqwest::Client,
    credentials: ClientCredentials,
    token: Mutex<Option<AccessToken>>,
}

impl CdfClient {
    pub fn new(credentials: ClientCredentials) -> Result<Self, CdfError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|e| CdfError::Configuration(format!("failed to build HTTP client: {e}")))?;
        tracing::info!(
            project = %credentials.project,
            host = %credentials.host,
            "Initialized CdfClient"
        );
        Ok(Self {
            http,
            credentials,
            token: Mutex::new(None),
        })
    }

    fn host(&self) -> &str {
        self.credentials.host.trim_end_matches('/')
    }

    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/api/v1/projects/{}/{}",
            self.host(),
            self.credentials.project,
            path
        )
    }

    fn token_url(&self) -> String {
        format!(
            "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
            self.credentials.tenant_id
        )
    }

    async fn access_token(&self) -> Result<String, CdfError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        tracing::debug!(tenant_id = %self.credentials.tenant_id, "Requesting access token");
        let scope = format!("{}/.default", self.host());
        let res = self
            .http
            .post(self.token_url())
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("scope", scope.as_str()),
            ])
            .send()
            .await
            .map_err(|e| CdfError::Transport(format!("token request failed before response: {e}")))?;
        let token: TokenResponse = decode(ensure_success(res, "token").await?, "token").await?;

        *cached = Some(AccessToken {
            value: token.access_token.clone(),
            expires_at: token_expiry(Instant::now(), token.expires_in),
        });
        tracing::info!(expires_in = token.expires_in, "Acquired access token");
        Ok(token.access_token)
    }

    async fn post<B, R>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: &B,
        what: &str,
    ) -> Result<R, CdfError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let token = self.access_token().await?;
        let res = self
            .http
            .post(self.api_url(path))
            .query(query)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| CdfError::Transport(format!("{what} request failed before response: {e}")))?;
        decode(ensure_success(res, what).await?, what).await
    }

    async fn upload_one(&self, unit: FileUnit) -> Result<FileMetadata, FailedUpload> {
        let external_id = unit.metadata.external_id.clone();
        let failed = |reason: String| FailedUpload {
            external_id: external_id.clone(),
            reason,
        };

        let created: CreatedFile = self
            .post("files", &[("overwrite", "true")], &unit.metadata, "create file")
            .await
            .map_err(|e| failed(e.to_string()))?;

        if let Some(binary) = unit.binary {
            let upload_url = created
                .upload_url
                .ok_or_else(|| failed("create file response carried no upload URL".into()))?;
            let res = self
                .http
                .put(upload_url)
                .header(header::CONTENT_TYPE, "application/octet-stream")
                .body(binary)
                .send()
                .await
                .map_err(|e| failed(format!("file content upload failed before response: {e}")))?;
            ensure_success(res, "file content upload")
                .await
                .map_err(|e| failed(e.to_string()))?;
        }

        tracing::debug!(external_id = %unit.metadata.external_id, "Uploaded file");
        Ok(unit.metadata)
    }
}

#[async_trait]
impl FilesBackend for CdfClient {
    async fn upload_files(&self, batch: Vec<FileUnit>) -> Result<BatchOutcome, CdfError> {
        tracing::info!(batch_size = batch.len(), "Uploading file batch");
        // Fail the whole batch up front when no token can be obtained.
        self.access_token().await?;

        let results =
            run_bounded(batch, UPLOAD_CONCURRENCY, |unit| self.upload_one(unit)).await;
        let mut outcome = BatchOutcome::default();
        for result in results {
            match result {
                Ok(metadata) => outcome.uploaded.push(metadata),
                Err(failed) => {
                    tracing::error!(
                        external_id = %failed.external_id,
                        reason = %failed.reason,
                        "API error uploading file"
                    );
                    outcome.failed.push(failed);
                }
            }
        }
        Ok(outcome)
    }

    async fn delete_files(&self, items: Vec<FileIdentity>) -> Result<usize, CdfError> {
        let mut deleted = 0;
        for chunk in items.chunks(DELETE_CHUNK_SIZE) {
            tracing::info!(count = chunk.len(), "Deleting files");
            let body = DeleteBody {
                items: chunk,
                ignore_unknown_ids: true,
            };
            let _: Value = self.post("files/delete", &[], &body, "delete files").await?;
            deleted += chunk.len();
        }
        Ok(deleted)
    }

    async fn list_files(&self, filter: FileFilter) -> Result<Vec<FileRecord>, CdfError> {
        let filter = filter_body(&filter);
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut body = json!({ "filter": &filter, "limit": LIST_PAGE_LIMIT });
            if let Some(cursor) = &cursor {
                body["cursor"] = json!(cursor);
            }
            let page: ItemsPage<FileRecord> =
                self.post("files/list", &[], &body, "list files").await?;
            tracing::debug!(page_size = page.items.len(), "Fetched page of files");
            records.extend(page.items);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        tracing::info!(count = records.len(), "Listed files matching filter");
        Ok(records)
    }

    async fn retrieve_data_sets(
        &self,
        external_ids: Vec<String>,
    ) -> Result<Vec<DataSet>, CdfError> {
        let items: Vec<FileIdentity> = external_ids
            .into_iter()
            .map(FileIdentity::ExternalId)
            .collect();
        let body = json!({ "items": items, "ignoreUnknownIds": true });
        let page: ItemsPage<DataSet> = self
            .post("datasets/byids", &[], &body, "retrieve data sets")
            .await?;
        Ok(page.items)
    }
}

/// Build the API filter object. Field pairs become top-level keys and
/// metadata pairs go under `metadata`. `uploaded` is sent as a boolean.
fn filter_body(filter: &FileFilter) -> Value {
    let mut object = Map::new();
    for (key, raw) in &filter.fields {
        let value = match (key.as_str(), raw.parse::<bool>()) {
            ("uploaded", Ok(flag)) => Value::Bool(flag),
            _ => Value::String(raw.clone()),
        };
        object.insert(key.clone(), value);
    }
    if !filter.metadata.is_empty() {
        object.insert("metadata".to_string(), json!(filter.metadata));
    }
    Value::Object(object)
}

fn token_expiry(now: Instant, expires_in: u64) -> Instant {
    let lifetime = Duration::from_secs(expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
    now.checked_add(lifetime)
        .unwrap_or_else(|| now + FALLBACK_TOKEN_LIFETIME)
}

/// Map `items` through `f` with at most `limit` futures in flight, keeping
/// input order in the output.
async fn run_bounded<T, F, Fut>(items: Vec<T>, limit: usize, f: F) -> Vec<Fut::Output>
where
    F: FnMut(T) -> Fut,
    Fut: Future,
{
    stream::iter(items).map(f).buffered(limit.max(1)).collect().await
}

async fn ensure_success(res: Response, what: &str) -> Result<Response, CdfError> {
    let status = res.status();
    if !status.is_success() {
        return Err(CdfError::Transport(format!(
            "server returned status code {} from {what} request. {}",
            status,
            res.text().await.unwrap_or_default(),
        )));
    }
    Ok(res)
}

async fn decode<R: DeserializeOwned>(res: Response, what: &str) -> Result<R, CdfError> {
    res.json::<R>()
        .await
        .map_err(|e| CdfError::Transport(format!("failed to decode {what} response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn client(host: &str) -> CdfClient {
        CdfClient::new(ClientCredentials {
            host: host.into(),
            project: "publicdata".into(),
            client_id: "id".into(),
            client_secret: "secret".into(),
            tenant_id: "tenant-123".into(),
        })
        .unwrap()
    }

    #[test]
    fn api_url_joins_host_project_and_path() {
        let client = client("https://westeurope-1.cognitedata.com/");
        assert_eq!(
            client.api_url("files/list"),
            "https://westeurope-1.cognitedata.com/api/v1/projects/publicdata/files/list"
        );
        assert_eq!(
            client.token_url(),
            "https://login.microsoftonline.com/tenant-123/oauth2/v2.0/token"
        );
    }

    #[test]
    fn filter_body_nests_metadata_and_types_uploaded() {
        let filter = FileFilter {
            fields: BTreeMap::from([
                ("source".to_string(), "camera".to_string()),
                ("uploaded".to_string(), "true".to_string()),
            ]),
            metadata: BTreeMap::from([("site".to_string(), "north".to_string())]),
        };

        assert_eq!(
            filter_body(&filter),
            json!({
                "source": "camera",
                "uploaded": true,
                "metadata": { "site": "north" }
            })
        );
    }

    #[test]
    fn empty_filter_is_an_empty_object() {
        assert_eq!(filter_body(&FileFilter::default()), json!({}));
    }

    #[test]
    fn token_expiry_subtracts_the_margin() {
        let now = Instant::now();
        assert_eq!(token_expiry(now, 3600), now + Duration::from_secs(3540));
        assert_eq!(token_expiry(now, 30), now);
    }

    #[test]
    fn huge_token_lifetime_falls_back_instead_of_overflowing() {
        let now = Instant::now();
        assert_eq!(token_expiry(now, u64::MAX), now + FALLBACK_TOKEN_LIFETIME);
    }

    #[tokio::test]
    async fn uploads_are_bounded_and_keep_order() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let results = run_bounded((0..40).collect(), 3, |i: usize| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                i
            }
        })
        .await;

        assert_eq!(results, (0..40).collect::<Vec<_>>());
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn delete_body_uses_api_field_names() {
        let items = vec![FileIdentity::Id(1), FileIdentity::ExternalId("x".into())];
        let body = DeleteBody {
            items: &items,
            ignore_unknown_ids: true,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({ "items": [{ "id": 1 }, { "externalId": "x" }], "ignoreUnknownIds": true })
        );
    }
}
