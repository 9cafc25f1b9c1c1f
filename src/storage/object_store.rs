// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// S3-compatible object storage backend
//
// One object per entry, keyed `<service>/<yyyy-MM-dd_HH-mm-ss>.txt`, with a
// single text line `<timestamp> [<level>] <service>: <message>` as body.
// Retrieval lists the bucket, fetches every object and filters in memory.

use super::backend::{saved_message, with_retry, LogStore, StorageResult};
use crate::config::ObjectStoreConfig;
use crate::error::StorageError;
use crate::filter::paginate;
use crate::protocol::{
    LogEntry, LogFilter, LogLevel, NewLogEntry, Page, PageRequest, Receipt, StorageType,
};
use crate::signing::RequestSigner;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::stream::{self, StreamExt};
use regex::Regex;
use reqwest::{Client, Method, RequestBuilder, Url};
use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, warn};

static CONTENTS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<Contents>(.*?)</Contents>").unwrap());
static KEY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<Key>(.*?)</Key>").unwrap());
static LAST_MODIFIED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<LastModified>(.*?)</LastModified>").unwrap());
static TRUNCATED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<IsTruncated>\s*true\s*</IsTruncated>").unwrap());
static NEXT_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<NextContinuationToken>(.*?)</NextContinuationToken>").unwrap()
});

/// One `<Contents>` element of a bucket listing
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSummary {
    pub key: String,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One page of a ListObjectsV2 response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingPage {
    pub objects: Vec<ObjectSummary>,
    pub next_token: Option<String>,
}

/// `<service>/<yyyy-MM-dd_HH-mm-ss>.txt`
pub fn object_key(entry: &NewLogEntry) -> String {
    format!(
        "{}/{}.txt",
        entry.service,
        entry.timestamp.format("%Y-%m-%d_%H-%M-%S")
    )
}

/// `<timestamp> [<level>] <service>: <message>`
///
/// The first `:` after the level ends the service, so a service containing
/// `:` would not read back; `store` rejects such services.
pub fn format_line(entry: &NewLogEntry) -> String {
    format!(
        "{} [{}] {}: {}",
        entry.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        entry.level,
        entry.service,
        entry.message
    )
}

/// Parse a stored line back into an entry
///
/// The line splits into timestamp, level, service and message. Anything with
/// fewer segments, or an unparseable timestamp, yields `None`. Unknown levels
/// read as `Info`.
pub fn parse_line(content: &str, last_modified: Option<DateTime<Utc>>) -> Option<LogEntry> {
    let content = content.trim();
    let (timestamp, rest) = content.split_once('[')?;
    let (level, rest) = rest.split_once(']')?;
    let (service, message) = rest.split_once(':')?;

    let timestamp = DateTime::parse_from_rfc3339(timestamp.trim())
        .ok()?
        .with_timezone(&Utc);
    let level = level.parse().unwrap_or(LogLevel::Info);

    Some(LogEntry {
        id: 0,
        storage_type: StorageType::ObjectStore,
        service: service.trim().to_string(),
        level,
        message: message.trim().to_string(),
        timestamp,
        created_date: last_modified.unwrap_or(timestamp),
    })
}

/// Extract keys and continuation state from a ListObjectsV2 XML body
pub fn parse_listing(xml: &str) -> ListingPage {
    let objects = CONTENTS_RE
        .captures_iter(xml)
        .filter_map(|contents| {
            let block = contents.get(1)?.as_str();
            let key = unescape_xml(KEY_RE.captures(block)?.get(1)?.as_str());
            if key.is_empty() {
                return None;
            }
            let last_modified = LAST_MODIFIED_RE
                .captures(block)
                .and_then(|c| c.get(1))
                .and_then(|m| DateTime::parse_from_rfc3339(m.as_str().trim()).ok())
                .map(|dt| dt.with_timezone(&Utc));
            Some(ObjectSummary { key, last_modified })
        })
        .collect();

    let next_token = if TRUNCATED_RE.is_match(xml) {
        NEXT_TOKEN_RE
            .captures(xml)
            .and_then(|c| c.get(1))
            .map(|m| unescape_xml(m.as_str()))
    } else {
        None
    };

    ListingPage {
        objects,
        next_token,
    }
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Object storage client speaking the S3 REST dialect
pub struct ObjectStore {
    client: Client,
    endpoint: Url,
    bucket_name: String,
    signer: RequestSigner,
    max_retries: u32,
    fetch_concurrency: usize,
}

impl ObjectStore {
    pub fn new(config: &ObjectStoreConfig) -> Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(config.timeout())
            .build()
            .context("Failed to build HTTP client")?;

        let endpoint = Url::parse(config.endpoint.trim_end_matches('/'))
            .with_context(|| format!("Invalid object store endpoint '{}'", config.endpoint))?;
        if endpoint.cannot_be_a_base() {
            anyhow::bail!("Object store endpoint '{}' cannot be a base URL", config.endpoint);
        }

        let signer = RequestSigner::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            config.bucket_name.clone(),
            &config.endpoint,
        );

        info!(
            "Initializing object store at {} (bucket '{}')",
            endpoint, config.bucket_name
        );

        Ok(Self {
            client,
            endpoint,
            bucket_name: config.bucket_name.clone(),
            signer,
            max_retries: config.max_retries,
            fetch_concurrency: config.fetch_concurrency.max(1),
        })
    }

    /// `<endpoint>/<bucket>/<key segments...>`
    fn object_url(&self, key: &str) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(&self.bucket_name);
            for part in key.split('/') {
                segments.push(part);
            }
        }
        url
    }

    fn bucket_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(&self.bucket_name);
        }
        url
    }

    /// Attach `x-amz-date` and `Authorization` for `path` within the bucket
    fn signed(&self, method: Method, url: Url, path: &str) -> RequestBuilder {
        let headers = self.signer.sign_now(method.as_str(), path);
        self.client
            .request(method, url)
            .header("x-amz-date", headers.amz_date)
            .header(reqwest::header::AUTHORIZATION, headers.authorization)
    }

    async fn check_status(response: reqwest::Response, what: &str) -> StorageResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        Err(StorageError::BackendUnavailable(format!(
            "{} failed with status {}: {}",
            what, status, error_text
        )))
    }

    async fn put_object(&self, key: &str, body: &str) -> StorageResult<()> {
        let response = self
            .signed(Method::PUT, self.object_url(key), key)
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body.to_string())
            .send()
            .await?;

        Self::check_status(response, "PUT object").await?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> StorageResult<String> {
        let response = self
            .signed(Method::GET, self.object_url(key), key)
            .send()
            .await?;

        let response = Self::check_status(response, "GET object").await?;
        Ok(response.text().await?)
    }

    async fn list_page(&self, token: Option<&str>) -> StorageResult<ListingPage> {
        let mut url = self.bucket_url();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("list-type", "2");
            if let Some(token) = token {
                query.append_pair("continuation-token", token);
            }
        }

        let response = self.signed(Method::GET, url, "").send().await?;
        let response = Self::check_status(response, "LIST bucket").await?;
        Ok(parse_listing(&response.text().await?))
    }

    /// Follow continuation tokens until the listing is complete
    pub async fn list_objects(&self) -> StorageResult<Vec<ObjectSummary>> {
        let mut objects = Vec::new();
        let mut token: Option<String> = None;
        let mut seen_tokens = HashSet::new();

        loop {
            let page = self.list_page(token.as_deref()).await?;
            objects.extend(page.objects);
            match page.next_token {
                Some(next) => {
                    if !seen_tokens.insert(next.clone()) {
                        return Err(StorageError::BackendUnavailable(format!(
                            "listing of bucket '{}' repeated continuation token '{}'",
                            self.bucket_name, next
                        )));
                    }
                    token = Some(next);
                }
                None => break,
            }
        }

        debug!("Listed {} objects in bucket '{}'", objects.len(), self.bucket_name);
        Ok(objects)
    }

    /// Fetch and parse every listed object, skipping the ones that fail
    async fn fetch_entries(&self, objects: Vec<ObjectSummary>) -> Vec<LogEntry> {
        let fetched: Vec<(ObjectSummary, StorageResult<String>)> = stream::iter(objects)
            .map(|object| async move {
                let body = self.get_object(&object.key).await;
                (object, body)
            })
            .buffered(self.fetch_concurrency)
            .collect()
            .await;

        let mut entries = Vec::with_capacity(fetched.len());
        for (object, body) in fetched {
            match body {
                Ok(body) => match parse_line(&body, object.last_modified) {
                    Some(entry) => entries.push(entry),
                    None => warn!("Skipping object '{}': unparseable log line", object.key),
                },
                Err(e) => warn!("Skipping object '{}': {}", object.key, e),
            }
        }
        entries
    }
}

#[async_trait]
impl LogStore for ObjectStore {
    async fn store(&self, entry: NewLogEntry) -> StorageResult<Receipt> {
        entry.validate()?;
        if entry.service.contains(':') {
            return Err(StorageError::Validation(
                "service must not contain ':' for the object store".into(),
            ));
        }

        let key = object_key(&entry);
        let body = format_line(&entry);
        let (key_ref, body_ref) = (key.as_str(), body.as_str());

        with_retry(&format!("PUT {}", key), self.max_retries, move || {
            self.put_object(key_ref, body_ref)
        })
        .await?;

        let message = saved_message(&entry.service, StorageType::ObjectStore);
        info!("{} (key={})", message, key);

        Ok(Receipt {
            message,
            id: None,
            object_key: Some(key),
        })
    }

    async fn retrieve(&self, filter: &LogFilter, page: PageRequest) -> StorageResult<Page<LogEntry>> {
        page.validate()?;
        let objects = self.list_objects().await?;
        let entries = self.fetch_entries(objects).await;
        let result = paginate(entries, filter, page);

        info!(
            "Retrieved {} log entries on page {} of {} total logs",
            result.items.len(),
            page.index,
            result.total_count
        );

        Ok(result)
    }

    async fn get_by_id(&self, _id: u64) -> StorageResult<LogEntry> {
        Err(StorageError::NotSupported {
            backend: "object store",
            operation: "get_by_id",
        })
    }

    async fn health_check(&self) -> bool {
        match self.signed(Method::HEAD, self.bucket_url(), "").send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!("Health check failed with status: {}", response.status());
                false
            }
            Err(e) => {
                warn!("Health check error: {}", e);
                false
            }
        }
    }

    fn storage_type(&self) -> StorageType {
        StorageType::ObjectStore
    }
}
