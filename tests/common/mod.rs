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

// In-process fake S3 endpoint shared by the integration tests

#![allow(dead_code)]

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use logvault::config::ObjectStoreConfig;
use logvault::storage::ObjectStore;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const BUCKET: &str = "logs";

#[derive(Default)]
pub struct FakeS3 {
    pub objects: Mutex<BTreeMap<String, String>>,
    // Keys per listing page; 0 means unlimited
    pub page_size: usize,
    // Every listing claims truncation with the same token
    pub repeat_token: bool,
    pub reject_writes: AtomicBool,
    pub put_attempts: AtomicUsize,
    pub last_authorization: Mutex<Option<String>>,
}

pub type Shared = Arc<FakeS3>;

fn authorized(state: &FakeS3, headers: &HeaderMap) -> bool {
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let has_date = headers.contains_key("x-amz-date");
    let ok = has_date
        && authorization
            .as_deref()
            .is_some_and(|a| a.starts_with("AWS4-HMAC-SHA256 Credential=test-access,"));
    *state.last_authorization.lock().unwrap() = authorization;
    ok
}

async fn list_bucket(
    State(state): State<Shared>,
    Path(bucket): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if !authorized(&state, &headers) {
        return (StatusCode::FORBIDDEN, String::new());
    }
    if bucket != BUCKET {
        return (StatusCode::NOT_FOUND, String::new());
    }

    let objects = state.objects.lock().unwrap();
    let start: usize = params
        .get("continuation-token")
        .and_then(|t| t.parse().ok())
        .unwrap_or(0);
    let keys: Vec<&String> = objects.keys().collect();
    let end = if state.page_size == 0 {
        keys.len()
    } else {
        (start + state.page_size).min(keys.len())
    };

    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?><ListBucketResult>");
    xml.push_str(&format!("<Name>{}</Name>", BUCKET));
    for key in &keys[start..end] {
        xml.push_str(&format!(
            "<Contents><Key>{}</Key><LastModified>2024-06-01T10:00:00.000Z</LastModified><Size>1</Size></Contents>",
            key.replace('&', "&amp;")
        ));
    }
    if state.repeat_token {
        xml.push_str("<IsTruncated>true</IsTruncated><NextContinuationToken>0</NextContinuationToken>");
    } else if end < keys.len() {
        xml.push_str(&format!(
            "<IsTruncated>true</IsTruncated><NextContinuationToken>{}</NextContinuationToken>",
            end
        ));
    } else {
        xml.push_str("<IsTruncated>false</IsTruncated>");
    }
    xml.push_str("</ListBucketResult>");
    (StatusCode::OK, xml)
}

async fn get_object(
    State(state): State<Shared>,
    Path((_bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if !authorized(&state, &headers) {
        return (StatusCode::FORBIDDEN, String::new());
    }
    match state.objects.lock().unwrap().get(&key) {
        Some(body) => (StatusCode::OK, body.clone()),
        None => (StatusCode::NOT_FOUND, String::new()),
    }
}

async fn put_object(
    State(state): State<Shared>,
    Path((_bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    state.put_attempts.fetch_add(1, Ordering::SeqCst);
    if !authorized(&state, &headers) {
        return StatusCode::FORBIDDEN;
    }
    if state.reject_writes.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    state.objects.lock().unwrap().insert(key, body);
    StatusCode::OK
}

pub async fn start_fake_s3(state: Shared) -> String {
    let app = Router::new()
        .route("/:bucket", get(list_bucket))
        .route("/:bucket/*key", get(get_object).put(put_object))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

pub fn create_object_store(endpoint: String, max_retries: u32) -> ObjectStore {
    let config = ObjectStoreConfig {
        endpoint,
        bucket_name: BUCKET.to_string(),
        access_key: "test-access".to_string(),
        secret_key: "test-secret".to_string(),
        timeout_seconds: 5,
        max_retries,
        fetch_concurrency: 4,
    };
    ObjectStore::new(&config).unwrap()
}
