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

// Request signing for the object-storage backend
//
// Simplified AWS4-HMAC-SHA256: the canonical request is SHA-256 hashed, and the
// string-to-sign is HMAC'd once with the raw secret key. There is no derived
// signing-key chain (date/region/service/aws4_request), so real S3 will reject
// these signatures; S3-compatible gateways that skip verification accept them.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";
pub const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";
pub const SIGNED_HEADERS: &str = "host;x-amz-date";
const CREDENTIAL_SCOPE_SUFFIX: &str = "us-east-1/s3/aws4_request";
const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Header values to attach to a signed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub amz_date: String,
    pub authorization: String,
}

/// Stateless signer; safe to share across tasks
#[derive(Debug, Clone)]
pub struct RequestSigner {
    access_key: String,
    secret_key: String,
    bucket: String,
    host: String,
}

impl RequestSigner {
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        bucket: impl Into<String>,
        endpoint: &str,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            bucket: bucket.into(),
            host: endpoint_host(endpoint),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn canonical_request(&self, method: &str, path: &str, amz_date: &str) -> String {
        format!(
            "{}\n/{}/{}\n\nhost:{}\nx-amz-date:{}\n\n{}\n{}",
            method,
            self.bucket,
            path.trim_start_matches('/'),
            self.host,
            amz_date,
            SIGNED_HEADERS,
            UNSIGNED_PAYLOAD
        )
    }

    pub fn string_to_sign(&self, amz_date: &str, canonical_hash: &str) -> String {
        // amz_date is ASCII, so byte slicing is safe
        let day = &amz_date[..amz_date.len().min(8)];
        format!(
            "{}\n{}\n{}/{}\n{}",
            ALGORITHM, amz_date, day, CREDENTIAL_SCOPE_SUFFIX, canonical_hash
        )
    }

    /// Sign `method` on `path` (relative to the bucket) at a fixed instant
    pub fn sign(&self, method: &str, path: &str, at: DateTime<Utc>) -> SignedHeaders {
        let amz_date = at.format(AMZ_DATE_FORMAT).to_string();
        let canonical = self.canonical_request(method, path, &amz_date);
        let string_to_sign = self.string_to_sign(&amz_date, &sha256_hex(canonical.as_bytes()));
        let signature = hmac_sha256_hex(self.secret_key.as_bytes(), string_to_sign.as_bytes());

        let authorization = format!(
            "{} Credential={},SignedHeaders={},Signature={}",
            ALGORITHM, self.access_key, SIGNED_HEADERS, signature
        );

        SignedHeaders {
            amz_date,
            authorization,
        }
    }

    pub fn sign_now(&self, method: &str, path: &str) -> SignedHeaders {
        self.sign(method, path, Utc::now())
    }
}

/// Lowercase hex SHA-256
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Lowercase hex HMAC-SHA256
pub fn hmac_sha256_hex(key: &[u8], data: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}

/// `http://minio:9000/` -> `minio:9000`
fn endpoint_host(endpoint: &str) -> String {
    let without_scheme = endpoint
        .strip_prefix("https://")
        .or_else(|| endpoint.strip_prefix("http://"))
        .unwrap_or(endpoint);
    without_scheme.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn signer() -> RequestSigner {
        RequestSigner::new("AKIDEXAMPLE", "secret", "logs", "http://localhost:9000/")
    }

    #[test]
    fn test_sha256_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hmac_rfc4231_case_2() {
        assert_eq!(
            hmac_sha256_hex(b"Jefe", b"what do ya want for nothing?"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_endpoint_host() {
        assert_eq!(endpoint_host("http://localhost:9000/"), "localhost:9000");
        assert_eq!(endpoint_host("https://s3.example.com"), "s3.example.com");
        assert_eq!(endpoint_host("minio:9000"), "minio:9000");
    }

    #[test]
    fn test_canonical_request_layout() {
        let canonical = signer().canonical_request("PUT", "svc/2024-01-01_00-00-00.txt", "20240101T000000Z");
        assert_eq!(
            canonical,
            "PUT\n/logs/svc/2024-01-01_00-00-00.txt\n\nhost:localhost:9000\nx-amz-date:20240101T000000Z\n\nhost;x-amz-date\nUNSIGNED-PAYLOAD"
        );
    }

    #[test]
    fn test_string_to_sign_layout() {
        let sts = signer().string_to_sign("20240101T000000Z", "abc");
        assert_eq!(
            sts,
            "AWS4-HMAC-SHA256\n20240101T000000Z\n20240101/us-east-1/s3/aws4_request\nabc"
        );
    }

    #[test]
    fn test_signature_is_deterministic() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let first = signer().sign("GET", "", at);
        let second = signer().sign("GET", "", at);
        assert_eq!(first, second);
        assert_eq!(first.amz_date, "20240101T000000Z");
    }

    #[test]
    fn test_authorization_header_matches_manual_computation() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let signer = signer();
        let headers = signer.sign("GET", "a/b.txt", at);

        let canonical = signer.canonical_request("GET", "a/b.txt", "20240101T000000Z");
        let sts = signer.string_to_sign("20240101T000000Z", &sha256_hex(canonical.as_bytes()));
        let expected_sig = hmac_sha256_hex(b"secret", sts.as_bytes());

        assert_eq!(
            headers.authorization,
            format!(
                "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE,SignedHeaders=host;x-amz-date,Signature={}",
                expected_sig
            )
        );
        assert_eq!(expected_sig.len(), 64);
    }

    #[test]
    fn test_signature_changes_with_inputs() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let base = signer().sign("GET", "a", at);
        assert_ne!(base, signer().sign("PUT", "a", at));
        assert_ne!(base, signer().sign("GET", "b", at));
        let other_key = RequestSigner::new("AKIDEXAMPLE", "other", "logs", "localhost:9000");
        assert_ne!(base.authorization, other_key.sign("GET", "a", at).authorization);
    }
}
