//! AWS Signature Version 4 request signing
//!
//! Client side of the [SigV4 signing process][sigv4]. Every request signs
//! `host`, `x-amz-content-sha256` and `x-amz-date`.
//!
//! [sigv4]: https://docs.aws.amazon.com/IAM/latest/UserGuide/create-signed-request.html

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SIGNED_HEADERS: &str = "host;x-amz-content-sha256;x-amz-date";

/// Characters left unencoded in URI components: `A-Z a-z 0-9 - _ . ~`
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Same as [`URI_COMPONENT`] but keeps `/` for object key paths
const URI_PATH: &AsciiSet = &URI_COMPONENT.remove(b'/');

/// Percent-encodes a query name or value
pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}

/// Percent-encodes an object key, keeping `/` separators
pub fn encode_path(value: &str) -> String {
    utf8_percent_encode(value, URI_PATH).to_string()
}

/// Hex SHA-256 of a request body
pub fn payload_hash(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

/// Headers to attach to a signed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub authorization: String,
    pub amz_date: String,
    pub content_sha256: String,
}

/// Signs requests with one access key for one region
#[derive(Clone)]
pub struct Signer {
    access_key_id: String,
    secret_access_key: String,
    region: String,
    service: &'static str,
}

impl Signer {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            region: region.into(),
            service: "s3",
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Signs one request
    ///
    /// `path` must already be URI-encoded (see [`encode_path`]); `query` holds
    /// raw, unencoded pairs.
    pub fn sign(
        &self,
        method: &str,
        host: &str,
        path: &str,
        query: &[(String, String)],
        content_sha256: &str,
        now: DateTime<Utc>,
    ) -> SignedHeaders {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let scope = format!("{date}/{}/{}/aws4_request", self.region, self.service);

        let canonical = canonical_request(method, host, path, query, content_sha256, &amz_date);
        let string_to_sign = string_to_sign(&amz_date, &scope, &canonical);
        let key = derive_signing_key(&self.secret_access_key, &date, &self.region, self.service);
        let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));

        SignedHeaders {
            authorization: format!(
                "{ALGORITHM} Credential={}/{scope}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}",
                self.access_key_id
            ),
            amz_date,
            content_sha256: content_sha256.to_string(),
        }
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("access_key_id", &self.access_key_id)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

/// Canonical query string: encoded pairs sorted by name, then value
fn canonical_query(query: &[(String, String)]) -> String {
    let mut pairs: Vec<(String, String)> = query
        .iter()
        .map(|(k, v)| (encode_component(k), encode_component(v)))
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

fn canonical_request(
    method: &str,
    host: &str,
    path: &str,
    query: &[(String, String)],
    content_sha256: &str,
    amz_date: &str,
) -> String {
    let path = if path.is_empty() { "/" } else { path };
    format!(
        "{method}\n{path}\n{}\nhost:{host}\nx-amz-content-sha256:{content_sha256}\nx-amz-date:{amz_date}\n\n{SIGNED_HEADERS}\n{content_sha256}",
        canonical_query(query)
    )
}

fn string_to_sign(amz_date: &str, scope: &str, canonical_request: &str) -> String {
    let hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
    format!("{ALGORITHM}\n{amz_date}\n{scope}\n{hash}")
}

/// Derives the signing key via the HMAC chain:
///
/// ```text
/// DateKey    = HMAC-SHA256("AWS4" + secret, date)
/// RegionKey  = HMAC-SHA256(DateKey, region)
/// ServiceKey = HMAC-SHA256(RegionKey, service)
/// SigningKey = HMAC-SHA256(ServiceKey, "aws4_request")
/// ```
pub fn derive_signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let key = format!("AWS4{secret}");
    let date_key = hmac_sha256(key.as_bytes(), date.as_bytes());
    let region_key = hmac_sha256(&date_key, region.as_bytes());
    let service_key = hmac_sha256(&region_key, service.as_bytes());
    hmac_sha256(&service_key, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
