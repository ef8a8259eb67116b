//! XML response types for the S3 API, deserialized via `quick-xml` + `serde`.

use serde::Deserialize;

use crate::ApiError;

// -----------------------------------------------------------------------
// ListBucketResult (GET /{bucket}?list-type=2)
// -----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct ListBucketResult {
    #[serde(rename = "Contents", default)]
    pub contents: Vec<Contents>,
    #[serde(rename = "IsTruncated", default)]
    pub is_truncated: bool,
    #[serde(rename = "NextContinuationToken", default)]
    pub next_continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Contents {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "LastModified", default)]
    pub last_modified: String,
    #[serde(rename = "ETag", default)]
    pub etag: String,
    #[serde(rename = "Size", default)]
    pub size: u64,
}

pub(crate) fn parse_list_objects(body: &str) -> Result<ListBucketResult, ApiError> {
    quick_xml::de::from_str(body)
        .map_err(|e| ApiError::InvalidResponse(format!("ListObjectsV2: {e}")))
}

// -----------------------------------------------------------------------
// Error
// -----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct S3ErrorXml {
    #[serde(rename = "Code", default)]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

/// Extracts `Code: Message` from an S3 `<Error>` body, if it is one
pub(crate) fn error_summary(body: &str) -> Option<String> {
    let error: S3ErrorXml = quick_xml::de::from_str(body).ok()?;
    if error.code.is_empty() {
        return None;
    }
    Some(format!("{}: {}", error.code, error.message))
}
