//! S3 Object Store
//!
//! Implementation of the ObjectStore trait for Amazon S3 and S3-compatible storage.
//! Supports AWS S3, MinIO, Backblaze B2, DigitalOcean Spaces, Cloudflare R2, Wasabi, etc.
//!
//! This implementation uses reqwest with AWS Signature Version 4 for authentication,
//! avoiding the heavyweight aws-sdk-s3 dependency for better compile times and smaller binaries.

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use md5::Md5;
use reqwest::{Client, Method, StatusCode};
use secrecy::ExposeSecret;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::http_retry::{send_with_retry, HttpRetryConfig};
use super::{DeleteReport, FailedDelete, ObjectStore, S3Config, StorageObject, StoreError, WriteMode};

type HmacSha256 = Hmac<Sha256>;

/// S3 caps multi-object delete requests at 1000 keys
const DELETE_BATCH_SIZE: usize = 1000;

/// Page size requested from ListObjectsV2
const LIST_PAGE_SIZE: &str = "1000";

/// S3 Object Store
pub struct S3Store {
    config: S3Config,
    client: Client,
    retry: HttpRetryConfig,
}

/// One page of a ListObjectsV2 response
#[derive(Debug, Default)]
struct ListPage {
    objects: Vec<StorageObject>,
    next_token: Option<String>,
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| StoreError::InvalidConfig(format!("Invalid signing key: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// URI-encode a key, keeping the `/` separators
fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Canonical (sorted, encoded) query string as required by SigV4
fn canonical_query(params: &[(&str, &str)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (urlencoding::encode(k).into_owned(), urlencoding::encode(v).into_owned()))
        .collect();
    encoded.sort();
    encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Extract content from the first occurrence of an XML tag
fn extract_xml_tag(xml: &str, tag: &str) -> Option<String> {
    let pattern = format!(r"<{}[^>]*>([^<]*)</{}>", tag, tag);
    let re = regex::Regex::new(&pattern).ok()?;
    let text = re.captures(xml)?.get(1)?.as_str().trim();
    if text.is_empty() {
        return None;
    }
    Some(xml_unescape(text))
}

fn xml_unescape(text: &str) -> String {
    quick_xml::escape::unescape(text)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| text.to_string())
}

/// Parse a ListObjectsV2 XML response
fn parse_list_response(xml: &str) -> Result<ListPage, StoreError> {
    let mut page = ListPage::default();

    // Common prefixes (sub-folders of a delimited listing)
    let prefix_pattern = regex::Regex::new(r"(?s)<CommonPrefixes>\s*<Prefix>([^<]+)</Prefix>\s*</CommonPrefixes>")
        .map_err(|e| StoreError::ParseError(e.to_string()))?;
    for cap in prefix_pattern.captures_iter(xml) {
        if let Some(prefix) = cap.get(1) {
            page.objects.push(StorageObject::prefix(xml_unescape(prefix.as_str())));
        }
    }

    // Objects, including zero-byte folder markers
    let contents_pattern = regex::Regex::new(r"(?s)<Contents>(.*?)</Contents>")
        .map_err(|e| StoreError::ParseError(e.to_string()))?;
    for cap in contents_pattern.captures_iter(xml) {
        let Some(content) = cap.get(1) else {
            continue;
        };
        let content = content.as_str();

        let Some(key) = extract_xml_tag(content, "Key") else {
            continue;
        };
        let size = extract_xml_tag(content, "Size")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        page.objects.push(StorageObject::new(key, size));
    }

    let truncated = extract_xml_tag(xml, "IsTruncated").as_deref() == Some("true");
    if truncated {
        page.next_token = extract_xml_tag(xml, "NextContinuationToken");
        if page.next_token.is_none() {
            return Err(StoreError::ParseError(
                "Truncated listing without continuation token".to_string(),
            ));
        }
    }

    Ok(page)
}

/// Parse the `<Error>` entries of a DeleteObjects response
fn parse_delete_errors(xml: &str) -> Result<Vec<FailedDelete>, StoreError> {
    let error_pattern = regex::Regex::new(r"(?s)<Error>(.*?)</Error>")
        .map_err(|e| StoreError::ParseError(e.to_string()))?;

    Ok(error_pattern
        .captures_iter(xml)
        .filter_map(|cap| cap.get(1))
        .filter_map(|body| {
            let body = body.as_str();
            let key = extract_xml_tag(body, "Key")?;
            let code = extract_xml_tag(body, "Code").unwrap_or_default();
            let message = extract_xml_tag(body, "Message").unwrap_or_default();
            Some(FailedDelete {
                key,
                reason: format!("{} {}", code, message).trim().to_string(),
            })
        })
        .collect())
}

/// Build the body of a quiet DeleteObjects request
fn delete_request_body(keys: &[String]) -> String {
    let mut body = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><Delete><Quiet>true</Quiet>"#);
    for key in keys {
        body.push_str("<Object><Key>");
        body.push_str(&quick_xml::escape::escape(key.as_str()));
        body.push_str("</Key></Object>");
    }
    body.push_str("</Delete>");
    body
}

impl S3Store {
    /// Create a new S3 store with the given configuration
    pub fn new(config: S3Config, retry: HttpRetryConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StoreError::InvalidConfig(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client, retry })
    }

    /// Get the S3 endpoint URL
    fn endpoint(&self) -> String {
        if let Some(ref endpoint) = self.config.endpoint {
            endpoint.trim_end_matches('/').to_string()
        } else {
            format!("https://s3.{}.amazonaws.com", self.config.region)
        }
    }

    /// Build URL for S3 operations
    fn build_url(&self, key: &str) -> String {
        let endpoint = self.endpoint();
        let key = encode_key(key.trim_start_matches('/'));

        if self.config.path_style {
            // Path-style: https://endpoint/bucket/key
            if key.is_empty() {
                format!("{}/{}", endpoint, self.config.bucket)
            } else {
                format!("{}/{}/{}", endpoint, self.config.bucket, key)
            }
        } else {
            // Virtual-hosted style: https://bucket.endpoint/key
            let endpoint_without_scheme = endpoint
                .replace("https://", "")
                .replace("http://", "");
            let scheme = if endpoint.starts_with("http://") { "http" } else { "https" };

            if key.is_empty() {
                format!("{}://{}.{}/", scheme, self.config.bucket, endpoint_without_scheme)
            } else {
                format!("{}://{}.{}/{}", scheme, self.config.bucket, endpoint_without_scheme, key)
            }
        }
    }

    /// Sign a request using AWS Signature Version 4
    ///
    /// Every entry of `headers` is signed; `host`, `x-amz-date` and
    /// `x-amz-content-sha256` are added here.
    fn sign_request(
        &self,
        method: &str,
        url: &str,
        query: &str,
        headers: &mut BTreeMap<String, String>,
        payload_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<String, StoreError> {
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        let parsed = url::Url::parse(url)
            .map_err(|e| StoreError::InvalidConfig(e.to_string()))?;
        let host = match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(StoreError::InvalidConfig(format!("URL without host: {}", url))),
        };

        headers.insert("host".to_string(), host);
        headers.insert("x-amz-date".to_string(), amz_date.clone());
        headers.insert("x-amz-content-sha256".to_string(), payload_hash.to_string());

        // BTreeMap keeps the lowercase header names sorted
        let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(name, value)| format!("{}:{}\n", name, value.trim()))
            .collect();

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method,
            parsed.path(),
            query,
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.config.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            sha256_hex(canonical_request.as_bytes())
        );

        let k_date = hmac_sha256(
            format!("AWS4{}", self.config.secret_access_key.expose_secret()).as_bytes(),
            date_stamp.as_bytes(),
        )?;
        let k_region = hmac_sha256(&k_date, self.config.region.as_bytes())?;
        let k_service = hmac_sha256(&k_region, b"s3")?;
        let k_signing = hmac_sha256(&k_service, b"aws4_request")?;
        let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes())?);

        Ok(format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.config.access_key_id, credential_scope, signed_headers, signature
        ))
    }

    /// Make a signed request to S3
    async fn s3_request(
        &self,
        method: Method,
        key: &str,
        query_params: &[(&str, &str)],
        body: Option<Vec<u8>>,
        extra_headers: &[(&str, String)],
    ) -> Result<reqwest::Response, StoreError> {
        let query = canonical_query(query_params);
        let mut url = self.build_url(key);
        if !query.is_empty() {
            url = format!("{}?{}", url, query);
        }

        let payload_hash = sha256_hex(body.as_deref().unwrap_or(&[]));

        let mut headers: BTreeMap<String, String> = extra_headers
            .iter()
            .map(|(name, value)| (name.to_lowercase(), value.clone()))
            .collect();
        let authorization = self.sign_request(
            method.as_str(),
            &url,
            &query,
            &mut headers,
            &payload_hash,
            Utc::now(),
        )?;

        let mut request = self.client.request(method, &url);
        for (name, value) in &headers {
            request = request.header(name, value);
        }
        request = request.header("Authorization", authorization);
        if let Some(body_data) = body {
            request = request.body(body_data);
        }

        let request = request.build()?;
        Ok(send_with_retry(&self.client, request, &self.retry).await?)
    }

    /// Fetch one page of a ListObjectsV2 listing
    async fn list_page(
        &self,
        prefix: &str,
        recursive: bool,
        continuation_token: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        let mut params: Vec<(&str, &str)> = vec![
            ("list-type", "2"),
            ("max-keys", LIST_PAGE_SIZE),
            ("prefix", prefix),
        ];
        if !recursive {
            params.push(("delimiter", "/"));
        }
        if let Some(token) = continuation_token {
            params.push(("continuation-token", token));
        }

        let response = self.s3_request(Method::GET, "", &params, None, &[]).await?;

        match response.status() {
            StatusCode::OK => {
                let xml = response.text().await
                    .map_err(|e| StoreError::ParseError(e.to_string()))?;
                parse_list_response(&xml)
            }
            StatusCode::NOT_FOUND => {
                Err(StoreError::InvalidConfig(format!("Bucket '{}' not found", self.config.bucket)))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(StoreError::ServerError(format!("List failed ({}): {}", status, body)))
            }
        }
    }

    /// Check that the bucket is reachable with the configured credentials
    pub async fn verify_bucket(&self) -> Result<(), StoreError> {
        let response = self.s3_request(
            Method::GET,
            "",
            &[("list-type", "2"), ("max-keys", "1")],
            None,
            &[],
        ).await?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
                Err(StoreError::InvalidConfig("Invalid S3 credentials".to_string()))
            }
            StatusCode::NOT_FOUND => {
                Err(StoreError::InvalidConfig(format!("Bucket '{}' not found", self.config.bucket)))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(StoreError::ServerError(format!("S3 error ({}): {}", status, body)))
            }
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn display_name(&self) -> String {
        match self.config.endpoint {
            Some(ref endpoint) => format!("s3://{} ({})", self.config.bucket, endpoint),
            None => format!("s3://{} ({})", self.config.bucket, self.config.region),
        }
    }

    async fn put(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
        mode: WriteMode,
    ) -> Result<(), StoreError> {
        let mut headers = vec![("content-type", content_type.to_string())];
        if mode == WriteMode::CreateNew && self.config.conditional_writes {
            headers.push(("if-none-match", "*".to_string()));
        }

        let size = data.len();
        let response = self.s3_request(Method::PUT, key, &[], Some(data), &headers).await?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED | StatusCode::NO_CONTENT => {
                debug!("Stored {} ({} bytes)", key, size);
                Ok(())
            }
            StatusCode::PRECONDITION_FAILED | StatusCode::CONFLICT => {
                Err(StoreError::AlreadyExists(key.to_string()))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(StoreError::ServerError(format!("Upload failed ({}): {}", status, body)))
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let response = self.s3_request(Method::GET, key, &[], None, &[]).await?;

        match response.status() {
            StatusCode::OK => {
                let bytes = response.bytes().await?;
                Ok(bytes.to_vec())
            }
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(key.to_string())),
            status => {
                Err(StoreError::ServerError(format!("Download failed with status: {}", status)))
            }
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let response = self.s3_request(Method::HEAD, key, &[], None, &[]).await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                Err(StoreError::ServerError(format!("HEAD failed with status: {}", status)))
            }
        }
    }

    async fn list(&self, prefix: &str, recursive: bool) -> Result<Vec<StorageObject>, StoreError> {
        let mut all_objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let page = self
                .list_page(prefix, recursive, continuation_token.as_deref())
                .await?;
            all_objects.extend(page.objects);

            match page.next_token {
                Some(token) => continuation_token = Some(token),
                None => break,
            }
        }

        debug!("Listed {} entries under {} (recursive: {})", all_objects.len(), prefix, recursive);
        Ok(all_objects)
    }

    async fn copy(&self, dest: &str, source: &str) -> Result<(), StoreError> {
        let copy_source = format!("/{}/{}", self.config.bucket, encode_key(source));
        let response = self
            .s3_request(Method::PUT, dest, &[], None, &[("x-amz-copy-source", copy_source)])
            .await?;

        match response.status() {
            StatusCode::OK => {
                // S3 may report a failed copy inside a 200 response
                let body = response.text().await.unwrap_or_default();
                if body.contains("<Error>") {
                    let code = extract_xml_tag(&body, "Code").unwrap_or_default();
                    return Err(StoreError::ServerError(format!("Copy of {} failed: {}", source, code)));
                }
                Ok(())
            }
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(source.to_string())),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(StoreError::ServerError(format!("Copy failed ({}): {}", status, body)))
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        // S3 answers DELETE on a missing key with 204, so check first
        if !self.exists(key).await? {
            return Err(StoreError::NotFound(key.to_string()));
        }

        let response = self.s3_request(Method::DELETE, key, &[], None, &[]).await?;

        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT | StatusCode::ACCEPTED => Ok(()),
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(key.to_string())),
            status => {
                Err(StoreError::ServerError(format!("Delete failed with status: {}", status)))
            }
        }
    }

    async fn delete_batch(&self, keys: &[String]) -> Result<DeleteReport, StoreError> {
        let mut report = DeleteReport::default();

        for chunk in keys.chunks(DELETE_BATCH_SIZE) {
            let body = delete_request_body(chunk).into_bytes();
            let content_md5 = base64::engine::general_purpose::STANDARD.encode(Md5::digest(&body));
            let headers = [
                ("content-md5", content_md5),
                ("content-type", "application/xml".to_string()),
            ];

            let response = self
                .s3_request(Method::POST, "", &[("delete", "")], Some(body), &headers)
                .await?;

            let status = response.status();
            if status != StatusCode::OK {
                let body = response.text().await.unwrap_or_default();
                return Err(StoreError::ServerError(format!("Batch delete failed ({}): {}", status, body)));
            }

            let xml = response.text().await
                .map_err(|e| StoreError::ParseError(e.to_string()))?;
            let failed = parse_delete_errors(&xml)?;
            if !failed.is_empty() {
                warn!("Batch delete left {} of {} keys behind", failed.len(), chunk.len());
            }

            report.merge(DeleteReport {
                deleted: chunk.len() - failed.len(),
                failed,
            });
        }

        Ok(report)
    }
}
