//! Minimal S3 client: SigV4-signed single-part PUT.

use super::{content_type_for, ObjectStorage, StorageError};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

type HmacSha256 = Hmac<Sha256>;

const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";
const SIGNED_HEADERS: &str = "host;x-amz-content-sha256;x-amz-date";

#[derive(Debug, Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

pub struct S3Storage {
    client: reqwest::Client,
    bucket: String,
    region: String,
    /// Custom endpoint for S3-compatible services; path-style when set.
    endpoint: Option<String>,
    credentials: S3Credentials,
}

impl S3Storage {
    pub fn new(
        bucket: String,
        region: String,
        endpoint: Option<String>,
        credentials: S3Credentials,
    ) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| StorageError::Request(e.to_string()))?;
        Ok(Self {
            client,
            bucket,
            region,
            endpoint: endpoint.map(|e| e.trim_end_matches('/').to_string()),
            credentials,
        })
    }

    pub fn object_url(&self, key: &str) -> String {
        let encoded_key = encode_key(key);
        match &self.endpoint {
            Some(endpoint) => format!("{}/{}/{}", endpoint, self.bucket, encoded_key),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, encoded_key
            ),
        }
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn upload(&self, local_path: &Path, key: &str) -> Result<String, StorageError> {
        let file = tokio::fs::File::open(local_path).await?;
        let length = file.metadata().await?.len();

        let url = self.object_url(key);
        let parsed =
            reqwest::Url::parse(&url).map_err(|e| StorageError::Request(e.to_string()))?;
        let host = match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(StorageError::Request(format!("No host in {}", url))),
        };

        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let authorization = authorization_header(
            &self.credentials,
            &self.region,
            &host,
            parsed.path(),
            &amz_date,
            &date,
        );

        debug!("PUT {} ({} bytes)", url, length);
        let response = self
            .client
            .put(parsed)
            .header(AUTHORIZATION, authorization)
            .header("x-amz-date", &amz_date)
            .header("x-amz-content-sha256", UNSIGNED_PAYLOAD)
            .header(CONTENT_LENGTH, length)
            .header(CONTENT_TYPE, content_type_for(local_path))
            .body(reqwest::Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!("Uploaded {:?} to s3://{}/{}", local_path, self.bucket, key);
        Ok(url)
    }
}

/// Percent-encodes each path segment of an object key, keeping the slashes.
fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn hmac_sha256(key: &[u8], data: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

pub(crate) fn derive_signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), date);
    let k_region = hmac_sha256(&k_date, region);
    let k_service = hmac_sha256(&k_region, service);
    hmac_sha256(&k_service, "aws4_request")
}

fn authorization_header(
    credentials: &S3Credentials,
    region: &str,
    host: &str,
    canonical_uri: &str,
    amz_date: &str,
    date: &str,
) -> String {
    let canonical_request = format!(
        "PUT\n{}\n\nhost:{}\nx-amz-content-sha256:{}\nx-amz-date:{}\n\n{}\n{}",
        canonical_uri, host, UNSIGNED_PAYLOAD, amz_date, SIGNED_HEADERS, UNSIGNED_PAYLOAD
    );
    let scope = format!("{}/{}/s3/aws4_request", date, region);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        scope,
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );
    let signing_key = derive_signing_key(&credentials.secret_access_key, date, region, "s3");
    let signature = hex::encode(hmac_sha256(&signing_key, &string_to_sign));
    format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        credentials.access_key_id, scope, SIGNED_HEADERS, signature
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Bytes,
        extract::State,
        http::{HeaderMap, StatusCode},
        routing::put,
        Router,
    };
    use std::sync::{Arc, Mutex};

    fn credentials() -> S3Credentials {
        S3Credentials {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
        }
    }

    #[test]
    fn derives_documented_signing_key() {
        let key = derive_signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        );
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn builds_virtual_hosted_urls() {
        let storage = S3Storage::new(
            "my-bucket".to_string(),
            "eu-west-1".to_string(),
            None,
            credentials(),
        )
        .unwrap();
        assert_eq!(
            storage.object_url("songs/original_song/a b.mp3"),
            "https://my-bucket.s3.eu-west-1.amazonaws.com/songs/original_song/a%20b.mp3"
        );
    }

    #[test]
    fn authorization_names_scope_and_headers() {
        let header = authorization_header(
            &credentials(),
            "us-east-1",
            "bucket.s3.us-east-1.amazonaws.com",
            "/songs/x.mp3",
            "20240101T000000Z",
            "20240101",
        );
        assert!(header.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240101/us-east-1/s3/aws4_request, "
        ));
        assert!(header.contains("SignedHeaders=host;x-amz-content-sha256;x-amz-date"));
        let signature = header.rsplit("Signature=").next().unwrap();
        assert_eq!(signature.len(), 64);
    }

    #[derive(Clone, Default)]
    struct Received {
        requests: Arc<Mutex<Vec<(String, usize)>>>,
    }

    #[tokio::test]
    async fn uploads_to_path_style_endpoint() {
        let received = Received::default();
        let app = Router::new()
            .route(
                "/{bucket}/{*key}",
                put(
                    |State(received): State<Received>, headers: HeaderMap, body: Bytes| async move {
                        let auth = headers
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string();
                        received.requests.lock().unwrap().push((auth, body.len()));
                        StatusCode::OK
                    },
                ),
            )
            .with_state(received.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("stem.mp3");
        std::fs::write(&file, vec![7u8; 4096]).unwrap();

        let storage = S3Storage::new(
            "songs-bucket".to_string(),
            "us-east-1".to_string(),
            Some(format!("http://{}/", addr)),
            credentials(),
        )
        .unwrap();
        let url = storage.upload(&file, "songs/stems/1/vocals.mp3").await.unwrap();
        assert_eq!(
            url,
            format!("http://{}/songs-bucket/songs/stems/1/vocals.mp3", addr)
        );

        let requests = received.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].0.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
        assert_eq!(requests[0].1, 4096);
    }

    #[tokio::test]
    async fn rejected_upload_reports_status() {
        let app = Router::new().route(
            "/{bucket}/{*key}",
            put(|| async { (StatusCode::FORBIDDEN, "AccessDenied") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("a.mp3");
        std::fs::write(&file, b"data").unwrap();
        let storage = S3Storage::new(
            "b".to_string(),
            "us-east-1".to_string(),
            Some(format!("http://{}", addr)),
            credentials(),
        )
        .unwrap();
        let result = storage.upload(&file, "a.mp3").await;
        match result {
            Err(StorageError::Rejected { status, body }) => {
                assert_eq!(status, 403);
                assert_eq!(body, "AccessDenied");
            }
            other => panic!("unexpected result {:?}", other),
        }
    }
}
