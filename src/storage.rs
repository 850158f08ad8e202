use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials as S3Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tokio::runtime::{Builder, Runtime};
use tracing::debug;

use crate::config::{AwsCredentials, ObjectStoreConfig};
use crate::constants::DEFAULT_S3_REGION;
use crate::error::{EtlError, Result};

/// Blob storage addressed by bucket and key.
pub trait ObjectStore: Send + Sync {
    fn describe(&self) -> String;
    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;
    fn put(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<()>;
}

/// Amazon S3 (or an S3-compatible endpoint) through the AWS SDK.
///
/// The pipeline is synchronous, so the store owns a single-threaded runtime
/// and blocks on each request.
pub struct S3ObjectStore {
    client: Client,
    runtime: Runtime,
    endpoint: Option<String>,
}

impl S3ObjectStore {
    /// With `credentials` unset the SDK's default chain is used (environment,
    /// shared profile files, instance metadata).
    pub fn new(
        region: Option<&str>,
        endpoint: Option<&str>,
        credentials: Option<AwsCredentials>,
    ) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        if let Some(creds) = credentials {
            loader = loader.credentials_provider(S3Credentials::new(
                creds.access_key_id,
                creds.secret_access_key,
                creds.session_token,
                None,
                "sales_etl",
            ));
        }
        let shared = runtime.block_on(loader.load());

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if shared.region().is_none() {
            builder = builder.region(Region::new(DEFAULT_S3_REGION));
        }
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            runtime,
            endpoint: endpoint.map(|e| e.trim_end_matches('/').to_string()),
        })
    }
}

impl ObjectStore for S3ObjectStore {
    fn describe(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => "s3:/".to_string(),
        }
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        debug!(bucket, key, "fetching object");
        self.runtime.block_on(async {
            let output = self
                .client
                .get_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| {
                    let missing = e.as_service_error().is_some_and(|s| s.is_no_such_key());
                    if missing {
                        EtlError::Extraction(format!("object {bucket}/{key} does not exist"))
                    } else {
                        EtlError::Extraction(format!(
                            "GET {bucket}/{key} failed: {}",
                            DisplayErrorContext(&e)
                        ))
                    }
                })?;
            let body = output.body.collect().await.map_err(|e| {
                EtlError::Extraction(format!("reading {bucket}/{key} failed: {e}"))
            })?;
            Ok(body.into_bytes().to_vec())
        })
    }

    fn put(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<()> {
        debug!(bucket, key, bytes = bytes.len(), "uploading object");
        self.runtime.block_on(async {
            self.client
                .put_object()
                .bucket(bucket)
                .key(key)
                .content_type("text/csv")
                .body(ByteStream::from(bytes.to_vec()))
                .send()
                .await
                .map_err(|e| {
                    EtlError::Load(format!(
                        "PUT {bucket}/{key} failed: {}",
                        DisplayErrorContext(&e)
                    ))
                })?;
            Ok(())
        })
    }
}

/// Object store backed by a directory: objects live at `root/bucket/key`.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        let relative = Path::new(bucket).join(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes || bucket.is_empty() || key.is_empty() {
            return Err(EtlError::Configuration(format!(
                "invalid object location '{bucket}/{key}'"
            )));
        }
        Ok(self.root.join(relative))
    }
}

impl ObjectStore for LocalObjectStore {
    fn describe(&self) -> String {
        format!("file://{}", self.root.display())
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let path = self.path(bucket, key)?;
        fs::read(&path).map_err(|e| {
            EtlError::Extraction(format!("failed to read {}: {e}", path.display()))
        })
    }

    fn put(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        Ok(())
    }
}

pub fn from_config(
    config: &ObjectStoreConfig,
    credentials: Option<AwsCredentials>,
) -> Result<Arc<dyn ObjectStore>> {
    match config {
        ObjectStoreConfig::S3 { region, endpoint } => Ok(Arc::new(S3ObjectStore::new(
            region.as_deref(),
            endpoint.as_deref(),
            credentials,
        )?)),
        ObjectStoreConfig::Local { root } => Ok(Arc::new(LocalObjectStore::new(root.clone()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_store_round_trips_objects() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        store.put("bucket", "nested/raw.csv", b"a,b\n1,2\n").unwrap();
        assert_eq!(store.get("bucket", "nested/raw.csv").unwrap(), b"a,b\n1,2\n");
    }

    #[test]
    fn local_store_rejects_path_escapes() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        assert!(matches!(
            store.get("bucket", "../secret"),
            Err(EtlError::Configuration(_))
        ));
    }

    #[test]
    fn missing_local_object_is_an_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        assert!(matches!(
            store.get("bucket", "absent.csv"),
            Err(EtlError::Extraction(_))
        ));
    }

    /// Serves one canned HTTP response and hands back the request it received.
    fn serve_once(response: &'static str) -> (String, std::thread::JoinHandle<String>) {
        use std::io::{Read, Write};
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0_u8; 4096];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            stream.write_all(response.as_bytes()).unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });
        (endpoint, handle)
    }

    fn test_credentials() -> Option<AwsCredentials> {
        Some(AwsCredentials {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
            session_token: None,
        })
    }

    #[test]
    fn s3_get_signs_request_and_encodes_key() {
        let (endpoint, server) = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: text/csv\r\nContent-Length: 8\r\n\
             Connection: close\r\n\r\na,b\n1,2\n",
        );
        let store = S3ObjectStore::new(Some("us-east-1"), Some(&endpoint), test_credentials())
            .unwrap();

        let bytes = store.get("sales-bucket", "raw/q1#draft.csv").unwrap();
        assert_eq!(bytes, b"a,b\n1,2\n");

        let request = server.join().unwrap().to_ascii_lowercase();
        let request_line = request.lines().next().unwrap_or_default();
        assert!(
            request_line.starts_with("get /sales-bucket/raw/q1%23draft.csv"),
            "got: {request_line}"
        );
        assert!(request.contains("authorization: aws4-hmac-sha256 credential=akidexample/"));
    }

    #[test]
    fn s3_missing_object_is_an_extraction_error() {
        let (endpoint, server) = serve_once(
            "HTTP/1.1 404 Not Found\r\nContent-Type: application/xml\r\n\
             Content-Length: 0\r\nConnection: close\r\n\r\n",
        );
        let store = S3ObjectStore::new(Some("us-east-1"), Some(&endpoint), test_credentials())
            .unwrap();

        let err = store.get("sales-bucket", "absent.csv").unwrap_err();
        server.join().unwrap();
        assert!(matches!(err, EtlError::Extraction(_)), "got: {err}");
        assert_eq!(store.describe(), endpoint);
    }
}
