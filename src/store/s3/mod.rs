//! S3 cache store
//!
//! Talks to the S3 REST API directly: every request is built and signed
//! per call (see [`signing`]), object bodies are streamed between the
//! socket and the filesystem, and listings follow continuation tokens until
//! the bucket is exhausted. Nothing is retried; any failure is returned to
//! the caller as an error.

mod listing;
pub mod signing;

use listing::{parse_list_page, ListPage};
pub use signing::S3Credentials;

use super::{CacheStore, ObjectInfo};
use crate::config::{Environment, S3Settings};
use crate::error::{StepCacheError, StepCacheResult};
use crate::hash::{hash_file, EMPTY_DIGEST};
use async_trait::async_trait;
use chrono::Utc;
use signing::{canonical_query, sign, uri_encode, RequestParts};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use ureq::SendBody;

const DEFAULT_REGION: &str = "us-east-1";
const LIST_PAGE_SIZE: &str = "1000";

/// Cache store backed by an S3 bucket
pub struct S3Store {
    credentials: S3Credentials,
    bucket: String,
    region: String,
    /// `scheme://host[:port]`
    base_url: String,
    /// `host[:port]`, as signed
    host: String,
    /// Custom endpoints use `/bucket/key` paths
    path_style: bool,
    agent: ureq::Agent,
}

impl S3Store {
    /// Create a store for `bucket`, optionally on a custom endpoint
    pub fn new(
        credentials: S3Credentials,
        bucket: impl Into<String>,
        region: impl Into<String>,
        endpoint: Option<&str>,
    ) -> StepCacheResult<Self> {
        let bucket = bucket.into();
        let region = region.into();

        let (base_url, host, path_style) = match endpoint {
            Some(endpoint) => {
                let (base_url, host) = split_endpoint(endpoint)?;
                (base_url, host, true)
            }
            None => {
                let host = format!("{}.s3.{}.amazonaws.com", bucket, region);
                (format!("https://{}", host), host, false)
            }
        };

        // Non-2xx responses are inspected, not turned into transport errors
        let mut builder = ureq::Agent::config_builder().http_status_as_error(false);
        if is_loopback(&host) {
            builder = builder.proxy(None);
        }
        let agent = ureq::Agent::new_with_config(builder.build());

        Ok(Self {
            credentials,
            bucket,
            region,
            base_url,
            host,
            path_style,
            agent,
        })
    }

    /// Create a store from config, falling back to environment variables
    pub fn from_config(settings: &S3Settings, env: &Environment) -> StepCacheResult<Self> {
        let access_key_id = env.get("AWS_ACCESS_KEY_ID");
        let secret_access_key = env.get("AWS_SECRET_ACCESS_KEY");
        let bucket = settings
            .bucket
            .as_deref()
            .or_else(|| env.get("STEPCACHE_S3_BUCKET_NAME"));

        let mut missing = Vec::new();
        if access_key_id.is_none() {
            missing.push("AWS_ACCESS_KEY_ID".to_string());
        }
        if secret_access_key.is_none() {
            missing.push("AWS_SECRET_ACCESS_KEY".to_string());
        }
        if bucket.is_none() {
            missing.push("STEPCACHE_S3_BUCKET_NAME".to_string());
        }

        let (Some(access_key_id), Some(secret_access_key), Some(bucket)) =
            (access_key_id, secret_access_key, bucket)
        else {
            return Err(StepCacheError::MissingCredentials(missing));
        };

        let region = settings
            .region
            .as_deref()
            .or_else(|| env.get("STEPCACHE_S3_REGION"))
            .unwrap_or(DEFAULT_REGION);
        let endpoint = settings
            .endpoint
            .as_deref()
            .or_else(|| env.get("STEPCACHE_S3_ENDPOINT"));

        let credentials = S3Credentials {
            access_key_id: access_key_id.to_string(),
            secret_access_key: secret_access_key.to_string(),
            session_token: env.get("AWS_SESSION_TOKEN").map(str::to_string),
        };

        Self::new(credentials, bucket, region, endpoint)
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn object_path(&self, key: &str) -> String {
        if self.path_style {
            format!("/{}/{}", self.bucket, key)
        } else {
            format!("/{}", key)
        }
    }

    fn bucket_path(&self) -> String {
        if self.path_style {
            format!("/{}", self.bucket)
        } else {
            "/".to_string()
        }
    }

    /// Build the URL and signed headers for one request
    fn signed_request(
        &self,
        method: &str,
        path: &str,
        query: &[(String, String)],
        extra_headers: &[(String, String)],
        payload_hash: &str,
    ) -> (String, Vec<(String, String)>) {
        let parts = RequestParts {
            method,
            host: &self.host,
            path,
            query,
            headers: extra_headers,
            payload_hash,
        };
        let headers = sign(&self.credentials, &self.region, &parts, Utc::now());

        let mut url = format!("{}{}", self.base_url, uri_encode(path, false));
        if !query.is_empty() {
            url.push('?');
            url.push_str(&canonical_query(query));
        }
        (url, headers)
    }

    /// Fetch one listing page body
    async fn list_page(&self, continuation_token: Option<&str>) -> StepCacheResult<ListPage> {
        let mut query = vec![
            ("list-type".to_string(), "2".to_string()),
            ("max-keys".to_string(), LIST_PAGE_SIZE.to_string()),
        ];
        if let Some(token) = continuation_token {
            query.push(("continuation-token".to_string(), token.to_string()));
        }

        let (url, headers) = self.signed_request(
            "GET",
            &self.bucket_path(),
            &query,
            &requester_pays(),
            EMPTY_DIGEST,
        );
        let agent = self.agent.clone();
        let bucket = self.bucket.clone();

        let body = run_blocking(move || {
            let mut request = agent.get(url.as_str());
            for (name, value) in &headers {
                request = request.header(name.as_str(), value.as_str());
            }
            let mut response = request
                .call()
                .map_err(|e| StepCacheError::transport("LIST", &bucket, e))?;

            let status = response.status().as_u16();
            let body = response
                .body_mut()
                .read_to_string()
                .map_err(|e| StepCacheError::transport("LIST", &bucket, e))?;
            if status != 200 {
                return Err(StepCacheError::HttpStatus {
                    method: "LIST",
                    key: bucket,
                    status,
                    body,
                });
            }
            Ok(body)
        })
        .await?;

        parse_list_page(&body)
    }
}

#[async_trait]
impl CacheStore for S3Store {
    async fn get_object(&self, key: &str, destination: &Path) -> StepCacheResult<bool> {
        let (url, headers) = self.signed_request("GET", &self.object_path(key), &[], &[], EMPTY_DIGEST);
        let agent = self.agent.clone();
        let key = key.to_string();
        let destination = destination.to_path_buf();

        run_blocking(move || {
            let mut request = agent
                .get(url.as_str())
                .header("accept", "application/octet-stream");
            for (name, value) in &headers {
                request = request.header(name.as_str(), value.as_str());
            }
            let mut response = request
                .call()
                .map_err(|e| StepCacheError::transport("GET", &key, e))?;

            match response.status().as_u16() {
                404 => {
                    debug!("S3 cache miss for {}", key);
                    Ok(false)
                }
                200 => {
                    let reader = response.into_body().into_reader();
                    let written = stream_to_file(reader, &destination)
                        .map_err(|e| StepCacheError::transport("GET", &key, e))?;
                    debug!("Downloaded {} ({} bytes)", key, written);
                    Ok(true)
                }
                status => Err(StepCacheError::HttpStatus {
                    method: "GET",
                    key,
                    status,
                    body: response.body_mut().read_to_string().unwrap_or_default(),
                }),
            }
        })
        .await
    }

    async fn put_object(&self, key: &str, source: &Path) -> StepCacheResult<()> {
        let content_hash = hash_file(source).await?;
        let size = tokio::fs::metadata(source)
            .await
            .map_err(|e| StepCacheError::io(format!("reading {}", source.display()), e))?
            .len();

        let (url, headers) = self.signed_request("PUT", &self.object_path(key), &[], &[], &content_hash);
        let agent = self.agent.clone();
        let key = key.to_string();
        let source = source.to_path_buf();

        run_blocking(move || {
            let mut file = File::open(&source)
                .map_err(|e| StepCacheError::io(format!("opening {}", source.display()), e))?;

            let mut request = agent
                .put(url.as_str())
                .header("content-type", "application/octet-stream")
                .header("content-length", size.to_string());
            for (name, value) in &headers {
                request = request.header(name.as_str(), value.as_str());
            }
            let mut response = request
                .send(SendBody::from_reader(&mut file))
                .map_err(|e| StepCacheError::transport("PUT", &key, e))?;

            let status = response.status().as_u16();
            if status != 200 {
                return Err(StepCacheError::HttpStatus {
                    method: "PUT",
                    key,
                    status,
                    body: response.body_mut().read_to_string().unwrap_or_default(),
                });
            }

            debug!("Uploaded {} ({} bytes)", key, size);
            Ok(())
        })
        .await
    }

    async fn list_objects(&self) -> StepCacheResult<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let page = self.list_page(token.as_deref()).await?;
            debug!("Listed {} objects", page.objects.len());
            objects.extend(page.objects);

            match page.next_continuation_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        Ok(objects)
    }

    async fn delete_object(&self, key: &str) -> StepCacheResult<()> {
        let (url, headers) = self.signed_request(
            "DELETE",
            &self.object_path(key),
            &[],
            &requester_pays(),
            EMPTY_DIGEST,
        );
        let agent = self.agent.clone();
        let key = key.to_string();

        run_blocking(move || {
            let mut request = agent.delete(url.as_str());
            for (name, value) in &headers {
                request = request.header(name.as_str(), value.as_str());
            }
            let mut response = request
                .call()
                .map_err(|e| StepCacheError::transport("DELETE", &key, e))?;

            let status = response.status().as_u16();
            if status >= 300 {
                return Err(StepCacheError::HttpStatus {
                    method: "DELETE",
                    key,
                    status,
                    body: response.body_mut().read_to_string().unwrap_or_default(),
                });
            }
            Ok(())
        })
        .await
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}

/// Signed onto LIST and DELETE so requester-pays buckets accept them
fn requester_pays() -> [(String, String); 1] {
    [("x-amz-request-payer".to_string(), "requester".to_string())]
}

/// Run blocking HTTP work off the async runtime
async fn run_blocking<T, F>(f: F) -> StepCacheResult<T>
where
    F: FnOnce() -> StepCacheResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StepCacheError::Internal(format!("request task panicked: {}", e)))?
}

/// Copy a response body to `destination`, removing the file on failure so a
/// half-written download is never mistaken for a cache entry
fn stream_to_file(mut reader: impl Read, destination: &Path) -> io::Result<u64> {
    let result = (|| -> io::Result<u64> {
        let mut file = File::create(destination)?;
        let written = io::copy(&mut reader, &mut file)?;
        file.flush()?;
        Ok(written)
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(destination);
    }
    result
}

/// Split `http(s)://host[:port][/]` into base URL and host
fn split_endpoint(endpoint: &str) -> StepCacheResult<(String, String)> {
    let trimmed = endpoint.trim_end_matches('/');
    let host = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .filter(|h| !h.is_empty() && !h.contains('/'))
        .ok_or_else(|| StepCacheError::ConfigInvalid {
            path: PathBuf::from("store.s3.endpoint"),
            reason: format!("'{}' is not an http(s)://host[:port] URL", endpoint),
        })?;
    Ok((trimmed.to_string(), host.to_string()))
}

fn is_loopback(host: &str) -> bool {
    let name = host.rsplit_once(':').map_or(host, |(name, _)| name);
    matches!(name, "localhost" | "127.0.0.1" | "[::1]")
}
