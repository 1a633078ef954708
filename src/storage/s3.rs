//! S3-compatible object store
//!
//! Wraps a `rust-s3` bucket handle. Reads stream the object body, writes are
//! piped through an in-process duplex into a streaming upload that only
//! completes once the writer is closed.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::region::Region;
use s3::Bucket;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;
use tokio_util::io::StreamReader;
use tracing::debug;

use super::{ListPage, ListQuery, ObjectAttributes, ObjectReader, ObjectStore, ObjectWriter};
use crate::config::StorageConfig;
use crate::error::{Error, Result};

/// Capacity of the pipe between the SFTP write path and the upload task
const UPLOAD_PIPE_CAPACITY: usize = 1024 * 1024;

fn backend_error(err: S3Error) -> Error {
    Error::Backend(err.to_string())
}

fn check_status(key: &str, status: u16) -> Result<()> {
    match status {
        200..=299 => Ok(()),
        404 => Err(Error::NotExist(key.to_string())),
        other => Err(Error::Backend(format!("{}: HTTP status {}", key, other))),
    }
}

fn parse_rfc3339(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| DateTime::<Utc>::from(std::time::UNIX_EPOCH))
}

fn parse_rfc2822(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc2822(value)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| DateTime::<Utc>::from(std::time::UNIX_EPOCH))
}

/// A single S3 bucket
pub struct S3Store {
    bucket: Arc<Bucket>,
}

impl S3Store {
    /// Build the bucket handle from storage configuration.
    ///
    /// Credentials fall back to the standard AWS environment and profile
    /// lookup when no static keys are configured.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let region = match &config.endpoint {
            Some(endpoint) => Region::Custom {
                region: config.region.clone(),
                endpoint: endpoint.clone(),
            },
            None => config
                .region
                .parse()
                .map_err(|e| Error::Config(format!("invalid region {}: {}", config.region, e)))?,
        };

        let credentials = match (&config.access_key, &config.secret_key) {
            (Some(access), Some(secret)) => {
                Credentials::new(Some(access), Some(secret), None, None, None)
            }
            _ => Credentials::new(None, None, None, None, None),
        }
        .map_err(|e| Error::Config(format!("invalid S3 credentials: {}", e)))?;

        let mut bucket = Bucket::new(&config.bucket, region, credentials).map_err(backend_error)?;
        if config.path_style {
            bucket = bucket.with_path_style();
        }

        Ok(Self {
            bucket: Arc::from(bucket),
        })
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn open_read(&self, key: &str) -> Result<ObjectReader> {
        let response = self
            .bucket
            .get_object_stream(key)
            .await
            .map_err(backend_error)?;
        check_status(key, response.status_code)?;

        let body = response
            .bytes
            .map(|chunk| chunk.map_err(|e| io::Error::other(e.to_string())));
        Ok(Box::new(StreamReader::new(body)))
    }

    fn open_write(&self, key: &str) -> Box<dyn ObjectWriter> {
        let (pipe, mut reader) = tokio::io::duplex(UPLOAD_PIPE_CAPACITY);
        let bucket = Arc::clone(&self.bucket);
        let path = key.to_string();

        let upload = tokio::spawn(async move {
            bucket
                .put_object_stream(&mut reader, &path)
                .await
                .map_err(backend_error)?;
            Ok(())
        });

        Box::new(S3Writer {
            key: key.to_string(),
            pipe: Some(pipe),
            upload: Some(upload),
        })
    }

    async fn attributes(&self, key: &str) -> Result<ObjectAttributes> {
        let (head, status) = self.bucket.head_object(key).await.map_err(backend_error)?;
        check_status(key, status)?;

        let size = head.content_length.unwrap_or(0).max(0) as u64;
        let updated = head
            .last_modified
            .as_deref()
            .map(parse_rfc2822)
            .unwrap_or_else(Utc::now);

        Ok(ObjectAttributes::object(key, size, updated))
    }

    async fn list_page(&self, query: &ListQuery, token: Option<String>) -> Result<ListPage> {
        let delimiter = if query.delimiter.is_empty() {
            None
        } else {
            Some(query.delimiter.clone())
        };

        let (result, status) = self
            .bucket
            .list_page(
                query.prefix.clone(),
                delimiter,
                token,
                None,
                Some(query.page_size),
            )
            .await
            .map_err(backend_error)?;
        check_status(&query.prefix, status)?;

        let mut entries: Vec<ObjectAttributes> = result
            .contents
            .into_iter()
            .map(|o| ObjectAttributes::object(o.key, o.size, parse_rfc3339(&o.last_modified)))
            .collect();
        entries.extend(
            result
                .common_prefixes
                .unwrap_or_default()
                .into_iter()
                .map(|p| ObjectAttributes::common_prefix(p.prefix)),
        );
        // S3 reports objects and prefixes separately; restore key order
        entries.sort_by(|a, b| a.sort_key().cmp(b.sort_key()));

        let next = if result.is_truncated {
            result.next_continuation_token
        } else {
            None
        };

        Ok(ListPage { entries, next })
    }

    fn describe(&self) -> String {
        format!("s3 bucket {}", self.bucket.name())
    }
}

/// Streaming upload into one S3 object
struct S3Writer {
    key: String,
    pipe: Option<DuplexStream>,
    upload: Option<JoinHandle<Result<()>>>,
}

impl S3Writer {
    async fn finish_upload(&mut self) -> Result<()> {
        match self.upload.take() {
            Some(upload) => upload
                .await
                .map_err(|e| Error::Backend(format!("upload of {} aborted: {}", self.key, e)))?,
            None => Err(Error::Closed),
        }
    }
}

#[async_trait]
impl ObjectWriter for S3Writer {
    async fn write(&mut self, chunk: Bytes) -> Result<()> {
        let pipe = self.pipe.as_mut().ok_or(Error::Closed)?;
        if pipe.write_all(&chunk).await.is_err() {
            // The upload task dropped its end; report why
            self.pipe = None;
            self.finish_upload().await?;
            return Err(Error::Backend(format!(
                "upload of {} ended before all data was written",
                self.key
            )));
        }
        Ok(())
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        if let Some(mut pipe) = self.pipe.take() {
            pipe.shutdown().await?;
        }
        self.finish_upload().await?;
        debug!("Committed object {}", self.key);
        Ok(())
    }
}

impl Drop for S3Writer {
    fn drop(&mut self) {
        // An unclosed writer must not commit the partial body it has seen
        if let Some(upload) = self.upload.take() {
            upload.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;

    #[test]
    fn test_status_classification() {
        assert!(check_status("a", 200).is_ok());
        assert!(check_status("a", 404).unwrap_err().is_not_exist());
        assert!(matches!(check_status("a", 500), Err(Error::Backend(_))));
    }

    #[test]
    fn test_timestamp_parsing() {
        let t = parse_rfc3339("2024-01-02T03:04:05.000Z");
        assert_eq!(t.timestamp(), 1704164645);

        let t = parse_rfc2822("Tue, 02 Jan 2024 03:04:05 GMT");
        assert_eq!(t.timestamp(), 1704164645);

        assert_eq!(parse_rfc3339("garbage").timestamp(), 0);
    }

    #[test]
    fn test_from_config_with_custom_endpoint() {
        let config = StorageConfig {
            backend: BackendKind::S3,
            bucket: "uploads".into(),
            endpoint: Some("http://127.0.0.1:9000".into()),
            access_key: Some("minio".into()),
            secret_key: Some("minio123".into()),
            path_style: true,
            ..StorageConfig::default()
        };

        let store = S3Store::from_config(&config).unwrap();
        assert_eq!(store.describe(), "s3 bucket uploads");
    }
}
