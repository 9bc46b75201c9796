//! S3 / S3-compatible storage backend.
//!
//! Credentials are resolved through the standard AWS chain (environment
//! variables, shared credentials file, instance profile). Setting an
//! endpoint URL targets MinIO, Ceph, or LocalStack and switches to
//! path-style addressing.
//!
//! Locators are either `s3://{bucket}/{key}` or an HTTP URL of the form
//! `{endpoint}/{bucket}/{key}`. Stored objects are returned as the latter
//! when a public endpoint is configured, so callers can hand them out.

use async_trait::async_trait;
use atelier_core::locator::Locator;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3Builder;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

use crate::error::TransferError;
use crate::gateway::{validate_destination, StorageGateway};

/// Connection settings for [`S3Storage`].
#[derive(Debug, Clone)]
pub struct S3Config {
    pub region: String,
    /// Bucket that receives stored artifacts.
    pub bucket: String,
    /// Custom service endpoint (MinIO etc). Enables path-style addressing.
    pub endpoint_url: Option<String>,
    /// Externally reachable base URL used when building returned locators.
    /// Falls back to `endpoint_url`, then to `s3://` locators.
    pub public_endpoint_url: Option<String>,
    pub force_path_style: bool,
}

impl S3Config {
    pub fn new(region: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            bucket: bucket.into(),
            endpoint_url: None,
            public_endpoint_url: None,
            force_path_style: false,
        }
    }

    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self.force_path_style = true;
        self
    }

    pub fn with_public_endpoint(mut self, url: impl Into<String>) -> Self {
        self.public_endpoint_url = Some(url.into());
        self
    }
}

/// Object storage backed by the AWS SDK.
pub struct S3Storage {
    client: Client,
    bucket: String,
    public_base: Option<String>,
}

impl S3Storage {
    pub async fn new(config: S3Config) -> Self {
        let region = aws_sdk_s3::config::Region::new(config.region.clone());
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region)
            .load()
            .await;

        let mut builder = S3Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }

        let public_base = config
            .public_endpoint_url
            .or(config.endpoint_url)
            .map(|url| url.trim_end_matches('/').to_string());

        tracing::info!(
            bucket = %config.bucket,
            region = %config.region,
            public_base = ?public_base,
            "S3 storage configured",
        );

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket,
            public_base,
        }
    }

    fn locator_for(&self, key: &str) -> Locator {
        match &self.public_base {
            Some(base) => Locator::new(format!("{base}/{}/{key}", self.bucket)),
            None => Locator::new(format!("s3://{}/{key}", self.bucket)),
        }
    }
}

/// Split a locator into `(bucket, key)`.
pub fn parse_locator(locator: &Locator) -> Result<(String, String), TransferError> {
    let raw = locator.as_str();
    let raw = raw.split(['?', '#']).next().unwrap_or(raw);

    let path = if let Some(rest) = raw.strip_prefix("s3://") {
        rest
    } else if let Some((_, rest)) = raw.split_once("://") {
        // Drop the authority; the first path segment is the bucket.
        match rest.split_once('/') {
            Some((_, path)) => path,
            None => return Err(TransferError::invalid_locator(locator, "missing bucket")),
        }
    } else {
        return Err(TransferError::invalid_locator(
            locator,
            "expected s3:// or http(s):// locator",
        ));
    };

    match path.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
            Ok((bucket.to_string(), key.to_string()))
        }
        _ => Err(TransferError::invalid_locator(
            locator,
            "expected {bucket}/{key}",
        )),
    }
}

#[async_trait]
impl StorageGateway for S3Storage {
    fn backend_name(&self) -> &'static str {
        "s3"
    }

    async fn fetch(&self, locator: &Locator) -> Result<Vec<u8>, TransferError> {
        let (bucket, key) = parse_locator(locator)?;
        tracing::debug!(%bucket, %key, "Downloading object from S3");

        let output = match self
            .client
            .get_object()
            .bucket(&bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(sdk_err) => {
                let service_err = sdk_err.into_service_error();
                if service_err.is_no_such_key() {
                    return Err(TransferError::NotFound(locator.clone()));
                }
                let message = format!("get s3://{bucket}/{key}: {service_err}");
                return Err(match service_err.code() {
                    Some("AccessDenied") | Some("InvalidAccessKeyId") => {
                        TransferError::AccessDenied(message)
                    }
                    Some("NoSuchBucket") => TransferError::NotFound(locator.clone()),
                    _ => TransferError::Backend(message),
                });
            }
        };

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| TransferError::Backend(format!("read s3://{bucket}/{key}: {e}")))?
            .into_bytes();
        Ok(bytes.to_vec())
    }

    async fn store(
        &self,
        bytes: Vec<u8>,
        destination_hint: &str,
    ) -> Result<Locator, TransferError> {
        validate_destination(destination_hint)?;
        let size = bytes.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(destination_hint)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| {
                let service_err = e.into_service_error();
                let message = format!("put s3://{}/{destination_hint}: {service_err}", self.bucket);
                match service_err.code() {
                    Some("AccessDenied") | Some("InvalidAccessKeyId") => {
                        TransferError::AccessDenied(message)
                    }
                    _ => TransferError::Backend(message),
                }
            })?;

        let locator = self.locator_for(destination_hint);
        tracing::info!(%locator, size, "Uploaded object to S3");
        Ok(locator)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parses_s3_scheme() {
        let (bucket, key) = parse_locator(&Locator::new("s3://inputs/cats/cat.png")).unwrap();
        assert_eq!(bucket, "inputs");
        assert_eq!(key, "cats/cat.png");
    }

    #[test]
    fn parses_path_style_url() {
        let (bucket, key) =
            parse_locator(&Locator::new("http://localhost:9000/artifacts/outputs/a.glb?x=1"))
                .unwrap();
        assert_eq!(bucket, "artifacts");
        assert_eq!(key, "outputs/a.glb");
    }

    #[test]
    fn rejects_malformed_locators() {
        for raw in [
            "cat.png",
            "http://localhost:9000",
            "http://localhost:9000/bucket-only",
            "s3://bucket/",
            "s3:///key",
        ] {
            assert_matches!(
                parse_locator(&Locator::new(raw)),
                Err(TransferError::InvalidLocator { .. }),
                "{raw}"
            );
        }
    }
}
