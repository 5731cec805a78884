use std::path::{Component, Path};

use async_trait::async_trait;
use aws_sdk_s3::error::ProvideErrorMetadata as _;
use aws_sdk_s3::primitives::ByteStream;
use walkdir::WalkDir;

use crate::staging::StagingDirectory;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Failed to upload s3://{0}/{1}: {2}")]
    Upload(String, String, String),

    #[error("I/O error on {0}: {1}")]
    Io(String, String),
}

#[async_trait]
pub trait ArtifactStore {
    fn bucket(&self) -> &str;

    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), Error>;
}

pub struct S3ArtifactStore {
    bucket: String,
    client: aws_sdk_s3::Client,
}

impl S3ArtifactStore {
    pub fn new(sdk_config: &aws_types::SdkConfig, bucket: &str) -> Self {
        return Self {
            bucket: bucket.to_string(),
            client: aws_sdk_s3::Client::new(sdk_config),
        };
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    fn bucket(&self) -> &str {
        return &self.bucket;
    }

    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), Error> {
        let result = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await;

        return match result {
            Ok(_) => Ok(()),
            Err(error) => {
                let message = match error.as_service_error() {
                    Some(service_error) => service_error
                        .message()
                        .unwrap_or("service error")
                        .to_string(),
                    None => aws_sdk_s3::error::DisplayErrorContext(&error).to_string(),
                };
                Err(Error::Upload(self.bucket.clone(), key.to_string(), message))
            }
        };
    }
}

/// `<name>/<name><ext>`, with `.txt` when the template has no extension.
pub fn template_key(stack_name: &str, template: &Path) -> String {
    let extension = match template.extension() {
        Some(extension) => format!(".{}", extension.to_string_lossy()),
        None => String::from(".txt"),
    };
    return format!("{}/{}{}", stack_name, stack_name, extension);
}

/// `<name>/extras/<path relative to the staging root>`.
pub fn extra_key(stack_name: &str, relative: &Path) -> String {
    let parts = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>();
    return format!("{}/extras/{}", stack_name, parts.join("/"));
}

pub fn template_url(region: &str, bucket: &str, key: &str) -> String {
    if region == "us-east-1" {
        return format!("https://s3.amazonaws.com/{}/{}", bucket, key);
    }
    return format!("https://s3.{}.amazonaws.com/{}/{}", region, bucket, key);
}

async fn upload_file<S>(store: &S, path: &Path, key: &str) -> Result<(), Error>
where
    S: ArtifactStore + ?Sized,
{
    let body = std::fs::read(path)
        .map_err(|error| Error::Io(path.display().to_string(), error.to_string()))?;
    tracing::debug!(key, bytes = body.len(), "uploading");
    return store.put_object(key, body).await;
}

/// Uploads every staged extra (directories recursively) and then the
/// template. Returns the template's object key.
pub async fn upload_staging<S>(
    store: &S,
    staging: &StagingDirectory,
    stack_name: &str,
) -> Result<String, Error>
where
    S: ArtifactStore + ?Sized,
{
    for entry in staging.entries() {
        let staged = staging.path().join(entry);
        let destination = format!(
            "s3://{}/{}",
            store.bucket(),
            extra_key(stack_name, Path::new(entry))
        );
        tracing::info!(extra = %entry, %destination, "uploading extra");

        for file in WalkDir::new(&staged).sort_by_file_name() {
            let file = file.map_err(|error| Error::Io(staged.display().to_string(), error.to_string()))?;
            if !file.file_type().is_file() {
                continue;
            }

            let relative = match file.path().strip_prefix(staging.path()) {
                Ok(relative) => relative,
                Err(error) => {
                    return Err(Error::Io(file.path().display().to_string(), error.to_string()))
                }
            };
            upload_file(store, file.path(), &extra_key(stack_name, relative)).await?;
        }
    }

    let key = template_key(stack_name, staging.template_path());
    let destination = format!("s3://{}/{}", store.bucket(), key);
    tracing::info!(%destination, "uploading template");
    upload_file(store, staging.template_path(), &key).await?;

    return Ok(key);
}
