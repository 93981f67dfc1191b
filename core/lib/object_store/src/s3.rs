use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    operation::{
        get_object::GetObjectError, head_bucket::HeadBucketError, head_object::HeadObjectError,
    },
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart, ServerSideEncryption, StorageClass},
    Client,
};

use archiver_config::S3Config;

use crate::{
    error::ObjectStoreError,
    raw::{ObjectHead, PartEtag, RawObjectStore},
};

/// S3-compatible backend. A custom `endpoint` switches the client to
/// path-style addressing so MinIO-style stores resolve without wildcard DNS.
#[derive(Debug)]
pub struct S3Store {
    client: Client,
    bucket: String,
    storage_class: Option<StorageClass>,
    encryption: Option<ServerSideEncryption>,
}

impl S3Store {
    pub async fn new(config: &S3Config) -> Result<Self, ObjectStoreError> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(credentials) = &config.credentials {
            let (access_key, secret_key) =
                credentials
                    .resolve()
                    .map_err(|err| ObjectStoreError::Credentials {
                        message: err.to_string(),
                    })?;
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "archiver_config",
            ));
        }
        let shared_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared_config);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            storage_class: config
                .storage_class
                .as_deref()
                .map(StorageClass::from),
            encryption: config
                .encryption
                .as_deref()
                .map(ServerSideEncryption::from),
        })
    }

    /// Confirms the bucket exists and is reachable with the configured
    /// credentials before the first table run starts.
    pub async fn validate_bucket(&self) -> Result<(), ObjectStoreError> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|err| match &err {
                SdkError::ServiceError(context)
                    if matches!(context.err(), HeadBucketError::NotFound(_)) =>
                {
                    ObjectStoreError::BucketNotFound {
                        bucket: self.bucket.clone(),
                    }
                }
                _ => map_sdk_error(err, &self.bucket, ""),
            })?;
        Ok(())
    }
}

fn map_sdk_error<E>(err: SdkError<E>, bucket: &str, key: &str) -> ObjectStoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let code = err.code().map(str::to_owned);
    let message = format!(
        "s3 request for {bucket}/{key} failed: {}",
        DisplayErrorContext(&err)
    );
    match code.as_deref() {
        Some("NoSuchKey") | Some("NotFound") => ObjectStoreError::KeyNotFound {
            key: key.to_string(),
        },
        Some("NoSuchBucket") => ObjectStoreError::BucketNotFound {
            bucket: bucket.to_string(),
        },
        Some("SlowDown") => ObjectStoreError::SlowDown { retry_after: None },
        Some("AccessDenied") | Some("InvalidAccessKeyId") | Some("SignatureDoesNotMatch")
        | Some("ExpiredToken") => ObjectStoreError::Credentials { message },
        _ => match &err {
            SdkError::ServiceError(context) => {
                ObjectStoreError::from_http_status(context.raw().status().as_u16(), message)
            }
            // Dispatch/timeout/connector failures never reached the store.
            _ => ObjectStoreError::Transient { message },
        },
    }
}

#[async_trait]
impl RawObjectStore for S3Store {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), ObjectStoreError> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes));
        if let Some(storage_class) = &self.storage_class {
            request = request.storage_class(storage_class.clone());
        }
        if let Some(encryption) = &self.encryption {
            request = request.server_side_encryption(encryption.clone());
        }
        request
            .send()
            .await
            .map_err(|err| map_sdk_error(err, &self.bucket, key))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| match &err {
                SdkError::ServiceError(context)
                    if matches!(context.err(), GetObjectError::NoSuchKey(_)) =>
                {
                    ObjectStoreError::KeyNotFound {
                        key: key.to_string(),
                    }
                }
                _ => map_sdk_error(err, &self.bucket, key),
            })?;
        let bytes = response
            .body
            .collect()
            .await
            .map_err(|err| ObjectStoreError::Transient {
                message: format!("failed to read body of {key}: {err}"),
            })?;
        Ok(bytes.into_bytes().to_vec())
    }

    async fn head(&self, key: &str) -> Result<ObjectHead, ObjectStoreError> {
        let response = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| match &err {
                SdkError::ServiceError(context)
                    if matches!(context.err(), HeadObjectError::NotFound(_)) =>
                {
                    ObjectStoreError::KeyNotFound {
                        key: key.to_string(),
                    }
                }
                _ => map_sdk_error(err, &self.bucket, key),
            })?;
        Ok(ObjectHead {
            key: key.to_string(),
            size: response.content_length().unwrap_or(0) as u64,
        })
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        let mut keys = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|err| map_sdk_error(err, &self.bucket, prefix))?;
            for object in page.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }
        }
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| map_sdk_error(err, &self.bucket, key))?;
        Ok(())
    }

    async fn create_multipart(&self, key: &str) -> Result<String, ObjectStoreError> {
        let mut request = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key);
        if let Some(storage_class) = &self.storage_class {
            request = request.storage_class(storage_class.clone());
        }
        if let Some(encryption) = &self.encryption {
            request = request.server_side_encryption(encryption.clone());
        }
        let response = request
            .send()
            .await
            .map_err(|err| map_sdk_error(err, &self.bucket, key))?;
        response
            .upload_id()
            .map(str::to_owned)
            .ok_or_else(|| ObjectStoreError::Permanent {
                message: format!("create_multipart_upload for {key} returned no upload id"),
            })
    }

    async fn put_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        bytes: Vec<u8>,
    ) -> Result<PartEtag, ObjectStoreError> {
        let response = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|err| map_sdk_error(err, &self.bucket, key))?;
        Ok(PartEtag {
            part_number,
            etag: response.e_tag().unwrap_or_default().to_string(),
        })
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartEtag],
    ) -> Result<(), ObjectStoreError> {
        let completed_parts: Vec<CompletedPart> = parts
            .iter()
            .map(|part| {
                CompletedPart::builder()
                    .part_number(part.part_number)
                    .e_tag(&part.etag)
                    .build()
            })
            .collect();
        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed_parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|err| map_sdk_error(err, &self.bucket, key))?;
        Ok(())
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> Result<(), ObjectStoreError> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|err| map_sdk_error(err, &self.bucket, key))?;
        Ok(())
    }
}
