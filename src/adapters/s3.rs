use std::{
    io::Write,
    path::Path,
    time::{Duration, SystemTime},
};

use aws_sdk_s3::{
    config::http::HttpResponse,
    error::{DisplayErrorContext, SdkError},
    operation::put_object::builders::PutObjectFluentBuilder,
    presigning::PresigningConfig,
    primitives::{ByteStream, DateTime},
    types::ChecksumAlgorithm,
};
use tokio::runtime::Handle;

use crate::{
    adapters,
    model::{
        client::{ListOptions, ListPage, ListedObject, ObjectMetadata, SignOptions},
        config::ObjectOptions,
        error::{ErrorKind, FSError},
    },
    util,
};

/// S3 backend. SDK futures are driven on the runtime behind `handle`.
#[derive(Clone, Debug)]
pub struct S3Client {
    client: aws_sdk_s3::Client,
    handle: Handle,
}

impl S3Client {
    pub fn new(client: aws_sdk_s3::Client, handle: Handle) -> Self {
        Self { client, handle }
    }

    /// Builds a client from the standard AWS environment and the current runtime.
    pub async fn from_env() -> Self {
        let config = aws_config::load_from_env().await;
        Self::new(aws_sdk_s3::Client::new(&config), Handle::current())
    }

    fn put_request(
        &self,
        bucket: &str,
        key: &str,
        body: ByteStream,
        options: &ObjectOptions,
    ) -> PutObjectFluentBuilder {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .set_content_type(options.content_type.clone())
            .set_content_length(options.content_length.map(|len| len as i64))
            .set_content_md5(options.content_md5.clone())
            .set_checksum_algorithm(
                options
                    .content_sha256
                    .as_ref()
                    .map(|_| ChecksumAlgorithm::Sha256),
            )
            .set_checksum_sha256(options.content_sha256.clone())
            .set_metadata(options.user_metadata.clone())
    }

    fn send_put(
        &self,
        key: &str,
        req: PutObjectFluentBuilder,
        options: &ObjectOptions,
        content_length: Option<u64>,
    ) -> Result<ObjectMetadata, FSError> {
        let po = util::poll::poll_until_ready(&self.handle, req.send())
            .map_err(|err| sdk_error(err, "put_object", key))?;

        Ok(ObjectMetadata {
            content_length: content_length.or(options.content_length),
            content_type: options.content_type.clone(),
            etag: po.e_tag().map(str::to_string),
            content_md5: options.content_md5.clone(),
            date: Some(SystemTime::now()),
            last_modified: None,
            user_metadata: options.user_metadata.clone(),
        })
    }
}

fn to_system_time(dt: Option<&DateTime>) -> Option<SystemTime> {
    dt.map(|dt| {
        SystemTime::UNIX_EPOCH + Duration::new(dt.secs().max(0) as u64, dt.subsec_nanos())
    })
}

/// `x-amz-copy-source` value: each key segment percent-encoded, separators kept.
fn copy_source(bucket: &str, key: &str) -> String {
    let key = key
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");

    format!("{}/{}", bucket, key)
}

fn sdk_error<E>(err: SdkError<E, HttpResponse>, context: &str, key: &str) -> FSError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let kind = match &err {
        SdkError::ConstructionFailure(_) => ErrorKind::InvalidArgument,
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => ErrorKind::Transient,
        SdkError::ResponseError(_) | SdkError::ServiceError(_) => err
            .raw_response()
            .map(|res| ErrorKind::from_status(res.status().as_u16()))
            .unwrap_or(ErrorKind::Unknown),
        _ => ErrorKind::Unknown,
    };

    FSError::new(
        kind,
        format!(
            "failed to {} at: {}, {}",
            context,
            key,
            DisplayErrorContext(&err)
        ),
    )
}

impl adapters::ObjectClient for S3Client {
    fn put_object_from_bytes(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        options: &ObjectOptions,
    ) -> Result<ObjectMetadata, FSError> {
        let req = self.put_request(bucket, key, ByteStream::from(body.to_vec()), options);
        self.send_put(key, req, options, Some(body.len() as u64))
    }

    fn put_object_from_file(
        &self,
        bucket: &str,
        key: &str,
        file: &Path,
        options: &ObjectOptions,
    ) -> Result<ObjectMetadata, FSError> {
        let body = util::poll::poll_until_ready(&self.handle, ByteStream::from_path(file))
            .map_err(|err| {
                FSError::invalid_argument(format!(
                    "failed to open {} for: {}, {}",
                    file.display(),
                    key,
                    err
                ))
            })?;

        let req = self.put_request(bucket, key, body, options);
        self.send_put(key, req, options, None)
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_length: u64,
        content_md5: &str,
        options: &ObjectOptions,
    ) -> Result<ObjectMetadata, FSError> {
        let options = ObjectOptions {
            content_length: Some(content_length),
            content_md5: Some(content_md5.to_string()),
            ..options.clone()
        };

        let req = self.put_request(bucket, key, ByteStream::from(body), &options);
        self.send_put(key, req, &options, Some(content_length))
    }

    fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        target_bucket: &str,
        target_key: &str,
    ) -> Result<(), FSError> {
        let req = self
            .client
            .copy_object()
            .copy_source(copy_source(source_bucket, source_key))
            .bucket(target_bucket)
            .key(target_key);

        util::poll::poll_until_ready(&self.handle, req.send())
            .map_err(|err| sdk_error(err, "copy_object", source_key))?;

        Ok(())
    }

    fn delete_object(&self, bucket: &str, key: &str) -> Result<(), FSError> {
        let req = self.client.delete_object().bucket(bucket).key(key);

        util::poll::poll_until_ready(&self.handle, req.send())
            .map_err(|err| sdk_error(err, "delete_object", key))?;

        Ok(())
    }

    fn list_objects(&self, bucket: &str, options: &ListOptions) -> Result<ListPage, FSError> {
        let mut req = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(&options.prefix)
            .set_max_keys(options.max_keys);

        if !options.delimiter.is_empty() {
            req = req.delimiter(&options.delimiter);
        }

        if let Some(tok) = &options.marker {
            req = req.continuation_token(tok);
        }

        let lo = util::poll::poll_until_ready(&self.handle, req.send())
            .map_err(|err| sdk_error(err, "list_objects", &options.prefix))?;

        let contents = lo
            .contents()
            .iter()
            .map(|o| ListedObject {
                key: o.key().unwrap_or("").to_string(),
                size: o.size().unwrap_or(0).max(0) as u64,
                last_modified: to_system_time(o.last_modified()),
                etag: o.e_tag().map(str::to_string),
            })
            .collect();

        let common_prefixes = lo
            .common_prefixes()
            .iter()
            .filter_map(|cp| cp.prefix().map(str::to_string))
            .collect();

        Ok(ListPage {
            contents,
            common_prefixes,
            is_truncated: lo.is_truncated().unwrap_or(false),
            next_marker: lo.next_continuation_token().map(str::to_string),
        })
    }

    fn get_object_metadata(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, FSError> {
        let req = self.client.head_object().bucket(bucket).key(key);

        let ho = util::poll::poll_until_ready(&self.handle, req.send())
            .map_err(|err| sdk_error(err, "head_object", key))?;

        Ok(ObjectMetadata {
            content_length: ho.content_length().map(|len| len.max(0) as u64),
            content_type: ho.content_type().map(str::to_string),
            etag: ho.e_tag().map(str::to_string),
            content_md5: None,
            date: None,
            last_modified: to_system_time(ho.last_modified()),
            user_metadata: ho.metadata().cloned(),
        })
    }

    fn get_object_as_bytes(&self, bucket: &str, key: &str) -> Result<Vec<u8>, FSError> {
        let mut body = Vec::new();
        self.get_object(bucket, key, &mut body)?;

        Ok(body)
    }

    fn get_object(
        &self,
        bucket: &str,
        key: &str,
        dest: &mut dyn Write,
    ) -> Result<ObjectMetadata, FSError> {
        let req = self.client.get_object().bucket(bucket).key(key);

        let o = util::poll::poll_until_ready(&self.handle, req.send())
            .map_err(|err| sdk_error(err, "get_object", key))?;

        let metadata = ObjectMetadata {
            content_length: o.content_length().map(|len| len.max(0) as u64),
            content_type: o.content_type().map(str::to_string),
            etag: o.e_tag().map(str::to_string),
            content_md5: None,
            date: None,
            last_modified: to_system_time(o.last_modified()),
            user_metadata: o.metadata().cloned(),
        };

        let bytes = util::poll::poll_until_ready(&self.handle, o.body.collect()).map_err(|err| {
            FSError::new(
                ErrorKind::Transient,
                format!("failed to collect body: {}, {}", key, err),
            )
        })?;

        dest.write_all(&bytes.into_bytes())?;

        Ok(metadata)
    }

    fn generate_presigned_url(
        &self,
        bucket: &str,
        key: &str,
        options: &SignOptions,
    ) -> Result<String, FSError> {
        let config = PresigningConfig::builder()
            .start_time(options.timestamp)
            .expires_in(options.expiration)
            .build()
            .map_err(|err| {
                FSError::invalid_argument(format!("failed to presign: {}, {}", key, err))
            })?;

        let req = self.client.get_object().bucket(bucket).key(key);
        let presigned = util::poll::poll_until_ready(&self.handle, req.presigned(config))
            .map_err(|err| sdk_error(err, "presign", key))?;

        Ok(presigned.uri().to_string())
    }
}
