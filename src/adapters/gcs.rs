use std::{
    io::Write,
    path::Path,
    time::{Duration, SystemTime},
};

use google_cloud_storage::{
    client::{Client, ClientConfig},
    http::{
        objects::{
            copy::CopyObjectRequest,
            delete::DeleteObjectRequest,
            download::Range,
            get::GetObjectRequest,
            list::ListObjectsRequest,
            upload::{Media, UploadObjectRequest, UploadType},
            Object,
        },
        Error,
    },
    sign::SignedURLOptions,
};
use tokio::runtime::Handle;
use tracing::debug;

use crate::{
    adapters,
    model::{
        client::{ListOptions, ListPage, ListedObject, ObjectMetadata, SignOptions},
        config::ObjectOptions,
        error::{ErrorKind, FSError},
    },
    util,
};

/// Google Cloud Storage backend. Page tokens stand in for listing markers.
pub struct GcsClient {
    client: Client,
    handle: Handle,
}

impl GcsClient {
    pub fn new(client: Client, handle: Handle) -> Self {
        Self { client, handle }
    }

    /// Builds a client from application default credentials and the current runtime.
    pub async fn from_env() -> Result<Self, FSError> {
        let config = ClientConfig::default().with_auth().await.map_err(|err| {
            FSError::new(
                ErrorKind::PermissionDenied,
                format!("failed to load gcs credentials, {}", err),
            )
        })?;

        Ok(Self::new(Client::new(config), Handle::current()))
    }

    fn upload(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        options: &ObjectOptions,
    ) -> Result<ObjectMetadata, FSError> {
        if options.content_sha256.is_some() {
            debug!(key = key, "gcs does not accept sha256 digests, ignoring");
        }

        let req = UploadObjectRequest {
            bucket: bucket.to_string(),
            ..Default::default()
        };

        let upload_type = if options.content_md5.is_some() || options.user_metadata.is_some() {
            UploadType::Multipart(Box::new(Object {
                name: key.to_string(),
                content_type: options.content_type.clone(),
                md5_hash: options.content_md5.clone(),
                metadata: options.user_metadata.clone(),
                ..Default::default()
            }))
        } else {
            let mut media = Media::new(key.to_string());
            if let Some(content_type) = &options.content_type {
                media.content_type = content_type.clone().into();
            }
            media.content_length = Some(body.len() as u64);
            UploadType::Simple(media)
        };

        let obj = util::poll::poll_until_ready(
            &self.handle,
            self.client.upload_object(&req, body, &upload_type),
        )
        .map_err(|err| gcs_error(err, "put_object", key))?;

        Ok(to_metadata(&obj))
    }
}

fn to_system_time(updated: Option<time::OffsetDateTime>) -> Option<SystemTime> {
    updated.map(|updated| {
        SystemTime::UNIX_EPOCH + Duration::from_secs(updated.unix_timestamp().max(0) as u64)
    })
}

fn to_metadata(obj: &Object) -> ObjectMetadata {
    ObjectMetadata {
        content_length: Some(obj.size.max(0) as u64),
        content_type: obj.content_type.clone(),
        etag: Some(obj.etag.clone()).filter(|etag| !etag.is_empty()),
        content_md5: obj.md5_hash.clone(),
        date: None,
        last_modified: to_system_time(obj.updated),
        user_metadata: obj.metadata.clone(),
    }
}

fn gcs_error(err: Error, context: &str, key: &str) -> FSError {
    let kind = match &err {
        Error::Response(res) => ErrorKind::from_status(res.code),
        Error::HttpClient(_) => ErrorKind::Transient,
        Error::TokenSource(_) => ErrorKind::PermissionDenied,
        _ => ErrorKind::Unknown,
    };

    FSError::new(kind, format!("failed to {} at: {}, {}", context, key, err))
}

/// GCS answers 404 for a delete of a missing object; S3 treats it as done.
fn deleted(res: Result<(), Error>, key: &str) -> Result<(), FSError> {
    match res.map_err(|err| gcs_error(err, "delete_object", key)) {
        Err(err) if err.is_not_found() => {
            debug!(key = key, "already absent");
            Ok(())
        }
        res => res,
    }
}

impl adapters::ObjectClient for GcsClient {
    fn put_object_from_bytes(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        options: &ObjectOptions,
    ) -> Result<ObjectMetadata, FSError> {
        self.upload(bucket, key, body.to_vec(), options)
    }

    fn put_object_from_file(
        &self,
        bucket: &str,
        key: &str,
        file: &Path,
        options: &ObjectOptions,
    ) -> Result<ObjectMetadata, FSError> {
        let body = std::fs::read(file)?;
        self.upload(bucket, key, body, options)
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        _content_length: u64,
        content_md5: &str,
        options: &ObjectOptions,
    ) -> Result<ObjectMetadata, FSError> {
        let options = ObjectOptions {
            content_md5: Some(content_md5.to_string()),
            ..options.clone()
        };

        self.upload(bucket, key, body, &options)
    }

    fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        target_bucket: &str,
        target_key: &str,
    ) -> Result<(), FSError> {
        let req = CopyObjectRequest {
            source_bucket: source_bucket.to_string(),
            source_object: source_key.to_string(),
            destination_bucket: target_bucket.to_string(),
            destination_object: target_key.to_string(),
            ..Default::default()
        };

        util::poll::poll_until_ready(&self.handle, self.client.copy_object(&req))
            .map_err(|err| gcs_error(err, "copy_object", source_key))?;

        Ok(())
    }

    fn delete_object(&self, bucket: &str, key: &str) -> Result<(), FSError> {
        let req = DeleteObjectRequest {
            bucket: bucket.to_string(),
            object: key.to_string(),
            ..Default::default()
        };

        deleted(
            util::poll::poll_until_ready(&self.handle, self.client.delete_object(&req)),
            key,
        )
    }

    fn list_objects(&self, bucket: &str, options: &ListOptions) -> Result<ListPage, FSError> {
        let req = ListObjectsRequest {
            bucket: bucket.to_string(),
            prefix: Some(options.prefix.clone()),
            delimiter: Some(options.delimiter.clone()).filter(|d| !d.is_empty()),
            page_token: options.marker.clone(),
            max_results: options.max_keys,
            ..Default::default()
        };

        let lo = util::poll::poll_until_ready(&self.handle, self.client.list_objects(&req))
            .map_err(|err| gcs_error(err, "list_objects", &options.prefix))?;

        let contents = lo
            .items
            .unwrap_or_default()
            .into_iter()
            .map(|obj| ListedObject {
                size: obj.size.max(0) as u64,
                last_modified: to_system_time(obj.updated),
                etag: Some(obj.etag).filter(|etag| !etag.is_empty()),
                key: obj.name,
            })
            .collect();

        Ok(ListPage {
            contents,
            common_prefixes: lo.prefixes.unwrap_or_default(),
            is_truncated: lo.next_page_token.is_some(),
            next_marker: lo.next_page_token,
        })
    }

    fn get_object_metadata(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, FSError> {
        let req = GetObjectRequest {
            bucket: bucket.to_string(),
            object: key.to_string(),
            ..Default::default()
        };

        let obj = util::poll::poll_until_ready(&self.handle, self.client.get_object(&req))
            .map_err(|err| gcs_error(err, "get_object_metadata", key))?;

        Ok(to_metadata(&obj))
    }

    fn get_object_as_bytes(&self, bucket: &str, key: &str) -> Result<Vec<u8>, FSError> {
        let req = GetObjectRequest {
            bucket: bucket.to_string(),
            object: key.to_string(),
            ..Default::default()
        };

        util::poll::poll_until_ready(
            &self.handle,
            self.client.download_object(&req, &Range::default()),
        )
        .map_err(|err| gcs_error(err, "download_object", key))
    }

    fn get_object(
        &self,
        bucket: &str,
        key: &str,
        dest: &mut dyn Write,
    ) -> Result<ObjectMetadata, FSError> {
        let metadata = self.get_object_metadata(bucket, key)?;
        let bytes = self.get_object_as_bytes(bucket, key)?;
        dest.write_all(&bytes)?;

        Ok(metadata)
    }

    /// GCS v4 signatures always start at signing time, so `options.timestamp` only feeds the log.
    fn generate_presigned_url(
        &self,
        bucket: &str,
        key: &str,
        options: &SignOptions,
    ) -> Result<String, FSError> {
        debug!(key = key, expires_in = options.expiration.as_secs(), "signing");

        let opts = SignedURLOptions {
            expires: options.expiration,
            ..Default::default()
        };

        util::poll::poll_until_ready(
            &self.handle,
            self.client.signed_url(bucket, key, None, None, opts),
        )
        .map_err(|err| {
            FSError::new(
                ErrorKind::Unknown,
                format!("failed to presign: {}, {}", key, err),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use google_cloud_storage::http::error::ErrorResponse;

    use super::*;

    fn response(code: u16) -> Error {
        Error::Response(ErrorResponse {
            code,
            errors: Vec::new(),
            message: format!("status {}", code),
        })
    }

    #[test]
    fn test_gcs_error_kind() {
        let cases = vec![
            (response(404), ErrorKind::NotFound),
            (response(401), ErrorKind::PermissionDenied),
            (response(403), ErrorKind::PermissionDenied),
            (response(429), ErrorKind::Transient),
            (response(502), ErrorKind::Transient),
            (response(412), ErrorKind::InvalidArgument),
            (Error::TokenSource("expired".into()), ErrorKind::PermissionDenied),
            (Error::InvalidRangeHeader("bytes=x".to_string()), ErrorKind::Unknown),
        ];

        for (err, expected) in cases {
            let context = err.to_string();
            let err = gcs_error(err, "get_object", "dir/key");

            assert_eq!(err.kind, expected, "failed for case: {}", context);
            assert!(err.message.contains("get_object at: dir/key"), "{}", err.message);
        }
    }

    #[test]
    fn test_deleted_ignores_missing() {
        assert_eq!(deleted(Ok(()), "a"), Ok(()));
        assert_eq!(deleted(Err(response(404)), "a"), Ok(()));
        assert_eq!(
            deleted(Err(response(403)), "a").map_err(|err| err.kind),
            Err(ErrorKind::PermissionDenied)
        );
    }

    #[test]
    fn test_to_metadata() {
        let obj = Object {
            name: "dir/file".to_string(),
            size: 12,
            etag: "CJ2x".to_string(),
            content_type: Some("text/plain".to_string()),
            updated: Some(time::OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()),
            ..Default::default()
        };

        let metadata = to_metadata(&obj);

        assert_eq!(metadata.content_length, Some(12));
        assert_eq!(metadata.etag.as_deref(), Some("CJ2x"));
        assert_eq!(metadata.content_type.as_deref(), Some("text/plain"));
        assert_eq!(
            metadata.last_modified,
            Some(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000))
        );
    }

    #[test]
    fn test_to_metadata_empty_etag() {
        assert_eq!(to_metadata(&Object::default()).etag, None);
    }
}
