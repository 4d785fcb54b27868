use std::{io::Write, path::Path};

use crate::model::{
    client::{ListOptions, ListPage, ObjectMetadata, SignOptions},
    config::ObjectOptions,
    error::FSError,
};

pub mod gcs;
pub mod mock;
pub mod s3;

/// Blocking calls an object-storage backend has to provide.
///
/// Keys are passed through untouched: prefixing and normalization are the caller's concern.
pub trait ObjectClient {
    fn put_object_from_bytes(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        options: &ObjectOptions,
    ) -> Result<ObjectMetadata, FSError>;

    fn put_object_from_file(
        &self,
        bucket: &str,
        key: &str,
        file: &Path,
        options: &ObjectOptions,
    ) -> Result<ObjectMetadata, FSError>;

    /// Uploads a body whose length and base64 MD5 are already known.
    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_length: u64,
        content_md5: &str,
        options: &ObjectOptions,
    ) -> Result<ObjectMetadata, FSError>;

    fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        target_bucket: &str,
        target_key: &str,
    ) -> Result<(), FSError>;

    fn delete_object(&self, bucket: &str, key: &str) -> Result<(), FSError>;

    fn list_objects(&self, bucket: &str, options: &ListOptions) -> Result<ListPage, FSError>;

    fn get_object_metadata(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, FSError>;

    fn get_object_as_bytes(&self, bucket: &str, key: &str) -> Result<Vec<u8>, FSError>;

    /// Writes the object body into `dest` and returns the object's metadata.
    fn get_object(
        &self,
        bucket: &str,
        key: &str,
        dest: &mut dyn Write,
    ) -> Result<ObjectMetadata, FSError>;

    fn generate_presigned_url(
        &self,
        bucket: &str,
        key: &str,
        options: &SignOptions,
    ) -> Result<String, FSError>;
}
