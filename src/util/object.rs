use crate::model::error::FSError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    AWS,
    GCS,
}

/// Bucket location parsed from `s3://bucket/prefix` or `gs://bucket/prefix`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketUri {
    pub provider: Provider,
    pub bucket: String,
    pub prefix: String,
}

pub fn parse_provider_from_uri(bucket_uri: &str) -> Result<Provider, FSError> {
    if bucket_uri.starts_with("s3://") {
        Ok(Provider::AWS)
    } else if bucket_uri.starts_with("gs://") {
        Ok(Provider::GCS)
    } else {
        Err(FSError::invalid_argument(format!(
            "failed to parse provider of: {}",
            bucket_uri
        )))
    }
}

pub fn parse_bucket_uri(bucket_uri: &str) -> Result<BucketUri, FSError> {
    let provider = parse_provider_from_uri(bucket_uri)?;
    let rest = bucket_uri
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or("");

    let (bucket, prefix) = match rest.split_once('/') {
        Some((bucket, prefix)) => (bucket, prefix),
        None => (rest, ""),
    };

    if bucket.is_empty() {
        return Err(FSError::invalid_argument(format!(
            "failed to parse bucket of: {}",
            bucket_uri
        )));
    }

    Ok(BucketUri {
        provider,
        bucket: bucket.to_string(),
        prefix: prefix.to_string(),
    })
}
