use std::{collections::HashMap, path::PathBuf};

/// Per-call upload settings recognized by the adapter.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Config {
    pub mimetype: Option<String>,
    pub content_length: Option<u64>,
    /// Base64 encoded MD5 of the body.
    pub content_md5: Option<String>,
    /// Base64 encoded SHA-256 of the body.
    pub content_sha256: Option<String>,
    pub user_metadata: Option<HashMap<String, String>>,
    /// Local file holding the same bytes as a streamed body. When set the client uploads the file
    /// directly instead of buffering the stream.
    pub file: Option<PathBuf>,
}

impl Config {
    pub fn with_mimetype(mut self, mimetype: &str) -> Self {
        self.mimetype = Some(mimetype.to_string());
        self
    }

    pub fn with_content_length(mut self, length: u64) -> Self {
        self.content_length = Some(length);
        self
    }

    pub fn with_content_md5(mut self, md5: &str) -> Self {
        self.content_md5 = Some(md5.to_string());
        self
    }

    pub fn with_content_sha256(mut self, sha256: &str) -> Self {
        self.content_sha256 = Some(sha256.to_string());
        self
    }

    pub fn with_user_metadata(mut self, key: &str, value: &str) -> Self {
        self.user_metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Request attributes forwarded verbatim to the client.
    pub fn object_options(&self) -> ObjectOptions {
        ObjectOptions {
            content_type: self.mimetype.clone(),
            content_length: self.content_length,
            content_md5: self.content_md5.clone(),
            content_sha256: self.content_sha256.clone(),
            user_metadata: self.user_metadata.clone(),
        }
    }
}

/// Request attributes attached to an upload.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectOptions {
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub content_md5: Option<String>,
    pub content_sha256: Option<String>,
    pub user_metadata: Option<HashMap<String, String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_options() {
        let config = Config::default()
            .with_mimetype("text/plain")
            .with_content_length(5)
            .with_content_md5("XUFAKrxLKna5cZ2REBfFkg==")
            .with_user_metadata("owner", "ops")
            .with_file("/tmp/ignored");

        let options = config.object_options();

        assert_eq!(options.content_type.as_deref(), Some("text/plain"));
        assert_eq!(options.content_length, Some(5));
        assert_eq!(
            options.content_md5.as_deref(),
            Some("XUFAKrxLKna5cZ2REBfFkg==")
        );
        assert_eq!(options.content_sha256, None);
        assert_eq!(
            options.user_metadata.unwrap().get("owner").map(String::as_str),
            Some("ops")
        );
    }

    #[test]
    fn test_default_is_empty() {
        assert_eq!(Config::default().object_options(), ObjectOptions::default());
    }
}
