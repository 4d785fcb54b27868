use std::{
    collections::HashMap,
    time::{Duration, SystemTime},
};

/// Object attributes as reported by a client, before normalization.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub content_md5: Option<String>,
    pub date: Option<SystemTime>,
    pub last_modified: Option<SystemTime>,
    pub user_metadata: Option<HashMap<String, String>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub prefix: String,
    /// Empty for a flat listing of every descendant.
    pub delimiter: String,
    pub marker: Option<String>,
    pub max_keys: Option<i32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListedObject {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<SystemTime>,
    pub etag: Option<String>,
}

/// One page of a listing call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListPage {
    pub contents: Vec<ListedObject>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_marker: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SignOptions {
    pub timestamp: SystemTime,
    pub expiration: Duration,
}

impl SignOptions {
    pub fn starting_now(expiration: Duration) -> Self {
        Self {
            timestamp: SystemTime::now(),
            expiration,
        }
    }

    pub fn expires_at(&self) -> SystemTime {
        self.timestamp + self.expiration
    }
}
