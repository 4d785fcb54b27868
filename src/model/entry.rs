use std::{collections::HashMap, io::Cursor};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryType {
    File,
    Dir,
}

/// Normalized view of an object or directory returned to callers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectEntry {
    pub path: String,
    pub kind: EntryType,
    pub size: Option<u64>,
    /// Unix epoch seconds.
    pub timestamp: Option<i64>,
    pub etag: Option<String>,
    pub mimetype: Option<String>,
    pub content_md5: Option<String>,
    pub user_metadata: Option<HashMap<String, String>>,
}

impl ObjectEntry {
    pub fn file(path: &str) -> Self {
        Self::bare(path, EntryType::File)
    }

    pub fn dir(path: &str) -> Self {
        Self::bare(path, EntryType::Dir)
    }

    fn bare(path: &str, kind: EntryType) -> Self {
        Self {
            path: path.to_string(),
            kind,
            size: None,
            timestamp: None,
            etag: None,
            mimetype: None,
            content_md5: None,
            user_metadata: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryType::Dir
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadResult {
    pub path: String,
    pub contents: Vec<u8>,
}

/// Object body buffered in memory and rewound to its start.
#[derive(Debug)]
pub struct StreamResult {
    pub path: String,
    pub stream: Cursor<Vec<u8>>,
}
