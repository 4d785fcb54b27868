use std::{
    collections::{BTreeMap, HashMap},
    io::Write,
    path::Path,
    sync::{Mutex, MutexGuard},
    time::{SystemTime, UNIX_EPOCH},
};

use crate::{
    adapters,
    model::{
        client::{ListOptions, ListPage, ListedObject, ObjectMetadata, SignOptions},
        config::ObjectOptions,
        error::{ErrorKind, FSError},
    },
    util,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Put,
    Copy,
    Delete,
    List,
    Head,
    Get,
    Sign,
}

#[derive(Clone, Debug)]
struct Fault {
    operation: Operation,
    key: Option<String>,
    after: usize,
    kind: ErrorKind,
}

#[derive(Clone, Debug)]
struct StoredObject {
    body: Vec<u8>,
    metadata: ObjectMetadata,
}

/// In-memory object store with S3-like listing semantics and injectable failures.
#[derive(Default)]
pub struct MockClient {
    buckets: Mutex<HashMap<String, BTreeMap<String, StoredObject>>>,
    faults: Mutex<Vec<Fault>>,
    calls: Mutex<HashMap<Operation, usize>>,
    page_size: Option<usize>,
}

enum ListItem {
    Object(String),
    Prefix(String),
}

impl ListItem {
    fn as_str(&self) -> &str {
        match self {
            ListItem::Object(key) => key,
            ListItem::Prefix(prefix) => prefix,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, FSError> {
    mutex.lock().map_err(|err| {
        FSError::new(
            ErrorKind::Unknown,
            format!("failed to acquire guard: {}", err),
        )
    })
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps every listing page at `page_size` entries.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size: Some(page_size.max(1)),
            ..Self::default()
        }
    }

    /// Makes every `operation` on `key` (or on any key when `None`) fail with `kind`.
    pub fn fail(&self, operation: Operation, key: Option<&str>, kind: ErrorKind) {
        self.fail_after(operation, key, 0, kind);
    }

    /// Like `fail`, but the first `after` calls of `operation` still succeed.
    pub fn fail_after(
        &self,
        operation: Operation,
        key: Option<&str>,
        after: usize,
        kind: ErrorKind,
    ) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.push(Fault {
                operation,
                key: key.map(str::to_string),
                after,
                kind,
            });
        }
    }

    pub fn clear_faults(&self) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.clear();
        }
    }

    pub fn call_count(&self, operation: Operation) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(&operation).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.buckets
            .lock()
            .map(|buckets| buckets.get(bucket).is_some_and(|objects| objects.contains_key(key)))
            .unwrap_or(false)
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .lock()
            .map(|buckets| {
                buckets
                    .get(bucket)
                    .map(|objects| objects.keys().cloned().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    fn enter(&self, operation: Operation, key: &str) -> Result<(), FSError> {
        let count = {
            let mut calls = lock(&self.calls)?;
            let count = calls.entry(operation).or_insert(0);
            *count += 1;
            *count
        };

        let faults = lock(&self.faults)?;
        let fault = faults.iter().find(|fault| {
            fault.operation == operation
                && fault.key.as_deref().map_or(true, |k| k == key)
                && count > fault.after
        });

        match fault {
            Some(fault) => Err(FSError::new(
                fault.kind,
                format!("injected {:?} failure at: {}", operation, key),
            )),
            None => Ok(()),
        }
    }

    fn store(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        options: &ObjectOptions,
    ) -> Result<ObjectMetadata, FSError> {
        let now = SystemTime::now();
        let metadata = ObjectMetadata {
            content_length: Some(body.len() as u64),
            content_type: options.content_type.clone(),
            etag: Some(format!("\"{:x}\"", md5::compute(&body))),
            content_md5: Some(util::digest::content_md5(&body)),
            date: Some(now),
            last_modified: Some(now),
            user_metadata: options.user_metadata.clone(),
        };

        lock(&self.buckets)?
            .entry(bucket.to_string())
            .or_default()
            .insert(
                key.to_string(),
                StoredObject {
                    body,
                    metadata: metadata.clone(),
                },
            );

        Ok(metadata)
    }

    fn fetch(&self, bucket: &str, key: &str) -> Result<StoredObject, FSError> {
        lock(&self.buckets)?
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .cloned()
            .ok_or_else(|| FSError::not_found(format!("no such key: {}", key)))
    }
}

impl adapters::ObjectClient for MockClient {
    fn put_object_from_bytes(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        options: &ObjectOptions,
    ) -> Result<ObjectMetadata, FSError> {
        self.enter(Operation::Put, key)?;
        self.store(bucket, key, body.to_vec(), options)
    }

    fn put_object_from_file(
        &self,
        bucket: &str,
        key: &str,
        file: &Path,
        options: &ObjectOptions,
    ) -> Result<ObjectMetadata, FSError> {
        self.enter(Operation::Put, key)?;
        let body = std::fs::read(file)?;
        self.store(bucket, key, body, options)
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
        self.enter(Operation::Put, key)?;

        if body.len() as u64 != content_length {
            return Err(FSError::invalid_argument(format!(
                "content length {} does not match body of {} bytes at: {}",
                content_length,
                body.len(),
                key
            )));
        }

        if util::digest::content_md5(&body) != content_md5 {
            return Err(FSError::invalid_argument(format!("bad digest at: {}", key)));
        }

        self.store(bucket, key, body, options)
    }

    fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        target_bucket: &str,
        target_key: &str,
    ) -> Result<(), FSError> {
        self.enter(Operation::Copy, source_key)?;
        let source = self.fetch(source_bucket, source_key)?;

        lock(&self.buckets)?
            .entry(target_bucket.to_string())
            .or_default()
            .insert(target_key.to_string(), source);

        Ok(())
    }

    fn delete_object(&self, bucket: &str, key: &str) -> Result<(), FSError> {
        self.enter(Operation::Delete, key)?;

        if let Some(objects) = lock(&self.buckets)?.get_mut(bucket) {
            objects.remove(key);
        }

        Ok(())
    }

    fn list_objects(&self, bucket: &str, options: &ListOptions) -> Result<ListPage, FSError> {
        self.enter(Operation::List, &options.prefix)?;

        let buckets = lock(&self.buckets)?;
        let objects = match buckets.get(bucket) {
            Some(objects) => objects,
            None => return Ok(ListPage::default()),
        };

        let mut items: Vec<ListItem> = Vec::new();
        for key in objects.keys().filter(|key| key.starts_with(&options.prefix)) {
            let rest = &key[options.prefix.len()..];
            let grouped = if options.delimiter.is_empty() {
                None
            } else {
                rest.find(options.delimiter.as_str()).map(|pos| {
                    format!(
                        "{}{}",
                        options.prefix,
                        &rest[..pos + options.delimiter.len()]
                    )
                })
            };

            match grouped {
                Some(prefix) => {
                    if !matches!(items.last(), Some(ListItem::Prefix(last)) if *last == prefix) {
                        items.push(ListItem::Prefix(prefix));
                    }
                }
                None => items.push(ListItem::Object(key.clone())),
            }
        }

        let remaining: Vec<ListItem> = items
            .into_iter()
            .filter(|item| match &options.marker {
                Some(marker) if !marker.is_empty() => item.as_str() > marker.as_str(),
                _ => true,
            })
            .collect();

        let limit = match (options.max_keys, self.page_size) {
            (Some(max), Some(size)) => (max.max(1) as usize).min(size),
            (Some(max), None) => max.max(1) as usize,
            (None, Some(size)) => size,
            (None, None) => usize::MAX,
        };

        let is_truncated = remaining.len() > limit;
        let mut page = ListPage {
            is_truncated,
            ..ListPage::default()
        };

        for item in remaining.into_iter().take(limit) {
            page.next_marker = Some(item.as_str().to_string());
            match item {
                ListItem::Object(key) => {
                    let stored = &objects[&key];
                    page.contents.push(ListedObject {
                        size: stored.body.len() as u64,
                        last_modified: stored.metadata.last_modified,
                        etag: stored.metadata.etag.clone(),
                        key,
                    });
                }
                ListItem::Prefix(prefix) => page.common_prefixes.push(prefix),
            }
        }

        if !is_truncated {
            page.next_marker = None;
        }

        Ok(page)
    }

    fn get_object_metadata(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, FSError> {
        self.enter(Operation::Head, key)?;
        Ok(self.fetch(bucket, key)?.metadata)
    }

    fn get_object_as_bytes(&self, bucket: &str, key: &str) -> Result<Vec<u8>, FSError> {
        self.enter(Operation::Get, key)?;
        Ok(self.fetch(bucket, key)?.body)
    }

    fn get_object(
        &self,
        bucket: &str,
        key: &str,
        dest: &mut dyn Write,
    ) -> Result<ObjectMetadata, FSError> {
        self.enter(Operation::Get, key)?;
        let stored = self.fetch(bucket, key)?;
        dest.write_all(&stored.body)?;

        Ok(stored.metadata)
    }

    fn generate_presigned_url(
        &self,
        bucket: &str,
        key: &str,
        options: &SignOptions,
    ) -> Result<String, FSError> {
        self.enter(Operation::Sign, key)?;

        let since_epoch = |time: SystemTime| {
            time.duration_since(UNIX_EPOCH)
                .map(|since| since.as_secs())
                .map_err(|err| FSError::invalid_argument(err.to_string()))
        };

        Ok(format!(
            "memory://{}/{}?X-Date={}&X-Expires={}&Expires={}",
            bucket,
            key,
            since_epoch(options.timestamp)?,
            options.expiration.as_secs(),
            since_epoch(options.expires_at())?
        ))
    }
}
