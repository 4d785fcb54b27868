use std::{
    io::{Cursor, Read},
    iter,
    time::{Duration, SystemTime},
};

use tracing::{debug, span, Level};

use crate::{
    adapters::ObjectClient,
    model::{
        client::{ListOptions, ObjectMetadata, SignOptions},
        config::Config,
        entry::{EntryType, ObjectEntry, ReadResult, StreamResult},
        error::{ErrorKind, FSError},
        report::StepReport,
    },
    util::{
        self,
        path::{self, PathPrefix, SEPARATOR},
    },
};

pub const DEFAULT_URL_EXPIRATION: Duration = Duration::from_secs(600);

/// Filesystem-style view over one bucket of an object store.
///
/// Every path handed in is resolved against the configured prefix exactly once before it reaches
/// the client. Paths handed back are relative to that prefix, except from `list_contents_raw`.
pub struct StorageAdapter<'a, C: ObjectClient + ?Sized> {
    client: &'a C,
    bucket: String,
    prefix: PathPrefix,
}

fn log_failure<T>(res: Result<T, FSError>, group: &str) -> Result<T, FSError> {
    res.map_err(|err| {
        debug!(
            error_message = %err,
            error_kind = err.kind.as_str(),
            error_group = group
        );
        err
    })
}

fn unix_seconds(time: SystemTime) -> Option<i64> {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .ok()
        .map(|since| since.as_secs() as i64)
}

impl<'a, C: ObjectClient + ?Sized> StorageAdapter<'a, C> {
    pub fn new(client: &'a C, bucket: &str, prefix: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            prefix: PathPrefix::new(prefix),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Points the adapter at another bucket. Empty names are ignored.
    pub fn set_bucket(&mut self, bucket: &str) {
        if !bucket.is_empty() {
            self.bucket = bucket.to_string();
        }
    }

    pub fn prefix(&self) -> &str {
        self.prefix.as_str()
    }

    pub fn apply_prefix(&self, path: &str) -> String {
        self.prefix.apply(path)
    }

    pub fn remove_prefix<'p>(&self, key: &'p str) -> &'p str {
        self.prefix.remove(key)
    }

    /// `path` as every normalizing operation hands it back: relative to the prefix, no leading
    /// separator.
    fn relative(&self, path: &str) -> String {
        path.trim_start_matches(SEPARATOR).to_string()
    }

    pub fn write(
        &self,
        path: &str,
        contents: &[u8],
        config: &Config,
    ) -> Result<ObjectEntry, FSError> {
        let span = span!(Level::DEBUG, "write", context = "write");
        let _e = span.enter();
        debug!(path = path, size = contents.len(), "called");

        self.upload_bytes(path, contents, config)
    }

    /// Uploads everything `resource` yields. The source is consumed and dropped before returning,
    /// whichever way the upload ends.
    pub fn write_stream<R: Read>(
        &self,
        path: &str,
        resource: R,
        config: &Config,
    ) -> Result<ObjectEntry, FSError> {
        let span = span!(Level::DEBUG, "write_stream", context = "write_stream");
        let _e = span.enter();
        debug!(path = path, "called");

        self.upload_stream(path, resource, config)
    }

    pub fn update(
        &self,
        path: &str,
        contents: &[u8],
        config: &Config,
    ) -> Result<ObjectEntry, FSError> {
        let span = span!(Level::DEBUG, "update", context = "update");
        let _e = span.enter();
        debug!(path = path, size = contents.len(), "called");

        self.upload_bytes(path, contents, config)
    }

    pub fn update_stream<R: Read>(
        &self,
        path: &str,
        resource: R,
        config: &Config,
    ) -> Result<ObjectEntry, FSError> {
        let span = span!(Level::DEBUG, "update_stream", context = "update_stream");
        let _e = span.enter();
        debug!(path = path, "called");

        self.upload_stream(path, resource, config)
    }

    fn upload_bytes(
        &self,
        path: &str,
        contents: &[u8],
        config: &Config,
    ) -> Result<ObjectEntry, FSError> {
        let key = self.apply_prefix(path);
        let options = config.object_options();

        let metadata = log_failure(
            self.client
                .put_object_from_bytes(&self.bucket, &key, contents, &options),
            "put_object",
        )?;

        Ok(self.normalize_response(&metadata, &key))
    }

    fn upload_stream<R: Read>(
        &self,
        path: &str,
        mut resource: R,
        config: &Config,
    ) -> Result<ObjectEntry, FSError> {
        let key = self.apply_prefix(path);
        let mut options = config.object_options();

        if let Some(file) = &config.file {
            drop(resource);
            let metadata = log_failure(
                self.client
                    .put_object_from_file(&self.bucket, &key, file, &options),
                "put_object_from_file",
            )?;

            return Ok(self.normalize_response(&metadata, &key));
        }

        let mut body = Vec::new();
        let read = match options.content_length.take() {
            Some(length) => resource
                .by_ref()
                .take(length)
                .read_to_end(&mut body)
                .map_err(FSError::from)
                .and_then(|_| {
                    if (body.len() as u64) < length {
                        Err(FSError::invalid_argument(format!(
                            "stream for {} ended after {} of {} bytes",
                            key,
                            body.len(),
                            length
                        )))
                    } else {
                        Ok(())
                    }
                }),
            None => resource.read_to_end(&mut body).map(|_| ()).map_err(FSError::from),
        };
        drop(resource);
        log_failure(read, "read_stream_source")?;

        let content_length = body.len() as u64;
        let content_md5 = match options.content_md5.take() {
            Some(md5) => md5,
            None => util::digest::content_md5(&body),
        };

        let metadata = log_failure(
            self.client.put_object(
                &self.bucket,
                &key,
                body,
                content_length,
                &content_md5,
                &options,
            ),
            "put_object",
        )?;

        Ok(self.normalize_response(&metadata, &key))
    }

    /// Maps client metadata for `key` onto an entry relative to the prefix.
    fn normalize_response(&self, metadata: &ObjectMetadata, key: &str) -> ObjectEntry {
        let path = self.remove_prefix(key);

        let timestamp = metadata
            .last_modified
            .or(metadata.date)
            .and_then(unix_seconds);

        if path::is_dir_key(path) {
            let mut entry = ObjectEntry::dir(path::trim_dir(path));
            entry.timestamp = timestamp;
            return entry;
        }

        ObjectEntry {
            path: path.to_string(),
            kind: EntryType::File,
            size: metadata.content_length,
            timestamp,
            etag: metadata.etag.clone(),
            mimetype: metadata.content_type.clone(),
            content_md5: metadata.content_md5.clone(),
            user_metadata: metadata.user_metadata.clone(),
        }
    }

    /// Copies `path` to `newpath`, then deletes `path`.
    ///
    /// `Err` means the copy failed and nothing changed. A failed delete after a successful copy
    /// is reported through the returned `StepReport`, with both objects still present.
    pub fn rename(&self, path: &str, newpath: &str) -> Result<StepReport, FSError> {
        let span = span!(Level::DEBUG, "rename", context = "rename");
        let _e = span.enter();
        debug!(path = path, newpath = newpath, "called");

        self.copy(path, newpath)?;

        let mut report = StepReport {
            completed: vec![self.relative(newpath)],
            ..StepReport::default()
        };

        let source = self.relative(path);
        match self.delete(&source) {
            Ok(()) => report.completed.push(source),
            Err(err) => report.failed = Some((source, err)),
        }

        Ok(report)
    }

    pub fn copy(&self, path: &str, newpath: &str) -> Result<(), FSError> {
        let span = span!(Level::DEBUG, "copy", context = "copy");
        let _e = span.enter();
        debug!(path = path, newpath = newpath, "called");

        let source = self.apply_prefix(path);
        let target = self.apply_prefix(newpath);

        log_failure(
            self.client
                .copy_object(&self.bucket, &source, &self.bucket, &target),
            "copy_object",
        )
    }

    pub fn delete(&self, path: &str) -> Result<(), FSError> {
        let span = span!(Level::DEBUG, "delete", context = "delete");
        let _e = span.enter();
        debug!(path = path, "called");

        let key = self.apply_prefix(path);
        log_failure(self.client.delete_object(&self.bucket, &key), "delete_object")
    }

    /// Deletes every object below `dirname`, then its marker object.
    ///
    /// Deletes run one at a time and stop at the first failure; objects already deleted stay
    /// deleted. `Err` is returned only when the listing fails, before anything was removed.
    pub fn delete_directory(&self, dirname: &str) -> Result<StepReport, FSError> {
        let span = span!(Level::DEBUG, "delete_directory", context = "delete_directory");
        let _e = span.enter();
        debug!(dirname = dirname, "called");

        if path::trim_dir(dirname.trim_start_matches(SEPARATOR)).is_empty() {
            return log_failure(
                Err(FSError::invalid_argument(
                    "refusing to delete the adapter root",
                )),
                "delete_directory",
            );
        }

        let marker = self.relative(&path::dir_key(dirname));
        let paths = self
            .list_contents_raw(dirname, true)?
            .into_iter()
            .map(|entry| self.remove_prefix(&entry.path).to_string())
            .chain(iter::once(marker));

        let report = StepReport::run(paths, |path| {
            let key = self.apply_prefix(path);
            self.client.delete_object(&self.bucket, &key)
        });

        if let Some((path, err)) = &report.failed {
            debug!(
                error_message = %err,
                error_kind = err.kind.as_str(),
                error_group = "delete_object",
                path = path.as_str(),
                deleted = report.completed.len(),
                skipped = report.skipped.len()
            );
        }

        Ok(report)
    }

    /// Lists `directory` with paths relative to the prefix and without trailing separators.
    pub fn list_contents(
        &self,
        directory: &str,
        recursive: bool,
    ) -> Result<Vec<ObjectEntry>, FSError> {
        let entries = self.list_contents_raw(directory, recursive)?;

        Ok(entries
            .into_iter()
            .map(|mut entry| {
                entry.path = path::trim_dir(self.remove_prefix(&entry.path)).to_string();
                entry
            })
            .collect())
    }

    /// Lists `directory` with paths exactly as the client stores them, prefix and trailing
    /// separators included.
    ///
    /// Pages are followed until the listing is no longer truncated. A failure on any page fails
    /// the whole call; pages already fetched are discarded.
    pub fn list_contents_raw(
        &self,
        directory: &str,
        recursive: bool,
    ) -> Result<Vec<ObjectEntry>, FSError> {
        let span = span!(Level::DEBUG, "list_contents", context = "list_contents");
        let _e = span.enter();
        debug!(directory = directory, recursive = recursive, "called");

        let directory = directory.trim_matches(SEPARATOR);
        let list_prefix = if directory.is_empty() {
            self.apply_prefix("")
        } else {
            self.apply_prefix(&path::dir_key(directory))
        };

        let mut options = ListOptions {
            prefix: list_prefix.clone(),
            delimiter: if recursive {
                String::new()
            } else {
                SEPARATOR.to_string()
            },
            ..ListOptions::default()
        };

        let mut entries = Vec::new();
        let mut pages = 0;
        loop {
            let page = log_failure(
                self.client.list_objects(&self.bucket, &options),
                "list_objects",
            )?;
            pages += 1;

            for object in page.contents {
                if object.key == list_prefix {
                    continue;
                }

                let kind = if path::is_dir_key(&object.key) {
                    EntryType::Dir
                } else {
                    EntryType::File
                };

                entries.push(ObjectEntry {
                    kind,
                    size: Some(object.size),
                    timestamp: object.last_modified.and_then(unix_seconds),
                    etag: object.etag,
                    ..ObjectEntry::file(&object.key)
                });
            }

            for prefix in page.common_prefixes {
                entries.push(ObjectEntry::dir(&prefix));
            }

            if !page.is_truncated {
                break;
            }

            options.marker = match page.next_marker {
                Some(marker) => Some(marker),
                None => {
                    return log_failure(
                        Err(FSError::new(
                            ErrorKind::Unknown,
                            format!("truncated listing without a marker at: {}", list_prefix),
                        )),
                        "list_objects",
                    );
                }
            };
        }

        debug!(entries = entries.len(), pages = pages, "listed");

        Ok(entries)
    }

    /// Uploads an empty marker object at `dirname/`.
    pub fn create_directory(&self, dirname: &str, config: &Config) -> Result<ObjectEntry, FSError> {
        let span = span!(Level::DEBUG, "create_directory", context = "create_directory");
        let _e = span.enter();
        debug!(dirname = dirname, "called");

        let key = self.apply_prefix(&path::dir_key(dirname));
        if path::trim_dir(&key).is_empty() {
            return log_failure(
                Err(FSError::invalid_argument(
                    "cannot create a marker at the bucket root",
                )),
                "create_directory",
            );
        }

        let metadata = log_failure(
            self.client.put_object_from_bytes(
                &self.bucket,
                &key,
                &[],
                &config.object_options(),
            ),
            "put_object",
        )?;

        let mut entry = ObjectEntry::dir(path::trim_dir(self.remove_prefix(&key)));
        entry.timestamp = metadata
            .last_modified
            .or(metadata.date)
            .and_then(unix_seconds);

        Ok(entry)
    }

    /// `Ok(false)` only when the store reports the object missing; other failures are errors.
    pub fn has(&self, path: &str) -> Result<bool, FSError> {
        let span = span!(Level::DEBUG, "has", context = "has");
        let _e = span.enter();
        debug!(path = path, "called");

        let key = self.apply_prefix(path);
        match self.client.get_object_metadata(&self.bucket, &key) {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => log_failure(Err(err), "get_object_metadata"),
        }
    }

    pub fn read(&self, path: &str) -> Result<ReadResult, FSError> {
        let span = span!(Level::DEBUG, "read", context = "read");
        let _e = span.enter();
        debug!(path = path, "called");

        let key = self.apply_prefix(path);
        let contents = log_failure(
            self.client.get_object_as_bytes(&self.bucket, &key),
            "get_object",
        )?;

        Ok(ReadResult {
            path: self.remove_prefix(&key).to_string(),
            contents,
        })
    }

    /// Buffers the object into memory and returns it rewound to the first byte. Response metadata
    /// is not carried over; use `get_metadata` for it.
    pub fn read_stream(&self, path: &str) -> Result<StreamResult, FSError> {
        let span = span!(Level::DEBUG, "read_stream", context = "read_stream");
        let _e = span.enter();
        debug!(path = path, "called");

        let key = self.apply_prefix(path);
        let mut stream = Cursor::new(Vec::new());
        log_failure(
            self.client.get_object(&self.bucket, &key, &mut stream),
            "get_object",
        )?;
        stream.set_position(0);

        Ok(StreamResult {
            path: self.remove_prefix(&key).to_string(),
            stream,
        })
    }

    pub fn get_metadata(&self, path: &str) -> Result<ObjectEntry, FSError> {
        let span = span!(Level::DEBUG, "get_metadata", context = "get_metadata");
        let _e = span.enter();
        debug!(path = path, "called");

        let key = self.apply_prefix(path);
        let metadata = log_failure(
            self.client.get_object_metadata(&self.bucket, &key),
            "get_object_metadata",
        )?;

        Ok(self.normalize_response(&metadata, &key))
    }

    pub fn get_size(&self, path: &str) -> Result<ObjectEntry, FSError> {
        self.get_metadata(path)
    }

    pub fn get_mimetype(&self, path: &str) -> Result<ObjectEntry, FSError> {
        self.get_metadata(path)
    }

    pub fn get_timestamp(&self, path: &str) -> Result<ObjectEntry, FSError> {
        self.get_metadata(path)
    }

    pub fn get_url(&self, path: &str) -> Result<String, FSError> {
        self.get_temporary_link(path, DEFAULT_URL_EXPIRATION)
    }

    /// Pre-signed URL valid from now for `expire`.
    pub fn get_temporary_link(&self, path: &str, expire: Duration) -> Result<String, FSError> {
        let span = span!(Level::DEBUG, "get_temporary_link", context = "get_temporary_link");
        let _e = span.enter();
        debug!(path = path, expire = expire.as_secs(), "called");

        let key = self.apply_prefix(path);
        log_failure(
            self.client.generate_presigned_url(
                &self.bucket,
                &key,
                &SignOptions::starting_now(expire),
            ),
            "generate_presigned_url",
        )
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, io, rc::Rc};

    use super::*;
    use crate::adapters::mock::{MockClient, Operation};

    const BUCKET: &str = "dummy-bucket";

    struct DropProbe {
        inner: Cursor<Vec<u8>>,
        dropped: Rc<Cell<bool>>,
    }

    impl DropProbe {
        fn new(body: &[u8]) -> (Self, Rc<Cell<bool>>) {
            let dropped = Rc::new(Cell::new(false));
            let probe = DropProbe {
                inner: Cursor::new(body.to_vec()),
                dropped: dropped.clone(),
            };
            (probe, dropped)
        }
    }

    impl Read for DropProbe {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl Drop for DropProbe {
        fn drop(&mut self) {
            self.dropped.set(true);
        }
    }

    fn seed(adapter: &StorageAdapter<MockClient>, paths: &[&str]) {
        for path in paths {
            adapter
                .write(path, path.as_bytes(), &Config::default())
                .unwrap();
        }
    }

    fn paths(entries: &[ObjectEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.path.as_str()).collect()
    }

    #[test]
    fn test_write_then_read() {
        let client = MockClient::new();
        let adapter = StorageAdapter::new(&client, BUCKET, "root");

        let cases = vec![
            ("file.txt", b"hello".to_vec()),
            ("/nested/file.bin", vec![0u8, 1, 2, 255]),
            ("empty", Vec::new()),
        ];

        for (path, body) in cases {
            adapter.write(path, &body, &Config::default()).unwrap();
            let result = adapter.read(path).unwrap();

            assert_eq!(result.contents, body, "failed on `contents` for case: {}", path);
            assert_eq!(
                result.path,
                path.trim_start_matches('/'),
                "failed on `path` for case: {}",
                path
            );
        }

        assert!(client.contains(BUCKET, "root/nested/file.bin"));
    }

    #[test]
    fn test_write_normalizes_response() {
        let client = MockClient::new();
        let adapter = StorageAdapter::new(&client, BUCKET, "root/");

        let config = Config::default()
            .with_mimetype("text/plain")
            .with_user_metadata("owner", "ops");
        let entry = adapter.write("docs/a.txt", b"hello", &config).unwrap();

        assert_eq!(entry.path, "docs/a.txt");
        assert_eq!(entry.kind, EntryType::File);
        assert_eq!(entry.size, Some(5));
        assert_eq!(entry.mimetype.as_deref(), Some("text/plain"));
        assert_eq!(entry.content_md5.as_deref(), Some("XUFAKrxLKna5cZ2REBfFkg=="));
        assert!(entry.timestamp.is_some());
        assert_eq!(
            entry
                .user_metadata
                .as_ref()
                .and_then(|m| m.get("owner"))
                .map(String::as_str),
            Some("ops")
        );

        let entry = adapter.update("docs/", b"", &Config::default()).unwrap();
        assert_eq!(entry.path, "docs");
        assert_eq!(entry.kind, EntryType::Dir);
        assert_eq!(entry.size, None);
    }

    #[test]
    fn test_write_stream_computes_length_and_md5() {
        let client = MockClient::new();
        let adapter = StorageAdapter::new(&client, BUCKET, "");

        let (probe, dropped) = DropProbe::new(b"hello");
        let entry = adapter
            .write_stream("a.txt", probe, &Config::default())
            .unwrap();

        assert!(dropped.get());
        assert_eq!(entry.size, Some(5));
        assert_eq!(entry.content_md5.as_deref(), Some("XUFAKrxLKna5cZ2REBfFkg=="));
        assert_eq!(adapter.read("a.txt").unwrap().contents, b"hello");
    }

    #[test]
    fn test_write_stream_honors_content_length() {
        let client = MockClient::new();
        let adapter = StorageAdapter::new(&client, BUCKET, "");

        let config = Config::default().with_content_length(3);
        adapter
            .update_stream("short", Cursor::new(b"hello".to_vec()), &config)
            .unwrap();
        assert_eq!(adapter.read("short").unwrap().contents, b"hel");

        let (probe, dropped) = DropProbe::new(b"hi");
        let config = Config::default().with_content_length(10);
        let err = adapter.write_stream("long", probe, &config).unwrap_err();

        assert!(dropped.get());
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        assert!(!client.contains(BUCKET, "long"));
        assert_eq!(client.call_count(Operation::Put), 1);
    }

    #[test]
    fn test_write_stream_forwards_caller_md5() {
        let client = MockClient::new();
        let adapter = StorageAdapter::new(&client, BUCKET, "");

        let config = Config::default().with_content_md5("bm90IHRoZSBkaWdlc3Q=");
        let err = adapter
            .write_stream("a.txt", Cursor::new(b"hello".to_vec()), &config)
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_write_stream_releases_source_on_failure() {
        let client = MockClient::new();
        client.fail(Operation::Put, Some("a.txt"), ErrorKind::Transient);
        let adapter = StorageAdapter::new(&client, BUCKET, "");

        let (probe, dropped) = DropProbe::new(b"hello");
        let err = adapter
            .write_stream("a.txt", probe, &Config::default())
            .unwrap_err();

        assert!(dropped.get());
        assert_eq!(err.kind, ErrorKind::Transient);
    }

    #[test]
    fn test_write_stream_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        io::Write::write_all(&mut file, b"from disk").unwrap();

        let client = MockClient::new();
        let adapter = StorageAdapter::new(&client, BUCKET, "root");

        let (probe, dropped) = DropProbe::new(b"ignored");
        let config = Config::default().with_file(file.path());
        let entry = adapter.write_stream("f", probe, &config).unwrap();

        assert!(dropped.get());
        assert_eq!(entry.path, "f");
        assert_eq!(adapter.read("f").unwrap().contents, b"from disk");
    }

    #[test]
    fn test_create_directory_then_has() {
        let client = MockClient::new();
        let adapter = StorageAdapter::new(&client, BUCKET, "root");

        let cases = vec!["photos", "photos/2024/", "a/b/c", "/lead"];

        for dirname in cases {
            let entry = adapter.create_directory(dirname, &Config::default()).unwrap();

            assert_eq!(entry.kind, EntryType::Dir, "failed on `kind` for case: {}", dirname);
            assert_eq!(
                entry.path,
                dirname.trim_matches('/'),
                "failed on `path` for case: {}",
                dirname
            );
            assert!(
                adapter.has(&format!("{}/", dirname.trim_end_matches('/'))).unwrap(),
                "failed on `has` for case: {}",
                dirname
            );
        }

        assert!(client.contains(BUCKET, "root/photos/"));
        assert!(!adapter.has("photos").unwrap());
    }

    #[test]
    fn test_create_directory_at_prefix_root() {
        let client = MockClient::new();
        let adapter = StorageAdapter::new(&client, BUCKET, "root");

        let entry = adapter.create_directory("", &Config::default()).unwrap();

        assert_eq!(entry.kind, EntryType::Dir);
        assert_eq!(entry.path, "");
        assert_eq!(entry.size, None);
        assert!(entry.timestamp.is_some());
        assert_eq!(client.keys(BUCKET), vec!["root/".to_string()]);

        let client = MockClient::new();
        let adapter = StorageAdapter::new(&client, BUCKET, "");
        for dirname in ["", "/"] {
            let err = adapter.create_directory(dirname, &Config::default()).unwrap_err();
            assert_eq!(err.kind, ErrorKind::InvalidArgument, "failed for case: {:?}", dirname);
        }
        assert_eq!(client.call_count(Operation::Put), 0);
    }

    #[test]
    fn test_has_surfaces_non_missing_failures() {
        let client = MockClient::new();
        let adapter = StorageAdapter::new(&client, BUCKET, "");
        seed(&adapter, &["a"]);

        assert!(adapter.has("a").unwrap());
        assert!(!adapter.has("b").unwrap());

        client.fail(Operation::Head, None, ErrorKind::PermissionDenied);
        assert_eq!(adapter.has("a").unwrap_err().kind, ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_list_contents_paginates() {
        for page_size in 1..=8 {
            let client = MockClient::with_page_size(page_size);
            let adapter = StorageAdapter::new(&client, BUCKET, "root");
            let files: Vec<String> = (0..7).map(|i| format!("dir/file-{}", i)).collect();
            let refs: Vec<&str> = files.iter().map(String::as_str).collect();
            seed(&adapter, &refs);

            let entries = adapter.list_contents("dir", true).unwrap();

            assert_eq!(paths(&entries), refs, "failed for page size: {}", page_size);
            assert_eq!(
                client.call_count(Operation::List),
                (7 + page_size - 1) / page_size,
                "failed on page count for page size: {}",
                page_size
            );
        }
    }

    #[test]
    fn test_list_contents_one_level() {
        let client = MockClient::with_page_size(2);
        let adapter = StorageAdapter::new(&client, BUCKET, "root");
        seed(&adapter, &["dir/a", "dir/b", "dir/sub/c", "dir/sub/d", "dir2/e", "top"]);
        adapter.create_directory("dir/empty", &Config::default()).unwrap();
        adapter.create_directory("dir", &Config::default()).unwrap();

        let entries = adapter.list_contents("dir", false).unwrap();
        let listed: Vec<(&str, EntryType)> =
            entries.iter().map(|e| (e.path.as_str(), e.kind)).collect();

        assert_eq!(
            listed,
            vec![
                ("dir/a", EntryType::File),
                ("dir/b", EntryType::File),
                ("dir/empty", EntryType::Dir),
                ("dir/sub", EntryType::Dir),
            ]
        );

        let root = adapter.list_contents("", false).unwrap();
        assert_eq!(paths(&root), vec!["dir", "dir2", "top"]);
    }

    #[test]
    fn test_list_contents_raw_keeps_keys() {
        let client = MockClient::new();
        let adapter = StorageAdapter::new(&client, BUCKET, "root");
        seed(&adapter, &["dir/a", "dir/sub/b"]);

        let raw = adapter.list_contents_raw("dir", false).unwrap();
        assert_eq!(paths(&raw), vec!["root/dir/a", "root/dir/sub/"]);

        let stripped = adapter.list_contents("dir", false).unwrap();
        assert_eq!(paths(&stripped), vec!["dir/a", "dir/sub"]);
    }

    #[test]
    fn test_list_contents_discards_partial_pages() {
        let client = MockClient::with_page_size(2);
        let adapter = StorageAdapter::new(&client, BUCKET, "");
        seed(&adapter, &["a", "b", "c", "d", "e"]);
        client.fail_after(Operation::List, None, 1, ErrorKind::Transient);

        let err = adapter.list_contents("", true).unwrap_err();

        assert_eq!(err.kind, ErrorKind::Transient);
        assert_eq!(client.call_count(Operation::List), 2);
    }

    #[test]
    fn test_rename() {
        let client = MockClient::new();
        let adapter = StorageAdapter::new(&client, BUCKET, "root");
        seed(&adapter, &["old"]);

        let report = adapter.rename("old", "new").unwrap();

        assert!(report.is_complete());
        assert_eq!(report.completed, vec!["new".to_string(), "old".to_string()]);
        assert!(!adapter.has("old").unwrap());
        assert_eq!(adapter.read("new").unwrap().contents, b"old");
    }

    #[test]
    fn test_rename_missing_source() {
        let client = MockClient::new();
        let adapter = StorageAdapter::new(&client, BUCKET, "root");

        let err = adapter.rename("missing", "target").unwrap_err();

        assert_eq!(err.kind, ErrorKind::NotFound);
        assert!(!adapter.has("target").unwrap());
        assert_eq!(client.call_count(Operation::Delete), 0);
    }

    #[test]
    fn test_rename_leaves_both_copies_when_delete_fails() {
        let client = MockClient::new();
        let adapter = StorageAdapter::new(&client, BUCKET, "");
        seed(&adapter, &["old"]);
        client.fail(Operation::Delete, Some("old"), ErrorKind::PermissionDenied);

        let report = adapter.rename("old", "new").unwrap();

        assert!(!report.is_complete());
        assert_eq!(report.completed, vec!["new".to_string()]);
        assert_eq!(report.failed.as_ref().map(|(k, _)| k.as_str()), Some("old"));
        assert!(adapter.has("old").unwrap());
        assert!(adapter.has("new").unwrap());
    }

    #[test]
    fn test_report_paths_can_be_retried() {
        let client = MockClient::new();
        let adapter = StorageAdapter::new(&client, BUCKET, "root");
        seed(&adapter, &["old", "dir/a", "dir/b"]);
        client.fail(Operation::Delete, Some("root/old"), ErrorKind::Transient);
        client.fail(Operation::Delete, Some("root/dir/b"), ErrorKind::Transient);

        let renamed = adapter.rename("/old", "new").unwrap();
        assert_eq!(renamed.completed, vec!["new".to_string()]);
        let removed = adapter.delete_directory("dir").unwrap();
        assert_eq!(removed.completed, vec!["dir/a".to_string()]);
        assert_eq!(removed.skipped, vec!["dir/".to_string()]);

        client.clear_faults();
        for report in [renamed, removed] {
            let (path, _) = report.failed.unwrap();
            adapter.delete(&path).unwrap();
            assert!(!adapter.has(&path).unwrap(), "failed for path: {}", path);
        }

        assert_eq!(client.keys(BUCKET), vec!["root/new".to_string()]);
    }

    #[test]
    fn test_copy_and_delete() {
        let client = MockClient::new();
        let adapter = StorageAdapter::new(&client, BUCKET, "root");
        seed(&adapter, &["a"]);

        adapter.copy("a", "b").unwrap();
        assert_eq!(adapter.read("b").unwrap().contents, b"a");

        adapter.delete("a").unwrap();
        assert!(!adapter.has("a").unwrap());
        assert_eq!(client.keys(BUCKET), vec!["root/b".to_string()]);
    }

    #[test]
    fn test_delete_directory() {
        let client = MockClient::with_page_size(2);
        let adapter = StorageAdapter::new(&client, BUCKET, "root");
        seed(&adapter, &["dir/a", "dir/sub/b", "dir/sub/c", "dir2/d", "dirx"]);
        adapter.create_directory("dir/sub", &Config::default()).unwrap();
        adapter.create_directory("dir", &Config::default()).unwrap();

        let report = adapter.delete_directory("dir").unwrap();

        assert!(report.is_complete());
        assert_eq!(
            report.completed,
            vec!["dir/a", "dir/sub/", "dir/sub/b", "dir/sub/c", "dir/"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
        assert_eq!(
            client.keys(BUCKET),
            vec!["root/dir2/d".to_string(), "root/dirx".to_string()]
        );
    }

    #[test]
    fn test_delete_directory_is_not_atomic() {
        let client = MockClient::new();
        let adapter = StorageAdapter::new(&client, BUCKET, "");
        seed(&adapter, &["dir/a", "dir/b", "dir/c"]);
        adapter.create_directory("dir", &Config::default()).unwrap();
        client.fail(Operation::Delete, Some("dir/b"), ErrorKind::Transient);

        let report = adapter.delete_directory("dir").unwrap();

        assert_eq!(report.completed, vec!["dir/a".to_string()]);
        assert_eq!(report.error().map(|e| e.kind), Some(ErrorKind::Transient));
        assert_eq!(report.skipped, vec!["dir/c".to_string(), "dir/".to_string()]);
        assert!(!client.contains(BUCKET, "dir/a"));
        assert!(client.contains(BUCKET, "dir/b"));
        assert!(client.contains(BUCKET, "dir/c"));
        assert!(client.contains(BUCKET, "dir/"));
    }

    #[test]
    fn test_delete_directory_rejects_root() {
        let client = MockClient::new();
        let adapter = StorageAdapter::new(&client, BUCKET, "root");
        seed(&adapter, &["a"]);

        for dirname in ["", "/", "//"] {
            let err = adapter.delete_directory(dirname).unwrap_err();
            assert_eq!(err.kind, ErrorKind::InvalidArgument, "failed for case: {:?}", dirname);
        }

        assert!(adapter.has("a").unwrap());
    }

    #[test]
    fn test_delete_directory_listing_failure() {
        let client = MockClient::new();
        let adapter = StorageAdapter::new(&client, BUCKET, "");
        seed(&adapter, &["dir/a"]);
        client.fail(Operation::List, None, ErrorKind::PermissionDenied);

        let err = adapter.delete_directory("dir").unwrap_err();

        assert_eq!(err.kind, ErrorKind::PermissionDenied);
        assert_eq!(client.call_count(Operation::Delete), 0);
    }

    #[test]
    fn test_read_stream_is_rewound() {
        let client = MockClient::new();
        let adapter = StorageAdapter::new(&client, BUCKET, "root");
        seed(&adapter, &["streamed"]);

        let mut result = adapter.read_stream("streamed").unwrap();
        let mut body = Vec::new();
        result.stream.read_to_end(&mut body).unwrap();

        assert_eq!(result.path, "streamed");
        assert_eq!(body, b"streamed");
    }

    #[test]
    fn test_get_metadata() {
        let client = MockClient::new();
        let adapter = StorageAdapter::new(&client, BUCKET, "root");
        adapter
            .write("a.json", b"{}", &Config::default().with_mimetype("application/json"))
            .unwrap();

        for entry in [
            adapter.get_metadata("a.json").unwrap(),
            adapter.get_size("a.json").unwrap(),
            adapter.get_mimetype("a.json").unwrap(),
            adapter.get_timestamp("a.json").unwrap(),
        ] {
            assert_eq!(entry.path, "a.json");
            assert_eq!(entry.size, Some(2));
            assert_eq!(entry.mimetype.as_deref(), Some("application/json"));
            assert!(entry.etag.is_some());
            assert!(entry.timestamp.is_some());
        }

        let err = adapter.get_metadata("missing").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_get_temporary_link() {
        let client = MockClient::new();
        let adapter = StorageAdapter::new(&client, BUCKET, "root");

        let now = unix_seconds(SystemTime::now()).unwrap();
        let url = adapter
            .get_temporary_link("a.txt", Duration::from_secs(600))
            .unwrap();

        assert!(url.starts_with("memory://dummy-bucket/root/a.txt?"));
        let expires: i64 = url
            .split('&')
            .find_map(|pair| pair.strip_prefix("Expires="))
            .and_then(|value| value.parse().ok())
            .unwrap();
        assert!((expires - (now + 600)).abs() <= 5, "expires at {}", expires);

        let url = adapter.get_url("a.txt").unwrap();
        assert!(url.contains("X-Expires=600"));
    }

    #[test]
    fn test_set_bucket() {
        let client = MockClient::new();
        let mut adapter = StorageAdapter::new(&client, BUCKET, "");

        adapter.set_bucket("");
        assert_eq!(adapter.bucket(), BUCKET);

        adapter.set_bucket("other");
        adapter.write("a", b"1", &Config::default()).unwrap();
        assert!(client.contains("other", "a"));
        assert!(!client.contains(BUCKET, "a"));
    }
}
