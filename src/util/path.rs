pub const SEPARATOR: char = '/';

/// Key prefix shared by every object an adapter touches.
///
/// A non-empty prefix is stored with exactly one trailing separator so that `apply` and `remove`
/// never have to guess where the prefix ends.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathPrefix {
    prefix: String,
}

impl PathPrefix {
    pub fn new(prefix: &str) -> Self {
        let trimmed = prefix.trim_matches(SEPARATOR);
        let prefix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("{}{}", trimmed, SEPARATOR)
        };

        Self { prefix }
    }

    pub fn as_str(&self) -> &str {
        &self.prefix
    }

    pub fn apply(&self, path: &str) -> String {
        format!("{}{}", self.prefix, path.trim_start_matches(SEPARATOR))
    }

    pub fn remove<'a>(&self, key: &'a str) -> &'a str {
        key.strip_prefix(self.prefix.as_str()).unwrap_or(key)
    }
}

pub fn is_dir_key(key: &str) -> bool {
    key.ends_with(SEPARATOR)
}

/// `dirname` with exactly one trailing separator.
pub fn dir_key(dirname: &str) -> String {
    format!("{}{}", dirname.trim_end_matches(SEPARATOR), SEPARATOR)
}

pub fn trim_dir(path: &str) -> &str {
    path.trim_end_matches(SEPARATOR)
}
