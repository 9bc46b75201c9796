//! Opaque artifact references.

use serde::{Deserialize, Serialize};

/// Reference to a stored byte blob (object-store URL, filesystem path, ...).
///
/// Only the storage gateway that produced a locator knows how to
/// dereference it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Final path segment, used to name local copies of fetched blobs.
    pub fn file_name(&self) -> Option<&str> {
        self.0
            .rsplit(['/', '\\'])
            .next()
            .filter(|name| !name.is_empty())
    }

    /// Lower-cased extension of [`Locator::file_name`], if any.
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name()?;
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Locator {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Locator {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_is_last_segment() {
        let loc = Locator::new("http://localhost:9000/inputs/cats/cat.PNG");
        assert_eq!(loc.file_name(), Some("cat.PNG"));
        assert_eq!(loc.extension().as_deref(), Some("png"));
    }

    #[test]
    fn trailing_slash_has_no_file_name() {
        let loc = Locator::new("s3://bucket/prefix/");
        assert_eq!(loc.file_name(), None);
        assert_eq!(loc.extension(), None);
    }

    #[test]
    fn dotfile_has_no_extension() {
        assert_eq!(Locator::new("/tmp/.hidden").extension(), None);
        assert_eq!(Locator::new("/tmp/noext").extension(), None);
    }

    #[test]
    fn serialises_as_plain_string() {
        let loc = Locator::new("mem://a/b.glb");
        assert_eq!(serde_json::to_value(&loc).unwrap(), "mem://a/b.glb");
    }
}
