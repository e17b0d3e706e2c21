//! On-disk layout of the file-backed key store.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::tag::KeyTag;

const SEALKIT_DIRNAME: &str = "sealkit";
const KEYS_DIRNAME: &str = "keys";
const KEY_FILE_EXTENSION: &str = "key";
const TAG_FILENAME_PREFIX: &[u8] = b"sealkit:key-tag";

/// Paths for key store artifacts under `<root>/sealkit`.
#[derive(Debug, Clone)]
pub struct KeyStorePaths {
    root: PathBuf,
    keys_dir: PathBuf,
}

impl KeyStorePaths {
    /// Builds key store paths rooted at `root`.
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let keys_dir = root.join(SEALKIT_DIRNAME).join(KEYS_DIRNAME);
        Self { root, keys_dir }
    }

    /// Returns the storage root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the directory holding one record file per tag.
    #[must_use]
    pub fn keys_dir(&self) -> &Path {
        &self.keys_dir
    }

    /// Returns the record path for `tag`.
    ///
    /// File names are hashed so that arbitrary tag strings map to portable names.
    #[must_use]
    pub fn key_path(&self, tag: &KeyTag) -> PathBuf {
        let digest = Sha256::new()
            .chain_update(TAG_FILENAME_PREFIX)
            .chain_update(tag.as_bytes())
            .finalize();
        self.keys_dir
            .join(format!("{}.{KEY_FILE_EXTENSION}", hex::encode(digest)))
    }

    /// Returns a temporary path for one write of `tag`'s record.
    ///
    /// `unique` distinguishes concurrent writers, which may live in other
    /// processes.
    #[must_use]
    pub fn temp_path(&self, tag: &KeyTag, unique: &str) -> PathBuf {
        let final_path = self.key_path(tag);
        let name = final_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.keys_dir.join(format!(".{name}.{unique}.tmp"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_paths_are_stable_and_distinct() {
        let paths = KeyStorePaths::new("/tmp/app");
        let a = KeyTag::new("a").expect("tag");
        let b = KeyTag::new("b").expect("tag");

        assert_eq!(paths.keys_dir(), Path::new("/tmp/app/sealkit/keys"));
        assert_eq!(paths.key_path(&a), paths.key_path(&a));
        assert_ne!(paths.key_path(&a), paths.key_path(&b));
        assert_eq!(
            paths.key_path(&a).extension().and_then(|ext| ext.to_str()),
            Some("key")
        );
        let temp = paths.temp_path(&a, "01ab");
        assert_eq!(temp.parent(), Some(paths.keys_dir()));
        assert!(temp.to_string_lossy().ends_with(".key.01ab.tmp"));
        assert_ne!(temp, paths.temp_path(&a, "02cd"));
    }

    #[test]
    fn test_tag_with_path_separators_stays_inside_keys_dir() {
        let paths = KeyStorePaths::new("/tmp/app");
        let tag = KeyTag::new("../../etc/passwd").expect("tag");
        assert_eq!(paths.key_path(&tag).parent(), Some(paths.keys_dir()));
    }
}
