//! Browser-localStorage-shaped persistence: a flat key/value store of
//! JSON strings backed by one file per key. Used as the sole store in
//! local mode and as the per-identity stash for personal workspace
//! customization in both modes.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// File-backed key/value store. Keys map to `{key}.json` files under the
/// vault root.
#[derive(Debug, Clone)]
pub struct LocalVault {
    root: PathBuf,
}

impl LocalVault {
    /// Open (creating if needed) a vault rooted at `root`.
    pub fn open(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)
            .with_context(|| format!("creating vault dir: {}", root.display()))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Default vault location under the platform data directory.
    pub fn default_root() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tablero")
            .join("vault")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", key))
    }

    /// Read the raw string stored under `key`, `None` when absent.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading vault key: {}", path.display()))?;
        Ok(Some(content))
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        std::fs::write(&path, value)
            .with_context(|| format!("writing vault key: {}", path.display()))
    }

    /// Delete `key`. Absent keys are not an error.
    pub fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("removing vault key: {}", path.display()))?;
        }
        Ok(())
    }

    /// Typed read: deserialize the JSON stored under `key`.
    pub fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(raw) => {
                let value = serde_json::from_str(&raw)
                    .with_context(|| format!("parsing vault key: {}", key))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Typed write: serialize `value` as JSON under `key`.
    pub fn set_json<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_get_missing_key_is_none() {
        let dir = TempDir::new().unwrap();
        let vault = LocalVault::open(dir.path()).unwrap();
        assert_eq!(vault.get("nope").unwrap(), None);
    }

    #[test]
    fn test_set_get_remove_round_trip() {
        let dir = TempDir::new().unwrap();
        let vault = LocalVault::open(dir.path()).unwrap();

        vault.set("greeting", "\"hola\"").unwrap();
        assert_eq!(vault.get("greeting").unwrap().as_deref(), Some("\"hola\""));

        vault.remove("greeting").unwrap();
        assert_eq!(vault.get("greeting").unwrap(), None);
    }

    #[test]
    fn test_remove_missing_key_is_ok() {
        let dir = TempDir::new().unwrap();
        let vault = LocalVault::open(dir.path()).unwrap();
        vault.remove("never-existed").unwrap();
    }

    #[test]
    fn test_typed_round_trip() {
        let dir = TempDir::new().unwrap();
        let vault = LocalVault::open(dir.path()).unwrap();

        vault.set_json("numbers", &vec![1u32, 2, 3]).unwrap();
        let back: Vec<u32> = vault.get_json("numbers").unwrap().unwrap();
        assert_eq!(back, vec![1, 2, 3]);
    }

    #[test]
    fn test_malformed_payload_is_an_error_not_a_panic() {
        let dir = TempDir::new().unwrap();
        let vault = LocalVault::open(dir.path()).unwrap();

        vault.set("broken", "not json at all").unwrap();
        let result: Result<Option<Vec<u32>>> = vault.get_json("broken");
        assert!(result.is_err());
    }
}
