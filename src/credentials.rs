use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Read-only view of the session key-value store written by the login flow.
pub trait CredentialStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// JSON object on disk, e.g. `{"access_token": "...", "email": "..."}`.
pub struct FileCredentialStore {
    path: PathBuf,
    values: HashMap<String, String>,
}

impl FileCredentialStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            debug!(path = %path.display(), "Credential store not found, starting empty");
            return Ok(Self {
                path,
                values: HashMap::new(),
            });
        }

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read credential store: {}", path.display()))?;
        let json: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&raw)
            .with_context(|| format!("Credential store is not a JSON object: {}", path.display()))?;

        // Only string values are credentials; anything else is session metadata.
        let values = json
            .into_iter()
            .filter_map(|(k, v)| match v {
                serde_json::Value::String(s) => Some((k, s)),
                _ => None,
            })
            .collect();

        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    values: HashMap<String, String>,
}

impl MemoryCredentialStore {
    pub fn with(key: &str, value: &str) -> Self {
        let mut values = HashMap::new();
        values.insert(key.to_string(), value.to_string());
        Self { values }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}
