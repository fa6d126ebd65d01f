// Durable key/value slots for the credential and identity
//
// Two scopes exist: persistent (survives reboots, under the config dir) and
// session-scoped (per-boot runtime dir). Each scope is one small JSON object
// file named after the scope; writes go through a temp file and a rename so a
// crash never leaves a half-written token behind. On unix the directory is
// created 0700 and the file 0600: the session dir may be the shared temp dir.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Slot holding the bearer token
pub const ACCESS_TOKEN_KEY: &str = "access_token";
/// Slot holding the JSON-serialized identity
pub const USER_KEY: &str = "user";

/// Minimal key/value storage used by the session layer
pub trait KeyValueStore: Send + Sync {
    /// Human-readable name for logs ("persistent", "session")
    fn label(&self) -> &'static str;

    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}

/// JSON-file backed store
pub struct FileStore {
    label: &'static str,
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(label: &'static str, path: impl Into<PathBuf>) -> Self {
        Self {
            label,
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store at `<dir>/<label>.json`, so two scopes sharing a directory
    /// still get separate files
    pub fn in_dir(label: &'static str, dir: &Path) -> Self {
        Self::new(label, dir.join(format!("{}.json", label)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> HashMap<String, String> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!(store = self.label, "Ignoring unreadable store file: {}", e);
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        }
    }

    fn write_map(&self, map: &HashMap<String, String>) -> Result<()> {
        if map.is_empty() {
            return match std::fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e).context("Failed to remove store file"),
            };
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_private_dir(parent).context("Failed to create store directory")?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(map).context("Failed to serialize store")?;

        // A leftover temp file would keep its old permissions
        match std::fs::remove_file(&tmp) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).context("Failed to clear stale store temp file"),
        }

        let mut file = private_file_options()
            .open(&tmp)
            .context("Failed to open store file")?;
        file.write_all(content.as_bytes())
            .context("Failed to write store file")?;
        file.sync_all().context("Failed to flush store file")?;
        drop(file);

        std::fs::rename(&tmp, &self.path).context("Failed to replace store file")?;
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut HashMap<String, String>)) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut map = self.read_map();
        f(&mut map);
        self.write_map(&map)
    }
}

/// Create `dir` owner-only. An existing directory is tightened too; that
/// fails when another user owns it, so the token is never written there.
#[cfg(unix)]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)?;
    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}

fn private_file_options() -> OpenOptions {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
}

impl KeyValueStore for FileStore {
    fn label(&self) -> &'static str {
        self.label
    }

    fn get(&self, key: &str) -> Option<String> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        self.read_map().remove(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|map| {
            map.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|map| {
            map.remove(key);
        })
    }
}

/// In-memory store. Clones share the same slots, which lets tests rebuild a
/// coordinator on top of "surviving" storage.
#[derive(Clone, Default)]
pub struct MemoryStore {
    label: &'static str,
    slots: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            slots: Arc::default(),
        }
    }

    /// Drop every slot (simulates the scope being wiped)
    pub fn wipe(&self) {
        self.slots.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().unwrap_or_else(|p| p.into_inner()).is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn label(&self) -> &'static str {
        self.label
    }

    fn get(&self, key: &str) -> Option<String> {
        self.slots
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.slots
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.slots
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(key);
        Ok(())
    }
}
