use crate::{
    log::{Error, CACHE_WRITE},
    resolve::Source,
};
use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    sync::Mutex,
    time::SystemTime,
};

/// File extension carried by artifacts written to disk.
pub const ARTIFACT_EXTENSION: &str = ".vc";

/// A compiled template.
///
/// The text of an Artifact is an instruction stream, not template source,
/// and is only meaningful to the renderer.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// The name of the template the Artifact was compiled from.
    pub name: String,
    /// The compiled text.
    pub text: String,
    /// The moment the Artifact was produced.
    pub modified: SystemTime,
}

/// Describes a type that can persist compiled artifacts.
pub trait Storage {
    /// Return the text stored for the key, and the time it was stored,
    /// if any.
    fn load(&self, key: &str) -> Option<(String, SystemTime)>;

    /// Store the text under the key.
    ///
    /// # Errors
    ///
    /// Returns an error if the text cannot be written.
    fn store(&mut self, key: &str, text: &str, modified: SystemTime) -> io::Result<()>;

    /// Remove all stored artifacts.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored artifacts cannot be removed.
    fn clear(&mut self) -> io::Result<()>;
}

/// [`Storage`] backed by a map.
pub struct MemoryStorage {
    artifacts: HashMap<String, (String, SystemTime)>,
}

impl MemoryStorage {
    /// Create a new, empty MemoryStorage.
    pub fn new() -> Self {
        Self {
            artifacts: HashMap::new(),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn load(&self, key: &str) -> Option<(String, SystemTime)> {
        self.artifacts.get(key).cloned()
    }

    fn store(&mut self, key: &str, text: &str, modified: SystemTime) -> io::Result<()> {
        self.artifacts
            .insert(key.to_string(), (text.to_string(), modified));

        Ok(())
    }

    fn clear(&mut self) -> io::Result<()> {
        self.artifacts.clear();

        Ok(())
    }
}

/// [`Storage`] backed by a directory of artifact files.
///
/// The modification time of the file itself records when the artifact
/// was stored, so a warm cache survives restarts.
pub struct FileStorage {
    directory: PathBuf,
}

impl FileStorage {
    /// Create a new FileStorage over the given directory.
    ///
    /// The directory is created when the first artifact is stored.
    pub fn new<T>(directory: T) -> Self
    where
        T: Into<PathBuf>,
    {
        Self {
            directory: directory.into(),
        }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.directory.join(key)
    }
}

impl Storage for FileStorage {
    fn load(&self, key: &str) -> Option<(String, SystemTime)> {
        let path = self.path(key);
        let modified = fs::metadata(&path).and_then(|m| m.modified()).ok()?;
        let text = fs::read_to_string(&path).ok()?;

        Some((text, modified))
    }

    fn store(&mut self, key: &str, text: &str, _modified: SystemTime) -> io::Result<()> {
        fs::create_dir_all(&self.directory)?;
        fs::write(self.path(key), text)
    }

    fn clear(&mut self) -> io::Result<()> {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(error) => return Err(error),
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if is_artifact(&path) {
                // Best effort, a file disappearing mid-sweep is fine.
                let _ = fs::remove_file(path);
            }
        }

        Ok(())
    }
}

fn is_artifact(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(ARTIFACT_EXTENSION))
}

/// Keeps compiled artifacts, recompiling only when the source text is
/// newer than the stored copy.
pub struct Cache {
    storage: Mutex<Box<dyn Storage + Send>>,
}

impl Cache {
    /// Create a new Cache over the given [`Storage`].
    pub fn new(storage: Box<dyn Storage + Send>) -> Self {
        Self {
            storage: Mutex::new(storage),
        }
    }

    /// Create a new Cache backed by memory.
    pub fn memory() -> Self {
        Self::new(Box::new(MemoryStorage::new()))
    }

    /// Create a new Cache backed by the given directory.
    pub fn file<T>(directory: T) -> Self
    where
        T: Into<PathBuf>,
    {
        Self::new(Box::new(FileStorage::new(directory)))
    }

    /// Return the storage key for a template name.
    ///
    /// Path separators collapse to dots, and a checksum of the original
    /// name keeps two templates that collapse alike from colliding.
    pub fn key(name: &str) -> String {
        let flat = name.replace(['/', '\\'], ".");
        let checksum = crc32fast::hash(name.as_bytes());

        format!("{flat}__{checksum}{ARTIFACT_EXTENSION}")
    }

    /// Return an up to date [`Artifact`] for the template.
    ///
    /// A stored artifact at least as new as the [`Source`] is returned
    /// as-is, otherwise `compile` runs on the source text and the result
    /// is stored before being returned.
    ///
    /// A storage failure is logged and does not fail the render, the
    /// freshly compiled text is used directly.
    ///
    /// # Errors
    ///
    /// Propagates any [`Error`] from the `compile` function.
    pub fn latest<F>(&self, name: &str, source: &Source, compile: F) -> Result<Artifact, Error>
    where
        F: FnOnce(&str) -> Result<String, Error>,
    {
        let key = Self::key(name);
        let mut storage = match self.storage.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some((text, modified)) = storage.load(&key) {
            if modified >= source.modified {
                tracing::debug!(name, "artifact is current");
                return Ok(Artifact {
                    name: name.to_string(),
                    text,
                    modified,
                });
            }
            tracing::debug!(name, "artifact is stale");
        }

        let text = compile(&source.text)?;
        let modified = SystemTime::now();
        if let Err(error) = storage.store(&key, &text, modified) {
            tracing::warn!(name, %error, "{CACHE_WRITE}");
        }

        Ok(Artifact {
            name: name.to_string(),
            text,
            modified,
        })
    }

    /// Remove all stored artifacts.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when the underlying storage fails to clear.
    pub fn clear(&self) -> Result<(), Error> {
        let mut storage = match self.storage.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        storage
            .clear()
            .map_err(|error| Error::build(format!("unable to clear cache: {error}")))
    }
}

#[cfg(test)]
mod tests {
    use super::{Cache, FileStorage, Storage, ARTIFACT_EXTENSION};
    use crate::resolve::Source;
    use std::{
        cell::Cell,
        fs, io,
        time::{Duration, SystemTime},
    };

    /// [`Storage`] that accepts nothing, as if the disk were read only.
    struct RejectingStorage;

    impl Storage for RejectingStorage {
        fn load(&self, _: &str) -> Option<(String, SystemTime)> {
            None
        }

        fn store(&mut self, _: &str, _: &str, _: SystemTime) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read only"))
        }

        fn clear(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_key_flattens_and_checksums() {
        let key = Cache::key("admin/users.index");

        assert!(key.starts_with("admin.users.index__"));
        assert!(key.ends_with(ARTIFACT_EXTENSION));
        assert_ne!(key, Cache::key("admin.users/index"));
    }

    #[test]
    fn test_latest_compiles_once() {
        let cache = Cache::memory();
        let source = Source::new("Hello");
        let calls = Cell::new(0);
        let compile = |text: &str| {
            calls.set(calls.get() + 1);
            Ok(text.to_uppercase())
        };

        let first = cache.latest("greet", &source, compile).unwrap();
        let second = cache.latest("greet", &source, compile).unwrap();

        assert_eq!(first.text, "HELLO");
        assert_eq!(second.text, "HELLO");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_latest_recompiles_stale() {
        let cache = Cache::memory();
        let mut source = Source::new("Hello");
        cache
            .latest("greet", &source, |text| Ok(text.to_string()))
            .unwrap();

        source.text = "Goodbye".to_string();
        source.modified = SystemTime::now() + Duration::from_secs(10);
        let fresh = cache
            .latest("greet", &source, |text| Ok(text.to_string()))
            .unwrap();

        assert_eq!(fresh.text, "Goodbye");
    }

    #[test]
    fn test_latest_survives_store_failure() {
        let cache = Cache::new(Box::new(RejectingStorage));
        let source = Source::new("Hello");
        let calls = Cell::new(0);
        let compile = |text: &str| {
            calls.set(calls.get() + 1);
            Ok(text.to_uppercase())
        };

        let first = cache.latest("greet", &source, compile).unwrap();
        assert_eq!(first.text, "HELLO");

        // Nothing was persisted, so the next call compiles again.
        let second = cache.latest("greet", &source, compile).unwrap();
        assert_eq!(second.text, "HELLO");
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_file_storage_round_trip() {
        let directory = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::new(directory.path());
        let key = Cache::key("pages.home");
        storage.store(&key, "compiled", SystemTime::now()).unwrap();

        let (text, _) = storage.load(&key).unwrap();
        assert_eq!(text, "compiled");

        storage.clear().unwrap();
        assert!(storage.load(&key).is_none());
        assert!(fs::read_dir(directory.path()).unwrap().next().is_none());
    }

    #[test]
    fn test_file_storage_clear_missing_directory() {
        let directory = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::new(directory.path().join("never-created"));

        assert!(storage.clear().is_ok());
    }
}
