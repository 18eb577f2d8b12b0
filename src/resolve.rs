use crate::log::{error_missing_source, Error};
use std::{
    collections::HashMap,
    fs,
    path::PathBuf,
    time::SystemTime,
};

/// Template text and the time it was last modified.
///
/// The engine only ever reads a Source, it never writes one back.
#[derive(Debug, Clone)]
pub struct Source {
    /// The template text.
    pub text: String,
    /// The moment the text last changed.
    pub modified: SystemTime,
}

impl Source {
    /// Create a new Source with the given text, modified now.
    pub fn new<T>(text: T) -> Self
    where
        T: Into<String>,
    {
        Self {
            text: text.into(),
            modified: SystemTime::now(),
        }
    }
}

/// Maps a logical template name to a [`Source`].
///
/// Names are dotted paths such as `layout.main`; how a name maps to an
/// actual location is entirely up to the Resolver.
pub trait Resolver {
    /// Return the [`Source`] for the given template name.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when no source exists for the name.
    fn resolve(&self, name: &str) -> Result<Source, Error>;
}

/// A [`Resolver`] that maps dotted template names to files under a root
/// directory.
///
/// The name `admin.users.index` becomes `<root>/admin/users/index<extension>`.
pub struct FileResolver {
    root: PathBuf,
    extension: String,
}

impl FileResolver {
    /// Create a new FileResolver over the given directory.
    ///
    /// Template files are expected to carry the `.html` extension unless
    /// [`with_extension`][`FileResolver::with_extension`] says otherwise.
    pub fn new<T>(root: T) -> Self
    where
        T: Into<PathBuf>,
    {
        Self {
            root: root.into(),
            extension: ".html".to_string(),
        }
    }

    /// Set the file extension appended to resolved template paths.
    ///
    /// Returns the FileResolver, so additional methods may be chained.
    pub fn with_extension<T>(mut self, extension: T) -> Self
    where
        T: Into<String>,
    {
        self.extension = extension.into();
        self
    }

    /// Return the path a template name resolves to.
    fn path(&self, name: &str) -> PathBuf {
        let relative = name.trim_start_matches(['/', '.']).replace('.', "/");
        self.root.join(format!("{relative}{}", self.extension))
    }
}

impl Resolver for FileResolver {
    fn resolve(&self, name: &str) -> Result<Source, Error> {
        let path = self.path(name);
        let metadata = fs::metadata(&path).map_err(|_| error_missing_source(name))?;
        let text = fs::read_to_string(&path).map_err(|_| error_missing_source(name))?;
        let modified = metadata.modified().unwrap_or_else(|_| SystemTime::now());

        Ok(Source { text, modified })
    }
}

/// A [`Resolver`] backed by a map.
///
/// Useful for tests, and for hosts that keep their templates in memory.
pub struct MemoryResolver {
    sources: HashMap<String, Source>,
}

impl MemoryResolver {
    /// Create a new, empty MemoryResolver.
    pub fn new() -> Self {
        Self {
            sources: HashMap::new(),
        }
    }

    /// Insert a template, stamped as modified now.
    pub fn insert<S, T>(&mut self, name: S, text: T)
    where
        S: Into<String>,
        T: Into<String>,
    {
        self.sources.insert(name.into(), Source::new(text));
    }

    /// Insert a template with an explicit modification time.
    pub fn insert_modified<S, T>(&mut self, name: S, text: T, modified: SystemTime)
    where
        S: Into<String>,
        T: Into<String>,
    {
        self.sources.insert(
            name.into(),
            Source {
                text: text.into(),
                modified,
            },
        );
    }
}

impl Default for MemoryResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver for MemoryResolver {
    fn resolve(&self, name: &str) -> Result<Source, Error> {
        self.sources
            .get(name)
            .cloned()
            .ok_or_else(|| error_missing_source(name))
    }
}

#[cfg(test)]
mod tests {
    use super::{FileResolver, MemoryResolver, Resolver};
    use crate::log::SOURCE_NOT_FOUND;
    use std::{fs, path::PathBuf};

    #[test]
    fn test_file_resolver_path() {
        let resolver = FileResolver::new("/views").with_extension(".tpl");

        assert_eq!(
            resolver.path("admin.users.index"),
            PathBuf::from("/views/admin/users/index.tpl")
        );
    }

    #[test]
    fn test_file_resolver_reads_source() {
        let directory = tempfile::tempdir().unwrap();
        fs::create_dir(directory.path().join("pages")).unwrap();
        fs::write(directory.path().join("pages/home.html"), "Hello").unwrap();

        let resolver = FileResolver::new(directory.path());
        let source = resolver.resolve("pages.home").unwrap();

        assert_eq!(source.text, "Hello");
    }

    #[test]
    fn test_file_resolver_missing() {
        let directory = tempfile::tempdir().unwrap();
        let resolver = FileResolver::new(directory.path());
        let error = resolver.resolve("ghost").unwrap_err();

        assert_eq!(error.get_reason(), SOURCE_NOT_FOUND);
    }

    #[test]
    fn test_memory_resolver() {
        let mut resolver = MemoryResolver::new();
        resolver.insert("greet", "Hello");

        assert_eq!(resolver.resolve("greet").unwrap().text, "Hello");
        assert!(resolver.resolve("ghost").is_err());
    }
}
