use crate::{
    cache::{Artifact, Cache},
    compile::{Rewriter, SetExtension, Transform},
    directive::{Handler, Registry},
    log::{error_missing_source, Error},
    render::Renderer,
    resolve::{Resolver, Source},
    store::Store,
};
use std::collections::HashMap;

/// Compiles and renders templates.
///
/// An Engine owns the directive registry, the compile extensions, the
/// artifact cache, and the set of known template sources.
///
/// # Examples
///
/// ```
/// use vireo::{Engine, Store};
///
/// let mut engine = Engine::default();
/// engine.add_template("greet", "Hello {{ $name }}!");
///
/// let store = Store::new().with_must("name", "World");
/// assert_eq!(engine.render("greet", &store).unwrap(), "Hello World!");
/// ```
pub struct Engine {
    registry: Registry,
    extensions: Vec<Box<dyn Transform>>,
    sources: HashMap<String, Source>,
    resolver: Option<Box<dyn Resolver>>,
    cache: Cache,
    rewriter: Rewriter,
}

impl Engine {
    /// Create a new Engine with a memory backed cache.
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            extensions: vec![Box::new(SetExtension::new())],
            sources: HashMap::new(),
            resolver: None,
            cache: Cache::memory(),
            rewriter: Rewriter::new(),
        }
    }

    /// Render the named template against the given [`Store`].
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when the template, or anything it includes
    /// or extends, cannot be resolved, compiled or executed.
    pub fn render(&self, name: &str, store: &Store) -> Result<String, Error> {
        tracing::debug!(name, "rendering template");
        Renderer::new(self, store).render(name)
    }

    /// Return an up to date compiled [`Artifact`] for the named template.
    ///
    /// The artifact comes from the cache when the stored copy is at least
    /// as new as the source.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when no source exists for the name, or
    /// compilation fails.
    pub fn compile(&self, name: &str) -> Result<Artifact, Error> {
        let source = match self.sources.get(name) {
            Some(source) => source.clone(),
            None => match &self.resolver {
                Some(resolver) => resolver
                    .resolve(name)
                    .map_err(|error| error.with_name(name))?,
                None => return Err(error_missing_source(name).with_name(name)),
            },
        };

        self.cache
            .latest(name, &source, |text| {
                self.rewriter.rewrite(text, &self.registry, &self.extensions)
            })
            .map_err(|error| error.with_name(name))
    }

    /// Add a template source under the given name.
    ///
    /// Templates added this way take priority over the assigned
    /// [`Resolver`]. Adding a template again replaces the previous text
    /// and marks it modified, so the next render recompiles it.
    pub fn add_template<N, T>(&mut self, name: N, text: T)
    where
        N: Into<String>,
        T: Into<String>,
    {
        self.sources.insert(name.into(), Source::new(text));
    }

    /// Add a template source under the given name.
    ///
    /// Returns the Engine, so additional methods may be chained.
    pub fn with_template<N, T>(mut self, name: N, text: T) -> Self
    where
        N: Into<String>,
        T: Into<String>,
    {
        self.add_template(name, text);
        self
    }

    /// Register a user defined directive.
    ///
    /// The handler receives the trimmed text between the parentheses at
    /// compile time, and its output takes the directive's place.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when the name is not a valid directive name.
    ///
    /// # Examples
    ///
    /// ```
    /// use vireo::{log::Error, Engine, Store};
    ///
    /// let mut engine = Engine::default();
    /// engine
    ///     .add_directive("shout", |arguments: &str| {
    ///         Ok::<_, Error>(format!("{}!!", arguments.to_uppercase()))
    ///     })
    ///     .unwrap();
    /// engine.add_template("template", "@shout(hey)");
    ///
    /// assert_eq!(engine.render("template", &Store::new()).unwrap(), "HEY!!");
    /// ```
    pub fn add_directive<T>(&mut self, name: &str, handler: T) -> Result<(), Error>
    where
        T: Handler + 'static,
    {
        self.registry.register(name, handler)
    }

    /// Register a user defined directive.
    ///
    /// Returns the Engine, so additional methods may be chained.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when the name is not a valid directive name.
    pub fn with_directive<T>(mut self, name: &str, handler: T) -> Result<Self, Error>
    where
        T: Handler + 'static,
    {
        self.add_directive(name, handler)?;
        Ok(self)
    }

    /// Append a compile extension.
    ///
    /// Extensions run over compiled text in registration order, after
    /// the builtin passes.
    pub fn add_extension<T>(&mut self, extension: T)
    where
        T: Transform + 'static,
    {
        self.extensions.push(Box::new(extension));
    }

    /// Append a compile extension.
    ///
    /// Returns the Engine, so additional methods may be chained.
    pub fn with_extension<T>(mut self, extension: T) -> Self
    where
        T: Transform + 'static,
    {
        self.add_extension(extension);
        self
    }

    /// Assign a [`Resolver`] used for template names that have no added
    /// source.
    pub fn set_resolver(&mut self, resolver: Box<dyn Resolver>) {
        self.resolver = Some(resolver);
    }

    /// Assign a [`Resolver`].
    ///
    /// Returns the Engine, so additional methods may be chained.
    pub fn with_resolver(mut self, resolver: Box<dyn Resolver>) -> Self {
        self.set_resolver(resolver);
        self
    }

    /// Assign a [`Cache`] for compiled artifacts.
    pub fn set_cache(&mut self, cache: Cache) {
        self.cache = cache;
    }

    /// Assign a [`Cache`].
    ///
    /// Returns the Engine, so additional methods may be chained.
    pub fn with_cache(mut self, cache: Cache) -> Self {
        self.set_cache(cache);
        self
    }

    /// Remove every stored artifact from the cache.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when the cache storage fails to clear.
    pub fn clear_cache(&self) -> Result<(), Error> {
        tracing::debug!("clearing artifact cache");
        self.cache.clear()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::Engine;
    use crate::{Cache, FileResolver, Store};
    use std::fs;

    #[test]
    fn test_render_uses_resolver() {
        let directory = tempfile::tempdir().unwrap();
        fs::write(directory.path().join("greet.html"), "Hi {{ $name }}").unwrap();

        let engine =
            Engine::default().with_resolver(Box::new(FileResolver::new(directory.path())));
        let store = Store::new().with_must("name", "sam");

        assert_eq!(engine.render("greet", &store).unwrap(), "Hi sam");
    }

    #[test]
    fn test_added_template_wins_over_resolver() {
        let directory = tempfile::tempdir().unwrap();
        fs::write(directory.path().join("greet.html"), "from disk").unwrap();

        let engine = Engine::default()
            .with_resolver(Box::new(FileResolver::new(directory.path())))
            .with_template("greet", "from memory");

        assert_eq!(
            engine.render("greet", &Store::new()).unwrap(),
            "from memory"
        );
    }

    #[test]
    fn test_recompiles_after_template_changes() {
        let mut engine = Engine::default();
        engine.add_template("page", "one");
        assert_eq!(engine.render("page", &Store::new()).unwrap(), "one");

        engine.add_template("page", "two");
        assert_eq!(engine.render("page", &Store::new()).unwrap(), "two");
    }

    #[test]
    fn test_compile_is_idempotent() {
        let mut engine = Engine::default();
        engine.add_template("page", "@if (true)x@endif");

        let first = engine.compile("page").unwrap();
        let second = engine.compile("page").unwrap();

        assert_eq!(first.text, second.text);
    }

    #[test]
    fn test_file_cache_round_trip() {
        let views = tempfile::tempdir().unwrap();
        let artifacts = tempfile::tempdir().unwrap();
        fs::write(views.path().join("page.html"), "cached {{ $n }}").unwrap();

        let engine = Engine::default()
            .with_resolver(Box::new(FileResolver::new(views.path())))
            .with_cache(Cache::file(artifacts.path()));
        let store = Store::new().with_must("n", 1);

        assert_eq!(engine.render("page", &store).unwrap(), "cached 1");
        assert_eq!(fs::read_dir(artifacts.path()).unwrap().count(), 1);

        engine.clear_cache().unwrap();
        assert_eq!(fs::read_dir(artifacts.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_custom_extension() {
        let engine = Engine::default()
            .with_extension(|text: String| text.replace("%%YEAR%%", "2024"))
            .with_template("page", "year %%YEAR%%");

        assert_eq!(engine.render("page", &Store::new()).unwrap(), "year 2024");
    }

    #[test]
    fn test_set_extension_is_present_by_default() {
        let engine = Engine::default().with_template("page", "@set('n', 5){{ $n }}");

        assert_eq!(engine.render("page", &Store::new()).unwrap(), "5");
    }
}
