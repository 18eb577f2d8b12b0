use super::{Pointer, RED, RESET};
use crate::{log::Visual, region::Region};
use std::fmt::{Debug, Display, Formatter, Result};

/// Describes an error, and allows adding contextual help text and a
/// visualization.
///
/// # Examples
///
/// Creating an [`Error`] that includes a [`Pointer`] into template source:
///
/// ```
/// use vireo::{log::Error, Region};
///
/// let error = Error::build("invalid directive arguments")
///     .with_pointer("@foreach($users)", Region::new(0..16))
///     .with_name("users.index")
///     .with_help("expected `(collection as $item)`");
/// ```
///
/// When printed with `println!("{:#}", error)` the [`Error`] produces
/// output in this shape:
///
/// ```text
/// error: invalid directive arguments
///   --> users.index:1:1
///    |
///  1 | @foreach($users)
///    | ^^^^^^^^^^^^^^^^
///    |
///   = help: expected `(collection as $item)`
/// ```
pub struct Error {
    /// Describes the cause of the [`Error`].
    reason: String,
    /// A visualization to help illustrate the [`Error`].
    visual: Option<Box<dyn Visual>>,
    /// Additional information to display with the [`Error`].
    help: Option<String>,
    /// The name of the template that the [`Error`] comes from.
    name: Option<String>,
}

impl Error {
    /// Create a new [`Error`] with the given reason text.
    ///
    /// The additional fields may be populated using the various methods
    /// defined on `Error`.
    pub fn build<T>(reason: T) -> Self
    where
        T: Into<String>,
    {
        Error {
            reason: reason.into(),
            name: None,
            visual: None,
            help: None,
        }
    }

    /// Set the name text, which is the name of the template that the
    /// [`Error`] is related to.
    ///
    /// If a name is already set, it is left alone, so the template closest
    /// to the failure wins.
    pub fn with_name<T>(mut self, text: T) -> Self
    where
        T: Into<String>,
    {
        if self.name.is_none() {
            self.name = Some(text.into());
        }

        self
    }

    /// Set the [`Visual`], which is a visualization that helps illustrate
    /// the cause of the error.
    pub fn with_visual(mut self, visual: impl Visual + 'static) -> Self {
        self.visual = Some(Box::new(visual));

        self
    }

    /// Set the visualization to a new [`Pointer`] over the given source
    /// text and [`Region`].
    pub fn with_pointer<T>(self, source: &str, region: T) -> Self
    where
        T: Into<Region>,
    {
        self.with_visual(Pointer::new(source, region.into()))
    }

    /// Set the help text, which is contextual information to accompany
    /// the reason text.
    pub fn with_help<T>(mut self, text: T) -> Self
    where
        T: Into<String>,
    {
        self.help = Some(text.into());

        self
    }

    /// Return the reason text.
    pub fn get_reason(&self) -> &str {
        &self.reason
    }

    /// Return the name of the template that the error is related to.
    pub fn get_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Return the help text.
    pub fn get_help(&self) -> Option<&str> {
        self.help.as_deref()
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        if !f.alternate() {
            writeln!(f, "{self:#}")?;
        }
        f.debug_struct("Error")
            .field("reason", &self.reason)
            .field("name", &self.name)
            .field("visual", &self.visual)
            .field("help", &self.help)
            .finish()?;

        Ok(())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        let header = format!("{RED}error{RESET}");
        write!(f, "{header}: {}", self.reason)?;

        if let Some(visual) = &self.visual {
            if f.alternate() {
                return visual.display(f, self.name.as_deref(), self.help.as_deref());
            }
        }

        Ok(())
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.reason == other.reason && self.help == other.help && self.name == other.name
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn test_first_name_wins() {
        let error = Error::build("template not found")
            .with_name("partials.nav")
            .with_name("layout.main");

        assert_eq!(error.get_name(), Some("partials.nav"));
    }

    #[test]
    fn test_equality_ignores_visual() {
        let one = Error::build("unexpected token").with_pointer("@if", 0..3);
        let two = Error::build("unexpected token");

        assert_eq!(one, two);
    }
}
