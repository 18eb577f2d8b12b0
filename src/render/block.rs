use crate::log::{Error, EMPTY_BLOCK_STACK};
use std::collections::HashMap;

/// Named blocks of rendered output, and the stack of blocks currently
/// being captured.
///
/// The stack holds names only. The text being captured for each open
/// block is owned by the caller, and handed over when the block ends.
pub struct BlockStack {
    values: HashMap<String, String>,
    stack: Vec<String>,
}

impl BlockStack {
    /// Create a new, empty BlockStack.
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
            stack: Vec::new(),
        }
    }

    /// Open a block with the given name.
    pub fn begin<T>(&mut self, name: T)
    where
        T: Into<String>,
    {
        self.stack.push(name.into());
    }

    /// Close the innermost open block, storing the captured text.
    ///
    /// When the block already has a value it is kept and the captured
    /// text is appended, unless `overwrite` is set. A block seen for the
    /// first time always takes the captured text.
    ///
    /// Returns the name of the closed block.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when no block is open.
    pub fn end(&mut self, captured: String, overwrite: bool) -> Result<String, Error> {
        let name = self.stack.pop().ok_or_else(|| {
            Error::build(EMPTY_BLOCK_STACK)
                .with_help("a block must begin before it can end, is a `@section` missing?")
        })?;

        match self.values.get_mut(&name) {
            Some(existing) if !overwrite => existing.push_str(&captured),
            _ => {
                self.values.insert(name.clone(), captured);
            }
        }

        Ok(name)
    }

    /// Return the value of the named block, or the default when the
    /// block has no value.
    pub fn get<'stack>(&'stack self, name: &str, default: &'stack str) -> &'stack str {
        self.values.get(name).map(String::as_str).unwrap_or(default)
    }

}

impl Default for BlockStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::BlockStack;
    use crate::log::EMPTY_BLOCK_STACK;

    #[test]
    fn test_end_appends_by_default() {
        let mut blocks = BlockStack::new();
        blocks.begin("title");
        blocks.end("Home".to_string(), false).unwrap();
        blocks.begin("title");
        blocks.end(" | Site".to_string(), false).unwrap();

        assert_eq!(blocks.get("title", ""), "Home | Site");
    }

    #[test]
    fn test_overwrite_replaces() {
        let mut blocks = BlockStack::new();
        blocks.begin("title");
        blocks.end("Home".to_string(), false).unwrap();
        blocks.begin("title");
        blocks.end("About".to_string(), true).unwrap();

        assert_eq!(blocks.get("title", ""), "About");
    }

    #[test]
    fn test_get_default() {
        assert_eq!(BlockStack::new().get("missing", "fallback"), "fallback");
    }

    #[test]
    fn test_end_without_begin() {
        let error = BlockStack::new().end(String::new(), false).unwrap_err();

        assert_eq!(error.get_reason(), EMPTY_BLOCK_STACK);
    }
}
