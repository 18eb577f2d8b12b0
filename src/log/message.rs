use super::Error;

pub const SOURCE_NOT_FOUND: &str = "template not found";
pub const INVALID_DIRECTIVE: &str = "invalid directive name";
pub const INVALID_ARGUMENTS: &str = "invalid directive arguments";
pub const EMPTY_BLOCK_STACK: &str = "no open block";
pub const CACHE_WRITE: &str = "cache write failure";
pub const INVALID_SYNTAX: &str = "invalid syntax";
pub const UNEXPECTED_TOKEN: &str = "unexpected token";
pub const UNEXPECTED_EOF: &str = "unexpected eof";
pub const INCOMPATIBLE_TYPES: &str = "incompatible types";

/// Return an [`Error`] describing a template name that could not be resolved.
pub fn error_missing_source(name: &str) -> Error {
    Error::build(SOURCE_NOT_FOUND).with_help(format!(
        "template `{name}` has no source, add it with `.add_template` \
        or assign a resolver that knows about it"
    ))
}

/// Return an [`Error`] explaining that a directive received arguments
/// it cannot compile.
///
/// The help text carries the directive name and the raw argument text.
pub fn error_arguments(directive: &str, arguments: &str, expected: &str) -> Error {
    Error::build(INVALID_ARGUMENTS).with_help(format!(
        "directive `@{directive}` received `{arguments}`, expected {expected}"
    ))
}

/// Return an [`Error`] explaining that the artifact ended while blocks
/// were still open.
pub fn error_eof(artifact: &str) -> Error {
    let length = artifact.len();
    Error::build(UNEXPECTED_EOF)
        .with_pointer(artifact, length..length)
        .with_help("expected additional instructions, did you close all directives?")
}
