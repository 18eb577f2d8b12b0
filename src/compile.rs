pub mod scanner;
pub mod syntax;

use crate::{
    directive::Registry,
    log::{Error, INVALID_ARGUMENTS},
};
use morel::Finder;
use regex::{Captures, Regex};
use syntax::Marker;

/// Describes a compile extension.
///
/// Extensions run over the compiled text after the builtin passes, and
/// may perform arbitrary replacements.
pub trait Transform {
    /// Return the text with the transformation applied.
    fn apply(&self, text: String) -> String;
}

impl<F> Transform for F
where
    F: Fn(String) -> String,
{
    fn apply(&self, text: String) -> String {
        self(text)
    }
}

/// A [`Transform`] that rewrites `@set('name', expression)` into an
/// assignment instruction.
pub struct SetExtension {
    pattern: Regex,
}

impl SetExtension {
    /// Create a new SetExtension.
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(r#"@set\(\s*['"](\w+)['"]\s*,(.*)\)"#)
                .expect("pattern is valid"),
        }
    }
}

impl Default for SetExtension {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for SetExtension {
    fn apply(&self, text: String) -> String {
        self.pattern
            .replace_all(&text, |captures: &Captures| {
                format!("<?v set {} = {} ?>", &captures[1], captures[2].trim())
            })
            .into_owned()
    }
}

/// Compiles template source into artifact text.
///
/// The Rewriter runs a fixed sequence of passes, each producing text for
/// the next: directives, comments, echoes, extensions, and finally raw
/// `@php ... @endphp` blocks.
pub struct Rewriter {
    comment: Finder,
    triple: Finder,
    raw: Finder,
    raw_short: Finder,
    echo: Finder,
}

impl Rewriter {
    /// Create a new Rewriter.
    pub fn new() -> Self {
        Self {
            comment: Finder::new(syntax::comment()),
            triple: Finder::new(syntax::triple()),
            raw: Finder::new(syntax::raw()),
            raw_short: Finder::new(syntax::raw_short()),
            echo: Finder::new(syntax::echo()),
        }
    }

    /// Compile the source text into artifact text.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when a recognized directive has malformed or
    /// unacceptable arguments. Unrecognized directives are not errors,
    /// they pass through as text.
    pub fn rewrite(
        &self,
        source: &str,
        registry: &Registry,
        extensions: &[Box<dyn Transform>],
    ) -> Result<String, Error> {
        let text = rewrite_statements(source, registry)?;
        let text = self.rewrite_comments(&text);
        let text = self.rewrite_echo(&self.triple, &text, "out", false);
        let text = self.rewrite_echo(&self.raw, &text, "raw", false);
        let text = self.rewrite_echo(&self.raw_short, &text, "raw", false);
        let text = self.rewrite_echo(&self.echo, &text, "out", true);
        let text = extensions
            .iter()
            .fold(text, |text, extension| extension.apply(text));

        Ok(rewrite_raw_blocks(&text))
    }

    /// Replace `{{-- ... --}}` comments with a note instruction.
    ///
    /// The note carries no content, so comments never reach the output.
    fn rewrite_comments(&self, text: &str) -> String {
        let mut output = String::with_capacity(text.len());
        let mut cursor = 0;

        while let Some((id, begin, end)) = self.comment.next(text, cursor) {
            if let Marker::End = id.into() {
                // A stray closing marker is just text.
                output.push_str(&text[cursor..end]);
                cursor = end;
                continue;
            }
            match find_end(&self.comment, text, end) {
                Some((_, close)) => {
                    output.push_str(&text[cursor..begin]);
                    output.push_str("<?v note ?>");
                    cursor = close;
                }
                None => {
                    output.push_str(&text[cursor..end]);
                    cursor = end;
                }
            }
        }
        output.push_str(&text[cursor..]);

        output
    }

    /// Replace one echo form with an output instruction.
    ///
    /// A trailing newline on the echo is written twice, so that it
    /// survives the newline each instruction swallows. When `escapable`
    /// is set, an echo preceded by `@` is copied through without the `@`.
    fn rewrite_echo(&self, finder: &Finder, text: &str, op: &str, escapable: bool) -> String {
        let mut output = String::with_capacity(text.len());
        let mut cursor = 0;

        while let Some((id, begin, end)) = finder.next(text, cursor) {
            if let Marker::End = id.into() {
                output.push_str(&text[cursor..end]);
                cursor = end;
                continue;
            }
            let Some((close_begin, close_end)) = find_end(finder, text, end) else {
                output.push_str(&text[cursor..end]);
                cursor = end;
                continue;
            };

            output.push_str(&text[cursor..begin]);
            if escapable && output.ends_with('@') {
                output.pop();
                output.push_str(&text[begin..close_end]);
                cursor = close_end;
                continue;
            }

            let expression = with_default(text[end..close_begin].trim());
            output.push_str(&format!("<?v {op} {expression} ?>"));
            cursor = close_end;
            if let Some(newline) = leading_newline(&text[cursor..]) {
                output.push_str(newline);
                output.push_str(newline);
                cursor += newline.len();
            }
        }
        output.push_str(&text[cursor..]);

        output
    }
}

impl Default for Rewriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Replace directive tokens using the [`Registry`].
fn rewrite_statements(source: &str, registry: &Registry) -> Result<String, Error> {
    let mut output = String::with_capacity(source.len());
    let mut cursor = 0;

    while let Some(token) = scanner::scan(source, cursor) {
        output.push_str(&source[cursor..token.region.begin]);
        cursor = token.region.end;

        if token.escaped {
            output.push_str(&format!("<?v lit {} ?>", token.name));
            continue;
        }
        if !registry.contains(token.name) {
            output.push_str(&source[token.region]);
            continue;
        }
        if token.malformed {
            return Err(Error::build(INVALID_ARGUMENTS)
                .with_pointer(source, token.region)
                .with_help(format!(
                    "arguments to `@{}` have an unbalanced parenthesis",
                    token.name
                )));
        }
        match registry.expand(token.name, token.arguments) {
            Some(Ok(replacement)) => {
                output.push_str(&replacement);
                if token.arguments.is_none() {
                    output.push_str(token.whitespace);
                }
            }
            Some(Err(error)) => return Err(error.with_pointer(source, token.region)),
            None => unreachable!(),
        }
    }
    output.push_str(&source[cursor..]);

    Ok(output)
}

/// Replace `@php ... @endphp` with a verbatim region.
///
/// An unpaired `@php` is left alone.
fn rewrite_raw_blocks(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut cursor = 0;

    while let Some(relative) = text[cursor..].find("@php") {
        let begin = cursor + relative;
        let after = begin + 4;
        if begin > 0 && text.as_bytes()[begin - 1] == b'@' {
            output.push_str(&text[cursor..after]);
            cursor = after;
            continue;
        }
        let Some(length) = text[after..].find("@endphp") else {
            break;
        };

        output.push_str(&text[cursor..begin]);
        output.push_str("<?v verbatim ?>");
        output.push_str(&text[after..after + length]);
        output.push_str("<?v endverbatim ?>");
        cursor = after + length + "@endphp".len();
    }
    output.push_str(&text[cursor..]);

    output
}

/// Rewrite `$variable or fallback` into a ternary over `isset`.
fn with_default(expression: &str) -> String {
    if !expression.starts_with('$') {
        return expression.to_string();
    }
    for (at, _) in expression.match_indices("or") {
        let before = expression[..at].chars().next_back();
        let after = expression[at + 2..].chars().next();
        if before.is_some_and(char::is_whitespace) && after.is_some_and(char::is_whitespace) {
            let value = expression[..at].trim_end();
            let fallback = expression[at + 2..].trim_start();

            return format!("isset({value}) ? {value} : {fallback}");
        }
    }

    expression.to_string()
}

/// Return the first closing marker at or after the offset.
///
/// Skips nested opening markers, so the closest closing marker wins.
fn find_end(finder: &Finder, text: &str, from: usize) -> Option<(usize, usize)> {
    let mut from = from;
    while let Some((id, begin, end)) = finder.next(text, from) {
        if let Marker::End = id.into() {
            return Some((begin, end));
        }
        from = end;
    }

    None
}

/// Return the newline sequence the text starts with, if any.
fn leading_newline(text: &str) -> Option<&str> {
    if text.starts_with("\r\n") {
        Some("\r\n")
    } else if text.starts_with('\n') {
        Some("\n")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{Rewriter, SetExtension, Transform};
    use crate::{directive::Registry, log::INVALID_ARGUMENTS};

    fn rewrite(source: &str) -> String {
        Rewriter::new()
            .rewrite(source, &Registry::new(), &[])
            .unwrap()
    }

    #[test]
    fn test_rewrite_statement() {
        assert_eq!(
            rewrite("@if ($a)yes@endif"),
            "<?v if ($a) ?>yes<?v endif ?>"
        );
    }

    #[test]
    fn test_rewrite_bare_keeps_whitespace() {
        assert_eq!(rewrite("@else  no"), "<?v else ?>  no");
    }

    #[test]
    fn test_rewrite_unknown_directive_is_text() {
        assert_eq!(rewrite("email @username here"), "email @username here");
    }

    #[test]
    fn test_rewrite_escaped_directive() {
        assert_eq!(rewrite("@@if ($a)"), "<?v lit if ?> ($a)");
    }

    #[test]
    fn test_rewrite_malformed_known_directive() {
        let error = Rewriter::new()
            .rewrite("@if ($a", &Registry::new(), &[])
            .unwrap_err();

        assert_eq!(error.get_reason(), INVALID_ARGUMENTS);
        assert!(error.get_help().is_some_and(|help| help.contains("@if")));
    }

    #[test]
    fn test_rewrite_comment() {
        assert_eq!(rewrite("A{{-- hidden --}}B"), "A<?v note ?>B");
    }

    #[test]
    fn test_rewrite_echo_forms() {
        assert_eq!(rewrite("{{ $name }}"), "<?v out $name ?>");
        assert_eq!(rewrite("{!! $html !!}"), "<?v raw $html ?>");
        assert_eq!(rewrite("{! $html !}"), "<?v raw $html ?>");
        assert_eq!(rewrite("{{{ $name }}}"), "<?v out $name ?>");
    }

    #[test]
    fn test_rewrite_echo_doubles_trailing_newline() {
        assert_eq!(rewrite("{{ $a }}\nrest"), "<?v out $a ?>\n\nrest");
        assert_eq!(rewrite("{{ $a }}\r\nrest"), "<?v out $a ?>\r\n\r\nrest");
    }

    #[test]
    fn test_rewrite_escaped_echo() {
        assert_eq!(rewrite("@{{ $name }}"), "{{ $name }}");
    }

    #[test]
    fn test_rewrite_echo_default() {
        assert_eq!(
            rewrite("{{ $name or 'guest' }}"),
            "<?v out isset($name) ? $name : 'guest' ?>"
        );
    }

    #[test]
    fn test_rewrite_unclosed_echo_is_text() {
        assert_eq!(rewrite("open {{ $a"), "open {{ $a");
    }

    #[test]
    fn test_rewrite_raw_block() {
        assert_eq!(
            rewrite("@php keep {{ this }} @endphp"),
            "<?v verbatim ?> keep <?v out this ?> <?v endverbatim ?>"
        );
    }

    #[test]
    fn test_set_extension() {
        let compiled = SetExtension::new().apply("@set('page', $a + 1)".to_string());

        assert_eq!(compiled, "<?v set page = $a + 1 ?>");
    }
}
