use crate::log::{error_arguments, Error, INVALID_DIRECTIVE};
use std::collections::HashMap;

/// A builtin directive expander.
///
/// Receives the raw argument text including the surrounding parentheses,
/// or None when the directive appeared bare.
type Builtin = fn(Option<&str>) -> Result<String, Error>;

/// Describes a type that can expand a user defined directive.
///
/// The handler receives the trimmed text between the parentheses, or an
/// empty string when the directive appeared bare, and returns the text
/// that takes the directive's place in the compiled artifact.
pub trait Handler {
    /// Expand the directive arguments into replacement text.
    ///
    /// # Errors
    ///
    /// May return an [`Error`] when the arguments are unacceptable,
    /// which fails compilation of the template.
    fn expand(&self, arguments: &str) -> Result<String, Error>;
}

impl<F> Handler for F
where
    F: Fn(&str) -> Result<String, Error>,
{
    fn expand(&self, arguments: &str) -> Result<String, Error> {
        self(arguments)
    }
}

/// Holds every directive the compiler recognizes.
///
/// Builtin directives are fixed at construction and always win over
/// user defined directives of the same name.
pub struct Registry {
    builtin: HashMap<&'static str, Builtin>,
    custom: HashMap<String, Box<dyn Handler>>,
}

impl Registry {
    /// Create a new Registry containing the builtin directives.
    pub fn new() -> Self {
        let mut builtin: HashMap<&'static str, Builtin> = HashMap::new();
        builtin.insert("if", expand_if);
        builtin.insert("elseif", expand_elseif);
        builtin.insert("else", |_| Ok("<?v else ?>".to_string()));
        builtin.insert("endif", |_| Ok("<?v endif ?>".to_string()));
        builtin.insert("unless", expand_unless);
        builtin.insert("endunless", |_| Ok("<?v endif ?>".to_string()));
        builtin.insert("isset", expand_isset);
        builtin.insert("endisset", |_| Ok("<?v endif ?>".to_string()));
        builtin.insert("switch", expand_switch);
        builtin.insert("case", expand_case);
        builtin.insert("default", |_| Ok("<?v default ?>".to_string()));
        builtin.insert("endswitch", |_| Ok("<?v endswitch ?>".to_string()));
        builtin.insert("break", expand_break);
        builtin.insert("continue", expand_continue);
        builtin.insert("exit", expand_exit);
        builtin.insert("for", expand_for);
        builtin.insert("endfor", |_| Ok("<?v endfor ?>".to_string()));
        builtin.insert("foreach", expand_foreach);
        builtin.insert("endforeach", |_| Ok("<?v endforeach ?>".to_string()));
        builtin.insert("forelse", expand_forelse);
        builtin.insert("empty", |_| Ok("<?v empty ?>".to_string()));
        builtin.insert("endforelse", |_| Ok("<?v endforelse ?>".to_string()));
        builtin.insert("while", expand_while);
        builtin.insert("endwhile", |_| Ok("<?v endwhile ?>".to_string()));
        builtin.insert("extends", expand_extends);
        builtin.insert("include", expand_include);
        builtin.insert("yield", expand_yield);
        builtin.insert("section", expand_section);
        builtin.insert("endsection", |_| Ok("<?v stop ?>".to_string()));
        builtin.insert("stop", |_| Ok("<?v stop ?>".to_string()));
        builtin.insert("append", |_| Ok("<?v stop ?>".to_string()));
        builtin.insert("show", |_| Ok("<?v show ?>".to_string()));
        builtin.insert("overwrite", |_| Ok("<?v overwrite ?>".to_string()));
        builtin.insert("json", expand_json);
        builtin.insert("unset", expand_unset);
        builtin.insert("method", expand_method);
        builtin.insert("php", expand_php);

        Self {
            builtin,
            custom: HashMap::new(),
        }
    }

    /// Return true if the Registry recognizes the directive name.
    pub fn contains(&self, name: &str) -> bool {
        self.builtin.contains_key(name) || self.custom.contains_key(name)
    }

    /// Expand the named directive, if the Registry recognizes it.
    ///
    /// Builtin directives receive the raw parenthesized argument text,
    /// user defined directives receive the trimmed inner text.
    pub fn expand(&self, name: &str, arguments: Option<&str>) -> Option<Result<String, Error>> {
        if let Some(builtin) = self.builtin.get(name) {
            return Some(builtin(arguments));
        }
        self.custom
            .get(name)
            .map(|handler| handler.expand(arguments.map(strip_parens).unwrap_or("")))
    }

    /// Register a user defined directive.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when the name is not a valid directive name,
    /// or collides with a builtin directive.
    pub fn register<T>(&mut self, name: &str, handler: T) -> Result<(), Error>
    where
        T: Handler + 'static,
    {
        if !is_valid_name(name) {
            return Err(Error::build(INVALID_DIRECTIVE).with_help(format!(
                "`{name}` must be alphanumeric with an optional single `->`"
            )));
        }
        // Registering over a builtin is accepted but never consulted,
        // builtins win on lookup.
        self.custom.insert(name.to_string(), Box::new(handler));

        Ok(())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Return true for names of the shape `\w+` or `\w+->\w+`, ASCII only.
fn is_valid_name(name: &str) -> bool {
    let mut parts = name.split("->");
    let word = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
    };

    match (parts.next(), parts.next(), parts.next()) {
        (Some(first), None, _) => word(first),
        (Some(first), Some(second), None) => word(first) && word(second),
        _ => false,
    }
}

/// Return the trimmed text between the outer parentheses.
///
/// Text that is not parenthesized comes back trimmed but otherwise
/// untouched.
pub fn strip_parens(arguments: &str) -> &str {
    let trimmed = arguments.trim();
    trimmed
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .map(str::trim)
        .unwrap_or(trimmed)
}

/// Split the text on the separator, ignoring separators nested inside
/// parentheses, brackets or string literals.
pub fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    let mut previous = '\0';

    for (i, c) in text.char_indices() {
        match quote {
            Some(q) => {
                if c == q && previous != '\\' {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => quote = Some(c),
                '(' | '[' => depth += 1,
                ')' | ']' => depth = depth.saturating_sub(1),
                _ if c == separator && depth == 0 => {
                    parts.push(&text[start..i]);
                    start = i + c.len_utf8();
                }
                _ => {}
            },
        }
        previous = c;
    }
    parts.push(&text[start..]);

    parts
}

/// Return the arguments, or an invalid arguments error built from the
/// expectation.
fn require<'a>(
    directive: &str,
    arguments: Option<&'a str>,
    expected: &str,
) -> Result<&'a str, Error> {
    match arguments {
        Some(arguments) if !strip_parens(arguments).is_empty() => Ok(arguments),
        Some(arguments) => Err(error_arguments(directive, arguments, expected)),
        None => Err(error_arguments(directive, "", expected)),
    }
}

fn expand_if(arguments: Option<&str>) -> Result<String, Error> {
    let arguments = require("if", arguments, "a condition")?;
    Ok(format!("<?v if {arguments} ?>"))
}

fn expand_elseif(arguments: Option<&str>) -> Result<String, Error> {
    let arguments = require("elseif", arguments, "a condition")?;
    Ok(format!("<?v elseif {arguments} ?>"))
}

fn expand_unless(arguments: Option<&str>) -> Result<String, Error> {
    let arguments = require("unless", arguments, "a condition")?;
    Ok(format!("<?v unless {arguments} ?>"))
}

fn expand_isset(arguments: Option<&str>) -> Result<String, Error> {
    let arguments = require("isset", arguments, "an expression")?;
    Ok(format!("<?v isset {arguments} ?>"))
}

fn expand_switch(arguments: Option<&str>) -> Result<String, Error> {
    let arguments = require("switch", arguments, "a subject expression")?;
    Ok(format!("<?v switch {arguments} ?>"))
}

fn expand_case(arguments: Option<&str>) -> Result<String, Error> {
    let arguments = require("case", arguments, "a value to match")?;
    Ok(format!("<?v case {arguments} ?>"))
}

/// Shared shape of `@break` and `@continue`.
///
/// Bare emits the plain instruction, an integer argument emits a level
/// count clamped to at least one, and anything else becomes the
/// conditional form.
fn expand_interrupt(plain: &str, conditional: &str, arguments: Option<&str>) -> String {
    let Some(arguments) = arguments else {
        return format!("<?v {plain} ?>");
    };
    let inner = strip_parens(arguments);
    if inner.is_empty() {
        return format!("<?v {plain} ?>");
    }
    if let Ok(levels) = inner.parse::<i64>() {
        return format!("<?v {plain} {} ?>", levels.max(1));
    }

    format!("<?v {conditional} {arguments} ?>")
}

fn expand_break(arguments: Option<&str>) -> Result<String, Error> {
    Ok(expand_interrupt("break", "breakif", arguments))
}

fn expand_continue(arguments: Option<&str>) -> Result<String, Error> {
    Ok(expand_interrupt("continue", "continueif", arguments))
}

fn expand_exit(arguments: Option<&str>) -> Result<String, Error> {
    let Some(arguments) = arguments else {
        return Ok("<?v exit ?>".to_string());
    };
    let inner = strip_parens(arguments);
    // An exit code means nothing to a template, only the conditional
    // form carries information.
    if inner.is_empty() || inner.parse::<i64>().is_ok() {
        return Ok("<?v exit ?>".to_string());
    }

    Ok(format!("<?v exitif {arguments} ?>"))
}

fn expand_for(arguments: Option<&str>) -> Result<String, Error> {
    let arguments = require("for", arguments, "an initializer, condition and step")?;
    Ok(format!("<?v for {arguments} ?>"))
}

/// Shared shape of `@foreach` and `@forelse`.
fn expand_iteration(directive: &str, arguments: Option<&str>) -> Result<String, Error> {
    let arguments = require(directive, arguments, "`$iterable as $binding`")?;
    let inner = strip_parens(arguments);
    let Some(at) = inner.rfind(" as ") else {
        return Err(error_arguments(directive, arguments, "`$iterable as $binding`"));
    };
    let iteratee = inner[..at].trim();
    let binding = inner[at + 4..].trim();
    if iteratee.is_empty() || binding.is_empty() {
        return Err(error_arguments(directive, arguments, "`$iterable as $binding`"));
    }

    Ok(format!("<?v {directive} ({iteratee}) as {binding} ?>"))
}

fn expand_foreach(arguments: Option<&str>) -> Result<String, Error> {
    expand_iteration("foreach", arguments)
}

fn expand_forelse(arguments: Option<&str>) -> Result<String, Error> {
    expand_iteration("forelse", arguments)
}

fn expand_while(arguments: Option<&str>) -> Result<String, Error> {
    let arguments = require("while", arguments, "a condition")?;
    Ok(format!("<?v while {arguments} ?>"))
}

fn expand_extends(arguments: Option<&str>) -> Result<String, Error> {
    let arguments = require("extends", arguments, "a template name")?;
    Ok(format!("<?v extends {} ?>", strip_parens(arguments)))
}

fn expand_include(arguments: Option<&str>) -> Result<String, Error> {
    let arguments = require("include", arguments, "a template name")?;
    Ok(format!("<?v include {} ?>", strip_parens(arguments)))
}

fn expand_yield(arguments: Option<&str>) -> Result<String, Error> {
    let arguments = require("yield", arguments, "a block name and optional default")?;
    Ok(format!("<?v yield {arguments} ?>"))
}

fn expand_section(arguments: Option<&str>) -> Result<String, Error> {
    let arguments = require("section", arguments, "a block name")?;
    Ok(format!("<?v section {arguments} ?>"))
}

fn expand_json(arguments: Option<&str>) -> Result<String, Error> {
    let arguments = require("json", arguments, "an expression")?;
    let inner = strip_parens(arguments);
    // Trailing encoder options are accepted and ignored.
    let first = split_top_level(inner, ',')[0].trim();
    if first.is_empty() {
        return Err(error_arguments("json", arguments, "an expression"));
    }

    Ok(format!("<?v json ({first}) ?>"))
}

fn expand_unset(arguments: Option<&str>) -> Result<String, Error> {
    let arguments = require("unset", arguments, "a variable")?;
    Ok(format!("<?v unset {arguments} ?>"))
}

fn expand_method(arguments: Option<&str>) -> Result<String, Error> {
    let arguments = require("method", arguments, "an HTTP method")?;
    Ok(format!(
        "<input type=\"hidden\" name=\"_method\" value=\"<?v method {arguments} ?>\">\n"
    ))
}

fn expand_php(arguments: Option<&str>) -> Result<String, Error> {
    match arguments {
        // Bare `@php` opens a verbatim block, which a later pass pairs
        // with `@endphp`. Leave the token for it to find.
        None => Ok("@php".to_string()),
        Some(arguments) => {
            let inner = strip_parens(arguments);
            if inner.is_empty() {
                return Err(error_arguments("php", arguments, "a statement"));
            }
            Ok(format!("<?v do {arguments} ?>"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{split_top_level, strip_parens, Registry};
    use crate::log::{Error, INVALID_ARGUMENTS, INVALID_DIRECTIVE};

    #[test]
    fn test_strip_parens() {
        assert_eq!(strip_parens("( $a + 1 )"), "$a + 1");
        assert_eq!(strip_parens("$a + 1"), "$a + 1");
        assert_eq!(strip_parens("()"), "");
    }

    #[test]
    fn test_split_top_level() {
        assert_eq!(
            split_top_level("f(a, b), 'x,y', c", ','),
            vec!["f(a, b)", " 'x,y'", " c"]
        );
    }

    #[test]
    fn test_expand_if() {
        let registry = Registry::new();

        assert_eq!(
            registry.expand("if", Some("($a)")).unwrap().unwrap(),
            "<?v if ($a) ?>"
        );
        assert_eq!(
            registry
                .expand("if", None)
                .unwrap()
                .unwrap_err()
                .get_reason(),
            INVALID_ARGUMENTS
        );
    }

    #[test]
    fn test_expand_break_forms() {
        let registry = Registry::new();

        assert_eq!(
            registry.expand("break", None).unwrap().unwrap(),
            "<?v break ?>"
        );
        assert_eq!(
            registry.expand("break", Some("(2)")).unwrap().unwrap(),
            "<?v break 2 ?>"
        );
        assert_eq!(
            registry.expand("break", Some("(0)")).unwrap().unwrap(),
            "<?v break 1 ?>"
        );
        assert_eq!(
            registry
                .expand("break", Some("($i > 3)"))
                .unwrap()
                .unwrap(),
            "<?v breakif ($i > 3) ?>"
        );
    }

    #[test]
    fn test_expand_foreach_requires_as() {
        let registry = Registry::new();

        assert_eq!(
            registry
                .expand("foreach", Some("($users as $user)"))
                .unwrap()
                .unwrap(),
            "<?v foreach ($users) as $user ?>"
        );
        assert!(registry
            .expand("foreach", Some("($users)"))
            .unwrap()
            .is_err());
    }

    #[test]
    fn test_expand_json_drops_options() {
        let registry = Registry::new();

        assert_eq!(
            registry
                .expand("json", Some("($data, JSON_PRETTY_PRINT, 512)"))
                .unwrap()
                .unwrap(),
            "<?v json ($data) ?>"
        );
    }

    #[test]
    fn test_custom_directive_receives_inner() {
        let mut registry = Registry::new();
        registry
            .register("upper", |arguments: &str| {
                Ok::<_, Error>(arguments.to_uppercase())
            })
            .unwrap();

        assert_eq!(
            registry.expand("upper", Some("( abc )")).unwrap().unwrap(),
            "ABC"
        );
        assert_eq!(registry.expand("upper", None).unwrap().unwrap(), "");
    }

    #[test]
    fn test_register_rejects_bad_names() {
        let mut registry = Registry::new();
        let handler = |_: &str| Ok::<_, Error>(String::new());

        assert_eq!(
            registry.register("has space", handler).unwrap_err().get_reason(),
            INVALID_DIRECTIVE
        );
        assert!(registry.register("form->open", handler).is_ok());
    }

    #[test]
    fn test_builtin_wins_over_custom() {
        let mut registry = Registry::new();
        registry
            .register("endif", |_: &str| Ok::<_, Error>("shadowed".to_string()))
            .unwrap();

        assert_eq!(
            registry.expand("endif", None).unwrap().unwrap(),
            "<?v endif ?>"
        );
    }

    #[test]
    fn test_unknown_directive_is_none() {
        assert!(Registry::new().expand("nonsense", None).is_none());
    }
}
