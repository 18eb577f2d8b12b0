use crate::region::Region;

/// A directive token found in template source.
#[derive(Debug, PartialEq)]
pub struct Token<'source> {
    /// The directive name, without the leading `@`.
    pub name: &'source str,
    /// True when the directive was written `@@name` and should render
    /// as the literal text `@name`.
    pub escaped: bool,
    /// The spaces and tabs between the name and the arguments.
    pub whitespace: &'source str,
    /// The argument text including the surrounding parentheses, if any.
    pub arguments: Option<&'source str>,
    /// The location of the entire token within the source.
    pub region: Region,
    /// True when an opening parenthesis was found but never balanced.
    pub malformed: bool,
}

/// Return the next directive token at or after the given offset.
///
/// A directive is an `@` that does not directly follow a word character,
/// a name of word characters with at most one `->`, and optionally a
/// balanced parenthesized argument list after horizontal whitespace.
///
/// Parenthesis matching counts depth only, it is not aware of string
/// literals.
pub fn scan(source: &str, from: usize) -> Option<Token<'_>> {
    let bytes = source.as_bytes();
    let mut i = from;

    while i < bytes.len() {
        if bytes[i] != b'@' || (i > 0 && is_word(bytes[i - 1])) {
            i += 1;
            continue;
        }

        let escaped = bytes.get(i + 1) == Some(&b'@');
        let name_begin = if escaped { i + 2 } else { i + 1 };
        let mut j = name_begin;
        while j < bytes.len() && is_word(bytes[j]) {
            j += 1;
        }
        if j == name_begin {
            i = name_begin;
            continue;
        }
        if !escaped && bytes.get(j) == Some(&b'-') && bytes.get(j + 1) == Some(&b'>') {
            let mut k = j + 2;
            while k < bytes.len() && is_word(bytes[k]) {
                k += 1;
            }
            if k > j + 2 {
                j = k;
            }
        }
        let name = &source[name_begin..j];

        if escaped {
            return Some(Token {
                name,
                escaped: true,
                whitespace: "",
                arguments: None,
                region: Region::new(i..j),
                malformed: false,
            });
        }

        let mut w = j;
        while w < bytes.len() && (bytes[w] == b' ' || bytes[w] == b'\t') {
            w += 1;
        }
        let whitespace = &source[j..w];

        if bytes.get(w) != Some(&b'(') {
            return Some(Token {
                name,
                escaped: false,
                whitespace,
                arguments: None,
                region: Region::new(i..w),
                malformed: false,
            });
        }

        let mut depth = 0usize;
        for (k, &byte) in bytes.iter().enumerate().skip(w) {
            match byte {
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(Token {
                            name,
                            escaped: false,
                            whitespace,
                            arguments: Some(&source[w..=k]),
                            region: Region::new(i..k + 1),
                            malformed: false,
                        });
                    }
                }
                _ => {}
            }
        }

        return Some(Token {
            name,
            escaped: false,
            whitespace,
            arguments: None,
            region: Region::new(i..w + 1),
            malformed: true,
        });
    }

    None
}

fn is_word(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

#[cfg(test)]
mod tests {
    use super::scan;
    use crate::region::Region;

    #[test]
    fn test_scan_bare() {
        let source = "text @else more";
        let token = scan(source, 0).unwrap();

        assert_eq!(token.name, "else");
        assert_eq!(token.arguments, None);
        assert_eq!(token.whitespace, " ");
        assert_eq!(&source[token.region], "@else ");
        assert!(!token.escaped);
    }

    #[test]
    fn test_scan_arguments() {
        let source = "@if ($a && f(1, 2))!";
        let token = scan(source, 0).unwrap();

        assert_eq!(token.name, "if");
        assert_eq!(token.whitespace, " ");
        assert_eq!(token.arguments, Some("($a && f(1, 2))"));
        assert_eq!(token.region, Region::new(0..19));
    }

    #[test]
    fn test_scan_skips_emails() {
        let source = "mail me at a@example.com, @endif";
        let token = scan(source, 0).unwrap();

        assert_eq!(token.name, "endif");
        assert_eq!(token.region.begin, 26);
    }

    #[test]
    fn test_scan_escaped() {
        let source = "@@if ($a)";
        let token = scan(source, 0).unwrap();

        assert!(token.escaped);
        assert_eq!(token.name, "if");
        assert_eq!(&source[token.region], "@@if");
    }

    #[test]
    fn test_scan_member_name() {
        let token = scan("@form->open('x')", 0).unwrap();

        assert_eq!(token.name, "form->open");
        assert_eq!(token.arguments, Some("('x')"));
    }

    #[test]
    fn test_scan_malformed() {
        let token = scan("@if ($a", 0).unwrap();

        assert!(token.malformed);
        assert_eq!(token.arguments, None);
        assert_eq!(token.region, Region::new(0..5));
    }

    #[test]
    fn test_scan_none() {
        assert!(scan("no directives here", 0).is_none());
        assert!(scan("@ not a name", 0).is_none());
    }
}
