use morel::Syntax;

/// Markers that identify the two ends of an echo or comment within
/// template text.
pub enum Marker {
    /// Opening marker, such as `{{`.
    Begin = 0,
    /// Closing marker, such as `}}`.
    End = 1,
}

impl From<usize> for Marker {
    fn from(value: usize) -> Self {
        match value {
            0 => Self::Begin,
            1 => Self::End,
            _ => unreachable!(),
        }
    }
}

impl From<Marker> for usize {
    fn from(marker: Marker) -> Self {
        marker as usize
    }
}

/// Return a [`Syntax`] matching comments, `{{-- ... --}}`.
pub fn comment() -> Syntax {
    pair("{{--", "--}}")
}

/// Return a [`Syntax`] matching escaped echoes, `{{{ ... }}}`.
pub fn triple() -> Syntax {
    pair("{{{", "}}}")
}

/// Return a [`Syntax`] matching unescaped echoes, `{!! ... !!}`.
pub fn raw() -> Syntax {
    pair("{!!", "!!}")
}

/// Return a [`Syntax`] matching the short unescaped form, `{! ... !}`.
pub fn raw_short() -> Syntax {
    pair("{!", "!}")
}

/// Return a [`Syntax`] matching escaped echoes, `{{ ... }}`.
pub fn echo() -> Syntax {
    pair("{{", "}}")
}

fn pair(begin: &str, end: &str) -> Syntax {
    Syntax::new(vec![
        (Marker::Begin.into(), begin.into()),
        (Marker::End.into(), end.into()),
    ])
}
