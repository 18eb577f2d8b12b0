use serde_json::{Map, Value};
use std::fmt::{Arguments, Display, Result, Write};

/// Wraps some underlying buffer by providing methods that write to it
/// in different formats.
pub struct Pipe<'buffer> {
    buffer: &'buffer mut (dyn Write + 'buffer),
}

impl<'buffer> Pipe<'buffer> {
    /// Create a new Pipe that writes to the given buffer.
    pub fn new(buffer: &'buffer mut String) -> Self {
        Self { buffer }
    }

    /// Write the given Value to the Pipe buffer.
    ///
    /// Null writes nothing at all, matching what a template author expects
    /// from echoing an unset variable.
    ///
    /// # Errors
    ///
    /// The Pipe supports all Value types, so the only error that will
    /// be returned is propagated from the [write!] macro itself.
    pub fn write_value(&mut self, value: &Value) -> Result {
        match value {
            Value::Null => Ok(()),
            Value::String(string) => self.write_str(string),
            Value::Array(array) => self.write_array(array),
            Value::Object(object) => self.write_object(object),
            _ => self.write_display(value),
        }
    }

    /// Write the value to the buffer using the Display implementation.
    fn write_display(&mut self, value: impl Display) -> Result {
        write!(self.buffer, "{}", value)
    }

    /// Write the value to the buffer as a comma separated list surrounded
    /// by brackets.
    fn write_array(&mut self, value: &[Value]) -> Result {
        write!(self.buffer, "[")?;
        for (i, item) in value.iter().enumerate() {
            if i > 0 {
                write!(self.buffer, ", ")?;
            }
            self.write_value(item)?;
        }
        write!(self.buffer, "]")
    }

    /// Write the value to the buffer as key/value pairs surrounded by
    /// curly braces.
    fn write_object(&mut self, value: &Map<String, Value>) -> Result {
        write!(self.buffer, "{{")?;
        for (i, (key, value)) in value.iter().enumerate() {
            if i > 0 {
                write!(self.buffer, ", ")?;
            }
            write!(self.buffer, "{}: ", key)?;
            self.write_value(value)?;
        }
        write!(self.buffer, "}}")
    }
}

impl Write for Pipe<'_> {
    #[inline]
    fn write_str(&mut self, s: &str) -> Result {
        Write::write_str(self.buffer, s)
    }

    #[inline]
    fn write_char(&mut self, c: char) -> Result {
        Write::write_char(self.buffer, c)
    }

    #[inline]
    fn write_fmt(&mut self, args: Arguments<'_>) -> Result {
        Write::write_fmt(self.buffer, args)
    }
}

/// Return the given text with the characters `&`, `"`, `'`, `<` and `>`
/// replaced by HTML entities.
pub fn escape(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '"' => output.push_str("&quot;"),
            '\'' => output.push_str("&#039;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            _ => output.push(c),
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::{escape, Pipe};
    use serde_json::json;

    #[test]
    fn test_write_null_is_empty() {
        let mut buffer = String::new();
        Pipe::new(&mut buffer).write_value(&json!(null)).unwrap();

        assert_eq!(buffer, "");
    }

    #[test]
    fn test_write_array() {
        let mut buffer = String::new();
        Pipe::new(&mut buffer)
            .write_value(&json!(["one", 2, false]))
            .unwrap();

        assert_eq!(buffer, "[one, 2, false]");
    }

    #[test]
    fn test_write_object() {
        let mut buffer = String::new();
        Pipe::new(&mut buffer)
            .write_value(&json!({"a": 1, "b": "two"}))
            .unwrap();

        assert_eq!(buffer, "{a: 1, b: two}");
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape(r#"<b class="x">'&'</b>"#), "&lt;b class=&quot;x&quot;&gt;&#039;&amp;&#039;&lt;/b&gt;");
    }
}
