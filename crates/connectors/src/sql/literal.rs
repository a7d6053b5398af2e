use model::core::value::Value;
use std::fmt::Write;

/// Renders values as SQL literals for statements that embed data inline.
pub trait SqlLiteralEncoder: Send + Sync {
    /// Encodes a concrete value into a literal the backend parses back to it.
    fn encode_value(&self, value: &Value) -> String;

    /// Quotes an identifier (table or column name).
    fn quote_identifier(&self, ident: &str) -> String;

    fn encode_null(&self) -> String {
        "NULL".to_string()
    }
}

/// MySQL literals, assuming the server runs without `NO_BACKSLASH_ESCAPES`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlLiteralEncoder;

impl MySqlLiteralEncoder {
    pub fn new() -> Self {
        Self
    }

    fn encode_bytes(&self, bytes: &[u8]) -> String {
        if bytes.is_empty() {
            return "''".to_string();
        }
        let mut out = String::with_capacity(3 + 2 * bytes.len());
        out.push_str("X'");
        for byte in bytes {
            let _ = write!(&mut out, "{byte:02x}");
        }
        out.push('\'');
        out
    }
}

/// Quotes `raw` as a MySQL string literal.
///
/// Backslash is escaped before the quote so an input `\'` can never close the
/// literal early. Control characters MySQL treats specially are escaped too.
pub fn quote_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('\'');
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{1a}' => out.push_str("\\Z"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

impl SqlLiteralEncoder for MySqlLiteralEncoder {
    fn encode_value(&self, value: &Value) -> String {
        match value {
            Value::Null => self.encode_null(),
            Value::Int(v) => v.to_string(),
            Value::Uint(v) => v.to_string(),
            Value::Float(v) if v.is_finite() => ryu::Buffer::new().format_finite(*v).to_string(),
            Value::Float(_) => self.encode_null(),
            Value::Boolean(v) => (if *v { "1" } else { "0" }).to_string(),
            Value::String(s) => quote_string(s),
            Value::Bytes(b) => match std::str::from_utf8(b) {
                Ok(s) => quote_string(s),
                Err(_) => self.encode_bytes(b),
            },
            Value::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
            Value::DateTime(dt) => format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S")),
            Value::Time(t) => format!("'{t}'"),
        }
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }
}
