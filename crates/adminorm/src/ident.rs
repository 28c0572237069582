//! SQL identifier validation and quoting.
//!
//! Mapping names are case-sensitive (`IdUser`, `EmailUser`), so every rendered
//! identifier part is double-quoted. Input may be plain (`users.IdGroup`) or
//! already quoted (`"users"."IdGroup"`).
//!
//! - Plain parts are validated against: `[A-Za-z_][A-Za-z0-9_$]*`
//! - Quoted parts allow any characters except NUL and escape `"` as `""`

use crate::error::{OrmError, OrmResult};

/// A dotted SQL identifier (`table`, `column`, `table.column`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub parts: Vec<String>,
}

impl Ident {
    /// Parse an identifier string, supporting dotted and quoted forms.
    pub fn parse(s: &str) -> OrmResult<Self> {
        if s.is_empty() {
            return Err(OrmError::statement("Identifier cannot be empty"));
        }
        if s.contains('\0') {
            return Err(OrmError::statement(
                "Identifier cannot contain NUL character",
            ));
        }

        let mut parts = Vec::new();
        let mut chars = s.chars().peekable();

        while chars.peek().is_some() {
            if !parts.is_empty() {
                match chars.next() {
                    Some('.') => {
                        if chars.peek().is_none() {
                            return Err(OrmError::statement(format!(
                                "Trailing '.' in identifier '{s}'"
                            )));
                        }
                    }
                    Some(c) => {
                        return Err(OrmError::statement(format!(
                            "Expected '.' between identifier parts of '{s}', got '{c}'"
                        )));
                    }
                    None => break,
                }
            }

            if chars.peek() == Some(&'"') {
                chars.next();
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('"') => {
                            if chars.peek() == Some(&'"') {
                                chars.next();
                                name.push('"');
                            } else {
                                break;
                            }
                        }
                        Some(c) => name.push(c),
                        None => {
                            return Err(OrmError::statement(format!(
                                "Unclosed quoted identifier in '{s}'"
                            )));
                        }
                    }
                }
                if name.is_empty() {
                    return Err(OrmError::statement("Empty quoted identifier"));
                }
                parts.push(name);
                continue;
            }

            let mut name = String::new();
            while let Some(&c) = chars.peek() {
                if c == '.' {
                    break;
                }
                let valid = if name.is_empty() {
                    c == '_' || c.is_ascii_alphabetic()
                } else {
                    c == '_' || c == '$' || c.is_ascii_alphanumeric()
                };
                if !valid {
                    return Err(OrmError::statement(format!(
                        "Invalid character '{c}' in identifier '{s}'"
                    )));
                }
                name.push(c);
                chars.next();
            }
            if name.is_empty() {
                return Err(OrmError::statement(format!(
                    "Empty identifier segment in '{s}'"
                )));
            }
            parts.push(name);
        }

        Ok(Self { parts })
    }

    /// Render the identifier as SQL, every part quoted.
    pub fn to_sql(&self) -> String {
        let mut out = String::new();
        self.write_sql(&mut out);
        out
    }

    pub(crate) fn write_sql(&self, out: &mut String) {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            out.push('"');
            for ch in part.chars() {
                if ch == '"' {
                    out.push_str("\"\"");
                } else {
                    out.push(ch);
                }
            }
            out.push('"');
        }
    }
}
