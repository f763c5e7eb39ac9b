//! `key=value` block reader for line-oriented model formats.
//!
//! A block starts at the first non-blank line and ends at the next blank line
//! (or end of input). A line without `=` is stored as a key with an empty
//! value; a line with more than one `=` is rejected.

use std::collections::HashMap;
use std::io::BufRead;
use std::str::FromStr;

// =============================================================================
// Error types
// =============================================================================

/// Error from reading or converting a parameter block.
#[derive(Debug, thiserror::Error)]
pub enum ParamsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected end of input while reading {context}")]
    UnexpectedEnd { context: &'static str },
    #[error("malformed parameter line: {line:?}")]
    MalformedLine { line: String },
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
    #[error("only {field}={expected} is supported (got {actual:?})")]
    Unsupported {
        field: &'static str,
        expected: &'static str,
        actual: String,
    },
}

// =============================================================================
// Params
// =============================================================================

/// One parsed parameter block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    values: HashMap<String, String>,
}

impl Params {
    /// Read the next block from `reader`.
    ///
    /// Leading blank lines are skipped. Fails with
    /// [`ParamsError::UnexpectedEnd`] when the input holds no further block.
    pub fn read_until_blank<R: BufRead>(reader: &mut R) -> Result<Self, ParamsError> {
        let mut values = HashMap::new();
        let mut line = String::new();

        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                return Err(ParamsError::UnexpectedEnd {
                    context: "parameter block",
                });
            }
            if !line.trim().is_empty() {
                break;
            }
        }

        loop {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                break;
            }
            let mut tokens = trimmed.split('=');
            let key = tokens.next().unwrap_or_default();
            let value = tokens.next().unwrap_or_default();
            if tokens.next().is_some() {
                return Err(ParamsError::MalformedLine {
                    line: trimmed.to_string(),
                });
            }
            values.insert(key.to_string(), value.to_string());

            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
        }

        Ok(Self { values })
    }

    /// Whether `key` is present, with or without a value.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Number of keys in the block.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw string value.
    pub fn string(&self, key: &'static str) -> Result<&str, ParamsError> {
        self.values
            .get(key)
            .map(String::as_str)
            .ok_or(ParamsError::MissingField(key))
    }

    /// Fail unless `key` is present and equal to `expected`.
    pub fn expect_eq(&self, key: &'static str, expected: &'static str) -> Result<(), ParamsError> {
        let actual = self.string(key)?;
        if actual != expected {
            return Err(ParamsError::Unsupported {
                field: key,
                expected,
                actual: actual.to_string(),
            });
        }
        Ok(())
    }

    /// Signed integer value.
    pub fn int(&self, key: &'static str) -> Result<i64, ParamsError> {
        parse_scalar(key, self.string(key)?)
    }

    /// Floating point value.
    pub fn float(&self, key: &'static str) -> Result<f64, ParamsError> {
        parse_scalar(key, self.string(key)?)
    }

    /// Whitespace separated `i32` values.
    pub fn int32_vec(&self, key: &'static str) -> Result<Vec<i32>, ParamsError> {
        parse_vec(key, self.string(key)?)
    }

    /// Whitespace separated `u32` values.
    pub fn uint32_vec(&self, key: &'static str) -> Result<Vec<u32>, ParamsError> {
        parse_vec(key, self.string(key)?)
    }

    /// Whitespace separated `f64` values.
    pub fn float64_vec(&self, key: &'static str) -> Result<Vec<f64>, ParamsError> {
        parse_vec(key, self.string(key)?)
    }
}

fn parse_scalar<T>(field: &'static str, value: &str) -> Result<T, ParamsError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ParamsError::InvalidValue {
        field,
        message: format!("{value:?}: {e}"),
    })
}

fn parse_vec<T>(field: &'static str, value: &str) -> Result<Vec<T>, ParamsError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.split_whitespace().map(|v| parse_scalar(field, v)).collect()
}
