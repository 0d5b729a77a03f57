//! Usage errors with valid alternatives
//!
//! Every parse failure names what kind of token was expected, what was found,
//! and (when the set is known) which values would have been accepted. The same
//! data drives completion suggestions.

use std::fmt;

/// Malformed query input
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UsageError {
    /// Usage line of the verb or function being parsed
    pub usage: Option<String>,
    /// The offending token text (empty at end of input)
    pub invalid_token: String,
    /// What kind of token was expected: `verb`, `column`, `table`, ...
    pub value_category: String,
    /// Accepted values, when the set is finite
    pub valid_values: Vec<String>,
    /// Extra detail beyond "invalid token"
    pub message: Option<String>,
    /// 1-based query line of the token
    pub line: Option<usize>,
    /// Text of that query line
    pub query_line: Option<String>,
}

impl UsageError {
    /// `token` is not a valid `category`; `valid_values` lists what is
    pub fn new(category: &str, token: &str, valid_values: Vec<String>) -> Self {
        Self {
            invalid_token: token.to_string(),
            value_category: category.to_string(),
            valid_values,
            ..Self::default()
        }
    }

    /// Attach the usage line of the verb or function being parsed
    pub fn with_usage(mut self, usage: &str) -> Self {
        if self.usage.is_none() {
            self.usage = Some(usage.to_string());
        }
        self
    }

    /// Attach a free-form explanation
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attach the query position, unless one is already set
    pub fn at_line(mut self, line: usize, text: &str) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
            self.query_line = Some(text.to_string());
        }
        self
    }
}

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(usage) = &self.usage {
            writeln!(f, "Usage: {usage}")?;
        }
        if let (Some(line), Some(text)) = (self.line, &self.query_line) {
            writeln!(f, "Line {line}: {text}")?;
        }
        if self.invalid_token.is_empty() {
            write!(f, "Expected {}", self.value_category)?;
        } else {
            write!(
                f,
                "Invalid {} '{}'",
                self.value_category, self.invalid_token
            )?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if !self.valid_values.is_empty() {
            write!(f, ". Valid options: {}", self.valid_values.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for UsageError {}
