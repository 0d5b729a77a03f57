//! Completion suggestions
//!
//! The query is parsed as typed. When it ends in whitespace a completion
//! marker is appended, so the parser fails exactly where the next token would
//! go and reports what it would have accepted. When it ends mid-token, the
//! failing token's alternatives are narrowed to those it is a prefix of.

use crate::Error;
use crate::context::WorkflowContext;
use crate::query::parser::XqlParser;

/// What could come next in a query
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Suggestion {
    /// The query parsed without error
    pub is_valid: bool,
    /// Usage line of the verb being typed
    pub usage: Option<String>,
    /// Kind of token expected
    pub category: Option<String>,
    /// Candidate next tokens
    pub values: Vec<String>,
    /// Error text when the query is invalid for another reason
    pub message: Option<String>,
}

/// Suggest completions for `query`
pub fn suggest(query: &str, context: &WorkflowContext) -> Suggestion {
    let at_boundary = query.is_empty() || query.ends_with(char::is_whitespace);
    let text = if at_boundary {
        format!("{query}~")
    } else {
        query.to_string()
    };

    let error = match XqlParser::parse(&text, context) {
        Ok(_) => {
            return Suggestion {
                is_valid: true,
                ..Suggestion::default()
            };
        }
        Err(error) => error,
    };

    let Error::Usage(usage) = error else {
        return Suggestion {
            message: Some(error.to_string()),
            ..Suggestion::default()
        };
    };

    let partial = !at_boundary
        && !usage.invalid_token.is_empty()
        && query
            .trim_end_matches([']', '"'])
            .ends_with(usage.invalid_token.as_str());
    let values = if partial {
        let prefix = usage.invalid_token.to_ascii_lowercase();
        usage
            .valid_values
            .iter()
            .filter(|v| {
                v.trim_start_matches('[')
                    .to_ascii_lowercase()
                    .starts_with(&prefix)
            })
            .cloned()
            .collect()
    } else {
        usage.valid_values.clone()
    };

    Suggestion {
        is_valid: false,
        message: (!partial && !usage.invalid_token.is_empty()).then(|| usage.to_string()),
        usage: usage.usage,
        category: Some(usage.value_category),
        values,
    }
}
