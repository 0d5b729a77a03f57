//! Pipeline query parser
//!
//! A query is one verb per line. The parser resolves each verb from the
//! registry in [`crate::verbs`] and hands itself to the verb's builder, which
//! pulls exactly the arguments it understands through the `next_*` methods.
//!
//! ```text
//! Expr    := AndExpr (OR AndExpr)*
//! AndExpr := Term ([AND] Term)*
//! Term    := NOT? ( '(' Expr ')' | Scalar CompareOp Scalar )
//! Scalar  := [Column] | Literal | Function '(' Scalar* ')'
//! ```

use crate::context::WorkflowContext;
use crate::data::{ColumnType, find_column};
use crate::query::expression::{CompareOperator, Expr, FunctionCall, ScalarExpr};
use crate::query::functions::{self, function_names};
use crate::query::scanner::{Scanner, Token, TokenKind};
use crate::query::usage::UsageError;
use crate::table::XTable;
use crate::table::pipeline::column_names;
use crate::verbs::{self, VerbEntry};
use crate::{Error, Result};
use tracing::debug;

/// Parses query text into a pipeline of tables
pub struct XqlParser<'a> {
    scanner: Scanner,
    context: &'a WorkflowContext,
}

impl<'a> XqlParser<'a> {
    /// Parser over `query`
    pub fn new(query: &str, context: &'a WorkflowContext) -> Self {
        Self {
            scanner: Scanner::new(query),
            context,
        }
    }

    /// Build the pipeline described by `query`
    pub fn parse(query: &str, context: &WorkflowContext) -> Result<Box<dyn XTable>> {
        XqlParser::new(query, context).build_pipeline(None)
    }

    /// Build `query` on top of an existing table
    pub fn parse_with_source(
        query: &str,
        source: Box<dyn XTable>,
        context: &WorkflowContext,
    ) -> Result<Box<dyn XTable>> {
        XqlParser::new(query, context).build_pipeline(Some(source))
    }

    /// Context the pipeline is built in
    pub fn context(&self) -> &WorkflowContext {
        self.context
    }

    fn build_pipeline(&mut self, mut source: Option<Box<dyn XTable>>) -> Result<Box<dyn XTable>> {
        loop {
            self.scanner.skip_newlines();
            if self.scanner.current().kind == TokenKind::End {
                break;
            }
            let line = self.scanner.current().line;
            source = Some(self.build_verb(source.take()).map_err(|e| match e {
                Error::Usage(usage) => {
                    Error::Usage(usage.at_line(line, self.scanner.line_text(line)))
                }
                other => other,
            })?);
        }
        source.ok_or_else(|| {
            UsageError::new("verb", "", verbs::verb_names())
                .with_message("query is empty")
                .into()
        })
    }

    fn build_verb(&mut self, source: Option<Box<dyn XTable>>) -> Result<Box<dyn XTable>> {
        let token = self.scanner.current().clone();
        let verb = match token.kind {
            TokenKind::Value if !token.quoted => verbs::lookup_verb(&token.value),
            _ => None,
        };
        let verb: &VerbEntry = verb.ok_or_else(|| {
            Error::from(UsageError::new("verb", hint_text(&token), verbs::verb_names()))
        })?;
        self.scanner.advance();
        debug!("Building verb '{}'", verb.name);

        let with_usage = |e: Error| match e {
            Error::Usage(usage) => Error::Usage(usage.with_usage(verb.usage)),
            other => other,
        };
        let table = (verb.build)(self, source).map_err(with_usage)?;

        let leftover = self.scanner.current();
        if !leftover.ends_line() {
            return Err(with_usage(
                UsageError::new("argument", hint_text(leftover), Vec::new())
                    .with_message(format!("{} takes no further arguments", verb.name))
                    .into(),
            ));
        }
        Ok(table)
    }

    /// Fail unless an upstream table exists
    pub fn require_source(&self, source: Option<Box<dyn XTable>>) -> Result<Box<dyn XTable>> {
        source.ok_or_else(|| {
            UsageError::new("verb", "", vec!["read".to_string()])
                .with_message("this verb needs an input; start the query with read")
                .into()
        })
    }

    /// Current token
    pub fn current(&self) -> &Token {
        self.scanner.current()
    }

    /// Consume the current token
    pub fn advance(&mut self) -> Token {
        self.scanner.advance()
    }

    /// Whether the current verb line has more tokens
    pub fn has_another_argument(&self) -> bool {
        !self.scanner.current().ends_line()
    }

    /// Consume the current token if it is the unquoted word `word`
    pub fn accept_word(&mut self, word: &str) -> bool {
        if self.scanner.current().is_word(word) {
            self.scanner.advance();
            true
        } else {
            false
        }
    }

    /// A `[Column]` of `source`
    pub fn next_column(&mut self, source: &dyn XTable) -> Result<usize> {
        let token = self.scanner.current().clone();
        if token.kind == TokenKind::ColumnName {
            if let Some(index) = find_column(source.schema(), &token.value) {
                self.scanner.advance();
                return Ok(index);
            }
        }
        Err(UsageError::new("column", hint_text(&token), column_names(source.schema())).into())
    }

    /// A `[Name]` for a new or renamed column
    pub fn next_output_column_name(&mut self) -> Result<String> {
        let token = self.scanner.current().clone();
        if token.kind == TokenKind::ColumnName && !token.value.is_empty() {
            self.scanner.advance();
            Ok(token.value)
        } else {
            Err(UsageError::new("column name", hint_text(&token), Vec::new()).into())
        }
    }

    /// A bare or quoted value of the given category
    pub fn next_value(&mut self, category: &str) -> Result<String> {
        let token = self.scanner.current().clone();
        if token.kind == TokenKind::Value {
            self.scanner.advance();
            Ok(token.value)
        } else {
            Err(UsageError::new(category, hint_text(&token), Vec::new()).into())
        }
    }

    /// A table name, opened from the catalog
    pub fn next_table(&mut self) -> Result<Box<dyn XTable>> {
        let token = self.scanner.current().clone();
        if token.kind != TokenKind::Value {
            return Err(UsageError::new(
                "table",
                hint_text(&token),
                self.context.catalog.table_names(),
            )
            .into());
        }
        let table = self.context.catalog.open(&token.value)?;
        self.scanner.advance();
        Ok(table)
    }

    /// A non-negative integer
    pub fn next_count(&mut self, category: &str) -> Result<usize> {
        let token = self.scanner.current().clone();
        match token.value.parse::<usize>() {
            Ok(value) if token.kind == TokenKind::Value => {
                self.scanner.advance();
                Ok(value)
            }
            _ => Err(UsageError::new(category, hint_text(&token), Vec::new())
                .with_message("expected a non-negative integer")
                .into()),
        }
    }

    /// A column type name
    pub fn next_type(&mut self) -> Result<ColumnType> {
        let token = self.scanner.current().clone();
        match ColumnType::parse(&token.value) {
            Some(column_type) if token.kind == TokenKind::Value => {
                self.scanner.advance();
                Ok(column_type)
            }
            _ => Err(UsageError::new("type", hint_text(&token), ColumnType::names()).into()),
        }
    }

    /// One of `options`, case-insensitively; returns its index
    pub fn next_option(&mut self, category: &str, options: &[&str]) -> Result<usize> {
        let token = self.scanner.current().clone();
        let found = options
            .iter()
            .position(|o| token.kind == TokenKind::Value && o.eq_ignore_ascii_case(&token.value));
        match found {
            Some(index) => {
                self.scanner.advance();
                Ok(index)
            }
            None => Err(UsageError::new(
                category,
                hint_text(&token),
                options.iter().map(|o| o.to_string()).collect(),
            )
            .into()),
        }
    }

    /// Column, literal or function call over `source`
    pub fn next_scalar(&mut self, source: &dyn XTable) -> Result<ScalarExpr> {
        let token = self.scanner.current().clone();
        match token.kind {
            TokenKind::ColumnName => {
                let index = self.next_column(source)?;
                Ok(ScalarExpr::column(index, source.schema()[index].clone()))
            }
            TokenKind::Value => {
                self.scanner.advance();
                Ok(ScalarExpr::literal(&token.value))
            }
            TokenKind::FunctionName => {
                let entry = functions::lookup(&token.value)?;
                self.scanner.advance();
                self.expect(TokenKind::OpenParen, "(")?;
                let mut args = Vec::new();
                while self.scanner.current().kind != TokenKind::CloseParen {
                    if self.scanner.current().ends_line() {
                        return Err(UsageError::new("argument", "", Vec::new())
                            .with_usage(entry.usage)
                            .with_message("missing ')'")
                            .into());
                    }
                    args.push(self.next_scalar(source).map_err(|e| match e {
                        Error::Usage(usage) => Error::Usage(usage.with_usage(entry.usage)),
                        other => other,
                    })?);
                }
                self.scanner.advance();
                let args = retype_literals(args).map_err(|e| match e {
                    Error::Usage(usage) => Error::Usage(usage.with_usage(entry.usage)),
                    other => other,
                })?;
                let types: Vec<ColumnType> = args.iter().map(ScalarExpr::column_type).collect();
                let function = entry.resolve(&types)?;
                Ok(ScalarExpr::Function(FunctionCall { function, args }))
            }
            _ => {
                let mut valid: Vec<String> = column_names(source.schema())
                    .into_iter()
                    .map(|name| format!("[{name}]"))
                    .collect();
                valid.extend(function_names());
                Err(UsageError::new("value", hint_text(&token), valid).into())
            }
        }
    }

    /// Boolean expression over `source`
    pub fn next_expression(&mut self, source: &dyn XTable) -> Result<Expr> {
        self.parse_or(source)
    }

    fn parse_or(&mut self, source: &dyn XTable) -> Result<Expr> {
        let mut terms = vec![self.parse_and(source)?];
        while self.accept_word("or") || self.accept_word("||") {
            terms.push(self.parse_and(source)?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::Or(terms)
        })
    }

    fn parse_and(&mut self, source: &dyn XTable) -> Result<Expr> {
        let mut terms = vec![self.parse_term(source)?];
        loop {
            if self.accept_word("and") || self.accept_word("&&") {
                terms.push(self.parse_term(source)?);
                continue;
            }
            let token = self.scanner.current();
            if token.kind == TokenKind::NextTokenHint {
                return Err(UsageError::new(
                    "operator",
                    "",
                    vec!["AND".to_string(), "OR".to_string(), "NOT".to_string()],
                )
                .into());
            }
            let starts_term = match token.kind {
                TokenKind::ColumnName | TokenKind::FunctionName | TokenKind::OpenParen => true,
                TokenKind::Value => token.quoted || !(token.is_word("or") || token.is_word("||")),
                _ => false,
            };
            if !starts_term {
                break;
            }
            terms.push(self.parse_term(source)?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::And(terms)
        })
    }

    fn parse_term(&mut self, source: &dyn XTable) -> Result<Expr> {
        if self.accept_word("not") || self.accept_word("!") {
            return Ok(Expr::Not(Box::new(self.parse_term(source)?)));
        }
        if self.scanner.current().kind == TokenKind::OpenParen {
            self.scanner.advance();
            let inner = self.parse_or(source)?;
            self.expect(TokenKind::CloseParen, ")")?;
            return Ok(inner);
        }

        let left = self.next_scalar(source)?;
        let token = self.scanner.current().clone();
        let op = match (token.kind, CompareOperator::parse(&token.value)) {
            (TokenKind::Value, Some(op)) if !token.quoted => op,
            _ => {
                return Err(UsageError::new(
                    "operator",
                    hint_text(&token),
                    CompareOperator::symbols(),
                )
                .into());
            }
        };
        self.scanner.advance();
        let right = self.next_scalar(source)?;
        Expr::compare(left, op, right)
    }

    fn expect(&mut self, kind: TokenKind, text: &str) -> Result<()> {
        let token = self.scanner.current().clone();
        if token.kind == kind {
            self.scanner.advance();
            Ok(())
        } else {
            Err(UsageError::new("token", hint_text(&token), vec![text.to_string()]).into())
        }
    }
}

/// Literal function arguments take the type of the first non-literal argument
fn retype_literals(args: Vec<ScalarExpr>) -> Result<Vec<ScalarExpr>> {
    let Some(to) = args.iter().find(|arg| !arg.is_constant()).map(ScalarExpr::column_type) else {
        return Ok(args);
    };
    args.into_iter()
        .map(|arg| if arg.is_constant() { arg.convert_to(to) } else { Ok(arg) })
        .collect()
}

/// Token text for error reporting; completion markers and line ends are empty
fn hint_text(token: &Token) -> &str {
    match token.kind {
        TokenKind::NextTokenHint | TokenKind::Newline | TokenKind::End => "",
        _ => &token.value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::XArray;
    use crate::table::{ArrayTable, InMemoryCatalog};
    use std::sync::Arc;

    fn context() -> WorkflowContext {
        let catalog = InMemoryCatalog::new();
        catalog.register_table(
            "Sample",
            ArrayTable::builder()
                .column("Port", XArray::from_vec(vec![80i32, 443, 80]))
                .column("Uri", XArray::from_strs(&["/a", "/b", "/c"]))
                .build()
                .unwrap(),
        );
        WorkflowContext::new(Arc::new(catalog))
    }

    fn expression(text: &str) -> Result<Expr> {
        let context = context();
        let source = context.catalog.open("Sample")?;
        let mut parser = XqlParser::new(text, &context);
        parser.next_expression(source.as_ref())
    }

    #[test]
    fn test_precedence_and_printing() {
        let expr = expression("[Port] = 80 AND [Uri] != /a OR [Port] > 100").unwrap();
        assert!(matches!(expr, Expr::Or(_)));
        assert_eq!(expr.to_string(), "[Port] = 80 AND [Uri] != /a OR [Port] > 100");

        let expr = expression("[Port] = 80 AND ([Uri] != /a OR [Port] > 100)").unwrap();
        assert!(matches!(expr, Expr::And(_)));
        assert_eq!(
            expr.to_string(),
            "[Port] = 80 AND ([Uri] != /a OR [Port] > 100)"
        );
    }

    #[test]
    fn test_symbol_connectors_and_implicit_and() {
        let expr = expression("![Port] == 80 && [Uri] : A || [Port] <> 1").unwrap();
        assert_eq!(expr.to_string(), "NOT [Port] = 80 AND [Uri] : A OR [Port] != 1");

        let expr = expression("[Port] = 80 [Uri] = /a").unwrap();
        assert_eq!(expr.to_string(), "[Port] = 80 AND [Uri] = /a");
    }

    #[test]
    fn test_function_arguments() {
        let expr = expression("ToUpper([Uri]) = \"/A\"").unwrap();
        assert_eq!(expr.to_string(), "ToUpper([Uri]) = /A");
        let err = expression("Length([Port]) = 1").unwrap_err();
        assert_eq!(err.as_usage().unwrap().usage.as_deref(), Some("Length({String})"));
    }

    #[test]
    fn test_errors_name_category() {
        let err = expression("[Missing] = 1").unwrap_err();
        let usage = err.as_usage().unwrap();
        assert_eq!(usage.value_category, "column");
        assert_eq!(usage.valid_values, vec!["Port".to_string(), "Uri".to_string()]);

        let err = expression("[Port] => 1").unwrap_err();
        assert_eq!(err.as_usage().unwrap().value_category, "operator");

        let err = expression("[Port] = 80 ~").unwrap_err();
        assert!(err.as_usage().unwrap().valid_values.contains(&"AND".to_string()));
    }

    #[test]
    fn test_pipeline_errors_carry_line() {
        let context = context();
        let err = XqlParser::parse("read Sample\nselec [Port]", &context).unwrap_err();
        let usage = err.as_usage().unwrap();
        assert_eq!(usage.value_category, "verb");
        assert_eq!(usage.invalid_token, "selec");
        assert_eq!(usage.line, Some(2));

        let err = XqlParser::parse("read Sample\nlimit 5 6", &context).unwrap_err();
        let usage = err.as_usage().unwrap();
        assert_eq!(usage.invalid_token, "6");
        assert!(usage.usage.as_deref().unwrap().starts_with("limit"));

        let err = XqlParser::parse("\n# nothing\n", &context).unwrap_err();
        assert!(err.as_usage().unwrap().message.is_some());
    }

    #[test]
    fn test_verb_needs_source() {
        let context = context();
        let err = XqlParser::parse("where [Port] = 80", &context).unwrap_err();
        assert_eq!(err.as_usage().unwrap().valid_values, vec!["read".to_string()]);
    }
}
