//! Tokenizer for the pipeline query language
//!
//! - `[Column Name]`: column reference, `]]` escapes `]`
//! - `"text"`: quoted value, `""` escapes `"`
//! - `Name(`: function name (the paren is its own token)
//! - `(` `)`: grouping
//! - `~`: completion marker; asks the parser what could go here
//! - `#`: comment to end of line
//! - newline: verb separator
//! - anything else up to whitespace or a delimiter is a bare value
//!
//! Spaces, tabs and commas separate tokens.

/// Kind of token
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    /// `[Name]`
    ColumnName,
    /// Bare or quoted value, keyword or operator
    Value,
    /// Identifier directly followed by `(`
    FunctionName,
    /// `(`
    OpenParen,
    /// `)`
    CloseParen,
    /// Line break between verbs
    Newline,
    /// `~` completion marker
    NextTokenHint,
    /// End of input
    End,
}

/// One scanned token
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    /// Kind of token
    pub kind: TokenKind,
    /// Unescaped text
    pub value: String,
    /// Whether the value came from a quoted or bracketed form
    pub quoted: bool,
    /// 1-based line number
    pub line: usize,
}

impl Token {
    fn new(kind: TokenKind, value: impl Into<String>, line: usize) -> Self {
        Self {
            kind,
            value: value.into(),
            quoted: false,
            line,
        }
    }

    /// Whether this is an unquoted value equal to `word`, ignoring case
    pub fn is_word(&self, word: &str) -> bool {
        self.kind == TokenKind::Value && !self.quoted && self.value.eq_ignore_ascii_case(word)
    }

    /// Whether this token ends the current verb
    pub fn ends_line(&self) -> bool {
        matches!(self.kind, TokenKind::Newline | TokenKind::End)
    }
}

const KEYWORDS_BEFORE_PAREN: [&str; 3] = ["and", "or", "not"];

/// Token cursor over a whole query
#[derive(Clone, Debug)]
pub struct Scanner {
    tokens: Vec<Token>,
    lines: Vec<String>,
    position: usize,
}

impl Scanner {
    /// Tokenize `text` up front
    pub fn new(text: &str) -> Self {
        Self {
            tokens: tokenize(text),
            lines: text.lines().map(str::to_string).collect(),
            position: 0,
        }
    }

    /// Current token
    pub fn current(&self) -> &Token {
        // tokenize always ends with End
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    /// Token after the current one
    pub fn peek(&self) -> &Token {
        &self.tokens[(self.position + 1).min(self.tokens.len() - 1)]
    }

    /// Move past the current token
    pub fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
        token
    }

    /// Skip blank lines
    pub fn skip_newlines(&mut self) {
        while self.current().kind == TokenKind::Newline {
            self.advance();
        }
    }

    /// Source text of a 1-based line
    pub fn line_text(&self, line: usize) -> &str {
        self.lines
            .get(line.saturating_sub(1))
            .map(String::as_str)
            .unwrap_or("")
    }
}

fn tokenize(text: &str) -> Vec<Token> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\n' => {
                tokens.push(Token::new(TokenKind::Newline, "\n", line));
                line += 1;
                i += 1;
            }
            ' ' | '\t' | '\r' | ',' => i += 1,
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '(' => {
                tokens.push(Token::new(TokenKind::OpenParen, "(", line));
                i += 1;
            }
            ')' => {
                tokens.push(Token::new(TokenKind::CloseParen, ")", line));
                i += 1;
            }
            '~' => {
                tokens.push(Token::new(TokenKind::NextTokenHint, "~", line));
                i += 1;
            }
            '[' => {
                let (value, next) = read_escaped(&chars, i + 1, ']');
                let mut token = Token::new(TokenKind::ColumnName, value, line);
                token.quoted = true;
                tokens.push(token);
                i = next;
            }
            '"' => {
                let (value, next) = read_escaped(&chars, i + 1, '"');
                let mut token = Token::new(TokenKind::Value, value, line);
                token.quoted = true;
                tokens.push(token);
                i = next;
            }
            _ => {
                let start = i;
                while i < chars.len() && !is_delimiter(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let is_function = i < chars.len()
                    && chars[i] == '('
                    && !KEYWORDS_BEFORE_PAREN
                        .iter()
                        .any(|k| word.eq_ignore_ascii_case(k));
                let kind = if is_function {
                    TokenKind::FunctionName
                } else {
                    TokenKind::Value
                };
                tokens.push(Token::new(kind, word, line));
            }
        }
    }

    tokens.push(Token::new(TokenKind::End, "", line));
    tokens
}

fn is_delimiter(c: char) -> bool {
    matches!(
        c,
        ' ' | '\t' | '\r' | '\n' | ',' | '(' | ')' | '[' | '"' | '#' | '~'
    )
}

/// Read up to an unescaped `close`; a doubled `close` is a literal one.
/// Unterminated values run to end of line.
fn read_escaped(chars: &[char], mut i: usize, close: char) -> (String, usize) {
    let mut value = String::new();
    while i < chars.len() {
        let c = chars[i];
        if c == close {
            if chars.get(i + 1) == Some(&close) {
                value.push(close);
                i += 2;
                continue;
            }
            return (value, i + 1);
        }
        if c == '\n' {
            return (value, i);
        }
        value.push(c);
        i += 1;
    }
    (value, i)
}
