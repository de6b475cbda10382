//! Tokenizer for XPath expressions

use super::XPathError;

/// A lexical token
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Slash,
    DoubleSlash,
    LBracket,
    RBracket,
    LParen,
    RParen,
    At,
    Comma,
    Dot,
    DotDot,
    ColonColon,
    Pipe,
    Plus,
    Minus,
    /// `*` used as a name test
    Star,
    /// `*` used as the multiplication operator
    Multiply,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Div,
    Mod,
    Literal(String),
    Number(f64),
    /// A name, possibly prefixed (`h:Building`, `h:*`)
    Name(String),
}

impl TokenKind {
    /// Whether a `*` or operator name following this token is an operator
    fn precedes_operator(&self) -> bool {
        !matches!(
            self,
            TokenKind::At
                | TokenKind::ColonColon
                | TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::Comma
                | TokenKind::Slash
                | TokenKind::DoubleSlash
                | TokenKind::Pipe
                | TokenKind::Plus
                | TokenKind::Minus
                | TokenKind::Multiply
                | TokenKind::Eq
                | TokenKind::NotEq
                | TokenKind::Lt
                | TokenKind::Le
                | TokenKind::Gt
                | TokenKind::Ge
                | TokenKind::And
                | TokenKind::Or
                | TokenKind::Div
                | TokenKind::Mod
        )
    }
}

/// A token with its byte offset in the expression
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

/// Lexer for XPath source text
pub struct Lexer<'src> {
    source: &'src str,
    position: usize,
    tokens: Vec<Token>,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            position: 0,
            tokens: Vec::new(),
        }
    }

    /// Tokenize the whole expression
    pub fn tokenize(source: &str) -> Result<Vec<Token>, XPathError> {
        let mut lexer = Lexer::new(source);
        while let Some((kind, offset)) = lexer.next_kind()? {
            lexer.tokens.push(Token { kind, offset });
        }
        Ok(lexer.tokens)
    }

    fn rest(&self) -> &'src str {
        &self.source[self.position..]
    }

    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.position += c.len_utf8();
        Some(c)
    }

    fn error(&self, offset: usize, message: impl Into<String>) -> XPathError {
        XPathError::Syntax {
            expr: self.source.to_string(),
            position: offset,
            message: message.into(),
        }
    }

    fn operator_context(&self) -> bool {
        self.tokens
            .last()
            .is_some_and(|t| t.kind.precedes_operator())
    }

    fn next_kind(&mut self) -> Result<Option<(TokenKind, usize)>, XPathError> {
        while self.peek_char().is_some_and(char::is_whitespace) {
            self.advance();
        }

        let start = self.position;
        let Some(c) = self.peek_char() else {
            return Ok(None);
        };

        let kind = match c {
            '/' => {
                self.advance();
                if self.peek_char() == Some('/') {
                    self.advance();
                    TokenKind::DoubleSlash
                } else {
                    TokenKind::Slash
                }
            }
            '[' => {
                self.advance();
                TokenKind::LBracket
            }
            ']' => {
                self.advance();
                TokenKind::RBracket
            }
            '(' => {
                self.advance();
                TokenKind::LParen
            }
            ')' => {
                self.advance();
                TokenKind::RParen
            }
            '@' => {
                self.advance();
                TokenKind::At
            }
            ',' => {
                self.advance();
                TokenKind::Comma
            }
            '|' => {
                self.advance();
                TokenKind::Pipe
            }
            '+' => {
                self.advance();
                TokenKind::Plus
            }
            '-' => {
                self.advance();
                TokenKind::Minus
            }
            '=' => {
                self.advance();
                TokenKind::Eq
            }
            '!' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    TokenKind::NotEq
                } else {
                    return Err(self.error(start, "expected '=' after '!'"));
                }
            }
            '<' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    TokenKind::Le
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            ':' => {
                self.advance();
                if self.peek_char() == Some(':') {
                    self.advance();
                    TokenKind::ColonColon
                } else {
                    return Err(self.error(start, "unexpected ':'"));
                }
            }
            '*' => {
                self.advance();
                if self.operator_context() {
                    TokenKind::Multiply
                } else {
                    TokenKind::Star
                }
            }
            '.' => {
                if self.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
                    self.scan_number()
                } else {
                    self.advance();
                    if self.peek_char() == Some('.') {
                        self.advance();
                        TokenKind::DotDot
                    } else {
                        TokenKind::Dot
                    }
                }
            }
            '"' | '\'' => self.scan_literal(c)?,
            '$' => return Err(self.error(start, "variable references are not supported")),
            c if c.is_ascii_digit() => self.scan_number(),
            c if is_name_start(c) => self.scan_name(),
            c => return Err(self.error(start, format!("unexpected character '{c}'"))),
        };

        Ok(Some((kind, start)))
    }

    fn scan_literal(&mut self, quote: char) -> Result<TokenKind, XPathError> {
        let start = self.position;
        self.advance();
        let body_start = self.position;
        while let Some(c) = self.peek_char() {
            if c == quote {
                let body = self.source[body_start..self.position].to_string();
                self.advance();
                return Ok(TokenKind::Literal(body));
            }
            self.advance();
        }
        Err(self.error(start, "unterminated string literal"))
    }

    fn scan_number(&mut self) -> TokenKind {
        let start = self.position;
        while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek_char() == Some('.') {
            self.advance();
            while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        let text = &self.source[start..self.position];
        // Digits with one optional '.' always parse
        TokenKind::Number(text.parse().unwrap_or(f64::NAN))
    }

    fn scan_ncname(&mut self) {
        while self.peek_char().is_some_and(is_name_char) {
            self.advance();
        }
    }

    fn scan_name(&mut self) -> TokenKind {
        let start = self.position;
        self.scan_ncname();

        // QName: prefix ':' (NCName | '*'), but never the '::' axis separator
        if self.peek_char() == Some(':') {
            match self.peek_nth(1) {
                Some('*') => {
                    self.advance();
                    self.advance();
                }
                Some(c) if is_name_start(c) => {
                    self.advance();
                    self.scan_ncname();
                }
                _ => {}
            }
        }

        let name = &self.source[start..self.position];
        if self.operator_context() {
            match name {
                "and" => return TokenKind::And,
                "or" => return TokenKind::Or,
                "div" => return TokenKind::Div,
                "mod" => return TokenKind::Mod,
                _ => {}
            }
        }
        TokenKind::Name(name.to_string())
    }
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}
