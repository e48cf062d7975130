// netwatch-filter: Tokenizer
// Operators, case-insensitive keywords, quoted strings, integers

use crate::error::{FilterError, FilterResult};

/// Lexical token
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Match,
    NotMatch,
    And,
    Or,
    Not,
    In,
    Ident(String),
    Str(String),
    Int(i64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Eof,
}

impl Token {
    /// Label used in error messages
    pub fn describe(&self) -> String {
        match self {
            Token::Eq => "'=='".to_string(),
            Token::Ne => "'!='".to_string(),
            Token::Lt => "'<'".to_string(),
            Token::Gt => "'>'".to_string(),
            Token::Le => "'<='".to_string(),
            Token::Ge => "'>='".to_string(),
            Token::Match => "'=~'".to_string(),
            Token::NotMatch => "'!~'".to_string(),
            Token::And => "'AND'".to_string(),
            Token::Or => "'OR'".to_string(),
            Token::Not => "'NOT'".to_string(),
            Token::In => "'IN'".to_string(),
            Token::Ident(name) => format!("identifier '{}'", name),
            Token::Str(_) => "string literal".to_string(),
            Token::Int(n) => format!("number {}", n),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::LBracket => "'['".to_string(),
            Token::RBracket => "']'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Eof => "end of expression".to_string(),
        }
    }
}

/// Token with its source position
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub line: u32,
    pub col: u32,
    pub pos: usize,
}

/// Hand-rolled lexer with line/column tracking
pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
    line: u32,
    col: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    /// Tokenize the whole input, appending a trailing `Eof`
    pub fn tokenize(mut self) -> FilterResult<Vec<SpannedToken>> {
        let mut tokens = Vec::new();
        loop {
            let spanned = self.next_token()?;
            let is_eof = spanned.token == Token::Eof;
            tokens.push(spanned);
            if is_eof {
                return Ok(tokens);
            }
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        if byte == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(byte)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.bump();
        }
    }

    fn error(&self, message: impl Into<String>) -> FilterError {
        FilterError::parse(message, self.line, self.col, self.pos)
    }

    fn next_token(&mut self) -> FilterResult<SpannedToken> {
        self.skip_whitespace();

        let (line, col, pos) = (self.line, self.col, self.pos);
        let spanned = |token| SpannedToken {
            token,
            line,
            col,
            pos,
        };

        let Some(byte) = self.peek() else {
            return Ok(spanned(Token::Eof));
        };

        let token = match byte {
            b'(' => {
                self.bump();
                Token::LParen
            }
            b')' => {
                self.bump();
                Token::RParen
            }
            b'[' => {
                self.bump();
                Token::LBracket
            }
            b']' => {
                self.bump();
                Token::RBracket
            }
            b',' => {
                self.bump();
                Token::Comma
            }
            b'=' => {
                self.bump();
                match self.peek() {
                    Some(b'=') => {
                        self.bump();
                        Token::Eq
                    }
                    Some(b'~') => {
                        self.bump();
                        Token::Match
                    }
                    _ => return Err(self.error("expected '==' or '=~'")),
                }
            }
            b'!' => {
                self.bump();
                match self.peek() {
                    Some(b'=') => {
                        self.bump();
                        Token::Ne
                    }
                    Some(b'~') => {
                        self.bump();
                        Token::NotMatch
                    }
                    _ => return Err(self.error("expected '!=' or '!~'")),
                }
            }
            b'<' => {
                self.bump();
                if self.peek() == Some(b'=') {
                    self.bump();
                    Token::Le
                } else {
                    Token::Lt
                }
            }
            b'>' => {
                self.bump();
                if self.peek() == Some(b'=') {
                    self.bump();
                    Token::Ge
                } else {
                    Token::Gt
                }
            }
            b'"' | b'\'' => self.lex_string()?,
            b'0'..=b'9' => self.lex_number()?,
            b'-' if matches!(self.peek_at(1), Some(b'0'..=b'9')) => self.lex_number()?,
            b if b.is_ascii_alphabetic() || b == b'_' => self.lex_ident(),
            other => {
                return Err(self.error(format!("unexpected character '{}'", other as char)));
            }
        };

        Ok(spanned(token))
    }

    fn lex_string(&mut self) -> FilterResult<Token> {
        let quote = self.bump().unwrap_or(b'"');
        let mut value = String::new();

        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string literal")),
                Some(b'\\') => match self.bump() {
                    None => return Err(self.error("unterminated escape sequence")),
                    Some(b'n') => value.push('\n'),
                    Some(b't') => value.push('\t'),
                    Some(b'r') => value.push('\r'),
                    Some(other) => value.push(other as char),
                },
                Some(b) if b == quote => break,
                Some(b) => value.push(b as char),
            }
        }

        Ok(Token::Str(value))
    }

    fn lex_number(&mut self) -> FilterResult<Token> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.bump();
        }
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.bump();
        }

        let text = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.error("invalid number"))?;
        text.parse::<i64>()
            .map(Token::Int)
            .map_err(|_| self.error(format!("integer out of range: {}", text)))
    }

    fn lex_ident(&mut self) -> Token {
        let start = self.pos;
        while matches!(
            self.peek(),
            Some(b) if b.is_ascii_alphanumeric() || b == b'_' || b == b'.'
        ) {
            self.bump();
        }

        let text = std::str::from_utf8(&self.input[start..self.pos]).unwrap_or("");
        // Keywords are case-insensitive
        match text.to_ascii_uppercase().as_str() {
            "AND" => Token::And,
            "OR" => Token::Or,
            "NOT" => Token::Not,
            "IN" => Token::In,
            _ => Token::Ident(text.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            tokens("== != < > <= >= =~ !~"),
            vec![
                Token::Eq,
                Token::Ne,
                Token::Lt,
                Token::Gt,
                Token::Le,
                Token::Ge,
                Token::Match,
                Token::NotMatch,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_keywords_case_insensitive() {
        assert_eq!(
            tokens("AND and Or nOt in"),
            vec![
                Token::And,
                Token::And,
                Token::Or,
                Token::Not,
                Token::In,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_identifiers_with_dots() {
        assert_eq!(
            tokens("interface nl.link.ifname"),
            vec![
                Token::Ident("interface".to_string()),
                Token::Ident("nl.link.ifname".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_string_quoting_and_escapes() {
        assert_eq!(
            tokens(r#""eth0" 'wlan0' "a\"b" "x\ny""#),
            vec![
                Token::Str("eth0".to_string()),
                Token::Str("wlan0".to_string()),
                Token::Str("a\"b".to_string()),
                Token::Str("x\ny".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            tokens("0 16 -5"),
            vec![Token::Int(0), Token::Int(16), Token::Int(-5), Token::Eof]
        );
    }

    #[test]
    fn test_punctuation() {
        assert_eq!(
            tokens("( ) [ ] ,"),
            vec![
                Token::LParen,
                Token::RParen,
                Token::LBracket,
                Token::RBracket,
                Token::Comma,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_line_and_column_tracking() {
        let spanned = Lexer::new("interface ==\n  \"eth0\"").tokenize().unwrap();
        assert_eq!(spanned[0].line, 1);
        assert_eq!(spanned[0].col, 1);
        assert_eq!(spanned[1].line, 1);
        assert_eq!(spanned[1].col, 11);
        assert_eq!(spanned[2].line, 2);
        assert_eq!(spanned[2].col, 3);
    }

    #[test]
    fn test_unterminated_string_errors() {
        let err = Lexer::new("\"eth0").tokenize().unwrap_err();
        assert!(matches!(err, FilterError::Parse(_)));
    }

    #[test]
    fn test_bare_equals_errors() {
        assert!(Lexer::new("interface = 5").tokenize().is_err());
    }
}
