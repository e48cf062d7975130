// netwatch-filter: Recursive-descent parser
//
// Grammar (precedence low → high):
//   expr    := or
//   or      := and ( "OR" and )*
//   and     := not ( "AND" not )*
//   not     := "NOT" not | cmp
//   cmp     := primary ( binop primary )? | primary "IN" list
//   primary := FIELD | STRING | NUMBER | "(" expr ")" | "[" list "]"
//   list    := primary ( "," primary )*

use crate::ast::{CmpOp, Expr, FieldId};
use crate::error::{FilterError, FilterResult, ParseErrorInfo};
use crate::token::{Lexer, SpannedToken, Token};
use tracing::warn;

/// Parse outcome: the original expression, its AST when valid, and the
/// error when not
#[derive(Debug, Clone)]
pub struct ParsedFilter {
    pub expression: String,
    pub ast: Option<Expr>,
    pub valid: bool,
    pub error: Option<ParseErrorInfo>,
}

/// Parse an expression, packaging success and failure uniformly
pub fn parse(expression: &str) -> ParsedFilter {
    match parse_expr(expression) {
        Ok(ast) => ParsedFilter {
            expression: expression.to_string(),
            ast: Some(ast),
            valid: true,
            error: None,
        },
        Err(FilterError::Parse(info)) => ParsedFilter {
            expression: expression.to_string(),
            ast: None,
            valid: false,
            error: Some(info),
        },
        Err(FilterError::Compile(message)) => ParsedFilter {
            expression: expression.to_string(),
            ast: None,
            valid: false,
            error: Some(ParseErrorInfo {
                message,
                line: 0,
                col: 0,
                pos: 0,
            }),
        },
    }
}

/// Parse an expression into its AST
pub fn parse_expr(expression: &str) -> FilterResult<Expr> {
    let tokens = Lexer::new(expression).tokenize()?;
    let mut parser = Parser { tokens, index: 0 };
    let expr = parser.parse_or()?;
    parser.expect_eof()?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<SpannedToken>,
    index: usize,
}

impl Parser {
    fn current(&self) -> &SpannedToken {
        // The token stream always ends with Eof
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> SpannedToken {
        let token = self.current().clone();
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        token
    }

    fn error_here(&self, message: impl Into<String>) -> FilterError {
        let spanned = self.current();
        FilterError::parse(message, spanned.line, spanned.col, spanned.pos)
    }

    fn expect(&mut self, expected: Token) -> FilterResult<()> {
        if self.current().token == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error_here(format!(
                "expected {}, found {}",
                expected.describe(),
                self.current().token.describe()
            )))
        }
    }

    fn expect_eof(&self) -> FilterResult<()> {
        if self.current().token == Token::Eof {
            Ok(())
        } else {
            Err(self.error_here(format!(
                "unexpected {} after expression",
                self.current().token.describe()
            )))
        }
    }

    fn parse_or(&mut self) -> FilterResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.current().token == Token::Or {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> FilterResult<Expr> {
        let mut lhs = self.parse_not()?;
        while self.current().token == Token::And {
            self.advance();
            let rhs = self.parse_not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> FilterResult<Expr> {
        if self.current().token == Token::Not {
            self.advance();
            let inner = self.parse_not()?;
            Ok(Expr::Not(Box::new(inner)))
        } else {
            self.parse_cmp()
        }
    }

    fn parse_cmp(&mut self) -> FilterResult<Expr> {
        let lhs = self.parse_primary()?;

        let op = match self.current().token {
            Token::Eq => Some(CmpOp::Eq),
            Token::Ne => Some(CmpOp::Ne),
            Token::Lt => Some(CmpOp::Lt),
            Token::Gt => Some(CmpOp::Gt),
            Token::Le => Some(CmpOp::Le),
            Token::Ge => Some(CmpOp::Ge),
            Token::Match => Some(CmpOp::Match),
            Token::NotMatch => Some(CmpOp::NotMatch),
            Token::In => None,
            _ => return Ok(lhs),
        };

        match op {
            Some(op) => {
                self.advance();
                let rhs = self.parse_primary()?;
                Ok(Expr::Cmp {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                })
            }
            None => {
                // IN: the right-hand side must be a bracketed list
                self.advance();
                let list = self.parse_list()?;
                Ok(Expr::In {
                    lhs: Box::new(lhs),
                    list,
                })
            }
        }
    }

    fn parse_primary(&mut self) -> FilterResult<Expr> {
        let spanned = self.current().clone();
        match spanned.token {
            Token::Ident(ref name) => {
                self.advance();
                let field = FieldId::from_name(name).unwrap_or_else(|| {
                    // Unknown names degrade to a field that never matches
                    warn!(field = %name, "unknown filter field; treating as missing");
                    FieldId::Unknown
                });
                Ok(Expr::Field(field))
            }
            Token::Str(ref value) => {
                self.advance();
                Ok(Expr::Str(value.clone()))
            }
            Token::Int(value) => {
                self.advance();
                Ok(Expr::Int(value))
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            _ => Err(self.error_here(format!(
                "expected field, literal or '(', found {}",
                spanned.token.describe()
            ))),
        }
    }

    fn parse_list(&mut self) -> FilterResult<Vec<Expr>> {
        self.expect(Token::LBracket)?;
        let mut items = vec![self.parse_primary()?];
        while self.current().token == Token::Comma {
            self.advance();
            items.push(self.parse_primary()?);
        }
        self.expect(Token::RBracket)?;
        Ok(items)
    }
}
