//! Tokenizer and recursive-descent parser for template expressions.
//!
//! Grammar (lowest to highest precedence):
//!
//! ```text
//! comparison := additive (('<' | '<=' | '>' | '>=' | '==' | '!=') additive)?
//! additive   := term (('+' | '-') term)*
//! term       := unary (('*' | '/' | '%') unary)*
//! unary      := ('-' | '+') unary | power
//! power      := primary (('^' | '**') unary)?
//! primary    := number | name | name '(' args ')' | '(' comparison ')'
//! ```

use std::iter::Peekable;
use std::str::Chars;

use crate::error::EvalError;

/// Expression AST node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal written without a fraction or exponent.
    Integer(i64),
    Number(f64),
    /// Variable or constant name.
    Name(String),
    Unary {
        op: UnaryOperator,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOperator {
    Neg,
    Plus,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Integer(i64),
    Number(f64),
    Identifier(String),
    Op(BinaryOperator),
    Plus,
    Minus,
    LParen,
    RParen,
    Comma,
    Eof,
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    position: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            position: 0,
        }
    }

    fn advance(&mut self) -> Option<char> {
        self.position += 1;
        self.chars.next()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.chars.peek() == Some(&expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn syntax(&self, message: impl Into<String>) -> EvalError {
        EvalError::Syntax {
            message: message.into(),
            position: self.position,
        }
    }

    fn next_token(&mut self) -> Result<Token, EvalError> {
        while self.chars.peek().is_some_and(|c| c.is_whitespace()) {
            self.advance();
        }

        let Some(&c) = self.chars.peek() else {
            return Ok(Token::Eof);
        };

        if c.is_ascii_digit() || c == '.' {
            return self.read_number();
        }
        if c.is_ascii_alphabetic() || c == '_' {
            return Ok(Token::Identifier(self.read_identifier()));
        }

        self.advance();
        let token = match c {
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' if self.eat('*') => Token::Op(BinaryOperator::Pow),
            '*' => Token::Op(BinaryOperator::Mul),
            '/' => Token::Op(BinaryOperator::Div),
            '%' => Token::Op(BinaryOperator::Rem),
            '^' => Token::Op(BinaryOperator::Pow),
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            '<' if self.eat('=') => Token::Op(BinaryOperator::Le),
            '<' => Token::Op(BinaryOperator::Lt),
            '>' if self.eat('=') => Token::Op(BinaryOperator::Ge),
            '>' => Token::Op(BinaryOperator::Gt),
            '=' if self.eat('=') => Token::Op(BinaryOperator::Eq),
            '!' if self.eat('=') => Token::Op(BinaryOperator::Ne),
            other => return Err(self.syntax(format!("unexpected character '{other}'"))),
        };
        Ok(token)
    }

    fn read_number(&mut self) -> Result<Token, EvalError> {
        let start = self.position;
        let mut num = String::new();
        let mut has_dot = false;

        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() {
                num.push(c);
            } else if c == '.' && !has_dot {
                has_dot = true;
                num.push(c);
            } else {
                break;
            }
            self.advance();
        }

        // Scientific notation (1e10, 1.5e-3)
        if matches!(self.chars.peek(), Some('e') | Some('E')) {
            num.push('e');
            self.advance();
            if let Some(&sign) = self.chars.peek() {
                if sign == '+' || sign == '-' {
                    num.push(sign);
                    self.advance();
                }
            }
            while let Some(&c) = self.chars.peek() {
                if !c.is_ascii_digit() {
                    break;
                }
                num.push(c);
                self.advance();
            }
        }

        if !has_dot && !num.contains('e') {
            if let Ok(i) = num.parse::<i64>() {
                return Ok(Token::Integer(i));
            }
        }
        num.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| EvalError::Syntax {
                message: format!("invalid number '{num}'"),
                position: start,
            })
    }

    fn read_identifier(&mut self) -> String {
        let mut name = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                name.push(c);
                self.advance();
            } else {
                break;
            }
        }
        name
    }
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    depth: usize,
    max_depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, max_depth: usize) -> Result<Self, EvalError> {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token()?;
        Ok(Self {
            lexer,
            current,
            depth: 0,
            max_depth,
        })
    }

    fn advance(&mut self) -> Result<(), EvalError> {
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<(), EvalError> {
        if self.current != token {
            return Err(self.lexer.syntax(format!("expected {what}")));
        }
        self.advance()
    }

    fn descend(&mut self) -> Result<(), EvalError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(EvalError::TooComplex(format!(
                "nesting deeper than {}",
                self.max_depth
            )));
        }
        Ok(())
    }

    fn parse(&mut self) -> Result<Expr, EvalError> {
        let expr = self.parse_comparison()?;
        if self.current != Token::Eof {
            return Err(self
                .lexer
                .syntax(format!("unexpected token after expression: {:?}", self.current)));
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> Result<Expr, EvalError> {
        let left = self.parse_additive()?;
        let op = match &self.current {
            Token::Op(
                op @ (BinaryOperator::Lt
                | BinaryOperator::Le
                | BinaryOperator::Gt
                | BinaryOperator::Ge
                | BinaryOperator::Eq
                | BinaryOperator::Ne),
            ) => *op,
            _ => return Ok(left),
        };
        self.advance()?;
        let right = self.parse_additive()?;
        Ok(Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_additive(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match &self.current {
                Token::Plus => BinaryOperator::Add,
                Token::Minus => BinaryOperator::Sub,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_term()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match &self.current {
                Token::Op(op @ (BinaryOperator::Mul | BinaryOperator::Div | BinaryOperator::Rem)) => {
                    *op
                }
                _ => break,
            };
            self.advance()?;
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, EvalError> {
        self.descend()?;
        let op = match &self.current {
            Token::Minus => Some(UnaryOperator::Neg),
            Token::Plus => Some(UnaryOperator::Plus),
            _ => None,
        };
        let expr = match op {
            Some(op) => {
                self.advance()?;
                let operand = self.parse_unary()?;
                Expr::Unary {
                    op,
                    operand: Box::new(operand),
                }
            }
            None => self.parse_power()?,
        };
        self.depth -= 1;
        Ok(expr)
    }

    // Right associative: 2^3^2 == 2^(3^2)
    fn parse_power(&mut self) -> Result<Expr, EvalError> {
        let base = self.parse_primary()?;
        if self.current == Token::Op(BinaryOperator::Pow) {
            self.advance()?;
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary {
                op: BinaryOperator::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, EvalError> {
        match self.current.clone() {
            Token::Integer(i) => {
                self.advance()?;
                Ok(Expr::Integer(i))
            }
            Token::Number(n) => {
                self.advance()?;
                Ok(Expr::Number(n))
            }
            Token::Identifier(name) => {
                self.advance()?;
                if self.current != Token::LParen {
                    return Ok(Expr::Name(name));
                }
                self.advance()?;
                let mut args = Vec::new();
                if self.current != Token::RParen {
                    loop {
                        args.push(self.parse_comparison()?);
                        if self.current == Token::Comma {
                            self.advance()?;
                        } else {
                            break;
                        }
                    }
                }
                self.expect(Token::RParen, "')' after function arguments")?;
                Ok(Expr::Call { name, args })
            }
            Token::LParen => {
                self.advance()?;
                let expr = self.parse_comparison()?;
                self.expect(Token::RParen, "')'")?;
                Ok(expr)
            }
            other => Err(self.lexer.syntax(format!("unexpected token: {other:?}"))),
        }
    }
}

/// Parse an expression string into an AST, refusing input longer than
/// `max_len` characters or nested deeper than `max_depth`.
pub fn parse_expression(input: &str, max_len: usize, max_depth: usize) -> Result<Expr, EvalError> {
    if input.trim().is_empty() {
        return Err(EvalError::Syntax {
            message: "empty expression".into(),
            position: 0,
        });
    }
    if input.chars().count() > max_len {
        return Err(EvalError::TooComplex(format!(
            "longer than {max_len} characters"
        )));
    }
    Parser::new(input, max_depth)?.parse()
}
