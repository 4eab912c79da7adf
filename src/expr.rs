//! Safe arithmetic evaluator for the text left over once a formula's cell
//! references have been substituted. Supports `+ - * /`, unary sign,
//! parentheses and decimal literals with ordinary precedence. Division
//! follows f64 semantics, so a zero divisor yields an infinite result
//! rather than an error here.

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ExprError {
    #[error("unexpected character '{0}' in expression")]
    UnexpectedChar(char),
    #[error("malformed number '{0}'")]
    BadNumber(String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected trailing input")]
    TrailingInput,
    #[error("expected closing parenthesis")]
    UnbalancedParen,
}

#[derive(Clone, Copy, PartialEq, Debug)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '0'..='9' | '.' => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let text = &input[start..end];
                let n: f64 = text
                    .parse()
                    .map_err(|_| ExprError::BadNumber(text.to_string()))?;
                tokens.push(Token::Number(n));
            }
            other => return Err(ExprError::UnexpectedChar(other)),
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.peek();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<f64, ExprError> {
        let mut acc = self.term()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Plus => {
                    self.bump();
                    acc += self.term()?;
                }
                Token::Minus => {
                    self.bump();
                    acc -= self.term()?;
                }
                _ => break,
            }
        }
        Ok(acc)
    }

    // term := factor (('*' | '/') factor)*
    fn term(&mut self) -> Result<f64, ExprError> {
        let mut acc = self.factor()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Star => {
                    self.bump();
                    acc *= self.factor()?;
                }
                Token::Slash => {
                    self.bump();
                    acc /= self.factor()?;
                }
                _ => break,
            }
        }
        Ok(acc)
    }

    // factor := ('+' | '-') factor | number | '(' expr ')'
    fn factor(&mut self) -> Result<f64, ExprError> {
        match self.bump().ok_or(ExprError::UnexpectedEnd)? {
            Token::Plus => self.factor(),
            Token::Minus => Ok(-self.factor()?),
            Token::Number(n) => Ok(n),
            Token::LParen => {
                let inner = self.expr()?;
                match self.bump() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(ExprError::UnbalancedParen),
                }
            }
            Token::RParen | Token::Star | Token::Slash => Err(ExprError::TrailingInput),
        }
    }
}

/// Evaluate a plain numeric expression.
pub fn eval(input: &str) -> Result<f64, ExprError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
    };
    let value = parser.expr()?;
    if parser.pos != tokens.len() {
        return Err(ExprError::TrailingInput);
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_and_basic_ops() {
        assert_eq!(eval("2+3").unwrap(), 5.0);
        assert_eq!(eval("10-4-3").unwrap(), 3.0);
        assert_eq!(eval("6*7").unwrap(), 42.0);
        assert_eq!(eval("9/2").unwrap(), 4.5);
    }

    #[test]
    fn precedence_and_parens() {
        assert_eq!(eval("2+3*4").unwrap(), 14.0);
        assert_eq!(eval("(2+3)*4").unwrap(), 20.0);
        assert_eq!(eval("2*(3+(4-1))").unwrap(), 12.0);
    }

    #[test]
    fn unary_sign() {
        assert_eq!(eval("-5").unwrap(), -5.0);
        assert_eq!(eval("-5+8").unwrap(), 3.0);
        assert_eq!(eval("2*-3").unwrap(), -6.0);
        assert_eq!(eval("+4").unwrap(), 4.0);
        assert_eq!(eval("--4").unwrap(), 4.0);
    }

    #[test]
    fn decimals() {
        assert_eq!(eval("1.5+2.25").unwrap(), 3.75);
        assert_eq!(eval(".5*4").unwrap(), 2.0);
    }

    #[test]
    fn whitespace_is_ignored() {
        assert_eq!(eval(" 1 +\t2 ").unwrap(), 3.0);
    }

    #[test]
    fn division_by_zero_is_not_an_error_here() {
        assert!(eval("1/0").unwrap().is_infinite());
        assert!(eval("0/0").unwrap().is_nan());
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(eval("").is_err());
        assert!(eval("2+").is_err());
        assert!(eval("(1+2").is_err());
        assert!(eval("1+2)").is_err());
        assert!(eval("1 2").is_err());
        assert!(eval("NaN").is_err());
        assert!(eval("abc").is_err());
        assert!(eval("1..2").is_err());
        assert!(eval("*3").is_err());
    }
}
