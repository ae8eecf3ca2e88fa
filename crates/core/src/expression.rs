//! Boolean permission expressions
//!
//! ```text
//! expr    := or
//! or      := and ("||" and)*
//! and     := unary ("&&" unary)*
//! unary   := "!" unary | "(" expr ")" | "true" | "false" | literal
//! ```
//!
//! Parsing and evaluation happen in one shunting-yard pass. Literals are
//! handed to the caller's tester as written; they end at whitespace,
//! parentheses, `&` or `|`.

/// Parse error with the byte offset it was found at
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpressionError {
    #[error("Expression is empty")]
    Empty,

    /// A lone `&` or `|`
    #[error("Unexpected character '{ch}' at {pos}")]
    UnexpectedCharacter { ch: char, pos: usize },

    /// A token where an operator was expected, e.g. two adjacent literals
    #[error("Unexpected '{token}' at {pos}")]
    UnexpectedToken { token: String, pos: usize },

    #[error("Missing operand at {pos}")]
    MissingOperand { pos: usize },

    #[error("Unbalanced parenthesis at {pos}")]
    UnbalancedParenthesis { pos: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Not,
    And,
    Or,
    Open,
    Close,
    Constant(bool),
    Literal(&'a str),
}

impl Token<'_> {
    fn text(&self) -> String {
        match self {
            Token::Not => "!".to_string(),
            Token::And => "&&".to_string(),
            Token::Or => "||".to_string(),
            Token::Open => "(".to_string(),
            Token::Close => ")".to_string(),
            Token::Constant(value) => value.to_string(),
            Token::Literal(literal) => literal.to_string(),
        }
    }
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<(usize, Token<'a>), ExpressionError>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.input[self.pos..];
        let trimmed = rest.trim_start();
        self.pos += rest.len() - trimmed.len();

        let start = self.pos;
        let token = match trimmed.chars().next()? {
            '!' => Token::Not,
            '(' => Token::Open,
            ')' => Token::Close,
            ch @ ('&' | '|') => {
                if !trimmed[1..].starts_with(ch) {
                    // Stop lexing after an error
                    self.pos = self.input.len();
                    return Some(Err(ExpressionError::UnexpectedCharacter { ch, pos: start }));
                }
                self.pos += 2;
                let token = if ch == '&' { Token::And } else { Token::Or };
                return Some(Ok((start, token)));
            }
            _ => {
                let len = trimmed
                    .find(|ch: char| ch.is_whitespace() || matches!(ch, '(' | ')' | '&' | '|'))
                    .unwrap_or(trimmed.len());
                let word = &trimmed[..len];
                self.pos += len;
                let token = if word.eq_ignore_ascii_case("true") {
                    Token::Constant(true)
                } else if word.eq_ignore_ascii_case("false") {
                    Token::Constant(false)
                } else {
                    Token::Literal(word)
                };
                return Some(Ok((start, token)));
            }
        };

        self.pos += 1;
        Some(Ok((start, token)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Not,
    And,
    Or,
    Open,
}

impl Op {
    fn precedence(self) -> u8 {
        match self {
            Op::Not => 3,
            Op::And => 2,
            Op::Or => 1,
            Op::Open => 0,
        }
    }
}

fn apply(op: Op, pos: usize, values: &mut Vec<bool>) -> Result<(), ExpressionError> {
    let missing = ExpressionError::MissingOperand { pos };
    let result = match op {
        Op::Not => !values.pop().ok_or(missing)?,
        Op::And | Op::Or => {
            let rhs = values.pop().ok_or_else(|| missing.clone())?;
            let lhs = values.pop().ok_or(missing)?;
            if op == Op::And {
                lhs && rhs
            } else {
                lhs || rhs
            }
        }
        Op::Open => return Err(ExpressionError::UnbalancedParenthesis { pos }),
    };
    values.push(result);
    Ok(())
}

/// Evaluate an expression, asking `tester` for every literal
///
/// Every literal is tested exactly once, in order of appearance, until
/// parsing fails.
pub fn evaluate<F>(expr: &str, mut tester: F) -> Result<bool, ExpressionError>
where
    F: FnMut(&str) -> bool,
{
    if expr.trim().is_empty() {
        return Err(ExpressionError::Empty);
    }

    let mut ops: Vec<(Op, usize)> = Vec::new();
    let mut values: Vec<bool> = Vec::new();
    let mut expect_operand = true;

    for next in (Lexer { input: expr, pos: 0 }) {
        let (pos, token) = next?;
        match token {
            Token::Constant(_) | Token::Literal(_) | Token::Not | Token::Open if !expect_operand => {
                return Err(ExpressionError::UnexpectedToken {
                    token: token.text(),
                    pos,
                });
            }
            Token::Constant(value) => {
                values.push(value);
                expect_operand = false;
            }
            Token::Literal(literal) => {
                values.push(tester(literal));
                expect_operand = false;
            }
            Token::Not => ops.push((Op::Not, pos)),
            Token::Open => ops.push((Op::Open, pos)),
            Token::Close | Token::And | Token::Or if expect_operand => {
                return Err(ExpressionError::MissingOperand { pos });
            }
            Token::Close => loop {
                match ops.pop() {
                    Some((Op::Open, _)) => break,
                    Some((op, at)) => apply(op, at, &mut values)?,
                    None => return Err(ExpressionError::UnbalancedParenthesis { pos }),
                }
            },
            Token::And | Token::Or => {
                let op = if token == Token::And { Op::And } else { Op::Or };
                while let Some(&(top, at)) = ops.last() {
                    if top == Op::Open || top.precedence() < op.precedence() {
                        break;
                    }
                    ops.pop();
                    apply(top, at, &mut values)?;
                }
                ops.push((op, pos));
                expect_operand = true;
            }
        }
    }

    if expect_operand {
        return Err(ExpressionError::MissingOperand { pos: expr.len() });
    }
    while let Some((op, at)) = ops.pop() {
        apply(op, at, &mut values)?;
    }

    match (values.pop(), values.is_empty()) {
        (Some(result), true) => Ok(result),
        _ => Err(ExpressionError::MissingOperand { pos: expr.len() }),
    }
}

/// Check an expression's syntax without testing any literal
pub fn validate(expr: &str) -> Result<(), ExpressionError> {
    evaluate(expr, |_| false).map(|_| ())
}
