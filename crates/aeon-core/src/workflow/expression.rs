//! Boolean condition evaluator for step `conditions`.
//!
//! Conditions are a small expression language over the execution context:
//! literals, dotted identifiers, comparisons, membership (`in`), arithmetic,
//! and boolean connectives. There are no function calls and no host access,
//! so an expression can only read the context it is given.
//!
//! `evaluate` fails closed: any tokenize, parse, lookup, or type error yields
//! `false`, as does an expression longer than 1024 tokens or nested more than
//! 64 levels deep. Use `try_evaluate` to see the underlying error.
//!
//! Grammar:
//!
//! ```text
//! expr       := or
//! or         := and ( ("or" | "||") and )*
//! and        := not ( ("and" | "&&") not )*
//! not        := ("not" | "!") not | comparison
//! comparison := additive ( ("==" | "!=" | "<" | "<=" | ">" | ">=" | "in") additive )?
//! additive   := term ( ("+" | "-") term )*
//! term       := unary ( ("*" | "/" | "%") unary )*
//! unary      := "-" unary | primary
//! primary    := number | string | "true" | "false" | "null" | identifier | "(" expr ")"
//! identifier := name ( "." name )*
//! ```

use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::Value;

use super::context::substitute_str;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while evaluating a condition.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExpressionError {
    #[error("unexpected character '{found}' at position {position}")]
    Tokenize { position: usize, found: char },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("expression did not evaluate to a boolean: got {0}")]
    NotBoolean(String),
}

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Evaluate a condition against the context, returning `false` on any error.
pub fn evaluate(expression: &str, context: &HashMap<String, Value>) -> bool {
    match try_evaluate(expression, context) {
        Ok(result) => result,
        Err(e) => {
            tracing::debug!(expression, error = %e, "condition evaluation failed, treating as false");
            false
        }
    }
}

/// Substitute `{key}` placeholders, then parse and evaluate the expression.
pub fn try_evaluate(
    expression: &str,
    context: &HashMap<String, Value>,
) -> Result<bool, ExpressionError> {
    let source = substitute_str(expression, context);
    let expr = Expression::parse(&source)?;
    match expr.eval(context)? {
        Operand::Bool(b) => Ok(b),
        other => Err(ExpressionError::NotBoolean(other.describe())),
    }
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    And,
    Or,
    Not,
    In,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    Dot,
}

fn tokenize(source: &str) -> Result<Vec<Token>, ExpressionError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            if i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit() {
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let text: String = chars[start..i].iter().collect();
            let n = text
                .parse::<f64>()
                .map_err(|_| ExpressionError::Parse(format!("invalid number '{text}'")))?;
            tokens.push(Token::Number(n));
            continue;
        }

        if c == '\'' || c == '"' {
            let quote = c;
            let start = i;
            i += 1;
            let mut s = String::new();
            loop {
                match chars.get(i) {
                    None => {
                        return Err(ExpressionError::Parse(format!(
                            "unterminated string starting at position {start}"
                        )));
                    }
                    Some(&ch) if ch == quote => {
                        i += 1;
                        break;
                    }
                    Some('\\') => {
                        let escaped = chars.get(i + 1).copied().ok_or_else(|| {
                            ExpressionError::Parse("dangling escape at end of input".to_string())
                        })?;
                        s.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            other => other,
                        });
                        i += 2;
                    }
                    Some(&ch) => {
                        s.push(ch);
                        i += 1;
                    }
                }
            }
            tokens.push(Token::Str(s));
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            tokens.push(match word.as_str() {
                "true" | "True" => Token::True,
                "false" | "False" => Token::False,
                "null" | "None" => Token::Null,
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                "in" => Token::In,
                _ => Token::Ident(word),
            });
            continue;
        }

        let (token, width) = match (c, next) {
            ('=', Some('=')) => (Token::Eq, 2),
            ('!', Some('=')) => (Token::Ne, 2),
            ('<', Some('=')) => (Token::Le, 2),
            ('>', Some('=')) => (Token::Ge, 2),
            ('&', Some('&')) => (Token::And, 2),
            ('|', Some('|')) => (Token::Or, 2),
            ('<', _) => (Token::Lt, 1),
            ('>', _) => (Token::Gt, 1),
            ('!', _) => (Token::Not, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('.', _) => (Token::Dot, 1),
            _ => return Err(ExpressionError::Tokenize { position: i, found: c }),
        };
        tokens.push(token);
        i += width;
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// AST and parser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Operand),
    Path(Vec<String>),
    Negate(Box<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

/// A parsed condition, ready to be evaluated against any context.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    root: Expr,
}

/// Deepest nesting of parentheses, `not`, and unary minus.
const MAX_NESTING: usize = 64;

/// Longest accepted token stream. Bounds the depth of operator chains.
const MAX_TOKENS: usize = 1024;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn descend(&mut self) -> Result<(), ExpressionError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(ExpressionError::Parse(
                "expression nested too deeply".to_string(),
            ));
        }
        Ok(())
    }

    fn or(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.and()?;
        while self.eat(&Token::Or) {
            let right = self.and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.not()?;
        while self.eat(&Token::And) {
            let right = self.not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat(&Token::Not) {
            self.descend()?;
            let inner = self.not()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ExpressionError> {
        let left = self.additive()?;
        let op = match self.peek() {
            Some(Token::Eq) => BinaryOp::Eq,
            Some(Token::Ne) => BinaryOp::Ne,
            Some(Token::Lt) => BinaryOp::Lt,
            Some(Token::Le) => BinaryOp::Le,
            Some(Token::Gt) => BinaryOp::Gt,
            Some(Token::Ge) => BinaryOp::Ge,
            Some(Token::In) => BinaryOp::In,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.additive()?;
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn additive(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn term(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat(&Token::Minus) {
            self.descend()?;
            let inner = self.unary()?;
            self.depth -= 1;
            return Ok(Expr::Negate(Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ExpressionError> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Literal(Operand::Number(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Operand::Text(s))),
            Some(Token::True) => Ok(Expr::Literal(Operand::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Operand::Bool(false))),
            Some(Token::Null) => Ok(Expr::Literal(Operand::Null)),
            Some(Token::Ident(name)) => {
                let mut path = vec![name];
                while self.eat(&Token::Dot) {
                    match self.advance() {
                        Some(Token::Ident(segment)) => path.push(segment),
                        other => {
                            return Err(ExpressionError::Parse(format!(
                                "expected name after '.', found {}",
                                describe_token(other.as_ref())
                            )));
                        }
                    }
                }
                Ok(Expr::Path(path))
            }
            Some(Token::LParen) => {
                self.descend()?;
                let inner = self.or()?;
                self.depth -= 1;
                if !self.eat(&Token::RParen) {
                    return Err(ExpressionError::Parse(format!(
                        "expected ')', found {}",
                        describe_token(self.peek())
                    )));
                }
                Ok(inner)
            }
            other => Err(ExpressionError::Parse(format!(
                "expected a value, found {}",
                describe_token(other.as_ref())
            ))),
        }
    }
}

fn describe_token(token: Option<&Token>) -> String {
    match token {
        None => "end of input".to_string(),
        Some(t) => format!("{t:?}"),
    }
}

impl Expression {
    /// Parse an expression. Placeholders must already be substituted.
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(ExpressionError::Parse("empty expression".to_string()));
        }
        if tokens.len() > MAX_TOKENS {
            return Err(ExpressionError::Parse(format!(
                "expression too long: {} tokens (max {MAX_TOKENS})",
                tokens.len()
            )));
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let root = parser.or()?;
        if parser.pos < parser.tokens.len() {
            return Err(ExpressionError::Parse(format!(
                "unexpected trailing {}",
                describe_token(parser.peek())
            )));
        }
        Ok(Self { root })
    }

    fn eval(&self, context: &HashMap<String, Value>) -> Result<Operand, ExpressionError> {
        eval_expr(&self.root, context)
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Runtime value of a sub-expression.
#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    /// Arrays and objects read from the context.
    Json(Value),
}

impl Operand {
    fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Operand::Null,
            Value::Bool(b) => Operand::Bool(*b),
            Value::Number(n) => n.as_f64().map_or(Operand::Null, Operand::Number),
            Value::String(s) => Operand::Text(s.clone()),
            other => Operand::Json(other.clone()),
        }
    }

    fn describe(&self) -> String {
        match self {
            Operand::Null => "null".to_string(),
            Operand::Bool(b) => b.to_string(),
            Operand::Number(n) => n.to_string(),
            Operand::Text(s) => format!("'{s}'"),
            Operand::Json(v) => v.to_string(),
        }
    }

    fn expect_bool(self, op: &str) -> Result<bool, ExpressionError> {
        match self {
            Operand::Bool(b) => Ok(b),
            other => Err(ExpressionError::Type(format!(
                "'{op}' needs boolean operands, got {}",
                other.describe()
            ))),
        }
    }
}

fn lookup(path: &[String], context: &HashMap<String, Value>) -> Result<Operand, ExpressionError> {
    let unknown = || ExpressionError::UnknownIdentifier(path.join("."));
    let (head, rest) = path.split_first().ok_or_else(unknown)?;
    let mut current = context.get(head).ok_or_else(unknown)?;
    for segment in rest {
        current = current.get(segment.as_str()).ok_or_else(unknown)?;
    }
    Ok(Operand::from_json(current))
}

fn eval_expr(expr: &Expr, context: &HashMap<String, Value>) -> Result<Operand, ExpressionError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Path(path) => lookup(path, context),
        Expr::Negate(inner) => match eval_expr(inner, context)? {
            Operand::Number(n) => Ok(Operand::Number(-n)),
            other => Err(ExpressionError::Type(format!(
                "cannot negate {}",
                other.describe()
            ))),
        },
        Expr::Not(inner) => Ok(Operand::Bool(!eval_expr(inner, context)?.expect_bool("not")?)),
        Expr::And(left, right) => {
            if !eval_expr(left, context)?.expect_bool("and")? {
                return Ok(Operand::Bool(false));
            }
            Ok(Operand::Bool(eval_expr(right, context)?.expect_bool("and")?))
        }
        Expr::Or(left, right) => {
            if eval_expr(left, context)?.expect_bool("or")? {
                return Ok(Operand::Bool(true));
            }
            Ok(Operand::Bool(eval_expr(right, context)?.expect_bool("or")?))
        }
        Expr::Binary(op, left, right) => {
            let l = eval_expr(left, context)?;
            let r = eval_expr(right, context)?;
            apply_binary(*op, l, r)
        }
    }
}

fn loosely_equal(a: &Operand, b: &Operand) -> bool {
    match (a, b) {
        (Operand::Json(x), other) | (other, Operand::Json(x)) => match other {
            Operand::Json(y) => x == y,
            _ => false,
        },
        _ => a == b,
    }
}

fn compare(a: &Operand, b: &Operand) -> Result<Ordering, ExpressionError> {
    match (a, b) {
        (Operand::Number(x), Operand::Number(y)) => x
            .partial_cmp(y)
            .ok_or_else(|| ExpressionError::Type("cannot order NaN".to_string())),
        (Operand::Text(x), Operand::Text(y)) => Ok(x.cmp(y)),
        _ => Err(ExpressionError::Type(format!(
            "cannot order {} and {}",
            a.describe(),
            b.describe()
        ))),
    }
}

fn contains(needle: &Operand, haystack: &Operand) -> Result<bool, ExpressionError> {
    match (needle, haystack) {
        (_, Operand::Json(Value::Array(items))) => Ok(items
            .iter()
            .any(|item| loosely_equal(needle, &Operand::from_json(item)))),
        (Operand::Text(key), Operand::Json(Value::Object(map))) => Ok(map.contains_key(key)),
        (Operand::Text(sub), Operand::Text(s)) => Ok(s.contains(sub.as_str())),
        _ => Err(ExpressionError::Type(format!(
            "cannot test {} in {}",
            needle.describe(),
            haystack.describe()
        ))),
    }
}

fn numbers(op: &str, a: &Operand, b: &Operand) -> Result<(f64, f64), ExpressionError> {
    match (a, b) {
        (Operand::Number(x), Operand::Number(y)) => Ok((*x, *y)),
        _ => Err(ExpressionError::Type(format!(
            "'{op}' needs numbers, got {} and {}",
            a.describe(),
            b.describe()
        ))),
    }
}

fn apply_binary(op: BinaryOp, l: Operand, r: Operand) -> Result<Operand, ExpressionError> {
    let result = match op {
        BinaryOp::Eq => Operand::Bool(loosely_equal(&l, &r)),
        BinaryOp::Ne => Operand::Bool(!loosely_equal(&l, &r)),
        BinaryOp::Lt => Operand::Bool(compare(&l, &r)? == Ordering::Less),
        BinaryOp::Le => Operand::Bool(compare(&l, &r)? != Ordering::Greater),
        BinaryOp::Gt => Operand::Bool(compare(&l, &r)? == Ordering::Greater),
        BinaryOp::Ge => Operand::Bool(compare(&l, &r)? != Ordering::Less),
        BinaryOp::In => Operand::Bool(contains(&l, &r)?),
        BinaryOp::Add => match (&l, &r) {
            (Operand::Text(a), Operand::Text(b)) => Operand::Text(format!("{a}{b}")),
            _ => {
                let (a, b) = numbers("+", &l, &r)?;
                Operand::Number(a + b)
            }
        },
        BinaryOp::Sub => {
            let (a, b) = numbers("-", &l, &r)?;
            Operand::Number(a - b)
        }
        BinaryOp::Mul => {
            let (a, b) = numbers("*", &l, &r)?;
            Operand::Number(a * b)
        }
        BinaryOp::Div => {
            let (a, b) = numbers("/", &l, &r)?;
            if b == 0.0 {
                return Err(ExpressionError::DivisionByZero);
            }
            Operand::Number(a / b)
        }
        BinaryOp::Rem => {
            let (a, b) = numbers("%", &l, &r)?;
            if b == 0.0 {
                return Err(ExpressionError::DivisionByZero);
            }
            Operand::Number(a % b)
        }
    };
    Ok(result)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
