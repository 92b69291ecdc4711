//! Recursive-descent parser producing a predicate expression tree

use serde_json::Value;

use super::lexer::{tokenize, Token, TokenKind};
use super::{ConditionError, ConditionResult};

/// Longest accepted predicate source, in bytes
pub const MAX_PREDICATE_LEN: usize = 4096;

/// Deepest accepted nesting, both while parsing and in the finished tree
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::In => "in",
            BinaryOp::NotIn => "not in",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }
}

/// Functions callable from a predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Len,
    Exists,
    Lower,
    Upper,
    Matches,
}

impl Func {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "len" => Some(Func::Len),
            "exists" => Some(Func::Exists),
            "lower" => Some(Func::Lower),
            "upper" => Some(Func::Upper),
            "matches" => Some(Func::Matches),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Func::Len => "len",
            Func::Exists => "exists",
            Func::Lower => "lower",
            Func::Upper => "upper",
            Func::Matches => "matches",
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Func::Matches => 2,
            _ => 1,
        }
    }
}

/// Compiled predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// The whole state mapping
    State,
    /// `target.key` or `target[key]`
    Index(Box<Expr>, Box<Expr>),
    List(Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

impl Expr {
    fn field(target: Expr, key: impl Into<String>) -> Expr {
        Expr::Index(Box::new(target), Box::new(Expr::Literal(Value::String(key.into()))))
    }

    fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary(op, Box::new(left), Box::new(right))
    }

    /// Height of the tree, computed without recursion
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 1usize)];
        while let Some((expr, level)) = stack.pop() {
            deepest = deepest.max(level);
            match expr {
                Expr::Literal(_) | Expr::State => {}
                Expr::Index(a, b) | Expr::Binary(_, a, b) => {
                    stack.push((a, level + 1));
                    stack.push((b, level + 1));
                }
                Expr::Unary(_, inner) => stack.push((inner, level + 1)),
                Expr::List(items) | Expr::Call(_, items) => {
                    stack.extend(items.iter().map(|item| (item, level + 1)));
                }
            }
        }
        deepest
    }
}

/// Parse a predicate string into an expression tree
pub fn parse(source: &str) -> ConditionResult<Expr> {
    if source.len() > MAX_PREDICATE_LEN {
        return Err(ConditionError::TooLong {
            len: source.len(),
            limit: MAX_PREDICATE_LEN,
        });
    }

    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(ConditionError::Empty);
    }

    let mut parser = Parser {
        tokens,
        index: 0,
        depth: 0,
    };
    let expr = parser.parse_or()?;

    if let Some(token) = parser.peek() {
        return Err(unexpected(token));
    }
    // Left-associative chains build depth without parser recursion
    if expr.depth() > MAX_DEPTH {
        return Err(ConditionError::TooDeep { limit: MAX_DEPTH });
    }
    Ok(expr)
}

fn unexpected(token: &Token) -> ConditionError {
    ConditionError::UnexpectedToken {
        found: token.kind.describe(),
        pos: token.pos,
    }
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    depth: usize,
}

impl Parser {
    fn descend(&mut self) -> ConditionResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ConditionError::TooDeep { limit: MAX_DEPTH });
        }
        Ok(())
    }

    fn ascend(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn peek_ident(&self, offset: usize) -> Option<&str> {
        match self.tokens.get(self.index + offset).map(|t| &t.kind) {
            Some(TokenKind::Ident(name)) => Some(name.as_str()),
            _ => None,
        }
    }

    fn advance(&mut self) -> ConditionResult<Token> {
        let token = self
            .tokens
            .get(self.index)
            .cloned()
            .ok_or(ConditionError::UnexpectedEnd)?;
        self.index += 1;
        Ok(token)
    }

    fn expect(&mut self, kind: TokenKind) -> ConditionResult<()> {
        let token = self.advance()?;
        if token.kind == kind {
            Ok(())
        } else {
            Err(unexpected(&token))
        }
    }

    fn parse_or(&mut self) -> ConditionResult<Expr> {
        let mut left = self.parse_and()?;
        loop {
            let is_or = matches!(self.peek_kind(), Some(TokenKind::OrOr)) || self.peek_ident(0) == Some("or");
            if !is_or {
                return Ok(left);
            }
            self.index += 1;
            let right = self.parse_and()?;
            left = Expr::binary(BinaryOp::Or, left, right);
        }
    }

    fn parse_and(&mut self) -> ConditionResult<Expr> {
        let mut left = self.parse_not()?;
        loop {
            let is_and = matches!(self.peek_kind(), Some(TokenKind::AndAnd)) || self.peek_ident(0) == Some("and");
            if !is_and {
                return Ok(left);
            }
            self.index += 1;
            let right = self.parse_not()?;
            left = Expr::binary(BinaryOp::And, left, right);
        }
    }

    fn parse_not(&mut self) -> ConditionResult<Expr> {
        let is_not = matches!(self.peek_kind(), Some(TokenKind::Bang)) || self.peek_ident(0) == Some("not");
        if is_not {
            self.index += 1;
            self.descend()?;
            let inner = self.parse_not()?;
            self.ascend();
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> ConditionResult<Expr> {
        let left = self.parse_sum()?;

        let op = match self.peek_kind() {
            Some(TokenKind::EqEq) => Some((BinaryOp::Eq, 1)),
            Some(TokenKind::NotEq) => Some((BinaryOp::NotEq, 1)),
            Some(TokenKind::Lt) => Some((BinaryOp::Lt, 1)),
            Some(TokenKind::Le) => Some((BinaryOp::Le, 1)),
            Some(TokenKind::Gt) => Some((BinaryOp::Gt, 1)),
            Some(TokenKind::Ge) => Some((BinaryOp::Ge, 1)),
            Some(TokenKind::Ident(name)) if name == "in" => Some((BinaryOp::In, 1)),
            Some(TokenKind::Ident(name)) if name == "not" && self.peek_ident(1) == Some("in") => {
                Some((BinaryOp::NotIn, 2))
            }
            _ => None,
        };

        match op {
            Some((op, width)) => {
                self.index += width;
                let right = self.parse_sum()?;
                Ok(Expr::binary(op, left, right))
            }
            None => Ok(left),
        }
    }

    fn parse_sum(&mut self) -> ConditionResult<Expr> {
        let mut left = self.parse_product()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.index += 1;
            let right = self.parse_product()?;
            left = Expr::binary(op, left, right);
        }
    }

    fn parse_product(&mut self) -> ConditionResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                Some(TokenKind::Percent) => BinaryOp::Rem,
                _ => return Ok(left),
            };
            self.index += 1;
            let right = self.parse_unary()?;
            left = Expr::binary(op, left, right);
        }
    }

    fn parse_unary(&mut self) -> ConditionResult<Expr> {
        if matches!(self.peek_kind(), Some(TokenKind::Minus)) {
            self.index += 1;
            self.descend()?;
            let inner = self.parse_unary()?;
            self.ascend();
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> ConditionResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind() {
                Some(TokenKind::Dot) => {
                    self.index += 1;
                    let token = self.advance()?;
                    match token.kind {
                        TokenKind::Ident(name) => expr = Expr::field(expr, name),
                        _ => return Err(unexpected(&token)),
                    }
                }
                Some(TokenKind::LBracket) => {
                    self.index += 1;
                    self.descend()?;
                    let key = self.parse_or()?;
                    self.ascend();
                    self.expect(TokenKind::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(key));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> ConditionResult<Expr> {
        let token = self.advance()?;
        match token.kind {
            TokenKind::Int(i) => Ok(Expr::Literal(Value::from(i))),
            TokenKind::Float(f) => serde_json::Number::from_f64(f)
                .map(|n| Expr::Literal(Value::Number(n)))
                .ok_or_else(|| ConditionError::InvalidNumber(f.to_string())),
            TokenKind::Str(s) => Ok(Expr::Literal(Value::String(s))),
            TokenKind::LParen => {
                self.descend()?;
                let inner = self.parse_or()?;
                self.ascend();
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::LBracket => {
                self.descend()?;
                let items = self.parse_list(TokenKind::RBracket)?;
                self.ascend();
                Ok(Expr::List(items))
            }
            TokenKind::Ident(name) => self.parse_ident(name, token.pos),
            _ => Err(unexpected(&token)),
        }
    }

    fn parse_ident(&mut self, name: String, pos: usize) -> ConditionResult<Expr> {
        match name.as_str() {
            "true" | "True" => return Ok(Expr::Literal(Value::Bool(true))),
            "false" | "False" => return Ok(Expr::Literal(Value::Bool(false))),
            "null" | "None" => return Ok(Expr::Literal(Value::Null)),
            "state" => return Ok(Expr::State),
            "and" | "or" | "not" | "in" => {
                return Err(ConditionError::UnexpectedToken { found: name, pos })
            }
            _ => {}
        }

        if matches!(self.peek_kind(), Some(TokenKind::LParen)) {
            let func = Func::from_name(&name).ok_or(ConditionError::UnknownFunction(name))?;
            self.index += 1;
            self.descend()?;
            let args = self.parse_list(TokenKind::RParen)?;
            self.ascend();
            if args.len() != func.arity() {
                return Err(ConditionError::Arity {
                    func: func.name(),
                    expected: func.arity(),
                    found: args.len(),
                });
            }
            return Ok(Expr::Call(func, args));
        }

        // Bare identifiers are shorthand for state fields
        Ok(Expr::field(Expr::State, name))
    }

    /// Comma-separated expressions up to `close`, which is consumed
    fn parse_list(&mut self, close: TokenKind) -> ConditionResult<Vec<Expr>> {
        let mut items = Vec::new();
        if self.peek_kind() == Some(&close) {
            self.index += 1;
            return Ok(items);
        }
        loop {
            items.push(self.parse_or()?);
            let token = self.advance()?;
            if token.kind == close {
                return Ok(items);
            }
            if token.kind != TokenKind::Comma {
                return Err(unexpected(&token));
            }
        }
    }
}
