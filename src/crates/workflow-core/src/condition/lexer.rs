//! Tokenizer for edge predicates

use super::{ConditionError, ConditionResult};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Int(i) => i.to_string(),
            TokenKind::Float(f) => f.to_string(),
            TokenKind::Str(s) => format!("'{}'", s),
            TokenKind::Ident(name) => name.clone(),
            TokenKind::EqEq => "==".into(),
            TokenKind::NotEq => "!=".into(),
            TokenKind::Lt => "<".into(),
            TokenKind::Le => "<=".into(),
            TokenKind::Gt => ">".into(),
            TokenKind::Ge => ">=".into(),
            TokenKind::AndAnd => "&&".into(),
            TokenKind::OrOr => "||".into(),
            TokenKind::Bang => "!".into(),
            TokenKind::Plus => "+".into(),
            TokenKind::Minus => "-".into(),
            TokenKind::Star => "*".into(),
            TokenKind::Slash => "/".into(),
            TokenKind::Percent => "%".into(),
            TokenKind::LParen => "(".into(),
            TokenKind::RParen => ")".into(),
            TokenKind::LBracket => "[".into(),
            TokenKind::RBracket => "]".into(),
            TokenKind::Comma => ",".into(),
            TokenKind::Dot => ".".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset into the predicate
    pub pos: usize,
}

/// Split a predicate into tokens
pub fn tokenize(source: &str) -> ConditionResult<Vec<Token>> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (pos, ch) = chars[i];

        if ch.is_whitespace() {
            i += 1;
            continue;
        }

        if ch.is_ascii_digit() {
            let (token, next) = lex_number(source, &chars, i)?;
            tokens.push(token);
            i = next;
            continue;
        }

        if ch.is_alphabetic() || ch == '_' {
            let start = i;
            while i < chars.len() && (chars[i].1.is_alphanumeric() || chars[i].1 == '_') {
                i += 1;
            }
            let end = chars.get(i).map_or(source.len(), |(p, _)| *p);
            tokens.push(Token {
                kind: TokenKind::Ident(source[chars[start].0..end].to_string()),
                pos,
            });
            continue;
        }

        if ch == '"' || ch == '\'' {
            let (token, next) = lex_string(&chars, i)?;
            tokens.push(token);
            i = next;
            continue;
        }

        let peek = chars.get(i + 1).map(|(_, c)| *c);
        let (kind, width) = match (ch, peek) {
            ('=', Some('=')) => (TokenKind::EqEq, 2),
            ('!', Some('=')) => (TokenKind::NotEq, 2),
            ('<', Some('=')) => (TokenKind::Le, 2),
            ('>', Some('=')) => (TokenKind::Ge, 2),
            ('&', Some('&')) => (TokenKind::AndAnd, 2),
            ('|', Some('|')) => (TokenKind::OrOr, 2),
            ('<', _) => (TokenKind::Lt, 1),
            ('>', _) => (TokenKind::Gt, 1),
            ('!', _) => (TokenKind::Bang, 1),
            ('+', _) => (TokenKind::Plus, 1),
            ('-', _) => (TokenKind::Minus, 1),
            ('*', _) => (TokenKind::Star, 1),
            ('/', _) => (TokenKind::Slash, 1),
            ('%', _) => (TokenKind::Percent, 1),
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            ('[', _) => (TokenKind::LBracket, 1),
            (']', _) => (TokenKind::RBracket, 1),
            (',', _) => (TokenKind::Comma, 1),
            ('.', _) => (TokenKind::Dot, 1),
            _ => return Err(ConditionError::UnexpectedChar { ch, pos }),
        };

        tokens.push(Token { kind, pos });
        i += width;
    }

    Ok(tokens)
}

fn lex_number(source: &str, chars: &[(usize, char)], start: usize) -> ConditionResult<(Token, usize)> {
    let mut i = start;
    let mut is_float = false;

    while i < chars.len() && chars[i].1.is_ascii_digit() {
        i += 1;
    }

    // A dot only belongs to the number when a digit follows it
    if i + 1 < chars.len() && chars[i].1 == '.' && chars[i + 1].1.is_ascii_digit() {
        is_float = true;
        i += 1;
        while i < chars.len() && chars[i].1.is_ascii_digit() {
            i += 1;
        }
    }

    if i < chars.len() && (chars[i].1 == 'e' || chars[i].1 == 'E') {
        let mut j = i + 1;
        if j < chars.len() && (chars[j].1 == '+' || chars[j].1 == '-') {
            j += 1;
        }
        if j < chars.len() && chars[j].1.is_ascii_digit() {
            is_float = true;
            i = j;
            while i < chars.len() && chars[i].1.is_ascii_digit() {
                i += 1;
            }
        }
    }

    let pos = chars[start].0;
    let end = chars.get(i).map_or(source.len(), |(p, _)| *p);
    let text = &source[pos..end];

    let kind = if is_float {
        text.parse::<f64>()
            .map(TokenKind::Float)
            .map_err(|_| ConditionError::InvalidNumber(text.to_string()))?
    } else {
        text.parse::<i64>()
            .map(TokenKind::Int)
            .map_err(|_| ConditionError::InvalidNumber(text.to_string()))?
    };

    Ok((Token { kind, pos }, i))
}

fn lex_string(chars: &[(usize, char)], start: usize) -> ConditionResult<(Token, usize)> {
    let (pos, quote) = chars[start];
    let mut value = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        let ch = chars[i].1;
        if ch == quote {
            return Ok((
                Token {
                    kind: TokenKind::Str(value),
                    pos,
                },
                i + 1,
            ));
        }
        if ch == '\\' {
            i += 1;
            let escaped = chars
                .get(i)
                .map(|(_, c)| *c)
                .ok_or(ConditionError::UnterminatedString { pos })?;
            value.push(match escaped {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                other => other,
            });
        } else {
            value.push(ch);
        }
        i += 1;
    }

    Err(ConditionError::UnterminatedString { pos })
}
