//! Inline expressions.
//!
//! Topology is written as `ds_${0..1}.t_order_${[0, 1]}`: every placeholder
//! expands to a list and the text expands to the cartesian product.
//! Algorithms use [`Template`], where placeholders hold arithmetic
//! over the sharding value, e.g. `t_order_${order_id % 2}`.

use std::fmt::Display;

use super::{Error, ShardingValue};

/// Expand an inline expression into the list of names it describes.
///
/// Segments separated by top-level commas are expanded independently and
/// concatenated. Within a segment, the leftmost placeholder varies slowest.
pub fn split_and_evaluate(expression: &str) -> Result<Vec<String>, Error> {
    let mut result = vec![];

    for segment in split_segments(expression)? {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }

        let mut names = vec![String::new()];
        for part in parts(expression, segment)? {
            names = match part {
                Part::Text(text) => names.into_iter().map(|n| n + text).collect(),
                Part::Placeholder(body) => {
                    let choices = choices(expression, body)?;
                    names
                        .iter()
                        .flat_map(|n| choices.iter().map(move |c| format!("{}{}", n, c)))
                        .collect()
                }
            };
        }
        result.extend(names);
    }

    Ok(result)
}

fn split_segments(expression: &str) -> Result<Vec<&str>, Error> {
    let mut segments = vec![];
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in expression.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| Error::expression(expression, "unbalanced '}'"))?
            }
            ',' if depth == 0 => {
                segments.push(&expression[start..i]);
                start = i + 1;
            }
            _ => (),
        }
    }

    if depth != 0 {
        return Err(Error::expression(expression, "unbalanced '{'"));
    }

    segments.push(&expression[start..]);
    Ok(segments)
}

enum Part<'a> {
    Text(&'a str),
    Placeholder(&'a str),
}

/// Split text into literal text and placeholder bodies.
fn parts<'a>(expression: &str, mut text: &'a str) -> Result<Vec<Part<'a>>, Error> {
    let mut parts = vec![];

    while let Some((start, open)) = find_placeholder(text) {
        if start > 0 {
            parts.push(Part::Text(&text[..start]));
        }
        let body_start = start + open;
        let end = closing_brace(&text[body_start..])
            .ok_or_else(|| Error::expression(expression, "unbalanced '{'"))?;
        parts.push(Part::Placeholder(&text[body_start..body_start + end]));
        text = &text[body_start + end + 1..];
    }

    if !text.is_empty() {
        parts.push(Part::Text(text));
    }

    Ok(parts)
}

/// Position and length of the next `${` or `$->{`.
fn find_placeholder(text: &str) -> Option<(usize, usize)> {
    let short = text.find("${").map(|i| (i, 2));
    let long = text.find("$->{").map(|i| (i, 4));
    match (short, long) {
        (Some(short), Some(long)) => Some(if long.0 < short.0 { long } else { short }),
        (short, long) => short.or(long),
    }
}

/// Index of the brace closing an already opened placeholder.
fn closing_brace(text: &str) -> Option<usize> {
    let mut depth = 1usize;
    for (i, c) in text.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => (),
        }
    }
    None
}

fn choices(expression: &str, body: &str) -> Result<Vec<String>, Error> {
    let body = body.trim();
    if body.is_empty() {
        return Err(Error::expression(expression, "empty placeholder"));
    }

    if let Some(list) = body.strip_prefix('[').and_then(|b| b.strip_suffix(']')) {
        let items = list
            .split(',')
            .map(|item| unquote(item.trim()).to_string())
            .filter(|item| !item.is_empty())
            .collect::<Vec<_>>();
        if items.is_empty() {
            return Err(Error::expression(expression, "empty list"));
        }
        return Ok(items);
    }

    if let Some((low, high)) = body.split_once("..") {
        let bound = |b: &str| {
            b.trim().parse::<i64>().map_err(|_| {
                Error::expression(expression, format!("range bound \"{}\" isn't an integer", b))
            })
        };
        let (low, high) = (bound(low)?, bound(high)?);
        if low > high {
            return Err(Error::expression(
                expression,
                format!("descending range {}..{}", low, high),
            ));
        }
        return Ok((low..=high).map(|i| i.to_string()).collect());
    }

    if body.parse::<i64>().is_ok() {
        return Ok(vec![body.to_string()]);
    }

    let literal = unquote(body);
    if literal.len() != body.len() {
        return Ok(vec![literal.to_string()]);
    }

    Err(Error::expression(
        expression,
        format!("unsupported placeholder \"{}\"", body),
    ))
}

fn unquote(text: &str) -> &str {
    for quote in ['\'', '"'] {
        if let Some(inner) = text
            .strip_prefix(quote)
            .and_then(|t| t.strip_suffix(quote))
        {
            return inner;
        }
    }
    text
}

/// Variables bound while evaluating a [`Template`]. Lookup ignores case.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    values: Vec<(String, ShardingValue)>,
}

impl Variables {
    pub fn bind(mut self, name: impl ToString, value: ShardingValue) -> Self {
        self.values.push((name.to_string(), value));
        self
    }

    pub fn get(&self, name: &str) -> Option<&ShardingValue> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .or_else(|| self.values.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)))
            .map(|(_, v)| v)
    }
}

/// Algorithm expression, compiled once.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Integer(i64),
    Variable(String),
    Negate(Box<Expr>),
    Abs(Box<Expr>),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
}

enum Evaluated {
    Integer(i64),
    Text(String),
}

impl Evaluated {
    fn integer(self) -> Result<i64, Error> {
        match self {
            Self::Integer(i) => Ok(i),
            Self::Text(text) => Err(Error::NotAnInteger(text)),
        }
    }
}

impl Display for Evaluated {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{}", i),
            Self::Text(text) => write!(f, "{}", text),
        }
    }
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, Error> {
        split_segments(source)?;

        let segments = parts(source, source)?
            .into_iter()
            .map(|part| match part {
                Part::Text(text) => Ok(Segment::Text(text.to_string())),
                Part::Placeholder(body) => Parser::new(source, body)?.parse().map(Segment::Expr),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Names of all variables referenced by the template.
    pub fn variables(&self) -> Vec<&str> {
        fn collect<'a>(expr: &'a Expr, names: &mut Vec<&'a str>) {
            match expr {
                Expr::Integer(_) => (),
                Expr::Variable(name) => {
                    if !names.contains(&name.as_str()) {
                        names.push(name);
                    }
                }
                Expr::Negate(inner) | Expr::Abs(inner) => collect(inner, names),
                Expr::Binary(left, _, right) => {
                    collect(left, names);
                    collect(right, names);
                }
            }
        }

        let mut names = vec![];
        for segment in &self.segments {
            if let Segment::Expr(expr) = segment {
                collect(expr, &mut names);
            }
        }
        names
    }

    pub fn evaluate(&self, variables: &Variables) -> Result<String, Error> {
        let mut result = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => result.push_str(text),
                Segment::Expr(expr) => result.push_str(&eval(expr, variables)?.to_string()),
            }
        }
        Ok(result)
    }
}

impl Display for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

fn eval(expr: &Expr, variables: &Variables) -> Result<Evaluated, Error> {
    Ok(match expr {
        Expr::Integer(i) => Evaluated::Integer(*i),
        Expr::Variable(name) => match variables.get(name) {
            Some(ShardingValue::Integer(i)) => Evaluated::Integer(*i),
            Some(other) => Evaluated::Text(other.to_string()),
            None => return Err(Error::UnboundVariable(name.clone())),
        },
        Expr::Negate(inner) => Evaluated::Integer(
            eval(inner, variables)?
                .integer()?
                .checked_neg()
                .ok_or(Error::Overflow)?,
        ),
        Expr::Abs(inner) => Evaluated::Integer(
            eval(inner, variables)?
                .integer()?
                .checked_abs()
                .ok_or(Error::Overflow)?,
        ),
        Expr::Binary(left, op, right) => {
            let left = eval(left, variables)?.integer()?;
            let right = eval(right, variables)?.integer()?;
            let value = match op {
                BinaryOp::Add => left.checked_add(right),
                BinaryOp::Subtract => left.checked_sub(right),
                BinaryOp::Multiply => left.checked_mul(right),
                BinaryOp::Divide | BinaryOp::Remainder if right == 0 => {
                    return Err(Error::DivisionByZero)
                }
                BinaryOp::Divide => left.checked_div(right),
                BinaryOp::Remainder => left.checked_rem(right),
            };
            Evaluated::Integer(value.ok_or(Error::Overflow)?)
        }
    })
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Integer(i64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Open,
    Close,
}

/// Recursive descent over `+ - * / %`, unary minus, parentheses and `abs()`.
struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    position: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, body: &str) -> Result<Self, Error> {
        let mut tokens = vec![];
        let mut chars = body.char_indices().peekable();

        while let Some((i, c)) = chars.next() {
            let token = match c {
                c if c.is_whitespace() => continue,
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '%' => Token::Percent,
                '(' => Token::Open,
                ')' => Token::Close,
                c if c.is_ascii_digit() => {
                    let mut end = i + c.len_utf8();
                    while let Some((j, d)) = chars.peek().copied() {
                        if !d.is_ascii_digit() {
                            break;
                        }
                        end = j + d.len_utf8();
                        chars.next();
                    }
                    Token::Integer(body[i..end].parse().map_err(|_| {
                        Error::expression(source, format!("integer \"{}\" is too large", &body[i..end]))
                    })?)
                }
                c if c.is_alphabetic() || c == '_' => {
                    let mut end = i + c.len_utf8();
                    while let Some((j, d)) = chars.peek().copied() {
                        if !(d.is_alphanumeric() || d == '_') {
                            break;
                        }
                        end = j + d.len_utf8();
                        chars.next();
                    }
                    Token::Identifier(body[i..end].to_string())
                }
                c => {
                    return Err(Error::expression(
                        source,
                        format!("unexpected character '{}'", c),
                    ))
                }
            };
            tokens.push(token);
        }

        Ok(Self {
            source,
            tokens,
            position: 0,
        })
    }

    fn parse(mut self) -> Result<Expr, Error> {
        if self.tokens.is_empty() {
            return Err(Error::expression(self.source, "empty placeholder"));
        }
        let expr = self.sum()?;
        match self.peek() {
            None => Ok(expr),
            Some(token) => Err(Error::expression(
                self.source,
                format!("unexpected token {:?}", token),
            )),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn sum(&mut self) -> Result<Expr, Error> {
        let mut left = self.product()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Subtract,
                _ => return Ok(left),
            };
            self.position += 1;
            let right = self.product()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
    }

    fn product(&mut self) -> Result<Expr, Error> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Multiply,
                Some(Token::Slash) => BinaryOp::Divide,
                Some(Token::Percent) => BinaryOp::Remainder,
                _ => return Ok(left),
            };
            self.position += 1;
            let right = self.unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Expr, Error> {
        if self.peek() == Some(&Token::Minus) {
            self.position += 1;
            return Ok(Expr::Negate(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, Error> {
        match self.next() {
            Some(Token::Integer(i)) => Ok(Expr::Integer(i)),
            Some(Token::Identifier(name)) => {
                if self.peek() == Some(&Token::Open) {
                    if !name.eq_ignore_ascii_case("abs") {
                        return Err(Error::expression(
                            self.source,
                            format!("unknown function \"{}\"", name),
                        ));
                    }
                    self.position += 1;
                    let inner = self.group()?;
                    Ok(Expr::Abs(Box::new(inner)))
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            Some(Token::Open) => self.group(),
            _ => Err(Error::expression(self.source, "expected a value")),
        }
    }

    /// Expression followed by `)`; the `(` is already consumed.
    fn group(&mut self) -> Result<Expr, Error> {
        let inner = self.sum()?;
        match self.next() {
            Some(Token::Close) => Ok(inner),
            _ => Err(Error::expression(self.source, "expected ')'")),
        }
    }
}
