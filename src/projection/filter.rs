//! `--filter` expressions
//!
//! ```text
//! status:RUNNING AND -zone:us-east1* OR labels.env=(prod staging)
//! ```
//!
//! Terms are `key OP operand`. Adjacent terms are implicitly ANDed, `OR`
//! binds tighter than `AND`, and `NOT` or a leading `-` negates. A bare word
//! matches any scalar anywhere in the resource. `:` and `=` compare strings
//! case-insensitively; a missing or null key never matches.

use super::key::Key;
use super::lexer::{LexResult, Lexer};
use super::transforms::{self, TransformCall};
use crate::error::{CliError, Result};
use regex::Regex;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Has,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Match,
    NotMatch,
}

impl Op {
    fn symbol(self) -> &'static str {
        match self {
            Op::Has => ":",
            Op::Eq => "=",
            Op::Ne => "!=",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Match => "~",
            Op::NotMatch => "!~",
        }
    }
}

#[derive(Debug, Clone)]
struct Term {
    key: Key,
    transforms: Vec<TransformCall>,
    op: Op,
    operands: Vec<String>,
    patterns: Vec<Regex>,
}

#[derive(Debug, Clone)]
enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Term(Term),
    Global(String),
}

/// A compiled filter expression
#[derive(Debug, Clone)]
pub struct Filter {
    source: String,
    expr: Option<Expr>,
}

impl Filter {
    pub fn parse(source: &str) -> Result<Filter> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Ok(Filter {
                source: String::new(),
                expr: None,
            });
        }
        let mut lexer = Lexer::new(trimmed);
        let expr = parse_expr(&mut lexer).map_err(CliError::Filter)?;
        lexer.skip_ws();
        if !lexer.is_eof() {
            return Err(CliError::Filter(lexer.error("unexpected character")));
        }
        Ok(Filter {
            source: trimmed.to_string(),
            expr: Some(expr),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_empty(&self) -> bool {
        self.expr.is_none()
    }

    pub fn matches(&self, resource: &Value) -> bool {
        self.expr.as_ref().map_or(true, |e| eval(e, resource))
    }

    /// Equivalent server-side expression, when the filter is a plain
    /// conjunction of `key=value` terms on simple keys
    pub fn server_expression(&self) -> Option<String> {
        let mut terms = Vec::new();
        collect_conjunction(self.expr.as_ref()?, &mut terms)?;
        let parts: Vec<String> = terms
            .iter()
            .map(|t| {
                let value = t.operands[0].replace('\\', "\\\\").replace('"', "\\\"");
                format!("({} = \"{}\")", t.key, value)
            })
            .collect();
        Some(parts.join(" "))
    }
}

fn collect_conjunction<'a>(expr: &'a Expr, out: &mut Vec<&'a Term>) -> Option<()> {
    match expr {
        Expr::And(l, r) => {
            collect_conjunction(l, out)?;
            collect_conjunction(r, out)
        }
        Expr::Term(t)
            if t.op == Op::Eq
                && t.operands.len() == 1
                && t.transforms.is_empty()
                && !t.operands[0].contains('*')
                && t
                    .key
                    .segments
                    .iter()
                    .all(|s| matches!(s, super::key::KeySegment::Name(_))) =>
        {
            out.push(t);
            Some(())
        }
        _ => None,
    }
}

fn parse_expr(lexer: &mut Lexer<'_>) -> LexResult<Expr> {
    let mut left = parse_or(lexer)?;
    loop {
        lexer.skip_ws();
        if lexer.is_eof() || lexer.peek() == Some(')') {
            return Ok(left);
        }
        lexer.eat_keyword("AND");
        let right = parse_or(lexer)?;
        left = Expr::And(Box::new(left), Box::new(right));
    }
}

fn parse_or(lexer: &mut Lexer<'_>) -> LexResult<Expr> {
    let mut left = parse_unary(lexer)?;
    loop {
        lexer.skip_ws();
        if !lexer.eat_keyword("OR") {
            return Ok(left);
        }
        let right = parse_unary(lexer)?;
        left = Expr::Or(Box::new(left), Box::new(right));
    }
}

fn parse_unary(lexer: &mut Lexer<'_>) -> LexResult<Expr> {
    lexer.skip_ws();
    if lexer.eat_keyword("NOT") {
        return Ok(Expr::Not(Box::new(parse_unary(lexer)?)));
    }
    if lexer.peek() == Some('-') && lexer.peek_at(1).is_some_and(|c| !c.is_whitespace()) {
        lexer.next_char();
        return Ok(Expr::Not(Box::new(parse_unary(lexer)?)));
    }
    if lexer.eat('(') {
        let inner = parse_expr(lexer)?;
        lexer.skip_ws();
        lexer.expect(')')?;
        return Ok(inner);
    }
    if lexer.is_eof() {
        return Err(lexer.error("expected a term"));
    }
    parse_term(lexer)
}

fn parse_op(lexer: &mut Lexer<'_>) -> Option<Op> {
    for (text, op) in [
        ("!=", Op::Ne),
        ("!~", Op::NotMatch),
        ("<=", Op::Le),
        (">=", Op::Ge),
        (":", Op::Has),
        ("=", Op::Eq),
        ("<", Op::Lt),
        (">", Op::Gt),
        ("~", Op::Match),
    ] {
        if lexer.eat_str(text) {
            return Some(op);
        }
    }
    None
}

fn parse_term(lexer: &mut Lexer<'_>) -> LexResult<Expr> {
    let start = lexer.position();
    let key = Key::parse_from(lexer)?;
    let mut calls = Vec::new();
    if !key.is_empty() {
        while lexer.peek() == Some('.') {
            lexer.next_char();
            calls.push(parse_call(lexer)?);
        }
    }
    lexer.skip_ws();

    let op = if key.is_empty() { None } else { parse_op(lexer) };
    let Some(op) = op else {
        lexer.rewind(start);
        let word = lexer.word(&['(', ')'])?;
        if word.is_empty() {
            return Err(lexer.error("expected a term"));
        }
        return Ok(Expr::Global(word));
    };

    lexer.skip_ws();
    let operands = parse_operands(lexer)?;
    let patterns = if matches!(op, Op::Match | Op::NotMatch) {
        operands
            .iter()
            .map(|p| Regex::new(p).map_err(|e| format!("invalid regular expression [{p}]: {e}")))
            .collect::<LexResult<Vec<_>>>()?
    } else {
        Vec::new()
    };
    Ok(Expr::Term(Term {
        key,
        transforms: calls,
        op,
        operands,
        patterns,
    }))
}

fn parse_call(lexer: &mut Lexer<'_>) -> LexResult<TransformCall> {
    let Some(name) = lexer.name() else {
        return Err(lexer.error("expected a transform"));
    };
    if !transforms::is_known(&name) {
        return Err(format!("unknown transform [{name}]"));
    }
    lexer.expect('(')?;
    let raw = lexer.until(&[')'])?;
    lexer.expect(')')?;
    let args: Vec<&str> = raw.split(',').map(str::trim).filter(|a| !a.is_empty()).collect();
    Ok(TransformCall::new(&name, &args))
}

fn parse_operands(lexer: &mut Lexer<'_>) -> LexResult<Vec<String>> {
    if !lexer.eat('(') {
        let value = operand(lexer, &['(', ')'])?;
        return Ok(vec![value]);
    }
    let mut values = Vec::new();
    loop {
        lexer.skip_ws();
        if lexer.eat(')') {
            break;
        }
        if lexer.eat_keyword("OR") {
            continue;
        }
        values.push(operand(lexer, &[',', ')'])?);
        lexer.skip_ws();
        lexer.eat(',');
    }
    if values.is_empty() {
        return Err(lexer.error("empty operand list"));
    }
    Ok(values)
}

fn operand(lexer: &mut Lexer<'_>, stops: &[char]) -> LexResult<String> {
    if matches!(lexer.peek(), Some('\'') | Some('"')) {
        return lexer.quoted();
    }
    let word = lexer.word(stops)?;
    if word.is_empty() {
        return Err(lexer.error("missing operand"));
    }
    Ok(word)
}

fn eval(expr: &Expr, resource: &Value) -> bool {
    match expr {
        Expr::And(l, r) => eval(l, resource) && eval(r, resource),
        Expr::Or(l, r) => eval(l, resource) || eval(r, resource),
        Expr::Not(e) => !eval(e, resource),
        Expr::Global(word) => global_match(resource, word),
        Expr::Term(term) => term_matches(term, resource),
    }
}

fn global_match(value: &Value, word: &str) -> bool {
    match value {
        Value::Object(map) => map.values().any(|v| global_match(v, word)),
        Value::Array(items) => items.iter().any(|v| global_match(v, word)),
        Value::Null => false,
        scalar => has_match(scalar, word),
    }
}

fn term_matches(term: &Term, resource: &Value) -> bool {
    let value = transforms::apply_chain(&term.transforms, term.key.get(resource), resource);
    let negated = matches!(term.op, Op::Ne | Op::NotMatch);
    match &value {
        Value::Null => false,
        Value::Array(items) if items.is_empty() => false,
        Value::Array(items) => {
            let any = items
                .iter()
                .filter(|v| !v.is_null())
                .any(|v| positive_match(term, v));
            if negated {
                !any
            } else {
                any
            }
        }
        scalar => {
            let positive = positive_match(term, scalar);
            if negated {
                !positive
            } else {
                positive
            }
        }
    }
}

/// Match ignoring negation; `!=` and `!~` test their positive form
fn positive_match(term: &Term, value: &Value) -> bool {
    if matches!(term.op, Op::Match | Op::NotMatch) {
        let text = transforms::text(value);
        return term.patterns.iter().any(|p| p.is_match(&text));
    }
    term.operands.iter().any(|operand| match term.op {
        Op::Has => has_match(value, operand),
        Op::Eq | Op::Ne => eq_match(value, operand),
        op => ordered_match(op, value, operand),
    })
}

fn bool_operand(operand: &str) -> Option<bool> {
    match operand.to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn words(s: &str) -> Vec<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn has_match(value: &Value, operand: &str) -> bool {
    match value {
        Value::Object(map) => {
            if operand == "*" {
                return !map.is_empty();
            }
            map.keys().any(|k| k.eq_ignore_ascii_case(operand))
                || map.values().any(|v| !v.is_null() && has_match(v, operand))
        }
        Value::Array(items) => items.iter().any(|v| has_match(v, operand)),
        Value::Bool(b) => operand == "*" || bool_operand(operand) == Some(*b),
        Value::Number(n) => {
            operand == "*"
                || match (n.as_f64(), operand.parse::<f64>()) {
                    (Some(v), Ok(o)) => v == o,
                    _ => n.to_string() == operand,
                }
        }
        Value::String(s) => {
            if operand == "*" {
                return !s.is_empty();
            }
            let value = s.to_lowercase();
            let operand = operand.to_lowercase();
            if let Some(prefix) = operand.strip_suffix('*') {
                return value.starts_with(prefix)
                    || words(&value).iter().any(|w| w.starts_with(prefix));
            }
            if value == operand {
                return true;
            }
            let haystack = words(&value);
            let needle = words(&operand);
            !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle.as_slice())
        }
        Value::Null => false,
    }
}

fn eq_match(value: &Value, operand: &str) -> bool {
    match value {
        Value::Bool(b) => bool_operand(operand) == Some(*b),
        Value::Number(n) => match (n.as_f64(), operand.parse::<f64>()) {
            (Some(v), Ok(o)) => v == o,
            _ => false,
        },
        Value::String(s) => {
            let value = s.to_lowercase();
            let operand = operand.to_lowercase();
            match operand.strip_suffix('*') {
                Some(prefix) => value.starts_with(prefix),
                None => {
                    value == operand
                        || matches!((value.parse::<f64>(), operand.parse::<f64>()), (Ok(v), Ok(o)) if v == o)
                }
            }
        }
        _ => false,
    }
}

fn ordered_match(op: Op, value: &Value, operand: &str) -> bool {
    use std::cmp::Ordering;
    let ordering = match operand.parse::<f64>() {
        Ok(o) => match number_of(value) {
            Some(v) => v.partial_cmp(&o),
            None => return false,
        },
        Err(_) => match value {
            Value::String(s) => Some(s.as_str().cmp(operand)),
            Value::Bool(_) | Value::Number(_) => Some(transforms::text(value).as_str().cmp(operand)),
            _ => None,
        },
    };
    let Some(ordering) = ordering else {
        return false;
    };
    match op {
        Op::Lt => ordering == Ordering::Less,
        Op::Le => ordering != Ordering::Greater,
        Op::Gt => ordering == Ordering::Greater,
        Op::Ge => ordering != Ordering::Less,
        _ => false,
    }
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}
