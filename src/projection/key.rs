//! Resource keys: dotted paths into JSON resources

use super::lexer::{LexResult, Lexer};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum KeySegment {
    Name(String),
    /// `[N]`, negative counts from the end
    Index(i64),
    /// `[]`, every element
    Slice,
}

/// A parsed resource key such as `disks[0].initializeParams.diskSizeGb`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Key {
    pub segments: Vec<KeySegment>,
}

impl Key {
    pub fn parse(source: &str) -> LexResult<Key> {
        let mut lexer = Lexer::new(source.trim());
        let key = Key::parse_from(&mut lexer)?;
        if !lexer.is_eof() {
            return Err(lexer.error("unexpected character in key"));
        }
        Ok(key)
    }

    /// Read a key from `lexer`, stopping before any `.name(` transform segment
    pub fn parse_from(lexer: &mut Lexer<'_>) -> LexResult<Key> {
        let mut key = Key::default();
        loop {
            if lexer.peek() == Some('[') {
                key.segments.push(index_segment(lexer)?);
            } else if matches!(lexer.peek(), Some('\'') | Some('"')) {
                key.segments.push(KeySegment::Name(lexer.quoted()?));
            } else {
                let checkpoint = lexer.position();
                let Some(name) = lexer.name() else {
                    break;
                };
                if lexer.peek() == Some('(') {
                    lexer.rewind(checkpoint);
                    break;
                }
                key.segments.push(KeySegment::Name(name));
            }

            while lexer.peek() == Some('[') {
                key.segments.push(index_segment(lexer)?);
            }
            // A dot continues the key unless a transform follows it
            if lexer.peek() == Some('.') && !transform_follows(lexer) {
                lexer.next_char();
                continue;
            }
            break;
        }
        Ok(key)
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The last name segment, used for default column labels
    pub fn last_name(&self) -> Option<&str> {
        self.segments.iter().rev().find_map(|s| match s {
            KeySegment::Name(n) => Some(n.as_str()),
            _ => None,
        })
    }

    pub fn has_slice(&self) -> bool {
        self.segments.iter().any(|s| *s == KeySegment::Slice)
    }

    /// Single value at this key; `[]` collects every element
    pub fn get(&self, resource: &Value) -> Value {
        get_segments(resource, &self.segments)
    }

    /// Split at the first `[]`: the path to the array and the remainder
    pub fn split_at_slice(&self) -> Option<(Key, Key)> {
        let pos = self.segments.iter().position(|s| *s == KeySegment::Slice)?;
        Some((
            Key {
                segments: self.segments[..pos].to_vec(),
            },
            Key {
                segments: self.segments[pos + 1..].to_vec(),
            },
        ))
    }
}

fn transform_follows(lexer: &Lexer<'_>) -> bool {
    let mut offset = 1;
    while lexer
        .peek_at(offset)
        .is_some_and(|c| c.is_alphanumeric() || c == '_')
    {
        offset += 1;
    }
    offset > 1 && lexer.peek_at(offset) == Some('(')
}

fn index_segment(lexer: &mut Lexer<'_>) -> LexResult<KeySegment> {
    lexer.expect('[')?;
    lexer.skip_ws();
    if lexer.eat(']') {
        return Ok(KeySegment::Slice);
    }
    let text = lexer.until(&[']'])?;
    lexer.expect(']')?;
    let index = text
        .trim()
        .parse::<i64>()
        .map_err(|_| format!("invalid index [{text}] in [{}]", lexer.source()))?;
    Ok(KeySegment::Index(index))
}

fn get_segments(value: &Value, segments: &[KeySegment]) -> Value {
    let Some((first, rest)) = segments.split_first() else {
        return value.clone();
    };
    match first {
        KeySegment::Name(name) => match value.get(name.as_str()) {
            Some(v) => get_segments(v, rest),
            None => Value::Null,
        },
        KeySegment::Index(i) => {
            let Some(items) = value.as_array() else {
                return Value::Null;
            };
            let len = items.len() as i64;
            let idx = if *i < 0 { len + i } else { *i };
            if idx < 0 || idx >= len {
                return Value::Null;
            }
            get_segments(&items[idx as usize], rest)
        }
        KeySegment::Slice => match value.as_array() {
            Some(items) => Value::Array(items.iter().map(|v| get_segments(v, rest)).collect()),
            None => Value::Null,
        },
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            match segment {
                KeySegment::Name(n) => {
                    if !first {
                        write!(f, ".")?;
                    }
                    write!(f, "{n}")?;
                }
                KeySegment::Index(i) => write!(f, "[{i}]")?,
                KeySegment::Slice => write!(f, "[]")?,
            }
            first = false;
        }
        Ok(())
    }
}
