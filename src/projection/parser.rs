//! Projection expression parser
//!
//! ```text
//! format [attr,attr=value] (key.transform(args):label=X:sort=1:reverse, ...)
//! ```

use super::key::Key;
use super::lexer::{LexResult, Lexer};
use super::transforms::{self, TransformArg, TransformCall};
use super::{Align, Column, Projection};

pub fn parse(source: &str) -> LexResult<Projection> {
    let mut lexer = Lexer::new(source);
    let mut projection = Projection::default();

    lexer.skip_ws();
    if let Some(name) = lexer.name() {
        projection.format = name;
    }
    lexer.skip_ws();
    if lexer.peek() == Some('[') {
        parse_attrs(&mut lexer, &mut projection.attrs)?;
        lexer.skip_ws();
    }
    if lexer.eat('(') {
        projection.columns = parse_columns(&mut lexer)?;
        lexer.skip_ws();
    }
    if lexer.peek() == Some('[') {
        parse_attrs(&mut lexer, &mut projection.attrs)?;
        lexer.skip_ws();
    }
    if !lexer.is_eof() {
        return Err(lexer.error("unexpected character"));
    }
    Ok(projection)
}

fn parse_attrs(lexer: &mut Lexer<'_>, attrs: &mut Vec<(String, Option<String>)>) -> LexResult<()> {
    lexer.expect('[')?;
    loop {
        lexer.skip_ws();
        if lexer.eat(']') {
            return Ok(());
        }
        let Some(name) = lexer.name() else {
            return Err(lexer.error("expected an attribute name"));
        };
        lexer.skip_ws();
        let value = if lexer.eat('=') {
            lexer.skip_ws();
            Some(lexer.word(&[',', ']'])?)
        } else {
            None
        };
        // Later settings override earlier ones
        attrs.retain(|(n, _)| *n != name);
        attrs.push((name, value));
        lexer.skip_ws();
        if !lexer.eat(',') && lexer.peek() != Some(']') {
            return Err(lexer.error("expected [,] or []]"));
        }
    }
}

fn parse_columns(lexer: &mut Lexer<'_>) -> LexResult<Vec<Column>> {
    let mut columns = Vec::new();
    loop {
        lexer.skip_ws();
        if lexer.eat(')') {
            return Ok(columns);
        }
        columns.push(parse_column(lexer)?);
        lexer.skip_ws();
        if !lexer.eat(',') && lexer.peek() != Some(')') {
            return Err(lexer.error("expected [,] or [)]"));
        }
    }
}

fn parse_column(lexer: &mut Lexer<'_>) -> LexResult<Column> {
    let key = Key::parse_from(lexer)?;
    let mut column = Column::default();

    if key.is_empty() {
        column.transforms.push(parse_call(lexer)?);
    } else {
        column.key = Some(key);
    }
    while lexer.peek() == Some('.') {
        lexer.next_char();
        column.transforms.push(parse_call(lexer)?);
    }

    lexer.skip_ws();
    while lexer.eat(':') {
        let Some(attr) = lexer.name() else {
            return Err(lexer.error("expected a column attribute"));
        };
        match attr.as_str() {
            "label" => {
                lexer.expect('=')?;
                column.label = Some(lexer.word(&[',', ')', ':'])?);
            }
            "sort" => {
                lexer.expect('=')?;
                let n = lexer.word(&[',', ')', ':'])?;
                column.sort = Some(
                    n.parse()
                        .map_err(|_| format!("invalid sort order [{n}] in [{}]", lexer.source()))?,
                );
            }
            "width" => {
                lexer.expect('=')?;
                let n = lexer.word(&[',', ')', ':'])?;
                column.width = Some(
                    n.parse()
                        .map_err(|_| format!("invalid width [{n}] in [{}]", lexer.source()))?,
                );
            }
            "align" => {
                lexer.expect('=')?;
                column.align = match lexer.word(&[',', ')', ':'])?.as_str() {
                    "left" => Align::Left,
                    "center" => Align::Center,
                    "right" => Align::Right,
                    other => return Err(format!("unknown alignment [{other}]")),
                };
            }
            "reverse" | "desc" => column.descending = true,
            "asc" => column.descending = false,
            "wrap" => column.wrap = true,
            "optional" => column.optional = true,
            other => return Err(format!("unknown column attribute [{other}]")),
        }
        lexer.skip_ws();
    }
    Ok(column)
}

fn parse_call(lexer: &mut Lexer<'_>) -> LexResult<TransformCall> {
    let Some(name) = lexer.name() else {
        return Err(lexer.error("expected a key or transform"));
    };
    if !transforms::is_known(&name) {
        return Err(format!("unknown transform [{name}]"));
    }
    lexer.expect('(')?;

    let mut args = Vec::new();
    loop {
        lexer.skip_ws();
        if lexer.eat(')') {
            break;
        }
        args.push(parse_arg(lexer)?);
        lexer.skip_ws();
        if !lexer.eat(',') && lexer.peek() != Some(')') {
            return Err(lexer.error("expected [,] or [)]"));
        }
    }
    Ok(TransformCall { name, args })
}

fn parse_arg(lexer: &mut Lexer<'_>) -> LexResult<TransformArg> {
    if matches!(lexer.peek(), Some('\'') | Some('"')) {
        return Ok(TransformArg {
            name: None,
            value: lexer.quoted()?,
        });
    }
    let raw = lexer.until(&[',', ')'])?;
    let raw = raw.trim();
    if let Some((name, value)) = raw.split_once('=') {
        let name = name.trim();
        if !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Ok(TransformArg {
                name: Some(name.to_string()),
                value: value.trim().to_string(),
            });
        }
    }
    Ok(TransformArg {
        name: None,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_attrs_and_columns() {
        let p = parse(r#"table[box,title="Instances"](name, zone.basename():label=ZONE:sort=1, status:reverse)"#)
            .unwrap();
        assert_eq!(p.format, "table");
        assert_eq!(p.attr("title"), Some("Instances"));
        assert!(p.has_attr("box"));
        assert_eq!(p.columns.len(), 3);
        assert_eq!(p.columns[1].key.as_ref().unwrap().to_string(), "zone");
        assert_eq!(p.columns[1].transforms[0].name, "basename");
        assert_eq!(p.columns[1].label.as_deref(), Some("ZONE"));
        assert_eq!(p.columns[1].sort, Some(1));
        assert!(p.columns[2].descending);
    }

    #[test]
    fn test_transform_arguments() {
        let p = parse(r#"value(disks[].diskSizeGb.list(separator=";"), format("{0}/{1}", zone, name))"#).unwrap();
        let list = &p.columns[0].transforms[0];
        assert_eq!(list.arg("separator", 2), Some(";"));
        let format = &p.columns[1];
        assert!(format.key.is_none());
        assert_eq!(format.transforms[0].positional(), vec!["{0}/{1}", "zone", "name"]);
    }

    #[test]
    fn test_columns_without_format() {
        let p = parse("(name, status)").unwrap();
        assert_eq!(p.format, "");
        assert_eq!(p.columns.len(), 2);
        let p = parse("yaml").unwrap();
        assert!(p.columns.is_empty());
    }

    #[test]
    fn test_errors() {
        assert!(parse("table(name").is_err());
        assert!(parse("table(name.nosuch())").unwrap_err().contains("nosuch"));
        assert!(parse("table(name:bogus)").is_err());
        assert!(parse("table[box").is_err());
    }
}
