//! Parser for the textual form of compound property values.
//!
//! Accepted grammar (whitespace-insensitive):
//! value  := dict | list | tuple | string | number | True | False | None
//! dict   := '{' [ key ':' value { ',' key ':' value } [','] ] '}'
//! list   := '[' [ value { ',' value } [','] ] ']'
//! tuple  := '(' [ value { ',' value } [','] ] ')'
//! key    := string | number | True | False | None
//!
//! Example:
//! {'delimiter': ',', 'columns': ['a', 'b'], 'header': True}

use super::{Dict, PropertyValue};

/// Parse one literal value. Trailing non-whitespace is an error.
pub fn parse_literal(text: &str) -> Result<PropertyValue, String> {
    let mut p = Parser { src: text, pos: 0 };
    let value = p.value()?;
    p.skip_ws();
    if p.pos != p.src.len() {
        return Err(format!(
            "unexpected trailing input at byte {}: {:?}",
            p.pos,
            &p.src[p.pos..]
        ));
    }
    Ok(value)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn expect(&mut self, want: char) -> Result<(), String> {
        self.skip_ws();
        match self.bump() {
            Some(c) if c == want => Ok(()),
            Some(c) => Err(format!("expected {:?} at byte {}, found {:?}", want, self.pos - c.len_utf8(), c)),
            None => Err(format!("expected {:?}, found end of input", want)),
        }
    }

    fn value(&mut self) -> Result<PropertyValue, String> {
        self.skip_ws();
        match self.peek() {
            Some('{') => self.dict(),
            Some('[') => self.sequence('[', ']'),
            Some('(') => self.sequence('(', ')'),
            Some('\'') | Some('"') => self.string().map(PropertyValue::Str),
            Some(c) if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => self.number(),
            Some(c) if c.is_alphabetic() => self.keyword(),
            Some(c) => Err(format!("unexpected {:?} at byte {}", c, self.pos)),
            None => Err("unexpected end of input".to_string()),
        }
    }

    fn dict(&mut self) -> Result<PropertyValue, String> {
        self.expect('{')?;
        let mut out = Dict::new();
        loop {
            self.skip_ws();
            if self.peek() == Some('}') {
                self.bump();
                break;
            }
            let key = match self.value()? {
                PropertyValue::Str(s) => s,
                PropertyValue::Dict(_) | PropertyValue::List(_) => {
                    return Err(format!("unhashable dict key at byte {}", self.pos));
                }
                other => other.to_text(),
            };
            self.expect(':')?;
            let value = self.value()?;
            out.insert(key, value);

            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some('}') => break,
                Some(c) => return Err(format!("expected ',' or '}}' in dict, found {:?}", c)),
                None => return Err("unterminated dict".to_string()),
            }
        }
        Ok(PropertyValue::Dict(out))
    }

    fn sequence(&mut self, open: char, close: char) -> Result<PropertyValue, String> {
        self.expect(open)?;
        let mut out = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.bump();
                break;
            }
            out.push(self.value()?);

            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some(c) if c == close => break,
                Some(c) => {
                    return Err(format!("expected ',' or {:?} in sequence, found {:?}", close, c));
                }
                None => return Err("unterminated sequence".to_string()),
            }
        }
        Ok(PropertyValue::List(out))
    }

    fn string(&mut self) -> Result<String, String> {
        let quote = self.bump().ok_or("expected string")?;
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('0') => out.push('\0'),
                    Some(c) => out.push(c),
                    None => return Err("unterminated escape".to_string()),
                },
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
                None => return Err("unterminated string".to_string()),
            }
        }
    }

    fn number(&mut self) -> Result<PropertyValue, String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '.' | '_') {
                self.pos += 1;
            } else {
                break;
            }
        }
        let raw: String = self.src[start..self.pos].chars().filter(|c| *c != '_').collect();
        if let Ok(i) = raw.parse::<i64>() {
            return Ok(PropertyValue::Int(i));
        }
        match raw.as_str() {
            "inf" | "+inf" => return Ok(PropertyValue::Float(f64::INFINITY)),
            "-inf" => return Ok(PropertyValue::Float(f64::NEG_INFINITY)),
            _ => {}
        }
        raw.parse::<f64>()
            .map(PropertyValue::Float)
            .map_err(|_| format!("bad number {:?} at byte {}", raw, start))
    }

    fn keyword(&mut self) -> Result<PropertyValue, String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        match &self.src[start..self.pos] {
            "True" | "true" => Ok(PropertyValue::Bool(true)),
            "False" | "false" => Ok(PropertyValue::Bool(false)),
            "None" | "null" => Ok(PropertyValue::Null),
            other => Err(format!("unknown identifier {:?} at byte {}", other, start)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_nested_dict() {
        let v = parse_literal("{'a': 1, 'b': [1.5, 'x', None], \"c\": {'d': True}}").unwrap();
        let mut inner = Dict::new();
        inner.insert("d", PropertyValue::Bool(true));
        let mut want = Dict::new();
        want.insert("a".to_string(), PropertyValue::Int(1));
        want.insert(
            "b".to_string(),
            PropertyValue::List(vec![
                PropertyValue::Float(1.5),
                PropertyValue::Str("x".into()),
                PropertyValue::Null,
            ]),
        );
        want.insert("c".to_string(), PropertyValue::Dict(inner));
        assert_eq!(v, PropertyValue::Dict(want));
    }

    #[test]
    fn tuples_become_lists_and_trailing_commas_are_fine() {
        assert_eq!(
            parse_literal("(1, -2,)").unwrap(),
            PropertyValue::List(vec![PropertyValue::Int(1), PropertyValue::Int(-2)])
        );
        assert_eq!(parse_literal("[]").unwrap(), PropertyValue::List(vec![]));
    }

    #[test]
    fn escapes_in_strings() {
        assert_eq!(
            parse_literal(r"'a\'b\n'").unwrap(),
            PropertyValue::Str("a'b\n".into())
        );
    }

    #[test]
    fn rejects_code() {
        assert!(parse_literal("__import__('os')").is_err());
        assert!(parse_literal("[1, 2").is_err());
        assert!(parse_literal("1 2").is_err());
        assert!(parse_literal("{[1]: 2}").is_err());
    }
}
