// Mortar Build Automation
// Copyright (C) 2026 Mortar Contributors
//
// This program is licensed under the GPLv3.0 license (https://github.com/mortar-build/mortar/blob/main/COPYING)

use std::collections::HashMap;
use std::error::Error;
use std::fmt;

/// A define value, as parsed from a `-D name=value` argument or received
/// from a parent build script.
///
/// Values serialize back into the same literal form they were parsed from,
/// so a store can be handed to a child build-script process losslessly.
#[derive(Clone, Debug)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    List(Vec<Value>),
    Set(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Tuple(Vec<Value>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        use Value::*;
        match (self, other) {
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Bool(a), Bool(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (List(a), List(b)) => a == b,
            (Tuple(a), Tuple(b)) => a == b,
            // Sets and maps compare by membership, not by element order
            (Set(a), Set(b)) => a.len() == b.len() && a.iter().all(|v| b.contains(v)),
            (Map(a), Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.iter().any(|(k2, v2)| k2 == k && v2 == v))
            }
            _ => false,
        }
    }
}

fn write_str_literal(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in s.chars() {
        match c {
            '\\' => f.write_str("\\\\")?,
            '"' => f.write_str("\\\"")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            c => write!(f, "{}", c)?,
        }
    }
    f.write_str("\"")
}

fn write_seq(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            // The debug formatter keeps a decimal point or exponent, so the
            // value re-parses as a float rather than an integer
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Str(s) => write_str_literal(f, s),
            Value::List(items) => {
                f.write_str("[")?;
                write_seq(f, items)?;
                f.write_str("]")
            }
            Value::Set(items) => {
                f.write_str("{")?;
                write_seq(f, items)?;
                f.write_str("}")
            }
            Value::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
            Value::Tuple(items) => {
                f.write_str("(")?;
                write_seq(f, items)?;
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
        }
    }
}

#[derive(Debug)]
pub struct DefineParseError {
    pub message: String,
}

impl Error for DefineParseError {}
impl fmt::Display for DefineParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(text: &str) -> Parser {
        Parser {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, message: &str) -> DefineParseError {
        DefineParseError {
            message: format!("{} (at offset {})", message, self.pos),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_ws(&mut self) {
        while self.peek().map(|c| c.is_whitespace()).unwrap_or(false) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), DefineParseError> {
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(self.error(&format!("expected '{}', found '{}'", expected, c))),
            None => Err(self.error(&format!("expected '{}', found end of input", expected))),
        }
    }

    fn parse_value(&mut self) -> Result<Value, DefineParseError> {
        self.skip_ws();
        match self.peek() {
            None => Err(self.error("expected a value, found end of input")),
            Some('[') => self.parse_list(),
            Some('(') => self.parse_tuple(),
            Some('{') => self.parse_braced(),
            Some('"') => self.parse_string('"'),
            Some('\'') => self.parse_string('\''),
            Some(c) if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => {
                self.parse_number()
            }
            Some(c) if c.is_ascii_alphabetic() => self.parse_keyword(),
            Some(c) => Err(self.error(&format!("unexpected character '{}'", c))),
        }
    }

    fn parse_keyword(&mut self) -> Result<Value, DefineParseError> {
        let start = self.pos;
        while self
            .peek()
            .map(|c| c.is_ascii_alphanumeric() || c == '_')
            .unwrap_or(false)
        {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(self.error(&format!("unknown identifier \"{}\"", word))),
        }
    }

    fn parse_number(&mut self) -> Result<Value, DefineParseError> {
        let start = self.pos;
        if matches!(self.peek(), Some('-') | Some('+')) {
            self.pos += 1;
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' => self.pos += 1,
                '.' => {
                    is_float = true;
                    self.pos += 1;
                }
                'e' | 'E' => {
                    is_float = true;
                    self.pos += 1;
                    if matches!(self.peek(), Some('-') | Some('+')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if is_float {
            text.parse::<f64>()
                .map(Value::Float)
                .map_err(|_| self.error(&format!("invalid float literal \"{}\"", text)))
        } else {
            text.parse::<i64>()
                .map(Value::Int)
                .map_err(|_| self.error(&format!("invalid integer literal \"{}\"", text)))
        }
    }

    fn parse_string(&mut self, quote: char) -> Result<Value, DefineParseError> {
        self.expect(quote)?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string literal")),
                Some(c) if c == quote => break,
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('0') => out.push('\0'),
                    Some('\\') => out.push('\\'),
                    Some('\'') => out.push('\''),
                    Some('"') => out.push('"'),
                    Some(c) => {
                        return Err(self.error(&format!("invalid escape sequence \"\\{}\"", c)))
                    }
                    None => return Err(self.error("unterminated string literal")),
                },
                Some(c) => out.push(c),
            }
        }
        Ok(Value::Str(out))
    }

    // Comma-separated values up to (but not consuming) `close`.  Allows a
    // trailing comma.
    fn parse_items(&mut self, close: char) -> Result<Vec<Value>, DefineParseError> {
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                break;
            }
            items.push(self.parse_value()?);
            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.pos += 1;
                }
                Some(c) if c == close => break,
                _ => return Err(self.error(&format!("expected ',' or '{}'", close))),
            }
        }
        Ok(items)
    }

    fn parse_list(&mut self) -> Result<Value, DefineParseError> {
        self.expect('[')?;
        let items = self.parse_items(']')?;
        self.expect(']')?;
        Ok(Value::List(items))
    }

    fn parse_tuple(&mut self) -> Result<Value, DefineParseError> {
        self.expect('(')?;
        self.skip_ws();
        if self.peek() == Some(')') {
            self.pos += 1;
            return Ok(Value::Tuple(Vec::new()));
        }
        let first = self.parse_value()?;
        self.skip_ws();
        match self.peek() {
            // A parenthesized value with no comma is just the value
            Some(')') => {
                self.pos += 1;
                Ok(first)
            }
            Some(',') => {
                self.pos += 1;
                let mut items = vec![first];
                items.extend(self.parse_items(')')?);
                self.expect(')')?;
                Ok(Value::Tuple(items))
            }
            _ => Err(self.error("expected ',' or ')'")),
        }
    }

    // `{}` is an empty map; whether a non-empty braced literal is a set or a
    // map is decided by the presence of ':' after the first member.
    fn parse_braced(&mut self) -> Result<Value, DefineParseError> {
        self.expect('{')?;
        self.skip_ws();
        if self.peek() == Some('}') {
            self.pos += 1;
            return Ok(Value::Map(Vec::new()));
        }
        let first = self.parse_value()?;
        self.skip_ws();
        if self.peek() == Some(':') {
            self.pos += 1;
            let first_val = self.parse_value()?;
            let mut entries = vec![(first, first_val)];
            loop {
                self.skip_ws();
                match self.peek() {
                    Some('}') => {
                        self.pos += 1;
                        break;
                    }
                    Some(',') => {
                        self.pos += 1;
                        self.skip_ws();
                        if self.peek() == Some('}') {
                            self.pos += 1;
                            break;
                        }
                        let key = self.parse_value()?;
                        self.skip_ws();
                        self.expect(':')?;
                        let val = self.parse_value()?;
                        match entries.iter_mut().find(|(k, _)| *k == key) {
                            Some(entry) => entry.1 = val,
                            None => entries.push((key, val)),
                        }
                    }
                    _ => return Err(self.error("expected ',' or '}'")),
                }
            }
            Ok(Value::Map(entries))
        } else {
            let mut items = vec![first];
            match self.peek() {
                Some('}') => {
                    self.pos += 1;
                }
                Some(',') => {
                    self.pos += 1;
                    for item in self.parse_items('}')? {
                        if !items.contains(&item) {
                            items.push(item);
                        }
                    }
                    self.expect('}')?;
                }
                _ => return Err(self.error("expected ',' or '}'")),
            }
            Ok(Value::Set(items))
        }
    }
}

/// Parse a single literal value, e.g. `[1, 2.5, "three"]`.
pub fn parse_value(text: &str) -> Result<Value, DefineParseError> {
    let mut parser = Parser::new(text);
    let value = parser.parse_value()?;
    parser.skip_ws();
    if parser.peek().is_some() {
        return Err(parser.error("trailing characters after value"));
    }
    Ok(value)
}

/// Named values passed to a build script with `-D` and exported to child
/// build scripts.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DefineStore {
    values: HashMap<String, Value>,
}

impl DefineStore {
    pub fn new() -> DefineStore {
        DefineStore::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Merge all entries of `other` into this store, overwriting entries
    /// with the same name.
    pub fn merge(&mut self, other: DefineStore) {
        for (name, value) in other.values {
            self.values.insert(name, value);
        }
    }

    /// Add a define from a command-line token of the form `name` or
    /// `name=value`.  A bare `name` maps to boolean true.
    pub fn add_arg(&mut self, token: &str) -> Result<(), DefineParseError> {
        let (name, value) = match token.split_once('=') {
            Some((name, value_text)) => {
                let name = name.trim();
                let value = parse_value(value_text).map_err(|e| DefineParseError {
                    message: format!(
                        "Error parsing define value of \"{}\": {}",
                        name, e.message
                    ),
                })?;
                (name, value)
            }
            None => (token.trim(), Value::Bool(true)),
        };
        if name.is_empty() {
            return Err(DefineParseError {
                message: format!("Empty define name in argument \"{}\"", token),
            });
        }
        self.values.insert(name.to_owned(), value);
        Ok(())
    }

    /// Serialize the store as a single-line mapping literal.  Keys are
    /// emitted in sorted order so the output is reproducible.
    pub fn serialize(&self) -> String {
        let mut names: Vec<&String> = self.values.keys().collect();
        names.sort();
        let entries = names
            .into_iter()
            .map(|name| {
                let key = Value::Str(name.clone());
                format!("{}: {}", key, self.values[name])
            })
            .collect::<Vec<String>>()
            .join(", ");
        format!("{{{}}}", entries)
    }

    /// Parse a store from the mapping literal produced by `serialize`.
    pub fn parse(text: &str) -> Result<DefineStore, DefineParseError> {
        let value = parse_value(text)?;
        let entries = match value {
            Value::Map(entries) => entries,
            other => {
                return Err(DefineParseError {
                    message: format!("Expected a mapping of defines, found {}", other),
                })
            }
        };
        let mut store = DefineStore::new();
        for (key, val) in entries {
            match key {
                Value::Str(name) => store.set(name, val),
                other => {
                    return Err(DefineParseError {
                        message: format!("Define names must be strings, found {}", other),
                    })
                }
            }
        }
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scalars() {
        assert_eq!(parse_value("42").unwrap(), Value::Int(42));
        assert_eq!(parse_value("-7").unwrap(), Value::Int(-7));
        assert_eq!(parse_value("2.5").unwrap(), Value::Float(2.5));
        assert_eq!(parse_value("1e3").unwrap(), Value::Float(1000.0));
        assert_eq!(parse_value("true").unwrap(), Value::Bool(true));
        assert_eq!(parse_value("false").unwrap(), Value::Bool(false));
        assert_eq!(
            parse_value("\"hello\"").unwrap(),
            Value::Str(String::from("hello"))
        );
        assert_eq!(
            parse_value("'it\\'s'").unwrap(),
            Value::Str(String::from("it's"))
        );
    }

    #[test]
    fn test_parse_composites() {
        assert_eq!(
            parse_value("[1, 2, \"x\"]").unwrap(),
            Value::List(vec![
                Value::Int(1),
                Value::Int(2),
                Value::Str(String::from("x"))
            ])
        );
        assert_eq!(
            parse_value("(1, 2)").unwrap(),
            Value::Tuple(vec![Value::Int(1), Value::Int(2)])
        );
        assert_eq!(
            parse_value("(1,)").unwrap(),
            Value::Tuple(vec![Value::Int(1)])
        );
        assert_eq!(parse_value("()").unwrap(), Value::Tuple(vec![]));
        assert_eq!(
            parse_value("{1, 2}").unwrap(),
            Value::Set(vec![Value::Int(1), Value::Int(2)])
        );
        assert_eq!(
            parse_value("{\"a\": 1, \"b\": [2]}").unwrap(),
            Value::Map(vec![
                (Value::Str(String::from("a")), Value::Int(1)),
                (
                    Value::Str(String::from("b")),
                    Value::List(vec![Value::Int(2)])
                ),
            ])
        );
        assert_eq!(parse_value("{}").unwrap(), Value::Map(vec![]));
    }

    #[test]
    fn test_parenthesized_value_is_not_a_tuple() {
        assert_eq!(parse_value("(5)").unwrap(), Value::Int(5));
    }

    #[test]
    fn test_trailing_comma() {
        assert_eq!(
            parse_value("[1, 2,]").unwrap(),
            Value::List(vec![Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn test_set_membership_equality() {
        assert_eq!(
            parse_value("{1, 2, 3}").unwrap(),
            Value::Set(vec![Value::Int(3), Value::Int(2), Value::Int(1)])
        );
    }

    #[test]
    fn test_parse_rejects_malformed_literals() {
        assert!(parse_value("").is_err());
        assert!(parse_value("[1, 2").is_err());
        assert!(parse_value("1 2").is_err());
        assert!(parse_value("{1: }").is_err());
        assert!(parse_value("\"unterminated").is_err());
        assert!(parse_value("frob").is_err());
        assert!(parse_value("[frob]").is_err());
    }

    #[test]
    fn test_serialize_round_trip() {
        let values = vec![
            Value::Int(-12),
            Value::Float(3.25),
            Value::Float(1e100),
            Value::Bool(true),
            Value::Str(String::from("a \"quoted\"\nline")),
            Value::List(vec![
                Value::Int(1),
                Value::Tuple(vec![Value::Str(String::from("x")), Value::Float(0.5)]),
            ]),
            Value::Set(vec![Value::Int(1), Value::Str(String::from("two"))]),
            Value::Map(vec![
                (Value::Str(String::from("k")), Value::List(vec![])),
                (Value::Int(9), Value::Bool(false)),
            ]),
            Value::Tuple(vec![Value::Int(1)]),
            Value::Tuple(vec![]),
        ];

        for value in values {
            let text = value.to_string();
            let reparsed = parse_value(&text)
                .unwrap_or_else(|e| panic!("failed to re-parse \"{}\": {}", text, e));
            assert_eq!(reparsed, value, "round trip through \"{}\"", text);
        }
    }

    #[test]
    fn test_add_arg() {
        let mut store = DefineStore::new();
        store.add_arg("FLAG").unwrap();
        store.add_arg("VER=[1, 2, \"x\"]").unwrap();
        assert_eq!(store.get("FLAG"), Some(&Value::Bool(true)));
        assert_eq!(
            store.get("VER"),
            Some(&Value::List(vec![
                Value::Int(1),
                Value::Int(2),
                Value::Str(String::from("x"))
            ]))
        );

        assert!(store.add_arg("BAD=[oops").is_err());
        assert!(store.add_arg("=1").is_err());
    }

    #[test]
    fn test_store_round_trip() {
        let mut store = DefineStore::new();
        store.add_arg("VER=[1, 2, \"x\"]").unwrap();
        store.add_arg("DEBUG").unwrap();
        store.set("NAME", Value::Str(String::from("mortar")));
        store.set(
            "OPTS",
            Value::Map(vec![(
                Value::Str(String::from("level")),
                Value::Int(3),
            )]),
        );

        let wire = store.serialize();
        assert!(!wire.contains('\n'));
        let reparsed = DefineStore::parse(&wire).unwrap();
        assert_eq!(reparsed, store);
    }

    #[test]
    fn test_parse_store_rejects_non_mapping() {
        assert!(DefineStore::parse("[1, 2]").is_err());
        assert!(DefineStore::parse("{1: 2}").is_err());
    }
}
