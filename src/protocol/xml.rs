//! Minimal XML reader and writer covering the XML-RPC subset.
//!
//! Attributes are ignored, namespaces are not interpreted and only the five
//! predefined entities plus character references are decoded. Document type
//! declarations are rejected outright.

use crate::protocol::error::{ProtocolError, Result};
use crate::protocol::value::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;

pub(crate) const XML_DECLARATION: &str = "<?xml version=\"1.0\"?>\r\n";

/// Deepest array/struct nesting accepted by the decoder
pub const MAX_VALUE_DEPTH: usize = 64;

/// Value element names understood by the decoder
const VALUE_TYPES: [&str; 10] = [
    "i4",
    "int",
    "boolean",
    "string",
    "double",
    "dateTime.iso8601",
    "base64",
    "array",
    "struct",
    "nil",
];

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token<'a> {
    Open(&'a str),
    Close(&'a str),
    Empty(&'a str),
    Text(Cow<'a, str>),
}

/// Split a document into tags and decoded text runs.
pub(crate) fn tokenize(input: &str) -> Result<Vec<Token<'_>>> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < input.len() {
        let rest = &input[pos..];
        if !rest.starts_with('<') {
            let end = rest.find('<').unwrap_or(rest.len());
            tokens.push(Token::Text(decode_entities(&rest[..end], pos)?));
            pos += end;
            continue;
        }

        if let Some(body) = rest.strip_prefix("<?") {
            pos += 2 + find_terminator(body, "?>", pos)? + 2;
        } else if let Some(body) = rest.strip_prefix("<!--") {
            pos += 4 + find_terminator(body, "-->", pos)? + 3;
        } else if let Some(body) = rest.strip_prefix("<![CDATA[") {
            let end = find_terminator(body, "]]>", pos)?;
            tokens.push(Token::Text(Cow::Borrowed(&body[..end])));
            pos += 9 + end + 3;
        } else if rest.starts_with("<!") {
            return Err(malformed(
                pos,
                "document type declarations are not supported",
            ));
        } else {
            let end = find_terminator(rest, ">", pos)?;
            tokens.push(tag_token(&rest[1..end], pos)?);
            pos += end + 1;
        }
    }

    Ok(tokens)
}

fn tag_token(inner: &str, offset: usize) -> Result<Token<'_>> {
    if let Some(name) = inner.strip_prefix('/') {
        let name = name.trim_end();
        validate_name(name, offset)?;
        return Ok(Token::Close(name));
    }

    let (body, empty) = match inner.strip_suffix('/') {
        Some(body) => (body, true),
        None => (inner, false),
    };
    let name = body.split_whitespace().next().unwrap_or("");
    if body.starts_with(char::is_whitespace) {
        return Err(malformed(offset, "whitespace before element name"));
    }
    validate_name(name, offset)?;

    Ok(if empty {
        Token::Empty(name)
    } else {
        Token::Open(name)
    })
}

fn validate_name(name: &str, offset: usize) -> Result<()> {
    let invalid = |c: char| c.is_whitespace() || "<>&\"'=/".contains(c);
    if name.is_empty() || name.chars().any(invalid) {
        return Err(malformed(offset, format!("invalid element name {name:?}")));
    }
    Ok(())
}

fn find_terminator(haystack: &str, terminator: &str, offset: usize) -> Result<usize> {
    haystack
        .find(terminator)
        .ok_or_else(|| malformed(offset, format!("missing `{terminator}`")))
}

fn decode_entities(text: &str, offset: usize) -> Result<Cow<'_, str>> {
    if !text.contains('&') {
        return Ok(Cow::Borrowed(text));
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let semi = after
            .find(';')
            .ok_or_else(|| malformed(offset, "unterminated entity reference"))?;
        let entity = &after[..semi];
        let decoded = match entity {
            "lt" => '<',
            "gt" => '>',
            "amp" => '&',
            "quot" => '"',
            "apos" => '\'',
            _ => decode_char_ref(entity)
                .ok_or_else(|| malformed(offset, format!("unknown entity `&{entity};`")))?,
        };
        out.push(decoded);
        rest = &after[semi + 1..];
    }
    out.push_str(rest);

    Ok(Cow::Owned(out))
}

fn decode_char_ref(entity: &str) -> Option<char> {
    let reference = entity.strip_prefix('#')?;
    let hex = reference
        .strip_prefix('x')
        .or_else(|| reference.strip_prefix('X'));
    let code = match hex {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => reference.parse().ok()?,
    };
    char::from_u32(code)
}

fn malformed(offset: usize, reason: impl Into<String>) -> ProtocolError {
    ProtocolError::MalformedXml {
        offset,
        reason: reason.into(),
    }
}

fn unexpected(expected: String, found: Option<&Token<'_>>) -> ProtocolError {
    let found = match found {
        Some(Token::Open(name)) => format!("<{name}>"),
        Some(Token::Close(name)) => format!("</{name}>"),
        Some(Token::Empty(name)) => format!("<{name}/>"),
        Some(Token::Text(text)) => {
            let preview: String = text.chars().take(32).collect();
            format!("text {preview:?}")
        }
        None => "end of document".to_string(),
    };
    ProtocolError::UnexpectedElement { expected, found }
}

/// Cursor over a tokenized document.
pub(crate) struct Reader<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
    depth: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(input: &'a str) -> Result<Self> {
        Ok(Self {
            tokens: tokenize(input)?,
            pos: 0,
            depth: 0,
        })
    }

    fn skip_whitespace(&mut self) {
        while let Some(Token::Text(text)) = self.tokens.get(self.pos) {
            if !text.trim().is_empty() {
                break;
            }
            self.pos += 1;
        }
    }

    /// Name of the next start or self-closing tag, skipping whitespace.
    pub(crate) fn peek_element(&mut self) -> Option<&'a str> {
        self.skip_whitespace();
        match self.tokens.get(self.pos) {
            Some(Token::Open(name)) | Some(Token::Empty(name)) => Some(*name),
            _ => None,
        }
    }

    /// Consume the start tag `name`. Returns false when the element was
    /// self-closing and therefore has no content or end tag.
    pub(crate) fn open(&mut self, name: &str) -> Result<bool> {
        self.skip_whitespace();
        match self.tokens.get(self.pos) {
            Some(Token::Open(found)) if *found == name => {
                self.pos += 1;
                Ok(true)
            }
            Some(Token::Empty(found)) if *found == name => {
                self.pos += 1;
                Ok(false)
            }
            other => Err(unexpected(format!("<{name}>"), other)),
        }
    }

    pub(crate) fn close(&mut self, name: &str) -> Result<()> {
        self.skip_whitespace();
        match self.tokens.get(self.pos) {
            Some(Token::Close(found)) if *found == name => {
                self.pos += 1;
                Ok(())
            }
            other => Err(unexpected(format!("</{name}>"), other)),
        }
    }

    /// Text up to the end tag `name`, which is consumed as well.
    pub(crate) fn text(&mut self, name: &str) -> Result<String> {
        let mut text = String::new();
        while let Some(Token::Text(chunk)) = self.tokens.get(self.pos) {
            text.push_str(chunk);
            self.pos += 1;
        }
        match self.tokens.get(self.pos) {
            Some(Token::Close(found)) if *found == name => {
                self.pos += 1;
                Ok(text)
            }
            other => Err(unexpected(format!("</{name}>"), other)),
        }
    }

    pub(crate) fn finish(&mut self) -> Result<()> {
        self.skip_whitespace();
        match self.tokens.get(self.pos) {
            None => Ok(()),
            other => Err(unexpected("end of document".to_string(), other)),
        }
    }

    /// Parse a complete `<value>` element.
    pub(crate) fn value(&mut self) -> Result<Value> {
        if self.depth >= MAX_VALUE_DEPTH {
            return Err(ProtocolError::NestingTooDeep {
                limit: MAX_VALUE_DEPTH,
            });
        }

        self.depth += 1;
        let value = self.nested_value();
        self.depth -= 1;
        value
    }

    fn nested_value(&mut self) -> Result<Value> {
        if !self.open("value")? {
            return Ok(Value::String(String::new()));
        }

        let start = self.pos;
        match self.peek_element() {
            Some(kind) => {
                let value = self.typed_value(kind)?;
                self.close("value")?;
                Ok(value)
            }
            None => {
                // Untyped content is a string, surrounding whitespace included.
                self.pos = start;
                Ok(Value::String(self.text("value")?))
            }
        }
    }

    fn typed_value(&mut self, kind: &str) -> Result<Value> {
        if !VALUE_TYPES.contains(&kind) {
            return Err(ProtocolError::UnknownType(kind.to_string()));
        }

        let has_content = self.open(kind)?;
        match kind {
            "array" => self.array(has_content),
            "struct" => self.structure(has_content),
            "nil" => {
                if has_content {
                    self.close(kind)?;
                }
                Ok(Value::Nil)
            }
            _ => {
                let text = if has_content {
                    self.text(kind)?
                } else {
                    String::new()
                };
                scalar(kind, text)
            }
        }
    }

    fn array(&mut self, has_content: bool) -> Result<Value> {
        let mut items = Vec::new();
        if !has_content {
            return Ok(Value::Array(items));
        }

        if self.open("data")? {
            while self.peek_element() == Some("value") {
                items.push(self.value()?);
            }
            self.close("data")?;
        }
        self.close("array")?;

        Ok(Value::Array(items))
    }

    fn structure(&mut self, has_content: bool) -> Result<Value> {
        let mut members = BTreeMap::new();
        if !has_content {
            return Ok(Value::Struct(members));
        }

        while self.peek_element() == Some("member") {
            self.open("member")?;
            let name = if self.open("name")? {
                self.text("name")?
            } else {
                String::new()
            };
            let value = self.value()?;
            self.close("member")?;
            members.insert(name, value);
        }
        self.close("struct")?;

        Ok(Value::Struct(members))
    }
}

fn scalar(kind: &str, text: String) -> Result<Value> {
    match kind {
        "string" => Ok(Value::String(text)),
        "i4" | "int" => text
            .trim()
            .parse()
            .map(Value::Int)
            .map_err(|_| invalid_scalar("int", text)),
        "boolean" => {
            let flag = match text.trim() {
                "0" => Some(false),
                "1" => Some(true),
                _ => None,
            };
            flag.map(Value::Boolean)
                .ok_or_else(|| invalid_scalar("boolean", text))
        }
        "double" => text
            .trim()
            .parse()
            .map(Value::Double)
            .map_err(|_| invalid_scalar("double", text)),
        "dateTime.iso8601" => Ok(Value::DateTime(text.trim().to_string())),
        "base64" => Ok(Value::Base64(text.split_whitespace().collect())),
        other => Err(ProtocolError::UnknownType(other.to_string())),
    }
}

fn invalid_scalar(kind: &'static str, text: String) -> ProtocolError {
    ProtocolError::InvalidScalar { kind, text }
}

/// Append `text` with markup characters escaped. Carriage returns are
/// written as character references so they survive line-end normalization.
pub(crate) fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(c),
        }
    }
}

fn write_scalar(out: &mut String, tag: &str, text: &str) {
    out.push('<');
    out.push_str(tag);
    out.push('>');
    escape_into(out, text);
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

/// Append a complete `<value>` element.
pub(crate) fn write_value(out: &mut String, value: &Value) {
    out.push_str("<value>");
    match value {
        Value::Int(n) => write_scalar(out, "int", &n.to_string()),
        Value::Boolean(b) => write_scalar(out, "boolean", if *b { "1" } else { "0" }),
        Value::String(s) => write_scalar(out, "string", s),
        Value::Double(d) => write_scalar(out, "double", &format!("{d:?}")),
        Value::DateTime(s) => write_scalar(out, "dateTime.iso8601", s),
        Value::Base64(s) => write_scalar(out, "base64", s),
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                write_value(out, item);
            }
            out.push_str("</data></array>");
        }
        Value::Struct(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                out.push_str("<member>");
                write_scalar(out, "name", name);
                write_value(out, member);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
        Value::Nil => out.push_str("<nil/>"),
    }
    out.push_str("</value>");
}
