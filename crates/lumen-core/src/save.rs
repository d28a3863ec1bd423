//! Textual save/restore codec for value graphs
//!
//! Grammar (values):
//!
//! ```text
//! int       42
//! float     3.25
//! string    "esc\"aped"
//! array     ({v,v})
//! mapping   ([k:v,k:v])
//! lwobject  (*"<source-name> <name,name>",v,v*)
//! backref   <N>
//! ```
//!
//! Every aggregate gets an implicit index in document order; a repeated or
//! cyclic referent is emitted as `<N>` pointing at the N-th opened
//! aggregate, so shared identity survives a round trip. Mappings are
//! emitted with sorted keys for deterministic output. Trailing commas are
//! accepted on input everywhere and never emitted.
//!
//! Restoring an lwobject resolves its blueprint (stripping a `.c` suffix
//! from the saved source name), allocates through the context so the UID
//! hook runs, populates slots by saved variable name (unknown names are
//! dropped, absent names keep their defaults, duplicates last-writer-wins)
//! and then invokes the restore hook, inner instances before outer ones.

use crate::context::Context;
use crate::error::{LwError, LwResult};
use crate::instance::LwoRef;
use crate::value::{ArrayRef, MapKey, MappingRef, Value};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Serialize a value graph to its textual form
pub fn save_value(value: &Value) -> LwResult<String> {
    let mut saver = Saver {
        ids: FxHashMap::default(),
        next_id: 0,
    };
    let mut out = String::new();
    saver.write_value(&mut out, value)?;
    Ok(out)
}

/// Rebuild a value graph from its textual form
pub fn restore_value(ctx: &Context, text: &str) -> LwResult<Value> {
    let mut parser = Parser::new(ctx, text);
    match parser.parse_document() {
        Ok(value) => Ok(value),
        Err(e) => {
            // Unwind every instance born during the failed parse so no
            // registration outlives the error.
            for lwo in &parser.restored {
                ctx.discard(lwo);
            }
            Err(e)
        }
    }
}

/// Append `s` to `out` with codec escaping applied
pub(crate) fn escape_into(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
}

struct Saver {
    ids: FxHashMap<usize, u32>,
    next_id: u32,
}

impl Saver {
    fn write_value(&mut self, out: &mut String, value: &Value) -> LwResult<()> {
        // Aggregates: first encounter claims the next document-order index,
        // every later encounter emits a back-reference to it.
        if let Some(key) = value.identity() {
            if let Some(id) = self.ids.get(&key) {
                out.push_str(&format!("<{}>", id));
                return Ok(());
            }
            self.next_id += 1;
            self.ids.insert(key, self.next_id);
        }
        match value {
            Value::Int(i) => out.push_str(&i.to_string()),
            Value::Float(x) => {
                if !x.is_finite() {
                    return Err(LwError::Runtime(
                        "cannot save non-finite float".to_string(),
                    ));
                }
                out.push_str(&format!("{:?}", x));
            }
            Value::Str(s) => {
                out.push('"');
                escape_into(out, s);
                out.push('"');
            }
            Value::Array(a) => {
                let items = a.read().clone();
                out.push_str("({");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    self.write_value(out, item)?;
                }
                out.push_str("})");
            }
            Value::Mapping(m) => {
                let mut pairs: Vec<(MapKey, Value)> =
                    m.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                pairs.sort_by(|a, b| a.0.cmp(&b.0));
                out.push_str("([");
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    self.write_value(out, &Value::from(k.clone()))?;
                    out.push(':');
                    self.write_value(out, v)?;
                }
                out.push_str("])");
            }
            Value::Lwo(lwo) => {
                let names = lwo
                    .program()
                    .var_names()
                    .iter()
                    .map(|n| n.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                let header = format!("{} {}", lwo.program_name(), names);
                out.push_str("(*\"");
                escape_into(out, &header);
                out.push('"');
                for var in lwo.snapshot_vars() {
                    out.push(',');
                    self.write_value(out, &var)?;
                }
                out.push_str("*)");
            }
        }
        Ok(())
    }
}

/// Single-pass cursor parser, byte oriented
struct Parser<'a> {
    ctx: &'a Context,
    bytes: &'a [u8],
    input: &'a str,
    pos: usize,
    /// Aggregates in open order; back-reference targets
    shared: Vec<Value>,
    /// Every instance allocated during this parse
    restored: Vec<LwoRef>,
}

impl<'a> Parser<'a> {
    fn new(ctx: &'a Context, input: &'a str) -> Self {
        Self {
            ctx,
            bytes: input.as_bytes(),
            input,
            pos: 0,
            shared: Vec::new(),
            restored: Vec::new(),
        }
    }

    fn parse_document(&mut self) -> LwResult<Value> {
        let value = self.parse_value()?;
        self.skip_whitespace();
        if self.pos != self.bytes.len() {
            return Err(LwError::parse(self.pos, "trailing characters"));
        }
        Ok(value)
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn consume(&mut self, literal: &str) -> bool {
        if self.input[self.pos..].starts_with(literal) {
            self.pos += literal.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, literal: &str) -> LwResult<()> {
        if self.consume(literal) {
            Ok(())
        } else {
            Err(LwError::parse(self.pos, format!("expected '{}'", literal)))
        }
    }

    fn parse_value(&mut self) -> LwResult<Value> {
        self.skip_whitespace();
        match self.peek() {
            None => Err(LwError::parse(self.pos, "unexpected end of input")),
            Some(b'"') => {
                let s = self.parse_string_literal()?;
                Ok(Value::string(s))
            }
            Some(b'<') => self.parse_backref(),
            Some(b'(') => match self.bytes.get(self.pos + 1) {
                Some(b'{') => self.parse_array(),
                Some(b'[') => self.parse_mapping(),
                Some(b'*') => self.parse_lwobject(),
                _ => Err(LwError::parse(self.pos, "malformed aggregate opener")),
            },
            Some(b'-') | Some(b'0'..=b'9') => self.parse_number(),
            Some(c) => Err(LwError::parse(
                self.pos,
                format!("unexpected character '{}'", c as char),
            )),
        }
    }

    fn parse_number(&mut self) -> LwResult<Value> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                b'0'..=b'9' => self.pos += 1,
                b'.' | b'e' | b'E' => {
                    is_float = true;
                    self.pos += 1;
                    // Exponent sign.
                    if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
        let text = &self.input[start..self.pos];
        if is_float {
            text.parse::<f64>()
                .map(Value::Float)
                .map_err(|_| LwError::parse(start, format!("bad float literal '{}'", text)))
        } else {
            text.parse::<i64>()
                .map(Value::Int)
                .map_err(|_| LwError::parse(start, format!("bad integer literal '{}'", text)))
        }
    }

    fn parse_string_literal(&mut self) -> LwResult<String> {
        self.expect("\"")?;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(LwError::parse(self.pos, "unterminated string")),
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(b'\\') => {
                    self.pos += 1;
                    match self.peek() {
                        None => return Err(LwError::parse(self.pos, "unterminated escape")),
                        Some(b'n') => out.push('\n'),
                        Some(b't') => out.push('\t'),
                        Some(b'r') => out.push('\r'),
                        Some(c) => out.push(c as char),
                    }
                    self.pos += 1;
                }
                Some(_) => {
                    // Multi-byte characters pass through untouched.
                    match self.input[self.pos..].chars().next() {
                        Some(c) => {
                            out.push(c);
                            self.pos += c.len_utf8();
                        }
                        None => return Err(LwError::parse(self.pos, "unterminated string")),
                    }
                }
            }
        }
    }

    fn parse_backref(&mut self) -> LwResult<Value> {
        let start = self.pos;
        self.expect("<")?;
        let digits_start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        let n: usize = self.input[digits_start..self.pos]
            .parse()
            .map_err(|_| LwError::parse(start, "bad back-reference"))?;
        self.expect(">")?;
        n.checked_sub(1)
            .and_then(|i| self.shared.get(i))
            .cloned()
            .ok_or_else(|| LwError::parse(start, format!("unknown back-reference <{}>", n)))
    }

    fn parse_array(&mut self) -> LwResult<Value> {
        self.expect("({")?;
        let array: ArrayRef = Arc::new(RwLock::new(Vec::new()));
        self.shared.push(Value::Array(array.clone()));
        loop {
            self.skip_whitespace();
            if self.consume("})") {
                break;
            }
            let item = self.parse_value()?;
            array.write().push(item);
            self.skip_whitespace();
            if self.consume(",") {
                continue;
            }
            self.expect("})")?;
            break;
        }
        Ok(Value::Array(array))
    }

    fn parse_mapping(&mut self) -> LwResult<Value> {
        self.expect("([")?;
        let mapping: MappingRef = Arc::new(RwLock::new(FxHashMap::default()));
        self.shared.push(Value::Mapping(mapping.clone()));
        loop {
            self.skip_whitespace();
            if self.consume("])") {
                break;
            }
            let key_pos = self.pos;
            let key_value = self.parse_value()?;
            let key = MapKey::try_from(&key_value)
                .map_err(|_| LwError::parse(key_pos, "mapping key must be a scalar"))?;
            self.skip_whitespace();
            self.expect(":")?;
            let value = self.parse_value()?;
            mapping.write().insert(key, value);
            self.skip_whitespace();
            if self.consume(",") {
                continue;
            }
            self.expect("])")?;
            break;
        }
        Ok(Value::Mapping(mapping))
    }

    fn parse_lwobject(&mut self) -> LwResult<Value> {
        self.expect("(*")?;
        self.skip_whitespace();
        let header_pos = self.pos;
        let header = self.parse_string_literal()?;
        let (source, names_text) = header
            .split_once(' ')
            .unwrap_or((header.as_str(), ""));
        let path = source.strip_suffix(".c").unwrap_or(source);
        let names: Vec<&str> = names_text.split(',').filter(|n| !n.is_empty()).collect();
        if source.is_empty() {
            return Err(LwError::parse(header_pos, "empty blueprint header"));
        }

        let program = self.ctx.programs().resolve(path)?;
        let lwo = self.ctx.alloc_instance(&program)?;
        self.shared.push(Value::Lwo(lwo.clone()));
        self.restored.push(lwo.clone());

        let mut index = 0usize;
        loop {
            self.skip_whitespace();
            if self.consume("*)") {
                break;
            }
            self.expect(",")?;
            self.skip_whitespace();
            if self.consume("*)") {
                break;
            }
            let value = self.parse_value()?;
            // Populate by saved name; drift against the current layout is
            // tolerated (unknown names dropped, type mismatches left at
            // their defaults, duplicates last-writer-wins).
            if let Some(name) = names.get(index) {
                if let Some(slot) = program.var_index(name) {
                    if program.check_type(slot, &value) {
                        lwo.set_slot(slot, value);
                    }
                }
            }
            index += 1;
        }

        self.ctx
            .run_hook(self.ctx.restore_hook(), &lwo, &[])
            .map_err(|e| LwError::Restore(e.to_string()))?;
        Ok(Value::Lwo(lwo))
    }
}
