//! Recursive descent parser for selector signatures.
//!
//! Grammar:
//!
//! ```text
//! S        = simple-complex
//! complex  = (simple '.')? NONSIMPLE ('.' NONSIMPLE)* ('.' simple)?
//! group    = '[' simple-complex (',' simple-complex)* ']'
//! simple   = field ('.' field)*
//! vector   = ('+' | '-' | e) '{' field ('.' field)* '}'
//! ```
//!
//! `+` marks an add selector, `-` a delete selector, and a bare brace pair
//! selects changed elements.

use crate::ast::{FieldAction, Selector};
use crate::error::{SfsError, SfsResult};

/// Cursor-based parser over a selector signature.
pub struct SelectorParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> SelectorParser<'a> {
    /// Create a new parser.
    #[must_use]
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    /// Parse the full signature.
    pub fn parse(&mut self) -> SfsResult<Selector> {
        self.skip_whitespace();
        if self.pos >= self.input.len() {
            return Err(self.err("empty selector"));
        }
        let selector = self.parse_simple_complex()?;
        self.skip_whitespace();
        if self.pos < self.input.len() {
            return Err(self.err(format!(
                "unexpected trailing input '{}'",
                &self.input[self.pos..]
            )));
        }
        Ok(selector)
    }

    /// Parse a `simple-complex`: either a plain field path or a complex
    /// chain with vector/group segments.
    fn parse_simple_complex(&mut self) -> SfsResult<Selector> {
        self.skip_whitespace();
        let mut parts = Vec::new();

        // Optional leading simple.
        if self.at_field_start() {
            let simple = Selector::Simple(self.parse_simple()?);
            if !self.at_char('.') {
                return Ok(simple);
            }
            parts.push(simple);
            self.pos += 1;
        }

        // At least one vector or group segment.
        parts.push(self.parse_nonsimple()?);
        while self.try_consume_char('.') {
            if self.at_nonsimple_start() {
                parts.push(self.parse_nonsimple()?);
            } else {
                // A trailing field path ends the chain.
                parts.push(Selector::Simple(self.parse_simple()?));
                break;
            }
        }

        Ok(Selector::Complex(parts))
    }

    fn parse_nonsimple(&mut self) -> SfsResult<Selector> {
        match self.current_char() {
            '[' => self.parse_group(),
            '{' | '+' | '-' => self.parse_vector(),
            '\0' => Err(self.err("expected a selector segment, found end of input")),
            c => Err(self.err(format!("expected '[', '{{', '+' or '-', found '{c}'"))),
        }
    }

    fn parse_group(&mut self) -> SfsResult<Selector> {
        self.expect('[')?;
        let mut clauses = vec![self.parse_simple_complex()?];
        self.skip_whitespace();
        while self.try_consume_char(',') {
            clauses.push(self.parse_simple_complex()?);
            self.skip_whitespace();
        }
        self.expect(']')?;
        Ok(Selector::Group(clauses))
    }

    fn parse_vector(&mut self) -> SfsResult<Selector> {
        let action = if self.try_consume_char('+') {
            FieldAction::Add
        } else if self.try_consume_char('-') {
            FieldAction::Delete
        } else {
            FieldAction::Change
        };
        self.expect('{')?;
        let id_path = self.parse_simple()?;
        self.expect('}')?;
        Ok(Selector::Vector { action, id_path })
    }

    /// Parse `field ('.' field)*`, stopping before a dot that does not lead
    /// into another field (that dot separates complex segments instead).
    fn parse_simple(&mut self) -> SfsResult<Vec<String>> {
        let mut fields = vec![self.parse_field()?];
        while self.dot_leads_to_field() {
            self.pos += 1;
            fields.push(self.parse_field()?);
        }
        Ok(fields)
    }

    fn parse_field(&mut self) -> SfsResult<String> {
        self.skip_whitespace();
        let start = self.pos;
        while self.pos < self.input.len() {
            let c = self.current_char();
            if !is_field_char(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        if self.pos == start {
            return Err(self.err("expected a field name"));
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn dot_leads_to_field(&self) -> bool {
        let mut chars = self.input[self.pos..].chars();
        chars.next() == Some('.') && chars.next().is_some_and(is_field_char)
    }

    fn at_field_start(&self) -> bool {
        is_field_char(self.current_char())
    }

    fn at_nonsimple_start(&self) -> bool {
        matches!(self.current_char(), '[' | '{' | '+' | '-')
    }

    fn at_char(&self, c: char) -> bool {
        self.current_char() == c
    }

    fn current_char(&self) -> char {
        self.input[self.pos..].chars().next().unwrap_or('\0')
    }

    fn try_consume_char(&mut self, c: char) -> bool {
        if self.current_char() == c {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> SfsResult<()> {
        if self.try_consume_char(c) {
            Ok(())
        } else {
            Err(self.err(format!("expected '{c}'")))
        }
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.input.len() {
            let c = self.current_char();
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn err(&self, message: impl Into<String>) -> SfsError {
        SfsError::Invalid {
            pos: self.pos,
            message: message.into(),
        }
    }
}

fn is_field_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
