//! Markup tokenizer.
//!
//! A byte-level state machine in the style of htmlparser2. It reports byte
//! ranges through [`Callbacks`] and never allocates; the builder decides what
//! to do with them. Binding syntax is not recognized here: `[[..]]` and
//! `{{..}}` are plain text to the tokenizer.

use memchr::memmem;
use tempera_carton::is_raw_text_tag;

/// Character codes for fast comparison
pub mod char_codes {
    pub const TAB: u8 = 0x09;
    pub const NEWLINE: u8 = 0x0A;
    pub const FORM_FEED: u8 = 0x0C;
    pub const CARRIAGE_RETURN: u8 = 0x0D;
    pub const SPACE: u8 = 0x20;
    pub const EXCLAMATION_MARK: u8 = 0x21;
    pub const DOUBLE_QUOTE: u8 = 0x22;
    pub const SINGLE_QUOTE: u8 = 0x27;
    pub const DASH: u8 = 0x2D;
    pub const SLASH: u8 = 0x2F;
    pub const LT: u8 = 0x3C;
    pub const EQ: u8 = 0x3D;
    pub const GT: u8 = 0x3E;
    pub const UPPER_A: u8 = 0x41;
    pub const UPPER_Z: u8 = 0x5A;
    pub const LOWER_A: u8 = 0x61;
    pub const LOWER_Z: u8 = 0x7A;
}

use char_codes::*;

/// All the states the tokenizer can be in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    Text = 1,

    // Tags
    BeforeTagName,
    InTagName,
    InSelfClosingTag,
    BeforeClosingTagName,
    InClosingTagName,
    AfterClosingTagName,

    // Attributes
    BeforeAttrName,
    InAttrName,
    AfterAttrName,
    BeforeAttrValue,
    InAttrValueDq,
    InAttrValueSq,
    InAttrValueNq,

    // Declarations & comments
    BeforeDeclaration,
    InDeclaration,
    BeforeComment,
    InComment,
}

/// Quote type for attribute values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum QuoteType {
    NoValue = 0,
    Unquoted = 1,
    Single = 2,
    Double = 3,
}

/// Tokenizer callbacks
pub trait Callbacks {
    fn on_text(&mut self, start: usize, end: usize);
    /// Contents of `<script>`/`<style>`, not entity-decoded.
    fn on_raw_text(&mut self, start: usize, end: usize);

    fn on_open_tag_name(&mut self, start: usize, end: usize);
    fn on_open_tag_end(&mut self, end: usize);
    fn on_self_closing_tag(&mut self, end: usize);
    fn on_close_tag(&mut self, start: usize, end: usize);

    fn on_attrib_name(&mut self, start: usize, end: usize);
    fn on_attrib_data(&mut self, start: usize, end: usize);
    fn on_attrib_end(&mut self, quote: QuoteType, end: usize);

    fn on_comment(&mut self, start: usize, end: usize);

    fn on_end(&mut self);
    /// Input ended inside a tag.
    fn on_eof_in_tag(&mut self, index: usize);
}

/// Check if character is a tag start character (a-z, A-Z)
#[inline]
pub fn is_tag_start_char(c: u8) -> bool {
    (LOWER_A..=LOWER_Z).contains(&c) || (UPPER_A..=UPPER_Z).contains(&c)
}

/// Check if character is whitespace
#[inline]
pub fn is_whitespace(c: u8) -> bool {
    c == SPACE || c == NEWLINE || c == TAB || c == FORM_FEED || c == CARRIAGE_RETURN
}

/// Check if character ends a tag section
#[inline]
pub fn is_end_of_tag_section(c: u8) -> bool {
    c == SLASH || c == GT || is_whitespace(c)
}

/// Markup tokenizer
pub struct Tokenizer<'a, C: Callbacks> {
    input: &'a [u8],
    state: State,
    section_start: usize,
    index: usize,
    callbacks: C,
    /// Open tag whose content is raw text, if any.
    raw_text_tag: Option<(usize, usize)>,
}

impl<'a, C: Callbacks> Tokenizer<'a, C> {
    pub fn new(input: &'a str, callbacks: C) -> Self {
        Self {
            input: input.as_bytes(),
            state: State::Text,
            section_start: 0,
            index: 0,
            callbacks,
            raw_text_tag: None,
        }
    }

    /// Give the callbacks back once tokenizing is done.
    pub fn into_callbacks(self) -> C {
        self.callbacks
    }

    /// Tokenize the input
    pub fn tokenize(&mut self) {
        while self.index < self.input.len() {
            let c = self.input[self.index];

            match self.state {
                State::Text => self.state_text(c),
                State::BeforeTagName => self.state_before_tag_name(c),
                State::InTagName => self.state_in_tag_name(c),
                State::InSelfClosingTag => self.state_in_self_closing_tag(c),
                State::BeforeClosingTagName => self.state_before_closing_tag_name(c),
                State::InClosingTagName => self.state_in_closing_tag_name(c),
                State::AfterClosingTagName => self.state_after_closing_tag_name(c),
                State::BeforeAttrName => self.state_before_attr_name(c),
                State::InAttrName => self.state_in_attr_name(c),
                State::AfterAttrName => self.state_after_attr_name(c),
                State::BeforeAttrValue => self.state_before_attr_value(c),
                State::InAttrValueDq => self.state_in_attr_value_dq(c),
                State::InAttrValueSq => self.state_in_attr_value_sq(c),
                State::InAttrValueNq => self.state_in_attr_value_nq(c),
                State::BeforeDeclaration => self.state_before_declaration(c),
                State::InDeclaration => self.state_in_declaration(c),
                State::BeforeComment => self.state_before_comment(c),
                State::InComment => self.state_in_comment(c),
            }

            self.index += 1;
        }

        self.cleanup();
        self.callbacks.on_end();
    }

    fn cleanup(&mut self) {
        match self.state {
            State::Text => {
                if self.section_start < self.index {
                    self.callbacks.on_text(self.section_start, self.index);
                }
            }
            State::InComment | State::BeforeComment => {
                self.callbacks.on_comment(self.section_start, self.index);
            }
            State::BeforeDeclaration | State::InDeclaration => {}
            _ => self.callbacks.on_eof_in_tag(self.index),
        }
    }

    // ========== State handlers ==========

    fn state_text(&mut self, c: u8) {
        if c == LT {
            if self.index > self.section_start {
                self.callbacks.on_text(self.section_start, self.index);
            }
            self.state = State::BeforeTagName;
            self.section_start = self.index;
        }
    }

    fn state_before_tag_name(&mut self, c: u8) {
        if c == EXCLAMATION_MARK {
            self.state = State::BeforeDeclaration;
            self.section_start = self.index + 1;
        } else if is_tag_start_char(c) {
            self.section_start = self.index;
            self.state = State::InTagName;
        } else if c == SLASH {
            self.state = State::BeforeClosingTagName;
        } else {
            // Not a tag: the `<` stays part of the text section.
            self.state = State::Text;
            self.state_text(c);
        }
    }

    fn state_in_tag_name(&mut self, c: u8) {
        if is_end_of_tag_section(c) {
            self.callbacks.on_open_tag_name(self.section_start, self.index);
            let name = &self.input[self.section_start..self.index];
            self.raw_text_tag = std::str::from_utf8(name)
                .ok()
                .filter(|tag| is_raw_text_tag(&tag.to_ascii_lowercase()))
                .map(|_| (self.section_start, self.index));
            self.section_start = self.index;
            self.state = State::BeforeAttrName;
            self.state_before_attr_name(c);
        }
    }

    fn state_in_self_closing_tag(&mut self, c: u8) {
        if c == GT {
            self.callbacks.on_self_closing_tag(self.index);
            self.raw_text_tag = None;
            self.state = State::Text;
            self.section_start = self.index + 1;
        } else if !is_whitespace(c) {
            self.state = State::BeforeAttrName;
            self.state_before_attr_name(c);
        }
    }

    fn state_before_closing_tag_name(&mut self, c: u8) {
        if is_whitespace(c) {
            // Skip
        } else if c == GT {
            // `</>` is dropped
            self.state = State::Text;
            self.section_start = self.index + 1;
        } else {
            self.state = State::InClosingTagName;
            self.section_start = self.index;
        }
    }

    fn state_in_closing_tag_name(&mut self, c: u8) {
        if c == GT || is_whitespace(c) {
            self.callbacks.on_close_tag(self.section_start, self.index);
            self.section_start = self.index + 1;
            self.state = if c == GT {
                State::Text
            } else {
                State::AfterClosingTagName
            };
        }
    }

    fn state_after_closing_tag_name(&mut self, c: u8) {
        if c == GT {
            self.state = State::Text;
            self.section_start = self.index + 1;
        }
    }

    fn state_before_attr_name(&mut self, c: u8) {
        if c == GT {
            self.callbacks.on_open_tag_end(self.index);
            self.state = State::Text;
            self.section_start = self.index + 1;
            if let Some(tag) = self.raw_text_tag.take() {
                self.skip_raw_text(tag);
            }
        } else if c == SLASH {
            self.state = State::InSelfClosingTag;
        } else if !is_whitespace(c) {
            self.state = State::InAttrName;
            self.section_start = self.index;
        }
    }

    /// Jump over the body of a raw-text element up to its closing tag.
    fn skip_raw_text(&mut self, (start, end): (usize, usize)) {
        let mut needle = Vec::with_capacity(end - start + 2);
        needle.extend_from_slice(b"</");
        needle.extend(self.input[start..end].iter().map(u8::to_ascii_lowercase));

        let body_start = self.index + 1;
        let body_end = memmem::find(&self.input[body_start..], &needle)
            .map_or(self.input.len(), |pos| body_start + pos);
        if body_end > body_start {
            self.callbacks.on_raw_text(body_start, body_end);
        }
        // The main loop advances past `index`; resume on the `<` of the end tag.
        self.index = body_end - 1;
        self.section_start = body_end;
    }

    fn state_in_attr_name(&mut self, c: u8) {
        if c == EQ || is_end_of_tag_section(c) {
            self.callbacks.on_attrib_name(self.section_start, self.index);
            self.section_start = self.index;
            self.state = State::AfterAttrName;
            self.state_after_attr_name(c);
        }
    }

    fn state_after_attr_name(&mut self, c: u8) {
        if c == EQ {
            self.state = State::BeforeAttrValue;
        } else if c == SLASH || c == GT {
            self.callbacks.on_attrib_end(QuoteType::NoValue, self.index);
            self.state = State::BeforeAttrName;
            self.state_before_attr_name(c);
        } else if !is_whitespace(c) {
            self.callbacks.on_attrib_end(QuoteType::NoValue, self.index);
            self.state = State::InAttrName;
            self.section_start = self.index;
        }
    }

    fn state_before_attr_value(&mut self, c: u8) {
        if c == DOUBLE_QUOTE {
            self.state = State::InAttrValueDq;
            self.section_start = self.index + 1;
        } else if c == SINGLE_QUOTE {
            self.state = State::InAttrValueSq;
            self.section_start = self.index + 1;
        } else if !is_whitespace(c) {
            self.section_start = self.index;
            self.state = State::InAttrValueNq;
            self.state_in_attr_value_nq(c);
        }
    }

    fn state_in_attr_value_dq(&mut self, c: u8) {
        if c == DOUBLE_QUOTE {
            self.emit_attr_value(QuoteType::Double);
        }
    }

    fn state_in_attr_value_sq(&mut self, c: u8) {
        if c == SINGLE_QUOTE {
            self.emit_attr_value(QuoteType::Single);
        }
    }

    fn state_in_attr_value_nq(&mut self, c: u8) {
        if is_whitespace(c) || c == GT {
            self.emit_attr_value(QuoteType::Unquoted);
            self.state_before_attr_name(c);
        }
    }

    fn emit_attr_value(&mut self, quote: QuoteType) {
        if self.section_start < self.index {
            self.callbacks.on_attrib_data(self.section_start, self.index);
        }
        self.callbacks.on_attrib_end(quote, self.index);
        self.section_start = self.index + 1;
        self.state = State::BeforeAttrName;
    }

    fn state_before_declaration(&mut self, c: u8) {
        if c == DASH {
            self.state = State::BeforeComment;
            self.section_start = self.index + 1;
        } else {
            self.state = State::InDeclaration;
        }
    }

    fn state_in_declaration(&mut self, c: u8) {
        if c == GT {
            self.state = State::Text;
            self.section_start = self.index + 1;
        }
    }

    fn state_before_comment(&mut self, c: u8) {
        if c == DASH {
            self.state = State::InComment;
            self.section_start = self.index + 1;
        } else {
            self.state = State::InDeclaration;
        }
    }

    fn state_in_comment(&mut self, c: u8) {
        if c == DASH
            && self.index + 2 < self.input.len()
            && self.input[self.index + 1] == DASH
            && self.input[self.index + 2] == GT
        {
            self.callbacks.on_comment(self.section_start, self.index);
            self.index += 2;
            self.state = State::Text;
            self.section_start = self.index + 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records events as readable strings.
    struct Recorder<'s> {
        src: &'s str,
        events: Vec<String>,
    }

    impl Callbacks for Recorder<'_> {
        fn on_text(&mut self, start: usize, end: usize) {
            self.events.push(format!("text {:?}", &self.src[start..end]));
        }
        fn on_raw_text(&mut self, start: usize, end: usize) {
            self.events.push(format!("raw {:?}", &self.src[start..end]));
        }
        fn on_open_tag_name(&mut self, start: usize, end: usize) {
            self.events.push(format!("open {}", &self.src[start..end]));
        }
        fn on_open_tag_end(&mut self, _end: usize) {
            self.events.push(">".to_string());
        }
        fn on_self_closing_tag(&mut self, _end: usize) {
            self.events.push("/>".to_string());
        }
        fn on_close_tag(&mut self, start: usize, end: usize) {
            self.events.push(format!("close {}", &self.src[start..end]));
        }
        fn on_attrib_name(&mut self, start: usize, end: usize) {
            self.events.push(format!("attr {}", &self.src[start..end]));
        }
        fn on_attrib_data(&mut self, start: usize, end: usize) {
            self.events.push(format!("value {:?}", &self.src[start..end]));
        }
        fn on_attrib_end(&mut self, quote: QuoteType, _end: usize) {
            self.events.push(format!("end {quote:?}"));
        }
        fn on_comment(&mut self, start: usize, end: usize) {
            self.events.push(format!("comment {:?}", &self.src[start..end]));
        }
        fn on_end(&mut self) {}
        fn on_eof_in_tag(&mut self, index: usize) {
            self.events.push(format!("eof {index}"));
        }
    }

    fn tokenize(src: &str) -> Vec<String> {
        let mut tokenizer = Tokenizer::new(
            src,
            Recorder {
                src,
                events: Vec::new(),
            },
        );
        tokenizer.tokenize();
        tokenizer.into_callbacks().events
    }

    #[test]
    fn test_element_with_attributes() {
        assert_eq!(
            tokenize(r#"<div id="a" hidden class=x>hi</div>"#),
            [
                "open div",
                "attr id",
                "value \"a\"",
                "end Double",
                "attr hidden",
                "end NoValue",
                "attr class",
                "value \"x\"",
                "end Unquoted",
                ">",
                "text \"hi\"",
                "close div",
            ]
        );
    }

    #[test]
    fn test_bindings_are_text() {
        // A stray `<` splits the text section; the builder merges the halves.
        assert_eq!(
            tokenize("a [[b]] {{c}} < d"),
            ["text \"a [[b]] {{c}} \"", "text \"< d\""]
        );
    }

    #[test]
    fn test_raw_text() {
        assert_eq!(
            tokenize("<style>a > b { color: red }</style>"),
            [
                "open style",
                ">",
                "raw \"a > b { color: red }\"",
                "close style"
            ]
        );
    }

    #[test]
    fn test_comment_and_self_closing() {
        assert_eq!(
            tokenize("<!-- note --><br/>"),
            ["comment \" note \"", "open br", "/>"]
        );
    }

    #[test]
    fn test_eof_in_tag() {
        assert_eq!(tokenize("<div a"), ["open div", "eof 6"]);
    }
}
