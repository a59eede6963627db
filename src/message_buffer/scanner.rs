//! Cursor-based tag scanner.
//!
//! The scanner looks at the buffer from a byte offset and reports the next token. It is an
//! explicit state machine (`Text -> TagName -> TagAttrs`), so a tag that is cut off by the end
//! of the buffer is reported as [`Scan::Incomplete`] instead of falling back to literal text.
//! Each call visits every byte at most once and never backtracks.

/// Longest tag (from `<` to `>`) the scanner will wait for across chunks.
pub const MAX_TAG_LEN: usize = 256;

/// A complete `<name ...>` or `</name>` tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tag<'a> {
    pub name: &'a str,
    pub closing: bool,
    pub self_closing: bool,
    /// The literal markup, `<` through `>`.
    pub raw: &'a str,
    /// Offset just past the closing `>`.
    pub end: usize,
}

/// Result of scanning from an offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scan<'a> {
    /// Nothing left to scan.
    End,
    /// Plain text up to (not including) `end`, which is the next `<` or the buffer end.
    Text { end: usize },
    /// A complete tag.
    Tag(Tag<'a>),
    /// A `<` that may still become a tag once more input arrives.
    Incomplete,
    /// A `<` that cannot start a tag; consume it as text.
    Stray,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Text,
    TagName,
    TagAttrs,
}

const fn is_name_byte(b: u8, first: bool) -> bool {
    if first {
        b.is_ascii_alphabetic() || b == b'_'
    } else {
        b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b':' | b'.')
    }
}

/// Scan the next token of `buf` starting at byte offset `pos`.
///
/// `pos` must lie on a character boundary. Every offset the scanner reports is the position
/// of an ASCII byte or the buffer end, so slicing with it is always valid.
#[must_use]
pub fn scan(buf: &str, pos: usize) -> Scan<'_> {
    let bytes = buf.as_bytes();
    if pos >= bytes.len() {
        return Scan::End;
    }

    let mut state = State::Text;
    let mut closing = false;
    let mut name_start = pos + 1;
    let mut name_end = pos + 1;
    let mut last_significant = 0u8;
    let mut i = pos;

    while i < bytes.len() {
        let b = bytes[i];
        match state {
            State::Text => {
                if b == b'<' {
                    if i > pos {
                        return Scan::Text { end: i };
                    }
                    state = State::TagName;
                }
            }
            State::TagName => {
                if i - pos > MAX_TAG_LEN {
                    return Scan::Stray;
                }
                if b == b'/' && i == pos + 1 {
                    closing = true;
                    name_start = i + 1;
                } else if is_name_byte(b, i == name_start) {
                    name_end = i + 1;
                } else if i == name_start {
                    return Scan::Stray;
                } else if b == b'>' {
                    return Scan::Tag(Tag {
                        name: &buf[name_start..name_end],
                        closing,
                        self_closing: false,
                        raw: &buf[pos..=i],
                        end: i + 1,
                    });
                } else if b.is_ascii_whitespace() || b == b'/' {
                    last_significant = b;
                    state = State::TagAttrs;
                } else {
                    return Scan::Stray;
                }
            }
            State::TagAttrs => {
                if i - pos > MAX_TAG_LEN || b == b'<' {
                    return Scan::Stray;
                }
                if b == b'>' {
                    return Scan::Tag(Tag {
                        name: &buf[name_start..name_end],
                        closing,
                        self_closing: !closing && last_significant == b'/',
                        raw: &buf[pos..=i],
                        end: i + 1,
                    });
                }
                if !b.is_ascii_whitespace() {
                    last_significant = b;
                }
            }
        }
        i += 1;
    }

    match state {
        State::Text => Scan::Text { end: bytes.len() },
        State::TagName | State::TagAttrs => Scan::Incomplete,
    }
}
