//! Finds URL references inside the values the HTML rewriter hands over: whole URL
//! attributes, `srcset` lists, and CSS from `style` attributes or `<style>` blocks.
//!
//! Markup itself is tokenized by `lol_html`; see [`super::driver`].

/// How a candidate sits in its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateContext {
    /// The whole value of a URL attribute such as `src` or `href`
    Attribute,
    /// The URL part of one `srcset` entry
    SrcsetEntry,
    /// The inside of a CSS `url(...)`, quotes excluded
    InlineStyleUrl,
}

/// One URL occurrence. `raw_text` is always `&value[start..end]` of the scanned value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate<'a> {
    pub raw_text: &'a str,
    pub start: usize,
    pub end: usize,
    pub context: CandidateContext,
}

/// The grammar of a value that may hold URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Url,
    Srcset,
    Css,
}

/// Attributes whose values are scanned, matched case-insensitively.
pub const URL_ATTRIBUTES: &[(&str, ValueKind)] = &[
    ("src", ValueKind::Url),
    ("href", ValueKind::Url),
    ("poster", ValueKind::Url),
    ("data-src", ValueKind::Url),
    ("srcset", ValueKind::Srcset),
    ("data-srcset", ValueKind::Srcset),
    ("imagesrcset", ValueKind::Srcset),
    ("style", ValueKind::Css),
];

pub fn attribute_kind(name: &str) -> Option<ValueKind> {
    URL_ATTRIBUTES
        .iter()
        .find(|(attribute, _)| name.eq_ignore_ascii_case(attribute))
        .map(|(_, kind)| *kind)
}

/// Lazily yields every [`Candidate`] of one value in increasing offset order.
///
/// Never fails: text it cannot make sense of yields no candidates.
pub struct Scanner<'a> {
    value: &'a str,
    kind: ValueKind,
    position: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(value: &'a str, kind: ValueKind) -> Self {
        Self {
            value,
            kind,
            position: 0,
        }
    }

    fn next_url(&mut self) -> Option<Candidate<'a>> {
        if self.position > 0 {
            return None;
        }
        self.position = self.value.len().max(1);

        let bytes = self.value.as_bytes();
        let mut start = 0;
        let mut end = bytes.len();
        while start < end && is_space(bytes[start]) {
            start += 1;
        }
        while end > start && is_space(bytes[end - 1]) {
            end -= 1;
        }

        (start < end).then(|| Candidate {
            raw_text: &self.value[start..end],
            start,
            end,
            context: CandidateContext::Attribute,
        })
    }

    /// One image candidate string per call. Descriptors and separators stay in place.
    fn next_srcset_entry(&mut self) -> Option<Candidate<'a>> {
        let bytes = self.value.as_bytes();
        let end = bytes.len();
        let mut i = self.position;

        while i < end && (is_space(bytes[i]) || bytes[i] == b',') {
            i += 1;
        }
        if i >= end {
            self.position = end;
            return None;
        }

        let url_start = i;
        while i < end && !is_space(bytes[i]) {
            i += 1;
        }
        let mut url_end = i;

        if bytes[url_end - 1] == b',' {
            // No descriptors; the trailing commas separate entries.
            while url_end > url_start && bytes[url_end - 1] == b',' {
                url_end -= 1;
            }
        } else {
            let mut depth = 0usize;
            while i < end {
                match bytes[i] {
                    b'(' => depth += 1,
                    b')' => depth = depth.saturating_sub(1),
                    b',' if depth == 0 => break,
                    _ => {}
                }
                i += 1;
            }
        }
        self.position = i;

        Some(Candidate {
            raw_text: &self.value[url_start..url_end],
            start: url_start,
            end: url_end,
            context: CandidateContext::SrcsetEntry,
        })
    }

    /// The inside of the next CSS `url(...)`.
    fn next_css_url(&mut self) -> Option<Candidate<'a>> {
        let bytes = self.value.as_bytes();
        let end = bytes.len();

        while let Some(at) = find_ignore_ascii_case(bytes, self.position, b"url(") {
            let mut i = at + 4;
            self.position = i;
            if at > 0 && is_ident_byte(bytes[at - 1]) {
                continue;
            }

            while i < end && is_space(bytes[i]) {
                i += 1;
            }

            let quote: Option<&[u8]> = match bytes.get(i) {
                Some(b'"') => Some(&b"\""[..]),
                Some(b'\'') => Some(&b"'"[..]),
                _ if bytes[i..].starts_with(b"&quot;") => Some(&b"&quot;"[..]),
                _ => None,
            };

            let (inner_start, inner_end) = match quote {
                Some(quote) => {
                    let inner_start = i + quote.len();
                    let Some(close) = find(bytes, inner_start, quote) else {
                        break;
                    };
                    self.position = close + quote.len();
                    (inner_start, close)
                }
                None => {
                    let Some(close) = find(bytes, i, b")") else {
                        break;
                    };
                    self.position = close + 1;
                    let mut inner_end = close;
                    while inner_end > i && is_space(bytes[inner_end - 1]) {
                        inner_end -= 1;
                    }
                    (i, inner_end)
                }
            };

            if inner_start < inner_end {
                return Some(Candidate {
                    raw_text: &self.value[inner_start..inner_end],
                    start: inner_start,
                    end: inner_end,
                    context: CandidateContext::InlineStyleUrl,
                });
            }
        }

        // Unterminated `url(` ends the value
        self.position = end;
        None
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Candidate<'a>;

    fn next(&mut self) -> Option<Candidate<'a>> {
        match self.kind {
            ValueKind::Url => self.next_url(),
            ValueKind::Srcset => self.next_srcset_entry(),
            ValueKind::Css => self.next_css_url(),
        }
    }
}

fn find(haystack: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|index| from + index)
}

fn find_ignore_ascii_case(haystack: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
        .map(|index| from + index)
}

fn is_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r' | b'\x0c')
}

fn is_ident_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' || byte >= 0x80
}
