use std::cell::Cell;

use encoding_rs::Encoding;
use lol_html::{
    element,
    errors::RewritingError,
    html_content::{ContentType, Element},
    text, AsciiCompatibleEncoding, HandlerResult, Settings,
};
use thiserror::Error;

use super::{
    classifier::{classify, Classification},
    config::RewriteConfig,
    scanner::{Scanner, ValueKind},
};

/// The outcome of one rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteReport<D = String> {
    pub document: D,
    /// Number of URL occurrences the scanner found
    pub candidates: usize,
    /// Number of substitutions applied
    pub rewritten: usize,
}

#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("cannot rewrite documents encoded as {0}")]
    UnsupportedEncoding(&'static str),
    #[error("failed to rewrite HTML: {0}")]
    Html(#[from] RewritingError),
}

/// Rewrites every eligible asset reference in `document` to point at the CDN.
///
/// Returns the document unchanged when `config` is not active.
pub fn rewrite(document: &str, config: &RewriteConfig) -> String {
    rewrite_with_report(document, config).document
}

pub fn rewrite_with_report(document: &str, config: &RewriteConfig) -> RewriteReport {
    let unchanged = || RewriteReport {
        document: document.to_string(),
        candidates: 0,
        rewritten: 0,
    };

    let report = match rewrite_bytes(document.as_bytes(), Some(encoding_rs::UTF_8), config) {
        Ok(report) => report,
        Err(e) => {
            tracing::warn!("Leaving document untouched: {}", e);
            return unchanged();
        }
    };

    match String::from_utf8(report.document) {
        Ok(document) => RewriteReport {
            document,
            candidates: report.candidates,
            rewritten: report.rewritten,
        },
        Err(_) => unchanged(),
    }
}

/// Rewrites a byte document in its own encoding.
///
/// With `encoding` unset the document is read as UTF-8 until a `<meta charset>` says
/// otherwise. Bytes outside rewritten attributes and `<style>` blocks are copied as-is.
pub fn rewrite_bytes(
    input: &[u8],
    encoding: Option<&'static Encoding>,
    config: &RewriteConfig,
) -> Result<RewriteReport<Vec<u8>>, RewriteError> {
    if !config.is_active() {
        tracing::trace!(
            activation = config.activation().as_str(),
            "rewriter inactive, leaving document untouched"
        );
        return Ok(RewriteReport {
            document: input.to_vec(),
            candidates: 0,
            rewritten: 0,
        });
    }

    let document_encoding = match encoding {
        Some(encoding) => AsciiCompatibleEncoding::new(encoding)
            .ok_or(RewriteError::UnsupportedEncoding(encoding.name()))?,
        None => AsciiCompatibleEncoding::utf_8(),
    };

    let tally = Tally {
        config,
        candidates: Cell::new(0),
        rewritten: Cell::new(0),
    };
    let mut style_text = String::new();
    let mut output = Vec::with_capacity(input.len() + input.len() / 8);

    let mut rewriter = lol_html::HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![
                element!("[src]", |el| tally.attribute(el, "src", ValueKind::Url)),
                element!("[href]", |el| tally.attribute(el, "href", ValueKind::Url)),
                element!("[poster]", |el| tally.attribute(el, "poster", ValueKind::Url)),
                element!("[data-src]", |el| tally.attribute(el, "data-src", ValueKind::Url)),
                element!("[srcset]", |el| tally.attribute(el, "srcset", ValueKind::Srcset)),
                element!("[data-srcset]", |el| {
                    tally.attribute(el, "data-srcset", ValueKind::Srcset)
                }),
                element!("[imagesrcset]", |el| {
                    tally.attribute(el, "imagesrcset", ValueKind::Srcset)
                }),
                element!("[style]", |el| tally.attribute(el, "style", ValueKind::Css)),
                // A style body can arrive in several chunks; rewrite it once it is whole.
                text!("style", |chunk| {
                    style_text.push_str(chunk.as_str());
                    if !chunk.last_in_text_node() {
                        chunk.remove();
                        return Ok(());
                    }

                    let css = std::mem::take(&mut style_text);
                    let buffered = css.len() > chunk.as_str().len();
                    match tally.value(&css, ValueKind::Css) {
                        Some(rewritten) => chunk.replace(&rewritten, ContentType::Html),
                        None if buffered => chunk.replace(&css, ContentType::Html),
                        None => {}
                    }

                    Ok(())
                }),
            ],
            encoding: document_encoding,
            adjust_charset_on_meta_tag: encoding.is_none(),
            strict: false,
            ..Settings::default()
        },
        |c: &[u8]| output.extend_from_slice(c),
    );

    rewriter.write(input)?;
    rewriter.end()?;

    let candidates = tally.candidates.get();
    let rewritten = tally.rewritten.get();
    tracing::debug!(candidates, rewritten, "rewrote asset references");

    Ok(RewriteReport {
        document: output,
        candidates,
        rewritten,
    })
}

/// Classifies and splices candidates while counting them across handlers.
struct Tally<'c> {
    config: &'c RewriteConfig,
    candidates: Cell<usize>,
    rewritten: Cell<usize>,
}

impl Tally<'_> {
    fn attribute(&self, el: &mut Element, name: &str, kind: ValueKind) -> HandlerResult {
        if let Some(value) = el.get_attribute(name) {
            if let Some(rewritten) = self.value(&value, kind) {
                el.set_attribute(name, &rewritten)?;
            }
        }

        Ok(())
    }

    /// Returns the rewritten value, or `None` if nothing in it changed.
    fn value(&self, value: &str, kind: ValueKind) -> Option<String> {
        let mut output = String::new();
        let mut cursor = 0;

        for candidate in Scanner::new(value, kind) {
            self.candidates.set(self.candidates.get() + 1);

            let replacement = match classify(candidate.raw_text, self.config) {
                Classification::Rewrite(replacement) => replacement,
                Classification::Skip(reason) => {
                    tracing::trace!(url = candidate.raw_text, reason = reason.as_str(), "skipped");
                    continue;
                }
            };

            if replacement == candidate.raw_text {
                continue;
            }

            output.push_str(&value[cursor..candidate.start]);
            output.push_str(&replacement);
            cursor = candidate.end;
            self.rewritten.set(self.rewritten.get() + 1);
        }

        if cursor == 0 {
            return None;
        }

        output.push_str(&value[cursor..]);
        Some(output)
    }
}
