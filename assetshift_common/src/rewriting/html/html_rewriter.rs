use std::sync::Arc;

use encoding_rs::Encoding;

use crate::{
    error::Result,
    rewriting::{config::RewriteConfig, driver::rewrite_bytes, rewriter::Rewriter},
};

/// Rewrites HTML response bodies in the charset they were served with.
pub struct HtmlRewriter {
    config: Arc<RewriteConfig>,
}

impl HtmlRewriter {
    pub fn new(config: Arc<RewriteConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RewriteConfig {
        &self.config
    }
}

impl Rewriter for HtmlRewriter {
    fn rewrite(&self, input: &[u8], content_type: &str) -> Result<Vec<u8>> {
        // A byte order mark wins over the header
        let encoding = match Encoding::for_bom(input) {
            Some((encoding, _)) => Some(encoding),
            None => declared_charset(content_type),
        };
        let report = rewrite_bytes(input, encoding, &self.config)?;

        Ok(report.document)
    }
}

/// The encoding named by the `charset` parameter of a `Content-Type` value.
///
/// `None` when there is no parameter or the label is unknown, in which case the document's
/// own `<meta charset>` decides.
pub fn declared_charset(content_type: &str) -> Option<&'static Encoding> {
    content_type.split(';').skip(1).find_map(|parameter| {
        let (name, value) = parameter.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        Encoding::for_label_no_replacement(value.trim().trim_matches('"').as_bytes())
    })
}
