use super::config::{OutputForm, RewriteConfig};

/// Why a candidate URL was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Empty, placeholder, or a non-http(s) scheme such as `data:` or `mailto:`
    Unparseable,
    /// Resolves against the current page, e.g. `img/a.png` or `#top`
    DocumentRelative,
    /// Points at a host other than the origin
    ForeignHost,
    /// Already points at the CDN base
    AlreadyRewritten,
    OutsideIncludedDirs,
    ExcludedExtension,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::Unparseable => "unparseable",
            SkipReason::DocumentRelative => "document_relative",
            SkipReason::ForeignHost => "foreign_host",
            SkipReason::AlreadyRewritten => "already_rewritten",
            SkipReason::OutsideIncludedDirs => "outside_included_dirs",
            SkipReason::ExcludedExtension => "excluded_extension",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Rewrite(String),
    Skip(SkipReason),
}

impl Classification {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Classification::Rewrite(_))
    }

    pub fn replacement(&self) -> Option<&str> {
        match self {
            Classification::Rewrite(replacement) => Some(replacement),
            Classification::Skip(_) => None,
        }
    }
}

/// The pieces of a URL the classifier cares about. `tail` is the path onwards
/// (path, query and fragment) exactly as written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrlParts<'a> {
    pub host: Option<&'a str>,
    pub path: &'a str,
    pub tail: &'a str,
}

/// Decides whether `url` should be served from the CDN and what it becomes.
pub fn classify(url: &str, config: &RewriteConfig) -> Classification {
    let parts = match parse(url) {
        Ok(parts) => parts,
        Err(reason) => return Classification::Skip(reason),
    };

    if let Some(host) = parts.host {
        if !host.eq_ignore_ascii_case(config.origin_host()) {
            return Classification::Skip(SkipReason::ForeignHost);
        }

        if is_already_rewritten(host, parts.tail, config.cdn_location()) {
            return Classification::Skip(SkipReason::AlreadyRewritten);
        }
    }

    let path = parts.path.strip_prefix('/').unwrap_or(parts.path);
    let included = config.included_dirs().iter().any(|dir| {
        path.strip_prefix(dir.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    });
    if !included || path.split('/').any(is_parent_segment) {
        return Classification::Skip(SkipReason::OutsideIncludedDirs);
    }

    let lowercase_path = path.to_ascii_lowercase();
    if config
        .excluded_extensions()
        .iter()
        .any(|ext| lowercase_path.ends_with(ext.as_str()))
    {
        return Classification::Skip(SkipReason::ExcludedExtension);
    }

    let replacement = match config.output_form() {
        OutputForm::Relative => parts.tail.to_string(),
        OutputForm::Absolute => {
            let scheme = if config.force_https() {
                "https"
            } else {
                config.cdn_scheme()
            };
            format!("{}://{}{}", scheme, config.cdn_location(), parts.tail)
        }
    };

    Classification::Rewrite(replacement)
}

/// Splits a URL into host and path, accepting root-relative paths, scheme-relative URLs
/// and absolute http(s) URLs.
pub fn parse(url: &str) -> Result<UrlParts<'_>, SkipReason> {
    let url = url.trim_matches(|c: char| c.is_ascii_whitespace());

    if url.is_empty()
        || url.contains(|c: char| {
            c.is_ascii_whitespace() || matches!(c, '"' | '\'' | '<' | '>' | '{' | '}' | '`' | '\\')
        })
    {
        return Err(SkipReason::Unparseable);
    }

    if let Some(rest) = url.strip_prefix("//") {
        return split_authority(rest);
    }

    if let Some(scheme_end) = scheme_len(url) {
        let scheme = &url[..scheme_end];
        let rest = &url[scheme_end + 1..];
        if !scheme.eq_ignore_ascii_case("http") && !scheme.eq_ignore_ascii_case("https") {
            return Err(SkipReason::Unparseable);
        }
        return match rest.strip_prefix("//") {
            Some(rest) => split_authority(rest),
            None => Err(SkipReason::Unparseable),
        };
    }

    if url.starts_with('/') {
        return Ok(UrlParts {
            host: None,
            path: path_of(url),
            tail: url,
        });
    }

    Err(SkipReason::DocumentRelative)
}

fn split_authority(rest: &str) -> Result<UrlParts<'_>, SkipReason> {
    let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let (host, tail) = rest.split_at(authority_end);

    if host.is_empty() || host.contains('@') {
        return Err(SkipReason::Unparseable);
    }

    Ok(UrlParts {
        host: Some(host),
        path: path_of(tail),
        tail,
    })
}

/// Length of a leading `scheme:` (excluding the colon), if the URL has one.
fn scheme_len(url: &str) -> Option<usize> {
    let colon = url.find(':')?;
    let scheme = &url[..colon];
    let mut chars = scheme.chars();

    let first = chars.next()?;
    if first.is_ascii_alphabetic()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    {
        Some(colon)
    } else {
        None
    }
}

fn path_of(tail: &str) -> &str {
    let end = tail.find(['?', '#']).unwrap_or(tail.len());
    &tail[..end]
}

/// `..`, also when one or both dots are percent-encoded.
fn is_parent_segment(segment: &str) -> bool {
    segment.len() <= 6 && segment.to_ascii_lowercase().replace("%2e", ".") == ".."
}

fn is_already_rewritten(host: &str, tail: &str, cdn_location: &str) -> bool {
    let (cdn_host, cdn_path) = match cdn_location.find('/') {
        Some(index) => cdn_location.split_at(index),
        None => (cdn_location, ""),
    };

    if !host.eq_ignore_ascii_case(cdn_host) {
        return false;
    }

    tail.strip_prefix(cdn_path)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(['/', '?', '#']))
}
