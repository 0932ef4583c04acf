use std::str::FromStr;

use hyper::Uri;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum length of an API key for the rewriter to be considered active.
pub const MIN_API_KEY_LEN: usize = 32;

pub const DEFAULT_CDN_BASE: &str = "https://cdn.statically.io/sites/";
pub const DEFAULT_DIRS: &str = "wp-content,wp-includes";
pub const DEFAULT_EXCLUDES: &str = ".php";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("the home URL `{0}` must be an absolute http(s) URL")]
    InvalidHomeUrl(String),
    #[error("the CDN URL `{0}` must be an absolute http(s) URL without a query or fragment")]
    InvalidCdnUrl(String),
    #[error("the API key must be at least {minimum} characters long, got {length}")]
    ApiKeyTooShort { length: usize, minimum: usize },
    #[error("`{key}` contains a malformed entry `{entry}`")]
    MalformedList { key: &'static str, entry: String },
    #[error("`{key}` must be a boolean flag, got `{value}`")]
    InvalidFlag { key: &'static str, value: String },
}

/// A loosely typed boolean as written by settings stores: `true`, `1` or `"1"`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Flag {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl Flag {
    fn enabled(&self, key: &'static str) -> Result<bool, ConfigError> {
        match self {
            Flag::Bool(value) => Ok(*value),
            Flag::Int(value) => Ok(*value != 0),
            Flag::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "" | "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::InvalidFlag {
                    key,
                    value: text.clone(),
                }),
            },
        }
    }
}

impl From<bool> for Flag {
    fn from(value: bool) -> Self {
        Flag::Bool(value)
    }
}

/// The raw settings mapping, every field optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawOptions {
    /// CDN base URL
    pub url: Option<String>,
    /// Comma separated directories eligible for rewriting
    pub dirs: Option<String>,
    /// Comma separated path suffixes that are never rewritten
    pub excludes: Option<String>,
    /// Emit rewritten URLs as path only
    pub relative: Option<Flag>,
    /// Force `https` on absolute rewritten URLs
    pub https: Option<Flag>,
    /// Activation credential
    pub api_key: Option<String>,
}

impl RawOptions {
    /// Builds options from string pairs, ignoring keys it does not know about.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut options = RawOptions::default();

        for (key, value) in pairs {
            let value = value.into();
            match key.as_ref() {
                "url" => options.url = Some(value),
                "dirs" => options.dirs = Some(value),
                "excludes" => options.excludes = Some(value),
                "relative" => options.relative = Some(Flag::Text(value)),
                "https" => options.https = Some(Flag::Text(value)),
                "api_key" => options.api_key = Some(value),
                other => tracing::debug!(key = other, "ignoring unknown rewrite option"),
            }
        }

        options
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputForm {
    /// Keep only path, query and fragment; the CDN host is resolved elsewhere.
    Relative,
    /// Emit fully qualified CDN URLs.
    Absolute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Active,
    MissingApiKey,
    CdnIsOrigin,
}

impl Activation {
    pub fn as_str(self) -> &'static str {
        match self {
            Activation::Active => "active",
            Activation::MissingApiKey => "missing_api_key",
            Activation::CdnIsOrigin => "cdn_is_origin",
        }
    }
}

/// The validated, immutable rule set the engine works from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteConfig {
    home_url: String,
    origin_url: String,
    origin_host: String,
    cdn_base_url: String,
    /// `cdn_base_url` with its `scheme://` removed
    cdn_location: String,
    cdn_scheme: String,
    included_dirs: Vec<String>,
    excluded_extensions: Vec<String>,
    output_form: OutputForm,
    force_https: bool,
    api_token: String,
}

impl RewriteConfig {
    /// Resolves raw settings, rejecting an API key that is too short.
    pub fn resolve(options: &RawOptions, home_url: &str) -> Result<Self, ConfigError> {
        let config = Self::resolve_permissive(options, home_url)?;

        if config.api_token.len() < MIN_API_KEY_LEN {
            return Err(ConfigError::ApiKeyTooShort {
                length: config.api_token.len(),
                minimum: MIN_API_KEY_LEN,
            });
        }

        Ok(config)
    }

    /// Resolves raw settings without checking the API key. A config built this way may be
    /// inactive, in which case the driver leaves documents untouched.
    pub fn resolve_permissive(options: &RawOptions, home_url: &str) -> Result<Self, ConfigError> {
        let home = parse_absolute(home_url)
            .ok_or_else(|| ConfigError::InvalidHomeUrl(home_url.to_string()))?;

        let cdn_input = match options.url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => format!("{}{}", DEFAULT_CDN_BASE, home.host),
        };
        let cdn = parse_absolute(&cdn_input)
            .filter(|cdn| !cdn.has_query)
            .ok_or(ConfigError::InvalidCdnUrl(cdn_input.clone()))?;

        let mut included_dirs = split_list("dirs", options.dirs.as_deref().unwrap_or(DEFAULT_DIRS))?
            .into_iter()
            .map(|dir| dir.trim_matches('/').to_string())
            .filter(|dir| !dir.is_empty())
            .collect::<Vec<_>>();
        for dir in &included_dirs {
            if dir.contains(['?', '#']) || dir.split('/').any(|segment| segment == "..") {
                return Err(ConfigError::MalformedList {
                    key: "dirs",
                    entry: dir.clone(),
                });
            }
        }
        if included_dirs.is_empty() {
            included_dirs = split_list("dirs", DEFAULT_DIRS)?;
        }
        dedup(&mut included_dirs);

        let mut excluded_extensions = split_list(
            "excludes",
            options.excludes.as_deref().unwrap_or(DEFAULT_EXCLUDES),
        )?
        .into_iter()
        .map(|ext| ext.to_ascii_lowercase())
        .collect::<Vec<_>>();
        dedup(&mut excluded_extensions);

        let relative = match &options.relative {
            Some(flag) => flag.enabled("relative")?,
            None => true,
        };
        let force_https = match &options.https {
            Some(flag) => flag.enabled("https")?,
            None => true,
        };

        let origin_url = format!("{}://{}", home.scheme, home.authority);

        Ok(RewriteConfig {
            home_url: home.normalized,
            origin_url,
            origin_host: home.authority,
            cdn_location: cdn.normalized[cdn.scheme.len() + 3..].to_string(),
            cdn_base_url: cdn.normalized,
            cdn_scheme: cdn.scheme,
            included_dirs,
            excluded_extensions,
            output_form: if relative {
                OutputForm::Relative
            } else {
                OutputForm::Absolute
            },
            force_https,
            api_token: options.api_key.clone().unwrap_or_default().trim().to_string(),
        })
    }

    pub fn activation(&self) -> Activation {
        if self.api_token.len() < MIN_API_KEY_LEN {
            Activation::MissingApiKey
        } else if self.cdn_base_url.eq_ignore_ascii_case(&self.home_url)
            || self.cdn_base_url.eq_ignore_ascii_case(&self.origin_url)
        {
            Activation::CdnIsOrigin
        } else {
            Activation::Active
        }
    }

    pub fn is_active(&self) -> bool {
        self.activation() == Activation::Active
    }

    pub fn origin_url(&self) -> &str {
        &self.origin_url
    }

    pub fn origin_host(&self) -> &str {
        &self.origin_host
    }

    pub fn cdn_base_url(&self) -> &str {
        &self.cdn_base_url
    }

    pub fn cdn_scheme(&self) -> &str {
        &self.cdn_scheme
    }

    /// The CDN base without its scheme, e.g. `cdn.example/sites/origin.com`.
    pub fn cdn_location(&self) -> &str {
        &self.cdn_location
    }

    pub fn included_dirs(&self) -> &[String] {
        &self.included_dirs
    }

    pub fn excluded_extensions(&self) -> &[String] {
        &self.excluded_extensions
    }

    pub fn output_form(&self) -> OutputForm {
        self.output_form
    }

    pub fn force_https(&self) -> bool {
        self.force_https
    }
}

struct AbsoluteUrl {
    scheme: String,
    /// `host[:port]`, lowercased
    authority: String,
    host: String,
    /// `scheme://authority/path` without a trailing slash
    normalized: String,
    has_query: bool,
}

fn parse_absolute(url: &str) -> Option<AbsoluteUrl> {
    let url = url.trim();
    if url.contains('#') {
        return None;
    }

    let uri = Uri::from_str(url).ok()?;
    let scheme = uri.scheme_str()?.to_ascii_lowercase();
    if scheme != "http" && scheme != "https" {
        return None;
    }

    let auth = uri.authority()?;
    if auth.as_str().contains('@') || auth.host().is_empty() {
        return None;
    }

    let host = auth.host().to_ascii_lowercase();
    let host_and_port = match auth.port_u16() {
        Some(port) => format!("{}:{}", host, port),
        None => host.clone(),
    };

    let path = uri.path().trim_end_matches('/');
    let normalized = format!("{}://{}{}", scheme, host_and_port, path);

    Some(AbsoluteUrl {
        scheme,
        authority: host_and_port,
        host,
        normalized,
        has_query: uri.query().is_some(),
    })
}

fn split_list(key: &'static str, list: &str) -> Result<Vec<String>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            if entry.contains(char::is_whitespace) {
                Err(ConfigError::MalformedList {
                    key,
                    entry: entry.to_string(),
                })
            } else {
                Ok(entry.to_string())
            }
        })
        .collect()
}

fn dedup(entries: &mut Vec<String>) {
    let mut seen = Vec::with_capacity(entries.len());
    entries.retain(|entry| {
        if seen.contains(entry) {
            false
        } else {
            seen.push(entry.clone());
            true
        }
    });
}
