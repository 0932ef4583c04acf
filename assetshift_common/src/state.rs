use std::{net::SocketAddr, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::rewriting::{config::RawOptions, config::RewriteConfig, html::html_rewriter};

#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// The listen address for the rewriting proxy
    pub host: SocketAddr,
    /// The site backend requests are forwarded to, e.g. `http://127.0.0.1:8080`
    pub upstream: String,
    /// The public home URL of the site, e.g. `https://example.com`
    pub home_url: String,
    /// CDN rewriting options as written by the settings store
    pub cdn: RawOptions,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: SocketAddr::from(([0, 0, 0, 0], 3069)),
            upstream: "http://127.0.0.1:8080".to_string(),
            home_url: "http://changeme.local".to_string(),
            cdn: RawOptions::default(),
        }
    }
}

#[derive(Clone)]
/// The state that is passed to API routes
pub struct APIState {
    pub config: Arc<Config>,
    pub rewrite_config: Arc<RewriteConfig>,
}

#[derive(Clone)]
/// The state that is passed to the proxy handler
pub struct ProxyState {
    /// `upstream` without a trailing slash
    pub upstream: String,
    pub client: reqwest::Client,
    pub html_rewriter: Arc<html_rewriter::HtmlRewriter>,
}

#[derive(Clone)]
/// The shared state that is passed to the hostname router
pub struct SharedState {
    /// Requests for this host go to the API instead of the proxy
    pub api_host: String,
}
