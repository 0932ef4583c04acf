pub mod api;
pub mod error;
pub mod proxy;
pub mod rewriting;
pub mod state;

use std::{future::Future, str::FromStr, sync::Arc};

use axum::{
    extract::{Host, Request, State},
    handler::Handler,
    routing::{any, MethodRouter},
    Router,
};
use error::Result;
use hyper::Uri;
use reqwest::redirect::Policy;
use rewriting::{config::Activation, config::RewriteConfig, html::html_rewriter};
use state::{APIState, Config, ProxyState, SharedState};
use tower::ServiceExt;
use tower_http::trace::TraceLayer;

/// Builds the full application: the API on `api.<origin host>`, the rewriting proxy on
/// every other host.
pub fn app(config: Arc<Config>) -> Result<Router> {
    let rewrite_config = Arc::new(RewriteConfig::resolve_permissive(
        &config.cdn,
        &config.home_url,
    )?);

    match rewrite_config.activation() {
        Activation::Active => tracing::info!(
            "Rewriting assets of {} to {}",
            rewrite_config.origin_url(),
            rewrite_config.cdn_base_url()
        ),
        inactive => tracing::warn!(
            reason = inactive.as_str(),
            "Asset rewriting is disabled, pages will be served unchanged"
        ),
    }

    let upstream = Uri::from_str(&config.upstream)?;
    if !matches!(upstream.scheme_str(), Some("http" | "https")) || upstream.authority().is_none() {
        return Err(anyhow::anyhow!(
            "the upstream `{}` must be an absolute http(s) URL",
            config.upstream
        )
        .into());
    }

    let origin_host = rewrite_config.origin_host();
    let sharedstate = SharedState {
        api_host: format!("api.{}", strip_port(origin_host)),
    };

    let client = reqwest::Client::builder()
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .zstd(true)
        .build()?;

    let proxystate = ProxyState {
        upstream: config.upstream.trim_end_matches('/').to_string(),
        client,
        html_rewriter: Arc::new(html_rewriter::HtmlRewriter::new(rewrite_config.clone())),
    };

    let proxyrouter = proxy::service::proxy.with_state(Arc::new(proxystate));

    let apistate = APIState {
        config: config.clone(),
        rewrite_config,
    };

    let apirouter = api::service::service(Arc::new(apistate));

    let app: MethodRouter = any(
        |State(state): State<SharedState>, Host(host): Host, req: Request| async move {
            if strip_port(&host).eq_ignore_ascii_case(&state.api_host) {
                return apirouter.oneshot(req).await;
            }
            proxyrouter.oneshot(req).await
        },
    )
    .with_state(sharedstate);

    Ok(Router::new()
        .fallback_service(app)
        .layer(TraceLayer::new_for_http()))
}

pub async fn serve<F>(config: Arc<Config>, graceful_shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = app(config.clone())?;

    let listener = tokio::net::TcpListener::bind(config.host).await?;
    tracing::info!("Listening on {}", config.host);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(graceful_shutdown)
        .await?;

    Ok(())
}

fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}
