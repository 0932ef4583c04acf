use std::sync::Arc;

use crate::{error::Result, rewriting::rewriter::Rewriter, state::ProxyState};
use axum::{
    body::{to_bytes, Body},
    debug_handler,
    extract::{Request, State},
    http::HeaderValue,
    response::{IntoResponse, Response},
};
use hyper::header::{
    ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING,
};
use hyper::{HeaderMap, StatusCode};

/// Encodings the client can decode, so the upstream never sends anything we can't rewrite
const SUPPORTED_ENCODINGS: &str = "gzip, br, deflate, zstd";

#[debug_handler]
pub async fn proxy(State(state): State<Arc<ProxyState>>, req: Request) -> Result<impl IntoResponse> {
    let (mut parts, body) = req.into_parts();

    let body_bytes: Vec<u8> = to_bytes(body, usize::MAX).await?.to_vec();

    parts
        .headers
        .insert(ACCEPT_ENCODING, HeaderValue::from_static(SUPPORTED_ENCODINGS));

    let path_and_query = parts
        .uri
        .path_and_query()
        .map_or("/", |path_and_query| path_and_query.as_str());

    let res = state
        .client
        .request(parts.method, format!("{}{}", state.upstream, path_and_query))
        .headers(without_hop_by_hop(&parts.headers))
        .body(body_bytes)
        .send()
        .await?;

    let mut response_builder = Response::builder().status(res.status());

    let content_type = res
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|content_type| content_type.to_str().ok())
        .map(str::to_string);
    let is_html = content_type
        .as_deref()
        .is_some_and(is_html_content_type);

    if let Some(headers) = response_builder.headers_mut() {
        *headers = without_hop_by_hop(res.headers());

        if is_html {
            headers.remove(CONTENT_ENCODING);
            headers.remove(CONTENT_LENGTH);
            headers.remove(TRANSFER_ENCODING);
        }
    }

    let body = if is_html {
        let body = res.bytes().await?;
        let content_type = content_type.as_deref().unwrap_or_default();
        match state.html_rewriter.rewrite(&body, content_type) {
            Ok(rewritten) => Body::from(rewritten),
            Err(e) => {
                tracing::warn!(path = path_and_query, "Serving page unchanged: {}", e);
                Body::from(body)
            }
        }
    } else {
        Body::from_stream(res.bytes_stream())
    };

    match response_builder.body(body) {
        Ok(response) => Ok(response.into_response()),
        Err(e) => {
            tracing::error!("Error building response: {:?}", e);
            Ok((StatusCode::INTERNAL_SERVER_ERROR, "Error building response").into_response())
        }
    }
}

fn is_html_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case("text/html"))
}

fn without_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::with_capacity(headers.len());
    filtered.extend(
        headers
            .iter()
            .filter(|(name, _)| {
                !matches!(
                    name.as_str(),
                    "connection"
                        | "keep-alive"
                        | "proxy-authenticate"
                        | "proxy-authorization"
                        | "proxy-connection"
                        | "te"
                        | "trailer"
                        | "transfer-encoding"
                        | "upgrade"
                )
            })
            .map(|(name, value)| (name.clone(), value.clone())),
    );
    filtered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_hop_by_hop_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("keep-alive"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("cache-control", HeaderValue::from_static("max-age=60"));
        headers.append("set-cookie", HeaderValue::from_static("a=1"));
        headers.append("set-cookie", HeaderValue::from_static("b=2"));

        let filtered = without_hop_by_hop(&headers);

        assert_eq!(filtered.len(), 3);
        assert!(filtered.get("connection").is_none());
        assert_eq!(filtered.get_all("set-cookie").iter().count(), 2);
    }

    #[test]
    fn html_content_types_ignore_case_and_parameters() {
        assert!(is_html_content_type("text/html"));
        assert!(is_html_content_type("Text/HTML; charset=UTF-8"));
        assert!(is_html_content_type(" TEXT/html ;charset=windows-1252"));
        assert!(!is_html_content_type("application/xhtml+xml"));
        assert!(!is_html_content_type("text/plain; note=text/html"));
    }
}
