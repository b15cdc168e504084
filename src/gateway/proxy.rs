use std::net::SocketAddr;
use std::time::Duration;

use axum::body::{Body, HttpBody};
use axum::extract::{ConnectInfo, Request};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::response::Response;
use reqwest::redirect::Policy;
use reqwest::{Client, Url};
use tracing::debug;

use crate::utils::http_helpers::ServiceError;

/// Connection-scoped headers that are never forwarded in either direction.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "proxy-authenticate",
    "proxy-authorization",
];

fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    }
}

/// Rewrites an inbound path and query onto the upstream base URL.
pub fn upstream_url(base: &Url, path: &str, query: Option<&str>) -> Url {
    let mut url = base.clone();
    url.set_path(&join_paths(base.path(), path));
    let query = match (base.query().filter(|q| !q.is_empty()), query) {
        (Some(fixed), Some(inbound)) => Some(format!("{}&{}", fixed, inbound)),
        (Some(fixed), None) => Some(fixed.to_string()),
        (None, inbound) => inbound.map(str::to_string),
    };
    url.set_query(query.as_deref());
    url
}

/// Copies `headers` minus hop-by-hop ones and anything `Connection` names.
fn end_to_end_headers(headers: &HeaderMap) -> HeaderMap {
    let named_by_connection: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .collect();

    let mut forwarded = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let lower = name.as_str();
        if HOP_BY_HOP_HEADERS.contains(&lower) || named_by_connection.iter().any(|n| n == lower) {
            continue;
        }
        forwarded.append(name.clone(), value.clone());
    }
    forwarded
}

fn append_forwarded_for(headers: &mut HeaderMap, client: SocketAddr) {
    let name = HeaderName::from_static("x-forwarded-for");
    let ip = client.ip().to_string();
    let value = match headers.get(&name).and_then(|prior| prior.to_str().ok()) {
        Some(prior) => format!("{}, {}", prior, ip),
        None => ip,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(name, value);
    }
}

/// Client for proxied traffic. Redirects are not followed, so a 3xx reaches
/// the caller as the upstream sent it.
pub fn proxy_client() -> Result<Client, reqwest::Error> {
    Client::builder().redirect(Policy::none()).build()
}

/// Sends `req` to `upstream` and hands back the upstream's answer.
///
/// Bodies are streamed both ways. A transport failure is a
/// `ServiceError::ProxyTransport`; any status the upstream returns, errors
/// and redirects included, is passed through untouched when `client` comes
/// from [`proxy_client`]. reqwest adds `accept: */*` to requests that carry
/// no `Accept` header; every other inbound header is forwarded as is.
pub async fn forward(
    client: &Client,
    upstream: &Url,
    req: Request,
    timeout: Option<Duration>,
) -> Result<Response, ServiceError> {
    let (parts, body) = req.into_parts();
    let url = upstream_url(upstream, parts.uri.path(), parts.uri.query());

    let mut headers = end_to_end_headers(&parts.headers);
    headers.remove(header::HOST);
    if let Some(ConnectInfo(client_addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
        append_forwarded_for(&mut headers, *client_addr);
    }

    debug!("Forwarding {} {} to {}", parts.method, parts.uri, url);
    let mut outbound = client.request(parts.method, url).headers(headers);
    if body.size_hint().exact() != Some(0) {
        outbound = outbound.body(reqwest::Body::wrap_stream(body.into_data_stream()));
    }
    if let Some(timeout) = timeout {
        outbound = outbound.timeout(timeout);
    }

    let upstream_response = outbound
        .send()
        .await
        .map_err(|e| ServiceError::ProxyTransport(e.to_string()))?;

    let status = upstream_response.status();
    let headers = end_to_end_headers(upstream_response.headers());
    let mut response = Response::new(Body::from_stream(upstream_response.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}
