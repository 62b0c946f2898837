//! HTTP response helpers.

use anyhow::{Result, anyhow};
use serde::Serialize;
use tiny_http::{Header, Request, Response, StatusCode};

use crate::utils::mime::types::{HTML, JSON, PLAIN};

/// Respond with a rewritten document.
pub fn respond_html(request: Request, body: String) -> Result<()> {
    send_body(request, 200, HTML, body.into_bytes())
}

/// Respond with a JSON document.
pub fn respond_json<T: Serialize>(request: Request, status: u16, value: &T) -> Result<()> {
    let body = serde_json::to_vec(value)?;
    send_body(request, status, JSON, body)
}

/// Respond with `302 Found` to `location`.
pub fn respond_redirect(request: Request, location: &str) -> Result<()> {
    let response = Response::empty(StatusCode(302)).with_header(make_header("Location", location)?);
    request.respond(response)?;
    Ok(())
}

/// Respond with a plain-text status page, e.g. `403 Forbidden`.
pub fn respond_status(request: Request, status: u16, reason: &str) -> Result<()> {
    send_body(request, status, PLAIN, format!("{status} {reason}").into_bytes())
}

pub fn respond_not_found(request: Request) -> Result<()> {
    respond_status(request, 404, "Not Found")
}

/// Respond with 503 Service Unavailable (server shutting down).
pub fn respond_unavailable(request: Request) -> Result<()> {
    respond_status(request, 503, "Service Unavailable")
}

fn send_body(request: Request, status: u16, content_type: &str, body: Vec<u8>) -> Result<()> {
    let response = Response::from_data(body)
        .with_status_code(StatusCode(status))
        .with_header(make_header("Content-Type", content_type)?);
    request.respond(response)?;
    Ok(())
}

fn make_header(key: &str, value: &str) -> Result<Header> {
    Header::from_bytes(key, value).map_err(|()| anyhow!("invalid header value for {key}"))
}

/// Value of header `name`, if present.
pub fn header(request: &Request, name: &str) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|h| h.field.as_str().as_str().eq_ignore_ascii_case(name))
        .map(|h| h.value.to_string())
}
