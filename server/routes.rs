use std::io::Cursor;
use tiny_http::{Header, Method, Request, Response, StatusCode};

use crate::handlers;
use crate::state::SharedState;

pub type HttpResponse = Response<Cursor<Vec<u8>>>;

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

fn response(status: u16, content_type: Option<&str>, body: Vec<u8>) -> HttpResponse {
    let len = body.len();
    let headers = content_type
        .and_then(|ct| Header::from_bytes(&b"Content-Type"[..], ct.as_bytes()).ok())
        .into_iter()
        .collect();
    Response::new(StatusCode(status), headers, Cursor::new(body), Some(len), None)
}

pub fn json_response(status: u16, body: &serde_json::Value) -> HttpResponse {
    response(status, Some("application/json"), body.to_string().into_bytes())
}

pub fn png_response(bytes: Vec<u8>) -> HttpResponse {
    response(200, Some("image/png"), bytes)
}

pub fn error_response(status: u16, message: &str) -> HttpResponse {
    json_response(status, &serde_json::json!({ "error": message }))
}

pub fn no_content() -> HttpResponse {
    response(204, None, Vec::new())
}

pub fn not_found() -> HttpResponse {
    error_response(404, "not found")
}

// ---------------------------------------------------------------------------
// Request dispatcher
// ---------------------------------------------------------------------------

/// Dispatches one request and sends its response.
pub fn dispatch(mut request: Request, state: SharedState) {
    let method = request.method().clone();
    let url = request.url().to_owned();
    let path = url.split('?').next().unwrap_or("").to_owned();

    let response = match (&method, path.as_str()) {
        (Method::Get, "/health") => handlers::health::handle(&state),
        (Method::Post, "/predict") => handlers::predict::handle_summary(&mut request, &state),
        (Method::Post, "/predict/overlay") => handlers::predict::handle_overlay(&mut request, &state),
        _ => not_found(),
    };

    tracing::debug!(method = ?method, %path, "request");
    let _ = request.respond(response);
}
