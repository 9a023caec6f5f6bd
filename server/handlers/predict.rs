use std::io::Read;

use tiny_http::Request;
use tracing::warn;

use ferrite_mri::{InferenceResult, PipelineError, RawImage};

use crate::routes::{error_response, json_response, no_content, png_response, HttpResponse};
use crate::state::ServerState;
use crate::util::multipart::{extract_boundary, extract_file};

/// Largest accepted request body.
const MAX_BODY: u64 = 32 * 1024 * 1024;

/// Reads the uploaded image from a multipart `file` field or the raw body.
fn read_image(request: &mut Request) -> Result<RawImage, HttpResponse> {
    let content_type = request
        .headers()
        .iter()
        .find(|h| h.field.equiv("Content-Type"))
        .map(|h| h.value.as_str().to_owned())
        .unwrap_or_default();

    let mut body: Vec<u8> = Vec::new();
    if let Err(e) = request.as_reader().take(MAX_BODY + 1).read_to_end(&mut body) {
        return Err(error_response(400, &format!("could not read request body: {}", e)));
    }
    if body.len() as u64 > MAX_BODY {
        return Err(error_response(413, "request body is too large"));
    }

    let bytes = if content_type.starts_with("multipart/form-data") {
        let boundary = extract_boundary(&content_type).unwrap_or_default();
        extract_file(&body, &boundary, "file").unwrap_or_default()
    } else {
        body
    };
    if bytes.is_empty() {
        return Err(error_response(400, "no image was uploaded"));
    }
    RawImage::from_bytes(&bytes).map_err(|e| error_response(400, &e.to_string()))
}

fn pipeline_error(e: PipelineError) -> HttpResponse {
    match e {
        PipelineError::Input(e) => error_response(400, &e.to_string()),
        PipelineError::Aborted { .. } => error_response(503, &e.to_string()),
        PipelineError::Model(_) | PipelineError::Config(_) => {
            warn!(error = %e, "prediction failed");
            error_response(500, &e.to_string())
        }
    }
}

fn predict(request: &mut Request, state: &ServerState) -> Result<InferenceResult, HttpResponse> {
    let image = read_image(request)?;
    let pipeline = state.pipeline().map_err(pipeline_error)?;
    pipeline.run(&image).map_err(pipeline_error)
}

// POST /predict
pub fn handle_summary(request: &mut Request, state: &ServerState) -> HttpResponse {
    match predict(request, state) {
        Ok(result) => match serde_json::to_value(result.summary()) {
            Ok(json) => json_response(200, &json),
            Err(e) => error_response(500, &e.to_string()),
        },
        Err(response) => response,
    }
}

// POST /predict/overlay
pub fn handle_overlay(request: &mut Request, state: &ServerState) -> HttpResponse {
    let result = match predict(request, state) {
        Ok(result) => result,
        Err(response) => return response,
    };
    if !result.tumor_detected() {
        return no_content();
    }
    match (result.overlay(), result.explanation_error()) {
        (Some(overlay), _) => match overlay.to_png() {
            Ok(png) => png_response(png),
            Err(e) => error_response(500, &e.to_string()),
        },
        (None, Some(e)) => error_response(422, &e.to_string()),
        (None, None) => error_response(422, "no explanation available"),
    }
}
