use crate::routes::{json_response, HttpResponse};
use crate::state::ServerState;

// GET /health
pub fn handle(state: &ServerState) -> HttpResponse {
    json_response(
        200,
        &serde_json::json!({ "status": "ok", "modelsLoaded": state.models_loaded() }),
    )
}
