//! WASM bindings for visit-engine.
//!
//! Exposes recurrence expansion, preview building and preview editing to
//! JavaScript via `wasm-bindgen`. All complex types cross the boundary as JSON
//! strings. The bindings are stateless: each call rebuilds the preview from the
//! build request and directory snapshot, then applies the edits it is given.
//!
//! ## Build process
//!
//! ```sh
//! cargo build -p visit-engine-wasm --target wasm32-unknown-unknown --release
//! wasm-bindgen --target web --out-dir pkg/ \
//!   target/wasm32-unknown-unknown/release/visit_engine_wasm.wasm
//! ```

use serde::Serialize;
use visit_engine::{BuildRequest, EditRequest, EngineConfig, InMemoryDirectory, PreviewBuilder, PreviewSession};
use wasm_bindgen::prelude::*;

// ---------------------------------------------------------------------------
// JSON plumbing, kept free of JsValue so it can be tested natively
// ---------------------------------------------------------------------------

fn parse_config(json: Option<&str>) -> Result<EngineConfig, String> {
    match json {
        Some(json) if !json.trim().is_empty() => EngineConfig::from_json(json).map_err(|e| e.to_string()),
        _ => Ok(EngineConfig::default()),
    }
}

fn parse_build(json: &str) -> Result<BuildRequest, String> {
    serde_json::from_str(json).map_err(|e| format!("Invalid build request JSON: {}", e))
}

fn parse_directory(json: &str) -> Result<InMemoryDirectory, String> {
    InMemoryDirectory::from_json(json).map_err(|e| format!("Invalid directory JSON: {}", e))
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("Serialization error: {}", e))
}

fn expand_json(build_json: &str, config_json: Option<&str>) -> Result<String, String> {
    let config = parse_config(config_json)?;
    let request = parse_build(build_json)?;
    request.anchor.validate().map_err(|e| e.to_string())?;
    let dates = visit_engine::expand_dates(request.anchor.date, request.rule.as_ref(), config.max_occurrences)
        .map_err(|e| e.to_string())?;
    to_json(&dates)
}

fn preview_json(
    build_json: &str,
    directory_json: &str,
    edits_json: Option<&str>,
    config_json: Option<&str>,
) -> Result<String, String> {
    let config = parse_config(config_json)?;
    let request = parse_build(build_json)?;
    let directory = parse_directory(directory_json)?;
    let edits: Vec<EditRequest> = match edits_json {
        Some(json) => serde_json::from_str(json).map_err(|e| format!("Invalid edits JSON: {}", e))?,
        None => Vec::new(),
    };

    let builder = PreviewBuilder::new(&directory, &directory, config);
    let mut session = PreviewSession::new(builder.build_request(&request).map_err(|e| e.to_string())?);
    session
        .apply_all(builder.detector(), &edits)
        .map_err(|e| e.to_string())?;
    let preview = session.preview().map_err(|e| e.to_string())?;
    to_json(&preview.response())
}

// ---------------------------------------------------------------------------
// WASM exports
// ---------------------------------------------------------------------------

/// Expand an anchor and optional rule into dates.
///
/// `build_json` is `{anchor, rule?}`. Returns a JSON array of `YYYY-MM-DD`
/// strings, anchor first.
#[wasm_bindgen(js_name = "expandRecurrence")]
pub fn expand_recurrence(build_json: &str, config_json: Option<String>) -> Result<String, JsValue> {
    expand_json(build_json, config_json.as_deref()).map_err(|e| JsValue::from_str(&e))
}

/// Build a schedule preview against a directory snapshot.
///
/// `directory_json` is `{commitments, authorizations}`. Returns the preview as
/// JSON: `{occurrences, conflicts, selected, canCommit}`.
#[wasm_bindgen(js_name = "buildPreview")]
pub fn build_preview(build_json: &str, directory_json: &str, config_json: Option<String>) -> Result<String, JsValue> {
    preview_json(build_json, directory_json, None, config_json.as_deref()).map_err(|e| JsValue::from_str(&e))
}

/// Build a preview and apply a JSON array of edits in order.
///
/// Each edit is `{op, ...}` with `op` one of `select`, `deselect`, `selectAll`,
/// `deselectAll`, `remove`, `reassignStaff`, `acknowledge`, `unacknowledge`.
/// Fails without a result if any edit names an unknown occurrence.
#[wasm_bindgen(js_name = "applyEdits")]
pub fn apply_edits(
    build_json: &str,
    directory_json: &str,
    edits_json: &str,
    config_json: Option<String>,
) -> Result<String, JsValue> {
    preview_json(build_json, directory_json, Some(edits_json), config_json.as_deref())
        .map_err(|e| JsValue::from_str(&e))
}
