//! # Session Module
//!
//! Saving and resuming surveys.
//!
//! A session document captures the full aggregate state. Loading is
//! all-or-nothing: the document is decoded and validated completely before
//! the engine is touched, so a rejected document leaves state unchanged.

pub mod document;

use std::fs;
use std::path::Path;

use tracing::info;

use crate::error::Result;
use crate::survey::engine::SurveyEngine;
use document::SessionDocument;

/// Save the engine's state at `now_ms` to `path`
///
/// The document is written to a sibling temporary file and renamed into
/// place so an interrupted save never truncates the previous session.
pub fn save_session<P: AsRef<Path>>(engine: &SurveyEngine, path: P, now_ms: i64) -> Result<()> {
    let path = path.as_ref();
    let document = SessionDocument::from_engine(engine, now_ms);
    let text = document.to_json()?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, text)?;
    fs::rename(&tmp, path)?;

    info!(
        "Saved session to {} ({} observations, {} ms surveyed)",
        path.display(),
        document.sv_beam_reports.len(),
        document.duration
    );
    Ok(())
}

/// Load a session document from `path` into `engine`
///
/// # Errors
///
/// Returns an I/O error, a JSON error, [`SessionVersion`] or
/// [`SessionSchema`]; in every case `engine` is left unchanged.
///
/// [`SessionVersion`]: crate::error::SurveyError::SessionVersion
/// [`SessionSchema`]: crate::error::SurveyError::SessionSchema
pub fn load_session<P: AsRef<Path>>(engine: &mut SurveyEngine, path: P, now_ms: i64) -> Result<()> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    load_session_str(engine, &text, now_ms)?;
    info!("Resumed session from {}", path.display());
    Ok(())
}

/// Load a session document from text into `engine`
pub fn load_session_str(engine: &mut SurveyEngine, text: &str, now_ms: i64) -> Result<()> {
    let state = SessionDocument::from_json(text)?.into_state()?;
    engine.restore(state, now_ms);
    Ok(())
}
