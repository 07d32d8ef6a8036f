pub mod filter;
pub mod record;
pub mod tier;

pub use filter::*;
pub use record::*;
pub use tier::*;

#[derive(Debug, thiserror::Error)]
pub enum RecordsError {
    #[error("invalid records json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parses a JSON array of business records.
///
/// Coordinates that are not numbers decode as missing rather than failing the
/// batch; such records are simply not renderable.
pub fn load_records_json(payload: &str) -> Result<Vec<BusinessRecord>, RecordsError> {
    let records: Vec<BusinessRecord> = serde_json::from_str(payload)?;
    let unrenderable = records.iter().filter(|r| !r.is_renderable()).count();
    if unrenderable > 0 {
        tracing::debug!(
            total = records.len(),
            unrenderable,
            "loaded records with missing coordinates"
        );
    }
    Ok(records)
}
