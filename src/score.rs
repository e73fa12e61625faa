//! Prediction-accuracy scoring.
//!
//! Each voter is scored on how close their `predicted_yes` came to the
//! observed yes-ratio of the batch:
//!
//! ```text
//! score = round(100 * (1 - |predicted_yes - yes_ratio|))
//! ```
//!
//! This is only the accuracy half of a Bayesian Truth Serum score. The
//! information-gain term for surprisingly common answers is not computed.
//! Scores are not clamped; predictions outside [0, 1] can fall below 0.

use crate::errors::TaError;
use crate::report::{VoteBatch, VoterId};

/// One scored voter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScoreEntry<'a> {
    pub id: &'a VoterId,
    pub score: i32,
}

/// Scores in batch order, one per record.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScoreTable<'a> {
    entries: Vec<ScoreEntry<'a>>,
    yes_ratio: f32,
}

impl<'a> ScoreTable<'a> {
    pub fn entries(&self) -> &[ScoreEntry<'a>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Observed fraction of `yes` choices; 0.0 for an empty batch.
    pub fn yes_ratio(&self) -> f32 {
        self.yes_ratio
    }
}

/// Fraction of records whose choice is exactly `yes`.
#[allow(clippy::cast_precision_loss)]
pub fn yes_ratio(batch: &VoteBatch) -> Option<f32> {
    if batch.is_empty() {
        return None;
    }
    let yes = batch.iter().filter(|r| r.voted_yes()).count();
    Some(yes as f32 / batch.len() as f32)
}

#[allow(clippy::cast_possible_truncation)]
fn accuracy(predicted_yes: f32, ratio: f32) -> i32 {
    // `as` saturates, so non-finite inputs still map to a fixed integer.
    ((1.0 - (predicted_yes - ratio).abs()) * 100.0).round() as i32
}

/// Scores every record in `batch`. An empty batch yields an empty table.
pub fn score(batch: &VoteBatch) -> Result<ScoreTable<'_>, TaError> {
    let Some(ratio) = yes_ratio(batch) else {
        return Ok(ScoreTable::default());
    };

    let mut entries = Vec::new();
    entries
        .try_reserve_exact(batch.len())
        .map_err(|e| TaError::Resource(format!("score table of {} entries: {e}", batch.len())))?;

    entries.extend(batch.iter().map(|r| ScoreEntry {
        id: &r.id,
        score: accuracy(r.predicted_yes, ratio),
    }));

    tracing::debug!(
        voters = entries.len(),
        yes_ratio_bp = (ratio * 10_000.0) as i32,
        "scores computed"
    );

    Ok(ScoreTable {
        entries,
        yes_ratio: ratio,
    })
}
