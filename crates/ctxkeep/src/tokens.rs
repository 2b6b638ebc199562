//! Token counting capability.
//!
//! The engine treats token counting as a pure function dependency: given a
//! piece of text, return an integer estimate. Any `Fn(&str) -> usize` closure
//! works; [`CharRatioCounter`] is the built-in estimator.

/// Default characters per token (conservative estimate for English text).
/// Most tokenizers average 3-4 chars per token; we use 3.5 as a middle ground.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.5;

/// Returns a deterministic token estimate for a piece of text.
pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
}

impl<F> TokenCounter for F
where
    F: Fn(&str) -> usize + Send + Sync,
{
    fn count_tokens(&self, text: &str) -> usize {
        self(text)
    }
}

/// Estimates tokens from byte length using a fixed chars-per-token ratio.
#[derive(Debug, Clone, Copy)]
pub struct CharRatioCounter {
    chars_per_token: f64,
}

impl CharRatioCounter {
    /// Create a counter with a calibrated chars-per-token ratio. Pass `None`
    /// (or a non-positive ratio) to use [`DEFAULT_CHARS_PER_TOKEN`].
    pub fn with_calibration(calibrated_cpt: Option<f64>) -> Self {
        let cpt = calibrated_cpt
            .filter(|cpt| *cpt > 0.0)
            .unwrap_or(DEFAULT_CHARS_PER_TOKEN);
        Self {
            chars_per_token: cpt,
        }
    }

    pub fn chars_per_token(&self) -> f64 {
        self.chars_per_token
    }
}

impl Default for CharRatioCounter {
    fn default() -> Self {
        Self::with_calibration(None)
    }
}

impl TokenCounter for CharRatioCounter {
    fn count_tokens(&self, text: &str) -> usize {
        (text.len() as f64 / self.chars_per_token) as usize
    }
}
