//! Head/tail retention window shared by the size-triggered strategies.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Default turn-count ceiling.
pub const DEFAULT_MAX_SIZE: usize = 100;

/// Default number of leading turns always retained.
pub const DEFAULT_KEEP_FIRST: usize = 1;

/// A validated `max_size` / `keep_first` pair.
///
/// Construction guarantees `max_size >= 1` and `keep_first < max_size / 2`,
/// so the head can never consume the whole retained window.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(try_from = "RawWindow")]
pub struct RetentionWindow {
    max_size: usize,
    keep_first: usize,
}

impl RetentionWindow {
    pub fn new(max_size: usize, keep_first: usize) -> Result<Self, ConfigError> {
        if max_size < 1 {
            return Err(ConfigError::MaxSizeTooSmall { max_size });
        }
        if keep_first >= max_size / 2 {
            return Err(ConfigError::KeepFirstTooLarge {
                keep_first,
                max_size,
            });
        }
        Ok(Self {
            max_size,
            keep_first,
        })
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn keep_first(&self) -> usize {
        self.keep_first
    }

    /// Whether `turn_count` alone is enough to trigger truncation.
    pub fn exceeded_by(&self, turn_count: usize) -> bool {
        turn_count > self.max_size
    }

    /// Number of turns a truncation pass aims to retain.
    pub fn target_size(&self, turn_count: usize) -> usize {
        self.max_size.min(turn_count) / 2
    }
}

impl Default for RetentionWindow {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            keep_first: DEFAULT_KEEP_FIRST,
        }
    }
}

#[derive(Deserialize)]
struct RawWindow {
    max_size: usize,
    keep_first: usize,
}

impl TryFrom<RawWindow> for RetentionWindow {
    type Error = ConfigError;

    fn try_from(raw: RawWindow) -> Result<Self, Self::Error> {
        Self::new(raw.max_size, raw.keep_first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let window = RetentionWindow::default();
        assert_eq!(window.max_size(), 100);
        assert_eq!(window.keep_first(), 1);
    }

    #[test]
    fn keep_first_must_be_below_half() {
        let err = RetentionWindow::new(10, 5).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::KeepFirstTooLarge {
                keep_first: 5,
                max_size: 10
            }
        ));
        assert!(
            err.to_string()
                .contains("must be less than half of max_size")
        );
        assert!(RetentionWindow::new(10, 4).is_ok());
    }

    #[test]
    fn max_size_must_be_positive() {
        assert!(matches!(
            RetentionWindow::new(0, 0),
            Err(ConfigError::MaxSizeTooSmall { max_size: 0 })
        ));
        // max_size 1 leaves no room for any head: 0 >= 1 / 2.
        assert!(RetentionWindow::new(1, 0).is_err());
        assert!(RetentionWindow::new(2, 0).is_ok());
    }

    #[test]
    fn target_size_uses_smaller_of_limit_and_length() {
        let window = RetentionWindow::new(10, 2).unwrap();
        assert_eq!(window.target_size(15), 5);
        assert_eq!(window.target_size(7), 3);
        assert!(window.exceeded_by(11));
        assert!(!window.exceeded_by(10));
    }

    #[test]
    fn deserialization_validates() {
        let ok: RetentionWindow =
            serde_json::from_str(r#"{"max_size": 20, "keep_first": 3}"#).unwrap();
        assert_eq!(ok.keep_first(), 3);
        assert!(serde_json::from_str::<RetentionWindow>(r#"{"max_size": 4, "keep_first": 2}"#).is_err());
        assert!(serde_json::from_str::<RetentionWindow>(r#"{"max_size": 4, "keep_first": -1}"#).is_err());
    }
}
