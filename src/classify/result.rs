use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Error};

/// Closed set of waste categories, in model output order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Mixed,
    Organic,
    Paper,
    Plastic,
}

impl Category {
    /// All categories, indexed the way the model emits its scores.
    pub const ALL: [Category; 4] = [
        Category::Mixed,
        Category::Organic,
        Category::Paper,
        Category::Plastic,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Mixed => "mixed",
            Category::Organic => "organic",
            Category::Paper => "paper",
            Category::Plastic => "plastic",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow!("unknown category '{}'", s))
    }
}

/// Arg-max category and its probability.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub category: Category,
    /// Probability in [0, 1].
    pub confidence: f32,
}

/// Why a classification produced no category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// Snapshot could not be captured or written.
    Capture,
    /// Image file could not be read.
    Unreadable,
    /// Image bytes could not be decoded.
    Decode,
    /// Model runtime returned an error.
    Inference,
    /// Model output was not a usable distribution over the categories.
    Output,
    /// Model backend panicked.
    Panic,
}

impl FailureCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCause::Capture => "capture",
            FailureCause::Unreadable => "unreadable",
            FailureCause::Decode => "decode",
            FailureCause::Inference => "inference",
            FailureCause::Output => "output",
            FailureCause::Panic => "panic",
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Unavailable {
    pub cause: FailureCause,
    pub detail: String,
}

/// Terminal result for one snapshot. Never retried.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ClassificationOutcome {
    Classified(Prediction),
    Unavailable(Unavailable),
}

impl ClassificationOutcome {
    pub fn unavailable(cause: FailureCause, detail: impl Into<String>) -> Self {
        ClassificationOutcome::Unavailable(Unavailable {
            cause,
            detail: detail.into(),
        })
    }

    pub fn prediction(&self) -> Option<&Prediction> {
        match self {
            ClassificationOutcome::Classified(prediction) => Some(prediction),
            ClassificationOutcome::Unavailable(_) => None,
        }
    }

    pub fn category(&self) -> Option<Category> {
        self.prediction().map(|p| p.category)
    }

    pub fn confidence(&self) -> Option<f32> {
        self.prediction().map(|p| p.confidence)
    }

    pub fn is_classified(&self) -> bool {
        matches!(self, ClassificationOutcome::Classified(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_order_matches_model_output() {
        assert_eq!(Category::from_index(0), Some(Category::Mixed));
        assert_eq!(Category::from_index(3), Some(Category::Plastic));
        assert_eq!(Category::from_index(4), None);
    }

    #[test]
    fn category_parses_case_insensitively() -> anyhow::Result<()> {
        assert_eq!("Paper".parse::<Category>()?, Category::Paper);
        assert_eq!(" organic ".parse::<Category>()?, Category::Organic);
        assert!("metal".parse::<Category>().is_err());
        Ok(())
    }

    #[test]
    fn unavailable_outcome_has_no_label() {
        let outcome = ClassificationOutcome::unavailable(FailureCause::Decode, "bad jpeg");
        assert!(!outcome.is_classified());
        assert_eq!(outcome.category(), None);
        assert_eq!(outcome.confidence(), None);
    }
}
