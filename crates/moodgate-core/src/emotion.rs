use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, ModelError};

/// Fixed emotion label set, in model output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    Angry,
    Disgust,
    Fear,
    Happy,
    Sad,
    Surprise,
    Neutral,
}

impl EmotionLabel {
    pub const ALL: [EmotionLabel; 7] = [
        EmotionLabel::Angry,
        EmotionLabel::Disgust,
        EmotionLabel::Fear,
        EmotionLabel::Happy,
        EmotionLabel::Sad,
        EmotionLabel::Surprise,
        EmotionLabel::Neutral,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EmotionLabel::Angry => "angry",
            EmotionLabel::Disgust => "disgust",
            EmotionLabel::Fear => "fear",
            EmotionLabel::Happy => "happy",
            EmotionLabel::Sad => "sad",
            EmotionLabel::Surprise => "surprise",
            EmotionLabel::Neutral => "neutral",
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Percentage-style confidence per label. Scores sum to roughly 100.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmotionScores {
    scores: BTreeMap<EmotionLabel, f32>,
}

impl EmotionScores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: EmotionLabel, score: f32) {
        self.scores.insert(label, score);
    }

    pub fn get(&self, label: EmotionLabel) -> Option<f32> {
        self.scores.get(&label).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EmotionLabel, f32)> + '_ {
        self.scores.iter().map(|(label, score)| (*label, *score))
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn total(&self) -> f32 {
        self.scores.values().sum()
    }

    /// Label with the highest score. Ties resolve to the earlier label.
    pub fn dominant(&self) -> Option<(EmotionLabel, f32)> {
        self.iter().fold(None, |best, (label, score)| match best {
            Some((_, best_score)) if best_score >= score => best,
            _ => Some((label, score)),
        })
    }
}

impl FromIterator<(EmotionLabel, f32)> for EmotionScores {
    fn from_iter<I: IntoIterator<Item = (EmotionLabel, f32)>>(iter: I) -> Self {
        Self {
            scores: iter.into_iter().collect(),
        }
    }
}

/// An emotion classifier over the analysis image.
///
/// Face localization is the model's business. When no face is confidently
/// located it must still return a best-effort estimate instead of failing.
pub trait EmotionModel: Send + Sync {
    fn classify(&self, image: &RgbImage) -> Result<EmotionScores, ModelError>;
}

impl<F> EmotionModel for F
where
    F: Fn(&RgbImage) -> Result<EmotionScores, ModelError> + Send + Sync,
{
    fn classify(&self, image: &RgbImage) -> Result<EmotionScores, ModelError> {
        self(image)
    }
}

/// Dominant emotion of one classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmotionReading {
    pub label: EmotionLabel,
    pub score: f32,
}

#[derive(Clone)]
pub struct EmotionClassifier {
    model: Arc<dyn EmotionModel>,
}

impl EmotionClassifier {
    pub fn new(model: Arc<dyn EmotionModel>) -> Self {
        Self { model }
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&RgbImage) -> Result<EmotionScores, ModelError> + Send + Sync + 'static,
    {
        Self::new(Arc::new(f))
    }

    /// Classify the analysis image and pick the dominant emotion.
    pub fn classify(&self, image: &RgbImage) -> Result<EmotionReading, AnalysisError> {
        let scores = self.model.classify(image).map_err(AnalysisError::Emotion)?;

        if let Some((label, _)) = scores.iter().find(|(_, score)| !score.is_finite()) {
            return Err(AnalysisError::NonFiniteScore { label });
        }

        let (label, score) = scores.dominant().ok_or(AnalysisError::EmptyScores)?;

        let total = scores.total();
        if (total - 100.0).abs() > 1.0 {
            tracing::debug!(total, "emotion scores do not sum to 100");
        }
        tracing::trace!(%label, score, "dominant emotion");

        Ok(EmotionReading { label, score })
    }
}

impl fmt::Debug for EmotionClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmotionClassifier").finish_non_exhaustive()
    }
}
