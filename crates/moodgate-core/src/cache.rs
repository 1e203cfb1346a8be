use crate::emotion::EmotionReading;

pub const INITIAL_LABEL: &str = "Initializing...";
pub const FAKE_LABEL: &str = "Fake Face";
pub const ERROR_LABEL: &str = "Error";

/// Outcome of one completed analysis cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisResult {
    pub is_real: bool,
    pub label: &'static str,
    pub score: f32,
}

impl AnalysisResult {
    /// Live subject with its dominant emotion.
    pub fn real(reading: EmotionReading) -> Self {
        Self {
            is_real: true,
            label: reading.label.as_str(),
            score: reading.score,
        }
    }

    /// Liveness gate rejected the frame.
    pub fn fake() -> Self {
        Self {
            is_real: false,
            label: FAKE_LABEL,
            score: 0.0,
        }
    }

    /// Analysis failed; `verdict` is whatever verdict the cycle should leave behind.
    pub fn failed(verdict: bool) -> Self {
        Self {
            is_real: verdict,
            label: ERROR_LABEL,
            score: 0.0,
        }
    }
}

/// Borrowed view of the cached verdict/label/score triple.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedResult<'a> {
    pub verdict: bool,
    pub label: &'a str,
    pub score: f32,
}

/// Most recent committed analysis for one session.
///
/// Written only on analyzed frames, read on every frame. A session is driven
/// by exactly one thread, so the cache carries no lock.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultCache {
    verdict: bool,
    label: &'static str,
    score: f32,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self {
            verdict: true,
            label: INITIAL_LABEL,
            score: 0.0,
        }
    }
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite all three fields. Scores are clamped to `[0, 100]`.
    pub fn update(&mut self, result: AnalysisResult) {
        self.verdict = result.is_real;
        self.label = result.label;
        self.score = result.score.clamp(0.0, 100.0);
    }

    pub fn read(&self) -> CachedResult<'static> {
        CachedResult {
            verdict: self.verdict,
            label: self.label,
            score: self.score,
        }
    }

    pub fn verdict(&self) -> bool {
        self.verdict
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn score(&self) -> f32 {
        self.score
    }
}
