/// Score used until a trained RCT relevance model is reachable.
pub const DEFAULT_RCT_SCORE: f64 = 5.880430138108797;

/// Relevance scorer for a paper's title and abstract.
pub trait RctScorer: Send + Sync {
    fn score(&self, title: &str, abstract_text: &str) -> f64;
}

/// Returns the same score for every paper.
#[derive(Debug, Clone, Copy)]
pub struct StaticRctScorer(pub f64);

impl Default for StaticRctScorer {
    fn default() -> Self {
        Self(DEFAULT_RCT_SCORE)
    }
}

impl RctScorer for StaticRctScorer {
    fn score(&self, _title: &str, _abstract_text: &str) -> f64 {
        self.0
    }
}
