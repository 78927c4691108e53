use serde::Deserialize;

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const DEFAULT_MIN_DISTANCE: u64 = 15;
/// Frames at or below this score are near-blank and never become candidates.
pub const DEFAULT_SCORE_FLOOR: f64 = 10.0;
pub const DEFAULT_CENTER_WEIGHT: f64 = 0.7;
pub const DEFAULT_JPEG_QUALITY: u8 = 95;
pub const DEFAULT_SCORING_BATCH: usize = 16;

/// Tunables for one analysis session. Every field is optional on the wire;
/// `effective_*` accessors apply defaults and clamp to sane ranges.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub page_size: Option<usize>,
    pub min_distance: Option<u64>,
    pub score_floor: Option<f64>,
    pub center_weight: Option<f64>,
    pub jpeg_quality: Option<u8>,
    /// Frames buffered per parallel scoring batch.
    pub scoring_batch: Option<usize>,
}

impl EngineConfig {
    pub fn effective_page_size(&self) -> usize {
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1)
    }

    pub fn effective_min_distance(&self) -> u64 {
        self.min_distance.unwrap_or(DEFAULT_MIN_DISTANCE)
    }

    pub fn effective_score_floor(&self) -> f64 {
        self.score_floor
            .filter(|f| f.is_finite() && *f >= 0.0)
            .unwrap_or(DEFAULT_SCORE_FLOOR)
    }

    pub fn effective_center_weight(&self) -> f64 {
        self.center_weight
            .filter(|w| w.is_finite())
            .unwrap_or(DEFAULT_CENTER_WEIGHT)
            .clamp(0.0, 1.0)
    }

    pub fn effective_jpeg_quality(&self) -> u8 {
        self.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY).clamp(1, 100)
    }

    pub fn effective_scoring_batch(&self) -> usize {
        self.scoring_batch.unwrap_or(DEFAULT_SCORING_BATCH).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_fields_missing() {
        let config: EngineConfig = serde_json::from_str("{}").expect("parse");
        assert_eq!(config.effective_page_size(), 10);
        assert_eq!(config.effective_min_distance(), 15);
        assert_eq!(config.effective_score_floor(), 10.0);
        assert_eq!(config.effective_center_weight(), 0.7);
        assert_eq!(config.effective_jpeg_quality(), 95);
    }

    #[test]
    fn camel_case_fields_and_clamping() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"pageSize": 0, "minDistance": 30, "centerWeight": 3.0, "jpegQuality": 0}"#)
                .expect("parse");
        assert_eq!(config.effective_page_size(), 1);
        assert_eq!(config.effective_min_distance(), 30);
        assert_eq!(config.effective_center_weight(), 1.0);
        assert_eq!(config.effective_jpeg_quality(), 1);
    }
}
