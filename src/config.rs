use std::path::Path;

use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};

/// Thresholds for the four detectors. Cheap to clone; pass a fresh one per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    #[serde(alias = "copieur_tolerance")]
    pub pair_tolerance: f64,
    #[serde(alias = "copieur_min_days")]
    pub pair_min_days: usize,
    #[serde(alias = "copieur_min_ratio")]
    pub pair_min_ratio: f64,
    #[serde(alias = "pic_seuil_haut")]
    pub peak_high: f64,
    #[serde(alias = "pic_seuil_bas")]
    pub peak_low: f64,
    #[serde(alias = "pic_fenetre")]
    pub peak_window: usize,
    #[serde(alias = "montagne_seuil_variation")]
    pub oscillation_variation: f64,
    #[serde(alias = "montagne_min_alternances")]
    pub oscillation_min_alternations: usize,
    #[serde(alias = "collectif_min_eleves")]
    pub cluster_min_students: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            pair_tolerance: 1.0,
            pair_min_days: 4,
            pair_min_ratio: 0.4,
            peak_high: 70.0,
            peak_low: 30.0,
            peak_window: 2,
            oscillation_variation: 30.0,
            oscillation_min_alternations: 3,
            cluster_min_students: 3,
        }
    }
}

impl DetectionConfig {
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("invalid detection config in {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.pair_tolerance >= 0.0,
            "pair tolerance must not be negative (got {})",
            self.pair_tolerance
        );
        ensure!(
            (0.0..=1.0).contains(&self.pair_min_ratio),
            "pair min ratio must be within [0, 1] (got {})",
            self.pair_min_ratio
        );
        ensure!(self.pair_min_days > 0, "pair min days must be at least 1");
        ensure!(
            self.peak_low <= self.peak_high,
            "peak low threshold {} is above the high threshold {}",
            self.peak_low,
            self.peak_high
        );
        ensure!(self.peak_window > 0, "peak window must be at least 1 day");
        ensure!(
            self.oscillation_variation >= 0.0,
            "oscillation variation must not be negative (got {})",
            self.oscillation_variation
        );
        ensure!(
            self.oscillation_min_alternations > 0,
            "oscillation min alternations must be at least 1"
        );
        ensure!(
            self.cluster_min_students > 1,
            "a cluster needs at least 2 students"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() {
        let config = DetectionConfig::default();
        assert_eq!(config.pair_tolerance, 1.0);
        assert_eq!(config.pair_min_days, 4);
        assert_eq!(config.pair_min_ratio, 0.4);
        assert_eq!(config.peak_high, 70.0);
        assert_eq!(config.peak_low, 30.0);
        assert_eq!(config.peak_window, 2);
        assert_eq!(config.oscillation_variation, 30.0);
        assert_eq!(config.oscillation_min_alternations, 3);
        assert_eq!(config.cluster_min_students, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn json_accepts_partial_and_legacy_keys() {
        let config: DetectionConfig =
            serde_json::from_str(r#"{"copieur_tolerance": 2.5, "peak_window": 3}"#).unwrap();
        assert_eq!(config.pair_tolerance, 2.5);
        assert_eq!(config.peak_window, 3);
        assert_eq!(config.pair_min_days, 4);
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thresholds.json");
        std::fs::write(&path, r#"{"collectif_min_eleves": 5}"#).unwrap();

        let config = DetectionConfig::from_json_file(&path).unwrap();
        assert_eq!(config.cluster_min_students, 5);
    }

    #[test]
    fn validate_rejects_inverted_peak_thresholds() {
        let config = DetectionConfig {
            peak_low: 80.0,
            ..DetectionConfig::default()
        };
        assert!(config.validate().is_err());

        let config = DetectionConfig {
            pair_min_ratio: 1.5,
            ..DetectionConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
