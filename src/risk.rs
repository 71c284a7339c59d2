use indexmap::IndexMap;

use crate::config::DetectionConfig;
use crate::detection::{detect_all, Detections};
use crate::matrix::ScoreMatrix;
use crate::models::{FindingKind, SuspicionProfile};

/// Folds findings into one profile per flagged student, highest score first.
///
/// Students keep the order of their first finding when scores tie.
pub fn score_findings(detections: &Detections) -> Vec<SuspicionProfile> {
    let mut profiles: IndexMap<&str, SuspicionProfile> = IndexMap::new();

    for finding in detections.iter() {
        let entry = profiles
            .entry(finding.student.as_str())
            .or_insert_with(|| SuspicionProfile::new(&finding.student));

        let points = finding.strength;
        entry.score += points;
        match finding.kind() {
            FindingKind::PairSimilarity => entry.pair_similarity += points,
            FindingKind::IsolatedPeak => entry.peak += points,
            FindingKind::Oscillation => entry.oscillation += points,
            FindingKind::CollectiveCluster => entry.collective += points,
        }
        entry.reasons.push(finding.description.clone());
    }

    let mut values: Vec<SuspicionProfile> = profiles.into_values().collect();
    values.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    values
}

/// Full pass: all detectors, then aggregation.
pub fn suspicion_table(
    matrix: &ScoreMatrix,
    config: &DetectionConfig,
) -> (Detections, Vec<SuspicionProfile>) {
    let detections = detect_all(matrix, config);
    let profiles = score_findings(&detections);
    (detections, profiles)
}
