use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use crate::config::DetectionConfig;
use crate::matrix::{display_name, ScoreMatrix};
use crate::models::{
    ClusterSummary, Finding, FindingDetails, FindingKind, PairSummary, Swing,
};

/// Mean used for a peak window that runs off the series; high enough that it never looks low.
const EMPTY_WINDOW_MEAN: f64 = 100.0;
const PEAK_STRENGTH: f64 = 6.0;
const CLUSTER_STRENGTH: f64 = 2.0;
const OSCILLATION_CAP: f64 = 7.0;
const MAX_LISTED: usize = 5;

/// Findings of one full detection pass, grouped per detector in emission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Detections {
    pub pair_similarity: Vec<Finding>,
    pub isolated_peak: Vec<Finding>,
    pub oscillation: Vec<Finding>,
    pub collective_cluster: Vec<Finding>,
}

impl Detections {
    /// All findings: pair similarity, then peaks, oscillations and clusters.
    pub fn iter(&self) -> impl Iterator<Item = &Finding> {
        self.pair_similarity
            .iter()
            .chain(&self.isolated_peak)
            .chain(&self.oscillation)
            .chain(&self.collective_cluster)
    }

    pub fn len(&self) -> usize {
        self.pair_similarity.len()
            + self.isolated_peak.len()
            + self.oscillation.len()
            + self.collective_cluster.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn of_kind(&self, kind: FindingKind) -> &[Finding] {
        match kind {
            FindingKind::PairSimilarity => &self.pair_similarity,
            FindingKind::IsolatedPeak => &self.isolated_peak,
            FindingKind::Oscillation => &self.oscillation,
            FindingKind::CollectiveCluster => &self.collective_cluster,
        }
    }

    /// One row per flagged pair, in detection order.
    pub fn pairs(&self) -> Vec<PairSummary> {
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut pairs = Vec::new();

        for finding in &self.pair_similarity {
            let FindingDetails::PairSimilarity {
                partner,
                similar_days,
                max_consecutive,
                ratio,
                days,
            } = &finding.details
            else {
                continue;
            };

            let key = if finding.student <= *partner {
                (finding.student.clone(), partner.clone())
            } else {
                (partner.clone(), finding.student.clone())
            };
            if !seen.insert(key) {
                continue;
            }

            pairs.push(PairSummary {
                student: finding.student.clone(),
                partner: partner.clone(),
                similar_days: *similar_days,
                max_consecutive: *max_consecutive,
                ratio: *ratio,
                days: days.clone(),
            });
        }

        pairs
    }

    /// One row per (day, score) cluster with all of its members.
    pub fn clusters(&self) -> Vec<ClusterSummary> {
        let mut clusters: IndexMap<(String, i64), Vec<String>> = IndexMap::new();

        for finding in &self.collective_cluster {
            if let FindingDetails::CollectiveCluster { day, score, .. } = &finding.details {
                clusters
                    .entry((day.clone(), *score))
                    .or_default()
                    .push(finding.student.clone());
            }
        }

        clusters
            .into_iter()
            .map(|((day, score), members)| ClusterSummary {
                day,
                score,
                members,
            })
            .collect()
    }
}

/// Runs the four detectors concurrently over the same matrix.
pub fn detect_all(matrix: &ScoreMatrix, config: &DetectionConfig) -> Detections {
    let ((pair_similarity, isolated_peak), (oscillation, collective_cluster)) = rayon::join(
        || {
            rayon::join(
                || detect_pair_similarity(matrix, config),
                || detect_isolated_peaks(matrix, config),
            )
        },
        || {
            rayon::join(
                || detect_oscillations(matrix, config),
                || detect_collective_clusters(matrix, config),
            )
        },
    );

    let detections = Detections {
        pair_similarity,
        isolated_peak,
        oscillation,
        collective_cluster,
    };
    debug!(
        total = detections.len(),
        pair_similarity = detections.pair_similarity.len(),
        isolated_peak = detections.isolated_peak.len(),
        oscillation = detections.oscillation.len(),
        collective_cluster = detections.collective_cluster.len(),
        "detection pass complete"
    );
    detections
}

fn is_similar(a: Option<f64>, b: Option<f64>, tolerance: f64) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => (a - b).abs() <= tolerance,
        _ => false,
    }
}

pub fn pair_strength(similar_days: usize, max_consecutive: usize) -> f64 {
    let extra = (similar_days as f64 - 3.0).min(3.0);
    let streak_bonus = if max_consecutive >= 2 { 2.0 } else { 0.0 };
    4.0 + extra + streak_bonus
}

/// Students whose scores stay within `pair_tolerance` of each other on many days.
///
/// Every unordered pair is compared day by day. A flagged pair yields two findings, one per
/// student, each naming the other as partner.
pub fn detect_pair_similarity(matrix: &ScoreMatrix, config: &DetectionConfig) -> Vec<Finding> {
    let mut findings = Vec::new();
    let day_count = matrix.day_count();
    if matrix.student_count() < 2 || day_count == 0 {
        return findings;
    }

    let days = matrix.days();
    let rows: Vec<(&str, &[Option<f64>])> = matrix.rows().collect();

    for (idx, (first, first_scores)) in rows.iter().enumerate() {
        for (second, second_scores) in &rows[idx + 1..] {
            let mut similar: Vec<&str> = Vec::new();
            let mut streak = 0usize;
            let mut max_consecutive = 0usize;

            for (day, (a, b)) in days
                .iter()
                .zip(first_scores.iter().zip(second_scores.iter()))
            {
                if is_similar(*a, *b, config.pair_tolerance) {
                    similar.push(day);
                    streak += 1;
                    max_consecutive = max_consecutive.max(streak);
                } else {
                    streak = 0;
                }
            }

            let ratio = similar.len() as f64 / day_count as f64;
            if similar.len() < config.pair_min_days || ratio < config.pair_min_ratio {
                continue;
            }

            let strength = pair_strength(similar.len(), max_consecutive);
            let listed: Vec<String> = similar
                .iter()
                .take(MAX_LISTED)
                .map(|day| day.to_string())
                .collect();

            for (student, partner) in [(*first, *second), (*second, *first)] {
                findings.push(Finding {
                    student: student.to_string(),
                    strength,
                    details: FindingDetails::PairSimilarity {
                        partner: partner.to_string(),
                        similar_days: similar.len(),
                        max_consecutive,
                        ratio,
                        days: listed.clone(),
                    },
                    description: format!(
                        "{} similar days with {} ({} consecutive)",
                        similar.len(),
                        display_name(partner),
                        max_consecutive
                    ),
                });
            }
        }
    }

    findings
}

/// `None` when every cell in a non-empty window is missing.
fn window_mean(cells: &[Option<f64>]) -> Option<f64> {
    if cells.is_empty() {
        return Some(EMPTY_WINDOW_MEAN);
    }
    let present: Vec<f64> = cells.iter().flatten().copied().collect();
    if present.is_empty() {
        return None;
    }
    Some(present.iter().sum::<f64>() / present.len() as f64)
}

/// A high score with low averages on both sides.
pub fn detect_isolated_peaks(matrix: &ScoreMatrix, config: &DetectionConfig) -> Vec<Finding> {
    let mut findings = Vec::new();
    let days = matrix.days();
    let window = config.peak_window;

    for (student, cells) in matrix.rows() {
        for (idx, cell) in cells.iter().enumerate() {
            let Some(score) = *cell else {
                continue;
            };
            if score < config.peak_high {
                continue;
            }

            let before = &cells[idx.saturating_sub(window)..idx];
            let after_end = idx.saturating_add(1).saturating_add(window).min(cells.len());
            let after = &cells[idx + 1..after_end];
            let (Some(mean_before), Some(mean_after)) = (window_mean(before), window_mean(after))
            else {
                continue;
            };

            if mean_before >= config.peak_low || mean_after >= config.peak_low {
                continue;
            }

            let day = &days[idx];
            findings.push(Finding {
                student: student.to_string(),
                strength: PEAK_STRENGTH,
                details: FindingDetails::IsolatedPeak {
                    day: day.clone(),
                    score,
                    mean_before,
                    mean_after,
                    context: format!("{mean_before:.0}% → {score:.0}% → {mean_after:.0}%"),
                },
                description: format!(
                    "Isolated peak on {day}: {score:.0}% (context: {mean_before:.0}% → {mean_after:.0}%)"
                ),
            });
        }
    }

    findings
}

/// Large swings whose direction keeps flipping from one day to the next.
pub fn detect_oscillations(matrix: &ScoreMatrix, config: &DetectionConfig) -> Vec<Finding> {
    let mut findings = Vec::new();
    let days = matrix.days();
    let threshold = config.oscillation_variation;

    for (student, cells) in matrix.rows() {
        let mut alternations = 0usize;
        let mut swings = Vec::new();

        for idx in 2..cells.len() {
            let (Some(first), Some(middle), Some(last)) =
                (cells[idx - 2], cells[idx - 1], cells[idx])
            else {
                continue;
            };
            let before_delta = middle - first;
            let after_delta = last - middle;

            if before_delta.abs() < threshold || after_delta.abs() < threshold {
                continue;
            }
            // strict sign change; a flat step is never an alternation
            if before_delta * after_delta >= 0.0 {
                continue;
            }

            alternations += 1;
            if swings.len() < MAX_LISTED {
                swings.push(Swing {
                    from: days[idx - 2].clone(),
                    middle: days[idx - 1].clone(),
                    to: days[idx].clone(),
                    before_delta,
                    after_delta,
                });
            }
        }

        if alternations < config.oscillation_min_alternations {
            continue;
        }

        findings.push(Finding {
            student: student.to_string(),
            strength: (alternations as f64 * 1.5).min(OSCILLATION_CAP),
            details: FindingDetails::Oscillation {
                alternations,
                swings,
            },
            description: format!("{alternations} rapid alternations (roller-coaster pattern)"),
        });
    }

    findings
}

/// Nearest whole point, ties to even.
fn bucket_of(score: f64) -> i64 {
    score.round_ties_even() as i64
}

/// Groups of students sharing the same rounded score on one day.
pub fn detect_collective_clusters(
    matrix: &ScoreMatrix,
    config: &DetectionConfig,
) -> Vec<Finding> {
    let mut findings = Vec::new();
    let min_students = config.cluster_min_students;
    if matrix.student_count() < min_students {
        return findings;
    }

    for (day_idx, day) in matrix.days().iter().enumerate() {
        let mut buckets: IndexMap<i64, Vec<&str>> = IndexMap::new();
        for (student, cell) in matrix.column(day_idx) {
            if let Some(score) = cell {
                buckets.entry(bucket_of(score)).or_default().push(student);
            }
        }

        let mut clusters: Vec<(i64, Vec<&str>)> = buckets
            .into_iter()
            .filter(|(_, members)| members.len() >= min_students)
            .collect();
        clusters.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

        for (score, members) in clusters {
            for student in &members {
                let partners = members
                    .iter()
                    .filter(|other| *other != student)
                    .take(MAX_LISTED)
                    .map(|other| other.to_string())
                    .collect();

                findings.push(Finding {
                    student: student.to_string(),
                    strength: CLUSTER_STRENGTH,
                    details: FindingDetails::CollectiveCluster {
                        day: day.clone(),
                        score,
                        cluster_size: members.len(),
                        partners,
                    },
                    description: format!(
                        "Collective cluster on {day}: {} students at {score}%",
                        members.len()
                    ),
                });
            }
        }
    }

    findings
}
