use std::fmt::Write;

use serde::Serialize;

use crate::config::DetectionConfig;
use crate::detection::Detections;
use crate::matrix::{display_name, ScoreMatrix};
use crate::models::{FindingDetails, FindingKind, SuspicionProfile};
use crate::progress;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KindSummary {
    pub kind: FindingKind,
    pub count: usize,
    pub students: usize,
    pub total_strength: f64,
}

pub fn summarize_by_kind(detections: &Detections) -> Vec<KindSummary> {
    [
        FindingKind::PairSimilarity,
        FindingKind::IsolatedPeak,
        FindingKind::Oscillation,
        FindingKind::CollectiveCluster,
    ]
    .into_iter()
    .map(|kind| {
        let findings = detections.of_kind(kind);
        let mut students: Vec<&str> = findings.iter().map(|f| f.student.as_str()).collect();
        students.sort_unstable();
        students.dedup();
        KindSummary {
            kind,
            count: findings.len(),
            students: students.len(),
            total_strength: findings.iter().map(|f| f.strength).sum(),
        }
    })
    .collect()
}

pub fn build_report(
    source: &str,
    matrix: &ScoreMatrix,
    config: &DetectionConfig,
    detections: &Detections,
    profiles: &[SuspicionProfile],
) -> String {
    let summaries = summarize_by_kind(detections);
    let mut output = String::new();

    let _ = writeln!(output, "# Submission Integrity Report");
    let _ = writeln!(
        output,
        "Generated for {} ({} students over {} days)",
        source,
        matrix.student_count(),
        matrix.day_count()
    );
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "Thresholds: pair tolerance {:.1} / {} days / ratio {:.2}; peak {:.0}-{:.0} window {}; \
         oscillation {:.0} x{}; cluster size {}",
        config.pair_tolerance,
        config.pair_min_days,
        config.pair_min_ratio,
        config.peak_low,
        config.peak_high,
        config.peak_window,
        config.oscillation_variation,
        config.oscillation_min_alternations,
        config.cluster_min_students
    );
    let _ = writeln!(
        output,
        "Findings are heuristic signals that warrant a closer look, not proof of misconduct."
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Finding Mix");
    for summary in &summaries {
        let _ = writeln!(
            output,
            "- {}: {} findings across {} students ({:.1} points)",
            summary.kind.label(),
            summary.count,
            summary.students,
            summary.total_strength
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Most Suspicious Students");

    if profiles.is_empty() {
        let _ = writeln!(output, "No student was flagged with these thresholds.");
    } else {
        let _ = writeln!(
            output,
            "| Student | Score | Pairs | Peaks | Oscillation | Collective | Reasons |"
        );
        let _ = writeln!(output, "|---|---|---|---|---|---|---|");
        for profile in profiles.iter().take(20) {
            let _ = writeln!(
                output,
                "| {} | {:.1} | {:.1} | {:.1} | {:.1} | {:.1} | {} |",
                display_name(&profile.student),
                profile.score,
                profile.pair_similarity,
                profile.peak,
                profile.oscillation,
                profile.collective,
                profile.reasons.join("; ")
            );
        }
    }

    let pairs = detections.pairs();
    if !pairs.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Similar Pairs");
        for pair in &pairs {
            let _ = writeln!(
                output,
                "- {} / {}: {} similar days, {} consecutive, ratio {:.2} ({})",
                display_name(&pair.student),
                display_name(&pair.partner),
                pair.similar_days,
                pair.max_consecutive,
                pair.ratio,
                pair.days.join(", ")
            );
        }
    }

    if !detections.isolated_peak.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Isolated Peaks");
        for finding in &detections.isolated_peak {
            if let FindingDetails::IsolatedPeak { day, context, .. } = &finding.details {
                let _ = writeln!(
                    output,
                    "- {} on {}: {}",
                    display_name(&finding.student),
                    day,
                    context
                );
            }
        }
    }

    if !detections.oscillation.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Oscillations");
        for finding in &detections.oscillation {
            if let FindingDetails::Oscillation {
                alternations,
                swings,
            } = &finding.details
            {
                let examples: Vec<String> = swings
                    .iter()
                    .map(|s| {
                        format!(
                            "{}→{}→{} ({:+.0} / {:+.0})",
                            s.from, s.middle, s.to, s.before_delta, s.after_delta
                        )
                    })
                    .collect();
                let _ = writeln!(
                    output,
                    "- {}: {} alternations, e.g. {}",
                    display_name(&finding.student),
                    alternations,
                    examples.join(", ")
                );
            }
        }
    }

    let clusters = detections.clusters();
    if !clusters.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Collective Clusters");
        for cluster in &clusters {
            let mut names: Vec<&str> = cluster
                .members
                .iter()
                .take(5)
                .map(|m| display_name(m))
                .collect();
            if cluster.members.len() > 5 {
                names.push("...");
            }
            let _ = writeln!(
                output,
                "- {}: {} students at {}% ({})",
                cluster.day,
                cluster.members.len(),
                cluster.score,
                names.join(", ")
            );
        }
    }

    let board = progress::leaderboard(matrix);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Progression Leaderboard");

    if board.is_empty() {
        let _ = writeln!(output, "No scores recorded.");
    } else {
        for entry in board.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} global {:.2} (avg {:.1}, trend {:+.2}, regularity {:.1})",
                display_name(&entry.student),
                entry.global_score,
                entry.average,
                entry.trend,
                entry.regularity
            );
        }
    }

    output
}
