use crate::matrix::ScoreMatrix;
use crate::models::{ClassStats, ProgressionScore};

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation; zero below two values.
fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let avg = mean(values);
    let var = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Least-squares slope of `y` against `x`.
fn slope(points: &[(f64, f64)]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for (x, y) in points {
        num += (x - mean_x) * (y - mean_y);
        den += (x - mean_x).powi(2);
    }
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

/// Progression metrics for one row; `None` when the student has no score at all.
pub fn progression_score(student: &str, cells: &[Option<f64>]) -> Option<ProgressionScore> {
    let points: Vec<(f64, f64)> = cells
        .iter()
        .enumerate()
        .filter_map(|(idx, cell)| cell.map(|score| (idx as f64, score)))
        .collect();
    let (_, last) = *points.last()?;
    let scores: Vec<f64> = points.iter().map(|(_, y)| *y).collect();

    let average = mean(&scores);
    let std = sample_std(&scores);
    let trend = slope(&points);
    let regularity = if average > 0.0 {
        (100.0 - std / average * 100.0).max(0.0)
    } else {
        0.0
    };
    let global_score = average * 0.4
        + (50.0 + trend * 10.0).clamp(0.0, 100.0) * 0.3
        + regularity * 0.2
        + last * 0.1;

    Some(ProgressionScore {
        student: student.to_string(),
        global_score: round2(global_score),
        average: round2(average),
        trend: round2(trend),
        regularity: round2(regularity),
        min: round2(scores.iter().copied().fold(f64::INFINITY, f64::min)),
        max: round2(scores.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
        std: round2(std),
    })
}

pub fn leaderboard(matrix: &ScoreMatrix) -> Vec<ProgressionScore> {
    let mut board: Vec<ProgressionScore> = matrix
        .rows()
        .filter_map(|(student, cells)| progression_score(student, cells))
        .collect();
    board.sort_by(|a, b| {
        b.global_score
            .partial_cmp(&a.global_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    board
}

pub fn class_stats(matrix: &ScoreMatrix) -> Option<ClassStats> {
    let student_means: Vec<(&str, f64)> = matrix
        .rows()
        .filter_map(|(student, cells)| {
            let present: Vec<f64> = cells.iter().flatten().copied().collect();
            (!present.is_empty()).then(|| (student, mean(&present)))
        })
        .collect();
    let day_means: Vec<(&str, f64)> = matrix
        .days()
        .iter()
        .filter_map(|day| {
            let present: Vec<f64> = student_means
                .iter()
                .filter_map(|(student, _)| matrix.score_of(student, day))
                .collect();
            (!present.is_empty()).then(|| (day.as_str(), mean(&present)))
        })
        .collect();

    let (best_student, best_score) = *student_means.iter().max_by(|a, b| a.1.total_cmp(&b.1))?;
    let (hardest_day, hardest_day_score) = *day_means.iter().min_by(|a, b| a.1.total_cmp(&b.1))?;
    let (easiest_day, easiest_day_score) = *day_means.iter().max_by(|a, b| a.1.total_cmp(&b.1))?;

    let averages: Vec<f64> = student_means.iter().map(|(_, avg)| *avg).collect();
    Some(ClassStats {
        class_average: round2(mean(&averages)),
        class_std: round2(sample_std(&averages)),
        best_student: best_student.to_string(),
        best_score: round2(best_score),
        hardest_day: hardest_day.to_string(),
        hardest_day_score: round2(hardest_day_score),
        easiest_day: easiest_day.to_string(),
        easiest_day_score: round2(easiest_day_score),
    })
}
