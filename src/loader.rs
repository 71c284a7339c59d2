use std::path::Path;

use anyhow::Context;
use regex::Regex;
use tracing::{info, warn};

use crate::matrix::{MatrixBuilder, ScoreMatrix};

const EXPORT_PATTERN: &str = r"^hermes_(\d+)_(.+?)_(.+?\d+)_(delivery|git)\.csv$";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportMeta {
    pub year: String,
    pub unit: String,
    pub day_slug: String,
    pub test_type: String,
}

pub fn export_pattern() -> anyhow::Result<Regex> {
    Regex::new(EXPORT_PATTERN).context("invalid export file pattern")
}

/// Parses `hermes_<year>_<unit>_<slug>_<delivery|git>.csv` against [`export_pattern`].
pub fn parse_export_filename(pattern: &Regex, name: &str) -> Option<ExportMeta> {
    let caps = pattern.captures(name)?;
    Some(ExportMeta {
        year: caps[1].to_string(),
        unit: caps[2].to_string(),
        day_slug: caps[3].to_string(),
        test_type: caps[4].to_string(),
    })
}

/// `databootcampd1` becomes `day01`; slugs without a `d<digits>` suffix are kept as is.
pub fn day_label(slug: &str) -> String {
    let Some(pos) = slug.rfind('d') else {
        return slug.to_string();
    };
    let digits = &slug[pos + 1..];
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return slug.to_string();
    }
    format!("day{digits:0>2}")
}

/// Accepts `85`, `85.5`, `85,5` and `85 %`.
fn parse_percentage(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().trim_end_matches('%').trim().replace(',', ".");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}

/// Reads one `;`-separated export into `builder`, returning the number of rows kept.
fn read_export(path: &Path, day: &str, builder: &mut MatrixBuilder) -> anyhow::Result<usize> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let login_col = headers
        .iter()
        .position(|h| h.trim() == "login")
        .unwrap_or(0);
    let score_col = headers
        .iter()
        .position(|h| h.trim() == "test %")
        .unwrap_or(1);

    let mut kept = 0usize;
    for result in reader.records() {
        let record = result?;
        let (Some(login), Some(raw)) = (record.get(login_col), record.get(score_col)) else {
            warn!(file = %path.display(), "skipping short row");
            continue;
        };
        let login = login.trim();
        let Some(score) = parse_percentage(raw) else {
            warn!(file = %path.display(), login, raw, "skipping unparsable score");
            continue;
        };
        if login.is_empty() {
            continue;
        }
        builder.record(login, day, score);
        kept += 1;
    }

    Ok(kept)
}

/// Loads every `delivery` export found in `dir`.
///
/// Files that fail to parse are logged and skipped; the rest still form a matrix.
pub fn load_export_dir(dir: &Path) -> anyhow::Result<ScoreMatrix> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to list {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.ends_with(".csv"))
        .collect();
    names.sort();

    let pattern = export_pattern()?;
    let mut builder = MatrixBuilder::new();
    for name in &names {
        let Some(meta) = parse_export_filename(&pattern, name) else {
            warn!(file = %name, "ignoring file with unexpected name");
            continue;
        };
        if meta.test_type != "delivery" {
            continue;
        }

        let day = day_label(&meta.day_slug);
        match read_export(&dir.join(name), &day, &mut builder) {
            Ok(rows) => info!(
                file = %name,
                year = %meta.year,
                unit = %meta.unit,
                day = %day,
                rows,
                "loaded export"
            ),
            Err(err) => warn!(file = %name, error = %err, "skipping unreadable export"),
        }
    }

    if builder.is_empty() {
        warn!(dir = %dir.display(), "no delivery export found");
    }

    let matrix = builder
        .build()
        .with_context(|| format!("inconsistent exports in {}", dir.display()))?;
    info!(
        students = matrix.student_count(),
        days = matrix.day_count(),
        "score matrix ready"
    );
    Ok(matrix)
}

/// Loads a wide CSV: `login,<day>,<day>,...`, one row per student, empty cell for missing.
pub fn load_wide_csv(path: &Path) -> anyhow::Result<ScoreMatrix> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let headers = reader.headers()?.clone();
    let days: Vec<String> = headers.iter().skip(1).map(|h| h.trim().to_string()).collect();
    let mut matrix = ScoreMatrix::new(days)?;

    for (line, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("bad row {} in {}", line + 2, path.display()))?;
        let Some(student) = record.get(0).map(str::trim) else {
            continue;
        };
        if student.is_empty() {
            continue;
        }

        let mut scores = Vec::with_capacity(matrix.day_count());
        for raw in record.iter().skip(1) {
            if raw.trim().is_empty() {
                scores.push(f64::NAN);
                continue;
            }
            let score = parse_percentage(raw).with_context(|| {
                format!("invalid score {raw:?} for {student} in {}", path.display())
            })?;
            scores.push(score);
        }
        matrix.push_row(student, &scores)?;
    }

    info!(
        students = matrix.student_count(),
        days = matrix.day_count(),
        "score matrix ready"
    );
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_export_name() {
        let pattern = export_pattern().unwrap();
        let meta =
            parse_export_filename(&pattern, "hermes_2025_B-DAT-200_databootcampd01_delivery.csv")
                .unwrap();
        assert_eq!(meta.year, "2025");
        assert_eq!(meta.unit, "B-DAT-200");
        assert_eq!(meta.day_slug, "databootcampd01");
        assert_eq!(meta.test_type, "delivery");
    }

    #[test]
    fn parses_other_units() {
        let cases = [
            ("hermes_2025_W-WEB-100_poolwebd03_delivery.csv", "W-WEB-100", "poolwebd03"),
            ("hermes_2025_P-CPP-100_poolcppd05_git.csv", "P-CPP-100", "poolcppd05"),
        ];
        let pattern = export_pattern().unwrap();
        for (name, unit, slug) in cases {
            let meta = parse_export_filename(&pattern, name).unwrap();
            assert_eq!(meta.unit, unit);
            assert_eq!(meta.day_slug, slug);
        }
    }

    #[test]
    fn rejects_unexpected_names() {
        let pattern = export_pattern().unwrap();
        assert!(parse_export_filename(&pattern, "invalid_file.csv").is_none());
        assert!(parse_export_filename(
            &pattern,
            "hermes_2025_B-DAT-200_databootcampd01_delivery.txt"
        )
        .is_none());
    }

    #[test]
    fn day_labels_are_zero_padded() {
        assert_eq!(day_label("databootcampd1"), "day01");
        assert_eq!(day_label("poolcppd05"), "day05");
        assert_eq!(day_label("poolcppd12"), "day12");
        assert_eq!(day_label("rush2"), "rush2");
    }

    #[test]
    fn percentages_tolerate_suffix_and_comma() {
        assert_eq!(parse_percentage(" 85 %"), Some(85.0));
        assert_eq!(parse_percentage("42,5"), Some(42.5));
        assert_eq!(parse_percentage(""), None);
        assert_eq!(parse_percentage("n/a"), None);
    }

    #[test]
    fn export_dir_builds_sorted_matrix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("hermes_2025_B-DAT-200_databootcampd02_delivery.csv"),
            "login;test %\nana@school.net;40\nbo@school.net;55,5\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("hermes_2025_B-DAT-200_databootcampd01_delivery.csv"),
            "login;test %\nbo@school.net;80\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("hermes_2025_B-DAT-200_databootcampd03_git.csv"),
            "login;test %\nana@school.net;99\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.csv"), "whatever\n").unwrap();

        let matrix = load_export_dir(dir.path()).unwrap();
        assert_eq!(matrix.days(), &["day01".to_string(), "day02".to_string()]);
        assert_eq!(matrix.score_of("bo@school.net", "day01"), Some(80.0));
        assert_eq!(matrix.score_of("bo@school.net", "day02"), Some(55.5));
        assert_eq!(matrix.score_of("ana@school.net", "day01"), None);
        assert_eq!(matrix.student_count(), 2);
    }

    #[test]
    fn export_without_named_columns_uses_first_two() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("hermes_2025_B-DAT-200_databootcampd01_delivery.csv"),
            "user;pct;extra\ncy@school.net;70;x\n",
        )
        .unwrap();

        let matrix = load_export_dir(dir.path()).unwrap();
        assert_eq!(matrix.score_of("cy@school.net", "day01"), Some(70.0));
    }

    #[test]
    fn wide_csv_keeps_column_order_and_gaps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.csv");
        std::fs::write(&path, "login,day01,day02,day03\nana,50,,70\nbo,10,20,30\n").unwrap();

        let matrix = load_wide_csv(&path).unwrap();
        assert_eq!(matrix.day_count(), 3);
        let (student, cells) = matrix.rows().next().unwrap();
        assert_eq!(student, "ana");
        assert_eq!(cells, &[Some(50.0), None, Some(70.0)]);
        assert_eq!(matrix.score_of("bo", "day03"), Some(30.0));
    }

    #[test]
    fn wide_csv_rejects_bad_scores() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.csv");
        std::fs::write(&path, "login,day01\nana,abc\n").unwrap();
        assert!(load_wide_csv(&path).is_err());

        std::fs::write(&path, "login,day01\nana,150\n").unwrap();
        assert!(load_wide_csv(&path).is_err());
    }
}
