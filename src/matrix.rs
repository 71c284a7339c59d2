use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MatrixError {
    #[error("student {0} appears more than once")]
    DuplicateStudent(String),
    #[error("day {0} appears more than once")]
    DuplicateDay(String),
    #[error("student {student} has {found} scores, expected {expected}")]
    RowLength {
        student: String,
        expected: usize,
        found: usize,
    },
    #[error("score {score} for {student} on {day} is outside [0, 100]")]
    ScoreOutOfRange {
        student: String,
        day: String,
        score: f64,
    },
}

/// Student × day table of percentage scores.
///
/// Day columns are kept in chronological order and every row has exactly one cell per day.
/// A `None` cell is a missing score. The matrix is never mutated once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreMatrix {
    days: Vec<String>,
    rows: IndexMap<String, Vec<Option<f64>>>,
}

impl ScoreMatrix {
    pub fn new(days: Vec<String>) -> Result<Self, MatrixError> {
        for (idx, day) in days.iter().enumerate() {
            if days[..idx].contains(day) {
                return Err(MatrixError::DuplicateDay(day.clone()));
            }
        }
        Ok(Self {
            days,
            rows: IndexMap::new(),
        })
    }

    /// Appends a row. NaN scores are stored as missing.
    pub fn push_row(&mut self, student: &str, scores: &[f64]) -> Result<(), MatrixError> {
        let cells = scores
            .iter()
            .map(|&score| if score.is_nan() { None } else { Some(score) })
            .collect();
        self.push_cells(student, cells)
    }

    pub fn push_cells(
        &mut self,
        student: &str,
        cells: Vec<Option<f64>>,
    ) -> Result<(), MatrixError> {
        if self.rows.contains_key(student) {
            return Err(MatrixError::DuplicateStudent(student.to_string()));
        }
        if cells.len() != self.days.len() {
            return Err(MatrixError::RowLength {
                student: student.to_string(),
                expected: self.days.len(),
                found: cells.len(),
            });
        }
        for (day, cell) in self.days.iter().zip(cells.iter()) {
            if let Some(score) = *cell {
                if !(0.0..=100.0).contains(&score) {
                    return Err(MatrixError::ScoreOutOfRange {
                        student: student.to_string(),
                        day: day.clone(),
                        score,
                    });
                }
            }
        }
        self.rows.insert(student.to_string(), cells);
        Ok(())
    }

    pub fn days(&self) -> &[String] {
        &self.days
    }

    pub fn day_count(&self) -> usize {
        self.days.len()
    }

    pub fn student_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.days.is_empty()
    }

    /// Rows in insertion order.
    pub fn rows(&self) -> impl Iterator<Item = (&str, &[Option<f64>])> {
        self.rows
            .iter()
            .map(|(student, cells)| (student.as_str(), cells.as_slice()))
    }

    pub fn day_index(&self, day: &str) -> Option<usize> {
        self.days.iter().position(|d| d == day)
    }

    pub fn score_of(&self, student: &str, day: &str) -> Option<f64> {
        let idx = self.day_index(day)?;
        self.rows.get(student).and_then(|cells| cells[idx])
    }

    /// Every student's cell for one day, in row order.
    pub fn column(&self, day_idx: usize) -> impl Iterator<Item = (&str, Option<f64>)> {
        self.rows.iter().map(move |(student, cells)| {
            (student.as_str(), cells.get(day_idx).copied().flatten())
        })
    }
}

/// Collects sparse `(student, day, score)` records from a loader.
///
/// Students keep first-seen order. Days are sorted by label, which is chronological for the
/// zero-padded `dayNN` labels the loaders produce.
#[derive(Debug, Default)]
pub struct MatrixBuilder {
    records: IndexMap<String, IndexMap<String, f64>>,
}

impl MatrixBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later records for the same `(student, day)` replace earlier ones.
    pub fn record(&mut self, student: &str, day: &str, score: f64) {
        self.records
            .entry(student.to_string())
            .or_default()
            .insert(day.to_string(), score);
    }

    pub fn len(&self) -> usize {
        self.records.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn build(self) -> Result<ScoreMatrix, MatrixError> {
        let mut days: Vec<String> = self
            .records
            .values()
            .flat_map(|scores| scores.keys().cloned())
            .collect();
        days.sort();
        days.dedup();

        let mut matrix = ScoreMatrix::new(days)?;
        for (student, scores) in &self.records {
            let cells = matrix
                .days
                .iter()
                .map(|day| scores.get(day).copied().filter(|s| !s.is_nan()))
                .collect();
            matrix.push_cells(student, cells)?;
        }
        Ok(matrix)
    }
}

/// Login part of an email-like student identifier.
pub fn display_name(student: &str) -> &str {
    student.split('@').next().unwrap_or(student)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn days(n: usize) -> Vec<String> {
        (1..=n).map(|d| format!("day{d:02}")).collect()
    }

    #[test]
    fn push_row_stores_nan_as_missing() {
        let mut matrix = ScoreMatrix::new(days(3)).unwrap();
        matrix.push_row("ana", &[10.0, f64::NAN, 30.0]).unwrap();

        assert_eq!(matrix.score_of("ana", "day01"), Some(10.0));
        assert_eq!(matrix.score_of("ana", "day02"), None);
        let (_, cells) = matrix.rows().next().unwrap();
        assert_eq!(cells, &[Some(10.0), None, Some(30.0)]);
    }

    #[test]
    fn rejects_ragged_and_duplicate_rows() {
        let mut matrix = ScoreMatrix::new(days(2)).unwrap();
        matrix.push_row("ana", &[1.0, 2.0]).unwrap();

        assert_eq!(
            matrix.push_row("ana", &[1.0, 2.0]),
            Err(MatrixError::DuplicateStudent("ana".to_string()))
        );
        assert!(matches!(
            matrix.push_row("bo", &[1.0]),
            Err(MatrixError::RowLength {
                expected: 2,
                found: 1,
                ..
            })
        ));
    }

    #[test]
    fn rejects_out_of_range_scores() {
        let mut matrix = ScoreMatrix::new(days(2)).unwrap();
        assert!(matches!(
            matrix.push_row("ana", &[50.0, 120.0]),
            Err(MatrixError::ScoreOutOfRange { .. })
        ));
        assert!(matrix.push_row("bo", &[f64::INFINITY, 2.0]).is_err());
        assert_eq!(matrix.student_count(), 0);
    }

    #[test]
    fn rejects_duplicate_days() {
        let result = ScoreMatrix::new(vec!["day01".to_string(), "day01".to_string()]);
        assert_eq!(result, Err(MatrixError::DuplicateDay("day01".to_string())));
    }

    #[test]
    fn builder_sorts_days_and_fills_gaps() {
        let mut builder = MatrixBuilder::new();
        builder.record("zoe@school.net", "day02", 40.0);
        builder.record("adam@school.net", "day01", 55.0);
        builder.record("zoe@school.net", "day01", 35.0);

        let matrix = builder.build().unwrap();
        assert_eq!(matrix.days(), &["day01".to_string(), "day02".to_string()]);
        let students: Vec<&str> = matrix.rows().map(|(student, _)| student).collect();
        assert_eq!(students, vec!["zoe@school.net", "adam@school.net"]);
        assert_eq!(matrix.score_of("adam@school.net", "day02"), None);
        assert_eq!(matrix.score_of("zoe@school.net", "day01"), Some(35.0));
    }

    #[test]
    fn column_walks_rows_in_order() {
        let mut matrix = ScoreMatrix::new(days(2)).unwrap();
        matrix.push_row("ana", &[10.0, 20.0]).unwrap();
        matrix.push_row("bo", &[f64::NAN, 25.0]).unwrap();

        let first: Vec<_> = matrix.column(0).collect();
        assert_eq!(first, vec![("ana", Some(10.0)), ("bo", None)]);
    }

    #[test]
    fn display_name_strips_domain() {
        assert_eq!(display_name("jane.doe@epitech.eu"), "jane.doe");
        assert_eq!(display_name("plain"), "plain");
    }
}
