use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    PairSimilarity,
    IsolatedPeak,
    Oscillation,
    CollectiveCluster,
}

impl FindingKind {
    pub fn label(self) -> &'static str {
        match self {
            FindingKind::PairSimilarity => "pair similarity",
            FindingKind::IsolatedPeak => "isolated peak",
            FindingKind::Oscillation => "oscillation",
            FindingKind::CollectiveCluster => "collective cluster",
        }
    }
}

/// One alternation spotted by the oscillation detector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Swing {
    pub from: String,
    pub middle: String,
    pub to: String,
    pub before_delta: f64,
    pub after_delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FindingDetails {
    PairSimilarity {
        partner: String,
        similar_days: usize,
        max_consecutive: usize,
        ratio: f64,
        /// First five similar days; `similar_days` keeps the full count.
        days: Vec<String>,
    },
    IsolatedPeak {
        day: String,
        score: f64,
        mean_before: f64,
        mean_after: f64,
        context: String,
    },
    Oscillation {
        alternations: usize,
        swings: Vec<Swing>,
    },
    CollectiveCluster {
        day: String,
        score: i64,
        cluster_size: usize,
        partners: Vec<String>,
    },
}

impl FindingDetails {
    pub fn kind(&self) -> FindingKind {
        match self {
            FindingDetails::PairSimilarity { .. } => FindingKind::PairSimilarity,
            FindingDetails::IsolatedPeak { .. } => FindingKind::IsolatedPeak,
            FindingDetails::Oscillation { .. } => FindingKind::Oscillation,
            FindingDetails::CollectiveCluster { .. } => FindingKind::CollectiveCluster,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub student: String,
    pub strength: f64,
    pub details: FindingDetails,
    pub description: String,
}

impl Finding {
    pub fn kind(&self) -> FindingKind {
        self.details.kind()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuspicionProfile {
    pub student: String,
    pub score: f64,
    pub pair_similarity: f64,
    pub peak: f64,
    pub oscillation: f64,
    pub collective: f64,
    pub reasons: Vec<String>,
}

impl SuspicionProfile {
    pub fn new(student: &str) -> Self {
        Self {
            student: student.to_string(),
            score: 0.0,
            pair_similarity: 0.0,
            peak: 0.0,
            oscillation: 0.0,
            collective: 0.0,
            reasons: Vec::new(),
        }
    }

    pub fn finding_count(&self) -> usize {
        self.reasons.len()
    }
}

/// One flagged pair, collapsed from its two mirrored findings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairSummary {
    pub student: String,
    pub partner: String,
    pub similar_days: usize,
    pub max_consecutive: usize,
    pub ratio: f64,
    pub days: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub day: String,
    pub score: i64,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressionScore {
    pub student: String,
    pub global_score: f64,
    pub average: f64,
    pub trend: f64,
    pub regularity: f64,
    pub min: f64,
    pub max: f64,
    pub std: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassStats {
    pub class_average: f64,
    pub class_std: f64,
    pub best_student: String,
    pub best_score: f64,
    pub hardest_day: String,
    pub hardest_day_score: f64,
    pub easiest_day: String,
    pub easiest_day_score: f64,
}
