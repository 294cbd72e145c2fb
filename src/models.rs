use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeRecord {
    pub term: String,
    pub grade: f64,
}

impl GradeRecord {
    pub fn new(term: impl Into<String>, grade: f64) -> Self {
        Self {
            term: term.into(),
            grade,
        }
    }
}

/// A student's grade history. `grades` is chronological, oldest first; its
/// order is the time axis used by the trend analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub grades: Vec<GradeRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskReason {
    #[serde(rename = "Low average")]
    LowAverage,
    #[serde(rename = "Declining grades")]
    DecliningGrades,
    #[serde(rename = "Good standing")]
    GoodStanding,
}

impl RiskReason {
    pub fn label(self) -> &'static str {
        match self {
            RiskReason::LowAverage => "Low average",
            RiskReason::DecliningGrades => "Declining grades",
            RiskReason::GoodStanding => "Good standing",
        }
    }
}

impl fmt::Display for RiskReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Full-precision output of one analysis call. Rounding is left to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub average: f64,
    pub slope: f64,
    pub intercept: f64,
    pub latest: f64,
    pub forecast: f64,
    pub is_at_risk: bool,
    pub risk_reason: RiskReason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentInsight {
    pub student_id: String,
    pub student_name: String,
    pub grades: Vec<GradeRecord>,
    pub result: AnalysisResult,
}

impl StudentInsight {
    pub fn status(&self) -> &'static str {
        if self.result.is_at_risk {
            "At Risk"
        } else {
            "OK"
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CohortSummary {
    pub total: usize,
    pub at_risk: usize,
}
