use crate::config::RiskPolicy;
use crate::models::{AnalysisResult, CohortSummary, GradeRecord, RiskReason, Student, StudentInsight};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Regression {
    pub slope: f64,
    pub intercept: f64,
}

pub fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Least-squares fit of `values` against their index (0, 1, 2, ...).
pub fn linear_regression(values: &[f64]) -> Regression {
    let n = values.len();
    if n == 0 {
        return Regression {
            slope: 0.0,
            intercept: 0.0,
        };
    }

    let x_mean = (n as f64 - 1.0) / 2.0;
    let y_mean = average(values);
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        numerator += dx * (y - y_mean);
        denominator += dx * dx;
    }

    let slope = if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    };
    Regression {
        slope,
        intercept: y_mean - slope * x_mean,
    }
}

fn clamp_forecast(predicted: f64, policy: &RiskPolicy) -> f64 {
    predicted.max(policy.forecast_floor).min(policy.forecast_ceiling)
}

/// Predicted grade for the term after the last one, inside the policy bounds.
pub fn forecast_next(values: &[f64], policy: &RiskPolicy) -> f64 {
    let fit = linear_regression(values);
    clamp_forecast(fit.slope * values.len() as f64 + fit.intercept, policy)
}

pub fn analyze(grades: &[GradeRecord], policy: &RiskPolicy) -> AnalysisResult {
    let values: Vec<f64> = grades.iter().map(|record| record.grade).collect();
    let average = average(&values);
    let fit = linear_regression(&values);
    let latest = values.last().copied().unwrap_or(0.0);
    let forecast = forecast_next(&values, policy);

    let low_average = average < policy.low_average_below;
    let declining = fit.slope < policy.decline_slope_below && latest < policy.decline_latest_below;
    let risk_reason = if low_average {
        RiskReason::LowAverage
    } else if declining {
        RiskReason::DecliningGrades
    } else {
        RiskReason::GoodStanding
    };

    AnalysisResult {
        average,
        slope: fit.slope,
        intercept: fit.intercept,
        latest,
        forecast,
        is_at_risk: low_average || declining,
        risk_reason,
    }
}

pub fn analyze_student(student: &Student, policy: &RiskPolicy) -> StudentInsight {
    let result = analyze(&student.grades, policy);
    tracing::debug!(
        student = %student.id,
        terms = student.grades.len(),
        average = result.average,
        slope = result.slope,
        at_risk = result.is_at_risk,
        "analyzed grade history"
    );
    StudentInsight {
        student_id: student.id.clone(),
        student_name: student.name.clone(),
        grades: student.grades.clone(),
        result,
    }
}

pub fn analyze_roster(students: &[Student], policy: &RiskPolicy) -> Vec<StudentInsight> {
    let mut insights: Vec<StudentInsight> = students
        .iter()
        .map(|student| analyze_student(student, policy))
        .collect();
    rank_insights(&mut insights);
    insights
}

/// At-risk students first. The sort is stable, so input order is kept
/// within each group.
pub fn rank_insights(insights: &mut [StudentInsight]) {
    insights.sort_by_key(|insight| !insight.result.is_at_risk);
}

pub fn summarize(insights: &[StudentInsight]) -> CohortSummary {
    CohortSummary {
        total: insights.len(),
        at_risk: insights.iter().filter(|insight| insight.result.is_at_risk).count(),
    }
}

/// One decimal place, for display.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
