use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analysis::{round1, summarize};
use crate::models::{CohortSummary, GradeRecord, StudentInsight};

const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// One bar per term, scaled over 0-100.
pub fn sparkline(grades: &[GradeRecord]) -> String {
    grades
        .iter()
        .map(|record| {
            let share = if record.grade.is_finite() {
                record.grade.clamp(0.0, 100.0) / 100.0
            } else {
                0.0
            };
            let level = (share * (SPARK_LEVELS.len() - 1) as f64).round() as usize;
            SPARK_LEVELS[level.min(SPARK_LEVELS.len() - 1)]
        })
        .collect()
}

/// Rounded slope for display, without a negative zero.
fn display_trend(slope: f64) -> f64 {
    round1(slope) + 0.0
}

pub fn format_line(insight: &StudentInsight) -> String {
    let result = &insight.result;
    format!(
        "- {} ({}) [{}] avg {:.1}, latest {:.1}, forecast {:.1}, trend {:+.1}/term: {}",
        insight.student_name,
        insight.student_id,
        insight.status(),
        round1(result.average),
        round1(result.latest),
        round1(result.forecast),
        display_trend(result.slope),
        result.risk_reason
    )
}

#[derive(Serialize)]
struct JsonReport<'a> {
    generated_at: DateTime<Utc>,
    summary: CohortSummary,
    students: &'a [StudentInsight],
}

pub fn to_json(
    insights: &[StudentInsight],
    summary: CohortSummary,
    generated_at: DateTime<Utc>,
) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&JsonReport {
        generated_at,
        summary,
        students: insights,
    })
}

pub fn build_report(
    scope: Option<&str>,
    insights: &[StudentInsight],
    generated_at: DateTime<Utc>,
) -> String {
    let summary = summarize(insights);
    let mut output = String::new();
    let scope_label = scope.unwrap_or("all students");

    let _ = writeln!(output, "# Grade Trend Early Warning Report");
    let _ = writeln!(
        output,
        "Generated for {} on {}",
        scope_label,
        generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");
    let _ = writeln!(output, "- Students: {}", summary.total);
    let _ = writeln!(output, "- At risk: {}", summary.at_risk);

    if insights.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "No grade histories available.");
        return output;
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Students Needing Attention");
    let mut at_risk = insights.iter().filter(|i| i.result.is_at_risk).peekable();
    if at_risk.peek().is_none() {
        let _ = writeln!(output, "No students are currently at risk.");
    }
    for insight in at_risk {
        let _ = writeln!(output, "{} `{}`", format_line(insight), sparkline(&insight.grades));
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Good Standing");
    let mut ok = insights.iter().filter(|i| !i.result.is_at_risk).peekable();
    if ok.peek().is_none() {
        let _ = writeln!(output, "No students in good standing.");
    }
    for insight in ok {
        let _ = writeln!(output, "{} `{}`", format_line(insight), sparkline(&insight.grades));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze_roster;
    use crate::config::RiskPolicy;
    use crate::provider::SampleRoster;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).unwrap()
    }

    fn sample_insights() -> Vec<StudentInsight> {
        analyze_roster(&SampleRoster::students(), &RiskPolicy::default())
    }

    #[test]
    fn sparkline_scales_and_clamps() {
        let grades = vec![
            GradeRecord::new("T1", 0.0),
            GradeRecord::new("T2", 50.0),
            GradeRecord::new("T3", 100.0),
            GradeRecord::new("T4", 140.0),
            GradeRecord::new("T5", -5.0),
        ];
        assert_eq!(sparkline(&grades), "▁▅██▁");
    }

    #[test]
    fn line_shows_rounded_metrics() {
        let insights = sample_insights();
        let alice = insights
            .iter()
            .find(|i| i.student_id == "s1")
            .unwrap();
        assert_eq!(
            format_line(alice),
            "- Alice Ramos (s1) [At Risk] avg 73.7, latest 69.0, forecast 64.7, trend -4.5/term: Declining grades"
        );
    }

    #[test]
    fn tiny_negative_trend_prints_as_zero() {
        let insight = crate::analysis::analyze_student(
            &crate::models::Student {
                id: "s7".to_string(),
                name: "Gia Flores".to_string(),
                grades: vec![
                    GradeRecord::new("T1", 80.0),
                    GradeRecord::new("T2", 80.0),
                    GradeRecord::new("T3", 79.98),
                ],
            },
            &RiskPolicy::default(),
        );
        assert!(insight.result.slope < 0.0);
        let line = format_line(&insight);
        assert!(line.contains("trend +0.0/term"), "{line}");
    }

    #[test]
    fn json_summary_is_passed_through() {
        let insights = sample_insights();
        let json = to_json(&insights[..1], summarize(&insights), fixed_time()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["summary"]["total"], 5);
        assert_eq!(value["students"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn sample_roster_ranks_at_risk_first() {
        let insights = sample_insights();
        let order: Vec<&str> = insights.iter().map(|i| i.student_id.as_str()).collect();
        assert_eq!(order, vec!["s1", "s3", "s4", "s2", "s5"]);
        assert_eq!(
            summarize(&insights),
            CohortSummary {
                total: 5,
                at_risk: 3
            }
        );
    }

    #[test]
    fn report_lists_sections() {
        let report = build_report(None, &sample_insights(), fixed_time());
        assert!(report.starts_with("# Grade Trend Early Warning Report\n"));
        assert!(report.contains("Generated for all students on 2026-03-02 09:30 UTC"));
        assert!(report.contains("- At risk: 3"));
        let attention = report.find("## Students Needing Attention").unwrap();
        let good = report.find("## Good Standing").unwrap();
        let david = report.find("David Lee").unwrap();
        let ben = report.find("Ben Cruz").unwrap();
        assert!(attention < david && david < good && good < ben);
    }

    #[test]
    fn empty_report_says_so() {
        let report = build_report(Some("s9"), &[], fixed_time());
        assert!(report.contains("Generated for s9"));
        assert!(report.contains("- Students: 0"));
        assert!(report.contains("No grade histories available."));
    }

    #[test]
    fn json_report_keeps_full_precision() {
        let insights = sample_insights();
        let json = to_json(&insights, summarize(&insights), fixed_time()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["summary"]["total"], 5);
        assert_eq!(value["summary"]["at_risk"], 3);
        assert_eq!(value["students"][0]["student_id"], "s1");
        assert_eq!(value["students"][0]["result"]["risk_reason"], "Declining grades");
        let average = value["students"][0]["result"]["average"].as_f64().unwrap();
        assert!((average - 221.0 / 3.0).abs() < 1e-9);
    }
}
