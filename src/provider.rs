use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::models::{GradeRecord, Student};

/// Source of chronological grade histories. The analysis never looks past
/// this boundary, so demo data, files and databases are interchangeable.
#[allow(async_fn_in_trait)]
pub trait GradeHistoryProvider {
    async fn load_students(&self) -> anyhow::Result<Vec<Student>>;
}

/// Built-in demo roster, three terms per student.
pub struct SampleRoster;

impl SampleRoster {
    pub fn students() -> Vec<Student> {
        let roster: [(&str, &str, [f64; 3]); 5] = [
            ("s1", "Alice Ramos", [78.0, 74.0, 69.0]),
            ("s2", "Ben Cruz", [92.0, 88.0, 90.0]),
            ("s3", "Carla Mendoza", [61.0, 58.0, 55.0]),
            ("s4", "David Lee", [45.0, 48.0, 47.0]),
            ("s5", "Ella Santos", [80.0, 78.0, 76.0]),
        ];

        roster
            .iter()
            .map(|(id, name, grades)| Student {
                id: id.to_string(),
                name: name.to_string(),
                grades: grades
                    .iter()
                    .enumerate()
                    .map(|(i, grade)| GradeRecord::new(format!("T{}", i + 1), *grade))
                    .collect(),
            })
            .collect()
    }
}

impl GradeHistoryProvider for SampleRoster {
    async fn load_students(&self) -> anyhow::Result<Vec<Student>> {
        Ok(Self::students())
    }
}

/// One line of a grade CSV: `student_id,name,term,grade`.
#[derive(Debug, Clone, Deserialize)]
pub struct GradeRow {
    pub student_id: String,
    pub name: String,
    pub term: String,
    pub grade: f64,
}

pub fn read_grade_rows(path: &Path) -> anyhow::Result<Vec<GradeRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut rows = Vec::new();
    for (index, result) in reader.deserialize::<GradeRow>().enumerate() {
        // index 0 is the first data line, line 2 of the file
        let row = result.with_context(|| {
            format!("invalid grade row at line {} of {}", index + 2, path.display())
        })?;
        rows.push(row);
    }
    Ok(rows)
}

/// Groups rows by student in order of first appearance. Grades keep file
/// order, which is the time axis for the trend.
pub fn group_rows(rows: Vec<GradeRow>) -> Vec<Student> {
    let mut students: Vec<Student> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let slot = match index.get(&row.student_id) {
            Some(&slot) => {
                if students[slot].name != row.name {
                    tracing::warn!(
                        student = %row.student_id,
                        kept = %students[slot].name,
                        ignored = %row.name,
                        "conflicting student name in grade rows"
                    );
                }
                slot
            }
            None => {
                students.push(Student {
                    id: row.student_id.clone(),
                    name: row.name.clone(),
                    grades: Vec::new(),
                });
                index.insert(row.student_id.clone(), students.len() - 1);
                students.len() - 1
            }
        };
        students[slot].grades.push(GradeRecord::new(row.term, row.grade));
    }

    students
}

pub struct CsvRoster {
    path: PathBuf,
}

impl CsvRoster {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl GradeHistoryProvider for CsvRoster {
    async fn load_students(&self) -> anyhow::Result<Vec<Student>> {
        let rows = read_grade_rows(&self.path)?;
        let row_count = rows.len();
        let students = group_rows(rows);
        tracing::info!(
            path = %self.path.display(),
            rows = row_count,
            students = students.len(),
            "loaded grade histories from CSV"
        );
        Ok(students)
    }
}
