use std::path::Path;

use anyhow::Context;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{GradeRecord, Student};
use crate::provider::{self, GradeHistoryProvider, SampleRoster};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// The first name recorded for an id is kept, matching the CSV roster.
const INSERT_STUDENT: &str = r#"
    INSERT INTO grade_trend.students (id, full_name)
    VALUES ($1, $2)
    ON CONFLICT (id) DO NOTHING
"#;

async fn insert_student(pool: &PgPool, id: &str, full_name: &str) -> anyhow::Result<()> {
    let result = sqlx::query(INSERT_STUDENT)
        .bind(id)
        .bind(full_name)
        .execute(pool)
        .await
        .with_context(|| format!("failed to insert student {id}"))?;

    if result.rows_affected() == 0 {
        tracing::debug!(student = %id, "student already recorded, keeping stored name");
    }
    Ok(())
}

/// Appends a grade after the student's latest recorded term. Returns false
/// when the term is already recorded for that student.
async fn append_grade(
    pool: &PgPool,
    student_id: &str,
    term: &str,
    grade: f64,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO grade_trend.grade_records (id, student_id, position, term, grade)
        SELECT $1, $2, COALESCE(MAX(position) + 1, 0), $3, $4
        FROM grade_trend.grade_records
        WHERE student_id = $2
        ON CONFLICT (student_id, term) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(student_id)
    .bind(term)
    .bind(grade)
    .execute(pool)
    .await
    .with_context(|| format!("failed to insert grade {term} for {student_id}"))?;

    Ok(result.rows_affected() > 0)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<usize> {
    let mut inserted = 0usize;
    for student in SampleRoster::students() {
        insert_student(pool, &student.id, &student.name).await?;
        for record in &student.grades {
            if append_grade(pool, &student.id, &record.term, record.grade).await? {
                inserted += 1;
            }
        }
    }
    tracing::info!(inserted, "seeded sample roster");
    Ok(inserted)
}

pub async fn import_csv(pool: &PgPool, csv_path: &Path) -> anyhow::Result<usize> {
    let students = provider::group_rows(provider::read_grade_rows(csv_path)?);
    let mut inserted = 0usize;
    let mut skipped = 0usize;

    for student in students {
        insert_student(pool, &student.id, &student.name).await?;
        for record in &student.grades {
            if append_grade(pool, &student.id, &record.term, record.grade).await? {
                inserted += 1;
            } else {
                skipped += 1;
                tracing::debug!(student = %student.id, term = %record.term, "term already recorded");
            }
        }
    }

    tracing::info!(inserted, skipped, path = %csv_path.display(), "imported grade rows");
    Ok(inserted)
}

pub async fn fetch_students(pool: &PgPool, student_id: Option<&str>) -> anyhow::Result<Vec<Student>> {
    let mut query = String::from(
        "SELECT s.id, s.full_name, g.term, g.grade \
         FROM grade_trend.students s \
         LEFT JOIN grade_trend.grade_records g ON g.student_id = s.id",
    );
    if student_id.is_some() {
        query.push_str(" WHERE s.id = $1");
    }
    query.push_str(" ORDER BY s.id, g.position");

    let mut rows = sqlx::query(&query);
    if let Some(value) = student_id {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    let mut students: Vec<Student> = Vec::new();

    for row in records {
        let id: String = row.get("id");
        let term: Option<String> = row.get("term");
        let grade: Option<f64> = row.get("grade");

        if students.last().map(|s| s.id != id).unwrap_or(true) {
            students.push(Student {
                id,
                name: row.get("full_name"),
                grades: Vec::new(),
            });
        }
        if let (Some(term), Some(grade), Some(student)) = (term, grade, students.last_mut()) {
            student.grades.push(GradeRecord { term, grade });
        }
    }

    Ok(students)
}

pub struct PgRoster {
    pool: PgPool,
    student_id: Option<String>,
}

impl PgRoster {
    pub fn new(pool: PgPool, student_id: Option<String>) -> Self {
        Self { pool, student_id }
    }
}

impl GradeHistoryProvider for PgRoster {
    async fn load_students(&self) -> anyhow::Result<Vec<Student>> {
        let students = fetch_students(&self.pool, self.student_id.as_deref()).await?;
        tracing::info!(students = students.len(), "loaded grade histories from Postgres");
        Ok(students)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existing_student_names_are_not_overwritten() {
        let statement = INSERT_STUDENT.to_lowercase();
        assert!(statement.contains("on conflict (id) do nothing"));
        assert!(!statement.contains("do update"));
    }
}
