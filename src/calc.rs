use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::{self, Caller, ADMIN_ROLES};
use crate::calendar::{self, PERIODS_PER_SEMESTER, SEMESTERS_PER_YEAR};
use crate::db::Store;
use crate::error::{CoreError, CoreResult};
use crate::roster;

pub const PASS_MARK: f64 = 70.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GradeStatus {
    Pass,
    Fail,
}

impl GradeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GradeStatus::Pass => "pass",
            GradeStatus::Fail => "fail",
        }
    }

    fn from_db(s: &str) -> Option<Self> {
        match s {
            "pass" => Some(GradeStatus::Pass),
            "fail" => Some(GradeStatus::Fail),
            _ => None,
        }
    }
}

pub fn grade_status(average: f64) -> GradeStatus {
    if average >= PASS_MARK {
        GradeStatus::Pass
    } else {
        GradeStatus::Fail
    }
}

/// Semester average over the period scores of one subject.
///
/// Nothing is produced until every period has a score. The divisor is the
/// fixed period count, not the number of scores.
pub fn semester_average(scores: &[f64]) -> Option<f64> {
    if (scores.len() as i64) < PERIODS_PER_SEMESTER {
        return None;
    }
    Some(scores.iter().sum::<f64>() / PERIODS_PER_SEMESTER as f64)
}

/// Yearly average; needs exactly one average per semester.
pub fn yearly_average(semester_averages: &[f64]) -> Option<f64> {
    if semester_averages.len() as i64 != SEMESTERS_PER_YEAR {
        return None;
    }
    Some(semester_averages.iter().sum::<f64>() / SEMESTERS_PER_YEAR as f64)
}

/// Identifies the averages touched by one grade write.
#[derive(Debug, Clone)]
pub struct AverageKey<'a> {
    pub student_id: &'a str,
    pub subject_id: &'a str,
    pub academic_year_id: &'a str,
    pub semester_id: &'a str,
    pub school_id: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Average {
    pub id: String,
    pub student_id: String,
    pub subject_id: String,
    pub academic_year_id: String,
    /// `None` on the yearly row.
    pub semester_id: Option<String>,
    pub semester_number: Option<i64>,
    pub semester_average: Option<f64>,
    pub yearly_average: Option<f64>,
    pub grade_status: Option<GradeStatus>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AverageOutcome {
    pub semester: Option<Average>,
    pub yearly: Option<Average>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAverage {
    #[serde(flatten)]
    pub average: Average,
    pub subject_name: String,
    pub subject_code: String,
    pub is_core: bool,
}

const AVERAGE_SELECT: &str = "SELECT a.id, a.student_id, a.subject_id, a.academic_year_id, a.semester_id,
            s.semester_number, a.semester_average, a.yearly_average, a.grade_status
     FROM student_averages a
     LEFT JOIN semesters s ON a.semester_id = s.id";

fn average_from_row(r: &Row<'_>) -> rusqlite::Result<Average> {
    let status: Option<String> = r.get(8)?;
    Ok(Average {
        id: r.get(0)?,
        student_id: r.get(1)?,
        subject_id: r.get(2)?,
        academic_year_id: r.get(3)?,
        semester_id: r.get(4)?,
        semester_number: r.get(5)?,
        semester_average: r.get(6)?,
        yearly_average: r.get(7)?,
        grade_status: status.as_deref().and_then(GradeStatus::from_db),
    })
}

fn load_average(conn: &Connection, id: &str) -> CoreResult<Average> {
    conn.query_row(&format!("{AVERAGE_SELECT} WHERE a.id = ?"), [id], average_from_row)
        .optional()?
        .ok_or_else(|| CoreError::not_found("average", id))
}

/// All average rows of a student for one year, semester rows before the
/// yearly row of each subject.
pub(crate) fn load_averages(
    conn: &Connection,
    student_id: &str,
    academic_year_id: &str,
) -> CoreResult<Vec<Average>> {
    let mut stmt = conn.prepare(&format!(
        "{AVERAGE_SELECT}
         WHERE a.student_id = ? AND a.academic_year_id = ?
         ORDER BY a.subject_id, s.semester_number IS NULL, s.semester_number"
    ))?;
    let rows = stmt
        .query_map([student_id, academic_year_id], average_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn upsert_semester_row(conn: &Connection, key: &AverageKey<'_>, average: f64) -> CoreResult<String> {
    let status = grade_status(average).as_str();
    let now = Utc::now().to_rfc3339();
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM student_averages
             WHERE student_id = ? AND subject_id = ? AND academic_year_id = ? AND semester_id = ?",
            (key.student_id, key.subject_id, key.academic_year_id, key.semester_id),
            |r| r.get(0),
        )
        .optional()?;

    if let Some(id) = existing {
        conn.execute(
            "UPDATE student_averages
             SET semester_average = ?, grade_status = ?, updated_at = ?
             WHERE id = ?",
            (average, status, &now, &id),
        )?;
        return Ok(id);
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO student_averages(id, student_id, subject_id, academic_year_id, school_id,
                                      semester_id, semester_average, grade_status, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            key.student_id,
            key.subject_id,
            key.academic_year_id,
            key.school_id,
            key.semester_id,
            average,
            status,
            &now,
        ),
    )?;
    Ok(id)
}

fn upsert_yearly_row(conn: &Connection, key: &AverageKey<'_>, average: f64) -> CoreResult<String> {
    let status = grade_status(average).as_str();
    let now = Utc::now().to_rfc3339();
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM student_averages
             WHERE student_id = ? AND subject_id = ? AND academic_year_id = ? AND semester_id IS NULL",
            (key.student_id, key.subject_id, key.academic_year_id),
            |r| r.get(0),
        )
        .optional()?;

    if let Some(id) = existing {
        conn.execute(
            "UPDATE student_averages
             SET yearly_average = ?, grade_status = ?, updated_at = ?
             WHERE id = ?",
            (average, status, &now, &id),
        )?;
        return Ok(id);
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO student_averages(id, student_id, subject_id, academic_year_id, school_id,
                                      yearly_average, grade_status, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            key.student_id,
            key.subject_id,
            key.academic_year_id,
            key.school_id,
            average,
            status,
            &now,
        ),
    )?;
    Ok(id)
}

/// Recomputes the semester average and then the yearly average for one
/// student and subject from whatever grades are on file.
///
/// Reads and writes go through `conn` as-is; callers run this inside the
/// transaction that wrote the grade. Nothing guards against another writer
/// changing the same grades between the read and the upsert, so a
/// concurrent write can leave a stale row until the next recompute.
pub fn recompute_averages(conn: &Connection, key: &AverageKey<'_>) -> CoreResult<AverageOutcome> {
    let mut stmt = conn.prepare(
        "SELECT g.score
         FROM student_grades g
         JOIN assessment_periods ap ON g.assessment_period_id = ap.id
         WHERE g.student_id = ? AND g.subject_id = ? AND ap.semester_id = ?",
    )?;
    let scores = stmt
        .query_map([key.student_id, key.subject_id, key.semester_id], |r| {
            r.get::<_, f64>(0)
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut outcome = AverageOutcome::default();
    if let Some(avg) = semester_average(&scores) {
        let id = upsert_semester_row(conn, key, avg)?;
        outcome.semester = Some(load_average(conn, &id)?);
    }

    let mut stmt = conn.prepare(
        "SELECT semester_average FROM student_averages
         WHERE student_id = ? AND subject_id = ? AND academic_year_id = ?
           AND semester_id IS NOT NULL AND semester_average IS NOT NULL",
    )?;
    let semester_averages = stmt
        .query_map([key.student_id, key.subject_id, key.academic_year_id], |r| {
            r.get::<_, f64>(0)
        })?
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(avg) = yearly_average(&semester_averages) {
        let id = upsert_yearly_row(conn, key, avg)?;
        outcome.yearly = Some(load_average(conn, &id)?);
    }

    tracing::debug!(
        student_id = key.student_id,
        subject_id = key.subject_id,
        semester_id = key.semester_id,
        scores = scores.len(),
        semester_average = ?outcome.semester.as_ref().and_then(|a| a.semester_average),
        yearly_average = ?outcome.yearly.as_ref().and_then(|a| a.yearly_average),
        "averages recomputed"
    );
    Ok(outcome)
}

/// Re-runs the aggregator for one student, subject and semester without a
/// grade write. Used to repair rows left stale by concurrent writers.
pub fn recompute(
    store: &Store,
    caller: &Caller,
    student_id: &str,
    subject_id: &str,
    semester_id: &str,
) -> CoreResult<AverageOutcome> {
    auth::require_role(caller, ADMIN_ROLES, "recompute averages")?;
    let outcome = store.transaction("averages.recompute", |tx| {
        let student = roster::load_student(tx, student_id)?;
        auth::ensure_school_access(caller, &student.school_id)?;
        let subject = roster::load_subject(tx, subject_id)?;
        let (academic_year_id, school_id) = calendar::semester_owner(tx, semester_id)?;
        if subject.school_id != student.school_id || school_id != student.school_id {
            return Err(CoreError::Validation(
                "student, subject and semester must belong to the same school".into(),
            ));
        }
        recompute_averages(
            tx,
            &AverageKey {
                student_id,
                subject_id,
                academic_year_id: &academic_year_id,
                semester_id,
                school_id: &school_id,
            },
        )
    })?;

    tracing::info!(
        student_id,
        subject_id,
        semester_id,
        "averages recomputed on request"
    );
    Ok(outcome)
}

/// Every average row of a student for a year, labelled with its subject.
pub fn student_grade_report(
    store: &Store,
    caller: &Caller,
    student_id: &str,
    academic_year_id: &str,
) -> CoreResult<Vec<SubjectAverage>> {
    let conn = store.conn();
    let student = roster::load_student(conn, student_id)?;
    auth::ensure_school_access(caller, &student.school_id)?;
    calendar::load_year(conn, academic_year_id)?;

    let mut stmt = conn.prepare(
        "SELECT a.id, a.student_id, a.subject_id, a.academic_year_id, a.semester_id,
                s.semester_number, a.semester_average, a.yearly_average, a.grade_status,
                sub.subject_name, sub.subject_code, sub.is_core
         FROM student_averages a
         JOIN subjects sub ON a.subject_id = sub.id
         LEFT JOIN semesters s ON a.semester_id = s.id
         WHERE a.student_id = ? AND a.academic_year_id = ?
         ORDER BY sub.subject_name, s.semester_number IS NULL, s.semester_number",
    )?;
    let rows = stmt
        .query_map([student_id, academic_year_id], |r| {
            Ok(SubjectAverage {
                average: average_from_row(r)?,
                subject_name: r.get(9)?,
                subject_code: r.get(10)?,
                is_core: r.get::<_, i64>(11)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::calendar::{create_academic_year, AcademicYearDetail, NewAcademicYear};
    use crate::db::Store;
    use crate::roster::fixtures::admin;

    pub fn year(store: &Store, school_id: &str) -> AcademicYearDetail {
        create_academic_year(
            store,
            &admin(school_id),
            &NewAcademicYear {
                year_name: Some("2025-2026".into()),
                start_date: Some("2025-09-01".into()),
                end_date: Some("2026-06-30".into()),
                is_current: true,
                ..Default::default()
            },
        )
        .expect("create year")
    }
}
