//! Grade ledger: one score per student, subject and assessment period.
//!
//! A grade write and the average recompute it triggers commit together.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{self, Caller, Role, GRADE_WRITER_ROLES};
use crate::calc::{self, AverageKey, AverageOutcome};
use crate::calendar::{self, AssessmentPeriod};
use crate::db::Store;
use crate::error::{CoreError, CoreResult};
use crate::roster::{self, Class, Subject};

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 100.0;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeEntry {
    pub student_id: Option<String>,
    pub class_id: Option<String>,
    pub subject_id: Option<String>,
    pub assessment_period_id: Option<String>,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub id: String,
    pub student_id: String,
    pub class_id: String,
    pub subject_id: String,
    pub assessment_period_id: String,
    pub academic_year_id: String,
    pub school_id: String,
    pub score: f64,
    pub teacher_id: Option<String>,
    pub entered_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnteredGrade {
    pub grade: Grade,
    pub averages: AverageOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSheetRow {
    pub student_id: String,
    pub student_number: String,
    pub first_name: String,
    pub last_name: String,
    pub grade_id: Option<String>,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSheet {
    pub class: Class,
    pub subject: Subject,
    pub period: AssessmentPeriod,
    pub rows: Vec<GradeSheetRow>,
}

pub fn validate_score(score: Option<f64>) -> CoreResult<f64> {
    match score {
        None => Err(CoreError::Validation("score is required".into())),
        Some(s) if s.is_finite() && (MIN_SCORE..=MAX_SCORE).contains(&s) => Ok(s),
        Some(_) => Err(CoreError::Validation(format!(
            "score must be between {MIN_SCORE} and {MAX_SCORE}"
        ))),
    }
}

fn grade_from_row(r: &Row<'_>) -> rusqlite::Result<Grade> {
    Ok(Grade {
        id: r.get(0)?,
        student_id: r.get(1)?,
        class_id: r.get(2)?,
        subject_id: r.get(3)?,
        assessment_period_id: r.get(4)?,
        academic_year_id: r.get(5)?,
        school_id: r.get(6)?,
        score: r.get(7)?,
        teacher_id: r.get(8)?,
        entered_at: r.get(9)?,
        updated_at: r.get(10)?,
    })
}

/// Checks the subject is taught in the class and, for teachers, that the
/// caller is the one teaching it.
fn ensure_teaches(conn: &Connection, caller: &Caller, class_id: &str, subject_id: &str) -> CoreResult<()> {
    let assigned: Option<Option<String>> = conn
        .query_row(
            "SELECT teacher_id FROM class_subjects WHERE class_id = ? AND subject_id = ?",
            (class_id, subject_id),
            |r| r.get(0),
        )
        .optional()?;
    let Some(teacher_id) = assigned else {
        return Err(CoreError::Validation(
            "subject is not taught in this class".into(),
        ));
    };
    if caller.role == Role::Teacher && (teacher_id.is_none() || teacher_id != caller.user_id) {
        return Err(CoreError::Forbidden(
            "you are not assigned to teach this subject in this class".into(),
        ));
    }
    Ok(())
}

fn is_enrolled(conn: &Connection, student_id: &str, class_id: &str) -> CoreResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM student_enrollments
             WHERE student_id = ? AND class_id = ? AND status = 'enrolled'",
            (student_id, class_id),
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Records a score, replacing any earlier score for the same student,
/// subject and period, then refreshes the affected averages.
pub fn enter_grade(store: &Store, caller: &Caller, entry: &GradeEntry) -> CoreResult<EnteredGrade> {
    auth::require_role(caller, GRADE_WRITER_ROLES, "enter grades")?;
    let score = validate_score(entry.score)?;
    let student_id = roster::required(&entry.student_id, "studentId")?;
    let class_id = roster::required(&entry.class_id, "classId")?;
    let subject_id = roster::required(&entry.subject_id, "subjectId")?;
    let period_id = roster::required(&entry.assessment_period_id, "assessmentPeriodId")?;

    let entered = store.transaction("grades.enter", |tx| {
        let ctx = calendar::period_context(tx, period_id)?;
        auth::ensure_school_access(caller, &ctx.school_id)?;
        if ctx.is_locked {
            tracing::warn!(
                period_id = %ctx.period_id,
                student_id,
                subject_id,
                user_id = caller.user_id.as_deref().unwrap_or("-"),
                "grade write rejected: period locked"
            );
            return Err(CoreError::LockedPeriod {
                period_id: ctx.period_id,
            });
        }

        let student = roster::load_student(tx, student_id)?;
        let class = roster::load_class(tx, class_id)?;
        let subject = roster::load_subject(tx, subject_id)?;
        for owner in [&student.school_id, &class.school_id, &subject.school_id] {
            if *owner != ctx.school_id {
                return Err(CoreError::Validation(
                    "student, class, subject and period must belong to the same school".into(),
                ));
            }
        }
        if !is_enrolled(tx, student_id, class_id)? {
            return Err(CoreError::Validation(
                "student is not enrolled in this class".into(),
            ));
        }
        ensure_teaches(tx, caller, class_id, subject_id)?;

        let now = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO student_grades(id, student_id, class_id, subject_id, assessment_period_id,
                                        academic_year_id, school_id, score, teacher_id, entered_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(student_id, subject_id, assessment_period_id) DO UPDATE SET
               class_id = excluded.class_id,
               score = excluded.score,
               teacher_id = excluded.teacher_id,
               entered_at = excluded.entered_at,
               updated_at = excluded.updated_at",
            (
                Uuid::new_v4().to_string(),
                student_id,
                class_id,
                subject_id,
                period_id,
                &ctx.academic_year_id,
                &ctx.school_id,
                score,
                &caller.user_id,
                &now,
                &now,
            ),
        )?;
        let grade = tx.query_row(
            "SELECT id, student_id, class_id, subject_id, assessment_period_id, academic_year_id,
                    school_id, score, teacher_id, entered_at, updated_at
             FROM student_grades
             WHERE student_id = ? AND subject_id = ? AND assessment_period_id = ?",
            (student_id, subject_id, period_id),
            grade_from_row,
        )?;

        let averages = calc::recompute_averages(
            tx,
            &AverageKey {
                student_id,
                subject_id,
                academic_year_id: &ctx.academic_year_id,
                semester_id: &ctx.semester_id,
                school_id: &ctx.school_id,
            },
        )?;

        tracing::info!(
            grade_id = %grade.id,
            student_id,
            subject_id,
            semester = ctx.semester_number,
            period = ctx.period_number,
            score,
            "grade entered"
        );
        Ok(EnteredGrade { grade, averages })
    })?;

    Ok(entered)
}

/// Every enrolled student of a class with their score, if any, for one
/// subject and period.
pub fn class_subject_grade_sheet(
    store: &Store,
    caller: &Caller,
    class_id: &str,
    subject_id: &str,
    period_id: &str,
) -> CoreResult<GradeSheet> {
    let conn = store.conn();
    let class = roster::load_class(conn, class_id)?;
    auth::ensure_school_access(caller, &class.school_id)?;
    let subject = roster::load_subject(conn, subject_id)?;
    let period = calendar::load_period(conn, period_id)?;
    if subject.school_id != class.school_id || period.school_id != class.school_id {
        return Err(CoreError::Validation(
            "class, subject and period must belong to the same school".into(),
        ));
    }
    ensure_teaches(conn, caller, class_id, subject_id)?;

    let mut stmt = conn.prepare(
        "SELECT st.id, st.student_number, st.first_name, st.last_name, g.id, g.score
         FROM student_enrollments e
         JOIN students st ON e.student_id = st.id
         LEFT JOIN student_grades g
           ON g.student_id = st.id AND g.subject_id = ? AND g.assessment_period_id = ?
         WHERE e.class_id = ? AND e.status = 'enrolled'
         ORDER BY st.first_name, st.last_name",
    )?;
    let rows = stmt
        .query_map((subject_id, period_id, class_id), |r| {
            Ok(GradeSheetRow {
                student_id: r.get(0)?,
                student_number: r.get(1)?,
                first_name: r.get(2)?,
                last_name: r.get(3)?,
                grade_id: r.get(4)?,
                score: r.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(GradeSheet {
        class,
        subject,
        period,
        rows,
    })
}
