//! Schools, subjects, classes, students and enrollments.
//!
//! Plain parameterized writes; the grade and report paths read from these.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{self, Caller, Role, ADMIN_ROLES};
use crate::db::Store;
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct School {
    pub id: String,
    pub school_name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub school_id: String,
    pub subject_name: String,
    pub subject_code: String,
    pub is_core: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: String,
    pub school_id: String,
    pub class_name: String,
    pub academic_year_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSubject {
    pub id: String,
    pub class_id: String,
    pub subject_id: String,
    pub teacher_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub school_id: String,
    pub student_number: String,
    pub first_name: String,
    pub last_name: String,
    pub gender: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub id: String,
    pub student_id: String,
    pub class_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSchool {
    pub school_name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubject {
    pub school_id: Option<String>,
    pub subject_name: Option<String>,
    pub subject_code: Option<String>,
    #[serde(default)]
    pub is_core: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewClass {
    pub school_id: Option<String>,
    pub class_name: Option<String>,
    pub academic_year_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    pub school_id: Option<String>,
    pub student_number: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
}

pub(crate) fn required<'a>(value: &'a Option<String>, field: &str) -> CoreResult<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CoreError::Validation(format!("{field} is required")))
}

fn school_from_row(r: &Row<'_>) -> rusqlite::Result<School> {
    Ok(School {
        id: r.get(0)?,
        school_name: r.get(1)?,
        address: r.get(2)?,
        phone: r.get(3)?,
        email: r.get(4)?,
    })
}

fn subject_from_row(r: &Row<'_>) -> rusqlite::Result<Subject> {
    Ok(Subject {
        id: r.get(0)?,
        school_id: r.get(1)?,
        subject_name: r.get(2)?,
        subject_code: r.get(3)?,
        is_core: r.get::<_, i64>(4)? != 0,
    })
}

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        school_id: r.get(1)?,
        student_number: r.get(2)?,
        first_name: r.get(3)?,
        last_name: r.get(4)?,
        gender: r.get(5)?,
    })
}

pub(crate) fn load_school(conn: &Connection, school_id: &str) -> CoreResult<School> {
    conn.query_row(
        "SELECT id, school_name, address, phone, email FROM schools WHERE id = ?",
        [school_id],
        school_from_row,
    )
    .optional()?
    .ok_or_else(|| CoreError::not_found("school", school_id))
}

pub(crate) fn load_subject(conn: &Connection, subject_id: &str) -> CoreResult<Subject> {
    conn.query_row(
        "SELECT id, school_id, subject_name, subject_code, is_core FROM subjects WHERE id = ?",
        [subject_id],
        subject_from_row,
    )
    .optional()?
    .ok_or_else(|| CoreError::not_found("subject", subject_id))
}

pub(crate) fn load_class(conn: &Connection, class_id: &str) -> CoreResult<Class> {
    conn.query_row(
        "SELECT id, school_id, class_name, academic_year_id FROM classes WHERE id = ?",
        [class_id],
        |r| {
            Ok(Class {
                id: r.get(0)?,
                school_id: r.get(1)?,
                class_name: r.get(2)?,
                academic_year_id: r.get(3)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| CoreError::not_found("class", class_id))
}

pub(crate) fn load_student(conn: &Connection, student_id: &str) -> CoreResult<Student> {
    conn.query_row(
        "SELECT id, school_id, student_number, first_name, last_name, gender
         FROM students WHERE id = ?",
        [student_id],
        student_from_row,
    )
    .optional()?
    .ok_or_else(|| CoreError::not_found("student", student_id))
}

/// The class a student is currently enrolled in, if any.
pub(crate) fn current_class(conn: &Connection, student_id: &str) -> CoreResult<Option<Class>> {
    let class_id: Option<String> = conn
        .query_row(
            "SELECT class_id FROM student_enrollments
             WHERE student_id = ? AND status = 'enrolled'
             ORDER BY enrolled_at DESC
             LIMIT 1",
            [student_id],
            |r| r.get(0),
        )
        .optional()?;
    class_id.map(|id| load_class(conn, &id)).transpose()
}

/// Subjects assigned to a class, core subjects first.
pub(crate) fn class_subjects(conn: &Connection, class_id: &str) -> CoreResult<Vec<Subject>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT s.id, s.school_id, s.subject_name, s.subject_code, s.is_core
         FROM subjects s
         JOIN class_subjects cs ON cs.subject_id = s.id
         WHERE cs.class_id = ?
         ORDER BY s.is_core DESC, s.subject_name",
    )?;
    let subjects = stmt
        .query_map([class_id], subject_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(subjects)
}

pub fn create_school(store: &Store, caller: &Caller, input: &NewSchool) -> CoreResult<School> {
    auth::require_role(caller, &[Role::SuperAdmin], "create schools")?;
    let name = required(&input.school_name, "schoolName")?;

    let school = School {
        id: Uuid::new_v4().to_string(),
        school_name: name.to_string(),
        address: input.address.clone(),
        phone: input.phone.clone(),
        email: input.email.clone(),
    };
    store.conn().execute(
        "INSERT INTO schools(id, school_name, address, phone, email, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &school.id,
            &school.school_name,
            &school.address,
            &school.phone,
            &school.email,
            Utc::now().to_rfc3339(),
        ),
    )?;
    tracing::info!(school_id = %school.id, "school created");
    Ok(school)
}

pub fn create_subject(store: &Store, caller: &Caller, input: &NewSubject) -> CoreResult<Subject> {
    auth::require_role(caller, ADMIN_ROLES, "create subjects")?;
    let school_id = auth::resolve_effective_school(caller, input.school_id.as_deref())?;
    let name = required(&input.subject_name, "subjectName")?;
    let code = required(&input.subject_code, "subjectCode")?;
    let conn = store.conn();
    load_school(conn, &school_id)?;

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM subjects WHERE school_id = ? AND subject_code = ?",
            (&school_id, code),
            |r| r.get(0),
        )
        .optional()?;
    if existing.is_some() {
        return Err(CoreError::Conflict(format!(
            "a subject with code {code} already exists"
        )));
    }

    let subject = Subject {
        id: Uuid::new_v4().to_string(),
        school_id,
        subject_name: name.to_string(),
        subject_code: code.to_string(),
        is_core: input.is_core,
    };
    conn.execute(
        "INSERT INTO subjects(id, school_id, subject_name, subject_code, is_core)
         VALUES(?, ?, ?, ?, ?)",
        (
            &subject.id,
            &subject.school_id,
            &subject.subject_name,
            &subject.subject_code,
            subject.is_core as i64,
        ),
    )?;
    Ok(subject)
}

pub fn create_class(store: &Store, caller: &Caller, input: &NewClass) -> CoreResult<Class> {
    auth::require_role(caller, ADMIN_ROLES, "create classes")?;
    let school_id = auth::resolve_effective_school(caller, input.school_id.as_deref())?;
    let name = required(&input.class_name, "className")?;
    let conn = store.conn();
    load_school(conn, &school_id)?;

    let class = Class {
        id: Uuid::new_v4().to_string(),
        school_id,
        class_name: name.to_string(),
        academic_year_id: input.academic_year_id.clone(),
    };
    conn.execute(
        "INSERT INTO classes(id, school_id, class_name, academic_year_id) VALUES(?, ?, ?, ?)",
        (
            &class.id,
            &class.school_id,
            &class.class_name,
            &class.academic_year_id,
        ),
    )?;
    Ok(class)
}

pub fn assign_subject(
    store: &Store,
    caller: &Caller,
    class_id: &str,
    subject_id: &str,
    teacher_id: Option<&str>,
) -> CoreResult<ClassSubject> {
    auth::require_role(caller, ADMIN_ROLES, "assign subjects")?;
    let conn = store.conn();
    let class = load_class(conn, class_id)?;
    auth::ensure_school_access(caller, &class.school_id)?;
    let subject = load_subject(conn, subject_id)?;
    if subject.school_id != class.school_id {
        return Err(CoreError::Validation(
            "subject belongs to a different school".into(),
        ));
    }

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM class_subjects WHERE class_id = ? AND subject_id = ?",
            (class_id, subject_id),
            |r| r.get(0),
        )
        .optional()?;
    if existing.is_some() {
        return Err(CoreError::Conflict(
            "subject is already assigned to this class".into(),
        ));
    }

    let assignment = ClassSubject {
        id: Uuid::new_v4().to_string(),
        class_id: class_id.to_string(),
        subject_id: subject_id.to_string(),
        teacher_id: teacher_id.map(str::to_string),
    };
    conn.execute(
        "INSERT INTO class_subjects(id, class_id, subject_id, teacher_id) VALUES(?, ?, ?, ?)",
        (
            &assignment.id,
            &assignment.class_id,
            &assignment.subject_id,
            &assignment.teacher_id,
        ),
    )?;
    Ok(assignment)
}

pub fn create_student(store: &Store, caller: &Caller, input: &NewStudent) -> CoreResult<Student> {
    auth::require_role(caller, ADMIN_ROLES, "create students")?;
    let school_id = auth::resolve_effective_school(caller, input.school_id.as_deref())?;
    let number = required(&input.student_number, "studentNumber")?;
    let first = required(&input.first_name, "firstName")?;
    let last = required(&input.last_name, "lastName")?;
    let conn = store.conn();
    load_school(conn, &school_id)?;

    let student = Student {
        id: Uuid::new_v4().to_string(),
        school_id,
        student_number: number.to_string(),
        first_name: first.to_string(),
        last_name: last.to_string(),
        gender: input.gender.clone(),
    };
    conn.execute(
        "INSERT INTO students(id, school_id, student_number, first_name, last_name, gender)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &student.id,
            &student.school_id,
            &student.student_number,
            &student.first_name,
            &student.last_name,
            &student.gender,
        ),
    )?;
    Ok(student)
}

pub fn enroll_student(
    store: &Store,
    caller: &Caller,
    student_id: &str,
    class_id: &str,
) -> CoreResult<Enrollment> {
    auth::require_role(caller, ADMIN_ROLES, "enroll students")?;
    let conn = store.conn();
    let student = load_student(conn, student_id)?;
    auth::ensure_school_access(caller, &student.school_id)?;
    let class = load_class(conn, class_id)?;
    if class.school_id != student.school_id {
        return Err(CoreError::Validation(
            "class belongs to a different school".into(),
        ));
    }

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM student_enrollments WHERE student_id = ? AND class_id = ?",
            (student_id, class_id),
            |r| r.get(0),
        )
        .optional()?;
    if existing.is_some() {
        return Err(CoreError::Conflict(
            "student is already enrolled in this class".into(),
        ));
    }

    let enrollment = Enrollment {
        id: Uuid::new_v4().to_string(),
        student_id: student_id.to_string(),
        class_id: class_id.to_string(),
        status: "enrolled".to_string(),
    };
    conn.execute(
        "INSERT INTO student_enrollments(id, student_id, class_id, status, enrolled_at)
         VALUES(?, ?, ?, ?, ?)",
        (
            &enrollment.id,
            &enrollment.student_id,
            &enrollment.class_id,
            &enrollment.status,
            Utc::now().to_rfc3339(),
        ),
    )?;
    Ok(enrollment)
}
