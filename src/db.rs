use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::error::CoreResult;

pub const DB_FILE_NAME: &str = "school.sqlite3";

/// The open workspace database plus the knobs that govern how it is used.
pub struct Store {
    conn: Connection,
    slow_tx: Duration,
}

impl Store {
    pub fn open(workspace: &Path, slow_tx: Duration) -> anyhow::Result<Self> {
        std::fs::create_dir_all(workspace)?;
        let conn = Connection::open(workspace.join(DB_FILE_NAME))?;
        init_schema(&conn)?;
        Ok(Self { conn, slow_tx })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::open_in_memory_with(Duration::from_secs(5))
    }

    #[cfg(test)]
    pub fn open_in_memory_with(slow_tx: Duration) -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn, slow_tx })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Runs `f` inside one transaction: commit on `Ok`, roll back on `Err`.
    ///
    /// A transaction that stays open past the configured threshold is
    /// reported, never cut short.
    pub fn transaction<T, F>(&self, label: &'static str, f: F) -> CoreResult<T>
    where
        F: FnOnce(&Connection) -> CoreResult<T>,
    {
        let started = Instant::now();
        let tx = self.conn.unchecked_transaction()?;
        let result = match f(&tx) {
            Ok(v) => tx.commit().map(|_| v).map_err(Into::into),
            Err(e) => {
                if let Err(rb) = tx.rollback() {
                    tracing::error!(operation = label, error = %rb, "rollback failed");
                }
                Err(e)
            }
        };

        let held = started.elapsed();
        if held > self.slow_tx {
            tracing::warn!(
                operation = label,
                held_ms = held.as_millis() as u64,
                "transaction held too long"
            );
        }
        result
    }
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schools(
            id TEXT PRIMARY KEY,
            school_name TEXT NOT NULL,
            address TEXT,
            phone TEXT,
            email TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            subject_name TEXT NOT NULL,
            subject_code TEXT NOT NULL,
            is_core INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(school_id) REFERENCES schools(id),
            UNIQUE(school_id, subject_code)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS academic_years(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            year_name TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            is_current INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id),
            UNIQUE(school_id, year_name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_academic_years_school ON academic_years(school_id)",
        [],
    )?;

    // school_id is denormalized so "clear current" can run per school
    // without a join.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS semesters(
            id TEXT PRIMARY KEY,
            academic_year_id TEXT NOT NULL,
            school_id TEXT NOT NULL,
            semester_number INTEGER NOT NULL,
            semester_name TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            is_current INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(academic_year_id) REFERENCES academic_years(id),
            FOREIGN KEY(school_id) REFERENCES schools(id),
            UNIQUE(academic_year_id, semester_number)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_semesters_school ON semesters(school_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assessment_periods(
            id TEXT PRIMARY KEY,
            semester_id TEXT NOT NULL,
            school_id TEXT NOT NULL,
            period_number INTEGER NOT NULL,
            period_name TEXT NOT NULL,
            period_type TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            weight_percentage REAL NOT NULL DEFAULT 25.0,
            is_locked INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(semester_id) REFERENCES semesters(id),
            FOREIGN KEY(school_id) REFERENCES schools(id),
            UNIQUE(semester_id, period_number)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            class_name TEXT NOT NULL,
            academic_year_id TEXT,
            FOREIGN KEY(school_id) REFERENCES schools(id),
            FOREIGN KEY(academic_year_id) REFERENCES academic_years(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_subjects(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            teacher_id TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            UNIQUE(class_id, subject_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            student_number TEXT NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            gender TEXT,
            FOREIGN KEY(school_id) REFERENCES schools(id),
            UNIQUE(school_id, student_number)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_enrollments(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'enrolled',
            enrolled_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            UNIQUE(student_id, class_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_class ON student_enrollments(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_grades(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            assessment_period_id TEXT NOT NULL,
            academic_year_id TEXT NOT NULL,
            school_id TEXT NOT NULL,
            score REAL NOT NULL,
            teacher_id TEXT,
            entered_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            FOREIGN KEY(assessment_period_id) REFERENCES assessment_periods(id),
            FOREIGN KEY(academic_year_id) REFERENCES academic_years(id),
            UNIQUE(student_id, subject_id, assessment_period_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_student_year ON student_grades(student_id, academic_year_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_averages(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            academic_year_id TEXT NOT NULL,
            school_id TEXT NOT NULL,
            semester_id TEXT,
            semester_average REAL,
            yearly_average REAL,
            grade_status TEXT,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            FOREIGN KEY(academic_year_id) REFERENCES academic_years(id),
            FOREIGN KEY(semester_id) REFERENCES semesters(id)
        )",
        [],
    )?;
    // One row per semester, plus one yearly row (semester_id NULL).
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS uq_averages_semester
         ON student_averages(student_id, subject_id, academic_year_id, semester_id)
         WHERE semester_id IS NOT NULL",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS uq_averages_yearly
         ON student_averages(student_id, subject_id, academic_year_id)
         WHERE semester_id IS NULL",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grading_config(
            school_id TEXT PRIMARY KEY,
            pass_mark REAL NOT NULL,
            use_custom_weights INTEGER NOT NULL DEFAULT 0,
            period_weight REAL NOT NULL,
            exam_weight REAL NOT NULL,
            semester_calculation TEXT NOT NULL,
            year_calculation TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id)
        )",
        [],
    )?;

    Ok(())
}
