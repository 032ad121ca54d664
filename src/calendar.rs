//! Academic calendar: years, their two semesters and the four assessment
//! periods inside each semester.
//!
//! The date split is computed up front by [`plan_academic_year`] and then
//! persisted in one transaction, so a failed insert leaves nothing behind.

use chrono::{Days, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{self, Caller, ADMIN_ROLES};
use crate::db::Store;
use crate::error::{CoreError, CoreResult};
use crate::roster;

pub const SEMESTERS_PER_YEAR: i64 = 2;
pub const PERIODS_PER_SEMESTER: i64 = 4;
pub const DEFAULT_PERIOD_WEIGHT: f64 = 25.0;
pub const DEFAULT_CALCULATION: &str = "average";
/// Fewest days between start and end that leave every period at least one
/// day long. Semester 2 starts the day after the midpoint, so it needs one
/// day more than semester 1.
pub const MIN_YEAR_SPAN_DAYS: i64 = SEMESTERS_PER_YEAR * PERIODS_PER_SEMESTER + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    Period,
    Exam,
}

impl PeriodType {
    pub fn as_str(self) -> &'static str {
        match self {
            PeriodType::Period => "period",
            PeriodType::Exam => "exam",
        }
    }

    fn from_db(s: &str) -> Self {
        if s == "exam" {
            PeriodType::Exam
        } else {
            PeriodType::Period
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeriodPlan {
    pub period_number: i64,
    pub name: String,
    pub period_type: PeriodType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub weight_percentage: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SemesterPlan {
    pub semester_number: i64,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub periods: Vec<PeriodPlan>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcademicYear {
    pub id: String,
    pub school_id: String,
    pub year_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_current: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Semester {
    pub id: String,
    pub academic_year_id: String,
    pub school_id: String,
    pub semester_number: i64,
    pub semester_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_current: bool,
    pub periods: Vec<AssessmentPeriod>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentPeriod {
    pub id: String,
    pub semester_id: String,
    pub school_id: String,
    pub period_number: i64,
    pub period_name: String,
    pub period_type: PeriodType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub weight_percentage: f64,
    pub is_locked: bool,
}

/// A year with its semesters and periods attached.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcademicYearDetail {
    #[serde(flatten)]
    pub year: AcademicYear,
    pub semesters: Vec<Semester>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcademicYearSummary {
    #[serde(flatten)]
    pub year: AcademicYear,
    pub semester_count: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAcademicYear {
    pub school_id: Option<String>,
    pub year_name: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(default, alias = "makeCurrent")]
    pub is_current: bool,
}

/// Per-school grading preferences.
///
/// Stored and served as-is. Average aggregation keeps using
/// [`crate::calc::PASS_MARK`] and the fixed period split.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingConfig {
    pub school_id: String,
    pub pass_mark: f64,
    pub use_custom_weights: bool,
    pub period_weight: f64,
    pub exam_weight: f64,
    pub semester_calculation: String,
    pub year_calculation: String,
    /// `None` until the school saves a config of its own.
    pub updated_at: Option<String>,
}

impl GradingConfig {
    pub fn defaults(school_id: &str) -> Self {
        Self {
            school_id: school_id.to_string(),
            pass_mark: crate::calc::PASS_MARK,
            use_custom_weights: false,
            period_weight: DEFAULT_PERIOD_WEIGHT,
            exam_weight: DEFAULT_PERIOD_WEIGHT,
            semester_calculation: DEFAULT_CALCULATION.to_string(),
            year_calculation: DEFAULT_CALCULATION.to_string(),
            updated_at: None,
        }
    }
}

/// Partial update; absent fields keep their stored (or default) value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingConfigUpdate {
    pub school_id: Option<String>,
    pub pass_mark: Option<f64>,
    pub use_custom_weights: Option<bool>,
    pub period_weight: Option<f64>,
    pub exam_weight: Option<f64>,
    pub semester_calculation: Option<String>,
    pub year_calculation: Option<String>,
}

impl GradingConfigUpdate {
    fn is_empty(&self) -> bool {
        self.pass_mark.is_none()
            && self.use_custom_weights.is_none()
            && self.period_weight.is_none()
            && self.exam_weight.is_none()
            && self.semester_calculation.is_none()
            && self.year_calculation.is_none()
    }
}

/// Where a period sits in the calendar tree.
#[derive(Debug, Clone)]
pub(crate) struct PeriodContext {
    pub period_id: String,
    pub period_number: i64,
    pub is_locked: bool,
    pub semester_id: String,
    pub semester_number: i64,
    pub academic_year_id: String,
    pub school_id: String,
}

fn ordinal(n: i64) -> String {
    let suffix = match n {
        1 => "st",
        2 => "nd",
        3 => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}

/// Display name of a period. Stored period numbers restart at 1 in every
/// semester; display names keep counting, so semester 2 reads 4th..6th.
pub fn period_display_name(semester_number: i64, period_number: i64) -> String {
    if period_number == PERIODS_PER_SEMESTER {
        return format!("Semester {semester_number} Exam");
    }
    let offset = (semester_number - 1) * (PERIODS_PER_SEMESTER - 1);
    format!("{} Period", ordinal(period_number + offset))
}

fn add_days(date: NaiveDate, days: i64) -> CoreResult<NaiveDate> {
    let out = if days >= 0 {
        date.checked_add_days(Days::new(days as u64))
    } else {
        date.checked_sub_days(Days::new(days.unsigned_abs()))
    };
    out.ok_or_else(|| CoreError::Validation("date out of range".into()))
}

fn plan_semester(number: i64, start: NaiveDate, end: NaiveDate) -> CoreResult<SemesterPlan> {
    let period_len = (end - start).num_days() / PERIODS_PER_SEMESTER;

    let mut periods = Vec::with_capacity(PERIODS_PER_SEMESTER as usize);
    for i in 1..PERIODS_PER_SEMESTER {
        periods.push(PeriodPlan {
            period_number: i,
            name: period_display_name(number, i),
            period_type: PeriodType::Period,
            start_date: add_days(start, (i - 1) * period_len)?,
            end_date: add_days(start, i * period_len - 1)?,
            weight_percentage: DEFAULT_PERIOD_WEIGHT,
        });
    }
    // The exam absorbs the remainder of the integer split.
    periods.push(PeriodPlan {
        period_number: PERIODS_PER_SEMESTER,
        name: period_display_name(number, PERIODS_PER_SEMESTER),
        period_type: PeriodType::Exam,
        start_date: add_days(start, (PERIODS_PER_SEMESTER - 1) * period_len)?,
        end_date: end,
        weight_percentage: DEFAULT_PERIOD_WEIGHT,
    });

    Ok(SemesterPlan {
        semester_number: number,
        name: format!("Semester {number}"),
        start_date: start,
        end_date: end,
        periods,
    })
}

/// Splits `[start, end]` at the day midpoint into two semesters of four
/// periods each.
pub fn plan_academic_year(start: NaiveDate, end: NaiveDate) -> CoreResult<Vec<SemesterPlan>> {
    if start >= end {
        return Err(CoreError::Validation(
            "start date must be before end date".into(),
        ));
    }
    let span = (end - start).num_days();
    if span < MIN_YEAR_SPAN_DAYS {
        return Err(CoreError::Validation(format!(
            "end date must be at least {MIN_YEAR_SPAN_DAYS} days after start date \
             to fit {} periods (got {span})",
            SEMESTERS_PER_YEAR * PERIODS_PER_SEMESTER
        )));
    }
    let midpoint = add_days(start, span / 2)?;
    Ok(vec![
        plan_semester(1, start, midpoint)?,
        plan_semester(2, add_days(midpoint, 1)?, end)?,
    ])
}

fn parse_date(raw: &str, field: &str) -> CoreResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| CoreError::Validation(format!("{field} must be a YYYY-MM-DD date")))
}

const YEAR_COLUMNS: &str = "id, school_id, year_name, start_date, end_date, is_current";
const SEMESTER_COLUMNS: &str =
    "id, academic_year_id, school_id, semester_number, semester_name, start_date, end_date, is_current";
const PERIOD_COLUMNS: &str = "id, semester_id, school_id, period_number, period_name, period_type,
     start_date, end_date, weight_percentage, is_locked";

fn year_from_row(r: &Row<'_>) -> rusqlite::Result<AcademicYear> {
    Ok(AcademicYear {
        id: r.get(0)?,
        school_id: r.get(1)?,
        year_name: r.get(2)?,
        start_date: r.get(3)?,
        end_date: r.get(4)?,
        is_current: r.get::<_, i64>(5)? != 0,
    })
}

fn semester_from_row(r: &Row<'_>) -> rusqlite::Result<Semester> {
    Ok(Semester {
        id: r.get(0)?,
        academic_year_id: r.get(1)?,
        school_id: r.get(2)?,
        semester_number: r.get(3)?,
        semester_name: r.get(4)?,
        start_date: r.get(5)?,
        end_date: r.get(6)?,
        is_current: r.get::<_, i64>(7)? != 0,
        periods: Vec::new(),
    })
}

fn period_from_row(r: &Row<'_>) -> rusqlite::Result<AssessmentPeriod> {
    let period_type: String = r.get(5)?;
    Ok(AssessmentPeriod {
        id: r.get(0)?,
        semester_id: r.get(1)?,
        school_id: r.get(2)?,
        period_number: r.get(3)?,
        period_name: r.get(4)?,
        period_type: PeriodType::from_db(&period_type),
        start_date: r.get(6)?,
        end_date: r.get(7)?,
        weight_percentage: r.get(8)?,
        is_locked: r.get::<_, i64>(9)? != 0,
    })
}

pub(crate) fn load_year(conn: &Connection, year_id: &str) -> CoreResult<AcademicYear> {
    conn.query_row(
        &format!("SELECT {YEAR_COLUMNS} FROM academic_years WHERE id = ?"),
        [year_id],
        year_from_row,
    )
    .optional()?
    .ok_or_else(|| CoreError::not_found("academic year", year_id))
}

fn load_semester(conn: &Connection, semester_id: &str) -> CoreResult<Semester> {
    let mut semester = conn
        .query_row(
            &format!("SELECT {SEMESTER_COLUMNS} FROM semesters WHERE id = ?"),
            [semester_id],
            semester_from_row,
        )
        .optional()?
        .ok_or_else(|| CoreError::not_found("semester", semester_id))?;
    semester.periods = load_periods(conn, &semester.id)?;
    Ok(semester)
}

fn load_periods(conn: &Connection, semester_id: &str) -> CoreResult<Vec<AssessmentPeriod>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PERIOD_COLUMNS} FROM assessment_periods
         WHERE semester_id = ?
         ORDER BY period_number"
    ))?;
    let periods = stmt
        .query_map([semester_id], period_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(periods)
}

pub(crate) fn load_period(conn: &Connection, period_id: &str) -> CoreResult<AssessmentPeriod> {
    conn.query_row(
        &format!("SELECT {PERIOD_COLUMNS} FROM assessment_periods WHERE id = ?"),
        [period_id],
        period_from_row,
    )
    .optional()?
    .ok_or_else(|| CoreError::not_found("assessment period", period_id))
}

fn load_detail(conn: &Connection, year_id: &str) -> CoreResult<AcademicYearDetail> {
    let year = load_year(conn, year_id)?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {SEMESTER_COLUMNS} FROM semesters
         WHERE academic_year_id = ?
         ORDER BY semester_number"
    ))?;
    let mut semesters = stmt
        .query_map([year_id], semester_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    for semester in &mut semesters {
        semester.periods = load_periods(conn, &semester.id)?;
    }
    Ok(AcademicYearDetail { year, semesters })
}

pub(crate) fn period_context(conn: &Connection, period_id: &str) -> CoreResult<PeriodContext> {
    conn.query_row(
        "SELECT ap.id, ap.period_number, ap.is_locked, s.id, s.semester_number,
                s.academic_year_id, ay.school_id
         FROM assessment_periods ap
         JOIN semesters s ON ap.semester_id = s.id
         JOIN academic_years ay ON s.academic_year_id = ay.id
         WHERE ap.id = ?",
        [period_id],
        |r| {
            Ok(PeriodContext {
                period_id: r.get(0)?,
                period_number: r.get(1)?,
                is_locked: r.get::<_, i64>(2)? != 0,
                semester_id: r.get(3)?,
                semester_number: r.get(4)?,
                academic_year_id: r.get(5)?,
                school_id: r.get(6)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| CoreError::not_found("assessment period", period_id))
}

/// Semester plus owning year and school, for callers that only know the
/// semester id.
pub(crate) fn semester_owner(conn: &Connection, semester_id: &str) -> CoreResult<(String, String)> {
    conn.query_row(
        "SELECT s.academic_year_id, ay.school_id
         FROM semesters s
         JOIN academic_years ay ON s.academic_year_id = ay.id
         WHERE s.id = ?",
        [semester_id],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )
    .optional()?
    .ok_or_else(|| CoreError::not_found("semester", semester_id))
}

fn clear_current(conn: &Connection, school_id: &str) -> CoreResult<()> {
    conn.execute(
        "UPDATE academic_years SET is_current = 0 WHERE school_id = ?",
        [school_id],
    )?;
    conn.execute(
        "UPDATE semesters SET is_current = 0 WHERE school_id = ?",
        [school_id],
    )?;
    Ok(())
}

pub fn create_academic_year(
    store: &Store,
    caller: &Caller,
    input: &NewAcademicYear,
) -> CoreResult<AcademicYearDetail> {
    auth::require_role(caller, ADMIN_ROLES, "create academic years")?;
    let school_id = auth::resolve_effective_school(caller, input.school_id.as_deref())?;
    let name = roster::required(&input.year_name, "yearName")?;
    let start = parse_date(roster::required(&input.start_date, "startDate")?, "startDate")?;
    let end = parse_date(roster::required(&input.end_date, "endDate")?, "endDate")?;
    let plan = plan_academic_year(start, end)?;

    let detail = store.transaction("calendar.create_year", |tx| {
        roster::load_school(tx, &school_id)?;
        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM academic_years WHERE school_id = ? AND year_name = ?",
                (&school_id, name),
                |r| r.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(CoreError::Conflict(
                "an academic year with this name already exists".into(),
            ));
        }

        if input.is_current {
            clear_current(tx, &school_id)?;
        }

        let year_id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO academic_years(id, school_id, year_name, start_date, end_date, is_current, created_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                &year_id,
                &school_id,
                name,
                start,
                end,
                input.is_current as i64,
                Utc::now().to_rfc3339(),
            ),
        )?;

        for semester in &plan {
            let semester_id = Uuid::new_v4().to_string();
            let current = input.is_current && semester.semester_number == 1;
            tx.execute(
                "INSERT INTO semesters(id, academic_year_id, school_id, semester_number, semester_name,
                                       start_date, end_date, is_current)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    &semester_id,
                    &year_id,
                    &school_id,
                    semester.semester_number,
                    &semester.name,
                    semester.start_date,
                    semester.end_date,
                    current as i64,
                ),
            )?;
            for period in &semester.periods {
                tx.execute(
                    "INSERT INTO assessment_periods(id, semester_id, school_id, period_number, period_name,
                                                    period_type, start_date, end_date, weight_percentage)
                     VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    (
                        Uuid::new_v4().to_string(),
                        &semester_id,
                        &school_id,
                        period.period_number,
                        &period.name,
                        period.period_type.as_str(),
                        period.start_date,
                        period.end_date,
                        period.weight_percentage,
                    ),
                )?;
            }
        }

        load_detail(tx, &year_id)
    })?;

    tracing::info!(
        school_id = %detail.year.school_id,
        academic_year_id = %detail.year.id,
        year_name = %detail.year.year_name,
        is_current = detail.year.is_current,
        "academic year created"
    );
    Ok(detail)
}

pub fn list_academic_years(
    store: &Store,
    caller: &Caller,
    school_id: Option<&str>,
) -> CoreResult<Vec<AcademicYearSummary>> {
    let school_id = auth::resolve_effective_school(caller, school_id)?;
    let mut stmt = store.conn().prepare(
        "SELECT ay.id, ay.school_id, ay.year_name, ay.start_date, ay.end_date, ay.is_current,
                (SELECT COUNT(*) FROM semesters s WHERE s.academic_year_id = ay.id)
         FROM academic_years ay
         WHERE ay.school_id = ?
         ORDER BY ay.start_date DESC",
    )?;
    let years = stmt
        .query_map([&school_id], |r| {
            Ok(AcademicYearSummary {
                year: year_from_row(r)?,
                semester_count: r.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(years)
}

pub fn get_academic_year(
    store: &Store,
    caller: &Caller,
    year_id: &str,
) -> CoreResult<AcademicYearDetail> {
    let detail = load_detail(store.conn(), year_id)?;
    auth::ensure_school_access(caller, &detail.year.school_id)?;
    Ok(detail)
}

/// Makes `year_id` the school's only current year, with its first semester
/// as the only current semester.
pub fn set_current_academic_year(
    store: &Store,
    caller: &Caller,
    year_id: &str,
) -> CoreResult<AcademicYearDetail> {
    auth::require_role(caller, ADMIN_ROLES, "change the current academic year")?;
    let detail = store.transaction("calendar.set_current_year", |tx| {
        let year = load_year(tx, year_id)?;
        auth::ensure_school_access(caller, &year.school_id)?;

        clear_current(tx, &year.school_id)?;
        tx.execute(
            "UPDATE academic_years SET is_current = 1 WHERE id = ?",
            [year_id],
        )?;
        tx.execute(
            "UPDATE semesters SET is_current = 1 WHERE academic_year_id = ? AND semester_number = 1",
            [year_id],
        )?;
        load_detail(tx, year_id)
    })?;

    tracing::info!(
        school_id = %detail.year.school_id,
        academic_year_id = %year_id,
        "current academic year changed"
    );
    Ok(detail)
}

/// Makes `semester_id` the school's only current semester. The current
/// year is left alone, even when the semester belongs to another year.
pub fn set_current_semester(
    store: &Store,
    caller: &Caller,
    semester_id: &str,
) -> CoreResult<Semester> {
    auth::require_role(caller, ADMIN_ROLES, "change the current semester")?;
    let semester = store.transaction("calendar.set_current_semester", |tx| {
        let semester = load_semester(tx, semester_id)?;
        auth::ensure_school_access(caller, &semester.school_id)?;

        tx.execute(
            "UPDATE semesters SET is_current = 0 WHERE school_id = ?",
            [&semester.school_id],
        )?;
        tx.execute(
            "UPDATE semesters SET is_current = 1 WHERE id = ?",
            [semester_id],
        )?;
        load_semester(tx, semester_id)
    })?;

    tracing::info!(
        school_id = %semester.school_id,
        semester_id = %semester_id,
        "current semester changed"
    );
    Ok(semester)
}

pub fn set_period_lock(
    store: &Store,
    caller: &Caller,
    period_id: &str,
    locked: bool,
) -> CoreResult<AssessmentPeriod> {
    auth::require_role(caller, ADMIN_ROLES, "lock or unlock periods")?;
    let conn = store.conn();
    let period = load_period(conn, period_id)?;
    auth::ensure_school_access(caller, &period.school_id)?;

    conn.execute(
        "UPDATE assessment_periods SET is_locked = ? WHERE id = ?",
        (locked as i64, period_id),
    )?;
    tracing::info!(
        school_id = %period.school_id,
        period_id = %period_id,
        locked,
        "assessment period lock changed"
    );
    load_period(conn, period_id)
}

fn percentage(value: Option<f64>, field: &str) -> CoreResult<Option<f64>> {
    match value {
        Some(v) if !v.is_finite() || !(0.0..=100.0).contains(&v) => Err(CoreError::Validation(
            format!("{field} must be between 0 and 100"),
        )),
        v => Ok(v),
    }
}

fn calculation(value: Option<&str>, field: &str) -> CoreResult<Option<String>> {
    match value.map(str::trim) {
        Some("") => Err(CoreError::Validation(format!("{field} must not be blank"))),
        v => Ok(v.map(str::to_string)),
    }
}

fn load_grading_config(conn: &Connection, school_id: &str) -> CoreResult<Option<GradingConfig>> {
    let config = conn
        .query_row(
            "SELECT school_id, pass_mark, use_custom_weights, period_weight, exam_weight,
                    semester_calculation, year_calculation, updated_at
             FROM grading_config WHERE school_id = ?",
            [school_id],
            |r| {
                Ok(GradingConfig {
                    school_id: r.get(0)?,
                    pass_mark: r.get(1)?,
                    use_custom_weights: r.get::<_, i64>(2)? != 0,
                    period_weight: r.get(3)?,
                    exam_weight: r.get(4)?,
                    semester_calculation: r.get(5)?,
                    year_calculation: r.get(6)?,
                    updated_at: r.get(7)?,
                })
            },
        )
        .optional()?;
    Ok(config)
}

/// Saves the school's grading config, creating it from the defaults on first
/// write.
pub fn update_grading_config(
    store: &Store,
    caller: &Caller,
    update: &GradingConfigUpdate,
) -> CoreResult<GradingConfig> {
    auth::require_role(caller, ADMIN_ROLES, "change grading configuration")?;
    let school_id = auth::resolve_effective_school(caller, update.school_id.as_deref())?;
    if update.is_empty() {
        return Err(CoreError::Validation("No fields to update".into()));
    }
    let pass_mark = percentage(update.pass_mark, "passMark")?;
    let period_weight = percentage(update.period_weight, "periodWeight")?;
    let exam_weight = percentage(update.exam_weight, "examWeight")?;
    let semester_calculation =
        calculation(update.semester_calculation.as_deref(), "semesterCalculation")?;
    let year_calculation = calculation(update.year_calculation.as_deref(), "yearCalculation")?;

    store.transaction("calendar.grading_config.update", |tx| {
        roster::load_school(tx, &school_id)?;
        let mut config = load_grading_config(tx, &school_id)?
            .unwrap_or_else(|| GradingConfig::defaults(&school_id));
        if let Some(v) = pass_mark {
            config.pass_mark = v;
        }
        if let Some(v) = update.use_custom_weights {
            config.use_custom_weights = v;
        }
        if let Some(v) = period_weight {
            config.period_weight = v;
        }
        if let Some(v) = exam_weight {
            config.exam_weight = v;
        }
        if let Some(v) = semester_calculation {
            config.semester_calculation = v;
        }
        if let Some(v) = year_calculation {
            config.year_calculation = v;
        }
        config.updated_at = Some(Utc::now().to_rfc3339());

        tx.execute(
            "INSERT INTO grading_config(school_id, pass_mark, use_custom_weights, period_weight,
                                        exam_weight, semester_calculation, year_calculation, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(school_id) DO UPDATE SET
               pass_mark = excluded.pass_mark,
               use_custom_weights = excluded.use_custom_weights,
               period_weight = excluded.period_weight,
               exam_weight = excluded.exam_weight,
               semester_calculation = excluded.semester_calculation,
               year_calculation = excluded.year_calculation,
               updated_at = excluded.updated_at",
            (
                &config.school_id,
                config.pass_mark,
                config.use_custom_weights as i64,
                config.period_weight,
                config.exam_weight,
                &config.semester_calculation,
                &config.year_calculation,
                &config.updated_at,
            ),
        )?;
        tracing::info!(school_id = %school_id, pass_mark = config.pass_mark, "grading config saved");
        Ok(config)
    })
}

/// Any role may read its school's config; schools that never saved one get
/// the defaults.
pub fn get_grading_config(
    store: &Store,
    caller: &Caller,
    school_id: Option<&str>,
) -> CoreResult<GradingConfig> {
    let school_id = auth::resolve_effective_school(caller, school_id)?;
    let conn = store.conn();
    roster::load_school(conn, &school_id)?;
    Ok(load_grading_config(conn, &school_id)?
        .unwrap_or_else(|| GradingConfig::defaults(&school_id)))
}
