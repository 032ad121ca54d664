//! Report card assembly.
//!
//! [`assemble_report_card`] gathers one student's year into a row per
//! subject plus a row of column means. [`build_sheet`] turns that into the
//! text/tone cells a renderer draws; layout itself happens elsewhere.

use rusqlite::Connection;
use serde::Serialize;

use crate::auth::{self, Caller};
use crate::calc::{self, GradeStatus, PASS_MARK};
use crate::calendar::{self, AcademicYear};
use crate::db::Store;
use crate::error::{CoreError, CoreResult};
use crate::roster::{self, Class, School, Student, Subject};

/// The eleven score columns of a report card, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportColumn {
    Period1,
    Period2,
    Period3,
    Sem1Exam,
    Sem1Average,
    Period4,
    Period5,
    Period6,
    Sem2Exam,
    Sem2Average,
    YearlyAverage,
}

impl ReportColumn {
    pub const ALL: [ReportColumn; 11] = [
        ReportColumn::Period1,
        ReportColumn::Period2,
        ReportColumn::Period3,
        ReportColumn::Sem1Exam,
        ReportColumn::Sem1Average,
        ReportColumn::Period4,
        ReportColumn::Period5,
        ReportColumn::Period6,
        ReportColumn::Sem2Exam,
        ReportColumn::Sem2Average,
        ReportColumn::YearlyAverage,
    ];

    /// Column holding the score of stored period `period_number` in
    /// semester `semester_number`.
    pub fn for_period(semester_number: i64, period_number: i64) -> Option<Self> {
        use ReportColumn::*;
        match (semester_number, period_number) {
            (1, 1) => Some(Period1),
            (1, 2) => Some(Period2),
            (1, 3) => Some(Period3),
            (1, 4) => Some(Sem1Exam),
            (2, 1) => Some(Period4),
            (2, 2) => Some(Period5),
            (2, 3) => Some(Period6),
            (2, 4) => Some(Sem2Exam),
            _ => None,
        }
    }

    pub fn header(self) -> &'static str {
        use ReportColumn::*;
        match self {
            Period1 => "P1",
            Period2 => "P2",
            Period3 => "P3",
            Sem1Exam | Sem2Exam => "Exam",
            Sem1Average => "Sem 1",
            Period4 => "P4",
            Period5 => "P5",
            Period6 => "P6",
            Sem2Average => "Sem 2",
            YearlyAverage => "Yearly",
        }
    }

    pub fn is_average(self) -> bool {
        matches!(
            self,
            ReportColumn::Sem1Average | ReportColumn::Sem2Average | ReportColumn::YearlyAverage
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnValues {
    pub period1: Option<f64>,
    pub period2: Option<f64>,
    pub period3: Option<f64>,
    pub sem1_exam: Option<f64>,
    pub sem1_average: Option<f64>,
    pub period4: Option<f64>,
    pub period5: Option<f64>,
    pub period6: Option<f64>,
    pub sem2_exam: Option<f64>,
    pub sem2_average: Option<f64>,
    pub yearly_average: Option<f64>,
}

impl ColumnValues {
    pub fn get(&self, column: ReportColumn) -> Option<f64> {
        *self.slot_ref(column)
    }

    fn slot(&mut self, column: ReportColumn) -> &mut Option<f64> {
        use ReportColumn::*;
        match column {
            Period1 => &mut self.period1,
            Period2 => &mut self.period2,
            Period3 => &mut self.period3,
            Sem1Exam => &mut self.sem1_exam,
            Sem1Average => &mut self.sem1_average,
            Period4 => &mut self.period4,
            Period5 => &mut self.period5,
            Period6 => &mut self.period6,
            Sem2Exam => &mut self.sem2_exam,
            Sem2Average => &mut self.sem2_average,
            YearlyAverage => &mut self.yearly_average,
        }
    }

    fn slot_ref(&self, column: ReportColumn) -> &Option<f64> {
        use ReportColumn::*;
        match column {
            Period1 => &self.period1,
            Period2 => &self.period2,
            Period3 => &self.period3,
            Sem1Exam => &self.sem1_exam,
            Sem1Average => &self.sem1_average,
            Period4 => &self.period4,
            Period5 => &self.period5,
            Period6 => &self.period6,
            Sem2Exam => &self.sem2_exam,
            Sem2Average => &self.sem2_average,
            YearlyAverage => &self.yearly_average,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCardRow {
    pub subject_id: String,
    pub subject_name: String,
    pub subject_code: String,
    pub is_core: bool,
    #[serde(flatten)]
    pub scores: ColumnValues,
    pub grade_status: Option<GradeStatus>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCard {
    pub student: Student,
    pub school: School,
    pub class: Option<Class>,
    pub academic_year: AcademicYear,
    pub subjects: Vec<ReportCardRow>,
    pub period_averages: ColumnValues,
}

/// Mean of the non-null values in `column`; `None` when there are none.
pub fn column_mean(rows: &[ReportCardRow], column: ReportColumn) -> Option<f64> {
    let values: Vec<f64> = rows.iter().filter_map(|r| r.scores.get(column)).collect();
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn column_averages(rows: &[ReportCardRow]) -> ColumnValues {
    let mut out = ColumnValues::default();
    for column in ReportColumn::ALL {
        *out.slot(column) = column_mean(rows, column);
    }
    out
}

struct ScoredPeriod {
    subject_id: String,
    semester_number: i64,
    period_number: i64,
    score: f64,
}

fn scored_periods(conn: &Connection, student_id: &str, year_id: &str) -> CoreResult<Vec<ScoredPeriod>> {
    let mut stmt = conn.prepare(
        "SELECT g.subject_id, s.semester_number, ap.period_number, g.score
         FROM student_grades g
         JOIN assessment_periods ap ON g.assessment_period_id = ap.id
         JOIN semesters s ON ap.semester_id = s.id
         WHERE g.student_id = ? AND g.academic_year_id = ?",
    )?;
    let rows = stmt
        .query_map([student_id, year_id], |r| {
            Ok(ScoredPeriod {
                subject_id: r.get(0)?,
                semester_number: r.get(1)?,
                period_number: r.get(2)?,
                score: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn subject_row(subject: &Subject, grades: &[ScoredPeriod], averages: &[calc::Average]) -> ReportCardRow {
    let mut row = ReportCardRow {
        subject_id: subject.id.clone(),
        subject_name: subject.subject_name.clone(),
        subject_code: subject.subject_code.clone(),
        is_core: subject.is_core,
        scores: ColumnValues::default(),
        grade_status: None,
    };

    for g in grades.iter().filter(|g| g.subject_id == subject.id) {
        if let Some(column) = ReportColumn::for_period(g.semester_number, g.period_number) {
            *row.scores.slot(column) = Some(g.score);
        }
    }

    // Semester rows are placed by their semester number, not fetch order.
    for a in averages.iter().filter(|a| a.subject_id == subject.id) {
        match a.semester_number {
            Some(1) => row.scores.sem1_average = a.semester_average,
            Some(2) => row.scores.sem2_average = a.semester_average,
            Some(_) => {}
            None => {
                row.scores.yearly_average = a.yearly_average;
                row.grade_status = a.grade_status;
            }
        }
    }
    row
}

/// Everything a report card shows for one student and year.
///
/// Subjects come from the student's current class, core subjects first.
/// Scores that were never entered stay `None`.
pub fn assemble_report_card(
    store: &Store,
    caller: &Caller,
    student_id: &str,
    academic_year_id: &str,
) -> CoreResult<ReportCard> {
    let conn = store.conn();
    let student = roster::load_student(conn, student_id)?;
    auth::ensure_school_access(caller, &student.school_id)?;
    let academic_year = calendar::load_year(conn, academic_year_id)?;
    if academic_year.school_id != student.school_id {
        return Err(CoreError::not_found("academic year", academic_year_id));
    }
    let school = roster::load_school(conn, &student.school_id)?;
    let class = roster::current_class(conn, student_id)?;
    let subjects = match &class {
        Some(c) => roster::class_subjects(conn, &c.id)?,
        None => Vec::new(),
    };

    let grades = scored_periods(conn, student_id, academic_year_id)?;
    let averages = calc::load_averages(conn, student_id, academic_year_id)?;
    let rows: Vec<ReportCardRow> = subjects
        .iter()
        .map(|s| subject_row(s, &grades, &averages))
        .collect();
    let period_averages = column_averages(&rows);

    tracing::debug!(
        student_id,
        academic_year_id,
        subjects = rows.len(),
        "report card assembled"
    );
    Ok(ReportCard {
        student,
        school,
        class,
        academic_year,
        subjects: rows,
        period_averages,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreTone {
    Pass,
    Fail,
    Neutral,
}

pub fn score_tone(score: Option<f64>) -> ScoreTone {
    match score {
        Some(s) if s >= PASS_MARK => ScoreTone::Pass,
        Some(_) => ScoreTone::Fail,
        None => ScoreTone::Neutral,
    }
}

pub fn format_score(score: Option<f64>) -> String {
    match score {
        Some(s) => format!("{s:.1}"),
        None => "-".to_string(),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetCell {
    pub text: String,
    pub tone: ScoreTone,
    pub bold: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetRow {
    pub label: String,
    pub cells: Vec<SheetCell>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCardSheet {
    pub school_name: String,
    pub student_name: String,
    pub student_number: String,
    pub class_name: Option<String>,
    pub year_name: String,
    pub headers: Vec<String>,
    pub rows: Vec<SheetRow>,
}

fn sheet_row(label: &str, values: &ColumnValues) -> SheetRow {
    SheetRow {
        label: label.to_string(),
        cells: ReportColumn::ALL
            .iter()
            .map(|&c| {
                let v = values.get(c);
                SheetCell {
                    text: format_score(v),
                    tone: score_tone(v),
                    bold: c.is_average(),
                }
            })
            .collect(),
    }
}

pub fn build_sheet(card: &ReportCard) -> ReportCardSheet {
    let mut headers = vec!["Subject".to_string()];
    headers.extend(ReportColumn::ALL.iter().map(|c| c.header().to_string()));

    let mut rows: Vec<SheetRow> = card
        .subjects
        .iter()
        .map(|r| sheet_row(&r.subject_name, &r.scores))
        .collect();
    rows.push(sheet_row("Average", &card.period_averages));

    ReportCardSheet {
        school_name: card.school.school_name.clone(),
        student_name: format!("{} {}", card.student.first_name, card.student.last_name),
        student_number: card.student.student_number.clone(),
        class_name: card.class.as_ref().map(|c| c.class_name.clone()),
        year_name: card.academic_year.year_name.clone(),
        headers,
        rows,
    }
}

pub fn report_card_sheet(
    store: &Store,
    caller: &Caller,
    student_id: &str,
    academic_year_id: &str,
) -> CoreResult<ReportCardSheet> {
    let card = assemble_report_card(store, caller, student_id, academic_year_id)?;
    Ok(build_sheet(&card))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{caller, Role};
    use crate::calc::fixtures::year;
    use crate::calendar::AcademicYearDetail;
    use crate::ledger::{enter_grade, GradeEntry};
    use crate::roster::fixtures::{admin, school, seed, Seeded};
    use assert_matches::assert_matches;

    fn grade(store: &Store, s: &Seeded, y: &AcademicYearDetail, subject: usize, sem: usize, period: usize, score: f64) {
        enter_grade(
            store,
            &admin(&s.school.id),
            &GradeEntry {
                student_id: Some(s.student.id.clone()),
                class_id: Some(s.class.id.clone()),
                subject_id: Some(s.subjects[subject].id.clone()),
                assessment_period_id: Some(y.semesters[sem].periods[period].id.clone()),
                score: Some(score),
            },
        )
        .expect("enter grade");
    }

    fn row(name: &str, scores: ColumnValues) -> ReportCardRow {
        ReportCardRow {
            subject_id: name.to_lowercase(),
            subject_name: name.to_string(),
            subject_code: name.to_uppercase(),
            is_core: false,
            scores,
            grade_status: None,
        }
    }

    #[test]
    fn column_means_skip_missing_values() {
        let rows = vec![
            row("Math", ColumnValues { period1: Some(80.0), sem1_exam: Some(50.0), ..Default::default() }),
            row("English", ColumnValues { period1: Some(90.0), ..Default::default() }),
            row("Art", ColumnValues::default()),
        ];
        let means = column_averages(&rows);
        assert_eq!(means.period1, Some(85.0));
        assert_eq!(means.sem1_exam, Some(50.0));
        assert_eq!(means.period2, None);
        assert_eq!(means.yearly_average, None);
        assert_eq!(column_averages(&[]), ColumnValues::default());
    }

    #[test]
    fn tones_and_text() {
        assert_eq!(score_tone(Some(70.0)), ScoreTone::Pass);
        assert_eq!(score_tone(Some(69.9)), ScoreTone::Fail);
        assert_eq!(score_tone(None), ScoreTone::Neutral);
        assert_eq!(format_score(Some(85.0)), "85.0");
        assert_eq!(format_score(Some(72.26)), "72.3");
        assert_eq!(format_score(None), "-");
    }

    #[test]
    fn stored_periods_map_to_display_columns() {
        assert_eq!(ReportColumn::for_period(1, 4), Some(ReportColumn::Sem1Exam));
        assert_eq!(ReportColumn::for_period(2, 1), Some(ReportColumn::Period4));
        assert_eq!(ReportColumn::for_period(2, 4), Some(ReportColumn::Sem2Exam));
        assert_eq!(ReportColumn::for_period(3, 1), None);
    }

    #[test]
    fn single_score_report() {
        let store = Store::open_in_memory().unwrap();
        let s = seed(&store, &[("Mathematics", "MATH", true)]);
        let y = year(&store, &s.school.id);
        grade(&store, &s, &y, 0, 0, 0, 85.0);

        let card = assemble_report_card(&store, &admin(&s.school.id), &s.student.id, &y.year.id).unwrap();
        assert_eq!(card.subjects.len(), 1);
        let only = &card.subjects[0];
        assert_eq!(only.scores.period1, Some(85.0));
        for c in ReportColumn::ALL.into_iter().skip(1) {
            assert_eq!(only.scores.get(c), None, "{c:?}");
            assert_eq!(card.period_averages.get(c), None, "{c:?}");
        }
        assert_eq!(card.period_averages.period1, Some(85.0));
        assert_eq!(only.grade_status, None);
    }

    #[test]
    fn semesters_pair_by_number_not_fetch_order() {
        // Semester 2 is graded first so its average row is written first.
        let store = Store::open_in_memory().unwrap();
        let s = seed(&store, &[("Mathematics", "MATH", true)]);
        let y = year(&store, &s.school.id);
        for p in 0..4 {
            grade(&store, &s, &y, 0, 1, p, 60.0);
        }
        for p in 0..4 {
            grade(&store, &s, &y, 0, 0, p, 90.0);
        }

        let card = assemble_report_card(&store, &admin(&s.school.id), &s.student.id, &y.year.id).unwrap();
        let r = &card.subjects[0];
        assert_eq!(r.scores.sem1_average, Some(90.0));
        assert_eq!(r.scores.sem2_average, Some(60.0));
        assert_eq!(r.scores.period4, Some(60.0));
        assert_eq!(r.scores.sem2_exam, Some(60.0));
        assert_eq!(r.scores.yearly_average, Some(75.0));
        assert_eq!(r.grade_status, Some(GradeStatus::Pass));
    }

    #[test]
    fn subjects_are_ordered_core_first() {
        let store = Store::open_in_memory().unwrap();
        let s = seed(
            &store,
            &[("Art", "ART", false), ("Mathematics", "MATH", true), ("English", "ENG", true)],
        );
        let y = year(&store, &s.school.id);
        let card = assemble_report_card(&store, &admin(&s.school.id), &s.student.id, &y.year.id).unwrap();
        let names: Vec<&str> = card.subjects.iter().map(|r| r.subject_name.as_str()).collect();
        assert_eq!(names, vec!["English", "Mathematics", "Art"]);
    }

    #[test]
    fn report_respects_tenancy() {
        let store = Store::open_in_memory().unwrap();
        let s = seed(&store, &[("Mathematics", "MATH", true)]);
        let y = year(&store, &s.school.id);
        let other = school(&store, "Elsewhere");
        assert_matches!(
            assemble_report_card(&store, &caller(Role::Parent, Some(&other.id)), &s.student.id, &y.year.id),
            Err(CoreError::Forbidden(_))
        );
        assert_matches!(
            assemble_report_card(&store, &admin(&s.school.id), &s.student.id, "nope"),
            Err(CoreError::NotFound { entity: "academic year", .. })
        );

        let foreign_year = year(&store, &other.id);
        assert_matches!(
            assemble_report_card(&store, &admin(&s.school.id), &s.student.id, &foreign_year.year.id),
            Err(CoreError::NotFound { entity: "academic year", .. })
        );
    }

    #[test]
    fn sheet_has_header_rows_and_average_row() {
        let store = Store::open_in_memory().unwrap();
        let s = seed(&store, &[("Mathematics", "MATH", true), ("English", "ENG", true)]);
        let y = year(&store, &s.school.id);
        grade(&store, &s, &y, 0, 0, 0, 85.0);
        grade(&store, &s, &y, 1, 0, 0, 55.0);

        let sheet = report_card_sheet(&store, &admin(&s.school.id), &s.student.id, &y.year.id).unwrap();
        assert_eq!(
            sheet.headers,
            vec!["Subject", "P1", "P2", "P3", "Exam", "Sem 1", "P4", "P5", "P6", "Exam", "Sem 2", "Yearly"]
        );
        assert_eq!(sheet.student_name, "Ada Okafor");
        assert_eq!(sheet.class_name.as_deref(), Some("Grade 7A"));

        let labels: Vec<&str> = sheet.rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["English", "Mathematics", "Average"]);

        let english = &sheet.rows[0].cells;
        assert_eq!((english[0].text.as_str(), english[0].tone), ("55.0", ScoreTone::Fail));
        assert_eq!((english[1].text.as_str(), english[1].tone), ("-", ScoreTone::Neutral));
        assert!(english[4].bold && !english[3].bold);

        let avg = &sheet.rows[2].cells;
        assert_eq!((avg[0].text.as_str(), avg[0].tone), ("70.0", ScoreTone::Pass));
    }
}
