use crate::calc;
use crate::ipc::helpers::{caller, parse_params, reply, required_str, store};
use crate::ipc::types::{AppState, Request};
use crate::ledger::{self, GradeEntry};

fn handle_grades_enter(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let caller = match caller(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let entry: GradeEntry = match parse_params(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    reply(req, ledger::enter_grade(store, &caller, &entry))
}

fn handle_class_subject_sheet(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let caller = match caller(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let period_id = match required_str(req, "assessmentPeriodId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    reply(
        req,
        ledger::class_subject_grade_sheet(store, &caller, &class_id, &subject_id, &period_id),
    )
}

fn handle_student_report(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let caller = match caller(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let year_id = match required_str(req, "academicYearId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    reply(
        req,
        calc::student_grade_report(store, &caller, &student_id, &year_id),
    )
}

fn handle_averages_recompute(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let caller = match caller(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let semester_id = match required_str(req, "semesterId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    reply(
        req,
        calc::recompute(store, &caller, &student_id, &subject_id, &semester_id),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.enter" => Some(handle_grades_enter(state, req)),
        "grades.classSubjectSheet" => Some(handle_class_subject_sheet(state, req)),
        "grades.studentReport" => Some(handle_student_report(state, req)),
        "averages.recompute" => Some(handle_averages_recompute(state, req)),
        _ => None,
    }
}
