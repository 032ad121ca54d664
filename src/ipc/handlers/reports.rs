use crate::ipc::helpers::{caller, reply, required_str, store};
use crate::ipc::types::{AppState, Request};
use crate::report;

fn handle_report_card(state: &mut AppState, req: &Request) -> serde_json::Value {
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
        report::assemble_report_card(store, &caller, &student_id, &year_id),
    )
}

fn handle_report_card_sheet(state: &mut AppState, req: &Request) -> serde_json::Value {
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
        report::report_card_sheet(store, &caller, &student_id, &year_id),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.reportCard" => Some(handle_report_card(state, req)),
        "reports.reportCardSheet" => Some(handle_report_card_sheet(state, req)),
        _ => None,
    }
}
