use crate::calendar::{self, GradingConfigUpdate, NewAcademicYear};
use crate::ipc::helpers::{caller, optional_str, parse_params, reply, required_bool, required_str, store};
use crate::ipc::types::{AppState, Request};

fn handle_years_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let caller = match caller(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let input: NewAcademicYear = match parse_params(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    reply(req, calendar::create_academic_year(store, &caller, &input))
}

fn handle_years_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let caller = match caller(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let school_id = optional_str(req, "schoolId");
    reply(
        req,
        calendar::list_academic_years(store, &caller, school_id.as_deref()),
    )
}

fn handle_years_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let caller = match caller(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let year_id = match required_str(req, "academicYearId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    reply(req, calendar::get_academic_year(store, &caller, &year_id))
}

fn handle_years_set_current(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let caller = match caller(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let year_id = match required_str(req, "academicYearId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    reply(req, calendar::set_current_academic_year(store, &caller, &year_id))
}

fn handle_semesters_set_current(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let caller = match caller(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let semester_id = match required_str(req, "semesterId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    reply(req, calendar::set_current_semester(store, &caller, &semester_id))
}

fn handle_periods_set_lock(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let caller = match caller(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let period_id = match required_str(req, "periodId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let locked = match required_bool(req, "locked") {
        Ok(v) => v,
        Err(e) => return e,
    };
    reply(req, calendar::set_period_lock(store, &caller, &period_id, locked))
}

fn handle_grading_config_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let caller = match caller(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let update: GradingConfigUpdate = match parse_params(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    reply(req, calendar::update_grading_config(store, &caller, &update))
}

fn handle_grading_config_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let caller = match caller(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let school_id = optional_str(req, "schoolId");
    reply(
        req,
        calendar::get_grading_config(store, &caller, school_id.as_deref()),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "calendar.years.create" => Some(handle_years_create(state, req)),
        "calendar.years.list" => Some(handle_years_list(state, req)),
        "calendar.years.open" => Some(handle_years_open(state, req)),
        "calendar.years.setCurrent" => Some(handle_years_set_current(state, req)),
        "calendar.semesters.setCurrent" => Some(handle_semesters_set_current(state, req)),
        "calendar.periods.setLock" => Some(handle_periods_set_lock(state, req)),
        "calendar.gradingConfig.update" => Some(handle_grading_config_update(state, req)),
        "calendar.gradingConfig.get" => Some(handle_grading_config_get(state, req)),
        _ => None,
    }
}
