use crate::ipc::helpers::{caller, optional_str, parse_params, reply, required_str, store};
use crate::ipc::types::{AppState, Request};
use crate::roster::{self, NewClass, NewSchool, NewStudent, NewSubject};

fn handle_schools_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let caller = match caller(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let input: NewSchool = match parse_params(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    reply(req, roster::create_school(store, &caller, &input))
}

fn handle_subjects_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let caller = match caller(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let input: NewSubject = match parse_params(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    reply(req, roster::create_subject(store, &caller, &input))
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let caller = match caller(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let input: NewClass = match parse_params(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    reply(req, roster::create_class(store, &caller, &input))
}

fn handle_classes_assign_subject(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let teacher_id = optional_str(req, "teacherId");
    reply(
        req,
        roster::assign_subject(store, &caller, &class_id, &subject_id, teacher_id.as_deref()),
    )
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let caller = match caller(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let input: NewStudent = match parse_params(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    reply(req, roster::create_student(store, &caller, &input))
}

fn handle_students_enroll(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    reply(req, roster::enroll_student(store, &caller, &student_id, &class_id))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schools.create" => Some(handle_schools_create(state, req)),
        "subjects.create" => Some(handle_subjects_create(state, req)),
        "classes.create" => Some(handle_classes_create(state, req)),
        "classes.assignSubject" => Some(handle_classes_assign_subject(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.enroll" => Some(handle_students_enroll(state, req)),
        _ => None,
    }
}
