use crate::ipc::error::{ok, store_err};
use crate::ipc::helpers::{optional_str, require_data, required_non_empty};
use crate::ipc::types::{AppState, Request};
use crate::model::NewStudent;
use crate::views;
use serde_json::json;

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let data = match require_data(state, req) {
        Ok(d) => d,
        Err(resp) => return resp,
    };
    let snapshot = match data.store.snapshot() {
        Ok(s) => s,
        Err(e) => return store_err(&req.id, &e),
    };
    let term = optional_str(req, "search").unwrap_or_default();
    let students = views::search_students(snapshot.students, &term);
    ok(
        &req.id,
        json!({
            "students": students,
            "total": snapshot.students.len(),
        }),
    )
}

fn parse_new_student(req: &Request) -> Result<NewStudent, serde_json::Value> {
    Ok(NewStudent {
        name: required_non_empty(req, "name")?,
        class_name: required_non_empty(req, "class")?,
        roll_number: required_non_empty(req, "rollNumber")?,
        parent_contact: optional_str(req, "parentContact").unwrap_or_default(),
        address: optional_str(req, "address").unwrap_or_default(),
    })
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let fields = match parse_new_student(req) {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    let data = match require_data(state, req) {
        Ok(d) => d,
        Err(resp) => return resp,
    };
    match data.store.add_student(fields) {
        Ok(student_id) => ok(&req.id, json!({ "studentId": student_id })),
        Err(e) => store_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        _ => None,
    }
}
