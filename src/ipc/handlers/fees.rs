use crate::ipc::error::{err, ok, store_err};
use crate::ipc::helpers::{optional_str, require_data, required_f64, required_i64, required_non_empty};
use crate::ipc::types::{AppState, Request};
use crate::model::{parse_calendar_date, Fee, FeeStatus};
use crate::views::{self, StatusFilter};
use chrono::NaiveDate;
use serde_json::json;

fn parse_year(req: &Request) -> Result<i32, serde_json::Value> {
    let year = required_i64(req, "year")?;
    i32::try_from(year)
        .ok()
        .filter(|y| (1..=9999).contains(y))
        .ok_or_else(|| err(&req.id, "bad_params", "year out of range", None))
}

fn parse_status(req: &Request, raw: &str) -> Result<FeeStatus, serde_json::Value> {
    raw.parse::<FeeStatus>()
        .map_err(|e| err(&req.id, "bad_params", e, Some(json!({ "status": raw }))))
}

fn parse_date(req: &Request, key: &str) -> Result<NaiveDate, serde_json::Value> {
    let raw = required_non_empty(req, key)?;
    parse_calendar_date(&raw).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            format!("{} is not a calendar date", key),
            Some(json!({ key: raw })),
        )
    })
}

fn parse_fee(req: &Request) -> Result<Fee, serde_json::Value> {
    let status = match optional_str(req, "status") {
        Some(raw) if !raw.is_empty() => parse_status(req, &raw)?,
        _ => FeeStatus::Unpaid,
    };
    Ok(Fee {
        student_id: required_non_empty(req, "studentId")?,
        month: required_non_empty(req, "month")?,
        year: parse_year(req)?,
        amount: required_f64(req, "amount")?,
        status,
        issue_date: parse_date(req, "issueDate")?,
        due_date: parse_date(req, "dueDate")?,
    })
}

fn handle_fees_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let filter = match optional_str(req, "status") {
        Some(raw) if !raw.is_empty() => match raw.parse::<StatusFilter>() {
            Ok(f) => f,
            Err(e) => return err(&req.id, "bad_params", e, Some(json!({ "status": raw }))),
        },
        _ => StatusFilter::All,
    };
    let Some(data) = state.data.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let snapshot = match data.store.snapshot() {
        Ok(s) => s,
        Err(e) => return store_err(&req.id, &e),
    };
    let records = state
        .fee_records
        .get_or_compute(&snapshot, |s| views::fee_records(s.students, s.fees));
    let fees = views::filter_by_status(records.clone(), filter);
    ok(
        &req.id,
        json!({
            "fees": fees,
            "total": records.len(),
        }),
    )
}

fn handle_fees_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let fee = match parse_fee(req) {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    let data = match require_data(state, req) {
        Ok(d) => d,
        Err(resp) => return resp,
    };
    match data.store.add_fee(fee) {
        Ok(()) => ok(&req.id, json!({ "feeCount": data.store.fees().len() })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_fees_update_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let parsed = (|| -> Result<(String, String, i32, FeeStatus), serde_json::Value> {
        let student_id = required_non_empty(req, "studentId")?;
        let month = required_non_empty(req, "month")?;
        let year = parse_year(req)?;
        let status = parse_status(req, &required_non_empty(req, "status")?)?;
        Ok((student_id, month, year, status))
    })();
    let (student_id, month, year, status) = match parsed {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if status == FeeStatus::Unpaid && !state.settings.fees.allow_status_revert {
        return err(
            &req.id,
            "status_revert_disabled",
            "fees cannot be moved back to Unpaid",
            Some(json!({ "setting": "fees.allowStatusRevert" })),
        );
    }
    let data = match require_data(state, req) {
        Ok(d) => d,
        Err(resp) => return resp,
    };
    match data
        .store
        .update_fee_status(&student_id, &month, year, status)
    {
        Ok(matched) => ok(
            &req.id,
            json!({
                "matched": matched,
                "status": status,
            }),
        ),
        Err(e) => store_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "fees.list" => Some(handle_fees_list(state, req)),
        "fees.create" => Some(handle_fees_create(state, req)),
        "fees.updateStatus" => Some(handle_fees_update_status(state, req)),
        _ => None,
    }
}
