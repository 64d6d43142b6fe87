use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Persisted shape of a student. Field names are the on-disk contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    #[serde(rename = "class")]
    pub class_name: String,
    pub roll_number: String,
    pub parent_contact: String,
    pub address: String,
}

/// Everything `add_student` needs; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewStudent {
    pub name: String,
    pub class_name: String,
    pub roll_number: String,
    pub parent_contact: String,
    pub address: String,
}

impl NewStudent {
    pub fn into_student(self, id: String) -> Student {
        Student {
            id,
            name: self.name,
            class_name: self.class_name,
            roll_number: self.roll_number,
            parent_contact: self.parent_contact,
            address: self.address,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeeStatus {
    Paid,
    Unpaid,
}

impl FeeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FeeStatus::Paid => "Paid",
            FeeStatus::Unpaid => "Unpaid",
        }
    }
}

impl fmt::Display for FeeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paid" => Ok(FeeStatus::Paid),
            "unpaid" => Ok(FeeStatus::Unpaid),
            other => Err(format!("unknown fee status: {other}")),
        }
    }
}

/// Persisted shape of a monthly fee record.
///
/// `(student_id, month, year)` is the natural key used to target status
/// updates. Nothing guarantees it is unique, and `student_id` may point at a
/// student that does not exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fee {
    pub student_id: String,
    pub month: String,
    pub year: i32,
    pub amount: f64,
    pub status: FeeStatus,
    #[serde(with = "calendar_date")]
    pub issue_date: NaiveDate,
    #[serde(with = "calendar_date")]
    pub due_date: NaiveDate,
}

impl Fee {
    pub fn matches_period(&self, student_id: &str, month: &str, year: i32) -> bool {
        self.student_id == student_id && self.month == month && self.year == year
    }
}

/// Parses a calendar date in one of the layouts older data was written with.
/// Timestamps keep only their date part.
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    for layout in ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(t, layout) {
            return Some(d);
        }
    }
    DateTime::parse_from_rfc3339(t).ok().map(|dt| dt.date_naive())
}

mod calendar_date {
    use super::*;

    pub fn serialize<S: Serializer>(date: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&date.format("%Y-%m-%d").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(d)?;
        parse_calendar_date(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid calendar date: {raw:?}")))
    }
}

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN)
}

/// First-run roster used when nothing usable is persisted.
pub fn default_students() -> Vec<Student> {
    let row = |id: &str, name: &str, class: &str, roll: &str, contact: &str, addr: &str| Student {
        id: id.to_string(),
        name: name.to_string(),
        class_name: class.to_string(),
        roll_number: roll.to_string(),
        parent_contact: contact.to_string(),
        address: addr.to_string(),
    };
    vec![
        row("S001", "Alice Johnson", "5-A", "12", "111-222-3333", "123 Maple St"),
        row("S002", "Bob Smith", "6-B", "5", "444-555-6666", "456 Oak Ave"),
        row("S003", "Charlie Brown", "5-A", "18", "777-888-9999", "789 Pine Ln"),
    ]
}

pub fn default_fees() -> Vec<Fee> {
    let row = |student_id: &str, amount: f64, status: FeeStatus| Fee {
        student_id: student_id.to_string(),
        month: "August".to_string(),
        year: 2024,
        amount,
        status,
        issue_date: ymd(2024, 8, 1),
        due_date: ymd(2024, 8, 10),
    };
    vec![
        row("S001", 500.0, FeeStatus::Paid),
        row("S002", 550.0, FeeStatus::Unpaid),
    ]
}
