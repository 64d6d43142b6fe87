use crate::model::{Fee, FeeStatus, Student};
use crate::store::Snapshot;
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;

pub const MISSING: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_students: usize,
    pub fees_collected: f64,
    pub fees_pending: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassCount {
    pub class_name: String,
    pub students: usize,
}

/// A fee joined with the name and class of the student it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeRecord {
    #[serde(flatten)]
    pub fee: Fee,
    pub student_name: String,
    pub class_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    All,
    Only(FeeStatus),
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(StatusFilter::All);
        }
        s.parse::<FeeStatus>().map(StatusFilter::Only)
    }
}

impl StatusFilter {
    pub fn admits(self, status: FeeStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(s) => s == status,
        }
    }
}

pub fn dashboard_stats(students: &[Student], fees: &[Fee]) -> DashboardStats {
    let sum = |status: FeeStatus| {
        fees.iter()
            .filter(|f| f.status == status)
            .map(|f| f.amount)
            .sum::<f64>()
    };
    DashboardStats {
        total_students: students.len(),
        fees_collected: sum(FeeStatus::Paid),
        fees_pending: sum(FeeStatus::Unpaid),
    }
}

/// Students per class, in order of each class's first appearance.
pub fn class_histogram(students: &[Student]) -> Vec<ClassCount> {
    let mut out: Vec<ClassCount> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for s in students {
        match index.get(s.class_name.as_str()) {
            Some(&i) => out[i].students += 1,
            None => {
                index.insert(&s.class_name, out.len());
                out.push(ClassCount {
                    class_name: s.class_name.clone(),
                    students: 1,
                });
            }
        }
    }
    out
}

/// Every fee with its student's name and class, newest issue date first.
/// Fees pointing at unknown students get `N/A`.
pub fn fee_records(students: &[Student], fees: &[Fee]) -> Vec<FeeRecord> {
    let by_id: HashMap<&str, &Student> = students.iter().map(|s| (s.id.as_str(), s)).collect();
    let mut out: Vec<FeeRecord> = fees
        .iter()
        .map(|f| {
            let student = by_id.get(f.student_id.as_str());
            FeeRecord {
                fee: f.clone(),
                student_name: student
                    .map(|s| s.name.clone())
                    .unwrap_or_else(|| MISSING.to_string()),
                class_name: student
                    .map(|s| s.class_name.clone())
                    .unwrap_or_else(|| MISSING.to_string()),
            }
        })
        .collect();
    // Stable: equal dates keep store order.
    out.sort_by(|a, b| b.fee.issue_date.cmp(&a.fee.issue_date));
    out
}

pub fn filter_by_status(records: Vec<FeeRecord>, filter: StatusFilter) -> Vec<FeeRecord> {
    records
        .into_iter()
        .filter(|r| filter.admits(r.fee.status))
        .collect()
}

/// Case-insensitive substring match on name, class or roll number.
pub fn search_students<'a>(students: &'a [Student], term: &str) -> Vec<&'a Student> {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return students.iter().collect();
    }
    students
        .iter()
        .filter(|s| {
            s.name.to_lowercase().contains(&needle)
                || s.class_name.to_lowercase().contains(&needle)
                || s.roll_number.to_lowercase().contains(&needle)
        })
        .collect()
}

/// Caches one derived value per store revision.
#[derive(Debug)]
pub struct Memo<T> {
    cached: Option<(u64, T)>,
}

impl<T> Default for Memo<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Memo<T> {
    pub fn new() -> Self {
        Self { cached: None }
    }

    pub fn get_or_compute(
        &mut self,
        snapshot: &Snapshot<'_>,
        f: impl FnOnce(&Snapshot<'_>) -> T,
    ) -> &T {
        if self.cached.as_ref().map(|(rev, _)| *rev) != Some(snapshot.revision) {
            self.cached = None;
        }
        let (_, v) = self
            .cached
            .get_or_insert_with(|| (snapshot.revision, f(snapshot)));
        v
    }

    pub fn clear(&mut self) {
        self.cached = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{default_fees, default_students};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("date")
    }

    fn fee_on(student_id: &str, issued: NaiveDate, status: FeeStatus) -> Fee {
        Fee {
            student_id: student_id.to_string(),
            month: "Any".to_string(),
            year: 2024,
            amount: 1.0,
            status,
            issue_date: issued,
            due_date: issued,
        }
    }

    #[test]
    fn stats_split_paid_and_unpaid() {
        let stats = dashboard_stats(&default_students(), &default_fees());
        assert_eq!(
            stats,
            DashboardStats {
                total_students: 3,
                fees_collected: 500.0,
                fees_pending: 550.0,
            }
        );
        let empty = dashboard_stats(&[], &[]);
        assert_eq!(empty.fees_collected, 0.0);
        assert_eq!(empty.fees_pending, 0.0);
    }

    #[test]
    fn histogram_keeps_first_occurrence_order() {
        let mut students = default_students();
        let mut extra = students[1].clone();
        extra.id = "S010".into();
        students.insert(0, extra);
        let hist = class_histogram(&students);
        assert_eq!(
            hist,
            vec![
                ClassCount {
                    class_name: "6-B".into(),
                    students: 2
                },
                ClassCount {
                    class_name: "5-A".into(),
                    students: 2
                },
            ]
        );
    }

    #[test]
    fn records_sort_by_calendar_date_descending() {
        // Lexically "12/01/2023" > "02/15/2024"; by date it is older.
        let fees: Vec<Fee> = serde_json::from_value(serde_json::json!([
            {"studentId":"S001","month":"Dec","year":2023,"amount":1,"status":"Paid",
             "issueDate":"12/01/2023","dueDate":"2023-12-10"},
            {"studentId":"S001","month":"Feb","year":2024,"amount":1,"status":"Paid",
             "issueDate":"02/15/2024","dueDate":"2024-02-20"},
            {"studentId":"S002","month":"Jan","year":2024,"amount":1,"status":"Paid",
             "issueDate":"2024-01-03","dueDate":"2024-01-10"}
        ]))
        .expect("fees");
        let records = fee_records(&default_students(), &fees);
        let months: Vec<_> = records.iter().map(|r| r.fee.month.as_str()).collect();
        assert_eq!(months, vec!["Feb", "Jan", "Dec"]);
        for w in records.windows(2) {
            assert!(w[0].fee.issue_date >= w[1].fee.issue_date);
        }
    }

    #[test]
    fn records_for_unknown_students_use_placeholder() {
        let fees = vec![fee_on("GHOST", date(2024, 1, 1), FeeStatus::Unpaid)];
        let records = fee_records(&default_students(), &fees);
        assert_eq!(records[0].student_name, "N/A");
        assert_eq!(records[0].class_name, "N/A");

        let joined = fee_records(&default_students(), &default_fees());
        assert_eq!(joined[0].student_name, "Alice Johnson");
        assert_eq!(joined[1].class_name, "6-B");
    }

    #[test]
    fn record_serializes_flat() {
        let records = fee_records(&default_students(), &default_fees());
        let v = serde_json::to_value(&records[1]).expect("serialize");
        assert_eq!(v["studentId"], "S002");
        assert_eq!(v["studentName"], "Bob Smith");
        assert_eq!(v["className"], "6-B");
        assert_eq!(v["issueDate"], "2024-08-01");
    }

    #[test]
    fn status_filter_is_case_insensitive() {
        assert_eq!("ALL".parse::<StatusFilter>(), Ok(StatusFilter::All));
        assert_eq!(
            "Paid".parse::<StatusFilter>(),
            Ok(StatusFilter::Only(FeeStatus::Paid))
        );
        assert!("overdue".parse::<StatusFilter>().is_err());

        let records = fee_records(&default_students(), &default_fees());
        let unpaid = filter_by_status(records.clone(), "unpaid".parse().expect("filter"));
        assert_eq!(unpaid.len(), 1);
        assert_eq!(unpaid[0].fee.student_id, "S002");
        assert_eq!(filter_by_status(records, StatusFilter::All).len(), 2);
    }

    #[test]
    fn search_matches_any_field_ignoring_case() {
        let students = default_students();
        let names = |term: &str| -> Vec<String> {
            search_students(&students, term)
                .into_iter()
                .map(|s| s.name.clone())
                .collect()
        };
        assert_eq!(names("ALI"), vec!["Alice Johnson"]);
        assert_eq!(names("5-a"), vec!["Alice Johnson", "Charlie Brown"]);
        assert_eq!(names("1"), vec!["Alice Johnson", "Charlie Brown"]);
        assert_eq!(names("smith"), vec!["Bob Smith"]);
        assert!(names("zzz").is_empty());
        assert_eq!(names("  ").len(), 3);
    }

    #[test]
    fn memo_recomputes_only_on_new_revision() {
        let students = default_students();
        let fees = default_fees();
        let mut calls = 0;
        let mut memo = Memo::new();
        let snap = Snapshot {
            students: &students,
            fees: &fees,
            revision: 4,
            loading: false,
        };
        for _ in 0..3 {
            memo.get_or_compute(&snap, |s| {
                calls += 1;
                s.students.len()
            });
        }
        assert_eq!(calls, 1);
        let next = Snapshot { revision: 5, ..snap };
        assert_eq!(*memo.get_or_compute(&next, |_| 99), 99);
    }

    #[test]
    fn default_memo_starts_empty_and_clear_forgets() {
        let students = default_students();
        let fees = default_fees();
        let snap = Snapshot {
            students: &students,
            fees: &fees,
            revision: 1,
            loading: false,
        };
        let mut memo: Memo<usize> = Memo::default();
        assert_eq!(*memo.get_or_compute(&snap, |_| 7), 7);
        assert_eq!(*memo.get_or_compute(&snap, |_| 8), 7);
        memo.clear();
        assert_eq!(*memo.get_or_compute(&snap, |_| 9), 9);
    }
}
