use crate::error::StoreError;
use crate::model::{Fee, FeeStatus, NewStudent, Student};
use tracing::{debug, warn};
use uuid::Uuid;

/// Which collection a committed mutation touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChange {
    Students,
    Fees,
    /// Both collections were replaced wholesale by a load.
    Reloaded,
}

/// Read-only view of the store handed to listeners and view builders.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    pub students: &'a [Student],
    pub fees: &'a [Fee],
    pub revision: u64,
    pub loading: bool,
}

pub trait StoreListener {
    fn on_change(&mut self, change: StoreChange, snapshot: &Snapshot<'_>);
}

type IdGenerator = Box<dyn FnMut() -> String>;

fn uuid_student_id() -> String {
    format!("S-{}", Uuid::new_v4())
}

/// Canonical in-memory students and fees.
///
/// Starts in the loading state; mutations and snapshots are refused until
/// `finish_load` installs the initial collections. Every committed mutation
/// bumps `revision` and is announced to the subscribed listeners.
pub struct EntityStore {
    students: Vec<Student>,
    fees: Vec<Fee>,
    loading: bool,
    revision: u64,
    unique_periods: bool,
    next_id: IdGenerator,
    listeners: Vec<Box<dyn StoreListener>>,
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore {
    pub fn new() -> Self {
        Self {
            students: Vec::new(),
            fees: Vec::new(),
            loading: true,
            revision: 0,
            unique_periods: false,
            next_id: Box::new(uuid_student_id),
            listeners: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn with_id_generator(mut self, next_id: impl FnMut() -> String + 'static) -> Self {
        self.next_id = Box::new(next_id);
        self
    }

    /// When set, `add_fee` refuses a second record for the same
    /// (student, month, year).
    pub fn set_unique_periods(&mut self, enforce: bool) {
        self.unique_periods = enforce;
    }

    pub fn subscribe(&mut self, listener: Box<dyn StoreListener>) {
        self.listeners.push(listener);
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn fees(&self) -> &[Fee] {
        &self.fees
    }

    pub fn snapshot(&self) -> Result<Snapshot<'_>, StoreError> {
        if self.loading {
            return Err(StoreError::Loading);
        }
        Ok(self.current())
    }

    fn current(&self) -> Snapshot<'_> {
        Snapshot {
            students: &self.students,
            fees: &self.fees,
            revision: self.revision,
            loading: self.loading,
        }
    }

    /// Re-enters the loading state ahead of a reload.
    pub fn begin_load(&mut self) {
        self.loading = true;
    }

    pub fn finish_load(&mut self, students: Vec<Student>, fees: Vec<Fee>) {
        self.students = students;
        self.fees = fees;
        self.loading = false;
        self.commit(StoreChange::Reloaded);
    }

    fn commit(&mut self, change: StoreChange) {
        self.revision += 1;
        let snapshot = Snapshot {
            students: &self.students,
            fees: &self.fees,
            revision: self.revision,
            loading: self.loading,
        };
        for l in self.listeners.iter_mut() {
            l.on_change(change, &snapshot);
        }
    }

    fn ensure_loaded(&self) -> Result<(), StoreError> {
        if self.loading {
            Err(StoreError::Loading)
        } else {
            Ok(())
        }
    }

    pub fn add_student(&mut self, fields: NewStudent) -> Result<String, StoreError> {
        self.ensure_loaded()?;
        let id = (self.next_id)();
        if self.students.iter().any(|s| s.id == id) {
            return Err(StoreError::DuplicateId(id));
        }
        self.students.push(fields.into_student(id.clone()));
        debug!(student_id = %id, "student added");
        self.commit(StoreChange::Students);
        Ok(id)
    }

    pub fn add_fee(&mut self, fee: Fee) -> Result<(), StoreError> {
        self.ensure_loaded()?;
        if !fee.amount.is_finite() || fee.amount < 0.0 {
            return Err(StoreError::InvalidAmount(fee.amount));
        }
        if fee.month.trim().is_empty() {
            return Err(StoreError::EmptyMonth);
        }
        if self.unique_periods
            && self
                .fees
                .iter()
                .any(|f| f.matches_period(&fee.student_id, &fee.month, fee.year))
        {
            return Err(StoreError::DuplicatePeriod {
                student_id: fee.student_id,
                month: fee.month,
                year: fee.year,
            });
        }
        self.fees.push(fee);
        self.commit(StoreChange::Fees);
        Ok(())
    }

    /// Sets `status` on every fee matching the period and returns how many
    /// matched.
    pub fn update_fee_status(
        &mut self,
        student_id: &str,
        month: &str,
        year: i32,
        status: FeeStatus,
    ) -> Result<usize, StoreError> {
        self.ensure_loaded()?;
        let mut matched = 0;
        for fee in self
            .fees
            .iter_mut()
            .filter(|f| f.matches_period(student_id, month, year))
        {
            fee.status = status;
            matched += 1;
        }
        if matched > 1 {
            warn!(
                student_id,
                month,
                year,
                matched,
                "status update hit more than one fee record"
            );
        }
        if matched > 0 {
            self.commit(StoreChange::Fees);
        }
        Ok(matched)
    }
}
