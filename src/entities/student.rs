// 🎓 Student Entity - Registry-owned record
//
// The reconciliation engine only ever reads `class` and `reg_number`
// (plus the enrollment period for the breakdown). Everything else is
// carried for the registry's own screens.

use crate::ledger::LedgerError;
use crate::period::Period;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

// ============================================================================
// STUDENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    /// Registration number - unique, used as the ledger key
    pub reg_number: String,

    pub name: String,

    /// Class name, matched exactly against the fee schedule
    pub class: String,

    /// Academic year + term at admission
    pub enrollment_period: Period,

    pub admission_date: NaiveDate,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dob: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Student {
    pub fn new(
        reg_number: impl Into<String>,
        name: impl Into<String>,
        class: impl Into<String>,
        enrollment_period: Period,
        admission_date: NaiveDate,
    ) -> Self {
        Student {
            reg_number: reg_number.into(),
            name: name.into(),
            class: class.into(),
            enrollment_period,
            admission_date,
            dob: None,
            gender: None,
            address: None,
            phone: None,
            email: None,
        }
    }
}

// ============================================================================
// STUDENT DIRECTORY
// ============================================================================

/// Read-only view of the student registry
pub trait StudentDirectory: Send + Sync {
    fn lookup_student(&self, reg_number: &str) -> Result<Option<Student>, LedgerError>;

    /// Students ordered by admission date, newest first
    fn list_students(&self, limit: Option<usize>) -> Result<Vec<Student>, LedgerError>;
}

/// In-memory student registry
///
/// Used by tests and by embedders that keep students elsewhere.
#[derive(Debug, Clone, Default)]
pub struct StudentRegistry {
    students: Arc<RwLock<HashMap<String, Student>>>,
}

impl StudentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a student. Returns false if the reg number is taken.
    pub fn register(&self, student: Student) -> bool {
        let mut students = self.students.write().unwrap_or_else(PoisonError::into_inner);

        if students.contains_key(&student.reg_number) {
            return false;
        }
        students.insert(student.reg_number.clone(), student);
        true
    }

    pub fn count(&self) -> usize {
        self.students
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl StudentDirectory for StudentRegistry {
    fn lookup_student(&self, reg_number: &str) -> Result<Option<Student>, LedgerError> {
        let students = self.students.read().unwrap_or_else(PoisonError::into_inner);
        Ok(students.get(reg_number).cloned())
    }

    fn list_students(&self, limit: Option<usize>) -> Result<Vec<Student>, LedgerError> {
        let students = self.students.read().unwrap_or_else(PoisonError::into_inner);

        let mut all: Vec<Student> = students.values().cloned().collect();
        all.sort_by(|a, b| {
            b.admission_date
                .cmp(&a.admission_date)
                .then_with(|| a.reg_number.cmp(&b.reg_number))
        });

        if let Some(limit) = limit {
            all.truncate(limit);
        }
        Ok(all)
    }
}

// ============================================================================
// TESTS
// ============================================================================
