// 📒 Payment Ledger - Append-only payment records
//
// The ledger is the audit trail: records are never updated or deleted.
// Several records for the same student + period accumulate.
//
// Every query is scoped to one student, so cost grows with that
// student's history, never with the whole ledger.

use crate::entities::StudentDirectory;
use crate::period::Period;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::{info, warn};

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Payment amount must be strictly positive, and the running total for
    /// its student + period must stay representable
    #[error("invalid payment amount: {0}")]
    InvalidAmount(Decimal),

    /// Payment references a student the registry does not know
    #[error("unknown student: {0}")]
    UnknownStudent(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// A stored value could not be read back (e.g. unparsable amount)
    #[error("corrupt ledger data: {0}")]
    Corrupt(String),
}

/// Sum amounts, failing instead of overflowing
pub fn checked_total<I>(amounts: I) -> Result<Decimal, LedgerError>
where
    I: IntoIterator<Item = Decimal>,
{
    amounts.into_iter().try_fold(Decimal::ZERO, |total, amount| {
        total
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Corrupt(format!("total overflows adding {}", amount)))
    })
}

// ============================================================================
// PAYMENT RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Stable identity (UUID)
    pub id: String,

    pub student_reg_number: String,

    /// Academic period the payment is for (not when it was made)
    pub period: Period,

    pub amount_paid: Decimal,

    pub payment_date: NaiveDate,

    /// Username of the staff member who recorded it
    pub recorded_by: String,
}

impl PaymentRecord {
    pub fn new(
        student_reg_number: impl Into<String>,
        period: Period,
        amount_paid: Decimal,
        payment_date: NaiveDate,
        recorded_by: impl Into<String>,
    ) -> Self {
        PaymentRecord {
            id: uuid::Uuid::new_v4().to_string(),
            student_reg_number: student_reg_number.into(),
            period,
            amount_paid,
            payment_date,
            recorded_by: recorded_by.into(),
        }
    }

    /// Check the amount precondition (> 0)
    pub fn validate_amount(&self) -> Result<(), LedgerError> {
        if self.amount_paid <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(self.amount_paid));
        }
        Ok(())
    }

    /// Check that adding this record to `running` (the current sum for
    /// its student + period) cannot overflow
    pub fn validate_running_total(&self, running: Decimal) -> Result<(), LedgerError> {
        if running.checked_add(self.amount_paid).is_none() {
            return Err(LedgerError::InvalidAmount(self.amount_paid));
        }
        Ok(())
    }
}

// ============================================================================
// LEDGER CONTRACT
// ============================================================================

/// Durable, append-only payment store.
///
/// Implementations must make a single `append` atomic with respect to
/// `sum_paid` on the same key: a concurrent reader sees all of a record
/// or none of it.
pub trait PaymentLedger: Send + Sync {
    /// Append one record.
    ///
    /// Fails with `InvalidAmount` if `amount_paid <= 0` or if the sum for
    /// its student + period would overflow, and with `UnknownStudent` if
    /// the reg number is not registered. A rejected append leaves the
    /// ledger untouched.
    fn append(&self, record: PaymentRecord) -> Result<(), LedgerError>;

    /// Sum of `amount_paid` over records matching student and period
    /// exactly; zero when there are none.
    fn sum_paid(&self, student_reg_number: &str, period: &Period) -> Result<Decimal, LedgerError>;

    /// Distinct periods with at least one record for the student
    fn all_periods_with_payments(
        &self,
        student_reg_number: &str,
    ) -> Result<BTreeSet<Period>, LedgerError>;

    /// Payment history for one student, newest payment date first
    fn payments_for(&self, student_reg_number: &str) -> Result<Vec<PaymentRecord>, LedgerError>;
}

// ============================================================================
// IN-MEMORY LEDGER
// ============================================================================

/// Ledger kept in process memory, indexed by student.
///
/// One write lock per append gives the required atomicity.
pub struct InMemoryLedger {
    students: Arc<dyn StudentDirectory>,
    records: RwLock<HashMap<String, Vec<PaymentRecord>>>,
}

impl InMemoryLedger {
    pub fn new(students: Arc<dyn StudentDirectory>) -> Self {
        InMemoryLedger {
            students,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Total number of records across all students
    pub fn record_count(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }
}

fn period_total(
    records: &HashMap<String, Vec<PaymentRecord>>,
    student_reg_number: &str,
    period: &Period,
) -> Result<Decimal, LedgerError> {
    checked_total(
        records
            .get(student_reg_number)
            .into_iter()
            .flatten()
            .filter(|r| &r.period == period)
            .map(|r| r.amount_paid),
    )
}

impl PaymentLedger for InMemoryLedger {
    fn append(&self, record: PaymentRecord) -> Result<(), LedgerError> {
        if let Err(e) = record.validate_amount() {
            warn!(reg = %record.student_reg_number, amount = %record.amount_paid, "payment rejected: invalid amount");
            return Err(e);
        }

        if self.students.lookup_student(&record.student_reg_number)?.is_none() {
            warn!(reg = %record.student_reg_number, "payment rejected: unknown student");
            return Err(LedgerError::UnknownStudent(record.student_reg_number));
        }

        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);

        let running = period_total(&records, &record.student_reg_number, &record.period)?;
        if let Err(e) = record.validate_running_total(running) {
            warn!(reg = %record.student_reg_number, period = %record.period, "payment rejected: period total would overflow");
            return Err(e);
        }

        info!(
            reg = %record.student_reg_number,
            period = %record.period,
            amount = %record.amount_paid,
            recorded_by = %record.recorded_by,
            "payment appended"
        );

        records
            .entry(record.student_reg_number.clone())
            .or_default()
            .push(record);

        Ok(())
    }

    fn sum_paid(&self, student_reg_number: &str, period: &Period) -> Result<Decimal, LedgerError> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        period_total(&records, student_reg_number, period)
    }

    fn all_periods_with_payments(
        &self,
        student_reg_number: &str,
    ) -> Result<BTreeSet<Period>, LedgerError> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);

        Ok(records
            .get(student_reg_number)
            .map(|history| history.iter().map(|r| r.period.clone()).collect())
            .unwrap_or_default())
    }

    fn payments_for(&self, student_reg_number: &str) -> Result<Vec<PaymentRecord>, LedgerError> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);

        let mut history = records.get(student_reg_number).cloned().unwrap_or_default();
        // Latest append first within the same payment date (sort is stable)
        history.reverse();
        history.sort_by(|a, b| b.payment_date.cmp(&a.payment_date));
        Ok(history)
    }
}

// ============================================================================
// TESTS
// ============================================================================
