// 🚪 Registry Gateway - The only entry point the surfaces use
//
// CLI, TUI and HTTP all go through here. Status always comes from the
// shared reconciliation engine; nothing below recomputes it inline.

use crate::db::SqliteStore;
use crate::entities::{StaffDirectory, Student, StudentDirectory};
use crate::ledger::{checked_total, LedgerError, PaymentLedger, PaymentRecord};
use crate::period::{Period, PeriodCalendar, Term};
use crate::reconciliation::{FeeReconciliationEngine, FeeStatus, StudentFeeReport};
use crate::schedule::FeeSchedule;
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("unknown user: {0}")]
    Unauthorized(String),

    #[error("user '{username}' may not {action}")]
    Forbidden { username: String, action: String },

    #[error("student not found: {0}")]
    StudentNotFound(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Payment as submitted by staff (before id/recorder are attached)
#[derive(Debug, Clone, Deserialize)]
pub struct NewPayment {
    pub student_reg_number: String,
    pub academic_year: String,
    pub term: String,
    pub amount_paid: Decimal,
    /// Defaults to the day the payment is recorded
    #[serde(default)]
    pub payment_date: Option<NaiveDate>,
}

/// One line of the dashboard / defaulters list
#[derive(Debug, Clone, Serialize)]
pub struct StudentStatusRow {
    pub student: Student,
    pub current_period: Period,
    pub status: FeeStatus,
}

#[derive(Clone)]
pub struct RegistryGateway {
    students: Arc<dyn StudentDirectory>,
    staff: Arc<dyn StaffDirectory>,
    engine: FeeReconciliationEngine,
}

impl RegistryGateway {
    pub fn new(
        students: Arc<dyn StudentDirectory>,
        staff: Arc<dyn StaffDirectory>,
        engine: FeeReconciliationEngine,
    ) -> Self {
        RegistryGateway {
            students,
            staff,
            engine,
        }
    }

    /// Wire everything to one SQLite store
    pub fn with_store(store: Arc<SqliteStore>, schedule: Arc<FeeSchedule>) -> Self {
        let engine = FeeReconciliationEngine::new(schedule, PeriodCalendar::new(), store.clone());
        RegistryGateway::new(store.clone(), store, engine)
    }

    pub fn engine(&self) -> &FeeReconciliationEngine {
        &self.engine
    }

    fn authorize_payment(&self, actor: &str) -> Result<(), GatewayError> {
        let user = self
            .staff
            .find_user(actor)?
            .ok_or_else(|| GatewayError::Unauthorized(actor.to_string()))?;

        if !user.role.can_record_payments() {
            warn!(username = actor, role = user.role.as_str(), "payment refused: role");
            return Err(GatewayError::Forbidden {
                username: actor.to_string(),
                action: "record payments".to_string(),
            });
        }
        Ok(())
    }

    fn require_student(&self, reg_number: &str) -> Result<Student, GatewayError> {
        self.students
            .lookup_student(reg_number)?
            .ok_or_else(|| GatewayError::StudentNotFound(reg_number.to_string()))
    }

    /// Authorise `actor`, then append the payment to the ledger
    pub fn record_payment(
        &self,
        actor: &str,
        payment: NewPayment,
        today: NaiveDate,
    ) -> Result<PaymentRecord, GatewayError> {
        self.authorize_payment(actor)?;

        let record = PaymentRecord::new(
            payment.student_reg_number.trim(),
            Period::new(payment.academic_year.trim(), Term::parse(&payment.term)),
            payment.amount_paid,
            payment.payment_date.unwrap_or(today),
            actor,
        );

        self.engine.ledger().append(record.clone())?;
        info!(id = %record.id, reg = %record.student_reg_number, "payment recorded via gateway");

        Ok(record)
    }

    pub fn student_report<D: Datelike>(
        &self,
        reg_number: &str,
        now: &D,
    ) -> Result<StudentFeeReport, GatewayError> {
        let student = self.require_student(reg_number)?;
        Ok(self.engine.report(&student, now)?)
    }

    fn status_rows<D: Datelike>(
        &self,
        students: Vec<Student>,
        now: &D,
    ) -> Result<Vec<StudentStatusRow>, GatewayError> {
        let current_period = self.engine.calendar().current_period(now);

        students
            .into_iter()
            .map(|student| {
                let status = self.engine.current_status(&student, now)?;
                Ok(StudentStatusRow {
                    student,
                    current_period: current_period.clone(),
                    status,
                })
            })
            .collect()
    }

    /// Most recently admitted students with their current status
    pub fn recent_students_with_status<D: Datelike>(
        &self,
        limit: usize,
        now: &D,
    ) -> Result<Vec<StudentStatusRow>, GatewayError> {
        let students = self.students.list_students(Some(limit))?;
        self.status_rows(students, now)
    }

    pub fn all_students_with_status<D: Datelike>(
        &self,
        now: &D,
    ) -> Result<Vec<StudentStatusRow>, GatewayError> {
        let students = self.students.list_students(None)?;
        self.status_rows(students, now)
    }

    /// Students owing for the period in session at `now`
    pub fn defaulters<D: Datelike>(&self, now: &D) -> Result<Vec<StudentStatusRow>, GatewayError> {
        let rows = self.all_students_with_status(now)?;
        Ok(rows.into_iter().filter(|row| row.status.is_defaulter()).collect())
    }

    pub fn payment_history(&self, reg_number: &str) -> Result<Vec<PaymentRecord>, GatewayError> {
        self.require_student(reg_number)?;
        Ok(self.engine.ledger().payments_for(reg_number)?)
    }

    /// Total outstanding across every defaulter right now
    pub fn total_outstanding_now<D: Datelike>(&self, now: &D) -> Result<Decimal, GatewayError> {
        let outstanding = self
            .defaulters(now)?
            .iter()
            .map(|row| self.engine.current_outstanding(&row.student, now))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(checked_total(outstanding)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Role, StaffRegistry, StaffUser, StudentRegistry};
    use crate::ledger::InMemoryLedger;
    use crate::schedule::FeeScheduleEntry;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn setup() -> RegistryGateway {
        let students = StudentRegistry::new();
        students.register(Student::new(
            "S1",
            "Ada",
            "Basic 1",
            Period::new("2024/2025", Term::First),
            day(2024, 9, 2),
        ));
        students.register(Student::new(
            "S2",
            "Bayo",
            "Nur. 1",
            Period::new("2024/2025", Term::First),
            day(2024, 9, 5),
        ));
        students.register(Student::new(
            "S3",
            "Chioma",
            "JSS 3",
            Period::new("2024/2025", Term::First),
            day(2024, 9, 1),
        ));

        let staff = StaffRegistry::new();
        staff.add(StaffUser::new("bursar", Role::Admin));
        staff.add(StaffUser::new("clerk", Role::Staff));

        let schedule = FeeSchedule::from_entries(vec![
            FeeScheduleEntry::new("Basic 1", Term::First, Decimal::from(60000)),
            FeeScheduleEntry::new("Nur. 1", Term::First, Decimal::from(50000)),
        ])
        .unwrap();

        let students: Arc<dyn StudentDirectory> = Arc::new(students);
        let ledger = Arc::new(InMemoryLedger::new(students.clone()));
        let engine = FeeReconciliationEngine::new(Arc::new(schedule), PeriodCalendar::new(), ledger);

        RegistryGateway::new(students, Arc::new(staff), engine)
    }

    fn new_payment(reg: &str, amount: i64) -> NewPayment {
        NewPayment {
            student_reg_number: reg.to_string(),
            academic_year: "2024/2025".to_string(),
            term: "first term".to_string(),
            amount_paid: Decimal::from(amount),
            payment_date: None,
        }
    }

    #[test]
    fn test_only_admin_can_record() {
        let gateway = setup();
        let today = day(2024, 10, 1);

        let stranger = gateway.record_payment("nobody", new_payment("S1", 100), today);
        assert!(matches!(stranger, Err(GatewayError::Unauthorized(_))));

        let clerk = gateway.record_payment("clerk", new_payment("S1", 100), today);
        assert!(matches!(clerk, Err(GatewayError::Forbidden { .. })));

        let record = gateway.record_payment("bursar", new_payment("S1", 100), today).unwrap();
        assert_eq!(record.recorded_by, "bursar");
        assert_eq!(record.payment_date, today);
        assert_eq!(record.period, Period::new("2024/2025", Term::First));
    }

    #[test]
    fn test_ledger_errors_pass_through() {
        let gateway = setup();
        let today = day(2024, 10, 1);

        let zero = gateway.record_payment("bursar", new_payment("S1", 0), today);
        assert!(matches!(zero, Err(GatewayError::Ledger(LedgerError::InvalidAmount(_)))));

        let ghost = gateway.record_payment("bursar", new_payment("GHOST", 10), today);
        assert!(matches!(ghost, Err(GatewayError::Ledger(LedgerError::UnknownStudent(_)))));
    }

    #[test]
    fn test_report_reflects_new_payment() {
        let gateway = setup();
        let now = day(2024, 10, 15);

        let before = gateway.student_report("S1", &now).unwrap();
        assert_eq!(before.current_status, FeeStatus::Defaulter);

        gateway.record_payment("bursar", new_payment("S1", 60000), now).unwrap();

        let after = gateway.student_report("S1", &now).unwrap();
        assert_eq!(after.current_status, FeeStatus::Paid);
        assert_eq!(after.total_outstanding, Decimal::ZERO);

        assert!(matches!(
            gateway.student_report("S404", &now),
            Err(GatewayError::StudentNotFound(_))
        ));
    }

    #[test]
    fn test_recent_and_defaulters() {
        let gateway = setup();
        let now = day(2024, 10, 15);
        gateway.record_payment("bursar", new_payment("S2", 50000), now).unwrap();

        let recent = gateway.recent_students_with_status(2, &now).unwrap();
        let regs: Vec<&str> = recent.iter().map(|r| r.student.reg_number.as_str()).collect();
        assert_eq!(regs, vec!["S2", "S1"]);
        assert_eq!(recent[0].status, FeeStatus::Paid);

        // S3's class has no schedule entry, so it is N/A and never a defaulter
        let defaulters = gateway.defaulters(&now).unwrap();
        assert_eq!(defaulters.len(), 1);
        assert_eq!(defaulters[0].student.reg_number, "S1");
        assert_eq!(gateway.total_outstanding_now(&now).unwrap(), Decimal::from(60000));
    }

    #[test]
    fn test_total_outstanding_matches_breakdown_entries() {
        let gateway = setup();
        let now = day(2024, 10, 15);
        gateway.record_payment("bursar", new_payment("S1", 20000), now).unwrap();
        gateway.record_payment("bursar", new_payment("S2", 15000), now).unwrap();

        let from_reports: Decimal = ["S1", "S2"]
            .iter()
            .map(|reg| gateway.student_report(reg, &now).unwrap().breakdown[0].outstanding_amount)
            .sum();

        assert_eq!(from_reports, Decimal::from(75000));
        assert_eq!(gateway.total_outstanding_now(&now).unwrap(), from_reports);
    }

    #[test]
    fn test_payment_history() {
        let gateway = setup();
        gateway
            .record_payment("bursar", new_payment("S1", 100), day(2024, 9, 20))
            .unwrap();
        gateway
            .record_payment("bursar", new_payment("S1", 200), day(2024, 10, 20))
            .unwrap();

        let history = gateway.payment_history("S1").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].amount_paid, Decimal::from(200));

        assert!(gateway.payment_history("S2").unwrap().is_empty());
        assert!(matches!(
            gateway.payment_history("S404"),
            Err(GatewayError::StudentNotFound(_))
        ));
    }

    #[test]
    fn test_sqlite_wiring() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store
            .register_student(&Student::new(
                "S1",
                "Ada",
                "Basic 1",
                Period::new("2024/2025", Term::First),
                day(2024, 9, 2),
            ))
            .unwrap();
        store.bootstrap_admin("admin").unwrap();

        let schedule = FeeSchedule::from_entries(vec![FeeScheduleEntry::new(
            "Basic 1",
            Term::First,
            Decimal::from(60000),
        )])
        .unwrap();
        let gateway = RegistryGateway::with_store(store.clone(), Arc::new(schedule));
        let now = day(2024, 10, 15);

        gateway.record_payment("admin", new_payment("S1", 65000), now).unwrap();

        let report = gateway.student_report("S1", &now).unwrap();
        assert_eq!(report.current_status, FeeStatus::Paid);
        assert_eq!(report.breakdown[0].outstanding_amount, Decimal::from(-5000));
        assert_eq!(store.events_for_student("S1").unwrap()[0].actor, "admin");
    }
}
