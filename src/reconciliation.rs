// ⚖️ Reconciliation Engine - Expected vs paid, per period
//
// For a given class and period:
//   expected = schedule(class, term) ?? 0
//   expected <= 0          → NotApplicable
//   total_paid >= expected → Paid
//   otherwise              → Defaulter
//
// Status is never stored. Every query recomputes it from the schedule and
// the ledger, so a new payment or a schedule change shows up immediately.

use crate::entities::Student;
use crate::ledger::{checked_total, LedgerError, PaymentLedger};
use crate::period::{Period, PeriodCalendar};
use crate::schedule::FeeSchedule;
use chrono::Datelike;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

// ============================================================================
// FEE STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeStatus {
    /// Paid in full (or over)
    Paid,

    /// Obligation exists and is not yet covered
    Defaulter,

    /// No obligation defined for this class/term (or explicitly zero)
    NotApplicable,
}

impl FeeStatus {
    pub fn label(&self) -> &'static str {
        match self {
            FeeStatus::Paid => "Paid",
            FeeStatus::Defaulter => "Defaulter",
            FeeStatus::NotApplicable => "N/A",
        }
    }

    pub fn is_defaulter(&self) -> bool {
        matches!(self, FeeStatus::Defaulter)
    }
}

// ============================================================================
// BREAKDOWN & REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeBreakdownEntry {
    pub period: Period,
    pub expected_amount: Decimal,
    pub paid_amount: Decimal,

    /// expected - paid. Negative means overpayment (not clamped).
    pub outstanding_amount: Decimal,

    pub status: FeeStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentFeeReport {
    pub student: Student,
    pub current_period: Period,
    pub current_status: FeeStatus,

    /// Descending by period, most recent first
    pub breakdown: Vec<FeeBreakdownEntry>,

    pub total_expected: Decimal,
    pub total_paid: Decimal,
    pub total_outstanding: Decimal,
}

impl StudentFeeReport {
    pub fn summary(&self) -> String {
        format!(
            "{} ({}, {}): {} for {}, outstanding {} across {} period(s)",
            self.student.name,
            self.student.reg_number,
            self.student.class,
            self.current_status.label(),
            self.current_period,
            format_currency(self.total_outstanding),
            self.breakdown.len()
        )
    }
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

/// The one place fee status is computed.
///
/// Holds no mutable state of its own; isolation and durability are the
/// ledger's job.
#[derive(Clone)]
pub struct FeeReconciliationEngine {
    schedule: Arc<FeeSchedule>,
    calendar: PeriodCalendar,
    ledger: Arc<dyn PaymentLedger>,
}

impl FeeReconciliationEngine {
    pub fn new(
        schedule: Arc<FeeSchedule>,
        calendar: PeriodCalendar,
        ledger: Arc<dyn PaymentLedger>,
    ) -> Self {
        FeeReconciliationEngine {
            schedule,
            calendar,
            ledger,
        }
    }

    pub fn calendar(&self) -> &PeriodCalendar {
        &self.calendar
    }

    pub fn ledger(&self) -> &Arc<dyn PaymentLedger> {
        &self.ledger
    }

    /// Expected amount for a class in a period; a missing entry counts as zero
    pub fn expected_for(&self, class: &str, period: &Period) -> Decimal {
        self.schedule
            .expected_amount(class, &period.term)
            .unwrap_or(Decimal::ZERO)
    }

    /// Pure three-way decision, no hysteresis
    pub fn status_for(&self, class: &str, period: &Period, total_paid: Decimal) -> FeeStatus {
        let expected = self.expected_for(class, period);
        decide(expected, total_paid)
    }

    /// Status for the period in session at `now` (list/summary views)
    pub fn current_status<D: Datelike>(
        &self,
        student: &Student,
        now: &D,
    ) -> Result<FeeStatus, LedgerError> {
        let period = self.calendar.current_period(now);
        let paid = self.ledger.sum_paid(&student.reg_number, &period)?;

        Ok(self.status_for(&student.class, &period, paid))
    }

    /// Expected, paid and outstanding for one period
    pub fn entry_for(
        &self,
        student: &Student,
        period: Period,
    ) -> Result<FeeBreakdownEntry, LedgerError> {
        let expected = self.expected_for(&student.class, &period);
        let paid = self.ledger.sum_paid(&student.reg_number, &period)?;

        // Both sides are non-negative, so the difference cannot overflow
        Ok(FeeBreakdownEntry {
            outstanding_amount: expected - paid,
            status: decide(expected, paid),
            expected_amount: expected,
            paid_amount: paid,
            period,
        })
    }

    /// Outstanding amount for the period in session at `now`
    pub fn current_outstanding<D: Datelike>(
        &self,
        student: &Student,
        now: &D,
    ) -> Result<Decimal, LedgerError> {
        let entry = self.entry_for(student, self.calendar.current_period(now))?;
        Ok(entry.outstanding_amount)
    }

    /// Per-period breakdown, descending, one entry per distinct period of
    /// interest: enrollment period, every period with a payment, and the
    /// current period.
    pub fn full_breakdown<D: Datelike>(
        &self,
        student: &Student,
        now: &D,
    ) -> Result<Vec<FeeBreakdownEntry>, LedgerError> {
        let mut periods: BTreeSet<Period> = self
            .ledger
            .all_periods_with_payments(&student.reg_number)?;
        periods.insert(student.enrollment_period.clone());
        periods.insert(self.calendar.current_period(now));

        periods
            .into_iter()
            .rev()
            .map(|period| self.entry_for(student, period))
            .collect()
    }

    /// Current status + breakdown + totals in one read
    pub fn report<D: Datelike>(
        &self,
        student: &Student,
        now: &D,
    ) -> Result<StudentFeeReport, LedgerError> {
        let current_period = self.calendar.current_period(now);
        let breakdown = self.full_breakdown(student, now)?;

        // The current period is always part of the breakdown
        let current_status = breakdown
            .iter()
            .find(|entry| entry.period == current_period)
            .map(|entry| entry.status)
            .unwrap_or(FeeStatus::NotApplicable);

        let total_expected = checked_total(breakdown.iter().map(|e| e.expected_amount))?;
        let total_paid = checked_total(breakdown.iter().map(|e| e.paid_amount))?;

        Ok(StudentFeeReport {
            student: student.clone(),
            current_period,
            current_status,
            breakdown,
            total_expected,
            total_paid,
            total_outstanding: total_expected - total_paid,
        })
    }
}

fn decide(expected: Decimal, total_paid: Decimal) -> FeeStatus {
    if expected <= Decimal::ZERO {
        FeeStatus::NotApplicable
    } else if total_paid >= expected {
        FeeStatus::Paid
    } else {
        FeeStatus::Defaulter
    }
}

// ============================================================================
// FORMATTING
// ============================================================================

/// Two decimals with thousands separators: 60000 → "60,000.00"
pub fn format_currency(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    let formatted = format!("{:.2}", rounded.abs());
    let (whole, fraction) = formatted.split_once('.').unwrap_or((formatted.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if rounded < Decimal::ZERO { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, fraction)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::StudentRegistry;
    use crate::ledger::{InMemoryLedger, PaymentRecord};
    use crate::period::Term;
    use crate::schedule::FeeScheduleEntry;
    use chrono::NaiveDate;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn basic_one_schedule() -> Arc<FeeSchedule> {
        Arc::new(
            FeeSchedule::from_entries(vec![
                FeeScheduleEntry::new("Basic 1", Term::First, Decimal::from(60000)),
                FeeScheduleEntry::new("Basic 1", Term::Second, Decimal::from(55000)),
                FeeScheduleEntry::new("Basic 1", Term::Third, Decimal::ZERO),
            ])
            .unwrap(),
        )
    }

    fn student_s() -> Student {
        Student::new(
            "S",
            "Ada Obi",
            "Basic 1",
            Period::new("2024/2025", Term::First),
            day(2024, 9, 9),
        )
    }

    fn setup() -> (FeeReconciliationEngine, Arc<InMemoryLedger>) {
        let registry = StudentRegistry::new();
        registry.register(student_s());
        let ledger = Arc::new(InMemoryLedger::new(Arc::new(registry)));
        let engine = FeeReconciliationEngine::new(
            basic_one_schedule(),
            PeriodCalendar::new(),
            ledger.clone(),
        );
        (engine, ledger)
    }

    fn pay(ledger: &InMemoryLedger, period: &Period, amount: i64) {
        ledger
            .append(PaymentRecord::new(
                "S",
                period.clone(),
                Decimal::from(amount),
                day(2024, 10, 1),
                "bursar",
            ))
            .unwrap();
    }

    #[test]
    fn test_absent_schedule_entry_is_not_applicable() {
        let (engine, _) = setup();
        let period = Period::new("2024/2025", Term::First);

        for paid in [0, 1, 60000, 1_000_000] {
            assert_eq!(
                engine.status_for("Basic 9", &period, Decimal::from(paid)),
                FeeStatus::NotApplicable
            );
        }
    }

    #[test]
    fn test_explicit_zero_is_not_applicable() {
        let (engine, _) = setup();
        let third = Period::new("2024/2025", Term::Third);

        assert_eq!(
            engine.status_for("Basic 1", &third, Decimal::ZERO),
            FeeStatus::NotApplicable
        );
    }

    #[test]
    fn test_status_monotonic_in_paid_amount() {
        let (engine, _) = setup();
        let period = Period::new("2024/2025", Term::First);

        let mut seen_paid = false;
        for paid in (0..=80000).step_by(5000) {
            let status = engine.status_for("Basic 1", &period, Decimal::from(paid));
            assert_eq!(status == FeeStatus::Paid, paid >= 60000);
            if seen_paid {
                assert_eq!(status, FeeStatus::Paid, "flipped back at {}", paid);
            }
            seen_paid |= status == FeeStatus::Paid;
        }
    }

    #[test]
    fn test_first_term_scenario() {
        let (engine, ledger) = setup();
        let student = student_s();
        let period = Period::new("2024/2025", Term::First);
        let now = day(2024, 10, 15);

        let outstanding = |engine: &FeeReconciliationEngine| {
            engine
                .full_breakdown(&student, &now)
                .unwrap()
                .into_iter()
                .find(|e| e.period == period)
                .unwrap()
                .outstanding_amount
        };

        assert_eq!(engine.current_status(&student, &now).unwrap(), FeeStatus::Defaulter);
        assert_eq!(outstanding(&engine), Decimal::from(60000));

        pay(&ledger, &period, 60000);
        assert_eq!(engine.current_status(&student, &now).unwrap(), FeeStatus::Paid);
        assert_eq!(outstanding(&engine), Decimal::ZERO);

        pay(&ledger, &period, 5000);
        assert_eq!(engine.current_status(&student, &now).unwrap(), FeeStatus::Paid);
        assert_eq!(outstanding(&engine), Decimal::from(-5000));
    }

    #[test]
    fn test_breakdown_descending_without_duplicates() {
        let (engine, ledger) = setup();
        let student = student_s();

        // Enrollment, a payment period and the current period all coincide
        let now = day(2024, 11, 1);
        pay(&ledger, &Period::new("2024/2025", Term::First), 100);

        let breakdown = engine.full_breakdown(&student, &now).unwrap();
        assert_eq!(breakdown.len(), 1);

        // Now spread them out, including a legacy malformed period
        pay(&ledger, &Period::new("2025/2026", Term::Second), 100);
        pay(&ledger, &Period::parse("2023-24", "Third Term"), 100);
        pay(&ledger, &Period::parse("2024/2025", "Mid Term"), 100);
        let later = day(2026, 6, 1);

        let breakdown = engine.full_breakdown(&student, &later).unwrap();
        let periods: Vec<Period> = breakdown.iter().map(|e| e.period.clone()).collect();

        assert_eq!(periods.len(), 5);
        for pair in periods.windows(2) {
            assert!(pair[0] > pair[1], "{} should sort after {}", pair[0], pair[1]);
        }
        assert_eq!(periods[0], Period::new("2025/2026", Term::Third));
        assert_eq!(periods[1], Period::new("2025/2026", Term::Second));
        assert_eq!(periods[2], Period::new("2024/2025", Term::First));
        assert_eq!(periods[3].term, Term::Other("Mid Term".to_string()));
        assert_eq!(periods[4].academic_year, "2023-24");
    }

    #[test]
    fn test_breakdown_amounts() {
        let (engine, ledger) = setup();
        let student = student_s();
        let second = Period::new("2024/2025", Term::Second);

        pay(&ledger, &second, 20000);
        pay(&ledger, &second, 10000);

        let breakdown = engine.full_breakdown(&student, &day(2025, 3, 1)).unwrap();
        let entry = breakdown.iter().find(|e| e.period == second).unwrap();

        assert_eq!(entry.expected_amount, Decimal::from(55000));
        assert_eq!(entry.paid_amount, Decimal::from(30000));
        assert_eq!(entry.outstanding_amount, Decimal::from(25000));
        assert_eq!(entry.status, FeeStatus::Defaulter);
    }

    #[test]
    fn test_schedule_change_reflected_immediately() {
        let (engine, ledger) = setup();
        let student = student_s();
        let now = day(2024, 10, 1);
        pay(&ledger, &Period::new("2024/2025", Term::First), 60000);

        assert_eq!(engine.current_status(&student, &now).unwrap(), FeeStatus::Paid);

        let raised = Arc::new(
            FeeSchedule::from_entries(vec![FeeScheduleEntry::new(
                "Basic 1",
                Term::First,
                Decimal::from(65000),
            )])
            .unwrap(),
        );
        let engine = FeeReconciliationEngine::new(raised, *engine.calendar(), ledger.clone());

        assert_eq!(engine.current_status(&student, &now).unwrap(), FeeStatus::Defaulter);
    }

    #[test]
    fn test_report_totals() {
        let (engine, ledger) = setup();
        let student = student_s();
        pay(&ledger, &Period::new("2024/2025", Term::First), 60000);

        // Second term: current, unpaid
        let report = engine.report(&student, &day(2025, 2, 1)).unwrap();

        assert_eq!(report.current_period, Period::new("2024/2025", Term::Second));
        assert_eq!(report.current_status, FeeStatus::Defaulter);
        assert_eq!(report.total_expected, Decimal::from(115000));
        assert_eq!(report.total_paid, Decimal::from(60000));
        assert_eq!(report.total_outstanding, Decimal::from(55000));
        assert!(report.summary().contains("Defaulter"));
    }

    #[test]
    fn test_off_label_term_keeps_its_own_entry() {
        let (engine, ledger) = setup();
        let now = day(2024, 10, 15);
        pay(&ledger, &Period::parse("2024/2025", "1"), 60000);

        let breakdown = engine.full_breakdown(&student_s(), &now).unwrap();
        assert_eq!(breakdown.len(), 2);

        assert_eq!(breakdown[0].period, Period::new("2024/2025", Term::First));
        assert_eq!(breakdown[0].paid_amount, Decimal::ZERO);
        assert_eq!(breakdown[0].status, FeeStatus::Defaulter);

        assert_eq!(breakdown[1].period.term, Term::Other("1".to_string()));
        assert_eq!(breakdown[1].paid_amount, Decimal::from(60000));
        assert_eq!(breakdown[1].status, FeeStatus::NotApplicable);

        assert_eq!(
            engine.current_status(&student_s(), &now).unwrap(),
            FeeStatus::Defaulter
        );
    }

    #[test]
    fn test_huge_payments_report_error_instead_of_panicking() {
        let (engine, ledger) = setup();
        let now = day(2024, 10, 15);
        for period in [
            Period::new("2024/2025", Term::First),
            Period::new("2024/2025", Term::Second),
        ] {
            ledger
                .append(PaymentRecord::new("S", period, Decimal::MAX, now, "bursar"))
                .unwrap();
        }

        // Each period on its own is fine
        let breakdown = engine.full_breakdown(&student_s(), &now).unwrap();
        assert!(breakdown.iter().all(|e| e.status != FeeStatus::Defaulter));
        assert_eq!(
            engine.current_outstanding(&student_s(), &now).unwrap(),
            Decimal::from(60000) - Decimal::MAX
        );

        // Summing them across periods does not fit
        assert!(matches!(
            engine.report(&student_s(), &now),
            Err(LedgerError::Corrupt(_))
        ));
    }

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(Decimal::from(60000)), "60,000.00");
        assert_eq!(format_currency(Decimal::from(-5000)), "-5,000.00");
        assert_eq!(format_currency(Decimal::ZERO), "0.00");
        assert_eq!(format_currency(Decimal::new(123456789, 2)), "1,234,567.89");
        assert_eq!(format_currency(Decimal::new(999, 0)), "999.00");
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(FeeStatus::Paid.label(), "Paid");
        assert_eq!(FeeStatus::Defaulter.label(), "Defaulter");
        assert_eq!(FeeStatus::NotApplicable.label(), "N/A");
    }
}
