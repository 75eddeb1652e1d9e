use crate::entities::{Role, StaffDirectory, StaffUser, Student, StudentDirectory};
use crate::ledger::{checked_total, LedgerError, PaymentLedger, PaymentRecord};
use crate::period::Period;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

/// Event for audit trail ("every change is an event")
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// Outcome of a bulk CSV import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub inserted: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Students (owned by the registry; the engine only reads them)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            reg_number TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL,
            student_class TEXT NOT NULL,
            academic_year TEXT NOT NULL,
            term TEXT NOT NULL,
            admission_date TEXT NOT NULL,
            dob TEXT,
            gender TEXT,
            address TEXT,
            phone TEXT,
            email TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Payments (append-only ledger: no UPDATE / DELETE anywhere)
    // amount_paid is TEXT to keep exact decimals
    // import_key is set only for rows loaded from CSV (idempotent re-import)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS payments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            payment_uuid TEXT UNIQUE NOT NULL,
            student_reg_number TEXT NOT NULL REFERENCES students(reg_number),
            academic_year TEXT NOT NULL,
            term TEXT NOT NULL,
            amount_paid TEXT NOT NULL,
            payment_date TEXT NOT NULL,
            recorded_by TEXT NOT NULL,
            import_key TEXT UNIQUE,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Staff users (identity + role only; credentials live elsewhere)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT UNIQUE NOT NULL,
            role TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payments_student_period
         ON payments(student_reg_number, academic_year, term)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_admission ON students(admission_date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// Students
// ============================================================================

const STUDENT_COLUMNS: &str = "reg_number, name, student_class, academic_year, term,
    admission_date, dob, gender, address, phone, email";

fn student_from_row(row: &Row) -> rusqlite::Result<Student> {
    let academic_year: String = row.get(3)?;
    let term: String = row.get(4)?;

    Ok(Student {
        reg_number: row.get(0)?,
        name: row.get(1)?,
        class: row.get(2)?,
        enrollment_period: Period::parse(&academic_year, &term),
        admission_date: row.get(5)?,
        dob: row.get(6)?,
        gender: row.get(7)?,
        address: row.get(8)?,
        phone: row.get(9)?,
        email: row.get(10)?,
    })
}

/// Insert a student. Returns false if the reg number already exists.
pub fn insert_student(conn: &Connection, student: &Student) -> Result<bool, LedgerError> {
    let result = conn.execute(
        &format!(
            "INSERT INTO students ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            STUDENT_COLUMNS
        ),
        params![
            student.reg_number,
            student.name,
            student.class,
            student.enrollment_period.academic_year,
            student.enrollment_period.term.label(),
            student.admission_date,
            student.dob,
            student.gender,
            student.address,
            student.phone,
            student.email,
        ],
    );

    match result {
        Ok(_) => Ok(true),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

pub fn get_student(conn: &Connection, reg_number: &str) -> Result<Option<Student>, LedgerError> {
    let student = conn
        .query_row(
            &format!("SELECT {} FROM students WHERE reg_number = ?1", STUDENT_COLUMNS),
            [reg_number],
            student_from_row,
        )
        .optional()?;

    Ok(student)
}

/// Students by admission date, newest first
pub fn get_students(conn: &Connection, limit: Option<usize>) -> Result<Vec<Student>, LedgerError> {
    // SQLite treats a negative LIMIT as "no limit"
    let limit = limit.map(|l| l as i64).unwrap_or(-1);

    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM students
         ORDER BY admission_date DESC, reg_number ASC
         LIMIT ?1",
        STUDENT_COLUMNS
    ))?;

    let students = stmt
        .query_map([limit], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(students)
}

// ============================================================================
// Payments
// ============================================================================

fn parse_amount(raw: &str) -> Result<Decimal, LedgerError> {
    Decimal::from_str(raw.trim())
        .map_err(|e| LedgerError::Corrupt(format!("amount '{}': {}", raw, e)))
}

/// Append one payment and its audit event in a single transaction.
///
/// Returns `Ok(false)` only when `import_key` is already present (the row
/// was imported before). Nothing is written when validation fails.
pub fn append_payment(
    conn: &Connection,
    record: &PaymentRecord,
    import_key: Option<&str>,
) -> Result<bool, LedgerError> {
    record.validate_amount()?;

    let tx = conn.unchecked_transaction()?;

    let known: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM students WHERE reg_number = ?1)",
        [&record.student_reg_number],
        |row| row.get(0),
    )?;
    if !known {
        return Err(LedgerError::UnknownStudent(record.student_reg_number.clone()));
    }

    let running = sum_paid(&tx, &record.student_reg_number, &record.period)?;
    record.validate_running_total(running)?;

    let result = tx.execute(
        "INSERT INTO payments (
            payment_uuid, student_reg_number, academic_year, term,
            amount_paid, payment_date, recorded_by, import_key
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            record.id,
            record.student_reg_number,
            record.period.academic_year,
            record.period.term.label(),
            record.amount_paid.to_string(),
            record.payment_date,
            record.recorded_by,
            import_key,
        ],
    );

    match result {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(err, _))
            if import_key.is_some() && err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            return Ok(false);
        }
        Err(e) => return Err(e.into()),
    }

    let event = Event::new(
        "payment_recorded",
        "student",
        &record.student_reg_number,
        serde_json::json!({
            "payment_id": record.id,
            "academic_year": record.period.academic_year,
            "term": record.period.term.label(),
            "amount_paid": record.amount_paid.to_string(),
            "payment_date": record.payment_date.to_string(),
            "imported": import_key.is_some(),
        }),
        &record.recorded_by,
    );
    insert_event(&tx, &event)?;

    tx.commit()?;
    Ok(true)
}

pub fn sum_paid(conn: &Connection, reg_number: &str, period: &Period) -> Result<Decimal, LedgerError> {
    let mut stmt = conn.prepare(
        "SELECT amount_paid FROM payments
         WHERE student_reg_number = ?1 AND academic_year = ?2 AND term = ?3",
    )?;

    let amounts = stmt
        .query_map(
            params![reg_number, period.academic_year, period.term.label()],
            |row| row.get::<_, String>(0),
        )?
        .collect::<Result<Vec<_>, _>>()?;

    let parsed = amounts
        .iter()
        .map(|raw| parse_amount(raw))
        .collect::<Result<Vec<_>, _>>()?;

    checked_total(parsed)
}

pub fn get_payment_periods(conn: &Connection, reg_number: &str) -> Result<BTreeSet<Period>, LedgerError> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT academic_year, term FROM payments WHERE student_reg_number = ?1",
    )?;

    let periods = stmt
        .query_map([reg_number], |row| {
            let academic_year: String = row.get(0)?;
            let term: String = row.get(1)?;
            Ok(Period::parse(&academic_year, &term))
        })?
        .collect::<Result<BTreeSet<_>, _>>()?;

    Ok(periods)
}

pub fn get_payments_for_student(
    conn: &Connection,
    reg_number: &str,
) -> Result<Vec<PaymentRecord>, LedgerError> {
    let mut stmt = conn.prepare(
        "SELECT payment_uuid, student_reg_number, academic_year, term,
                amount_paid, payment_date, recorded_by
         FROM payments
         WHERE student_reg_number = ?1
         ORDER BY payment_date DESC, id DESC",
    )?;

    let rows = stmt
        .query_map([reg_number], |row| {
            let academic_year: String = row.get(2)?;
            let term: String = row.get(3)?;
            let amount: String = row.get(4)?;
            let payment_date: NaiveDate = row.get(5)?;

            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                Period::parse(&academic_year, &term),
                amount,
                payment_date,
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, student_reg_number, period, amount, payment_date, recorded_by)| {
            Ok(PaymentRecord {
                id,
                student_reg_number,
                period,
                amount_paid: parse_amount(&amount)?,
                payment_date,
                recorded_by,
            })
        })
        .collect()
}

pub fn count_payments(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM payments", [], |row| row.get(0))?;

    Ok(count)
}

// ============================================================================
// Users
// ============================================================================

/// Insert a staff user. Returns false if the username exists.
pub fn insert_user(conn: &Connection, user: &StaffUser) -> Result<bool, LedgerError> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO users (username, role) VALUES (?1, ?2)",
        params![user.username, user.role.as_str()],
    )?;

    Ok(inserted == 1)
}

pub fn get_user(conn: &Connection, username: &str) -> Result<Option<StaffUser>, LedgerError> {
    let user = conn
        .query_row(
            "SELECT username, role FROM users WHERE username = ?1",
            [username],
            |row| {
                let role: String = row.get(1)?;
                Ok(StaffUser {
                    username: row.get(0)?,
                    role: Role::parse(&role),
                })
            },
        )
        .optional()?;

    Ok(user)
}

// ============================================================================
// Audit trail
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<(), LedgerError> {
    let data_json = serde_json::to_string(&event.data)
        .map_err(|e| LedgerError::Corrupt(format!("event data: {}", e)))?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>, LedgerError> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

// ============================================================================
// Legacy CSV import
// ============================================================================

#[derive(Debug, Deserialize)]
struct StudentCsvRow {
    reg_number: String,
    name: String,
    student_class: String,
    academic_year: String,
    term: String,
    admission_date: String,
    #[serde(default)]
    dob: Option<String>,
    #[serde(default)]
    gender: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentCsvRow {
    student_reg_number: String,
    academic_year: String,
    term: String,
    amount_paid: String,
    payment_date: String,
    #[serde(default)]
    recorded_by: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Load students from CSV. Duplicate reg numbers are skipped; rows with an
/// unreadable admission date are rejected.
pub fn import_students_csv(conn: &Connection, csv_path: &Path) -> Result<ImportSummary> {
    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open students CSV")?;
    let mut summary = ImportSummary::default();

    for result in rdr.deserialize() {
        let row: StudentCsvRow = result.context("Failed to deserialize student row")?;

        let Some(admission_date) = parse_date(&row.admission_date) else {
            warn!(reg = %row.reg_number, date = %row.admission_date, "student rejected: bad admission date");
            summary.rejected += 1;
            continue;
        };

        let student = Student {
            reg_number: row.reg_number.trim().to_string(),
            name: row.name,
            class: row.student_class.trim().to_string(),
            enrollment_period: Period::parse(&row.academic_year, &row.term),
            admission_date,
            dob: non_empty(row.dob),
            gender: non_empty(row.gender),
            address: non_empty(row.address),
            phone: non_empty(row.phone),
            email: non_empty(row.email),
        };

        if insert_student(conn, &student)? {
            summary.inserted += 1;
        } else {
            summary.duplicates += 1;
        }
    }

    info!(
        inserted = summary.inserted,
        duplicates = summary.duplicates,
        rejected = summary.rejected,
        "students imported"
    );
    Ok(summary)
}

/// Idempotency key for an imported payment row.
/// Same file name + line + content always hashes the same.
pub fn compute_import_key(source_file: &str, line: u64, record: &PaymentRecord) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!(
        "{}|{}|{}|{}|{}|{}|{}",
        source_file,
        line,
        record.student_reg_number,
        record.period.academic_year,
        record.period.term.label(),
        record.amount_paid,
        record.payment_date
    ));
    format!("{:x}", hasher.finalize())
}

/// Load historical payments from CSV through the same checks as `append`.
///
/// Rows with a non-positive amount, an unknown student, or unreadable
/// amount/date are counted as rejected. Re-importing the same file is a no-op.
pub fn import_payments_csv(
    conn: &Connection,
    csv_path: &Path,
    default_actor: &str,
) -> Result<ImportSummary> {
    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open payments CSV")?;
    let source_file = csv_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut summary = ImportSummary::default();

    let mut rows = rdr.deserialize::<PaymentCsvRow>();
    while let Some(result) = rows.next() {
        let row = result.context("Failed to deserialize payment row")?;
        let line = rows.reader().position().line();

        let amount = Decimal::from_str(row.amount_paid.trim()).ok();
        let date = parse_date(&row.payment_date);
        let (Some(amount), Some(payment_date)) = (amount, date) else {
            warn!(line, reg = %row.student_reg_number, "payment rejected: unreadable amount or date");
            summary.rejected += 1;
            continue;
        };

        let recorded_by = non_empty(row.recorded_by).unwrap_or_else(|| default_actor.to_string());
        let record = PaymentRecord::new(
            row.student_reg_number.trim(),
            Period::parse(&row.academic_year, &row.term),
            amount,
            payment_date,
            recorded_by,
        );
        let key = compute_import_key(&source_file, line, &record);

        match append_payment(conn, &record, Some(&key)) {
            Ok(true) => summary.inserted += 1,
            Ok(false) => summary.duplicates += 1,
            Err(e @ (LedgerError::InvalidAmount(_) | LedgerError::UnknownStudent(_))) => {
                warn!(line, error = %e, "payment rejected");
                summary.rejected += 1;
            }
            Err(e) => return Err(e).context("Failed to import payment"),
        }
    }

    info!(
        file = %source_file,
        inserted = summary.inserted,
        duplicates = summary.duplicates,
        rejected = summary.rejected,
        "payments imported"
    );
    Ok(summary)
}

// ============================================================================
// SQLite-backed store
// ============================================================================

/// Production store: one connection behind a mutex.
///
/// Each `append` is one SQLite transaction, so a concurrent `sum_paid`
/// sees either the whole payment or none of it.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database {:?}", db_path))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register_student(&self, student: &Student) -> Result<bool, LedgerError> {
        insert_student(&self.conn(), student)
    }

    pub fn add_user(&self, user: &StaffUser) -> Result<bool, LedgerError> {
        insert_user(&self.conn(), user)
    }

    /// Create the first admin account once; later calls change nothing
    pub fn bootstrap_admin(&self, username: &str) -> Result<bool, LedgerError> {
        let created = self.add_user(&StaffUser::new(username, Role::Admin))?;
        if created {
            info!(username, "admin user created");
        }
        Ok(created)
    }

    pub fn events_for_student(&self, reg_number: &str) -> Result<Vec<Event>, LedgerError> {
        get_events_for_entity(&self.conn(), "student", reg_number)
    }

    pub fn import_students(&self, csv_path: &Path) -> Result<ImportSummary> {
        import_students_csv(&self.conn(), csv_path)
    }

    pub fn import_payments(&self, csv_path: &Path, default_actor: &str) -> Result<ImportSummary> {
        import_payments_csv(&self.conn(), csv_path, default_actor)
    }

    pub fn payment_count(&self) -> Result<i64> {
        count_payments(&self.conn())
    }
}

impl StudentDirectory for SqliteStore {
    fn lookup_student(&self, reg_number: &str) -> Result<Option<Student>, LedgerError> {
        get_student(&self.conn(), reg_number)
    }

    fn list_students(&self, limit: Option<usize>) -> Result<Vec<Student>, LedgerError> {
        get_students(&self.conn(), limit)
    }
}

impl StaffDirectory for SqliteStore {
    fn find_user(&self, username: &str) -> Result<Option<StaffUser>, LedgerError> {
        get_user(&self.conn(), username)
    }
}

impl PaymentLedger for SqliteStore {
    fn append(&self, record: PaymentRecord) -> Result<(), LedgerError> {
        match append_payment(&self.conn(), &record, None) {
            Ok(_) => {
                info!(
                    reg = %record.student_reg_number,
                    period = %record.period,
                    amount = %record.amount_paid,
                    recorded_by = %record.recorded_by,
                    "payment appended"
                );
                Ok(())
            }
            Err(e) => {
                warn!(reg = %record.student_reg_number, error = %e, "payment rejected");
                Err(e)
            }
        }
    }

    fn sum_paid(&self, student_reg_number: &str, period: &Period) -> Result<Decimal, LedgerError> {
        sum_paid(&self.conn(), student_reg_number, period)
    }

    fn all_periods_with_payments(
        &self,
        student_reg_number: &str,
    ) -> Result<BTreeSet<Period>, LedgerError> {
        get_payment_periods(&self.conn(), student_reg_number)
    }

    fn payments_for(&self, student_reg_number: &str) -> Result<Vec<PaymentRecord>, LedgerError> {
        get_payments_for_student(&self.conn(), student_reg_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::Term;
    use std::io::Write;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn create_test_student(reg: &str) -> Student {
        let mut student = Student::new(
            reg,
            "Chidi Okeke",
            "Basic 1",
            Period::new("2024/2025", Term::First),
            day(2024, 9, 9),
        );
        student.phone = Some("08030000000".to_string());
        student
    }

    fn store_with_student(reg: &str) -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store.register_student(&create_test_student(reg)).unwrap();
        store
    }

    fn payment(reg: &str, period: &Period, amount: Decimal) -> PaymentRecord {
        PaymentRecord::new(reg, period.clone(), amount, day(2024, 10, 1), "bursar")
    }

    #[test]
    fn test_student_round_trip() {
        let store = store_with_student("REG/001");

        let found = store.lookup_student("REG/001").unwrap().unwrap();
        assert_eq!(found, create_test_student("REG/001"));
        assert!(store.lookup_student("REG/404").unwrap().is_none());

        // Duplicate reg number is refused, not an error
        assert!(!store.register_student(&create_test_student("REG/001")).unwrap());
    }

    #[test]
    fn test_sum_paid_exact_decimals() {
        let store = store_with_student("S1");
        let period = Period::new("2024/2025", Term::First);

        store.append(payment("S1", &period, Decimal::new(1010, 2))).unwrap();
        store.append(payment("S1", &period, Decimal::new(2020, 2))).unwrap();

        assert_eq!(store.sum_paid("S1", &period).unwrap(), Decimal::new(3030, 2));
        assert_eq!(
            store.sum_paid("S1", &Period::new("2024/2025", Term::Second)).unwrap(),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_rejected_append_writes_nothing() {
        let store = store_with_student("S1");
        let period = Period::new("2024/2025", Term::First);

        let zero = store.append(payment("S1", &period, Decimal::ZERO));
        assert!(matches!(zero, Err(LedgerError::InvalidAmount(_))));

        let ghost = store.append(payment("GHOST", &period, Decimal::from(100)));
        assert!(matches!(ghost, Err(LedgerError::UnknownStudent(_))));

        assert_eq!(store.payment_count().unwrap(), 0);
        assert!(store.events_for_student("S1").unwrap().is_empty());
        assert!(store.events_for_student("GHOST").unwrap().is_empty());
    }

    #[test]
    fn test_append_rejects_period_total_overflow() {
        let store = store_with_student("S1");
        let period = Period::new("2024/2025", Term::First);

        store.append(payment("S1", &period, Decimal::MAX)).unwrap();
        let second = store.append(payment("S1", &period, Decimal::MAX));

        assert!(matches!(second, Err(LedgerError::InvalidAmount(_))));
        assert_eq!(store.payment_count().unwrap(), 1);
        assert_eq!(store.events_for_student("S1").unwrap().len(), 1);
        assert_eq!(store.sum_paid("S1", &period).unwrap(), Decimal::MAX);
    }

    #[test]
    fn test_overflowing_stored_rows_read_as_corrupt() {
        let store = store_with_student("S1");
        let period = Period::new("2024/2025", Term::First);

        // Rows written outside `append` (e.g. by an older build)
        for uuid in ["legacy-1", "legacy-2"] {
            store
                .conn()
                .execute(
                    "INSERT INTO payments (
                        payment_uuid, student_reg_number, academic_year, term,
                        amount_paid, payment_date, recorded_by
                    ) VALUES (?1, 'S1', '2024/2025', 'First Term', ?2, '2024-10-01', 'bursar')",
                    params![uuid, Decimal::MAX.to_string()],
                )
                .unwrap();
        }

        assert!(matches!(
            store.sum_paid("S1", &period),
            Err(LedgerError::Corrupt(_))
        ));
    }

    #[test]
    fn test_off_label_term_is_stored_verbatim() {
        let store = store_with_student("S1");
        let off_label = Period::parse("2024/2025", "1");

        store.append(payment("S1", &off_label, Decimal::from(500))).unwrap();

        let first = Period::new("2024/2025", Term::First);
        assert_eq!(store.sum_paid("S1", &first).unwrap(), Decimal::ZERO);
        assert_eq!(store.sum_paid("S1", &off_label).unwrap(), Decimal::from(500));

        let history = store.payments_for("S1").unwrap();
        assert_eq!(history[0].period.term.label(), "1");
    }

    #[test]
    fn test_append_writes_audit_event() {
        let store = store_with_student("S1");
        let period = Period::new("2024/2025", Term::First);

        store.append(payment("S1", &period, Decimal::from(60000))).unwrap();

        let events = store.events_for_student("S1").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "payment_recorded");
        assert_eq!(events[0].actor, "bursar");
        assert_eq!(events[0].data["amount_paid"], "60000");
    }

    #[test]
    fn test_periods_and_history() {
        let store = store_with_student("S1");
        let first = Period::new("2024/2025", Term::First);
        let legacy = Period::parse("2021/2022", "Holiday Term");

        let mut older = payment("S1", &legacy, Decimal::from(500));
        older.payment_date = day(2022, 7, 1);
        store.append(older).unwrap();
        store.append(payment("S1", &first, Decimal::from(100))).unwrap();
        store.append(payment("S1", &first, Decimal::from(200))).unwrap();

        let periods = store.all_periods_with_payments("S1").unwrap();
        assert_eq!(periods.len(), 2);
        assert!(periods.contains(&legacy));

        let history = store.payments_for("S1").unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].amount_paid, Decimal::from(200));
        assert_eq!(history[2].period, legacy);
    }

    #[test]
    fn test_bootstrap_admin_once() {
        let store = SqliteStore::open_in_memory().unwrap();

        assert!(store.bootstrap_admin("admin").unwrap());
        assert!(!store.bootstrap_admin("admin").unwrap());
        assert_eq!(
            store.find_user("admin").unwrap(),
            Some(StaffUser::new("admin", Role::Admin))
        );
    }

    #[test]
    fn test_list_students_newest_first() {
        let store = SqliteStore::open_in_memory().unwrap();
        for (reg, month) in [("A", 1), ("B", 3), ("C", 2)] {
            let mut student = create_test_student(reg);
            student.admission_date = day(2025, month, 1);
            store.register_student(&student).unwrap();
        }

        let regs: Vec<String> = store
            .list_students(Some(2))
            .unwrap()
            .into_iter()
            .map(|s| s.reg_number)
            .collect();
        assert_eq!(regs, vec!["B", "C"]);
        assert_eq!(store.list_students(None).unwrap().len(), 3);
    }

    #[test]
    fn test_payment_import_is_idempotent() {
        let store = store_with_student("S1");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy_payments.csv");

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "student_reg_number,academic_year,term,amount_paid,payment_date,recorded_by").unwrap();
        writeln!(file, "S1,2023/2024,First Term,30000,2023-10-02,clerk").unwrap();
        writeln!(file, "S1,2023/2024,First Term,30000,2023-11-02,").unwrap();
        writeln!(file, "S1,2023/2024,Second Term,0,2024-02-01,clerk").unwrap();
        writeln!(file, "GHOST,2023/2024,First Term,100,2023-10-02,clerk").unwrap();
        writeln!(file, "S1,2023/2024,Third Term,abc,2024-06-01,clerk").unwrap();
        drop(file);

        let first = store.import_payments(&path, "importer").unwrap();
        assert_eq!(
            first,
            ImportSummary { inserted: 2, duplicates: 0, rejected: 3 }
        );

        let second = store.import_payments(&path, "importer").unwrap();
        assert_eq!(
            second,
            ImportSummary { inserted: 0, duplicates: 2, rejected: 3 }
        );

        let period = Period::new("2023/2024", Term::First);
        assert_eq!(store.sum_paid("S1", &period).unwrap(), Decimal::from(60000));

        let history = store.payments_for("S1").unwrap();
        assert_eq!(history[0].recorded_by, "importer");
        assert_eq!(history[1].recorded_by, "clerk");
    }

    #[test]
    fn test_student_import_skips_duplicates() {
        let store = SqliteStore::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("students.csv");

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "reg_number,name,student_class,academic_year,term,admission_date,dob,gender,address,phone,email").unwrap();
        writeln!(file, "S1,Ada,Nur. 1,2024/2025,First Term,2024-09-09,,F,,,").unwrap();
        writeln!(file, "S1,Ada Again,Nur. 1,2024/2025,First Term,2024-09-09,,F,,,").unwrap();
        writeln!(file, "S2,Bayo,Basic 1,2024/2025,Second Term,09/01/2025,,M,,,").unwrap();
        drop(file);

        let summary = store.import_students(&path).unwrap();
        assert_eq!(
            summary,
            ImportSummary { inserted: 1, duplicates: 1, rejected: 1 }
        );

        let ada = store.lookup_student("S1").unwrap().unwrap();
        assert_eq!(ada.gender.as_deref(), Some("F"));
        assert_eq!(ada.dob, None);
    }

    #[test]
    fn test_import_key_is_stable() {
        let record = payment("S1", &Period::new("2024/2025", Term::First), Decimal::from(10));
        let mut same_content = record.clone();
        same_content.id = "different-uuid".to_string();

        let key1 = compute_import_key("a.csv", 2, &record);
        let key2 = compute_import_key("a.csv", 2, &same_content);
        let other_line = compute_import_key("a.csv", 3, &record);

        assert_eq!(key1, key2);
        assert_ne!(key1, other_line);
        assert_eq!(key1.len(), 64);
    }
}
