// Fee Registry - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod config;
pub mod db;
pub mod entities;
pub mod gateway;
pub mod ledger;
pub mod period;
pub mod reconciliation;
pub mod schedule;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{
    Event, ImportSummary, SqliteStore,
    setup_database, insert_event, get_events_for_entity,
    import_students_csv, import_payments_csv, compute_import_key,
};
pub use entities::{
    Role, StaffDirectory, StaffRegistry, StaffUser,
    Student, StudentDirectory, StudentRegistry,
};
pub use gateway::{GatewayError, NewPayment, RegistryGateway, StudentStatusRow};
pub use ledger::{InMemoryLedger, LedgerError, PaymentLedger, PaymentRecord};
pub use period::{Period, PeriodCalendar, Term};
pub use reconciliation::{
    FeeBreakdownEntry, FeeReconciliationEngine, FeeStatus, StudentFeeReport,
    format_currency,
};
pub use schedule::{FeeSchedule, FeeScheduleEntry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the `tracing` subscriber used by both binaries.
/// `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // A second call (e.g. from tests) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
