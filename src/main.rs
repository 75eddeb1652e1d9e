// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use rust_decimal::Decimal;
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use fee_registry::{
    format_currency, init_tracing, AppConfig, FeeSchedule, NewPayment, RegistryGateway,
    SqliteStore,
};

const USAGE: &str = "\
Usage: fee-registry [COMMAND]

Commands:
  import-students <csv>                               Load students from CSV
  import-payments <csv> <actor>                       Load historical payments from CSV
  bootstrap-admin [username]                          Create the first admin (default: admin)
  record <actor> <reg> <academic_year> <term> <amount>
                                                      Record a payment
  status <reg>                                        Fee breakdown for one student
  defaulters                                          Students owing this term

With no command the terminal UI starts.";

fn main() -> Result<()> {
    init_tracing();
    let config = AppConfig::from_env();
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        None => run_ui_mode(&config),
        Some("import-students") => {
            let csv_path = required(&args, 2, "csv path")?;
            run_import_students(&config, Path::new(csv_path))
        }
        Some("import-payments") => {
            let csv_path = required(&args, 2, "csv path")?;
            let actor = required(&args, 3, "actor")?;
            run_import_payments(&config, Path::new(csv_path), actor)
        }
        Some("bootstrap-admin") => {
            let username = args.get(2).map(String::as_str).unwrap_or("admin");
            run_bootstrap_admin(&config, username)
        }
        Some("record") => {
            if args.len() < 7 {
                bail!("record needs <actor> <reg> <academic_year> <term> <amount>\n\n{}", USAGE);
            }
            run_record(&config, &args[2], &args[3], &args[4], &args[5], &args[6])
        }
        Some("status") => {
            let reg = required(&args, 2, "registration number")?;
            run_status(&config, reg)
        }
        Some("defaulters") => run_defaulters(&config),
        Some("help") | Some("--help") | Some("-h") => {
            println!("{}", USAGE);
            Ok(())
        }
        Some(other) => bail!("unknown command '{}'\n\n{}", other, USAGE),
    }
}

fn required<'a>(args: &'a [String], index: usize, what: &str) -> Result<&'a str> {
    match args.get(index) {
        Some(value) => Ok(value.as_str()),
        None => bail!("missing {}\n\n{}", what, USAGE),
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn open_store(config: &AppConfig) -> Result<Arc<SqliteStore>> {
    let store = SqliteStore::open(&config.database_path)?;
    Ok(Arc::new(store))
}

fn open_gateway(config: &AppConfig) -> Result<RegistryGateway> {
    let schedule = FeeSchedule::from_file(&config.schedule_path)
        .with_context(|| format!("Failed to load fee schedule {:?}", config.schedule_path))?;
    let store = open_store(config)?;

    Ok(RegistryGateway::with_store(store, Arc::new(schedule)))
}

fn run_import_students(config: &AppConfig, csv_path: &Path) -> Result<()> {
    println!("🗄️  Student Import - CSV → SQLite");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let store = open_store(config)?;
    let summary = store.import_students(csv_path)?;

    println!("✓ Inserted:   {}", summary.inserted);
    println!("✓ Duplicates: {} (skipped)", summary.duplicates);
    if summary.rejected > 0 {
        println!("⚠️  Rejected:   {}", summary.rejected);
    }

    Ok(())
}

fn run_import_payments(config: &AppConfig, csv_path: &Path, actor: &str) -> Result<()> {
    println!("🗄️  Payment Import - CSV → Ledger");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let store = open_store(config)?;
    let summary = store.import_payments(csv_path, actor)?;
    let count = store.payment_count()?;

    println!("✓ Inserted:   {}", summary.inserted);
    println!("✓ Duplicates: {} (already imported)", summary.duplicates);
    if summary.rejected > 0 {
        println!("⚠️  Rejected:   {} (non-positive amount, unknown student or unreadable row)", summary.rejected);
    }
    println!("✓ Ledger now holds {} payments", count);

    Ok(())
}

fn run_bootstrap_admin(config: &AppConfig, username: &str) -> Result<()> {
    let store = open_store(config)?;

    if store.bootstrap_admin(username)? {
        println!("✅ Admin user '{}' created", username);
    } else {
        println!("✓ User '{}' already exists, nothing to do", username);
    }

    Ok(())
}

fn run_record(
    config: &AppConfig,
    actor: &str,
    reg: &str,
    academic_year: &str,
    term: &str,
    amount: &str,
) -> Result<()> {
    let gateway = open_gateway(config)?;
    let amount_paid = Decimal::from_str(amount.trim())
        .with_context(|| format!("'{}' is not a valid amount", amount))?;

    let payment = NewPayment {
        student_reg_number: reg.to_string(),
        academic_year: academic_year.to_string(),
        term: term.to_string(),
        amount_paid,
        payment_date: None,
    };

    let record = gateway.record_payment(actor, payment, today())?;
    println!(
        "✅ Recorded {} for {} ({}) by {}",
        format_currency(record.amount_paid),
        record.student_reg_number,
        record.period,
        record.recorded_by
    );

    let report = gateway.student_report(reg, &today())?;
    println!("   {}", report.summary());

    Ok(())
}

fn run_status(config: &AppConfig, reg: &str) -> Result<()> {
    let gateway = open_gateway(config)?;
    let report = gateway.student_report(reg, &today())?;

    println!("📋 {}", report.summary());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "{:<26} {:>14} {:>14} {:>14}  {}",
        "Period", "Expected", "Paid", "Outstanding", "Status"
    );
    for entry in &report.breakdown {
        println!(
            "{:<26} {:>14} {:>14} {:>14}  {}",
            entry.period.to_string(),
            format_currency(entry.expected_amount),
            format_currency(entry.paid_amount),
            format_currency(entry.outstanding_amount),
            entry.status.label()
        );
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "{:<26} {:>14} {:>14} {:>14}",
        "Total",
        format_currency(report.total_expected),
        format_currency(report.total_paid),
        format_currency(report.total_outstanding)
    );

    Ok(())
}

fn run_defaulters(config: &AppConfig) -> Result<()> {
    let gateway = open_gateway(config)?;
    let now = today();
    let rows = gateway.defaulters(&now)?;
    let period = gateway.engine().calendar().current_period(&now);

    println!("🔴 Defaulters for {}: {}", period, rows.len());
    for row in &rows {
        println!(
            "   {:<14} {:<30} {}",
            row.student.reg_number, row.student.name, row.student.class
        );
    }
    if !rows.is_empty() {
        println!(
            "   Total outstanding: {}",
            format_currency(gateway.total_outstanding_now(&now)?)
        );
    }

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &AppConfig) -> Result<()> {
    println!("🖥️  Loading Fee Registry UI...\n");

    if !config.database_path.exists() {
        eprintln!("❌ Database not found at {:?}", config.database_path);
        eprintln!("   Run: fee-registry import-students <csv>");
        eprintln!("   to load students first.");
        std::process::exit(1);
    }

    let gateway = open_gateway(config)?;
    let mut app = ui::App::new(gateway, today())?;
    println!("✓ Loaded {} students\n", app.students.len());
    println!("Starting UI... (Press 'q' to quit)\n");

    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &AppConfig) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the API: cargo run --bin fee-server --features server");
    std::process::exit(1);
}
