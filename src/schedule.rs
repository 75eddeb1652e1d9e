// 💰 Fee Schedule - Expected amount per (class, term)
//
// Static configuration: loaded once at startup, immutable afterwards.
// Keyed by term only, so the same amount applies to that term in every
// academic year. A missing entry is a valid state (no obligation).

use crate::period::Term;
use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::info;

// ============================================================================
// SCHEDULE ENTRY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeScheduleEntry {
    /// Class name exactly as stored on student records, e.g. "Basic 1"
    pub class: String,

    pub term: Term,

    /// Expected amount for the term (>= 0)
    pub amount: Decimal,
}

impl FeeScheduleEntry {
    pub fn new(class: impl Into<String>, term: Term, amount: Decimal) -> Self {
        FeeScheduleEntry {
            class: class.into(),
            term,
            amount,
        }
    }
}

// ============================================================================
// FEE SCHEDULE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct FeeSchedule {
    amounts: HashMap<(String, Term), Decimal>,
}

impl FeeSchedule {
    /// Load schedule from a JSON array of `{ class, term, amount }`
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read fee schedule: {:?}", path.as_ref()))?;

        let entries: Vec<FeeScheduleEntry> =
            serde_json::from_str(&content).context("Failed to parse fee schedule JSON")?;

        let schedule = FeeSchedule::from_entries(entries)?;
        info!(
            entries = schedule.len(),
            path = %path.as_ref().display(),
            "fee schedule loaded"
        );

        Ok(schedule)
    }

    /// Build a schedule, rejecting negative amounts, unknown terms and
    /// duplicate (class, term) keys.
    pub fn from_entries(entries: Vec<FeeScheduleEntry>) -> Result<Self> {
        let mut amounts = HashMap::with_capacity(entries.len());

        for entry in entries {
            if entry.amount < Decimal::ZERO {
                bail!(
                    "Negative fee {} for {} / {}",
                    entry.amount,
                    entry.class,
                    entry.term
                );
            }
            if !entry.term.is_known() {
                bail!("Unknown term '{}' for class {}", entry.term, entry.class);
            }

            let key = (entry.class.clone(), entry.term.clone());
            if amounts.insert(key, entry.amount).is_some() {
                bail!("Duplicate fee entry for {} / {}", entry.class, entry.term);
            }
        }

        Ok(FeeSchedule { amounts })
    }

    /// Exact-match lookup. No fallback between classes.
    pub fn expected_amount(&self, class: &str, term: &Term) -> Option<Decimal> {
        self.amounts.get(&(class.to_string(), term.clone())).copied()
    }

    pub fn len(&self) -> usize {
        self.amounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.amounts.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================
