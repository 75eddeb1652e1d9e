// 📅 Period Calendar - Academic terms as ordered values
//
// An academic year runs September → August and is split into three terms:
//   September-December → First Term
//   January-April      → Second Term
//   May-August         → Third Term
//
// The year rolls over in August: before August we are still in the
// academic year that started the previous calendar year.
//
// Periods attached to old payments may be messy (typos, free-text term
// labels). Parsing never fails; malformed parts sort lowest instead.

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Month in which the academic year rolls over.
pub const ROLLOVER_MONTH: u32 = 8;

// ============================================================================
// TERM
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Term {
    First,
    Second,
    Third,

    /// Label that is not one of the three known terms (legacy data).
    /// Kept verbatim so it round-trips; sorts below every known term.
    Other(String),
}

impl Term {
    /// Parse a term label. Only the canonical labels are recognised, ignoring
    /// case and extra whitespace; "1", "first" and the like stay `Other`.
    pub fn parse(label: &str) -> Term {
        let normalized = label
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        match normalized.as_str() {
            "first term" => Term::First,
            "second term" => Term::Second,
            "third term" => Term::Third,
            _ => Term::Other(label.to_string()),
        }
    }

    /// Sort index: First=0, Second=1, Third=2, unknown labels=-1
    pub fn index(&self) -> i32 {
        match self {
            Term::First => 0,
            Term::Second => 1,
            Term::Third => 2,
            Term::Other(_) => -1,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Term::First => "First Term",
            Term::Second => "Second Term",
            Term::Third => "Third Term",
            Term::Other(label) => label.as_str(),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Term::Other(_))
    }

    /// Term in session during the given calendar month (1-12).
    pub fn for_month(month: u32) -> Term {
        match month {
            9..=12 => Term::First,
            1..=4 => Term::Second,
            _ => Term::Third,
        }
    }
}

impl From<String> for Term {
    fn from(label: String) -> Self {
        Term::parse(&label)
    }
}

impl From<Term> for String {
    fn from(term: Term) -> Self {
        term.label().to_string()
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// PERIOD
// ============================================================================

/// One academic term, e.g. ("2024/2025", First Term).
///
/// Equality is field-wise. Ordering is by the start year of
/// `academic_year`, then by term index. Two distinct malformed periods
/// that tie on both keys are ordered by their raw text so that `Ord`
/// stays consistent with `Eq`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub academic_year: String,
    pub term: Term,
}

impl Period {
    pub fn new(academic_year: impl Into<String>, term: Term) -> Self {
        Period {
            academic_year: academic_year.into(),
            term,
        }
    }

    /// Build from raw strings as they appear in stored records.
    pub fn parse(academic_year: &str, term: &str) -> Self {
        Period::new(academic_year.trim(), Term::parse(term))
    }

    /// Academic year starting in `start_year`, formatted "YYYY/YYYY".
    pub fn for_start_year(start_year: i32, term: Term) -> Self {
        Period::new(format!("{}/{}", start_year, start_year + 1), term)
    }

    /// Start year of "YYYY/YYYY". Unparsable → 0 (sorts lowest).
    pub fn start_year(&self) -> i32 {
        self.academic_year
            .split('/')
            .next()
            .and_then(|head| head.trim().parse::<i32>().ok())
            .unwrap_or(0)
    }
}

impl Ord for Period {
    fn cmp(&self, other: &Self) -> Ordering {
        self.start_year()
            .cmp(&other.start_year())
            .then_with(|| self.term.index().cmp(&other.term.index()))
            .then_with(|| self.academic_year.cmp(&other.academic_year))
            .then_with(|| self.term.label().cmp(other.term.label()))
    }
}

impl PartialOrd for Period {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.academic_year, self.term)
    }
}

// ============================================================================
// PERIOD CALENDAR
// ============================================================================

/// Derives the current period from a caller-supplied clock reading.
///
/// Holds no state; the wall clock is never read here.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeriodCalendar;

impl PeriodCalendar {
    pub fn new() -> Self {
        PeriodCalendar
    }

    /// Academic period in session at `now`.
    pub fn current_period<D: Datelike>(&self, now: &D) -> Period {
        let year = now.year();
        let start_year = if now.month() < ROLLOVER_MONTH {
            year - 1
        } else {
            year
        };

        Period::for_start_year(start_year, Term::for_month(now.month()))
    }

    /// Total order over periods (start year, then term index).
    pub fn compare(&self, a: &Period, b: &Period) -> Ordering {
        a.cmp(b)
    }
}

// ============================================================================
// TESTS
// ============================================================================
