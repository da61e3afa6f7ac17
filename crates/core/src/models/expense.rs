use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::record::RecordMeta;

/// A user-defined expense category (e.g. "Food", "Transport").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseCategory {
    pub id: u64,
    pub name: String,
    pub meta: RecordMeta,
}

impl ExpenseCategory {
    pub fn natural_key(&self) -> String {
        self.name.clone()
    }
}

/// Budget cycle length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BudgetKind {
    Monthly,
    Quarterly,
    Yearly,
}

impl BudgetKind {
    /// Cycle length in whole calendar months.
    pub fn cycle_months(&self) -> u32 {
        match self {
            BudgetKind::Monthly => 1,
            BudgetKind::Quarterly => 3,
            BudgetKind::Yearly => 12,
        }
    }
}

/// A spending budget with rolling cycles anchored at `start_date`.
///
/// Cycle N covers `[start + N·len months, start + (N+1)·len months)` with
/// day-of-month clamped to the target month's length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub id: u64,
    pub name: String,
    pub kind: BudgetKind,
    pub amount_twd: f64,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub category_id: Option<u64>,
    pub meta: RecordMeta,
}

impl Budget {
    pub fn natural_key(&self) -> String {
        self.name.clone()
    }
}

/// Whether an expense happens once or repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    OneTime,
    Recurring,
}

/// When a recurring entry produces an occurrence.
///
/// A configured day beyond the target month's length clamps to the month's
/// last day (day 31 in April occurs on the 30th).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recurrence {
    /// Once per month on `day` (1..=31, clamped).
    Monthly { day: u32 },
    /// Once per year in `month` (1..=12) on `day` (clamped).
    Yearly { month: u32, day: u32 },
}

/// A single expense fact: one-time, or a recurrence rule expanded on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseEntry {
    pub id: u64,

    pub description: String,

    pub amount_twd: f64,

    /// For one-time entries, the spend date. For recurring entries, the
    /// start date — occurrences before it never qualify.
    pub date: NaiveDate,

    #[serde(default)]
    pub category_id: Option<u64>,

    /// Budget this entry counts against, if any.
    #[serde(default)]
    pub budget_id: Option<u64>,

    pub entry_type: EntryType,

    /// Present iff `entry_type` is `Recurring`.
    #[serde(default)]
    pub recurrence: Option<Recurrence>,

    /// Last date (inclusive) a recurring entry is active; it stops the day
    /// after. `None` means open-ended.
    #[serde(default)]
    pub recurrence_until: Option<NaiveDate>,

    pub meta: RecordMeta,
}

impl ExpenseEntry {
    pub fn natural_key(&self) -> String {
        format!("{}:{}", self.description, self.date)
    }
}
