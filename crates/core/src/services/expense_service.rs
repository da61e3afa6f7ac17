use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::models::expense::{
    Budget, BudgetKind, EntryType, ExpenseCategory, ExpenseEntry, Recurrence,
};
use crate::models::record::RecordMeta;
use crate::store::records::RecordStore;

/// Consumption of a budget within its current cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetStatus {
    pub budget_id: u64,
    /// Zero-based index of the current cycle since the budget's start date.
    pub cycle_index: u32,
    pub cycle_start: NaiveDate,
    /// Last day of the cycle, inclusive.
    pub cycle_end: NaiveDate,
    pub amount_twd: f64,
    pub spent_twd: f64,
    pub remaining_twd: f64,
}

/// Fields of an expense entry the user can edit. Used for both create and
/// full-replace update.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryInput {
    pub description: String,
    pub amount_twd: f64,
    pub date: NaiveDate,
    pub category_id: Option<u64>,
    pub budget_id: Option<u64>,
    pub entry_type: EntryType,
    pub recurrence: Option<Recurrence>,
    pub recurrence_until: Option<NaiveDate>,
}

/// Expense/budget/category mutations plus the recurrence calendar math:
/// expanding entries into dated occurrences, cumulative totals, and budget
/// cycle windows.
pub struct ExpenseService;

impl ExpenseService {
    pub fn new() -> Self {
        Self
    }

    // ── Categories ──────────────────────────────────────────────────

    pub fn add_category(
        &self,
        store: &mut RecordStore,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, CoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::Validation("Category name must not be empty".into()));
        }
        if store
            .expense_categories
            .iter()
            .any(|c| c.meta.is_active() && c.name == name)
        {
            return Err(CoreError::Validation(format!(
                "Category '{name}' already exists"
            )));
        }
        let id = store.allocate_id();
        store.expense_categories.push(ExpenseCategory {
            id,
            name: name.to_string(),
            meta: RecordMeta::new(now),
        });
        Ok(id)
    }

    pub fn remove_category(
        &self,
        store: &mut RecordStore,
        id: u64,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let category = store
            .expense_categories
            .iter_mut()
            .find(|c| c.id == id && c.meta.is_active())
            .ok_or_else(|| CoreError::not_found("Category", id.to_string()))?;
        category.meta.soft_delete(now);
        Ok(())
    }

    // ── Budgets ─────────────────────────────────────────────────────

    pub fn add_budget(
        &self,
        store: &mut RecordStore,
        name: &str,
        kind: BudgetKind,
        amount_twd: f64,
        start_date: NaiveDate,
        category_id: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<u64, CoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::Validation("Budget name must not be empty".into()));
        }
        Self::validate_amount(amount_twd)?;
        if let Some(category_id) = category_id {
            Self::require_category(store, category_id)?;
        }
        if store
            .budgets
            .iter()
            .any(|b| b.meta.is_active() && b.name == name)
        {
            return Err(CoreError::Validation(format!(
                "Budget '{name}' already exists"
            )));
        }
        let id = store.allocate_id();
        store.budgets.push(Budget {
            id,
            name: name.to_string(),
            kind,
            amount_twd,
            start_date,
            category_id,
            meta: RecordMeta::new(now),
        });
        Ok(id)
    }

    pub fn remove_budget(
        &self,
        store: &mut RecordStore,
        id: u64,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let budget = store
            .budgets
            .iter_mut()
            .find(|b| b.id == id && b.meta.is_active())
            .ok_or_else(|| CoreError::not_found("Budget", id.to_string()))?;
        budget.meta.soft_delete(now);
        Ok(())
    }

    // ── Entries ─────────────────────────────────────────────────────

    pub fn add_entry(
        &self,
        store: &mut RecordStore,
        input: EntryInput,
        now: DateTime<Utc>,
    ) -> Result<u64, CoreError> {
        Self::validate_entry(store, &input)?;
        let id = store.allocate_id();
        store.expense_entries.push(ExpenseEntry {
            id,
            description: input.description.trim().to_string(),
            amount_twd: input.amount_twd,
            date: input.date,
            category_id: input.category_id,
            budget_id: input.budget_id,
            entry_type: input.entry_type,
            recurrence: input.recurrence,
            recurrence_until: input.recurrence_until,
            meta: RecordMeta::new(now),
        });
        Ok(id)
    }

    /// Full-replace update of an entry's editable fields.
    pub fn update_entry(
        &self,
        store: &mut RecordStore,
        id: u64,
        input: EntryInput,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        Self::validate_entry(store, &input)?;
        let entry = store
            .expense_entries
            .iter_mut()
            .find(|e| e.id == id && e.meta.is_active())
            .ok_or_else(|| CoreError::not_found("Expense entry", id.to_string()))?;
        entry.description = input.description.trim().to_string();
        entry.amount_twd = input.amount_twd;
        entry.date = input.date;
        entry.category_id = input.category_id;
        entry.budget_id = input.budget_id;
        entry.entry_type = input.entry_type;
        entry.recurrence = input.recurrence;
        entry.recurrence_until = input.recurrence_until;
        entry.meta.touch(now);
        Ok(())
    }

    pub fn remove_entry(
        &self,
        store: &mut RecordStore,
        id: u64,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let entry = store
            .expense_entries
            .iter_mut()
            .find(|e| e.id == id && e.meta.is_active())
            .ok_or_else(|| CoreError::not_found("Expense entry", id.to_string()))?;
        entry.meta.soft_delete(now);
        Ok(())
    }

    // ── Recurrence expansion ────────────────────────────────────────

    /// The date an entry occurs on within one month, if it does.
    ///
    /// One-time entries occur on their stored date; monthly recurrences on
    /// `min(day, days in month)`; yearly ones only in the matching month.
    /// An occurrence before the entry's start date or after its
    /// `recurrence_until` (exclusive of the day after) does not qualify.
    pub fn occurrence_in_month(
        entry: &ExpenseEntry,
        year: i32,
        month: u32,
    ) -> Option<NaiveDate> {
        let occurrence = match entry.entry_type {
            EntryType::OneTime => {
                if entry.date.year() == year && entry.date.month() == month {
                    Some(entry.date)
                } else {
                    None
                }
            }
            EntryType::Recurring => match entry.recurrence? {
                Recurrence::Monthly { day } => Some(clamped_date(year, month, day)),
                Recurrence::Yearly { month: m, day } => {
                    if m == month {
                        Some(clamped_date(year, month, day))
                    } else {
                        None
                    }
                }
            },
        }?;

        if occurrence < entry.date {
            return None;
        }
        if let Some(until) = entry.recurrence_until {
            // `until` is the last active day; the day after is excluded.
            if occurrence > until {
                return None;
            }
        }
        Some(occurrence)
    }

    /// Total spent across all active entries in one calendar month.
    pub fn month_total(&self, store: &RecordStore, year: i32, month: u32) -> f64 {
        store
            .active_expense_entries()
            .iter()
            .filter_map(|e| Self::occurrence_in_month(e, year, month).map(|_| e.amount_twd))
            .sum()
    }

    /// Cumulative spend of one entry from its start date through `today`,
    /// expanding recurrences month by month.
    pub fn total_to_date(entry: &ExpenseEntry, today: NaiveDate) -> f64 {
        let mut total = 0.0;
        let (mut year, mut month) = (entry.date.year(), entry.date.month());
        while (year, month) <= (today.year(), today.month()) {
            if let Some(occurrence) = Self::occurrence_in_month(entry, year, month) {
                if occurrence <= today {
                    total += entry.amount_twd;
                }
            }
            (year, month) = next_month(year, month);
        }
        total
    }

    /// Cumulative spend across all active entries through `today`.
    pub fn cumulative_total(&self, store: &RecordStore, today: NaiveDate) -> f64 {
        store
            .active_expense_entries()
            .iter()
            .map(|e| Self::total_to_date(e, today))
            .sum()
    }

    // ── Budget cycles ───────────────────────────────────────────────

    /// The cycle window containing `today`.
    ///
    /// Cycle length is 1/3/12 months by budget kind; the index is the
    /// elapsed whole months since `start_date` integer-divided by the
    /// length. Both ends clamp the start's day-of-month to the target
    /// month's length.
    pub fn budget_cycle(budget: &Budget, today: NaiveDate) -> (u32, NaiveDate, NaiveDate) {
        let len = budget.kind.cycle_months();
        let elapsed = whole_months_between(budget.start_date, today);
        let index = elapsed / len;
        let cycle_start = add_months(budget.start_date, index * len);
        let cycle_end = add_months(budget.start_date, (index + 1) * len)
            .pred_opt()
            .unwrap_or(cycle_start);
        (index, cycle_start, cycle_end)
    }

    /// Spend against a budget inside its current cycle, counting qualifying
    /// occurrences up to `today` only — scheduled occurrences later in the
    /// cycle have not been consumed yet.
    pub fn budget_consumption(
        &self,
        store: &RecordStore,
        budget: &Budget,
        today: NaiveDate,
    ) -> f64 {
        let (_, cycle_start, cycle_end) = Self::budget_cycle(budget, today);
        let mut spent = 0.0;

        for entry in store
            .active_expense_entries()
            .iter()
            .filter(|e| e.budget_id == Some(budget.id))
        {
            let (mut year, mut month) = (cycle_start.year(), cycle_start.month());
            while (year, month) <= (cycle_end.year(), cycle_end.month()) {
                if let Some(occurrence) = Self::occurrence_in_month(entry, year, month) {
                    if occurrence >= cycle_start && occurrence <= cycle_end && occurrence <= today
                    {
                        spent += entry.amount_twd;
                    }
                }
                (year, month) = next_month(year, month);
            }
        }
        spent
    }

    /// Current-cycle status of a budget.
    pub fn budget_status(
        &self,
        store: &RecordStore,
        budget_id: u64,
        today: NaiveDate,
    ) -> Result<BudgetStatus, CoreError> {
        let budget = store
            .budgets
            .iter()
            .find(|b| b.id == budget_id && b.meta.is_active())
            .ok_or_else(|| CoreError::not_found("Budget", budget_id.to_string()))?;

        let (cycle_index, cycle_start, cycle_end) = Self::budget_cycle(budget, today);
        let spent_twd = self.budget_consumption(store, budget, today);
        Ok(BudgetStatus {
            budget_id,
            cycle_index,
            cycle_start,
            cycle_end,
            amount_twd: budget.amount_twd,
            spent_twd,
            remaining_twd: budget.amount_twd - spent_twd,
        })
    }

    // ── Internals ───────────────────────────────────────────────────

    fn validate_amount(amount_twd: f64) -> Result<(), CoreError> {
        if !amount_twd.is_finite() || amount_twd <= 0.0 {
            return Err(CoreError::Validation(format!(
                "Amount must be a positive finite number, got {amount_twd}"
            )));
        }
        Ok(())
    }

    fn require_category(store: &RecordStore, id: u64) -> Result<(), CoreError> {
        store
            .expense_categories
            .iter()
            .find(|c| c.id == id && c.meta.is_active())
            .map(|_| ())
            .ok_or_else(|| CoreError::not_found("Category", id.to_string()))
    }

    fn require_budget(store: &RecordStore, id: u64) -> Result<(), CoreError> {
        store
            .budgets
            .iter()
            .find(|b| b.id == id && b.meta.is_active())
            .map(|_| ())
            .ok_or_else(|| CoreError::not_found("Budget", id.to_string()))
    }

    fn validate_entry(store: &RecordStore, input: &EntryInput) -> Result<(), CoreError> {
        if input.description.trim().is_empty() {
            return Err(CoreError::Validation(
                "Expense description must not be empty".into(),
            ));
        }
        Self::validate_amount(input.amount_twd)?;

        match (input.entry_type, input.recurrence) {
            (EntryType::OneTime, Some(_)) => {
                return Err(CoreError::Validation(
                    "One-time entries must not carry a recurrence".into(),
                ));
            }
            (EntryType::Recurring, None) => {
                return Err(CoreError::Validation(
                    "Recurring entries require a recurrence".into(),
                ));
            }
            (EntryType::Recurring, Some(Recurrence::Monthly { day })) => {
                if !(1..=31).contains(&day) {
                    return Err(CoreError::Validation(format!(
                        "Monthly recurrence day must be 1..=31, got {day}"
                    )));
                }
            }
            (EntryType::Recurring, Some(Recurrence::Yearly { month, day })) => {
                if !(1..=12).contains(&month) {
                    return Err(CoreError::Validation(format!(
                        "Yearly recurrence month must be 1..=12, got {month}"
                    )));
                }
                if !(1..=31).contains(&day) {
                    return Err(CoreError::Validation(format!(
                        "Yearly recurrence day must be 1..=31, got {day}"
                    )));
                }
            }
            (EntryType::OneTime, None) => {}
        }

        if let Some(category_id) = input.category_id {
            Self::require_category(store, category_id)?;
        }
        if let Some(budget_id) = input.budget_id {
            Self::require_budget(store, budget_id)?;
        }
        Ok(())
    }
}

impl Default for ExpenseService {
    fn default() -> Self {
        Self::new()
    }
}

// ── Calendar helpers ────────────────────────────────────────────────

/// Number of days in a month.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = next_month(year, month);
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

/// Date in (year, month) with the day clamped to the month's length.
pub fn clamped_date(year: i32, month: u32, day: u32) -> NaiveDate {
    let day = day.min(days_in_month(year, month)).max(1);
    // Clamped day is always valid for the month.
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

/// `date` shifted forward by `months` calendar months, day clamped.
pub fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    let total = date.year() * 12 + date.month() as i32 - 1 + months as i32;
    let year = total.div_euclid(12);
    let month = total.rem_euclid(12) as u32 + 1;
    clamped_date(year, month, date.day())
}

/// Elapsed whole calendar months from `start` to `today` (0 when `today`
/// precedes `start`).
pub fn whole_months_between(start: NaiveDate, today: NaiveDate) -> u32 {
    let mut months =
        (today.year() - start.year()) * 12 + today.month() as i32 - start.month() as i32;
    if today.day() < start.day() {
        months -= 1;
    }
    months.max(0) as u32
}
