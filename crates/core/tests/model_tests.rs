// ═══════════════════════════════════════════════════════════════════
// Model Tests — record metadata, natural keys, serde representations
// ═══════════════════════════════════════════════════════════════════

use chrono::{DateTime, TimeZone, Utc};

use twfolio_core::models::cash::{CashAccount, CashBalanceSnapshot};
use twfolio_core::models::expense::{BudgetKind, EntryType, Recurrence};
use twfolio_core::models::holding::{Holding, Market};
use twfolio_core::models::record::{RecordMeta, SyncState};
use twfolio_core::models::settings::Settings;
use twfolio_core::models::snapshot::PriceSnapshot;
use twfolio_core::models::valuation::TrendRange;

fn ts(s: &str) -> DateTime<Utc> {
    s.parse().expect("valid RFC3339 timestamp")
}

fn meta_at(s: &str) -> RecordMeta {
    RecordMeta::new(ts(s))
}

fn sample_holding() -> Holding {
    Holding {
        id: 7,
        market: Market::Tw,
        symbol: "2330".into(),
        company_name: "TSMC".into(),
        asset_tag: "Core".into(),
        shares: 100.0,
        sort_order: 1,
        meta: meta_at("2024-03-01T00:00:00Z"),
    }
}

// ── SyncState ───────────────────────────────────────────────────────

#[test]
fn sync_state_serializes_lowercase() {
    assert_eq!(
        serde_json::to_string(&SyncState::Pending).unwrap(),
        "\"pending\""
    );
    assert_eq!(
        serde_json::to_string(&SyncState::Synced).unwrap(),
        "\"synced\""
    );
    assert_eq!(
        serde_json::to_string(&SyncState::Error).unwrap(),
        "\"error\""
    );
}

#[test]
fn missing_sync_state_deserializes_as_pending() {
    // Legacy records predate the sync_state field; they must land in the
    // push candidate set.
    let meta: RecordMeta =
        serde_json::from_str(r#"{"updated_at":"2023-06-01T00:00:00Z"}"#).unwrap();
    assert_eq!(meta.sync_state, SyncState::Pending);
    assert!(meta.deleted_at.is_none());
}

#[test]
fn sync_state_displays_lowercase() {
    assert_eq!(SyncState::Pending.to_string(), "pending");
    assert_eq!(SyncState::Error.to_string(), "error");
}

// ── RecordMeta lifecycle ────────────────────────────────────────────

#[test]
fn new_meta_is_active_and_pending() {
    let meta = meta_at("2024-01-01T00:00:00Z");
    assert!(meta.is_active());
    assert!(!meta.is_deleted());
    assert_eq!(meta.sync_state, SyncState::Pending);
}

#[test]
fn touch_bumps_timestamp_and_resets_to_pending() {
    let mut meta = meta_at("2024-01-01T00:00:00Z");
    meta.sync_state = SyncState::Synced;
    let later = ts("2024-01-02T00:00:00Z");
    meta.touch(later);
    assert_eq!(meta.updated_at, later);
    assert_eq!(meta.sync_state, SyncState::Pending);
}

#[test]
fn soft_delete_sets_tombstone_and_marks_pending() {
    let mut meta = meta_at("2024-01-01T00:00:00Z");
    meta.sync_state = SyncState::Synced;
    let when = ts("2024-02-01T00:00:00Z");
    meta.soft_delete(when);
    assert_eq!(meta.deleted_at, Some(when));
    assert_eq!(meta.updated_at, when);
    assert_eq!(meta.sync_state, SyncState::Pending);
}

#[test]
fn deleted_at_or_before_respects_the_instant() {
    let mut meta = meta_at("2024-01-01T00:00:00Z");
    meta.soft_delete(ts("2024-02-01T00:00:00Z"));
    assert!(meta.deleted_at_or_before(ts("2024-02-01T00:00:00Z")));
    assert!(meta.deleted_at_or_before(ts("2024-03-01T00:00:00Z")));
    assert!(!meta.deleted_at_or_before(ts("2024-01-31T23:59:59Z")));
}

// ── Markets & symbols ───────────────────────────────────────────────

#[test]
fn symbol_normalization_trims_and_uppercases() {
    assert_eq!(Market::Us.normalize_symbol("  aapl "), "AAPL");
    assert_eq!(Market::Tw.normalize_symbol(" 2330"), "2330");
}

#[test]
fn market_currency_and_display() {
    assert_eq!(Market::Tw.currency(), "TWD");
    assert_eq!(Market::Us.currency(), "USD");
    assert_eq!(Market::Tw.to_string(), "TW");
    assert_eq!(Market::Us.to_string(), "US");
}

// ── Natural keys ────────────────────────────────────────────────────

#[test]
fn holding_natural_key_is_market_and_symbol() {
    assert_eq!(sample_holding().natural_key(), "TW:2330");
}

#[test]
fn snapshot_natural_key_uses_millisecond_timestamp() {
    let captured = Utc.with_ymd_and_hms(2024, 3, 1, 5, 30, 0).unwrap();
    let snapshot = PriceSnapshot {
        id: 1,
        holding_id: 7,
        market: Market::Tw,
        symbol: "2330".into(),
        price: 600.0,
        currency: "TWD".into(),
        fx_rate_to_twd: 1.0,
        value_twd: 60_000.0,
        captured_at: captured,
        meta: meta_at("2024-03-01T05:30:00Z"),
    };
    assert_eq!(snapshot.natural_key(), "TW:2330:2024-03-01T05:30:00.000Z");
}

#[test]
fn cash_natural_keys_compose_bank_and_alias() {
    let account = CashAccount {
        id: 3,
        bank_name: "CTBC".into(),
        account_alias: "Salary".into(),
        bank_code: None,
        balance_twd: 10_000.0,
        meta: meta_at("2024-03-01T00:00:00Z"),
    };
    assert_eq!(account.natural_key(), "CTBC:Salary");

    let snapshot = CashBalanceSnapshot {
        id: 4,
        account_id: 3,
        bank_name: "CTBC".into(),
        account_alias: "Salary".into(),
        balance_twd: 10_000.0,
        captured_at: ts("2024-03-01T00:00:00Z"),
        meta: meta_at("2024-03-01T00:00:00Z"),
    };
    assert_eq!(snapshot.natural_key(), "CTBC:Salary:2024-03-01T00:00:00.000Z");
}

// ── Expense enums ───────────────────────────────────────────────────

#[test]
fn entry_type_uses_screaming_snake_case() {
    assert_eq!(
        serde_json::to_string(&EntryType::OneTime).unwrap(),
        "\"ONE_TIME\""
    );
    assert_eq!(
        serde_json::to_string(&EntryType::Recurring).unwrap(),
        "\"RECURRING\""
    );
}

#[test]
fn recurrence_round_trips_through_json() {
    let monthly = Recurrence::Monthly { day: 31 };
    let json = serde_json::to_string(&monthly).unwrap();
    let back: Recurrence = serde_json::from_str(&json).unwrap();
    assert_eq!(back, monthly);

    let yearly = Recurrence::Yearly { month: 6, day: 15 };
    let json = serde_json::to_string(&yearly).unwrap();
    let back: Recurrence = serde_json::from_str(&json).unwrap();
    assert_eq!(back, yearly);
}

#[test]
fn budget_kind_cycle_lengths() {
    assert_eq!(BudgetKind::Monthly.cycle_months(), 1);
    assert_eq!(BudgetKind::Quarterly.cycle_months(), 3);
    assert_eq!(BudgetKind::Yearly.cycle_months(), 12);
}

// ── Trend ranges & settings ─────────────────────────────────────────

#[test]
fn trend_ranges_map_to_point_counts() {
    assert_eq!(TrendRange::Day.points(), 2);
    assert_eq!(TrendRange::Week.points(), 7);
    assert_eq!(TrendRange::Month.points(), 30);
    assert_eq!(TrendRange::Week.to_string(), "7d");
}

#[test]
fn default_settings_carry_tags_and_interval() {
    let settings = Settings::default();
    assert!(settings.asset_tags.contains(&"Core".to_string()));
    assert_eq!(settings.sync_interval_secs, 30);
    assert!(settings.api_keys.is_empty());
}

#[test]
fn holding_serde_round_trip_preserves_meta() {
    let holding = sample_holding();
    let json = serde_json::to_string(&holding).unwrap();
    let back: Holding = serde_json::from_str(&json).unwrap();
    assert_eq!(back, holding);
}
