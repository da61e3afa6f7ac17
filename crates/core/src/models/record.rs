use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-record synchronization state.
///
/// `pending`: local change not yet confirmed remote.
/// `synced`: local matches the last known remote write.
/// `error`: the last push/pull attempt touching this record failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Pending,
    Synced,
    Error,
}

impl Default for SyncState {
    // Records written before sync existed carry no state field; defaulting to
    // Pending puts them straight into the next push cycle.
    fn default() -> Self {
        SyncState::Pending
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncState::Pending => write!(f, "pending"),
            SyncState::Synced => write!(f, "synced"),
            SyncState::Error => write!(f, "error"),
        }
    }
}

/// Bookkeeping fields shared by every syncable record.
///
/// `updated_at` is a local-clock timestamp and is the sole ordering signal
/// for conflict resolution — see `SyncEngine` for the documented caveat.
/// Records are never hard-deleted: a non-null `deleted_at` marks a tombstone
/// that still syncs like any other record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMeta {
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub sync_state: SyncState,
}

impl RecordMeta {
    /// Fresh metadata for a newly created record: pending, not deleted.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            updated_at: now,
            deleted_at: None,
            sync_state: SyncState::Pending,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Stamp a mutation: bump `updated_at` and drop back to `pending`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.sync_state = SyncState::Pending;
    }

    /// Soft-delete the record and mark it for push.
    pub fn soft_delete(&mut self, now: DateTime<Utc>) {
        self.deleted_at = Some(now);
        self.touch(now);
    }

    /// True if the record was deleted at or before `instant`.
    pub fn deleted_at_or_before(&self, instant: DateTime<Utc>) -> bool {
        self.deleted_at.is_some_and(|d| d <= instant)
    }
}
