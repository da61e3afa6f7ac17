use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::cash::{CashAccount, CashBalanceSnapshot};
use crate::models::expense::{Budget, ExpenseCategory, ExpenseEntry};
use crate::models::fx::FxRate;
use crate::models::holding::Holding;
use crate::models::record::RecordMeta;
use crate::models::snapshot::PriceSnapshot;
use crate::models::sync_meta::SyncMeta;

use super::remote::Collection;

/// A record the sync engine can push and pull.
///
/// The remote representation is the record's plain serde document; the local
/// `id` field travels along but is never honored on pull — records match
/// across devices by `remote_key()` alone.
pub trait Syncable: Serialize + DeserializeOwned + Clone + Send + 'static {
    /// Remote collection this record lives in.
    const COLLECTION: Collection;

    /// Natural-key string used as the remote document id.
    fn remote_key(&self) -> String;

    fn local_id(&self) -> u64;
    fn set_local_id(&mut self, id: u64);

    fn meta(&self) -> &RecordMeta;
    fn meta_mut(&mut self) -> &mut RecordMeta;
}

macro_rules! impl_syncable {
    ($ty:ty, $collection:expr) => {
        impl Syncable for $ty {
            const COLLECTION: Collection = $collection;

            fn remote_key(&self) -> String {
                self.natural_key()
            }

            fn local_id(&self) -> u64 {
                self.id
            }

            fn set_local_id(&mut self, id: u64) {
                self.id = id;
            }

            fn meta(&self) -> &RecordMeta {
                &self.meta
            }

            fn meta_mut(&mut self) -> &mut RecordMeta {
                &mut self.meta
            }
        }
    };
}

impl_syncable!(Holding, Collection::Holdings);
impl_syncable!(PriceSnapshot, Collection::PriceSnapshots);
impl_syncable!(FxRate, Collection::FxRates);
impl_syncable!(SyncMeta, Collection::SyncMeta);
impl_syncable!(CashAccount, Collection::CashAccounts);
impl_syncable!(CashBalanceSnapshot, Collection::CashBalanceSnapshots);
impl_syncable!(ExpenseCategory, Collection::ExpenseCategories);
impl_syncable!(Budget, Collection::Budgets);
impl_syncable!(ExpenseEntry, Collection::ExpenseEntries);
