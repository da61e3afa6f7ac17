pub mod cash;
pub mod expense;
pub mod fx;
pub mod holding;
pub mod record;
pub mod settings;
pub mod snapshot;
pub mod sync_meta;
pub mod valuation;
