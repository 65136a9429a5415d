//! VAS catalog core: supplier catalog ingestion, normalization,
//! reconciliation against the persisted catalog, and best-deal resolution
//! at purchase time.
//!
//! Data flows one direction: supplier API → fetch → normalize → reconcile →
//! persisted catalog. Best-deal selection reads the persisted catalog
//! independently of sync.

pub mod catalog;
pub mod error;
pub mod suppliers;
pub mod tracing;
pub mod vas;

pub mod util {
    pub mod db;
    pub mod env;
}
