//! I/O modules: the geo data store boundary and export formatting

pub mod export;
pub mod store;

pub use export::{ConfusionMatrix, ExportAdapter, RunManifest};
pub use store::{ClassQuota, GeoDataStore, MemoryStore, StratifiedDraw};
