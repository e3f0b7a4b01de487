//! Spreadsheet storage: store backends and the per-channel router.

pub mod google;
pub mod memory;
pub mod router;
pub mod traits;

pub use google::GoogleSheetsStore;
pub use memory::MemorySheetStore;
pub use router::SheetRouter;
pub use traits::{PartitionHandle, SheetStore};
