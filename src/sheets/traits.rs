//! Spreadsheet store abstraction.

use async_trait::async_trait;

use crate::error::SheetsError;

/// A named sub-table (tab) inside the spreadsheet document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionHandle {
    pub name: String,
    pub sheet_id: i64,
}

/// Remote table operations needed by the writer.
///
/// Rows are 1-based as in A1 notation. Implementations perform no retries.
#[async_trait]
pub trait SheetStore: Send + Sync {
    /// Look up a partition by exact name.
    async fn find_partition(&self, name: &str) -> Result<Option<PartitionHandle>, SheetsError>;

    /// Create an empty partition. Fails if the name is already taken.
    async fn create_partition(&self, name: &str) -> Result<PartitionHandle, SheetsError>;

    /// Read `row_count` rows starting at row 1.
    async fn read_rows(
        &self,
        partition: &PartitionHandle,
        row_count: usize,
    ) -> Result<Vec<Vec<String>>, SheetsError>;

    /// Overwrite rows starting at row 1. Cells beginning with `=` are formulas.
    async fn write_rows(
        &self,
        partition: &PartitionHandle,
        rows: Vec<Vec<String>>,
    ) -> Result<(), SheetsError>;

    /// Append one row after the last non-empty row at or below `first_data_row`.
    /// Cells are stored verbatim.
    async fn append_row(
        &self,
        partition: &PartitionHandle,
        first_data_row: usize,
        row: Vec<String>,
    ) -> Result<(), SheetsError>;
}
