//! In-memory `SheetStore` for tests and dry runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::SheetsError;
use crate::sheets::traits::{PartitionHandle, SheetStore};

#[derive(Debug, Default)]
struct MemorySheet {
    sheet_id: i64,
    rows: Vec<Vec<String>>,
}

/// Partitions held in a map; appends can be made to fail on demand.
#[derive(Debug, Default)]
pub struct MemorySheetStore {
    sheets: Mutex<HashMap<String, MemorySheet>>,
    next_id: AtomicI64,
    fail_writes: AtomicBool,
}

impl MemorySheetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail (simulates a transient API error).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of a partition's rows (header region included).
    pub async fn rows(&self, name: &str) -> Option<Vec<Vec<String>>> {
        self.sheets.lock().await.get(name).map(|s| s.rows.clone())
    }

    /// Names of all partitions.
    pub async fn partition_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.sheets.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    fn check_writable(&self, operation: &str) -> Result<(), SheetsError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SheetsError::Status {
                operation: operation.to_string(),
                status: 503,
                body: "simulated write failure".into(),
            });
        }
        Ok(())
    }
}

/// Index of the last non-empty row, 0-based, if any.
fn last_filled(rows: &[Vec<String>]) -> Option<usize> {
    rows.iter()
        .rposition(|r| r.iter().any(|c| !c.is_empty()))
}

#[async_trait]
impl SheetStore for MemorySheetStore {
    async fn find_partition(&self, name: &str) -> Result<Option<PartitionHandle>, SheetsError> {
        Ok(self.sheets.lock().await.get(name).map(|s| PartitionHandle {
            name: name.to_string(),
            sheet_id: s.sheet_id,
        }))
    }

    async fn create_partition(&self, name: &str) -> Result<PartitionHandle, SheetsError> {
        self.check_writable("addSheet")?;
        let mut sheets = self.sheets.lock().await;
        if sheets.contains_key(name) {
            return Err(SheetsError::Status {
                operation: "addSheet".into(),
                status: 400,
                body: format!("A sheet with the name \"{name}\" already exists"),
            });
        }
        let sheet_id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        sheets.insert(
            name.to_string(),
            MemorySheet {
                sheet_id,
                rows: Vec::new(),
            },
        );
        Ok(PartitionHandle {
            name: name.to_string(),
            sheet_id,
        })
    }

    async fn read_rows(
        &self,
        partition: &PartitionHandle,
        row_count: usize,
    ) -> Result<Vec<Vec<String>>, SheetsError> {
        let sheets = self.sheets.lock().await;
        let sheet = sheets
            .get(&partition.name)
            .ok_or_else(|| SheetsError::PartitionNotFound(partition.name.clone()))?;
        Ok(sheet.rows.iter().take(row_count).cloned().collect())
    }

    async fn write_rows(
        &self,
        partition: &PartitionHandle,
        rows: Vec<Vec<String>>,
    ) -> Result<(), SheetsError> {
        self.check_writable("values.update")?;
        let mut sheets = self.sheets.lock().await;
        let sheet = sheets
            .get_mut(&partition.name)
            .ok_or_else(|| SheetsError::PartitionNotFound(partition.name.clone()))?;
        if sheet.rows.len() < rows.len() {
            sheet.rows.resize(rows.len(), Vec::new());
        }
        for (i, row) in rows.into_iter().enumerate() {
            sheet.rows[i] = row;
        }
        Ok(())
    }

    async fn append_row(
        &self,
        partition: &PartitionHandle,
        first_data_row: usize,
        row: Vec<String>,
    ) -> Result<(), SheetsError> {
        self.check_writable("values.append")?;
        let mut sheets = self.sheets.lock().await;
        let sheet = sheets
            .get_mut(&partition.name)
            .ok_or_else(|| SheetsError::PartitionNotFound(partition.name.clone()))?;
        let data_start = first_data_row.saturating_sub(1);
        let insert_at = match last_filled(&sheet.rows) {
            Some(last) if last >= data_start => last + 1,
            _ => data_start,
        };
        if sheet.rows.len() < insert_at {
            sheet.rows.resize(insert_at, Vec::new());
        }
        sheet.rows.insert(insert_at, row);
        Ok(())
    }
}
