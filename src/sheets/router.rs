//! Sheet router & writer.
//!
//! One partition per routing key. Rows 1–2 are the header region: row 1 holds
//! a live row-count formula, row 2 the column labels. Both are rewritten on
//! every access so a schema change never leaves stale headers over new data.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::SheetsError;
use crate::extract::schema::{ContextField, column_count, header_row};
use crate::pipeline::types::NormalizedRecord;
use crate::sheets::traits::{PartitionHandle, SheetStore};

/// Rows occupied by the header region.
pub const HEADER_ROWS: usize = 2;

/// First 1-based row of the data region.
pub const FIRST_DATA_ROW: usize = HEADER_ROWS + 1;

/// Characters the store does not accept in a tab name.
const FORBIDDEN_NAME_CHARS: &[char] = &['[', ']', '*', '?', '/', '\\', ':'];

/// Max tab name length.
const MAX_NAME_CHARS: usize = 100;

pub struct SheetRouter {
    store: Arc<dyn SheetStore>,
}

impl SheetRouter {
    pub fn new(store: Arc<dyn SheetStore>) -> Self {
        Self { store }
    }

    /// Get or create the partition for `routing_key` and assert its header.
    pub async fn resolve_partition(
        &self,
        routing_key: &str,
    ) -> Result<PartitionHandle, SheetsError> {
        let name = partition_name(routing_key);
        let handle = match self.store.find_partition(&name).await? {
            Some(handle) => handle,
            None => self.create_or_adopt(&name).await?,
        };
        self.assert_header(&handle).await?;
        Ok(handle)
    }

    /// Create `name`; if another writer created it between our lookup and
    /// the create call, use theirs.
    async fn create_or_adopt(&self, name: &str) -> Result<PartitionHandle, SheetsError> {
        info!(partition = %name, "Creating partition");
        let create_err = match self.store.create_partition(name).await {
            Ok(handle) => return Ok(handle),
            Err(e) => e,
        };
        match self.store.find_partition(name).await {
            Ok(Some(handle)) => {
                debug!(
                    partition = %name,
                    error = %create_err,
                    "Partition created concurrently; reusing"
                );
                Ok(handle)
            }
            _ => Err(create_err),
        }
    }

    /// Append `record` as one row at the end of the data region.
    pub async fn append_record(
        &self,
        partition: &PartitionHandle,
        record: &NormalizedRecord,
    ) -> Result<(), SheetsError> {
        self.store
            .append_row(partition, FIRST_DATA_ROW, record.to_row())
            .await?;
        debug!(partition = %partition.name, "Row appended");
        Ok(())
    }

    async fn assert_header(&self, partition: &PartitionHandle) -> Result<(), SheetsError> {
        let expected = header_rows();
        let current = self.store.read_rows(partition, HEADER_ROWS).await?;
        if !current.is_empty() && !same_cells(&current, &expected) {
            warn!(
                partition = %partition.name,
                "Header region differs from current schema; rewriting"
            );
        }
        self.store.write_rows(partition, expected).await
    }
}

/// The two header rows, padded to full width so stale cells are cleared.
pub fn header_rows() -> Vec<Vec<String>> {
    let width = column_count();
    let mut counter = vec![String::new(); width];
    counter[0] = row_count_formula();
    vec![counter, header_row()]
}

/// Counts filled cells in the always-populated routing key column.
fn row_count_formula() -> String {
    let column = column_letter(
        ContextField::ALL
            .iter()
            .position(|&f| f == ContextField::RoutingKey)
            .unwrap_or(0),
    );
    format!("=COUNTA({column}{FIRST_DATA_ROW}:{column})")
}

/// 0-based column index to A1 letters (`0` → `A`, `26` → `AA`).
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Tab name for a routing key.
///
/// Forbidden characters and `%` are percent-escaped, so distinct keys map to
/// distinct names up to the length cap. Plain Slack channel ids pass through
/// unchanged.
pub fn partition_name(routing_key: &str) -> String {
    let mut escaped = String::with_capacity(routing_key.len());
    for c in routing_key.trim().chars() {
        if c == '%' || FORBIDDEN_NAME_CHARS.contains(&c) {
            escaped.push_str(&format!("%{:02X}", u32::from(c)));
        } else {
            escaped.push(c);
        }
    }
    let capped: String = escaped.chars().take(MAX_NAME_CHARS).collect();
    if capped.is_empty() {
        "unknown".to_string()
    } else {
        capped
    }
}

/// Compare ignoring trailing empty cells and rows.
fn same_cells(a: &[Vec<String>], b: &[Vec<String>]) -> bool {
    fn trimmed(rows: &[Vec<String>]) -> Vec<Vec<&str>> {
        let mut out: Vec<Vec<&str>> = rows
            .iter()
            .map(|r| {
                let end = r.iter().rposition(|c| !c.is_empty()).map_or(0, |i| i + 1);
                r[..end].iter().map(String::as_str).collect()
            })
            .collect();
        while out.last().is_some_and(|r| r.is_empty()) {
            out.pop();
        }
        out
    }
    trimmed(a) == trimmed(b)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::extract::schema::{ExtractedRecord, SchemaField};
    use crate::pipeline::types::RecordContext;
    use crate::sheets::memory::MemorySheetStore;

    fn record(name: &str) -> NormalizedRecord {
        NormalizedRecord::new(
            RecordContext {
                routing_key: "C1".into(),
                ..Default::default()
            },
            ExtractedRecord::empty().with(SchemaField::Name, name),
        )
    }

    #[test]
    fn column_letters() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(3), "D");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(27), "AB");
    }

    #[test]
    fn partition_name_escapes_forbidden_characters() {
        assert_eq!(partition_name("C0123"), "C0123");
        assert_eq!(partition_name("a/b:c"), "a%2Fb%3Ac");
        assert_eq!(partition_name("  "), "unknown");
    }

    #[test]
    fn distinct_routing_keys_get_distinct_partitions() {
        let keys = ["a/b", "a_b", "a%2Fb", "a:b", "a[b]"];
        let names: HashSet<String> = keys.iter().map(|k| partition_name(k)).collect();
        assert_eq!(names.len(), keys.len());
    }

    #[test]
    fn header_rows_have_formula_and_labels() {
        let rows = header_rows();
        assert_eq!(rows.len(), HEADER_ROWS);
        assert_eq!(rows[0][0], "=COUNTA(D3:D)");
        assert_eq!(rows[0].len(), column_count());
        assert_eq!(rows[1], header_row());
    }

    #[tokio::test]
    async fn resolve_creates_partition_with_header() {
        let store = Arc::new(MemorySheetStore::new());
        let router = SheetRouter::new(store.clone());
        let handle = router.resolve_partition("C1").await.unwrap();
        assert_eq!(handle.name, "C1");
        assert_eq!(store.rows("C1").await.unwrap(), header_rows());
    }

    #[tokio::test]
    async fn resolve_reuses_partition_and_heals_header() {
        let store = Arc::new(MemorySheetStore::new());
        let first = store.create_partition("C1").await.unwrap();
        store
            .write_rows(&first, vec![vec!["stale".into()], vec!["old header".into()]])
            .await
            .unwrap();
        store
            .append_row(&first, FIRST_DATA_ROW, vec!["existing".into()])
            .await
            .unwrap();

        let router = SheetRouter::new(store.clone());
        let handle = router.resolve_partition("C1").await.unwrap();
        assert_eq!(handle, first);

        let rows = store.rows("C1").await.unwrap();
        assert_eq!(&rows[..2], header_rows().as_slice());
        assert_eq!(rows[2], vec!["existing".to_string()]);
        assert_eq!(store.partition_names().await, vec!["C1".to_string()]);
    }

    /// Reports a partition as missing on the first lookup, as a writer that
    /// lost the race to create it would see.
    struct LateLookupStore {
        inner: MemorySheetStore,
        first_lookup: AtomicBool,
    }

    #[async_trait]
    impl SheetStore for LateLookupStore {
        async fn find_partition(&self, name: &str) -> Result<Option<PartitionHandle>, SheetsError> {
            if self.first_lookup.swap(false, Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.find_partition(name).await
        }

        async fn create_partition(&self, name: &str) -> Result<PartitionHandle, SheetsError> {
            self.inner.create_partition(name).await
        }

        async fn read_rows(
            &self,
            partition: &PartitionHandle,
            row_count: usize,
        ) -> Result<Vec<Vec<String>>, SheetsError> {
            self.inner.read_rows(partition, row_count).await
        }

        async fn write_rows(
            &self,
            partition: &PartitionHandle,
            rows: Vec<Vec<String>>,
        ) -> Result<(), SheetsError> {
            self.inner.write_rows(partition, rows).await
        }

        async fn append_row(
            &self,
            partition: &PartitionHandle,
            first_data_row: usize,
            row: Vec<String>,
        ) -> Result<(), SheetsError> {
            self.inner.append_row(partition, first_data_row, row).await
        }
    }

    #[tokio::test]
    async fn concurrently_created_partition_is_adopted() {
        let store = Arc::new(LateLookupStore {
            inner: MemorySheetStore::new(),
            first_lookup: AtomicBool::new(true),
        });
        let existing = store.inner.create_partition("C1").await.unwrap();
        let router = SheetRouter::new(store.clone());
        router.append_record(&existing, &record("A")).await.unwrap();

        let handle = router.resolve_partition("C1").await.unwrap();
        assert_eq!(handle, existing);
        router.append_record(&handle, &record("B")).await.unwrap();

        let rows = store.inner.rows("C1").await.unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[2], record("A").to_row());
        assert_eq!(rows[3], record("B").to_row());
    }

    #[tokio::test]
    async fn create_failure_without_partition_is_surfaced() {
        let store = Arc::new(MemorySheetStore::new());
        store.set_fail_writes(true);
        let router = SheetRouter::new(store.clone());
        assert!(router.resolve_partition("C1").await.is_err());
        assert!(store.partition_names().await.is_empty());
    }

    #[tokio::test]
    async fn append_keeps_existing_rows_in_order() {
        let store = Arc::new(MemorySheetStore::new());
        let router = SheetRouter::new(store.clone());
        let handle = router.resolve_partition("C1").await.unwrap();
        router.append_record(&handle, &record("A")).await.unwrap();
        router.append_record(&handle, &record("B")).await.unwrap();

        let rows = store.rows("C1").await.unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[2], record("A").to_row());
        assert_eq!(rows[3], record("B").to_row());
    }

    #[tokio::test]
    async fn append_failure_is_surfaced() {
        let store = Arc::new(MemorySheetStore::new());
        let router = SheetRouter::new(store.clone());
        let handle = router.resolve_partition("C1").await.unwrap();
        store.set_fail_writes(true);
        assert!(router.append_record(&handle, &record("A")).await.is_err());
    }

    #[test]
    fn same_cells_ignores_trailing_blanks() {
        let a = vec![vec!["x".to_string(), String::new()], vec![]];
        let b = vec![vec!["x".to_string()]];
        assert!(same_cells(&a, &b));
        assert!(!same_cells(&a, &[vec!["y".to_string()]]));
    }
}
