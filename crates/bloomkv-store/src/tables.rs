//! Redb table layout: one table per bucket, raw key bytes to raw value bytes.

use redb::{ReadTransaction, ReadOnlyTable, TableDefinition, TableError};

/// Key and value type of every bucket table
pub type BucketTable<'a> = TableDefinition<'a, &'static [u8], &'static [u8]>;

/// Table definition for the bucket named `name`
#[must_use]
pub const fn bucket(name: &str) -> BucketTable<'_> {
    TableDefinition::new(name)
}

/// Open a bucket table for reading; `None` if the bucket has no table yet
/// (never written, or dropped by a flush).
pub fn open_read(
    txn: &ReadTransaction,
    name: &str,
) -> Result<Option<ReadOnlyTable<&'static [u8], &'static [u8]>>, TableError> {
    match txn.open_table(bucket(name)) {
        Ok(table) => Ok(Some(table)),
        Err(TableError::TableDoesNotExist(_)) => Ok(None),
        Err(e) => Err(e),
    }
}
