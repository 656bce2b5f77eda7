mod encoder;
mod error;
mod heap_file;

use std::path::Path;
use std::sync::Arc;

pub use encoder::HeapFileEncoder;
pub use error::{StorageError, StorageResult};
pub use heap_file::{HeapFile, HeapFileIterator};

use crate::buffer::{BufferPool, PageRef, TransactionId};
use crate::record::{HeapPage, Record, TableSchema};

/// Page size in bytes, shared by every file in the process
pub const PAGE_SIZE: usize = 4096;

/// Stable identifier of a table's backing file
pub type TableId = u64;

/// Address of a page: owning table plus page number within its file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageId {
    pub table_id: TableId,
    pub page_number: usize,
}

impl PageId {
    pub fn new(table_id: TableId, page_number: usize) -> Self {
        Self {
            table_id,
            page_number,
        }
    }

    /// Byte offset of this page in its backing file
    pub fn offset(&self) -> u64 {
        (self.page_number * PAGE_SIZE) as u64
    }
}

/// A storage kind the buffer pool and query operators can work with.
///
/// Pages are read and written through the file, but every access made on
/// behalf of a transaction goes through the [`BufferPool`].
pub trait DbFile: Send + Sync {
    fn id(&self) -> TableId;

    fn schema(&self) -> &TableSchema;

    /// Path of the backing file
    fn file_path(&self) -> &Path;

    fn page_count(&self) -> StorageResult<usize>;

    fn read_page(&self, pid: PageId) -> StorageResult<HeapPage>;

    fn write_page(&self, page: &HeapPage) -> StorageResult<()>;

    /// Add `record` to the file, returning the pages it dirtied
    fn insert_record(
        &self,
        tid: TransactionId,
        record: &mut Record,
        pool: &BufferPool,
    ) -> StorageResult<Vec<PageRef>>;

    /// Remove `record` (located by its record id), returning the pages it dirtied
    fn delete_record(
        &self,
        tid: TransactionId,
        record: &Record,
        pool: &BufferPool,
    ) -> StorageResult<Vec<PageRef>>;

    /// Sequential scan over every record, for `tid`
    fn iterator(self: Arc<Self>, tid: TransactionId, pool: Arc<BufferPool>)
    -> Box<dyn DbFileIterator>;
}

/// Restartable cursor over the records of a [`DbFile`]
pub trait DbFileIterator {
    fn open(&mut self) -> StorageResult<()>;

    fn has_next(&mut self) -> StorageResult<bool>;

    /// Next record; [`StorageError::NoSuchElement`] when none is pending
    fn next(&mut self) -> StorageResult<Record>;

    fn rewind(&mut self) -> StorageResult<()>;

    fn close(&mut self);
}
