pub mod buffer;
pub mod catalog;
pub mod database;
pub mod execution;
pub mod file;
pub mod record;

pub use buffer::{BufferPool, LockManager, PageRef, Permission, TransactionId};
pub use catalog::{Catalog, CatalogError, CatalogResult};
pub use database::{Database, DatabaseConfig, DatabaseError, DatabaseResult};
pub use execution::SeqScan;
pub use file::{
    DbFile, DbFileIterator, HeapFile, HeapFileEncoder, HeapFileIterator, PAGE_SIZE, PageId,
    StorageError, StorageResult, TableId,
};
pub use record::{
    ColumnDef, DataType, HeapPage, Record, RecordError, RecordId, RecordResult, TableSchema, Value,
};
