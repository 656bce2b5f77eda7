use std::io;
use thiserror::Error;

use super::TableId;
use crate::buffer::TransactionId;
use crate::record::RecordError;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("table {table_id} page {page_number} is invalid")]
    InvalidPage { table_id: TableId, page_number: usize },

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Record not in file: {0}")]
    RecordNotInFile(String),

    #[error("No more records")]
    NoSuchElement,

    #[error("Transaction {0} aborted")]
    TransactionAborted(TransactionId),

    #[error("Buffer pool is full of dirty pages")]
    BufferPoolFull,

    #[error("No table with id {0}")]
    TableNotFound(TableId),

    #[error("Encode error: {0}")]
    Encode(String),
}

pub type StorageResult<T> = Result<T, StorageError>;
