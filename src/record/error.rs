use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Invalid slot: page={0}, slot={1}")]
    InvalidSlot(usize, usize),

    #[error("Page full: page={0}")]
    PageFull(usize),

    #[error("Slot already free: page={0}, slot={1}")]
    SlotAlreadyFree(usize, usize),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("NULL value for NOT NULL column: {0}")]
    NullConstraintViolation(String),

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },
}

pub type RecordResult<T> = Result<T, RecordError>;
