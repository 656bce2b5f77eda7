use std::fmt;

use super::error::{RecordError, RecordResult};
use super::schema::TableSchema;
use super::value::Value;
use crate::file::PageId;

/// Slot index within a page
pub type SlotId = usize;

/// Physical address of a record: page plus slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: SlotId,
}

impl RecordId {
    pub fn new(page_id: PageId, slot: SlotId) -> Self {
        Self { page_id, slot }
    }
}

/// A single record (row). Carries its [`RecordId`] once it has been read
/// from, or inserted into, a page.
#[derive(Debug, Clone)]
pub struct Record {
    values: Vec<Value>,
    record_id: Option<RecordId>,
}

impl Record {
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            values,
            record_id: None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, record_id: Option<RecordId>) {
        self.record_id = record_id;
    }

    /// Serialize according to `schema`: NULL bitmap, then each column
    pub fn serialize(&self, schema: &TableSchema) -> RecordResult<Vec<u8>> {
        schema.validate_record(&self.values)?;

        let mut result = Vec::with_capacity(schema.record_size());

        let mut bitmap = vec![0u8; schema.null_bitmap_size()];
        for (i, value) in self.values.iter().enumerate() {
            if value.is_null() {
                bitmap[i / 8] |= 1 << (i % 8);
            }
        }
        result.extend_from_slice(&bitmap);

        for (value, col) in self.values.iter().zip(schema.columns()) {
            result.extend_from_slice(&value.serialize(&col.data_type)?);
        }

        Ok(result)
    }

    pub fn deserialize(data: &[u8], schema: &TableSchema) -> RecordResult<Self> {
        if data.len() != schema.record_size() {
            return Err(RecordError::Deserialization(format!(
                "Expected {} bytes, got {}",
                schema.record_size(),
                data.len()
            )));
        }

        let bitmap_size = schema.null_bitmap_size();
        let bitmap = &data[..bitmap_size];
        let mut offset = bitmap_size;
        let mut values = Vec::with_capacity(schema.column_count());

        for (i, col) in schema.columns().iter().enumerate() {
            let is_null = bitmap[i / 8] & (1 << (i % 8)) != 0;
            let col_data = &data[offset..offset + col.size()];
            values.push(Value::deserialize(col_data, &col.data_type, is_null)?);
            offset += col.size();
        }

        Ok(Record::new(values))
    }
}

// Two records are equal when their values are; the address is not part of identity.
impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, "\t")?;
            }
            write!(f, "{}", value)?;
        }
        Ok(())
    }
}
