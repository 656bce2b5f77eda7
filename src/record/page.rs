use std::sync::Arc;

use super::error::{RecordError, RecordResult};
use super::record::{Record, RecordId, SlotId};
use super::schema::TableSchema;
use crate::buffer::TransactionId;
use crate::file::{PAGE_SIZE, PageId};

/// A heap page: a slot bitmap followed by fixed-size record slots.
///
/// Layout of the `PAGE_SIZE` bytes:
///
/// ```text
/// [header: ceil(K/8) bytes][slot 0][slot 1]...[slot K-1][zero padding]
/// ```
///
/// where `K = floor(PAGE_SIZE * 8 / (record_size * 8 + 1))`, i.e. each slot
/// costs its record bytes plus one header bit. Bit `i % 8` of header byte
/// `i / 8` (least significant first) is set when slot `i` is occupied.
///
/// The page owns its raw bytes and decodes records on demand.
#[derive(Debug, Clone)]
pub struct HeapPage {
    pid: PageId,
    schema: Arc<TableSchema>,
    data: Vec<u8>,
    num_slots: usize,
    dirtier: Option<TransactionId>,
}

impl HeapPage {
    /// Number of record slots that fit on a page
    pub fn slots_per_page(record_size: usize) -> usize {
        if record_size == 0 {
            return 0;
        }
        (PAGE_SIZE * 8) / (record_size * 8 + 1)
    }

    /// Header bytes needed to hold one bit per slot
    pub fn header_size(num_slots: usize) -> usize {
        num_slots.div_ceil(8)
    }

    /// Bytes of a page with every slot free
    pub fn empty_page_data() -> Vec<u8> {
        vec![0u8; PAGE_SIZE]
    }

    /// Decode a page from exactly `PAGE_SIZE` bytes
    pub fn new(pid: PageId, data: Vec<u8>, schema: Arc<TableSchema>) -> RecordResult<Self> {
        if data.len() != PAGE_SIZE {
            return Err(RecordError::Deserialization(format!(
                "Page must be {} bytes, got {}",
                PAGE_SIZE,
                data.len()
            )));
        }

        let num_slots = Self::slots_per_page(schema.record_size());
        if num_slots == 0 {
            return Err(RecordError::Serialization(format!(
                "Record size {} does not fit in a page",
                schema.record_size()
            )));
        }

        Ok(Self {
            pid,
            schema,
            data,
            num_slots,
            dirtier: None,
        })
    }

    /// A page with every slot free
    pub fn empty(pid: PageId, schema: Arc<TableSchema>) -> RecordResult<Self> {
        Self::new(pid, Self::empty_page_data(), schema)
    }

    pub fn id(&self) -> PageId {
        self.pid
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Raw page bytes, as they are written to the backing file
    pub fn page_data(&self) -> &[u8] {
        &self.data
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    pub fn num_empty_slots(&self) -> usize {
        (0..self.num_slots)
            .filter(|&slot| !self.is_slot_used(slot))
            .count()
    }

    pub fn is_slot_used(&self, slot: SlotId) -> bool {
        if slot >= self.num_slots {
            return false;
        }
        self.data[slot / 8] & (1 << (slot % 8)) != 0
    }

    fn set_slot_used(&mut self, slot: SlotId, used: bool) {
        let mask = 1u8 << (slot % 8);
        if used {
            self.data[slot / 8] |= mask;
        } else {
            self.data[slot / 8] &= !mask;
        }
    }

    /// Lowest free slot, if any
    pub fn first_free_slot(&self) -> Option<SlotId> {
        (0..self.num_slots).find(|&slot| !self.is_slot_used(slot))
    }

    /// Lowest occupied slot at or after `from`
    pub fn next_used_slot(&self, from: SlotId) -> Option<SlotId> {
        (from..self.num_slots).find(|&slot| self.is_slot_used(slot))
    }

    fn slot_range(&self, slot: SlotId) -> std::ops::Range<usize> {
        let record_size = self.schema.record_size();
        let start = Self::header_size(self.num_slots) + slot * record_size;
        start..start + record_size
    }

    /// Decode the record in `slot`, `None` when the slot is free
    pub fn record(&self, slot: SlotId) -> RecordResult<Option<Record>> {
        if slot >= self.num_slots {
            return Err(RecordError::InvalidSlot(self.pid.page_number, slot));
        }
        if !self.is_slot_used(slot) {
            return Ok(None);
        }

        let mut record = Record::deserialize(&self.data[self.slot_range(slot)], &self.schema)?;
        record.set_record_id(Some(RecordId::new(self.pid, slot)));
        Ok(Some(record))
    }

    /// Store `record` in the lowest free slot and stamp its new address on it.
    /// The record is validated before any byte is touched.
    pub fn insert_record(&mut self, record: &mut Record) -> RecordResult<RecordId> {
        let bytes = record.serialize(&self.schema)?;
        let slot = self
            .first_free_slot()
            .ok_or(RecordError::PageFull(self.pid.page_number))?;

        let range = self.slot_range(slot);
        self.data[range].copy_from_slice(&bytes);
        self.set_slot_used(slot, true);

        let rid = RecordId::new(self.pid, slot);
        record.set_record_id(Some(rid));
        Ok(rid)
    }

    /// Free the slot addressed by `rid`
    pub fn delete_record(&mut self, rid: RecordId) -> RecordResult<()> {
        if rid.page_id != self.pid || rid.slot >= self.num_slots {
            return Err(RecordError::InvalidSlot(rid.page_id.page_number, rid.slot));
        }
        if !self.is_slot_used(rid.slot) {
            return Err(RecordError::SlotAlreadyFree(self.pid.page_number, rid.slot));
        }

        self.set_slot_used(rid.slot, false);
        let range = self.slot_range(rid.slot);
        self.data[range].fill(0);
        Ok(())
    }

    /// Transaction that last dirtied this page, `None` when clean
    pub fn dirtier(&self) -> Option<TransactionId> {
        self.dirtier
    }

    pub fn mark_dirty(&mut self, tid: Option<TransactionId>) {
        self.dirtier = tid;
    }

    /// Occupied records in slot order, decoded lazily
    pub fn iter(&self) -> PageRecords<'_> {
        PageRecords {
            page: self,
            next_slot: 0,
        }
    }
}

/// Lazy iterator over the occupied slots of a [`HeapPage`]
pub struct PageRecords<'a> {
    page: &'a HeapPage,
    next_slot: SlotId,
}

impl Iterator for PageRecords<'_> {
    type Item = RecordResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.page.next_used_slot(self.next_slot)?;
        self.next_slot = slot + 1;
        self.page.record(slot).transpose()
    }
}
