use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use super::error::{StorageError, StorageResult};
use super::{DbFile, DbFileIterator, PAGE_SIZE, PageId, TableId};
use crate::buffer::{BufferPool, PageRef, Permission, TransactionId};
use crate::record::{HeapPage, Record, RecordError, SlotId, TableSchema};

// Fixed seeds so a path hashes to the same table id in every run
const TABLE_ID_SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

/// Unordered collection of fixed-schema records stored in `PAGE_SIZE` pages
/// of a single file.
///
/// The file has no header: page `i` occupies bytes `[i * PAGE_SIZE, (i + 1) * PAGE_SIZE)`
/// and any trailing partial page is ignored. No file handle is kept open
/// between calls and no page is cached here; caching belongs to the
/// [`BufferPool`].
#[derive(Debug)]
pub struct HeapFile {
    path: PathBuf,
    schema: Arc<TableSchema>,
    id: TableId,
    // Held only while re-checking the page count and appending a page
    grow: Mutex<()>,
}

impl HeapFile {
    /// Bind to an existing file
    pub fn open<P: AsRef<Path>>(path: P, schema: TableSchema) -> StorageResult<Self> {
        let path = path.as_ref().canonicalize()?;
        let id = Self::table_id_for(&path);
        Ok(Self {
            path,
            schema: Arc::new(schema),
            id,
            grow: Mutex::new(()),
        })
    }

    /// Create an empty (zero page) file and bind to it
    pub fn create<P: AsRef<Path>>(path: P, schema: TableSchema) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new().write(true).create_new(true).open(path)?;
        Self::open(path, schema)
    }

    pub fn open_or_create<P: AsRef<Path>>(path: P, schema: TableSchema) -> StorageResult<Self> {
        if path.as_ref().exists() {
            Self::open(path, schema)
        } else {
            Self::create(path, schema)
        }
    }

    /// Table id for a canonical file path
    pub fn table_id_for(path: &Path) -> TableId {
        let [k0, k1, k2, k3] = TABLE_ID_SEEDS;
        ahash::RandomState::with_seeds(k0, k1, k2, k3).hash_one(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn invalid_page(pid: PageId) -> StorageError {
        StorageError::InvalidPage {
            table_id: pid.table_id,
            page_number: pid.page_number,
        }
    }

    /// Raw bytes of page `pid`.
    ///
    /// Out-of-range page numbers and short reads are `InvalidPage`; every
    /// other failure to open, seek or read is `Io`.
    pub fn read_page_data(&self, pid: PageId) -> StorageResult<Vec<u8>> {
        if pid.table_id != self.id {
            return Err(Self::invalid_page(pid));
        }

        let mut file = File::open(&self.path)?;
        let page_count = file.metadata()?.len() / PAGE_SIZE as u64;
        if pid.page_number as u64 >= page_count {
            return Err(Self::invalid_page(pid));
        }

        file.seek(SeekFrom::Start(pid.offset()))?;
        let mut data = vec![0u8; PAGE_SIZE];
        match file.read_exact(&mut data) {
            Ok(()) => Ok(data),
            // Truncated since the length check
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(Self::invalid_page(pid)),
            Err(e) => Err(e.into()),
        }
    }

    /// Write one all-free page at the end of the file. Caller holds `grow`.
    fn append_empty_page(&self) -> StorageResult<usize> {
        let page_number = self.page_count()?;
        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        file.seek(SeekFrom::Start(PageId::new(self.id, page_number).offset()))?;
        file.write_all(&HeapPage::empty_page_data())?;
        Ok(page_number)
    }
}

impl DbFile for HeapFile {
    fn id(&self) -> TableId {
        self.id
    }

    fn schema(&self) -> &TableSchema {
        &self.schema
    }

    fn file_path(&self) -> &Path {
        &self.path
    }

    fn page_count(&self) -> StorageResult<usize> {
        let len = std::fs::metadata(&self.path)?.len();
        Ok((len / PAGE_SIZE as u64) as usize)
    }

    fn read_page(&self, pid: PageId) -> StorageResult<HeapPage> {
        let data = self.read_page_data(pid)?;
        Ok(HeapPage::new(pid, data, Arc::clone(&self.schema))?)
    }

    /// Pages may be rewritten in place or appended at `page_count()`
    fn write_page(&self, page: &HeapPage) -> StorageResult<()> {
        let pid = page.id();
        if pid.table_id != self.id || pid.page_number > self.page_count()? {
            return Err(Self::invalid_page(pid));
        }

        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        file.seek(SeekFrom::Start(pid.offset()))?;
        file.write_all(page.page_data())?;
        Ok(())
    }

    /// First fit by ascending page number; a page is appended only when every
    /// existing page is full.
    fn insert_record(
        &self,
        tid: TransactionId,
        record: &mut Record,
        pool: &BufferPool,
    ) -> StorageResult<Vec<PageRef>> {
        self.schema.validate_record(record.values())?;

        let mut first = 0;
        loop {
            let page_count = self.page_count()?;
            for page_number in first..page_count {
                let pid = PageId::new(self.id, page_number);
                let page = pool.get_page(tid, pid, Permission::ReadWrite)?;
                let has_room = page.read().first_free_slot().is_some();
                if has_room {
                    page.write().insert_record(record)?;
                    return Ok(vec![page]);
                }
            }

            let _grow = self.grow.lock();
            // Another inserter may have appended while we searched
            if self.page_count()? == page_count {
                self.append_empty_page()?;
            }
            first = page_count;
        }
    }

    fn delete_record(
        &self,
        tid: TransactionId,
        record: &Record,
        pool: &BufferPool,
    ) -> StorageResult<Vec<PageRef>> {
        let rid = record
            .record_id()
            .ok_or_else(|| StorageError::RecordNotInFile("record has no record id".to_string()))?;
        if rid.page_id.table_id != self.id {
            return Err(StorageError::RecordNotInFile(format!(
                "record belongs to table {}, not {}",
                rid.page_id.table_id, self.id
            )));
        }
        if rid.page_id.page_number >= self.page_count()? {
            return Err(StorageError::RecordNotInFile(format!(
                "page {} does not exist",
                rid.page_id.page_number
            )));
        }

        let page = pool.get_page(tid, rid.page_id, Permission::ReadWrite)?;
        page.write().delete_record(rid).map_err(|e| match e {
            RecordError::SlotAlreadyFree(..) | RecordError::InvalidSlot(..) => {
                StorageError::RecordNotInFile(e.to_string())
            }
            other => other.into(),
        })?;
        Ok(vec![page])
    }

    fn iterator(
        self: Arc<Self>,
        tid: TransactionId,
        pool: Arc<BufferPool>,
    ) -> Box<dyn DbFileIterator> {
        Box::new(HeapFileIterator::new(self, tid, pool))
    }
}

/// Position within one cached page
struct PageCursor {
    page: PageRef,
    next_slot: SlotId,
}

impl PageCursor {
    fn new(page: PageRef) -> Self {
        Self { page, next_slot: 0 }
    }

    fn has_pending(&self) -> bool {
        self.page.read().next_used_slot(self.next_slot).is_some()
    }

    fn next(&mut self) -> StorageResult<Option<Record>> {
        let page = self.page.read();
        let Some(slot) = page.next_used_slot(self.next_slot) else {
            return Ok(None);
        };
        self.next_slot = slot + 1;
        Ok(page.record(slot)?)
    }
}

enum ScanState {
    Closed,
    Open {
        page_number: usize,
        cursor: Option<PageCursor>,
    },
}

/// Sequential scan over a [`HeapFile`], one page at a time.
///
/// Pages are fetched read-only through the buffer pool on behalf of the
/// iterator's transaction. Records come out in `(page, slot)` order. The
/// iterator holds no locks of its own; closing it releases nothing.
pub struct HeapFileIterator {
    file: Arc<HeapFile>,
    tid: TransactionId,
    pool: Arc<BufferPool>,
    state: ScanState,
}

impl HeapFileIterator {
    pub fn new(file: Arc<HeapFile>, tid: TransactionId, pool: Arc<BufferPool>) -> Self {
        Self {
            file,
            tid,
            pool,
            state: ScanState::Closed,
        }
    }

    fn fetch_cursor(
        file: &HeapFile,
        pool: &BufferPool,
        tid: TransactionId,
        page_number: usize,
    ) -> StorageResult<PageCursor> {
        let pid = PageId::new(file.id(), page_number);
        let page = pool.get_page(tid, pid, Permission::ReadOnly)?;
        Ok(PageCursor::new(page))
    }
}

impl DbFileIterator for HeapFileIterator {
    fn open(&mut self) -> StorageResult<()> {
        let cursor = if self.file.page_count()? > 0 {
            Some(Self::fetch_cursor(&self.file, &self.pool, self.tid, 0)?)
        } else {
            None
        };
        self.state = ScanState::Open {
            page_number: 0,
            cursor,
        };
        Ok(())
    }

    fn has_next(&mut self) -> StorageResult<bool> {
        let Self {
            file,
            tid,
            pool,
            state,
        } = self;
        let ScanState::Open {
            page_number,
            cursor,
        } = state
        else {
            return Ok(false);
        };

        loop {
            let Some(current) = cursor.as_mut() else {
                return Ok(false);
            };
            if current.has_pending() {
                return Ok(true);
            }

            *page_number += 1;
            if *page_number >= file.page_count()? {
                *cursor = None;
                return Ok(false);
            }
            *cursor = Some(Self::fetch_cursor(file, pool, *tid, *page_number)?);
        }
    }

    fn next(&mut self) -> StorageResult<Record> {
        if !self.has_next()? {
            return Err(StorageError::NoSuchElement);
        }
        match &mut self.state {
            ScanState::Open {
                cursor: Some(cursor),
                ..
            } => cursor.next()?.ok_or(StorageError::NoSuchElement),
            _ => Err(StorageError::NoSuchElement),
        }
    }

    fn rewind(&mut self) -> StorageResult<()> {
        self.close();
        self.open()
    }

    fn close(&mut self) {
        self.state = ScanState::Closed;
    }
}
