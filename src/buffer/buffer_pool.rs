use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use parking_lot::{Mutex, RwLock};

use super::lock_manager::LockManager;
use super::transaction::{Permission, TransactionId};
use crate::catalog::Catalog;
use crate::file::{DbFile, PageId, StorageError, StorageResult, TableId};
use crate::record::{HeapPage, Record, RecordId};

/// Shared handle to a cached page
pub type PageRef = Arc<RwLock<HeapPage>>;

/// Cache of decoded pages plus the per-transaction lock manager.
///
/// Every page access made for a transaction goes through [`BufferPool::get_page`],
/// which takes the page lock before touching the cache. Dirty pages stay
/// cached until their transaction completes (no steal): only clean pages are
/// evicted, least recently used first.
pub struct BufferPool {
    catalog: Arc<Catalog>,
    locks: LockManager,
    pages: Mutex<LruCache<PageId, PageRef>>,
    capacity: usize,
}

impl BufferPool {
    pub fn new(catalog: Arc<Catalog>, capacity: usize, lock_timeout: Duration) -> Self {
        Self {
            catalog,
            locks: LockManager::new(lock_timeout),
            pages: Mutex::new(LruCache::unbounded()),
            capacity: capacity.max(1),
        }
    }

    fn database_file(&self, table_id: TableId) -> StorageResult<Arc<dyn DbFile>> {
        self.catalog
            .database_file(table_id)
            .ok_or(StorageError::TableNotFound(table_id))
    }

    /// Fetch page `pid` for `tid` with `perm`, reading it from its file on a miss.
    ///
    /// Blocks while a conflicting lock is held; fails with `TransactionAborted`
    /// on deadlock or lock timeout.
    pub fn get_page(
        &self,
        tid: TransactionId,
        pid: PageId,
        perm: Permission,
    ) -> StorageResult<PageRef> {
        let already_held = self.locks.holds_lock(tid, pid);
        self.locks.acquire(tid, pid, perm)?;

        if let Some(page) = self.pages.lock().get(&pid) {
            return Ok(Arc::clone(page));
        }

        // A missing table or page must not keep the lock it was just granted
        let loaded = self
            .database_file(pid.table_id)
            .and_then(|file| file.read_page(pid));
        let page = match loaded {
            Ok(page) => Arc::new(RwLock::new(page)),
            Err(e) => {
                if !already_held {
                    self.locks.release(tid, pid);
                }
                return Err(e);
            }
        };

        let mut pages = self.pages.lock();
        // Another reader may have loaded it while the cache was unlocked
        if let Some(cached) = pages.get(&pid) {
            return Ok(Arc::clone(cached));
        }
        Self::make_room(&mut pages, self.capacity)?;
        pages.put(pid, Arc::clone(&page));
        Ok(page)
    }

    /// Evict clean pages, least recently used first, until one more fits
    fn make_room(pages: &mut LruCache<PageId, PageRef>, capacity: usize) -> StorageResult<()> {
        while pages.len() >= capacity {
            // Pages locked for writing are in use, skip them
            let victim = pages
                .iter()
                .rev()
                .find(|(_, page)| page.try_read().is_some_and(|p| p.dirtier().is_none()))
                .map(|(pid, _)| *pid)
                .ok_or(StorageError::BufferPoolFull)?;
            pages.pop(&victim);
        }
        Ok(())
    }

    /// Mark pages dirtied by `tid` and make sure the modified copies are the cached ones
    fn cache_dirty_pages(&self, tid: TransactionId, dirtied: Vec<PageRef>) -> StorageResult<()> {
        let mut pages = self.pages.lock();
        for page in dirtied {
            let pid = {
                let mut guard = page.write();
                guard.mark_dirty(Some(tid));
                guard.id()
            };
            if !pages.contains(&pid) {
                Self::make_room(&mut pages, self.capacity)?;
            }
            pages.put(pid, page);
        }
        Ok(())
    }

    /// Insert `record` into table `table_id` for `tid`; sets and returns its record id
    pub fn insert_record(
        &self,
        tid: TransactionId,
        table_id: TableId,
        record: &mut Record,
    ) -> StorageResult<RecordId> {
        let file = self.database_file(table_id)?;
        let dirtied = file.insert_record(tid, record, self)?;
        self.cache_dirty_pages(tid, dirtied)?;
        record
            .record_id()
            .ok_or_else(|| StorageError::RecordNotInFile("insert left no record id".to_string()))
    }

    /// Delete `record` (located by its record id) for `tid`
    pub fn delete_record(&self, tid: TransactionId, record: &Record) -> StorageResult<()> {
        let rid = record
            .record_id()
            .ok_or_else(|| StorageError::RecordNotInFile("record has no record id".to_string()))?;
        let file = self.database_file(rid.page_id.table_id)?;
        let dirtied = file.delete_record(tid, record, self)?;
        self.cache_dirty_pages(tid, dirtied)
    }

    /// End `tid`: on commit write its dirty pages to disk, on abort drop them
    /// so the next reader sees the on-disk version. Releases all of its locks.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> StorageResult<()> {
        let dirtied: Vec<PageId> = {
            let pages = self.pages.lock();
            pages
                .iter()
                .filter(|(_, page)| page.read().dirtier() == Some(tid))
                .map(|(pid, _)| *pid)
                .collect()
        };

        let result = if commit {
            dirtied.iter().try_for_each(|&pid| self.flush_page(pid))
        } else {
            let mut pages = self.pages.lock();
            for pid in &dirtied {
                pages.pop(pid);
            }
            Ok(())
        };

        self.locks.release_all(tid);
        result
    }

    /// Write page `pid` to its file if it is cached and dirty
    pub fn flush_page(&self, pid: PageId) -> StorageResult<()> {
        let Some(page) = self.pages.lock().peek(&pid).cloned() else {
            return Ok(());
        };

        let mut page = page.write();
        if page.dirtier().is_some() {
            self.database_file(pid.table_id)?.write_page(&page)?;
            page.mark_dirty(None);
        }
        Ok(())
    }

    /// Write every dirty page, whoever dirtied it
    pub fn flush_all_pages(&self) -> StorageResult<()> {
        let cached: Vec<PageId> = self.pages.lock().iter().map(|(pid, _)| *pid).collect();
        for pid in cached {
            self.flush_page(pid)?;
        }
        Ok(())
    }

    /// Drop page `pid` from the cache without writing it
    pub fn discard_page(&self, pid: PageId) {
        self.pages.lock().pop(&pid);
    }

    /// Empty the cache without writing anything. Committed changes are
    /// already on disk, so only uncommitted ones are lost.
    pub fn discard_all_pages(&self) {
        self.pages.lock().clear();
    }

    /// Release `tid`'s lock on `pid` before the transaction ends
    pub fn release_page(&self, tid: TransactionId, pid: PageId) {
        self.locks.release(tid, pid);
    }

    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.locks.holds_lock(tid, pid)
    }

    pub fn is_cached(&self, pid: PageId) -> bool {
        self.pages.lock().contains(&pid)
    }

    pub fn cached_page_count(&self) -> usize {
        self.pages.lock().len()
    }

    pub fn dirty_page_count(&self) -> usize {
        self.pages
            .lock()
            .iter()
            .filter(|(_, page)| page.read().dirtier().is_some())
            .count()
    }
}
