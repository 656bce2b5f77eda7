use std::time::{Duration, Instant};

use ahash::{AHashMap, AHashSet};
use parking_lot::{Condvar, Mutex};

use super::transaction::{Permission, TransactionId};
use crate::file::{PageId, StorageError, StorageResult};

/// Holders of one page lock
#[derive(Debug, Default)]
struct LockState {
    shared: AHashSet<TransactionId>,
    exclusive: Option<TransactionId>,
}

impl LockState {
    fn is_free(&self) -> bool {
        self.shared.is_empty() && self.exclusive.is_none()
    }

    /// Transactions other than `tid` whose locks prevent granting `perm`
    fn blockers(&self, tid: TransactionId, perm: Permission) -> AHashSet<TransactionId> {
        let mut blockers = AHashSet::new();
        if let Some(holder) = self.exclusive
            && holder != tid
        {
            blockers.insert(holder);
        }
        if perm == Permission::ReadWrite {
            blockers.extend(self.shared.iter().copied().filter(|&t| t != tid));
        }
        blockers
    }
}

#[derive(Debug, Default)]
struct LockTable {
    locks: AHashMap<PageId, LockState>,
    held: AHashMap<TransactionId, AHashSet<PageId>>,
    waits_for: AHashMap<TransactionId, AHashSet<TransactionId>>,
}

impl LockTable {
    fn blockers(&self, tid: TransactionId, pid: PageId, perm: Permission) -> AHashSet<TransactionId> {
        self.locks
            .get(&pid)
            .map(|state| state.blockers(tid, perm))
            .unwrap_or_default()
    }

    fn grant(&mut self, tid: TransactionId, pid: PageId, perm: Permission) {
        let state = self.locks.entry(pid).or_default();
        match perm {
            Permission::ReadOnly => {
                if state.exclusive != Some(tid) {
                    state.shared.insert(tid);
                }
            }
            Permission::ReadWrite => {
                state.shared.remove(&tid);
                state.exclusive = Some(tid);
            }
        }
        self.held.entry(tid).or_default().insert(pid);
    }

    fn release(&mut self, tid: TransactionId, pid: PageId) {
        if let Some(state) = self.locks.get_mut(&pid) {
            state.shared.remove(&tid);
            if state.exclusive == Some(tid) {
                state.exclusive = None;
            }
            if state.is_free() {
                self.locks.remove(&pid);
            }
        }
    }

    /// Whether `start` can reach itself through wait-for edges
    fn in_cycle(&self, start: TransactionId) -> bool {
        let mut visited = AHashSet::new();
        let mut stack: Vec<TransactionId> = self
            .waits_for
            .get(&start)
            .map(|edges| edges.iter().copied().collect())
            .unwrap_or_default();

        while let Some(tid) = stack.pop() {
            if tid == start {
                return true;
            }
            if !visited.insert(tid) {
                continue;
            }
            if let Some(edges) = self.waits_for.get(&tid) {
                stack.extend(edges.iter().copied());
            }
        }
        false
    }
}

/// Page-granular shared/exclusive locks, held per transaction.
///
/// A blocked request waits until the conflicting locks are released, its
/// timeout expires, or it closes a cycle in the wait-for graph. The last two
/// abort the requesting transaction.
pub struct LockManager {
    table: Mutex<LockTable>,
    released: Condvar,
    timeout: Duration,
}

impl LockManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            table: Mutex::new(LockTable::default()),
            released: Condvar::new(),
            timeout,
        }
    }

    /// Block until `tid` holds `perm` on `pid`. Re-entrant; a sole shared
    /// holder is upgraded in place.
    pub fn acquire(&self, tid: TransactionId, pid: PageId, perm: Permission) -> StorageResult<()> {
        let deadline = Instant::now() + self.timeout;
        let mut table = self.table.lock();
        let mut timed_out = false;

        loop {
            let blockers = table.blockers(tid, pid, perm);
            if blockers.is_empty() {
                table.waits_for.remove(&tid);
                table.grant(tid, pid, perm);
                return Ok(());
            }

            table.waits_for.insert(tid, blockers);
            if timed_out || table.in_cycle(tid) {
                table.waits_for.remove(&tid);
                return Err(StorageError::TransactionAborted(tid));
            }

            timed_out = self
                .released
                .wait_until(&mut table, deadline)
                .timed_out();
        }
    }

    /// Drop `tid`'s lock on `pid`, whatever its mode
    pub fn release(&self, tid: TransactionId, pid: PageId) {
        let mut table = self.table.lock();
        table.release(tid, pid);
        if let Some(pages) = table.held.get_mut(&tid) {
            pages.remove(&pid);
            if pages.is_empty() {
                table.held.remove(&tid);
            }
        }
        self.released.notify_all();
    }

    /// Drop every lock held by `tid`
    pub fn release_all(&self, tid: TransactionId) {
        let mut table = self.table.lock();
        if let Some(pages) = table.held.remove(&tid) {
            for pid in pages {
                table.release(tid, pid);
            }
        }
        table.waits_for.remove(&tid);
        self.released.notify_all();
    }

    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.table
            .lock()
            .held
            .get(&tid)
            .is_some_and(|pages| pages.contains(&pid))
    }

    /// Strongest permission `tid` holds on `pid`
    #[cfg(test)]
    pub fn lock_mode(&self, tid: TransactionId, pid: PageId) -> Option<Permission> {
        let table = self.table.lock();
        let state = table.locks.get(&pid)?;
        if state.exclusive == Some(tid) {
            Some(Permission::ReadWrite)
        } else if state.shared.contains(&tid) {
            Some(Permission::ReadOnly)
        } else {
            None
        }
    }

    /// Pages on which `tid` holds any lock
    #[cfg(test)]
    pub fn locked_pages(&self, tid: TransactionId) -> Vec<PageId> {
        self.table
            .lock()
            .held
            .get(&tid)
            .map(|pages| pages.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn pid(n: usize) -> PageId {
        PageId::new(1, n)
    }

    #[test]
    fn test_shared_locks_are_compatible() {
        let lm = LockManager::new(Duration::from_millis(50));
        let (t1, t2) = (TransactionId::new(), TransactionId::new());

        lm.acquire(t1, pid(0), Permission::ReadOnly).unwrap();
        lm.acquire(t2, pid(0), Permission::ReadOnly).unwrap();
        assert!(lm.holds_lock(t1, pid(0)));
        assert!(lm.holds_lock(t2, pid(0)));
        assert_eq!(lm.lock_mode(t1, pid(0)), Some(Permission::ReadOnly));
    }

    #[test]
    fn test_exclusive_conflict_times_out() {
        let lm = LockManager::new(Duration::from_millis(50));
        let (t1, t2) = (TransactionId::new(), TransactionId::new());

        lm.acquire(t1, pid(0), Permission::ReadWrite).unwrap();
        let result = lm.acquire(t2, pid(0), Permission::ReadOnly);
        assert!(matches!(result, Err(StorageError::TransactionAborted(t)) if t == t2));
        assert!(!lm.holds_lock(t2, pid(0)));

        // Other pages are unaffected
        lm.acquire(t2, pid(1), Permission::ReadWrite).unwrap();
    }

    #[test]
    fn test_reentrant_and_upgrade() {
        let lm = LockManager::new(Duration::from_millis(50));
        let t1 = TransactionId::new();

        lm.acquire(t1, pid(0), Permission::ReadOnly).unwrap();
        lm.acquire(t1, pid(0), Permission::ReadOnly).unwrap();
        lm.acquire(t1, pid(0), Permission::ReadWrite).unwrap();
        assert_eq!(lm.lock_mode(t1, pid(0)), Some(Permission::ReadWrite));

        // Asking for less keeps the exclusive lock
        lm.acquire(t1, pid(0), Permission::ReadOnly).unwrap();
        assert_eq!(lm.lock_mode(t1, pid(0)), Some(Permission::ReadWrite));
    }

    #[test]
    fn test_upgrade_blocked_by_other_reader() {
        let lm = LockManager::new(Duration::from_millis(50));
        let (t1, t2) = (TransactionId::new(), TransactionId::new());

        lm.acquire(t1, pid(0), Permission::ReadOnly).unwrap();
        lm.acquire(t2, pid(0), Permission::ReadOnly).unwrap();
        assert!(lm.acquire(t1, pid(0), Permission::ReadWrite).is_err());

        lm.release(t2, pid(0));
        lm.acquire(t1, pid(0), Permission::ReadWrite).unwrap();
    }

    #[test]
    fn test_release_all_wakes_waiter() {
        let lm = Arc::new(LockManager::new(Duration::from_secs(5)));
        let (t1, t2) = (TransactionId::new(), TransactionId::new());

        lm.acquire(t1, pid(0), Permission::ReadWrite).unwrap();
        lm.acquire(t1, pid(1), Permission::ReadOnly).unwrap();
        assert_eq!(lm.locked_pages(t1).len(), 2);

        let waiter = {
            let lm = Arc::clone(&lm);
            thread::spawn(move || lm.acquire(t2, pid(0), Permission::ReadWrite))
        };
        thread::sleep(Duration::from_millis(50));
        lm.release_all(t1);

        waiter.join().unwrap().unwrap();
        assert!(lm.holds_lock(t2, pid(0)));
        assert!(lm.locked_pages(t1).is_empty());
    }

    #[test]
    fn test_upgrade_deadlock_aborts_one_transaction() {
        let lm = Arc::new(LockManager::new(Duration::from_secs(5)));
        let (t1, t2) = (TransactionId::new(), TransactionId::new());

        lm.acquire(t1, pid(0), Permission::ReadOnly).unwrap();
        lm.acquire(t2, pid(0), Permission::ReadOnly).unwrap();

        let first = {
            let lm = Arc::clone(&lm);
            thread::spawn(move || {
                let result = lm.acquire(t1, pid(0), Permission::ReadWrite);
                if result.is_err() {
                    lm.release_all(t1);
                }
                result.is_ok()
            })
        };
        thread::sleep(Duration::from_millis(100));

        let second = lm.acquire(t2, pid(0), Permission::ReadWrite);
        if second.is_err() {
            lm.release_all(t2);
        }
        let first = first.join().unwrap();

        assert!(first ^ second.is_ok(), "exactly one upgrade must win");
    }
}
