//! The shared, observable job store.
//!
//! [`StateStore`] is the single source of truth for job status.  It is an
//! explicit service: construct one, clone the handle into the orchestrator
//! and every observer.  There is no global instance.
//!
//! # Consistency
//!
//! * Writers are serialised by one lock; a merge is applied in full before
//!   any reader can see it, so snapshots are always pre- or post-merge.
//! * Subscribers are called once per committed merge, in commit order, on the
//!   thread that performed the merge.  Callbacks may read the store but must
//!   not merge into it synchronously (forward to a channel instead, see
//!   [`StateStore::subscribe_channel`]).
//!
//! # Sharing a file
//!
//! Several handles (in one process or many) may [`open`](StateStore::open)
//! the same file.  Every merge takes an exclusive advisory lock on
//! `<file>.lock`, reloads the file, applies the patch to what is on disk and
//! writes it back before unlocking.  Values another handle wrote since the
//! last merge are published first as an [`external`](StoreChange::external)
//! change.
//!
//! Each opened handle also holds a locked marker file under `<file>.owners/`
//! for as long as it lives, so jobs can record which handle runs them and
//! [`StateStore::is_owner_alive`] can tell a live job from an orphaned one.
//!
//! ```text
//! jobs.json          shared state
//! jobs.json.lock     merge lock
//! jobs.json.owners/  one locked <owner>.lock per open handle
//! ```

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use fs2::FileExt;
use tokio::sync::mpsc;

use super::change::{diff, Patch, StoreChange, StoreState};
use super::persist::{self, StoreError};

type Listener = Arc<dyn Fn(&StoreChange) + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

struct Committed {
    values: StoreState,
    seq: u64,
}

struct Inner {
    /// Held for the whole merge, including listener dispatch.
    writer: Mutex<()>,
    committed: RwLock<Committed>,
    listeners: Mutex<BTreeMap<u64, Listener>>,
    next_listener: Mutex<u64>,
    disk: Option<Disk>,
}

// ---------------------------------------------------------------------------
// Backing file
// ---------------------------------------------------------------------------

/// `path` with `suffix` appended to its file name.
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn open_lock_file(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
}

struct Disk {
    path: PathBuf,
    lock_path: PathBuf,
    owners_dir: PathBuf,
    owner: Owner,
}

impl Disk {
    fn attach(path: PathBuf) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let owners_dir = with_suffix(&path, ".owners");
        let owner = Owner::claim(&owners_dir)?;
        Ok(Self {
            lock_path: with_suffix(&path, ".lock"),
            owners_dir,
            owner,
            path,
        })
    }

    /// Block until this handle holds the merge lock.  Dropping the file
    /// releases it.
    fn acquire(&self) -> io::Result<File> {
        let file = open_lock_file(&self.lock_path)?;
        FileExt::lock_exclusive(&file)?;
        Ok(file)
    }
}

/// Liveness marker of one open handle.
struct Owner {
    id: String,
    marker: PathBuf,
    _file: File,
}

impl Owner {
    fn claim(dir: &Path) -> io::Result<Self> {
        static NEXT: AtomicU64 = AtomicU64::new(0);

        fs::create_dir_all(dir)?;
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let id = format!(
            "{}-{nanos:x}-{}",
            std::process::id(),
            NEXT.fetch_add(1, Ordering::Relaxed)
        );
        let marker = dir.join(format!("{id}.lock"));
        let file = open_lock_file(&marker)?;
        FileExt::lock_exclusive(&file)?;
        Ok(Self {
            id,
            marker,
            _file: file,
        })
    }
}

impl Drop for Owner {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.marker) {
            log::debug!("store: could not remove {}: {e}", self.marker.display());
        }
    }
}

fn is_owner_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

// ---------------------------------------------------------------------------
// StateStore
// ---------------------------------------------------------------------------

/// Cheaply cloneable handle to a shared key/value job store.
///
/// ```
/// use page_summarizer::store::{Patch, StateStore};
///
/// let store = StateStore::in_memory();
/// store.merge_patch(Patch::new().set("summarize.phase", "Running"));
/// assert_eq!(store.read_all()["summarize.phase"], "Running");
/// ```
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("path", &self.path())
            .field("owner", &self.owner_id())
            .finish_non_exhaustive()
    }
}

impl StateStore {
    fn with_state(values: StoreState, disk: Option<Disk>) -> Self {
        Self {
            inner: Arc::new(Inner {
                writer: Mutex::new(()),
                committed: RwLock::new(Committed { values, seq: 0 }),
                listeners: Mutex::new(BTreeMap::new()),
                next_listener: Mutex::new(0),
                disk,
            }),
        }
    }

    /// A store that lives only as long as its handles.
    pub fn in_memory() -> Self {
        Self::with_state(StoreState::new(), None)
    }

    /// Open (or create) a store persisted at `path`.
    ///
    /// Existing contents are loaded; every later merge is written through.
    /// Other handles may have the same file open.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let disk = Disk::attach(path.as_ref().to_path_buf())?;
        let values = {
            let _locked = disk.acquire()?;
            persist::load(&disk.path)?
        };
        log::debug!(
            "store: opened {} as {} ({} fields)",
            disk.path.display(),
            disk.owner.id,
            values.len()
        );
        Ok(Self::with_state(values, Some(disk)))
    }

    /// The backing file, if persisted.
    pub fn path(&self) -> Option<&Path> {
        self.inner.disk.as_ref().map(|d| d.path.as_path())
    }

    /// Identifier of this handle among those sharing the backing file.
    pub fn owner_id(&self) -> Option<&str> {
        self.inner.disk.as_ref().map(|d| d.owner.id.as_str())
    }

    /// Whether the handle identified by `owner` is still open, in this
    /// process or another one.
    ///
    /// Markers left behind by a handle that died without cleaning up are
    /// removed.
    pub fn is_owner_alive(&self, owner: &str) -> bool {
        let Some(disk) = &self.inner.disk else {
            return false;
        };
        if owner == disk.owner.id {
            return true;
        }
        if !is_owner_id(owner) {
            return false;
        }
        let marker = disk.owners_dir.join(format!("{owner}.lock"));
        let file = match OpenOptions::new().read(true).write(true).open(&marker) {
            Ok(file) => file,
            Err(_) => return false,
        };
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                let _ = fs::remove_file(&marker);
                false
            }
            Err(_) => true,
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Snapshot of every field, as of this handle's latest merge.
    pub fn read_all(&self) -> StoreState {
        self.inner
            .committed
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values
            .clone()
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Merge `patch` atomically and notify subscribers.
    pub fn merge_patch(&self, patch: Patch) -> StoreChange {
        self.merge_patch_and_read(patch, |_| ()).0
    }

    /// Merge `patch` and run `read` on the state right after it, before any
    /// later merge can land.
    pub fn merge_patch_and_read<R>(
        &self,
        patch: Patch,
        read: impl FnOnce(&StoreState) -> R,
    ) -> (StoreChange, R) {
        self.merge(|_| true, patch, read)
            .unwrap_or_else(|| unreachable!("unconditional merge"))
    }

    /// Merge `patch` only if `predicate` holds for the current state.
    ///
    /// The check and the merge happen under the same writer lock (and, for
    /// a persisted store, the same file lock), so no other merge can slip in
    /// between.  Returns `None` when the predicate rejected the merge;
    /// nothing is written in that case.
    pub fn merge_patch_if(
        &self,
        predicate: impl FnOnce(&StoreState) -> bool,
        patch: Patch,
    ) -> Option<StoreChange> {
        self.merge(predicate, patch, |_| ()).map(|(change, ())| change)
    }

    fn merge<R>(
        &self,
        predicate: impl FnOnce(&StoreState) -> bool,
        patch: Patch,
        read: impl FnOnce(&StoreState) -> R,
    ) -> Option<(StoreChange, R)> {
        let _writer = lock(&self.inner.writer);

        let file_lock = self.inner.disk.as_ref().and_then(|disk| {
            disk.acquire()
                .map_err(|e| log::warn!("store: could not lock {}: {e}", disk.lock_path.display()))
                .ok()
        });
        let external = self.reload();

        let merged = {
            let mut committed = self
                .inner
                .committed
                .write()
                .unwrap_or_else(|e| e.into_inner());
            if predicate(&committed.values) {
                let changes = patch.apply(&mut committed.values);
                committed.seq += 1;
                let change = StoreChange {
                    seq: committed.seq,
                    changes,
                    external: false,
                };
                Some((change, read(&committed.values)))
            } else {
                None
            }
        };

        if let (Some((change, _)), Some(disk)) = (&merged, &self.inner.disk) {
            if !change.changes.is_empty() {
                let committed = self
                    .inner
                    .committed
                    .read()
                    .unwrap_or_else(|e| e.into_inner());
                if let Err(e) = persist::save(&disk.path, &committed.values) {
                    log::warn!("store: failed to persist {}: {e}", disk.path.display());
                }
            }
        }
        drop(file_lock);

        if let Some(change) = &external {
            self.notify(change);
        }
        if let Some((change, _)) = &merged {
            self.notify(change);
        }
        merged
    }

    /// Adopt whatever another handle wrote to the backing file.  Caller
    /// holds the writer lock and the file lock.
    fn reload(&self) -> Option<StoreChange> {
        let disk = self.inner.disk.as_ref()?;
        let on_disk = match persist::load(&disk.path) {
            Ok(values) => values,
            Err(e) => {
                log::warn!(
                    "store: could not reload {} ({e}); keeping in-memory state",
                    disk.path.display()
                );
                return None;
            }
        };

        let mut committed = self
            .inner
            .committed
            .write()
            .unwrap_or_else(|e| e.into_inner());
        if committed.values == on_disk {
            return None;
        }
        let changes = diff(&committed.values, &on_disk);
        committed.values = on_disk;
        committed.seq += 1;
        log::debug!("store: picked up {} external field changes", changes.len());
        Some(StoreChange {
            seq: committed.seq,
            changes,
            external: true,
        })
    }

    fn notify(&self, change: &StoreChange) {
        let listeners: Vec<Listener> = lock(&self.inner.listeners).values().cloned().collect();
        for listener in listeners {
            listener(change);
        }
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    /// Call `callback` after every committed merge until the returned
    /// [`Subscription`] is dropped.
    pub fn subscribe(
        &self,
        callback: impl Fn(&StoreChange) + Send + Sync + 'static,
    ) -> Subscription {
        let id = {
            let mut next = lock(&self.inner.next_listener);
            *next += 1;
            *next
        };
        lock(&self.inner.listeners).insert(id, Arc::new(callback));
        Subscription {
            store: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Subscribe through an unbounded channel, for async observers.
    ///
    /// Changes are never dropped; the channel closes when the subscription
    /// is dropped.
    pub fn subscribe_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<StoreChange>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(move |change| {
            let _ = tx.send(change.clone());
        });
        (subscription, rx)
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.listeners).len()
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Keeps a store callback registered.  Dropping it unsubscribes.
pub struct Subscription {
    store: Weak<Inner>,
    id: u64,
}

impl Subscription {
    /// Detach the callback now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.store.upgrade() {
            lock(&inner.listeners).remove(&self.id);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
