use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use cipherstudio_storage::Storage;

use crate::project::{Project, ProjectId};
use crate::store::{ProjectListStore, StoreError};

/// Default debounce window between the last edit and the durable write.
pub const DEFAULT_AUTOSAVE_DELAY: Duration = Duration::from_millis(1000);

/// A single deferred task slot: scheduling replaces whatever was pending.
/// 單一延遲工作槽：重新排程會取代尚未執行的工作。
///
/// Time is passed in by the caller, so the slot works with any timer
/// mechanism and can be driven deterministically in tests.
#[derive(Debug, Clone)]
pub struct Deferred<T> {
    pending: Option<(Instant, T)>,
}

impl<T> Default for Deferred<T> {
    fn default() -> Self {
        Self { pending: None }
    }
}

impl<T> Deferred<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the slot; returns `true` when a pending task was cancelled.
    pub fn schedule(&mut self, due: Instant, value: T) -> bool {
        self.pending.replace((due, value)).is_some()
    }

    pub fn cancel(&mut self) -> Option<T> {
        self.take().map(|(_, value)| value)
    }

    /// Disarms the slot, returning the pending value with its due time.
    pub fn take(&mut self) -> Option<(Instant, T)> {
        self.pending.take()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn due_at(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(due, _)| *due)
    }

    /// Takes the pending value if its due time has been reached.
    pub fn take_due(&mut self, now: Instant) -> Option<T> {
        if self.due_at().is_some_and(|due| due <= now) {
            self.cancel()
        } else {
            None
        }
    }
}

/// Debounced autosave: at most one pending write per project.
/// 防抖自動儲存：每個專案最多只有一個待寫入的工作。
#[derive(Debug)]
pub struct Autosave {
    delay: Duration,
    slots: BTreeMap<ProjectId, Deferred<Project>>,
}

impl Autosave {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            slots: BTreeMap::new(),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Re-arms the project's timer with a snapshot of its current state.
    /// 以目前狀態的快照重新啟動該專案的計時器。
    pub fn schedule(&mut self, project: &Project, now: Instant) {
        let replaced = self
            .slots
            .entry(project.id.clone())
            .or_default()
            .schedule(now + self.delay, project.clone());
        tracing::trace!(project = %project.id, replaced, "autosave armed");
    }

    pub fn cancel(&mut self, id: &ProjectId) -> bool {
        self.slots
            .remove(id)
            .is_some_and(|mut slot| slot.cancel().is_some())
    }

    pub fn is_pending(&self, id: &ProjectId) -> bool {
        self.slots.get(id).is_some_and(Deferred::is_pending)
    }

    /// Earliest due time among pending writes, for hosts driving a timer.
    pub fn next_due(&self) -> Option<Instant> {
        self.slots.values().filter_map(Deferred::due_at).min()
    }

    /// Commits every write whose debounce window has elapsed.
    /// 寫入所有已超過防抖時間的專案。
    ///
    /// A write that fails is re-armed one delay later, so the snapshot is
    /// retried instead of dropped.
    pub fn poll<S: Storage>(
        &mut self,
        store: &mut ProjectListStore<S>,
        now: Instant,
    ) -> Vec<Result<Project, StoreError>> {
        let due: Vec<Project> = self
            .slots
            .values_mut()
            .filter_map(|slot| slot.take_due(now))
            .collect();
        self.slots.retain(|_, slot| slot.is_pending());
        let retry_at = now + self.delay;
        due.into_iter()
            .map(|project| self.commit(store, project, retry_at))
            .collect()
    }

    /// Commits every pending write immediately, ignoring due times.
    /// 立即寫入所有待處理的專案；失敗者保留原本的到期時間。
    pub fn flush<S: Storage>(&mut self, store: &mut ProjectListStore<S>) -> Vec<Result<Project, StoreError>> {
        let pending: Vec<(Instant, Project)> = std::mem::take(&mut self.slots)
            .into_values()
            .filter_map(|mut slot| slot.take())
            .collect();
        pending
            .into_iter()
            .map(|(due, project)| self.commit(store, project, due))
            .collect()
    }

    fn commit<S: Storage>(
        &mut self,
        store: &mut ProjectListStore<S>,
        project: Project,
        retry_at: Instant,
    ) -> Result<Project, StoreError> {
        match store.save(&project) {
            Ok(saved) => {
                tracing::debug!(project = %saved.id, "autosave committed");
                Ok(saved)
            }
            Err(err) => {
                tracing::warn!(project = %project.id, error = %err, "autosave failed, keeping the write pending");
                let slot = self.slots.entry(project.id.clone()).or_default();
                if !slot.is_pending() {
                    slot.schedule(retry_at, project);
                }
                Err(err)
            }
        }
    }
}

impl Default for Autosave {
    fn default() -> Self {
        Self::new(DEFAULT_AUTOSAVE_DELAY)
    }
}
