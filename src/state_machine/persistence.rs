use super::errors::{PersistenceError, PersistenceResult};
use super::states::RemovalSubStage;
use crate::models::{RemovalTask, SubStagePatch};
use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

/// Result of a compare-and-set transition attempt
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// The stored substage matched and the transition was recorded
    Applied(RemovalTask),
    /// The stored substage no longer matched; nothing was written
    Rejected { current: RemovalSubStage },
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Document store holding one record per removal task
///
/// Implementations must apply `compare_and_transition` atomically: the
/// expected-substage check and the write happen as one read-modify-write,
/// so two continuations racing on the same step cannot both advance it.
#[async_trait]
pub trait RemovalTaskStore: Send + Sync {
    async fn insert(&self, task: RemovalTask) -> PersistenceResult<()>;

    async fn get(&self, task_id: Uuid) -> PersistenceResult<Option<RemovalTask>>;

    async fn compare_and_transition(
        &self,
        task_id: Uuid,
        expected: RemovalSubStage,
        target: RemovalSubStage,
        patch: SubStagePatch,
    ) -> PersistenceResult<TransitionOutcome>;
}

/// In-process store backed by a sharded concurrent map
///
/// Each entry is locked for the duration of a synchronous read-modify-write,
/// which gives the per-task atomicity `compare_and_transition` requires.
#[derive(Debug, Default)]
pub struct InMemoryRemovalTaskStore {
    tasks: DashMap<Uuid, RemovalTask>,
}

impl InMemoryRemovalTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[async_trait]
impl RemovalTaskStore for InMemoryRemovalTaskStore {
    async fn insert(&self, task: RemovalTask) -> PersistenceResult<()> {
        use dashmap::mapref::entry::Entry;

        match self.tasks.entry(task.task_id) {
            Entry::Occupied(_) => Err(PersistenceError::DuplicateTask {
                task_id: task.task_id,
            }),
            Entry::Vacant(slot) => {
                slot.insert(task);
                Ok(())
            }
        }
    }

    async fn get(&self, task_id: Uuid) -> PersistenceResult<Option<RemovalTask>> {
        Ok(self.tasks.get(&task_id).map(|entry| entry.value().clone()))
    }

    async fn compare_and_transition(
        &self,
        task_id: Uuid,
        expected: RemovalSubStage,
        target: RemovalSubStage,
        patch: SubStagePatch,
    ) -> PersistenceResult<TransitionOutcome> {
        let mut entry = self
            .tasks
            .get_mut(&task_id)
            .ok_or(PersistenceError::TaskNotFound { task_id })?;

        let task = entry.value_mut();
        if task.substage != expected || task.substage.is_terminal() {
            return Ok(TransitionOutcome::Rejected {
                current: task.substage,
            });
        }

        task.apply_transition(target, patch);
        Ok(TransitionOutcome::Applied(task.clone()))
    }
}
