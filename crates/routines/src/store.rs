//! In-memory routine registry plus a bounded execution history per routine.

use std::collections::HashMap;

use parking_lot::RwLock;
use sentinel_domain::data::{Routine, RoutineExecution};
use uuid::Uuid;

/// How many past executions to retain per routine before the oldest are
/// dropped. Matches the reference engine's bounded in-memory history.
const MAX_HISTORY_PER_ROUTINE: usize = 50;

#[derive(Default)]
pub struct RoutineStore {
    routines: RwLock<HashMap<Uuid, Routine>>,
    history: RwLock<HashMap<Uuid, Vec<RoutineExecution>>>,
}

impl RoutineStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, routine: Routine) {
        self.routines.write().insert(routine.routine_id, routine);
    }

    pub fn remove(&self, routine_id: &Uuid) -> Option<Routine> {
        self.history.write().remove(routine_id);
        self.routines.write().remove(routine_id)
    }

    pub fn get(&self, routine_id: &Uuid) -> Option<Routine> {
        self.routines.read().get(routine_id).cloned()
    }

    pub fn list(&self) -> Vec<Routine> {
        self.routines.read().values().cloned().collect()
    }

    pub fn list_for_user(&self, user_id: &str) -> Vec<Routine> {
        self.routines
            .read()
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn count_for_user(&self, user_id: &str) -> usize {
        self.routines
            .read()
            .values()
            .filter(|r| r.user_id == user_id)
            .count()
    }

    pub fn set_enabled(&self, routine_id: &Uuid, enabled: bool) -> bool {
        if let Some(r) = self.routines.write().get_mut(routine_id) {
            r.enabled = enabled;
            true
        } else {
            false
        }
    }

    pub fn record_run(
        &self,
        routine_id: &Uuid,
        last_run_at: chrono::DateTime<chrono::Utc>,
        next_run_at: Option<chrono::DateTime<chrono::Utc>>,
    ) {
        if let Some(r) = self.routines.write().get_mut(routine_id) {
            r.last_run_at = Some(last_run_at);
            r.next_run_at = next_run_at;
        }
    }

    pub fn push_execution(&self, execution: RoutineExecution) {
        let mut history = self.history.write();
        let entries = history.entry(execution.routine_id).or_default();
        entries.push(execution);
        if entries.len() > MAX_HISTORY_PER_ROUTINE {
            let overflow = entries.len() - MAX_HISTORY_PER_ROUTINE;
            entries.drain(0..overflow);
        }
    }

    pub fn executions_for(&self, routine_id: &Uuid) -> Vec<RoutineExecution> {
        self.history.read().get(routine_id).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_domain::data::{ActionConfig, ExecutionStatus, TriggerType};

    fn test_routine(user_id: &str) -> Routine {
        Routine {
            routine_id: Uuid::new_v4(),
            user_id: user_id.into(),
            name: "daily digest".into(),
            trigger_type: TriggerType::Cron,
            trigger_config: serde_json::json!({"cron": "0 9 * * *"}),
            action_config: ActionConfig {
                prompt: "summarize inbox".into(),
                approval_mode: "auto".into(),
            },
            enabled: true,
            last_run_at: None,
            next_run_at: None,
            cooldown_s: 60,
        }
    }

    #[test]
    fn insert_and_get_roundtrips() {
        let store = RoutineStore::new();
        let routine = test_routine("alice");
        let id = routine.routine_id;
        store.insert(routine);
        assert!(store.get(&id).is_some());
    }

    #[test]
    fn count_for_user_scopes_correctly() {
        let store = RoutineStore::new();
        store.insert(test_routine("alice"));
        store.insert(test_routine("alice"));
        store.insert(test_routine("bob"));
        assert_eq!(store.count_for_user("alice"), 2);
        assert_eq!(store.count_for_user("bob"), 1);
    }

    #[test]
    fn history_is_capped_at_max_per_routine() {
        let store = RoutineStore::new();
        let routine_id = Uuid::new_v4();
        for i in 0..(MAX_HISTORY_PER_ROUTINE + 10) {
            store.push_execution(RoutineExecution {
                execution_id: Uuid::new_v4(),
                routine_id,
                triggered_by: "scheduler".into(),
                started_at: chrono::Utc::now(),
                completed_at: None,
                status: ExecutionStatus::Success,
                task_id: Some(format!("t{i}")),
                error: None,
            });
        }
        assert_eq!(store.executions_for(&routine_id).len(), MAX_HISTORY_PER_ROUTINE);
    }

    #[test]
    fn remove_drops_routine_and_history() {
        let store = RoutineStore::new();
        let routine = test_routine("alice");
        let id = routine.routine_id;
        store.insert(routine);
        store.push_execution(RoutineExecution {
            execution_id: Uuid::new_v4(),
            routine_id: id,
            triggered_by: "scheduler".into(),
            started_at: chrono::Utc::now(),
            completed_at: None,
            status: ExecutionStatus::Success,
            task_id: None,
            error: None,
        });
        store.remove(&id);
        assert!(store.get(&id).is_none());
        assert!(store.executions_for(&id).is_empty());
    }
}
