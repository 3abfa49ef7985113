//! Routine scheduler: fires cron/interval/event-triggered routines through
//! a [`TaskHandler`], bounded by a single global concurrency gate.
//!
//! Grounded on the reference routine engine's scheduler loop: a ticking
//! due-check pass plus an event-bus subscription, both funneling into the
//! same bounded execution path. There is one global `max_concurrent`
//! (not a per-routine limit) and no missed-window catch-up — a routine
//! that was due while the engine was stopped simply fires at its next
//! regular occurrence.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sentinel_bus::EventBus;
use sentinel_domain::data::{
    ActionConfig, ExecutionStatus, Routine, RoutineExecution, TriggerType,
};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cron::cron_next;
use crate::store::RoutineStore;

/// The orchestrator seam. Defined here (not in the orchestrator crate) so
/// `routines` never depends on `orchestrator` — the dependency points the
/// other way, with the orchestrator crate implementing this trait.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run_routine_task(
        &self,
        action: &ActionConfig,
        source_key: &str,
    ) -> Result<(), String>;
}

pub struct RoutineEngineConfig {
    pub max_concurrent: usize,
    pub tick_interval: Duration,
    pub execution_timeout: Duration,
}

pub struct RoutineEngine {
    store: Arc<RoutineStore>,
    bus: EventBus,
    handler: Arc<dyn TaskHandler>,
    config: RoutineEngineConfig,
    semaphore: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl RoutineEngine {
    pub fn new(
        store: Arc<RoutineStore>,
        bus: EventBus,
        handler: Arc<dyn TaskHandler>,
        config: RoutineEngineConfig,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            store,
            bus,
            handler,
            config,
            semaphore,
            in_flight: Arc::new(AtomicUsize::new(0)),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Spawns the scheduler tick loop and subscribes the event dispatcher
    /// to every topic. Returns immediately; call `stop` to unwind both.
    pub fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.scheduler_loop().await });

        let engine = Arc::clone(self);
        let shutdown = self.shutdown.clone();
        let handler: sentinel_bus::Handler = Arc::new(move |topic, data| {
            let engine = Arc::clone(&engine);
            let shutdown = shutdown.clone();
            Box::pin(async move {
                if !shutdown.is_cancelled() {
                    engine.on_event(&topic, &data).await;
                }
                Ok(())
            })
        });
        let bus = self.bus.clone();
        tokio::spawn(async move {
            bus.subscribe("*", handler).await;
        });
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    async fn scheduler_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = interval.tick() => {
                    self.check_due_routines().await;
                }
            }
        }
    }

    async fn check_due_routines(&self) {
        let now = Utc::now();
        for routine in self.store.list() {
            if !routine.enabled {
                continue;
            }
            if routine.trigger_type == TriggerType::Event {
                continue;
            }
            let Some(next_run_at) = routine.next_run_at else {
                continue;
            };
            if next_run_at > now {
                continue;
            }
            if self.in_cooldown(&routine, now) {
                continue;
            }
            // Global cap: break (not continue) once saturated — the
            // remaining due routines wait for the next tick rather than
            // being skipped individually.
            if self.semaphore.available_permits() == 0 {
                break;
            }
            self.spawn_execution(routine, "scheduler".into());
        }
    }

    async fn on_event(&self, topic: &str, _data: &serde_json::Value) {
        if topic.starts_with("routine.") {
            return;
        }
        let now = Utc::now();
        for routine in self.store.list() {
            if !routine.enabled || routine.trigger_type != TriggerType::Event {
                continue;
            }
            let Some(pattern) = routine.trigger_config.get("event").and_then(|v| v.as_str())
            else {
                continue;
            };
            if !glob::Pattern::new(pattern)
                .map(|p| p.matches(topic))
                .unwrap_or(false)
            {
                continue;
            }
            if self.in_cooldown(&routine, now) {
                continue;
            }
            if self.semaphore.available_permits() == 0 {
                break;
            }
            self.spawn_execution(routine, "event".into());
        }
    }

    fn in_cooldown(&self, routine: &Routine, now: chrono::DateTime<Utc>) -> bool {
        match routine.last_run_at {
            Some(last) => (now - last).num_seconds() < routine.cooldown_s as i64,
            None => false,
        }
    }

    fn spawn_execution(&self, routine: Routine, triggered_by: String) {
        let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
            return;
        };
        self.in_flight.fetch_add(1, Ordering::SeqCst);

        let store = Arc::clone(&self.store);
        let bus = self.bus.clone();
        let handler = Arc::clone(&self.handler);
        let timeout = self.config.execution_timeout;
        let in_flight = Arc::clone(&self.in_flight);
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let _permit = permit;
            execute_routine(&store, &bus, &handler, &routine, &triggered_by, timeout, &shutdown)
                .await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });
    }
}

async fn execute_routine(
    store: &RoutineStore,
    bus: &EventBus,
    handler: &Arc<dyn TaskHandler>,
    routine: &Routine,
    triggered_by: &str,
    timeout: Duration,
    shutdown: &CancellationToken,
) {
    let execution_id = Uuid::new_v4();
    let started_at = Utc::now();

    bus.publish(
        &format!("routine.{}.triggered", routine.routine_id),
        serde_json::json!({
            "routine_id": routine.routine_id,
            "execution_id": execution_id,
            "triggered_by": triggered_by,
        }),
    )
    .await;

    let run = async {
        tokio::select! {
            _ = shutdown.cancelled() => Err("cancelled".to_string()),
            result = tokio::time::timeout(timeout, handler.run_routine_task(&routine.action_config, &routine_source_key(&routine.user_id))) => {
                match result {
                    Ok(inner) => inner,
                    Err(_) => Err("execution timed out".to_string()),
                }
            }
        }
    }
    .await;

    let (status, error) = match run {
        Ok(()) => (ExecutionStatus::Success, None),
        Err(ref e) if e.as_str() == "cancelled" => (ExecutionStatus::Cancelled, Some(e.clone())),
        Err(ref e) if e.as_str() == "execution timed out" => (ExecutionStatus::Timeout, Some(e.clone())),
        Err(e) => (ExecutionStatus::Error, Some(e)),
    };

    store.push_execution(RoutineExecution {
        execution_id,
        routine_id: routine.routine_id,
        triggered_by: triggered_by.to_string(),
        started_at,
        completed_at: Some(Utc::now()),
        status,
        task_id: None,
        error,
    });

    // Cancellation short-circuits before next-run bookkeeping and the
    // completion event, mirroring the reference engine: a routine that
    // was killed mid-flight doesn't get rescheduled as if it ran clean.
    if status == ExecutionStatus::Cancelled {
        return;
    }

    let next_run_at = calculate_next_run(routine);
    store.record_run(&routine.routine_id, started_at, next_run_at);

    bus.publish(
        &format!("routine.{}.executed", routine.routine_id),
        serde_json::json!({
            "routine_id": routine.routine_id,
            "execution_id": execution_id,
            "status": status,
        }),
    )
    .await;
}

fn calculate_next_run(routine: &Routine) -> Option<chrono::DateTime<Utc>> {
    match routine.trigger_type {
        TriggerType::Cron => {
            let cron = routine.trigger_config.get("cron")?.as_str()?;
            cron_next(cron, &Utc::now())
        }
        TriggerType::Interval => {
            let seconds = routine.trigger_config.get("seconds")?.as_i64()?;
            Some(Utc::now() + chrono::Duration::seconds(seconds))
        }
        TriggerType::Event => None,
    }
}

fn routine_source_key(user_id: &str) -> String {
    format!("routine:{user_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    struct RecordingHandler {
        ran: Arc<AtomicBool>,
    }

    #[async_trait]
    impl TaskHandler for RecordingHandler {
        async fn run_routine_task(&self, _action: &ActionConfig, _source_key: &str) -> Result<(), String> {
            self.ran.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn test_routine(trigger: TriggerType, trigger_config: serde_json::Value) -> Routine {
        Routine {
            routine_id: Uuid::new_v4(),
            user_id: "alice".into(),
            name: "t".into(),
            trigger_type: trigger,
            trigger_config,
            action_config: ActionConfig {
                prompt: "do the thing".into(),
                approval_mode: "auto".into(),
            },
            enabled: true,
            last_run_at: None,
            next_run_at: Some(Utc::now() - chrono::Duration::seconds(1)),
            cooldown_s: 0,
        }
    }

    #[tokio::test]
    async fn due_interval_routine_executes_and_reschedules() {
        let store = Arc::new(RoutineStore::new());
        let routine = test_routine(TriggerType::Interval, serde_json::json!({"seconds": 30}));
        let routine_id = routine.routine_id;
        store.insert(routine);

        let ran = Arc::new(AtomicBool::new(false));
        let handler: Arc<dyn TaskHandler> = Arc::new(RecordingHandler { ran: ran.clone() });
        let bus = EventBus::default();
        let engine = RoutineEngine::new(
            store.clone(),
            bus,
            handler,
            RoutineEngineConfig {
                max_concurrent: 2,
                tick_interval: Duration::from_millis(10),
                execution_timeout: Duration::from_secs(5),
            },
        );

        engine.check_due_routines().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(ran.load(Ordering::SeqCst));
        let routine = store.get(&routine_id).unwrap();
        assert!(routine.next_run_at.unwrap() > Utc::now());
    }

    #[test]
    fn cooldown_blocks_recent_runs() {
        let mut routine = test_routine(TriggerType::Interval, serde_json::json!({"seconds": 30}));
        routine.cooldown_s = 120;
        routine.last_run_at = Some(Utc::now());
        let store = RoutineStore::new();
        store.insert(routine.clone());
        let bus = EventBus::default();
        let handler: Arc<dyn TaskHandler> = Arc::new(RecordingHandler {
            ran: Arc::new(AtomicBool::new(false)),
        });
        let engine = RoutineEngine::new(
            Arc::new(store),
            bus,
            handler,
            RoutineEngineConfig {
                max_concurrent: 2,
                tick_interval: Duration::from_secs(60),
                execution_timeout: Duration::from_secs(5),
            },
        );
        assert!(engine.in_cooldown(&routine, Utc::now()));
    }

    #[test]
    fn calculate_next_run_event_trigger_is_none() {
        let routine = test_routine(TriggerType::Event, serde_json::json!({"event": "inbox.new"}));
        assert!(calculate_next_run(&routine).is_none());
    }

    #[test]
    fn calculate_next_run_cron_uses_expression() {
        let routine = test_routine(TriggerType::Cron, serde_json::json!({"cron": "*/5 * * * *"}));
        assert!(calculate_next_run(&routine).is_some());
    }
}
