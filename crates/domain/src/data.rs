//! Core data model shared by every Sentinel subsystem: provenance-tagged
//! data, plans, sessions, approvals, and routines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trust / provenance
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    Trusted,
    Untrusted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    User,
    Worker,
    Tool,
    Planner,
}

/// A single provenance-tracked piece of data flowing through a task.
///
/// Invariant: any `TaggedData` with `source == Worker` must carry
/// `trust_level == Untrusted`. `TaggedData::new` enforces this at
/// construction time so the invariant cannot be violated by callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggedData {
    pub id: Uuid,
    pub content: String,
    pub source: DataSource,
    pub trust_level: TrustLevel,
    pub originated_from: String,
    pub parent_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl TaggedData {
    pub fn new(
        content: impl Into<String>,
        source: DataSource,
        trust_level: TrustLevel,
        originated_from: impl Into<String>,
        parent_ids: Vec<Uuid>,
    ) -> Self {
        let trust_level = if matches!(source, DataSource::Worker) {
            TrustLevel::Untrusted
        } else {
            trust_level
        };
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            source,
            trust_level,
            originated_from: originated_from.into(),
            parent_ids,
            created_at: Utc::now(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Plan / PlanStep
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    LlmTask,
    ToolCall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Tagged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub description: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub args: serde_json::Value,
    #[serde(default)]
    pub input_vars: Vec<String>,
    #[serde(default)]
    pub output_var: Option<String>,
    #[serde(default)]
    pub expects_code: bool,
    #[serde(default)]
    pub output_format: Option<OutputFormat>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub plan_summary: String,
    pub steps: Vec<PlanStep>,
}

/// A tool's advertised name, summary, and argument schema — what the
/// planner is shown when composing a plan, and what a channel's
/// capability listing reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub args_schema: serde_json::Value,
    /// Trust level of data this tool returns, independent of its caller.
    pub trust_level: TrustLevel,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session / ConversationTurn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Blocked,
    Refused,
    Denied,
    AwaitingApproval,
    Timeout,
    Error,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Success => "success",
            ResultStatus::Blocked => "blocked",
            ResultStatus::Refused => "refused",
            ResultStatus::Denied => "denied",
            ResultStatus::AwaitingApproval => "awaiting_approval",
            ResultStatus::Timeout => "timeout",
            ResultStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub request_text: String,
    pub result_status: ResultStatus,
    #[serde(default)]
    pub blocked_by: Vec<String>,
    pub risk_score: f64,
    #[serde(default)]
    pub plan_summary: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(request_text: impl Into<String>, result_status: ResultStatus) -> Self {
        Self {
            request_text: request_text.into(),
            result_status,
            blocked_by: Vec::new(),
            risk_score: 0.0,
            plan_summary: String::new(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Uuid,
    pub source_key: String,
    pub turns: Vec<ConversationTurn>,
    pub cumulative_risk: f64,
    pub violation_count: u32,
    pub is_locked: bool,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl Session {
    pub fn new(source_key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            source_key: source_key.into(),
            turns: Vec::new(),
            cumulative_risk: 0.0,
            violation_count: 0,
            is_locked: false,
            created_at: now,
            last_active: now,
        }
    }

    /// Appends a turn, bumping `violation_count` iff the turn was blocked.
    /// Never mutates prior turns — append-only per the session contract.
    pub fn add_turn(&mut self, turn: ConversationTurn) {
        if turn.result_status == ResultStatus::Blocked {
            self.violation_count += 1;
        }
        self.turns.push(turn);
        self.last_active = Utc::now();
    }

    pub fn lock(&mut self) {
        self.is_locked = true;
    }

    /// Monotonic update: never lowers `cumulative_risk`.
    pub fn raise_cumulative_risk(&mut self, candidate: f64) {
        if candidate > self.cumulative_risk {
            self.cumulative_risk = candidate;
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Approvals
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingApproval {
    pub approval_id: Uuid,
    pub plan: Plan,
    pub source_key: String,
    pub user_request: String,
    pub status: ApprovalStatus,
    pub expires_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Routines
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    Cron,
    Interval,
    Event,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionConfig {
    pub prompt: String,
    #[serde(default = "default_approval_mode")]
    pub approval_mode: String,
}

fn default_approval_mode() -> String {
    "auto".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Routine {
    pub routine_id: Uuid,
    pub user_id: String,
    pub name: String,
    pub trigger_type: TriggerType,
    pub trigger_config: serde_json::Value,
    pub action_config: ActionConfig,
    pub enabled: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub cooldown_s: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Success,
    Blocked,
    Error,
    Timeout,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutineExecution {
    pub execution_id: Uuid,
    pub routine_id: Uuid,
    pub triggered_by: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    pub task_id: Option<String>,
    pub error: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scan results
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanMatch {
    pub pattern_name: String,
    pub matched_text: String,
    pub position: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub found: bool,
    pub matches: Vec<ScanMatch>,
    pub scanner_name: String,
}

impl ScanResult {
    pub fn clean(scanner_name: impl Into<String>) -> Self {
        Self {
            found: false,
            matches: Vec::new(),
            scanner_name: scanner_name.into(),
        }
    }
}

/// `scanner_name -> ScanResult` for one pass of the scanner chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineScanResult {
    pub results: std::collections::HashMap<String, ScanResult>,
}

impl PipelineScanResult {
    pub fn is_clean(&self) -> bool {
        self.results.values().all(|r| !r.found)
    }

    pub fn insert(&mut self, result: ScanResult) {
        self.results.insert(result.scanner_name.clone(), result);
    }

    pub fn hit_scanner_names(&self) -> Vec<String> {
        self.results
            .values()
            .filter(|r| r.found)
            .map(|r| r.scanner_name.clone())
            .collect()
    }
}
