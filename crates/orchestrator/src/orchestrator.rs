//! The orchestrator: wires the conversation gate, scan pipeline, planner,
//! approval manager, and tool executor into the single `handle_task`
//! pipeline every channel (and the routine engine) drives a task through.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use sentinel_approval::ApprovalManager;
use sentinel_bus::EventBus;
use sentinel_domain::config::ConversationConfig;
use sentinel_domain::data::{
    ActionConfig, ApprovalStatus, ConversationTurn, DataSource, OutputFormat, Plan, PlanStep,
    ResultStatus, StepType, ToolDescription, TrustLevel,
};
use sentinel_providers::{PlannerClient, PlannerError};
use sentinel_routines::TaskHandler;
use sentinel_security::{
    generate_marker, Action as AnalyzerAction, CodeShieldScanner, ConversationAnalyzer,
    PipelineError, ScanPipeline, Scanner as _, WorkerClient,
};
use sentinel_sessions::SessionStore;
use sentinel_tools::{ToolError, ToolExecutor};

use crate::context::ExecutionContext;
use crate::provenance::ProvenanceStore;

const PREVIEW_LEN: usize = 200;

fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_LEN {
        let truncated: String = text.chars().take(PREVIEW_LEN).collect();
        format!("{truncated}…")
    } else {
        text.to_string()
    }
}

fn extract_response_tag(text: &str) -> Option<String> {
    const OPEN: &str = "<RESPONSE>";
    const CLOSE: &str = "</RESPONSE>";
    let start = text.find(OPEN)? + OPEN.len();
    let rest = &text[start..];
    let end = rest.find(CLOSE)?;
    Some(rest[..end].trim().to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub status: ResultStatus,
    pub content_preview: Option<String>,
    pub reason: Option<String>,
}

impl StepResult {
    fn success(step_id: impl Into<String>, content: &str) -> Self {
        Self {
            step_id: step_id.into(),
            status: ResultStatus::Success,
            content_preview: Some(preview(content)),
            reason: None,
        }
    }

    fn blocked(step_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            status: ResultStatus::Blocked,
            content_preview: None,
            reason: Some(reason.into()),
        }
    }

    fn error(step_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            status: ResultStatus::Error,
            content_preview: None,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub status: ResultStatus,
    pub plan_summary: String,
    pub reason: Option<String>,
    #[serde(default)]
    pub blocked_by: Vec<String>,
    pub approval_id: Option<Uuid>,
    #[serde(default)]
    pub step_results: Vec<StepResult>,
}

impl TaskResult {
    fn early_exit(task_id: impl Into<String>, status: ResultStatus, reason: Option<String>, blocked_by: Vec<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status,
            plan_summary: String::new(),
            reason,
            blocked_by,
            approval_id: None,
            step_results: Vec::new(),
        }
    }
}

pub struct Orchestrator {
    session_store: Arc<SessionStore>,
    conversation_analyzer: ConversationAnalyzer,
    conversation_config: ConversationConfig,
    pipeline: Arc<ScanPipeline>,
    code_shield: CodeShieldScanner,
    planner: Arc<dyn PlannerClient>,
    worker: Arc<dyn WorkerClient>,
    tool_executor: Arc<dyn ToolExecutor>,
    approval_manager: Arc<ApprovalManager>,
    provenance: ProvenanceStore,
    bus: EventBus,
    policy_summary: String,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_store: Arc<SessionStore>,
        conversation_analyzer: ConversationAnalyzer,
        conversation_config: ConversationConfig,
        pipeline: Arc<ScanPipeline>,
        code_shield: CodeShieldScanner,
        planner: Arc<dyn PlannerClient>,
        worker: Arc<dyn WorkerClient>,
        tool_executor: Arc<dyn ToolExecutor>,
        approval_manager: Arc<ApprovalManager>,
        bus: EventBus,
        policy_summary: impl Into<String>,
    ) -> Self {
        Self {
            session_store,
            conversation_analyzer,
            conversation_config,
            pipeline,
            code_shield,
            planner,
            worker,
            tool_executor,
            approval_manager,
            provenance: ProvenanceStore::new(),
            bus,
            policy_summary: policy_summary.into(),
        }
    }

    /// `approval_mode` is one of `"full"`, `"smart"`, `"auto"`. `"full"`
    /// always parks for approval; `"smart"` parks only when the
    /// conversation analyzer itself flagged this request as `warn`
    /// (a coarse heuristic — anything cleaner runs straight through);
    /// `"auto"` never parks.
    pub async fn handle_task(
        &self,
        user_request: &str,
        source: &str,
        approval_mode: &str,
        source_key: &str,
        task_id: Option<String>,
    ) -> TaskResult {
        let task_id = task_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        // 1. Conversation gate.
        let session = self.session_store.get_or_create(source_key, source);
        if session.is_locked {
            return TaskResult::early_exit(
                task_id,
                ResultStatus::Blocked,
                Some("session is locked".into()),
                vec!["conversation_analyzer".into()],
            );
        }

        let analysis =
            self.conversation_analyzer
                .analyze(&session, user_request, &self.conversation_config);
        if analysis.action == AnalyzerAction::Block {
            self.session_store.lock(source_key);
            let mut turn = ConversationTurn::new(user_request, ResultStatus::Blocked);
            turn.risk_score = analysis.total_score;
            turn.blocked_by = vec!["conversation_analyzer".into()];
            self.session_store.add_turn(source_key, turn);
            return TaskResult::early_exit(
                task_id,
                ResultStatus::Blocked,
                Some("conversation analysis flagged this request".into()),
                vec!["conversation_analyzer".into()],
            );
        }
        self.session_store.raise_cumulative_risk(source_key, analysis.total_score);

        // 2. Input scan.
        let input_scan = self.pipeline.scan_input(user_request);
        if !input_scan.is_clean() {
            let scanners = input_scan.hit_scanner_names();
            let mut turn = ConversationTurn::new(user_request, ResultStatus::Blocked);
            turn.risk_score = analysis.total_score;
            turn.blocked_by = scanners.clone();
            self.session_store.add_turn(source_key, turn);
            return TaskResult::early_exit(
                task_id,
                ResultStatus::Blocked,
                Some(format!("input scan flagged: {}", scanners.join(", "))),
                scanners,
            );
        }

        // 3. Started.
        self.bus
            .publish(&format!("task.{task_id}.started"), serde_json::json!({"user_request": user_request}))
            .await;

        // 4. Plan.
        let tools = self.tool_executor.get_tool_descriptions();
        let plan = match self
            .planner
            .create_plan(user_request, &tools, &self.policy_summary, &session.turns)
            .await
        {
            Ok(plan) => plan,
            Err(PlannerError::Refusal(msg)) => {
                let mut turn = ConversationTurn::new(user_request, ResultStatus::Refused);
                turn.risk_score = analysis.total_score;
                self.session_store.add_turn(source_key, turn);
                return TaskResult::early_exit(task_id, ResultStatus::Refused, Some(msg), vec![]);
            }
            Err(e) => {
                return TaskResult::early_exit(task_id, ResultStatus::Error, Some(e.to_string()), vec![]);
            }
        };

        // 5. Planned.
        self.bus
            .publish(&format!("task.{task_id}.planned"), serde_json::json!({"plan_summary": plan.plan_summary}))
            .await;

        // 6. Approval gate.
        if self.requires_approval(approval_mode, &analysis) {
            let approval_id =
                self.approval_manager
                    .request_plan_approval(plan.clone(), source_key, user_request);
            self.bus
                .publish(
                    &format!("task.{task_id}.approval_requested"),
                    serde_json::json!({"approval_id": approval_id}),
                )
                .await;
            return TaskResult {
                task_id,
                status: ResultStatus::AwaitingApproval,
                plan_summary: plan.plan_summary,
                reason: None,
                blocked_by: vec![],
                approval_id: Some(approval_id),
                step_results: vec![],
            };
        }

        // 7. Execute.
        let ctx = ExecutionContext::new();
        let (status, step_results, reason) =
            self.execute_plan(&task_id, &plan, &ctx, user_request).await;

        // 8. Auto-memory persistence is out of scope; this is the hook
        // point where a best-effort async summary write would happen.

        // 9. Final turn.
        let mut turn = ConversationTurn::new(user_request, status);
        turn.risk_score = analysis.total_score;
        turn.plan_summary = plan.plan_summary.clone();
        if let Some(ref r) = reason {
            turn.blocked_by = vec![r.clone()];
        }
        self.session_store.add_turn(source_key, turn);

        // 10. Completed.
        self.bus
            .publish(&format!("task.{task_id}.completed"), serde_json::json!({"status": status}))
            .await;

        TaskResult {
            task_id,
            status,
            plan_summary: plan.plan_summary,
            reason,
            blocked_by: vec![],
            approval_id: None,
            step_results,
        }
    }

    fn requires_approval(&self, approval_mode: &str, analysis: &sentinel_security::AnalysisResult) -> bool {
        match approval_mode {
            "full" => true,
            "smart" => analysis.action == AnalyzerAction::Warn,
            _ => false,
        }
    }

    /// Resumes a plan parked by the approval gate. Looks up the decision
    /// exactly once (lazily expiring a stale pending record first).
    pub async fn execute_approved_plan(&self, approval_id: Uuid) -> TaskResult {
        self.approval_manager.is_approved(&approval_id);
        let Some(pending) = self.approval_manager.get_pending(&approval_id) else {
            return TaskResult::early_exit(
                approval_id.to_string(),
                ResultStatus::Error,
                Some("unknown approval id".into()),
                vec![],
            );
        };

        let task_id = format!("approval-{approval_id}");
        match pending.status {
            ApprovalStatus::Approved => {}
            ApprovalStatus::Denied => {
                return TaskResult::early_exit(task_id, ResultStatus::Denied, Some("approval denied".into()), vec![]);
            }
            ApprovalStatus::Expired => {
                return TaskResult::early_exit(task_id, ResultStatus::Timeout, Some("approval expired".into()), vec![]);
            }
            ApprovalStatus::Pending => {
                return TaskResult::early_exit(task_id, ResultStatus::Error, Some("approval still pending".into()), vec![]);
            }
        }

        self.bus
            .publish(&format!("task.{task_id}.started"), serde_json::json!({"resumed": true}))
            .await;

        let ctx = ExecutionContext::new();
        let (status, step_results, reason) = self
            .execute_plan(&task_id, &pending.plan, &ctx, &pending.user_request)
            .await;

        let mut turn = ConversationTurn::new(&pending.user_request, status);
        turn.plan_summary = pending.plan.plan_summary.clone();
        if let Some(ref r) = reason {
            turn.blocked_by = vec![r.clone()];
        }
        self.session_store.add_turn(&pending.source_key, turn);

        self.bus
            .publish(&format!("task.{task_id}.completed"), serde_json::json!({"status": status}))
            .await;

        TaskResult {
            task_id,
            status,
            plan_summary: pending.plan.plan_summary,
            reason,
            blocked_by: vec![],
            approval_id: Some(approval_id),
            step_results,
        }
    }

    async fn execute_plan(
        &self,
        task_id: &str,
        plan: &Plan,
        ctx: &ExecutionContext,
        user_request: &str,
    ) -> (ResultStatus, Vec<StepResult>, Option<String>) {
        let mut results = Vec::with_capacity(plan.steps.len());
        for step in &plan.steps {
            let result = match step.step_type {
                StepType::LlmTask => self.run_llm_task_step(step, ctx, user_request).await,
                StepType::ToolCall => self.run_tool_call_step(step, ctx).await,
            };

            self.bus
                .publish(
                    &format!("task.{task_id}.step_completed"),
                    serde_json::json!({
                        "step_id": result.step_id,
                        "status": result.status,
                        "content_preview": result.content_preview,
                    }),
                )
                .await;

            let terminal = matches!(result.status, ResultStatus::Blocked | ResultStatus::Error);
            let reason = result.reason.clone();
            results.push(result);
            if terminal {
                let status = results.last().unwrap().status;
                return (status, results, reason);
            }
        }
        (ResultStatus::Success, results, None)
    }

    async fn run_llm_task_step(&self, step: &PlanStep, ctx: &ExecutionContext, user_request: &str) -> StepResult {
        let raw_prompt = step.prompt.as_deref().unwrap_or_default();

        let (prompt, marker, skip_input_scan) = if !step.input_vars.is_empty() {
            let marker = generate_marker();
            let prompt = ctx.resolve_text_safe(raw_prompt, &marker);
            (prompt, Some(marker), true)
        } else {
            (ctx.resolve_text(raw_prompt), None, false)
        };

        let prompt = match step.output_format {
            Some(OutputFormat::Json) => {
                format!("{prompt}\n\nRespond with only valid JSON. No prose, no markdown fences.")
            }
            Some(OutputFormat::Tagged) => {
                format!("{prompt}\n\nRespond with only the content wrapped in <RESPONSE>...</RESPONSE>, nothing outside it.")
            }
            None => prompt,
        };

        let tagged = match self
            .pipeline
            .process_with_worker(self.worker.as_ref(), &prompt, marker.as_deref(), skip_input_scan, Some(user_request))
            .await
        {
            Ok(tagged) => tagged,
            Err(PipelineError::SecurityViolation { scan_results, .. }) => {
                return StepResult::blocked(&step.id, scan_results.hit_scanner_names().join(", "));
            }
            Err(PipelineError::WorkerError(e)) => return StepResult::error(&step.id, e),
        };

        // CodeShieldScanner here is a static pattern scanner, not an ML
        // classifier — it has no "model unavailable" state, so the
        // fail-closed-on-unavailable rule never triggers in this build.
        let code_scan = self.code_shield.scan(&tagged.content);
        if code_scan.found {
            return StepResult::blocked(&step.id, format!("code_shield: {}", code_scan.matches.len()));
        }

        let mut tagged = tagged;
        if let Some(format) = step.output_format {
            match format {
                OutputFormat::Json => {
                    if serde_json::from_str::<Value>(&tagged.content).is_err() {
                        return StepResult::error(&step.id, "step output is not valid JSON");
                    }
                }
                OutputFormat::Tagged => match extract_response_tag(&tagged.content) {
                    Some(inner) => tagged.content = inner,
                    None => return StepResult::error(&step.id, "step output missing <RESPONSE> tags"),
                },
            }
        }

        if let Some(output_var) = &step.output_var {
            ctx.set(output_var.clone(), tagged.clone());
        }

        StepResult::success(&step.id, &tagged.content)
    }

    async fn run_tool_call_step(&self, step: &PlanStep, ctx: &ExecutionContext) -> StepResult {
        let referenced_ids = ctx.referenced_data_ids_from_value(&step.args);
        for id in &referenced_ids {
            if !self.provenance.is_trust_safe_for_execution(*id) {
                return StepResult::blocked(&step.id, "provenance trust check failed");
            }
        }

        let resolved_args = ctx.resolve_value(&step.args);
        let tool_name = step.tool.as_deref().unwrap_or_default();

        match self.tool_executor.execute(tool_name, resolved_args, referenced_ids).await {
            Ok(tagged) => {
                self.provenance.insert(tagged.clone());
                if let Some(output_var) = &step.output_var {
                    ctx.set(output_var.clone(), tagged.clone());
                }
                StepResult::success(&step.id, &tagged.content)
            }
            Err(ToolError::Blocked(msg)) => StepResult::blocked(&step.id, msg),
            Err(ToolError::Error(msg)) => StepResult::error(&step.id, msg),
        }
    }
}

#[async_trait]
impl TaskHandler for Orchestrator {
    async fn run_routine_task(&self, action: &ActionConfig, source_key: &str) -> Result<(), String> {
        let result = self
            .handle_task(&action.prompt, "routine", &action.approval_mode, source_key, None)
            .await;
        match result.status {
            ResultStatus::Success | ResultStatus::AwaitingApproval => Ok(()),
            // Matches the exact string the routine engine special-cases
            // for a timeout-classified execution.
            ResultStatus::Timeout => Err("execution timed out".into()),
            other => Err(result
                .reason
                .unwrap_or_else(|| format!("task ended with status {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sentinel_domain::config::{ConversationConfig as ConvCfg, SessionsConfig};
    use sentinel_domain::data::{DataSource, TaggedData};
    use sentinel_security::{CodeShieldScanner as CS, NullPromptGuard, PromptGuardScanner, ScanPipeline as SP};
    use sentinel_tools::ToolExecutor as TE;
    use std::time::Duration as StdDuration;

    struct StubPlanner {
        plan: std::sync::Mutex<Option<Result<Plan, PlannerError>>>,
    }

    #[async_trait]
    impl PlannerClient for StubPlanner {
        async fn create_plan(
            &self,
            _user_request: &str,
            _available_tools: &[ToolDescription],
            _policy_summary: &str,
            _conversation_history: &[ConversationTurn],
        ) -> Result<Plan, PlannerError> {
            self.plan.lock().unwrap().take().unwrap()
        }
    }

    struct StubWorker(String);

    #[async_trait]
    impl WorkerClient for StubWorker {
        async fn generate(&self, _prompt: &str, _marker: Option<&str>) -> Result<String, String> {
            Ok(self.0.clone())
        }
    }

    struct StubExecutor;

    #[async_trait]
    impl TE for StubExecutor {
        fn get_tool_descriptions(&self) -> Vec<ToolDescription> {
            vec![ToolDescription {
                name: "noop".into(),
                description: "d".into(),
                args_schema: serde_json::json!({}),
                trust_level: TrustLevel::Trusted,
            }]
        }

        async fn execute(&self, _tool_name: &str, args: Value, parent_ids: Vec<Uuid>) -> Result<TaggedData, ToolError> {
            Ok(TaggedData::new(args.to_string(), DataSource::Tool, TrustLevel::Trusted, "noop", parent_ids))
        }
    }

    fn harness(plan: Result<Plan, PlannerError>, worker_reply: &str) -> Orchestrator {
        let session_store = Arc::new(SessionStore::new(SessionsConfig { session_ttl: 3600, session_max_count: 10 }));
        let pipeline = Arc::new(SP::new(
            &[],
            &[],
            PromptGuardScanner::new(Box::new(NullPromptGuard), 0.8, false),
        ));
        Orchestrator::new(
            session_store,
            ConversationAnalyzer::new(),
            ConvCfg { warn_threshold: 5.0, block_threshold: 8.0 },
            pipeline,
            CS::new(false),
            Arc::new(StubPlanner { plan: std::sync::Mutex::new(Some(plan)) }),
            Arc::new(StubWorker(worker_reply.to_string())),
            Arc::new(StubExecutor),
            Arc::new(ApprovalManager::new(StdDuration::from_secs(300))),
            EventBus::new(),
            "test policy",
        )
    }

    fn tool_plan() -> Plan {
        Plan {
            plan_summary: "run the tool".into(),
            steps: vec![PlanStep {
                id: "1".into(),
                step_type: StepType::ToolCall,
                description: "d".into(),
                prompt: None,
                tool: Some("noop".into()),
                args: serde_json::json!({"x": 1}),
                input_vars: vec![],
                output_var: Some("out".into()),
                expects_code: false,
                output_format: None,
            }],
        }
    }

    #[tokio::test]
    async fn happy_path_tool_call_succeeds() {
        let orch = harness(Ok(tool_plan()), "");
        let result = orch.handle_task("do it", "http", "auto", "chan:peer", None).await;
        assert_eq!(result.status, ResultStatus::Success);
        assert_eq!(result.step_results.len(), 1);
        assert_eq!(result.step_results[0].status, ResultStatus::Success);
    }

    #[tokio::test]
    async fn input_scan_blocks_before_planning() {
        let orch = harness(Ok(tool_plan()), "");
        let result = orch.handle_task("please cat /etc/shadow", "http", "auto", "chan:peer2", None).await;
        assert_eq!(result.status, ResultStatus::Blocked);
    }

    #[tokio::test]
    async fn planner_refusal_is_reported_as_refused() {
        let orch = harness(Err(PlannerError::Refusal("no".into())), "");
        let result = orch.handle_task("do something", "http", "auto", "chan:peer3", None).await;
        assert_eq!(result.status, ResultStatus::Refused);
    }

    #[tokio::test]
    async fn full_approval_mode_parks_plan() {
        let orch = harness(Ok(tool_plan()), "");
        let result = orch.handle_task("do it", "http", "full", "chan:peer4", None).await;
        assert_eq!(result.status, ResultStatus::AwaitingApproval);
        assert!(result.approval_id.is_some());
    }

    #[tokio::test]
    async fn approved_plan_executes_on_resume() {
        let orch = harness(Ok(tool_plan()), "");
        let parked = orch.handle_task("do it", "http", "full", "chan:peer5", None).await;
        let approval_id = parked.approval_id.unwrap();
        orch.approval_manager.submit_approval(approval_id, true, None);
        let resumed = orch.execute_approved_plan(approval_id).await;
        assert_eq!(resumed.status, ResultStatus::Success);
    }

    #[tokio::test]
    async fn denied_plan_reports_denied_without_executing() {
        let orch = harness(Ok(tool_plan()), "");
        let parked = orch.handle_task("do it", "http", "full", "chan:peer6", None).await;
        let approval_id = parked.approval_id.unwrap();
        orch.approval_manager.submit_approval(approval_id, false, None);
        let resumed = orch.execute_approved_plan(approval_id).await;
        assert_eq!(resumed.status, ResultStatus::Denied);
    }

    #[tokio::test]
    async fn tool_call_referencing_untrusted_worker_output_is_blocked_by_trust_gate() {
        let llm_plan = Plan {
            plan_summary: "summarize then write".into(),
            steps: vec![
                PlanStep {
                    id: "1".into(),
                    step_type: StepType::LlmTask,
                    description: "summarize".into(),
                    prompt: Some("summarize this".into()),
                    tool: None,
                    args: serde_json::json!({}),
                    input_vars: vec![],
                    output_var: Some("summary".into()),
                    expects_code: false,
                    output_format: None,
                },
                PlanStep {
                    id: "2".into(),
                    step_type: StepType::ToolCall,
                    description: "write".into(),
                    prompt: None,
                    tool: Some("noop".into()),
                    args: serde_json::json!({"content": "$summary"}),
                    input_vars: vec!["summary".into()],
                    output_var: None,
                    expects_code: false,
                    output_format: None,
                },
            ],
        };
        let orch = harness(Ok(llm_plan), "here is your summary");
        let result = orch.handle_task("summarize and save", "http", "auto", "chan:peer7", None).await;
        assert_eq!(result.status, ResultStatus::Blocked);
        assert_eq!(result.step_results.len(), 2);
        assert_eq!(result.step_results[1].reason.as_deref(), Some("provenance trust check failed"));
    }

    #[tokio::test]
    async fn session_lock_blocks_every_subsequent_request() {
        let orch = harness(Ok(tool_plan()), "");
        let session_store = &orch.session_store;
        session_store.get_or_create("chan:locked", "http");
        session_store.lock("chan:locked");
        let result = orch.handle_task("anything", "http", "auto", "chan:locked", None).await;
        assert_eq!(result.status, ResultStatus::Blocked);
    }

    #[test]
    fn preview_truncates_long_content() {
        let long = "a".repeat(PREVIEW_LEN + 50);
        let p = preview(&long);
        assert!(p.ends_with('…'));
        assert_eq!(p.chars().count(), PREVIEW_LEN + 1);
    }

    #[test]
    fn extract_response_tag_pulls_inner_text() {
        let text = "noise<RESPONSE> hello </RESPONSE>trailer";
        assert_eq!(extract_response_tag(text), Some("hello".to_string()));
    }
}
