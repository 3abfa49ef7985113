//! Approval manager: parks a plan pending human review, and resolves it
//! exactly once.
//!
//! Unlike a blocking handshake, nothing here waits on the decision —
//! `handle_task` returns `awaiting_approval` immediately and a later,
//! independent call (`execute_approved_plan`) resumes the plan once
//! `submit_approval` has accepted a decision. Records are kept after
//! resolution (not removed) so `get_pending` stays a truthful audit trail
//! instead of a hole once a decision lands.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use sentinel_domain::data::{ApprovalStatus, Plan, PendingApproval};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    NotFound,
    AlreadyDecided,
    Expired,
}

pub struct ApprovalManager {
    pending: RwLock<HashMap<Uuid, PendingApproval>>,
    timeout: Duration,
}

impl ApprovalManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Park `plan` for human review. Returns the new approval id.
    pub fn request_plan_approval(
        &self,
        plan: Plan,
        source_key: impl Into<String>,
        user_request: impl Into<String>,
    ) -> Uuid {
        let approval_id = Uuid::new_v4();
        let approval = PendingApproval {
            approval_id,
            plan,
            source_key: source_key.into(),
            user_request: user_request.into(),
            status: ApprovalStatus::Pending,
            expires_at: Utc::now()
                + chrono::Duration::from_std(self.timeout).unwrap_or(chrono::Duration::zero()),
        };
        self.pending.write().insert(approval_id, approval);
        approval_id
    }

    /// Resolve a pending approval exactly once. Expired-but-still-pending
    /// records are lazily flipped to `Expired` here before the decision
    /// check runs, so a late approval on a timed-out request is rejected.
    pub fn submit_approval(&self, id: Uuid, granted: bool, _reason: Option<String>) -> SubmitOutcome {
        let mut pending = self.pending.write();
        let Some(approval) = pending.get_mut(&id) else {
            return SubmitOutcome::NotFound;
        };

        if approval.status == ApprovalStatus::Pending && Utc::now() > approval.expires_at {
            approval.status = ApprovalStatus::Expired;
        }

        match approval.status {
            ApprovalStatus::Pending => {
                approval.status = if granted {
                    ApprovalStatus::Approved
                } else {
                    ApprovalStatus::Denied
                };
                SubmitOutcome::Accepted
            }
            ApprovalStatus::Expired => SubmitOutcome::Expired,
            ApprovalStatus::Approved | ApprovalStatus::Denied => SubmitOutcome::AlreadyDecided,
        }
    }

    /// `true` iff the approval was decided as `Approved`. Lazily expires
    /// a stale pending record first.
    pub fn is_approved(&self, id: &Uuid) -> bool {
        let mut pending = self.pending.write();
        if let Some(approval) = pending.get_mut(id) {
            if approval.status == ApprovalStatus::Pending && Utc::now() > approval.expires_at {
                approval.status = ApprovalStatus::Expired;
            }
            approval.status == ApprovalStatus::Approved
        } else {
            false
        }
    }

    pub fn get_pending(&self, id: &Uuid) -> Option<PendingApproval> {
        self.pending.read().get(id).cloned()
    }

    /// Flip any pending record whose `expires_at` has passed. Intended to
    /// be called periodically (e.g. by the routine scheduler's tick) so
    /// `list_pending` doesn't keep reporting dead requests as live.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut pending = self.pending.write();
        let mut count = 0;
        for approval in pending.values_mut() {
            if approval.status == ApprovalStatus::Pending && now > approval.expires_at {
                approval.status = ApprovalStatus::Expired;
                count += 1;
            }
        }
        count
    }

    pub fn list_pending(&self) -> Vec<PendingApproval> {
        self.pending
            .read()
            .values()
            .filter(|a| a.status == ApprovalStatus::Pending)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_domain::data::{OutputFormat, PlanStep, StepType};

    fn test_plan() -> Plan {
        Plan {
            plan_summary: "do something".into(),
            steps: vec![PlanStep {
                id: "1".into(),
                step_type: StepType::ToolCall,
                description: "example".into(),
                prompt: None,
                tool: Some("noop".into()),
                args: serde_json::json!({}),
                input_vars: vec![],
                output_var: None,
                expects_code: false,
                output_format: None,
            }],
        }
    }
    #[allow(dead_code)]
    fn unused(_: OutputFormat) {}

    #[test]
    fn request_then_approve_transitions_once() {
        let mgr = ApprovalManager::new(Duration::from_secs(300));
        let id = mgr.request_plan_approval(test_plan(), "chan:peer", "do it");
        assert_eq!(mgr.submit_approval(id, true, None), SubmitOutcome::Accepted);
        assert!(mgr.is_approved(&id));
        assert_eq!(
            mgr.submit_approval(id, true, None),
            SubmitOutcome::AlreadyDecided
        );
    }

    #[test]
    fn deny_marks_not_approved() {
        let mgr = ApprovalManager::new(Duration::from_secs(300));
        let id = mgr.request_plan_approval(test_plan(), "chan:peer", "do it");
        assert_eq!(
            mgr.submit_approval(id, false, Some("too risky".into())),
            SubmitOutcome::Accepted
        );
        assert!(!mgr.is_approved(&id));
    }

    #[test]
    fn submit_unknown_id_is_not_found() {
        let mgr = ApprovalManager::new(Duration::from_secs(300));
        assert_eq!(
            mgr.submit_approval(Uuid::new_v4(), true, None),
            SubmitOutcome::NotFound
        );
    }

    #[test]
    fn expired_approval_rejects_late_decision() {
        let mgr = ApprovalManager::new(Duration::from_millis(1));
        let id = mgr.request_plan_approval(test_plan(), "chan:peer", "do it");
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(mgr.submit_approval(id, true, None), SubmitOutcome::Expired);
    }

    #[test]
    fn get_pending_reflects_terminal_status_not_removed() {
        let mgr = ApprovalManager::new(Duration::from_secs(300));
        let id = mgr.request_plan_approval(test_plan(), "chan:peer", "do it");
        mgr.submit_approval(id, true, None);
        let record = mgr.get_pending(&id).unwrap();
        assert_eq!(record.status, ApprovalStatus::Approved);
    }

    #[test]
    fn list_pending_excludes_decided_requests() {
        let mgr = ApprovalManager::new(Duration::from_secs(300));
        let pending_id = mgr.request_plan_approval(test_plan(), "chan:peer", "one");
        let decided_id = mgr.request_plan_approval(test_plan(), "chan:peer", "two");
        mgr.submit_approval(decided_id, true, None);
        let list = mgr.list_pending();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].approval_id, pending_id);
    }

    #[test]
    fn sweep_expired_flips_stale_pending_records() {
        let mgr = ApprovalManager::new(Duration::from_millis(1));
        let id = mgr.request_plan_approval(test_plan(), "chan:peer", "do it");
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(mgr.sweep_expired(), 1);
        assert_eq!(mgr.get_pending(&id).unwrap().status, ApprovalStatus::Expired);
    }
}
