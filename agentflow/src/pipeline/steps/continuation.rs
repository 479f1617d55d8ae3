//! Merges client tool results into the suspended turn's manifest.

use crate::context::{AgentPipelineContext, ToolResultSubmission};
use crate::errors::{PipelineError, Violation};
use crate::pipeline::{PipelineStep, PipelineStepKind, StepResult, StepStatus};
use crate::stores::ToolManifestStore;
use crate::tools::{has_text, ToolCallManifest};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Reconciliation rule codes.
pub mod codes {
    /// The client sent the same call id more than once.
    pub const DUPLICATE_TOOL_CALL_ID: &str = "CLIENT_TOOL_CONTINUATION_RESOLVER_DUPLICATE_TOOL_CALL_ID";
    /// A client call has no result row.
    pub const CLIENT_RESULT_MISSING: &str = "CLIENT_TOOL_CONTINUATION_RESOLVER_CLIENT_RESULT_MISSING";
    /// A submitted id is not in the manifest.
    pub const TOOL_CALL_NOT_FOUND: &str = "CLIENT_TOOL_CONTINUATION_RESOLVER_TOOL_CALL_NOT_FOUND";
    /// A result was submitted for a server tool.
    pub const NOT_CLIENT_TOOL: &str = "CLIENT_TOOL_CONTINUATION_RESOLVER_NOT_CLIENT_TOOL";
    /// The placeholder row is not flagged for client execution.
    pub const PLACEHOLDER_NOT_CLIENT: &str = "CLIENT_TOOL_CONTINUATION_RESOLVER_PLACEHOLDER_NOT_CLIENT";
    /// The placeholder row already holds an error.
    pub const ERROR_ALREADY_SET: &str = "CLIENT_TOOL_CONTINUATION_RESOLVER_ERROR_ALREADY_SET";
    /// The placeholder row already holds a result.
    pub const RESULT_ALREADY_SET: &str = "CLIENT_TOOL_CONTINUATION_RESOLVER_RESULT_ALREADY_SET";
    /// The submission carries neither a result nor an error.
    pub const SUBMISSION_EMPTY: &str = "CLIENT_TOOL_CONTINUATION_RESOLVER_SUBMISSION_EMPTY";
}

/// Fills the manifest's client placeholders from `submissions`.
///
/// Every rule is checked before anything is written: the manifest is
/// either fully reconciled (empty return) or left untouched and every
/// violation is returned. Only the first submission for a duplicated id
/// is considered.
pub fn reconcile_client_results(
    manifest: &mut ToolCallManifest,
    submissions: &[ToolResultSubmission],
    manifest_id: &str,
) -> Vec<Violation> {
    let mut violations = Vec::new();

    let mut first: HashMap<&str, &ToolResultSubmission> = HashMap::new();
    let mut ordered: Vec<&ToolResultSubmission> = Vec::new();
    let mut reported: HashSet<&str> = HashSet::new();
    for submission in submissions {
        let id = submission.tool_call_id.as_str();
        if first.contains_key(id) {
            if reported.insert(id) {
                violations.push(Violation::new(
                    codes::DUPLICATE_TOOL_CALL_ID,
                    format!("Duplicate ToolCallId {id} was provided by the client for Manifest {manifest_id}."),
                ));
            }
        } else {
            first.insert(id, submission);
            ordered.push(submission);
        }
    }

    for call in manifest.tool_calls.iter().filter(|c| c.requires_client_execution) {
        let has_row = manifest
            .tool_call_results
            .iter()
            .any(|r| r.tool_call_id == call.tool_call_id);
        if !has_row {
            violations.push(Violation::new(
                codes::CLIENT_RESULT_MISSING,
                format!(
                    "Tool Call {}, with Id {} requires execution but no result was provided.",
                    call.name, call.tool_call_id
                ),
            ));
        }
    }

    let mut fills: Vec<(usize, &ToolResultSubmission)> = Vec::new();
    for submission in ordered {
        let id = submission.tool_call_id.as_str();
        let Some(call) = manifest.tool_calls.iter().find(|c| c.tool_call_id == id) else {
            violations.push(Violation::new(
                codes::TOOL_CALL_NOT_FOUND,
                format!("Tool Call with Id {id} not found in Manifest {manifest_id}."),
            ));
            continue;
        };

        if !call.requires_client_execution {
            violations.push(Violation::new(
                codes::NOT_CLIENT_TOOL,
                format!(
                    "Tool Call {}, with Id {id} result was provided, however it was not a client tool type {manifest_id}.",
                    call.name
                ),
            ));
            continue;
        }

        // A missing row was already reported above.
        let Some(index) = manifest
            .tool_call_results
            .iter()
            .position(|r| r.tool_call_id == id)
        else {
            continue;
        };
        let row = &manifest.tool_call_results[index];
        let mut can_apply = true;

        if !row.requires_client_execution {
            violations.push(Violation::new(
                codes::PLACEHOLDER_NOT_CLIENT,
                format!(
                    "Tool Call {}, with Id {id} was provided from client, however call request was not marked as requiring client execution.  In Manifest {manifest_id}.",
                    call.name
                ),
            ));
            can_apply = false;
        }
        if has_text(row.error_message.as_deref()) {
            violations.push(Violation::new(
                codes::ERROR_ALREADY_SET,
                format!(
                    "Tool Call {}, with Id {id} was provided from client, however error message was already set.  In Manifest {manifest_id}.",
                    call.name
                ),
            ));
            can_apply = false;
        }
        if has_text(row.result_json.as_deref()) {
            violations.push(Violation::new(
                codes::RESULT_ALREADY_SET,
                format!(
                    "Tool Call {}, with Id {id} was provided from client, however results json was already set.  In Manifest {manifest_id}.",
                    call.name
                ),
            ));
            can_apply = false;
        }
        if !has_text(submission.result_json.as_deref()) && !has_text(submission.error_message.as_deref()) {
            violations.push(Violation::new(
                codes::SUBMISSION_EMPTY,
                format!(
                    "Tool Call {}, with Id {id} was provided from client without a result or an error message.  In Manifest {manifest_id}.",
                    call.name
                ),
            ));
            can_apply = false;
        }

        if can_apply {
            fills.push((index, submission));
        }
    }

    if violations.is_empty() {
        for (index, submission) in fills {
            let row = &mut manifest.tool_call_results[index];
            row.result_json.clone_from(&submission.result_json);
            row.error_message.clone_from(&submission.error_message);
        }
    }

    violations
}

/// Loads the pending manifest, reconciles client results, attaches it and
/// removes it from the store.
///
/// The store is only touched again after a fully successful
/// reconciliation; on any failure the manifest stays stored unchanged.
pub struct ClientToolContinuationResolver {
    store: Arc<dyn ToolManifestStore>,
}

impl ClientToolContinuationResolver {
    /// Creates the step.
    #[must_use]
    pub fn new(store: Arc<dyn ToolManifestStore>) -> Self {
        Self { store }
    }
}

impl fmt::Debug for ClientToolContinuationResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientToolContinuationResolver").finish_non_exhaustive()
    }
}

#[async_trait]
impl PipelineStep for ClientToolContinuationResolver {
    fn kind(&self) -> PipelineStepKind {
        PipelineStepKind::ClientToolContinuationResolver
    }

    async fn execute_step(&self, ctx: &mut AgentPipelineContext) -> StepResult {
        let manifest_id = ctx
            .tool_manifest_id()
            .ok_or_else(|| PipelineError::Internal("No session is attached.".to_string()))?;
        let org_id = ctx.envelope().org().id.clone();

        let Some(mut manifest) = self.store.get_manifest(&manifest_id, &org_id).await? else {
            warn!(correlation_id = %ctx.correlation_id(), manifest_id = %manifest_id, "Tool call manifest not found");
            return Err(PipelineError::ManifestNotFound { manifest_id });
        };

        let violations =
            reconcile_client_results(&mut manifest, ctx.envelope().tool_results(), &manifest_id);
        if !violations.is_empty() {
            warn!(
                correlation_id = %ctx.correlation_id(),
                manifest_id = %manifest_id,
                violations = violations.len(),
                "Client tool results rejected"
            );
            return Err(PipelineError::Reconciliation {
                manifest_id,
                violations,
            });
        }

        ctx.attach_tool_manifest(manifest);
        self.store.remove_manifest(&manifest_id, &org_id).await?;

        info!(
            correlation_id = %ctx.correlation_id(),
            manifest_id = %manifest_id,
            results = ctx.envelope().tool_results().len(),
            "Client tool results reconciled"
        );
        Ok(StepStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AgentSession, AgentSessionTurn, RequestKind};
    use crate::stores::{InMemoryToolManifestStore, MockToolManifestStore};
    use crate::testing::fixtures::{context, continuation_request, org, user};
    use crate::tools::{ToolCall, ToolCallResult};
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const MID: &str = "sess_1.turn_1";

    fn client_call(id: &str, name: &str) -> ToolCall {
        let mut call = ToolCall::new(id, name, json!({}));
        call.requires_client_execution = true;
        call
    }

    fn manifest_with(calls: Vec<ToolCall>, results: Vec<ToolCallResult>) -> ToolCallManifest {
        ToolCallManifest {
            tool_calls: calls,
            tool_call_results: results,
            tool_continuation_message: None,
        }
    }

    fn submission(id: &str, json: &str) -> ToolResultSubmission {
        ToolResultSubmission::success(id, json)
    }

    fn codes_of(violations: &[Violation]) -> Vec<&str> {
        violations.iter().map(|v| v.code.as_str()).collect()
    }

    #[test]
    fn test_happy_path_fills_placeholder() {
        let call = client_call("tc_1", "client_tool");
        let mut manifest = manifest_with(
            vec![call.clone()],
            vec![ToolCallResult::client_placeholder(&call)],
        );

        let violations =
            reconcile_client_results(&mut manifest, &[submission("tc_1", r#"{"value":42}"#)], MID);

        assert!(violations.is_empty());
        let row = &manifest.tool_call_results[0];
        assert_eq!(row.result_json.as_deref(), Some(r#"{"value":42}"#));
        assert_eq!(row.error_message, None);
    }

    #[test]
    fn test_client_error_is_recorded() {
        let call = client_call("tc_1", "client_tool");
        let mut manifest = manifest_with(
            vec![call.clone()],
            vec![ToolCallResult::client_placeholder(&call)],
        );
        let failed = ToolResultSubmission::failure("tc_1", "file not found");

        assert!(reconcile_client_results(&mut manifest, &[failed], MID).is_empty());
        assert_eq!(
            manifest.tool_call_results[0].error_message.as_deref(),
            Some("file not found")
        );
    }

    #[test]
    fn test_duplicate_plus_extra_reports_every_violation() {
        let dup = client_call("tc_dup", "client_tool_dup");
        let need = client_call("tc_need", "client_tool_need");
        let mut manifest = manifest_with(
            vec![dup.clone(), need],
            vec![ToolCallResult::client_placeholder(&dup)],
        );
        let before = manifest.clone();

        let violations = reconcile_client_results(
            &mut manifest,
            &[
                submission("tc_dup", r#"{"v":1}"#),
                submission("tc_dup", r#"{"v":2}"#),
                submission("tc_extra", r#"{"v":3}"#),
            ],
            MID,
        );

        assert_eq!(
            codes_of(&violations),
            vec![
                codes::DUPLICATE_TOOL_CALL_ID,
                codes::CLIENT_RESULT_MISSING,
                codes::TOOL_CALL_NOT_FOUND,
            ]
        );
        assert_eq!(
            violations[0].message,
            "Duplicate ToolCallId tc_dup was provided by the client for Manifest sess_1.turn_1."
        );
        assert!(violations[1].message.contains("requires execution but no result was provided"));
        assert_eq!(
            violations[2].message,
            "Tool Call with Id tc_extra not found in Manifest sess_1.turn_1."
        );
        assert_eq!(manifest, before);
    }

    #[test]
    fn test_result_for_server_tool_is_rejected() {
        let call = ToolCall::new("tc_1", "server_tool", json!({}));
        let mut manifest = manifest_with(
            vec![call.clone()],
            vec![ToolCallResult::success(&call, "{}")],
        );

        let violations = reconcile_client_results(&mut manifest, &[submission("tc_1", "{}")], MID);
        assert_eq!(codes_of(&violations), vec![codes::NOT_CLIENT_TOOL]);
        assert!(violations[0].message.contains("was not a client tool type"));
    }

    #[test]
    fn test_placeholder_integrity_failures_aggregate() {
        let a = client_call("tc_reqflag", "client_tool_a");
        let b = client_call("tc_errset", "client_tool_b");
        let c = client_call("tc_jsonset", "client_tool_c");

        let mut unflagged = ToolCallResult::client_placeholder(&a);
        unflagged.requires_client_execution = false;
        let mut errored = ToolCallResult::client_placeholder(&b);
        errored.error_message = Some("already set".into());
        let mut filled = ToolCallResult::client_placeholder(&c);
        filled.result_json = Some(r#"{"already":true}"#.into());

        let mut manifest = manifest_with(vec![a, b, c], vec![unflagged, errored, filled]);
        let violations = reconcile_client_results(
            &mut manifest,
            &[
                submission("tc_reqflag", r#"{"v":1}"#),
                submission("tc_errset", r#"{"v":2}"#),
                submission("tc_jsonset", r#"{"v":3}"#),
            ],
            MID,
        );

        assert_eq!(
            codes_of(&violations),
            vec![
                codes::PLACEHOLDER_NOT_CLIENT,
                codes::ERROR_ALREADY_SET,
                codes::RESULT_ALREADY_SET,
            ]
        );
        assert!(violations[0].message.contains("not marked as requiring client execution"));
        assert!(manifest.tool_call_results[0].result_json.is_none());
    }

    #[test]
    fn test_empty_submission_is_rejected() {
        let call = client_call("tc_1", "client_tool");
        let mut manifest = manifest_with(
            vec![call.clone()],
            vec![ToolCallResult::client_placeholder(&call)],
        );
        let empty = ToolResultSubmission {
            tool_call_id: "tc_1".into(),
            ..ToolResultSubmission::default()
        };

        let violations = reconcile_client_results(&mut manifest, &[empty], MID);
        assert_eq!(codes_of(&violations), vec![codes::SUBMISSION_EMPTY]);
    }

    fn continuation_ctx(results: Vec<ToolResultSubmission>) -> (AgentPipelineContext, String) {
        let mut session = AgentSession::new(org(), user());
        let turn = AgentSessionTurn::new(&session.id, 1, user());
        let (session_id, turn_id) = (session.id.clone(), turn.id.clone());
        session.turns.push(turn);

        let mut ctx = context(
            RequestKind::ClientToolCallContinuation,
            continuation_request(&session_id, &turn_id, results),
        );
        ctx.attach_client_tool_session(session, &turn_id);
        (ctx, format!("{session_id}.{turn_id}"))
    }

    #[tokio::test]
    async fn test_step_attaches_and_removes_once() {
        let (mut ctx, manifest_id) =
            continuation_ctx(vec![submission("tc_1", r#"{"value":42}"#)]);
        let call = client_call("tc_1", "client_tool");
        let store = Arc::new(InMemoryToolManifestStore::new());
        store.seed(
            &manifest_id,
            "org-1",
            manifest_with(vec![call.clone()], vec![ToolCallResult::client_placeholder(&call)]),
        );

        ClientToolContinuationResolver::new(store.clone())
            .execute_step(&mut ctx)
            .await
            .unwrap();

        assert_eq!(
            ctx.tool_manifest().tool_call_results[0].result_json.as_deref(),
            Some(r#"{"value":42}"#)
        );
        assert_eq!(store.remove_count(), 1);
        assert!(!store.contains(&manifest_id, "org-1"));
    }

    #[tokio::test]
    async fn test_missing_manifest_never_removes() {
        let (mut ctx, manifest_id) = continuation_ctx(vec![submission("tc_1", "{}")]);

        let mut store = MockToolManifestStore::new();
        store
            .expect_get_manifest()
            .with(eq(manifest_id.clone()), eq("org-1".to_string()))
            .times(1)
            .returning(|_, _| Ok(None));
        store.expect_remove_manifest().times(0);

        let err = ClientToolContinuationResolver::new(Arc::new(store))
            .execute_step(&mut ctx)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "CLIENT_TOOL_CONTINUATION_RESOLVER_MANIFEST_NOT_FOUND");
        assert!(ctx.tool_manifest().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_results_leave_store_untouched() {
        let (mut ctx, manifest_id) = continuation_ctx(vec![submission("tc_other", "{}")]);
        let call = client_call("tc_1", "client_tool");
        let stored = manifest_with(vec![call.clone()], vec![ToolCallResult::client_placeholder(&call)]);
        let store = Arc::new(InMemoryToolManifestStore::new());
        store.seed(&manifest_id, "org-1", stored.clone());

        let err = ClientToolContinuationResolver::new(store.clone())
            .execute_step(&mut ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Reconciliation { .. }));
        assert_eq!(store.remove_count(), 0);
        assert_eq!(store.snapshot(&manifest_id, "org-1"), Some(stored));
        assert!(ctx.tool_manifest().is_empty());
    }
}
