use super::rules::{rules_for, RuleScope};
use super::{manifest, ValidationReport};
use crate::context::{AgentPipelineContext, RequestKind};
use crate::errors::ContractPhase;
use crate::pipeline::PipelineStepKind;
use crate::tools::ToolCallManifest;

/// Rule codes for core and request-type checks.
pub mod codes {
    /// Missing context timestamp.
    pub const TIMESTAMP_REQUIRED: &str = "CORE_TIMESTAMP_REQUIRED";
    /// Missing correlation id.
    pub const CORRELATION_ID_REQUIRED: &str = "CORE_CORRELATION_ID_REQUIRED";
    /// Missing organization.
    pub const ORG_REQUIRED: &str = "CORE_ORG_REQUIRED";
    /// Missing user.
    pub const USER_REQUIRED: &str = "CORE_USER_REQUIRED";
    /// No instructions, artifacts or images.
    pub const CONTENT_REQUIRED: &str = "REQUEST_CONTENT_REQUIRED";
    /// Role given without an agent context.
    pub const CONVERSATION_CONTEXT_WITHOUT_AGENT: &str =
        "REQUEST_CONVERSATION_CONTEXT_WITHOUT_AGENT_CONTEXT";
    /// Initial request carrying session identifiers.
    pub const SESSION_IDS_NOT_ALLOWED: &str = "REQUEST_SESSION_IDS_NOT_ALLOWED";
    /// Session id missing.
    pub const SESSION_ID_REQUIRED: &str = "REQUEST_SESSION_ID_REQUIRED";
    /// Turn id missing.
    pub const TURN_ID_REQUIRED: &str = "REQUEST_TURN_ID_REQUIRED";
    /// Tool results where none are allowed.
    pub const TOOL_RESULTS_NOT_ALLOWED: &str = "REQUEST_TOOL_RESULTS_NOT_ALLOWED";
    /// Continuation without tool results.
    pub const TOOL_RESULTS_REQUIRED: &str = "REQUEST_TOOL_RESULTS_REQUIRED";
    /// Clipboard image data that is not valid base64.
    pub const CLIPBOARD_IMAGE_INVALID: &str = "REQUEST_CLIPBOARD_IMAGE_INVALID";
}

/// Stateless contract validator.
///
/// Every method reads the context and returns a report; nothing is
/// mutated, so calling twice on the same context gives equal reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextValidator;

impl ContextValidator {
    /// Creates a validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Core invariants followed by the request-type rules.
    ///
    /// Type rules are skipped when a core invariant fails.
    #[must_use]
    pub fn validate_core(&self, ctx: &AgentPipelineContext) -> ValidationReport {
        let mut report = ValidationReport::new();
        let envelope = ctx.envelope();

        if ctx.timestamp().trim().is_empty() {
            report.push(codes::TIMESTAMP_REQUIRED, "TimeStamp is required.");
        }
        if ctx.correlation_id().trim().is_empty() {
            report.push(codes::CORRELATION_ID_REQUIRED, "CorrelationId is required.");
        }
        if envelope.org().is_empty() {
            report.push(codes::ORG_REQUIRED, "Envelope.Org is required.");
        }
        if envelope.user().is_empty() {
            report.push(codes::USER_REQUIRED, "Envelope.User is required.");
        }
        if !report.is_valid() {
            return report;
        }

        match ctx.kind() {
            RequestKind::Initial => {
                require_content(ctx, &mut report);
                if envelope.agent_context_id().is_none()
                    && envelope.conversation_context_id().is_some()
                {
                    report.push(
                        codes::CONVERSATION_CONTEXT_WITHOUT_AGENT,
                        "ConversationContextId must be empty when AgentContextId is not provided.",
                    );
                }
                if envelope.session_id().is_some() || envelope.turn_id().is_some() {
                    report.push(
                        codes::SESSION_IDS_NOT_ALLOWED,
                        "SessionId and TurnId must be empty for Initial requests.",
                    );
                }
                if !envelope.tool_results().is_empty() {
                    report.push(
                        codes::TOOL_RESULTS_NOT_ALLOWED,
                        "ToolResults must be empty for Initial requests.",
                    );
                }
            }
            RequestKind::FollowOn => {
                require_content(ctx, &mut report);
                require_ids(ctx, "FollowOn", &mut report);
                if !envelope.tool_results().is_empty() {
                    report.push(
                        codes::TOOL_RESULTS_NOT_ALLOWED,
                        "ToolResults must be empty for FollowOn requests.",
                    );
                }
            }
            RequestKind::ClientToolCallContinuation => {
                require_ids(ctx, "ClientToolCallContinuation", &mut report);
                if envelope.tool_results().is_empty() {
                    report.push(
                        codes::TOOL_RESULTS_REQUIRED,
                        "ToolResults must contain at least one row for ClientToolCallContinuation requests.",
                    );
                }
            }
        }
        report
    }

    /// Entry contract for `step`; core violations take precedence.
    #[must_use]
    pub fn validate_pre_step(
        &self,
        ctx: &AgentPipelineContext,
        step: PipelineStepKind,
    ) -> ValidationReport {
        self.validate_step(ctx, step, ContractPhase::Pre)
    }

    /// Exit contract for `step`; core violations take precedence.
    #[must_use]
    pub fn validate_post_step(
        &self,
        ctx: &AgentPipelineContext,
        step: PipelineStepKind,
    ) -> ValidationReport {
        self.validate_step(ctx, step, ContractPhase::Post)
    }

    /// Checks that every result row lines up with its call.
    #[must_use]
    pub fn validate_tool_call_manifest(&self, manifest: &ToolCallManifest) -> ValidationReport {
        manifest::validate(manifest)
    }

    fn validate_step(
        &self,
        ctx: &AgentPipelineContext,
        step: PipelineStepKind,
        phase: ContractPhase,
    ) -> ValidationReport {
        let mut report = self.validate_core(ctx);
        if !report.is_valid() {
            return report;
        }
        let rules = rules_for(step);
        let rule = match phase {
            ContractPhase::Pre => rules.pre,
            ContractPhase::Post => rules.post,
        };
        rule(ctx, &mut RuleScope::new(step, phase, &mut report));
        report
    }
}

fn require_content(ctx: &AgentPipelineContext, report: &mut ValidationReport) {
    if !ctx.envelope().has_content() {
        report.push(
            codes::CONTENT_REQUIRED,
            "At least one of Instructions, InputArtifacts, or ClipBoardImages must be provided.",
        );
    }
}

fn require_ids(ctx: &AgentPipelineContext, kind: &str, report: &mut ValidationReport) {
    if ctx.envelope().session_id().is_none() {
        report.push(
            codes::SESSION_ID_REQUIRED,
            format!("SessionId is required for {kind} requests."),
        );
    }
    if ctx.envelope().turn_id().is_none() {
        report.push(
            codes::TURN_ID_REQUIRED,
            format!("TurnId is required for {kind} requests."),
        );
    }
}
