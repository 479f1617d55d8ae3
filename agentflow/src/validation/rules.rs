//! Per-step entry and exit rules.

use super::{manifest, ValidationReport};
use crate::context::{AgentPipelineContext, RequestKind, ResponseType};
use crate::errors::ContractPhase;
use crate::pipeline::PipelineStepKind;

/// A pure rule set for one side of one step.
pub(crate) type RuleFn = fn(&AgentPipelineContext, &mut RuleScope<'_>);

/// The entry and exit rules for a step.
#[derive(Clone, Copy)]
pub(crate) struct StepRules {
    pub pre: RuleFn,
    pub post: RuleFn,
}

/// Writes violations prefixed with the step and phase.
pub(crate) struct RuleScope<'a> {
    step: PipelineStepKind,
    phase: ContractPhase,
    report: &'a mut ValidationReport,
}

impl<'a> RuleScope<'a> {
    pub(crate) fn new(
        step: PipelineStepKind,
        phase: ContractPhase,
        report: &'a mut ValidationReport,
    ) -> Self {
        Self {
            step,
            phase,
            report,
        }
    }

    fn require(&mut self, ok: bool, rule: &str, message: &str) {
        if !ok {
            self.report.push(
                format!("{}_{}_{rule}", self.step.code_prefix(), self.phase),
                format!("{} {}: {message}", self.step, self.phase),
            );
        }
    }

    fn session_null(&mut self, ctx: &AgentPipelineContext) {
        self.require(ctx.session().is_none(), "SESSION_NOT_NULL", "ctx.Session must be null.");
        self.require(ctx.this_turn().is_none(), "TURN_NOT_NULL", "ctx.Turn must be null.");
    }

    fn session_populated(&mut self, ctx: &AgentPipelineContext) {
        self.require(ctx.session().is_some(), "SESSION_REQUIRED", "ctx.Session must be populated.");
        self.require(ctx.this_turn().is_some(), "TURN_REQUIRED", "ctx.Turn must be populated.");
    }

    fn agent_null(&mut self, ctx: &AgentPipelineContext) {
        self.require(
            ctx.agent_context().is_none(),
            "AGENT_CONTEXT_NOT_NULL",
            "ctx.AgentContext must be null.",
        );
        self.require(
            ctx.conversation_context().is_none(),
            "CONVERSATION_CONTEXT_NOT_NULL",
            "ctx.ConversationContext must be null.",
        );
    }

    fn agent_populated(&mut self, ctx: &AgentPipelineContext) {
        self.require(
            ctx.agent_context().is_some(),
            "AGENT_CONTEXT_REQUIRED",
            "ctx.AgentContext must be populated.",
        );
        self.require(
            ctx.conversation_context().is_some(),
            "CONVERSATION_CONTEXT_REQUIRED",
            "ctx.ConversationContext must be populated.",
        );
    }

    fn envelope_ids(&mut self, ctx: &AgentPipelineContext) {
        self.require(
            ctx.envelope().session_id().is_some(),
            "ENVELOPE_SESSION_ID_REQUIRED",
            "Envelope.SessionId is required.",
        );
        self.require(
            ctx.envelope().turn_id().is_some(),
            "ENVELOPE_TURN_ID_REQUIRED",
            "Envelope.TurnId is required.",
        );
    }

    fn manifest_valid(&mut self, ctx: &AgentPipelineContext) {
        self.report.merge(manifest::validate(ctx.tool_manifest()));
    }
}

fn none(_: &AgentPipelineContext, _: &mut RuleScope<'_>) {}

fn this_turn_id(ctx: &AgentPipelineContext) -> Option<&str> {
    ctx.this_turn().map(|t| t.id.as_str())
}

// --- SessionRestorer -------------------------------------------------

fn session_restorer_pre(ctx: &AgentPipelineContext, r: &mut RuleScope<'_>) {
    r.envelope_ids(ctx);
    r.session_null(ctx);
}

fn session_restorer_post(ctx: &AgentPipelineContext, r: &mut RuleScope<'_>) {
    r.session_populated(ctx);
    r.require(
        ctx.session().is_some_and(|s| !s.mode.trim().is_empty()),
        "SESSION_MODE_REQUIRED",
        "Session.Mode must have a value.",
    );
    r.require(
        this_turn_id(ctx).is_none() || this_turn_id(ctx) != ctx.envelope().turn_id(),
        "TURN_ID_NOT_NEW",
        "Turn.Id must NOT equal Envelope.TurnId.",
    );
}

// --- AgentContextResolver --------------------------------------------

fn agent_context_resolver_pre(ctx: &AgentPipelineContext, r: &mut RuleScope<'_>) {
    r.session_null(ctx);
}

fn agent_populated(ctx: &AgentPipelineContext, r: &mut RuleScope<'_>) {
    r.agent_populated(ctx);
}

// --- ClientToolCallSessionRestorer -----------------------------------

fn client_session_restorer_pre(ctx: &AgentPipelineContext, r: &mut RuleScope<'_>) {
    r.envelope_ids(ctx);
    r.session_null(ctx);
}

fn client_session_restorer_post(ctx: &AgentPipelineContext, r: &mut RuleScope<'_>) {
    r.session_populated(ctx);
    r.require(
        this_turn_id(ctx).is_none() || this_turn_id(ctx) == ctx.envelope().turn_id(),
        "TURN_ID_MISMATCH",
        "Turn.Id must equal Envelope.TurnId.",
    );
}

// --- ClientToolContinuationResolver ----------------------------------

fn continuation_resolver_pre(ctx: &AgentPipelineContext, r: &mut RuleScope<'_>) {
    r.agent_null(ctx);
    r.session_populated(ctx);
    r.require(
        !ctx.envelope().tool_results().is_empty(),
        "TOOL_RESULTS_REQUIRED",
        "Envelope.ToolResults must contain at least one row.",
    );
}

fn continuation_resolver_post(ctx: &AgentPipelineContext, r: &mut RuleScope<'_>) {
    r.agent_null(ctx);
    r.session_populated(ctx);
    r.require(
        this_turn_id(ctx).is_none() || this_turn_id(ctx) == ctx.envelope().turn_id(),
        "TURN_ID_MISMATCH",
        "Turn.Id must equal Envelope.TurnId.",
    );
    let populated = !ctx.tool_manifest().is_empty();
    r.require(populated, "MANIFEST_REQUIRED", "ToolCallManifest must be populated.");
    if populated {
        r.manifest_valid(ctx);
    }
}

// --- AgentSessionCreator ---------------------------------------------

fn session_creator_pre(ctx: &AgentPipelineContext, r: &mut RuleScope<'_>) {
    r.agent_populated(ctx);
    r.session_null(ctx);
}

fn session_populated(ctx: &AgentPipelineContext, r: &mut RuleScope<'_>) {
    r.session_populated(ctx);
}

// --- PromptKnowledgeProviderInitializer ------------------------------

fn knowledge_initializer_pre(ctx: &AgentPipelineContext, r: &mut RuleScope<'_>) {
    r.session_populated(ctx);
    r.agent_populated(ctx);
    if ctx.kind() == RequestKind::ClientToolCallContinuation {
        r.require(
            !ctx.tool_manifest().is_empty(),
            "MANIFEST_REQUIRED",
            "ToolCallManifest must be non-null for tool continuation.",
        );
    }
}

// --- Reasoner --------------------------------------------------------

fn reasoner_pre(ctx: &AgentPipelineContext, r: &mut RuleScope<'_>) {
    r.session_populated(ctx);
    r.agent_populated(ctx);
    r.require(
        ctx.knowledge.is_populated(),
        "KNOWLEDGE_PROVIDER_REQUIRED",
        "ctx.PromptKnowledgeProvider must be populated.",
    );
}

fn reasoner_post(ctx: &AgentPipelineContext, r: &mut RuleScope<'_>) {
    let has_payload = ctx.response_payload().is_some();
    let has_client_calls = ctx.has_client_tool_calls();
    r.require(
        !(has_payload && has_client_calls),
        "PAYLOAD_AND_CLIENT_CALLS",
        "ResponsePayload and client ToolCalls cannot both be present.",
    );
    r.require(
        has_payload || has_client_calls,
        "NO_OUTCOME",
        "Must produce either a ResponsePayload (final) or client ToolCalls (tool continuation).",
    );
}

// --- LLMClient -------------------------------------------------------

fn llm_client_pre(ctx: &AgentPipelineContext, r: &mut RuleScope<'_>) {
    r.require(
        ctx.response_payload().is_none(),
        "PAYLOAD_NOT_NULL",
        "ResponsePayload must be null.",
    );
    if ctx.kind() == RequestKind::ClientToolCallContinuation {
        let populated = !ctx.tool_manifest().is_empty();
        r.require(
            populated,
            "MANIFEST_REQUIRED",
            "ToolCallManifest must be populated for ClientToolCallContinuation.",
        );
        if populated {
            r.manifest_valid(ctx);
        }
    }
}

fn llm_client_post(ctx: &AgentPipelineContext, r: &mut RuleScope<'_>) {
    let has_payload = ctx.response_payload().is_some();
    let has_calls = ctx.has_pending_tool_calls();
    r.require(
        !(has_payload && has_calls),
        "PAYLOAD_AND_TOOL_CALLS",
        "ResponsePayload and pending ToolCalls cannot both be present.",
    );
    r.require(
        has_payload || has_calls,
        "NO_OUTCOME",
        "Must produce either a ResponsePayload (final) or ToolCalls to execute.",
    );
}

// --- ResponseBuilder -------------------------------------------------

fn response_builder(ctx: &AgentPipelineContext, r: &mut RuleScope<'_>) {
    match ctx.response_type() {
        ResponseType::NotReady => {
            r.require(false, "NOT_READY", "ResponseType must not be NotReady.");
        }
        ResponseType::Final => {
            r.require(
                ctx.response_payload()
                    .is_some_and(crate::context::ResponsePayload::has_primary_output),
                "PRIMARY_OUTPUT_REQUIRED",
                "ResponsePayload.PrimaryOutputText is required for Final responses.",
            );
        }
        ResponseType::ToolContinuation => {
            r.require(
                !ctx.tool_manifest().is_empty(),
                "MANIFEST_REQUIRED",
                "ToolCallManifest is required for ToolContinuation responses.",
            );
        }
        ResponseType::Acp => {}
    }
}

/// Rule lookup; exhaustive over every step kind.
pub(crate) fn rules_for(step: PipelineStepKind) -> StepRules {
    match step {
        PipelineStepKind::RequestHandler => StepRules { pre: none, post: none },
        PipelineStepKind::SessionRestorer => StepRules {
            pre: session_restorer_pre,
            post: session_restorer_post,
        },
        PipelineStepKind::AgentContextResolver => StepRules {
            pre: agent_context_resolver_pre,
            post: agent_populated,
        },
        PipelineStepKind::ClientToolCallSessionRestorer => StepRules {
            pre: client_session_restorer_pre,
            post: client_session_restorer_post,
        },
        PipelineStepKind::ClientToolContinuationResolver => StepRules {
            pre: continuation_resolver_pre,
            post: continuation_resolver_post,
        },
        PipelineStepKind::AgentSessionCreator => StepRules {
            pre: session_creator_pre,
            post: session_populated,
        },
        PipelineStepKind::AgentContextLoader => StepRules {
            pre: session_populated,
            post: agent_populated,
        },
        PipelineStepKind::AcpCommandHandler => StepRules {
            pre: session_populated,
            post: none,
        },
        PipelineStepKind::PromptKnowledgeProviderInitializer => StepRules {
            pre: knowledge_initializer_pre,
            post: none,
        },
        PipelineStepKind::Reasoner => StepRules {
            pre: reasoner_pre,
            post: reasoner_post,
        },
        PipelineStepKind::LLMClient => StepRules {
            pre: llm_client_pre,
            post: llm_client_post,
        },
        PipelineStepKind::ResponseBuilder => StepRules {
            pre: response_builder,
            post: response_builder,
        },
    }
}
