//! The entry point: classify, run one chain, build the response, persist once.

use super::{
    AgentExecuteResponse, AgentExecuteResponseBuilder, PipelineChain, PipelinePorts,
    PipelineStepKind, ResponseKind, StepStatus,
};
use crate::cancellation::CancellationToken;
use crate::context::{
    AgentExecuteRequest, AgentPipelineContext, EntityRef, Envelope, RequestKind, TurnStatus,
};
use crate::errors::{PipelineError, Violation};
use crate::events::{NoOpProgressSink, ProgressEvent, ProgressSink};
use crate::validation::{codes, ContextValidator};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Handles execute requests end to end.
///
/// Exactly one chain runs per request. The response is built first, then
/// the session is persisted once; a failed chain or a failed build
/// persists nothing. A continuation manifest stored by the build is
/// removed again when the persist fails.
#[derive(Debug)]
pub struct AgentRequestHandler {
    ports: PipelinePorts,
    initial: PipelineChain,
    follow_on: PipelineChain,
    continuation: PipelineChain,
    builder: AgentExecuteResponseBuilder,
    validator: ContextValidator,
}

impl AgentRequestHandler {
    /// Creates a handler and its three chains.
    #[must_use]
    pub fn new(ports: PipelinePorts) -> Self {
        Self {
            initial: PipelineChain::for_kind(RequestKind::Initial, &ports),
            follow_on: PipelineChain::for_kind(RequestKind::FollowOn, &ports),
            continuation: PipelineChain::for_kind(RequestKind::ClientToolCallContinuation, &ports),
            builder: AgentExecuteResponseBuilder::new(Arc::clone(&ports.manifests)),
            validator: ContextValidator::new(),
            ports,
        }
    }

    /// The injected collaborators.
    #[must_use]
    pub fn ports(&self) -> &PipelinePorts {
        &self.ports
    }

    /// The chain serving `kind`.
    #[must_use]
    pub fn chain(&self, kind: RequestKind) -> &PipelineChain {
        match kind {
            RequestKind::Initial => &self.initial,
            RequestKind::FollowOn => &self.follow_on,
            RequestKind::ClientToolCallContinuation => &self.continuation,
        }
    }

    /// Picks the chain for an envelope.
    ///
    /// No session id means a new session; submitted tool results mean a
    /// continuation; anything else is a follow-on.
    #[must_use]
    pub fn classify(envelope: &Envelope) -> RequestKind {
        if envelope.session_id().is_none() {
            RequestKind::Initial
        } else if !envelope.tool_results().is_empty() {
            RequestKind::ClientToolCallContinuation
        } else {
            RequestKind::FollowOn
        }
    }

    /// Handles a request without narration or external cancellation.
    pub async fn handle(
        &self,
        request: AgentExecuteRequest,
        org: EntityRef,
        user: EntityRef,
    ) -> Result<AgentExecuteResponse, PipelineError> {
        self.handle_with(
            request,
            org,
            user,
            Arc::new(NoOpProgressSink),
            Arc::new(CancellationToken::new()),
        )
        .await
    }

    /// Handles a request, narrating to `progress` and honoring `cancellation`.
    pub async fn handle_with(
        &self,
        request: AgentExecuteRequest,
        org: EntityRef,
        user: EntityRef,
        progress: Arc<dyn ProgressSink>,
        cancellation: Arc<CancellationToken>,
    ) -> Result<AgentExecuteResponse, PipelineError> {
        check_shape(&request, &org, &user)?;

        let envelope = Envelope::new(request, org, user);
        let kind = Self::classify(&envelope);
        let mut ctx = AgentPipelineContext::new(kind, envelope)
            .with_progress(progress)
            .with_cancellation(cancellation);

        let report = self
            .validator
            .validate_pre_step(&ctx, PipelineStepKind::RequestHandler);
        if !report.is_valid() {
            warn!(
                correlation_id = %ctx.correlation_id(),
                kind = %kind,
                violations = ?report.codes(),
                "Request rejected"
            );
            return Err(PipelineError::InvalidRequest {
                violations: report.into_violations(),
            });
        }

        info!(correlation_id = %ctx.correlation_id(), kind = %kind, "Handling agent request");
        let correlation_id = ctx.correlation_id().to_string();
        ctx.cancellation().on_cancel(move || {
            info!(correlation_id = %correlation_id, "Cancellation requested");
        });
        ctx.publish(ProgressEvent::workflow(self.narration(kind))).await;

        let start = Instant::now();
        let status = match self.chain(kind).run(&mut ctx).await {
            Ok(status) => status,
            Err(err) => {
                error!(
                    correlation_id = %ctx.correlation_id(),
                    kind = %kind,
                    code = err.code(),
                    error = %err,
                    "Request failed"
                );
                return Err(err);
            }
        };
        if let StepStatus::Aborted { reason } = status {
            warn!(correlation_id = %ctx.correlation_id(), reason = %reason, "Request aborted");
            return Err(PipelineError::Aborted { reason });
        }

        let execution_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let terminal = ctx.is_terminal();
        if let Some(turn) = ctx.this_turn_mut() {
            turn.execution_ms = execution_ms;
            if terminal && turn.status == TurnStatus::Pending {
                turn.set_status(TurnStatus::Completed);
            }
        }

        let response = self.builder.build(&ctx).await?;
        if let Err(err) = self.persist(&mut ctx).await {
            if response.kind == ResponseKind::ClientToolContinuation {
                self.discard_manifest(&ctx, &response).await;
            }
            error!(
                correlation_id = %ctx.correlation_id(),
                code = err.code(),
                error = %err,
                "Session not persisted"
            );
            return Err(err);
        }

        info!(
            correlation_id = %ctx.correlation_id(),
            session_id = %response.session_id,
            turn_id = %response.turn_id,
            kind = ?response.kind,
            elapsed_ms = execution_ms,
            "Request completed"
        );
        Ok(response)
    }

    async fn persist(&self, ctx: &mut AgentPipelineContext) -> Result<(), PipelineError> {
        let Some(session) = ctx.session() else {
            return Err(PipelineError::Internal(
                "No session to persist after a successful chain.".to_string(),
            ));
        };

        let version = if session.version == 0 {
            self.ports.sessions.insert_session(session).await?
        } else {
            self.ports.sessions.update_session(session).await?
        };
        debug!(session_id = %session.id, version, "Session persisted");

        if let Some(session) = ctx.session_mut() {
            session.version = version;
        }
        Ok(())
    }

    /// Removes a manifest stored for a response that is not being returned.
    async fn discard_manifest(&self, ctx: &AgentPipelineContext, response: &AgentExecuteResponse) {
        let manifest_id = format!("{}.{}", response.session_id, response.turn_id);
        let org_id = &ctx.envelope().org().id;
        if let Err(err) = self.ports.manifests.remove_manifest(&manifest_id, org_id).await {
            warn!(manifest_id = %manifest_id, error = %err, "Orphaned manifest not removed");
        }
    }

    fn narration(&self, kind: RequestKind) -> &str {
        let narration = &self.ports.config.narration;
        match kind {
            RequestKind::Initial => narration.initial.as_str(),
            RequestKind::FollowOn => narration.follow_on.as_str(),
            RequestKind::ClientToolCallContinuation => narration.continuation.as_str(),
        }
    }
}

/// Identity and payload checks that need no context.
fn check_shape(
    request: &AgentExecuteRequest,
    org: &EntityRef,
    user: &EntityRef,
) -> Result<(), PipelineError> {
    let mut violations = Vec::new();
    if org.is_empty() {
        violations.push(Violation::new(codes::ORG_REQUIRED, "Envelope.Org is required."));
    }
    if user.is_empty() {
        violations.push(Violation::new(codes::USER_REQUIRED, "Envelope.User is required."));
    }
    for (index, image) in request.clipboard_images.iter().enumerate() {
        if STANDARD.decode(image.data_base64.trim()).is_err() {
            violations.push(Violation::new(
                codes::CLIPBOARD_IMAGE_INVALID,
                format!("ClipboardImages[{index}] is not valid base64."),
            ));
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::InvalidRequest { violations })
    }
}
