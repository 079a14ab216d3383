//! Chat orchestrator: one user question in, one policy-checked answer out.
//!
//! Stages run strictly in order:
//!
//! ```text
//! received → injection-checked → safety-checked → classified → branch
//!          → output-validated → logged → responded
//! ```
//!
//! Any gate may exit early. This is the only place where pipeline errors
//! become caller-facing status codes and text ([`ChatFailure`]).

use std::sync::Arc;
use std::time::{Duration, Instant};

use carebot_common::{Action, CarebotError, ErrorClass, Intent, RecommendedAction, RecordQuerySpec, Result, RiskLevel};
use carebot_config::ChatbotConfig;
use carebot_db::{MedicalRecordQueryService, PatientRecordStore};
use carebot_llm::{
    ActionPlan, ClassifierBackend, GenerativeAnswer, GenerativeAnswerService, GenerativePromptSpec,
    InstructionTemplate, IntentRouter, LlmBackend, SAFE_REFUSAL,
};
use carebot_monitoring::{telemetry, AuditLog, NewAuditEntry};
use carebot_security::safety::emergency_template;
use carebot_security::{summarize_medical_data, PiiSanitizer, SafetyCheckResult, SafetyGate};
use uuid::Uuid;

use crate::response::{ChatFailure, ChatRequest, ChatbotResponse, ResponseMetadata};
use crate::templates::{self, LocalReply};
use crate::tools::{ToolInfo, ToolRegistry};

const INJECTION_ISSUE: &str = "Prompt injection attempt";
const EMERGENCY_INTENT_ISSUE: &str = "Emergency intent";

// ── Options ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub enable_pii_detection: bool,
    pub enable_safety_gate: bool,
    pub enable_audit_logging: bool,
    /// Chars of context handed to the generative model.
    pub max_context_length: usize,
    pub max_question_chars: usize,
    pub request_timeout: Duration,
    /// Replaces the built-in emergency keyword list when set.
    pub emergency_keywords: Option<Vec<String>>,
}

impl PipelineOptions {
    pub fn from_config(config: &ChatbotConfig) -> Self {
        let pipeline = &config.pipeline;
        Self {
            enable_pii_detection: pipeline.enable_pii_detection,
            enable_safety_gate: pipeline.enable_safety_gate,
            enable_audit_logging: pipeline.enable_audit_logging,
            max_context_length: pipeline.max_context_length,
            max_question_chars: config.server.max_question_chars,
            request_timeout: pipeline.request_timeout(),
            emergency_keywords: pipeline.emergency_keywords.clone(),
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from_config(&ChatbotConfig::default())
    }
}

/// Remote and stateful collaborators, all behind ports.
pub struct Collaborators {
    pub classifier: Arc<dyn ClassifierBackend>,
    pub llm: Arc<dyn LlmBackend>,
    pub records: Arc<dyn PatientRecordStore>,
    pub audit: Arc<AuditLog>,
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

pub struct ChatOrchestrator {
    sanitizer: PiiSanitizer,
    safety: SafetyGate,
    pub(crate) router: IntentRouter,
    records: MedicalRecordQueryService,
    pub(crate) generative: GenerativeAnswerService,
    audit: Arc<AuditLog>,
    tools: ToolRegistry,
    options: PipelineOptions,
}

/// What a branch produced, before output validation.
struct Reply {
    text: String,
    confidence: f64,
    sources: Vec<String>,
    warning: Option<String>,
    db_collection: Option<&'static str>,
    pii_removed: bool,
    /// PII categories found in the user's own text.
    pii_types: Vec<String>,
}

impl Reply {
    fn local(text: impl Into<String>, confidence: f64) -> Self {
        Self {
            text: text.into(),
            confidence,
            sources: Vec::new(),
            warning: None,
            db_collection: None,
            pii_removed: false,
            pii_types: Vec::new(),
        }
    }
}

/// Per-request identity threaded through the stages.
struct Caller<'a> {
    session_id: &'a str,
    user_id: Option<&'a str>,
    ip: Option<&'a str>,
}

impl ChatOrchestrator {
    pub fn new(parts: Collaborators, options: PipelineOptions) -> Self {
        let safety = match &options.emergency_keywords {
            Some(keywords) => SafetyGate::new(keywords.iter().cloned()),
            None => SafetyGate::default(),
        };
        Self {
            sanitizer: PiiSanitizer::new(),
            safety,
            router: IntentRouter::new(parts.classifier),
            records: MedicalRecordQueryService::new(parts.records),
            generative: GenerativeAnswerService::new(parts.llm),
            audit: parts.audit,
            tools: ToolRegistry::builtin(),
            options,
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Admin tools the classifier may route to.
    pub fn tools(&self) -> Vec<ToolInfo> {
        self.tools.catalog()
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Forget the classifier's memoized health probe.
    pub fn reset_classifier_health(&mut self) {
        self.router.reset_health();
    }

    /// Run the whole pipeline for one question under the request budget.
    pub async fn ask(&self, request: ChatRequest) -> std::result::Result<ChatbotResponse, ChatFailure> {
        let started = Instant::now();
        let session_id = session_id_for(&request);

        let outcome = match tokio::time::timeout(self.options.request_timeout, self.run(&request, &session_id)).await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(CarebotError::service_unavailable(
                "pipeline",
                format!("request exceeded {} ms", self.options.request_timeout.as_millis()),
            )),
        };

        let elapsed = started.elapsed();
        telemetry::observe_chat_latency(elapsed.as_secs_f64());

        match outcome {
            Ok(response) => {
                telemetry::record_chat_request(response.intent.as_str(), response.action_taken.as_str());
                tracing::info!(
                    session_id = %session_id,
                    intent = response.intent.as_str(),
                    action = response.action_taken.as_str(),
                    safety_level = %response.metadata.safety_level,
                    latency_ms = elapsed.as_millis() as u64,
                    "Chat request answered"
                );
                Ok(response)
            }
            Err(err) => {
                telemetry::record_chat_failure(err.code());
                match err.class() {
                    ErrorClass::Client => {
                        tracing::info!(session_id = %session_id, code = err.code(), "Chat request rejected")
                    }
                    ErrorClass::Upstream => {
                        tracing::warn!(session_id = %session_id, error = %err, "Upstream failure")
                    }
                    ErrorClass::Internal => {
                        tracing::error!(session_id = %session_id, error = %err, "Chat pipeline failed")
                    }
                }
                Err(ChatFailure::from(&err))
            }
        }
    }

    async fn run(&self, request: &ChatRequest, session_id: &str) -> Result<ChatbotResponse> {
        // received
        let question = request.question.trim();
        if question.is_empty() {
            return Err(CarebotError::BadRequest(templates::EMPTY_QUESTION.into()));
        }
        if question.chars().count() > self.options.max_question_chars {
            return Err(CarebotError::BadRequest(templates::question_too_long(self.options.max_question_chars)));
        }
        let caller = Caller {
            session_id,
            user_id: request.user_id.as_deref().map(str::trim).filter(|u| !u.is_empty()),
            ip: request.ip_address.as_deref(),
        };

        // injection-checked
        let injection = self.sanitizer.detect_prompt_injection(question);
        if injection.detected {
            tracing::warn!(session_id, patterns = injection.reasons.len(), "Prompt injection detected");
            if let Some(audit) = self.audit() {
                audit
                    .log_safety_alert(session_id, caller.user_id, RiskLevel::High, &[INJECTION_ISSUE.into()], caller.ip)
                    .await?;
            }
            return Err(CarebotError::PolicyViolation("prompt injection".into()));
        }

        // safety-checked
        let safety = if self.options.enable_safety_gate {
            self.safety.check_safety(question)
        } else {
            SafetyCheckResult::proceed()
        };
        if safety.recommended_action != RecommendedAction::Proceed {
            tracing::info!(
                session_id,
                risk_level = %safety.risk_level,
                issues = safety.detected_issues.len(),
                "Safety gate flagged input"
            );
            if let Some(audit) = self.audit() {
                audit
                    .log_safety_alert(session_id, caller.user_id, safety.risk_level, &safety.detected_issues, caller.ip)
                    .await?;
            }
        }
        if safety.recommended_action == RecommendedAction::Emergency {
            return Ok(self.emergency_short_circuit(session_id, &safety));
        }

        // classified
        let classification = self.router.classify_intent(question).await?;
        if !classification.safety_flags.is_empty() {
            tracing::warn!(session_id, flags = ?classification.safety_flags, "Classifier raised safety flags");
        }
        let action = classification.action();
        if classification.requires_auth && caller.user_id.is_none() {
            return Err(self.reject_unauthenticated(&caller, action).await);
        }

        // branch
        let reply = match &classification.plan {
            ActionPlan::ReplyLocally(content) => Reply::local(
                content.clone().unwrap_or_else(|| LocalReply::Greeting.text().to_string()),
                classification.confidence,
            ),
            ActionPlan::QueryRecords(spec) => self.answer_from_records(question, spec, &caller).await?,
            ActionPlan::CallGenerative(spec) => {
                self.answer_generative(spec, classification.intent, &safety, &caller).await?
            }
            ActionPlan::CallAdminTool(invocation) => {
                Reply::local(self.tools.dispatch(invocation), classification.confidence)
            }
            ActionPlan::EmergencyResponse => {
                if let Some(audit) = self.audit() {
                    audit
                        .log_safety_alert(
                            session_id,
                            caller.user_id,
                            RiskLevel::Critical,
                            &[EMERGENCY_INTENT_ISSUE.into()],
                            caller.ip,
                        )
                        .await?;
                }
                let keywords = safety.emergency_keywords.clone().unwrap_or_default();
                Reply::local(emergency_template(&keywords), classification.confidence)
            }
        };
        let safety_level = match action {
            Action::EmergencyResponse => RiskLevel::Critical,
            _ => safety.risk_level,
        };

        // output-validated
        let mut text = reply.text;
        if self.options.enable_safety_gate {
            let check = self.safety.validate_ai_response(&text);
            if !check.is_safe {
                tracing::warn!(session_id, issues = ?check.issues, "Unsafe answer replaced with refusal");
                text = SAFE_REFUSAL.to_string();
            }
        }

        // logged
        if let Some(audit) = self.audit() {
            let mut entry = NewAuditEntry::new(session_id, format!("CHAT_{}", action.as_str()), safety_level)
                .user(caller.user_id)
                .ip(caller.ip);
            if let Some(collection) = reply.db_collection {
                entry = entry.db(Some(collection));
            }
            if !reply.pii_types.is_empty() {
                entry = entry.pii(reply.pii_types.iter().cloned());
            }
            audit.log_interaction(entry).await?;
        }

        // responded
        Ok(ChatbotResponse {
            success: true,
            reply: text,
            confidence: reply.confidence,
            intent: classification.intent,
            action_taken: action,
            sources: reply.sources,
            warning: reply.warning,
            session_id: session_id.to_string(),
            metadata: ResponseMetadata {
                pii_removed: reply.pii_removed,
                db_accessed: reply.db_collection.is_some(),
                safety_level,
            },
        })
    }

    // ── Branches ──────────────────────────────────────────────────────────────

    fn emergency_short_circuit(&self, session_id: &str, safety: &SafetyCheckResult) -> ChatbotResponse {
        ChatbotResponse {
            success: true,
            reply: self.safety.generate_safety_response(safety),
            confidence: 1.0,
            intent: Intent::Emergency,
            action_taken: Action::EmergencyResponse,
            sources: Vec::new(),
            warning: None,
            session_id: session_id.to_string(),
            metadata: ResponseMetadata { pii_removed: false, db_accessed: false, safety_level: safety.risk_level },
        }
    }

    async fn answer_from_records(&self, question: &str, spec: &RecordQuerySpec, caller: &Caller<'_>) -> Result<Reply> {
        let Some(user_id) = caller.user_id else {
            return Err(self.reject_unauthenticated(caller, Action::QueryRecords).await);
        };

        let result = self.records.query(spec, user_id).await?;
        let collection = result.metadata.collection.as_str();
        if let Some(audit) = self.audit() {
            audit
                .log_database_access(caller.session_id, user_id, collection, result.metadata.count, caller.ip)
                .await?;
        }

        if result.metadata.count == 0 {
            let mut reply = Reply::local(templates::NOTHING_FOUND, 1.0);
            reply.db_collection = Some(collection);
            return Ok(reply);
        }

        let sanitized = self.sanitizer.sanitize_record(&result.raw_data);
        tracing::debug!(
            session_id = caller.session_id,
            records = sanitized.metadata.original_record_count,
            fields_removed = sanitized.metadata.fields_removed.len(),
            "Records sanitized"
        );
        let summary = summarize_medical_data(&sanitized.sanitized, result.metadata.collection);

        let (prompt, pii_types) = self.sanitize_question(question, caller).await?;
        let mut prompt_spec = GenerativePromptSpec::new(prompt, InstructionTemplate::DataAnalysis)
            .with_context(truncate_chars(&summary, self.options.max_context_length));
        prompt_spec.pii_already_removed = true;

        let answer = self.generate(&prompt_spec, caller).await?;
        Ok(Reply {
            text: answer.answer,
            confidence: answer.confidence,
            sources: answer.sources,
            warning: Some(answer.warning),
            db_collection: Some(collection),
            pii_removed: true,
            pii_types,
        })
    }

    async fn answer_generative(
        &self,
        spec: &GenerativePromptSpec,
        intent: Intent,
        safety: &SafetyCheckResult,
        caller: &Caller<'_>,
    ) -> Result<Reply> {
        let (prompt, pii_types) = self.sanitize_question(&spec.sanitized_prompt, caller).await?;

        let template = match intent {
            Intent::LiveInputAnalysis => InstructionTemplate::DataAnalysis,
            Intent::GeneralMedicalQa => InstructionTemplate::GeneralEducation,
            _ => InstructionTemplate::MedicalConsultant,
        };
        let mut prompt_spec = GenerativePromptSpec::new(prompt, template);
        prompt_spec.temperature = spec.temperature;
        prompt_spec.pii_already_removed = spec.pii_already_removed || self.options.enable_pii_detection;
        if let Some(context) = spec.context_data.as_deref() {
            let context = if self.options.enable_pii_detection {
                self.sanitizer.sanitize_text(context).sanitized_text
            } else {
                context.to_string()
            };
            prompt_spec = prompt_spec.with_context(truncate_chars(&context, self.options.max_context_length));
        }

        let answer = self.generate(&prompt_spec, caller).await?;

        // The warn template is only carried into this branch.
        let text = if safety.recommended_action == RecommendedAction::Warn {
            format!("{}\n\n{}", self.safety.generate_safety_response(safety), answer.answer)
        } else {
            answer.answer
        };

        Ok(Reply {
            text,
            confidence: answer.confidence,
            sources: answer.sources,
            warning: Some(answer.warning),
            db_collection: None,
            pii_removed: !pii_types.is_empty(),
            pii_types,
        })
    }

    // ── Stage helpers ─────────────────────────────────────────────────────────

    fn audit(&self) -> Option<&AuditLog> {
        self.options.enable_audit_logging.then_some(self.audit.as_ref())
    }

    async fn reject_unauthenticated(&self, caller: &Caller<'_>, action: Action) -> CarebotError {
        let reason = format!("{} requires an authenticated user", action.as_str());
        if let Some(audit) = self.audit() {
            if let Err(e) = audit.log_auth_failure(caller.session_id, &reason, caller.ip).await {
                tracing::error!(session_id = caller.session_id, error = %e, "Failed to record auth failure");
            }
        }
        CarebotError::Unauthenticated(reason)
    }

    /// Redact PII from user-authored text. Returns the text to send on and
    /// the categories that were found.
    async fn sanitize_question(&self, text: &str, caller: &Caller<'_>) -> Result<(String, Vec<String>)> {
        if !self.options.enable_pii_detection {
            return Ok((text.to_string(), Vec::new()));
        }
        let detection = self.sanitizer.sanitize_text(text);
        if !detection.has_pii {
            return Ok((detection.sanitized_text, Vec::new()));
        }

        let types: Vec<String> = detection.detected_types.iter().map(|k| k.as_str().to_string()).collect();
        tracing::info!(session_id = caller.session_id, types = ?types, "PII removed from question");
        self.sanitizer.validate_sanitization(&detection.sanitized_text);
        if let Some(audit) = self.audit() {
            audit
                .log_pii_detection(caller.session_id, caller.user_id, &types, "user_question", caller.ip)
                .await?;
        }
        Ok((detection.sanitized_text, types))
    }

    /// Generate, then validate; one rewrite, and a refusal if that still
    /// fails validation.
    async fn generate(&self, spec: &GenerativePromptSpec, caller: &Caller<'_>) -> Result<GenerativeAnswer> {
        let mut answer = self.generative.generate_response(spec).await?;

        let check = self.generative.validate_response(&answer.answer);
        if !check.is_valid {
            tracing::warn!(session_id = caller.session_id, issues = ?check.issues, "Generated answer rewritten");
            answer.answer = self.generative.rewrite_response(&answer.answer, &check.issues).await;
            if !self.generative.validate_response(&answer.answer).is_valid {
                answer.answer = SAFE_REFUSAL.to_string();
            }
        }

        if let Some(audit) = self.audit() {
            audit
                .log_generative_call(caller.session_id, caller.user_id, spec.pii_already_removed, caller.ip)
                .await?;
        }
        Ok(answer)
    }
}

fn session_id_for(request: &ChatRequest) -> String {
    if let Some(session_id) = request.session_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        return session_id.to_string();
    }
    match request.user_id.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        Some(user_id) => format!("user-{user_id}"),
        None => format!("anon-{}", Uuid::new_v4()),
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
