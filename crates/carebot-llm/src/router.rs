//! Intent router: remote classification behind a health gate.
//!
//! The first classification on a router instance probes the classifier's
//! health endpoint. A successful probe is memoized; a failed one is not,
//! so the next request re-checks. Whatever the classifier returns is
//! validated against closed enums before any branch is selected. Nothing
//! is guessed: a malformed response is [`LlmError::Unavailable`].

use std::sync::Arc;

use carebot_common::{Action, Intent, RecordCategory, RecordQuerySpec, TimeFrame};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::OnceCell;

use crate::backend::LlmError;
use crate::classifier::{ClassifierBackend, ClassifierHealth};
use crate::generative::{GenerativePromptSpec, InstructionTemplate};

const DEFAULT_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub tool_args: Map<String, Value>,
}

/// Action-specific payload. The variant is the action, so a result can
/// never carry a payload for a different branch.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionPlan {
    QueryRecords(RecordQuerySpec),
    CallGenerative(GenerativePromptSpec),
    CallAdminTool(ToolInvocation),
    ReplyLocally(Option<String>),
    EmergencyResponse,
}

impl ActionPlan {
    pub fn action(&self) -> Action {
        match self {
            ActionPlan::QueryRecords(_)   => Action::QueryRecords,
            ActionPlan::CallGenerative(_) => Action::CallGenerative,
            ActionPlan::CallAdminTool(_)  => Action::CallAdminTool,
            ActionPlan::ReplyLocally(_)   => Action::ReplyLocally,
            ActionPlan::EmergencyResponse => Action::EmergencyResponse,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub intent: Intent,
    pub confidence: f64,
    pub requires_auth: bool,
    pub detected_pii: Vec<String>,
    pub safety_flags: Vec<String>,
    pub plan: ActionPlan,
}

impl ClassificationResult {
    pub fn action(&self) -> Action {
        self.plan.action()
    }
}

/// Point-in-time classifier status for the health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifierStatus {
    pub healthy: bool,
    pub mode: Option<String>,
    pub model: Option<String>,
    pub detail: Option<String>,
}

pub struct IntentRouter {
    backend: Arc<dyn ClassifierBackend>,
    health: OnceCell<ClassifierHealth>,
}

impl IntentRouter {
    pub fn new(backend: Arc<dyn ClassifierBackend>) -> Self {
        Self { backend, health: OnceCell::new() }
    }

    pub async fn classify_intent(&self, user_input: &str) -> Result<ClassificationResult, LlmError> {
        let input = user_input.trim();
        if input.is_empty() {
            return Err(LlmError::Unavailable("user input must be a non-empty string".into()));
        }

        self.ensure_healthy().await?;

        let raw = self.backend.classify(input).await?;
        let result = validate_and_normalize(&raw, input)?;
        tracing::debug!(
            intent = result.intent.as_str(),
            action = result.action().as_str(),
            confidence = result.confidence,
            "Intent classified"
        );
        Ok(result)
    }

    /// Forget a memoized health probe.
    pub fn reset_health(&mut self) {
        self.health = OnceCell::new();
    }

    pub fn is_health_cached(&self) -> bool {
        self.health.initialized()
    }

    /// Fresh probe for monitoring. Does not touch the memoized outcome.
    pub async fn status(&self) -> ClassifierStatus {
        match self.backend.health().await {
            Ok(health) => {
                let detail = evaluate_health(&health).err().map(|e| e.to_string());
                ClassifierStatus {
                    healthy: detail.is_none(),
                    mode: health.mode,
                    model: health.model,
                    detail,
                }
            }
            Err(e) => ClassifierStatus { healthy: false, mode: None, model: None, detail: Some(e.to_string()) },
        }
    }

    async fn ensure_healthy(&self) -> Result<(), LlmError> {
        self.health
            .get_or_try_init(|| async {
                let health = self.backend.health().await?;
                evaluate_health(&health)?;
                tracing::info!(
                    url = self.backend.base_url(),
                    model = health.model.as_deref().unwrap_or("unknown"),
                    "Classifier healthy"
                );
                Ok::<_, LlmError>(health)
            })
            .await
            .map(|_| ())
            .inspect_err(|e| tracing::warn!(error = %e, "Classifier health check failed"))
    }
}

fn evaluate_health(health: &ClassifierHealth) -> Result<(), LlmError> {
    if health.status.as_deref() != Some("ok") {
        return Err(LlmError::Unavailable("classifier health check returned non-ok status".into()));
    }
    if health.mode.as_deref() != Some("model") {
        return Err(LlmError::Unavailable(format!(
            "classifier must run in model mode (mode: {})",
            health.mode.as_deref().unwrap_or("unknown")
        )));
    }
    Ok(())
}

// ── Validation ────────────────────────────────────────────────────────────────

fn contract(message: &str) -> LlmError {
    LlmError::Unavailable(format!("classifier returned {message}"))
}

fn non_blank(value: &Value) -> Option<&str> {
    value.as_str().map(str::trim).filter(|s| !s.is_empty())
}

fn field<'a>(obj: &'a Map<String, Value>, key: &str) -> &'a Value {
    obj.get(key).unwrap_or(&Value::Null)
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

/// Strict validation of a raw classifier response. `fallback_prompt` is
/// used only when a generative call arrives without its payload.
pub fn validate_and_normalize(raw: &Value, fallback_prompt: &str) -> Result<ClassificationResult, LlmError> {
    let obj = raw.as_object().ok_or_else(|| contract("invalid JSON (expected object)"))?;

    let intent = obj
        .get("intent")
        .and_then(Value::as_str)
        .and_then(Intent::from_wire)
        .ok_or_else(|| contract("invalid intent"))?;
    let action = obj
        .get("action")
        .and_then(Value::as_str)
        .and_then(Action::from_wire)
        .ok_or_else(|| contract("invalid action"))?;

    let confidence = obj
        .get("confidence")
        .and_then(Value::as_f64)
        .filter(|c| c.is_finite())
        .map_or(DEFAULT_CONFIDENCE, |c| c.clamp(0.0, 1.0));

    let requires_auth = action == Action::QueryRecords || field(obj, "requires_auth").as_bool().unwrap_or(false);

    let plan = match action {
        Action::QueryRecords   => ActionPlan::QueryRecords(parse_query_spec(field(obj, "db_query_spec"))?),
        Action::CallGenerative => ActionPlan::CallGenerative(parse_generative_spec(field(obj, "gemini_payload_spec"), fallback_prompt)),
        Action::CallAdminTool  => ActionPlan::CallAdminTool(parse_tool_params(field(obj, "tool_params"))?),
        Action::ReplyLocally   => ActionPlan::ReplyLocally(non_blank(field(obj, "local_reply_content")).map(str::to_string)),
        Action::EmergencyResponse => ActionPlan::EmergencyResponse,
    };

    Ok(ClassificationResult {
        intent,
        confidence,
        requires_auth,
        detected_pii: string_list(field(obj, "detected_pii")),
        safety_flags: string_list(field(obj, "safety_flags")),
        plan,
    })
}

fn parse_query_spec(value: &Value) -> Result<RecordQuerySpec, LlmError> {
    let obj = value.as_object().ok_or_else(|| contract("SEARCH_DB without db_query_spec"))?;

    let category = obj
        .get("target_collection")
        .and_then(Value::as_str)
        .and_then(RecordCategory::from_wire)
        .ok_or_else(|| contract("invalid db_query_spec.target_collection"))?;
    let time_frame = obj
        .get("time_frame")
        .and_then(Value::as_str)
        .and_then(TimeFrame::from_wire)
        .ok_or_else(|| contract("invalid db_query_spec.time_frame"))?;

    let keywords: Vec<String> = obj
        .get("keywords")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .filter(|k| !k.trim().is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let mut spec = RecordQuerySpec::new(category, time_frame)
        .with_keywords(keywords)
        .with_limit(obj.get("limit").and_then(Value::as_f64).filter(|l| l.is_finite()));
    spec.specific_date = obj.get("specific_date").and_then(non_blank).map(str::to_string);
    Ok(spec)
}

fn parse_generative_spec(value: &Value, fallback_prompt: &str) -> GenerativePromptSpec {
    let Some(obj) = value.as_object() else {
        return GenerativePromptSpec::fallback(fallback_prompt);
    };

    GenerativePromptSpec {
        pii_already_removed: obj.get("is_pii_removed").and_then(Value::as_bool).unwrap_or(false),
        sanitized_prompt: obj
            .get("sanitized_user_prompt")
            .and_then(non_blank)
            .unwrap_or(fallback_prompt)
            .to_string(),
        system_instruction_hint: obj
            .get("system_instruction_hint")
            .and_then(non_blank)
            .unwrap_or(InstructionTemplate::MedicalConsultant.as_hint())
            .to_string(),
        context_data: obj.get("context_data").and_then(non_blank).map(str::to_string),
        temperature: obj
            .get("temperature")
            .and_then(Value::as_f64)
            .filter(|t| t.is_finite())
            .map(|t| t as f32),
    }
}

fn parse_tool_params(value: &Value) -> Result<ToolInvocation, LlmError> {
    let obj = value.as_object().ok_or_else(|| contract("CALL_ADMIN_TOOL without tool_params"))?;
    let tool_name = obj
        .get("tool_name")
        .and_then(non_blank)
        .ok_or_else(|| contract("invalid tool_params.tool_name"))?;
    let tool_args = obj.get("tool_args").and_then(Value::as_object).cloned().unwrap_or_default();
    Ok(ToolInvocation { tool_name: tool_name.to_string(), tool_args })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct MockClassifier {
        health: Mutex<Vec<Result<ClassifierHealth, LlmError>>>,
        reply: Value,
        health_calls: AtomicUsize,
        classify_calls: AtomicUsize,
    }

    impl MockClassifier {
        fn new(health: Vec<Result<ClassifierHealth, LlmError>>, reply: Value) -> Arc<Self> {
            Arc::new(Self {
                health: Mutex::new(health),
                reply,
                health_calls: AtomicUsize::new(0),
                classify_calls: AtomicUsize::new(0),
            })
        }
    }

    fn healthy() -> ClassifierHealth {
        ClassifierHealth { status: Some("ok".into()), mode: Some("model".into()), model: Some("qwen".into()) }
    }

    #[async_trait]
    impl ClassifierBackend for MockClassifier {
        async fn health(&self) -> Result<ClassifierHealth, LlmError> {
            self.health_calls.fetch_add(1, Ordering::SeqCst);
            let mut queue = self.health.lock().unwrap();
            if queue.len() > 1 { queue.remove(0) } else {
                match queue.first() {
                    Some(Ok(h)) => Ok(h.clone()),
                    _ => Err(LlmError::Unavailable("down".into())),
                }
            }
        }
        async fn classify(&self, _input: &str) -> Result<Value, LlmError> {
            self.classify_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
        fn base_url(&self) -> &str { "mock://classifier" }
    }

    fn qa_reply() -> Value {
        json!({ "intent": "GENERAL_MEDICAL_QA", "action": "CALL_GEMINI", "confidence": 0.8 })
    }

    #[tokio::test]
    async fn test_health_is_memoized_after_success() {
        let backend = MockClassifier::new(vec![Ok(healthy())], qa_reply());
        let router = IntentRouter::new(backend.clone());
        router.classify_intent("Sốt là gì?").await.unwrap();
        router.classify_intent("Ho là gì?").await.unwrap();
        assert_eq!(backend.health_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.classify_calls.load(Ordering::SeqCst), 2);
        assert!(router.is_health_cached());
    }

    #[tokio::test]
    async fn test_failed_health_is_not_cached() {
        let backend = MockClassifier::new(
            vec![Err(LlmError::Unavailable("timeout".into())), Ok(healthy())],
            qa_reply(),
        );
        let router = IntentRouter::new(backend.clone());
        let err = router.classify_intent("Sốt là gì?").await.unwrap_err();
        assert!(matches!(err, LlmError::Unavailable(_)));
        assert_eq!(backend.classify_calls.load(Ordering::SeqCst), 0);

        router.classify_intent("Sốt là gì?").await.unwrap();
        assert_eq!(backend.health_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_degraded_mode_fails_closed() {
        let stub = ClassifierHealth { mode: Some("rules".into()), ..healthy() };
        let backend = MockClassifier::new(vec![Ok(stub)], qa_reply());
        let router = IntentRouter::new(backend.clone());
        assert!(router.classify_intent("Sốt là gì?").await.is_err());
        assert_eq!(backend.classify_calls.load(Ordering::SeqCst), 0);
        let status = router.status().await;
        assert!(!status.healthy);
        assert_eq!(status.mode.as_deref(), Some("rules"));
    }

    #[tokio::test]
    async fn test_reset_health_forces_recheck() {
        let backend = MockClassifier::new(vec![Ok(healthy())], qa_reply());
        let mut router = IntentRouter::new(backend.clone());
        router.classify_intent("a").await.unwrap();
        router.reset_health();
        assert!(!router.is_health_cached());
        router.classify_intent("b").await.unwrap();
        assert_eq!(backend.health_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_input_rejected_before_any_call() {
        let backend = MockClassifier::new(vec![Ok(healthy())], qa_reply());
        let router = IntentRouter::new(backend.clone());
        assert!(router.classify_intent("   ").await.is_err());
        assert_eq!(backend.health_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_closed_enums_fail_closed() {
        assert!(validate_and_normalize(&json!("text"), "p").is_err());
        assert!(validate_and_normalize(&json!({ "intent": "SMALL_TALK", "action": "CALL_GEMINI" }), "p").is_err());
        assert!(validate_and_normalize(&json!({ "intent": "EMERGENCY", "action": "PANIC" }), "p").is_err());
    }

    #[test]
    fn test_search_db_forces_auth_and_parses_spec() {
        let raw = json!({
            "intent": "PERSONAL_DB_QUERY",
            "action": "SEARCH_DB",
            "confidence": 7,
            "requires_auth": false,
            "detected_pii": ["PHONE", 3],
            "safety_flags": "none",
            "db_query_spec": {
                "target_collection": "lab_results",
                "time_frame": "last_month",
                "keywords": ["HbA1c", "  ", 12],
                "limit": 120.7
            }
        });
        let result = validate_and_normalize(&raw, "p").unwrap();
        assert!(result.requires_auth);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.detected_pii, vec!["PHONE"]);
        assert!(result.safety_flags.is_empty());
        let ActionPlan::QueryRecords(spec) = result.plan else { panic!("expected record query") };
        assert_eq!(spec.target_category, RecordCategory::LabResults);
        assert_eq!(spec.time_frame, TimeFrame::LastMonth);
        assert_eq!(spec.keywords, vec!["HbA1c"]);
        assert_eq!(spec.limit, 50);
        assert_eq!(spec.specific_date, None);
    }

    #[test]
    fn test_search_db_without_spec_fails_closed() {
        let raw = json!({ "intent": "PERSONAL_DB_QUERY", "action": "SEARCH_DB" });
        assert!(validate_and_normalize(&raw, "p").is_err());
        let bad_frame = json!({
            "intent": "PERSONAL_DB_QUERY",
            "action": "SEARCH_DB",
            "db_query_spec": { "target_collection": "lab_results", "time_frame": "yesterday" }
        });
        assert!(validate_and_normalize(&bad_frame, "p").is_err());
    }

    #[test]
    fn test_generative_payload_fallback() {
        let result = validate_and_normalize(&qa_reply(), "Sốt là gì?").unwrap();
        assert_eq!(result.confidence, 0.8);
        assert!(!result.requires_auth);
        let ActionPlan::CallGenerative(spec) = result.plan else { panic!("expected generative call") };
        assert_eq!(spec, GenerativePromptSpec::fallback("Sốt là gì?"));

        let raw = json!({
            "intent": "USER_INPUT_ANALYSIS",
            "action": "CALL_GEMINI",
            "confidence": "high",
            "gemini_payload_spec": {
                "is_pii_removed": true,
                "sanitized_user_prompt": "Huyết áp 150/95 có cao không?",
                "system_instruction_hint": "DATA_ANALYSIS",
                "temperature": 0.3
            }
        });
        let result = validate_and_normalize(&raw, "orig").unwrap();
        assert_eq!(result.confidence, 0.5);
        let ActionPlan::CallGenerative(spec) = result.plan else { panic!("expected generative call") };
        assert!(spec.pii_already_removed);
        assert_eq!(spec.sanitized_prompt, "Huyết áp 150/95 có cao không?");
        assert_eq!(spec.template(), InstructionTemplate::DataAnalysis);
        assert_eq!(spec.temperature, Some(0.3));
    }

    #[test]
    fn test_tool_params_validation() {
        let missing = json!({ "intent": "OPERATIONAL_ADMIN", "action": "CALL_ADMIN_TOOL", "tool_params": { "tool_args": {} } });
        assert!(validate_and_normalize(&missing, "p").is_err());

        let ok = json!({
            "intent": "OPERATIONAL_ADMIN",
            "action": "CALL_ADMIN_TOOL",
            "tool_params": { "tool_name": "price_list", "tool_args": [1, 2] }
        });
        let ActionPlan::CallAdminTool(call) = validate_and_normalize(&ok, "p").unwrap().plan else {
            panic!("expected tool call")
        };
        assert_eq!(call.tool_name, "price_list");
        assert!(call.tool_args.is_empty());
    }

    #[test]
    fn test_local_reply_and_emergency() {
        let reply = json!({ "intent": "OUT_OF_SCOPE", "action": "REPLY_LOCALLY", "local_reply_content": "  " });
        assert_eq!(validate_and_normalize(&reply, "p").unwrap().plan, ActionPlan::ReplyLocally(None));

        let emergency = json!({ "intent": "EMERGENCY", "action": "EMERGENCY_RESPONSE" });
        assert_eq!(validate_and_normalize(&emergency, "p").unwrap().action(), Action::EmergencyResponse);
    }
}
