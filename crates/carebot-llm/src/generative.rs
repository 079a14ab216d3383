//! Generative answer service.
//!
//! Wraps an [`LlmBackend`] with the chatbot's instruction templates, prompt
//! layout, output validation and rewrite. Failures are not retried here;
//! the caller decides.

use std::sync::{Arc, LazyLock};
use std::time::Instant;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::audit::{GenerationTrace, TraceInput};
use crate::backend::{LlmBackend, LlmError, LlmRequest, LlmResponse, Message};
use crate::classification::{DataClass, GuardedText, PromptGuard};

pub const SAFE_REFUSAL: &str =
    "Mình không thể trả lời câu hỏi này một cách an toàn/chính xác. Vui lòng tham khảo ý kiến bác sĩ.";

const REWRITE_TEMPERATURE: f32 = 0.5;
const HEALTH_TEMPERATURE: f32 = 0.1;

// ── Instruction templates ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionTemplate {
    MedicalConsultant,
    EmergencyResponse,
    DataAnalysis,
    GeneralEducation,
}

impl InstructionTemplate {
    /// Hints are matched by case-insensitive substring; anything
    /// unrecognised falls back to the consultant template.
    pub fn from_hint(hint: &str) -> Self {
        let hint = hint.to_uppercase();
        if hint.contains("EMERGENCY") {
            Self::EmergencyResponse
        } else if hint.contains("DATA_ANALYSIS") {
            Self::DataAnalysis
        } else if hint.contains("GENERAL_EDUCATION") {
            Self::GeneralEducation
        } else {
            Self::MedicalConsultant
        }
    }

    pub fn as_hint(&self) -> &'static str {
        match self {
            Self::MedicalConsultant => "MEDICAL_CONSULTANT",
            Self::EmergencyResponse => "EMERGENCY_RESPONSE",
            Self::DataAnalysis      => "DATA_ANALYSIS",
            Self::GeneralEducation  => "GENERAL_EDUCATION",
        }
    }

    pub fn system_prompt(&self) -> &'static str {
        match self {
            Self::MedicalConsultant => concat!(
                "Bạn là trợ lý y tế AI. Nhiệm vụ:\n",
                "- Trả lời ngắn gọn, dễ hiểu, bằng tiếng Việt\n",
                "- Không chẩn đoán xác định; chỉ cung cấp thông tin tham khảo\n",
                "- Nếu thiếu dữ liệu hoặc có dấu hiệu nguy hiểm: khuyên đi khám/bác sĩ ngay\n",
                "- Không bịa đặt thông tin; nếu không chắc hãy nói rõ",
            ),
            Self::EmergencyResponse => concat!(
                "Đây có thể là tình huống khẩn cấp. Nhiệm vụ:\n",
                "- Ưu tiên an toàn người bệnh\n",
                "- Hướng dẫn gọi cấp cứu 115 hoặc đến cơ sở y tế gần nhất\n",
                "- Nêu các bước sơ cứu cơ bản nếu phù hợp\n",
                "- Giọng nghiêm túc, trấn an",
            ),
            Self::DataAnalysis => concat!(
                "Phân tích dữ liệu y tế do người dùng cung cấp:\n",
                "- So sánh với ngưỡng bình thường (nếu biết)\n",
                "- Giải thích ý nghĩa lâm sàng\n",
                "- Nêu khuyến nghị theo dõi/tái khám\n",
                "- Không đưa ra chẩn đoán xác định",
            ),
            Self::GeneralEducation => concat!(
                "Giải thích kiến thức y học phổ thông:\n",
                "- Dùng ngôn ngữ đơn giản\n",
                "- Nêu ví dụ, cảnh báo khi cần\n",
                "- Khuyến khích phòng bệnh và đi khám khi có triệu chứng kéo dài/nặng",
            ),
        }
    }

    pub fn warning(&self) -> &'static str {
        match self {
            Self::EmergencyResponse => {
                "CẢNH BÁO: Nếu đây là tình huống khẩn cấp, vui lòng gọi 115 hoặc đến cơ sở y tế gần nhất ngay."
            }
            Self::DataAnalysis => {
                "Lưu ý: Phân tích dựa trên dữ liệu bạn cung cấp, chỉ mang tính tham khảo. Hãy tham khảo ý kiến bác sĩ."
            }
            _ => "Lưu ý: Thông tin chỉ mang tính tham khảo, không thay thế tư vấn của bác sĩ.",
        }
    }
}

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerativePromptSpec {
    pub pii_already_removed: bool,
    pub sanitized_prompt: String,
    pub system_instruction_hint: String,
    /// Pre-summarised, PII-free context.
    pub context_data: Option<String>,
    pub temperature: Option<f32>,
}

impl GenerativePromptSpec {
    pub fn new(prompt: impl Into<String>, template: InstructionTemplate) -> Self {
        Self {
            pii_already_removed: false,
            sanitized_prompt: prompt.into(),
            system_instruction_hint: template.as_hint().to_string(),
            context_data: None,
            temperature: None,
        }
    }

    /// Minimal spec used when the classifier omits the generative payload.
    pub fn fallback(prompt: impl Into<String>) -> Self {
        Self::new(prompt, InstructionTemplate::MedicalConsultant)
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context_data = Some(context.into());
        self
    }

    pub fn template(&self) -> InstructionTemplate {
        InstructionTemplate::from_hint(&self.system_instruction_hint)
    }

    pub fn user_prompt(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(context) = self.context_data.as_deref().filter(|c| !c.trim().is_empty()) {
            parts.extend(["**Dữ liệu y tế có sẵn (đã được làm sạch):**", context, ""]);
        }
        parts.extend(["**Câu hỏi:**", self.sanitized_prompt.as_str()]);
        if self.pii_already_removed {
            parts.extend([
                "",
                "*Lưu ý: Dữ liệu ở trên đã được ẩn thông tin định danh. Không được suy đoán hoặc thêm thông tin cá nhân.*",
            ]);
        }
        parts.join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerativeAnswer {
    pub answer: String,
    pub confidence: f64,
    pub sources: Vec<String>,
    pub warning: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseCheck {
    pub is_valid: bool,
    pub issues: Vec<String>,
}

// ── Heuristics ────────────────────────────────────────────────────────────────

static CITATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[(\d+)\]").expect("valid regex"));

static OUTPUT_PII: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\b\d{9,12}\b",
        r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b",
        r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
    ]
    .iter()
    .map(|src| Regex::new(src).expect("valid regex"))
    .collect()
});

static OVERCONFIDENT: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)bạn chắc chắn bị",
        r"(?i)you definitely have",
        r"(?i)chẩn đoán chính xác là",
        r"(?i)diagnosis is definitely",
    ]
    .iter()
    .map(|src| Regex::new(src).expect("valid regex"))
    .collect()
});

/// Lower confidence when any safety rating is above NEGLIGIBLE or the
/// answer was cut short for safety.
pub fn confidence_from(resp: &LlmResponse) -> f64 {
    let has_concerns = resp.safety_ratings.iter().any(|r| r.probability != "NEGLIGIBLE");
    if has_concerns {
        0.7
    } else if resp.finish_reason.as_deref() == Some("SAFETY") {
        0.5
    } else {
        0.9
    }
}

/// Bracketed numeric citations, deduplicated, in order of first appearance.
pub fn extract_sources(text: &str) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for caps in CITATION.captures_iter(text) {
        let citation = &caps[1];
        if !sources.iter().any(|s| s == citation) {
            sources.push(citation.to_string());
        }
    }
    sources
}

pub fn validate_response(text: &str) -> ResponseCheck {
    let mut issues = Vec::new();
    if OUTPUT_PII.iter().any(|re| re.is_match(text)) {
        issues.push("Potential PII detected in response".to_string());
    }
    if OVERCONFIDENT.iter().any(|re| re.is_match(text)) {
        issues.push("Overly confident diagnostic statement".to_string());
    }
    ResponseCheck { is_valid: issues.is_empty(), issues }
}

fn rewrite_prompt(original: &str, issues: &[String]) -> String {
    [
        format!("Câu trả lời sau có vấn đề: {}", issues.join(", ")).as_str(),
        "",
        "Câu trả lời gốc:",
        original,
        "",
        "Hãy viết lại câu trả lời để:",
        "1) Không chứa thông tin định danh cá nhân",
        "2) Không chẩn đoán xác định",
        "3) Nhắc người dùng tham khảo ý kiến bác sĩ khi cần",
        "4) Giữ nội dung y khoa an toàn và đúng",
        "",
        "Câu trả lời mới:",
    ]
    .join("\n")
}

// ── Service ───────────────────────────────────────────────────────────────────

pub struct GenerativeAnswerService {
    backend: Arc<dyn LlmBackend>,
    guard: PromptGuard,
}

impl GenerativeAnswerService {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend, guard: PromptGuard::new() }
    }

    pub fn model_id(&self) -> &str {
        self.backend.model_id()
    }

    pub async fn generate_response(&self, spec: &GenerativePromptSpec) -> Result<GenerativeAnswer, LlmError> {
        let template = spec.template();
        let resp = self
            .call(template.system_prompt(), self.guard_spec(spec), spec.temperature, "answer")
            .await?;

        Ok(GenerativeAnswer {
            sources: extract_sources(&resp.content),
            confidence: confidence_from(&resp),
            answer: resp.content,
            warning: template.warning().to_string(),
        })
    }

    pub fn validate_response(&self, text: &str) -> ResponseCheck {
        validate_response(text)
    }

    /// One rewrite attempt; any failure yields [`SAFE_REFUSAL`].
    pub async fn rewrite_response(&self, original: &str, issues: &[String]) -> String {
        let prompt = self.guard_text(&rewrite_prompt(original, issues));
        match self
            .call(
                InstructionTemplate::MedicalConsultant.system_prompt(),
                prompt,
                Some(REWRITE_TEMPERATURE),
                "rewrite",
            )
            .await
        {
            Ok(resp) => resp.content,
            Err(e) => {
                tracing::warn!(error = %e, "Answer rewrite failed, using safe refusal");
                SAFE_REFUSAL.to_string()
            }
        }
    }

    pub async fn health_check(&self) -> bool {
        match self
            .call(
                "You are a test assistant.",
                self.guard_text("Say 'OK' if you're working."),
                Some(HEALTH_TEMPERATURE),
                "health",
            )
            .await
        {
            Ok(resp) => resp.content.to_lowercase().contains("ok"),
            Err(e) => {
                tracing::debug!(error = %e, "Generative health check failed");
                false
            }
        }
    }

    fn guard_text(&self, text: &str) -> GuardedText {
        if self.backend.is_local() {
            GuardedText { text: text.to_string(), class: DataClass::Public, redacted: 0 }
        } else {
            self.guard.protect(text)
        }
    }

    /// The question gets the full guard; record context keeps its dates.
    fn guard_spec(&self, spec: &GenerativePromptSpec) -> GuardedText {
        if self.backend.is_local() {
            return GuardedText { text: spec.user_prompt(), class: DataClass::Public, redacted: 0 };
        }
        let question = self.guard.protect(&spec.sanitized_prompt);
        let context = spec.context_data.as_deref().map(|c| self.guard.protect_context(c));

        let mut outbound = spec.clone();
        outbound.sanitized_prompt = question.text;
        let mut class = question.class;
        let mut redacted = question.redacted;
        if let Some(context) = context {
            class = class.max(context.class);
            redacted += context.redacted;
            outbound.context_data = Some(context.text);
        }
        GuardedText { text: outbound.user_prompt(), class, redacted }
    }

    async fn call(
        &self,
        system: &str,
        prompt: GuardedText,
        temperature: Option<f32>,
        purpose: &str,
    ) -> Result<LlmResponse, LlmError> {
        let GuardedText { text: user, class: data_class, redacted } = prompt;
        if data_class == DataClass::Identifying {
            tracing::warn!(redacted, purpose, "Identifiers redacted from outbound prompt");
        }

        let req = LlmRequest {
            messages: vec![Message::system(system), Message::user(user)],
            model: None,
            max_tokens: None,
            temperature,
        };

        let started = Instant::now();
        let resp = self.backend.complete(req).await?;
        if resp.content.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        GenerationTrace::new(TraceInput {
            model: &resp.model,
            purpose,
            prompt_tokens: resp.prompt_tokens,
            completion_tokens: resp.completion_tokens,
            data_class,
            redacted_spans: redacted,
            output: &resp.content,
            latency_ms: started.elapsed().as_millis() as u64,
        })
        .emit();

        Ok(resp)
    }
}
