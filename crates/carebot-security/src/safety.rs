//! Safety gate: input risk cascade and output validation.
//!
//! The input cascade is strict priority, first match wins:
//!   1. emergency keywords       → CRITICAL / EMERGENCY
//!   2. self-harm indicators     → CRITICAL / EMERGENCY
//!   3. high-risk symptoms       → HIGH     / WARN
//!   4. drug safety              → MEDIUM   / WARN
//!   5. special populations      → MEDIUM   / WARN
//!   6. otherwise                → LOW      / PROCEED

use carebot_common::{RecommendedAction, RiskLevel};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

pub const DEFAULT_EMERGENCY_KEYWORDS: [&str; 23] = [
    // Vietnamese
    "đau ngực dữ dội",
    "khó thở",
    "ho ra máu",
    "đau đầu dữ dội",
    "liệt nửa người",
    "tê nửa người",
    "nói khó",
    "mất ý thức",
    "ngất",
    "co giật",
    "xuất huyết",
    "chảy máu nhiều",
    "tự tử",
    "muốn chết",
    "uống thuốc quá liều",
    // English
    "chest pain",
    "can't breathe",
    "shortness of breath",
    "coughing blood",
    "suicide",
    "overdose",
    "seizure",
    "unconscious",
];

const SELF_HARM_KEYWORDS: [&str; 11] = [
    "tự tử",
    "muốn chết",
    "kết thúc cuộc đời",
    "không muốn sống",
    "tự làm hại",
    "cắt tay",
    "suicide",
    "kill myself",
    "end my life",
    "want to die",
    "self harm",
];

pub const EMERGENCY_DETECTED: &str =
    "CẢNH BÁO: Triệu chứng của bạn có thể nghiêm trọng.\nVui lòng gọi 115 hoặc đến cơ sở y tế gần nhất ngay.";
pub const HIGH_RISK_NOTICE: &str =
    "Khuyến cáo: Tình trạng có dấu hiệu nguy cơ.\nVui lòng đi khám/bác sĩ để được đánh giá trực tiếp.";
pub const GENERAL_DISCLAIMER: &str =
    "Lưu ý: Thông tin chỉ mang tính tham khảo, không thay thế tư vấn của bác sĩ.";

pub const OVERCONFIDENT_ISSUE: &str = "Overly confident diagnosis or unsafe medical advice";
pub const MEDICATION_ISSUE: &str =
    "Medication advice without recommending professional consultation";

fn ci(src: &str) -> Regex {
    RegexBuilder::new(src)
        .case_insensitive(true)
        .build()
        .expect("valid safety regex")
}

fn labelled(table: &[(&str, &'static str)]) -> Vec<(Regex, &'static str)> {
    table.iter().map(|(src, label)| (ci(src), *label)).collect()
}

static HIGH_RISK_SYMPTOMS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    labelled(&[
        (r"(đau|pain).{0,20}(ngực|chest)", "Chest pain / Đau ngực"),
        (r"(khó thở|difficulty).{0,10}(thở|breathing)?", "Shortness of breath / Khó thở"),
        (r"(ho).{0,10}(ra máu|máu|blood)", "Coughing blood / Ho ra máu"),
        (r"(đau đầu).{0,15}(dữ dội|severe)", "Severe headache / Đau đầu dữ dội"),
        (r"(liệt|paralysis|numb).{0,20}(nửa người|half|tay|chân)", "Stroke-like symptoms / Dấu hiệu đột quỵ"),
        (r"(nói).{0,10}(khó|không rõ)|slurred speech", "Speech difficulty / Nói khó"),
        (r"(mất ý thức|unconscious|ngất)", "Loss of consciousness / Mất ý thức"),
        (r"(co giật|seizure|convulsion)", "Seizure / Co giật"),
        (r"(chảy máu|xuất huyết|bleeding).{0,10}(nhiều|ồ ạt|severe)?", "Severe bleeding / Chảy máu nhiều"),
    ])
});

static DRUG_SAFETY: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    labelled(&[
        (r"(quá liều|overdose|uống quá liều)", "Possible overdose / Nghi quá liều"),
        (r"(uống nhầm|accidental ingestion)", "Accidental ingestion / Uống nhầm"),
        (r"(tăng liều|double dose|gấp đôi liều)", "Dose escalation / Tăng liều"),
        (r"(dị ứng thuốc|allergic reaction|phản ứng dị ứng)", "Possible drug allergy / Nghi dị ứng thuốc"),
    ])
});

static SPECIAL_POPULATIONS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    labelled(&[
        (r"(thai|pregnant|pregnancy|mang thai|có bầu)", "Pregnancy / Mang thai: cần tư vấn chuyên khoa"),
        (r"(trẻ em|child|children|em bé|sơ sinh|newborn|infant)", "Pediatric / Trẻ em: cần tư vấn nhi khoa"),
        (r"(người già|elderly|senior|ông bà)", "Elderly / Người cao tuổi: cần đánh giá trực tiếp"),
    ])
});

static DANGEROUS_ADVICE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"bạn (chắc chắn|definitely) (bị|have)",
        r"chẩn đoán (chính xác|definitely)",
        r"(hãy|should) (tự )?điều trị",
        r"không cần (gặp|đi khám) bác sĩ",
        r"don't need (to see|a) doctor",
    ]
    .into_iter()
    .map(ci)
    .collect()
});

static MENTIONS_MEDICATION: LazyLock<Regex> =
    LazyLock::new(|| ci(r"(uống|dùng|take).{0,20}(thuốc|medication|drug)"));
static DOCTOR_DISCLAIMER: LazyLock<Regex> =
    LazyLock::new(|| ci(r"(tham khảo|bác sĩ|consult (a )?doctor)"));

// ── Results ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyCheckResult {
    pub is_safe: bool,
    pub risk_level: RiskLevel,
    pub detected_issues: Vec<String>,
    pub recommended_action: RecommendedAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergency_keywords: Option<Vec<String>>,
}

impl SafetyCheckResult {
    pub fn proceed() -> Self {
        Self {
            is_safe: true,
            risk_level: RiskLevel::Low,
            detected_issues: vec![],
            recommended_action: RecommendedAction::Proceed,
            emergency_keywords: None,
        }
    }

    pub fn emergency(keywords: Vec<String>) -> Self {
        Self {
            is_safe: false,
            risk_level: RiskLevel::Critical,
            detected_issues: keywords.clone(),
            recommended_action: RecommendedAction::Emergency,
            emergency_keywords: Some(keywords),
        }
    }

    fn warn(risk_level: RiskLevel, issues: Vec<String>) -> Self {
        Self {
            is_safe: false,
            risk_level,
            detected_issues: issues,
            recommended_action: RecommendedAction::Warn,
            emergency_keywords: None,
        }
    }
}

/// Outcome of validating generated text before it reaches the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputCheck {
    pub is_safe: bool,
    pub issues: Vec<String>,
}

// ── Gate ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SafetyGate {
    /// Lowercased emergency keywords, matched as substrings.
    emergency_keywords: Vec<String>,
}

impl Default for SafetyGate {
    fn default() -> Self {
        Self::new(DEFAULT_EMERGENCY_KEYWORDS.iter().map(|k| k.to_string()))
    }
}

impl SafetyGate {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let emergency_keywords = keywords
            .into_iter()
            .map(|k| k.into().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { emergency_keywords }
    }

    pub fn emergency_keywords(&self) -> &[String] {
        &self.emergency_keywords
    }

    pub fn check_safety(&self, user_input: &str) -> SafetyCheckResult {
        let input = user_input.to_lowercase();

        let keywords: Vec<String> = self
            .emergency_keywords
            .iter()
            .filter(|k| input.contains(k.as_str()))
            .cloned()
            .collect();
        if !keywords.is_empty() {
            return SafetyCheckResult::emergency(keywords);
        }

        if SELF_HARM_KEYWORDS.iter().any(|k| input.contains(k)) {
            return SafetyCheckResult {
                is_safe: false,
                risk_level: RiskLevel::Critical,
                detected_issues: vec!["Self-harm indicators".to_string()],
                recommended_action: RecommendedAction::Emergency,
                emergency_keywords: None,
            };
        }

        let symptoms = matching_labels(&HIGH_RISK_SYMPTOMS, &input);
        if !symptoms.is_empty() {
            return SafetyCheckResult::warn(RiskLevel::High, symptoms);
        }

        let drug = matching_labels(&DRUG_SAFETY, &input);
        if !drug.is_empty() {
            return SafetyCheckResult::warn(RiskLevel::Medium, drug);
        }

        let populations = matching_labels(&SPECIAL_POPULATIONS, &input);
        if !populations.is_empty() {
            return SafetyCheckResult::warn(RiskLevel::Medium, populations);
        }

        SafetyCheckResult::proceed()
    }

    /// User-facing template for a check result; empty for PROCEED / BLOCK.
    pub fn generate_safety_response(&self, result: &SafetyCheckResult) -> String {
        match result.recommended_action {
            RecommendedAction::Emergency => {
                emergency_template(result.emergency_keywords.as_deref().unwrap_or_default())
            }
            RecommendedAction::Warn => warning_template(&result.detected_issues),
            RecommendedAction::Proceed | RecommendedAction::Block => String::new(),
        }
    }

    /// Output gate applied to generated answers.
    pub fn validate_ai_response(&self, response: &str) -> OutputCheck {
        let mut issues = Vec::new();

        if DANGEROUS_ADVICE.iter().any(|re| re.is_match(response)) {
            issues.push(OVERCONFIDENT_ISSUE.to_string());
        }
        if MENTIONS_MEDICATION.is_match(response) && !DOCTOR_DISCLAIMER.is_match(response) {
            issues.push(MEDICATION_ISSUE.to_string());
        }

        OutputCheck { is_safe: issues.is_empty(), issues }
    }
}

fn matching_labels(table: &[(Regex, &'static str)], input: &str) -> Vec<String> {
    table
        .iter()
        .filter(|(re, _)| re.is_match(input))
        .map(|(_, label)| label.to_string())
        .collect()
}

pub fn emergency_template(keywords: &[String]) -> String {
    let mut lines = vec![
        "**CẢNH BÁO KHẨN CẤP**".to_string(),
        String::new(),
        EMERGENCY_DETECTED.to_string(),
        String::new(),
        "- Gọi **115** ngay (cấp cứu) hoặc đến cơ sở y tế gần nhất.".to_string(),
        "- Nếu có người bên cạnh: nhờ hỗ trợ và theo dõi tình trạng.".to_string(),
        "- Không trì hoãn hoặc tự điều trị tại nhà.".to_string(),
    ];
    if !keywords.is_empty() {
        lines.push(String::new());
        lines.push(format!("Triệu chứng phát hiện: {}", keywords.join(", ")));
    }
    lines.join("\n")
}

fn warning_template(issues: &[String]) -> String {
    let mut lines = vec![
        "**CẢNH BÁO Y TẾ**".to_string(),
        String::new(),
        HIGH_RISK_NOTICE.to_string(),
        String::new(),
    ];
    if !issues.is_empty() {
        lines.push("Dấu hiệu phát hiện:".to_string());
        lines.extend(issues.iter().map(|i| format!("- {i}")));
        lines.push(String::new());
    }
    lines.extend([
        "Khuyến nghị:".to_string(),
        "- Đi khám/bác sĩ để được đánh giá trực tiếp.".to_string(),
        "- Không tự ý dùng thuốc hoặc thay đổi liều khi chưa có chỉ định.".to_string(),
        String::new(),
        GENERAL_DISCLAIMER.to_string(),
    ]);
    lines.join("\n")
}
