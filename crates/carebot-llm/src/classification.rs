//! Data classification for prompts leaving the process.
//!
//! Every prompt bound for a remote backend passes through [`PromptGuard`].
//! Identifying content (contact details, ID numbers, record numbers, birth
//! dates) is redacted before the request is built. Patient names are not
//! redacted here: free-text medical questions are full of capitalised
//! terms, and the orchestrator already runs the full sanitizer on record
//! summaries. Record context keeps its dates: summaries write every
//! record date as `d/m/yyyy`, which the birth-date rule would otherwise eat.

use carebot_common::PiiKind;
use carebot_security::PiiSanitizer;

/// Data classification levels for prompt content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DataClass {
    /// No identifying content detected.
    Public,
    /// Contains at least one guarded identifier.
    Identifying,
}

impl DataClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataClass::Public      => "PUBLIC",
            DataClass::Identifying => "IDENTIFYING",
        }
    }
}

const GUARDED_KINDS: [PiiKind; 5] = [
    PiiKind::PhoneNumber,
    PiiKind::Email,
    PiiKind::IdNumber,
    PiiKind::DateOfBirth,
    PiiKind::MedicalRecordNumber,
];

/// Record context is date-bearing by nature; birth dates are not guarded there.
const CONTEXT_KINDS: [PiiKind; 4] = [
    PiiKind::PhoneNumber,
    PiiKind::Email,
    PiiKind::IdNumber,
    PiiKind::MedicalRecordNumber,
];

/// Outcome of guarding one piece of prompt text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardedText {
    pub text: String,
    pub class: DataClass,
    pub redacted: usize,
}

#[derive(Debug, Default)]
pub struct PromptGuard {
    sanitizer: PiiSanitizer,
}

impl PromptGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify(&self, prompt: &str) -> DataClass {
        if self.sanitizer.sanitize_text_with(prompt, &GUARDED_KINDS).has_pii {
            DataClass::Identifying
        } else {
            DataClass::Public
        }
    }

    /// Redact guarded identifiers. Text already carrying placeholder tokens
    /// is left as is.
    pub fn protect(&self, prompt: &str) -> GuardedText {
        self.protect_with(prompt, &GUARDED_KINDS)
    }

    /// Guard pre-summarised record context. Same as [`protect`](Self::protect)
    /// except that dates pass through.
    pub fn protect_context(&self, context: &str) -> GuardedText {
        self.protect_with(context, &CONTEXT_KINDS)
    }

    fn protect_with(&self, text: &str, kinds: &[PiiKind]) -> GuardedText {
        let result = self.sanitizer.sanitize_text_with(text, kinds);
        let class = if result.has_pii { DataClass::Identifying } else { DataClass::Public };
        GuardedText {
            redacted: result.redaction_map.len(),
            text: result.sanitized_text,
            class,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_classification() {
        let guard = PromptGuard::new();
        let prompt = "Chỉ số HbA1c 6.5% có nghĩa là gì?";
        assert_eq!(guard.classify(prompt), DataClass::Public);
    }

    #[test]
    fn test_identifying_prompt_is_redacted() {
        let guard = PromptGuard::new();
        let guarded = guard.protect("Số của tôi 0912345678, email an@vidu.vn, ho khan 3 ngày");
        assert_eq!(guarded.class, DataClass::Identifying);
        assert_eq!(guarded.redacted, 2);
        assert!(guarded.text.contains("[SO_DIEN_THOAI]"));
        assert!(guarded.text.contains("[EMAIL]"));
        assert!(guarded.text.ends_with("ho khan 3 ngày"));
    }

    #[test]
    fn test_context_keeps_record_dates() {
        let guard = PromptGuard::new();
        let guarded = guard.protect_context("- Ngày xét nghiệm: 3/5/2024\n- Liên hệ: 0912345678");
        assert!(guarded.text.contains("3/5/2024"));
        assert!(guarded.text.contains("[SO_DIEN_THOAI]"));
        assert_eq!(guarded.redacted, 1);

        assert!(guard.protect("sinh ngày 3/5/2024").text.contains("[NGAY_SINH]"));
    }

    #[test]
    fn test_placeholders_are_stable() {
        let guard = PromptGuard::new();
        let once = guard.protect("Mã MRN-1234567 của tôi").text;
        let twice = guard.protect(&once);
        assert_eq!(twice.text, once);
        assert_eq!(twice.class, DataClass::Public);
    }
}
