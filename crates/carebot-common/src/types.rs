//! Closed vocabularies shared by the pipeline crates.
//!
//! The classifier speaks a loosely typed JSON dialect; every label it can
//! produce is parsed into one of these enums at the boundary so that raw
//! strings never flow through the pipeline unchecked.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Intent / Action
// ---------------------------------------------------------------------------

/// Classified purpose of a user message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intent {
    #[serde(rename = "PERSONAL_DB_QUERY")]
    PersonalDataQuery,
    #[serde(rename = "USER_INPUT_ANALYSIS")]
    LiveInputAnalysis,
    #[serde(rename = "GENERAL_MEDICAL_QA")]
    GeneralMedicalQa,
    #[serde(rename = "OPERATIONAL_ADMIN")]
    OperationalAdmin,
    #[serde(rename = "CONTEXT_FOLLOWUP")]
    ContextFollowup,
    #[serde(rename = "OUT_OF_SCOPE")]
    OutOfScope,
    #[serde(rename = "EMERGENCY")]
    Emergency,
}

impl Intent {
    pub const ALL: [Intent; 7] = [
        Intent::PersonalDataQuery,
        Intent::LiveInputAnalysis,
        Intent::GeneralMedicalQa,
        Intent::OperationalAdmin,
        Intent::ContextFollowup,
        Intent::OutOfScope,
        Intent::Emergency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::PersonalDataQuery => "PERSONAL_DB_QUERY",
            Intent::LiveInputAnalysis => "USER_INPUT_ANALYSIS",
            Intent::GeneralMedicalQa  => "GENERAL_MEDICAL_QA",
            Intent::OperationalAdmin  => "OPERATIONAL_ADMIN",
            Intent::ContextFollowup   => "CONTEXT_FOLLOWUP",
            Intent::OutOfScope        => "OUT_OF_SCOPE",
            Intent::Emergency         => "EMERGENCY",
        }
    }

    /// Exact, case-sensitive match against the wire label.
    pub fn from_wire(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|i| i.as_str() == label)
    }
}

/// Pipeline branch selected to fulfil an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "SEARCH_DB")]
    QueryRecords,
    #[serde(rename = "CALL_GEMINI")]
    CallGenerative,
    #[serde(rename = "CALL_ADMIN_TOOL")]
    CallAdminTool,
    #[serde(rename = "REPLY_LOCALLY")]
    ReplyLocally,
    #[serde(rename = "EMERGENCY_RESPONSE")]
    EmergencyResponse,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::QueryRecords,
        Action::CallGenerative,
        Action::CallAdminTool,
        Action::ReplyLocally,
        Action::EmergencyResponse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::QueryRecords      => "SEARCH_DB",
            Action::CallGenerative    => "CALL_GEMINI",
            Action::CallAdminTool     => "CALL_ADMIN_TOOL",
            Action::ReplyLocally      => "REPLY_LOCALLY",
            Action::EmergencyResponse => "EMERGENCY_RESPONSE",
        }
    }

    pub fn from_wire(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == label)
    }
}

// ---------------------------------------------------------------------------
// Record query vocabulary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordCategory {
    LabResults,
    Prescriptions,
    VisitHistory,
    Allergies,
    VitalSigns,
    MedicalFiles,
    All,
}

impl RecordCategory {
    pub const ALL: [RecordCategory; 7] = [
        RecordCategory::LabResults,
        RecordCategory::Prescriptions,
        RecordCategory::VisitHistory,
        RecordCategory::Allergies,
        RecordCategory::VitalSigns,
        RecordCategory::MedicalFiles,
        RecordCategory::All,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordCategory::LabResults    => "lab_results",
            RecordCategory::Prescriptions => "prescriptions",
            RecordCategory::VisitHistory  => "visit_history",
            RecordCategory::Allergies     => "allergies",
            RecordCategory::VitalSigns    => "vital_signs",
            RecordCategory::MedicalFiles  => "medical_files",
            RecordCategory::All           => "all",
        }
    }

    pub fn from_wire(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeFrame {
    Latest,
    LastWeek,
    LastMonth,
    LastYear,
    SpecificDate,
    All,
}

impl TimeFrame {
    pub const ALL: [TimeFrame; 6] = [
        TimeFrame::Latest,
        TimeFrame::LastWeek,
        TimeFrame::LastMonth,
        TimeFrame::LastYear,
        TimeFrame::SpecificDate,
        TimeFrame::All,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFrame::Latest       => "latest",
            TimeFrame::LastWeek     => "last_week",
            TimeFrame::LastMonth    => "last_month",
            TimeFrame::LastYear     => "last_year",
            TimeFrame::SpecificDate => "specific_date",
            TimeFrame::All          => "all",
        }
    }

    pub fn from_wire(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == label)
    }

    /// Human-readable label stored in query metadata.
    pub fn label(&self) -> &'static str {
        match self {
            TimeFrame::Latest       => "7 days (latest)",
            TimeFrame::LastWeek     => "last week",
            TimeFrame::LastMonth    => "last month",
            TimeFrame::LastYear     => "last year",
            TimeFrame::SpecificDate => "specific date",
            TimeFrame::All          => "all time",
        }
    }
}

pub const DEFAULT_QUERY_LIMIT: usize = 10;
pub const MAX_QUERY_LIMIT: usize = 50;
pub const MAX_QUERY_KEYWORDS: usize = 10;

/// Structured record query produced by the intent router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordQuerySpec {
    pub target_category: RecordCategory,
    pub time_frame: TimeFrame,
    /// Raw keywords in classifier order; see [`RecordQuerySpec::effective_keywords`].
    #[serde(default)]
    pub keywords: Vec<String>,
    /// ISO-8601 date (or datetime) used when `time_frame` is `specific_date`.
    pub specific_date: Option<String>,
    /// Always within `[1, MAX_QUERY_LIMIT]`.
    pub limit: usize,
}

impl RecordQuerySpec {
    pub fn new(target_category: RecordCategory, time_frame: TimeFrame) -> Self {
        Self {
            target_category,
            time_frame,
            keywords: vec![],
            specific_date: None,
            limit: DEFAULT_QUERY_LIMIT,
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_limit(mut self, requested: Option<f64>) -> Self {
        self.limit = Self::clamp_limit(requested);
        self
    }

    /// Missing or non-finite → default; otherwise floor and clamp into `[1, 50]`.
    pub fn clamp_limit(requested: Option<f64>) -> usize {
        match requested {
            Some(n) if n.is_finite() => {
                let floored = n.floor();
                if floored < 1.0 {
                    1
                } else if floored > MAX_QUERY_LIMIT as f64 {
                    MAX_QUERY_LIMIT
                } else {
                    floored as usize
                }
            }
            _ => DEFAULT_QUERY_LIMIT,
        }
    }

    /// Trimmed, non-empty keywords with the catch-all "general" removed,
    /// capped at [`MAX_QUERY_KEYWORDS`].
    pub fn effective_keywords(&self) -> Vec<String> {
        self.keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty() && !k.eq_ignore_ascii_case("general"))
            .take(MAX_QUERY_KEYWORDS)
            .map(str::to_string)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Safety / PII vocabulary
// ---------------------------------------------------------------------------

/// Ordered risk scale: `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low      => "LOW",
            RiskLevel::Medium   => "MEDIUM",
            RiskLevel::High     => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendedAction {
    Proceed,
    Warn,
    Block,
    Emergency,
}

/// Categories of personally identifying information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PiiKind {
    PatientName,
    PhoneNumber,
    Email,
    IdNumber,
    Address,
    DateOfBirth,
    MedicalRecordNumber,
}

impl PiiKind {
    /// Detection order used by the sanitizer cascade.
    pub const ALL: [PiiKind; 7] = [
        PiiKind::PatientName,
        PiiKind::PhoneNumber,
        PiiKind::Email,
        PiiKind::IdNumber,
        PiiKind::Address,
        PiiKind::DateOfBirth,
        PiiKind::MedicalRecordNumber,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PiiKind::PatientName         => "PATIENT_NAME",
            PiiKind::PhoneNumber         => "PHONE_NUMBER",
            PiiKind::Email               => "EMAIL",
            PiiKind::IdNumber            => "ID_NUMBER",
            PiiKind::Address             => "ADDRESS",
            PiiKind::DateOfBirth         => "DATE_OF_BIRTH",
            PiiKind::MedicalRecordNumber => "MEDICAL_RECORD_NUMBER",
        }
    }

    /// Placeholder substituted for a redacted span.
    pub fn replacement_token(&self) -> &'static str {
        match self {
            PiiKind::PatientName         => "[TEN_BENH_NHAN]",
            PiiKind::PhoneNumber         => "[SO_DIEN_THOAI]",
            PiiKind::Email               => "[EMAIL]",
            PiiKind::IdNumber            => "[SO_CCCD/CMND]",
            PiiKind::Address             => "[DIA_CHI]",
            PiiKind::DateOfBirth         => "[NGAY_SINH]",
            PiiKind::MedicalRecordNumber => "[MA_BENH_AN]",
        }
    }
}
