//! Operational admin tools.
//!
//! The classifier routes questions about booking, prices and the hospital
//! itself to a named tool. Tools answer from canned information only; none
//! of them reaches outside the process. An unknown tool name gets a
//! generic fallback rather than an error.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use carebot_llm::ToolInvocation;

pub const UNKNOWN_TOOL_REPLY: &str =
    "Mình chưa hỗ trợ yêu cầu này. Vui lòng liên hệ quầy tiếp đón hoặc tổng đài 1900 1234 để được hỗ trợ.";

/// Public listing entry for one registered tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

/// A canned informational tool.
pub trait AdminTool: Send + Sync {
    /// Name the classifier uses in `tool_params.tool_name`.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn invoke(&self, args: &Map<String, Value>) -> String;
}

// ─────────────────────────────────────────────
//  Registry
// ─────────────────────────────────────────────

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn AdminTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    /// Registry with every built-in tool.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(BookingSystem);
        registry.register(PriceList);
        registry.register(HospitalInfo);
        registry.register(DepartmentLookup);
        registry
    }

    /// Later registrations replace earlier ones with the same name.
    pub fn register<T: AdminTool + 'static>(&mut self, tool: T) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), Arc::new(tool)).is_some() {
            tracing::warn!(tool = %name, "Admin tool replaced");
        }
    }

    pub fn dispatch(&self, invocation: &ToolInvocation) -> String {
        match self.tools.get(&invocation.tool_name) {
            Some(tool) => {
                tracing::debug!(tool = %invocation.tool_name, "Admin tool invoked");
                tool.invoke(&invocation.tool_args)
            }
            None => {
                tracing::info!(tool = %invocation.tool_name, "Unknown admin tool");
                UNKNOWN_TOOL_REPLY.to_string()
            }
        }
    }

    /// Registered tools sorted by name.
    pub fn catalog(&self) -> Vec<ToolInfo> {
        let mut catalog: Vec<ToolInfo> = self
            .tools
            .values()
            .map(|tool| ToolInfo { name: tool.name().to_string(), description: tool.description().to_string() })
            .collect();
        catalog.sort_by(|a, b| a.name.cmp(&b.name));
        catalog
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

// ─────────────────────────────────────────────
//  Built-in tools
// ─────────────────────────────────────────────

pub struct BookingSystem;

impl AdminTool for BookingSystem {
    fn name(&self) -> &str { "booking_system" }

    fn description(&self) -> &str { "How to book, change or cancel an appointment." }

    fn invoke(&self, _args: &Map<String, Value>) -> String {
        [
            "Bạn có thể đặt lịch khám theo các cách sau:",
            "- Mục \"Lịch hẹn\" trên ứng dụng, chọn chuyên khoa và khung giờ phù hợp.",
            "- Gọi tổng đài 1900 1234 (7:00 - 20:00 hằng ngày).",
            "Để đổi hoặc hủy lịch, vui lòng thao tác trước giờ hẹn ít nhất 2 tiếng.",
        ]
        .join("\n")
    }
}

pub struct PriceList;

impl AdminTool for PriceList {
    fn name(&self) -> &str { "price_list" }

    fn description(&self) -> &str { "Reference prices for common services." }

    fn invoke(&self, _args: &Map<String, Value>) -> String {
        [
            "Bảng giá tham khảo:",
            "- Khám tổng quát: 200.000đ",
            "- Xét nghiệm máu cơ bản: 150.000đ",
            "- Siêu âm ổ bụng: 300.000đ",
            "- Chụp X-quang ngực: 250.000đ",
            "Giá có thể thay đổi theo chỉ định thực tế. Vui lòng liên hệ quầy tiếp đón để biết chi tiết.",
        ]
        .join("\n")
    }
}

pub struct HospitalInfo;

impl AdminTool for HospitalInfo {
    fn name(&self) -> &str { "hospital_info" }

    fn description(&self) -> &str { "Opening hours and contact channels." }

    fn invoke(&self, _args: &Map<String, Value>) -> String {
        [
            "Thông tin bệnh viện:",
            "- Giờ khám: 7:00 - 17:00 từ thứ Hai đến thứ Bảy.",
            "- Khoa Cấp cứu hoạt động 24/7.",
            "- Tổng đài hỗ trợ: 1900 1234.",
        ]
        .join("\n")
    }
}

const DEPARTMENTS: [(&str, &str); 6] = [
    ("tim mạch", "Khoa Tim mạch: tầng 3, khu A."),
    ("nội tiết", "Khoa Nội tiết: tầng 2, khu A."),
    ("nhi", "Khoa Nhi: tầng 1, khu C."),
    ("da liễu", "Khoa Da liễu: tầng 4, khu B."),
    ("tai mũi họng", "Khoa Tai Mũi Họng: tầng 2, khu B."),
    ("cấp cứu", "Khoa Cấp cứu: tầng trệt, khu B, hoạt động 24/7."),
];

/// Looks up `tool_args.department`; lists every department otherwise.
pub struct DepartmentLookup;

impl AdminTool for DepartmentLookup {
    fn name(&self) -> &str { "department_lookup" }

    fn description(&self) -> &str { "Location of a hospital department." }

    fn invoke(&self, args: &Map<String, Value>) -> String {
        let requested = args
            .get("department")
            .and_then(Value::as_str)
            .map(|d| d.trim().to_lowercase())
            .unwrap_or_default();
        let requested = requested.strip_prefix("khoa ").unwrap_or(&requested);

        if let Some((_, info)) = DEPARTMENTS.iter().find(|(name, _)| *name == requested) {
            return info.to_string();
        }

        let mut lines = vec!["Các chuyên khoa hiện có:".to_string()];
        lines.extend(DEPARTMENTS.iter().map(|(_, info)| format!("- {info}")));
        lines.join("\n")
    }
}
