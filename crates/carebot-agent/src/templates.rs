//! Fixed user-facing texts.

/// Replies that never leave the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalReply {
    Greeting,
    Goodbye,
    Thanks,
    OffTopic,
    NeedLogin,
    InsufficientPermission,
}

impl LocalReply {
    pub fn text(&self) -> &'static str {
        match self {
            LocalReply::Greeting => "Chào bạn! Mình là trợ lý y tế AI. Bạn muốn hỏi gì về sức khỏe?",
            LocalReply::Goodbye => "Tạm biệt! Chúc bạn nhiều sức khỏe.",
            LocalReply::Thanks => "Rất vui được hỗ trợ bạn!",
            LocalReply::OffTopic => {
                "Mình chỉ hỗ trợ các câu hỏi liên quan đến sức khỏe/y tế. Bạn đang quan tâm vấn đề gì?"
            }
            LocalReply::NeedLogin => "Để xem thông tin cá nhân/hồ sơ y tế, bạn cần đăng nhập.",
            LocalReply::InsufficientPermission => {
                "Bạn không có quyền truy cập dữ liệu này. Vui lòng liên hệ quản trị viên."
            }
        }
    }
}

pub const NOTHING_FOUND: &str = "Không tìm thấy dữ liệu phù hợp trong hồ sơ của bạn.";

// ── Failure messages ──────────────────────────────────────────────────────────

pub const EMPTY_QUESTION: &str = "Câu hỏi không được để trống.";
pub const POLICY_REFUSAL: &str = "Xin lỗi, mình không thể xử lý yêu cầu này. Vui lòng đặt câu hỏi khác về sức khỏe.";
pub const AI_UNAVAILABLE: &str = "Dịch vụ AI tạm thời không khả dụng. Vui lòng thử lại sau.";
pub const AI_BAD_GATEWAY: &str = "Không thể nhận phản hồi từ dịch vụ AI. Vui lòng thử lại sau.";
pub const INTERNAL_ERROR: &str = "Đã xảy ra lỗi hệ thống. Vui lòng thử lại sau.";

pub fn question_too_long(max_chars: usize) -> String {
    format!("Câu hỏi quá dài (tối đa {max_chars} ký tự).")
}
