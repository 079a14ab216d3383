//! PII-free, bounded text digests of sanitized patient records.
//!
//! Input is the `sanitized` payload produced by
//! [`PiiSanitizer::sanitize_record`](crate::pii::PiiSanitizer::sanitize_record),
//! so identifying keys are already gone. Only a handful of known,
//! non-identifying fields are read; anything malformed is skipped.

use carebot_common::RecordCategory;
use chrono::{DateTime, NaiveDate};
use serde_json::Value;

pub const NO_DATA: &str = "Không có dữ liệu.";

const MAX_PRESCRIPTIONS: usize = 5;
const MAX_VISITS: usize = 3;
const MAX_FILES: usize = 5;
const MAX_HISTORY_ITEMS: usize = 10;

/// Summarize records of one category. Never fails: empty input yields a
/// category-specific "nothing found" sentence.
pub fn summarize_medical_data(data: &Value, category: RecordCategory) -> String {
    if data.is_null() {
        return NO_DATA.to_string();
    }
    match category {
        RecordCategory::LabResults => summarize_lab_results(data),
        RecordCategory::Prescriptions => summarize_prescriptions(data),
        RecordCategory::VitalSigns => summarize_vital_signs(data),
        RecordCategory::VisitHistory => summarize_visit_history(data),
        RecordCategory::MedicalFiles => summarize_medical_files(data),
        RecordCategory::Allergies => summarize_allergies(data),
        RecordCategory::All => summarize_all(data),
    }
}

// ── Field helpers ─────────────────────────────────────────────────────────────

fn non_empty_records(data: &Value) -> Option<&Vec<Value>> {
    data.as_array().filter(|items| !items.is_empty())
}

/// Scalar rendered as text; `None` for null, empty strings and containers.
fn text_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn first_text(record: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| text_of(record.get(*k)))
}

/// `d/m/yyyy`, or the raw value when it is not a recognisable date.
fn format_date(raw: &str) -> String {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.format("%-d/%-m/%Y").to_string();
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return d.format("%-d/%-m/%Y").to_string();
    }
    raw.to_string()
}

fn date_of(record: &Value, keys: &[&str]) -> Option<String> {
    first_text(record, keys).map(|d| format_date(&d))
}

fn with_unit(value: String, record: &Value) -> String {
    match first_text(record, &["unit"]) {
        Some(unit) => format!("{value} {unit}"),
        None => value,
    }
}

// ── Categories ────────────────────────────────────────────────────────────────

fn summarize_lab_results(data: &Value) -> String {
    let Some(results) = non_empty_records(data) else {
        return "Không tìm thấy kết quả xét nghiệm.".to_string();
    };
    let latest = &results[0];
    let mut lines = vec!["Kết quả xét nghiệm gần nhất:".to_string()];

    if let Some(name) = first_text(latest, &["testName", "type"]) {
        lines.push(format!("- Loại xét nghiệm: {name}"));
    }
    if let Some(value) = first_text(latest, &["value", "resultSummary"]) {
        lines.push(format!("- Giá trị: {}", with_unit(value, latest)));
    }
    if let Some(range) = first_text(latest, &["normalRange", "referenceRange"]) {
        lines.push(format!("- Ngưỡng bình thường: {range}"));
    }
    if let Some(date) = date_of(latest, &["performedAt", "recordedAt", "createdAt"]) {
        lines.push(format!("- Ngày xét nghiệm: {date}"));
    }
    if let Some(status) = first_text(latest, &["status"]) {
        lines.push(format!("- Trạng thái: {status}"));
    }
    lines.join("\n")
}

fn summarize_prescriptions(data: &Value) -> String {
    let Some(prescriptions) = non_empty_records(data) else {
        return "Không tìm thấy đơn thuốc.".to_string();
    };
    let mut lines = vec!["Đơn thuốc gần nhất:".to_string()];

    for (i, rx) in prescriptions.iter().take(MAX_PRESCRIPTIONS).enumerate() {
        let name = first_text(rx, &["medication", "name"]).unwrap_or_else(|| "Thuốc".into());
        lines.push(format!("\n{}. {name}", i + 1));

        for (key, label) in [
            ("dosage", "Liều dùng"),
            ("frequency", "Tần suất"),
            ("duration", "Thời gian"),
            ("instructions", "Hướng dẫn"),
        ] {
            if let Some(v) = first_text(rx, &[key]) {
                lines.push(format!("   - {label}: {v}"));
            }
        }
        if let Some(date) = rx.get("consultation").and_then(|c| date_of(c, &["createdAt"])) {
            lines.push(format!("   - Ngày kê đơn: {date}"));
        }
    }
    lines.join("\n")
}

fn vital_value(v: &Value) -> Option<String> {
    if let (Some(sys), Some(dia)) = (text_of(v.get("systolic")), text_of(v.get("diastolic"))) {
        return Some(format!("{sys}/{dia}"));
    }
    if let Some(single) =
        first_text(v, &["heartRate", "glucose", "spo2", "temperature", "weight", "value"])
    {
        return Some(single);
    }
    // Composite readings are stored as an object under `values`.
    v.get("values").filter(|x| x.is_object()).map(Value::to_string)
}

fn summarize_vital_signs(data: &Value) -> String {
    let Some(vitals) = non_empty_records(data) else {
        return "Không tìm thấy chỉ số sinh hiệu.".to_string();
    };
    let latest = &vitals[0];
    let mut lines = vec!["Chỉ số sinh hiệu gần nhất:".to_string()];

    if let Some(kind) = first_text(latest, &["type"]) {
        lines.push(format!("- Loại: {kind}"));
    }
    if let Some(value) = vital_value(latest) {
        lines.push(format!("- Giá trị: {}", with_unit(value, latest)));
    }
    if let Some(date) = date_of(latest, &["timestamp", "recordedAt", "createdAt"]) {
        lines.push(format!("- Ngày đo: {date}"));
    }
    if let Some(status) = first_text(latest, &["status"]) {
        lines.push(format!("- Trạng thái: {status}"));
    }
    lines.join("\n")
}

fn summarize_visit_history(data: &Value) -> String {
    let Some(visits) = non_empty_records(data) else {
        return "Không tìm thấy lịch sử khám bệnh.".to_string();
    };
    let mut lines = vec![format!("Lịch sử khám bệnh ({} lần):", visits.len())];

    for (i, visit) in visits.iter().take(MAX_VISITS).enumerate() {
        let date = date_of(visit, &["visitDate", "createdAt", "date"]).unwrap_or_default();
        lines.push(format!("\n{}. Lần khám {date}", i + 1));
        for (key, label) in [("diagnosis", "Chẩn đoán"), ("notes", "Ghi chú"), ("status", "Trạng thái")] {
            if let Some(v) = first_text(visit, &[key]) {
                lines.push(format!("   - {label}: {v}"));
            }
        }
    }
    lines.join("\n")
}

fn summarize_medical_files(data: &Value) -> String {
    let Some(files) = non_empty_records(data) else {
        return "Không tìm thấy hồ sơ/tệp y tế.".to_string();
    };
    let mut lines = vec!["Tệp y tế gần nhất:".to_string()];
    for (i, file) in files.iter().take(MAX_FILES).enumerate() {
        let name = first_text(file, &["name"]).unwrap_or_else(|| "Tệp".into());
        let kind = first_text(file, &["type"]).map(|t| format!(" ({t})")).unwrap_or_default();
        lines.push(format!("- {}. {name}{kind}", i + 1));
    }
    lines.join("\n")
}

fn summarize_allergies(data: &Value) -> String {
    let Some(items) = non_empty_records(data) else {
        return "Không có thông tin dị ứng/tiền sử trong hồ sơ.".to_string();
    };
    let mut lines = vec!["Thông tin trong hồ sơ (có thể gồm dị ứng/tiền sử):".to_string()];
    lines.extend(
        items
            .iter()
            .take(MAX_HISTORY_ITEMS)
            .filter_map(|item| first_text(item, &["value"]))
            .map(|v| format!("- {v}")),
    );
    lines.join("\n")
}

fn summarize_all(data: &Value) -> String {
    let mut lines = vec!["Tóm tắt hồ sơ (đã loại bỏ định danh):".to_string()];

    if let Some(labs) = data.get("lab_results") {
        lines.push("\n--- Xét nghiệm ---".into());
        lines.push(summarize_lab_results(labs));
    }
    if let Some(rx) = data.get("prescriptions") {
        lines.push("\n--- Đơn thuốc ---".into());
        lines.push(summarize_prescriptions(rx));
    }
    if let Some(vitals) = data.get("vital_signs") {
        lines.push("\n--- Sinh hiệu ---".into());
        lines.push(summarize_vital_signs(vitals));
    }
    lines.join("\n")
}
