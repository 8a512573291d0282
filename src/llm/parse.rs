use serde_json::{Map, Value};

/// Extract a single JSON object from raw model output.
///
/// Models are instructed to answer with bare JSON but frequently wrap it in
/// code fences or surrounding prose. Strips fence markers, takes the span
/// from the first `{` to the last `}`, and attempts to decode it. Returns
/// None when no object span exists or decoding fails; callers supply their
/// own defaults and must never treat None as a crash condition.
pub fn extract_json(text: &str) -> Option<Map<String, Value>> {
    let cleaned = text.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();

    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end < start {
        return None;
    }

    match serde_json::from_str::<Value>(&cleaned[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}
