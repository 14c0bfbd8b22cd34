use serde::Deserialize;
use serde_json::Value;

use super::{ExtractedDrug, ExtractionError};
use crate::models::FoodTiming;

/// Chat-completion style envelope returned by the extraction endpoint.
#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<Message>,
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

/// Pull `choices[0].message.content` out of the response body.
pub fn parse_envelope(body: &str) -> Result<String, ExtractionError> {
    let envelope: Envelope = serde_json::from_str(body)
        .map_err(|e| ExtractionError::MalformedResponse(e.to_string()))?;

    if let Some(error) = envelope.error {
        tracing::warn!(%error, "Extraction service reported an error");
        return Err(ExtractionError::MalformedResponse(format!("service error: {error}")));
    }

    envelope
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .ok_or_else(|| ExtractionError::MalformedResponse("No message content".into()))
}

/// Parse the model's content into drugs.
///
/// Content is a JSON object keyed by index (or a plain array), optionally
/// wrapped in a ```json fence. Invalid content yields no drugs; entries
/// without a name are skipped.
pub fn parse_drugs(content: &str) -> Vec<ExtractedDrug> {
    let json = strip_code_fence(content);
    let value: Value = match serde_json::from_str(json) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "Extraction content is not valid JSON");
            return Vec::new();
        }
    };

    let items: Vec<Value> = match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by_key(|(key, _)| key.parse::<u64>().unwrap_or(u64::MAX));
            entries.into_iter().map(|(_, v)| v).collect()
        }
        Value::Array(items) => items,
        other => {
            tracing::warn!(kind = json_kind(&other), "Unexpected extraction content shape");
            return Vec::new();
        }
    };

    let total = items.len();
    let drugs: Vec<ExtractedDrug> = items.iter().filter_map(parse_drug_lenient).collect();
    if drugs.len() < total {
        tracing::debug!(skipped = total - drugs.len(), "Skipped unusable extraction entries");
    }
    drugs
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after = &trimmed[start + 3..];
    let after = after.strip_prefix("json").unwrap_or(after);
    match after.find("```") {
        Some(end) => after[..end].trim(),
        None => after.trim(),
    }
}

fn parse_drug_lenient(value: &Value) -> Option<ExtractedDrug> {
    let object = value.as_object()?;
    let name = text_field(object.get("name"));
    if name.is_empty() {
        return None;
    }
    Some(ExtractedDrug {
        name,
        dosage: text_field(object.get("dosage")),
        kind: text_field(object.get("type")),
        food: integer_field(object.get("food"))
            .map(FoodTiming::from_i64)
            .unwrap_or_default(),
        route: text_field(object.get("route")),
        frequency: text_field(object.get("frequency")),
        days: integer_field(object.get("days")).unwrap_or(0),
    })
}

/// Strings are trimmed; numbers and booleans are rendered as text.
fn text_field(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Integers, whole floats, or numeric strings.
fn integer_field(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f.round() as i64))
        }
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(content: &str) -> String {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })
        .to_string()
    }

    #[test]
    fn envelope_yields_content() {
        let body = envelope("{}");
        assert_eq!(parse_envelope(&body).unwrap(), "{}");
    }

    #[test]
    fn envelope_without_choices_is_malformed() {
        assert!(matches!(
            parse_envelope(r#"{"choices": []}"#),
            Err(ExtractionError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_envelope("not json"),
            Err(ExtractionError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_envelope(r#"{"error": "model offline"}"#),
            Err(ExtractionError::MalformedResponse(_))
        ));
    }

    #[test]
    fn indexed_object_parses_in_index_order() {
        let content = r#"{
            "10": {"name": "Third", "frequency": "0-0-1", "days": 3},
            "0": {"name": "Amoxicillin", "dosage": "500mg", "type": "capsule",
                  "food": 2, "frequency": "1-0-1", "days": 7, "route": "oral"},
            "2": {"name": "Second", "frequency": "1-1-1", "days": "5"}
        }"#;
        let drugs = parse_drugs(content);
        let names: Vec<&str> = drugs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Amoxicillin", "Second", "Third"]);
        assert_eq!(drugs[0].food, FoodTiming::AfterFood);
        assert_eq!(drugs[0].days, 7);
        assert_eq!(drugs[1].days, 5);
    }

    #[test]
    fn fenced_content_is_unwrapped() {
        let content = "Here you go:\n```json\n{\"0\": {\"name\": \"Ibuprofen\", \"food\": \"1\"}}\n```";
        let drugs = parse_drugs(content);
        assert_eq!(drugs.len(), 1);
        assert_eq!(drugs[0].food, FoodTiming::BeforeFood);
    }

    #[test]
    fn arrays_are_accepted() {
        let drugs = parse_drugs(r#"[{"name": "A"}, {"name": "B"}]"#);
        assert_eq!(drugs.len(), 2);
    }

    #[test]
    fn invalid_content_means_zero_drugs() {
        assert!(parse_drugs("I could not read the label").is_empty());
        assert!(parse_drugs("42").is_empty());
    }

    #[test]
    fn nameless_and_non_object_entries_are_skipped() {
        let drugs = parse_drugs(r#"{"0": {"dosage": "5mg"}, "1": "text", "2": {"name": " Zinc "}}"#);
        assert_eq!(drugs.len(), 1);
        assert_eq!(drugs[0].name, "Zinc");
        assert_eq!(drugs[0].days, 0);
        assert_eq!(drugs[0].food, FoodTiming::NoPreference);
    }
}
