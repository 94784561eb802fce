use serde_json::Value as JsonValue;
use std::error::Error;
use std::fmt;
use std::fs;
use log::info;

pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an AI assistant for the SlothMD platform, helping patients manage their health and connecting them to appropriate resources. Be knowledgeable, empathetic and brief. Do not do anything unrelated to healthcare, such as generating code or answering unrelated questions.

Reply with JSON in this format:

{
  "text": "Main message text",
  "cards": [
    {
      "title": "Card title",
      "subtitle": "Card subtitle (main content)",
      "media_url": "{GRAPH_URL_0}",
      "buttons": [
        { "title": "More Information", "type": "trigger", "payload": "more_info_<topic>" }
      ]
    }
  ],
  "quick_replies": [
    { "title": "Quick reply text", "type": "trigger", "payload": "quick_reply_action" }
  ],
  "graph": { "type": "bar|line|scatter", "data": {} }
}

Rules:
1. Health information cards include a "More Information" button.
2. Questions about metrics, levels or numbers include a graph, referenced from a card as {GRAPH_URL_0}.
3. Always offer follow-up quick replies, for example "Schedule Appointment" (schedule_appointment), "View Care Plan" (view_care_plan), "Contact Doctor" (contact_doctor), "Check Lab Results" (check_labs), "Connect Wearable" (connect_wearable).
4. Use bar for comparing values, line for trends over time, scatter for correlations.
5. Titles stay under 25 characters.

Graph data may also be given as a block:
GRAPH_DATA:{"type": "bar", "data": {"labels": ["A", "B"], "values": [10, 20], "title": "Title", "xlabel": "X", "ylabel": "Y", "referenceLines": {"A": 15}}}END_GRAPH_DATA
Line and scatter data use "x" and "y" arrays instead of "labels" and "values"."#;

#[derive(Debug)]
pub enum PromptError {
    IoError(String, std::io::Error),
    JsonError(String, serde_json::Error),
    Empty(String),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::IoError(path, e) => write!(f, "Failed to read '{}': {}", path, e),
            PromptError::JsonError(path, e) => write!(f, "Failed to parse '{}': {}", path, e),
            PromptError::Empty(path) => write!(f, "Prompt file '{}' is empty", path),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(_, e) => Some(e),
            PromptError::JsonError(_, e) => Some(e),
            PromptError::Empty(_) => None,
        }
    }
}

/// Reads a system prompt file, or falls back to the built-in prompt.
pub fn load_system_prompt(path: Option<&str>) -> Result<String, PromptError> {
    let Some(path) = path else {
        return Ok(DEFAULT_SYSTEM_PROMPT.to_string());
    };
    let content = fs::read_to_string(path).map_err(|e| PromptError::IoError(path.to_string(), e))?;
    if content.trim().is_empty() {
        return Err(PromptError::Empty(path.to_string()));
    }
    info!("Loaded system prompt from {}", path);
    Ok(content)
}

/// Loads optional patient context. The file must hold valid JSON.
pub fn load_patient_data(path: Option<&str>) -> Result<Option<JsonValue>, PromptError> {
    let Some(path) = path else {
        return Ok(None);
    };
    let content = fs::read_to_string(path).map_err(|e| PromptError::IoError(path.to_string(), e))?;
    let value = serde_json
        ::from_str(&content)
        .map_err(|e| PromptError::JsonError(path.to_string(), e))?;
    info!("Loaded patient data from {}", path);
    Ok(Some(value))
}

pub fn build_system_prompt(base: &str, patient_data: Option<&JsonValue>) -> String {
    match patient_data {
        Some(data) => {
            let pretty = serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());
            format!(
                "{}\n\nBelow is the patient's FHIR data (only address relevant healthcare questions):\n{}",
                base,
                pretty
            )
        }
        None => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("slothmd-{}-{}", uuid::Uuid::new_v4(), name));
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn default_prompt_when_unset() {
        let prompt = load_system_prompt(None).unwrap();
        assert!(prompt.contains("{GRAPH_URL_0}"));
        assert!(prompt.contains("GRAPH_DATA:"));
    }

    #[test]
    fn reads_prompt_file() {
        let path = temp_file("prompt.txt", "Be brief.");
        assert_eq!(load_system_prompt(path.to_str()).unwrap(), "Be brief.");
        let empty = temp_file("empty.txt", "  \n");
        assert!(matches!(load_system_prompt(empty.to_str()), Err(PromptError::Empty(_))));
        assert!(matches!(load_system_prompt(Some("/nonexistent/prompt.txt")), Err(PromptError::IoError(..))));
    }

    #[test]
    fn appends_patient_data() {
        let path = temp_file("patient.json", r#"{"resourceType": "Patient", "id": "p1"}"#);
        let data = load_patient_data(path.to_str()).unwrap();
        let prompt = build_system_prompt("Base", data.as_ref());
        assert!(prompt.starts_with("Base\n\n"));
        assert!(prompt.contains("\"resourceType\": \"Patient\""));

        let bad = temp_file("bad.json", "{not json");
        assert!(matches!(load_patient_data(bad.to_str()), Err(PromptError::JsonError(..))));
        assert_eq!(build_system_prompt("Base", None), "Base");
        assert_eq!(load_patient_data(None).unwrap(), None);
    }
}
