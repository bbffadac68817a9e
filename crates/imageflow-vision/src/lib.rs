//! Vision / Text Model Client: reconstructs a textual description of an
//! image and, optionally, rewrites it per user instructions.
//!
//! Wire protocol: standard chat-completions — `POST` JSON with
//! `{model, messages[], temperature?, max_tokens?, response_format?}`,
//! bearer-token auth, images carried as `image_url` data-URI content parts.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use imageflow_core::error::PipelineError;
use imageflow_core::models::PromptOutcome;
use imageflow_core::traits::VisionTextClient;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

/// Lowercased substring markers that classify a free-text reply as a
/// refusal. Treated as a coarse safety net — false positives on ordinary
/// English (e.g. "cannot") are expected and are why the Stage-2 path
/// prefers the structured JSON flag whenever it parses.
const REFUSAL_MARKERS: &[&str] = &[
    "i'm sorry",
    "i can't assist",
    "can't help",
    "cannot",
    "unable to",
];

pub struct ChatVisionClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    system_prompt_image_understand: String,
    system_prompt_prompt_editor: String,
}

impl ChatVisionClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: impl Into<String>, system_prompt_image_understand: impl Into<String>, system_prompt_prompt_editor: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.into(),
            system_prompt_image_understand: system_prompt_image_understand.into(),
            system_prompt_prompt_editor: system_prompt_prompt_editor.into(),
        }
    }

    async fn chat(&self, body: Value) -> Result<String, PipelineError> {
        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(PipelineError::Transport(format!("chat completions returned {status}: {text}")));
        }

        let payload: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| PipelineError::Transport(format!("malformed chat completions response: {e}")))?;

        payload
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| PipelineError::Transport("chat completions response had no choices".into()))
    }
}

impl VisionTextClient for ChatVisionClient {
    async fn reconstruct_prompt(&self, image_bytes: &[u8], mime: &str) -> Result<PromptOutcome, PipelineError> {
        let data_uri = format!("data:{mime};base64,{}", BASE64.encode(image_bytes));
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": self.system_prompt_image_understand },
                { "role": "user", "content": [
                    { "type": "image_url", "image_url": { "url": data_uri } },
                ] },
            ],
        });

        let reply = self.chat(body).await?;
        Ok(classify_reply(&reply))
    }

    async fn apply_instructions(
        &self,
        base_prompt: &str,
        instructions: &str,
        references: &[(Vec<u8>, String)],
    ) -> Result<PromptOutcome, PipelineError> {
        let mut content: Vec<Value> = vec![json!({
            "type": "text",
            "text": format!("Base description:\n{base_prompt}\n\nInstructions:\n{instructions}"),
        })];

        for (idx, (bytes, mime)) in references.iter().enumerate() {
            content.push(json!({
                "type": "text",
                "text": format!("Reference image #{}", idx + 1),
            }));
            content.push(json!({
                "type": "image_url",
                "image_url": { "url": format!("data:{mime};base64,{}", BASE64.encode(bytes)) },
            }));
        }

        content.push(json!({
            "type": "text",
            "text": "Return ONLY a JSON object of the exact shape {\"prompt\": string, \"isPromptGenerated\": boolean}.",
        }));

        let body = json!({
            "model": self.model,
            "response_format": { "type": "object" },
            "messages": [
                { "role": "system", "content": self.system_prompt_prompt_editor },
                { "role": "user", "content": content },
            ],
        });

        let reply = self.chat(body).await?;
        Ok(parse_structured_outcome(&reply))
    }
}

/// Classify a free-text reply using the refusal heuristic.
fn classify_reply(reply: &str) -> PromptOutcome {
    let lowered = reply.to_lowercase();
    let refused = REFUSAL_MARKERS.iter().any(|m| lowered.contains(m));
    PromptOutcome {
        prompt: reply.to_owned(),
        generated: !refused,
    }
}

/// Parse a Stage-2 reply: prefer the structured `{prompt, isPromptGenerated}`
/// JSON object; fall back to the refusal heuristic when parsing fails.
fn parse_structured_outcome(reply: &str) -> PromptOutcome {
    #[derive(Deserialize)]
    struct Structured {
        prompt: String,
        #[serde(rename = "isPromptGenerated")]
        is_prompt_generated: bool,
    }

    match extract_first_json_object(reply).and_then(|v| serde_json::from_value::<Structured>(v).ok()) {
        Some(structured) => PromptOutcome {
            prompt: structured.prompt.trim().to_owned(),
            generated: structured.is_prompt_generated,
        },
        None => {
            warn!("apply_instructions reply was not valid structured JSON, falling back to heuristic");
            classify_reply(reply)
        }
    }
}

/// Find the first balanced `{...}` substring and attempt to parse it as JSON.
fn extract_first_json_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return serde_json::from_str(&text[start..=i]).ok();
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize, Serialize)]
struct ChatMessage {
    content: String,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn refusal_markers_are_detected() {
        let outcome = classify_reply("I'm sorry, I can't assist with that request.");
        assert!(!outcome.generated);
    }

    #[test]
    fn ordinary_reply_is_not_a_refusal() {
        let outcome = classify_reply("A red ceramic mug sits on a wooden table in soft morning light.");
        assert!(outcome.generated);
    }

    #[test]
    fn structured_json_reply_parses() {
        let reply = r#"Sure, here you go: {"prompt": "a red mug on a table", "isPromptGenerated": true} -- done."#;
        let outcome = parse_structured_outcome(reply);
        assert_eq!(outcome.prompt, "a red mug on a table");
        assert!(outcome.generated);
    }

    #[test]
    fn malformed_json_falls_back_to_heuristic() {
        let outcome = parse_structured_outcome("I cannot produce that image description.");
        assert!(!outcome.generated);
    }

    #[test]
    fn trims_whitespace_from_structured_prompt() {
        let reply = r#"{"prompt": "   a red mug   ", "isPromptGenerated": true}"#;
        let outcome = parse_structured_outcome(reply);
        assert_eq!(outcome.prompt, "a red mug");
    }
}
