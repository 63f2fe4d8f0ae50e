//! Optional LLM refinement port for extracted fields.
//!
//! When no API key is configured the port degrades to a deterministic
//! identity pass-through; a network or parse failure never fails the
//! request, it is reported as a non-fatal status flag instead.

use log::warn;
use serde_json::Value;

use crate::config::Config;
use crate::models::{ExtractedFields, RefinementStatus};

pub struct LlmRefiner {
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

impl LlmRefiner {
    pub fn from_config(config: &Config) -> Self {
        Self {
            api_key: config.openai_api_key.clone(),
            model: config.refine_model.clone(),
            client: reqwest::Client::new(),
        }
    }

    /// Refine extracted fields against the raw recognized text. Always
    /// returns a field set: the input unchanged when the refiner is
    /// unavailable or fails, the merged result when it succeeds.
    pub async fn refine(
        &self,
        raw_text: &str,
        fields: &ExtractedFields,
    ) -> (ExtractedFields, RefinementStatus) {
        let Some(api_key) = &self.api_key else {
            return (fields.clone(), RefinementStatus::Unavailable);
        };

        match self.call_llm(api_key, raw_text).await {
            Ok(refined) => (merge_refined(fields, &refined), RefinementStatus::Applied),
            Err(e) => {
                warn!("Refinement failed, keeping extracted fields as-is: {}", e);
                (fields.clone(), RefinementStatus::Failed)
            }
        }
    }

    async fn call_llm(&self, api_key: &str, raw_text: &str) -> anyhow::Result<Value> {
        let prompt = build_refine_prompt(raw_text);

        let request_body = serde_json::json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You are an expert at extracting structured data from scanned Russian documents. Respond with a single JSON object only."
                },
                {
                    "role": "user",
                    "content": prompt
                }
            ],
            "max_tokens": 1000,
            "temperature": 0
        });

        let resp = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&request_body)
            .send()
            .await?;

        let status = resp.status();
        let body: Value = resp.json().await?;
        if !status.is_success() {
            anyhow::bail!("Refiner returned {}: {}", status, body);
        }

        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Refiner response has no content"))?;

        extract_json_object(content)
            .ok_or_else(|| anyhow::anyhow!("Refiner did not return a JSON object"))
    }
}

fn build_refine_prompt(raw_text: &str) -> String {
    format!(
        "Analyze this OCR-recognized document text and extract the following \
         fields into JSON if present: fio (full person name), date (YYYY-MM-DD), \
         sum (monetary amount as a number), contract_number, account (20-digit \
         bank account), phone, email, inn (10 or 12 digit tax id). Omit fields \
         you cannot find. Fix obvious OCR misreadings.\n\nDocument text:\n{}",
        raw_text
    )
}

/// Pull the first {...} object out of a model response that may wrap it in
/// prose or code fences.
fn extract_json_object(content: &str) -> Option<Value> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&content[start..=end]).ok()
}

/// Merge the refiner's output over the locally extracted fields. A refined
/// value wins; fields the refiner stayed silent on keep their local value.
pub(crate) fn merge_refined(original: &ExtractedFields, refined: &Value) -> ExtractedFields {
    let take_string = |key: &str, fallback: &Option<String>| -> Option<String> {
        refined
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .or_else(|| fallback.clone())
    };

    let sum = refined
        .get("sum")
        .and_then(|v| {
            v.as_f64()
                .or_else(|| v.as_str().and_then(|s| s.replace(',', ".").parse().ok()))
        })
        .or(original.sum);

    ExtractedFields {
        fio: take_string("fio", &original.fio),
        date: take_string("date", &original.date),
        sum,
        contract_number: take_string("contract_number", &original.contract_number),
        account: take_string("account", &original.account),
        phone: take_string("phone", &original.phone),
        email: take_string("email", &original.email),
        inn: take_string("inn", &original.inn),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refiner_without_key() -> LlmRefiner {
        LlmRefiner {
            api_key: None,
            model: "gpt-3.5-turbo".to_string(),
            client: reqwest::Client::new(),
        }
    }

    #[tokio::test]
    async fn test_unavailable_refiner_is_identity() {
        let refiner = refiner_without_key();
        let fields = ExtractedFields {
            inn: Some("7707083893".to_string()),
            phone: Some("+74951234567".to_string()),
            ..Default::default()
        };

        let (refined, status) = refiner.refine("какой-то текст", &fields).await;
        assert_eq!(status, RefinementStatus::Unavailable);
        assert_eq!(refined, fields);
    }

    #[test]
    fn test_merge_refined_value_wins() {
        let original = ExtractedFields {
            fio: Some("Иванов Иван".to_string()),
            date: Some("2023-03-15".to_string()),
            ..Default::default()
        };
        let refined = serde_json::json!({
            "fio": "Иванов Иван Иванович",
            "sum": 1500.5,
        });

        let merged = merge_refined(&original, &refined);
        assert_eq!(merged.fio.as_deref(), Some("Иванов Иван Иванович"));
        assert_eq!(merged.sum, Some(1500.5));
        // Silent field keeps the local value.
        assert_eq!(merged.date.as_deref(), Some("2023-03-15"));
    }

    #[test]
    fn test_merge_ignores_empty_strings_and_parses_string_sums() {
        let original = ExtractedFields {
            email: Some("ivanov@example.ru".to_string()),
            ..Default::default()
        };
        let refined = serde_json::json!({ "email": "  ", "sum": "2500,75" });

        let merged = merge_refined(&original, &refined);
        assert_eq!(merged.email.as_deref(), Some("ivanov@example.ru"));
        assert_eq!(merged.sum, Some(2500.75));
    }

    #[test]
    fn test_extract_json_object_from_fenced_response() {
        let content = "Here you go:\n```json\n{\"inn\": \"7707083893\"}\n```";
        let value = extract_json_object(content).unwrap();
        assert_eq!(value["inn"], "7707083893");

        assert!(extract_json_object("no json here").is_none());
    }
}
