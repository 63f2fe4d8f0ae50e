use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Input document for a single orchestration call. Immutable after creation.
#[derive(Debug, Clone)]
pub struct Document {
    pub bytes: Vec<u8>,
    pub media_type: String,
    pub language: String,
}

impl Document {
    pub fn new(bytes: Vec<u8>, media_type: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            bytes,
            media_type: media_type.into(),
            language: language.into(),
        }
    }

    /// Structural validation at the request boundary. Content-level checks
    /// (file type, size limits) belong to the upload layer, not here.
    pub fn validate(&self) -> Result<(), String> {
        if self.bytes.is_empty() {
            return Err("document payload is empty".to_string());
        }
        if self.media_type.trim().is_empty() {
            return Err("document media type is empty".to_string());
        }
        Ok(())
    }
}

/// Axis-aligned bounding box in image pixel coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

/// One recognized text span with its confidence in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizedItem {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    pub confidence: f32,
}

/// Per-engine failure taxonomy. Request-level problems live in
/// `crate::error::OrchestratorError` instead.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    AdapterUnavailable,
    RecognitionFailure,
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineFailure {
    pub reason: FailureReason,
    pub message: String,
}

/// Outcome of exactly one adapter invocation. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineResult {
    pub engine: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    pub items: Vec<RecognizedItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_confidence: Option<f32>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<EngineFailure>,
}

impl EngineResult {
    pub fn success(
        engine: impl Into<String>,
        raw_text: String,
        items: Vec<RecognizedItem>,
        elapsed: Duration,
    ) -> Self {
        let avg_confidence = mean_confidence(&items);
        Self {
            engine: engine.into(),
            raw_text: Some(raw_text),
            items,
            avg_confidence,
            duration_ms: elapsed.as_millis() as u64,
            failure: None,
        }
    }

    pub fn failure(
        engine: impl Into<String>,
        reason: FailureReason,
        message: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            engine: engine.into(),
            raw_text: None,
            items: Vec::new(),
            avg_confidence: None,
            duration_ms: elapsed.as_millis() as u64,
            failure: Some(EngineFailure {
                reason,
                message: message.into(),
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Copy with items below the confidence threshold dropped and the
    /// aggregate confidence recomputed. Raw text is left untouched.
    pub fn with_confidence_threshold(&self, threshold: f32) -> Self {
        if !self.is_success() || threshold <= 0.0 {
            return self.clone();
        }
        let items: Vec<RecognizedItem> = self
            .items
            .iter()
            .filter(|item| item.confidence >= threshold)
            .cloned()
            .collect();
        let avg_confidence = mean_confidence(&items);
        Self {
            items,
            avg_confidence,
            ..self.clone()
        }
    }
}

fn mean_confidence(items: &[RecognizedItem]) -> Option<f32> {
    if items.is_empty() {
        return None;
    }
    let sum: f32 = items.iter().map(|item| item.confidence).sum();
    Some(sum / items.len() as f32)
}

/// Structured fields mined from one engine's raw text. Absent fields mean
/// "not found" and are omitted from the serialized form.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtractedFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inn: Option<String>,
}

impl ExtractedFields {
    pub fn is_empty(&self) -> bool {
        self.fio.is_none()
            && self.date.is_none()
            && self.sum.is_none()
            && self.contract_number.is_none()
            && self.account.is_none()
            && self.phone.is_none()
            && self.email.is_none()
            && self.inn.is_none()
    }
}

/// Divergence between an ordered (reference, hypothesis) engine pair.
/// CER/WER are uncapped; similarity is in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairwiseMetric {
    pub cer: f64,
    pub wer: f64,
    pub similarity: f64,
}

/// One engine's slot in a comparison report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineRun {
    #[serde(flatten)]
    pub result: EngineResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_fields: Option<ExtractedFields>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub engines_tested: usize,
    pub successful_engines: usize,
    pub failed_engines: usize,
}

/// Aggregated multi-engine result of one `compare` call. Built once,
/// returned, then discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub results: HashMap<String, EngineRun>,
    pub comparison_metrics: HashMap<String, PairwiseMetric>,
    pub summary: ComparisonSummary,
}

/// Non-fatal refinement outcome flag. `Unavailable` and `Failed` both mean
/// the extracted fields passed through unchanged.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefinementStatus {
    NotRequested,
    Applied,
    Unavailable,
    Failed,
}

/// Result of a single-engine `process` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOutcome {
    #[serde(flatten)]
    pub result: EngineResult,
    pub total_items: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_fields: Option<ExtractedFields>,
    pub refinement: RefinementStatus,
}

/// Liveness report. Performs no recognition work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub available_engines: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_result_computes_mean_confidence() {
        let items = vec![
            RecognizedItem { text: "Договор".to_string(), bbox: None, confidence: 0.9 },
            RecognizedItem { text: "№ 42".to_string(), bbox: None, confidence: 0.7 },
        ];
        let result = EngineResult::success(
            "tesseract",
            "Договор № 42".to_string(),
            items,
            Duration::from_millis(120),
        );
        assert!(result.is_success());
        assert!((result.avg_confidence.unwrap() - 0.8).abs() < 1e-6);
        assert_eq!(result.duration_ms, 120);
    }

    #[test]
    fn test_success_without_items_has_no_confidence() {
        let result =
            EngineResult::success("trocr", "строка".to_string(), vec![], Duration::from_millis(5));
        assert!(result.is_success());
        assert!(result.avg_confidence.is_none());
    }

    #[test]
    fn test_failure_result_carries_reason() {
        let result = EngineResult::failure(
            "paddle",
            FailureReason::Timeout,
            "deadline exceeded after 30000 ms",
            Duration::from_secs(30),
        );
        assert!(!result.is_success());
        assert!(result.raw_text.is_none());
        assert_eq!(result.failure.as_ref().unwrap().reason, FailureReason::Timeout);
    }

    #[test]
    fn test_confidence_threshold_filters_items() {
        let items = vec![
            RecognizedItem { text: "Сумма".to_string(), bbox: None, confidence: 0.95 },
            RecognizedItem { text: "???".to_string(), bbox: None, confidence: 0.2 },
        ];
        let result = EngineResult::success(
            "tesseract",
            "Сумма ???".to_string(),
            items,
            Duration::from_millis(1),
        );
        let filtered = result.with_confidence_threshold(0.5);
        assert_eq!(filtered.items.len(), 1);
        assert!((filtered.avg_confidence.unwrap() - 0.95).abs() < 1e-6);
        // Raw text is not rewritten by the filter.
        assert_eq!(filtered.raw_text, result.raw_text);
    }

    #[test]
    fn test_document_validation() {
        let doc = Document::new(vec![1, 2, 3], "image/png", "ru");
        assert!(doc.validate().is_ok());

        let empty = Document::new(vec![], "image/png", "ru");
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_extracted_fields_serialization_omits_absent_keys() {
        let fields = ExtractedFields {
            inn: Some("7707083893".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&fields).unwrap();
        assert_eq!(json["inn"], "7707083893");
        assert!(json.get("phone").is_none());
        assert!(json.get("account").is_none());
    }
}
