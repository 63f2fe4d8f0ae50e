//! Recognition adapters: a uniform contract over heterogeneous OCR backends.
//!
//! Adapters never propagate internal errors to the caller. Every failure is
//! classified into a `FailureReason` and returned as a failed `EngineResult`.

use async_trait::async_trait;
use log::warn;
use serde_json::Value;
use std::time::{Duration, Instant};

use crate::constants::{ENGINE_PADDLE, ENGINE_TESSERACT, ENGINE_TROCR};
use crate::models::{BoundingBox, Document, EngineResult, FailureReason, RecognizedItem};
use crate::utils::encode_document_base64;

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

type RunOutput = (String, Vec<RecognizedItem>);
type RunError = (FailureReason, String);

#[async_trait]
pub trait RecognitionAdapter: Send + Sync {
    fn engine_id(&self) -> &'static str;
    fn description(&self) -> &'static str;

    /// Startup capability check. An adapter that fails the probe is left out
    /// of the registry entirely.
    async fn probe(&self) -> bool;

    /// Recognize the document. Infallible by contract: internal failures are
    /// converted into a failed `EngineResult` with a classified reason.
    async fn recognize(&self, document: &Document, language: &str) -> EngineResult;
}

fn finish(
    engine_id: &'static str,
    started: Instant,
    outcome: Result<RunOutput, RunError>,
) -> EngineResult {
    match outcome {
        Ok((raw_text, items)) => {
            EngineResult::success(engine_id, raw_text, items, started.elapsed())
        }
        Err((reason, message)) => {
            warn!("{} failed: {:?}: {}", engine_id, reason, message);
            EngineResult::failure(engine_id, reason, message, started.elapsed())
        }
    }
}

fn classify_http_error(e: &reqwest::Error) -> FailureReason {
    if e.is_connect() || e.is_timeout() {
        FailureReason::AdapterUnavailable
    } else {
        FailureReason::RecognitionFailure
    }
}

// --- Tesseract (local CLI) ---

pub struct TesseractAdapter {
    cmd: String,
}

impl TesseractAdapter {
    pub fn new(cmd: String) -> Self {
        Self { cmd }
    }

    fn map_language(language: &str) -> &str {
        match language {
            "ru" => "rus",
            "en" => "eng",
            other => other,
        }
    }

    fn extension_for(media_type: &str) -> &'static str {
        match media_type {
            "image/jpeg" => "jpg",
            "image/bmp" => "bmp",
            "image/tiff" => "tiff",
            "image/webp" => "webp",
            _ => "png",
        }
    }

    async fn run(&self, document: &Document, language: &str) -> Result<RunOutput, RunError> {
        let input_path = std::env::temp_dir().join(format!(
            "docrec-{}.{}",
            uuid::Uuid::new_v4(),
            Self::extension_for(&document.media_type)
        ));
        tokio::fs::write(&input_path, &document.bytes)
            .await
            .map_err(|e| {
                (
                    FailureReason::RecognitionFailure,
                    format!("Failed to write temp image: {}", e),
                )
            })?;

        // kill_on_drop: если дедлайн истёк и future сброшен, процесс не
        // остаётся висеть
        let output = tokio::process::Command::new(&self.cmd)
            .arg(&input_path)
            .arg("stdout")
            .arg("-l")
            .arg(Self::map_language(language))
            .arg("tsv")
            .kill_on_drop(true)
            .output()
            .await;

        let _ = tokio::fs::remove_file(&input_path).await;

        let output = output.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                (
                    FailureReason::AdapterUnavailable,
                    format!("tesseract binary not found: {}", e),
                )
            } else {
                (
                    FailureReason::RecognitionFailure,
                    format!("Failed to spawn tesseract: {}", e),
                )
            }
        })?;

        if !output.status.success() {
            return Err((
                FailureReason::RecognitionFailure,
                format!(
                    "tesseract exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr)
                ),
            ));
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        Ok(parse_tesseract_tsv(&tsv))
    }
}

/// Parse tesseract's TSV output. Word rows are level 5; confidences come in
/// 0..100 and are normalized to [0, 1].
fn parse_tesseract_tsv(tsv: &str) -> RunOutput {
    let mut items = Vec::new();
    let mut lines: Vec<Vec<String>> = Vec::new();
    let mut last_line_key: Option<(u32, u32, u32)> = None;

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }
        let level: u32 = cols[0].parse().unwrap_or(0);
        if level != 5 {
            continue;
        }
        let conf: f32 = cols[10].parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if conf < 0.0 || text.is_empty() {
            continue;
        }

        let bbox = match (
            cols[6].parse::<f32>(),
            cols[7].parse::<f32>(),
            cols[8].parse::<f32>(),
            cols[9].parse::<f32>(),
        ) {
            (Ok(left), Ok(top), Ok(width), Ok(height)) => {
                Some(BoundingBox { left, top, width, height })
            }
            _ => None,
        };

        items.push(RecognizedItem {
            text: text.to_string(),
            bbox,
            confidence: (conf / 100.0).clamp(0.0, 1.0),
        });

        let line_key = (
            cols[2].parse().unwrap_or(0),
            cols[3].parse().unwrap_or(0),
            cols[4].parse().unwrap_or(0),
        );
        if last_line_key != Some(line_key) {
            lines.push(Vec::new());
            last_line_key = Some(line_key);
        }
        if let Some(current) = lines.last_mut() {
            current.push(text.to_string());
        }
    }

    let raw_text = lines
        .iter()
        .map(|words| words.join(" "))
        .collect::<Vec<_>>()
        .join("\n");
    (raw_text, items)
}

#[async_trait]
impl RecognitionAdapter for TesseractAdapter {
    fn engine_id(&self) -> &'static str {
        ENGINE_TESSERACT
    }

    fn description(&self) -> &'static str {
        "Tesseract — быстрый базовый OCR (локальный бинарник)"
    }

    async fn probe(&self) -> bool {
        tokio::process::Command::new(&self.cmd)
            .arg("--version")
            .output()
            .await
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    async fn recognize(&self, document: &Document, language: &str) -> EngineResult {
        let started = Instant::now();
        let outcome = self.run(document, language).await;
        finish(self.engine_id(), started, outcome)
    }
}

// --- PaddleOCR (HTTP serving endpoint) ---

pub struct PaddleAdapter {
    url: String,
    client: reqwest::Client,
}

impl PaddleAdapter {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }

    async fn run(&self, document: &Document, language: &str) -> Result<RunOutput, RunError> {
        let request_body = serde_json::json!({
            "image": encode_document_base64(&document.bytes, &document.media_type),
            "lang": language,
        });

        let resp = self
            .client
            .post(format!("{}/predict", self.url))
            .json(&request_body)
            .send()
            .await
            .map_err(|e| (classify_http_error(&e), format!("Request failed: {}", e)))?;

        let status = resp.status();
        let body: Value = resp.json().await.map_err(|e| {
            (
                FailureReason::RecognitionFailure,
                format!("Failed to parse response: {}", e),
            )
        })?;

        if !status.is_success() {
            return Err((
                FailureReason::RecognitionFailure,
                format!("PaddleOCR endpoint returned {}: {}", status, body),
            ));
        }

        let raw_items = body
            .get("items")
            .and_then(|v| v.as_array())
            .or_else(|| body.as_array())
            .ok_or_else(|| {
                (
                    FailureReason::RecognitionFailure,
                    "Unexpected PaddleOCR response shape".to_string(),
                )
            })?;

        let items: Vec<RecognizedItem> = raw_items.iter().filter_map(parse_paddle_item).collect();
        let raw_text = items
            .iter()
            .map(|item| item.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Ok((raw_text, items))
    }
}

/// One PaddleOCR item: `{"text": ..., "conf": 0..1, "box": [[x,y]; 4]}`.
/// The polygon is reduced to its axis-aligned bounding box.
fn parse_paddle_item(value: &Value) -> Option<RecognizedItem> {
    let text = value.get("text")?.as_str()?.trim();
    if text.is_empty() {
        return None;
    }
    let confidence = value
        .get("conf")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0)
        .clamp(0.0, 1.0) as f32;

    let bbox = value.get("box").and_then(|v| v.as_array()).and_then(|points| {
        let xs: Vec<f64> = points
            .iter()
            .filter_map(|p| p.get(0).and_then(|v| v.as_f64()))
            .collect();
        let ys: Vec<f64> = points
            .iter()
            .filter_map(|p| p.get(1).and_then(|v| v.as_f64()))
            .collect();
        if xs.is_empty() || ys.is_empty() {
            return None;
        }
        let left = xs.iter().cloned().fold(f64::INFINITY, f64::min);
        let top = ys.iter().cloned().fold(f64::INFINITY, f64::min);
        let right = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let bottom = ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        Some(BoundingBox {
            left: left as f32,
            top: top as f32,
            width: (right - left) as f32,
            height: (bottom - top) as f32,
        })
    });

    Some(RecognizedItem {
        text: text.to_string(),
        bbox,
        confidence,
    })
}

#[async_trait]
impl RecognitionAdapter for PaddleAdapter {
    fn engine_id(&self) -> &'static str {
        ENGINE_PADDLE
    }

    fn description(&self) -> &'static str {
        "PaddleOCR — высокое качество для кириллицы (HTTP-сервис)"
    }

    async fn probe(&self) -> bool {
        self.client
            .get(format!("{}/health", self.url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map(|resp| resp.status().is_success())
            .unwrap_or(false)
    }

    async fn recognize(&self, document: &Document, language: &str) -> EngineResult {
        let started = Instant::now();
        let outcome = self.run(document, language).await;
        finish(self.engine_id(), started, outcome)
    }
}

// --- TrOCR (HTTP inference endpoint, text only) ---

pub struct TrocrAdapter {
    url: String,
    client: reqwest::Client,
}

impl TrocrAdapter {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }

    async fn run(&self, document: &Document) -> Result<RunOutput, RunError> {
        let request_body = serde_json::json!({
            "image": encode_document_base64(&document.bytes, &document.media_type),
        });

        let resp = self
            .client
            .post(format!("{}/recognize", self.url))
            .json(&request_body)
            .send()
            .await
            .map_err(|e| (classify_http_error(&e), format!("Request failed: {}", e)))?;

        let status = resp.status();
        let body: Value = resp.json().await.map_err(|e| {
            (
                FailureReason::RecognitionFailure,
                format!("Failed to parse response: {}", e),
            )
        })?;

        if !status.is_success() {
            return Err((
                FailureReason::RecognitionFailure,
                format!("TrOCR endpoint returned {}: {}", status, body),
            ));
        }

        let text = body
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                (
                    FailureReason::RecognitionFailure,
                    "TrOCR response has no text field".to_string(),
                )
            })?;

        // TrOCR reports no item-level confidences: items stay empty and the
        // aggregate confidence is absent.
        Ok((text.trim().to_string(), Vec::new()))
    }
}

#[async_trait]
impl RecognitionAdapter for TrocrAdapter {
    fn engine_id(&self) -> &'static str {
        ENGINE_TROCR
    }

    fn description(&self) -> &'static str {
        "TrOCR — AI-модель для сложных текстов (HTTP-сервис)"
    }

    async fn probe(&self) -> bool {
        self.client
            .get(format!("{}/health", self.url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map(|resp| resp.status().is_success())
            .unwrap_or(false)
    }

    async fn recognize(&self, document: &Document, _language: &str) -> EngineResult {
        let started = Instant::now();
        let outcome = self.run(document).await;
        finish(self.engine_id(), started, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tesseract_tsv_words_and_confidence() {
        let tsv = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
                   1\t1\t0\t0\t0\t0\t0\t0\t100\t50\t-1\t\n\
                   5\t1\t1\t1\t1\t1\t10\t12\t60\t14\t96\tДоговор\n\
                   5\t1\t1\t1\t1\t2\t80\t12\t20\t14\t88\t№\n\
                   5\t1\t1\t1\t2\t1\t10\t30\t40\t14\t91\t42\n";
        let (raw_text, items) = parse_tesseract_tsv(tsv);
        assert_eq!(raw_text, "Договор №\n42");
        assert_eq!(items.len(), 3);
        assert!((items[0].confidence - 0.96).abs() < 1e-6);
        assert_eq!(items[0].bbox.unwrap().left, 10.0);
    }

    #[test]
    fn test_parse_tesseract_tsv_skips_negative_confidence() {
        let tsv = "header\n5\t1\t1\t1\t1\t1\t0\t0\t10\t10\t-1\tмусор\n";
        let (raw_text, items) = parse_tesseract_tsv(tsv);
        assert!(raw_text.is_empty());
        assert!(items.is_empty());
    }

    #[test]
    fn test_parse_paddle_item_polygon_to_bbox() {
        let value = serde_json::json!({
            "text": "Сумма",
            "conf": 0.93,
            "box": [[10.0, 20.0], [110.0, 20.0], [110.0, 44.0], [10.0, 44.0]],
        });
        let item = parse_paddle_item(&value).unwrap();
        assert_eq!(item.text, "Сумма");
        assert!((item.confidence - 0.93).abs() < 1e-6);
        let bbox = item.bbox.unwrap();
        assert_eq!(bbox.left, 10.0);
        assert_eq!(bbox.top, 20.0);
        assert_eq!(bbox.width, 100.0);
        assert_eq!(bbox.height, 24.0);
    }

    #[test]
    fn test_parse_paddle_item_rejects_empty_text() {
        let value = serde_json::json!({ "text": "  ", "conf": 0.5 });
        assert!(parse_paddle_item(&value).is_none());
    }

    #[test]
    fn test_language_mapping() {
        assert_eq!(TesseractAdapter::map_language("ru"), "rus");
        assert_eq!(TesseractAdapter::map_language("en"), "eng");
        assert_eq!(TesseractAdapter::map_language("deu"), "deu");
    }
}
