use std::time::Duration;

use crate::constants;

#[derive(Debug, Clone)]
pub struct Config {
    pub engine_timeout: Duration,
    pub max_parallel: usize,
    pub default_language: String,
    pub tesseract_cmd: String,
    pub paddle_url: Option<String>,
    pub trocr_url: Option<String>,
    pub openai_api_key: Option<String>,
    pub refine_model: String,
}

impl Default for Config {
    fn default() -> Self {
        let timeout_ms: u64 = std::env::var("OCR_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(constants::DEFAULT_TIMEOUT_MS);
        let max_parallel: usize = std::env::var("OCR_MAX_PARALLEL")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&n| n > 0)
            .unwrap_or(constants::DEFAULT_MAX_PARALLEL);

        Self {
            engine_timeout: Duration::from_millis(timeout_ms),
            max_parallel,
            default_language: std::env::var("OCR_DEFAULT_LANG")
                .unwrap_or_else(|_| constants::DEFAULT_LANGUAGE.to_string()),
            tesseract_cmd: std::env::var("TESSERACT_CMD")
                .unwrap_or_else(|_| "tesseract".to_string()),
            paddle_url: std::env::var("PADDLE_OCR_URL").ok().filter(|s| !s.is_empty()),
            trocr_url: std::env::var("TROCR_URL").ok().filter(|s| !s.is_empty()),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok().filter(|s| !s.is_empty()),
            refine_model: std::env::var("OCR_REFINE_MODEL")
                .unwrap_or_else(|_| constants::DEFAULT_REFINE_MODEL.to_string()),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }
}
