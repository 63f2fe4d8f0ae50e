// src/constants.rs

// Идентификаторы движков (closed set)
pub const ENGINE_PADDLE: &str = "paddle";
pub const ENGINE_TESSERACT: &str = "tesseract";
pub const ENGINE_TROCR: &str = "trocr";

// Defaults для конфигурации
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_PARALLEL: usize = 4;
pub const DEFAULT_LANGUAGE: &str = "ru";
pub const DEFAULT_REFINE_MODEL: &str = "gpt-3.5-turbo";

// Поддерживаемые расширения входных документов (CLI)
pub const SUPPORTED_EXTENSIONS: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("bmp", "image/bmp"),
    ("tiff", "image/tiff"),
    ("webp", "image/webp"),
];

// Формат длины банковского счёта (р/с)
pub const ACCOUNT_DIGITS: usize = 20;
