use clap::{Parser, Subcommand};
use log::error;
use std::path::Path;

use docrec::models::Document;
use docrec::services::{OcrCoordinator, ProcessOptions};
use docrec::utils::media_type_for_extension;

#[derive(Parser)]
#[command(name = "docrec")]
#[command(author, version, about = "OCR orchestration and quality-metric engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Показать доступные OCR движки
    Engines,

    /// Проверить состояние сервиса и движков
    Health,

    /// Распознать документ одним движком
    Process {
        /// Путь к изображению или PDF
        file: String,
        /// Идентификатор движка (paddle, tesseract, trocr)
        #[arg(short, long)]
        engine: String,
        /// Язык распознавания
        #[arg(short, long)]
        lang: Option<String>,
        /// Минимальная уверенность для элементов результата
        #[arg(long, default_value_t = 0.0)]
        confidence_threshold: f32,
        /// Уточнить извлечённые поля через LLM
        #[arg(long)]
        refine: bool,
    },

    /// Прогнать документ через несколько движков и сравнить результаты
    Compare {
        /// Путь к изображению или PDF
        file: String,
        /// Список движков через запятую (по умолчанию все доступные)
        #[arg(short, long)]
        engines: Option<String>,
        /// Язык распознавания
        #[arg(short, long)]
        lang: Option<String>,
    },
}

pub async fn handle_engines(coordinator: &OcrCoordinator) {
    for engine_id in coordinator.engines() {
        println!("{}", engine_id);
    }
}

pub async fn handle_health(coordinator: &OcrCoordinator) {
    print_json(&coordinator.health());
}

pub async fn handle_process(
    coordinator: &OcrCoordinator,
    file: &str,
    engine: &str,
    lang: Option<String>,
    confidence_threshold: f32,
    refine: bool,
) {
    let Some(document) = load_document(file, lang.as_deref()) else {
        return;
    };

    let options = ProcessOptions {
        language: lang,
        confidence_threshold,
        use_refinement: refine,
    };
    match coordinator.process(document, engine, options).await {
        Ok(outcome) => print_json(&outcome),
        Err(e) => error!("Ошибка обработки: {}", e),
    }
}

pub async fn handle_compare(
    coordinator: &OcrCoordinator,
    file: &str,
    engines: Option<String>,
    lang: Option<String>,
) {
    let Some(document) = load_document(file, lang.as_deref()) else {
        return;
    };

    let engine_ids: Vec<String> = engines
        .map(|csv| {
            csv.split(',')
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .collect()
        })
        .unwrap_or_default();

    match coordinator.compare(document, &engine_ids, lang).await {
        Ok(report) => print_json(&report),
        Err(e) => error!("Ошибка сравнения: {}", e),
    }
}

fn load_document(file: &str, lang: Option<&str>) -> Option<Document> {
    let extension = Path::new(file)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();
    let Some(media_type) = media_type_for_extension(extension) else {
        error!("Неподдерживаемое расширение файла: {}", file);
        return None;
    };

    let bytes = match std::fs::read(file) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Не удалось прочитать файл {}: {}", file, e);
            return None;
        }
    };

    Some(Document::new(
        bytes,
        media_type,
        lang.unwrap_or(docrec::constants::DEFAULT_LANGUAGE),
    ))
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => error!("Не удалось сериализовать результат: {}", e),
    }
}
