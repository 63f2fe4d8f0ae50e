//! Orchestrator: dispatches a document to recognition adapters with timeout
//! and failure isolation, then assembles the uniform result envelope.

use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::models::{
    ComparisonReport, ComparisonSummary, Document, EngineResult, EngineRun, FailureReason,
    HealthStatus, PairwiseMetric, ProcessOutcome, RefinementStatus,
};
use crate::services::engines::RecognitionAdapter;
use crate::services::extract::FieldExtractor;
use crate::services::metrics;
use crate::services::refine::LlmRefiner;
use crate::services::registry::EngineRegistry;

#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    pub language: Option<String>,
    pub confidence_threshold: f32,
    pub use_refinement: bool,
}

pub struct OcrCoordinator {
    registry: Arc<EngineRegistry>,
    config: Config,
    extractor: FieldExtractor,
    refiner: LlmRefiner,
}

impl OcrCoordinator {
    pub fn new(registry: Arc<EngineRegistry>, config: Config) -> Self {
        let refiner = LlmRefiner::from_config(&config);
        Self {
            registry,
            config,
            extractor: FieldExtractor::new(),
            refiner,
        }
    }

    pub fn engines(&self) -> Vec<String> {
        self.registry.engine_ids()
    }

    /// Liveness surface; performs no recognition work.
    pub fn health(&self) -> HealthStatus {
        let status = if self.registry.is_empty() { "degraded" } else { "healthy" };
        HealthStatus {
            status: status.to_string(),
            available_engines: self.registry.engine_ids(),
        }
    }

    /// Run one engine over the document. Fails only for request-level
    /// problems; an engine-internal failure still returns a structured
    /// failed `EngineResult`.
    pub async fn process(
        &self,
        document: Document,
        engine_id: &str,
        options: ProcessOptions,
    ) -> OrchestratorResult<ProcessOutcome> {
        document.validate().map_err(OrchestratorError::InvalidDocument)?;
        let adapter = self
            .registry
            .get(engine_id)
            .ok_or_else(|| OrchestratorError::InvalidEngine(engine_id.to_string()))?;

        let language = self.resolve_language(&options.language, &document);
        let document = Arc::new(document);

        info!("Processing document with engine {}", engine_id);
        let handle = self.spawn_recognition(adapter, document.clone(), language);
        let result = await_recognition(handle, engine_id).await;
        let result = result.with_confidence_threshold(options.confidence_threshold);

        let extracted_fields = result
            .raw_text
            .as_deref()
            .map(|text| self.extractor.extract(text));

        let (extracted_fields, refinement) = match (&extracted_fields, options.use_refinement) {
            (Some(fields), true) => {
                let raw_text = result.raw_text.as_deref().unwrap_or_default();
                let (refined, status) = self.refiner.refine(raw_text, fields).await;
                (Some(refined), status)
            }
            _ => (extracted_fields, RefinementStatus::NotRequested),
        };

        Ok(ProcessOutcome {
            total_items: result.items.len(),
            result,
            extracted_fields,
            refinement,
        })
    }

    /// Run several engines over the same document and quantify pairwise
    /// divergence. An empty id list means "every registered engine".
    pub async fn compare(
        &self,
        document: Document,
        engine_ids: &[String],
        language: Option<String>,
    ) -> OrchestratorResult<ComparisonReport> {
        document.validate().map_err(OrchestratorError::InvalidDocument)?;
        if self.registry.is_empty() {
            return Err(OrchestratorError::EmptyRegistry);
        }

        let requested: Vec<String> = if engine_ids.is_empty() {
            self.registry.engine_ids()
        } else {
            engine_ids.to_vec()
        };

        // Validate every id before dispatching anything: an unknown engine
        // is a request-level failure with no partial report.
        let mut adapters: Vec<Arc<dyn RecognitionAdapter>> = Vec::with_capacity(requested.len());
        for id in &requested {
            adapters.push(
                self.registry
                    .get(id)
                    .ok_or_else(|| OrchestratorError::InvalidEngine(id.clone()))?,
            );
        }

        let language = self.resolve_language(&language, &document);
        let document = Arc::new(document);
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel));

        info!("Comparing engines: {}", requested.join(", "));
        let handles: Vec<JoinHandle<EngineResult>> = adapters
            .into_iter()
            .map(|adapter| {
                self.spawn_bounded_recognition(
                    adapter,
                    document.clone(),
                    language.clone(),
                    semaphore.clone(),
                )
            })
            .collect();

        // Synchronization barrier: assembly starts only after every unit has
        // resolved (success, failure, or timeout).
        let joined = futures::future::join_all(handles).await;

        let mut results: HashMap<String, EngineRun> = HashMap::new();
        for (engine_id, join_result) in requested.iter().zip(joined) {
            let result = match join_result {
                Ok(result) => result,
                Err(e) => EngineResult::failure(
                    engine_id.clone(),
                    FailureReason::RecognitionFailure,
                    format!("Adapter task panicked: {}", e),
                    Duration::ZERO,
                ),
            };
            let extracted_fields = result
                .raw_text
                .as_deref()
                .map(|text| self.extractor.extract(text));
            results.insert(result.engine.clone(), EngineRun { result, extracted_fields });
        }

        let comparison_metrics = pairwise_metrics(&results);

        let successful = results.values().filter(|run| run.result.is_success()).count();
        let summary = ComparisonSummary {
            engines_tested: results.len(),
            successful_engines: successful,
            failed_engines: results.len() - successful,
        };

        Ok(ComparisonReport {
            results,
            comparison_metrics,
            summary,
        })
    }

    fn resolve_language(&self, requested: &Option<String>, document: &Document) -> String {
        requested
            .clone()
            .filter(|lang| !lang.is_empty())
            .unwrap_or_else(|| {
                if document.language.is_empty() {
                    self.config.default_language.clone()
                } else {
                    document.language.clone()
                }
            })
    }

    /// One adapter invocation in its own task with an independent deadline.
    /// On expiry the recognition future is dropped and the engine is
    /// recorded as timed out; a backend that cannot be interrupted is
    /// abandoned rather than awaited further.
    fn spawn_recognition(
        &self,
        adapter: Arc<dyn RecognitionAdapter>,
        document: Arc<Document>,
        language: String,
    ) -> JoinHandle<EngineResult> {
        let deadline = self.config.engine_timeout;
        tokio::spawn(async move {
            recognize_with_deadline(adapter, document, language, deadline).await
        })
    }

    fn spawn_bounded_recognition(
        &self,
        adapter: Arc<dyn RecognitionAdapter>,
        document: Arc<Document>,
        language: String,
        semaphore: Arc<Semaphore>,
    ) -> JoinHandle<EngineResult> {
        let deadline = self.config.engine_timeout;
        tokio::spawn(async move {
            // The permit bounds backend concurrency; the deadline covers the
            // recognition call itself, not the queue wait.
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    return EngineResult::failure(
                        adapter.engine_id(),
                        FailureReason::RecognitionFailure,
                        "Scheduler semaphore closed",
                        Duration::ZERO,
                    );
                }
            };
            recognize_with_deadline(adapter, document, language, deadline).await
        })
    }
}

async fn recognize_with_deadline(
    adapter: Arc<dyn RecognitionAdapter>,
    document: Arc<Document>,
    language: String,
    deadline: Duration,
) -> EngineResult {
    let engine_id = adapter.engine_id();
    let started = Instant::now();
    match tokio::time::timeout(deadline, adapter.recognize(&document, &language)).await {
        Ok(result) => result,
        Err(_) => {
            warn!("{} exceeded deadline of {} ms", engine_id, deadline.as_millis());
            EngineResult::failure(
                engine_id,
                FailureReason::Timeout,
                format!("Deadline of {} ms exceeded", deadline.as_millis()),
                started.elapsed(),
            )
        }
    }
}

async fn await_recognition(handle: JoinHandle<EngineResult>, engine_id: &str) -> EngineResult {
    match handle.await {
        Ok(result) => result,
        Err(e) => EngineResult::failure(
            engine_id,
            FailureReason::RecognitionFailure,
            format!("Adapter task panicked: {}", e),
            Duration::ZERO,
        ),
    }
}

/// Metrics for every ordered pair of successful engines. CER/WER depend on
/// which side is the reference, so both A-vs-B and B-vs-A are emitted.
fn pairwise_metrics(results: &HashMap<String, EngineRun>) -> HashMap<String, PairwiseMetric> {
    let texts: Vec<(&str, &str)> = results
        .values()
        .filter(|run| run.result.is_success())
        .filter_map(|run| {
            run.result
                .raw_text
                .as_deref()
                .map(|text| (run.result.engine.as_str(), text))
        })
        .collect();

    let mut metrics_map = HashMap::new();
    for (reference_engine, reference) in &texts {
        for (hypothesis_engine, hypothesis) in &texts {
            if reference_engine == hypothesis_engine {
                continue;
            }
            let key = format!("{}_vs_{}", reference_engine, hypothesis_engine);
            metrics_map.insert(
                key,
                PairwiseMetric {
                    cer: metrics::cer(reference, hypothesis),
                    wer: metrics::wer(reference, hypothesis),
                    similarity: metrics::similarity(reference, hypothesis),
                },
            );
        }
    }
    metrics_map
}
