//! End-to-end pipeline and audit ledger behavior

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;

use soul_synth::audit::{read_audit_log, session_summary_path, AuditLogger};
use soul_synth::config::{Config, StorageConfig};
use soul_synth::embeddings::{EmbeddingConfig, EmbeddingModel};
use soul_synth::error::SynthesisError;
use soul_synth::llm::{Classification, ClassifyOptions, Generation, LlmProvider};
use soul_synth::persistence;
use soul_synth::pipeline::SynthesisPipeline;
use soul_synth::types::{Dimension, Signal, SignalSource, SignalType, SourceType};

/// LLM stub that echoes the signal text back as its generalization and
/// always classifies into honesty-framework.
struct EchoLlm {
    generate_calls: AtomicUsize,
}

impl EchoLlm {
    fn new() -> Self {
        Self {
            generate_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LlmProvider for EchoLlm {
    async fn classify(
        &self,
        _prompt: &str,
        options: &ClassifyOptions,
    ) -> Result<Classification, SynthesisError> {
        let category = options
            .categories
            .iter()
            .find(|c| c.as_str() == "honesty-framework")
            .cloned();
        Ok(Classification {
            category,
            confidence: 0.9,
            reasoning: None,
        })
    }

    async fn generate(&self, _prompt: &str) -> Result<Generation, SynthesisError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Generation {
            text: "Values honesty about limitations".to_string(),
        })
    }
}

async fn signal(embedder: &EmbeddingModel, id: &str, text: &str, file: &str) -> Signal {
    Signal {
        id: id.to_string(),
        signal_type: SignalType::Value,
        text: text.to_string(),
        confidence: 0.9,
        embedding: embedder.embed(text).await.unwrap(),
        dimension: Some(Dimension::HonestyFramework),
        source: SignalSource {
            source_type: SourceType::Memory,
            file: file.to_string(),
            section: None,
            line: None,
            context: String::new(),
            extracted_at: Utc::now(),
        },
    }
}

fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.storage = StorageConfig {
        data_dir: dir.path().to_path_buf(),
        audit_log: dir.path().join("audit.jsonl"),
    };
    config.embedding = EmbeddingConfig::hash();
    config
}

#[tokio::test]
async fn test_full_run_produces_axioms_and_audit_trail() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let config = test_config(&dir);
    let llm = Arc::new(EchoLlm::new());
    let embedder = EmbeddingModel::new(EmbeddingConfig::hash())?;

    let signals = vec![
        signal(&embedder, "sig_1", "Admit what I do not know", "memory/diary/day1.md").await,
        signal(&embedder, "sig_2", "Be upfront about my limits", "memory/preferences/values.md").await,
        signal(&embedder, "sig_3", "Never overstate my abilities", "memory/worldview/beliefs.md").await,
    ];

    let mut pipeline = SynthesisPipeline::new(
        Arc::clone(&llm) as Arc<dyn LlmProvider>,
        embedder,
        config.clone(),
    );
    let output = pipeline.run(&signals).await?;

    // 3 generalization calls plus 1 notation call
    assert_eq!(llm.generate_calls.load(Ordering::SeqCst), 4);

    // All three generalize to the same text, so they merge into one
    // principle at n=3 and the cascade exhausts down to N=1
    assert_eq!(output.report.signals_processed, 3);
    assert_eq!(output.report.total_principles, 1);
    assert_eq!(output.report.principles_created, 1);
    assert_eq!(output.report.principles_reinforced, 2);
    assert_eq!(output.report.axioms_created, 1);
    assert_eq!(output.report.effective_threshold, 1);
    assert_eq!(output.report.generalization_fallback_rate, 0.0);

    // The single axiom converges from 3 source categories
    assert_eq!(output.emergent.len(), 1);
    assert_eq!(output.emergent[0].source_categories.len(), 3);
    assert!(output.emergent[0].is_core_identity);
    assert_eq!(output.report.core_identity_axioms, 1);

    // Persisted collections are loadable
    assert_eq!(persistence::load_principles(&config.storage.principles_path()).len(), 1);
    assert_eq!(persistence::load_axioms(&config.storage.axioms_path()).len(), 1);
    assert_eq!(persistence::load_signals(&config.storage.signals_path()).len(), 3);

    // Audit log: pipeline start/end, 3 extractions, 1 created,
    // 2 reinforced, 1 promotion
    let entries = read_audit_log(&config.storage.audit_log)?;
    assert_eq!(entries.len(), 9);
    assert_eq!(output.session.entry_count, 9);

    // Session summary written at close
    let summary = session_summary_path(&config.storage.audit_log);
    assert!(summary.exists());
    Ok(())
}

#[tokio::test]
async fn test_second_run_resumes_from_persisted_principles() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let config = test_config(&dir);
    let llm: Arc<EchoLlm> = Arc::new(EchoLlm::new());

    let embedder = EmbeddingModel::new(EmbeddingConfig::hash())?;
    let first = vec![
        signal(&embedder, "sig_1", "Admit what I do not know", "memory/diary/day1.md").await,
    ];
    let mut pipeline = SynthesisPipeline::new(
        Arc::clone(&llm) as Arc<dyn LlmProvider>,
        embedder,
        config.clone(),
    );
    pipeline.run(&first).await?;

    let embedder = EmbeddingModel::new(EmbeddingConfig::hash())?;
    let second = vec![
        signal(&embedder, "sig_2", "Be upfront about my limits", "memory/diary/day2.md").await,
    ];
    let mut pipeline = SynthesisPipeline::new(llm, embedder, config.clone());
    let output = pipeline.run(&second).await?;

    // The new signal reinforces the principle persisted by run one
    assert_eq!(output.report.total_principles, 1);
    assert_eq!(output.report.principles_reinforced, 1);
    assert_eq!(output.principles[0].n_count, 2);
    Ok(())
}

#[tokio::test]
async fn test_signals_accumulate_across_runs() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let config = test_config(&dir);
    let llm: Arc<EchoLlm> = Arc::new(EchoLlm::new());

    let embedder = EmbeddingModel::new(EmbeddingConfig::hash())?;
    let first = vec![
        signal(&embedder, "sig_1", "Admit what I do not know", "memory/diary/day1.md").await,
    ];
    let mut pipeline = SynthesisPipeline::new(
        Arc::clone(&llm) as Arc<dyn LlmProvider>,
        embedder,
        config.clone(),
    );
    pipeline.run(&first).await?;

    let embedder = EmbeddingModel::new(EmbeddingConfig::hash())?;
    let second = vec![
        signal(&embedder, "sig_2", "Be upfront about my limits", "memory/diary/day2.md").await,
    ];
    let mut pipeline = SynthesisPipeline::new(
        Arc::clone(&llm) as Arc<dyn LlmProvider>,
        embedder,
        config.clone(),
    );
    let output = pipeline.run(&second).await?;

    // Run two must not drop run one's signals from disk
    let persisted = persistence::load_signals(&config.storage.signals_path());
    let ids: Vec<&str> = persisted.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["sig_1", "sig_2"]);

    // Every provenance reference in the resumed principle resolves
    // against the persisted signal set
    for signal_ref in &output.principles[0].derived_from.signals {
        assert!(
            persisted.iter().any(|s| s.id == signal_ref.id),
            "persisted signals missing {}",
            signal_ref.id
        );
    }

    // Re-running a batch does not duplicate persisted signals
    let embedder = EmbeddingModel::new(EmbeddingConfig::hash())?;
    let repeat = vec![
        signal(&embedder, "sig_2", "Be upfront about my limits", "memory/diary/day2.md").await,
    ];
    let mut pipeline = SynthesisPipeline::new(llm, embedder, config.clone());
    pipeline.run(&repeat).await?;
    assert_eq!(persistence::load_signals(&config.storage.signals_path()).len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_empty_signal_batch_is_a_clean_noop() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let config = test_config(&dir);
    let llm = Arc::new(EchoLlm::new());
    let embedder = EmbeddingModel::new(EmbeddingConfig::hash())?;

    let mut pipeline = SynthesisPipeline::new(llm, embedder, config);
    let output = pipeline.run(&[]).await?;

    assert_eq!(output.report.signals_processed, 0);
    assert_eq!(output.report.total_principles, 0);
    assert_eq!(output.report.axioms_created, 0);
    assert_eq!(output.report.generalization_fallback_rate, 0.0);
    Ok(())
}

#[tokio::test]
async fn test_audit_summary_only_written_on_close() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let log_path = dir.path().join("audit.jsonl");

    let mut logger = AuditLogger::new(&log_path)?;
    logger.log_pipeline_started(serde_json::json!({ "signal_count": 0 }))?;

    let summary = session_summary_path(&log_path);
    assert!(!summary.exists());

    let session = logger.close()?;
    assert!(summary.exists());
    assert_eq!(session.entry_count, 1);
    assert_eq!(session.action_counts["pipeline_started"], 1);
    assert!(session.ended_at.is_some());
    Ok(())
}

#[tokio::test]
async fn test_audit_entries_append_across_logger_instances() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let log_path = dir.path().join("audit.jsonl");

    let mut logger = AuditLogger::new(&log_path)?;
    logger.log_pipeline_started(serde_json::json!({}))?;
    logger.close()?;

    let mut logger = AuditLogger::new(&log_path)?;
    logger.log_pipeline_started(serde_json::json!({}))?;
    logger.close()?;

    let entries = read_audit_log(&log_path)?;
    assert_eq!(entries.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_corrupt_principle_store_starts_empty() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let config = test_config(&dir);
    std::fs::write(config.storage.principles_path(), "{ broken")?;

    let llm = Arc::new(EchoLlm::new());
    let embedder = EmbeddingModel::new(EmbeddingConfig::hash())?;
    let signals =
        vec![signal(&embedder, "sig_1", "Values clarity", "memory/diary/day1.md").await];

    let mut pipeline = SynthesisPipeline::new(llm, embedder, config);
    let output = pipeline.run(&signals).await?;

    assert_eq!(output.report.total_principles, 1);
    assert_eq!(output.report.principles_created, 1);
    Ok(())
}
