//! End-to-end synthesis pipeline.
//!
//! Drives the full sequence for one run: generalize signals, cluster
//! them into principles, promote reinforced principles into axioms via
//! the adaptive cascade, score cross-source emergence, persist the
//! results, and audit every step. Stages run strictly sequentially; the
//! clustering order is the caller-supplied signal order.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::audit::{AuditLogger, AuditSession};
use crate::compressor::{compress_principles, compress_principles_with_cascade};
use crate::config::Config;
use crate::embeddings::EmbeddingModel;
use crate::emergence::{
    calculate_emergence_stats, calculate_principle_strength, detect_emergent_axioms,
    CoreIdentityPredicate, EmergentAxiom,
};
use crate::generalizer::{generalize_signals_with_cache, GeneralizationCache};
use crate::llm::LlmProvider;
use crate::persistence;
use crate::store::{PrincipleStore, SignalAction};
use crate::types::{Axiom, Principle, Signal};

/// Summary of one full synthesis run
#[derive(Debug, Serialize)]
pub struct SynthesisReport {
    pub signals_processed: usize,
    pub principles_created: usize,
    pub principles_reinforced: usize,
    pub total_principles: usize,
    pub axioms_created: usize,
    pub unconverged_principles: usize,
    /// Promotion threshold the cascade settled on
    pub effective_threshold: u32,
    pub compression_ratio: f64,
    pub cross_source_axioms: usize,
    pub core_identity_axioms: usize,
    /// Fraction of signals whose generalization fell back to raw text
    pub generalization_fallback_rate: f64,
}

/// Full output of one synthesis run
pub struct SynthesisOutput {
    pub report: SynthesisReport,
    pub principles: Vec<Principle>,
    pub axioms: Vec<Axiom>,
    pub emergent: Vec<EmergentAxiom>,
    pub session: AuditSession,
}

/// Orchestrates one synthesis run over a batch of signals
pub struct SynthesisPipeline {
    llm: Arc<dyn LlmProvider>,
    embedder: EmbeddingModel,
    config: Config,
    cache: GeneralizationCache,
}

impl SynthesisPipeline {
    pub fn new(llm: Arc<dyn LlmProvider>, embedder: EmbeddingModel, config: Config) -> Self {
        Self {
            llm,
            embedder,
            config,
            cache: GeneralizationCache::new(),
        }
    }

    /// Run the full pipeline over `signals`, resuming from any
    /// previously persisted principles.
    pub async fn run(&mut self, signals: &[Signal]) -> Result<SynthesisOutput> {
        let mut audit = AuditLogger::new(&self.config.storage.audit_log)?;
        audit.log_pipeline_started(json!({ "signal_count": signals.len() }))?;

        info!("Synthesis run started: {} signals", signals.len());

        // Stage 1: generalize (optional) and cluster into principles
        let existing = persistence::load_principles(&self.config.storage.principles_path());
        let mut store = PrincipleStore::with_principles(
            Arc::clone(&self.llm),
            self.config.synthesis.similarity_threshold,
            existing,
        );

        let mut created = 0usize;
        let mut reinforced = 0usize;
        let mut fallback_count = 0usize;

        if self.config.synthesis.generalize_signals {
            let generalized = generalize_signals_with_cache(
                self.llm.as_ref(),
                &self.embedder,
                &mut self.cache,
                signals,
                &self.config.llm.model,
            )
            .await?;

            for g in &generalized {
                if g.provenance.used_fallback {
                    fallback_count += 1;
                }
                audit.log_signal_extracted(&g.original)?;
                let result = store.add_generalized_signal(g, None).await?;
                match result.action {
                    SignalAction::Created => {
                        created += 1;
                        let principle = store
                            .get_principles()
                            .iter()
                            .find(|p| p.id == result.principle_id)
                            .context("created principle is present in the store")?;
                        audit.log_principle_created(principle)?;
                    }
                    SignalAction::Reinforced => {
                        reinforced += 1;
                        audit.log_principle_reinforced(
                            &result.principle_id,
                            &g.original.id,
                            result.similarity,
                        )?;
                    }
                }
            }
        } else {
            for signal in signals {
                audit.log_signal_extracted(signal)?;
                let result = store.add_signal(signal, None).await?;
                match result.action {
                    SignalAction::Created => {
                        created += 1;
                        let principle = store
                            .get_principles()
                            .iter()
                            .find(|p| p.id == result.principle_id)
                            .context("created principle is present in the store")?;
                        audit.log_principle_created(principle)?;
                    }
                    SignalAction::Reinforced => {
                        reinforced += 1;
                        audit.log_principle_reinforced(
                            &result.principle_id,
                            &signal.id,
                            result.similarity,
                        )?;
                    }
                }
            }
        }

        let mut principles = store.into_principles();
        for principle in principles.iter_mut() {
            principle.strength = calculate_principle_strength(principle);
        }

        // Stage 2: promote reinforced principles into axioms
        let (axioms, unconverged, metrics, effective_threshold) =
            if self.config.synthesis.cascade_enabled {
                let result =
                    compress_principles_with_cascade(self.llm.as_ref(), &principles).await?;
                (
                    result.axioms,
                    result.unconverged,
                    result.metrics,
                    result.cascade.effective_threshold,
                )
            } else {
                let threshold = self.config.synthesis.promotion_threshold;
                let result =
                    compress_principles(self.llm.as_ref(), &principles, threshold).await?;
                (result.axioms, result.unconverged, result.metrics, threshold)
            };

        for axiom in &axioms {
            audit.log_axiom_promoted(axiom, &principles)?;
        }

        // Stage 3: cross-source emergence scoring
        let predicate = CoreIdentityPredicate {
            min_source_categories: self.config.synthesis.min_source_categories,
            min_dimensions: self.config.synthesis.min_dimensions,
        };
        let emergent = detect_emergent_axioms(&axioms, &principles, &predicate);
        let emergence_stats = calculate_emergence_stats(&emergent);

        // Stage 4: persist. Signals accumulate across runs so resumed
        // principles keep resolving their provenance references.
        let signals_path = self.config.storage.signals_path();
        let mut all_signals = persistence::load_signals(&signals_path);
        let known: HashSet<String> = all_signals.iter().map(|s| s.id.clone()).collect();
        all_signals.extend(
            signals
                .iter()
                .filter(|s| !known.contains(&s.id))
                .cloned(),
        );
        persistence::save_signals(&signals_path, &all_signals)?;
        persistence::save_principles(&self.config.storage.principles_path(), &principles)?;
        persistence::save_axioms(&self.config.storage.axioms_path(), &axioms)?;

        let report = SynthesisReport {
            signals_processed: signals.len(),
            principles_created: created,
            principles_reinforced: reinforced,
            total_principles: principles.len(),
            axioms_created: axioms.len(),
            unconverged_principles: unconverged.len(),
            effective_threshold,
            compression_ratio: metrics.compression_ratio,
            cross_source_axioms: emergence_stats.cross_source_axioms,
            core_identity_axioms: emergence_stats.core_identity_axioms,
            generalization_fallback_rate: if signals.is_empty() {
                0.0
            } else {
                fallback_count as f64 / signals.len() as f64
            },
        };

        audit.log_pipeline_completed(
            serde_json::to_value(&report).context("Failed to serialize synthesis report")?,
        )?;
        let session = audit.close()?;

        info!(
            "Synthesis run complete: {} principles, {} axioms at N>={}",
            report.total_principles, report.axioms_created, report.effective_threshold
        );

        Ok(SynthesisOutput {
            report,
            principles,
            axioms,
            emergent,
            session,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
