//! LLM-based generalization of signals into abstract, actor-agnostic
//! phrasing before clustering.
//!
//! Generalized phrasing clusters better than raw statements, which is
//! what lifts the compression ratio. Every failure path falls back to
//! the original signal text, so generalization can never lose a signal.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::embeddings::EmbeddingModel;
use crate::error::SynthesisError;
use crate::llm::{sanitize_for_prompt, LlmProvider};
use crate::types::{GeneralizationProvenance, GeneralizedSignal, Signal};

/// Prompt template version - increment when the prompt structure changes.
/// The generalization cache is keyed on this.
pub const PROMPT_VERSION: &str = "v1.0.0";

/// Maximum allowed length for generalized output
const MAX_OUTPUT_LENGTH: usize = 150;

/// Batch size for bulk generalization
const BATCH_SIZE: usize = 50;

/// Fallback rate above which the run is flagged for investigation
const FALLBACK_WARN_PERCENT: f64 = 10.0;

/// Pronoun prefixes that must not appear in actor-agnostic output
const FORBIDDEN_PRONOUNS: &[&str] = &[
    "I ", "i ", "We ", "we ", "You ", "you ", "My ", "my ", "Our ", "our ", "Your ", "your ",
];

fn build_prompt(signal_text: &str, dimension: Option<&str>) -> String {
    let sanitized = sanitize_for_prompt(signal_text);
    let dimension_context = dimension.unwrap_or("general");

    format!(
        "Transform this specific statement into an abstract principle.\n\n\
         The principle should:\n\
         - Capture the core value or preference\n\
         - Be general enough to match similar statements\n\
         - Be actionable (can guide behavior)\n\
         - Stay under 150 characters\n\
         - Use imperative form (e.g., \"Values X over Y\", \"Prioritizes Z\")\n\
         - Do NOT add policies or concepts not present in the original\n\
         - Do NOT use pronouns (I, we, you) - abstract the actor\n\
         - If the original has conditions, preserve them\n\n\
         <signal_text>\n{sanitized}\n</signal_text>\n\n\
         <dimension_context>\n{dimension_context}\n</dimension_context>\n\n\
         Output ONLY the generalized principle, nothing else."
    )
}

/// Structural checks on generalized output. Returns the failure reason.
fn validate_generalization(original: &str, generalized: &str) -> Result<(), String> {
    if generalized.trim().is_empty() {
        return Err("empty output".to_string());
    }

    if generalized.len() > MAX_OUTPUT_LENGTH {
        return Err(format!(
            "exceeds {} chars (got {})",
            MAX_OUTPUT_LENGTH,
            generalized.len()
        ));
    }

    for pronoun in FORBIDDEN_PRONOUNS {
        if generalized.contains(pronoun) {
            return Err(format!("contains pronoun \"{}\"", pronoun.trim()));
        }
    }

    // Catches runaway generation while allowing some expansion
    if generalized.len() > original.len() * 3 && generalized.len() > 100 {
        return Err("output too long relative to input".to_string());
    }

    Ok(())
}

/// Generalize a single signal, falling back to its original text on any
/// generation or validation failure.
pub async fn generalize_signal(
    llm: &dyn LlmProvider,
    embedder: &EmbeddingModel,
    signal: &Signal,
    model: &str,
) -> Result<GeneralizedSignal, SynthesisError> {
    let prompt = build_prompt(&signal.text, signal.dimension.map(|d| d.as_str()));

    let (generalized_text, used_fallback) = match llm.generate(&prompt).await {
        Ok(generation) => {
            let text = generation.text.trim().to_string();
            match validate_generalization(&signal.text, &text) {
                Ok(()) => (text, false),
                Err(reason) => {
                    warn!("Validation failed for signal {}: {}", signal.id, reason);
                    (signal.text.clone(), true)
                }
            }
        }
        Err(e) => {
            warn!("Generalization failed for signal {}: {}", signal.id, e);
            (signal.text.clone(), true)
        }
    };

    let embedding = embedder.embed(&generalized_text).await?;

    Ok(GeneralizedSignal {
        original: signal.clone(),
        generalized_text: generalized_text.clone(),
        embedding,
        provenance: GeneralizationProvenance {
            original_text: signal.text.clone(),
            generalized_text,
            model: model.to_string(),
            prompt_version: PROMPT_VERSION.to_string(),
            timestamp: Utc::now(),
            used_fallback,
        },
    })
}

/// Generalize signals in batches, embedding each batch in one call.
///
/// Partial failures degrade to the original signal text; the overall
/// fallback rate is reported and flagged above 10%.
pub async fn generalize_signals(
    llm: &dyn LlmProvider,
    embedder: &EmbeddingModel,
    signals: &[Signal],
    model: &str,
) -> Result<Vec<GeneralizedSignal>, SynthesisError> {
    if signals.is_empty() {
        return Ok(Vec::new());
    }

    let mut results = Vec::with_capacity(signals.len());
    let mut fallback_count = 0usize;

    for batch in signals.chunks(BATCH_SIZE) {
        let mut texts = Vec::with_capacity(batch.len());
        let mut fallbacks = Vec::with_capacity(batch.len());

        for signal in batch {
            let prompt = build_prompt(&signal.text, signal.dimension.map(|d| d.as_str()));
            let (text, used_fallback) = match llm.generate(&prompt).await {
                Ok(generation) => {
                    let text = generation.text.trim().to_string();
                    match validate_generalization(&signal.text, &text) {
                        Ok(()) => (text, false),
                        Err(reason) => {
                            debug!("Validation failed: {}", reason);
                            (signal.text.clone(), true)
                        }
                    }
                }
                Err(_) => (signal.text.clone(), true),
            };

            if used_fallback {
                fallback_count += 1;
            }
            texts.push(text);
            fallbacks.push(used_fallback);
        }

        let embeddings = embedder.embed_batch(&texts).await?;

        for ((signal, text), (embedding, used_fallback)) in batch
            .iter()
            .zip(texts)
            .zip(embeddings.into_iter().zip(fallbacks))
        {
            results.push(GeneralizedSignal {
                original: signal.clone(),
                generalized_text: text.clone(),
                embedding,
                provenance: GeneralizationProvenance {
                    original_text: signal.text.clone(),
                    generalized_text: text,
                    model: model.to_string(),
                    prompt_version: PROMPT_VERSION.to_string(),
                    timestamp: Utc::now(),
                    used_fallback,
                },
            });
        }
    }

    let fallback_rate = (fallback_count as f64 / signals.len() as f64) * 100.0;
    info!(
        "Generalized {} signals, {} used fallback ({:.1}%)",
        signals.len(),
        fallback_count,
        fallback_rate
    );
    if fallback_rate > FALLBACK_WARN_PERCENT {
        warn!(
            "High generalization fallback rate ({:.1}%) - investigate LLM issues",
            fallback_rate
        );
    }

    Ok(results)
}

/// Run-scoped cache for generalized signals, keyed by signal id and
/// prompt version. Explicitly constructed and clearable, never ambient.
pub struct GeneralizationCache {
    entries: HashMap<String, GeneralizedSignal>,
    prompt_version: String,
}

impl GeneralizationCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            prompt_version: PROMPT_VERSION.to_string(),
        }
    }

    fn key(signal_id: &str) -> String {
        format!("{}:{}", signal_id, PROMPT_VERSION)
    }

    pub fn get(&self, signal_id: &str) -> Option<&GeneralizedSignal> {
        self.entries.get(&Self::key(signal_id))
    }

    pub fn put(&mut self, result: GeneralizedSignal) {
        self.entries
            .insert(Self::key(&result.original.id), result);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries if the prompt template has changed since the
    /// cache was populated.
    fn invalidate_if_stale(&mut self) {
        if self.prompt_version != PROMPT_VERSION {
            self.entries.clear();
            self.prompt_version = PROMPT_VERSION.to_string();
            info!("Generalization cache invalidated by prompt version change");
        }
    }
}

impl Default for GeneralizationCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Generalize signals, reusing cached results where available.
/// Output order matches input order.
pub async fn generalize_signals_with_cache(
    llm: &dyn LlmProvider,
    embedder: &EmbeddingModel,
    cache: &mut GeneralizationCache,
    signals: &[Signal],
    model: &str,
) -> Result<Vec<GeneralizedSignal>, SynthesisError> {
    cache.invalidate_if_stale();

    let uncached: Vec<Signal> = signals
        .iter()
        .filter(|s| cache.get(&s.id).is_none())
        .cloned()
        .collect();

    let cache_hits = signals.len() - uncached.len();
    if cache_hits > 0 {
        debug!("Generalization cache hits: {}/{}", cache_hits, signals.len());
    }

    if !uncached.is_empty() {
        let fresh = generalize_signals(llm, embedder, &uncached, model).await?;
        for result in fresh {
            cache.put(result);
        }
    }

    Ok(signals
        .iter()
        .map(|s| {
            cache
                .get(&s.id)
                .expect("every signal was cached or just generalized")
                .clone()
        })
        .collect())
}
