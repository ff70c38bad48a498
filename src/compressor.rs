//! Axiom Compressor - promotes reinforced principles into canonical
//! axioms, with an adaptive cascading threshold.
//!
//! Axioms are recomputed on every pass; nothing here mutates principles.
//! Notation generation is best-effort: a failed call falls back to the
//! native text rather than failing the promotion.

use chrono::Utc;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::SynthesisError;
use crate::llm::{sanitize_for_prompt, LlmProvider};
use crate::types::{Axiom, AxiomProvenance, Canonical, Principle, PrincipleRef, Tier};

/// Primary promotion threshold: principles reinforced at least this many
/// times qualify as axioms.
pub const DEFAULT_PROMOTION_THRESHOLD: u32 = 3;

/// Cascade levels, tried in descending order
const CASCADE_THRESHOLDS: [u32; 3] = [3, 2, 1];

/// Minimum axiom count a cascade level must produce to be accepted
const MIN_AXIOMS_FOR_CASCADE: usize = 3;

/// Maximum length for generated notation before falling back to native
const MAX_NOTATION_LENGTH: usize = 80;

/// Metrics for one compression pass
#[derive(Debug, Clone)]
pub struct CompressionMetrics {
    pub principles_processed: usize,
    pub axioms_created: usize,
    /// principles_processed / max(axioms_created, 1)
    pub compression_ratio: f64,
}

/// Result of a single-threshold compression pass
#[derive(Debug)]
pub struct CompressionResult {
    pub axioms: Vec<Axiom>,
    pub unconverged: Vec<Principle>,
    pub metrics: CompressionMetrics,
}

/// Diagnostics from the adaptive cascade
#[derive(Debug, Clone)]
pub struct CascadeDiagnostics {
    /// The threshold whose result was used
    pub effective_threshold: u32,
    /// Qualifying axiom count per level tried, in descending order
    pub axiom_count_by_threshold: BTreeMap<u32, usize>,
}

/// Result of a cascading compression pass
#[derive(Debug)]
pub struct CascadeResult {
    pub axioms: Vec<Axiom>,
    pub unconverged: Vec<Principle>,
    pub metrics: CompressionMetrics,
    pub cascade: CascadeDiagnostics,
}

/// Partition principles into axioms (n_count >= threshold_n) and
/// unconverged, promoting qualifiers into canonical form.
pub async fn compress_principles(
    llm: &dyn LlmProvider,
    principles: &[Principle],
    threshold_n: u32,
) -> Result<CompressionResult, SynthesisError> {
    let mut axioms = Vec::new();
    let mut unconverged = Vec::new();

    for principle in principles {
        if principle.n_count >= threshold_n {
            axioms.push(promote(llm, principle).await);
        } else {
            unconverged.push(principle.clone());
        }
    }

    let metrics = CompressionMetrics {
        principles_processed: principles.len(),
        axioms_created: axioms.len(),
        compression_ratio: principles.len() as f64 / axioms.len().max(1) as f64,
    };

    info!(
        "Compressed {} principles into {} axioms at N>={} (ratio {:.2})",
        metrics.principles_processed, metrics.axioms_created, threshold_n, metrics.compression_ratio
    );

    Ok(CompressionResult {
        axioms,
        unconverged,
        metrics,
    })
}

/// Compression with an adaptive cascading threshold.
///
/// Tries N in {3, 2, 1} descending and uses the first level yielding at
/// least 3 axioms. If even N=1 yields fewer than 3, the N=1 result is
/// used as-is - axioms are never fabricated. Tier always reflects each
/// principle's true n_count, independent of the cascade level.
pub async fn compress_principles_with_cascade(
    llm: &dyn LlmProvider,
    principles: &[Principle],
) -> Result<CascadeResult, SynthesisError> {
    let mut axiom_count_by_threshold = BTreeMap::new();
    let mut effective_threshold = *CASCADE_THRESHOLDS
        .last()
        .expect("cascade levels are non-empty");

    for &threshold in &CASCADE_THRESHOLDS {
        let qualifying = principles
            .iter()
            .filter(|p| p.n_count >= threshold)
            .count();
        axiom_count_by_threshold.insert(threshold, qualifying);

        if qualifying >= MIN_AXIOMS_FOR_CASCADE {
            effective_threshold = threshold;
            break;
        }

        debug!(
            "Cascade: N>={} yields {} axioms (< {}), lowering threshold",
            threshold, qualifying, MIN_AXIOMS_FOR_CASCADE
        );
    }

    if axiom_count_by_threshold[&effective_threshold] < MIN_AXIOMS_FOR_CASCADE
        && !principles.is_empty()
    {
        warn!(
            "Cascade exhausted: even N>=1 yields only {} axioms",
            axiom_count_by_threshold[&effective_threshold]
        );
    }

    let result = compress_principles(llm, principles, effective_threshold).await?;

    Ok(CascadeResult {
        axioms: result.axioms,
        unconverged: result.unconverged,
        metrics: result.metrics,
        cascade: CascadeDiagnostics {
            effective_threshold,
            axiom_count_by_threshold,
        },
    })
}

/// Promote one principle into an axiom. Never fails: notation generation
/// errors fall back to the native text deterministically.
async fn promote(llm: &dyn LlmProvider, principle: &Principle) -> Axiom {
    let notated = generate_notation(llm, &principle.text).await;

    Axiom {
        id: format!("ax_{}", Uuid::new_v4()),
        text: principle.text.clone(),
        tier: Tier::from_n_count(principle.n_count),
        dimension: principle.dimension,
        canonical: Canonical {
            native: principle.text.clone(),
            notated,
        },
        derived_from: AxiomProvenance {
            principles: vec![PrincipleRef {
                id: principle.id.clone(),
                text: principle.text.clone(),
                n_count: principle.n_count,
            }],
            promoted_at: Utc::now(),
        },
    }
}

/// Best-effort compact notation for an axiom
async fn generate_notation(llm: &dyn LlmProvider, text: &str) -> String {
    let sanitized = sanitize_for_prompt(text);
    let prompt = format!(
        "Compress this identity principle into a short symbolic notation \
         (under {MAX_NOTATION_LENGTH} characters), e.g. \"honesty > performance\".\n\n\
         <principle>\n{sanitized}\n</principle>\n\n\
         Output ONLY the notation, nothing else."
    );

    match llm.generate(&prompt).await {
        Ok(generation) => {
            let notated = generation.text.trim().to_string();
            if notated.is_empty() || notated.len() > MAX_NOTATION_LENGTH {
                debug!("Notation rejected ({} chars), using native text", notated.len());
                text.to_string()
            } else {
                notated
            }
        }
        Err(e) => {
            warn!("Notation generation failed, using native text: {}", e);
            text.to_string()
        }
    }
}
