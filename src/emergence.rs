//! Axiom Emergence Analyzer - scores convergence across structurally
//! distinct sources.
//!
//! The same reinforcement count is stronger evidence when it converges
//! from several source categories than from one, so strength scales with
//! `n_count * log2(categories + 1)`; the log dampens diminishing returns.

use std::collections::BTreeSet;

use crate::types::{Axiom, Dimension, Principle};

/// Cross-source strength: `n_count * log2(category_count + 1)`.
///
/// One category yields the bare n_count (log2(2) == 1).
pub fn calculate_cross_source_strength(category_count: usize, n_count: u32) -> f64 {
    n_count as f64 * ((category_count as f64) + 1.0).log2()
}

/// Coarse source category for a signal's file path.
///
/// Uses the parent directory of the file, skipping a leading "memory"
/// root, e.g. `memory/diary/day1.md` -> `diary`. Files with no useful
/// directory fall back to "general".
pub fn source_category(file: &str) -> String {
    let mut components: Vec<&str> = file
        .split('/')
        .filter(|c| !c.is_empty() && *c != ".")
        .collect();

    // Drop the filename
    components.pop();

    while let Some(&first) = components.first() {
        if first == "memory" {
            components.remove(0);
        } else {
            break;
        }
    }

    components
        .last()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "general".to_string())
}

/// Distinct source categories backing a principle, in first-seen order
fn principle_categories(principle: &Principle) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut categories = Vec::new();
    for signal in &principle.derived_from.signals {
        let category = source_category(&signal.source.file);
        if seen.insert(category.clone()) {
            categories.push(category);
        }
    }
    categories
}

/// Cross-source strength of a principle, using its distinct source
/// category count.
pub fn calculate_principle_strength(principle: &Principle) -> f64 {
    let categories = principle_categories(principle);
    calculate_cross_source_strength(categories.len(), principle.n_count)
}

/// Named predicate deciding whether an emergent axiom is core identity.
///
/// The exact emergence rule is a judgment call; this keeps it explicit
/// and configurable. Default: at least 3 distinct source categories,
/// with no dimension requirement.
#[derive(Debug, Clone)]
pub struct CoreIdentityPredicate {
    /// Minimum distinct source categories backing the axiom
    pub min_source_categories: usize,
    /// Optional minimum distinct dimensions across backing principles
    pub min_dimensions: Option<usize>,
}

impl Default for CoreIdentityPredicate {
    fn default() -> Self {
        Self {
            min_source_categories: 3,
            min_dimensions: None,
        }
    }
}

impl CoreIdentityPredicate {
    pub fn evaluate(&self, source_categories: &[String], dimensions: &[Dimension]) -> bool {
        if source_categories.len() < self.min_source_categories {
            return false;
        }
        if let Some(min) = self.min_dimensions {
            if dimensions.len() < min {
                return false;
            }
        }
        true
    }
}

/// An axiom annotated with cross-source convergence evidence
#[derive(Debug, Clone)]
pub struct EmergentAxiom {
    pub axiom: Axiom,
    /// Distinct source categories across all backing signals
    pub source_categories: Vec<String>,
    /// Distinct dimensions across backing principles
    pub dimensions: Vec<Dimension>,
    pub strength: f64,
    pub is_core_identity: bool,
}

/// Aggregate emergence statistics
#[derive(Debug, Clone)]
pub struct EmergenceStats {
    pub total_axioms: usize,
    /// Axioms backed by more than one source category
    pub cross_source_axioms: usize,
    pub core_identity_axioms: usize,
}

/// Join axioms to their backing principles and score each one.
pub fn detect_emergent_axioms(
    axioms: &[Axiom],
    principles: &[Principle],
    predicate: &CoreIdentityPredicate,
) -> Vec<EmergentAxiom> {
    axioms
        .iter()
        .map(|axiom| {
            let backing: Vec<&Principle> = axiom
                .derived_from
                .principles
                .iter()
                .filter_map(|pref| principles.iter().find(|p| p.id == pref.id))
                .collect();

            let mut seen_categories = BTreeSet::new();
            let mut source_categories = Vec::new();
            let mut seen_dimensions = BTreeSet::new();
            let mut dimensions = Vec::new();
            let mut total_n = 0u32;

            for principle in &backing {
                total_n += principle.n_count;
                if seen_dimensions.insert(principle.dimension.as_str()) {
                    dimensions.push(principle.dimension);
                }
                for signal in &principle.derived_from.signals {
                    let category = source_category(&signal.source.file);
                    if seen_categories.insert(category.clone()) {
                        source_categories.push(category);
                    }
                }
            }

            let strength = calculate_cross_source_strength(source_categories.len(), total_n);
            let is_core_identity = predicate.evaluate(&source_categories, &dimensions);

            EmergentAxiom {
                axiom: axiom.clone(),
                source_categories,
                dimensions,
                strength,
                is_core_identity,
            }
        })
        .collect()
}

/// Aggregate totals over emergent axioms
pub fn calculate_emergence_stats(emergent: &[EmergentAxiom]) -> EmergenceStats {
    EmergenceStats {
        total_axioms: emergent.len(),
        cross_source_axioms: emergent
            .iter()
            .filter(|e| e.source_categories.len() > 1)
            .count(),
        core_identity_axioms: emergent.iter().filter(|e| e.is_core_identity).count(),
    }
}

/// Only the axioms satisfying the core-identity predicate
pub fn get_core_identity_axioms(emergent: &[EmergentAxiom]) -> Vec<&EmergentAxiom> {
    emergent.iter().filter(|e| e.is_core_identity).collect()
}
