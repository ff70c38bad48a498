//! Core data model: signals, principles, axioms, and their provenance.
//!
//! Signals are immutable extracted observations. Principles accumulate
//! reinforcing signals but keep the founding signal's text and embedding
//! fixed forever. Axioms are recomputed on each compression pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Behavioral category of an extracted signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Value,
    Belief,
    Preference,
    Goal,
    Constraint,
    Relationship,
    Pattern,
    Correction,
    Boundary,
    Reinforcement,
}

/// The 7 fixed identity dimensions used to bucket principles and axioms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dimension {
    IdentityCore,
    CharacterTraits,
    VoicePresence,
    HonestyFramework,
    BoundariesEthics,
    RelationshipDynamics,
    ContinuityGrowth,
}

/// All dimensions, in canonical order
pub const DIMENSIONS: [Dimension; 7] = [
    Dimension::IdentityCore,
    Dimension::CharacterTraits,
    Dimension::VoicePresence,
    Dimension::HonestyFramework,
    Dimension::BoundariesEthics,
    Dimension::RelationshipDynamics,
    Dimension::ContinuityGrowth,
];

impl Dimension {
    /// Wire/prompt name for the dimension (kebab-case)
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::IdentityCore => "identity-core",
            Dimension::CharacterTraits => "character-traits",
            Dimension::VoicePresence => "voice-presence",
            Dimension::HonestyFramework => "honesty-framework",
            Dimension::BoundariesEthics => "boundaries-ethics",
            Dimension::RelationshipDynamics => "relationship-dynamics",
            Dimension::ContinuityGrowth => "continuity-growth",
        }
    }

    /// Parse a dimension from its wire name
    pub fn parse(s: &str) -> Option<Self> {
        DIMENSIONS.iter().copied().find(|d| d.as_str() == s.trim())
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of document a signal was extracted from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Memory,
    Interview,
    Template,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceType::Memory => write!(f, "memory"),
            SourceType::Interview => write!(f, "interview"),
            SourceType::Template => write!(f, "template"),
        }
    }
}

/// Where a signal came from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSource {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    /// Source file path
    pub file: String,
    /// Section within the file (header, question id)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Line number in the source file, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Surrounding context snippet
    pub context: String,
    /// When the signal was extracted
    pub extracted_at: DateTime<Utc>,
}

/// An atomic extracted behavioral statement with embedding and provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    pub text: String,
    /// Extraction confidence in [0, 1]
    pub confidence: f32,
    pub embedding: Vec<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<Dimension>,
    pub source: SignalSource,
}

/// Record of how a signal was generalized before clustering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralizationProvenance {
    pub original_text: String,
    pub generalized_text: String,
    pub model: String,
    pub prompt_version: String,
    pub timestamp: DateTime<Utc>,
    pub used_fallback: bool,
}

/// A signal paired with its LLM-generalized form.
///
/// Clustering runs on the generalized embedding while provenance keeps
/// pointing at the original signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralizedSignal {
    pub original: Signal,
    pub generalized_text: String,
    pub embedding: Vec<f32>,
    pub provenance: GeneralizationProvenance,
}

/// One signal's contribution to a principle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRef {
    pub id: String,
    /// Cosine similarity to the principle at merge time
    pub similarity: f32,
    pub source: SignalSource,
}

/// Ordered record of every signal merged into a principle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrincipleProvenance {
    pub signals: Vec<SignalRef>,
    pub merged_at: DateTime<Utc>,
}

/// Lifecycle event on a principle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipleEventType {
    Created,
    Reinforced,
    Merged,
    Promoted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrincipleEvent {
    #[serde(rename = "type")]
    pub event_type: PrincipleEventType,
    pub timestamp: DateTime<Utc>,
    pub details: String,
}

/// A cluster of reinforcing signals sharing one representative statement.
///
/// Text and embedding come from the founding signal and are never
/// recomputed; this trades centroid accuracy for exact traceability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principle {
    pub id: String,
    pub text: String,
    pub dimension: Dimension,
    /// Derived cross-source strength (see emergence module)
    pub strength: f64,
    /// Reinforcement count; always equals derived_from.signals.len()
    pub n_count: u32,
    pub embedding: Vec<f32>,
    /// Similarity threshold the store was configured with at creation
    pub similarity_threshold: f32,
    pub derived_from: PrincipleProvenance,
    pub history: Vec<PrincipleEvent>,
}

/// Axiom tier, a pure function of the backing principle's n_count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Core,
    Domain,
    Emerging,
}

impl Tier {
    /// Tier for a given reinforcement count: core at N>=5, domain at
    /// N>=3, emerging below.
    pub fn from_n_count(n_count: u32) -> Self {
        if n_count >= 5 {
            Tier::Core
        } else if n_count >= 3 {
            Tier::Domain
        } else {
            Tier::Emerging
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Core => write!(f, "core"),
            Tier::Domain => write!(f, "domain"),
            Tier::Emerging => write!(f, "emerging"),
        }
    }
}

/// Canonical forms of an axiom
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Canonical {
    /// The principle text, verbatim
    pub native: String,
    /// Compact notation; falls back to native when generation fails
    pub notated: String,
}

/// A principle's contribution to an axiom
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrincipleRef {
    pub id: String,
    pub text: String,
    pub n_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxiomProvenance {
    pub principles: Vec<PrincipleRef>,
    pub promoted_at: DateTime<Utc>,
}

/// A principle promoted past the reinforcement threshold into canonical form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axiom {
    pub id: String,
    pub text: String,
    pub tier: Tier,
    pub dimension: Dimension,
    pub canonical: Canonical,
    pub derived_from: AxiomProvenance,
}

/// Full audit trail from an axiom back to its source signals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceChain {
    pub axiom: ProvenanceAxiom,
    pub principles: Vec<PrincipleRef>,
    pub signals: Vec<ProvenanceSignal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceAxiom {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceSignal {
    pub id: String,
    pub similarity: f32,
    pub source: SignalSource,
}
