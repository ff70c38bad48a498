//! Soul Synth - Identity Axiom Synthesis Library
//!
//! Distills extracted behavioral signals into a compact, auditable set
//! of identity axioms:
//! - Incremental semantic clustering of signals into principles
//! - LLM generalization into actor-agnostic phrasing before clustering
//! - Adaptive cascading promotion of reinforced principles into axioms
//! - Cross-source emergence scoring and core-identity detection
//! - Append-only audit ledger with full axiom-to-signal provenance
//!
//! # Example
//!
//! ```ignore
//! use soul_synth::config::Config;
//! use soul_synth::embeddings::{EmbeddingConfig, EmbeddingModel};
//! use soul_synth::llm::{OpenRouterProvider, ProviderConfig};
//! use soul_synth::pipeline::SynthesisPipeline;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let llm = Arc::new(OpenRouterProvider::new(ProviderConfig::openrouter(
//!         std::env::var("OPENROUTER_API_KEY")?,
//!         config.llm.model.clone(),
//!     ))?);
//!     let embedder = EmbeddingModel::new(EmbeddingConfig::hash())?;
//!
//!     let mut pipeline = SynthesisPipeline::new(llm, embedder, config);
//!     let output = pipeline.run(&[]).await?;
//!     println!("{} axioms", output.report.axioms_created);
//!     Ok(())
//! }
//! ```

// Core modules (order matters for cross-module dependencies)
pub mod types;
pub mod error;
pub mod llm;
pub mod embeddings;
pub mod matcher;
pub mod store;
pub mod generalizer;
pub mod compressor;
pub mod emergence;
pub mod audit;
pub mod persistence;
pub mod config;
pub mod pipeline;

// Re-export commonly used types for convenience
pub use types::{
    Axiom, Dimension, GeneralizedSignal, Principle, ProvenanceChain, Signal, SignalSource,
    SignalType, SourceType, Tier, DIMENSIONS,
};

pub use error::SynthesisError;

pub use llm::{ClassifyOptions, LlmProvider, OpenRouterProvider, ProviderConfig};

pub use embeddings::{EmbeddingConfig, EmbeddingModel};

pub use store::{AddSignalResult, PrincipleStore, SignalAction, DEFAULT_SIMILARITY_THRESHOLD};

pub use compressor::{
    compress_principles, compress_principles_with_cascade, CascadeResult, CompressionResult,
    DEFAULT_PROMOTION_THRESHOLD,
};

pub use emergence::{detect_emergent_axioms, CoreIdentityPredicate, EmergentAxiom};

pub use audit::{AuditLogger, AuditSession};

pub use config::Config;

pub use pipeline::{SynthesisOutput, SynthesisPipeline, SynthesisReport};

/// Initialize logging (INFO level by default, override with RUST_LOG)
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - Identity Axiom Synthesis Library", NAME, VERSION)
}
