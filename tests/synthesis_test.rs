//! Clustering, promotion, and provenance behavior over realistic signal runs

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use soul_synth::audit::build_provenance_chain;
use soul_synth::compressor::{compress_principles, compress_principles_with_cascade};
use soul_synth::embeddings::{EmbeddingConfig, EmbeddingModel};
use soul_synth::error::SynthesisError;
use soul_synth::llm::{Classification, ClassifyOptions, Generation, LlmProvider};
use soul_synth::store::{PrincipleStore, SignalAction};
use soul_synth::types::{
    Dimension, Principle, PrincipleProvenance, Signal, SignalRef, SignalSource, SignalType,
    SourceType, Tier,
};

/// Scripted LLM: classification answers pop off a queue, generation
/// always returns a fixed valid principle phrasing.
struct MockLlm {
    classify_responses: Mutex<VecDeque<String>>,
    classify_calls: AtomicUsize,
    generate_calls: AtomicUsize,
}

impl MockLlm {
    fn new(classify_responses: &[&str]) -> Self {
        Self {
            classify_responses: Mutex::new(
                classify_responses.iter().map(|s| s.to_string()).collect(),
            ),
            classify_calls: AtomicUsize::new(0),
            generate_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LlmProvider for MockLlm {
    async fn classify(
        &self,
        _prompt: &str,
        options: &ClassifyOptions,
    ) -> Result<Classification, SynthesisError> {
        self.classify_calls.fetch_add(1, Ordering::SeqCst);
        let answer = self
            .classify_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "identity-core".to_string());

        let category = options.categories.iter().find(|c| **c == answer).cloned();
        let reasoning = if category.is_none() {
            Some(answer)
        } else {
            None
        };
        Ok(Classification {
            category,
            confidence: 0.9,
            reasoning,
        })
    }

    async fn generate(&self, _prompt: &str) -> Result<Generation, SynthesisError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Generation {
            text: "Values honesty over comfort".to_string(),
        })
    }
}

fn source(file: &str) -> SignalSource {
    SignalSource {
        source_type: SourceType::Memory,
        file: file.to_string(),
        section: None,
        line: None,
        context: String::new(),
        extracted_at: Utc::now(),
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
        source: source(file),
    }
}

fn principle_with_n(id: &str, n_count: u32) -> Principle {
    Principle {
        id: id.to_string(),
        text: format!("Principle {}", id),
        dimension: Dimension::HonestyFramework,
        strength: 0.0,
        n_count,
        embedding: vec![1.0, 0.0],
        similarity_threshold: 0.85,
        derived_from: PrincipleProvenance {
            signals: (0..n_count)
                .map(|i| SignalRef {
                    id: format!("{}_sig_{}", id, i),
                    similarity: 0.9,
                    source: source("memory/diary/entry.md"),
                })
                .collect(),
            merged_at: Utc::now(),
        },
        history: vec![],
    }
}

#[tokio::test]
async fn test_identical_signals_merge_into_one_principle() -> anyhow::Result<()> {
    let embedder = EmbeddingModel::new(EmbeddingConfig::hash())?;
    let llm = Arc::new(MockLlm::new(&[]));
    let mut store = PrincipleStore::with_threshold(llm, 0.0);

    for i in 0..3 {
        let s = signal(
            &embedder,
            &format!("sig_{}", i),
            "Always be honest about limitations",
            "memory/diary/day1.md",
        )
        .await;
        store.add_signal(&s, None).await?;
    }

    let principles = store.get_principles();
    assert_eq!(principles.len(), 1);
    assert_eq!(principles[0].n_count, 3);
    assert_eq!(principles[0].derived_from.signals.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_dissimilar_signals_found_separate_principles() -> anyhow::Result<()> {
    let embedder = EmbeddingModel::new(EmbeddingConfig::hash())?;
    let llm = Arc::new(MockLlm::new(&[]));
    let mut store = PrincipleStore::with_threshold(llm, 0.99);

    let a = signal(&embedder, "sig_a", "Prefers direct communication", "memory/diary/a.md").await;
    let b = signal(&embedder, "sig_b", "Enjoys long hikes in autumn", "memory/diary/b.md").await;

    let ra = store.add_signal(&a, None).await?;
    let rb = store.add_signal(&b, None).await?;

    assert_eq!(ra.action, SignalAction::Created);
    assert_eq!(ra.similarity, 1.0);
    assert_eq!(rb.action, SignalAction::Created);
    assert_eq!(store.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_classification_retries_with_corrective_feedback() -> anyhow::Result<()> {
    let embedder = EmbeddingModel::new(EmbeddingConfig::hash())?;
    let llm = Arc::new(MockLlm::new(&["hmm, probably honesty", "honesty-framework"]));
    let mut store = PrincipleStore::new(Arc::clone(&llm) as Arc<dyn LlmProvider>);

    let mut s = signal(&embedder, "sig_1", "Be upfront about mistakes", "memory/diary/a.md").await;
    s.dimension = None;

    store.add_signal(&s, None).await?;

    assert_eq!(llm.classify_calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.get_principles()[0].dimension, Dimension::HonestyFramework);
    Ok(())
}

#[tokio::test]
async fn test_exhausted_retries_fall_back_to_conservative_default() -> anyhow::Result<()> {
    let embedder = EmbeddingModel::new(EmbeddingConfig::hash())?;
    let llm = Arc::new(MockLlm::new(&["nope", "still nope", "never"]));
    let mut store = PrincipleStore::new(Arc::clone(&llm) as Arc<dyn LlmProvider>);

    let mut s = signal(&embedder, "sig_1", "Some ambiguous statement", "memory/diary/a.md").await;
    s.dimension = None;

    store.add_signal(&s, None).await?;

    // 1 initial attempt + 2 retries
    assert_eq!(llm.classify_calls.load(Ordering::SeqCst), 3);
    assert_eq!(store.get_principles()[0].dimension, Dimension::IdentityCore);
    Ok(())
}

#[tokio::test]
async fn test_missing_classification_capability_is_fatal() -> anyhow::Result<()> {
    let embedder = EmbeddingModel::new(EmbeddingConfig::hash())?;
    let mut store = PrincipleStore::without_llm(0.85);

    let mut s = signal(&embedder, "sig_1", "Needs classification", "memory/diary/a.md").await;
    s.dimension = None;

    let err = store.add_signal(&s, None).await.unwrap_err();
    assert!(matches!(err, SynthesisError::CapabilityRequired(_)));
    Ok(())
}

#[tokio::test]
async fn test_promotion_partitions_by_n_count_with_true_tiers() -> anyhow::Result<()> {
    let llm = MockLlm::new(&[]);
    let principles = vec![
        principle_with_n("p1", 5),
        principle_with_n("p2", 4),
        principle_with_n("p3", 3),
        principle_with_n("p4", 2),
    ];

    let result = compress_principles(&llm, &principles, 3).await?;

    assert_eq!(result.axioms.len(), 3);
    assert_eq!(result.axioms[0].tier, Tier::Core);
    assert_eq!(result.axioms[1].tier, Tier::Domain);
    assert_eq!(result.axioms[2].tier, Tier::Domain);
    assert_eq!(result.unconverged.len(), 1);
    assert_eq!(result.unconverged[0].n_count, 2);
    assert_eq!(result.metrics.principles_processed, 4);
    Ok(())
}

#[tokio::test]
async fn test_cascade_lowers_threshold_until_enough_axioms() -> anyhow::Result<()> {
    let llm = MockLlm::new(&[]);
    let principles = vec![
        principle_with_n("p1", 4),
        principle_with_n("p2", 3),
        principle_with_n("p3", 2),
        principle_with_n("p4", 2),
        principle_with_n("p5", 1),
    ];

    let result = compress_principles_with_cascade(&llm, &principles).await?;

    // N=3 yields 2 axioms, N=2 yields 4, so the cascade settles at 2
    assert_eq!(result.cascade.effective_threshold, 2);
    assert_eq!(result.axioms.len(), 4);
    assert_eq!(result.unconverged.len(), 1);

    // Only the levels actually tried are recorded
    assert_eq!(result.cascade.axiom_count_by_threshold.get(&3), Some(&2));
    assert_eq!(result.cascade.axiom_count_by_threshold.get(&2), Some(&4));
    assert_eq!(result.cascade.axiom_count_by_threshold.get(&1), None);

    // Tiers still reflect true n_counts, not the cascade level
    assert!(result.axioms.iter().all(|a| a.tier != Tier::Core));
    Ok(())
}

#[tokio::test]
async fn test_cascade_exhausted_uses_lowest_level_without_fabricating() -> anyhow::Result<()> {
    let llm = MockLlm::new(&[]);
    let principles = vec![principle_with_n("p1", 2), principle_with_n("p2", 1)];

    let result = compress_principles_with_cascade(&llm, &principles).await?;

    assert_eq!(result.cascade.effective_threshold, 1);
    assert_eq!(result.axioms.len(), 2);
    assert!(result.unconverged.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_lower_threshold_never_yields_fewer_axioms() -> anyhow::Result<()> {
    let llm = MockLlm::new(&[]);
    let principles = vec![
        principle_with_n("p1", 5),
        principle_with_n("p2", 3),
        principle_with_n("p3", 2),
        principle_with_n("p4", 1),
    ];

    let mut previous = 0usize;
    for threshold in [3u32, 2, 1] {
        let result = compress_principles(&llm, &principles, threshold).await?;
        assert!(result.axioms.len() >= previous);
        previous = result.axioms.len();
    }
    Ok(())
}

#[tokio::test]
async fn test_axiom_keeps_native_text_verbatim() -> anyhow::Result<()> {
    let llm = MockLlm::new(&[]);
    let principles = vec![principle_with_n("p1", 3)];

    let result = compress_principles(&llm, &principles, 3).await?;

    assert_eq!(result.axioms[0].canonical.native, principles[0].text);
    assert_eq!(result.axioms[0].canonical.notated, "Values honesty over comfort");
    Ok(())
}

#[tokio::test]
async fn test_provenance_chain_links_axiom_to_signals() -> anyhow::Result<()> {
    let llm = MockLlm::new(&[]);
    let principles = vec![principle_with_n("p1", 3)];
    let result = compress_principles(&llm, &principles, 3).await?;

    let chain = build_provenance_chain(&result.axioms[0], &principles);

    assert_eq!(chain.axiom.id, result.axioms[0].id);
    assert_eq!(chain.principles.len(), 1);
    assert_eq!(chain.principles[0].id, "p1");
    assert_eq!(chain.signals.len(), 3);
    assert!(chain.signals.iter().all(|s| s.id.starts_with("p1_sig_")));
    Ok(())
}

#[tokio::test]
async fn test_read_accessors_do_not_mutate() -> anyhow::Result<()> {
    let embedder = EmbeddingModel::new(EmbeddingConfig::hash())?;
    let llm = Arc::new(MockLlm::new(&[]));
    let mut store = PrincipleStore::with_threshold(llm, 0.0);

    let s = signal(&embedder, "sig_1", "Values clarity", "memory/diary/a.md").await;
    store.add_signal(&s, None).await?;

    let before = store.get_principles()[0].n_count;
    let _ = store.get_principles();
    let _ = store.get_principles_above_n(1);
    let _ = store.len();
    assert_eq!(store.get_principles()[0].n_count, before);
    Ok(())
}
