// src/extractors/semantic.rs
//! Semantic similarity between a field's description and the page's visible
//! text nodes. Only active when an `Embedder` is configured; always the last
//! strategy in the chain.

use super::{Candidate, Diagnostic, Located, LocatorStrategy, StrategyKind};
use crate::page::{element_text, is_within_hidden, own_text, PageSnapshot};
use crate::template::FieldDefinition;
use crate::utils::error::EmbedError;
use crate::utils::text::{cosine_similarity, normalize_label};
use scraper::ElementRef;
use std::sync::Arc;

pub const DEFAULT_MAX_CANDIDATES: usize = 10;
const MAX_NODE_CHARS: usize = 300;
const HINT_ATTRIBUTES: &[&str] = &["title", "alt", "aria-label", "placeholder"];

/// Turns text into fixed-size vectors. Implementations must return exactly one
/// vector per input, in input order.
pub trait Embedder: Send + Sync {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Deterministic bag of hashed word and character-trigram features.
#[derive(Debug, Clone, Copy)]
pub struct HashedNgramEmbedder {
    dimensions: usize,
}

impl Default for HashedNgramEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl HashedNgramEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }

    fn bucket(&self, feature: &str) -> usize {
        // FNV-1a
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in feature.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        (hash % self.dimensions as u64) as usize
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let lowered = text.to_lowercase();
        for word in lowered.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            vector[self.bucket(word)] += 1.0;
            let padded: Vec<char> = format!(" {} ", word).chars().collect();
            for gram in padded.windows(3) {
                let gram: String = gram.iter().collect();
                vector[self.bucket(&gram)] += 0.5;
            }
        }
        vector
    }
}

impl Embedder for HashedNgramEmbedder {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

pub struct SemanticStrategy {
    embedder: Arc<dyn Embedder>,
    max_candidates: usize,
}

impl SemanticStrategy {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder, max_candidates: DEFAULT_MAX_CANDIDATES }
    }

    pub fn with_max_candidates(mut self, max_candidates: usize) -> Self {
        self.max_candidates = max_candidates.max(1);
        self
    }
}

/// Text embedded for a node: its own text, preceded by the nearest preceding
/// sibling's text (usually a label) and followed by descriptive attributes.
fn node_context(element: ElementRef<'_>, own: &str) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(previous) = element.prev_siblings().find_map(ElementRef::wrap) {
        parts.push(element_text(previous));
    }
    parts.push(own.to_string());
    for attr in HINT_ATTRIBUTES {
        if let Some(value) = element.value().attr(attr) {
            parts.push(value.to_string());
        }
    }
    parts.join(" ")
}

impl LocatorStrategy for SemanticStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Semantic
    }

    fn locate(&self, field: &FieldDefinition, page: &PageSnapshot) -> Located {
        let query = field.description_text();
        let label = field.label.as_deref().map(normalize_label);

        let nodes: Vec<(usize, String, String)> = page
            .elements()
            .into_iter()
            .filter(|e| !is_within_hidden(e.element))
            .filter_map(|e| {
                let own = own_text(e.element);
                let label_like = own.ends_with(':') || label.as_deref() == Some(normalize_label(&own).as_str());
                if own.is_empty() || label_like || own.chars().count() > MAX_NODE_CHARS {
                    return None;
                }
                let context = node_context(e.element, &own);
                Some((e.ordinal, own, context))
            })
            .collect();
        if nodes.is_empty() {
            return Located::empty();
        }

        let mut inputs: Vec<&str> = Vec::with_capacity(nodes.len() + 1);
        inputs.push(&query);
        inputs.extend(nodes.iter().map(|(_, _, context)| context.as_str()));

        let vectors = match self.embedder.embed(&inputs) {
            Ok(vectors) if vectors.len() == inputs.len() => vectors,
            Ok(vectors) => {
                let e = EmbedError::CountMismatch { expected: inputs.len(), got: vectors.len() };
                tracing::warn!("Field '{}': {}", field.name, e);
                return Located::diagnostic(Diagnostic::EmbeddingFailed { reason: e.to_string() });
            }
            Err(e) => {
                tracing::warn!("Field '{}': {}", field.name, e);
                return Located::diagnostic(Diagnostic::EmbeddingFailed { reason: e.to_string() });
            }
        };

        let (query_vector, node_vectors) = vectors.split_at(1);
        let mut candidates: Vec<Candidate> = nodes
            .into_iter()
            .zip(node_vectors)
            .filter_map(|((ordinal, value, _), vector)| {
                let similarity = cosine_similarity(&query_vector[0], vector);
                tracing::trace!("Semantic similarity {:.3} for '{}'", similarity, value);
                (similarity > 0.0).then(|| Candidate::new(value, similarity, StrategyKind::Semantic, ordinal))
            })
            .collect();
        super::sort_candidates(&mut candidates);
        candidates.truncate(self.max_candidates);

        tracing::debug!("Field '{}': {} semantic candidate(s)", field.name, candidates.len());
        Located { candidates, diagnostics: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenEmbedder;

    impl Embedder for BrokenEmbedder {
        fn embed(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
            Err(EmbedError::Backend("model offline".to_string()))
        }
    }

    const PAGE: &str = r#"<html><body>
        <p>Office hours: Monday to Friday</p>
        <p>Copyright 2024</p>
        <div><span>Practice areas:</span><span>Commercial litigation and appeals</span></div>
        <script>practice areas practice areas</script>
    </body></html>"#;

    #[test]
    fn test_hashed_embedder_is_deterministic() {
        let embedder = HashedNgramEmbedder::default();
        let vectors = embedder.embed(&["practice areas", "practice areas", "zzz"]).unwrap();
        assert_eq!(vectors[0], vectors[1]);
        assert!((cosine_similarity(&vectors[0], &vectors[1]) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&vectors[0], &vectors[2]) < 0.5);
    }

    #[test]
    fn test_ranks_nodes_by_similarity_to_description() {
        let page = PageSnapshot::parse("https://example.com", PAGE);
        let field = FieldDefinition::new("practice").with_description("Practice areas");
        let located = SemanticStrategy::new(Arc::new(HashedNgramEmbedder::default())).locate(&field, &page);
        let best = located.best().unwrap();
        assert_eq!(best.value, "Commercial litigation and appeals");
        assert_eq!(best.source, StrategyKind::Semantic);
        assert!(best.confidence > 0.0 && best.confidence <= 1.0);
        assert!(located.candidates.iter().all(|c| c.value != "Practice areas:"));
    }

    #[test]
    fn test_backend_failure_is_a_diagnostic() {
        let page = PageSnapshot::parse("u", PAGE);
        let located = SemanticStrategy::new(Arc::new(BrokenEmbedder)).locate(&FieldDefinition::new("x"), &page);
        assert!(located.candidates.is_empty());
        assert!(matches!(&located.diagnostics[..], [Diagnostic::EmbeddingFailed { reason }] if reason.contains("offline")));
    }
}
