// src/resolver/mod.rs
//! Strategy chain resolver.
//!
//! For each field the configured strategies are attempted in order; the
//! chain stops at the first strategy whose best candidate reaches the
//! acceptance threshold. If none does, the best candidate seen anywhere is
//! returned flagged as low confidence. A field with no candidates at all is
//! unresolved, which is a normal outcome and not an error.

use crate::extractors::{
    sort_candidates, Candidate, Diagnostic, Embedder, LocatorStrategy, PatternStrategy, ProximityStrategy,
    SelectorStrategy, SemanticStrategy, StrategyKind,
};
use crate::page::PageSnapshot;
use crate::patterns::{PatternRegistry, DEFAULT_CONTEXT_WINDOW};
use crate::template::FieldDefinition;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.5;

/// Resolver tuning; the `resolver` block of a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub min_confidence: f64,
    pub proximity_max_distance: f64,
    pub context_window: usize,
    /// Run every strategy and keep the global best instead of stopping early.
    pub evaluate_all: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            proximity_max_distance: crate::extractors::proximity::DEFAULT_MAX_DISTANCE,
            context_window: DEFAULT_CONTEXT_WINDOW,
            evaluate_all: false,
        }
    }
}

impl ResolverConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(format!("resolver min_confidence {} is outside [0, 1]", self.min_confidence));
        }
        if !self.proximity_max_distance.is_finite() || self.proximity_max_distance <= 0.0 {
            return Err(format!(
                "resolver proximity_max_distance must be positive, got {}",
                self.proximity_max_distance
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    Resolved,
    /// Best candidate fell below the threshold; the caller decides.
    LowConfidence,
    Unresolved,
    /// Nothing resolved and a strategy was misconfigured for this field.
    ConfigError,
}

/// Outcome for one field on one page, with provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldResolution {
    pub field: String,
    pub value: Option<String>,
    pub confidence: f64,
    pub source: Option<StrategyKind>,
    pub status: ResolutionStatus,
    pub attempted: Vec<StrategyKind>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

impl FieldResolution {
    fn from_candidate(field: &str, candidate: Candidate, status: ResolutionStatus) -> Self {
        Self {
            field: field.to_string(),
            value: Some(candidate.value),
            confidence: candidate.confidence,
            source: Some(candidate.source),
            status,
            attempted: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn absent(field: &str, status: ResolutionStatus) -> Self {
        Self {
            field: field.to_string(),
            value: None,
            confidence: 0.0,
            source: None,
            status,
            attempted: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.status == ResolutionStatus::Resolved
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageResolution {
    pub url: String,
    pub fields: Vec<FieldResolution>,
}

impl PageResolution {
    pub fn field(&self, name: &str) -> Option<&FieldResolution> {
        self.fields.iter().find(|f| f.field == name)
    }

    pub fn resolved_count(&self) -> usize {
        self.fields.iter().filter(|f| f.is_resolved()).count()
    }
}

pub struct Resolver {
    config: ResolverConfig,
    strategies: HashMap<StrategyKind, Arc<dyn LocatorStrategy>>,
}

impl Resolver {
    /// Resolver with the selector, proximity and pattern strategies. Semantic
    /// matching needs `with_embedder`.
    pub fn new(registry: Arc<PatternRegistry>, config: ResolverConfig) -> Self {
        let mut strategies: HashMap<StrategyKind, Arc<dyn LocatorStrategy>> = HashMap::new();
        strategies.insert(StrategyKind::Selector, Arc::new(SelectorStrategy::new()));
        strategies.insert(
            StrategyKind::Proximity,
            Arc::new(ProximityStrategy::new(config.proximity_max_distance)),
        );
        strategies.insert(
            StrategyKind::Pattern,
            Arc::new(PatternStrategy::new(registry).with_window(config.context_window)),
        );
        Self { config, strategies }
    }

    pub fn with_embedder(self, embedder: Arc<dyn Embedder>) -> Self {
        self.with_strategy(Arc::new(SemanticStrategy::new(embedder)))
    }

    /// Replaces the strategy registered for `strategy.kind()`.
    pub fn with_strategy(mut self, strategy: Arc<dyn LocatorStrategy>) -> Self {
        self.strategies.insert(strategy.kind(), strategy);
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn semantic_available(&self) -> bool {
        self.strategies.contains_key(&StrategyKind::Semantic)
    }

    pub fn resolve_field(&self, field: &FieldDefinition, page: &PageSnapshot) -> FieldResolution {
        let threshold = field.min_confidence.unwrap_or(self.config.min_confidence);
        let mut attempted = Vec::new();
        let mut diagnostics = Vec::new();
        // Strict comparisons below keep the earlier strategy on equal confidence.
        let mut accepted: Option<Candidate> = None;
        let mut fallback: Option<Candidate> = None;

        for kind in field.strategy_order(self.semantic_available()) {
            let Some(strategy) = self.strategies.get(&kind) else {
                continue;
            };
            attempted.push(kind);
            let located = strategy.locate(field, page);
            diagnostics.extend(located.diagnostics);

            let mut candidates = located.candidates;
            sort_candidates(&mut candidates);
            let Some(best) = candidates.into_iter().next() else {
                tracing::debug!("Field '{}': {} found nothing", field.name, kind);
                continue;
            };
            tracing::debug!(
                "Field '{}': {} best candidate '{}' ({:.3})",
                field.name,
                kind,
                best.value,
                best.confidence
            );

            if best.confidence >= threshold {
                if !self.config.evaluate_all {
                    accepted = Some(best);
                    break;
                }
                if accepted.as_ref().map_or(true, |current| best.confidence > current.confidence) {
                    accepted = Some(best);
                }
            } else if fallback.as_ref().map_or(true, |current| best.confidence > current.confidence) {
                fallback = Some(best);
            }
        }

        let mut resolution = match (accepted, fallback) {
            (Some(candidate), _) => FieldResolution::from_candidate(&field.name, candidate, ResolutionStatus::Resolved),
            (None, Some(candidate)) => {
                tracing::debug!(
                    "Field '{}': best candidate {:.3} is below threshold {:.3}",
                    field.name,
                    candidate.confidence,
                    threshold
                );
                FieldResolution::from_candidate(&field.name, candidate, ResolutionStatus::LowConfidence)
            }
            (None, None) if diagnostics.iter().any(Diagnostic::is_config_error) => {
                tracing::warn!("Field '{}' unresolved with configuration errors: {:?}", field.name, diagnostics);
                FieldResolution::absent(&field.name, ResolutionStatus::ConfigError)
            }
            (None, None) => FieldResolution::absent(&field.name, ResolutionStatus::Unresolved),
        };
        resolution.attempted = attempted;
        resolution.diagnostics = diagnostics;
        resolution
    }

    /// Resolves every field independently against the same snapshot.
    pub fn resolve_page(&self, fields: &[FieldDefinition], page: &PageSnapshot) -> PageResolution {
        let fields: Vec<FieldResolution> = fields.iter().map(|field| self.resolve_field(field, page)).collect();
        let resolved = fields.iter().filter(|f| f.is_resolved()).count();
        tracing::info!("Resolved {}/{} fields for {}", resolved, fields.len(), page.url());
        PageResolution { url: page.url().to_string(), fields }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::Located;
    use crate::extractors::HashedNgramEmbedder;

    const PAGE: &str = r#"<html><body>
        <h1 class="name">Jane Roe</h1>
        <div class="contact">
          <p>Reach our office by phone or email for direct contact: (415) 555-0134</p>
          <p><strong>Email:</strong> jane.roe@lawfirm.com</p>
        </div>
    </body></html>"#;

    struct FixedStrategy {
        kind: StrategyKind,
        value: &'static str,
        confidence: f64,
    }

    impl LocatorStrategy for FixedStrategy {
        fn kind(&self) -> StrategyKind {
            self.kind
        }

        fn locate(&self, _field: &FieldDefinition, _page: &PageSnapshot) -> Located {
            Located::from_candidates(vec![Candidate::new(self.value, self.confidence, self.kind, 0)])
        }
    }

    fn fixed(kind: StrategyKind, value: &'static str, confidence: f64) -> Arc<dyn LocatorStrategy> {
        Arc::new(FixedStrategy { kind, value, confidence })
    }

    fn resolver() -> Resolver {
        Resolver::new(Arc::new(PatternRegistry::new()), ResolverConfig::default())
    }

    fn page() -> PageSnapshot {
        PageSnapshot::parse("https://example.com/jane", PAGE)
    }

    #[test]
    fn test_unique_selector_resolves_with_full_confidence() {
        let field = FieldDefinition::new("name").with_selector("h1.name").with_label("Name");
        let resolution = resolver().resolve_field(&field, &page());
        assert_eq!(resolution.value.as_deref(), Some("Jane Roe"));
        assert_eq!(resolution.confidence, 1.0);
        assert_eq!(resolution.source, Some(StrategyKind::Selector));
        assert_eq!(resolution.status, ResolutionStatus::Resolved);
        // chain stopped at the first accepting strategy
        assert_eq!(resolution.attempted, vec![StrategyKind::Selector]);
    }

    #[test]
    fn test_falls_through_absent_selector_to_pattern() {
        let field = FieldDefinition::new("phone")
            .with_selector("span.phone")
            .with_pattern("phone")
            .with_context_keywords(&["office", "phone", "direct", "contact", "fax"])
            .with_strategies(&[StrategyKind::Selector, StrategyKind::Pattern]);
        let resolution = resolver().resolve_field(&field, &page());
        assert_eq!(resolution.source, Some(StrategyKind::Pattern));
        assert!((resolution.confidence - 0.8).abs() < 1e-9);
        assert_eq!(resolution.value.as_deref(), Some("(415) 555-0134"));
        assert_eq!(resolution.attempted, vec![StrategyKind::Selector, StrategyKind::Pattern]);
    }

    #[test]
    fn test_proximity_resolves_labelled_value() {
        let field = FieldDefinition::new("email").with_label("Email").with_pattern("email");
        let resolution = resolver().resolve_field(&field, &page());
        assert_eq!(resolution.value.as_deref(), Some("jane.roe@lawfirm.com"));
        assert_eq!(resolution.source, Some(StrategyKind::Proximity));
    }

    #[test]
    fn test_low_confidence_returns_best_overall() {
        let resolver = resolver()
            .with_strategy(fixed(StrategyKind::Selector, "weak", 0.3))
            .with_strategy(fixed(StrategyKind::Proximity, "weaker", 0.2));
        let field = FieldDefinition::new("x")
            .with_strategies(&[StrategyKind::Selector, StrategyKind::Proximity]);
        let resolution = resolver.resolve_field(&field, &page());
        assert_eq!(resolution.status, ResolutionStatus::LowConfidence);
        assert_eq!(resolution.value.as_deref(), Some("weak"));
        assert_eq!(resolution.attempted.len(), 2);
    }

    #[test]
    fn test_per_field_threshold_overrides_default() {
        let resolver = resolver().with_strategy(fixed(StrategyKind::Selector, "weak", 0.3));
        let field = FieldDefinition::new("x")
            .with_strategies(&[StrategyKind::Selector])
            .with_min_confidence(0.25);
        assert_eq!(resolver.resolve_field(&field, &page()).status, ResolutionStatus::Resolved);
    }

    #[test]
    fn test_unresolved_is_not_an_error() {
        let field = FieldDefinition::new("fax").with_selector("span.fax").with_label("Fax");
        let resolution = resolver().resolve_field(&field, &page());
        assert_eq!(resolution.status, ResolutionStatus::Unresolved);
        assert_eq!(resolution.value, None);
        assert!(resolution.diagnostics.is_empty());
    }

    #[test]
    fn test_unknown_pattern_does_not_block_other_strategies() {
        let field = FieldDefinition::new("name").with_selector("h1.name").with_pattern("fax").with_strategies(&[
            StrategyKind::Pattern,
            StrategyKind::Selector,
        ]);
        let resolution = resolver().resolve_field(&field, &page());
        assert_eq!(resolution.status, ResolutionStatus::Resolved);
        assert_eq!(resolution.value.as_deref(), Some("Jane Roe"));
        assert_eq!(resolution.diagnostics, vec![Diagnostic::UnknownPattern { pattern: "fax".to_string() }]);

        let only_pattern = FieldDefinition::new("x").with_pattern("fax");
        assert_eq!(resolver().resolve_field(&only_pattern, &page()).status, ResolutionStatus::ConfigError);
    }

    #[test]
    fn test_evaluate_all_picks_global_best_and_breaks_ties_by_declaration() {
        let config = ResolverConfig { evaluate_all: true, ..ResolverConfig::default() };
        let resolver = Resolver::new(Arc::new(PatternRegistry::new()), config)
            .with_strategy(fixed(StrategyKind::Selector, "first", 0.7))
            .with_strategy(fixed(StrategyKind::Proximity, "second", 0.9))
            .with_strategy(fixed(StrategyKind::Pattern, "third", 0.9));
        let field = FieldDefinition::new("x").with_strategies(&[
            StrategyKind::Selector,
            StrategyKind::Proximity,
            StrategyKind::Pattern,
        ]);
        let resolution = resolver.resolve_field(&field, &page());
        assert_eq!(resolution.value.as_deref(), Some("second"));
        assert_eq!(resolution.attempted.len(), 3);
    }

    #[test]
    fn test_semantic_runs_last_only_with_backend() {
        let field = FieldDefinition::new("name").with_description("Jane Roe").with_label("Nickname");
        assert!(resolver().resolve_field(&field, &page()).attempted == vec![StrategyKind::Proximity]);

        let with_backend = resolver().with_embedder(Arc::new(HashedNgramEmbedder::default()));
        let resolution = with_backend.resolve_field(&field, &page());
        assert_eq!(resolution.attempted, vec![StrategyKind::Proximity, StrategyKind::Semantic]);
        assert_eq!(resolution.value.as_deref(), Some("Jane Roe"));
        assert_eq!(resolution.source, Some(StrategyKind::Semantic));
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let fields = vec![
            FieldDefinition::new("name").with_selector("h1.name"),
            FieldDefinition::new("email").with_label("Email").with_pattern("email"),
            FieldDefinition::new("fax").with_pattern("phone").with_context_keywords(&["fax"]),
        ];
        let resolver = resolver();
        let snapshot = page();
        let first = resolver.resolve_page(&fields, &snapshot);
        let second = resolver.resolve_page(&fields, &snapshot);
        assert_eq!(first, second);
        assert_eq!(first.resolved_count(), 2);
        assert_eq!(first.field("fax").map(|f| f.status), Some(ResolutionStatus::LowConfidence));
    }

    #[test]
    fn test_config_validation() {
        assert!(ResolverConfig::default().validate().is_ok());
        let bad = ResolverConfig { min_confidence: 1.2, ..ResolverConfig::default() };
        assert!(bad.validate().is_err());
    }
}
