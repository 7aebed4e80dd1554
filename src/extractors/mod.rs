// src/extractors/mod.rs
//! Candidate locator strategies.
//!
//! Each strategy implements `LocatorStrategy::locate`, producing candidates
//! ordered by confidence (highest first, document order on ties). Absence is
//! an empty candidate list, never an error; problems worth reporting travel
//! as `Diagnostic`s.

pub mod pattern;
pub mod proximity;
pub mod selector;
pub mod semantic;

use crate::page::{BoundingBox, PageSnapshot};
use crate::template::FieldDefinition;
use serde::{Deserialize, Serialize};
use std::fmt;

// Re-export key extraction types for convenience
pub use pattern::PatternStrategy;
pub use proximity::ProximityStrategy;
pub use selector::SelectorStrategy;
pub use semantic::{Embedder, HashedNgramEmbedder, SemanticStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Selector,
    Proximity,
    Pattern,
    Semantic,
}

impl StrategyKind {
    /// Cheap and precise first, heuristic and expensive last.
    pub const DEFAULT_ORDER: [StrategyKind; 4] = [
        StrategyKind::Selector,
        StrategyKind::Proximity,
        StrategyKind::Pattern,
        StrategyKind::Semantic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Selector => "selector",
            StrategyKind::Proximity => "proximity",
            StrategyKind::Pattern => "pattern",
            StrategyKind::Semantic => "semantic",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provisional value for one field from one strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub value: String,
    pub confidence: f64,
    pub source: StrategyKind,
    /// Position in the page (element ordinal or text offset) used for ties.
    pub order: usize,
    /// Geometry of the located element, when the strategy knows it.
    pub bbox: Option<BoundingBox>,
}

impl Candidate {
    pub fn new(value: impl Into<String>, confidence: f64, source: StrategyKind, order: usize) -> Self {
        let confidence = if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) };
        Self {
            value: value.into(),
            confidence,
            source,
            order,
            bbox: None,
        }
    }

    pub fn with_bbox(mut self, bbox: Option<BoundingBox>) -> Self {
        self.bbox = bbox;
        self
    }
}

/// Non-fatal findings reported alongside a field's resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    AmbiguousSelector { selector: String, matches: usize },
    InvalidSelector { selector: String, reason: String },
    MissingPattern,
    UnknownPattern { pattern: String },
    EmbeddingFailed { reason: String },
}

impl Diagnostic {
    /// Configuration problems, as opposed to page-dependent observations.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Diagnostic::InvalidSelector { .. } | Diagnostic::MissingPattern | Diagnostic::UnknownPattern { .. }
        )
    }
}

/// Output of one strategy for one field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Located {
    pub candidates: Vec<Candidate>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Located {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wraps candidates, ordering them by confidence then document order.
    pub fn from_candidates(mut candidates: Vec<Candidate>) -> Self {
        sort_candidates(&mut candidates);
        Self { candidates, diagnostics: Vec::new() }
    }

    pub fn diagnostic(diagnostic: Diagnostic) -> Self {
        Self { candidates: Vec::new(), diagnostics: vec![diagnostic] }
    }

    pub fn with_diagnostic(mut self, diagnostic: Diagnostic) -> Self {
        self.diagnostics.push(diagnostic);
        self
    }

    pub fn best(&self) -> Option<&Candidate> {
        self.candidates.first()
    }
}

pub fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.order.cmp(&b.order))
    });
}

/// A swappable procedure that proposes values for a field.
pub trait LocatorStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn locate(&self, field: &FieldDefinition, page: &PageSnapshot) -> Located;
}
