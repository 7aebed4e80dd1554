// src/extractors/pattern.rs
use super::{Candidate, Diagnostic, Located, LocatorStrategy, StrategyKind};
use crate::page::PageSnapshot;
use crate::patterns::{PatternRegistry, DEFAULT_CONTEXT_WINDOW};
use crate::template::FieldDefinition;
use crate::utils::error::PatternError;
use std::sync::Arc;

/// Runs the field's named pattern over the page text; confidence is each
/// match's context score.
#[derive(Debug, Clone)]
pub struct PatternStrategy {
    registry: Arc<PatternRegistry>,
    window: usize,
}

impl PatternStrategy {
    pub fn new(registry: Arc<PatternRegistry>) -> Self {
        Self { registry, window: DEFAULT_CONTEXT_WINDOW }
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }
}

impl LocatorStrategy for PatternStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Pattern
    }

    fn locate(&self, field: &FieldDefinition, page: &PageSnapshot) -> Located {
        let Some(name) = field.pattern.as_deref().map(str::trim).filter(|p| !p.is_empty()) else {
            tracing::warn!("Field '{}' lists the pattern strategy but names no pattern", field.name);
            return Located::diagnostic(Diagnostic::MissingPattern);
        };

        match self.registry.extract_ranked(page.text(), name, &field.context_keywords, self.window) {
            Ok(ranked) => {
                tracing::debug!("Field '{}': pattern '{}' produced {} match(es)", field.name, name, ranked.len());
                Located::from_candidates(
                    ranked
                        .into_iter()
                        .map(|scored| Candidate::new(scored.matched.value, scored.score, StrategyKind::Pattern, scored.matched.start))
                        .collect(),
                )
            }
            Err(PatternError::UnknownPattern(pattern)) => {
                tracing::warn!("Field '{}': unknown pattern '{}'", field.name, pattern);
                Located::diagnostic(Diagnostic::UnknownPattern { pattern })
            }
            Err(e) => {
                tracing::warn!("Field '{}': pattern '{}' failed: {}", field.name, name, e);
                Located::diagnostic(Diagnostic::UnknownPattern { pattern: name.to_string() })
            }
        }
    }
}
