// src/template/mod.rs
//! Versioned JSON templates: the field definitions the resolver consumes and
//! the rate limiting block the session applies.

use crate::extractors::StrategyKind;
use crate::limiter::RateLimitConfig;
use crate::patterns::PatternRegistry;
use crate::resolver::ResolverConfig;
use crate::utils::error::TemplateError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

fn default_version() -> String {
    "1.0".to_string()
}

/// One named piece of data to extract from each page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context_keywords: Vec<String>,
    /// Attempt order; derived from the configured inputs when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategies: Option<Vec<StrategyKind>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f64>,
    /// Human description used by semantic matching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Read this attribute instead of the element text (selector strategy).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl FieldDefinition {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            selector: None,
            label: None,
            pattern: None,
            context_keywords: Vec::new(),
            strategies: None,
            min_confidence: None,
            description: None,
            attribute: None,
        }
    }

    pub fn with_selector(mut self, selector: &str) -> Self {
        self.selector = Some(selector.to_string());
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn with_pattern(mut self, pattern: &str) -> Self {
        self.pattern = Some(pattern.to_string());
        self
    }

    pub fn with_context_keywords(mut self, keywords: &[&str]) -> Self {
        self.context_keywords = keywords.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_strategies(mut self, strategies: &[StrategyKind]) -> Self {
        self.strategies = Some(strategies.to_vec());
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = Some(min_confidence);
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_attribute(mut self, attribute: &str) -> Self {
        self.attribute = Some(attribute.to_string());
        self
    }

    /// Strategies to attempt, in order. An explicit list is deduplicated and
    /// semantic is moved last; otherwise only strategies whose inputs are
    /// configured are listed. Semantic is dropped without a backend.
    pub fn strategy_order(&self, semantic_available: bool) -> Vec<StrategyKind> {
        let mut order: Vec<StrategyKind> = match &self.strategies {
            Some(explicit) => {
                let mut seen = HashSet::new();
                explicit.iter().copied().filter(|kind| seen.insert(*kind)).collect()
            }
            None => StrategyKind::DEFAULT_ORDER
                .iter()
                .copied()
                .filter(|kind| match kind {
                    StrategyKind::Selector => has_text(&self.selector),
                    StrategyKind::Proximity => has_text(&self.label),
                    StrategyKind::Pattern => has_text(&self.pattern),
                    StrategyKind::Semantic => true,
                })
                .collect(),
        };

        let wants_semantic = order.contains(&StrategyKind::Semantic);
        order.retain(|kind| *kind != StrategyKind::Semantic);
        if wants_semantic && semantic_available {
            order.push(StrategyKind::Semantic);
        }
        order
    }

    /// Text embedded for semantic matching.
    pub fn description_text(&self) -> String {
        self.description
            .clone()
            .or_else(|| self.label.clone())
            .unwrap_or_else(|| self.name.replace(['_', '-'], " "))
    }
}

fn has_text(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub fields: Vec<FieldDefinition>,
    #[serde(default)]
    pub rate_limiting: RateLimitConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
}

impl Template {
    pub fn new(name: &str, fields: Vec<FieldDefinition>) -> Self {
        Self {
            name: name.to_string(),
            version: default_version(),
            fields,
            rate_limiting: RateLimitConfig::default(),
            resolver: ResolverConfig::default(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, TemplateError> {
        let template: Template = serde_json::from_str(json)?;
        template.validate()?;
        Ok(template)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, TemplateError> {
        let path = path.as_ref();
        tracing::info!("Loading template from {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Structural checks that do not depend on the pattern registry.
    pub fn validate(&self) -> Result<(), TemplateError> {
        if self.name.trim().is_empty() {
            return Err(TemplateError::Invalid("template name is empty".to_string()));
        }
        if self.fields.is_empty() {
            return Err(TemplateError::Invalid(format!("template '{}' has no fields", self.name)));
        }

        let mut names = HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(TemplateError::Invalid("field with empty name".to_string()));
            }
            if !names.insert(field.name.as_str()) {
                return Err(TemplateError::Invalid(format!("duplicate field name '{}'", field.name)));
            }
            if let Some(min) = field.min_confidence {
                if !(0.0..=1.0).contains(&min) {
                    return Err(TemplateError::Invalid(format!(
                        "field '{}' min_confidence {} is outside [0, 1]",
                        field.name, min
                    )));
                }
            }
        }

        self.rate_limiting.validate().map_err(TemplateError::Invalid)?;
        self.resolver.validate().map_err(TemplateError::Invalid)?;
        Ok(())
    }

    /// Fields whose pattern strategy cannot run against `registry`, with the
    /// reason. Resolution still proceeds; these fields report config errors.
    pub fn pattern_problems(&self, registry: &PatternRegistry) -> Vec<(String, String)> {
        self.fields
            .iter()
            .filter(|field| field.strategy_order(true).contains(&StrategyKind::Pattern))
            .filter_map(|field| match field.pattern.as_deref().map(str::trim) {
                None | Some("") => Some((field.name.clone(), "no pattern name configured".to_string())),
                Some(name) if !registry.contains(name) => {
                    Some((field.name.clone(), format!("unknown pattern '{}'", name)))
                }
                Some(_) => None,
            })
            .collect()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }
}
