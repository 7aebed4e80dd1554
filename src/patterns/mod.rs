// src/patterns/mod.rs
//! Named regex extractors with validators, normalizers and context keywords.
//!
//! The registry is built once (built-ins registered at construction), extended
//! with custom patterns during setup, and then shared read-only behind an
//! `Arc` by every resolver. Runtime registration after sharing goes through
//! `SharedPatternRegistry`, which puts the registry behind an `RwLock`.

mod builtin;

use crate::utils::error::PatternError;
use crate::utils::text::context_window;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Default number of characters inspected on each side of a match.
pub const DEFAULT_CONTEXT_WINDOW: usize = 50;
/// Floor applied to context scores so valid matches are only deprioritized.
pub const MIN_CONTEXT_SCORE: f64 = 0.1;

pub type Validator = Arc<dyn Fn(&str) -> bool + Send + Sync>;
pub type Normalizer = Arc<dyn Fn(&str) -> String + Send + Sync>;

#[derive(Clone)]
pub struct PatternDefinition {
    name: String,
    regex: Regex,
    validator: Option<Validator>,
    normalizer: Option<Normalizer>,
    context_keywords: Vec<String>,
    priority: i32,
}

impl fmt::Debug for PatternDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternDefinition")
            .field("name", &self.name)
            .field("regex", &self.regex.as_str())
            .field("validator", &self.validator.is_some())
            .field("normalizer", &self.normalizer.is_some())
            .field("context_keywords", &self.context_keywords)
            .field("priority", &self.priority)
            .finish()
    }
}

impl PatternDefinition {
    /// Compiles `pattern`. A named group `value` narrows the captured value;
    /// otherwise the whole match is used.
    pub fn new(name: &str, pattern: &str) -> Result<Self, PatternError> {
        let regex = Regex::new(pattern).map_err(|source| PatternError::InvalidRegex {
            name: name.to_string(),
            source,
        })?;
        Ok(Self {
            name: name.to_string(),
            regex,
            validator: None,
            normalizer: None,
            context_keywords: Vec::new(),
            priority: 0,
        })
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    pub fn with_context_keywords(mut self, keywords: Vec<String>) -> Self {
        self.context_keywords = keywords;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn context_keywords(&self) -> &[String] {
        &self.context_keywords
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Every non-overlapping match whose captured value passes the validator,
    /// in order of appearance. A rejected match does not stop the scan.
    fn matches<'t>(&'t self, text: &'t str) -> impl Iterator<Item = PatternMatch> + 't {
        self.regex.captures_iter(text).filter_map(move |caps| {
            let whole = caps.get(0)?;
            let captured = caps.name("value").unwrap_or(whole);
            let raw = captured.as_str();
            if let Some(validator) = &self.validator {
                if !validator(raw) {
                    tracing::trace!("Pattern '{}' rejected '{}' at {}", self.name, raw, captured.start());
                    return None;
                }
            }
            let value = match &self.normalizer {
                Some(normalize) => normalize(raw),
                None => raw.to_string(),
            };
            Some(PatternMatch {
                value,
                raw: raw.to_string(),
                start: captured.start(),
                end: captured.end(),
            })
        })
    }
}

/// A validated match; `start`/`end` are byte offsets into the scanned text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    pub value: String,
    pub raw: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextMatch {
    pub matched: PatternMatch,
    pub context: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMatch {
    pub matched: PatternMatch,
    pub score: f64,
}

/// Fraction of `keywords` found (case-insensitively) in `context`, floored at
/// `MIN_CONTEXT_SCORE`. No keywords means full confidence.
pub fn context_score(context: &str, keywords: &[String]) -> f64 {
    if keywords.is_empty() {
        return 1.0;
    }
    let haystack = context.to_lowercase();
    let found = keywords
        .iter()
        .filter(|keyword| haystack.contains(&keyword.to_lowercase()))
        .count();
    (found as f64 / keywords.len() as f64).max(MIN_CONTEXT_SCORE)
}

#[derive(Debug, Clone)]
pub struct PatternRegistry {
    patterns: HashMap<String, PatternDefinition>,
}

impl Default for PatternRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternRegistry {
    /// Registry pre-populated with the built-in patterns.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        for definition in builtin::builtin_patterns() {
            registry.patterns.insert(definition.name.clone(), definition);
        }
        tracing::debug!("Pattern registry initialized with {} built-in patterns", registry.patterns.len());
        registry
    }

    pub fn empty() -> Self {
        Self { patterns: HashMap::new() }
    }

    /// Compiles and registers a custom pattern. Fails on a name clash.
    pub fn register(
        &mut self,
        name: &str,
        pattern: &str,
        validator: Option<Validator>,
        context_keywords: Vec<String>,
        priority: i32,
    ) -> Result<(), PatternError> {
        let mut definition = PatternDefinition::new(name, pattern)?
            .with_context_keywords(context_keywords)
            .with_priority(priority);
        definition.validator = validator;
        self.register_definition(definition, false)
    }

    /// Registers a prepared definition; `overwrite` replaces an existing one.
    pub fn register_definition(
        &mut self,
        definition: PatternDefinition,
        overwrite: bool,
    ) -> Result<(), PatternError> {
        if !overwrite && self.patterns.contains_key(&definition.name) {
            return Err(PatternError::DuplicatePattern(definition.name));
        }
        tracing::info!("Registered pattern '{}' (priority {})", definition.name, definition.priority);
        self.patterns.insert(definition.name.clone(), definition);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&PatternDefinition, PatternError> {
        self.patterns
            .get(name)
            .ok_or_else(|| PatternError::UnknownPattern(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.patterns.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Definitions ordered by priority (highest first), then name.
    pub fn definitions(&self) -> Vec<&PatternDefinition> {
        let mut all: Vec<&PatternDefinition> = self.patterns.values().collect();
        all.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name)));
        all
    }

    pub fn extract_first(&self, text: &str, name: &str) -> Result<Option<PatternMatch>, PatternError> {
        Ok(self.lookup(name)?.matches(text).next())
    }

    pub fn extract_all(&self, text: &str, name: &str) -> Result<Vec<PatternMatch>, PatternError> {
        Ok(self.lookup(name)?.matches(text).collect())
    }

    /// First valid match together with `window` characters of context on
    /// each side.
    pub fn extract_with_context(
        &self,
        text: &str,
        name: &str,
        window: usize,
    ) -> Result<Option<ContextMatch>, PatternError> {
        Ok(self.extract_first(text, name)?.map(|matched| {
            let context = context_window(text, matched.start, matched.end, window).to_string();
            ContextMatch { matched, context }
        }))
    }

    /// All valid matches scored against `keywords` (the pattern's own
    /// keywords when empty), highest score first. Equal scores keep order of
    /// appearance.
    pub fn extract_ranked(
        &self,
        text: &str,
        name: &str,
        keywords: &[String],
        window: usize,
    ) -> Result<Vec<ScoredMatch>, PatternError> {
        let definition = self.lookup(name)?;
        let keywords = if keywords.is_empty() {
            definition.context_keywords()
        } else {
            keywords
        };

        let mut scored: Vec<ScoredMatch> = definition
            .matches(text)
            .map(|matched| {
                let context = context_window(text, matched.start, matched.end, window);
                let score = context_score(context, keywords);
                tracing::trace!("Pattern '{}' match '{}' scored {:.2}", name, matched.value, score);
                ScoredMatch { matched, score }
            })
            .collect();
        // sort_by is stable, so ties stay in document order
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(scored)
    }
}

/// Registry handle for callers that need to register patterns while
/// resolvers may be reading. Writers take the lock exclusively.
#[derive(Debug, Clone, Default)]
pub struct SharedPatternRegistry {
    inner: Arc<RwLock<PatternRegistry>>,
}

impl SharedPatternRegistry {
    pub fn new(registry: PatternRegistry) -> Self {
        Self { inner: Arc::new(RwLock::new(registry)) }
    }

    pub fn register_definition(
        &self,
        definition: PatternDefinition,
        overwrite: bool,
    ) -> Result<(), PatternError> {
        let mut guard = self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.register_definition(definition, overwrite)
    }

    /// Runs `f` against the registry under a read lock.
    pub fn read<R>(&self, f: impl FnOnce(&PatternRegistry) -> R) -> R {
        let guard = self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&guard)
    }

    /// Copies the current registry out for lock-free use by a session.
    pub fn snapshot(&self) -> Arc<PatternRegistry> {
        Arc::new(self.read(|registry| registry.clone()))
    }
}
