// src/extractors/selector.rs
use super::{Candidate, Diagnostic, Located, LocatorStrategy, StrategyKind};
use crate::page::{element_text, PageSnapshot};
use crate::template::FieldDefinition;
use scraper::{ElementRef, Selector};

const UNIQUE_CONFIDENCE: f64 = 1.0;
const AMBIGUOUS_CONFIDENCE: f64 = 0.9;

/// Applies the field's explicit CSS selector.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectorStrategy;

impl SelectorStrategy {
    pub fn new() -> Self {
        Self
    }

    fn value_of(element: ElementRef<'_>, attribute: Option<&str>) -> String {
        match attribute {
            Some(name) => element.value().attr(name).map(str::trim).unwrap_or_default().to_string(),
            None => element_text(element),
        }
    }
}

impl LocatorStrategy for SelectorStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Selector
    }

    fn locate(&self, field: &FieldDefinition, page: &PageSnapshot) -> Located {
        let Some(raw) = field.selector.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
            return Located::empty();
        };

        let selector = match Selector::parse(raw) {
            Ok(selector) => selector,
            Err(e) => {
                tracing::warn!("Field '{}': invalid selector '{}': {}", field.name, raw, e);
                return Located::diagnostic(Diagnostic::InvalidSelector {
                    selector: raw.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let matched: Vec<ElementRef<'_>> = page.document().select(&selector).collect();
        tracing::debug!("Field '{}': selector '{}' matched {} element(s)", field.name, raw, matched.len());

        // First element in document order that actually carries a value.
        let Some((position, value)) = matched
            .iter()
            .enumerate()
            .map(|(i, el)| (i, Self::value_of(*el, field.attribute.as_deref())))
            .find(|(_, value)| !value.is_empty())
        else {
            return Located::empty();
        };

        if matched.len() == 1 {
            return Located::from_candidates(vec![Candidate::new(value, UNIQUE_CONFIDENCE, StrategyKind::Selector, position)]);
        }

        tracing::warn!(
            "Field '{}': selector '{}' is ambiguous ({} matches), using the first",
            field.name,
            raw,
            matched.len()
        );
        Located::from_candidates(vec![Candidate::new(value, AMBIGUOUS_CONFIDENCE, StrategyKind::Selector, position)])
            .with_diagnostic(Diagnostic::AmbiguousSelector {
                selector: raw.to_string(),
                matches: matched.len(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <h1 class="name">  Jane   Roe </h1>
          <ul class="offices"><li>Boston</li><li>Denver</li></ul>
          <a class="profile" href=" /people/jane-roe ">Profile</a>
          <span class="empty"></span><span class="empty">late value</span>
        </body></html>
    "#;

    fn locate(field: FieldDefinition) -> Located {
        let page = PageSnapshot::parse("https://example.com", PAGE);
        SelectorStrategy::new().locate(&field, &page)
    }

    #[test]
    fn test_unique_selector_full_confidence() {
        let located = locate(FieldDefinition::new("name").with_selector("h1.name"));
        let best = located.best().unwrap();
        assert_eq!(best.value, "Jane Roe");
        assert_eq!(best.confidence, 1.0);
        assert!(located.diagnostics.is_empty());
    }

    #[test]
    fn test_ambiguous_selector_takes_first_with_diagnostic() {
        let located = locate(FieldDefinition::new("office").with_selector("ul.offices li"));
        assert_eq!(located.candidates.len(), 1);
        assert_eq!(located.candidates[0].value, "Boston");
        assert_eq!(located.candidates[0].confidence, 0.9);
        assert_eq!(
            located.diagnostics,
            vec![Diagnostic::AmbiguousSelector { selector: "ul.offices li".to_string(), matches: 2 }]
        );
    }

    #[test]
    fn test_no_match_and_missing_selector_are_empty() {
        assert_eq!(locate(FieldDefinition::new("x").with_selector("table td")), Located::empty());
        assert_eq!(locate(FieldDefinition::new("x")), Located::empty());
    }

    #[test]
    fn test_invalid_selector_reports_diagnostic() {
        let located = locate(FieldDefinition::new("x").with_selector("div[[["));
        assert!(located.candidates.is_empty());
        assert!(located.diagnostics[0].is_config_error());
    }

    #[test]
    fn test_attribute_extraction() {
        let located = locate(FieldDefinition::new("link").with_selector("a.profile").with_attribute("href"));
        assert_eq!(located.best().unwrap().value, "/people/jane-roe");
    }

    #[test]
    fn test_skips_empty_matches() {
        let located = locate(FieldDefinition::new("x").with_selector("span.empty"));
        let best = located.best().unwrap();
        assert_eq!(best.value, "late value");
        assert_eq!(best.order, 1);
    }
}
