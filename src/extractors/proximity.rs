// src/extractors/proximity.rs
//! Label-proximity: find the element whose text is the field's label, then
//! take the nearest element carrying non-label text.
//!
//! Distance is the Euclidean distance between bounding-box centers when both
//! boxes are known. Without geometry, DOM neighbours are placed at a nominal
//! distance per sibling hop, preceding neighbours half a hop further than
//! following ones.

use super::{Candidate, Located, LocatorStrategy, StrategyKind};
use crate::page::{element_text, is_within_hidden, own_text, IndexedElement, PageSnapshot};
use crate::template::FieldDefinition;
use crate::utils::text::{normalize_label, similarity_ratio};
use scraper::ElementRef;
use std::collections::HashMap;

pub const DEFAULT_MAX_DISTANCE: f64 = 200.0;
pub const LABEL_SIMILARITY_FLOOR: f64 = 0.8;

const DOM_HOP_PX: f64 = 50.0;
const MAX_VALUE_CHARS: usize = 200;
/// Siblings of the label, then of its parent.
const NEIGHBOUR_LEVELS: usize = 2;

#[derive(Debug, Clone, Copy)]
pub struct ProximityStrategy {
    max_distance: f64,
    label_similarity_floor: f64,
}

impl Default for ProximityStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DISTANCE)
    }
}

impl ProximityStrategy {
    pub fn new(max_distance: f64) -> Self {
        Self {
            max_distance,
            label_similarity_floor: LABEL_SIMILARITY_FLOOR,
        }
    }

    /// Linear decay from 1.0 at distance 0 to 0.5 at the maximum distance;
    /// `None` beyond it.
    pub fn confidence_for(&self, distance: f64) -> Option<f64> {
        if !distance.is_finite() || distance < 0.0 || distance > self.max_distance {
            return None;
        }
        if self.max_distance <= 0.0 {
            return Some(1.0);
        }
        Some(1.0 - 0.5 * (distance / self.max_distance))
    }

    fn label_matches(&self, text: &str, wanted: &str) -> bool {
        !text.is_empty() && (text == wanted || similarity_ratio(text, wanted) >= self.label_similarity_floor)
    }

    fn is_value_text(&self, value: &str, wanted: &str) -> bool {
        !value.is_empty()
            && value.chars().count() <= MAX_VALUE_CHARS
            && !value.ends_with(':')
            && !self.label_matches(&normalize_label(value), wanted)
    }
}

/// Collects the best (closest) candidate per element ordinal.
struct Neighbourhood<'s> {
    strategy: &'s ProximityStrategy,
    wanted: &'s str,
    found: HashMap<usize, Candidate>,
}

impl<'s> Neighbourhood<'s> {
    /// Records `value` if it qualifies; returns whether it did.
    fn offer(&mut self, target: &IndexedElement<'_>, value: &str, distance: f64) -> bool {
        if !self.strategy.is_value_text(value, self.wanted) {
            return false;
        }
        let Some(confidence) = self.strategy.confidence_for(distance) else {
            tracing::trace!("Proximity candidate '{}' at {:.1}px is out of range", value, distance);
            return false;
        };
        let candidate = Candidate::new(value, confidence, StrategyKind::Proximity, target.ordinal).with_bbox(target.bbox);
        match self.found.get(&target.ordinal) {
            Some(existing) if existing.confidence >= candidate.confidence => {}
            _ => {
                self.found.insert(target.ordinal, candidate);
            }
        }
        true
    }
}

fn ordinal_of(elements: &[IndexedElement<'_>], element: ElementRef<'_>) -> Option<usize> {
    elements.iter().position(|e| e.element.id() == element.id())
}

fn is_ancestor(candidate: ElementRef<'_>, of: ElementRef<'_>) -> bool {
    of.ancestors().any(|a| a.id() == candidate.id())
}

impl LocatorStrategy for ProximityStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Proximity
    }

    fn locate(&self, field: &FieldDefinition, page: &PageSnapshot) -> Located {
        let Some(label) = field.label.as_deref() else {
            return Located::empty();
        };
        let wanted = normalize_label(label);
        if wanted.is_empty() {
            return Located::empty();
        }

        let elements = page.elements();
        let texts: Vec<String> = elements
            .iter()
            .map(|e| if is_within_hidden(e.element) { String::new() } else { element_text(e.element) })
            .collect();

        // Innermost elements whose text is the label.
        let labels: Vec<usize> = (0..elements.len())
            .filter(|&i| {
                let text = normalize_label(&texts[i]);
                self.label_matches(&text, &wanted)
                    && !elements[i]
                        .element
                        .children()
                        .filter_map(ElementRef::wrap)
                        .any(|child| normalize_label(&element_text(child)) == text)
            })
            .collect();
        if labels.is_empty() {
            tracing::debug!("Field '{}': label '{}' not found on page", field.name, label);
            return Located::empty();
        }

        let mut hood = Neighbourhood { strategy: self, wanted: &wanted, found: HashMap::new() };

        for &li in &labels {
            let label_el = elements[li];

            // Structural neighbours: siblings of the label, widening to the
            // parent's siblings only when nothing qualified closer in.
            let mut anchor = Some(label_el.element);
            for level in 0..NEIGHBOUR_LEVELS {
                let Some(current) = anchor else { break };
                let mut hit = false;
                let siblings = current
                    .next_siblings()
                    .filter_map(ElementRef::wrap)
                    .enumerate()
                    .map(|(k, el)| (el, (level + k + 1) as f64 * DOM_HOP_PX))
                    .chain(
                        current
                            .prev_siblings()
                            .filter_map(ElementRef::wrap)
                            .enumerate()
                            .map(|(k, el)| (el, (level + k + 1) as f64 * DOM_HOP_PX + DOM_HOP_PX / 2.0)),
                    );
                for (sibling, hop_distance) in siblings {
                    let Some(ord) = ordinal_of(&elements, sibling) else { continue };
                    let target = elements[ord];
                    let distance = match (label_el.bbox, target.bbox) {
                        (Some(a), Some(b)) => a.center_distance(&b),
                        _ => hop_distance,
                    };
                    hit |= hood.offer(&target, &texts[ord], distance);
                }
                anchor = current.parent().and_then(ElementRef::wrap);

                // Loose text right next to the label, e.g. <p><b>Email:</b> a@b.com</p>
                if level == 0 {
                    if let Some(parent) = anchor {
                        if let Some(ord) = ordinal_of(&elements, parent) {
                            hit |= hood.offer(&elements[ord], &own_text(parent), DOM_HOP_PX);
                        }
                    }
                }
                if hit {
                    break;
                }
            }

            // Geometric neighbours within range.
            if let Some(label_box) = label_el.bbox {
                for target in elements.iter().filter(|e| e.bbox.is_some() && e.ordinal != li) {
                    if texts[target.ordinal].is_empty()
                        || own_text(target.element).is_empty()
                        || is_ancestor(target.element, label_el.element)
                        || is_ancestor(label_el.element, target.element)
                    {
                        continue;
                    }
                    if let Some(target_box) = target.bbox {
                        hood.offer(target, &texts[target.ordinal], label_box.center_distance(&target_box));
                    }
                }
            }
        }

        tracing::debug!(
            "Field '{}': {} label match(es), {} proximity candidate(s)",
            field.name,
            labels.len(),
            hood.found.len()
        );
        Located::from_candidates(hood.found.into_values().collect())
    }
}
