// src/page/mod.rs
//! Page snapshot handed to the resolver: parsed DOM, derived plain text and
//! element geometry supplied by the rendering side.
//!
//! `scraper::Html` is `!Send`, so a snapshot must be built and consumed
//! without crossing an `.await`.

use crate::utils::text::normalize_whitespace;
use once_cell::sync::Lazy;
use scraper::{node::Node, ElementRef, Html, Selector};
use std::collections::HashMap;

static ALL_ELEMENTS_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("*").expect("Failed to compile ALL_ELEMENTS_SELECTOR")
});

/// Attribute a renderer may stamp on elements: `"x,y,width,height"` in CSS px.
pub const BBOX_ATTRIBUTE: &str = "data-bbox";

const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript", "template", "head", "title"];
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header",
    "hr", "label", "li", "main", "nav", "ol", "p", "pre", "section", "table", "tbody", "td",
    "tfoot", "th", "thead", "tr", "ul",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Euclidean distance between the two box centers.
    pub fn center_distance(&self, other: &BoundingBox) -> f64 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }

    fn parse_attribute(raw: &str) -> Option<Self> {
        let parts: Vec<f64> = raw
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .ok()?;
        match parts.as_slice() {
            [x, y, w, h] if *w >= 0.0 && *h >= 0.0 => Some(Self::new(*x, *y, *w, *h)),
            _ => None,
        }
    }
}

/// Bounding boxes keyed by element ordinal (position in document order).
#[derive(Debug, Clone, Default)]
pub struct Geometry {
    boxes: HashMap<usize, BoundingBox>,
}

impl Geometry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, ordinal: usize, bbox: BoundingBox) {
        self.boxes.insert(ordinal, bbox);
    }

    pub fn get(&self, ordinal: usize) -> Option<BoundingBox> {
        self.boxes.get(&ordinal).copied()
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}

/// An element with its document-order ordinal and known geometry.
#[derive(Debug, Clone, Copy)]
pub struct IndexedElement<'a> {
    pub ordinal: usize,
    pub element: ElementRef<'a>,
    pub bbox: Option<BoundingBox>,
}

pub struct PageSnapshot {
    url: String,
    document: Html,
    text: String,
    geometry: Geometry,
}

impl PageSnapshot {
    /// Parses `html` and harvests any `data-bbox` geometry stamped on it.
    pub fn parse(url: &str, html: &str) -> Self {
        let document = Html::parse_document(html);
        let text = element_text(document.root_element());

        let mut geometry = Geometry::new();
        for (ordinal, element) in document.select(&ALL_ELEMENTS_SELECTOR).enumerate() {
            if let Some(bbox) = element.value().attr(BBOX_ATTRIBUTE).and_then(BoundingBox::parse_attribute) {
                geometry.insert(ordinal, bbox);
            }
        }
        tracing::debug!(
            "Parsed page snapshot for {} ({} chars of text, {} boxes)",
            url,
            text.len(),
            geometry.len()
        );

        Self { url: url.to_string(), document, text, geometry }
    }

    /// Merges renderer-provided geometry; explicit boxes win over attributes.
    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry.boxes.extend(geometry.boxes);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn document(&self) -> &Html {
        &self.document
    }

    /// Whitespace-normalized visible text of the whole page.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Every element in document order with its ordinal and bounding box.
    pub fn elements(&self) -> Vec<IndexedElement<'_>> {
        self.document
            .select(&ALL_ELEMENTS_SELECTOR)
            .enumerate()
            .map(|(ordinal, element)| IndexedElement {
                ordinal,
                element,
                bbox: self.geometry.get(ordinal),
            })
            .collect()
    }
}

pub fn is_hidden(element: ElementRef<'_>) -> bool {
    HIDDEN_TAGS.contains(&element.value().name())
}

/// True when the element or one of its ancestors never renders text.
pub fn is_within_hidden(element: ElementRef<'_>) -> bool {
    is_hidden(element) || element.ancestors().filter_map(ElementRef::wrap).any(is_hidden)
}

/// Normalized rendered text of an element, skipping script/style content and
/// separating block-level elements with a space.
pub fn element_text(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    collect_text(element, &mut raw);
    normalize_whitespace(&raw)
}

/// Normalized text of the element's direct text children only.
pub fn own_text(element: ElementRef<'_>) -> String {
    let raw: Vec<&str> = element
        .children()
        .filter_map(|child| match child.value() {
            Node::Text(text) => Some(&**text),
            _ => None,
        })
        .collect();
    normalize_whitespace(&raw.join(" "))
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    if is_hidden(element) {
        return;
    }
    let block = BLOCK_TAGS.contains(&element.value().name());
    if block {
        out.push(' ');
    }
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    collect_text(child_element, out);
                }
            }
            _ => {} // Ignore comments, etc.
        }
    }
    if block {
        out.push(' ');
    }
}
