// src/fetch/mod.rs
//! Page acquisition. The session only sees the `PageFetcher` trait; the
//! rendering side (browser automation, a static HTTP client, fixtures in
//! tests) plugs in behind it.

pub mod client;
pub mod debug;

use crate::page::Geometry;
use crate::utils::error::FetchError;
use std::future::Future;

pub use client::WebClient;
pub use debug::DebugCapture;

/// Raw page content plus any geometry the renderer measured.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub html: String,
    pub geometry: Option<Geometry>,
}

impl FetchedPage {
    pub fn new(url: &str, html: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            html: html.into(),
            geometry: None,
        }
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }
}

pub trait PageFetcher: Send + Sync {
    fn fetch(&self, address: &str) -> impl Future<Output = Result<FetchedPage, FetchError>> + Send;
}
