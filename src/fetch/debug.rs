// src/fetch/debug.rs
use super::{FetchedPage, PageFetcher};
use crate::patterns::PatternRegistry;
use crate::utils::error::FetchError;
use crate::utils::html_debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const MAX_SLUG_CHARS: usize = 80;

/// Wraps a fetcher and saves every fetched page twice under `debug_dir`: raw,
/// and annotated with the matches of the given patterns. Capture failures are
/// logged and never fail the fetch.
pub struct DebugCapture<F> {
    inner: F,
    debug_dir: PathBuf,
    registry: Arc<PatternRegistry>,
    patterns: Vec<String>,
}

impl<F: PageFetcher> DebugCapture<F> {
    pub fn new(inner: F, debug_dir: &Path, registry: Arc<PatternRegistry>, patterns: Vec<String>) -> Self {
        Self {
            inner,
            debug_dir: debug_dir.to_path_buf(),
            registry,
            patterns,
        }
    }

    fn capture(&self, page: &FetchedPage) -> Result<(), crate::utils::AppError> {
        std::fs::create_dir_all(&self.debug_dir)?;
        let slug = slug(&page.url);

        let raw_path = self.debug_dir.join(format!("{}_raw.html", slug));
        std::fs::write(&raw_path, &page.html)?;
        tracing::info!("Saved raw page to: {}", raw_path.display());

        let names: Vec<&str> = self.patterns.iter().map(String::as_str).collect();
        let annotated_path = self.debug_dir.join(format!("{}_annotated.html", slug));
        html_debug::create_debug_html(&page.html, &annotated_path, &self.registry, &names)?;
        Ok(())
    }
}

fn slug(url: &str) -> String {
    let slug: String = url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(MAX_SLUG_CHARS)
        .collect();
    let slug = slug.trim_matches('_').to_string();
    if slug.is_empty() {
        "page".to_string()
    } else {
        slug
    }
}

impl<F: PageFetcher> PageFetcher for DebugCapture<F> {
    async fn fetch(&self, address: &str) -> Result<FetchedPage, FetchError> {
        let page = self.inner.fetch(address).await?;
        if let Err(e) = self.capture(&page) {
            tracing::warn!("Failed to create debug HTML for {}: {}", address, e);
        }
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Static;

    impl PageFetcher for Static {
        async fn fetch(&self, address: &str) -> Result<FetchedPage, FetchError> {
            Ok(FetchedPage::new(address, "<p>Mail a@b.com</p>"))
        }
    }

    #[tokio::test]
    async fn test_captures_raw_and_annotated_pages() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = DebugCapture::new(
            Static,
            &dir.path().join("debug"),
            Arc::new(PatternRegistry::new()),
            vec!["email".to_string()],
        );
        let page = fetcher.fetch("https://example.com/team/jane").await.unwrap();
        assert_eq!(page.html, "<p>Mail a@b.com</p>");

        let raw = dir.path().join("debug/example_com_team_jane_raw.html");
        let annotated = dir.path().join("debug/example_com_team_jane_annotated.html");
        assert_eq!(std::fs::read_to_string(raw).unwrap(), "<p>Mail a@b.com</p>");
        assert!(std::fs::read_to_string(annotated).unwrap().contains("highlight-email"));
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("https://a.com/x?y=1"), "a_com_x_y_1");
        assert_eq!(slug("///"), "page");
    }
}
