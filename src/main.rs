// src/main.rs
use clap::Parser;
use field_resolver::extractors::HashedNgramEmbedder;
use field_resolver::fetch::client::DEFAULT_USER_AGENT;
use field_resolver::fetch::{DebugCapture, PageFetcher, WebClient};
use field_resolver::limiter::{cancel_pair, CancelToken, RateLimitConfig, PRESETS};
use field_resolver::patterns::PatternRegistry;
use field_resolver::resolver::Resolver;
use field_resolver::session::{ResolutionSession, SessionReport};
use field_resolver::storage::RecordStore;
use field_resolver::template::Template;
use field_resolver::utils::{self, AppError};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Resolve template fields on a batch of pages, rate limited per domain
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Template JSON file describing the fields to resolve
    #[arg(short, long, env = "FIELD_RESOLVER_TEMPLATE")]
    template: PathBuf,

    /// Page URLs or local HTML files
    #[arg(required = true)]
    pages: Vec<String>,

    /// Output directory for records and run metadata
    #[arg(short, long, default_value = "./output")]
    output_dir: String,

    /// Number of pages resolved concurrently
    #[arg(short, long, default_value = "1")]
    workers: usize,

    /// Rate limit preset overriding the template (conservative, moderate, aggressive, respectful_bot)
    #[arg(long)]
    rate_preset: Option<String>,

    /// Maximum seconds to wait for a rate limit token (0 waits indefinitely)
    #[arg(long)]
    timeout: Option<f64>,

    /// Default acceptance threshold for resolved values
    #[arg(long)]
    min_confidence: Option<f64>,

    /// Run every strategy and keep the best candidate instead of stopping early
    #[arg(long)]
    evaluate_all: bool,

    /// Enable semantic matching with the built-in embedder
    #[arg(long)]
    semantic: bool,

    /// User-Agent sent with page requests
    #[arg(long, env = "FIELD_RESOLVER_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    user_agent: String,

    /// Debug mode - save raw and annotated HTML for every fetched page
    #[arg(short, long)]
    debug: bool,
}

fn apply_overrides(template: &mut Template, args: &Args) -> Result<(), AppError> {
    if let Some(name) = &args.rate_preset {
        let preset = RateLimitConfig::preset(name).ok_or_else(|| {
            AppError::Config(format!("Unknown rate preset '{}' (expected one of: {})", name, PRESETS.join(", ")))
        })?;
        tracing::info!("Using rate preset '{}': {:?}", name, preset);
        template.rate_limiting = RateLimitConfig {
            timeout_seconds: template.rate_limiting.timeout_seconds,
            ..preset
        };
    }
    if let Some(timeout) = args.timeout {
        template.rate_limiting.timeout_seconds = timeout;
    }
    if let Some(min_confidence) = args.min_confidence {
        template.resolver.min_confidence = min_confidence;
    }
    if args.evaluate_all {
        template.resolver.evaluate_all = true;
    }
    template.validate()?;
    Ok(())
}

/// Pattern names worth highlighting in debug output: those the template
/// uses, or every registered pattern when it uses none.
fn debug_patterns(template: &Template, registry: &PatternRegistry) -> Vec<String> {
    let mut names: Vec<String> = template
        .fields
        .iter()
        .filter_map(|f| f.pattern.clone())
        .filter(|name| registry.contains(name))
        .collect();
    names.sort();
    names.dedup();
    if names.is_empty() {
        names = registry.definitions().iter().map(|d| d.name().to_string()).collect();
    }
    names
}

async fn run_session<F: PageFetcher + 'static>(
    template: Template,
    resolver: Resolver,
    fetcher: F,
    cancel: CancelToken,
    pages: &[String],
    workers: usize,
) -> SessionReport {
    let session = ResolutionSession::new(template, resolver, fetcher).with_cancel(cancel);
    if workers > 1 {
        session.run_concurrent(pages, workers).await
    } else {
        session.run(pages).await
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Setup Logging (reads RUST_LOG env var)
    utils::logging::setup_logging();

    // 2. Parse CLI Arguments
    let args = Args::parse();
    tracing::info!("Starting processing for args: {:?}", args);

    // 3. Load template and apply command-line overrides
    let mut template = Template::from_path(&args.template)?;
    apply_overrides(&mut template, &args)?;
    tracing::info!(
        "Template '{}' v{} with {} field(s)",
        template.name,
        template.version,
        template.fields.len()
    );

    // 4. Build the pattern registry and resolver
    let registry = Arc::new(PatternRegistry::new());
    for (field, problem) in template.pattern_problems(&registry) {
        tracing::warn!("Field '{}': {}", field, problem);
    }
    let mut resolver = Resolver::new(Arc::clone(&registry), template.resolver.clone());
    if args.semantic {
        tracing::info!("Semantic matching enabled");
        resolver = resolver.with_embedder(Arc::new(HashedNgramEmbedder::default()));
    }

    // 5. Initialize storage
    let store = RecordStore::new(&args.output_dir)?;

    // 6. Ctrl-C cancels pending rate-limit waits and fetches
    let (cancel_handle, cancel) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling remaining pages");
            cancel_handle.cancel();
        }
    });

    // 7. Resolve pages
    let client = WebClient::new(&args.user_agent)?;
    let report = if args.debug {
        let debug_dir = Path::new(&args.output_dir).join("debug");
        let patterns = debug_patterns(&template, &registry);
        let fetcher = DebugCapture::new(client, &debug_dir, Arc::clone(&registry), patterns);
        run_session(template, resolver, fetcher, cancel, &args.pages, args.workers).await
    } else {
        run_session(template, resolver, client, cancel, &args.pages, args.workers).await
    };

    // 8. Save results
    match store.save_records(&report) {
        Ok(path) => tracing::info!("Saved records to: {}", path.display()),
        Err(e) => tracing::error!("Failed to save records: {}", e),
    }
    match store.save_run_metadata(&report) {
        Ok(path) => tracing::info!("Saved run metadata to: {}", path.display()),
        Err(e) => tracing::error!("Failed to save run metadata: {}", e),
    }

    let resolved = report.resolved_pages();
    let failed = report.failed_pages();
    tracing::info!(
        "Processing finished. Pages resolved: {}, failed: {}, cancelled: {}, fields resolved: {}",
        resolved,
        failed,
        report.cancelled_pages(),
        report.resolved_fields()
    );

    if resolved == 0 && failed > 0 {
        return Err(AppError::Processing(format!("Failed to resolve any of {} page(s)", failed)));
    }

    Ok(())
}
