// src/lib.rs
//! Template-driven field resolution for scraped pages, with per-domain rate
//! limiting of page requests.

pub mod extractors;
pub mod fetch;
pub mod limiter;
pub mod page;
pub mod patterns;
pub mod resolver;
pub mod session;
pub mod storage;
pub mod template;
pub mod utils;

pub use extractors::{Candidate, Diagnostic, Embedder, HashedNgramEmbedder, LocatorStrategy, StrategyKind};
pub use fetch::{FetchedPage, PageFetcher, WebClient};
pub use limiter::{cancel_pair, domain_key, CancelHandle, CancelToken, DomainRateLimiter, RateLimitConfig};
pub use page::{BoundingBox, Geometry, PageSnapshot};
pub use patterns::{PatternDefinition, PatternRegistry, SharedPatternRegistry};
pub use resolver::{FieldResolution, PageResolution, ResolutionStatus, Resolver, ResolverConfig};
pub use session::{PageOutcome, PageRecord, ResolutionSession, SessionReport};
pub use template::{FieldDefinition, Template};
pub use utils::AppError;
