//! Article collection: weighted query generation, the agent-fetch boundary,
//! tiered retrying fetch execution, JSON extraction, and the per-tier
//! collection orchestrator.

pub mod collector;
pub mod error;
pub mod executor;
pub mod extract;
pub mod fetcher;
pub mod prompts;
pub mod querygen;

pub use collector::{
    CollectionResult, Collector, FetchTask, SourceReport, SourceStatus, TaskMethod, TierCounts,
};
pub use error::{classify, ErrorKind, SourceError, ABORT_MARKERS};
pub use executor::{tier_retry_floor, FetchExecutor, FetchKind};
pub use fetcher::{AgentFetcher, FetchOptions, HttpAgentFetcher};
pub use querygen::{allocate_for_source, QueryGenerator, WeightedQuery};
