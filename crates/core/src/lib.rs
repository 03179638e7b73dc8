//! Pipeline core: configuration, persistent state, borrower discovery,
//! health screening, opportunity sizing and execution coordination.

pub mod cache;
pub mod config;
pub mod discovery;
pub mod executor;
pub mod markets;
pub mod pipeline;
pub mod reserves;
pub mod screener;
pub mod sizer;
pub mod store;

pub use cache::TtlCache;
pub use config::{BotConfig, DeploymentConfig};
pub use discovery::{BorrowerDiscovery, LogSource};
pub use executor::{
    AttemptOutcome, ChainExecutionBackend, ExecutionBackend, ExecutionCoordinator,
};
pub use markets::MarketRegistry;
pub use pipeline::Pipeline;
pub use reserves::{Reserve, ReserveIndex};
pub use screener::{HealthScreener, PoolSolvencyOracle, ScreenReport, ScreenedWallet};
pub use sizer::{ChainPositionSource, Opportunity, OpportunitySizer, PositionSource};
pub use store::{CheckpointStore, ScanCheckpoint};
