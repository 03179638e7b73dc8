//! Off-chain data feeds: market listings, swap quotes and the optional
//! distressed-position feed.

pub mod distressed;
pub mod markets;
pub mod quote;

pub use distressed::DistressedFeedClient;
pub use markets::{MarketDataClient, MarketInfo};
pub use quote::{QuoteClient, QuoteRequest, SwapQuote};
