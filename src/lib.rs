#![allow(warnings)]

pub mod cache;
pub mod config;
pub mod connection;
pub mod errors;
pub mod mapper;
pub mod pagination;
pub mod pipeline;
pub mod resolver;
pub mod swaps;
pub mod tokens;
pub mod transport;
pub mod types;
pub mod utils;

pub use config::PipelineConfig;
pub use errors::{ FeedError, FeedResult };
pub use pipeline::{ Direction, PoolSwapFeed, TransactionPipeline };
pub use transport::{ FeedTransport, HttpTransport };
pub use types::{ FeedSnapshot, UiTransfer };
