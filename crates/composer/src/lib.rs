//! GraphQL schema composition: single schemas, stitching and federation,
//! run on an isolated worker pool behind a distributed result cache.

pub mod cache;
pub mod composition;
pub mod config;
pub mod contracts;
pub mod crypto;
pub mod error;
pub mod graphql;
pub mod scheduler;
pub mod serde_dur;
pub mod service;
pub mod telemetry;
pub mod types;

pub use error::{CompositionError, ErrorSource};
pub use service::{CompositionResponse, CompositionService};
pub use types::{CompositionRequest, CompositionResult, CompositionStrategy, ContractSpec, SubgraphInput};
