//! Read gateway over market-structure memory.
//!
//! Every read is a closed-set typed query. Parameters pass evaluative-language
//! and implicit-time guards, are checked against the query's declared field
//! contract, and are answered by a store lookup or a pure structural
//! primitive. Results are scanned for evaluative fields and deterministically
//! ordered before they leave [`AccessLayer::execute`].
//!
//! Zero I/O: persistence and transport live in other crates.

pub mod access;
pub mod dispatch;
pub mod error;
pub mod graph;
pub mod guard;
pub mod node;
pub mod normalize;
pub mod primitives;
pub mod query;
pub mod schema;
pub mod snapshot;
pub mod store;

pub use access::{AccessLayer, QueryResponse};
pub use error::{AccessError, PrimitiveError, PrimitiveResult, Result};
pub use graph::MemoryGraph;
pub use guard::{Guard, GuardPolicy, Params};
pub use node::{LifecycleState, MemoryNode, StateTransition, TokenObservation};
pub use normalize::Normalizer;
pub use query::{Query, QueryBuilder};
pub use schema::{FieldSpec, FieldType, QueryKind, ResultShape};
pub use snapshot::{CURRENT_VERSION, export_json, import_json};
pub use store::{LocalContextView, MemoryStore, NodeFilter, ViewKind};
