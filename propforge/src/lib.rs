//! # Propforge - Property-Based Testing for Rust
//!
//! Propforge is a property-based testing engine: declarative arbitraries
//! describe input domains, the runner samples them against a predicate, and
//! failing inputs are shrunk to minimal, seed-replayable counterexamples.
//!
//! ## Quick Start
//!
//! ```rust
//! use propforge::{Parameters, assert_property, integer, property};
//!
//! // Addition over the generated domain is commutative.
//! let prop = property((integer(0i64, 1000), integer(0i64, 1000)), |pair| {
//!     pair.0 + pair.1 == pair.1 + pair.0
//! });
//! assert_property(&prop, Parameters::default().with_seed(42));
//! ```
//!
//! On failure the panic message embeds `seed=…` and `path="…"`; passing both
//! back through [`Parameters`] replays the exact counterexample without
//! re-running the search.

// Public modules
pub mod arbitrary;
pub mod collection;
pub mod combinator;
pub mod config;
pub mod decorators;
pub mod entity_graph;
pub mod error;
pub mod primitives;
pub mod property;
pub mod rng;
pub mod runner;
pub mod scheduler;
mod shrink;
pub mod statistics;
pub mod stream;
pub mod value;
#[cfg(feature = "serde")]
pub mod worker;

// Re-export the main public API
pub use arbitrary::{Arbitrary, BiasFactor, BoxedArbitrary};
pub use collection::{
    ArrayArbitrary, RecordArbitrary, UniqueArrayArbitrary, array, record, unique_array,
};
pub use combinator::{
    Chain, ConstantArbitrary, Filter, Frequency, Map, MapUnmap, constant, constant_from,
    frequency, oneof,
};
pub use config::{Parameters, Reporter, Verbosity};
pub use decorators::{IgnoreEqualValuesProperty, TimeoutProperty, UnbiasedProperty};
pub use entity_graph::{
    Arity, EntityGraph, EntityGraphArbitrary, EntityGraphBuilder, Link, LinkStrategy,
    RelationSpec,
};
pub use error::{PropertyError, pre, pre_labeled};
pub use primitives::{
    BooleanArbitrary, CharArbitrary, FloatArbitrary, FloatConstraints, IntegerArbitrary,
    SizeConstraints, StringArbitrary, boolean, character, float, integer, nat, string, string_of,
};
pub use property::{
    AsyncProperty, AsyncPropertyDef, Property, PropertyDef, RunOutcome, Testable, async_property,
    property,
};
pub use rng::RandomSource;
pub use runner::{
    ExecutionStatus, ExecutionTree, RunDetails, assert_async_property, assert_property, check,
    check_async,
};
pub use scheduler::{ScheduledFuture, Scheduler};
pub use statistics::{Distribution, sample, sample_with_seed, statistics, statistics_with_seed};
pub use stream::Stream;
pub use value::{ShrinkContext, Value};
#[cfg(feature = "serde")]
pub use worker::{PredicateRequest, PredicateResponse, WorkerStatus};
