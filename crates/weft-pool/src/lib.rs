//! Worker pools for the weft DAG engine.
//!
//! Implements the core's pool contract; the engine itself never creates
//! a pool, callers inject one.

mod blocking;

pub use blocking::BlockingPool;
