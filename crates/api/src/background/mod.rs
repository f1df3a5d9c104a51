//! Long-running background tasks (retention sweeps).

pub mod retention;
