//! Contains the building blocks the engine uses to drive time-based logic.
//!
//! The `EngineContext` keeps a collection of these components and advances
//! them on every tick of its scheduling clock.

pub mod timer;
