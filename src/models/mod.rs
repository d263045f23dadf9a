//! Domain model module declarations.

pub mod continuity;
pub mod mutation;
pub mod outcome;
pub mod thread;
