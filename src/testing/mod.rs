//! Testing utilities and mock implementations
//!
//! Mock stages for exercising the dispatcher and route mutator contract
//! without the reference stage implementations.

pub mod mocks;

pub use mocks::*;
