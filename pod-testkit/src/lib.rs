//! Test doubles and fixtures for pod.

mod fixtures;
mod mock;

pub use fixtures::*;
pub use mock::*;
