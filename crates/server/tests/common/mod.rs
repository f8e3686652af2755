//! Common test utilities and fixtures.

pub mod fixtures;
pub mod provider;
pub mod server;

#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use provider::*;
#[allow(unused_imports)]
pub use server::*;
