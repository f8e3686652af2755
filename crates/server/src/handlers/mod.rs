//! HTTP request handlers.

pub mod direct;
pub mod health;
pub mod progress;
pub mod upload;

pub use direct::*;
pub use health::*;
pub use progress::*;
pub use upload::*;
