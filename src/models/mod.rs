//! Data models

pub mod dispatch;
pub mod relay;

pub use dispatch::*;
pub use relay::*;
