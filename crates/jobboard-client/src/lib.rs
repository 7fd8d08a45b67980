pub mod client;
pub mod error;
pub mod limiter;
pub mod types;

pub use client::JobBoardClient;
pub use error::{JobBoardError, TerminalKind};
pub use limiter::RateLimiter;
