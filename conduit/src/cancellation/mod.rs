//! Cooperative cancellation for node loops.

mod token;

pub use token::CancellationToken;
