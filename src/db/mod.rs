//! Durable user storage.

pub mod models;
pub mod operations;

pub use models::{ProfileUpdate, User};
pub use operations::{MemoryUserStore, PgUserStore, UserStore};
