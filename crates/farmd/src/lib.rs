//! farmd library - exposes the HTTP layer for testing.

pub mod routes;
pub mod server;
pub mod session;

pub use server::{router, AppState};
