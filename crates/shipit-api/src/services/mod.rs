//! External service clients.

pub mod github;
