pub mod access;
pub mod directory;
pub mod metrics;
pub mod secret;
pub mod session;
pub mod session_store;
pub mod token;
