//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, PascalCase keys)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → shared via Arc inside the ServerContext
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only certificates are hot-swapped
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::ServerConfig;
