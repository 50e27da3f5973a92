//! Settings subsystem.
//!
//! # Data Flow
//! ```text
//! settings file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (EtcdSettings__* / USE_LOCAL_CONFIG overlay)
//!     → validation.rs (semantic checks)
//!     → Settings (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - Settings are read once at startup; the served configuration is what changes
//! - All fields have defaults to allow minimal files
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_settings, ConfigError};
pub use schema::{AdminSettings, ObservabilitySettings, Settings, StoreSettings, WatchSettings};
pub use validation::{validate_settings, ValidationError};
