//! Node configuration for the mesh core.
//!
//! `MeshConfig` is plain serde data so hosts can keep it in TOML next to
//! their own settings.

mod methods;
mod types;

pub use types::{MeshConfig, MeshConfigBuilder};
