//! eo-assign: bulk-load preparation for field observations
//!
//! This crate provides:
//! - TOML configuration (engine settings, token generator, policy columns)
//! - CSV readers for observations, reference records and the separation table
//! - CSV writers for assigned observations and per-observation errors

pub mod config;
pub mod io;

// Re-exports for convenience
pub use config::{default_config_path, load_config, Config, TokenConfig, TokenStyle};
pub use io::{
    read_assignments, read_observations, read_policy, read_references, write_assignments,
    write_errors, AssignedRow, GeometryJson,
};
