//! ---
//! pw_section: "01-core-functionality"
//! pw_subsection: "module"
//! pw_type: "source"
//! pw_scope: "code"
//! pw_description: "Shared primitives and utilities for the page runtime."
//! pw_version: "v0.0.0-prealpha"
//! pw_owner: "tbd"
//! ---
//! Shared primitives for the Pagewright workspace.
//! This crate exposes configuration loading and tracing bootstrap
//! utilities consumed by the core runtime and the CLI.

pub mod config;
pub mod logging;

pub use config::{
    AppConfig, ExtensionConfig, LoadedAppConfig, LoggingConfig, PageConfig, RouteDefaults,
    StateConfig,
};
pub use logging::{init_tracing, LogFormat};
