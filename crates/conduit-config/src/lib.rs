//! Topology descriptors for conduit pipelines.
//!
//! This crate loads the static description of a core's audio graph from
//! TOML, checks it, and builds the matching [`Topology`](conduit_core::Topology).
//!
//! # Features
//!
//! - **Topology Files**: Load and save components, buffers, pipelines and connections
//! - **Platform Limits**: Buffer size and alignment limits mapped onto `DomainConfig`
//! - **Validation**: Duplicate ids, unknown drivers, malformed connections, bad schedulers
//! - **Instantiation**: Create every object through the driver registry and complete each pipeline
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use conduit_config::{DriverRegistry, TopologyConfig};
//! use conduit_core::Services;
//!
//! let config = TopologyConfig::load("topologies/playback.toml").unwrap();
//! config.validate().unwrap();
//!
//! let services = Services::default().with_drivers(Arc::new(DriverRegistry::new()));
//! let topo = config.instantiate(services).unwrap();
//! ```

mod error;
mod topology;

/// Topology validation.
pub mod validation;

pub use error::ConfigError;
pub use topology::{
    BufferConfig, ComponentConfig, ConnectionConfig, PipelineConfig, PlatformConfig, StreamConfig, TopologyConfig,
};
pub use validation::{TopologyValidator, ValidationError, ValidationResult};

/// Re-export commonly used types from conduit-registry
pub use conduit_registry::{DriverCategory, DriverDescriptor, DriverRegistry};
