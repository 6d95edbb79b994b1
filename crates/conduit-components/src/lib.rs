//! Conduit Components - component drivers
//!
//! This crate provides the stock drivers built on conduit-core:
//!
//! - [`HostEndpoint`] - Moves audio between the host DMA ring and the pipeline
//! - [`DaiEndpoint`] - Hardware interface endpoint, raises xruns
//! - [`Volume`] - Fixed gain stage
//! - [`RateConverter`] - Linear-interpolating sample-rate converter
//! - [`Mixer`] - Sums several sources into one sink
//! - [`LevelDetector`] - Notifies the host when the signal crosses a threshold
//!
//! Every driver is built from a [`ComponentDescriptor`](conduit_core::ComponentDescriptor)
//! and reads its options from the descriptor's string parameters.
//!
//! ## Example
//!
//! ```rust,ignore
//! use conduit_core::{ComponentDescriptor, ComponentType};
//! use conduit_components::Volume;
//!
//! let desc = ComponentDescriptor::new(12, 15, ComponentType::Volume).with_param("gain_db", "-6");
//! let volume = Volume::new(&desc)?;
//! topo.add_component(&desc, Box::new(volume))?;
//! ```

mod dma;

pub mod dai;
pub mod detect;
pub mod host;
pub mod mixer;
pub mod sample;
pub mod src;
pub mod volume;

// Re-export main types at crate root
pub use dai::DaiEndpoint;
pub use detect::LevelDetector;
pub use host::HostEndpoint;
pub use mixer::Mixer;
pub use src::RateConverter;
pub use volume::Volume;
