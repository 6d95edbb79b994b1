//! Driver lookup boundary.
//!
//! The topology creates components by asking a [`DriverLookup`] for the
//! factory of a component type and calling it with the descriptor.

use crate::component::{ComponentDescriptor, ComponentOps, ComponentType};
use crate::error::ComponentError;

/// Builds a component driver from its descriptor.
pub type ComponentFactory = fn(&ComponentDescriptor) -> Result<Box<dyn ComponentOps>, ComponentError>;

/// Maps component types to factories.
pub trait DriverLookup: Send + Sync {
    /// Factory for `kind`, if a driver is registered.
    fn lookup(&self, kind: ComponentType) -> Option<ComponentFactory>;
}

/// Lookup with no drivers; components must be added with
/// [`Topology::add_component`](crate::Topology::add_component).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDrivers;

impl DriverLookup for NoDrivers {
    fn lookup(&self, _kind: ComponentType) -> Option<ComponentFactory> {
        None
    }
}
