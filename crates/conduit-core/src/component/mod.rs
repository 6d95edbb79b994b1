//! Components: the processing units of a pipeline.
//!
//! A [`ComponentNode`] pairs graph-owned bookkeeping (id, pipeline id,
//! lifecycle state, buffer lists, negotiated format) with a driver object
//! implementing [`ComponentOps`]. The lifecycle follows the trigger state
//! machine in [`state`]; drivers never change the state themselves.

pub mod node;
pub mod ops;
pub mod state;

pub use node::{ComponentDescriptor, ComponentNode, ComponentType, EndpointType};
pub use ops::{Attribute, ComponentOps, CopyLimits, CopyType, NodeContext, PathStatus};
pub use state::{ComponentState, Transition, TriggerCmd, transition};
