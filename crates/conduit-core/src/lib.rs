//! Conduit Core - audio pipeline engine for DSP firmware
//!
//! This crate moves audio between processing components through ring
//! buffers, on a fixed period, with overrun and underrun recovery.
//!
//! # Core Abstractions
//!
//! ## Buffers
//!
//! - [`CircularBuffer`] - Byte ring with aligned storage and overwrite-on-full semantics
//! - [`SharedBuffer`] - Lock-guarded ring that announces every transaction to a [`Notifier`]
//!
//! ## Components
//!
//! - [`ComponentOps`] - Object-safe trait implemented by every component driver
//! - [`ComponentNode`] - Driver plus graph bookkeeping and the trigger state machine
//! - [`NodeContext`] - What a driver sees of its node and buffers during a hook
//!
//! ## Pipelines
//!
//! - [`Topology`] - Arena of components, buffers and pipelines on one core
//! - [`PipelineGraph`] - Runtime record of one pipeline (endpoints, task, xrun state)
//!
//! Every pipeline operation is a depth-first walk over buffer links,
//! parameterized by direction: parameter negotiation, prepare, trigger,
//! reset, copy, timestamping and xrun reporting.
//!
//! ## Collaborators
//!
//! The engine never reaches for globals. The scheduler, the notification
//! bus, the host reporter, the inter-core router and the driver lookup are
//! traits handed in through [`Services`]. Each has an in-memory
//! implementation suitable for tests and simulation:
//!
//! - [`ManualScheduler`] - Deterministic scheduler driven by explicit clock advances
//! - [`NotificationBus`] - Synchronous publish/subscribe
//! - [`ReportLog`] - Records host notifications
//! - [`LocalOnly`] - Single-core router
//!
//! # Example
//!
//! ```rust,ignore
//! use conduit_core::{DomainConfig, ManualScheduler, Services, Topology, TriggerCmd};
//!
//! let sched = ManualScheduler::new();
//! let mut topo = Topology::new(DomainConfig::default(), Services::default().with_scheduler(sched.clone()));
//!
//! // ... create components and buffers, connect, new_pipeline, complete ...
//! topo.configure_params(graph, host, &params)?;
//! topo.prepare(graph, host)?;
//! topo.trigger(graph, host, TriggerCmd::Start)?;
//!
//! // Each advance runs every task that came due.
//! sched.advance(&mut topo, 1000);
//! ```
//!
//! # Design Principles
//!
//! - **Handles, not pointers**: nodes, buffers and pipelines are arena slots
//! - **No allocation in the copy path**: buffers and scratch space are sized at creation or prepare
//! - **Errors are values**: every failure surfaces as a typed error, allocation failure included

pub mod buffer;
pub mod component;
pub mod config;
pub mod driver;
pub mod error;
pub mod format;
pub mod notify;
pub mod pipeline;
pub mod report;
pub mod route;
pub mod schedule;
pub mod shared;
pub mod topology;

// Re-export main types at crate root
pub use buffer::{BufferCaps, CircularBuffer, DEFAULT_ALIGNMENT, HEAP_BUFFER_SIZE, Transaction};
pub use component::{
    Attribute, ComponentDescriptor, ComponentNode, ComponentOps, ComponentState, ComponentType, CopyLimits,
    CopyType, EndpointType, NodeContext, PathStatus, Transition, TriggerCmd, transition,
};
pub use config::DomainConfig;
pub use driver::{ComponentFactory, DriverLookup, NoDrivers};
pub use error::{BufferError, ComponentError, PipelineError, RouteError, ScheduleError};
pub use format::{
    FrameFormat, MAX_CHANNELS, StreamDirection, StreamParams, StreamPosition, WalkDirection, period_frames,
};
pub use notify::{BufferEvent, NotificationBus, Notifier, NotifyScope, SubscriptionId};
pub use pipeline::{PipelineDescriptor, PipelineGraph};
pub use report::{ComponentEvent, HostMessage, HostReporter, ReportLog};
pub use route::{CoreRouter, LocalOnly, RemoteRequest};
pub use schedule::{ManualScheduler, Scheduler, TaskId, TaskKind, TaskSpec, TaskState};
pub use shared::SharedBuffer;
pub use topology::{
    BufferDescriptor, BufferId, BufferSlot, GraphId, MAX_RECOVERY_FAILURES, NodeId, ObjectRef, Services, Topology,
};
