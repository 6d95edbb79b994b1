//! Position, xrun and event reporting toward the host.
//!
//! The engine calls a [`HostReporter`]; the message layout the host finally
//! sees belongs to the IPC layer. [`ReportLog`] records every report in
//! memory for tests and the CLI.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::format::StreamPosition;

/// Event raised by a component for the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ComponentEvent {
    /// A level detector crossed its threshold.
    LevelDetected {
        /// Peak level that triggered, normalized to full scale.
        peak: f32,
    },
    /// Driver-defined event.
    Custom {
        /// Driver-defined code.
        code: u32,
        /// Driver-defined payload.
        value: i64,
    },
}

/// Sink for host-visible notifications.
pub trait HostReporter: Send + Sync {
    /// Stream position update from a host endpoint.
    fn report_position(&self, comp_id: u32, posn: &StreamPosition);

    /// Overrun or underrun notification.
    fn report_xrun(&self, comp_id: u32, posn: &StreamPosition);

    /// Component-specific event.
    fn report_event(&self, comp_id: u32, event: ComponentEvent);
}

/// One recorded report.
#[derive(Debug, Clone, PartialEq)]
pub enum HostMessage {
    /// See [`HostReporter::report_position`].
    Position {
        /// Reporting component.
        comp_id: u32,
        /// Reported position.
        posn: StreamPosition,
    },
    /// See [`HostReporter::report_xrun`].
    Xrun {
        /// Host endpoint being notified.
        comp_id: u32,
        /// Position carrying the xrun fields.
        posn: StreamPosition,
    },
    /// See [`HostReporter::report_event`].
    Event {
        /// Reporting component.
        comp_id: u32,
        /// The event.
        event: ComponentEvent,
    },
}

/// In-memory [`HostReporter`] that keeps every message.
#[derive(Debug, Clone, Default)]
pub struct ReportLog {
    messages: Arc<Mutex<Vec<HostMessage>>>,
}

impl ReportLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all messages so far.
    pub fn messages(&self) -> Vec<HostMessage> {
        self.messages.lock().clone()
    }

    /// Removes and returns all messages so far.
    pub fn drain(&self) -> Vec<HostMessage> {
        std::mem::take(&mut *self.messages.lock())
    }

    /// Xrun messages only.
    pub fn xruns(&self) -> Vec<(u32, StreamPosition)> {
        self.messages
            .lock()
            .iter()
            .filter_map(|m| match m {
                HostMessage::Xrun { comp_id, posn } => Some((*comp_id, *posn)),
                _ => None,
            })
            .collect()
    }
}

impl HostReporter for ReportLog {
    fn report_position(&self, comp_id: u32, posn: &StreamPosition) {
        self.messages.lock().push(HostMessage::Position { comp_id, posn: *posn });
    }

    fn report_xrun(&self, comp_id: u32, posn: &StreamPosition) {
        tracing::warn!(comp_id, xrun_comp = posn.xrun_comp_id, bytes = posn.xrun_size, "xrun reported to host");
        self.messages.lock().push(HostMessage::Xrun { comp_id, posn: *posn });
    }

    fn report_event(&self, comp_id: u32, event: ComponentEvent) {
        self.messages.lock().push(HostMessage::Event { comp_id, event });
    }
}
