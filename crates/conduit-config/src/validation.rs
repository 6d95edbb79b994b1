//! Topology validation.
//!
//! Catches inconsistencies in a topology file before any object is created:
//! duplicate ids, unknown driver types, dangling or malformed connections,
//! bad scheduling components and unusable stream entries. All problems are
//! collected, so one run reports everything that is wrong.
//!
//! # Example
//!
//! ```rust
//! use conduit_config::{ComponentConfig, TopologyConfig, TopologyValidator};
//!
//! let mut config = TopologyConfig::default();
//! config.components.push(ComponentConfig::new(1, 1, "volume"));
//! TopologyValidator::new().validate(&config).expect("volume is a known driver");
//! ```

use std::collections::{BTreeMap, BTreeSet};

use conduit_core::{ComponentType, DriverLookup, FrameFormat, MAX_CHANNELS, StreamDirection, StreamParams};
use conduit_registry::DriverRegistry;
use thiserror::Error;

use crate::topology::{StreamConfig, TopologyConfig};

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Two objects share a host id.
    #[error("id {0} is used more than once")]
    DuplicateId(u32),

    /// No driver handles the component type.
    #[error("component {id}: unknown type '{kind}'")]
    UnknownType {
        /// Component host id.
        id: u32,
        /// Type tag from the file.
        kind: String,
    },

    /// A connection names an id that does not exist.
    #[error("connection {source_id} -> {sink_id}: no object with id {missing}")]
    DanglingConnection {
        /// Upstream host id.
        source_id: u32,
        /// Downstream host id.
        sink_id: u32,
        /// The id that was not found.
        missing: u32,
    },

    /// A connection does not join a component and a buffer.
    #[error("connection {source_id} -> {sink_id} must join a component and a buffer")]
    InvalidConnection {
        /// Upstream host id.
        source_id: u32,
        /// Downstream host id.
        sink_id: u32,
    },

    /// A buffer end is connected twice.
    #[error("buffer {buffer} has more than one {side}")]
    BufferOverconnected {
        /// Buffer host id.
        buffer: u32,
        /// `source` or `sink`.
        side: &'static str,
    },

    /// Buffer size is zero or over the platform limit.
    #[error("buffer {id}: size {size} outside 1..={max}")]
    BufferSize {
        /// Buffer host id.
        id: u32,
        /// Requested size.
        size: usize,
        /// Platform limit.
        max: usize,
    },

    /// Two pipelines share a pipeline id.
    #[error("pipeline id {0} is used by more than one pipeline")]
    PipelineIdTaken(u32),

    /// The scheduling component is missing.
    #[error("pipeline {pipeline}: scheduling component {sched} not found")]
    MissingScheduler {
        /// Pipeline host id.
        pipeline: u32,
        /// Scheduling component id.
        sched: u32,
    },

    /// The scheduling component runs on another core.
    #[error("pipeline {pipeline} on core {core}: scheduling component {sched} is on core {sched_core}")]
    SchedulerCore {
        /// Pipeline host id.
        pipeline: u32,
        /// Pipeline core.
        core: u32,
        /// Scheduling component id.
        sched: u32,
        /// Scheduling component core.
        sched_core: u32,
    },

    /// A pipeline period of zero.
    #[error("pipeline {0}: period_us must be positive")]
    ZeroPeriod(u32),

    /// A stream entry is unusable.
    #[error("stream on {host}: {reason}")]
    InvalidStream {
        /// Host endpoint id.
        host: u32,
        /// Description of the problem.
        reason: String,
    },

    /// Multiple validation errors.
    #[error("multiple validation errors: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

impl StreamConfig {
    /// Stream parameters for this entry.
    pub fn params(&self) -> ValidationResult<StreamParams> {
        let invalid = |reason: String| ValidationError::InvalidStream {
            host: self.host,
            reason,
        };
        let direction = match self.direction.to_ascii_lowercase().as_str() {
            "playback" => StreamDirection::Playback,
            "capture" => StreamDirection::Capture,
            other => return Err(invalid(format!("unknown direction '{other}'"))),
        };
        let format =
            FrameFormat::from_name(&self.format).ok_or_else(|| invalid(format!("unknown format '{}'", self.format)))?;
        if self.rate == 0 {
            return Err(invalid("rate must be positive".to_string()));
        }
        if self.channels == 0 || usize::from(self.channels) > MAX_CHANNELS {
            return Err(invalid(format!("channels must be 1..={MAX_CHANNELS}")));
        }
        Ok(StreamParams::new(direction, format, self.rate, self.channels))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Component { core: u32, ty: ComponentType },
    Buffer,
    Pipeline,
}

/// Validator for topology files.
///
/// Driver types are checked against a [`DriverRegistry`], so out-of-tree
/// drivers registered there are accepted too.
pub struct TopologyValidator {
    registry: DriverRegistry,
}

impl Default for TopologyValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl TopologyValidator {
    /// Create a validator that knows the built-in drivers.
    pub fn new() -> Self {
        Self::with_registry(DriverRegistry::new())
    }

    /// Create a validator backed by `registry`.
    pub fn with_registry(registry: DriverRegistry) -> Self {
        Self { registry }
    }

    /// Validate a whole topology.
    pub fn validate(&self, config: &TopologyConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();
        let objects = self.collect_ids(config, &mut errors);
        self.check_buffers(config, &mut errors);
        self.check_connections(config, &objects, &mut errors);
        self.check_pipelines(config, &objects, &mut errors);
        self.check_streams(config, &objects, &mut errors);

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple(errors)),
        }
    }

    fn collect_ids(&self, config: &TopologyConfig, errors: &mut Vec<ValidationError>) -> BTreeMap<u32, Kind> {
        let mut objects = BTreeMap::new();
        let mut insert = |id: u32, kind: Kind, errors: &mut Vec<ValidationError>| {
            if objects.insert(id, kind).is_some() {
                errors.push(ValidationError::DuplicateId(id));
            }
        };

        for comp in &config.components {
            match comp.kind.parse::<ComponentType>() {
                Ok(ty) if self.registry.lookup(ty).is_some() => {
                    insert(comp.id, Kind::Component { core: comp.core, ty }, errors);
                }
                _ => {
                    errors.push(ValidationError::UnknownType {
                        id: comp.id,
                        kind: comp.kind.clone(),
                    });
                    // Keep the id so connections to it are not reported twice.
                    insert(
                        comp.id,
                        Kind::Component {
                            core: comp.core,
                            ty: ComponentType::Custom(u32::MAX),
                        },
                        errors,
                    );
                }
            }
        }
        for buf in &config.buffers {
            insert(buf.id, Kind::Buffer, errors);
        }
        for pipe in &config.pipelines {
            insert(pipe.id, Kind::Pipeline, errors);
        }
        objects
    }

    fn check_buffers(&self, config: &TopologyConfig, errors: &mut Vec<ValidationError>) {
        let max = config.platform.max_buffer_bytes;
        for buf in &config.buffers {
            if buf.size == 0 || buf.size > max {
                errors.push(ValidationError::BufferSize {
                    id: buf.id,
                    size: buf.size,
                    max,
                });
            }
        }
    }

    fn check_connections(
        &self,
        config: &TopologyConfig,
        objects: &BTreeMap<u32, Kind>,
        errors: &mut Vec<ValidationError>,
    ) {
        let mut sources = BTreeSet::new();
        let mut sinks = BTreeSet::new();

        for conn in &config.connections {
            let (source_id, sink_id) = (conn.source, conn.sink);
            let (Some(source), Some(sink)) = (objects.get(&source_id), objects.get(&sink_id)) else {
                let missing = if objects.contains_key(&source_id) { sink_id } else { source_id };
                errors.push(ValidationError::DanglingConnection {
                    source_id,
                    sink_id,
                    missing,
                });
                continue;
            };

            match (source, sink) {
                // Component writes into the buffer: the component is the buffer's source.
                (Kind::Component { .. }, Kind::Buffer) => {
                    if !sources.insert(sink_id) {
                        errors.push(ValidationError::BufferOverconnected {
                            buffer: sink_id,
                            side: "source",
                        });
                    }
                }
                (Kind::Buffer, Kind::Component { .. }) => {
                    if !sinks.insert(source_id) {
                        errors.push(ValidationError::BufferOverconnected {
                            buffer: source_id,
                            side: "sink",
                        });
                    }
                }
                _ => errors.push(ValidationError::InvalidConnection { source_id, sink_id }),
            }
        }
    }

    fn check_pipelines(&self, config: &TopologyConfig, objects: &BTreeMap<u32, Kind>, errors: &mut Vec<ValidationError>) {
        let mut pipeline_ids = BTreeSet::new();
        for pipe in &config.pipelines {
            if !pipeline_ids.insert(pipe.pipeline_id) {
                errors.push(ValidationError::PipelineIdTaken(pipe.pipeline_id));
            }
            if pipe.period_us == 0 {
                errors.push(ValidationError::ZeroPeriod(pipe.id));
            }
            match objects.get(&pipe.sched_id) {
                Some(Kind::Component { core, .. }) if *core != pipe.core => {
                    errors.push(ValidationError::SchedulerCore {
                        pipeline: pipe.id,
                        core: pipe.core,
                        sched: pipe.sched_id,
                        sched_core: *core,
                    });
                }
                Some(Kind::Component { .. }) => {}
                _ => errors.push(ValidationError::MissingScheduler {
                    pipeline: pipe.id,
                    sched: pipe.sched_id,
                }),
            }
        }
    }

    fn check_streams(&self, config: &TopologyConfig, objects: &BTreeMap<u32, Kind>, errors: &mut Vec<ValidationError>) {
        for stream in &config.streams {
            match objects.get(&stream.host) {
                Some(Kind::Component {
                    ty: ComponentType::Host, ..
                }) => {
                    if let Err(err) = stream.params() {
                        errors.push(err);
                    }
                }
                _ => errors.push(ValidationError::InvalidStream {
                    host: stream.host,
                    reason: "not a host endpoint".to_string(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{BufferConfig, ComponentConfig, ConnectionConfig, PipelineConfig};

    fn buffer(id: u32, size: usize) -> BufferConfig {
        BufferConfig {
            id,
            pipeline_id: 1,
            core: 0,
            size,
            shared: false,
        }
    }

    fn pipeline(id: u32, pipeline_id: u32, sched_id: u32) -> PipelineConfig {
        PipelineConfig {
            id,
            pipeline_id,
            sched_id,
            core: 0,
            period_us: 1000,
            priority: 0,
            timer_driven: true,
        }
    }

    fn chain() -> TopologyConfig {
        TopologyConfig {
            components: vec![ComponentConfig::new(1, 1, "host"), ComponentConfig::new(3, 1, "dai")],
            buffers: vec![buffer(2, 384)],
            pipelines: vec![pipeline(4, 1, 3)],
            connections: vec![ConnectionConfig { source: 1, sink: 2 }, ConnectionConfig { source: 2, sink: 3 }],
            ..TopologyConfig::default()
        }
    }

    fn stream(host: u32) -> StreamConfig {
        StreamConfig {
            host,
            direction: "capture".to_string(),
            rate: 16000,
            channels: 2,
            format: "s16le".to_string(),
        }
    }

    #[test]
    fn test_valid_chain() {
        assert_eq!(TopologyValidator::new().validate(&chain()), Ok(()));
    }

    #[test]
    fn test_duplicate_ids_across_kinds() {
        let mut config = chain();
        config.buffers.push(buffer(3, 64));
        assert_eq!(config.validate(), Err(ValidationError::DuplicateId(3)));
    }

    #[test]
    fn test_unknown_type() {
        let mut config = chain();
        config.components.push(ComponentConfig::new(9, 1, "reverb"));
        assert!(matches!(config.validate(), Err(ValidationError::UnknownType { id: 9, .. })));
    }

    #[test]
    fn test_component_to_component_is_rejected() {
        let mut config = chain();
        config.connections.push(ConnectionConfig { source: 1, sink: 3 });
        assert_eq!(
            config.validate(),
            Err(ValidationError::InvalidConnection { source_id: 1, sink_id: 3 })
        );
    }

    #[test]
    fn test_dangling_connection_names_missing_id() {
        let mut config = chain();
        config.connections.push(ConnectionConfig { source: 2, sink: 77 });
        assert_eq!(
            config.validate(),
            Err(ValidationError::DanglingConnection {
                source_id: 2,
                sink_id: 77,
                missing: 77
            })
        );
    }

    #[test]
    fn test_buffer_end_connected_twice() {
        let mut config = chain();
        config.components.push(ComponentConfig::new(5, 1, "volume"));
        config.connections.push(ConnectionConfig { source: 5, sink: 2 });
        assert_eq!(
            config.validate(),
            Err(ValidationError::BufferOverconnected {
                buffer: 2,
                side: "source"
            })
        );
    }

    #[test]
    fn test_scheduler_checks() {
        let mut config = chain();
        config.pipelines[0].sched_id = 2;
        assert!(matches!(config.validate(), Err(ValidationError::MissingScheduler { sched: 2, .. })));

        let mut config = chain();
        config.components[1].core = 1;
        assert!(matches!(config.validate(), Err(ValidationError::SchedulerCore { sched_core: 1, .. })));
    }

    #[test]
    fn test_errors_are_collected() {
        let mut config = chain();
        config.buffers[0].size = 0;
        config.pipelines.push(pipeline(6, 1, 3));
        let Err(ValidationError::Multiple(errors)) = config.validate() else {
            panic!("expected several errors");
        };
        assert!(errors.contains(&ValidationError::BufferSize { id: 2, size: 0, max: 65536 }));
        assert!(errors.contains(&ValidationError::PipelineIdTaken(1)));
    }

    #[test]
    fn test_stream_params() {
        let params = stream(1).params().unwrap();
        assert_eq!(params.direction, StreamDirection::Capture);
        assert_eq!(params.frame_bytes(), 4);

        let mut bad = stream(1);
        bad.format = "dsd".to_string();
        assert!(matches!(bad.params(), Err(ValidationError::InvalidStream { host: 1, .. })));
    }

    #[test]
    fn test_stream_must_name_a_host() {
        let mut config = chain();
        config.streams.push(stream(3));
        assert!(matches!(config.validate(), Err(ValidationError::InvalidStream { host: 3, .. })));
        config.streams[0].host = 1;
        assert_eq!(config.validate(), Ok(()));
    }
}
