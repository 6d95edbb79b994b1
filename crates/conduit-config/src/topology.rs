//! Topology file format and instantiation.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use conduit_core::{
    BufferDescriptor, ComponentDescriptor, DEFAULT_ALIGNMENT, DomainConfig, HEAP_BUFFER_SIZE, ObjectRef,
    PipelineDescriptor, PipelineError, Services, Topology, WalkDirection,
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::validation::{TopologyValidator, ValidationError};

/// Platform limits, mapped onto [`DomainConfig`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlatformConfig {
    /// Core the topology runs on.
    #[serde(default)]
    pub core: u32,
    /// Largest buffer that may be allocated.
    #[serde(default = "default_max_buffer_bytes")]
    pub max_buffer_bytes: usize,
    /// Buffer storage alignment.
    #[serde(default = "default_buffer_align")]
    pub buffer_align: usize,
    /// Cross-core request timeout in microseconds.
    #[serde(default = "default_forward_timeout_us")]
    pub forward_timeout_us: u64,
}

fn default_max_buffer_bytes() -> usize {
    HEAP_BUFFER_SIZE
}

fn default_buffer_align() -> usize {
    DEFAULT_ALIGNMENT
}

fn default_forward_timeout_us() -> u64 {
    1000
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            core: 0,
            max_buffer_bytes: default_max_buffer_bytes(),
            buffer_align: default_buffer_align(),
            forward_timeout_us: default_forward_timeout_us(),
        }
    }
}

impl PlatformConfig {
    /// Domain configuration for these limits.
    pub fn domain(&self) -> DomainConfig {
        DomainConfig {
            core: self.core,
            max_buffer_bytes: self.max_buffer_bytes,
            buffer_align: self.buffer_align,
            forward_timeout: Duration::from_micros(self.forward_timeout_us),
        }
    }
}

/// One `[[component]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComponentConfig {
    /// Host id.
    pub id: u32,
    /// Pipeline the component belongs to.
    pub pipeline_id: u32,
    /// Core the component runs on.
    #[serde(default)]
    pub core: u32,
    /// Driver type tag (`host`, `dai`, `volume`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Driver parameters.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

impl ComponentConfig {
    /// Create a component entry with no parameters.
    pub fn new(id: u32, pipeline_id: u32, kind: impl Into<String>) -> Self {
        Self {
            id,
            pipeline_id,
            core: 0,
            kind: kind.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add a driver parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Descriptor handed to the driver factory.
    pub fn descriptor(&self) -> Result<ComponentDescriptor, ValidationError> {
        let kind = self.kind.parse().map_err(|_| ValidationError::UnknownType {
            id: self.id,
            kind: self.kind.clone(),
        })?;
        let mut desc = ComponentDescriptor::new(self.id, self.pipeline_id, kind).with_core(self.core);
        desc.params = self.params.clone();
        Ok(desc)
    }
}

/// One `[[buffer]]` entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BufferConfig {
    /// Host id.
    pub id: u32,
    /// Pipeline the buffer belongs to.
    pub pipeline_id: u32,
    /// Core the buffer was created on.
    #[serde(default)]
    pub core: u32,
    /// Capacity in bytes.
    pub size: usize,
    /// Accessed from more than one core.
    #[serde(default)]
    pub shared: bool,
}

impl BufferConfig {
    /// Descriptor for [`Topology::new_buffer`].
    pub fn descriptor(&self) -> BufferDescriptor {
        let mut desc = BufferDescriptor::new(self.id, self.pipeline_id, self.size).with_core(self.core);
        desc.shared = self.shared;
        desc
    }
}

/// One `[[pipeline]]` entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Host id.
    pub id: u32,
    /// Pipeline id shared by the member components.
    pub pipeline_id: u32,
    /// Host id of the scheduling component.
    pub sched_id: u32,
    /// Core the pipeline runs on.
    #[serde(default)]
    pub core: u32,
    /// Copy period in microseconds.
    #[serde(default = "default_period_us")]
    pub period_us: u32,
    /// Task priority; lower runs first.
    #[serde(default)]
    pub priority: u32,
    /// Timer-driven rather than DMA-driven.
    #[serde(default = "default_timer_driven")]
    pub timer_driven: bool,
}

fn default_period_us() -> u32 {
    1000
}

fn default_timer_driven() -> bool {
    true
}

impl PipelineConfig {
    /// Descriptor for [`Topology::new_pipeline`].
    pub fn descriptor(&self) -> PipelineDescriptor {
        let mut desc = PipelineDescriptor::new(self.id, self.pipeline_id, self.sched_id)
            .with_core(self.core)
            .with_period(self.period_us)
            .with_priority(self.priority);
        desc.timer_driven = self.timer_driven;
        desc
    }
}

/// One `[[connection]]` entry. Exactly one side is a buffer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Upstream host id.
    pub source: u32,
    /// Downstream host id.
    pub sink: u32,
}

/// One `[[stream]]` entry: the parameters a host endpoint is opened with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamConfig {
    /// Host id of the host endpoint.
    pub host: u32,
    /// `playback` or `capture`.
    #[serde(default = "default_direction")]
    pub direction: String,
    /// Frames per second.
    #[serde(default = "default_rate")]
    pub rate: u32,
    /// Interleaved channels.
    #[serde(default = "default_channels")]
    pub channels: u16,
    /// Sample format name (`s16le`, `s24le`, `s32le`, `float`).
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_direction() -> String {
    "playback".to_string()
}

fn default_rate() -> u32 {
    48000
}

fn default_channels() -> u16 {
    2
}

fn default_format() -> String {
    "s16le".to_string()
}

/// Topology file.
///
/// # TOML Format
///
/// ```toml
/// name = "Speaker playback"
///
/// [platform]
/// core = 0
/// max_buffer_bytes = 65536
///
/// [[component]]
/// id = 10
/// pipeline_id = 1
/// type = "host"
///
/// [[component]]
/// id = 12
/// pipeline_id = 1
/// type = "volume"
/// [component.params]
/// gain_db = "-6"
///
/// [[buffer]]
/// id = 11
/// pipeline_id = 1
/// size = 384
///
/// [[pipeline]]
/// id = 15
/// pipeline_id = 1
/// sched_id = 14
/// period_us = 1000
///
/// [[connection]]
/// source = 10
/// sink = 11
///
/// [[stream]]
/// host = 10
/// direction = "playback"
/// rate = 48000
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopologyConfig {
    /// Optional name of the topology.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Platform limits.
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Components.
    #[serde(default, rename = "component", skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<ComponentConfig>,

    /// Buffers.
    #[serde(default, rename = "buffer", skip_serializing_if = "Vec::is_empty")]
    pub buffers: Vec<BufferConfig>,

    /// Pipelines.
    #[serde(default, rename = "pipeline", skip_serializing_if = "Vec::is_empty")]
    pub pipelines: Vec<PipelineConfig>,

    /// Component/buffer connections.
    #[serde(default, rename = "connection", skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<ConnectionConfig>,

    /// Host streams to open.
    #[serde(default, rename = "stream", skip_serializing_if = "Vec::is_empty")]
    pub streams: Vec<StreamConfig>,
}

impl TopologyConfig {
    /// Load a topology from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), components = config.components.len(), "topology file loaded");
        Ok(config)
    }

    /// Load a topology from a TOML string.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Save the topology to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }

        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Convert the topology to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check the topology against the built-in drivers.
    pub fn validate(&self) -> Result<(), ValidationError> {
        TopologyValidator::new().validate(self)
    }

    /// Stream entry for host endpoint `host`.
    pub fn stream(&self, host: u32) -> Option<&StreamConfig> {
        self.streams.iter().find(|s| s.host == host)
    }

    /// Builds a [`Topology`] from this description.
    ///
    /// Components are created through `services.drivers`, so the lookup must
    /// know every type the file names. Objects are created in file order:
    /// components, buffers, connections, then pipelines, each completed with
    /// the endpoints [`Topology::resolve_endpoint`] finds for it.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Validation`] if the file is inconsistent,
    /// [`ConfigError::Build`] if the topology rejects an object.
    pub fn instantiate(&self, services: Services) -> Result<Topology, ConfigError> {
        self.validate()?;
        let mut topo = Topology::new(self.platform.domain(), services);

        for comp in &self.components {
            topo.new_component(&comp.descriptor()?)?;
        }
        for buf in &self.buffers {
            topo.new_buffer(&buf.descriptor())?;
        }
        for conn in &self.connections {
            let (node, buffer, dir) = match (topo.lookup(conn.source), topo.lookup(conn.sink)) {
                (Some(ObjectRef::Component(n)), Some(ObjectRef::Buffer(b))) => (n, b, WalkDirection::Downstream),
                (Some(ObjectRef::Buffer(b)), Some(ObjectRef::Component(n))) => (n, b, WalkDirection::Upstream),
                _ => {
                    return Err(PipelineError::InvalidConnection {
                        source_id: conn.source,
                        sink_id: conn.sink,
                    }
                    .into());
                }
            };
            topo.connect(node, buffer, dir)?;
        }
        for pipe in &self.pipelines {
            let graph = topo.new_pipeline(&pipe.descriptor())?;
            let source = topo
                .resolve_endpoint(pipe.pipeline_id, WalkDirection::Upstream)
                .ok_or(PipelineError::NoEndpoint(pipe.id, "source"))?;
            let sink = topo
                .resolve_endpoint(pipe.pipeline_id, WalkDirection::Downstream)
                .ok_or(PipelineError::NoEndpoint(pipe.id, "sink"))?;
            topo.complete(graph, source, sink)?;
        }

        tracing::info!(
            components = self.components.len(),
            buffers = self.buffers.len(),
            pipelines = self.pipelines.len(),
            "topology instantiated"
        );
        Ok(topo)
    }
}
