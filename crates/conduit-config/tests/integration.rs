//! Integration tests for conduit-config.
//!
//! Topology files are written to disk, loaded back, validated and turned
//! into running topologies with the built-in drivers.

use std::sync::Arc;

use conduit_config::{ConfigError, DriverRegistry, TopologyConfig, ValidationError};
use conduit_core::{
    Attribute, CircularBuffer, ComponentState, NotificationBus, PipelineError, Services, SharedBuffer, TriggerCmd,
};
use tempfile::TempDir;

const PLAYBACK: &str = r#"
name = "Speaker playback"

[platform]
core = 0
max_buffer_bytes = 4096

[[component]]
id = 10
pipeline_id = 1
type = "host"

[[component]]
id = 12
pipeline_id = 1
type = "volume"
[component.params]
gain_db = "-6"

[[component]]
id = 14
pipeline_id = 1
type = "dai"

[[buffer]]
id = 11
pipeline_id = 1
size = 384

[[buffer]]
id = 13
pipeline_id = 1
size = 384

[[pipeline]]
id = 15
pipeline_id = 1
sched_id = 14
period_us = 1000

[[connection]]
source = 10
sink = 11

[[connection]]
source = 11
sink = 12

[[connection]]
source = 12
sink = 13

[[connection]]
source = 13
sink = 14

[[stream]]
host = 10
direction = "playback"
rate = 48000
channels = 2
format = "s16le"
"#;

fn services() -> Services {
    Services::default().with_drivers(Arc::new(DriverRegistry::new()))
}

fn ring() -> SharedBuffer {
    SharedBuffer::new(
        900,
        CircularBuffer::allocate(1024, 8).unwrap(),
        Arc::new(NotificationBus::new()),
    )
}

/// Test saving a topology and loading it back from disk.
#[test]
fn test_save_and_load_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("playback.toml");

    let config = TopologyConfig::from_toml_str(PLAYBACK).unwrap();
    config.save(&path).unwrap();
    assert!(path.exists());

    let loaded = TopologyConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(loaded.name.as_deref(), Some("Speaker playback"));
    assert_eq!(loaded.components[1].params.get("gain_db").map(String::as_str), Some("-6"));
}

/// Test that a missing file reports its path.
#[test]
fn test_load_missing_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.toml");
    let err = TopologyConfig::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::ReadFile { .. }));
    assert!(err.to_string().contains("absent.toml"));
}

/// Test that malformed TOML is a parse error.
#[test]
fn test_parse_error() {
    let err = TopologyConfig::from_toml_str("[[component]]\nid = \"ten\"").unwrap_err();
    assert!(matches!(err, ConfigError::TomlParse(_)));
}

/// Test building a topology and running one period through it.
#[test]
fn test_instantiate_and_run() {
    let config = TopologyConfig::from_toml_str(PLAYBACK).unwrap();
    let mut topo = config.instantiate(services()).unwrap();

    let graph = topo.find_pipeline(15).unwrap();
    let host = topo.find_component(10).unwrap();
    let dai = topo.find_component(14).unwrap();
    let g = topo.graph(graph).unwrap();
    assert_eq!(g.source_comp(), Some(host));
    assert_eq!(g.sink_comp(), Some(dai));
    assert_eq!(topo.config().max_buffer_bytes, 4096);

    let host_ring = ring();
    let dai_ring = ring();
    topo.set_attribute(host, Attribute::DmaBuffer(host_ring.clone())).unwrap();
    topo.set_attribute(dai, Attribute::DmaBuffer(dai_ring.clone())).unwrap();

    let params = config.stream(10).unwrap().params().unwrap();
    topo.configure_params(graph, host, &params).unwrap();
    topo.prepare(graph, host).unwrap();
    topo.trigger(graph, host, TriggerCmd::Start).unwrap();
    assert_eq!(topo.node(dai).unwrap().state(), ComponentState::Active);

    host_ring.write(&[0x10; 192]);
    topo.copy(graph).unwrap();
    assert_eq!(dai_ring.avail(), 192);
}

/// Test that validation runs before anything is built.
#[test]
fn test_instantiate_rejects_invalid_file() {
    let mut config = TopologyConfig::from_toml_str(PLAYBACK).unwrap();
    config.components[1].kind = "phaser".to_string();

    let err = config.instantiate(services()).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::Validation(ValidationError::UnknownType { id: 12, .. })
    ));
}

/// Test that buffers over the platform limit are caught by validation.
#[test]
fn test_platform_limit_applies_to_buffers() {
    let mut config = TopologyConfig::from_toml_str(PLAYBACK).unwrap();
    config.buffers[0].size = 8192;
    assert!(matches!(
        config.validate(),
        Err(ValidationError::BufferSize { id: 11, size: 8192, max: 4096 })
    ));
}

/// Test that driver parameter errors surface as build errors.
#[test]
fn test_bad_driver_params_fail_the_build() {
    let mut config = TopologyConfig::from_toml_str(PLAYBACK).unwrap();
    config.components[1].params.insert("gain_db".to_string(), "loud".to_string());

    let err = config.instantiate(services()).unwrap_err();
    assert!(matches!(err, ConfigError::Build(PipelineError::Component { id: 12, .. })));
}

/// Test that the shipped sample topologies are valid.
#[test]
fn test_sample_topologies_validate() {
    let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../topologies");
    let mut seen = 0;
    for entry in std::fs::read_dir(&dir).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().is_some_and(|e| e == "toml") {
            let config = TopologyConfig::load(&path).unwrap();
            config.validate().unwrap_or_else(|e| panic!("{}: {e}", path.display()));
            config.instantiate(services()).unwrap();
            seen += 1;
        }
    }
    assert!(seen >= 2);
}
