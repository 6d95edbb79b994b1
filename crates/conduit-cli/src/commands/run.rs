//! Simulated run of a topology.
//!
//! Loads a topology, opens every `[[stream]]`, and advances a manual
//! scheduler period by period. Each external DMA ring is serviced the way
//! the hardware and the host would: rings that feed a pipeline get one
//! period of test tone, rings a pipeline fills are drained.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use conduit_components::sample::encode;
use conduit_config::{DriverRegistry, TopologyConfig};
use conduit_core::{
    Attribute, CircularBuffer, ComponentType, DEFAULT_ALIGNMENT, EndpointType, HostMessage, ManualScheduler, NodeId,
    NotificationBus, ReportLog, Services, SharedBuffer, StreamDirection, Topology, TriggerCmd,
};
use serde::Serialize;

/// Size of each external ring.
const RING_BYTES: usize = 4096;

#[derive(Args)]
pub struct RunArgs {
    /// Topology file to run
    #[arg(value_name = "TOPOLOGY")]
    topology: PathBuf,

    /// Number of scheduler periods to simulate
    #[arg(short, long, default_value = "100")]
    periods: u32,

    /// Skip feeding the rings on this period (repeatable) to provoke an xrun
    #[arg(long, value_name = "PERIOD")]
    drop: Vec<u32>,

    /// Test tone frequency in Hz
    #[arg(long, default_value = "1000")]
    freq: f32,

    /// Test tone amplitude in dBFS
    #[arg(long, default_value = "-6", allow_hyphen_values = true)]
    level: f32,

    /// Print statistics as JSON
    #[arg(long)]
    json: bool,
}

/// External ring attached to a host or DAI endpoint.
struct Ring {
    comp_id: u32,
    node: NodeId,
    buffer: SharedBuffer,
    /// The pipeline reads from this ring; otherwise it writes to it.
    feeds: bool,
    phase: f32,
    moved: u64,
}

#[derive(Serialize)]
struct PipelineStats {
    id: u32,
    host: u32,
    direction: &'static str,
    status: String,
    runs: u64,
    host_bytes: u64,
    xruns: usize,
    events: usize,
}

#[derive(Serialize)]
struct RunStats {
    periods: u32,
    elapsed_us: u64,
    pipelines: Vec<PipelineStats>,
}

pub fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = TopologyConfig::load(&args.topology)?;
    if config.streams.is_empty() {
        anyhow::bail!("{}: no [[stream]] entries to run", args.topology.display());
    }

    let sched = ManualScheduler::new();
    let log = ReportLog::new();
    let registry = Arc::new(DriverRegistry::new());
    let services = Services::default()
        .with_drivers(registry.clone())
        .with_scheduler(sched.clone())
        .with_reporter(Arc::new(log.clone()));
    let mut topo = config.instantiate(services)?;

    let mut rings = attach_rings(&mut topo)?;

    let mut hosts = Vec::new();
    for stream in &config.streams {
        let params = stream.params()?;
        let host = topo
            .find_component(stream.host)
            .with_context(|| format!("stream host {} not found", stream.host))?;
        let graph = topo
            .node(host)
            .and_then(|n| n.pipeline())
            .with_context(|| format!("stream host {} is not in a pipeline", stream.host))?;

        topo.configure_params(graph, host, &params)?;
        topo.prepare(graph, host)?;
        topo.trigger(graph, host, TriggerCmd::Start)?;
        tracing::info!(host = stream.host, rate = params.rate, channels = params.channels, "stream started");
        hosts.push((stream.host, host, graph));
    }

    for ring in &mut rings {
        if let Some(node) = topo.node(ring.node) {
            ring.feeds = matches!(
                (node.endpoint(), node.direction()),
                (EndpointType::Host, StreamDirection::Playback) | (EndpointType::Dai, StreamDirection::Capture)
            );
        }
    }

    let step_us = topo
        .graph_ids()
        .filter_map(|g| topo.graph(g).map(|g| g.period_us()))
        .min()
        .unwrap_or(1000);
    let amplitude = 10f32.powf(args.level / 20.0);

    for period in 0..args.periods {
        if !args.drop.contains(&period) {
            for ring in rings.iter_mut().filter(|r| r.feeds) {
                feed(&topo, ring, args.freq, amplitude);
            }
        }
        // Tasks fall due as soon as they start, so the first period runs at t = 0.
        let by = if period == 0 { 0 } else { u64::from(step_us) };
        sched.advance(&mut topo, by);
        for ring in rings.iter_mut().filter(|r| !r.feeds) {
            let mut sink = vec![0; ring.buffer.avail()];
            ring.moved += ring.buffer.read(&mut sink) as u64;
        }
    }

    let messages = log.messages();
    let stats = RunStats {
        periods: args.periods,
        elapsed_us: sched.now_us(),
        pipelines: hosts
            .iter()
            .filter_map(|&(host_id, host, graph)| {
                let g = topo.graph(graph)?;
                let direction = match topo.node(host)?.direction() {
                    StreamDirection::Playback => "playback",
                    StreamDirection::Capture => "capture",
                };
                Some(PipelineStats {
                    id: g.id(),
                    host: host_id,
                    direction,
                    status: g.status().to_string(),
                    runs: g.task().map_or(0, |t| sched.runs(t)),
                    host_bytes: messages
                        .iter()
                        .filter_map(|m| match m {
                            HostMessage::Position { comp_id, posn } if *comp_id == host_id => Some(posn.host_posn),
                            _ => None,
                        })
                        .max()
                        .unwrap_or(0),
                    xruns: messages
                        .iter()
                        .filter(|m| matches!(m, HostMessage::Xrun { comp_id, .. } if *comp_id == host_id))
                        .count(),
                    events: messages
                        .iter()
                        .filter(|m| matches!(m, HostMessage::Event { .. }))
                        .count(),
                })
            })
            .collect(),
    };

    for (host_id, host, graph) in &hosts {
        topo.trigger(*graph, *host, TriggerCmd::Stop)
            .unwrap_or_else(|e| tracing::warn!(host = host_id, "stop failed: {e}"));
    }

    registry.shutdown();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Ran {} periods ({} us)", stats.periods, stats.elapsed_us);
    println!();
    println!(
        "  {:>8}  {:>6}  {:9}  {:8}  {:>6}  {:>10}  {:>5}  {:>6}",
        "Pipeline", "Host", "Direction", "Status", "Runs", "Host bytes", "Xruns", "Events"
    );
    for p in &stats.pipelines {
        println!(
            "  {:>8}  {:>6}  {:9}  {:8}  {:>6}  {:>10}  {:>5}  {:>6}",
            p.id, p.host, p.direction, p.status, p.runs, p.host_bytes, p.xruns, p.events
        );
    }
    println!();
    for ring in &rings {
        let verb = if ring.feeds { "fed" } else { "drained" };
        println!("  ring of {:>4}: {} {} bytes", ring.comp_id, verb, ring.moved);
    }
    Ok(())
}

/// Gives every host and DAI endpoint its own external ring.
fn attach_rings(topo: &mut Topology) -> anyhow::Result<Vec<Ring>> {
    let endpoints: Vec<(NodeId, u32)> = topo
        .node_ids()
        .filter_map(|id| {
            let n = topo.node(id)?;
            matches!(n.kind(), ComponentType::Host | ComponentType::Dai).then_some((id, n.id()))
        })
        .collect();

    let notifier = Arc::new(NotificationBus::new());
    let mut rings = Vec::with_capacity(endpoints.len());
    for (node, comp_id) in endpoints {
        let buffer = SharedBuffer::new(comp_id, CircularBuffer::allocate(RING_BYTES, DEFAULT_ALIGNMENT)?, notifier.clone());
        topo.set_attribute(node, Attribute::DmaBuffer(buffer.clone()))?;
        rings.push(Ring {
            comp_id,
            node,
            buffer,
            feeds: false,
            phase: 0.0,
            moved: 0,
        });
    }
    Ok(rings)
}

/// Writes one period of sine tone into `ring`.
fn feed(topo: &Topology, ring: &mut Ring, freq: f32, amplitude: f32) {
    let Some(node) = topo.node(ring.node) else { return };
    let params = node.params();
    let frame_bytes = params.frame_bytes();
    if frame_bytes == 0 || params.rate == 0 {
        return;
    }
    let frames = (node.frames() as usize).min(ring.buffer.free() / frame_bytes);
    let width = params.frame_fmt.sample_bytes();
    let step = freq / params.rate as f32;

    let mut data = vec![0; frames * frame_bytes];
    for frame in data.chunks_exact_mut(frame_bytes) {
        let value = amplitude * (ring.phase * std::f32::consts::TAU).sin();
        for sample in frame.chunks_exact_mut(width) {
            encode(params.frame_fmt, value, sample);
        }
        ring.phase = (ring.phase + step).fract();
    }
    ring.moved += ring.buffer.write(&data) as u64;
}
