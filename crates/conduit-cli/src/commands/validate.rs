//! Topology validation command.

use std::path::PathBuf;

use clap::Args;
use conduit_config::TopologyConfig;
use serde::Serialize;

#[derive(Args)]
pub struct ValidateArgs {
    /// Topology file to check
    #[arg(value_name = "TOPOLOGY")]
    topology: PathBuf,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Summary<'a> {
    name: Option<&'a str>,
    components: usize,
    buffers: usize,
    pipelines: usize,
    connections: usize,
    streams: usize,
}

pub fn run(args: ValidateArgs) -> anyhow::Result<()> {
    let config = TopologyConfig::load(&args.topology)?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("{}: {}", args.topology.display(), e))?;

    let summary = Summary {
        name: config.name.as_deref(),
        components: config.components.len(),
        buffers: config.buffers.len(),
        pipelines: config.pipelines.len(),
        connections: config.connections.len(),
        streams: config.streams.len(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{}: OK", args.topology.display());
    if let Some(name) = summary.name {
        println!("  name:        {name}");
    }
    println!("  components:  {}", summary.components);
    println!("  buffers:     {}", summary.buffers);
    println!("  pipelines:   {}", summary.pipelines);
    println!("  connections: {}", summary.connections);
    println!("  streams:     {}", summary.streams);
    Ok(())
}
