//! Criterion benchmarks for conduit-core buffers and the copy walk
//!
//! Run with: cargo bench -p conduit-core
#![allow(missing_docs)]

use conduit_core::{
    BufferDescriptor, CircularBuffer, ComponentDescriptor, ComponentError, ComponentOps, ComponentType, DomainConfig,
    GraphId, NodeContext, PathStatus, PipelineDescriptor, Services, StreamParams, Topology, TriggerCmd,
};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

const PERIOD_SIZES: &[usize] = &[64, 192, 768, 3072];

/// Moves everything it can from the first source to the first sink.
struct Relay {
    scratch: Vec<u8>,
    /// Endpoints either fill or drain their only buffer.
    end: Option<bool>,
}

impl ComponentOps for Relay {
    fn copy(&mut self, ctx: &mut NodeContext<'_>) -> Result<PathStatus, ComponentError> {
        match self.end {
            Some(true) => {
                if let Some(sink) = ctx.sink(0) {
                    let n = sink.free().min(self.scratch.len());
                    sink.write(&self.scratch[..n]);
                }
            }
            Some(false) => {
                if let Some(source) = ctx.source(0) {
                    let n = source.avail().min(self.scratch.len());
                    source.read(&mut self.scratch[..n]);
                }
            }
            None => {
                let limits = ctx.copy_limits()?;
                let n = limits.source_bytes.min(self.scratch.len());
                if let (Some(source), Some(sink)) = (ctx.source(0), ctx.sink(0)) {
                    source.read(&mut self.scratch[..n]);
                    sink.write(&self.scratch[..n]);
                }
            }
        }
        Ok(PathStatus::Continue)
    }
}

/// host → buf → relay × `stages` → buf → dai, started and ready to copy.
fn build_chain(stages: u32) -> (Topology, GraphId) {
    let mut topo = Topology::new(DomainConfig::default(), Services::default());
    let mut next_id = 1;
    let mut id = || {
        next_id += 1;
        next_id
    };

    let relay = |end| Box::new(Relay { scratch: vec![0; 4096], end });
    let host = id();
    topo.add_component(&ComponentDescriptor::new(host, 1, ComponentType::Host), relay(Some(true)))
        .unwrap();
    let mut prev = host;
    for _ in 0..stages {
        let buf = id();
        topo.new_buffer(&BufferDescriptor::new(buf, 1, 4096)).unwrap();
        topo.connect_ids(prev, buf).unwrap();
        let comp = id();
        topo.add_component(&ComponentDescriptor::new(comp, 1, ComponentType::Volume), relay(None))
            .unwrap();
        topo.connect_ids(buf, comp).unwrap();
        prev = comp;
    }
    let buf = id();
    topo.new_buffer(&BufferDescriptor::new(buf, 1, 4096)).unwrap();
    topo.connect_ids(prev, buf).unwrap();
    let dai = id();
    topo.add_component(&ComponentDescriptor::new(dai, 1, ComponentType::Dai), relay(Some(false)))
        .unwrap();
    topo.connect_ids(buf, dai).unwrap();

    let pipeline = id();
    let graph = topo.new_pipeline(&PipelineDescriptor::new(pipeline, 1, dai)).unwrap();
    topo.complete_pipeline_by_id(pipeline).unwrap();
    let host = topo.find_component(host).unwrap();
    topo.configure_params(graph, host, &StreamParams::default()).unwrap();
    topo.prepare(graph, host).unwrap();
    topo.trigger(graph, host, TriggerCmd::Start).unwrap();
    (topo, graph)
}

fn bench_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("CircularBuffer");

    for &period in PERIOD_SIZES {
        let data = vec![0x5a_u8; period];
        let mut out = vec![0_u8; period];

        group.bench_with_input(BenchmarkId::new("fill_produce_peek_consume", period), &period, |b, _| {
            let mut buf = CircularBuffer::allocate(4 * period + 1, 64).unwrap();
            b.iter(|| {
                let n = buf.fill(black_box(&data));
                buf.produce(n);
                let n = buf.peek(&mut out);
                black_box(buf.consume(n));
            });
        });
    }

    group.bench_function("produce_overwrite", |b| {
        let mut buf = CircularBuffer::allocate(1024, 64).unwrap();
        b.iter(|| black_box(buf.produce(black_box(1500))));
    });

    group.finish();
}

fn bench_copy_walk(c: &mut Criterion) {
    let mut group = c.benchmark_group("Topology");

    for &stages in &[1_u32, 4, 16] {
        group.bench_with_input(BenchmarkId::new("copy", stages), &stages, |b, &stages| {
            let (mut topo, graph) = build_chain(stages);
            b.iter(|| black_box(topo.copy(graph)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_buffer, bench_copy_walk);
criterion_main!(benches);
