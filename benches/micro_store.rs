#![forbid(unsafe_code)]

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use roadgraph::graph::Graph;
use roadgraph::ingest::source::tags;
use roadgraph::ingest::{clean_cut, GraphLoader, LoaderOptions, MemorySource, PolygonBorder, SyntheticIds, WayNode};
use roadgraph::storage::kinds::{Edge, EdgeSpec, Vertex, VertexSpec};
use roadgraph::storage::{ArchiveVersion, CommonAttributes, ElementStore, GraphContext, StoreOptions};
use roadgraph::types::{Identifier, Location, Rectangle};

const ELEMENT_COUNT: usize = 16_384;
const STREET_COUNT: i64 = 512;

fn random_location(rng: &mut ChaCha8Rng) -> Location {
    Location::degrees(rng.gen_range(47.0..55.0), rng.gen_range(6.0..15.0))
}

fn vertex_specs(count: usize) -> Vec<VertexSpec> {
    let mut rng = ChaCha8Rng::seed_from_u64(0xC0FFEE);
    (1..=count as i64)
        .map(|id| VertexSpec::new(CommonAttributes::new(id), random_location(&mut rng)))
        .collect()
}

fn edge_specs(count: usize) -> Vec<EdgeSpec> {
    let mut rng = ChaCha8Rng::seed_from_u64(0xBEEF);
    (1..=count as i64)
        .map(|way| {
            let from = random_location(&mut rng);
            let to = Location::dm7(from.latitude_dm7 + 1_000, from.longitude_dm7 + 1_000);
            EdgeSpec::new(
                CommonAttributes::new(way * 1_000_000 + 1)
                    .with_tags(vec![("highway".into(), "residential".into())]),
                (Identifier(way * 2), from),
                (Identifier(way * 2 + 1), to),
            )
        })
        .collect()
}

fn micro_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("micro/store");
    group.sample_size(20);
    group.throughput(Throughput::Elements(ELEMENT_COUNT as u64));

    group.bench_function("vertex_add_commit", |b| {
        b.iter_batched(
            || vertex_specs(ELEMENT_COUNT),
            |specs| {
                let store = ElementStore::<Vertex>::new(
                    "vertex-store",
                    GraphContext::new(),
                    StoreOptions::new().estimate(ELEMENT_COUNT),
                );
                for spec in specs {
                    store.add(spec);
                }
                store.commit().expect("commit");
                black_box(store.size())
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("edge_add_batched", |b| {
        b.iter_batched(
            || edge_specs(ELEMENT_COUNT),
            |specs| {
                let store = ElementStore::<Edge>::new(
                    "edge-store",
                    GraphContext::new(),
                    StoreOptions::new().estimate(ELEMENT_COUNT).batching(true),
                );
                let adder = store.adder().expect("adder");
                for spec in specs {
                    adder.add(spec).expect("queue");
                }
                drop(adder);
                store.commit().expect("commit");
                black_box(store.size())
            },
            BatchSize::LargeInput,
        );
    });

    let store = ElementStore::<Vertex>::new("vertex-store", GraphContext::new(), StoreOptions::new());
    for spec in vertex_specs(ELEMENT_COUNT) {
        store.add(spec);
    }
    store.commit().expect("commit");
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    group.throughput(Throughput::Elements(1));
    group.bench_function("vertex_record_of", |b| {
        b.iter(|| {
            let id = rng.gen_range(1..=ELEMENT_COUNT as i64);
            black_box(store.record_of(Identifier(id)).expect("record"))
        });
    });
    group.finish();
}

fn micro_archive(c: &mut Criterion) {
    let mut group = c.benchmark_group("micro/archive");
    group.sample_size(10);
    let tmpdir = tempfile::tempdir().expect("tmpdir");
    let path = tmpdir.path().join("bench.rga");
    let graph = Graph::new("bench", StoreOptions::new());
    for spec in vertex_specs(ELEMENT_COUNT) {
        graph.vertices().add(spec);
    }
    for spec in edge_specs(ELEMENT_COUNT) {
        graph.edges().add(spec);
    }
    graph.commit().expect("commit");

    group.bench_function("save", |b| {
        b.iter(|| black_box(graph.save(&path, ArchiveVersion(1)).expect("save")));
    });
    group.bench_function("open_load_all", |b| {
        b.iter(|| {
            let reopened = Graph::open(&path, StoreOptions::new()).expect("open");
            reopened.load_all().expect("load");
            black_box(reopened.counts().expect("counts"))
        });
    });
    group.finish();
}

fn micro_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("micro/ingest");
    group.sample_size(10);
    let mut source = MemorySource::new("grid");
    for street in 0..STREET_COUNT {
        let base = street * 10;
        for n in 0..10 {
            source = source.node(base + n + 1, 50.0 + street as f64 * 0.001, 8.0 + n as f64 * 0.001, Vec::new());
        }
    }
    for street in 0..STREET_COUNT {
        let refs: Vec<i64> = (1..=10).map(|n| street * 10 + n).collect();
        source = source.way(street + 1, &refs, tags(&[("highway", "residential")]));
    }
    group.throughput(Throughput::Elements(STREET_COUNT as u64));
    group.bench_function("load_grid", |b| {
        b.iter(|| {
            let (graph, statistics) = GraphLoader::new(LoaderOptions::new())
                .load(&mut source)
                .expect("load");
            black_box((graph.edges().size(), statistics.edges))
        });
    });

    let border = PolygonBorder::rectangle(Rectangle::from_corners(
        Location::degrees(49.0, 7.0),
        Location::degrees(51.0, 9.0),
    ));
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let nodes: Vec<WayNode> = (1..=256i64)
        .map(|id| WayNode::new(id, Location::degrees(rng.gen_range(48.5..51.5), rng.gen_range(6.5..9.5))))
        .collect();
    group.throughput(Throughput::Elements(nodes.len() as u64));
    group.bench_function("clean_cut", |b| {
        b.iter(|| black_box(clean_cut(&nodes, &border, &SyntheticIds::new()).len()));
    });
    group.finish();
}

criterion_group!(benches, micro_store, micro_archive, micro_ingest);
criterion_main!(benches);
