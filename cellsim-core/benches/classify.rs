use cellsim_core::{
    bearer::{
        BearerRegistry, Direction, PacketDirection, PacketFilter, PortRange, QosClass,
        TrafficFilter,
    },
    topology::{Position, TerminalId, Topology},
};
use criterion::{Criterion, black_box, criterion_group, criterion_main};

const BEARERS: u16 = 8;

fn setup() -> (BearerRegistry, TerminalId) {
    let mut topology = Topology::default();
    let terminal = topology.add_terminal(Position::ORIGIN).unwrap();
    let mut bearers = BearerRegistry::new();

    for i in 0..BEARERS {
        let filter = TrafficFilter::new()
            .with(PacketFilter::new(Direction::Downlink).with_local(PortRange::single(1000 + i)))
            .with(PacketFilter::new(Direction::Uplink).with_remote(PortRange::single(1000 + i)));
        bearers
            .activate_bearer(&topology, terminal, QosClass::ALL[i as usize % 9], filter)
            .unwrap();
    }

    (bearers, terminal)
}

fn classify(c: &mut Criterion) {
    let (bearers, terminal) = setup();

    c.bench_function("classify_first_bearer", |b| {
        b.iter(|| {
            bearers.classify(
                black_box(terminal),
                black_box(49153),
                black_box(1000),
                black_box(PacketDirection::Downlink),
            )
        })
    });
    c.bench_function("classify_last_bearer", |b| {
        b.iter(|| {
            bearers.classify(
                black_box(terminal),
                black_box(1000 + BEARERS - 1),
                black_box(49153),
                black_box(PacketDirection::Uplink),
            )
        })
    });
    c.bench_function("classify_default", |b| {
        b.iter(|| {
            bearers.classify(
                black_box(terminal),
                black_box(49153),
                black_box(2000),
                black_box(PacketDirection::Downlink),
            )
        })
    });
}

criterion_group!(benches, classify);
criterion_main!(benches);
