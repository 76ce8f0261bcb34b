use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use serde_json::Value as JsonValue;
use std::sync::Arc;

use stocktransfer_core::{BranchId, ExpectedVersion, ProductId, UserId};
use stocktransfer_events::{EventEnvelope, InMemoryEventBus};
use stocktransfer_infra::{
    InMemoryDirectory, InMemoryShipmentRepository, InMemoryStockLedger, NewItem, NewShipment,
    PageRequest, ShipmentQueries, TransferConfig, TransferService,
};
use stocktransfer_transfers::{ConditionState, Shipment, derive_status};

type BenchService = TransferService<
    Arc<InMemoryShipmentRepository>,
    Arc<InMemoryStockLedger>,
    Arc<InMemoryDirectory>,
    Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>,
>;

struct Harness {
    service: BenchService,
    repository: Arc<InMemoryShipmentRepository>,
    origin: BranchId,
    destination: BranchId,
    sender: UserId,
    product: ProductId,
}

fn harness() -> Harness {
    let directory = Arc::new(InMemoryDirectory::new());
    let origin = directory.add_branch("Centro").unwrap();
    let destination = directory.add_branch("Norte").unwrap();
    let sender = directory.add_user("bench").unwrap();
    let product = directory.add_product("Drill", 4_500, None).unwrap();

    let ledger = Arc::new(InMemoryStockLedger::new());
    ledger.set_level(origin, product, i64::MAX / 2).unwrap();

    let repository = Arc::new(InMemoryShipmentRepository::new());
    let service = TransferService::new(
        repository.clone(),
        ledger,
        directory,
        Arc::new(InMemoryEventBus::new()),
        TransferConfig::default(),
    );

    Harness {
        service,
        repository,
        origin,
        destination,
        sender,
        product,
    }
}

impl Harness {
    fn dispatch(&self, lines: usize) -> Shipment {
        let request = NewShipment {
            origin: self.origin,
            destination: self.destination,
            sender: self.sender,
            items: (0..lines)
                .map(|_| NewItem {
                    product_id: self.product,
                    quantity: 10,
                    buyback_threshold: None,
                    comment: None,
                    attachments: vec![],
                })
                .collect(),
            attachments: vec![],
            comment: None,
            signature: None,
        };
        self.service.create_shipment(request).unwrap()
    }

    fn receive_all(&self, shipment: &Shipment) -> Shipment {
        let mut latest = shipment.clone();
        for item in shipment.items() {
            let id = item.id_typed();
            self.service
                .set_received_quantity(id, 9, ExpectedVersion::Any)
                .unwrap();
            self.service
                .set_condition_state(id, ConditionState::Good, ExpectedVersion::Any)
                .unwrap();
            latest = self.service.mark_received(id, ExpectedVersion::Any).unwrap();
        }
        latest
    }
}

/// Command latency for dispatch and one reconciliation step.
fn bench_command_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_latency");

    group.bench_function("create_shipment_5_lines", |b| {
        let h = harness();
        b.iter(|| black_box(h.dispatch(5)));
    });

    group.bench_function("set_unit_price", |b| {
        let h = harness();
        let shipment = h.dispatch(5);
        let item = shipment.items()[0].id_typed();
        let mut price = 0u64;
        b.iter(|| {
            price += 1;
            black_box(
                h.service
                    .set_unit_price(item, price, ExpectedVersion::Any)
                    .unwrap(),
            )
        });
    });

    group.finish();
}

/// Status derivation over growing manifests.
fn bench_derive_status(c: &mut Criterion) {
    let mut group = c.benchmark_group("derive_status");

    for lines in [1usize, 10, 100].iter() {
        let h = harness();
        let shipment = h.dispatch(*lines);
        let received = h.receive_all(&shipment);

        group.throughput(Throughput::Elements(*lines as u64));
        group.bench_with_input(BenchmarkId::from_parameter(lines), &received, |b, s| {
            b.iter(|| black_box(derive_status(s.items())));
        });
    }

    group.finish();
}

/// Paginated incoming view over a growing backlog.
fn bench_paginated_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("incoming_page");

    for backlog in [100usize, 1_000].iter() {
        let h = harness();
        for _ in 0..*backlog {
            h.dispatch(1);
        }
        let queries = ShipmentQueries::new(h.repository.clone(), h.service.config());

        group.bench_with_input(BenchmarkId::new("first_page", backlog), &h, |b, h| {
            b.iter(|| {
                black_box(
                    queries
                        .incoming(h.destination, None, PageRequest::new(1, 10))
                        .unwrap(),
                )
            });
        });

        group.bench_with_input(BenchmarkId::new("search", backlog), &h, |b, h| {
            b.iter(|| {
                black_box(
                    queries
                        .incoming(h.destination, Some("norte"), PageRequest::new(3, 25))
                        .unwrap(),
                )
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_command_latency,
    bench_derive_status,
    bench_paginated_queries
);
criterion_main!(benches);
