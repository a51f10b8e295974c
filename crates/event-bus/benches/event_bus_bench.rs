use criterion::{Criterion, criterion_group, criterion_main};
use event_bus::{EventBus, InMemoryEventBus, pattern_matches};

fn payload() -> serde_json::Value {
    serde_json::json!({
        "event_type": "product.deleted",
        "product_id": 7,
        "image_url": "http://localhost:3000/images/7.jpg"
    })
}

fn bench_publish_no_subscribers(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let bus = InMemoryEventBus::new();

    c.bench_function("event_bus/publish_no_subscribers", |b| {
        b.iter(|| {
            rt.block_on(async {
                bus.publish("products", "product.deleted", payload())
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_publish_fan_out_10(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let bus = InMemoryEventBus::new();

    let mut subscriptions = rt.block_on(async {
        let mut subs = Vec::new();
        for _ in 0..10 {
            subs.push(bus.subscribe("products", "product.#").await.unwrap());
        }
        subs
    });

    c.bench_function("event_bus/publish_fan_out_10", |b| {
        b.iter(|| {
            rt.block_on(async {
                bus.publish("products", "product.deleted", payload())
                    .await
                    .unwrap();
            });
            for sub in subscriptions.iter_mut() {
                sub.try_recv();
            }
        });
    });
}

fn bench_pattern_matching(c: &mut Criterion) {
    c.bench_function("event_bus/pattern_matches_hash", |b| {
        b.iter(|| pattern_matches("product.#.completed", "product.deleted.completed"));
    });
}

criterion_group!(
    benches,
    bench_publish_no_subscribers,
    bench_publish_fan_out_10,
    bench_pattern_matching
);
criterion_main!(benches);
