use opentelemetry::KeyValue;
use opentelemetry::global::meter;
use opentelemetry::metrics::{Counter, Meter};
use std::sync::LazyLock;

pub(crate) static METER: LazyLock<Meter> = LazyLock::new(|| meter("portico-operator"));

static GATEWAY_RECONCILES: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("gateway_reconciles")
        .with_description("Gateway reconcile passes by outcome")
        .build()
});

static OWNED_RESOURCE_WRITES: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("gateway_owned_resource_writes")
        .with_description("Writes issued against resources owned by Gateways")
        .build()
});

pub fn record_reconcile(outcome: &'static str) {
    GATEWAY_RECONCILES.add(1, &[KeyValue::new("outcome", outcome)]);
}

pub fn record_owned_write(kind: &str, operation: &'static str) {
    OWNED_RESOURCE_WRITES.add(
        1,
        &[
            KeyValue::new("kind", kind.to_string()),
            KeyValue::new("operation", operation),
        ],
    );
}
