use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};

lazy_static! {
    pub(crate) static ref COUNTER: Metrics = Metrics::new();
}

pub(crate) struct Metrics {
    pub flushes: IntCounterVec,
    pub acks: IntCounterVec,
    pub messages_rejected: IntCounterVec,
    pub batches_requeued: IntCounterVec,
    pub reconnects: IntCounterVec,
    pub broker_call_failures: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let flushes = register_int_counter_vec!(
            "amqp_batch_flushes",
            "non-empty batches handed to a handler",
            &["queue", "trigger"]
        )
        .expect("register amqp_batch_flushes");
        let acks = register_int_counter_vec!(
            "amqp_batch_acks",
            "cumulative ack calls issued, each covering every earlier unsettled tag",
            &["queue"]
        )
        .expect("register amqp_batch_acks");
        let messages_rejected = register_int_counter_vec!(
            "amqp_batch_messages_rejected",
            "messages rejected without requeue",
            &["queue"]
        )
        .expect("register amqp_batch_messages_rejected");
        let batches_requeued = register_int_counter_vec!(
            "amqp_batch_batches_requeued",
            "batches returned to the queue after a fatal handler error",
            &["queue"]
        )
        .expect("register amqp_batch_batches_requeued");
        let reconnects = register_int_counter_vec!(
            "amqp_batch_reconnects",
            "successful reconnections to the broker",
            &["queue"]
        )
        .expect("register amqp_batch_reconnects");
        let broker_call_failures = register_int_counter_vec!(
            "amqp_batch_broker_call_failures",
            "failed ack/reject/nack calls",
            &["queue", "call"]
        )
        .expect("register amqp_batch_broker_call_failures");

        Metrics {
            flushes,
            acks,
            messages_rejected,
            batches_requeued,
            reconnects,
            broker_call_failures,
        }
    }

    pub fn output(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        encoder.encode(&metric_families, &mut buffer)?;

        Ok(String::from_utf8(buffer)?)
    }
}
