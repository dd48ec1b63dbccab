//! Metric definitions emitted by the relay.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
}

#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub description: &'static str,
}

pub const ALERTS_RECEIVED: MetricDef = MetricDef {
    name: "alerts.received",
    metric_type: MetricType::Counter,
    description: "Alerts that passed normalization. Tagged with encoding.",
};

pub const ALERTS_REJECTED: MetricDef = MetricDef {
    name: "alerts.rejected",
    metric_type: MetricType::Counter,
    description: "Alerts rejected before delivery. Tagged with status.",
};

pub const DELIVERY_OUTCOMES: MetricDef = MetricDef {
    name: "delivery.outcomes",
    metric_type: MetricType::Counter,
    description: "Alert channel calls per stage. Tagged with stage, result.",
};

pub const PHOTO_BYTES: MetricDef = MetricDef {
    name: "photo.bytes",
    metric_type: MetricType::Histogram,
    description: "Size of relayed photos in bytes. Tagged with source.",
};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "request.duration",
    metric_type: MetricType::Histogram,
    description: "Duration of /send_data requests in seconds. Tagged with status.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    ALERTS_RECEIVED,
    ALERTS_REJECTED,
    DELIVERY_OUTCOMES,
    PHOTO_BYTES,
    REQUEST_DURATION,
];
