// gateway/src/metrics.rs
//! Prometheus metrics

use lazy_static::lazy_static;
use prometheus::IntGauge;

lazy_static! {
    pub static ref DISPATCHED_TOTAL: IntGauge =
        IntGauge::new("dispatched_total", "Total bridge transactions dispatched").unwrap();
    pub static ref CONFIRMED_TOTAL: IntGauge =
        IntGauge::new("confirmed_total", "Total bridge transactions confirmed").unwrap();
    pub static ref FAILED_TOTAL: IntGauge =
        IntGauge::new("failed_total", "Total bridge transactions failed").unwrap();
    pub static ref RETRIES_TOTAL: IntGauge =
        IntGauge::new("retries_total", "Total retry dispatches issued").unwrap();
}
