pub mod actors;
pub mod agent;
pub mod cloudfoundry;
pub mod config;
pub mod firehose;
pub mod metric;
pub mod sink;
pub mod telemetry;
pub mod util;

pub use metric::{ApplicationIdentity, Metric, MetricValue, State};
