use std::collections::BTreeMap;

use crate::firehose::ContainerSample;
use crate::metric::{ApplicationIdentity, Metric, MetricValue, State};

/// `used / total`, or 0 when nothing is allotted.
pub fn ratio(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    used as f64 / total as f64
}

/// Memory and disk usage, quota and ratio followed by CPU, all tagged with
/// the instance index.
pub fn container_metrics(app: &ApplicationIdentity, sample: &ContainerSample) -> Vec<Metric> {
    let attributes = BTreeMap::from([(
        "instance".to_string(),
        sample.instance_index.to_string(),
    )]);
    let metric = |service: &str, value: MetricValue| {
        Metric::for_app(app, service, value, State::Ok).with_attributes(&attributes)
    };

    vec![
        metric("memory used_bytes", sample.memory_bytes.into()),
        metric("memory total_bytes", sample.memory_bytes_quota.into()),
        metric(
            "memory used_ratio",
            ratio(sample.memory_bytes, sample.memory_bytes_quota).into(),
        ),
        metric("disk used_bytes", sample.disk_bytes.into()),
        metric("disk total_bytes", sample.disk_bytes_quota.into()),
        metric(
            "disk used_ratio",
            ratio(sample.disk_bytes, sample.disk_bytes_quota).into(),
        ),
        metric("cpu_percent", sample.cpu_percentage.into()),
    ]
}
