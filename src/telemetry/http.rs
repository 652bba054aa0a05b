use std::collections::BTreeMap;

use crate::firehose::HttpSample;
use crate::metric::{ApplicationIdentity, Metric, State};

pub const RESPONSE_TIME: &str = "http response time_ms";
pub const CONTENT_LENGTH: &str = "http response content_length_bytes";

const NANOS_PER_MILLI: i64 = 1_000_000;

/// Duration of a request in whole milliseconds
pub fn response_time_ms(sample: &HttpSample) -> i64 {
    sample.stop_timestamp.saturating_sub(sample.start_timestamp) / NANOS_PER_MILLI
}

pub fn http_metrics(app: &ApplicationIdentity, sample: &HttpSample) -> Vec<Metric> {
    let mut attributes = BTreeMap::from([
        ("instance".to_string(), sample.instance_index.to_string()),
        ("method".to_string(), sample.method.clone()),
        ("status_code".to_string(), sample.status_code.to_string()),
        ("peer".to_string(), sample.peer_type.as_str().to_string()),
    ]);
    if let Some(request_id) = sample.request_id {
        attributes.insert("request_id".to_string(), request_id.to_string());
    }

    vec![
        Metric::for_app(app, RESPONSE_TIME, response_time_ms(sample), State::Ok)
            .with_attributes(&attributes),
        Metric::for_app(app, CONTENT_LENGTH, sample.content_length, State::Ok)
            .with_attributes(&attributes),
    ]
}
