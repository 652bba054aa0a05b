use std::collections::BTreeMap;

use crate::cloudfoundry::AppEvent;
use crate::metric::{ApplicationIdentity, Metric, State};

pub const APP_EVENT: &str = "app event";

/// One `app event` record timestamped at the moment the event happened.
pub fn event_metric(app: &ApplicationIdentity, event: &AppEvent) -> Metric {
    let attributes = BTreeMap::from([
        ("event".to_string(), event.event_type.clone()),
        ("actor".to_string(), event.actor_name.clone()),
        ("actor_type".to_string(), event.actor_type.clone()),
        ("actee".to_string(), event.actee_name.clone()),
        ("actee_type".to_string(), event.actee_type.clone()),
    ]);

    Metric::for_app(app, APP_EVENT, 1i64, State::Ok)
        .with_attributes(&attributes)
        .at(event.timestamp)
}
