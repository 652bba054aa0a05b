use crate::cloudfoundry::AppSummary;
use crate::metric::{ApplicationIdentity, Metric, State};

pub const RUNNING_COUNT: &str = "instance running_count";
pub const CONFIGURED_COUNT: &str = "instance configured_count";

/// Health of an application from its instance counts.
///
/// All configured instances running is `ok`, none running is `critical`,
/// anything in between is `warn`. An application scaled to zero is `ok`.
pub fn health(running: u32, configured: u32) -> State {
    if running >= configured {
        State::Ok
    } else if running == 0 {
        State::Critical
    } else {
        State::Warn
    }
}

/// Running count first, configured count second, both with the same health.
pub fn summary_metrics(app: &ApplicationIdentity, summary: &AppSummary) -> Vec<Metric> {
    let state = health(summary.running_instances, summary.instances);

    vec![
        Metric::for_app(app, RUNNING_COUNT, summary.running_instances, state.clone()),
        Metric::for_app(app, CONFIGURED_COUNT, summary.instances, state),
    ]
}
