use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("flowchat.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("flowchat.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("flowchat.client.request_duration_seconds");

pub(crate) static STREAM_EVENTS: Counter = Counter::new("flowchat.stream.events");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("flowchat.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("flowchat.stream.bytes");

pub(crate) static SESSION_SUBMITS: Counter = Counter::new("flowchat.session.submits");
pub(crate) static SESSION_SUBMIT_ERRORS: Counter = Counter::new("flowchat.session.submit_errors");
pub(crate) static SESSION_BLOCKED: Counter = Counter::new("flowchat.session.blocked");
pub(crate) static SESSION_CANCELLED: Counter = Counter::new("flowchat.session.cancelled");
pub(crate) static SESSION_RESETS: Counter = Counter::new("flowchat.session.resets");
pub(crate) static SESSION_TURN_DURATION: Moments =
    Moments::new("flowchat.session.turn_duration_seconds");

pub(crate) static REVEAL_GROUPS: Counter = Counter::new("flowchat.reveal.groups");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&STREAM_EVENTS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);

    collector.register_counter(&SESSION_SUBMITS);
    collector.register_counter(&SESSION_SUBMIT_ERRORS);
    collector.register_counter(&SESSION_BLOCKED);
    collector.register_counter(&SESSION_CANCELLED);
    collector.register_counter(&SESSION_RESETS);
    collector.register_moments(&SESSION_TURN_DURATION);

    collector.register_counter(&REVEAL_GROUPS);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_every_sensor() {
        register_biometrics(Collector::new());
    }
}
