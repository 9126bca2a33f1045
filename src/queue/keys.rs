//! Key naming for everything the broker keeps in the transport

pub(crate) struct Keys;

impl Keys {
    /// Set of every stream name that has been published to or read from
    pub const STREAMS: &'static str = "streams";

    pub fn stream(stream: &str) -> String {
        format!("stream:{stream}")
    }

    pub fn groups(stream: &str) -> String {
        format!("groups:{stream}")
    }

    pub fn position(stream: &str, group: &str) -> String {
        format!("position:{stream}:{group}")
    }

    /// Counter bumped by every splice at `group`'s cursor
    pub fn generation(stream: &str, group: &str) -> String {
        format!("generation:{stream}:{group}")
    }

    pub fn in_flight(stream: &str, group: &str) -> String {
        format!("in_flight:{stream}:{group}")
    }

    pub fn failed(stream: &str, group: &str) -> String {
        format!("failed:{stream}:{group}")
    }

    pub fn retry_count(stream: &str, group: &str) -> String {
        format!("retry_count:{stream}:{group}")
    }

    pub fn dlq(stream: &str, group: &str) -> String {
        format!("dlq:{stream}:{group}")
    }

    pub fn ownership(identifier: &str) -> String {
        format!("ownership:{identifier}")
    }

    /// Member stored in the ownership set for a delivery to `group` on `stream`
    pub fn ownership_tag(stream: &str, group: &str) -> String {
        format!("{stream}:{group}")
    }

    pub fn op_state(group: &str, identifier: &str) -> String {
        format!("op_state:{group}:{identifier}")
    }
}
