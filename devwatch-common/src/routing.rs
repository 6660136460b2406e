//! Routing key builders and classifiers.
//!
//! Routing keys follow the pattern
//! `<device>.<category>.<subcategory>[.<qualifier>]`:
//!
//! ```text
//! device-3.metrics.cpu
//! device-3.metrics.ram
//! device-3.events.service.started
//! device-3.events.service.stopped
//! ```
//!
//! Identifiers cannot contain dots: a dotted identifier would be ambiguous
//! with the suffix, so [`validate_device_identifier`] rejects it.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::envelope::{self, EnvelopeError};
use crate::telemetry::{Kind, ServiceEventType, SystemValue};

/// Suffix for CPU metrics.
pub const CPU_SUFFIX: &str = "metrics.cpu";
/// Suffix for RAM metrics.
pub const RAM_SUFFIX: &str = "metrics.ram";
/// Suffix for service start events.
pub const SERVICE_STARTED_SUFFIX: &str = "events.service.started";
/// Suffix for service stop events.
pub const SERVICE_STOPPED_SUFFIX: &str = "events.service.stopped";

/// Reasons a device identifier cannot be used in a routing key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("Device identifier is empty")]
    EmptyIdentifier,

    #[error("Device identifier '{0}' contains a reserved character")]
    ReservedCharacter(String),

    #[error("Device identifier '{0}' must be lowercase")]
    NotLowercase(String),
}

/// Get the routing key suffix for a value.
pub fn suffix(value: &SystemValue) -> &'static str {
    match value {
        SystemValue::Cpu(_) => CPU_SUFFIX,
        SystemValue::Ram(_) => RAM_SUFFIX,
        SystemValue::ServiceEvent(event) => match event.event_type {
            ServiceEventType::Start => SERVICE_STARTED_SUFFIX,
            ServiceEventType::Stop => SERVICE_STOPPED_SUFFIX,
        },
    }
}

/// Build the routing key for a value published by a device.
///
/// # Example
/// ```
/// use devwatch_common::routing::build_key;
/// use devwatch_common::telemetry::{ServiceEvent, SystemValue};
///
/// let value = SystemValue::from(ServiceEvent::started("nginx"));
/// assert_eq!(build_key("device-3", &value), "device-3.events.service.started");
/// ```
pub fn build_key(device: &str, value: &SystemValue) -> String {
    format!("{}.{}", device, suffix(value))
}

/// Check that a device identifier forms a single lowercase key segment.
pub fn validate_device_identifier(device: &str) -> Result<(), RoutingError> {
    if device.is_empty() {
        return Err(RoutingError::EmptyIdentifier);
    }
    if device
        .chars()
        .any(|c| c == '.' || c == '*' || c == '#' || c.is_whitespace())
    {
        return Err(RoutingError::ReservedCharacter(device.to_string()));
    }
    if device.chars().any(|c| c.is_uppercase()) {
        return Err(RoutingError::NotLowercase(device.to_string()));
    }
    Ok(())
}

/// Binding that matches every key published by one device.
///
/// # Example
/// ```
/// use devwatch_common::routing::device_binding;
///
/// assert_eq!(device_binding("device-3"), "device-3.#");
/// ```
pub fn device_binding(device: &str) -> String {
    format!("{}.#", device)
}

/// Binding that matches every key published by any device.
///
/// # Example
/// ```
/// use devwatch_common::routing::all_devices_binding;
///
/// assert_eq!(all_devices_binding(), "*.#");
/// ```
pub fn all_devices_binding() -> String {
    "*.#".to_string()
}

/// Decoder for one recognised kind.
pub type Decoder = fn(&[u8]) -> Result<SystemValue, EnvelopeError>;

/// Maps a routing key suffix to a value kind and its decoder.
#[derive(Debug)]
pub struct RoutingRule {
    pattern: Regex,
    kind: Kind,
    decoder: Decoder,
}

impl RoutingRule {
    fn new(pattern: &str, kind: Kind, decoder: Decoder) -> Self {
        Self {
            // Patterns are compile-time constants.
            pattern: Regex::new(pattern).expect("invalid routing rule pattern"),
            kind,
            decoder,
        }
    }

    /// Check whether the key remainder (after the device segment) matches.
    pub fn matches(&self, remainder: &str) -> bool {
        self.pattern.is_match(remainder)
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn decode(&self, data: &[u8]) -> Result<SystemValue, EnvelopeError> {
        (self.decoder)(data)
    }
}

fn decode_cpu(data: &[u8]) -> Result<SystemValue, EnvelopeError> {
    envelope::decode(data, Kind::Cpu)
}

fn decode_ram(data: &[u8]) -> Result<SystemValue, EnvelopeError> {
    envelope::decode(data, Kind::Ram)
}

fn decode_service_event(data: &[u8]) -> Result<SystemValue, EnvelopeError> {
    envelope::decode(data, Kind::ServiceEvent)
}

/// Classification rules, evaluated in order. First match wins.
pub static RULES: Lazy<Vec<RoutingRule>> = Lazy::new(|| {
    vec![
        RoutingRule::new(r"^metrics\.cpu$", Kind::Cpu, decode_cpu),
        RoutingRule::new(r"^metrics\.ram$", Kind::Ram, decode_ram),
        RoutingRule::new(
            r"^events\.service\.(started|stopped)$",
            Kind::ServiceEvent,
            decode_service_event,
        ),
    ]
});

/// Components recovered from a routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classified<'a> {
    pub device: &'a str,
    pub kind: Kind,
}

/// Find the rule matching a routing key, along with the device segment.
pub fn find_rule(key: &str) -> (&str, Option<&'static RoutingRule>) {
    let (device, remainder) = key.split_once('.').unwrap_or((key, ""));
    if device.is_empty() {
        return (device, None);
    }
    (device, RULES.iter().find(|rule| rule.matches(remainder)))
}

/// Split a routing key into device identifier and value kind.
///
/// Keys that match no rule classify as [`Kind::Unknown`].
///
/// # Example
/// ```
/// use devwatch_common::routing::classify;
/// use devwatch_common::telemetry::Kind;
///
/// let classified = classify("device-2.metrics.cpu");
/// assert_eq!(classified.device, "device-2");
/// assert_eq!(classified.kind, Kind::Cpu);
/// ```
pub fn classify(key: &str) -> Classified<'_> {
    let (device, rule) = find_rule(key);
    Classified {
        device,
        kind: rule.map(RoutingRule::kind).unwrap_or(Kind::Unknown),
    }
}
