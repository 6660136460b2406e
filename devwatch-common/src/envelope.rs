//! Binary telemetry envelope.
//!
//! Values travel as protobuf messages. Every field has a fixed numeric tag,
//! so decoders skip tags they do not know and fill missing ones with zero
//! values. The device identifier is never part of the envelope; it lives in
//! the routing key prefix.
//!
//! ```text
//! Cpu           1: load_percentage  2: power_draw  3: core_temps (repeated)
//! Ram           1: used_mb          2: total_mb    3: memory_clock
//! ServiceEvent  1: executable       2: event_type (Start = 1, Stop = 2)
//! ```

use prost::Message;
use thiserror::Error;

use crate::telemetry::{Cpu, Kind, Ram, ServiceEvent, ServiceEventType, SystemValue};

/// Content type set on published messages.
pub const CONTENT_TYPE: &str = "application/x-protobuf";

/// Errors decoding an envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("Malformed {kind} envelope: {source}")]
    Malformed {
        kind: Kind,
        #[source]
        source: prost::DecodeError,
    },

    #[error("Invalid service event type: {0}")]
    InvalidEventType(i32),

    #[error("No envelope schema for kind '{0}'")]
    UnsupportedKind(Kind),
}

#[derive(Clone, PartialEq, Message)]
struct CpuMessage {
    #[prost(int32, tag = "1")]
    load_percentage: i32,
    #[prost(int32, tag = "2")]
    power_draw: i32,
    #[prost(int32, repeated, tag = "3")]
    core_temps: Vec<i32>,
}

#[derive(Clone, PartialEq, Message)]
struct RamMessage {
    #[prost(uint32, tag = "1")]
    used_mb: u32,
    #[prost(uint32, tag = "2")]
    total_mb: u32,
    #[prost(int32, tag = "3")]
    memory_clock: i32,
}

#[derive(Clone, PartialEq, Message)]
struct ServiceEventMessage {
    #[prost(string, tag = "1")]
    executable: String,
    #[prost(int32, tag = "2")]
    event_type: i32,
}

/// Encode a value to envelope bytes.
pub fn encode(value: &SystemValue) -> Vec<u8> {
    match value {
        SystemValue::Cpu(cpu) => CpuMessage {
            load_percentage: cpu.load_percentage,
            power_draw: cpu.power_draw,
            core_temps: cpu.core_temps.clone(),
        }
        .encode_to_vec(),
        SystemValue::Ram(ram) => RamMessage {
            used_mb: ram.used_mb,
            total_mb: ram.total_mb,
            memory_clock: ram.memory_clock,
        }
        .encode_to_vec(),
        SystemValue::ServiceEvent(event) => ServiceEventMessage {
            executable: event.executable.clone(),
            event_type: event.event_type.as_i32(),
        }
        .encode_to_vec(),
    }
}

/// Decode envelope bytes as a value of the given kind.
pub fn decode(data: &[u8], kind: Kind) -> Result<SystemValue, EnvelopeError> {
    let malformed = |source| EnvelopeError::Malformed { kind, source };

    match kind {
        Kind::Cpu => {
            let msg = CpuMessage::decode(data).map_err(malformed)?;
            Ok(SystemValue::Cpu(Cpu {
                load_percentage: msg.load_percentage,
                power_draw: msg.power_draw,
                core_temps: msg.core_temps,
            }))
        }
        Kind::Ram => {
            let msg = RamMessage::decode(data).map_err(malformed)?;
            Ok(SystemValue::Ram(Ram {
                used_mb: msg.used_mb,
                total_mb: msg.total_mb,
                memory_clock: msg.memory_clock,
            }))
        }
        Kind::ServiceEvent => {
            let msg = ServiceEventMessage::decode(data).map_err(malformed)?;
            let event_type = ServiceEventType::from_i32(msg.event_type)
                .ok_or(EnvelopeError::InvalidEventType(msg.event_type))?;
            Ok(SystemValue::ServiceEvent(ServiceEvent {
                executable: msg.executable,
                event_type,
            }))
        }
        Kind::Unknown => Err(EnvelopeError::UnsupportedKind(kind)),
    }
}
