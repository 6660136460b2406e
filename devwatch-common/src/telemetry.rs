use std::fmt;

/// A single value reported by a device agent.
///
/// The set of variants is closed: envelope encoding, routing-key derivation,
/// classification rules and threshold evaluation all match on it exhaustively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemValue {
    Cpu(Cpu),
    Ram(Ram),
    ServiceEvent(ServiceEvent),
}

impl SystemValue {
    /// Get the classification kind for this value.
    pub fn kind(&self) -> Kind {
        match self {
            SystemValue::Cpu(_) => Kind::Cpu,
            SystemValue::Ram(_) => Kind::Ram,
            SystemValue::ServiceEvent(_) => Kind::ServiceEvent,
        }
    }
}

impl From<Cpu> for SystemValue {
    fn from(v: Cpu) -> Self {
        SystemValue::Cpu(v)
    }
}

impl From<Ram> for SystemValue {
    fn from(v: Ram) -> Self {
        SystemValue::Ram(v)
    }
}

impl From<ServiceEvent> for SystemValue {
    fn from(v: ServiceEvent) -> Self {
        SystemValue::ServiceEvent(v)
    }
}

impl fmt::Display for SystemValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemValue::Cpu(cpu) => write!(f, "Cpu(load={}%)", cpu.load_percentage),
            SystemValue::Ram(ram) => write!(f, "Ram({}/{}mb)", ram.used_mb, ram.total_mb),
            SystemValue::ServiceEvent(event) => {
                write!(f, "ServiceEvent({}, {})", event.executable, event.event_type)
            }
        }
    }
}

/// CPU metrics sample.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cpu {
    /// Total load (0-100%).
    pub load_percentage: i32,
    /// Package power draw (W).
    pub power_draw: i32,
    /// Per-core temperatures (°C).
    pub core_temps: Vec<i32>,
}

impl Cpu {
    /// Mean core temperature, or `None` when no cores were reported.
    pub fn average_temp(&self) -> Option<f64> {
        if self.core_temps.is_empty() {
            return None;
        }
        let sum: i64 = self.core_temps.iter().map(|t| i64::from(*t)).sum();
        Some(sum as f64 / self.core_temps.len() as f64)
    }
}

/// Memory metrics sample.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ram {
    pub used_mb: u32,
    pub total_mb: u32,
    /// Memory clock (MHz).
    pub memory_clock: i32,
}

/// A service started or stopped on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEvent {
    pub executable: String,
    pub event_type: ServiceEventType,
}

impl ServiceEvent {
    pub fn started(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            event_type: ServiceEventType::Start,
        }
    }

    pub fn stopped(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            event_type: ServiceEventType::Stop,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceEventType {
    Start,
    Stop,
}

impl ServiceEventType {
    /// Wire value of the event type (`Start = 1`, `Stop = 2`).
    pub fn as_i32(&self) -> i32 {
        match self {
            ServiceEventType::Start => 1,
            ServiceEventType::Stop => 2,
        }
    }

    /// Parse a wire value. Returns `None` for unset (0) or unknown values.
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(ServiceEventType::Start),
            2 => Some(ServiceEventType::Stop),
            _ => None,
        }
    }
}

impl fmt::Display for ServiceEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceEventType::Start => write!(f, "start"),
            ServiceEventType::Stop => write!(f, "stop"),
        }
    }
}

/// Value kind recovered from a routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Cpu,
    Ram,
    ServiceEvent,
    /// Traffic this consumer does not understand. Not an error.
    Unknown,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Cpu => "cpu",
            Kind::Ram => "ram",
            Kind::ServiceEvent => "service_event",
            Kind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
