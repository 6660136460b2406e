//! Threshold evaluation.
//!
//! Evaluation is a pure function of the value and the thresholds: the same
//! input always yields the same violations in the same order. Redelivered
//! duplicates therefore produce identical output and nothing accumulates.

use tracing::trace;

use devwatch_common::{Cpu, Ram, ServiceEvent, ServiceEventType, SystemValue};

use crate::config::Thresholds;

/// Check a value against the thresholds and describe every violation.
pub fn evaluate(device: &str, value: &SystemValue, thresholds: &Thresholds) -> Vec<String> {
    let violations = match value {
        SystemValue::Cpu(cpu) => evaluate_cpu(cpu, thresholds),
        SystemValue::Ram(ram) => evaluate_ram(ram, thresholds),
        SystemValue::ServiceEvent(event) => evaluate_service_event(event, thresholds),
    };

    trace!(device = %device, value = %value, violations = violations.len(), "Evaluated");
    violations
}

fn evaluate_cpu(cpu: &Cpu, thresholds: &Thresholds) -> Vec<String> {
    let limits = &thresholds.cpu;
    let mut violations = Vec::new();

    if let Some(temp) = cpu.average_temp().filter(|t| *t > limits.max_temp) {
        violations.push(format!(
            "Cpu temperature {} above threshold {}",
            temp, limits.max_temp
        ));
    }

    if cpu.load_percentage > limits.max_load {
        violations.push(format!(
            "Cpu load {} above threshold {}",
            cpu.load_percentage, limits.max_load
        ));
    }

    if cpu.power_draw > limits.max_power {
        violations.push(format!(
            "Cpu power draw {} above threshold {}",
            cpu.power_draw, limits.max_power
        ));
    }

    violations
}

fn evaluate_ram(ram: &Ram, thresholds: &Thresholds) -> Vec<String> {
    let limits = &thresholds.ram;
    let mut violations = Vec::new();

    if ram.total_mb == 0 {
        violations.push(format!(
            "Ram load cannot be computed: total is 0 with {} used",
            ram.used_mb
        ));
    } else {
        let load = u64::from(ram.used_mb) * 100 / u64::from(ram.total_mb);
        if load > limits.max_load {
            violations.push(format!(
                "Ram load {} above threshold {}",
                load, limits.max_load
            ));
        }
    }

    if ram.memory_clock > limits.max_clock {
        violations.push(format!(
            "Ram clock {} above threshold {}",
            ram.memory_clock, limits.max_clock
        ));
    }

    violations
}

fn evaluate_service_event(event: &ServiceEvent, thresholds: &Thresholds) -> Vec<String> {
    if event.event_type == ServiceEventType::Stop
        && thresholds.critical_processes.contains(&event.executable)
    {
        vec![format!("Critical service {} was stopped", event.executable)]
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> Thresholds {
        let mut thresholds = Thresholds::default();
        thresholds.critical_processes.insert("sshd".to_string());
        thresholds
    }

    fn cpu(load: i32, power: i32, temps: Vec<i32>) -> SystemValue {
        SystemValue::Cpu(Cpu {
            load_percentage: load,
            power_draw: power,
            core_temps: temps,
        })
    }

    #[test]
    fn test_cpu_temperature_violation() {
        let value = cpu(10, 50, vec![80, 90, 85]);

        let violations = evaluate("device-1", &value, &thresholds());

        assert_eq!(violations, vec!["Cpu temperature 85 above threshold 80"]);
    }

    #[test]
    fn test_cpu_violations_in_order() {
        let value = cpu(95, 200, vec![99]);

        let violations = evaluate("device-1", &value, &thresholds());

        assert_eq!(
            violations,
            vec![
                "Cpu temperature 99 above threshold 80",
                "Cpu load 95 above threshold 90",
                "Cpu power draw 200 above threshold 150",
            ]
        );
    }

    #[test]
    fn test_comparisons_are_strict() {
        let value = cpu(90, 150, vec![80, 80]);
        assert!(evaluate("device-1", &value, &thresholds()).is_empty());

        let ram = SystemValue::Ram(Ram {
            used_mb: 900,
            total_mb: 1000,
            memory_clock: 3600,
        });
        assert!(evaluate("device-1", &ram, &thresholds()).is_empty());
    }

    #[test]
    fn test_cpu_without_cores_skips_temperature() {
        let value = cpu(10, 10, vec![]);
        assert!(evaluate("device-1", &value, &thresholds()).is_empty());
    }

    #[test]
    fn test_ram_load_violation() {
        let value = SystemValue::Ram(Ram {
            used_mb: 15000,
            total_mb: 16000,
            memory_clock: 3800,
        });

        let violations = evaluate("device-1", &value, &thresholds());

        assert_eq!(
            violations,
            vec![
                "Ram load 93 above threshold 90",
                "Ram clock 3800 above threshold 3600",
            ]
        );
    }

    #[test]
    fn test_ram_zero_total_fails_closed() {
        let value = SystemValue::Ram(Ram {
            used_mb: 512,
            total_mb: 0,
            memory_clock: 3000,
        });

        let violations = evaluate("device-1", &value, &thresholds());

        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("cannot be computed"));
    }

    #[test]
    fn test_ram_large_values_do_not_overflow() {
        let value = SystemValue::Ram(Ram {
            used_mb: u32::MAX,
            total_mb: u32::MAX,
            memory_clock: 0,
        });
        assert_eq!(
            evaluate("device-1", &value, &thresholds()),
            vec!["Ram load 100 above threshold 90"]
        );
    }

    #[test]
    fn test_critical_service_stopped() {
        let stopped = SystemValue::from(ServiceEvent::stopped("sshd"));
        let started = SystemValue::from(ServiceEvent::started("sshd"));
        let other = SystemValue::from(ServiceEvent::stopped("nginx"));

        assert_eq!(
            evaluate("device-1", &stopped, &thresholds()),
            vec!["Critical service sshd was stopped"]
        );
        assert!(evaluate("device-1", &started, &thresholds()).is_empty());
        assert!(evaluate("device-1", &other, &thresholds()).is_empty());
    }

    #[test]
    fn test_evaluate_is_pure() {
        let value = cpu(99, 300, vec![100, 101]);
        let thresholds = thresholds();

        let first = evaluate("device-1", &value, &thresholds);
        let second = evaluate("device-1", &value, &thresholds);

        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_fractional_average() {
        let value = cpu(0, 0, vec![80, 81]);
        assert_eq!(
            evaluate("device-1", &value, &thresholds()),
            vec!["Cpu temperature 80.5 above threshold 80"]
        );
    }
}
