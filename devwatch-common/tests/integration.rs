//! Integration tests for the devwatch-common wire contract.

use devwatch_common::envelope::{decode, encode};
use devwatch_common::routing::{RULES, find_rule};
use devwatch_common::{
    Cpu, EnvelopeError, Kind, Ram, ServiceEvent, ServiceEventType, SystemValue, build_key,
    classify,
};

#[test]
fn test_full_publish_consume_contract() {
    let value = SystemValue::Cpu(Cpu {
        load_percentage: 72,
        power_draw: 140,
        core_temps: vec![70, 75, 78, 81],
    });

    // Producer side
    let key = build_key("device-3", &value);
    let bytes = encode(&value);
    assert_eq!(key, "device-3.metrics.cpu");
    assert!(!bytes.is_empty());

    // Consumer side
    let classified = classify(&key);
    assert_eq!(classified.device, "device-3");
    assert_eq!(classified.kind, Kind::Cpu);

    let decoded = decode(&bytes, classified.kind).expect("decode failed");
    assert_eq!(decoded, value);
}

#[test]
fn test_rule_decoders_match_kinds() {
    let samples = [
        SystemValue::from(Cpu {
            load_percentage: 10,
            power_draw: 20,
            core_temps: vec![30],
        }),
        SystemValue::from(Ram {
            used_mb: 4096,
            total_mb: 16384,
            memory_clock: 3200,
        }),
        SystemValue::from(ServiceEvent::started("postgres")),
        SystemValue::from(ServiceEvent::stopped("postgres")),
    ];

    for value in samples {
        let key = build_key("edge-7", &value);
        let (device, rule) = find_rule(&key);
        let rule = rule.expect("built key should match a rule");

        assert_eq!(device, "edge-7");
        assert_eq!(rule.kind(), value.kind());
        assert_eq!(rule.decode(&encode(&value)).unwrap(), value);
    }
}

#[test]
fn test_rules_are_ordered_and_disjoint() {
    let kinds: Vec<Kind> = RULES.iter().map(|rule| rule.kind()).collect();
    assert_eq!(kinds, vec![Kind::Cpu, Kind::Ram, Kind::ServiceEvent]);

    for remainder in [
        "metrics.cpu",
        "metrics.ram",
        "events.service.started",
        "events.service.stopped",
    ] {
        let matching = RULES.iter().filter(|rule| rule.matches(remainder)).count();
        assert_eq!(matching, 1, "remainder {}", remainder);
    }
}

#[test]
fn test_classification_is_total() {
    let keys = [
        "",
        ".",
        "..",
        "#",
        "*.#",
        "device",
        "device.metrics",
        "device.metrics.cpu.extra",
        "device.events.service",
        "device.events.service.started.now",
        "device.METRICS.CPU",
        "a.b.c.d.e.f",
    ];

    for key in keys {
        // Never panics, always yields a kind.
        let classified = classify(key);
        assert_eq!(classified.kind, Kind::Unknown, "key {:?}", key);
    }
}

#[test]
fn test_payload_event_type_is_authoritative() {
    // Key says started, payload says stop.
    let key = "device-1.events.service.started";
    let bytes = encode(&SystemValue::from(ServiceEvent::stopped("sshd")));

    let classified = classify(key);
    let decoded = decode(&bytes, classified.kind).unwrap();

    match decoded {
        SystemValue::ServiceEvent(event) => {
            assert_eq!(event.executable, "sshd");
            assert_eq!(event.event_type, ServiceEventType::Stop);
        }
        other => panic!("unexpected value {:?}", other),
    }
}

#[test]
fn test_cross_kind_payload_does_not_panic() {
    // A Ram envelope routed as Cpu decodes to some Cpu (wire types line up)
    // or fails as malformed; it never yields another variant.
    let bytes = encode(&SystemValue::from(Ram {
        used_mb: 1,
        total_mb: 2,
        memory_clock: 3,
    }));

    match decode(&bytes, Kind::Cpu) {
        Ok(value) => assert_eq!(value.kind(), Kind::Cpu),
        Err(e) => assert!(matches!(e, EnvelopeError::Malformed { .. })),
    }
}

#[test]
fn test_garbage_bytes_are_malformed() {
    let garbage = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff];
    for kind in [Kind::Cpu, Kind::Ram, Kind::ServiceEvent] {
        assert!(
            matches!(decode(&garbage, kind), Err(EnvelopeError::Malformed { .. })),
            "kind {}",
            kind
        );
    }
}
