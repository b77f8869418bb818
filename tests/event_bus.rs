// tests/event_bus.rs

use proctor::events::EventBus;
use proctor_test_utils::events::drain;

#[test]
fn test_every_subscriber_sees_events_in_emission_order() {
    let bus: EventBus<u32> = EventBus::new();
    let mut a = bus.subscribe();
    let mut b = bus.subscribe();

    for i in 0..5 {
        bus.emit(i);
    }

    assert_eq!(drain(&mut a), vec![0, 1, 2, 3, 4]);
    assert_eq!(drain(&mut b), vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_late_subscribers_only_see_later_events() {
    let bus: EventBus<&'static str> = EventBus::new();
    bus.emit("before");
    let mut rx = bus.subscribe();
    bus.emit("after");

    assert_eq!(drain(&mut rx), vec!["after"]);
}

#[test]
fn test_dropped_subscribers_are_pruned() {
    let bus: EventBus<u8> = EventBus::new();
    let keep = bus.subscribe();
    let gone = bus.subscribe();
    assert_eq!(bus.subscriber_count(), 2);

    drop(gone);
    bus.emit(1);
    assert_eq!(bus.subscriber_count(), 1);
    drop(keep);
}

#[test]
fn test_clones_share_subscribers() {
    let bus: EventBus<u8> = EventBus::new();
    let clone = bus.clone();
    let mut rx = bus.subscribe();

    clone.emit(7);
    assert_eq!(drain(&mut rx), vec![7]);
}
