//! Orchestrator behavior over in-memory modems.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ticprims_core::{
    CoreConfig, CoreError, CoreFrame, ErrorCode, Identifier, Subscriber, TicCore,
};
use ticprims_frame::ModeSelection;
use ticprims_transport::memory::{MemoryTransportFactory, StaticPortFinder};
use ticprims_transport::PortDescriptor;

const HISTORIC_FRAME: &[u8] = b"\x02\nADCO 031664001115 +\r\nOPTARIF BASE b\r\nISOUSC 30 3\r\x03";

enum Seen {
    Data(CoreFrame),
    Error(CoreError),
}

struct Recorder {
    sender: Mutex<Sender<Seen>>,
}

fn recorder() -> (Arc<dyn Subscriber>, Receiver<Seen>) {
    let (sender, receiver) = mpsc::channel();
    let subscriber: Arc<dyn Subscriber> = Arc::new(Recorder {
        sender: Mutex::new(sender),
    });
    (subscriber, receiver)
}

impl Subscriber for Recorder {
    fn on_data(&self, frame: CoreFrame) {
        let _ = self.sender.lock().expect("lock").send(Seen::Data(frame));
    }

    fn on_error(&self, error: CoreError) {
        let _ = self.sender.lock().expect("lock").send(Seen::Error(error));
    }
}

struct Harness {
    finder: StaticPortFinder,
    factory: MemoryTransportFactory,
    core: TicCore,
}

fn harness(config: CoreConfig) -> Harness {
    let finder = StaticPortFinder::new();
    let factory = MemoryTransportFactory::new();
    let core = TicCore::new(Arc::new(finder.clone()), Arc::new(factory.clone()), config);
    Harness {
        finder,
        factory,
        core,
    }
}

fn quiet_config() -> CoreConfig {
    // Long read timeout so idle streams do not publish timeouts mid-test.
    CoreConfig::default()
        .with_mode(ModeSelection::Historic)
        .with_read_timeout(Some(Duration::from_secs(30)))
        .with_poll_interval(Duration::from_millis(20))
}

fn modem(path: &str, serial: &str) -> PortDescriptor {
    let mut descriptor = PortDescriptor::from_path(path);
    descriptor.serial_number = Some(serial.to_string());
    descriptor
}

fn unplug_notices(events: &Receiver<Seen>, wait: Duration) -> Vec<CoreError> {
    let deadline = Instant::now() + wait;
    let mut notices = Vec::new();
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        match events.recv_timeout(left) {
            Ok(Seen::Error(err)) if err.code == ErrorCode::StreamUnplugged => notices.push(err),
            Ok(_) => {}
            Err(_) => break,
        }
    }
    notices
}

#[test]
fn plugged_modems_become_available() {
    let h = harness(quiet_config());
    h.finder.plug(modem("/dev/ttyMEM0", "A1"));
    h.finder.plug(modem("/dev/ttyMEM1", "B2"));
    h.finder.plug(modem("/dev/ttyMEM2", "C3"));

    let changes = h.core.refresh().expect("refresh should succeed");
    assert_eq!(changes.plugged.len(), 3);

    let mut serials = h
        .core
        .available_tics()
        .iter()
        .filter_map(|id| id.serial_number().map(str::to_string))
        .collect::<Vec<_>>();
    serials.sort();
    assert_eq!(serials, ["A1", "B2", "C3"]);
    assert_eq!(h.core.modems_info().len(), 3);
}

#[test]
fn unplug_notifies_each_subscriber_once() {
    let h = harness(quiet_config());
    h.finder.plug(modem("/dev/ttyMEM0", "A1"));
    h.finder.plug(modem("/dev/ttyMEM1", "B2"));
    h.core.refresh().expect("refresh");

    let (global, global_events) = recorder();
    let (direct, direct_events) = recorder();
    let (bystander, bystander_events) = recorder();
    h.core.subscribe(global).expect("subscribe");
    let gone = Identifier::serial("A1").expect("identifier");
    let stays = Identifier::serial("B2").expect("identifier");
    h.core.subscribe_to(&gone, direct).expect("subscribe_to");
    h.core.subscribe_to(&stays, bystander).expect("subscribe_to");

    h.finder.unplug("/dev/ttyMEM0");
    let changes = h.core.refresh().expect("refresh");
    assert_eq!(changes.unplugged.len(), 1);
    assert_eq!(h.core.available_tics().len(), 1);

    let wait = Duration::from_millis(300);
    let global_notices = unplug_notices(&global_events, wait);
    let direct_notices = unplug_notices(&direct_events, wait);
    assert_eq!(global_notices.len(), 1);
    assert_eq!(direct_notices.len(), 1);
    assert_eq!(direct_notices[0].identifier.serial_number(), Some("A1"));
    assert!(unplug_notices(&bystander_events, wait).is_empty());
}

#[test]
fn global_subscriber_follows_new_modems() {
    let h = harness(quiet_config());
    let (subscriber, events) = recorder();
    h.core.subscribe(Arc::clone(&subscriber)).expect("subscribe");
    h.core.subscribe(Arc::clone(&subscriber)).expect("second subscribe is a no-op");

    h.finder.plug(modem("/dev/ttyMEM0", "A1"));
    h.factory.line("/dev/ttyMEM0").feed(HISTORIC_FRAME);
    h.core.refresh().expect("refresh");

    match events.recv_timeout(Duration::from_secs(2)).expect("frame") {
        Seen::Data(frame) => {
            assert_eq!(frame.identifier.serial_number(), Some("A1"));
            assert_eq!(frame.frame.value("ISOUSC"), Some("30"));
            assert!(frame.frame.is_valid());
        }
        Seen::Error(err) => panic!("unexpected error: {err}"),
    }
    assert!(events.recv_timeout(Duration::from_millis(100)).is_err());

    assert_eq!(h.core.identifiers_for(&subscriber).len(), 1);
    h.core.unsubscribe(&subscriber);
    assert!(h.core.identifiers_for(&subscriber).is_empty());
}

#[test]
fn subscribe_to_unknown_identifier_fails() {
    let h = harness(quiet_config());
    h.finder.plug(modem("/dev/ttyMEM0", "A1"));
    h.core.refresh().expect("refresh");

    let (subscriber, _events) = recorder();
    let missing = Identifier::serial("ZZ").expect("identifier");
    let err = h
        .core
        .subscribe_to(&missing, Arc::clone(&subscriber))
        .expect_err("no modem has serial ZZ");
    assert_eq!(err.code(), ErrorCode::StreamIdentifierNotFound);

    h.core.unsubscribe_from(&missing, &subscriber);
    assert!(h.core.identifiers_for(&subscriber).is_empty());
}

#[test]
fn identifiers_for_lists_both_routes() {
    let h = harness(quiet_config());
    h.finder.plug(modem("/dev/ttyMEM0", "A1"));
    h.finder.plug(modem("/dev/ttyMEM1", "B2"));
    h.core.refresh().expect("refresh");

    let (subscriber, _events) = recorder();
    let first = Identifier::serial("A1").expect("identifier");
    h.core
        .subscribe_to(&first, Arc::clone(&subscriber))
        .expect("subscribe_to");
    assert_eq!(h.core.identifiers_for(&subscriber).len(), 1);

    h.core.subscribe(Arc::clone(&subscriber)).expect("subscribe");
    assert_eq!(h.core.identifiers_for(&subscriber).len(), 2);

    h.core.unsubscribe(&subscriber);
    let remaining = h.core.identifiers_for(&subscriber);
    assert_eq!(remaining.len(), 1);
    assert!(remaining[0].matches(&first));
}

#[test]
fn polling_picks_up_plug_and_unplug() {
    let h = harness(quiet_config());
    h.core.start().expect("start");
    let (subscriber, events) = recorder();
    h.core.subscribe(subscriber).expect("subscribe");

    h.finder.plug(modem("/dev/ttyMEM0", "A1"));
    let deadline = Instant::now() + Duration::from_secs(2);
    while h.core.available_tics().is_empty() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(h.core.available_tics().len(), 1);

    h.finder.unplug("/dev/ttyMEM0");
    assert_eq!(unplug_notices(&events, Duration::from_millis(500)).len(), 1);
    assert!(h.core.available_tics().is_empty());

    h.core.stop();
}

#[test]
fn finder_failure_leaves_registry_untouched() {
    let h = harness(quiet_config());
    h.finder.plug(modem("/dev/ttyMEM0", "A1"));
    h.core.refresh().expect("refresh");

    h.finder.set_failing(true);
    h.finder.unplug("/dev/ttyMEM0");
    assert!(h.core.refresh().is_err());
    assert_eq!(h.core.available_tics().len(), 1);

    h.finder.set_failing(false);
    assert_eq!(h.core.refresh().expect("refresh").unplugged.len(), 1);
}
