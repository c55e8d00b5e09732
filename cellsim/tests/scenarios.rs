use cellsim::{ErrorPolicy, Event, Runner, Scenario};
use cellsim_core::{
    SimTime,
    bearer::{Classification, PacketDirection},
    handover::{HandoverNotification, HandoverState, NotificationKind},
    topology::{BaseStationId, Position, TerminalId},
};
use std::{cell::RefCell, rc::Rc};

const ENB1: BaseStationId = BaseStationId::new(1);
const ENB2: BaseStationId = BaseStationId::new(2);
const UE: TerminalId = TerminalId::new(1);

fn runner(document: &str) -> Runner {
    Scenario::from_json(document).unwrap().into_runner().unwrap()
}

const TWO_CELLS: &str = r#"{
    "base_stations": [
        { "position": { "x": 0.0, "y": 0.0 } },
        { "position": { "x": 10.0, "y": 0.0 } }
    ],
    "terminals": [{ "placement": "list", "positions": [{ "x": 1.0, "y": 0.0 }] }]
}"#;

fn record_notifications(runner: &mut Runner) -> Rc<RefCell<Vec<HandoverNotification>>> {
    let notifications = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&notifications);
    runner
        .network_mut()
        .subscribe_handover(move |notification| sink.borrow_mut().push(*notification));
    notifications
}

// ----------------------------------------------------------------------
// closest attachment follows the terminal
// ----------------------------------------------------------------------

#[test]
fn closest_attachment_follows_the_terminal() {
    let mut runner = runner(TWO_CELLS);
    runner.schedule(SimTime::ZERO, Event::AttachToClosest { terminal: UE }).unwrap();

    runner.run().unwrap();
    assert_eq!(runner.network().serving(UE), Some(ENB1));

    runner.schedule(SimTime::from_secs(1), Event::Move {
        terminal: UE,
        position: Position::new(9.0, 0.0, 0.0),
    }).unwrap();
    runner.schedule(SimTime::from_secs(1), Event::AttachToClosest { terminal: UE }).unwrap();
    let notifications = record_notifications(&mut runner);

    runner.run().unwrap();
    assert_eq!(runner.network().serving(UE), Some(ENB2));
    assert_eq!(
        runner.network().state(UE),
        HandoverState::Connected { serving: ENB2 }
    );

    // a direct attach is a detach followed by a new connection
    let kinds: Vec<NotificationKind> = notifications.borrow().iter().map(|n| n.kind).collect();
    assert_eq!(kinds, vec![
        NotificationKind::Detached,
        NotificationKind::ConnectionEstablished
    ]);
}

#[test]
fn explicit_handover_sequence() {
    let mut runner = runner(TWO_CELLS);
    let notifications = record_notifications(&mut runner);
    runner.schedule(SimTime::ZERO, Event::Attach {
        terminal: UE,
        base_station: ENB1,
    }).unwrap();
    runner.schedule(SimTime::from_secs(1), Event::HandoverStart {
        terminal: UE,
        target: ENB2,
    }).unwrap();

    runner.run_until(SimTime::from_secs(1)).unwrap();
    assert_eq!(
        runner.network().state(UE),
        HandoverState::HandoverInProgress {
            source: ENB1,
            target: ENB2
        }
    );

    runner.schedule(SimTime::from_millis(1_050), Event::HandoverEndOk { terminal: UE }).unwrap();
    runner.run().unwrap();
    assert_eq!(
        runner.network().state(UE),
        HandoverState::Connected { serving: ENB2 }
    );

    let notifications = notifications.borrow();
    let kinds: Vec<NotificationKind> = notifications.iter().map(|n| n.kind).collect();
    assert_eq!(kinds, vec![
        NotificationKind::ConnectionEstablished,
        NotificationKind::HandoverStart,
        NotificationKind::HandoverEndOk
    ]);
    let end = notifications[2];
    assert_eq!(end.source, Some(ENB1));
    assert_eq!(end.target, Some(ENB2));
    assert!(end.rnti.is_some());

    let counters = runner.network().handover().counters();
    assert_eq!(counters.handover_starts, 1);
    assert_eq!(counters.handover_successes, 1);
    assert_eq!(counters.detaches, 0);
}

// ----------------------------------------------------------------------
// bearer classification
// ----------------------------------------------------------------------

#[test]
fn bearer_classification() {
    let runner = runner(
        r#"{
        "base_stations": [{ "position": { "x": 0.0, "y": 0.0 } }],
        "terminals": [{ "placement": "list", "positions": [{ "x": 1.0, "y": 0.0 }] }],
        "bearers": [
            { "terminal": 1, "filter": [{ "direction": "downlink", "local": "1000" }] },
            { "terminal": 1, "filter": [{ "direction": "downlink", "local": "1001" }] }
        ]
    }"#,
    );
    let network = runner.network();

    let first = network.classify(UE, 49153, 1000, PacketDirection::Downlink);
    let Classification::Bearer(first) = first else {
        panic!("port 1000 should match a dedicated bearer");
    };
    assert_eq!(first.into_u64(), 1);
    assert_eq!(
        network.classify(UE, 49153, 2000, PacketDirection::Downlink),
        Classification::Default
    );
}

#[test]
fn deactivated_bearer_falls_back_to_default() {
    let mut runner = runner(
        r#"{
        "terminals": [{ "placement": "list", "positions": [{ "x": 0.0, "y": 0.0 }] }],
        "events": [
            { "at": "0s", "event": { "kind": "activate_bearer", "terminal": 1,
                "filter": [{ "direction": "uplink", "local": "5000-5010" }] } },
            { "at": "1s", "event": { "kind": "deactivate_bearer", "bearer": 1 } }
        ]
    }"#,
    );

    runner.run_until(SimTime::ZERO).unwrap();
    assert!(matches!(
        runner.network().classify(UE, 5005, 80, PacketDirection::Uplink),
        Classification::Bearer(_)
    ));

    runner.run().unwrap();
    assert_eq!(
        runner.network().classify(UE, 5005, 80, PacketDirection::Uplink),
        Classification::Default
    );
}

// ----------------------------------------------------------------------
// flow statistics
// ----------------------------------------------------------------------

const CONSTANT_BIT_RATE: &str = r#"{
    "config": { "aggregator": { "window": { "start": "0s", "stop": "1s" } } },
    "base_stations": [{ "position": { "x": 0.0, "y": 0.0 } }],
    "terminals": [{ "placement": "list", "positions": [{ "x": 1.0, "y": 0.0 }] }],
    "events": [{ "at": "0s", "event": { "kind": "auto_attach_all" } }],
    "traffic": [{
        "packet": {
            "terminal": 1,
            "tuple": { "source": "1.0.0.2:49153", "destination": "7.0.0.2:1000", "protocol": "udp" },
            "direction": "downlink",
            "size": 1000
        },
        "interval": "100ms",
        "start": "0s",
        "stop": "1s",
        "delay": "100ms"
    }]
}"#;

#[test]
fn constant_bit_rate_report() {
    let mut runner = runner(CONSTANT_BIT_RATE);
    runner.run().unwrap();

    let report = runner.network().report();
    assert_eq!(report.flows.len(), 1);
    let flow = &report.flows[0];
    assert_eq!(flow.rx_packets, 10);
    assert_eq!(flow.rx_bytes, 10_000);
    assert!((flow.throughput_mbps - 0.08).abs() < 1e-9);
    assert!((flow.mean_delay_ms - 100.0).abs() < 1e-9);
    assert_eq!(flow.mean_jitter_ms, 0.0);

    let text = report.to_string();
    assert!(text.starts_with("Flow 1 (1.0.0.2:49153 -> 7.0.0.2:1000) proto UDP\n"));
    assert!(text.contains("  TxOffered:  0.080000 Mbps\n"));
    assert!(text.contains("  Throughput: 0.080000 Mbps\n"));
    assert!(text.contains("  Mean delay:  100.000000 ms\n"));
    assert!(text.contains("  Mean flow throughput: 0.080000 Mbps\n"));

    // reporting does not consume anything
    assert_eq!(text, runner.network().report().to_string());
}

#[test]
fn flow_without_reception_reports_zeros() {
    let mut runner = runner(CONSTANT_BIT_RATE);
    runner.run_until(SimTime::from_millis(50)).unwrap();

    let report = runner.network().report();
    let flow = &report.flows[0];
    assert_eq!(flow.tx_packets, 1);
    assert_eq!(flow.rx_packets, 0);
    assert_eq!(flow.throughput_mbps, 0.0);
    assert_eq!(flow.mean_delay_ms, 0.0);
    assert_eq!(flow.mean_jitter_ms, 0.0);
    assert!(!report.to_string().contains("NaN"));
}

#[test]
fn empty_run_reports_zero_means() {
    let runner = runner("{}");
    let report = runner.network().report();

    assert!(report.flows.is_empty());
    assert_eq!(report.mean_throughput_mbps, 0.0);
    assert_eq!(report.mean_delay_ms, 0.0);
}

// ----------------------------------------------------------------------
// invalid stimuli
// ----------------------------------------------------------------------

#[test]
fn second_handover_start_is_dropped() {
    let mut runner = runner(
        r#"{
        "base_stations": [
            { "position": { "x": 0.0, "y": 0.0 } },
            { "position": { "x": 10.0, "y": 0.0 } },
            { "position": { "x": 20.0, "y": 0.0 } }
        ],
        "terminals": [{ "placement": "list", "positions": [{ "x": 1.0, "y": 0.0 }] }],
        "events": [
            { "at": "0s", "event": { "kind": "attach", "terminal": 1, "base_station": 1 } },
            { "at": "1s", "event": { "kind": "handover_start", "terminal": 1, "target": 2 } },
            { "at": "2s", "event": { "kind": "handover_start", "terminal": 1, "target": 3 } }
        ]
    }"#,
    );

    let summary = runner.run().unwrap();
    assert_eq!(summary.applied, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(
        runner.network().state(UE),
        HandoverState::HandoverInProgress {
            source: ENB1,
            target: ENB2
        }
    );
    assert_eq!(runner.network().handover().counters().invalid_transitions, 1);
}

#[test]
fn failed_handover_recovers() {
    let mut runner = runner(TWO_CELLS);
    runner.schedule(SimTime::ZERO, Event::Attach {
        terminal: UE,
        base_station: ENB1,
    }).unwrap();
    runner.schedule(SimTime::from_secs(1), Event::HandoverStart {
        terminal: UE,
        target: ENB2,
    }).unwrap();
    runner.schedule(SimTime::from_secs(2), Event::HandoverFailure {
        terminal: UE,
        reason: cellsim_core::handover::FailureReason::NoPreambleResponse,
    }).unwrap();

    runner.run().unwrap();
    assert!(matches!(
        runner.network().state(UE),
        HandoverState::HandoverFailed { source, .. } if source == ENB1
    ));

    runner.schedule(SimTime::from_secs(3), Event::ConnectionEstablished {
        terminal: UE,
        base_station: ENB2,
    }).unwrap();
    runner.run().unwrap();
    assert_eq!(
        runner.network().state(UE),
        HandoverState::Connected { serving: ENB2 }
    );
}

#[test]
fn unknown_terminal_aborts_or_is_skipped() {
    let document = r#"{
        "events": [
            { "at": "0s", "event": { "kind": "attach_to_closest", "terminal": 9 } },
            { "at": "1s", "event": { "kind": "auto_attach_all" } }
        ]
    }"#;

    let mut aborting = runner(document);
    let error = aborting.run().unwrap_err();
    assert!(error.source.is_unknown_entity());
    assert_eq!(aborting.pending(), 1);

    let mut skipping = runner(document).with_error_policy(ErrorPolicy::Skip);
    let summary = skipping.run().unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.applied, 1);
}
