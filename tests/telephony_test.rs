//! Telephony integration tests against the emulator

use dialtone::config::{EmulatorConfig, ModemConfig, TelephonyConfig};
use dialtone::domain::call::{CallEventKind, CallState, DisconnectReason};
use dialtone::infrastructure::modem::{EmulatorChannel, ModemAdapter, ModemChannel, ModemError};
use dialtone::{DomainError, Telephony, TelephonyError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};

const NUMBER: &str = "5555552368";
const OTHER: &str = "5555550000";
const WAIT: Duration = Duration::from_secs(2);

struct Harness {
    emulator: Arc<EmulatorChannel>,
    modem: Arc<ModemAdapter>,
    telephony: Arc<Telephony>,
}

fn harness() -> Harness {
    harness_with(EmulatorConfig {
        auto_alert: false,
        ..EmulatorConfig::default()
    })
}

fn harness_with(config: EmulatorConfig) -> Harness {
    let emulator = Arc::new(EmulatorChannel::new(config));
    let modem = Arc::new(ModemAdapter::new(emulator.clone(), ModemConfig::default()));
    let telephony = Telephony::new(modem.clone(), TelephonyConfig::default());
    telephony.start();
    Harness {
        emulator,
        modem,
        telephony,
    }
}

async fn wait_for_state(call: &dialtone::Call, state: CallState) {
    let mut states = call.state_changes();
    timeout(WAIT, states.wait_for(|s| *s == state))
        .await
        .expect("timed out waiting for call state")
        .expect("call state channel closed");
}

#[tokio::test]
async fn test_empty_number_rejected() {
    let h = harness();

    let err = assert_err!(h.telephony.dial("").await);
    assert!(matches!(
        err,
        TelephonyError::Domain(DomainError::InvalidNumber(_))
    ));
    assert!(h.telephony.calls().is_empty());
    assert!(h.telephony.active().is_none());
    assert!(h.emulator.commands().is_empty());
}

#[tokio::test]
async fn test_malformed_numbers_rejected() {
    let h = harness();

    for bad in ["abc", "555-1234", "+", "123456789012345678901"] {
        let err = assert_err!(h.telephony.dial(bad).await);
        assert!(
            matches!(err, TelephonyError::Domain(DomainError::InvalidNumber(_))),
            "{:?}",
            bad
        );
    }
    assert!(h.telephony.calls().is_empty());
}

#[tokio::test]
async fn test_second_dial_while_active_is_busy() {
    let h = harness();

    let first = assert_ok!(h.telephony.dial(NUMBER).await);
    let err = assert_err!(h.telephony.dial(OTHER).await);

    assert_eq!(
        err,
        TelephonyError::Domain(DomainError::Busy { active: first.id() })
    );
    assert_eq!(h.telephony.calls().len(), 1);
    assert!(Arc::ptr_eq(&h.telephony.active().unwrap(), &first));
    assert_eq!(h.emulator.commands(), vec!["gsm dial 5555552368"]);
}

#[tokio::test]
async fn test_dial_again_after_call_ends() {
    let h = harness();

    let first = h.telephony.dial(NUMBER).await.unwrap();
    h.emulator.send("gsm busy 5555552368").await.unwrap();
    assert_eq!(
        timeout(WAIT, first.ended()).await.unwrap(),
        DisconnectReason::Busy
    );
    assert!(h.telephony.calls().is_empty());

    let second = assert_ok!(h.telephony.dial(OTHER).await);
    assert_ne!(first.id(), second.id());
    assert!(Arc::ptr_eq(&h.telephony.active().unwrap(), &second));
}

#[tokio::test]
async fn test_channel_down_fails_dial_and_recovers() {
    let h = harness();
    h.emulator.set_ready(false);

    let err = assert_err!(h.telephony.dial(NUMBER).await);
    assert_eq!(err, TelephonyError::Modem(ModemError::ChannelUnavailable));
    assert!(h.telephony.calls().is_empty());
    assert!(h.telephony.active().is_none());

    h.emulator.set_ready(true);
    let call = assert_ok!(h.telephony.dial(NUMBER).await);
    assert_eq!(call.state(), CallState::Dialing);
}

#[tokio::test]
async fn test_duplicate_reports_fire_once() {
    let h = harness();
    let call = h.telephony.dial(NUMBER).await.unwrap();

    let alerts = Arc::new(AtomicUsize::new(0));
    {
        let alerts = alerts.clone();
        call.on(CallEventKind::Alerting, move |_| {
            alerts.fetch_add(1, Ordering::SeqCst);
        });
    }

    let ringing = format!("outbound to  {} : ringing", NUMBER);
    h.emulator.inject(ringing.clone());
    h.emulator.inject(ringing);
    h.emulator.send("gsm accept 5555552368").await.unwrap();

    // Reports are applied in order, so both duplicates are done by now
    wait_for_state(&call, CallState::Connected).await;
    assert_eq!(alerts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stale_and_malformed_reports_ignored() {
    let h = harness();
    let call = h.telephony.dial(NUMBER).await.unwrap();

    h.emulator.inject("garbage from the radio");
    h.emulator.inject(format!("outbound to  {} : active", OTHER));
    h.emulator.send("gsm alert 5555552368").await.unwrap();

    wait_for_state(&call, CallState::Alerting).await;
    assert_eq!(h.telephony.calls().len(), 1);
}

#[tokio::test]
async fn test_regressing_report_does_not_move_call() {
    let h = harness();
    let call = h.telephony.dial(NUMBER).await.unwrap();
    h.emulator.send("gsm accept 5555552368").await.unwrap();
    wait_for_state(&call, CallState::Connected).await;

    h.emulator.inject(format!("outbound to  {} : ringing", NUMBER));
    h.emulator.send("gsm hold 5555552368").await.unwrap();
    // Let the relay drain both reports
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert_eq!(call.state(), CallState::Connected);
    assert!(Arc::ptr_eq(&h.telephony.active().unwrap(), &call));
}

#[tokio::test]
async fn test_hang_up_retry_after_channel_failure() {
    let h = harness();
    let call = h.telephony.dial(NUMBER).await.unwrap();

    let disconnecting = Arc::new(AtomicUsize::new(0));
    {
        let disconnecting = disconnecting.clone();
        call.on(CallEventKind::Disconnecting, move |_| {
            disconnecting.fetch_add(1, Ordering::SeqCst);
        });
    }

    h.emulator.set_ready(false);
    let err = assert_err!(h.telephony.hang_up(&call).await);
    assert_eq!(err, TelephonyError::Modem(ModemError::ChannelUnavailable));
    assert_eq!(call.state(), CallState::Disconnecting);
    assert_eq!(h.telephony.calls().len(), 1);

    h.emulator.set_ready(true);
    assert_ok!(h.telephony.hang_up(&call).await);
    assert_eq!(
        timeout(WAIT, call.ended()).await.unwrap(),
        DisconnectReason::LocalHangup
    );
    assert_eq!(disconnecting.load(Ordering::SeqCst), 1);
    assert!(h.telephony.calls().is_empty());
}

#[tokio::test]
async fn test_hang_up_after_disconnect_is_not_found() {
    let h = harness();
    let call = h.telephony.dial(NUMBER).await.unwrap();
    h.emulator.send("gsm busy 5555552368").await.unwrap();
    timeout(WAIT, call.ended()).await.unwrap();

    let err = assert_err!(h.telephony.hang_up(&call).await);
    assert!(matches!(err, TelephonyError::Domain(DomainError::NotFound(_))));
}

#[tokio::test]
async fn test_queued_commands_all_complete() {
    let h = harness();
    h.telephony.dial(NUMBER).await.unwrap();

    let (a, b, c) = tokio::join!(
        h.modem.request_call_list(),
        h.modem.request_call_list(),
        h.modem.raw_call_list()
    );
    assert_eq!(a.unwrap().len(), 1);
    assert_eq!(b.unwrap().len(), 1);
    assert_eq!(c.unwrap().len(), 1);
}

#[tokio::test]
async fn test_shutdown_stops_relay() {
    let h = harness();
    let call = h.telephony.dial(NUMBER).await.unwrap();

    h.telephony.shutdown();
    h.emulator.send("gsm alert 5555552368").await.unwrap();
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert_eq!(call.state(), CallState::Dialing);
}

#[tokio::test]
async fn test_reconcile_after_lifecycle() {
    let h = harness();
    let call = h.telephony.dial(NUMBER).await.unwrap();
    h.emulator.send("gsm alert 5555552368").await.unwrap();
    wait_for_state(&call, CallState::Alerting).await;

    let report = h.telephony.reconcile().await.unwrap();
    assert!(report.is_consistent(), "{:?}", report);

    // Shut the relay off so the modem runs ahead of local state
    h.telephony.shutdown();
    h.emulator.send("gsm accept 5555552368").await.unwrap();
    let report = h.telephony.reconcile().await.unwrap();
    assert_eq!(report.mismatched.len(), 1);
    assert_eq!(report.mismatched[0].local, CallState::Alerting);
    assert_eq!(call.state(), CallState::Alerting);
}

#[tokio::test]
async fn test_lost_release_report_does_not_wedge_telephony() {
    let h = harness_with(EmulatorConfig {
        auto_alert: false,
        event_buffer: 1,
    });
    let call = h.telephony.dial(NUMBER).await.unwrap();

    // The remote end goes away and the `released` report is overrun
    h.emulator.send("gsm cancel 5555552368").await.unwrap();
    h.emulator.inject("+CSQ: 12,99");
    h.emulator.inject("+CSQ: 13,99");

    assert_ok!(h.telephony.hang_up(&call).await);
    assert_eq!(
        timeout(WAIT, call.ended()).await.unwrap(),
        DisconnectReason::LocalHangup
    );
    assert!(h.telephony.active().is_none());
    assert!(h.telephony.reconcile().await.unwrap().is_consistent());

    let next = assert_ok!(h.telephony.dial(OTHER).await);
    assert!(Arc::ptr_eq(&h.telephony.active().unwrap(), &next));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dial_returns_dialing_call_with_auto_alert() {
    let h = harness_with(EmulatorConfig::default());

    for _ in 0..20 {
        let call = h.telephony.dial(NUMBER).await.unwrap();
        assert_eq!(call.state(), CallState::Dialing);

        let (tx, mut rx) = mpsc::unbounded_channel();
        call.on(CallEventKind::Alerting, move |event| {
            let _ = tx.send(event.state);
        });
        assert_eq!(
            timeout(WAIT, rx.recv()).await.unwrap(),
            Some(CallState::Alerting)
        );

        h.telephony.hang_up(&call).await.unwrap();
        assert_eq!(
            timeout(WAIT, call.ended()).await.unwrap(),
            DisconnectReason::LocalHangup
        );
    }
}
