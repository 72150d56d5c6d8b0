mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{supervisor, PadState, ScriptedDevice};
use padpilot::controller::{
    clear_active, register_active, trigger_active_shutdown, ControllerError, Lifecycle,
    WorkerOutcome,
};

// The slot is process-wide, so the whole sequence lives in one test
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn external_shutdown_reaches_registered_supervisor() {
    assert!(!trigger_active_shutdown());

    let device = ScriptedDevice::new("/dev/input/event3");
    let first = supervisor(&[device.clone()], PadState::with_devices(1));
    let second = supervisor(&[], PadState::with_devices(1));

    register_active(first.trigger()).unwrap();
    assert!(matches!(
        register_active(second.trigger()),
        Err(ControllerError::ContractViolation(_))
    ));

    first.initialize(None).unwrap();
    let runner = {
        let first = first.clone();
        tokio::spawn(async move { first.run().await })
    };

    assert!(trigger_active_shutdown());
    let report = tokio::time::timeout(Duration::from_secs(3), runner)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(first.lifecycle(), Lifecycle::Stopped);
    assert_ne!(report.button_reader, WorkerOutcome::Detached);
    assert_eq!(device.releases.load(Ordering::SeqCst), 1);
    assert_eq!(second.lifecycle(), Lifecycle::Uninitialized);

    assert!(clear_active());
    assert!(!clear_active());
    assert!(!trigger_active_shutdown());

    register_active(second.trigger()).unwrap();
    assert!(clear_active());
}
