use mechatest_core::{
    EquipmentConfig, EquipmentController, EquipmentStatus, SimulatedTransport,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;

fn simulated_config() -> EquipmentConfig {
    EquipmentConfig::new("SIM0", 115200)
        .with_interface("simulated")
        .with_logging(false, "unused.log")
}

fn recording(controller: &EquipmentController) -> Arc<Mutex<Vec<(EquipmentStatus, String)>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    controller.set_status_callback(move |status, message| {
        sink.lock().push((status, message.to_string()));
    });
    seen
}

#[test]
fn initialize_through_interface_key() {
    let controller = EquipmentController::new();
    let seen = recording(&controller);

    controller.initialize(simulated_config()).unwrap();

    assert!(controller.is_connected());
    assert_eq!(controller.status(), EquipmentStatus::Idle);
    assert_eq!(controller.config(), Some(simulated_config()));
    assert!(controller.connection_info().contains("SIM0"));
    assert_eq!(
        *seen.lock(),
        vec![(
            EquipmentStatus::Idle,
            "Equipment initialized successfully".to_string()
        )]
    );
}

#[test]
fn full_lifecycle_notifies_in_order() {
    let controller = EquipmentController::with_transport(Box::new(SimulatedTransport::new()));
    controller.initialize(simulated_config()).unwrap();
    let seen = recording(&controller);

    controller.start().unwrap();
    controller.pause().unwrap();
    controller.resume().unwrap();
    controller.stop().unwrap();

    let statuses: Vec<_> = seen.lock().iter().map(|(s, _)| *s).collect();
    assert_eq!(
        statuses,
        vec![
            EquipmentStatus::Running,
            EquipmentStatus::Paused,
            EquipmentStatus::Running,
            EquipmentStatus::Idle,
        ]
    );
    assert_eq!(seen.lock()[1].1, "Equipment paused");

    let history = controller.history();
    assert_eq!(history.len(), 5);
    assert_eq!(history[0].message, "Equipment initialized successfully");
    assert_eq!(history[4].from, EquipmentStatus::Running);
    assert_eq!(history[4].to, EquipmentStatus::Idle);
}

#[test]
fn rejected_operations_do_not_notify() {
    let controller = EquipmentController::new();
    let seen = recording(&controller);

    assert!(controller.pause().is_err());
    assert!(controller.resume().is_err());
    controller.stop().unwrap();

    assert!(seen.lock().is_empty());
    assert_eq!(controller.status(), EquipmentStatus::Idle);
    assert_eq!(controller.last_error(), "Equipment must be paused to resume");
}

#[test]
fn unreachable_port_leaves_controller_usable() {
    let controller = EquipmentController::with_transport(Box::new(
        SimulatedTransport::new().refusing_connect(),
    ));

    assert!(controller.initialize(simulated_config()).is_err());
    assert_eq!(controller.status(), EquipmentStatus::Idle);
    assert!(controller
        .last_error()
        .starts_with("Failed to connect to device on port SIM0"));

    controller.start().unwrap();
    let result = controller.run_test("DUT-1", &["voltage"]);
    assert!(!result.passed);
    assert_eq!(result.notes, "Hardware not connected");
    assert_eq!(controller.status(), EquipmentStatus::Running);
}

#[test]
fn shutdown_returns_to_idle_and_disconnects() {
    let controller = EquipmentController::with_transport(Box::new(SimulatedTransport::new()));
    controller.initialize(simulated_config()).unwrap();
    controller.start().unwrap();

    controller.shutdown();

    assert_eq!(controller.status(), EquipmentStatus::Idle);
    assert!(!controller.is_connected());
}

#[test]
fn status_is_readable_from_many_threads() {
    let controller = Arc::new(EquipmentController::with_transport(Box::new(
        SimulatedTransport::new(),
    )));
    controller.initialize(simulated_config()).unwrap();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let controller = Arc::clone(&controller);
            thread::spawn(move || {
                for _ in 0..200 {
                    let status = controller.status();
                    assert!(EquipmentStatus::all().contains(&status));
                }
            })
        })
        .collect();

    for _ in 0..50 {
        controller.start().unwrap();
        controller.pause().unwrap();
        controller.stop().unwrap();
    }

    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(controller.status(), EquipmentStatus::Idle);
    assert_eq!(controller.transition_count(), 151);
}

#[test]
fn concurrent_starts_admit_exactly_one() {
    let controller = Arc::new(EquipmentController::new());
    let seen = recording(&controller);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let controller = Arc::clone(&controller);
            thread::spawn(move || controller.start().is_ok())
        })
        .collect();
    let accepted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(accepted, 1);
    assert_eq!(seen.lock().len(), 1);
    assert_eq!(controller.status(), EquipmentStatus::Running);
}
