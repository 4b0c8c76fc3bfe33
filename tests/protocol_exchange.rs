use mechatest_core::core::transport::SimulatedDevice;
use mechatest_core::{
    ControllerError, EquipmentConfig, EquipmentController, EquipmentStatus, ProtocolError,
    SimulatedTransport,
};

fn running_with(transport: SimulatedTransport) -> EquipmentController {
    let controller = EquipmentController::with_transport(Box::new(transport));
    controller
        .initialize(EquipmentConfig::new("SIM0", 9600).with_logging(false, "unused.log"))
        .unwrap();
    controller.start().unwrap();
    controller
}

#[test]
fn test_command_is_encoded_on_the_wire() {
    let transport = SimulatedTransport::new();
    let sent = transport.sent_commands();
    let controller = running_with(transport);

    controller.run_test("DUT-7", &["voltage", "5.0", "current", "0.1"]);
    controller.run_test::<&str>("DUT-8", &[]);

    assert_eq!(
        *sent.lock(),
        vec![
            "TEST:DUT-7:voltage:5.0:current:0.1".to_string(),
            "TEST:DUT-8".to_string(),
        ]
    );
}

#[test]
fn simulated_device_reading_passes() {
    let device = SimulatedDevice {
        jitter: 0.0,
        ..SimulatedDevice::default()
    };
    let controller = running_with(SimulatedTransport::new().with_device(device));

    let result = controller.run_test("DUT-1", &["voltage"]);
    assert!(result.passed);
    assert_eq!(result.measurement_value, 5.0);
    assert_eq!(result.units, "V");
    assert_eq!(result.notes, "Test completed successfully");
}

#[test]
fn scripted_fail_verdict() {
    let controller =
        running_with(SimulatedTransport::new().with_rule("TEST:", "RESULT:3.30:V:FAIL"));

    let result = controller.run_test("DUT-1", &["voltage"]);
    assert!(!result.passed);
    assert_eq!(result.measurement_value, 3.3);
    assert_eq!(controller.status(), EquipmentStatus::Running);
}

#[test]
fn garbage_reply_is_reported_in_notes() {
    let controller = running_with(SimulatedTransport::new().with_rule("TEST:", "GARBAGE"));

    let result = controller.run_test("DUT-1", &["voltage"]);
    assert!(!result.passed);
    assert!(result.notes.contains("GARBAGE"));
    assert!(controller.last_error().is_empty());
    assert_eq!(controller.status(), EquipmentStatus::Running);
}

#[test]
fn silent_instrument_times_out() {
    let controller = running_with(SimulatedTransport::silent());

    let result = controller.run_test("DUT-1", &["voltage"]);
    assert!(!result.passed);
    assert_eq!(result.notes, "No response from device");

    let stats = controller.transport_stats().unwrap();
    assert_eq!(stats.commands_sent, 1);
    assert_eq!(stats.timeouts, 1);
}

#[test]
fn paused_controller_refuses_tests() {
    let transport = SimulatedTransport::new();
    let sent = transport.sent_commands();
    let controller = running_with(transport);
    controller.pause().unwrap();

    let result = controller.run_test("DUT-1", &["voltage"]);
    assert!(!result.passed);
    assert_eq!(result.notes, "Equipment not in running state");
    assert!(sent.lock().is_empty());
}

#[test]
fn calibration_round_trip() {
    let transport = SimulatedTransport::new();
    let sent = transport.sent_commands();
    let controller = EquipmentController::with_transport(Box::new(transport));
    controller
        .initialize(EquipmentConfig::new("SIM0", 9600).with_logging(false, "unused.log"))
        .unwrap();

    controller.calibrate().unwrap();

    assert_eq!(controller.status(), EquipmentStatus::Idle);
    assert_eq!(*sent.lock(), vec!["CALIBRATE".to_string()]);
    let last = controller.history().pop().unwrap();
    assert_eq!(last.from, EquipmentStatus::Maintenance);
    assert_eq!(last.message, "Calibration completed successfully");
}

#[test]
fn calibration_without_reply_enters_error() {
    let controller = EquipmentController::with_transport(Box::new(SimulatedTransport::silent()));
    controller
        .initialize(EquipmentConfig::new("SIM0", 9600).with_logging(false, "unused.log"))
        .unwrap();

    let err = controller.calibrate().unwrap_err();
    assert!(matches!(err, ControllerError::Timeout(_)));
    assert_eq!(controller.status(), EquipmentStatus::Error);
    assert!(controller.last_error().starts_with("Calibration failed"));

    controller.stop().unwrap();
    assert_eq!(controller.status(), EquipmentStatus::Idle);
}

#[test]
fn calibration_nak_is_a_protocol_error() {
    let controller = EquipmentController::with_transport(Box::new(
        SimulatedTransport::new().with_rule("CALIBRATE", "CAL_FAIL:DRIFT"),
    ));
    controller
        .initialize(EquipmentConfig::new("SIM0", 9600).with_logging(false, "unused.log"))
        .unwrap();

    let err = controller.calibrate().unwrap_err();
    assert_eq!(
        err,
        ControllerError::Protocol(ProtocolError::CalibrationRejected("CAL_FAIL:DRIFT".into()))
    );
    assert_eq!(controller.status(), EquipmentStatus::Error);
}
