mod common;

use bus_manager::BusError;
use embassy_futures::join::join;
use embassy_futures::yield_now;
use imu_sampler::{
    AddressErrorKind, AddressField, AddressParseError, ErrorPolicy, ImuConfig,
    ImuController, ImuState, StartError,
};
use lsm9ds1::{Channel, ConfigStep};

use common::*;

fn config() -> ImuConfig {
    ImuConfig {
        bus: "I2C1".try_into().unwrap(),
        ..ImuConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[futures_test::test]
async fn samples_both_channels_until_stopped() {
    let rig = rig();
    let controller = ImuController::new(&rig.manager, config());
    assert_eq!(controller.state(), ImuState::Unconfigured);

    let clock = TickClock::default();
    let sink = RecordingSink::default();
    let delay = YieldDelay::default();

    let (result, ()) = join(controller.run(delay.clone(), &clock, &sink), async {
        while sink.len() < 10 {
            assert!(matches!(
                controller.state(),
                ImuState::Configuring | ImuState::Sampling
            ));
            yield_now().await;
        }
        controller.stop();
    })
    .await;
    let summary = result.unwrap();

    assert_eq!(controller.state(), ImuState::Closed);
    assert!(!controller.is_active());

    let gyro = sink.of(Channel::Gyroscope);
    let accel = sink.of(Channel::Accelerometer);
    assert!(!gyro.is_empty() && !accel.is_empty());
    assert_eq!(summary.gyro.cycles as usize, gyro.len());
    assert_eq!(summary.accel.cycles as usize, accel.len());
    assert!(!summary.gyro.failed && !summary.accel.failed);

    for reading in &gyro {
        assert!(reading.valid);
        assert_close(reading.scaled.x, 244.9925);
        assert_close(reading.scaled.y, 0.0);
        assert_close(reading.scaled.z, -245.0);
    }
    for reading in &accel {
        assert!(reading.valid);
        assert_eq!(reading.scaled.x, 1.0);
        assert_eq!(reading.scaled.y, -1.0);
        assert_eq!(reading.scaled.z, 0.0);
    }
    for readings in [&gyro, &accel] {
        assert!(readings
            .windows(2)
            .all(|w| w[0].timestamp_us < w[1].timestamp_us));
    }

    // One sleep of the default interval after every reading.
    let sleeps = delay.sleeps.borrow();
    assert_eq!(sleeps.len(), gyro.len() + accel.len());
    assert!(sleeps.iter().all(|&ns| ns == 100_000_000));

    assert_eq!(controller.resolution(Channel::Gyroscope), 245.0 / 32768.0);
    assert_eq!(controller.resolution(Channel::Accelerometer), 2.0 / 32768.0);
}

#[futures_test::test]
async fn transactions_never_interleave() {
    let rig = rig();
    let controller = ImuController::new(&rig.manager, config());
    let clock = TickClock::default();
    let sink = RecordingSink::default();

    let (result, ()) =
        join(controller.run(YieldDelay::default(), &clock, &sink), async {
            while sink.len() < 40 {
                yield_now().await;
            }
            controller.stop();
        })
        .await;
    result.unwrap();

    let state = rig.state.borrow();
    assert!(!state.interleaved);
    assert!(state.bursts(OUT_X_L_G) >= 10);
    assert!(state.bursts(OUT_X_L_XL) >= 10);
}

#[futures_test::test]
async fn configures_then_powers_down_both_channels() {
    let rig = rig();
    let controller = ImuController::new(&rig.manager, config());
    let clock = TickClock::default();
    let sink = RecordingSink::default();

    controller.stop();
    controller
        .run(YieldDelay::default(), &clock, &sink)
        .await
        .unwrap();

    let state = rig.state.borrow();
    // Bring-up value, selector write, power-down.
    assert_eq!(state.writes_to(CTRL_REG1_G), [0xC0, 0xC0, 0x00]);
    assert_eq!(state.writes_to(CTRL_REG6_XL), [0x00, 0xC0, 0x00]);
    assert_eq!(state.reg(AG, 0x1E), 0x38);
    assert_eq!(state.reg(AG, 0x1F), 0x38);
}

#[futures_test::test]
async fn releases_the_bus_exactly_once() {
    let rig = rig();
    let controller = ImuController::new(&rig.manager, config());
    let clock = TickClock::default();
    let sink = RecordingSink::default();

    let (result, ()) =
        join(controller.run(YieldDelay::default(), &clock, &sink), async {
            while sink.len() < 4 {
                yield_now().await;
            }
            controller.stop();
        })
        .await;
    result.unwrap();

    assert_eq!(rig.manager.release_count(), 1);
    assert_eq!(rig.manager.user_count(), 0);
    assert_eq!(rig.manager.is_active(), Some(false));
    assert_eq!(rig.opened.get(), 1);
    assert_eq!(rig.closed.get(), 1);
}

#[futures_test::test]
async fn no_new_bursts_after_stop() {
    let rig = rig();
    let controller = ImuController::new(&rig.manager, config());
    let clock = TickClock::default();
    let sink = RecordingSink::default();
    let mut at_stop = (0, 0);

    let (result, ()) =
        join(controller.run(YieldDelay::default(), &clock, &sink), async {
            while sink.len() < 6 {
                yield_now().await;
            }
            let state = rig.state.borrow();
            at_stop = (state.bursts(OUT_X_L_G), state.bursts(OUT_X_L_XL));
            drop(state);
            controller.stop();
        })
        .await;
    result.unwrap();

    let state = rig.state.borrow();
    // At most the cycle that was already in flight.
    assert!(state.bursts(OUT_X_L_G) - at_stop.0 <= 1);
    assert!(state.bursts(OUT_X_L_XL) - at_stop.1 <= 1);
}

#[futures_test::test]
async fn wrong_identity_is_not_fatal() {
    let rig = rig();
    rig.state.borrow_mut().regs.insert((AG, 0x0F), 0x00);
    let controller = ImuController::new(&rig.manager, config());
    let clock = TickClock::default();
    let sink = RecordingSink::default();

    let (result, ()) =
        join(controller.run(YieldDelay::default(), &clock, &sink), async {
            while sink.len() < 2 {
                yield_now().await;
            }
            controller.stop();
        })
        .await;
    result.unwrap();
    assert!(sink.len() >= 2);
}

// ---------------------------------------------------------------------------
// Start-up failures
// ---------------------------------------------------------------------------

#[futures_test::test]
async fn unknown_bus_aborts_start_up() {
    let rig = rig();
    let mut config = config();
    config.bus = "SPI0".try_into().unwrap();
    let controller = ImuController::new(&rig.manager, config);
    let clock = TickClock::default();
    let sink = RecordingSink::default();

    let err = controller
        .run(YieldDelay::default(), &clock, &sink)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StartError::BusAcquisition(BusError::FactoryError(NoSuchBus))
    ));
    assert_eq!(controller.state(), ImuState::Closed);
    assert_eq!(rig.opened.get(), 0);
    assert!(rig.state.borrow().log.is_empty());
    assert_eq!(sink.len(), 0);
}

#[futures_test::test]
async fn bad_address_releases_the_bus() {
    let rig = rig();
    let mut config = config();
    config.accel_gyro_address = "0xZZ".try_into().unwrap();
    let controller = ImuController::new(&rig.manager, config);
    let clock = TickClock::default();
    let sink = RecordingSink::default();

    let err = controller
        .run(YieldDelay::default(), &clock, &sink)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StartError::AddressParse(AddressParseError {
            field: AddressField::AccelGyro,
            kind: AddressErrorKind::InvalidDigit,
        })
    ));
    assert_eq!(controller.state(), ImuState::Closed);
    assert_eq!(rig.opened.get(), 1);
    assert_eq!(rig.closed.get(), 1);
    assert_eq!(rig.manager.release_count(), 1);
    assert!(rig.state.borrow().log.is_empty());
}

#[futures_test::test]
async fn runs_only_once() {
    let rig = rig();
    let controller = ImuController::new(&rig.manager, config());
    let clock = TickClock::default();
    let sink = RecordingSink::default();

    controller.stop();
    controller
        .run(YieldDelay::default(), &clock, &sink)
        .await
        .unwrap();
    let again = controller.run(YieldDelay::default(), &clock, &sink).await;

    assert!(matches!(again, Err(StartError::AlreadyStarted)));
    assert_eq!(controller.state(), ImuState::Closed);
    assert_eq!(rig.opened.get(), 1);
}

// ---------------------------------------------------------------------------
// Error policies
// ---------------------------------------------------------------------------

#[futures_test::test]
async fn failed_selector_write_keeps_previous_resolution() {
    let rig = rig();
    rig.state.borrow_mut().fail_writes.insert((AG, CTRL_REG1_G));
    let mut config = config();
    config.gyro_fsr = imu_sampler::config::GyroFsr::Fs2000Dps;
    let controller = ImuController::new(&rig.manager, config);
    let clock = TickClock::default();
    let sink = RecordingSink::default();

    let (result, ()) =
        join(controller.run(YieldDelay::default(), &clock, &sink), async {
            while sink.of(Channel::Gyroscope).is_empty() {
                yield_now().await;
            }
            controller.stop();
        })
        .await;
    result.unwrap();

    // Still the power-on 245 dps range.
    assert_eq!(controller.resolution(Channel::Gyroscope), 245.0 / 32768.0);
    let gyro = sink.of(Channel::Gyroscope);
    assert_close(gyro[0].scaled.z, -245.0);
}

#[futures_test::test]
async fn fail_fast_aborts_on_configuration_failure() {
    let rig = rig();
    rig.state.borrow_mut().fail_writes.insert((AG, CTRL_REG6_XL));
    let mut config = config();
    config.error_policy = ErrorPolicy::FailFast;
    let controller = ImuController::new(&rig.manager, config);
    let clock = TickClock::default();
    let sink = RecordingSink::default();

    let err = controller
        .run(YieldDelay::default(), &clock, &sink)
        .await
        .unwrap_err();

    match err {
        StartError::Configuration(failure) => {
            assert_eq!(failure.address, AG);
            assert_eq!(failure.register, CTRL_REG6_XL);
            assert_eq!(failure.step, ConfigStep::Write);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(controller.state(), ImuState::Closed);
    assert_eq!(rig.manager.release_count(), 1);
    let state = rig.state.borrow();
    assert_eq!(state.bursts(OUT_X_L_G) + state.bursts(OUT_X_L_XL), 0);
}

#[futures_test::test]
async fn transport_error_does_not_end_the_loop() {
    let rig = rig();
    rig.state.borrow_mut().fail_reads.insert((AG, OUT_X_L_G), 1);
    let controller = ImuController::new(&rig.manager, config());
    let clock = TickClock::default();
    let sink = RecordingSink::default();

    let (result, ()) =
        join(controller.run(YieldDelay::default(), &clock, &sink), async {
            while sink.of(Channel::Gyroscope).len() < 3 {
                yield_now().await;
            }
            controller.stop();
        })
        .await;
    let summary = result.unwrap();

    let gyro = sink.of(Channel::Gyroscope);
    // Nothing was read yet, so the first reading decodes the zeroed buffer.
    assert_eq!(gyro[0].raw, lsm9ds1::RawSample::new(0, 0, 0));
    assert!(gyro[0].valid);
    assert_eq!(gyro[1].raw, lsm9ds1::RawSample::new(32767, 0, -32768));
    assert!(!summary.gyro.failed);
}

#[futures_test::test]
async fn retry_policy_marks_readings_invalid() {
    let rig = rig();
    rig.state.borrow_mut().fail_reads.insert((AG, OUT_X_L_XL), ALWAYS);
    let mut config = config();
    config.error_policy = ErrorPolicy::RetryThenMarkInvalid { attempts: 2 };
    let controller = ImuController::new(&rig.manager, config);
    let clock = TickClock::default();
    let sink = RecordingSink::default();

    let (result, ()) =
        join(controller.run(YieldDelay::default(), &clock, &sink), async {
            while sink.of(Channel::Accelerometer).len() < 3 {
                yield_now().await;
            }
            controller.stop();
        })
        .await;
    result.unwrap();

    let accel = sink.of(Channel::Accelerometer);
    assert!(accel.iter().all(|r| !r.valid));
    assert!(sink.of(Channel::Gyroscope).iter().all(|r| r.valid));
    // One read plus two retries per cycle.
    assert_eq!(rig.state.borrow().bursts(OUT_X_L_XL), 3 * accel.len());
}

#[futures_test::test]
async fn fail_fast_stops_only_the_failing_loop() {
    let rig = rig();
    rig.state.borrow_mut().fail_reads.insert((AG, OUT_X_L_G), ALWAYS);
    let mut config = config();
    config.error_policy = ErrorPolicy::FailFast;
    let controller = ImuController::new(&rig.manager, config);
    let clock = TickClock::default();
    let sink = RecordingSink::default();

    let (result, ()) =
        join(controller.run(YieldDelay::default(), &clock, &sink), async {
            while sink.of(Channel::Accelerometer).len() < 5 {
                yield_now().await;
            }
            controller.stop();
        })
        .await;
    let summary = result.unwrap();

    assert!(summary.gyro.failed);
    assert_eq!(summary.gyro.cycles, 0);
    assert!(!summary.accel.failed);
    assert!(summary.accel.cycles >= 5);
    assert_eq!(rig.state.borrow().bursts(OUT_X_L_G), 1);
}

#[futures_test::test]
async fn stops_itself_when_both_loops_fail() {
    let rig = rig();
    {
        let mut state = rig.state.borrow_mut();
        state.fail_reads.insert((AG, OUT_X_L_G), ALWAYS);
        state.fail_reads.insert((AG, OUT_X_L_XL), ALWAYS);
    }
    let mut config = config();
    config.error_policy = ErrorPolicy::FailFast;
    let controller = ImuController::new(&rig.manager, config);
    let clock = TickClock::default();
    let sink = RecordingSink::default();

    let summary = controller
        .run(YieldDelay::default(), &clock, &sink)
        .await
        .unwrap();

    assert!(summary.gyro.failed && summary.accel.failed);
    assert_eq!(sink.len(), 0);
    assert_eq!(controller.state(), ImuState::Closed);
    assert_eq!(rig.manager.release_count(), 1);
}
