// SPDX-FileCopyrightText: 2025 Contributors to the gst-gev project.
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for the acquisition session.
//!
//! Every test drives an [`AcquisitionSession`] over the simulated driver, so
//! no camera or vendor library is needed.
//!
//! # Test Coverage
//!
//! - Session lifecycle and resource release (start/stop, failed starts)
//! - Retry behavior of the frame pump (timeouts, incomplete frames)
//! - Timestamps, offsets and the end-of-stream boundary
//! - Both delivery modes
//! - Pixel formats other than Mono8

use std::time::Duration;

use gev::{
    AcquisitionSession, DeliveryMode, Error, FrameStatus, SessionConfig, SessionState,
    SimulatedDriver, SimulatedFrame, Status,
};

/// Ensures logging is initialized only once across all tests.
static LOG_ONCE: std::sync::Once = std::sync::Once::new();

fn setup_logging() {
    LOG_ONCE.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::builder()
                    .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .with_test_writer()
            .init();
    });
}

/// Builds a session over a small simulated camera and enumerates it.
fn setup_session(
    driver: SimulatedDriver,
    config: SessionConfig,
) -> AcquisitionSession<SimulatedDriver> {
    setup_logging();
    let mut session = AcquisitionSession::new(driver, config);
    session.enumerate();
    session
}

fn small_camera() -> SimulatedDriver {
    SimulatedDriver::new().with_resolution(32, 8)
}

#[test]
fn start_stop_releases_everything() {
    let driver = small_camera();
    let mut session = setup_session(driver.clone(), SessionConfig::default());
    assert_eq!(session.state(), SessionState::Idle);

    let format = session.start(0).unwrap();
    assert_eq!(session.state(), SessionState::Streaming);
    assert_eq!((format.width, format.height, format.depth), (32, 8, 1));
    assert_eq!(driver.open_handles(), 1);
    assert_eq!(driver.active_transfers(), 1);
    assert_eq!(driver.feature("PixelFormat"), Some(gev::FeatureValue::Int(0x0108_0001)));

    session.stop();
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(driver.open_handles(), 0);
    assert_eq!(driver.active_transfers(), 0);

    // Stopping again is a no-op.
    session.stop();
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(driver.closed_count(), 1);
}

#[test]
fn dropping_a_streaming_session_releases_everything() {
    let driver = small_camera();
    {
        let mut session = setup_session(driver.clone(), SessionConfig::default());
        session.start(0).unwrap();
    }
    assert_eq!(driver.open_handles(), 0);
    assert_eq!(driver.active_transfers(), 0);
}

#[test]
fn session_can_restart_after_stop() {
    let driver = small_camera();
    let mut session = setup_session(driver.clone(), SessionConfig::default());

    session.start(0).unwrap();
    session.next_frame(Some(1)).unwrap().unwrap();
    session.stop();

    session.start(0).unwrap();
    assert_eq!(session.counters().frames_delivered, 0);
    let frame = session.next_frame(Some(1)).unwrap().unwrap().into_frame();
    assert_eq!(frame.info.offset, 0);
    assert_eq!(frame.info.timestamp, Duration::ZERO);
    session.stop();
    assert_eq!(driver.opened_count(), 2);
    assert_eq!(driver.closed_count(), 2);
}

#[test]
fn start_while_streaming_is_rejected() {
    let driver = small_camera();
    let mut session = setup_session(driver.clone(), SessionConfig::default());
    session.start(0).unwrap();

    assert!(matches!(session.start(0), Err(Error::AlreadyStreaming)));
    assert_eq!(session.state(), SessionState::Streaming);
    assert_eq!(driver.open_handles(), 1);
    assert!(session.next_frame(Some(1)).unwrap().is_some());
}

#[test]
fn out_of_range_camera_is_rejected() {
    let driver = small_camera().with_cameras(3);
    let mut session = setup_session(driver.clone(), SessionConfig::default());
    assert_eq!(session.devices().len(), 3);

    let err = session.start(5).unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidCameraIndex { index: 5, count: 3 }
    ));
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(driver.opened_count(), 0);
}

#[test]
fn start_without_enumeration_is_rejected() {
    setup_logging();
    let mut session = AcquisitionSession::new(small_camera(), SessionConfig::default());
    assert!(matches!(
        session.start(0),
        Err(Error::InvalidCameraIndex { index: 0, count: 0 })
    ));
}

#[test]
fn no_cameras_is_an_empty_directory() {
    let session = setup_session(small_camera().with_cameras(0), SessionConfig::default());
    assert!(session.devices().is_empty());
}

#[test]
fn enumeration_is_capped() {
    let session = setup_session(small_camera().with_cameras(300), SessionConfig::default());
    assert_eq!(session.devices().len(), gev::MAX_CAMERAS);
    assert!(session
        .devices()
        .iter()
        .enumerate()
        .all(|(i, camera)| camera.index == i));
}

#[test]
fn failed_open_leaves_the_session_idle() {
    let driver = small_camera();
    driver.fail_open(Status::ACCESS_DENIED);
    let mut session = setup_session(driver.clone(), SessionConfig::default());

    let err = session.start(0).unwrap_err();
    assert!(matches!(err, Error::DeviceOpenFailed(Status::ACCESS_DENIED)));
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(driver.open_handles(), 0);
}

#[test]
fn allocation_failure_closes_the_camera() {
    let driver = small_camera().with_payload_size(u64::MAX);
    let mut session = setup_session(driver.clone(), SessionConfig::default());

    let err = session.start(0).unwrap_err();
    assert!(matches!(
        err,
        Error::BufferAllocationFailed { size: u64::MAX, count: 8 }
    ));
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(driver.opened_count(), 1);
    assert_eq!(driver.open_handles(), 0);
    assert_eq!(driver.active_transfers(), 0);
}

#[test]
fn transfer_failure_releases_camera() {
    let driver = small_camera();
    driver.fail_transfer_start(Status::INSUFFICIENT_MEMORY);
    let mut session = setup_session(driver.clone(), SessionConfig::default());

    let err = session.start(0).unwrap_err();
    assert!(matches!(
        err,
        Error::TransferStartFailed(Status::INSUFFICIENT_MEMORY)
    ));
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(driver.open_handles(), 0);
    assert_eq!(driver.active_transfers(), 0);

    // The failure was one-shot; a retry succeeds.
    session.start(0).unwrap();
    session.stop();
}

#[test]
fn teardown_failures_still_end_idle() {
    let driver = small_camera();
    let mut session = setup_session(driver.clone(), SessionConfig::default());
    session.start(0).unwrap();

    driver.fail_stop_transfer(Status::GENERIC);
    driver.fail_close(Status::GENERIC);
    session.stop();

    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(driver.stopped_transfer_count(), 1);
    assert_eq!(driver.closed_count(), 1);
}

#[test]
fn retries_absorb_timeouts_and_incomplete_frames() {
    let driver = small_camera();
    driver.push_frames([
        SimulatedFrame::Timeout,
        SimulatedFrame::Incomplete(FrameStatus::Lost),
        SimulatedFrame::Timeout,
        SimulatedFrame::Incomplete(FrameStatus::Overflow),
        SimulatedFrame::Complete,
    ]);
    let mut session = setup_session(driver, SessionConfig::default());
    session.start(0).unwrap();

    let delivery = session.next_frame(None).unwrap().unwrap();
    assert!(!delivery.is_end_of_stream());
    assert_eq!(delivery.frame().info.offset, 0);

    let counters = session.counters();
    assert_eq!(counters.frames_delivered, 1);
    assert_eq!(counters.timeout_count, 2);
    assert_eq!(counters.incomplete_count, 2);
}

#[test]
fn attempt_cap_bounds_the_retry_loop() {
    let driver = small_camera();
    driver.push_frames([SimulatedFrame::Timeout; 3]);
    let mut session = setup_session(driver, SessionConfig::default());
    session.start(0).unwrap();

    assert!(session.next_frame(Some(2)).unwrap().is_none());
    assert_eq!(session.counters().timeout_count, 2);
    assert_eq!(session.counters().frames_delivered, 0);

    // One timeout left in the script, then a frame.
    assert!(session.next_frame(Some(2)).unwrap().is_some());
}

#[test]
fn missing_buffer_is_fatal() {
    let driver = small_camera();
    driver.push_frames([SimulatedFrame::Missing]);
    let mut session = setup_session(driver, SessionConfig::default());
    session.start(0).unwrap();

    assert!(matches!(
        session.next_frame(None),
        Err(Error::DriverFatal(_))
    ));
    assert_eq!(session.counters().frames_delivered, 0);
}

#[test]
fn frame_before_start_is_rejected() {
    let mut session = setup_session(small_camera(), SessionConfig::default());
    assert!(matches!(
        session.try_next_frame(),
        Err(Error::NotStreaming)
    ));
}

#[test]
fn timestamps_and_offsets_at_25_fps() {
    let config = SessionConfig {
        framerate: Some(25.0),
        frame_budget: 3,
        ..Default::default()
    };
    let mut session = setup_session(small_camera(), config);
    session.start(0).unwrap();

    let mut frames = Vec::new();
    loop {
        let delivery = session.next_frame(Some(1)).unwrap().unwrap();
        let done = delivery.is_end_of_stream();
        frames.push(delivery.into_frame());
        if done {
            break;
        }
    }

    assert_eq!(frames.len(), 3);
    assert_eq!(session.counters().frames_delivered, 3);
    let timestamps: Vec<_> = frames.iter().map(|f| f.info.timestamp).collect();
    assert_eq!(
        timestamps,
        vec![
            Duration::ZERO,
            Duration::from_millis(40),
            Duration::from_millis(80)
        ]
    );
    for (i, frame) in frames.iter().enumerate() {
        assert_eq!(frame.info.duration, Duration::from_nanos(40_000_000));
        assert_eq!(frame.info.offset, i as u64);
        assert_eq!(frame.info.offset_end, i as u64 + 1);
    }
}

#[test]
fn budget_marks_only_the_last_frame() {
    let config = SessionConfig {
        frame_budget: 4,
        ..Default::default()
    };
    let mut session = setup_session(small_camera(), config);
    session.start(0).unwrap();

    let flags: Vec<bool> = (0..4)
        .map(|_| session.next_frame(Some(1)).unwrap().unwrap().is_end_of_stream())
        .collect();
    assert_eq!(flags, vec![false, false, false, true]);
}

#[test]
fn zero_budget_never_ends() {
    let mut session = setup_session(small_camera(), SessionConfig::default());
    session.start(0).unwrap();

    for i in 0..100u64 {
        let delivery = session.next_frame(Some(1)).unwrap().unwrap();
        assert!(!delivery.is_end_of_stream());
        assert_eq!(delivery.frame().info.offset, i);
    }
}

#[test]
fn core_allocated_frames_hold_packed_pixels() {
    let driver = SimulatedDriver::new().with_resolution(4, 3).with_row_padding(4);
    let mut session = setup_session(driver, SessionConfig::default());
    let format = session.start(0).unwrap();
    assert_eq!(format.payload_size, 8 * 3);
    assert_eq!(session.frame_size(), Some(12));

    let frame = session.next_frame(Some(1)).unwrap().unwrap().into_frame();
    assert_eq!(frame.info.stride, 4);
    assert_eq!(frame.data, vec![0, 1, 2, 3, 1, 2, 3, 4, 2, 3, 4, 5]);
}

#[test]
fn caller_provided_destination_is_filled() {
    let config = SessionConfig {
        delivery_mode: DeliveryMode::CallerProvides,
        frame_budget: 2,
        ..Default::default()
    };
    let mut session = setup_session(SimulatedDriver::new().with_resolution(4, 2), config);
    session.start(0).unwrap();

    // Larger destinations are fine; only the frame prefix is written.
    let mut dest = vec![0xaa; 10];
    let info = session
        .next_frame_into(&mut dest, Some(1))
        .unwrap()
        .unwrap();
    assert!(!info.is_end_of_stream());
    assert_eq!(&dest[..8], &[0, 1, 2, 3, 1, 2, 3, 4]);
    assert_eq!(&dest[8..], &[0xaa, 0xaa]);

    let info = session
        .next_frame_into(&mut dest, Some(1))
        .unwrap()
        .unwrap();
    assert!(info.is_end_of_stream());
    assert_eq!(info.frame().offset, 1);
}

#[test]
fn delivery_mode_mismatch_is_rejected() {
    let config = SessionConfig {
        delivery_mode: DeliveryMode::CallerProvides,
        ..Default::default()
    };
    let mut session = setup_session(small_camera(), config);
    session.start(0).unwrap();

    assert!(matches!(
        session.try_next_frame(),
        Err(Error::DeliveryModeMismatch {
            configured: DeliveryMode::CallerProvides
        })
    ));
}

#[test]
fn small_destination_is_rejected() {
    let config = SessionConfig {
        delivery_mode: DeliveryMode::CallerProvides,
        ..Default::default()
    };
    let mut session = setup_session(small_camera(), config);
    session.start(0).unwrap();

    let mut dest = vec![0; 10];
    assert!(matches!(
        session.try_next_frame_into(&mut dest),
        Err(Error::DestinationTooSmall {
            needed: 256,
            available: 10
        })
    ));
    assert_eq!(session.counters().frames_delivered, 0);
}

#[test]
fn requested_settings_reach_the_camera() {
    let driver = small_camera();
    driver.reject_feature("Gamma");
    let config = SessionConfig {
        width: 16,
        height: 4,
        camera: gev::CameraSettings {
            exposure_ms: Some(10.0),
            reverse_x: Some(true),
            gamma: Some(0.8),
            ..Default::default()
        },
        ..Default::default()
    };
    let mut session = setup_session(driver.clone(), config);

    let format = session.start(0).unwrap();
    assert_eq!((format.width, format.height), (16, 4));
    assert_eq!(
        driver.feature("ExposureTime"),
        Some(gev::FeatureValue::Float(10_000.0))
    );
    assert_eq!(driver.feature("ReverseX"), Some(gev::FeatureValue::Bool(true)));
    // A rejected feature does not fail the start.
    assert_eq!(driver.feature("Gamma"), None);
    assert_eq!(session.state(), SessionState::Streaming);
}

#[test]
fn nothing_is_delivered_after_end_of_stream() {
    let config = SessionConfig {
        frame_budget: 2,
        ..Default::default()
    };
    let driver = small_camera();
    let mut session = setup_session(driver.clone(), config);
    session.start(0).unwrap();

    assert!(!session.next_frame(Some(1)).unwrap().unwrap().is_end_of_stream());
    assert!(session.next_frame(Some(1)).unwrap().unwrap().is_end_of_stream());

    // A scripted timeout would be consumed by any further driver wait.
    driver.push_frames([SimulatedFrame::Timeout]);
    assert!(matches!(session.try_next_frame(), Err(Error::EndOfStream)));
    assert!(matches!(session.next_frame(None), Err(Error::EndOfStream)));
    assert_eq!(session.counters().frames_delivered, 2);
    assert_eq!(session.counters().timeout_count, 0);

    // The budget is per run.
    session.stop();
    session.start(0).unwrap();
    assert!(matches!(session.try_next_frame(), Ok(None)));
    assert_eq!(session.counters().timeout_count, 1);
    assert!(session.next_frame(Some(1)).unwrap().is_some());
}

#[test]
fn caller_provided_end_of_stream_is_terminal() {
    let config = SessionConfig {
        delivery_mode: DeliveryMode::CallerProvides,
        frame_budget: 1,
        ..Default::default()
    };
    let mut session = setup_session(SimulatedDriver::new().with_resolution(4, 2), config);
    session.start(0).unwrap();

    let mut dest = vec![0; 8];
    assert!(session
        .next_frame_into(&mut dest, Some(1))
        .unwrap()
        .unwrap()
        .is_end_of_stream());

    dest.fill(0xaa);
    assert!(matches!(
        session.try_next_frame_into(&mut dest),
        Err(Error::EndOfStream)
    ));
    assert_eq!(dest, vec![0xaa; 8]);
    assert_eq!(session.counters().frames_delivered, 1);
}

#[test]
fn mono16_is_narrowed_to_gray8() {
    let driver = SimulatedDriver::new()
        .with_resolution(4, 1)
        .with_pixel_format(gev_sys::PFNC_MONO16);
    driver.reject_feature("PixelFormat");
    let mut session = setup_session(driver, SessionConfig::default());

    let format = session.start(0).unwrap();
    assert_eq!(format.depth, 2);
    assert_eq!(session.frame_size(), Some(4));

    let first = session.next_frame(Some(1)).unwrap().unwrap().into_frame();
    assert_eq!(first.data, vec![0, 1, 2, 3]);
    let second = session.next_frame(Some(1)).unwrap().unwrap().into_frame();
    assert_eq!(second.data, vec![1, 2, 3, 4]);
}

#[test]
fn unconvertible_pixel_format_fails_the_start() {
    // RGB8
    let driver = small_camera().with_pixel_format(0x0218_0014);
    driver.reject_feature("PixelFormat");
    let mut session = setup_session(driver.clone(), SessionConfig::default());

    assert!(matches!(
        session.start(0),
        Err(Error::UnsupportedPixelFormat {
            pixel_format: 0x0218_0014
        })
    ));
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(driver.open_handles(), 0);
    assert_eq!(driver.active_transfers(), 0);
}

#[test]
fn framerate_defaults_to_the_camera_rate() {
    let config = SessionConfig {
        camera: gev::CameraSettings {
            max_framerate: Some(50.0),
            ..Default::default()
        },
        ..Default::default()
    };
    let mut session = setup_session(small_camera(), config);
    session.start(0).unwrap();
    assert_eq!(session.framerate(), Some(50.0));

    let frame = session.next_frame(Some(2)).unwrap().unwrap().into_frame();
    assert_eq!(frame.info.duration, Duration::from_millis(20));
}

#[test]
fn framerate_falls_back_without_a_camera_rate() {
    let mut session = setup_session(small_camera(), SessionConfig::default());
    assert_eq!(session.framerate(), None);
    session.start(0).unwrap();
    assert_eq!(session.framerate(), Some(gev::config::DEFAULT_FRAMERATE));

    let config = SessionConfig {
        framerate: Some(10.0),
        camera: gev::CameraSettings {
            max_framerate: Some(50.0),
            ..Default::default()
        },
        ..Default::default()
    };
    let mut session = setup_session(small_camera(), config);
    session.start(0).unwrap();
    assert_eq!(session.framerate(), Some(10.0));
}
