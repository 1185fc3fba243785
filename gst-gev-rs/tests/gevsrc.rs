// SPDX-FileCopyrightText: 2025 Contributors to the gst-gev project.
// SPDX-License-Identifier: Apache-2.0

//! Pipeline tests for the gevsrc element.
//!
//! The element runs with `simulate=true`, so neither a camera nor the
//! GigE-V library is needed. Setting `max-framerate` makes the simulated
//! camera deliver at that rate.

use gst::prelude::*;
use gstreamer as gst;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;

static INIT: std::sync::Once = std::sync::Once::new();

fn init() {
    INIT.call_once(|| {
        gst::init().unwrap();
        gstgev::plugin_register_static().unwrap();
    });
}

/// Builds `gevsrc <props> ! appsink` and returns the pipeline and the sink.
fn pipeline(src_props: &str) -> (gst::Pipeline, gst_app::AppSink) {
    init();
    let description = format!(
        "gevsrc name=src simulate=true {} ! appsink name=sink sync=false",
        src_props
    );
    let pipeline = gst::parse::launch(&description)
        .unwrap()
        .downcast::<gst::Pipeline>()
        .unwrap();
    let sink = pipeline
        .by_name("sink")
        .unwrap()
        .downcast::<gst_app::AppSink>()
        .unwrap();
    (pipeline, sink)
}

/// Pulls samples until EOS.
fn pull_all(sink: &gst_app::AppSink) -> Vec<gst::Sample> {
    let mut samples = Vec::new();
    while let Some(sample) = sink.try_pull_sample(gst::ClockTime::from_seconds(5)) {
        samples.push(sample);
    }
    assert!(sink.is_eos(), "stream stopped without EOS");
    samples
}

#[test]
fn budget_ends_the_stream_with_framerate_timestamps() {
    let (pipeline, sink) = pipeline("framerate=25 num-buffers=3");
    pipeline.set_state(gst::State::Playing).unwrap();

    let samples = pull_all(&sink);
    assert_eq!(samples.len(), 3);

    for (n, sample) in samples.iter().enumerate() {
        let buffer = sample.buffer().unwrap();
        let expected = gst::ClockTime::from_mseconds(40 * n as u64);
        assert_eq!(buffer.pts(), Some(expected));
        assert_eq!(buffer.duration(), Some(gst::ClockTime::from_mseconds(40)));
        assert_eq!(buffer.offset(), n as u64);
        assert_eq!(buffer.offset_end(), n as u64 + 1);
        assert_eq!(buffer.size(), 640 * 480);
    }

    let caps = samples[0].caps().unwrap();
    let info = gst_video::VideoInfo::from_caps(caps).unwrap();
    assert_eq!(info.format(), gst_video::VideoFormat::Gray8);
    assert_eq!((info.width(), info.height()), (640, 480));
    assert_eq!(info.fps(), gst::Fraction::new(25, 1));

    let src = pipeline.by_name("src").unwrap();
    assert_eq!(src.property::<u64>("frames-delivered"), 3);

    pipeline.set_state(gst::State::Null).unwrap();
    assert_eq!(src.property::<u64>("frames-delivered"), 3);
}

#[test]
fn caller_provides_fills_base_class_buffers() {
    let (pipeline, sink) = pipeline(
        "delivery-mode=caller-provides num-buffers=2 width=64 height=16",
    );
    pipeline.set_state(gst::State::Playing).unwrap();

    let samples = pull_all(&sink);
    assert_eq!(samples.len(), 2);

    let buffer = samples[1].buffer().unwrap();
    assert_eq!(buffer.size(), 64 * 16);
    assert_eq!(buffer.offset(), 1);
    let meta = buffer.meta::<gst_video::VideoMeta>().unwrap();
    assert_eq!(meta.stride(), &[64]);

    let map = buffer.map_readable().unwrap();
    // Second simulated frame: pixel = x + y + 1
    assert_eq!(map[0], 1);
    assert_eq!(map[64 + 2], 4);

    pipeline.set_state(gst::State::Null).unwrap();
}

#[test]
fn missing_camera_fails_to_start() {
    let (pipeline, _sink) = pipeline("camera-id=5 simulated-cameras=3");
    assert!(pipeline.set_state(gst::State::Paused).is_err());

    let bus = pipeline.bus().unwrap();
    let message = bus
        .timed_pop_filtered(gst::ClockTime::from_seconds(1), &[gst::MessageType::Error])
        .unwrap();
    let gst::MessageView::Error(err) = message.view() else {
        panic!("expected an error message");
    };
    assert!(err.error().matches(gst::ResourceError::NotFound));

    pipeline.set_state(gst::State::Null).unwrap();
}

#[test]
fn property_defaults_and_round_trip() {
    init();
    let src = gst::ElementFactory::make("gevsrc").build().unwrap();

    assert_eq!(src.property::<i32>("camera-id"), 0);
    assert_eq!(src.property::<f64>("framerate"), 30.0);
    assert_eq!(src.property::<u32>("timeout"), 1000);
    assert_eq!(src.property::<u32>("buffer-count"), 8);
    assert_eq!(src.property::<f64>("exposure"), 40.0);
    assert_eq!(src.property::<f64>("gamma"), 1.5);
    assert_eq!(src.property::<u64>("frames-delivered"), 0);
    assert_eq!(
        src.property::<gstgev::gevsrc::DeliveryMode>("delivery-mode"),
        gstgev::gevsrc::DeliveryMode::CoreAllocates
    );

    src.set_property("camera-id", 3i32);
    src.set_property("exposure", 12.5f64);
    src.set_property("hflip", true);
    src.set_property_from_str("lut", "gamma");
    assert_eq!(src.property::<i32>("camera-id"), 3);
    assert_eq!(src.property::<f64>("exposure"), 12.5);
    assert!(src.property::<bool>("hflip"));
    assert_eq!(
        src.property::<gstgev::gevsrc::Lut>("lut"),
        gstgev::gevsrc::Lut::Gamma
    );
}

#[test]
fn stop_during_playback_releases_the_camera() {
    let (pipeline, sink) = pipeline("framerate=100");
    pipeline.set_state(gst::State::Playing).unwrap();

    for _ in 0..5 {
        assert!(sink.try_pull_sample(gst::ClockTime::from_seconds(5)).is_some());
    }
    pipeline.set_state(gst::State::Null).unwrap();

    let src = pipeline.by_name("src").unwrap();
    assert!(src.property::<u64>("frames-delivered") >= 5);
    assert_eq!(src.property::<u64>("timeouts"), 0);
}

#[test]
fn flushing_interrupts_a_stalled_camera() {
    // The camera's next frame is 1000 s away, so every wait times out.
    let (pipeline, sink) = pipeline("max-framerate=0.001 timeout=20 framerate=25");
    pipeline.set_state(gst::State::Playing).unwrap();

    assert!(sink
        .try_pull_sample(gst::ClockTime::from_mseconds(200))
        .is_none());
    let src = pipeline.by_name("src").unwrap();
    assert!(src.property::<u64>("timeouts") > 0);
    assert_eq!(src.property::<u64>("frames-delivered"), 0);

    let started = std::time::Instant::now();
    pipeline.set_state(gst::State::Null).unwrap();
    assert!(started.elapsed() < std::time::Duration::from_secs(2));
    assert!(src.property::<u64>("timeouts") > 0);
}

#[test]
fn camera_rate_sets_the_caps_framerate() {
    let (pipeline, sink) = pipeline("max-framerate=50 num-buffers=2");
    pipeline.set_state(gst::State::Playing).unwrap();

    let samples = pull_all(&sink);
    assert_eq!(samples.len(), 2);
    let info = gst_video::VideoInfo::from_caps(samples[0].caps().unwrap()).unwrap();
    assert_eq!(info.fps(), gst::Fraction::new(50, 1));
    let buffer = samples[1].buffer().unwrap();
    assert_eq!(buffer.pts(), Some(gst::ClockTime::from_mseconds(20)));
    assert_eq!(buffer.duration(), Some(gst::ClockTime::from_mseconds(20)));

    pipeline.set_state(gst::State::Null).unwrap();
}
