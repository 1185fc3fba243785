// SPDX-FileCopyrightText: 2025 Contributors to the gst-gev project.
// SPDX-License-Identifier: Apache-2.0

//! gev-grab - list GigE-V cameras and grab frames from one of them.
//!
//! ```text
//! gev-grab --list --json
//! gev-grab --camera 0 --frames 10 --output frames.gray
//! gev-grab --simulate --frames 3
//! ```

mod common;

use std::{io::Write, path::PathBuf, time::Duration};

use clap::Parser;
use gev::{
    AcquisitionSession, CameraSettings, GevDriver, GevLibrary, SessionConfig, SimulatedDriver,
    config::get_gev_so_path, load_api,
};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "gev-grab", version, about = "Grab frames from a GigE-V camera")]
struct Args {
    /// Only list the discovered cameras
    #[arg(long)]
    list: bool,

    /// Print the camera list as JSON
    #[arg(long, requires = "list")]
    json: bool,

    /// Ordinal of the camera in the discovered list
    #[arg(short, long, default_value_t = 0)]
    camera: usize,

    /// Frames to grab
    #[arg(short = 'n', long, default_value_t = 10)]
    frames: u64,

    /// Nominal framerate used for timestamps (default: the camera's rate)
    #[arg(long)]
    framerate: Option<f64>,

    /// Per-frame timeout in milliseconds
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,

    /// Give up after this many consecutive timeouts
    #[arg(long, default_value_t = 10)]
    max_attempts: u32,

    /// Exposure time in milliseconds
    #[arg(long)]
    exposure: Option<f64>,

    /// Write the raw GRAY8 frames to this file
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Path of the GigE-V library
    #[arg(long, env = "GEV_LIBRARY_PATH", value_name = "PATH")]
    library: Option<PathBuf>,

    /// Use the simulated camera instead of the GigE-V library
    #[arg(long)]
    simulate: bool,
}

fn run<D: GevDriver>(driver: D, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = SessionConfig {
        framerate: args.framerate,
        frame_timeout: Duration::from_millis(args.timeout_ms),
        frame_budget: args.frames,
        camera: CameraSettings {
            exposure_ms: args.exposure,
            ..Default::default()
        },
        ..Default::default()
    };
    let mut session = AcquisitionSession::new(driver, config);
    let cameras = session.enumerate().to_vec();

    if args.list {
        if args.json {
            println!("{}", serde_json::to_string_pretty(&cameras)?);
        } else {
            for camera in &cameras {
                println!("{camera}  [{}]", camera.unique_name());
            }
        }
        return Ok(());
    }

    let format = session.start(args.camera)?;
    info!(
        "Grabbing {} frame(s) at {}x{}, {} fps",
        args.frames,
        format.width,
        format.height,
        session.framerate().unwrap_or_default()
    );

    let mut output = match &args.output {
        Some(path) => Some(std::fs::File::create(path)?),
        None => None,
    };

    loop {
        let Some(delivery) = session.next_frame(Some(args.max_attempts))? else {
            warn!("No frame after {} attempt(s), giving up", args.max_attempts);
            break;
        };
        let done = delivery.is_end_of_stream();
        let frame = delivery.into_frame();
        println!(
            "frame {:>5}  pts {:>12?}  device id {:>8}",
            frame.info.offset, frame.info.timestamp, frame.info.device_frame_id
        );
        if let Some(output) = output.as_mut() {
            output.write_all(&frame.data)?;
        }
        if done {
            break;
        }
    }

    let counters = session.counters();
    session.stop();
    info!(
        "Delivered {} frame(s), {} timeout(s), {} incomplete",
        counters.frames_delivered, counters.timeout_count, counters.incomplete_count
    );
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    common::setup_logging();
    let args = Args::parse();

    if args.simulate {
        run(SimulatedDriver::new(), &args)
    } else {
        let path = args.library.clone().unwrap_or_else(get_gev_so_path);
        let driver = GevLibrary::new(load_api(path)?)?;
        run(driver, &args)
    }
}
