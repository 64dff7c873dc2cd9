mod cli;
mod ui;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use camctl::CameraEngine;
use camctl::angles::{Angles, Axis, Facing, Reference};
use camctl::capture::CameraCharacteristics;
use camctl::config::EngineConfig;
use camctl::geometry::{PointF, Size};
use camctl::metering::{
    Camera2MeteringTransform, LegacyMeteringTransform, MeteringGeometry, MeteringRegions,
};
use camctl::simulator::SimulatedCamera;
use cli::{Cli, Command};
use ui::StepProgress;

const LOG_ENV: &str = "CAMCTL_LOG";
const FRAME_INTERVAL: Duration = Duration::from_millis(33);

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => EngineConfig::load_from(path),
        None => EngineConfig::load(),
    }
    .context("failed to load configuration")?;

    match cli.command {
        Command::Demo { settle_frames } => run_demo(config, settle_frames).await,
        Command::Offsets {
            facing,
            sensor,
            display,
            orientation,
        } => print_offsets(Angles::new(facing.into(), sensor, display, orientation)?),
        Command::Meter {
            x,
            y,
            surface,
            stream,
            sensor,
            max_regions,
            json,
        } => {
            let angles = Angles::new(Facing::Back, sensor, 0, 0)?;
            print_metering(&config, angles, surface, stream, PointF::new(x, y), max_regions, json)
        }
    }
}

async fn run_demo(config: EngineConfig, settle_frames: u32) -> Result<()> {
    let camera = SimulatedCamera::new(CameraCharacteristics::default(), settle_frames);
    let sensor = camera.sensor();
    let engine = CameraEngine::new(config, Box::new(camera));

    let streaming = {
        let engine = engine.clone();
        tokio::spawn(async move {
            let mut frames = tokio::time::interval(FRAME_INTERVAL);
            loop {
                frames.tick().await;
                if let Some(result) = sensor.next_result() {
                    engine.on_capture_completed(result);
                }
            }
        })
    };

    let surface = Size::new(1080, 1920);
    let angles = Angles::new(Facing::Back, 90, 0, 0)?;
    let geometry = MeteringGeometry::new(&angles, surface, Size::new(1920, 1080), true)
        .with_active_array(engine.characteristics().active_array);
    let transform = Camera2MeteringTransform::new(angles, geometry);

    step("Start preview", engine.start()).await;
    step("Lock 3A", engine.lock()).await;
    step("Unlock 3A", engine.unlock()).await;
    step(
        "Meter center",
        engine.meter(surface, PointF::new(540.0, 960.0), transform),
    )
    .await;
    ui::print_json("Request", &engine.request());
    step("Stop", engine.stop()).await;

    streaming.abort();
    info!(state = %engine.state(), "demo finished");
    ui::print_transitions(&engine.transitions());
    Ok(())
}

async fn step(description: &str, job: camctl::state_machine::JobHandle<()>) {
    let progress = StepProgress::start(description);
    let result = job.await;
    progress.complete(description, &result);
}

fn print_offsets(angles: Angles) -> Result<()> {
    println!("{} camera", angles.facing());
    for from in Reference::ALL {
        for to in Reference::ALL {
            if from == to {
                continue;
            }
            println!(
                "  {:>6} → {:<6} absolute {:>3}  relative {:>3}",
                from.to_string(),
                to.to_string(),
                angles.offset(from, to, Axis::Absolute),
                angles.offset(from, to, Axis::RelativeToSensor),
            );
        }
    }
    Ok(())
}

fn print_metering(
    config: &EngineConfig,
    angles: Angles,
    surface: Size,
    stream: Size,
    point: PointF,
    max_regions: usize,
    json: bool,
) -> Result<()> {
    let characteristics = CameraCharacteristics::default();
    let regions =
        MeteringRegions::from_point_with_blur(surface, point, config.metering_weight, config.blur_metering);

    let geometry = MeteringGeometry::new(&angles, surface, stream, false)
        .with_active_array(characteristics.active_array);
    let camera2 = Camera2MeteringTransform::new(angles, geometry);
    let rectangles = regions.transform(&camera2).get(max_regions, &camera2);

    if json {
        ui::print_json("Metering rectangles", &rectangles);
        return Ok(());
    }

    println!("Touch at ({}, {}) on a {surface} view", point.x, point.y);
    for rectangle in &rectangles {
        println!(
            "  sensor  x={} y={} {}x{} weight={}",
            rectangle.x, rectangle.y, rectangle.width, rectangle.height, rectangle.weight
        );
    }
    let legacy = LegacyMeteringTransform::new(angles, surface);
    for area in regions.transform(&legacy).get(max_regions, &legacy) {
        println!(
            "  legacy  [{}, {}, {}, {}] weight={}",
            area.rect.left, area.rect.top, area.rect.right, area.rect.bottom, area.weight
        );
    }
    Ok(())
}
