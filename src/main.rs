use std::{
    path::PathBuf,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result, bail};
use clap::Parser;
use crossbeam_channel::Receiver;
use log::{debug, error, info, warn};
use pose_pointer::{
    Config, ContentElement, ContentRegistry, InputEvent, InputKind, InputMode, MouseInput,
    content::Bounds, pipeline::RgbaCanvas,
};

#[derive(Parser, Debug)]
#[command(version, about = "Drive a cursor from body pose or the mouse")]
struct Args {
    /// TOML config file; defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Camera index overriding `pose.capture.camera_index`.
    #[arg(long)]
    camera: Option<u32>,
    /// How long to run before stopping.
    #[arg(long, default_value_t = 10)]
    seconds: u64,
    #[arg(long)]
    list_cameras: bool,
    /// Write the pose overlay of the last frame to this PNG.
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.list_cameras {
        return list_cameras();
    }

    let mut config = match args.config.as_ref() {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(camera) = args.camera {
        config.pose.capture.camera_index = camera;
    }

    let registry = ContentRegistry::new();
    registry.insert(ContentElement::new(
        config.content.selector.clone(),
        Bounds::new(0.0, 0.0, config.content.width, config.content.height),
    ));
    for input in [&mut config.pose.input, &mut config.mouse.input] {
        if input.content_selector.is_empty() {
            input.content_selector = config.content.selector.clone();
        }
    }

    let mut input = build_input(&config, registry)?;
    let events = input.source_mut().subscribe();
    input
        .source_mut()
        .initialize()
        .context("input failed to initialize")?;
    drain_events(&events);

    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    while Instant::now() < deadline {
        if let Err(err) = input.source_mut().update(Instant::now()) {
            drain_events(&events);
            return Err(err).context("input stopped");
        }
        drain_events(&events);
        let wait = input
            .source()
            .time_until_next_frame(Instant::now())
            .max(Duration::from_millis(1));
        thread::sleep(wait);
    }

    if let Some(path) = args.snapshot.as_ref() {
        match &input {
            InputKind::Pose(pose) => {
                let frame = pose.capture().frame();
                let mut canvas = RgbaCanvas::from_rgba(frame.width, frame.height, frame.rgba.clone())
                    .unwrap_or_else(|| RgbaCanvas::new(frame.width, frame.height));
                pose.render_input_data(&mut canvas);
                pose.render_center(&mut canvas);
                pose.render_cursor(&mut canvas);
                canvas.save_png(path)?;
                info!("wrote overlay to {}", path.display());
            }
            InputKind::Mouse(_) => warn!("--snapshot only applies to pose input"),
        }
    }

    input.source_mut().stop();
    drain_events(&events);
    Ok(())
}

fn build_input(config: &Config, registry: Arc<ContentRegistry>) -> Result<InputKind> {
    match config.mode {
        InputMode::Mouse => {
            info!("using mouse input on {}", config.content.selector);
            Ok(InputKind::Mouse(MouseInput::new(
                config.mouse.clone(),
                Some(registry),
            )?))
        }
        InputMode::Pose => build_pose_input(config, registry),
    }
}

#[cfg(feature = "camera-nokhwa")]
fn build_pose_input(config: &Config, registry: Arc<ContentRegistry>) -> Result<InputKind> {
    info!(
        "using pose input on camera {} tracking {:?}",
        config.pose.capture.camera_index, config.pose.body_part
    );
    let pose = pose_pointer::PoseInput::with_system_camera(config.pose.clone(), Some(registry))?;
    Ok(InputKind::Pose(Box::new(pose)))
}

#[cfg(not(feature = "camera-nokhwa"))]
fn build_pose_input(_config: &Config, _registry: Arc<ContentRegistry>) -> Result<InputKind> {
    bail!("pose input needs the camera-nokhwa feature; set mode = \"mouse\" or rebuild with it")
}

#[cfg(feature = "camera-nokhwa")]
fn list_cameras() -> Result<()> {
    let cameras = pose_pointer::pipeline::available_cameras()?;
    if cameras.is_empty() {
        bail!("no cameras found");
    }
    for camera in cameras {
        println!("{}", camera.label);
    }
    Ok(())
}

#[cfg(not(feature = "camera-nokhwa"))]
fn list_cameras() -> Result<()> {
    bail!("built without camera support")
}

fn drain_events(events: &Receiver<InputEvent>) {
    for event in events.try_iter() {
        match &event {
            InputEvent::Tick(_) => {}
            InputEvent::Input(detail) => debug!(
                "input {:?} at ({:.3}, {:.3})",
                detail.input_type, detail.position.x, detail.position.y
            ),
            InputEvent::Error(detail) => error!("{}: {}", detail.name, detail.message),
            other => info!("{}", other.name()),
        }
    }
}
