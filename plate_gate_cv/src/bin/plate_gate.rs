use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use plate_gate::display::{self, DisplaySink, LogDisplay};
use plate_gate::metrics;
use plate_gate::plate_detection::detection_loop::{DetectionLoop, SessionEnd};
use plate_gate::plate_detection::Recognizers;
use plate_gate::route::MapsRouteOpener;
use plate_gate::{GateConfig, VehicleRegistry};
use plate_gate_cv::plate_detection::rtp_sink::RtpSink;
use plate_gate_cv::plate_detection::video_reader::{VideoInput, VideoReader};
use plate_gate_cv::plate_detection::window_display::WindowDisplay;
use plate_gate_cv::plate_detection::OpenCvRecognizers;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Display {
    Log,
    Window,
    Rtp,
}

/// Watch a camera, recognise licence plates and check them against the registry.
#[derive(Parser)]
#[command(name = "plate_gate")]
struct Args {
    /// YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Camera index or video file
    #[arg(long, default_value = "0")]
    source: String,

    /// Where annotated frames go
    #[arg(long, value_enum, default_value = "log")]
    display: Display,

    #[arg(long, default_value = "127.0.0.1")]
    rtp_host: String,

    #[arg(long, default_value_t = 5000)]
    rtp_port: u16,

    /// Run the localizer on CUDA
    #[arg(long)]
    gpu: bool,

    /// Restart video files when they end
    #[arg(long)]
    loop_video: bool,

    /// Stop after this many seconds
    #[arg(long)]
    run_for: Option<u64>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn make_sink(args: &Args, config: &GateConfig) -> Result<Box<dyn DisplaySink>> {
    Ok(match args.display {
        Display::Log => Box::new(LogDisplay::default()),
        Display::Window => Box::new(WindowDisplay::new("Licence plate recognition")?),
        Display::Rtp => {
            let fps = (1000 / config.frame_interval_ms.max(1)) as u32;
            Box::new(RtpSink::new(
                config.working_width,
                config.working_height,
                fps,
                &args.rtp_host,
                args.rtp_port,
            )?)
        }
    })
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_target(false)
        .init();

    let config = GateConfig::load_or_default(args.config.as_deref())?;
    let registry = Arc::new(VehicleRegistry::open(&config.registry_path));
    info!("{} vehicles registered", registry.len());

    let recognizers = Recognizers::load(&OpenCvRecognizers { use_gpu: args.gpu }, &config)?;

    let mut sink = make_sink(&args, &config)?;
    let (publisher, receiver) = display::channel(config.display_queue);
    let route = Box::new(MapsRouteOpener::new(config.route_opener.clone()));
    let detector = DetectionLoop::new(config, recognizers, registry, route, publisher);

    let source = Box::new(VideoReader::new(
        VideoInput::parse(&args.source),
        args.loop_video,
    ));
    let session = detector.start(source).map_err(|failure| failure.error)?;

    let deadline = args.run_for.map(|s| Instant::now() + Duration::from_secs(s));
    session.present(&receiver, sink.as_mut(), deadline);

    let (_detector, end) = session.wait()?;
    debug!("Metrics:\n{}", metrics::render());

    if let SessionEnd::SourceFailed(reason) = end {
        bail!("Camera error: {}", reason);
    }
    Ok(())
}
