//! Vergence Lab - headless runner for gaze dwell experiments
//!
//! Replays a scripted viewer against the configured layout and reports
//! trial results or the recorded vergence trace.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;

use vergence_lab::clock::{Clock, SteppedClock, SystemClock, TestClock};
use vergence_lab::config::{ExperimentConfig, LayoutPreset, SessionMode};
use vergence_lab::input_source::{InputEvent, ScriptedInputProvider};
use vergence_lab::session::{Session, SessionEvent};
use vergence_lab::vr::eye_tracking::SimulatedGaze;
use vergence_lab::vr::scene::{TargetLayout, Vec3};

#[derive(Parser, Debug)]
#[command(name = "vergence-lab", about = "Gaze dwell and vergence experiment runner")]
struct Cli {
    /// JSON experiment config (defaults apply to missing fields)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Target layout preset: uniform or graded
    #[arg(long)]
    preset: Option<String>,

    /// Session mode: trials or trace
    #[arg(long)]
    mode: Option<String>,

    /// Dwell needed to select, in seconds
    #[arg(long)]
    selection_time: Option<f64>,

    /// Contact release grace period, in seconds
    #[arg(long)]
    debounce_delay: Option<f64>,

    /// Delay before the next trial starts, in seconds
    #[arg(long)]
    restart_delay: Option<f64>,

    /// Length of a trace run, in seconds
    #[arg(long)]
    move_duration: Option<f64>,

    /// Number of trials to run (trial mode)
    #[arg(long, default_value = "1")]
    trials: u32,

    /// Simulated frame rate
    #[arg(long, default_value = "90")]
    fps: u32,

    /// Viewer distance behind the layout origin, in meters
    #[arg(long, default_value = "0.8")]
    viewer_distance: f32,

    /// Trace CSV output path (default: trace-<unix-ms>.csv)
    #[arg(long)]
    trace_out: Option<PathBuf>,

    /// Pace frames in real time instead of simulating the clock
    #[arg(long)]
    realtime: bool,

    /// Show version and exit
    #[arg(long)]
    version: bool,
}

impl Cli {
    fn experiment_config(&self) -> anyhow::Result<ExperimentConfig> {
        let mut config = match &self.config {
            Some(path) => ExperimentConfig::load(path)?,
            None => ExperimentConfig::default(),
        };
        if let Some(name) = &self.preset {
            let Some(preset) = LayoutPreset::from_str(name) else {
                bail!("Unknown preset: {name}. Use: uniform or graded");
            };
            config.apply_preset(preset);
        }
        if let Some(name) = &self.mode {
            let Some(mode) = SessionMode::from_str(name) else {
                bail!("Unknown mode: {name}. Use: trials or trace");
            };
            config.mode = mode;
        }
        if let Some(v) = self.selection_time {
            config.selection_time_s = v;
        }
        if let Some(v) = self.debounce_delay {
            config.debounce_delay_s = v;
        }
        if let Some(v) = self.restart_delay {
            config.restart_delay_s = v;
        }
        if let Some(v) = self.move_duration {
            config.move_duration_s = v;
        }
        if config.mode == SessionMode::Trace && config.probe.is_none() {
            config.probe = Some(Default::default());
        }
        config.validate()?;
        Ok(config)
    }
}

/// Look at each target long enough to select it, once per trial.
fn trial_script(config: &ExperimentConfig, trials: u32) -> Vec<InputEvent> {
    let hold = config.selection_time() + config.debounce_delay() * 2;
    let mut events = Vec::new();
    for trial in 0..trials {
        if trial > 0 {
            events.push(InputEvent::LoseTracking);
            events.push(InputEvent::Wait {
                duration: config.restart_delay(),
            });
        }
        for pos in &config.target_positions {
            events.push(InputEvent::Fixate {
                point: Vec3::from(*pos),
            });
            events.push(InputEvent::Wait { duration: hold });
        }
    }
    events
}

/// Select the armed probe, then follow it along its path.
fn trace_script(config: &ExperimentConfig, fps: u32) -> Vec<InputEvent> {
    let Some(probe) = &config.probe else {
        return Vec::new();
    };
    let start = Vec3::from(probe.start);
    let end = Vec3::from(probe.end);
    let frame = Duration::from_secs(1) / fps.max(1);
    let steps = (config.move_duration().as_nanos() / frame.as_nanos()).max(1) as u32;

    let mut events = vec![
        InputEvent::Fixate { point: start },
        InputEvent::Wait {
            duration: config.selection_time(),
        },
    ];
    for step in 1..=steps {
        events.push(InputEvent::Fixate {
            point: start.lerp(end, step as f32 / steps as f32),
        });
        events.push(InputEvent::Wait { duration: frame });
    }
    events.push(InputEvent::LoseTracking);
    events.push(InputEvent::Wait { duration: frame });
    events
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("vergence-lab {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vergence_lab=info".into()),
        )
        .init();

    info!("vergence-lab v{} starting", env!("CARGO_PKG_VERSION"));

    let config = cli.experiment_config()?;
    info!(
        mode = config.mode.as_str(),
        targets = config.target_positions.len(),
        fps = cli.fps,
        realtime = cli.realtime,
        "Experiment configured"
    );

    let mut session: Session<TargetLayout> =
        Session::from_config(&config).context("failed to build session")?.with_gaze_cursor(0);
    let mut gaze = SimulatedGaze::new();
    gaze.head = Vec3::new(0.0, 0.0, -cli.viewer_distance);

    let script = match config.mode {
        SessionMode::Trials => trial_script(&config, cli.trials),
        SessionMode::Trace => trace_script(&config, cli.fps),
    };
    let mut provider = ScriptedInputProvider::new(script);
    info!(
        scripted_s = provider.remaining_duration().as_secs_f64(),
        "Running scripted viewer"
    );

    let test_clock = TestClock::new();
    let clock: &dyn SteppedClock = if cli.realtime {
        &SystemClock
    } else {
        &test_clock
    };
    let events = session.run_script(&mut provider, &mut gaze, clock, cli.fps);

    let mut traces = 0;
    for event in &events {
        match event {
            SessionEvent::TrialComplete(report) => {
                println!("{}", report.summary());
                println!("{}", report.to_json()?);
            }
            SessionEvent::TraceFinished(recording) => {
                let path = match &cli.trace_out {
                    Some(p) if traces == 0 => p.clone(),
                    Some(p) => p.with_extension(format!("{traces}.csv")),
                    None => PathBuf::from(format!("trace-{}.csv", SystemClock.unix_millis())),
                };
                let file = File::create(&path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                recording
                    .write_csv(BufWriter::new(file))
                    .with_context(|| format!("failed to write {}", path.display()))?;
                info!(path = %path.display(), samples = recording.len(), "Trace written");
                traces += 1;
            }
            _ => {}
        }
    }

    info!(status = %session.status_sexp(), "Session finished");
    Ok(())
}
