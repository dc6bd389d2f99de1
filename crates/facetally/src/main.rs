mod config;
mod console;
mod engine;
mod library;
mod panel;
mod preview;
mod store;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facetally_core::{CascadeDetector, DetectorParams, SampleStore};
use facetally_hw::{Camera, FrameSource};
use std::io::{BufRead, Write};
use std::time::Duration;

use config::Config;
use console::ConsoleFrontend;
use engine::{EngineHandle, EngineParts};
use library::Library;
use panel::{Frontend, Panel};

#[derive(Parser)]
#[command(name = "facetally", about = "Webcam face enrollment, recognition and tallying")]
struct Cli {
    /// Camera index to open instead of the configured one
    #[arg(long, global = true)]
    camera: Option<u32>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive button panel (default)
    Panel,
    /// Capture face samples for a person and retrain
    Enroll {
        /// Person's name
        #[arg(short, long)]
        name: String,
    },
    /// Recognize faces until Ctrl-C, counting every recognition
    Recognize {
        /// Stop after this many frames
        #[arg(long)]
        ticks: Option<u64>,
    },
    /// Delete one person or everyone
    Delete {
        /// Person to delete
        #[arg(short, long, conflicts_with = "all", required_unless_present = "all")]
        name: Option<String>,
        /// Delete every stored face, record and the model
        #[arg(long)]
        all: bool,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// List stored faces and their recognition counts
    List,
    /// Retrain the model from the sample folder
    Train,
    /// List video devices
    Devices,
    /// Show configuration and database state
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::load().context("loading configuration")?;
    if let Some(index) = cli.camera {
        config.camera_index = index;
    }

    match cli.command.unwrap_or(Commands::Panel) {
        Commands::Panel => {
            let panel = open_panel(&config, stdin_console()).await?;
            console::run_menu(panel, ctrl_c).await?;
        }
        Commands::Enroll { name } => {
            let mut panel = open_panel(&config, stdin_console()).await?;
            panel.enroll(&name).await?;
            println!("{}", panel.face_count_label()?);
        }
        Commands::Recognize { ticks } => {
            let mut panel = open_panel(&config, stdin_console()).await?;
            if let Some(summary) = panel.start_recognition(ctrl_c(), ticks).await? {
                println!(
                    "{} frame(s), {} recognition(s), {} capture error(s)",
                    summary.frames, summary.recognitions, summary.capture_errors
                );
            }
        }
        Commands::Delete { name, all, yes } => {
            let library = Library::open(&config)?;
            let mut frontend = stdin_console();
            if all {
                if !yes
                    && !frontend.ask_yes_no(
                        "Confirm Delete",
                        "Are you sure you want to delete ALL stored faces?",
                    )
                {
                    println!("Deletion cancelled.");
                    return Ok(());
                }
                let removed = library.delete_all()?;
                println!(
                    "Removed {} image(s) and {} record(s).",
                    removed.images, removed.rows
                );
            } else if let Some(name) = name {
                if !library.store.contains(&name)? {
                    bail!("No record found for '{name}'.");
                }
                if !yes
                    && !frontend.ask_yes_no("Confirm Delete", &format!("Delete all data for {name}?"))
                {
                    println!("Deletion cancelled.");
                    return Ok(());
                }
                let (removed, _) = library.delete_person(&name)?;
                println!("Removed {} image(s) and record for {name}.", removed.images);
            }
        }
        Commands::List => {
            let library = Library::open(&config)?;
            let records = library.store.list()?;
            if records.is_empty() {
                println!("No faces found in the database.");
            }
            for r in records {
                println!(
                    "{:>4}  {:<20} {}  recognized {} time(s)",
                    r.id, r.name, r.date_added, r.recognition_count
                );
            }
        }
        Commands::Train => {
            let library = Library::open(&config)?;
            match library.retrain()? {
                Some(model) => println!(
                    "Trained on {} sample(s) of {} person(s).",
                    model.recognizer.sample_count(),
                    model.labels.len()
                ),
                None => println!("No samples to train on."),
            }
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No video devices found.");
            }
            for d in devices {
                println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
            }
        }
        Commands::Status => {
            let library = Library::open(&config)?;
            let model = library.load_model()?;
            println!("camera:        {} (alt {})", config.camera_index, config.alt_camera_index);
            println!("cascade model: {}", config.cascade_model.display());
            println!("samples:       {}", config.sample_dir.display());
            println!("database:      {}", config.db_path.display());
            println!("Stored Faces:  {}", library.store.face_count()?);
            match model {
                Some(m) => println!(
                    "model:         {} ({} person(s))",
                    config.model_path.display(),
                    m.labels.len()
                ),
                None => println!("model:         not trained"),
            }
        }
    }

    Ok(())
}

fn stdin_console() -> ConsoleFrontend<impl BufRead, impl Write> {
    ConsoleFrontend::new(std::io::stdin().lock(), std::io::stdout())
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

fn start_engine(config: &Config) -> Result<EngineHandle> {
    let detector = CascadeDetector::load(&config.cascade_model, DetectorParams::default())
        .with_context(|| format!("loading cascade {}", config.cascade_model.display()))?;
    let camera = Camera::open(config.camera_index)
        .with_context(|| format!("opening camera {}", config.camera_index))?;

    let parts = EngineParts {
        source: Box::new(camera),
        opener: Box::new(|index| Ok(Box::new(Camera::open(index)?) as Box<dyn FrameSource>)),
        detector: Box::new(detector),
        samples: SampleStore::open(&config.sample_dir)?,
        threshold: config.recognition_threshold,
        preview_path: config.preview_path.clone(),
        sample_interval: Duration::from_millis(config.sample_interval_ms),
        max_enroll_frames: config.max_enroll_frames,
    };
    Ok(engine::spawn_engine(parts)?)
}

async fn open_panel<F: Frontend>(config: &Config, frontend: F) -> Result<Panel<F>> {
    let engine = start_engine(config)?;
    let library = Library::open(config)?;
    Ok(Panel::new(config.clone(), engine, library, frontend).await?)
}
