mod cli;

use transcode_queue::{
    config::{self, FileSettings, ServiceOptions, Settings, SettingsSource, StaticSettings},
    ConverterService, JobEvent,
};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use transcode_av::tools;
use transcode_common::{FormatProfile, JobId};

/// Profile overrides given on the command line.
struct ProfileOverrides {
    format: Option<String>,
    video_bitrate: Option<String>,
    resolution: Option<String>,
    fps: Option<u32>,
}

impl ProfileOverrides {
    fn apply(&self, profile: &mut FormatProfile) -> Result<()> {
        if let Some(ref format) = self.format {
            profile.format = format.trim_start_matches('.').to_string();
        }
        if let Some(ref bitrate) = self.video_bitrate {
            profile.set_bitrate(bitrate)?;
        }
        if let Some(ref resolution) = self.resolution {
            profile.set_resolution(resolution)?;
        }
        if let Some(fps) = self.fps {
            profile.set_fps(fps)?;
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "transcode_queue=trace,transcode_av=debug,transcode_common=debug".to_string()
        } else {
            "transcode_queue=info,transcode_av=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            inputs,
            format,
            output,
            video_bitrate,
            resolution,
            fps,
            watch,
            ffmpeg,
        } => {
            let overrides = ProfileOverrides {
                format,
                video_bitrate,
                resolution,
                fps,
            };
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_queue(
                inputs,
                output,
                overrides,
                watch,
                ffmpeg.as_deref(),
                cli.config.as_deref(),
            ))
        }
        Commands::CheckTools => check_tools(),
        Commands::InitConfig { path, force } => init_config(path, force),
        Commands::Version => {
            println!("transcode-queue {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn run_queue(
    inputs: Vec<PathBuf>,
    output: Option<PathBuf>,
    overrides: ProfileOverrides,
    watch: bool,
    ffmpeg: Option<&Path>,
    config_path: Option<&Path>,
) -> Result<()> {
    let settings_path = config::resolve_settings_path(config_path);
    let settings = match settings_path {
        Some(ref path) => config::load_settings(path)?,
        None => Settings::default(),
    };

    if inputs.is_empty() && !watch {
        println!("No input files given.");
        println!("Example: transcode-queue run video1.mp4 video2.avi");
        return Ok(());
    }
    if watch && !settings.hot_folder_enabled {
        anyhow::bail!("--watch needs hot_folder_enabled and hot_folder_path in the settings file");
    }

    let mut profile = settings.default_profile.clone();
    overrides
        .apply(&mut profile)
        .context("Invalid conversion parameters")?;

    let ffmpeg_path = tools::require_tool("ffmpeg", ffmpeg).context("ffmpeg is required")?;
    tracing::debug!("Using ffmpeg at {:?}", ffmpeg_path);
    let output_dir = output.unwrap_or_else(|| settings.output_path.clone());

    let service = ConverterService::with_ffmpeg(ServiceOptions {
        ffmpeg_path,
        ..Default::default()
    });
    let printer = tokio::spawn(print_events(
        service.subscribe(),
        settings.notifications_enabled,
    ));

    for input in inputs {
        service.add_job(input, &output_dir, profile.clone());
    }

    if watch {
        let source: Arc<dyn SettingsSource> = match settings_path {
            Some(path) => Arc::new(FileSettings::new(path)),
            None => Arc::new(StaticSettings::new(settings)),
        };
        service.start_hot_folder(source);
        tracing::info!("Watching hot folder, press Ctrl-C to stop");
    }
    service.start_processing();

    let idle = async {
        if watch {
            // The watcher can restart the worker at any time.
            std::future::pending::<()>().await;
            Ok(())
        } else {
            let service = service.clone();
            tokio::task::spawn_blocking(move || service.wait_idle()).await
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, stopping");
        }
        res = idle => {
            res.context("Worker wait task failed")?;
        }
    }

    {
        let service = service.clone();
        tokio::task::spawn_blocking(move || service.shutdown())
            .await
            .context("Shutdown task failed")?;
    }

    let stats = service.stats();
    drop(service);
    if let Err(e) = printer.await {
        tracing::warn!("Event printer failed: {}", e);
    }

    println!("{}", serde_json::to_string_pretty(&stats)?);
    if stats.failed > 0 {
        anyhow::bail!("{} job(s) failed", stats.failed);
    }
    Ok(())
}

/// Print job events until the service is dropped.
async fn print_events(mut rx: broadcast::Receiver<JobEvent>, notify: bool) {
    let mut names: HashMap<JobId, String> = HashMap::new();
    let name = |names: &HashMap<JobId, String>, id: &JobId| {
        names.get(id).cloned().unwrap_or_else(|| id.to_string())
    };

    loop {
        match rx.recv().await {
            Ok(JobEvent::JobQueued { job }) => {
                println!("queued    {}", job.source_path.display());
                names.insert(job.id, job.file_name());
            }
            Ok(JobEvent::JobStarted { id }) => println!("started   {}", name(&names, &id)),
            Ok(JobEvent::JobProgress { id, progress }) => {
                println!("{:>3}%      {}", progress, name(&names, &id));
            }
            Ok(JobEvent::JobCompleted { id }) => {
                if notify {
                    println!("Conversion finished: {}", name(&names, &id));
                } else {
                    println!("done      {}", name(&names, &id));
                }
            }
            Ok(JobEvent::JobFailed { id, error }) => {
                eprintln!("failed    {}: {}", name(&names, &id), error);
            }
            Ok(JobEvent::JobCancelled { id }) => println!("cancelled {}", name(&names, &id)),
            Ok(JobEvent::JobRemoved { .. }) | Ok(JobEvent::QueueCleared { .. }) => {}
            Err(RecvError::Lagged(n)) => tracing::warn!("Missed {} job events", n),
            Err(RecvError::Closed) => break,
        }
    }
}

fn check_tools() -> Result<()> {
    println!("Checking external tools...\n");

    let tool = tools::check_tool("ffmpeg");
    let status = if tool.available { "✓" } else { "✗" };
    print!("{} {}", status, tool.name);

    if let Some(ref version) = tool.version {
        print!(" ({})", version.lines().next().unwrap_or(""));
    }

    if let Some(ref path) = tool.path {
        print!(" - {}", path.display());
    }

    println!();
    println!();
    if tool.available {
        println!("All required tools are available!");
        Ok(())
    } else {
        anyhow::bail!("ffmpeg was not found on PATH")
    }
}

fn init_config(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = path.unwrap_or_else(|| PathBuf::from(config::DEFAULT_SETTINGS_PATHS[0]));
    if path.exists() && !force {
        anyhow::bail!("{:?} already exists (use --force to overwrite)", path);
    }
    config::persist::save_settings(&path, &Settings::default())?;
    println!("Wrote default settings to {}", path.display());
    Ok(())
}
