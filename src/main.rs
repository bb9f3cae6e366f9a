//! video-plugin — videos dashboard plugin and its series store.
//!
//! Usage:
//!   video-plugin serve      --config config.toml   # serve the plugin over HTTP
//!   video-plugin tags       --config config.toml   # print the tag index as JSON
//!   video-plugin write-demo --config config.toml --run demo --tag gradient

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use ndarray::Array5;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use video_plugin::api::{self, DEFAULT_EXPERIMENT};
use video_plugin::config::Config;
use video_plugin::demux::Demuxer;
use video_plugin::plugin::{PluginContext, VideosPlugin};
use video_plugin::storage::LocalStore;
use video_plugin::summary::{FfmpegEncoder, SummaryWriter};

#[derive(Parser)]
#[command(name = "video-plugin", about = "Videos dashboard plugin", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the plugin routes over HTTP.
    Serve {
        /// Path to the TOML configuration file.
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Print the tag index and exit.
    Tags {
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Write a synthetic video summary into the store.
    WriteDemo {
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
        #[arg(long, default_value = "demo")]
        run: String,
        #[arg(long, default_value = "gradient")]
        tag: String,
        #[arg(long, default_value_t = 0)]
        step: i64,
        /// Videos in the batch (before `max_outputs` is applied).
        #[arg(long, default_value_t = 2)]
        videos: usize,
        #[arg(long, default_value_t = 16)]
        frames: usize,
        /// Frame width and height in pixels.
        #[arg(long, default_value_t = 64)]
        size: usize,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Serve { config } => run_serve(config).await,
        Command::Tags { config } => run_tags(config),
        Command::WriteDemo { config, run, tag, step, videos, frames, size } => {
            run_write_demo(config, &run, &tag, step, [videos, frames, size])
        }
    };

    if let Err(e) = result {
        let chain = format!("{e:#}");
        error!(error = %chain, "Command failed");
        std::process::exit(1);
    }
}

fn open_plugin(cfg: &Config) -> anyhow::Result<VideosPlugin> {
    let store = LocalStore::open(&cfg.storage.base_path)
        .with_context(|| format!("open store at {:?}", cfg.storage.base_path))?;
    let context = PluginContext {
        sampling_hints: cfg.sampling_hints.clone(),
        data_provider: Arc::new(store),
    };
    Ok(VideosPlugin::new(context).with_demuxer(Demuxer::from_config(&cfg.tools)))
}

async fn run_serve(config_path: PathBuf) -> anyhow::Result<()> {
    let cfg = Config::from_file(&config_path)?;
    let plugin = Arc::new(open_plugin(&cfg)?);

    info!(
        base_path = ?cfg.storage.base_path,
        downsample_to = plugin.downsample_to(),
        ffmpeg = ?cfg.tools.ffmpeg,
        port = cfg.server.port,
        "Starting videos plugin"
    );

    if !cfg.server.enabled {
        info!("HTTP server disabled in config, nothing to do");
        return Ok(());
    }

    tokio::select! {
        _ = api::start_server(plugin, cfg.server.port) => {}
        res = tokio::signal::ctrl_c() => {
            res.context("signal handler")?;
            info!("Received CTRL+C, shutting down…");
        }
    }
    Ok(())
}

fn run_tags(config_path: PathBuf) -> anyhow::Result<()> {
    let cfg = Config::from_file(&config_path)?;
    let plugin = open_plugin(&cfg)?;
    let index = plugin.index_impl(DEFAULT_EXPERIMENT)?;
    println!("{}", serde_json::to_string_pretty(&index)?);
    Ok(())
}

fn run_write_demo(
    config_path: PathBuf,
    run: &str,
    tag: &str,
    step: i64,
    [videos, frames, size]: [usize; 3],
) -> anyhow::Result<()> {
    let cfg = Config::from_file(&config_path)?;
    let store = Arc::new(LocalStore::open(&cfg.storage.base_path)?);
    let writer = SummaryWriter::new(
        run,
        store,
        Arc::new(FfmpegEncoder::new(cfg.tools.ffmpeg.clone())),
    );

    // Each video sweeps a diagonal gradient at its own speed.
    let data = Array5::from_shape_fn((videos, frames, size, size, 3), |(k, t, y, x, c)| {
        let phase = (x + y + t * (k + 1) * 4) % 256;
        match c {
            0 => phase as u8,
            1 => (255 - phase) as u8,
            _ => ((k * 80) % 256) as u8,
        }
    });

    let record = writer.video(
        tag,
        data.view().into_dyn(),
        cfg.writer.fps,
        step,
        cfg.writer.max_outputs,
        Some("Synthetic gradient clips"),
    )?;
    let sizes: Vec<usize> = record.videos().iter().map(Vec::len).collect();
    info!(run, tag, step, ?sizes, "Demo summary written");
    Ok(())
}
