//! Weather map dashboard - weathermap example
//!
//! Mounts one map and drives it from the terminal:
//! 1. stdin line -> Command -> MapAction enqueued on the runtime
//! 2. The runtime reduces a tick of actions and executes the effects
//! 3. Effects call the simulated widget and the URL bar, or spawn HTTP tasks
//!
//! # Usage
//!
//! ```sh
//! # Default view (Kyiv, wind)
//! cargo run -p weathermap-dashboard -- --api-key demo
//!
//! # Seed the view from a URL query
//! cargo run -p weathermap-dashboard -- --api-key demo --query "?overlay=clouds&lat=51.5&lon=-0.12&zoom=6"
//! ```

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use weathermap::{
    Action, LoggingMiddleware, MapAction, MapConfig, MapRuntime, MapServices, MapState, MapStatus,
    ScriptLoader,
};

use weathermap_dashboard::api::{OpenMeteoGeocoder, OpenWeatherTiles};
use weathermap_dashboard::commands::{Command, HELP, parse_command};
use weathermap_dashboard::host::{HttpScriptHost, StdoutNavigator};
use weathermap_dashboard::widget::SimulatedWidgetApi;

/// Weather map dashboard - weathermap example
#[derive(Parser, Debug)]
#[command(name = "weathermap-dashboard")]
#[command(about = "A terminal weather map driven by the weathermap controller")]
struct Args {
    /// JSON config file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Initial page query, e.g. "?overlay=clouds&zoom=6"
    #[arg(long, short, default_value = "")]
    query: String,

    /// Widget API key (overrides the config file)
    #[arg(long)]
    api_key: Option<String>,

    /// OpenWeatherMap app id for static fallback tiles
    #[arg(long, default_value = "")]
    tiles_key: String,

    /// Simulated widget startup delay in milliseconds
    #[arg(long, default_value = "300")]
    startup_ms: u64,

    /// Log every dispatched action
    #[arg(long)]
    debug: bool,
}

fn load_config(args: &Args) -> Result<MapConfig, weathermap::ConfigError> {
    let mut config = match &args.config {
        Some(path) => MapConfig::from_path(path)?,
        None => MapConfig::default(),
    };
    if let Some(key) = &args.api_key {
        config.api_key = key.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let client = reqwest::Client::new();
    let widget_api = Arc::new(SimulatedWidgetApi::new(Duration::from_millis(
        args.startup_ms,
    )));
    let navigator = Arc::new(StdoutNavigator::new(args.query.clone()));
    let services = MapServices {
        scripts: ScriptLoader::new(
            Arc::new(HttpScriptHost::new(client.clone())),
            config.script_timeout,
        ),
        widget_api: widget_api.clone(),
        geocoder: Arc::new(OpenMeteoGeocoder::new(client.clone())),
        navigator: navigator.clone(),
        fallback: Arc::new(OpenWeatherTiles::new(client, args.tiles_key.clone())),
    };

    let mut runtime = MapRuntime::mount_with_middleware(config, services, LoggingMiddleware::new());
    let (nav_tx, nav_rx) = mpsc::unbounded_channel();
    runtime.watch_navigation(UnboundedReceiverStream::new(nav_rx));

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut shown = Shown::default();

    loop {
        let line = tokio::select! {
            _ = runtime.step() => None,
            line = lines.next_line() => Some(line),
        };

        match line {
            None => shown.report(runtime.state()),
            Some(Ok(Some(line))) => {
                let command = match parse_command(&line) {
                    Ok(command) => command,
                    Err(e) => {
                        println!("error {}", e);
                        continue;
                    }
                };
                debug!(command = command.name(), "Command");
                match command {
                    Command::Quit => break,
                    Command::Help => println!("{}", HELP),
                    Command::Status => print_status(runtime.state()),
                    Command::Search(city) => runtime.enqueue(MapAction::SearchSubmit(city)),
                    Command::Overlay(kind) => runtime.enqueue(MapAction::OverlayChange(kind)),
                    Command::Retry => runtime.enqueue(MapAction::WidgetRetry),
                    Command::Navigate(query) => {
                        let _ = nav_tx.send(navigator.navigate(&query));
                    }
                    Command::Pan { center, zoom } => match widget_api.current() {
                        Some(widget) if runtime.status() == MapStatus::Ready => {
                            let zoom = zoom.unwrap_or_else(|| runtime.state().view.state().zoom);
                            widget.drag_to(center, zoom);
                        }
                        _ => println!("error Map is not ready"),
                    },
                }
            }
            Some(Ok(None)) => break,
            Some(Err(e)) => {
                eprintln!("Error reading stdin: {}", e);
                break;
            }
        }
    }

    runtime.unmount();
    Ok(())
}

/// What was last printed, so ticks only print changes.
#[derive(Default)]
struct Shown {
    status: Option<MapStatus>,
    notice: Option<String>,
    fallback: Option<String>,
}

impl Shown {
    fn report(&mut self, state: &MapState) {
        let status = state.status();
        if self.status.as_ref() != Some(&status) {
            match &status {
                MapStatus::Failed { reason, .. } => println!("map  failed: {} (type `retry`)", reason),
                other => println!("map  {:?}", other),
            }
            self.status = Some(status);
        }
        if self.notice != state.notice {
            if let Some(notice) = &state.notice {
                println!("note {}", notice);
            }
            self.notice = state.notice.clone();
        }
        if self.fallback != state.fallback_image {
            if let Some(url) = &state.fallback_image {
                println!("map  static overlay {}", url);
            }
            self.fallback = state.fallback_image.clone();
        }
    }
}

fn print_status(state: &MapState) {
    let view = state.view.state();
    println!("status {:?}", state.status());
    println!(
        "view   {} @ {} [{}] set by {}",
        view.center, view.zoom, view.overlay, view.origin
    );
    if let Some(query) = state.url.last_written() {
        println!("url    {}", query);
    }
    if let Some(notice) = &state.notice {
        println!("note   {}", notice);
    }
}
