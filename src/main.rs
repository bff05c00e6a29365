use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use goatjp_core::Config;
use goatjp_weather::{
    FixedLocationManager, LocationProvider, SharedStorage, SqliteStore, TemperatureUnit,
    WeatherClient, WeatherOrchestrator, WidgetEntry, WidgetProvider, WidgetSize,
};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(author, version, about = "GoatJp weather and widget host")]
struct Cli {
    /// Config file path (defaults to the platform config directory)
    #[arg(short, long, env = "GOATJP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch weather for the current location and save it for the widget
    Refresh,

    /// Load sample weather without location or network
    Demo,

    /// Render the widget timeline from shared storage
    Widget {
        /// Override the configured size (small, medium, large)
        #[arg(short, long)]
        size: Option<WidgetSize>,
    },

    /// Update the saved widget configuration
    Configure {
        #[arg(short, long)]
        size: Option<WidgetSize>,

        /// Temperature unit (celsius, fahrenheit)
        #[arg(short, long)]
        unit: Option<TemperatureUnit>,

        /// Location name shown instead of the detected one
        #[arg(long, conflicts_with = "clear_location")]
        custom_location: Option<String>,

        /// Show the detected location name again
        #[arg(long)]
        clear_location: bool,

        /// Use the saved background image (true/false)
        #[arg(long)]
        custom_background: Option<bool>,
    },

    /// Set or clear the widget background image
    Background {
        /// Image file to store
        #[arg(required_unless_present = "clear")]
        path: Option<PathBuf>,

        #[arg(long, conflicts_with = "path")]
        clear: bool,
    },

    /// Show the location permission state
    Permission,

    /// Remove all shared widget data
    Clear,
}

/// Everything a command needs, wired from configuration.
struct Host {
    config: Config,
    storage: SharedStorage,
}

impl Host {
    fn open(config_path: Option<PathBuf>) -> Result<Self> {
        let loaded = match config_path {
            Some(path) => Config::load_validated_from(&path),
            None => Config::load_validated(),
        };
        let (config, _) = loaded.map_err(|e| anyhow::anyhow!("{} ({})", e.user_message(), e))?;

        let store_path = config.shared_store_path();
        let store = SqliteStore::open(&store_path, &config.storage.group_id)
            .with_context(|| format!("Failed to open shared store {}", store_path.display()))?;
        tracing::info!("Shared store: {}", store_path.display());

        Ok(Self {
            config,
            storage: SharedStorage::new(Arc::new(store)),
        })
    }

    fn orchestrator(&self) -> Result<WeatherOrchestrator> {
        let manager = FixedLocationManager::from_config(&self.config.location);
        let location = LocationProvider::from_config(Arc::new(manager), &self.config.location);
        let client = WeatherClient::from_config(&self.config.weather)?;

        Ok(WeatherOrchestrator::new(
            Arc::new(location),
            Arc::new(client),
            self.storage.clone(),
        ))
    }

    fn widget(&self) -> WidgetProvider {
        WidgetProvider::from_config(self.storage.clone(), &self.config.widget)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    goatjp_core::init()?;

    let cli = Cli::parse();
    let host = Host::open(cli.config)?;

    match cli.command {
        Commands::Refresh => refresh(&host).await,
        Commands::Demo => {
            let weather = host.orchestrator()?.load_sample().await;
            println!(
                "{}  {}  {}",
                weather.location,
                weather.formatted_temperature(),
                weather.condition.description()
            );
            Ok(())
        }
        Commands::Widget { size } => {
            let timeline = host.widget().timeline(chrono::Utc::now());
            for entry in &timeline.entries {
                print_entry(entry, size);
            }
            match timeline.next_update {
                Some(at) => println!(
                    "Next update: {}",
                    at.with_timezone(&chrono::Local).format("%H:%M")
                ),
                None => println!("Next update: never"),
            }
            Ok(())
        }
        Commands::Configure {
            size,
            unit,
            custom_location,
            clear_location,
            custom_background,
        } => {
            let mut configuration = host.storage.load_widget_configuration();
            if let Some(size) = size {
                configuration.size = size;
            }
            if let Some(unit) = unit {
                configuration.temperature_unit = unit;
            }
            if clear_location {
                configuration.custom_location = None;
            } else if custom_location.is_some() {
                configuration.custom_location = custom_location;
            }
            if let Some(enabled) = custom_background {
                configuration.use_custom_background = enabled;
            }

            host.storage.save_widget_configuration(&configuration);
            tracing::info!("Widget configuration saved");
            println!("{:#?}", configuration);
            Ok(())
        }
        Commands::Background { path, clear } => {
            if clear {
                host.storage.remove_background_image();
                println!("Background image removed");
                return Ok(());
            }
            let path = path.context("Missing image path")?;
            let image = std::fs::read(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            host.storage.save_background_image(&image);
            println!("Background image saved ({} bytes)", image.len());
            Ok(())
        }
        Commands::Permission => {
            let state = host.orchestrator()?.check_location_permission();
            println!("Location permission: {:?}", state);
            Ok(())
        }
        Commands::Clear => {
            host.storage.clear_all();
            println!("Shared widget data cleared");
            Ok(())
        }
    }
}

/// Run one refresh; Ctrl-C abandons it without saving anything.
async fn refresh(host: &Host) -> Result<()> {
    let orchestrator = host.orchestrator()?;
    if let Some(cached) = orchestrator.restore_cached() {
        tracing::info!(
            "Previously saved: {} {}",
            cached.location,
            cached.formatted_temperature()
        );
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    match orchestrator.refresh_with_cancel(&cancel).await {
        Ok(weather) => {
            println!(
                "{}  {}  {}",
                weather.location,
                weather.formatted_temperature(),
                weather.condition.description()
            );
            if weather.is_extreme() {
                println!("Extreme temperature");
            }
            Ok(())
        }
        Err(e) => {
            if e.needs_settings_change() {
                eprintln!("Check the location settings, then run `goatjp refresh` again.");
            } else if e.is_retryable() {
                eprintln!("This may be temporary. Try again in a moment.");
            }
            anyhow::bail!("{}", e.user_message())
        }
    }
}

fn print_entry(entry: &WidgetEntry, size: Option<WidgetSize>) {
    let size = size.unwrap_or(entry.configuration.size);
    let [from, to] = entry.gradient();
    println!("[{} widget, {} -> {}]", size.display_name(), from, to);
    for line in entry.lines_for(size) {
        println!("  {}", line);
    }
    if let Some(image) = &entry.background {
        println!("  (background image, {} bytes)", image.len());
    }
}
