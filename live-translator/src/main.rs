//! Live Translator - Main entry point
//!
//! Watches the configured screen target and logs every translation worth
//! showing.
//!
//! # Usage
//!
//! ```bash
//! live-translator                          # Run with the default config
//! live-translator --config ./config.toml   # Custom configuration
//! live-translator --profile robot_studio   # Apply an application profile
//! live-translator --once                   # Single capture, then exit
//! live-translator --list-windows           # Show windows and matching profiles
//! ```

use live_translator::engines;
use live_translator::{
    control_channel, logging, CaptureSource, Config, Controller, LoadOutcome, GlossaryStore, LoopSettings, Pipeline,
    PipelineSettings, ProfileManager, RecognitionGateway, ScreenCapture, TranslationBatch,
    TranslationGateway,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Default)]
struct Args {
    config_path: Option<PathBuf>,
    profile: Option<String>,
    once: bool,
    list_windows: bool,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-v" => {
                println!("live-translator v{}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--once" => parsed.once = true,
            "--list-windows" | "-l" => parsed.list_windows = true,
            "--config" | "-c" => {
                i += 1;
                if i < args.len() {
                    parsed.config_path = Some(PathBuf::from(&args[i]));
                }
            }
            "--profile" | "-p" => {
                i += 1;
                if i < args.len() {
                    parsed.profile = Some(args[i].clone());
                }
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                eprintln!("Use --help for usage information.");
                std::process::exit(1);
            }
        }
        i += 1;
    }

    parsed
}

fn print_help() {
    println!(
        r#"Live Translator - change-gated screen text translation

USAGE:
    live-translator [OPTIONS]

OPTIONS:
    -h, --help              Show this help message
    -v, --version           Show version
    -c, --config <PATH>     Path to configuration file
    -p, --profile <KEY>     Apply the application profile with this key
    --once                  Capture and translate once, then exit
    -l, --list-windows      List capturable windows and the profiles they match

PERMISSIONS REQUIRED (macOS):
    - Screen Recording: System Settings > Privacy & Security > Screen Recording
"#
    );
}

fn log_batch(batch: &TranslationBatch) {
    for (region, translation) in batch.pairs() {
        info!(
            "[{},{} {}x{}] {} -> {}{}",
            region.bbox.x,
            region.bbox.y,
            region.bbox.width,
            region.bbox.height,
            translation.original_text,
            translation.translated_text,
            if translation.glossary_hit { " (glossary)" } else { "" }
        );
    }
}

fn list_windows(source: &ScreenCapture, profiles: &ProfileManager) {
    let windows = source.list_windows();
    if windows.is_empty() {
        println!("No capturable windows found");
        return;
    }
    for window in &windows {
        let profile = profiles
            .find_for_window(window)
            .map(|p| format!("  [profile: {}]", p.name))
            .unwrap_or_default();
        println!(
            "{:>8}  {:<24} {:<40} {}x{} at {},{}{}",
            window.id,
            window.app_name,
            window.title,
            window.bounds.width,
            window.bounds.height,
            window.bounds.x,
            window.bounds.y,
            profile
        );
    }
}

fn open_glossary(config: &Config) -> Option<Arc<GlossaryStore>> {
    let path = config
        .glossary
        .db_path
        .clone()
        .unwrap_or_else(GlossaryStore::default_path);

    let opened = if config.glossary.seed_defaults {
        GlossaryStore::open(&path)
    } else {
        GlossaryStore::open_unseeded(&path)
    };

    let store = match opened {
        Ok(store) => store,
        Err(e) => {
            warn!("Glossary unavailable at {:?}: {}; continuing without it", path, e);
            return None;
        }
    };

    for import in &config.glossary.import {
        match store.import_file(import) {
            Ok(report) => info!(
                "Imported {} glossary terms from {:?} ({} skipped)",
                report.imported, import, report.skipped
            ),
            Err(e) => warn!("Glossary import from {:?} failed: {}", import, e),
        }
    }

    Some(Arc::new(store))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args();

    let (mut config, outcome) = match &args.config_path {
        Some(path) => (Config::try_load_from_path(path)?, LoadOutcome::Loaded(path.clone())),
        None => Config::load(),
    };
    logging::init(&config.general);
    outcome.log();

    info!("Starting Live Translator");

    let profiles = config
        .profiles_dir
        .as_ref()
        .map(ProfileManager::load_dir)
        .unwrap_or_default();

    let capture = Arc::new(ScreenCapture::new());
    if args.list_windows {
        list_windows(&capture, &profiles);
        return Ok(());
    }

    let profile = match &args.profile {
        Some(key) => match profiles.get(key) {
            Some(profile) => {
                profile.apply_settings(&mut config)?;
                Some(profile.clone())
            }
            None => {
                error!("Unknown profile '{}'", key);
                return Err(format!("unknown profile '{}'", key).into());
            }
        },
        None => None,
    };

    let glossary = open_glossary(&config);
    if let Some(stats) = glossary.as_ref().and_then(|g| g.stats().ok()) {
        info!("Glossary: {} terms, {} lookups recorded", stats.term_count, stats.total_usage);
    }

    let recognition = RecognitionGateway::new(
        engines::recognition_backends(&config.recognition),
        &config.recognition.engine,
    );
    let translation = TranslationGateway::new(
        engines::translation_backends(&config.translation),
        &config.translation.primary_engine,
        glossary,
    );

    let pipeline = Pipeline::new(
        Arc::new(recognition),
        Arc::new(translation),
        PipelineSettings::from(&config),
    )
    .with_consumer(Arc::new(log_batch));

    let mut controller = Controller::new(
        capture,
        LoopSettings::from(&config.capture),
        Arc::new(pipeline),
        config.target.clone(),
    );

    if let Some(profile) = &profile {
        controller.apply_profile(profile).await?;
    }

    if args.once {
        match controller.capture_once().await? {
            Some(batch) => info!("{} translations", batch.len()),
            None => info!("Nothing to translate"),
        }
        return Ok(());
    }

    let (handle, rx) = control_channel(16);
    let worker = tokio::spawn(controller.run(rx));
    handle.start().await?;

    info!("Press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    handle.shutdown().await?;
    let status = worker.await?;
    info!(
        "Stopped after {} session(s): {} texts detected, {} translated",
        status.sessions_started, status.texts_detected, status.texts_translated
    );

    Ok(())
}
