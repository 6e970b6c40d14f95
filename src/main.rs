#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod app;
mod config;
mod console_capture;
mod context;
mod converter;
mod logging;
mod modules;
mod notifications;
mod preferences;
mod style;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context as _;
use clap::{ArgAction, Parser};
use eframe::egui;

use crate::app::MarkItDownApp;
use crate::config::AppConfig;
use crate::context::AppContext;

#[derive(Debug, Parser)]
#[command(name = "markitdown-ui", version, about = "Convert documents to Markdown with MarkItDown", disable_version_flag = true)]
struct Args {
    /// Print version and exit
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,

    /// Document to preselect for conversion
    file: Option<PathBuf>,
}

fn run(args: Args, bridge: logging::NotificationBridge) -> anyhow::Result<()> {
    let config: AppConfig = AppConfig::from_env();
    let app: AppContext = AppContext::install(config).context("starting MarkItDown UI")?;
    bridge.attach(app.notifications.notifier());
    if !app.console.start_capture() {
        tracing::warn!("console capture was already active");
    }

    let (width, height) = app.preferences.window_size();
    let mut viewport: egui::ViewportBuilder = egui::ViewportBuilder::default()
        .with_title("MarkItDown UI")
        .with_inner_size([width as f32, height as f32])
        .with_min_inner_size([640.0, 480.0]);
    if let Some((x, y)) = app.preferences.window_position() {
        viewport = viewport.with_position([x as f32, y as f32]);
    }
    let options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };

    let initial_file: Option<PathBuf> = args.file;
    eframe::run_native(
        "MarkItDown UI",
        options,
        Box::new(move |cc| Ok(Box::new(MarkItDownApp::new(cc, app, initial_file)))),
    )
    .map_err(|e| anyhow::anyhow!("{e}"))
}

fn main() -> ExitCode {
    let args: Args = Args::parse();
    let bridge: logging::NotificationBridge = logging::init_tracing("info");
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting");

    match run(args, bridge) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let message: String = format!("{e:#}");
            tracing::error!("{message}");
            eprintln!("Error: {message}");
            let _ = rfd::MessageDialog::new()
                .set_level(rfd::MessageLevel::Error)
                .set_title("MarkItDown UI")
                .set_description(&message)
                .set_buttons(rfd::MessageButtons::Ok)
                .show();
            ExitCode::FAILURE
        }
    }
}
