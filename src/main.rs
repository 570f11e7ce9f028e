//! Clip Captioner
//! A TUI tool to batch-generate social media captions for short videos
//! using Google Gemini AI. Captions stream into the interface as the
//! model produces them; a simulated subtitle removal job tags each
//! upload according to the current defaults.

mod config;
mod gemini;
mod intake;
mod pipeline;
mod security;
mod store;
mod tui;
mod types;

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use crossterm::event::{self, Event, KeyEventKind};
use simplelog::{Config as LogConfig, LevelFilter, WriteLogger};
use zeroize::Zeroizing;

use config::{AppConfig, Settings};
use gemini::GeminiClient;
use security::ProtectionMode;
use store::SharedStore;
use tui::{App, AppMessage, LogLevel, TuiSender, UserAction};
use types::{APP_NAME, APP_VERSION};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    // Check and strip --debug flag
    let debug_mode = args.contains(&"--debug".to_string());
    if debug_mode {
        let _ = WriteLogger::init(
            LevelFilter::Debug,
            LogConfig::default(),
            OpenOptions::new()
                .create(true)
                .append(true)
                .open("debug.log")?,
        );
        log::info!("Starting {} v{} with debug logging", APP_NAME, APP_VERSION);
        log::debug!("Raw args: {:?}", args);
    }

    let actual_args: Vec<String> = args.iter().filter(|a| *a != "--debug").cloned().collect();

    if actual_args.len() > 1 {
        return handle_cli_command(&actual_args).await;
    }

    run_tui_mode().await
}

/// Password for sealed settings, taken from the environment
fn settings_password() -> Option<Zeroizing<String>> {
    std::env::var("CLIP_CAPTIONER_PASSWORD")
        .ok()
        .map(Zeroizing::new)
}

fn load_settings() -> Result<Settings> {
    let password = settings_password();
    Settings::load(password.as_ref().map(|p| p.as_str()))
}

/// Handle CLI commands (caption, protect)
async fn handle_cli_command(args: &[String]) -> Result<()> {
    let command = args[1].as_str();

    match command {
        "caption" => {
            if args.len() < 3 {
                eprintln!("Usage: {} caption <video_path> [style prompt...]", args[0]);
                eprintln!("\nExample:");
                eprintln!("  {} caption clip.mp4", args[0]);
                eprintln!("  {} caption clip.mp4 humorous, with hashtags", args[0]);
                std::process::exit(1);
            }

            let video_path = PathBuf::from(&args[2]);
            let style_prompt = args[3..].join(" ");
            run_caption_command(video_path, style_prompt).await
        }

        "protect" => {
            if args.len() < 3 {
                eprintln!("Usage: {} protect <none|simple|password> [password]", args[0]);
                std::process::exit(1);
            }

            let mode = ProtectionMode::parse(&args[2]).ok_or_else(|| {
                anyhow!(
                    "Unknown protection mode '{}' (use none, simple or password)",
                    args[2]
                )
            })?;

            let mut settings = load_settings()?;
            let password = match mode {
                ProtectionMode::Password => Some(
                    args.get(3)
                        .cloned()
                        .map(Zeroizing::new)
                        .or_else(settings_password)
                        .ok_or_else(|| {
                            anyhow!(
                                "Password mode needs a password: protect password <password> \
                                 (or set CLIP_CAPTIONER_PASSWORD)"
                            )
                        })?,
                ),
                _ => None,
            };

            settings.protection = mode;
            settings.save(password.as_ref().map(|p| p.as_str()))?;
            println!("🔒 {} is now stored with protection: {:?}", AppConfig::CONFIG_PATH, mode);
            Ok(())
        }

        "help" | "--help" | "-h" => {
            print_help(&args[0]);
            Ok(())
        }

        _ => {
            eprintln!("Unknown command: {}", command);
            print_help(&args[0]);
            std::process::exit(1);
        }
    }
}

/// One-shot CLI captioning: stream the generated text to stdout
async fn run_caption_command(video_path: PathBuf, style_prompt: String) -> Result<()> {
    let settings = load_settings()?;
    let config = settings.config;

    let report = intake::gather(vec![video_path.clone()], config.max_file_size_bytes());
    let Some(candidate) = report.accepted.into_iter().next() else {
        let reason = report
            .rejected
            .first()
            .map(|r| r.reason.to_string())
            .unwrap_or_else(|| "not accepted".to_string());
        return Err(anyhow!("{}: {}", video_path.display(), reason));
    };

    let client = GeminiClient::from_config(&config);
    println!("🎬 Generating caption for {}...\n", candidate.file_name());

    // The callback receives the full text so far; print only the new
    // tail so the stream reads naturally on a terminal.
    let mut printed = 0usize;
    let result = client
        .generate_caption(
            &candidate.path,
            candidate.mime_type,
            &style_prompt,
            |full_text| {
                print!("{}", &full_text[printed..]);
                printed = full_text.len();
                use std::io::Write;
                let _ = std::io::stdout().flush();
            },
        )
        .await;

    match result {
        Ok(text) => {
            if text.is_empty() {
                println!("(the model returned no caption)");
            } else {
                println!();
            }
            Ok(())
        }
        Err(e) => {
            println!();
            Err(e.into())
        }
    }
}

/// Print help message
fn print_help(program: &str) {
    println!("{} v{}", APP_NAME, APP_VERSION);
    println!();
    println!("USAGE:");
    println!(
        "  {}                                Run TUI mode (interactive)",
        program
    );
    println!(
        "  {} caption <video> [prompt...]    One-shot caption to stdout",
        program
    );
    println!(
        "  {} protect <mode> [password]      Re-seal settings.json (none/simple/password)",
        program
    );
    println!(
        "  {} help                           Show this help message",
        program
    );
    println!();
    println!("OPTIONS:");
    println!("  --debug    Write verbose logs to debug.log");
    println!();
    println!("CONFIGURATION:");
    println!("  Edit settings.json to configure:");
    println!("  - gemini_api_keys        API keys (GEMINI_API_KEY overrides)");
    println!("  - model                  Generation model identifier");
    println!("  - default_style_prompt   Style prompt pre-filled in the TUI");
    println!("  - max_file_size_mb       Upload size limit (default 500)");
    println!("  - subtitle_removal       Defaults for the removal pass");
}

/// Run the TUI mode
async fn run_tui_mode() -> Result<()> {
    // Load settings BEFORE setting up the terminal so any bootstrap
    // println! (like creating a default config) lands on normal stdout.
    let settings = load_settings()?;

    let mut terminal = tui::setup_terminal()?;

    let result = run_app(&mut terminal, settings.config).await;

    tui::restore_terminal(&mut terminal)?;

    if let Err(ref e) = result {
        eprintln!("\n❌ Error: {}", e);
    }

    result
}

async fn run_app(
    terminal: &mut ratatui::Terminal<ratatui::backend::CrosstermBackend<std::io::Stdout>>,
    config: AppConfig,
) -> Result<()> {
    let store = store::shared();
    let client = Arc::new(GeminiClient::from_config(&config));

    // Create message channel for async communication
    let (tx, mut rx) = tui::create_channel();

    let mut app = App::new(
        config.default_style_prompt.clone(),
        config.subtitle_removal,
    );
    app.log(
        LogLevel::Info,
        "Press 'u' to upload videos for captioning".to_string(),
    );

    if config.api_keys_with_env().is_empty() {
        app.log(
            LogLevel::Warning,
            "No Gemini API key configured; generation will fail until GEMINI_API_KEY is set"
                .to_string(),
        );
    }

    // Main event loop
    loop {
        // Mirror the store into render rows, then draw
        {
            let guard = store.lock().unwrap();
            app.sync_items(&guard);
        }
        terminal.draw(|frame| tui::render(frame, &app))?;

        // Handle messages from background tasks
        while let Ok(msg) = rx.try_recv() {
            match msg {
                AppMessage::FilesPicked(paths) => {
                    handle_files_picked(&mut app, &store, &client, &tx, &config, paths);
                }
                other => app.handle_message(other),
            }
        }

        // Poll for events with timeout
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key.code);
                }
            }
        }

        // Act on intents raised by key handling
        for action in std::mem::take(&mut app.pending) {
            handle_action(&mut app, &store, &client, &tx, &config, action);
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

/// The native picker closed: screen the selection and create items.
fn handle_files_picked(
    app: &mut App,
    store: &SharedStore,
    client: &Arc<GeminiClient>,
    tx: &TuiSender,
    config: &AppConfig,
    paths: Vec<PathBuf>,
) {
    app.picker_open = false;
    app.status = "Ready".to_string();
    if paths.is_empty() {
        // Picker cancelled
        return;
    }

    let report = intake::gather(paths, config.max_file_size_bytes());

    for rejected in &report.rejected {
        let name = rejected
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| rejected.path.display().to_string());
        app.log(
            LogLevel::Warning,
            format!("Skipped {}: {}", name, rejected.reason),
        );
    }

    if report.nothing_accepted() {
        app.log(
            LogLevel::Warning,
            "None of the selected files are usable videos (check type and size)".to_string(),
        );
        return;
    }

    // Freeze the current defaults onto this batch.
    let snapshot = app.subtitle_defaults;
    let (ids, total) = {
        let mut guard = store.lock().unwrap();
        let ids = guard.create_items(&report.accepted, snapshot);
        (ids, guard.len())
    };
    app.log(
        LogLevel::Info,
        format!("Added {} video(s) ({} in session)", ids.len(), total),
    );

    for (id, candidate) in ids.into_iter().zip(report.accepted.iter()) {
        pipeline::spawn_caption_generation(
            store.clone(),
            client.clone(),
            tx.clone(),
            id,
            candidate.path.clone(),
            candidate.mime_type,
            app.style_prompt.clone(),
            config.notify_on_complete,
        );
        if snapshot.enabled {
            pipeline::schedule_subtitle_removal(
                store.clone(),
                tx.clone(),
                id,
                candidate.path.clone(),
                snapshot,
            );
        }
    }
}

fn handle_action(
    app: &mut App,
    store: &SharedStore,
    client: &Arc<GeminiClient>,
    tx: &TuiSender,
    config: &AppConfig,
    action: UserAction,
) {
    match action {
        UserAction::PickFiles => {
            app.picker_open = true;
            app.status = "Waiting for file selection…".to_string();
            let tx = tx.clone();
            tokio::spawn(async move {
                let picked = rfd::AsyncFileDialog::new()
                    .set_title("Select videos to caption")
                    .add_filter("Videos", &intake::picker_extensions())
                    .pick_files()
                    .await;
                let paths: Vec<PathBuf> = picked
                    .map(|files| {
                        files
                            .into_iter()
                            .map(|f| f.path().to_path_buf())
                            .collect()
                    })
                    .unwrap_or_default();
                let _ = tx.send(AppMessage::FilesPicked(paths));
            });
        }

        UserAction::Retry(id) => {
            // Reset the caption track and re-run the same pipeline with
            // the current style prompt. A retry racing an in-flight
            // stream is unguarded; the last writer wins.
            let reset = store.lock().unwrap().retry_reset(id);
            if let Some((path, mime_type)) = reset {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                app.log(LogLevel::Info, format!("Retrying caption for {}", name));
                pipeline::spawn_caption_generation(
                    store.clone(),
                    client.clone(),
                    tx.clone(),
                    id,
                    path,
                    mime_type,
                    app.style_prompt.clone(),
                    config.notify_on_complete,
                );
            }
        }

        UserAction::Remove(id) => {
            let removed_name = {
                let mut guard = store.lock().unwrap();
                let name = guard.get(id).map(|item| item.file_name());
                if guard.remove(id) {
                    name
                } else {
                    None
                }
            };
            if let Some(name) = removed_name {
                app.log(LogLevel::Info, format!("Removed {}", name));
            }
        }

        UserAction::OpenPreview(id) => {
            let target = {
                let guard = store.lock().unwrap();
                guard.get(id).and_then(|item| {
                    item.processed_media
                        .clone()
                        .or_else(|| item.preview.path().map(|p| p.to_path_buf()))
                })
            };
            if let Some(path) = target {
                if let Err(e) = open::that(&path) {
                    app.log(
                        LogLevel::Error,
                        format!("Could not open {}: {}", path.display(), e),
                    );
                }
            }
        }
    }
}
