use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use bracket_raw::config::Config;
use bracket_raw::device::SimulatedCamera;
use bracket_raw::exif::{CaptureExif, read_capture_exif};
use bracket_raw::naming::{FileKind, NamingScheme, SequenceContext};
use bracket_raw::sequencer::{CaptureMode, SequenceSummary};
use bracket_raw::session::{BracketSession, SessionEvent};
use bracket_raw::settings::SettingEntry;
use bracket_raw::store::{self, LocalStore};

#[derive(Parser, Debug)]
#[command(
    name = "bracket-raw",
    version,
    about = "Exposure/ISO bracketing — manage a bracket list, rehearse it against a simulated camera, and review the RAW+JPEG scenes it writes"
)]
struct Cli {
    /// Files or directories to inspect with --show-exif
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Path to config file (default: config.json next to binary)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Initialize a default config.json and exit
    #[arg(long)]
    init: bool,

    /// Append a manual setting to the bracket list
    #[arg(long, num_args = 3, value_names = ["ISO", "EXPOSURE", "COUNT"])]
    add: Option<Vec<String>>,

    /// Append an auto-exposure setting shot COUNT times
    #[arg(long = "add-auto", value_name = "COUNT")]
    add_auto: Option<u32>,

    /// Remove the setting at INDEX (1-based) from the bracket list
    #[arg(long, value_name = "INDEX")]
    remove: Option<usize>,

    /// Remove every setting from the bracket list
    #[arg(long)]
    clear: bool,

    /// Print the bracket list
    #[arg(long)]
    list: bool,

    /// Run the bracket list against the simulated camera
    #[arg(long)]
    run: bool,

    /// Run an auto-exposure 3×3 bracket against the simulated camera
    #[arg(long)]
    auto: bool,

    /// Override the output root for this run
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Delete both directories of the scene containing DIR
    #[arg(long, value_name = "DIR")]
    discard: Option<PathBuf>,

    /// Rename both directories of a scene to carry LABEL
    #[arg(long, num_args = 2, value_names = ["DIR", "LABEL"])]
    label: Option<Vec<String>>,

    /// Display the capture EXIF of written files and exit
    #[arg(long = "show-exif")]
    show_exif: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    let config_path = match cli.config.clone() {
        Some(p) => p,
        None => Config::config_path()?,
    };

    // Handle --init
    if cli.init {
        let mut config = Config::default();
        config.ensure_device_id();
        config.save(Some(&config_path))?;
        println!("Default config written to {}", config_path.display());
        return Ok(());
    }

    // Handle --show-exif
    if cli.show_exif {
        if cli.paths.is_empty() {
            anyhow::bail!("No input files or directories specified. Use --help for usage.");
        }
        let images = collect_jpegs(&cli.paths);
        if images.is_empty() {
            anyhow::bail!("No JPEG files found in the specified paths.");
        }
        return show_exif(&images, cli.json);
    }

    let mut config = Config::load(Some(&config_path))?;
    let mut dirty = config.ensure_device_id();

    // Bracket list management
    if cli.clear {
        config.brackets.clear();
        dirty = true;
    }
    if let Some(fields) = &cli.add {
        let [iso, exposure, count] = fields.as_slice() else {
            anyhow::bail!("--add takes ISO, EXPOSURE and COUNT");
        };
        let entry = SettingEntry::parse(iso, exposure, count)?;
        log::info!("Added {entry}");
        config.brackets.push(entry);
        dirty = true;
    }
    if let Some(count) = cli.add_auto {
        let entry = SettingEntry::auto(count)?;
        log::info!("Added {entry}");
        config.brackets.push(entry);
        dirty = true;
    }
    if let Some(index) = cli.remove {
        let removed = index
            .checked_sub(1)
            .and_then(|i| config.brackets.remove(i))
            .with_context(|| format!("No setting at position {index}"))?;
        log::info!("Removed {removed}");
        dirty = true;
    }
    if dirty {
        config.save(Some(&config_path))?;
    }

    if cli.list {
        print_brackets(&config, cli.json)?;
    }

    // Scene review
    if let Some(dir) = &cli.discard {
        let context = scene_context(dir, &config)?;
        store::discard_scene(&context)?;
        println!("Discarded {}", context.scene_name);
    }
    if let Some(args) = &cli.label {
        let [dir, label] = args.as_slice() else {
            anyhow::bail!("--label takes DIR and LABEL");
        };
        let context = scene_context(Path::new(dir), &config)?;
        let (jpeg, raw) = store::label_scene(&context, label)?;
        println!("Labeled {}:", context.scene_name);
        println!("  {}", jpeg.display());
        println!("  {}", raw.display());
    }

    // Rehearsal run
    if cli.run || cli.auto {
        let mode = if cli.auto {
            CaptureMode::AutoExposure
        } else {
            CaptureMode::Manual
        };
        let root = cli.output.clone().unwrap_or_else(|| config.output.root.clone());
        let summary = run_sequence(&config, root, mode).await?;
        print_summary(&summary, cli.json)?;
    }

    let did_something = cli.add.is_some()
        || cli.add_auto.is_some()
        || cli.remove.is_some()
        || cli.clear
        || cli.list
        || cli.discard.is_some()
        || cli.label.is_some()
        || cli.run
        || cli.auto;
    if !did_something {
        anyhow::bail!("Nothing to do. Use --help for usage.");
    }

    Ok(())
}

async fn run_sequence(config: &Config, root: PathBuf, mode: CaptureMode) -> Result<SequenceSummary> {
    let camera = Arc::new(SimulatedCamera::builder().build());
    let naming = NamingScheme::new(config.device.device_id.clone(), root);
    let (mut session, mut events) = BracketSession::new(
        camera.clone(),
        camera,
        Arc::new(LocalStore),
        naming,
        config.brackets.clone(),
        config.session_options(),
    );

    let reporter = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Progress(fraction) => {
                    log::info!("Progress: {:.0}%", fraction * 100.0);
                }
                SessionEvent::ShotFinished { ordinal, outcome } => {
                    log::debug!("  Shot {ordinal}: {outcome}");
                }
                SessionEvent::Failed(reason) => log::error!("Sequence failed: {reason}"),
                SessionEvent::ControlsEnabled(_) | SessionEvent::Finished(_) => {}
            }
        }
    });

    let result = session.run(mode).await;
    // Closing the session closes the event channel and ends the reporter
    drop(session);
    if let Err(e) = reporter.await {
        log::warn!("Event reporter stopped: {e}");
    }

    Ok(result?)
}

fn scene_context(dir: &Path, config: &Config) -> Result<SequenceContext> {
    SequenceContext::from_directory(dir, config.device.device_id.clone()).with_context(|| {
        format!(
            "{} is not a scene directory (expected <scene>_JPG_<timestamp> or <scene>_DNG_<timestamp>)",
            dir.display()
        )
    })
}

/// Collect `.jpg`/`.jpeg` files from files and directories.
fn collect_jpegs(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut images = Vec::new();
    for path in paths {
        for entry in WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            let is_jpeg = p
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"));
            if p.is_file() && is_jpeg {
                images.push(p.to_path_buf());
            }
        }
    }
    images.sort();
    images
}

// ANSI color codes
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

/// Max width for the value column before wrapping.
const VAL_WIDTH: usize = 46;
/// Indent for continuation lines (tag column width + " : " = 25 chars + 2 leading spaces).
const INDENT: &str = "                           ";

fn print_brackets(config: &Config, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&config.brackets)?);
        return Ok(());
    }

    println!();
    let shots = config
        .brackets
        .total_shots()
        .map_or_else(|| "too many".to_string(), |n| n.to_string());
    println!("{BOLD}Bracket list{RESET} ({shots} shot(s))");
    println!("{DIM}{}{RESET}", "─".repeat(72));
    if config.brackets.is_empty() {
        println!("  {DIM}(empty, a run takes one auto shot){RESET}");
    }
    for (i, entry) in config.brackets.iter().enumerate() {
        println!("  {:>3}. {entry}", i + 1);
    }
    println!();
    Ok(())
}

fn print_summary(summary: &SequenceSummary, json: bool) -> Result<()> {
    let jpeg_dir = summary.context.directory(FileKind::Jpeg);
    let raw_dir = summary.context.directory(FileKind::Raw);

    if json {
        let value = serde_json::json!({
            "scene": summary.context.scene_name,
            "timestamp": summary.context.timestamp,
            "mode": summary.mode.to_string(),
            "jpeg_dir": jpeg_dir.display().to_string(),
            "raw_dir": raw_dir.display().to_string(),
            "planned": summary.total_planned,
            "completed": summary.total_completed,
            "written": summary.written,
            "skipped": summary.skipped,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    log::info!(
        "Done: {} written, {} skipped out of {} shots",
        summary.written,
        summary.skipped,
        summary.total_planned
    );
    println!("  JPEG: {}", jpeg_dir.display());
    println!("  RAW:  {}", raw_dir.display());
    Ok(())
}

fn show_exif(images: &[PathBuf], json: bool) -> Result<()> {
    if json {
        let mut results = Vec::new();
        for path in images {
            let data = read_capture_exif(path)?;
            results.push(serde_json::json!({
                "path": path.display().to_string(),
                "make": data.make,
                "model": data.model,
                "iso": data.iso,
                "exposure_time": data.exposure_time,
                "user_comment": data.user_comment,
            }));
        }
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    for path in images {
        print_capture_exif(path, &read_capture_exif(path)?);
    }
    Ok(())
}

/// Print the capture EXIF of one file.
fn print_capture_exif(path: &Path, data: &CaptureExif) {
    println!();
    println!("{BOLD}File:{RESET} {}", path.display());
    println!("{DIM}{}{RESET}", "═".repeat(72));

    if data.is_empty() {
        println!("  {DIM}(no EXIF metadata found){RESET}");
        println!();
        return;
    }

    let fields: [(&str, Option<&str>); 5] = [
        ("Make", data.make.as_deref()),
        ("Model", data.model.as_deref()),
        ("ISO", data.iso.as_deref()),
        ("ExposureTime", data.exposure_time.as_deref()),
        ("UserComment", data.user_comment.as_deref()),
    ];
    for (tag, val) in fields {
        if let Some(v) = val {
            print_row(tag, v);
        }
    }
    println!();
}

/// Print a single row in the EXIF display table.
fn print_row(tag: &str, val: &str) {
    let tag_col = format!("{:<22}", tag);
    let lines = wrap_text(val, VAL_WIDTH);
    for (i, line) in lines.iter().enumerate() {
        if i == 0 {
            println!("  {tag_col} : {line}");
        } else {
            println!("  {INDENT}{line}");
        }
    }
}

/// Wrap text at word boundaries to fit within max_width.
fn wrap_text(s: &str, max_width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current_line = String::new();

    for word in s.split_whitespace() {
        if current_line.is_empty() {
            current_line = word.to_string();
        } else if current_line.len() + 1 + word.len() <= max_width {
            current_line.push(' ');
            current_line.push_str(word);
        } else {
            lines.push(current_line);
            current_line = word.to_string();
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }

    if lines.is_empty() {
        lines.push(s.to_string());
    }

    lines
}
