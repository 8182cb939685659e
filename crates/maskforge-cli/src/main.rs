//! maskforge: headless front end for the maskforge editing engine.
//!
//! Replays scripted edits through the same session state machine the
//! browser editor uses, so masks and composites can be produced from
//! shell scripts and checked in CI:
//!
//! - `mask` builds an inpainting mask from brush, rectangle and
//!   magic-wand operations and writes it as PNG;
//! - `composite` places overlay images on a base image and writes the
//!   export-optimized composite;
//! - `history` lists, adds, and deletes generation history records.
//!
//! # Usage
//!
//! ```text
//! maskforge mask photo.jpg -o mask.png --op "brush:10,10;90,40" --op "wand:50,50@30"
//! maskforge composite base.png -o out.webp --overlay logo.png@20,20,0.5
//! maskforge history --store ~/.maskforge list
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod script;
mod storage;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use maskforge_core::{
    AspectRatio, DrawMode, EditSession, EditorConfig, EditorError, ExportFormat, ExportOptions,
    Filter, Flavor, GenerationStore, NewGeneration, OverlayMode, PixelBuffer, Placement,
    StoreError, Tolerance,
};

use crate::script::{MaskOp, OverlaySpec};
use crate::storage::FileStorage;

/// Mask painting, overlay compositing, and generation history.
#[derive(Parser)]
#[command(name = "maskforge", version)]
struct Cli {
    /// Log at debug level (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build an inpainting mask and write it as PNG.
    Mask {
        /// Source image (PNG, JPEG, BMP, WebP).
        image: PathBuf,

        /// Output PNG path.
        #[arg(short, long)]
        output: PathBuf,

        /// Edit operation, applied in order: `brush:X,Y;X,Y;...`,
        /// `rect:X0,Y0,X1,Y1`, `wand:X,Y[@TOL]`, or `clear`.
        #[arg(long = "op")]
        ops: Vec<MaskOp>,

        /// Brush width in pixels.
        #[arg(long)]
        brush_width: Option<f64>,

        /// Editor configuration as a JSON file.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Composite overlay images onto a base image.
    Composite {
        /// Base image.
        base: PathBuf,

        /// Output path.
        #[arg(short, long)]
        output: PathBuf,

        /// Overlay image as `PATH[@X,Y[,SCALE[,ROT]]]`. Without a
        /// position it is fitted into the middle of the canvas.
        #[arg(long = "overlay")]
        overlays: Vec<OverlaySpec>,

        /// Convert the base image to grayscale first.
        #[arg(long)]
        grayscale: bool,

        /// Downscale wider outputs to this width.
        #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
        max_width: Option<u32>,

        /// Output encoding.
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,

        /// JPEG quality (1-100).
        #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<u8>::new().range(1..=100))]
        quality: Option<u8>,

        /// Editor configuration as a JSON file.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Manage the generation history.
    History {
        /// Directory holding the history files.
        #[arg(long, default_value = ".maskforge")]
        store: PathBuf,

        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// Print all records as JSON, newest first.
    List,
    /// Record a generated image.
    Add {
        /// Image URL.
        #[arg(long)]
        url: String,
        /// Prompt that produced it.
        #[arg(long)]
        prompt: String,
        /// Aspect ratio, e.g. `16:9` or `ASPECT_16_9`.
        #[arg(long, default_value = "1:1", value_parser = parse_aspect_ratio)]
        aspect_ratio: AspectRatio,
        /// Creation time (RFC 3339); defaults to now.
        #[arg(long)]
        created_at: Option<DateTime<Utc>>,
    },
    /// Delete a record by id.
    Delete {
        /// Record id.
        id: i64,
    },
}

/// Output encoding selection.
#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Lossless PNG.
    Png,
    /// Lossy JPEG.
    Jpeg,
    /// Lossless WebP.
    Webp,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Config {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Editor(#[from] EditorError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no history record with id {0}")]
    UnknownRecord(i64),
}

fn parse_aspect_ratio(s: &str) -> Result<AspectRatio, String> {
    AspectRatio::parse(s).ok_or_else(|| format!("unknown aspect ratio {s:?} (1:1, 16:9, 10:16)"))
}

fn read(path: &Path) -> Result<Vec<u8>, CliError> {
    std::fs::read(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write(path: &Path, bytes: &[u8]) -> Result<(), CliError> {
    std::fs::write(path, bytes).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn load_config(path: Option<&Path>) -> Result<EditorConfig, CliError> {
    let Some(path) = path else {
        return Ok(EditorConfig::default());
    };
    let bytes = read(path)?;
    serde_json::from_slice(&bytes).map_err(|source| CliError::Config {
        path: path.to_path_buf(),
        source,
    })
}

/// Open a session of `flavor` on the image at `path`.
fn open_session(flavor: Flavor, config: EditorConfig, path: &Path) -> Result<EditSession, CliError> {
    let bytes = read(path)?;
    let mut session = EditSession::new(flavor, config)?;
    session.load(path.display().to_string(), &bytes)?;
    Ok(session)
}

fn run_mask(
    image: &Path,
    output: &Path,
    ops: &[MaskOp],
    brush_width: Option<f64>,
    config: Option<&Path>,
) -> Result<(), CliError> {
    let mut config = load_config(config)?;
    if let Some(width) = brush_width {
        config.brush_width = width;
    }
    let default_tolerance = Tolerance::new(config.default_tolerance)?;
    let mut session = open_session(Flavor::Mask, config, image)?;

    for op in ops {
        log::debug!("applying {op:?}");
        match op {
            MaskOp::Brush(points) => {
                session.set_draw_mode(DrawMode::Brush)?;
                let Some((first, rest)) = points.split_first() else {
                    continue;
                };
                session.pointer_down(*first)?;
                for point in rest {
                    session.pointer_move(*point)?;
                }
                session.pointer_up(*points.last().unwrap_or(first))?;
            }
            MaskOp::Rect(from, to) => {
                session.set_draw_mode(DrawMode::Rectangle)?;
                session.pointer_down(*from)?;
                session.pointer_move(*to)?;
                session.pointer_up(*to)?;
            }
            MaskOp::Wand(point, tolerance) => {
                session.set_draw_mode(DrawMode::MagicWand(tolerance.unwrap_or(default_tolerance)))?;
                session.pointer_down(*point)?;
                while session.is_selecting() {
                    session.advance_selection()?;
                }
            }
            MaskOp::Clear => session.clear_mask()?,
        }
    }

    let png = session.export_mask()?;
    write(output, &png)?;
    eprintln!("Mask written to {} ({} bytes)", output.display(), png.len());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_composite(
    base: &Path,
    output: &Path,
    overlays: &[OverlaySpec],
    grayscale: bool,
    max_width: Option<u32>,
    format: Option<OutputFormat>,
    quality: Option<u8>,
    config: Option<&Path>,
) -> Result<(), CliError> {
    let mut config = load_config(config)?;
    if let Some(max_width) = max_width {
        config.export.max_width = max_width;
    }
    if let Some(format) = format {
        config.export.format = match format {
            OutputFormat::Png => ExportFormat::Png,
            OutputFormat::Webp => ExportFormat::WebP,
            OutputFormat::Jpeg => ExportFormat::Jpeg {
                quality: quality.unwrap_or(ExportOptions::DEFAULT_JPEG_QUALITY),
            },
        };
    } else if let (Some(quality), ExportFormat::Jpeg { .. }) = (quality, config.export.format) {
        config.export.format = ExportFormat::Jpeg { quality };
    }

    let mut session = open_session(Flavor::Overlay, config, base)?;

    if grayscale {
        session.set_overlay_mode(OverlayMode::Filter)?;
        session.apply_filter(Filter::Grayscale)?;
        session.set_overlay_mode(OverlayMode::Image)?;
    }

    for overlay in overlays {
        let image = PixelBuffer::decode(&read(&overlay.path)?)?;
        let placement = match overlay.position {
            Some(position) => Placement::At {
                position,
                scale: overlay.scale.unwrap_or(1.0),
            },
            None => Placement::Fit,
        };
        let id = session.add_overlay(image, placement)?;
        if let Some(rotation) = overlay.rotation {
            session.overlays_mut()?.set_rotation(id, rotation)?;
        }
        log::debug!("placed overlay {id} from {}", overlay.path.display());
    }

    let encoded = session.finalize_composite()?;
    write(output, &encoded.bytes)?;
    eprintln!(
        "Composite written to {} ({}x{} {}, {} bytes)",
        output.display(),
        encoded.dimensions.width,
        encoded.dimensions.height,
        encoded.mime_type(),
        encoded.bytes.len(),
    );
    Ok(())
}

fn run_history(store: &Path, action: HistoryAction) -> Result<(), CliError> {
    let mut store = GenerationStore::new(FileStorage::new(store));
    log::debug!("history store at {}", store.storage().dir().display());
    match action {
        HistoryAction::List => {
            let records = store.list();
            let json = serde_json::to_string_pretty(&records).map_err(StoreError::from)?;
            println!("{json}");
        }
        HistoryAction::Add {
            url,
            prompt,
            aspect_ratio,
            created_at,
        } => {
            let record = store.save(NewGeneration {
                image_url: url,
                prompt,
                aspect_ratio,
                created_at,
            })?;
            println!("{}", record.id);
        }
        HistoryAction::Delete { id } => {
            if !store.delete(id)? {
                return Err(CliError::UnknownRecord(id));
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let result = match cli.command {
        Command::Mask {
            image,
            output,
            ops,
            brush_width,
            config,
        } => run_mask(&image, &output, &ops, brush_width, config.as_deref()),
        Command::Composite {
            base,
            output,
            overlays,
            grayscale,
            max_width,
            format,
            quality,
            config,
        } => run_composite(
            &base,
            &output,
            &overlays,
            grayscale,
            max_width,
            format,
            quality,
            config.as_deref(),
        ),
        Command::History { store, action } => run_history(&store, action),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
