use std::{
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use vidgif::{
    ConvertOptions, Converter, DOWNLOAD_FILE_NAME, DefaultLoader, DelayPolicy, ObjectUrls,
    OutputManager, ProgressCallback, ProgressInfo, QualityOptions, RunPhase, RunToken, Session,
    SessionEvent,
};

const CLI_AFTER_HELP: &str = "Examples:
  vidgif convert clip.mp4 --fps 10 --size 50 --out-dir out
  vidgif probe clip.mp4 --json
  vidgif interactive
  vidgif completions zsh > _vidgif";

const OPTION_NAMES: [&str; 4] = ["quality", "frameRate", "size", "dither"];

#[derive(Debug, Parser)]
#[command(
    name = "vidgif",
    version,
    about = "Turn the first seconds of a video into an animated GIF",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show additional output.
    #[arg(long)]
    verbose: bool,

    /// Show a progress bar while converting.
    #[arg(long)]
    progress: bool,

    /// Allow overwriting an existing output file.
    #[arg(long)]
    overwrite: bool,

    /// FFmpeg log level (quiet, fatal, error, warning, info, debug).
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Convert a video into an animated GIF.
    #[command(
        about = "Convert a video to GIF",
        after_help = "Examples:\n  vidgif convert clip.mp4\n  \
                      vidgif convert clip.mp4 --quality 5 --fps 12 --size 50 --dither \
                      --out-dir out --json"
    )]
    Convert {
        /// Input video path.
        input: PathBuf,
        /// Colour precision, 1-30 (smaller is better and slower).
        #[arg(long, default_value_t = 10)]
        quality: u8,
        /// Frames sampled per second, 1-30.
        #[arg(long, default_value_t = 8)]
        fps: u32,
        /// Output size as a percentage of the video size, 1-100.
        #[arg(long, default_value_t = 100)]
        size: u32,
        /// Dither while quantizing.
        #[arg(long)]
        dither: bool,
        /// Show every frame for 100 ms instead of deriving delays from --fps.
        #[arg(long)]
        fixed_delay: bool,
        /// Directory the GIF is saved into.
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        /// Print the result as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print what a conversion of the input would sample.
    #[command(
        about = "Print duration, size and planned samples",
        visible_alias = "info",
        after_help = "Examples:\n  vidgif probe clip.mp4\n  vidgif probe clip.mp4 --fps 12 --json"
    )]
    Probe {
        /// Input video path.
        input: PathBuf,
        /// Frames sampled per second, 1-30.
        #[arg(long, default_value_t = 8)]
        fps: u32,
        /// Output size as a percentage of the video size, 1-100.
        #[arg(long, default_value_t = 100)]
        size: u32,
        /// Print as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Line-driven session: open files, tweak options, download results.
    #[command(
        about = "Start an interactive session",
        after_help = "Commands:\n  open <path>\n  set <quality|frameRate|size|dither> <value>\n  \
                      options\n  status\n  download [dir]\n  quit"
    )]
    Interactive,

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, PartialEq, Eq)]
enum InteractiveCommand {
    Open(PathBuf),
    Set { name: String, value: String },
    Options,
    Status,
    Download(PathBuf),
    Help,
    Quit,
}

fn parse_interactive(line: &str) -> Result<InteractiveCommand, String> {
    let mut parts = line.split_whitespace();
    let Some(verb) = parts.next() else {
        return Err("empty command".to_string());
    };
    let rest: Vec<&str> = parts.collect();

    match (verb.to_ascii_lowercase().as_str(), rest.as_slice()) {
        ("open", []) => Err("usage: open <path>".to_string()),
        ("open", _) => Ok(InteractiveCommand::Open(PathBuf::from(rest.join(" ")))),
        ("set", [name, value]) => Ok(InteractiveCommand::Set {
            name: (*name).to_string(),
            value: (*value).to_string(),
        }),
        ("set", _) => Err("usage: set <name> <value>".to_string()),
        ("options", []) => Ok(InteractiveCommand::Options),
        ("status", []) => Ok(InteractiveCommand::Status),
        ("download", []) => Ok(InteractiveCommand::Download(PathBuf::from("."))),
        ("download", [dir]) => Ok(InteractiveCommand::Download(PathBuf::from(dir))),
        ("help" | "?", _) => Ok(InteractiveCommand::Help),
        ("quit" | "exit", _) => Ok(InteractiveCommand::Quit),
        _ => Err(format!("unknown command: {line}")),
    }
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(feature = "ffmpeg")]
    if let Some(level) = &global.log_level {
        let parsed = vidgif::FfmpegLogLevel::parse(level)
            .ok_or(format!("unsupported --log-level: {level}"))?;
        vidgif::set_ffmpeg_log_level(parsed);
    }

    #[cfg(not(feature = "ffmpeg"))]
    if global.log_level.is_some() {
        eprintln!(
            "{} {}",
            "warning:".yellow().bold(),
            "--log-level requires building with the `ffmpeg` feature".yellow()
        );
    }

    Ok(())
}

fn terminal_progress(
    global: &GlobalOptions,
) -> Result<Arc<TerminalProgress>, Box<dyn std::error::Error>> {
    let progress_bar = if global.progress {
        let pb = ProgressBar::new(0);
        let style =
            ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}")?;
        pb.set_style(style.progress_chars("##-"));
        Some(pb)
    } else {
        None
    };

    Ok(Arc::new(TerminalProgress {
        bar: progress_bar,
        verbose: global.verbose,
    }))
}

struct TerminalProgress {
    bar: Option<ProgressBar>,
    verbose: bool,
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        if let Some(bar) = &self.bar {
            if let Some(total) = info.total {
                bar.set_length(total);
            }
            bar.set_position(info.current);
        }
    }

    fn on_phase(&self, _generation: u64, phase: &RunPhase, message: &str) {
        match &self.bar {
            Some(bar) if phase.is_terminal() => bar.finish_and_clear(),
            Some(bar) => {
                bar.set_position(0);
                bar.set_message(message.to_string());
            }
            None if self.verbose && !message.is_empty() => {
                eprintln!("{} {message}", "status".cyan().bold());
            }
            None => {}
        }
    }
}

fn print_options(quality: &QualityOptions) {
    for name in OPTION_NAMES {
        if let Some(label) = quality.label(name) {
            println!("  {label}");
        }
    }
}

fn run_interactive(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    let options = ConvertOptions::new().with_progress(terminal_progress(global)?);
    let converter = Converter::new().with_options(options);
    let mut session = Session::with_converter(converter);

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    print!("vidgif> ");
    stdout.flush()?;

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            print!("vidgif> ");
            stdout.flush()?;
            continue;
        }

        match parse_interactive(&line) {
            Ok(InteractiveCommand::Open(path)) => {
                let generation = session.select_file(&path)?;
                if global.verbose {
                    eprintln!("started run {generation} for {}", path.display());
                }
                match session.wait(None) {
                    Some(SessionEvent::Ready(preview)) => println!(
                        "{} {}x{}, {} frames, {} bytes ({})",
                        "ready".green().bold(),
                        preview.width,
                        preview.height,
                        preview.frame_count,
                        preview.byte_len,
                        preview.url
                    ),
                    Some(SessionEvent::Failed { error, .. }) => {
                        eprintln!("{} {error}", "failed:".red().bold());
                    }
                    None => {}
                }
            }
            Ok(InteractiveCommand::Set { name, value }) => match session.set_option(&name, &value) {
                Ok(label) => println!("  {label}"),
                Err(error) => eprintln!("{} {error}", "error:".red().bold()),
            },
            Ok(InteractiveCommand::Options) => print_options(&session.options()),
            Ok(InteractiveCommand::Status) => {
                println!("  phase: {:?}", session.phase());
                let download = if session.can_download() {
                    "enabled"
                } else {
                    "disabled"
                };
                println!("  download: {download}");
                if let Some(preview) = session.preview() {
                    println!("  preview: {} ({}x{})", preview.url, preview.width, preview.height);
                }
            }
            Ok(InteractiveCommand::Download(dir)) => {
                if session.can_download() {
                    ensure_writable_path(&dir.join(DOWNLOAD_FILE_NAME), global.overwrite)?;
                }
                match session.download(&dir)? {
                    Some(path) => println!("{} {}", "saved".green().bold(), path.display()),
                    None => eprintln!(
                        "{} {}",
                        "warning:".yellow().bold(),
                        "nothing to download yet".yellow()
                    ),
                }
            }
            Ok(InteractiveCommand::Help) => {
                println!(
                    "  open <path> | set <name> <value> | options | status | download [dir] | quit"
                );
            }
            Ok(InteractiveCommand::Quit) => break,
            Err(message) => eprintln!("{} {message}", "error:".red().bold()),
        }

        print!("vidgif> ");
        stdout.flush()?;
    }

    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Convert {
            input,
            quality,
            fps,
            size,
            dither,
            fixed_delay,
            out_dir,
            json,
        } => {
            let progress = terminal_progress(&cli.global)?;
            let mut options = ConvertOptions::new().with_progress(progress.clone());
            if fixed_delay {
                options = options.with_delay_policy(DelayPolicy::Fixed(Duration::from_millis(100)));
            }
            let quality = QualityOptions::new()
                .with_quality(quality)
                .with_frame_rate(fps)
                .with_size_percent(size)
                .with_dither(dither);

            if !out_dir.exists() {
                std::fs::create_dir_all(&out_dir)?;
            }
            ensure_writable_path(&out_dir.join(DOWNLOAD_FILE_NAME), cli.global.overwrite)?;

            let converter = Converter::new().with_options(options);
            let token = RunToken::detached();
            let conversion = converter.run(&input, quality, &token)?;
            let info = conversion.media_info();

            let mut outputs = OutputManager::new(converter.urls().clone());
            let (output, media) = conversion.into_parts();
            let preview = outputs.install(output, media).clone();
            progress.on_phase(token.id(), &RunPhase::Ready, "");
            let saved = outputs
                .download_to(&out_dir)?
                .ok_or("conversion produced no output")?;

            if json {
                let payload = json!({
                    "input": input.display().to_string(),
                    "output": saved.display().to_string(),
                    "duration_seconds": info.duration.as_secs_f64(),
                    "width": preview.width,
                    "height": preview.height,
                    "frames": preview.frame_count,
                    "bytes": preview.byte_len,
                    "quality": quality.quality,
                    "frame_rate": quality.frame_rate,
                    "size_percent": quality.size_percent,
                    "dither": quality.dither,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                if cli.global.verbose {
                    eprintln!(
                        "{}x{}, {} frames, {} bytes",
                        preview.width, preview.height, preview.frame_count, preview.byte_len
                    );
                }
                println!("{} {}", "saved".green().bold(), saved.display());
            }
        }
        Commands::Probe {
            input,
            fps,
            size,
            json,
        } => {
            let urls = ObjectUrls::new();
            let media = vidgif::load_media(&DefaultLoader, &urls, &input)?;
            let info = media.handle().info();
            let options = ConvertOptions::new();
            let quality = QualityOptions::new()
                .with_frame_rate(fps)
                .with_size_percent(size);

            let clamped = info.usable_duration(options.max_duration());
            let samples = vidgif::sample_timestamps_within(
                info.duration,
                options.max_duration(),
                quality.frame_rate,
            )
            .len();
            let native = info.dimensions_or(vidgif::DEFAULT_DIMENSIONS);
            let (width, height) = quality.output_dimensions(native.0, native.1);
            media.release();

            if json {
                let payload = json!({
                    "duration_seconds": info.duration.as_secs_f64(),
                    "sampled_seconds": clamped.as_secs_f64(),
                    "native_width": native.0,
                    "native_height": native.1,
                    "output_width": width,
                    "output_height": height,
                    "frame_rate": quality.frame_rate,
                    "samples": samples,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!(
                    "Duration: {:.1}s (sampling {:.1}s)",
                    info.duration.as_secs_f64(),
                    clamped.as_secs_f64()
                );
                println!("Size: {}x{} -> {width}x{height}", native.0, native.1);
                println!("Samples: {samples} @ {} fps", quality.frame_rate);
            }
        }
        Commands::Interactive => run_interactive(&cli.global)?,
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "vidgif", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{InteractiveCommand, parse_interactive};

    #[test]
    fn parse_interactive_commands() {
        assert_eq!(
            parse_interactive("open my clip.mp4"),
            Ok(InteractiveCommand::Open(PathBuf::from("my clip.mp4")))
        );
        assert_eq!(
            parse_interactive("set frameRate 12"),
            Ok(InteractiveCommand::Set {
                name: "frameRate".to_string(),
                value: "12".to_string(),
            })
        );
        assert_eq!(
            parse_interactive("download"),
            Ok(InteractiveCommand::Download(PathBuf::from(".")))
        );
        assert_eq!(parse_interactive("QUIT"), Ok(InteractiveCommand::Quit));
    }

    #[test]
    fn parse_interactive_rejects_bad_input() {
        assert!(parse_interactive("open").is_err());
        assert!(parse_interactive("set dither").is_err());
        assert!(parse_interactive("rewind").is_err());
        assert!(parse_interactive("   ").is_err());
    }
}
