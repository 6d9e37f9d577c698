use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use console::style;
use indicatif::ProgressBar;
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};

use shared_utils::codecs::display_name;
use shared_utils::error_handler::{exit_code, report_anyhow};
use shared_utils::file_ops::StdFileOps;
use shared_utils::ffmpeg_process::require_tool;
use shared_utils::logging::{init_logging, LogConfig};
use shared_utils::progress::{create_progress_bar, create_spinner, format_bytes, format_timestamp, set_quiet_mode};
use shared_utils::report::{print_batch_summary, print_section, SummaryReport};
use shared_utils::safety::check_safe_for_destructive;
use vid_curate::analyze::{count_videos, scan_root_directory, AnalysisSummary, AnalyzeOptions};
use vid_curate::codec_decision::{scan_directory, CodecAction, CodecDecisionEngine, CodecScanSummary};
use vid_curate::config::{load_config, resolve_root_dir, CurateConfig, DEFAULT_CONFIG_FILE};
use vid_curate::dedupe::{remove_duplicates, DedupeOptions, DedupeSummary};
use vid_curate::descriptor::FfprobeProvider;
use vid_curate::events::{CurationEvent, JsonLinesSink, ReportSink, TracingSink};
use vid_curate::mover::{copy_all_contents, move_all_contents, TransferSummary};
use vid_curate::parts::remove_part_files;
use vid_curate::reencode::{
    FfmpegBackend, ReencodeOptions, ReencodeOrchestrator, ReencodeOutcome, ReencodeSummary,
};
use vid_curate::sanitize::{rename_recursively, RenameSummary};

#[derive(Parser)]
#[command(name = "vid-curate")]
#[command(version, about = "Video collection curation: duplicates, names and codecs", long_about = None)]
struct Cli {
    /// Root download directory (overrides the config file)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Emit events and summaries as JSON lines on stdout
    #[arg(long, global = true)]
    json: bool,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone)]
enum Commands {
    /// Report duplicates, incomplete downloads and names to sanitize
    Analyze,

    /// Count video files in every package folder
    Count,

    /// Strip hashtags and invalid characters from names
    Sanitize {
        #[arg(long)]
        dry_run: bool,
    },

    /// Keep the best video in each folder and delete the rest
    Dedupe {
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete incomplete downloads (*.part)
    Parts {
        #[arg(long)]
        dry_run: bool,
    },

    /// Re-encode videos whose codec is less efficient than the target
    Reencode {
        /// Target codec (h265, h264, av1, vp9)
        #[arg(long)]
        codec: Option<String>,
        /// Encoder preset for libx264/libx265
        #[arg(long)]
        preset: Option<String>,
        /// Keep originals as <name>.bak
        #[arg(long)]
        backup: bool,
        /// Only report what would be re-encoded
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        no_recursive: bool,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Copy all videos to DEST, keeping the folder layout
    Copy {
        #[arg(value_name = "DEST")]
        dest: PathBuf,
    },

    /// Move all videos to DEST, keeping the folder layout
    Move {
        #[arg(value_name = "DEST")]
        dest: PathBuf,
    },

    /// Sanitize, analyze, then remove duplicates
    All {
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    if let Err(e) = init_logging("vid_curate", LogConfig::default().with_level(level)) {
        eprintln!("⚠️  Logging unavailable: {:#}", e);
    }
    set_quiet_mode(cli.json);

    if let Err(e) = run(cli) {
        report_anyhow(&e);
        std::process::exit(exit_code(&e));
    }
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = load_config(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    let command = match cli.command {
        Some(command) => command,
        None => choose_from_menu()?,
    };

    let root = resolve_root_dir(cli.root, &mut config, &cli.config, || {
        prompt_line("Enter the root download directory: ")
    })
    .context("Could not determine the root directory")?;
    info!(root = %root.display(), "Root directory");

    let mut sink: Box<dyn ReportSink> = if cli.json {
        Box::new(JsonLinesSink::new(io::stdout()))
    } else {
        Box::new(TracingSink)
    };
    let ctx = Session {
        root,
        config,
        json: cli.json,
    };

    match command {
        Commands::Analyze => {
            require_tool("ffprobe")?;
            analyze(&ctx, sink.as_mut())?;
        }
        Commands::Count => {
            let total = count_videos(&ctx.root, &ctx.config.video_extensions)?;
            emit_summary(ctx.json, &serde_json::json!({ "total_videos": total }), || {
                SummaryReport::new("Video Count")
                    .row("🎬 Total video files", total)
                    .print()
            });
        }
        Commands::Sanitize { dry_run } => sanitize(&ctx, dry_run, sink.as_mut())?,
        Commands::Dedupe { dry_run } => {
            require_tool("ffprobe")?;
            dedupe(&ctx, dry_run, sink.as_mut())?;
        }
        Commands::Parts { dry_run } => {
            let started = Instant::now();
            let result = remove_part_files(&ctx.root, dry_run, sink.as_mut())?;
            emit_summary(ctx.json, &result, || {
                print_batch_summary(&result, started.elapsed(), "Partial Download Cleanup")
            });
        }
        Commands::Reencode {
            codec,
            preset,
            backup,
            dry_run,
            no_recursive,
            yes,
        } => {
            require_tool("ffprobe")?;
            if !dry_run {
                require_tool("ffmpeg")?;
            }
            let request = ReencodeRequest {
                codec: codec.unwrap_or_else(|| ctx.config.target_codec.clone()),
                preset: preset.unwrap_or_else(|| ctx.config.quality_preset.clone()),
                backup: backup || ctx.config.backup_originals,
                dry_run,
                recursive: !no_recursive,
                confirmed: yes,
            };
            reencode(&ctx, &request, sink.as_mut())?;
        }
        Commands::Copy { dest } => {
            let summary = copy_all_contents(&ctx.root, &dest, &ctx.config.video_extensions)?;
            print_transfer(&ctx, &dest, &summary);
        }
        Commands::Move { dest } => {
            let summary = move_all_contents(&ctx.root, &dest, &ctx.config.video_extensions)?;
            print_transfer(&ctx, &dest, &summary);
        }
        Commands::All { dry_run } => {
            require_tool("ffprobe")?;
            sanitize(&ctx, dry_run, sink.as_mut())?;
            analyze(&ctx, sink.as_mut())?;
            dedupe(&ctx, dry_run, sink.as_mut())?;
        }
    }

    Ok(())
}

struct Session {
    root: PathBuf,
    config: CurateConfig,
    json: bool,
}

impl Session {
    fn provider(&self) -> FfprobeProvider {
        FfprobeProvider::new(self.config.probe_timeout())
    }
}

struct ReencodeRequest {
    codec: String,
    preset: String,
    backup: bool,
    dry_run: bool,
    recursive: bool,
    confirmed: bool,
}

fn analyze(ctx: &Session, sink: &mut dyn ReportSink) -> anyhow::Result<()> {
    let options = AnalyzeOptions {
        extensions: ctx.config.video_extensions.clone(),
        workers: ctx.config.probe_workers,
        thresholds: ctx.config.match_thresholds,
    };

    let spinner = create_spinner("Analyzing");
    let summary = scan_root_directory(&ctx.root, &ctx.provider(), &options, sink);
    spinner.finish_and_clear();
    let summary = summary.context("Analysis failed")?;

    emit_summary(ctx.json, &summary, || print_analysis(&summary));
    Ok(())
}

fn print_analysis(summary: &AnalysisSummary) {
    if !summary.similar_across_folders.is_empty() {
        print_section("🔗 Possible duplicates across folders");
        for m in &summary.similar_across_folders {
            println!("  {}", m.first_path.display());
            println!("  {}", m.second_path.display());
            println!(
                "    {}",
                style(format!(
                    "Δ duration {:.1}s, Δ width {}px, Δ height {}px",
                    m.duration_diff, m.width_diff, m.height_diff
                ))
                .yellow()
            );
        }
    }

    SummaryReport::new("Collection Analysis")
        .row("📁 Folders analyzed", summary.folders_analyzed)
        .row("🎬 Total video files", summary.total_videos)
        .row("👯 Folders with duplicates", summary.folders_with_duplicates)
        .row("⏸️  Folders with incomplete files", summary.incomplete_folders)
        .row("✏️  Names needing sanitization", summary.names_needing_sanitizing)
        .row("❓ Probe failures", summary.probe_failures)
        .row("🔗 Similar videos across folders", summary.similar_across_folders.len())
        .print();
}

fn sanitize(ctx: &Session, dry_run: bool, sink: &mut dyn ReportSink) -> anyhow::Result<()> {
    let summary: RenameSummary = rename_recursively(&ctx.root, dry_run, sink)?;
    emit_summary(ctx.json, &summary, || {
        SummaryReport::new(if dry_run { "Sanitize (dry run)" } else { "Sanitize" })
            .row("✏️  Renamed", summary.renamed)
            .row("⚠️  Name already taken", summary.conflicts)
            .row("⏭️  Skipped", summary.skipped)
            .row("❌ Failed", summary.failed)
            .errors(&summary.errors)
            .print()
    });
    Ok(())
}

fn dedupe(ctx: &Session, dry_run: bool, sink: &mut dyn ReportSink) -> anyhow::Result<()> {
    let options = DedupeOptions {
        extensions: ctx.config.video_extensions.clone(),
        workers: ctx.config.probe_workers,
        dry_run,
    };

    let spinner = create_spinner("Resolving duplicates");
    let summary = remove_duplicates(&ctx.root, &ctx.provider(), &options, sink);
    spinner.finish_and_clear();
    let summary: DedupeSummary = summary.context("Duplicate removal failed")?;

    emit_summary(ctx.json, &summary, || {
        SummaryReport::new(if dry_run { "Duplicates (dry run)" } else { "Duplicates" })
            .row("📁 Directories scanned", summary.directories_scanned)
            .row("👯 Directories with duplicates", summary.directories_with_duplicates)
            .row(
                if dry_run { "🗑️  Would delete" } else { "🗑️  Deleted" },
                summary.files_removed,
            )
            .row("💾 Space freed", format_bytes(summary.bytes_freed))
            .row("❌ Delete failures", summary.removal_failures)
            .row("❓ Probe failures", summary.probe_failures)
            .print()
    });
    Ok(())
}

fn reencode(ctx: &Session, request: &ReencodeRequest, sink: &mut dyn ReportSink) -> anyhow::Result<()> {
    if !request.dry_run {
        check_safe_for_destructive(&ctx.root, "re-encode videos in")?;
    }

    let engine = CodecDecisionEngine::new(ctx.config.codec_efficiency.clone(), &request.codec);
    let spinner = create_spinner("Scanning codecs");
    let scan = scan_directory(
        &ctx.root,
        request.recursive,
        &ctx.config.video_extensions,
        &ctx.provider(),
        &engine,
        ctx.config.probe_workers,
        sink,
    );
    spinner.finish_and_clear();
    let (decisions, summary) = scan.context("Codec scan failed")?;

    emit_summary(ctx.json, &summary, || print_codec_scan(&summary, engine.target_codec()));

    if request.dry_run || summary.needs_reencode == 0 {
        return Ok(());
    }
    if !request.confirmed && !confirm(&format!("Re-encode {} files?", summary.needs_reencode))? {
        info!("Re-encode cancelled");
        return Ok(());
    }

    let backend = FfmpegBackend::new(Some(ctx.config.encode_timeout()), ctx.config.probe_timeout());
    let options = ReencodeOptions {
        target_codec: request.codec.clone(),
        preset: request.preset.clone(),
        backup_originals: request.backup,
        preserve_timestamps: ctx.config.preserve_timestamps,
    };
    let orchestrator = ReencodeOrchestrator::new(&backend, &StdFileOps, options);

    let bar = create_progress_bar(summary.needs_reencode as u64, "Re-encoding");
    let started = Instant::now();
    let result = orchestrator.run(&decisions, &mut ProgressSink { inner: sink, bar: &bar });
    bar.finish_and_clear();
    let result: ReencodeSummary = result.context("Re-encode aborted")?;

    let errors: Vec<(PathBuf, String)> = result
        .outcomes
        .iter()
        .filter_map(|(path, outcome)| match outcome {
            ReencodeOutcome::FailedKeepOriginal(kind) => Some((path.clone(), kind.to_string())),
            _ => None,
        })
        .collect();
    emit_summary(ctx.json, &result, || {
        SummaryReport::new("Re-encode")
            .row("🎬 Attempted", result.attempted)
            .row("✅ Succeeded", result.succeeded)
            .row("❌ Failed (original kept)", result.failed)
            .row("📈 Not smaller", result.size_regressions)
            .row("💾 Space saved", format_bytes(result.bytes_saved()))
            .row("⏱️  Elapsed", format_timestamp(started.elapsed().as_secs_f64()))
            .errors(&errors)
            .print()
    });
    Ok(())
}

fn print_codec_scan(summary: &CodecScanSummary, target: &str) {
    print_section(&format!("🎞️  Codec distribution (target: {})", target));
    for (codec, count) in &summary.distribution {
        let marker = match count.action {
            Some(CodecAction::Reencode) => style("convert").yellow(),
            _ => style("keep").green(),
        };
        println!(
            "  {:<12} {:>6} files {:>12}  {}",
            display_name(codec),
            count.files,
            format_bytes(count.bytes),
            marker
        );
    }

    SummaryReport::new("Codec Scan")
        .row("🎬 Video files", summary.total_files)
        .row("❓ Probe failures", summary.probe_failures)
        .row("🔄 Need re-encoding", summary.needs_reencode)
        .row("📦 Current size", format_bytes(summary.current_size))
        .row("📉 Estimated size", format_bytes(summary.estimated_size))
        .row(
            "💾 Estimated savings",
            format!(
                "{} ({:.1}%)",
                format_bytes(summary.estimated_savings()),
                summary.savings_percent()
            ),
        )
        .print();
}

fn print_transfer(ctx: &Session, dest: &Path, summary: &TransferSummary) {
    emit_summary(ctx.json, summary, || {
        SummaryReport::new(format!("{:?} to {}", summary.mode, dest.display()))
            .row("🎬 Videos", summary.transferred)
            .row("📦 Size", format_bytes(summary.bytes))
            .row("⏸️  Skipped .part files", summary.skipped_parts)
            .row("⏭️  Skipped non-video files", summary.skipped_other)
            .row("🧹 Empty folders removed", summary.removed_dirs.len())
            .row("❌ Failed", summary.failed)
            .errors(&summary.errors)
            .print()
    });
}

/// Forwards events and advances the bar once per finished file.
struct ProgressSink<'a> {
    inner: &'a mut dyn ReportSink,
    bar: &'a ProgressBar,
}

impl ReportSink for ProgressSink<'_> {
    fn emit(&mut self, event: CurationEvent) {
        if let CurationEvent::ReencodeResult { path, .. } = &event {
            self.bar.set_message(
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            );
            self.bar.inc(1);
        }
        self.bar.suspend(|| self.inner.emit(event));
    }
}

fn emit_summary<T: Serialize>(json: bool, summary: &T, print: impl FnOnce()) {
    if !json {
        print();
        return;
    }
    match serde_json::to_string(&serde_json::json!({ "summary": summary })) {
        Ok(line) => println!("{}", line),
        Err(e) => tracing::warn!(error = %e, "Failed to serialize summary"),
    }
}

fn choose_from_menu() -> anyhow::Result<Commands> {
    eprintln!("{}", style("Choose an operation:").cyan().bold());
    eprintln!("  1 - Analyze packages");
    eprintln!("  2 - Sanitize packages");
    eprintln!("  3 - Remove duplicates");
    eprintln!("  4 - Perform all");

    let Some(choice) = prompt_line("Enter choice (1-4): ")? else {
        bail!("No operation chosen");
    };
    Ok(match choice.trim() {
        "1" => Commands::Analyze,
        "2" => Commands::Sanitize { dry_run: false },
        "3" => Commands::Dedupe { dry_run: false },
        "4" => Commands::All { dry_run: false },
        other => bail!("Unknown choice: {:?}", other),
    })
}

/// One line from stdin; `None` at end of input.
fn prompt_line(prompt: &str) -> io::Result<Option<String>> {
    eprint!("{}", prompt);
    io::stderr().flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn confirm(question: &str) -> anyhow::Result<bool> {
    let answer = prompt_line(&format!("{} [y/N] ", question))?;
    Ok(matches!(
        answer.as_deref().map(str::to_lowercase).as_deref(),
        Some("y") | Some("yes")
    ))
}
