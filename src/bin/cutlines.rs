//! CLI binary for cutlines.
//!
//! A thin shim over the library crate: flags map to `SessionConfig`,
//! subcommands map to `Session` operations, and `edit` feeds pointer events
//! from an interactive prompt.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use cutlines::filter::normalize_image_name;
use cutlines::progress::{parse_fraction, stage_percent};
use cutlines::{
    AutoAnswer, CancelToken, CutlineError, FilterChange, FilterState, Frame, HttpBackend,
    Interaction, JobProgressCallback, JobStatus, NoopProgressCallback, PointerEvent,
    ProgressCallback, ReplicateMode, Session, SessionConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress for the OCR job: one bar moving through the job stages,
/// refined by the service's `done/total` progress text while processing.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Self {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  {msg}  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("OCR");
        bar.set_message("starting…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }
}

impl JobProgressCallback for CliProgressCallback {
    fn on_job_start(&self, project: &str) {
        self.bar.set_position(25);
        self.bar.set_message(format!("{project} accepted"));
    }

    fn on_poll(&self, attempt: u32, max_attempts: u32, status: &JobStatus, progress: Option<&str>) {
        let base = stage_percent(status) as u64;
        let pos = match (status, progress.and_then(parse_fraction)) {
            // Spread processing over 50–90 %.
            (JobStatus::Processing, Some(f)) => 50 + (f * 40.0) as u64,
            _ => base,
        };
        self.bar.set_position(pos.max(self.bar.position()));
        self.bar.set_message(format!(
            "{status}{}  {}",
            progress.map(|p| format!(" {p}")).unwrap_or_default(),
            dim(&format!("poll {attempt}/{max_attempts}"))
        ));
    }

    fn on_download(&self, path: &Path, bytes: usize) {
        self.bar.set_position(100);
        self.bar.finish_and_clear();
        eprintln!(
            "{} Result saved to {}  {}",
            green("✔"),
            bold(&path.display().to_string()),
            dim(&format!("{bytes} bytes"))
        );
    }

    fn on_job_error(&self, _project: &str, error: &str) {
        self.bar.abandon_with_message(red(error));
    }
}

// ── Prompts on stdin ─────────────────────────────────────────────────────────

/// Answers library questions on the terminal, or automatically with `--yes`.
///
/// Owns the only stdin reader, so edit commands and confirmations consume
/// the same line stream.
struct TerminalPrompt {
    assume_yes: bool,
    input: Lines<Box<dyn AsyncBufRead + Unpin + Send>>,
}

impl TerminalPrompt {
    fn new(assume_yes: bool) -> Self {
        Self::with_input(assume_yes, BufReader::new(tokio::io::stdin()))
    }

    fn with_input(assume_yes: bool, reader: impl AsyncBufRead + Unpin + Send + 'static) -> Self {
        let reader: Box<dyn AsyncBufRead + Unpin + Send> = Box::new(reader);
        Self {
            assume_yes,
            input: reader.lines(),
        }
    }

    /// Next input line, `None` at end of input.
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        self.input.next_line().await
    }

    fn ask(&mut self, question: &str) -> Option<String> {
        eprint!("{} ", cyan(question));
        io::stderr().flush().ok();
        // Library prompts are synchronous; wait for the answer off the async hot path.
        let input = &mut self.input;
        let line = tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(input.next_line())
        });
        line.ok().flatten().map(|l| l.trim().to_lowercase())
    }
}

impl Interaction for TerminalPrompt {
    fn confirm(&mut self, message: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        matches!(
            self.ask(&format!("{message} [y/N]")).as_deref(),
            Some("y" | "yes" | "s" | "si" | "sí")
        )
    }

    fn notify(&mut self, message: &str) {
        eprintln!("{} {}", cyan("ℹ"), message);
    }

    fn choose_replicate_mode(&mut self) -> Option<ReplicateMode> {
        if self.assume_yes {
            return AutoAnswer::yes().choose_replicate_mode();
        }
        match self
            .ask("Replicate onto: [e]mpty images only, [a]ll images (overwrite), [c]ancel?")
            .as_deref()
        {
            Some("e" | "empty" | "") => Some(ReplicateMode::OnlyEmpty),
            Some("a" | "all") => Some(ReplicateMode::OverwriteAll),
            _ => None,
        }
    }
}

// ── CLI definition ───────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  # Upload a scanned PDF (pages become img_001.jpg, img_002.jpg, …)
  cutlines upload statement.pdf

  # Place cut lines interactively on the most recent project
  cutlines edit

  # Place cut lines on a specific project
  cutlines edit --project proyecto_20261018_101500

  # Push saved lines again and keep a local copy
  cutlines export --save lines.json

  # Run OCR and download the spreadsheet into ./downloads
  cutlines --download-dir downloads process

  # Render one page with its markers
  cutlines preview 5 -o page5.png

EDIT COMMANDS:
  ls                       visible images and their line counts
  show <img>               display an image's lines; reprinted after each edit
  click <img> <x>          add a line at x (image pixels)
  down|move <img> <x>      press / move the pointer (drag a line)
  up|leave <img>           release the pointer
  drag <img> <from> <to>   grab the line near <from> and drop it at <to>
  undo <img>               remove the last added line
  replicate <img>          copy the lines of <img> onto the other visible images
  search <n|name>          show one image (5, 005, img_005.jpg)
  range <from> <to>        show a page range
  clear                    drop the active filter
  export | save <file> | preview <img> <out.png> | process | open <project> | quit

ENVIRONMENT VARIABLES:
  CUTLINES_BACKEND_URL     Conversion backend (default http://localhost:5000)
  CUTLINES_OCR_URL         OCR service (default http://localhost:8000)
  RUST_LOG                 Override log filter
"#;

/// Annotate column cut lines on scanned pages and run the OCR export.
#[derive(Parser, Debug)]
#[command(
    name = "cutlines",
    version,
    about = "Annotate column cut lines on scanned pages and run the OCR export",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Conversion backend base URL.
    #[arg(long, global = true, env = "CUTLINES_BACKEND_URL", default_value = "http://localhost:5000")]
    backend_url: String,

    /// OCR service base URL.
    #[arg(long, global = true, env = "CUTLINES_OCR_URL", default_value = "http://localhost:8000")]
    ocr_url: String,

    /// Row-grouping gap sent with the export.
    #[arg(long, global = true, env = "CUTLINES_LINE_GAP", default_value_t = 6.5)]
    line_gap: f64,

    /// Lines file the OCR job reads.
    #[arg(long, global = true, env = "CUTLINES_JSON_FILENAME", default_value = "lines.json")]
    json_filename: String,

    /// Delay between status polls in milliseconds.
    #[arg(long, global = true, env = "CUTLINES_POLL_INTERVAL_MS", default_value_t = 2000)]
    poll_interval_ms: u64,

    /// Status polls before giving up.
    #[arg(long, global = true, env = "CUTLINES_MAX_POLLS", default_value_t = 180)]
    max_polls: u32,

    /// Per-request timeout in seconds.
    #[arg(long, global = true, env = "CUTLINES_TIMEOUT", default_value_t = 60)]
    timeout: u64,

    /// Where downloaded results are written.
    #[arg(long, global = true, env = "CUTLINES_DOWNLOAD_DIR", default_value = ".")]
    download_dir: PathBuf,

    /// Answer every confirmation with yes (replicate onto empty images only).
    #[arg(short, long, global = true)]
    yes: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "CUTLINES_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "CUTLINES_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "CUTLINES_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List projects, most recent first.
    Projects,
    /// Upload a PDF and create a new project.
    Upload { pdf: PathBuf },
    /// Interactive cut-line editing.
    Edit {
        #[arg(long)]
        project: Option<String>,
    },
    /// Push the project's saved lines through the export endpoint.
    Export {
        #[arg(long)]
        project: Option<String>,
        /// Also write the export envelope to this file.
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Run OCR on the project and download the result.
    Process {
        #[arg(long)]
        project: Option<String>,
    },
    /// Render one page with its markers to PNG.
    Preview {
        /// Image number or name (5, 005, img_005.jpg).
        image: String,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long)]
        project: Option<String>,
    },
}

type CliSession = Session<HttpBackend>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else if show_progress {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;
    let backend = HttpBackend::new(&config).context("Failed to create HTTP client")?;
    let mut session = Session::new(backend, config);
    let mut prompt = TerminalPrompt::new(cli.yes);

    match &cli.command {
        Command::Projects => {
            use cutlines::Backend;
            let projects = session
                .backend()
                .list_projects()
                .await
                .context("Failed to list projects")?;
            if projects.is_empty() && !cli.quiet {
                eprintln!("No projects yet. Run `cutlines upload <pdf>`.");
            }
            for name in projects {
                println!("{name}");
            }
        }
        Command::Upload { pdf } => {
            let summary = session.upload(pdf).await.context("Upload failed")?;
            if !cli.quiet {
                eprintln!(
                    "{} {} created with {} images",
                    green("✔"),
                    bold(&summary.project),
                    summary.images
                );
            }
            for image in session.visible_images() {
                println!("{image}");
            }
        }
        Command::Edit { project } => {
            open(&mut session, project.as_deref()).await?;
            edit_loop(&mut session, &mut prompt, show_progress).await?;
        }
        Command::Export { project, save } => {
            open(&mut session, project.as_deref()).await?;
            let total = session.export().await.context("Export failed")?;
            if let Some(path) = save {
                session
                    .save_envelope(path)
                    .await
                    .context("Failed to save envelope")?;
            }
            if !cli.quiet {
                eprintln!("{} Exported {} lines", green("✔"), bold(&total.to_string()));
            }
        }
        Command::Process { project } => {
            open(&mut session, project.as_deref()).await?;
            run_process(&session, show_progress)
                .await
                .context("Processing failed")?;
        }
        Command::Preview {
            image,
            output,
            project,
        } => {
            open(&mut session, project.as_deref()).await?;
            write_preview(&mut session, image, output).await?;
        }
    }

    Ok(())
}

/// Map CLI args to `SessionConfig`.
fn build_config(cli: &Cli) -> Result<SessionConfig> {
    SessionConfig::builder()
        .backend_url(&cli.backend_url)
        .ocr_url(&cli.ocr_url)
        .line_gap(cli.line_gap)
        .json_filename(&cli.json_filename)
        .poll_interval_ms(cli.poll_interval_ms)
        .max_poll_attempts(cli.max_polls)
        .request_timeout_secs(cli.timeout)
        .download_dir(&cli.download_dir)
        .build()
        .context("Invalid configuration")
}

/// Activate `project`, or the most recent project when none is given.
async fn open(session: &mut CliSession, project: Option<&str>) -> Result<()> {
    let summary = match project {
        Some(name) => session
            .activate_project(name)
            .await
            .with_context(|| format!("Failed to open project '{name}'"))?,
        None => match session.start().await.context("Failed to load projects")? {
            Some(summary) => summary,
            None => bail!("No projects yet. Run `cutlines upload <pdf>` first."),
        },
    };
    eprintln!(
        "{} {}  {}",
        cyan("◆"),
        bold(&summary.project),
        dim(&format!("{} images, {} lines", summary.images, summary.lines))
    );
    Ok(())
}

async fn run_process(session: &CliSession, show_progress: bool) -> Result<(), CutlineError> {
    let cancel = CancelToken::new();
    let on_ctrl_c = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let progress: ProgressCallback = if show_progress {
        Arc::new(CliProgressCallback::new())
    } else {
        Arc::new(NoopProgressCallback)
    };
    let result = session.process(&cancel, progress.as_ref()).await;
    watcher.abort();

    let downloaded = result?;
    if !show_progress {
        eprintln!(
            "{} Result saved to {} after {} polls",
            green("✔"),
            bold(&downloaded.path.display().to_string()),
            downloaded.attempts
        );
    }
    Ok(())
}

async fn write_preview(session: &mut CliSession, image: &str, output: &Path) -> Result<()> {
    let image = normalize_image_name(image);
    let png = session
        .preview(&image)
        .await
        .with_context(|| format!("Failed to render {image}"))?;
    tokio::fs::write(output, &png)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    eprintln!(
        "{} {} → {}",
        green("✔"),
        image,
        bold(&output.display().to_string())
    );
    Ok(())
}

// ── Interactive editing ──────────────────────────────────────────────────────

async fn edit_loop(
    session: &mut CliSession,
    prompt: &mut TerminalPrompt,
    show_progress: bool,
) -> Result<()> {
    print_images(session);
    loop {
        eprint!("{} ", cyan("cutlines>"));
        io::stderr().flush().ok();

        let Some(line) = prompt.next_line().await? else {
            break;
        };
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&cmd, args)) = words.split_first() else {
            continue;
        };

        let outcome = match (cmd, args) {
            ("quit" | "exit" | "q", _) => break,
            ("help" | "?", _) => {
                eprintln!("{AFTER_HELP}");
                Ok(())
            }
            ("ls", _) => {
                print_images(session);
                Ok(())
            }
            ("open", [name]) => open(session, Some(*name)).await.map_err(EditError::Other),
            ("export", []) => session
                .export()
                .await
                .map(|n| eprintln!("{} Exported {n} lines", green("✔")))
                .map_err(EditError::from),
            ("save", [path]) => session
                .save_envelope(Path::new(path))
                .await
                .map(|_| eprintln!("{} Saved {path}", green("✔")))
                .map_err(EditError::from),
            ("preview", [image, out]) => write_preview(session, image, Path::new(out))
                .await
                .map_err(EditError::Other),
            ("process", []) => run_process(session, show_progress)
                .await
                .map_err(EditError::from),
            _ => edit_command(session, prompt, cmd, args),
        };

        match outcome {
            Ok(()) => {}
            Err(EditError::Usage) => eprintln!("{} unknown command; type `help`", red("✗")),
            Err(EditError::Lib(e)) if e.is_user_error() => prompt.notify(&e.to_string()),
            Err(EditError::Lib(e)) => eprintln!("{} {e}", red("✗")),
            Err(EditError::Other(e)) => eprintln!("{} {e:#}", red("✗")),
        }

        for frame in session.take_frames() {
            print_frame(&frame);
        }
    }
    Ok(())
}

enum EditError {
    Usage,
    Lib(CutlineError),
    Other(anyhow::Error),
}

impl From<CutlineError> for EditError {
    fn from(e: CutlineError) -> Self {
        EditError::Lib(e)
    }
}

/// Synchronous editing commands: pointer events, store actions, filters.
fn edit_command(
    session: &mut CliSession,
    prompt: &mut TerminalPrompt,
    cmd: &str,
    args: &[&str],
) -> Result<(), EditError> {
    match (cmd, args) {
        ("show", [image]) => print_frame(&session.show_image(&normalize_image_name(image))?),
        ("click", [image, x]) => {
            let x = parse_x(x)?;
            let (surface, store) = session.surface_mut(&normalize_image_name(image))?;
            if !surface.click(store, PointerEvent::new(x, 0.0)) {
                prompt.notify("A line is being dragged; release it first (`up`)");
            }
        }
        ("down", [image, x]) => {
            let x = parse_x(x)?;
            let (surface, store) = session.surface_mut(&normalize_image_name(image))?;
            match surface.pointer_down(store, PointerEvent::new(x, 0.0)) {
                Some(index) => eprintln!("{}", dim(&format!("grabbed line {index}"))),
                None => prompt.notify("No line near that position"),
            }
        }
        ("move", [image, x]) => {
            let x = parse_x(x)?;
            let (surface, store) = session.surface_mut(&normalize_image_name(image))?;
            surface.pointer_move(store, PointerEvent::new(x, 0.0))?;
        }
        ("up", [image]) => session.surface_mut(&normalize_image_name(image))?.0.pointer_up(),
        ("leave", [image]) => session
            .surface_mut(&normalize_image_name(image))?
            .0
            .pointer_leave(),
        ("drag", [image, from, to]) => {
            let (from, to) = (parse_x(from)?, parse_x(to)?);
            let (surface, store) = session.surface_mut(&normalize_image_name(image))?;
            if surface.pointer_down(store, PointerEvent::new(from, 0.0)).is_none() {
                return Err(CutlineError::NotFound("No line near that position".into()).into());
            }
            let moved = surface.pointer_move(store, PointerEvent::new(to, 0.0));
            surface.pointer_up();
            moved?;
        }
        ("undo", [image]) => {
            let (surface, store) = session.surface_mut(&normalize_image_name(image))?;
            match surface.remove_last(store) {
                Some(x) => eprintln!("{}", dim(&format!("removed line at {x:.1}"))),
                None => prompt.notify("No lines to remove"),
            }
        }
        ("replicate", [image]) => {
            let (surface, store) = session.surface_mut(&normalize_image_name(image))?;
            if !surface.can_edit(store) {
                prompt.notify("This image has no lines to replicate");
            } else {
                let n = surface.replicate(store, prompt);
                eprintln!("{} Copied onto {n} images", green("✔"));
            }
        }
        ("search", [input]) => report_filter(session.search(input, prompt)?),
        ("range", [from, to]) => report_filter(session.apply_range(from, to, prompt)?),
        ("clear", []) => match session.clear_filter(prompt) {
            FilterChange::NothingToClear => prompt.notify("No filter is active"),
            change => report_filter(change),
        },
        _ => return Err(EditError::Usage),
    }
    Ok(())
}

fn parse_x(s: &str) -> Result<f64, EditError> {
    s.parse::<f64>()
        .ok()
        .filter(|x| x.is_finite())
        .ok_or_else(|| CutlineError::Validation(format!("'{s}' is not a pixel position")).into())
}

fn report_filter(change: FilterChange) {
    match change {
        FilterChange::Applied { visible } => eprintln!("{} {visible} images visible", green("✔")),
        FilterChange::Declined => eprintln!("{}", dim("unchanged")),
        FilterChange::NothingToClear => {}
    }
}

/// Text rendering of a surface frame; shown images reprint after every edit.
fn print_frame(frame: &Frame) {
    let mut by_position = frame.markers.clone();
    by_position.sort_by(f64::total_cmp);
    println!(
        "{}: {} lines {:?}",
        frame.image,
        frame.markers.len(),
        frame.markers
    );
    println!("  by position: {:?}", by_position);
}

fn print_images(session: &CliSession) {
    let filter = match session.filter_state() {
        FilterState::None => String::new(),
        FilterState::SingleMatch(image) => format!("  (search: {image})"),
        FilterState::Range { from, to } => format!("  (range {from}-{to})"),
    };
    eprintln!(
        "{}",
        bold(&format!(
            "Showing {} of {} images{filter}",
            session.visible_images().len(),
            session.filter().all().len()
        ))
    );
    for image in session.visible_images() {
        println!("  {:<16} {:>3} lines", image, session.store().line_count(image));
    }
}
