//! CLI binary for gmkit-pdf2md.
//!
//! A thin shim over the library crate: maps flags and `PDF2MD_*` variables
//! to `ConversionConfig`, answers the human checkpoints on the terminal and
//! turns outcomes into exit codes.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use gmkit_pdf2md::pipeline::fonts::mapping_table;
use gmkit_pdf2md::{
    convert, inspect, rerun_from_step, rerun_phase, resume, status, ConversionConfig,
    ConversionProgressCallback, ConvertError, FontInventory, FontMapping, FontRole, GateDecision,
    Issue, Lifecycle, MappingDecision, Phase, PreflightReport, Resolution, ReviewMode, Reviewer,
    RunOutcome, StepRef,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Exit code for a run stopped with Ctrl-C.
const EXIT_INTERRUPTED: u8 = 130;

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

/// Renders one bar for the running phase and a log line per finished phase.
/// Page steps may arrive out of order; the bar only counts them.
struct CliProgressCallback {
    bar: ProgressBar,
    phase_started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new(visible: bool) -> Arc<Self> {
        let bar = if visible {
            ProgressBar::new(0)
        } else {
            ProgressBar::hidden()
        };
        bar.set_style(spinner_style());
        Arc::new(Self {
            bar,
            phase_started: Mutex::new(None),
        })
    }

    fn elapsed(&self) -> String {
        let started = *self.phase_started.lock().unwrap_or_else(PoisonError::into_inner);
        let secs = started.map_or(0.0, |t| t.elapsed().as_secs_f64());
        dim(&format!("{secs:.1}s"))
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"])
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.cyan} {prefix:.bold}  [{bar:40.green/238}] {pos}/{len}  {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▉▊▋▌▍▎▏  ")
    .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"])
}

fn phase_label(phase: Phase) -> String {
    format!("{:>2} {}", phase.index(), phase.name())
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_phase_start(&self, phase: Phase, attempt: u32) {
        *self.phase_started.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        self.bar.reset();
        self.bar.set_length(0);
        self.bar.set_style(spinner_style());
        self.bar.set_prefix(phase_label(phase));
        self.bar.set_message(if attempt > 1 {
            format!("attempt {attempt}")
        } else {
            String::new()
        });
        self.bar.enable_steady_tick(Duration::from_millis(80));
    }

    fn on_step_complete(&self, phase: Phase, step: usize, total: usize) {
        if self.bar.length() != Some(total as u64) {
            self.bar.set_style(bar_style());
            self.bar.set_length(total as u64);
        }
        let unit = if phase == Phase::LintReview { "issue" } else { "page" };
        self.bar.set_message(format!("{unit} {step}"));
        self.bar.inc(1);
    }

    fn on_phase_complete(&self, phase: Phase) {
        self.bar.println(format!(
            "  {} {:<26} {}",
            green("✓"),
            phase_label(phase),
            self.elapsed()
        ));
    }

    fn on_phase_failed(&self, phase: Phase, attempt: u32, error: &str, will_retry: bool) {
        let first_line = error.lines().next().unwrap_or(error);
        let msg = if first_line.chars().count() > 80 {
            format!("{}\u{2026}", first_line.chars().take(79).collect::<String>())
        } else {
            first_line.to_string()
        };
        let tail = if will_retry {
            dim("retrying")
        } else {
            red("giving up")
        };
        self.bar.println(format!(
            "  {} {:<26} attempt {attempt}: {}  {tail}",
            red("✗"),
            phase_label(phase),
            red(&msg),
        ));
    }

    fn on_checkpoint(&self, phase: Phase, description: &str) {
        self.bar
            .println(format!("{} {}  {}", cyan("◆"), bold(&phase_label(phase)), description));
    }
}

// ── Terminal reviewer ────────────────────────────────────────────────────────

/// Answers checkpoints from a line-oriented input, prompting on stderr.
/// The progress bar is suspended while a prompt waits.
struct TerminalReviewer<R> {
    input: Mutex<R>,
    bar: ProgressBar,
}

impl<R: BufRead + Send> TerminalReviewer<R> {
    fn new(input: R, bar: ProgressBar) -> Self {
        Self {
            input: Mutex::new(input),
            bar,
        }
    }

    /// Print `prompt` and read one trimmed line; `None` at end of input.
    fn ask(&self, prompt: &str) -> Result<Option<String>, ConvertError> {
        let mut input = self.input.lock().unwrap_or_else(PoisonError::into_inner);
        let mut line = String::new();
        eprint!("{prompt}");
        io::stderr().flush().ok();
        let n = input.read_line(&mut line).map_err(|source| ConvertError::Io {
            path: PathBuf::from("<stdin>"),
            source,
        })?;
        Ok((n > 0).then(|| line.trim().to_string()))
    }

    /// Lines up to a single `.`; `None` if the input ends first.
    fn ask_block(&self) -> Result<Option<String>, ConvertError> {
        eprintln!("{}", dim("Enter replacement Markdown; finish with a line containing only '.'"));
        let mut input = self.input.lock().unwrap_or_else(PoisonError::into_inner);
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            let n = input.read_line(&mut line).map_err(|source| ConvertError::Io {
                path: PathBuf::from("<stdin>"),
                source,
            })?;
            if n == 0 {
                return Ok(None);
            }
            let line = line.trim_end_matches(['\n', '\r']);
            if line == "." {
                return Ok(Some(lines.join("\n")));
            }
            lines.push(line.to_string());
        }
    }

    fn mapping_loop(
        &self,
        proposal: &FontMapping,
        inventory: &FontInventory,
    ) -> Result<MappingDecision, ConvertError> {
        let mut working = proposal.clone();
        eprintln!("\n{}", mapping_table(inventory, &working));
        loop {
            let Some(answer) =
                self.ask("[ok | set <row> <h1..h6|body> | reset | reject] > ")?
            else {
                return Err(ConvertError::ReviewerRequired {
                    checkpoint: "font mapping",
                });
            };
            let words: Vec<&str> = answer.split_whitespace().collect();
            match words.as_slice() {
                ["ok"] => {
                    return Ok(if working == *proposal {
                        MappingDecision::Confirm
                    } else {
                        MappingDecision::Edit(working)
                    });
                }
                ["reject"] => return Ok(MappingDecision::Reject),
                ["reset"] => {
                    working = proposal.clone();
                    eprintln!("\n{}", mapping_table(inventory, &working));
                }
                ["set", row, role] => match set_row(&mut working, inventory, row, role) {
                    Ok(()) => eprintln!("\n{}", mapping_table(inventory, &working)),
                    Err(msg) => eprintln!("{}", red(&msg)),
                },
                _ => eprintln!("{}", red(&format!("Unrecognised answer '{answer}'"))),
            }
        }
    }

    fn issue_loop(&self, issue: &Issue, position: usize, total: usize) -> Result<Resolution, ConvertError> {
        eprintln!(
            "\n{} {}  {} · {}",
            bold(&format!("[{position}/{total}]")),
            bold(&issue.id),
            issue.kind.slug(),
            issue.severity
        );
        eprintln!(
            "  page {}, skeleton line {}: {}",
            issue.location.page,
            issue.location.line,
            dim(&issue.location.excerpt)
        );
        eprintln!("  {}", issue.message);
        let prompt = match issue.suggested_fix {
            Some(ref fix) => {
                eprintln!("  Suggested fix: {fix}");
                "[a]ccept  [f]ix  [c]ustom  [d]ismiss > "
            }
            None => "[a]ccept  [c]ustom  [d]ismiss > ",
        };
        loop {
            let Some(answer) = self.ask(prompt)? else {
                return Err(ConvertError::ReviewerRequired {
                    checkpoint: "issue review",
                });
            };
            match answer.to_lowercase().as_str() {
                "a" => return Ok(Resolution::Accepted),
                "d" => return Ok(Resolution::Dismissed),
                "f" if issue.suggested_fix.is_some() => return Ok(Resolution::Fixed),
                "c" => match self.ask_block()? {
                    Some(text) if !text.trim().is_empty() => return Ok(Resolution::Custom(text)),
                    Some(_) => eprintln!("{}", red("Custom text is empty")),
                    None => {
                        return Err(ConvertError::ReviewerRequired {
                            checkpoint: "issue review",
                        })
                    }
                },
                _ => eprintln!("{}", red(&format!("Unrecognised answer '{answer}'"))),
            }
        }
    }
}

fn set_row(
    mapping: &mut FontMapping,
    inventory: &FontInventory,
    row: &str,
    role: &str,
) -> std::result::Result<(), String> {
    let index: usize = row
        .parse()
        .map_err(|_| format!("Row '{row}' is not a number"))?;
    let stats = index
        .checked_sub(1)
        .and_then(|i| inventory.fonts.get(i))
        .ok_or_else(|| format!("Row {row} is not in the table (1–{})", inventory.fonts.len()))?;
    mapping.assign(stats.font.clone(), parse_role(role)?);
    Ok(())
}

fn parse_role(role: &str) -> std::result::Result<FontRole, String> {
    let role = role.to_lowercase();
    if role == "body" {
        return Ok(FontRole::Body);
    }
    role.strip_prefix('h')
        .and_then(|l| l.parse::<u8>().ok())
        .filter(|l| (1..=6).contains(l))
        .map(FontRole::Heading)
        .ok_or_else(|| format!("Role '{role}' must be h1..h6 or body"))
}

impl<R: BufRead + Send> Reviewer for TerminalReviewer<R> {
    fn preflight(&self, report: &PreflightReport) -> Result<GateDecision, ConvertError> {
        self.bar.suspend(|| {
            eprintln!("\n{}", report.summary());
            let answer = self.ask("\nProceed? [y/N] ")?;
            Ok(match answer.as_deref().map(str::to_lowercase).as_deref() {
                Some("y") | Some("yes") => GateDecision::Proceed,
                _ => GateDecision::Abort,
            })
        })
    }

    fn font_mapping(
        &self,
        proposal: &FontMapping,
        inventory: &FontInventory,
    ) -> Result<MappingDecision, ConvertError> {
        self.bar.suspend(|| self.mapping_loop(proposal, inventory))
    }

    fn resolve_issue(&self, issue: &Issue, position: usize, total: usize) -> Result<Resolution, ConvertError> {
        self.bar.suspend(|| self.issue_loop(issue, position, total))
    }
}

// ── Arguments ────────────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert, answering the checkpoints on the terminal
  pdf2md convert module.pdf

  # Unattended: proceed at the gate, keep the proposed fonts, accept issues
  pdf2md convert module.pdf --yes

  # Review lint issues offline, then apply the annotated checklist
  pdf2md convert module.pdf --mode checklist
  $EDITOR module/review-checklist.md
  pdf2md --resume module

  # Where is the active conversion?
  pdf2md --status
  pdf2md --status --json

  # Redo the font mapping and everything after it
  pdf2md --phase 7

  # Re-extract text from page 12 onwards
  pdf2md --from-step 3.12 module

  # Pre-flight report only; writes nothing
  pdf2md inspect module.pdf

PHASES:
   0 Pre-flight        gate: proceed or abort
   1 Setup             output directory, source fingerprint
   2 Image extraction  one step per page
   3 Text extraction   one step per page
   4 Segmentation
   5 Font inventory
   6 Font proposal
   7 Mapping review    checkpoint
   8 Headings          skeleton.md
   9 Lint & review     checkpoint, one step per issue
  10 Report            <name>-final.md, conversion-report.md

EXIT CODES:
  0 success, status, gate abort, waiting for the checklist
  1 other error   2 not found   3 corrupted   4 encrypted
  5 no extractable text (run OCR first)   6 permission denied
  7 a phase exhausted its retries (fix the cause, then --resume)
  130 interrupted (progress is kept; --resume continues)

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH   Path to libpdfium (file or directory)
  RUST_LOG          Overrides -v / -q log filtering
  PDF2MD_*          Fallback for every flag, e.g. PDF2MD_MODE=checklist
"#;

/// Convert tabletop adventure PDFs into structured Markdown.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2md",
    version,
    about = "Convert tabletop adventure PDFs into structured Markdown",
    long_about = "Convert tabletop adventure PDFs into structured Markdown through a resumable, \
eleven-phase pipeline with human checkpoints for the font mapping and lint review.",
    arg_required_else_help = true,
    args_conflicts_with_subcommands = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Conversion output directory (default: the active conversion).
    #[arg(value_name = "DIR")]
    dir: Option<PathBuf>,

    /// Continue the conversion from where it stopped.
    #[arg(long, group = "action")]
    resume: bool,

    /// Show the state of a conversion. Never modifies anything.
    #[arg(long, group = "action")]
    status: bool,

    /// With --status: print the descriptor as JSON.
    #[arg(long, requires = "status")]
    json: bool,

    /// Re-run phase N (0–10) and everything after it.
    #[arg(long, value_name = "N", group = "action",
          value_parser = clap::value_parser!(u8).range(0..=10))]
    phase: Option<u8>,

    /// Re-enter multi-step phase N at step S, e.g. 3.12.
    #[arg(long, value_name = "N.S", group = "action", value_parser = parse_step)]
    from_step: Option<StepRef>,

    #[command(flatten)]
    common: Common,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a new conversion.
    Convert {
        /// The PDF to convert.
        pdf: PathBuf,

        /// Output directory (default: <output-root>/<pdf stem>).
        #[arg(short, long, env = "PDF2MD_OUTPUT")]
        output: Option<PathBuf>,

        /// Where output directories are created when --output is absent.
        #[arg(long, env = "PDF2MD_OUTPUT_ROOT", default_value = ".")]
        output_root: PathBuf,

        /// Issue review: answer on the terminal, or annotate a checklist file.
        #[arg(long, env = "PDF2MD_MODE", value_enum, default_value = "interactive")]
        mode: ModeArg,

        /// Write the diagnostics bundle into <output>/diagnostics/.
        #[arg(long, env = "PDF2MD_DIAGNOSTICS")]
        diagnostics: bool,

        /// Provenance line placed under the front matter of the final Markdown.
        #[arg(long, env = "PDF2MD_NOTICE")]
        notice: Option<String>,

        #[command(flatten)]
        common: Common,
    },
    /// Print the pre-flight report without converting.
    Inspect {
        /// The PDF to inspect.
        pdf: PathBuf,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        common: Common,
    },
}

/// Flags shared by every form of the command.
#[derive(Args, Debug, Clone)]
struct Common {
    /// Answer every checkpoint automatically: proceed, keep the proposed
    /// mapping, accept issues as-is.
    #[arg(short = 'y', long, env = "PDF2MD_YES")]
    yes: bool,

    /// Pages extracted concurrently.
    #[arg(short, long, env = "PDF2MD_CONCURRENCY", default_value_t = 4,
          value_parser = clap::value_parser!(u16).range(1..=64))]
    concurrency: u16,

    /// Attempts per phase before the run stops.
    #[arg(long, env = "PDF2MD_MAX_ATTEMPTS", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(1..=10))]
    max_attempts: u32,

    /// File recording the active conversion.
    #[arg(long, env = "PDF2MD_ACTIVE_POINTER", default_value = ".gmkit/active-conversion.json")]
    active_pointer: PathBuf,

    /// Path to libpdfium (file or directory).
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Disable the progress bar.
    #[arg(long, env = "PDF2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2MD_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Interactive,
    Checklist,
}

impl From<ModeArg> for ReviewMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Interactive => ReviewMode::Interactive,
            ModeArg::Checklist => ReviewMode::Checklist,
        }
    }
}

fn parse_step(s: &str) -> std::result::Result<StepRef, String> {
    s.parse::<StepRef>().map_err(|e| e.to_string())
}

impl Cli {
    fn common(&self) -> &Common {
        match self.command {
            Some(Command::Convert { ref common, .. }) | Some(Command::Inspect { ref common, .. }) => {
                common
            }
            None => &self.common,
        }
    }
}

// ── Main ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let common = cli.common().clone();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar already reports phase boundaries; keep INFO logs for
    // runs without it.
    let show_progress = !common.quiet && !common.no_progress && !cli.status && !cli.json;
    let filter = if common.verbose {
        "debug"
    } else if common.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let progress = CliProgressCallback::new(show_progress);

    // Every state change is persisted before the next await point, so the
    // run can simply be abandoned here. Leaving `select!` drops the run
    // future, which releases the output directory's run lock.
    let finished = tokio::select! {
        r = run(&cli, &common, Arc::clone(&progress)) => Some(r),
        _ = tokio::signal::ctrl_c() => None,
    };
    let Some(result) = finished else {
        progress.bar.finish_and_clear();
        eprintln!("\n{} Interrupted. Progress is saved; continue with {}", cyan("⚠"), bold("pdf2md --resume"));
        // A reviewer prompt may still be blocked on stdin; don't wait for it.
        std::process::exit(i32::from(EXIT_INTERRUPTED));
    };
    progress.bar.finish_and_clear();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", red("Error:"));
            let code = err.downcast_ref::<ConvertError>().map_or(1, ConvertError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

async fn run(cli: &Cli, common: &Common, progress: Arc<CliProgressCallback>) -> Result<()> {
    let config = build_config(cli, common, &progress)?;
    let dir = cli.dir.as_deref();

    let outcome = match cli.command {
        Some(Command::Convert { ref pdf, .. }) => convert(pdf, &config).await?,
        Some(Command::Inspect { ref pdf, json, .. }) => {
            return print_inspect(pdf, json, &config).await;
        }
        None if cli.status => return print_status(dir, cli.json, &config),
        None if cli.resume => resume(dir, &config).await?,
        None => {
            if let Some(index) = cli.phase {
                let phase = Phase::from_index(index).ok_or(ConvertError::InvalidPhase(index))?;
                rerun_phase(dir, phase, &config).await?
            } else if let Some(at) = cli.from_step {
                rerun_from_step(dir, at, &config).await?
            } else {
                anyhow::bail!("Nothing to do: pass a subcommand or one of --resume, --status, --phase, --from-step");
            }
        }
    };
    report_outcome(&outcome, common.quiet);
    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, common: &Common, progress: &Arc<CliProgressCallback>) -> Result<ConversionConfig> {
    let reviewer = TerminalReviewer::new(io::BufReader::new(io::stdin()), progress.bar.clone());
    let mut builder = ConversionConfig::builder()
        .concurrency(usize::from(common.concurrency))
        .max_attempts(common.max_attempts)
        .active_pointer(&common.active_pointer)
        .auto_confirm(common.yes)
        .reviewer(Arc::new(reviewer))
        .progress_callback(Arc::clone(progress) as Arc<dyn ConversionProgressCallback>);

    if let Some(ref lib) = common.pdfium_lib {
        builder = builder.pdfium_library_path(lib);
    }
    if let Some(Command::Convert {
        ref output,
        ref output_root,
        mode,
        diagnostics,
        ref notice,
        ..
    }) = cli.command
    {
        builder = builder
            .output_root(output_root)
            .review_mode(mode.into())
            .diagnostics(diagnostics);
        if let Some(ref dir) = output {
            builder = builder.output_dir(dir);
        }
        if let Some(ref notice) = notice {
            builder = builder.provenance_notice(notice);
        }
    }

    builder.build().context("Invalid configuration")
}

async fn print_inspect(pdf: &Path, json: bool, config: &ConversionConfig) -> Result<()> {
    let report = inspect(pdf, config).await?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise the report")?
        );
    } else {
        println!("{}", report.summary());
    }
    Ok(())
}

fn print_status(dir: Option<&Path>, json: bool, config: &ConversionConfig) -> Result<()> {
    let state = match status(dir, config) {
        Ok(state) => state,
        Err(ConvertError::NoActiveConversion { .. }) if dir.is_none() => {
            println!("No active conversion.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&state).context("Failed to serialise the state")?
        );
        return Ok(());
    }
    print!("{}", state.summary());
    match state.lifecycle() {
        Lifecycle::Complete => {}
        Lifecycle::AwaitingChecklist(_) => println!(
            "\nAnnotate {}, then run pdf2md --resume",
            state.output_dir.join("review-checklist.md").display()
        ),
        Lifecycle::Failed(phase) => println!("\nPhase {phase} failed; fix the cause, then run pdf2md --resume"),
        Lifecycle::NotStarted | Lifecycle::InProgress(_) => println!("\nContinue with pdf2md --resume"),
    }
    Ok(())
}

fn report_outcome(outcome: &RunOutcome, quiet: bool) {
    if quiet {
        return;
    }
    match outcome {
        RunOutcome::Complete {
            final_markdown,
            report,
            degraded_pages,
            issues,
            ..
        } => {
            eprintln!(
                "{}  {}",
                green("✔"),
                bold(&final_markdown.display().to_string())
            );
            eprintln!("   report: {}", dim(&report.display().to_string()));
            eprintln!("   {issues} issue(s) reviewed");
            if !degraded_pages.is_empty() {
                let pages: Vec<String> = degraded_pages.iter().map(ToString::to_string).collect();
                eprintln!(
                    "   {} degraded pages: {}",
                    cyan("⚠"),
                    pages.join(", ")
                );
            }
        }
        RunOutcome::Aborted => {
            eprintln!("Aborted at the pre-flight gate. Nothing was written.");
        }
        RunOutcome::AwaitingChecklist {
            output_dir,
            checklist,
            problems,
        } => {
            if !problems.is_empty() {
                eprintln!("{} The checklist could not be applied:", red("✗"));
                for problem in problems {
                    eprintln!("   - {problem}");
                }
            }
            eprintln!(
                "{} Review the issues in {}",
                cyan("◆"),
                bold(&checklist.display().to_string())
            );
            eprintln!("   then run: pdf2md --resume {}", output_dir.display());
        }
    }
}
