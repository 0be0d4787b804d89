// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, error, info, warn};
use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;

use pdfdual::app_config::{self, Config, DEFAULT_CONFIG_PATH};
use pdfdual::app_controller::Controller;
use pdfdual::errors::AppError;
use pdfdual::file_utils::FileManager;
use pdfdual::pipeline::WatermarkMode;

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

/// CLI Wrapper for WatermarkMode to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliWatermarkMode {
    Watermarked,
    #[value(name = "no_watermark", alias = "no-watermark")]
    NoWatermark,
    Both,
}

impl From<CliWatermarkMode> for WatermarkMode {
    fn from(cli_mode: CliWatermarkMode) -> Self {
        match cli_mode {
            CliWatermarkMode::Watermarked => WatermarkMode::Watermarked,
            CliWatermarkMode::NoWatermark => WatermarkMode::NoWatermark,
            CliWatermarkMode::Both => WatermarkMode::Both,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate shell completions for pdfdual
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// pdfdual - bilingual document translation
///
/// Translates documents extracted to JSON (pages of anchored text blocks) and
/// writes monolingual and side-by-side bilingual outputs.
#[derive(Parser, Debug)]
#[command(name = "pdfdual")]
#[command(version)]
#[command(about = "Page-range aware, resumable bilingual document translation")]
#[command(long_about = "pdfdual translates extracted documents page by page through an LLM engine,
rate limited and retried, and writes mono and dual outputs.

EXAMPLES:
    pdfdual -i paper.json                         # Translate using config/config.json
    pdfdual -i paper.json --lang-out fr           # Translate into French
    pdfdual -i paper.json --pages 1-3,7           # Only pages 1 to 3 and 7
    pdfdual -i papers/ -o out/ --no-dual          # Whole folder, mono outputs only
    pdfdual -i paper.json --watermark both        # Watermarked and clean outputs
    pdfdual --create-config                       # Write an example config
    pdfdual completions bash > pdfdual.bash       # Generate bash completions

An interrupted run can be resumed: translations are checkpointed per unit and
restored on the next run of the same document unless --no-resume is given.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Extracted document (JSON) or directory of documents
    #[arg(short, long, value_name = "INPUT_PATH")]
    input: Option<PathBuf>,

    /// Output directory (defaults to the input's directory)
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Source language code (e.g., 'en', 'de')
    #[arg(long, visible_alias = "li")]
    lang_in: Option<String>,

    /// Target language code (e.g., 'zh', 'fr')
    #[arg(long, visible_alias = "lo")]
    lang_out: Option<String>,

    /// Do not write the bilingual output
    #[arg(long)]
    no_dual: bool,

    /// Do not write the monolingual output
    #[arg(long)]
    no_mono: bool,

    /// Which watermark variants to write
    #[arg(long, value_enum)]
    watermark: Option<CliWatermarkMode>,

    /// Pages to translate, e.g. "1-3,7,10-"
    #[arg(long)]
    pages: Option<String>,

    /// Split the selection into parts of at most N pages
    #[arg(long, value_name = "N")]
    max_pages_per_part: Option<i64>,

    /// Engine requests per second
    #[arg(long)]
    qps: Option<u32>,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,

    /// Translate every unit again instead of restoring checkpointed ones
    #[arg(long)]
    no_resume: bool,

    /// Write an example configuration to the config path and exit
    #[arg(long)]
    create_config: bool,
}

impl CommandLineOptions {
    // @applies: CLI overrides on top of the loaded config
    fn apply_to(&self, config: &mut Config) {
        if let Some(lang) = &self.lang_in {
            config.source_language = lang.clone();
        }
        if let Some(lang) = &self.lang_out {
            config.target_language = lang.clone();
        }
        if self.no_dual {
            config.pdf.no_dual = true;
        }
        if self.no_mono {
            config.pdf.no_mono = true;
        }
        if let Some(mode) = &self.watermark {
            config.pdf.watermark_output_mode = mode.clone().into();
        }
        if let Some(pages) = &self.pages {
            config.pdf.pages = Some(pages.clone());
        }
        if let Some(max_pages) = self.max_pages_per_part {
            config.pdf.max_pages_per_part = Some(max_pages);
        }
        if let Some(qps) = self.qps {
            config.translation.qps = qps;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone().into();
        }
    }
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(CustomLogger::new(LevelFilter::Trace)))?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI colour for log level
    fn color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }

    // @returns: Marker for log level
    fn marker_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "✗",
            Level::Warn => "!",
            Level::Info => " ",
            Level::Debug => "·",
            Level::Trace => "»",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level && metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {} {}\x1B[0m",
                Self::color_for_level(record.level()),
                now,
                Self::marker_for_level(record.level()),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Accept `-li`/`-lo` as spellings of `--lang-in`/`--lang-out`.
///
/// Clap would otherwise read them as `-l` (log level) with a glued value.
fn expand_language_flags<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| match arg.to_str() {
            Some("-li") => OsString::from("--lang-in"),
            Some("-lo") => OsString::from("--lang-out"),
            _ => arg,
        })
        .collect()
}

#[tokio::main]
async fn main() {
    // Info until the config says otherwise
    if let Err(e) = CustomLogger::init(LevelFilter::Info) {
        eprintln!("Failed to install logger: {}", e);
    }

    if let Err(e) = run().await {
        let error = AppError::from(e);
        error!("{}", error);
        std::process::exit(error.exit_code());
    }
}

async fn run() -> Result<()> {

    let cli = CommandLineOptions::parse_from(expand_language_flags(std::env::args_os()));

    if let Some(Commands::Completions { shell }) = cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(shell, &mut cmd, "pdfdual", &mut std::io::stdout());
        return Ok(());
    }

    if let Some(level) = &cli.log_level {
        let level: app_config::LogLevel = level.clone().into();
        log::set_max_level(level.to_level_filter());
    }

    if cli.create_config {
        if FileManager::file_exists(&cli.config) {
            return Err(anyhow!("Config file already exists at {:?}", cli.config));
        }
        if let Some(parent) = cli.config.parent().filter(|p| !p.as_os_str().is_empty()) {
            FileManager::ensure_dir(parent)?;
        }
        Config::example().save(&cli.config)?;
        info!("Wrote example configuration to {:?}; set translation.openai_api_key before running", cli.config);
        return Ok(());
    }

    let input = cli
        .input
        .clone()
        .ok_or_else(|| anyhow!("--input is required (see --help)"))?;

    let mut config = Config::from_file(&cli.config).map_err(|e| AppError::Config(format!("{:#}", e)))?;
    cli.apply_to(&mut config);
    config
        .validate()
        .map_err(|e| AppError::Config(format!("{:#}", e)))?;
    log::set_max_level(config.effective_log_level().to_level_filter());

    let controller = Controller::with_config(config)?.with_resume(!cli.no_resume);

    if FileManager::dir_exists(&input) {
        let summary = controller.run_folder(input, cli.output.clone()).await?;
        for result in &summary.results {
            println!("{}", result);
        }
        for (path, message) in &summary.errors {
            warn!("{:?} was not translated: {}", path, message);
        }
        if !summary.errors.is_empty() && summary.results.is_empty() {
            return Err(anyhow!("No document could be translated"));
        }
    } else if FileManager::file_exists(&input) {
        let output_dir = cli
            .output
            .clone()
            .unwrap_or_else(|| Controller::default_output_dir(&input));
        let result = controller.run(input, output_dir).await?;
        println!("{}", result);
    } else {
        return Err(anyhow!("Input path does not exist: {:?}", input));
    }

    Ok(())
}
