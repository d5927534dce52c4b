//! ccaudit CLI binary
//!
//! This is the command-line interface for ccaudit. For library usage, see
//! the `ccaudit` crate documentation.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use ccaudit::checkers::CheckerRegistry;
use ccaudit::config::Settings;
use ccaudit::context::AnalyzerContext;
use ccaudit::executor::{self, InputFile};
use ccaudit::suppressions;

/// Static analysis over a set of C/C++ source files.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Source files to analyze.
    files: Vec<PathBuf>,
    /// Load settings from a TOML project file, merged under the CLI flags below.
    #[arg(long)]
    project: Option<PathBuf>,
    /// Incremental build directory for analyzer-info sidecars.
    #[arg(long)]
    build_dir: Option<PathBuf>,
    /// Result cache directory.
    #[arg(long)]
    cache_dir: Option<PathBuf>,
    /// Maximum number of preprocessor configurations analyzed per file.
    #[arg(long)]
    max_configs: Option<usize>,
    /// Analyze only this forced configuration (skips enumeration).
    #[arg(long)]
    force_config: Option<String>,
    /// Escalate the exit code for suppressed critical findings instead of dropping them.
    #[arg(long)]
    safety: bool,
    /// Emit every finding even when its rendered text duplicates one already delivered.
    #[arg(long)]
    emit_duplicates: bool,
    /// Suppression list file (line-based or XML), may be given multiple times.
    #[arg(long = "suppressions-list")]
    suppressions_list: Vec<PathBuf>,
    /// Output template, e.g. `{file}:{line}:{column}: {severity}: {message} [{id}]`.
    #[arg(long)]
    template: Option<String>,
    /// Worker thread count.
    #[arg(short = 'j', long)]
    jobs: Option<usize>,
    /// Log level (trace|debug|info|warn|error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    std::env::set_var("CCAUDIT_LOG", &cli.log_level);
    ccaudit::logging::init();

    let mut settings = match &cli.project {
        Some(path) => match Settings::load(path) {
            Ok(settings) => settings,
            Err(err) => {
                eprintln!("ccaudit: failed to load project file {}: {err}", path.display());
                return ExitCode::from(1);
            }
        },
        None => Settings::default(),
    };

    if let Some(build_dir) = cli.build_dir {
        settings.build_dir = Some(build_dir);
    }
    if let Some(cache_dir) = cli.cache_dir {
        settings.cache_dir = Some(cache_dir);
    }
    if let Some(max_configs) = cli.max_configs {
        settings.max_configs = max_configs;
    }
    if cli.force_config.is_some() {
        settings.force_config = cli.force_config;
    }
    if cli.safety {
        settings.safety = true;
    }
    if cli.emit_duplicates {
        settings.emit_duplicates = true;
    }
    if let Some(template) = cli.template {
        settings.template = template;
    }
    if let Some(jobs) = cli.jobs {
        settings.jobs = jobs;
    }
    settings.suppression_files.extend(cli.suppressions_list);

    let suppressions = match suppressions::load_configured(&settings.suppression_files) {
        Ok(store) => store,
        Err(err) => {
            eprintln!("ccaudit: failed to load suppressions: {err}");
            return ExitCode::from(1);
        }
    };
    let mut ctx = AnalyzerContext::new(settings, CheckerRegistry::new(), suppressions);
    if let Some(nofail_path) = ctx.settings.nofail_suppression_file.clone() {
        match suppressions::load_configured(std::slice::from_ref(&nofail_path)) {
            Ok(store) => ctx = ctx.with_nofail_suppressions(store),
            Err(err) => {
                eprintln!("ccaudit: failed to load nofail suppressions {}: {err}", nofail_path.display());
                return ExitCode::from(1);
            }
        }
    }

    let mut files = Vec::with_capacity(cli.files.len());
    for path in &cli.files {
        match std::fs::read_to_string(path) {
            Ok(source_text) => files.push(InputFile {
                file_name: path.display().to_string(),
                source_text,
            }),
            Err(err) => {
                eprintln!("ccaudit: could not read {}: {err}", path.display());
                return ExitCode::from(1);
            }
        }
    }

    let sink = executor::run(&ctx, files);
    for finding in sink.delivered() {
        println!(
            "{}",
            ccaudit::sink::render_template(finding, &ctx.settings.template, None)
        );
    }

    ExitCode::from(sink.exit_code())
}
