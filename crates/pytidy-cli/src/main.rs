use clap::{ArgAction, Args, Parser, Subcommand};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use pytidy_core::{
    cache_clear, cache_stats, run_check, ActionTaken, CheckOutcome, CheckRequest, Config,
    InstallStatus, ReportRow, RequirementStatus,
};

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = PytidyCli::parse();
    init_tracing(cli.verbose);

    let config = Config::from_env();
    let code = match &cli.command {
        Some(CliCommand::Cache(args)) => run_cache(&config, args),
        None => run_reconcile(&config, &cli)?,
    };

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = format!("pytidy={level},pytidy_core={level},pytidy_domain={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn run_reconcile(config: &Config, cli: &PytidyCli) -> Result<i32> {
    let request = CheckRequest {
        input: cli.input.clone(),
        registry_package: cli.package.clone(),
        recursive: cli.recursive,
        auto_install: !cli.no_install,
        force_install: cli.force_install,
        force_retry: cli.force_retry,
        summary_only: cli.summary || cli.check,
    };

    let outcome = run_check(config, &request).map_err(|err| eyre!("{err:?}"))?;

    if !cli.quiet {
        render_outcome(&outcome);
    }

    let watcher_failed = outcome
        .watched
        .iter()
        .any(|(_, status)| *status == InstallStatus::Failed);
    Ok(match outcome.action {
        ActionTaken::Blocked => 1,
        ActionTaken::InstallFailed(_) => 2,
        _ if watcher_failed => 2,
        _ => 0,
    })
}

fn run_cache(config: &Config, args: &CacheArgs) -> i32 {
    match args.command {
        CacheSubcommand::Stats => {
            let stats = cache_stats(config);
            println!(
                "file tier: {} ({} entries, {} bytes)",
                if stats.file_enabled { "enabled" } else { "disabled" },
                stats.file.entries,
                stats.file.total_bytes,
            );
            println!(
                "remote tier: {}",
                if stats.remote_live { "connected" } else { "unavailable" }
            );
        }
        CacheSubcommand::Clear => {
            let report = cache_clear(config);
            println!(
                "cleared {} file entries and {} remote entries",
                report.file_entries, report.remote_entries
            );
        }
    }
    0
}

fn render_outcome(outcome: &CheckOutcome) {
    if !outcome.report.rows.is_empty() {
        println!("Checked {} ({} packages)", outcome.source, outcome.report.rows.len());
        println!("{}", format_summary_table(&outcome.report.rows));
    }

    if !outcome.report.conflicts.is_empty() {
        println!("\nConflicts:");
        for conflict in &outcome.report.conflicts {
            match conflict {
                pytidy_core::Conflict::Version {
                    name,
                    installed,
                    required,
                } => println!("  {name}: installed={installed}, required={required}"),
                pytidy_core::Conflict::Missing { name, required } => {
                    println!("  {name}: not installed (required {})", required.as_deref().unwrap_or("any"));
                }
                pytidy_core::Conflict::PythonIncompatible {
                    name,
                    requires_python,
                    current,
                } => println!(
                    "  {name}: requires Python {requires_python}, running {current}"
                ),
            }
        }
    }

    match &outcome.action {
        ActionTaken::None => {
            if outcome.report.conflicts.is_empty() && !outcome.report.rows.is_empty() {
                println!("\nAll requirements satisfied; nothing to install.");
            }
        }
        ActionTaken::Installed(specs) => {
            println!("\nInstalled {} package(s).", specs.len());
        }
        ActionTaken::InstallFailed(specs) => {
            println!("\nFailed to install {} package(s).", specs.len());
        }
        ActionTaken::Isolated { path, hint } => {
            println!("\nVersion conflicts detected; created isolated environment at {}", path.display());
            println!("Activate it with: {hint}");
        }
        ActionTaken::Blocked => {
            println!("\nInterpreter incompatibilities block automatic handling; upgrade Python or adjust the requirements.");
        }
    }

    for (name, status) in &outcome.watched {
        let label = match status {
            InstallStatus::Succeeded => "installed",
            InstallStatus::Failed => "install failed",
            InstallStatus::Running => "still running",
        };
        println!("{name}: {label}");
    }
}

fn format_summary_table(rows: &[ReportRow]) -> String {
    let headers = ["Package", "Installed", "Required", "Latest", "Status"];
    let cells: Vec<[String; 5]> = rows
        .iter()
        .map(|row| {
            [
                row.name.clone(),
                row.installed.clone().unwrap_or_else(|| "-".to_string()),
                row.required.clone().unwrap_or_else(|| "-".to_string()),
                row.latest.clone().unwrap_or_else(|| "-".to_string()),
                status_label(row.status).to_string(),
            ]
        })
        .collect();

    let mut widths = headers.map(str::len);
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.len());
        }
    }

    let mut lines = Vec::with_capacity(cells.len() + 2);
    lines.push(format_row(&headers.map(String::from), &widths));
    lines.push(
        widths
            .iter()
            .map(|width| "-".repeat(*width))
            .collect::<Vec<_>>()
            .join("  "),
    );
    for row in &cells {
        lines.push(format_row(row, &widths));
    }
    lines.join("\n")
}

fn format_row(cells: &[String; 5], widths: &[usize; 5]) -> String {
    cells
        .iter()
        .zip(widths.iter())
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}

fn status_label(status: RequirementStatus) -> &'static str {
    match status {
        RequirementStatus::ExactMatch => "exact match",
        RequirementStatus::WithinRange => "ok",
        RequirementStatus::Mismatch => "version conflict",
        RequirementStatus::NotInstalled => "not installed",
        RequirementStatus::Unconstrained => "no version rule",
    }
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Reconcile declared Python dependencies against the installed environment",
    long_about = "Parses requirement lists, build scripts, project manifests, or source \
                  imports, checks them against installed packages and the registry, and \
                  installs what is missing or isolates conflicting sets in a fresh \
                  virtual environment.",
    after_help = "Examples:\n  pytidy\n  pytidy requirements.txt\n  pytidy src/ --recursive\n  pytidy --package requests\n  pytidy cache stats\n"
)]
struct PytidyCli {
    #[arg(
        value_name = "PATH_OR_NAME",
        help = "Requirement file, build script, manifest, source file, directory, or package name"
    )]
    input: Option<String>,
    #[arg(short, long, help = "Scan directories recursively")]
    recursive: bool,
    #[arg(
        short = 'f',
        long,
        help = "Keep retrying failed installs until they succeed"
    )]
    force_retry: bool,
    #[arg(
        short = 'F',
        long,
        help = "Install in place even when version conflicts are present"
    )]
    force_install: bool,
    #[arg(short, long, help = "Show the summary table only; change nothing")]
    summary: bool,
    #[arg(short, long, help = "Alias for --summary")]
    check: bool,
    #[arg(short = 'n', long, help = "Report, but do not install anything")]
    no_install: bool,
    #[arg(
        short = 'i',
        long = "package",
        value_name = "NAME",
        help = "Check a registry package's published dependencies"
    )]
    package: Option<String>,
    #[arg(short, long, action = ArgAction::Count, help = "Increase logging (-vv reaches debug)")]
    verbose: u8,
    #[arg(short, long, help = "Suppress the summary output")]
    quiet: bool,
    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    #[command(about = "Inspect or clear the registry response cache")]
    Cache(CacheArgs),
}

#[derive(Args, Debug)]
struct CacheArgs {
    #[command(subcommand)]
    command: CacheSubcommand,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum CacheSubcommand {
    #[command(about = "Report entry counts and sizes for both tiers")]
    Stats,
    #[command(about = "Delete every cached registry response")]
    Clear,
}
