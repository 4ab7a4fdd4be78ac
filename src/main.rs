//! Suite Runner - test-suite orchestrator for interactive test scripts
//!
//! Expands files and directories into an ordered list of scripts, then lists,
//! documents, validates or executes them one at a time. Every reporting run
//! leaves a log directory with a summary log, a config log, a TAP stream and
//! optional HTML and JUnit reports.
//!
//! ## Usage
//!
//! ```bash
//! # Execute every script under a directory
//! suite-runner run tests/
//!
//! # List the scripts that would run
//! suite-runner run --mode list tests/
//!
//! # Rerun what failed last time
//! suite-runner run --rerun fail
//!
//! # Render a previous run as HTML
//! suite-runner annotate -r suite_logs/latest_run
//! ```

use clap::Parser;
use tracing::{debug, error, warn};

mod cli;
mod config;
mod executor;
mod models;
mod output;
mod results;
mod script;
mod suite;
mod utils;

use cli::{AnnotateArgs, Args, RunArgs};
use config::{ArgDict, MergePass};
use executor::{RunError, RunReport, RunStatus, SuiteRunner};
use models::Progress;
use output::Console;
use script::{CommandInterpreter, HeaderParser};
use utils::{init_logger, LogLevel};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let level = if args.verbose {
        LogLevel::Debug
    } else {
        args.log_level.parse().unwrap_or(LogLevel::Info)
    };
    init_logger(level);

    let code = match args.command {
        cli::Command::Run(run_args) => run(run_args).await,
        cli::Command::Annotate(annotate_args) => annotate(annotate_args),
    };
    std::process::exit(code);
}

async fn run(args: RunArgs) -> i32 {
    let invocation: Vec<String> = std::env::args().collect();

    let user = match MergePass::new().merge_all(args.user_opts(), ArgDict::new()) {
        Ok(user) => user,
        Err(e) => {
            let e = RunError::from(e);
            eprintln!("suite-runner: {e}");
            return e.exit_code();
        }
    };
    debug!("User options: {:?}", args.user_opts());

    let mut runner = SuiteRunner::new(HeaderParser::new(), CommandInterpreter::new())
        .with_console(Console::stdout(Progress::Brief));

    match runner
        .run(args.files, user, args.prev_log_dir, invocation)
        .await
    {
        Ok(report) => finish(report),
        Err(e) => {
            error!("{}", e);
            eprintln!("suite-runner: {e}");
            e.exit_code()
        }
    }
}

fn finish(report: RunReport) -> i32 {
    if report.status == RunStatus::SuiteTimeout {
        warn!(
            "Suite timed out after {} script(s), logs in {}",
            report.outcomes.len(),
            report.log_dir.display()
        );
    }
    report.exit_code()
}

fn annotate(args: AnnotateArgs) -> i32 {
    let progress: Progress = match args.progress.parse() {
        Ok(progress) => progress,
        Err(e) => {
            eprintln!("suite-runner: {e}");
            return 2;
        }
    };
    let mut console = Console::stdout(progress);

    let log_file = results::locate(&args.log_file);
    match results::annotate(args.recursive, &log_file, &mut console) {
        Ok(page) => {
            debug!("Annotated {}", page.display());
            0
        }
        Err(e) => {
            eprintln!("suite-runner: {e}");
            e.exit_code()
        }
    }
}
