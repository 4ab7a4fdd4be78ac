//! CLI argument parsing
//!
//! Defines the command-line interface using clap. Run options map one to
//! one onto configuration keys and form the user layer.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Test-suite orchestrator for interactive test scripts
#[derive(Parser, Debug)]
#[command(name = "suite-runner")]
#[command(version)]
#[command(about = "Run, list, document and report suites of test scripts")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a suite of scripts
    Run(RunArgs),

    /// Render a summary log or event log as HTML
    Annotate(AnnotateArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Scripts or directories; prior run directories when rerunning
    pub files: Vec<PathBuf>,

    /// Run mode (list, list_dir, doc, validate, execute)
    #[arg(short, long)]
    pub mode: Option<String>,

    /// Directory for this run's logs
    #[arg(long)]
    pub log_dir: Option<String>,

    /// Parent of generated run directories
    #[arg(long)]
    pub log_root: Option<String>,

    /// Directory holding site configuration files
    #[arg(long)]
    pub config_dir: Option<String>,

    /// Site configuration name (defaults to the host name)
    #[arg(long)]
    pub config_name: Option<String>,

    /// Regular expression selecting script files in directories
    #[arg(long)]
    pub file_pattern: Option<String>,

    /// Prefix shown before script paths
    #[arg(long)]
    pub case_prefix: Option<String>,

    /// Rerun scripts from a previous run with at least this severity
    #[arg(long)]
    pub rerun: Option<String>,

    /// Previous run directory used by --rerun when no files are given
    #[arg(long)]
    pub prev_log_dir: Option<PathBuf>,

    /// Render HTML when the verdict reaches this severity
    #[arg(long)]
    pub html: Option<String>,

    /// Write a JUnit report next to the summary log
    #[arg(long)]
    pub junit: bool,

    /// Extra TAP target (stdout, stderr or a file); repeatable
    #[arg(long)]
    pub tap: Vec<String>,

    /// Console verbosity (silent, summary, brief, verbose)
    #[arg(short, long)]
    pub progress: Option<String>,

    /// Suite timeout in seconds, or infinity
    #[arg(long)]
    pub suite_timeout: Option<String>,

    /// Case timeout in seconds, or infinity
    #[arg(long)]
    pub case_timeout: Option<String>,

    /// Timeout multiplier in permille
    #[arg(long)]
    pub multiplier: Option<String>,

    /// Documentation depth, or infinity
    #[arg(long)]
    pub doc_depth: Option<String>,

    /// Program that executes scripts
    #[arg(long)]
    pub interpreter: Option<String>,

    /// Argument passed to the interpreter before the script; repeatable
    #[arg(long = "interpreter-arg")]
    pub interpreter_args: Vec<String>,

    /// Script variable NAME=VALUE; repeatable
    #[arg(long)]
    pub var: Vec<String>,

    /// Skip scripts when the variable is set; repeatable
    #[arg(long)]
    pub skip: Vec<String>,

    /// Skip scripts unless the variable is set; repeatable
    #[arg(long)]
    pub skip_unless: Vec<String>,

    /// Fail scripts unless the variable is set; repeatable
    #[arg(long)]
    pub require: Vec<String>,

    /// Report failures as expected
    #[arg(long)]
    pub unstable: bool,
}

impl RunArgs {
    /// Explicit options as configuration pairs, in command-line order per key
    pub fn user_opts(&self) -> Vec<(String, String)> {
        let mut opts = Vec::new();
        let single = [
            ("mode", &self.mode),
            ("log_dir", &self.log_dir),
            ("log_root", &self.log_root),
            ("config_dir", &self.config_dir),
            ("config_name", &self.config_name),
            ("file_pattern", &self.file_pattern),
            ("case_prefix", &self.case_prefix),
            ("rerun", &self.rerun),
            ("html", &self.html),
            ("progress", &self.progress),
            ("suite_timeout", &self.suite_timeout),
            ("case_timeout", &self.case_timeout),
            ("multiplier", &self.multiplier),
            ("doc_depth", &self.doc_depth),
            ("interpreter", &self.interpreter),
        ];
        for (key, value) in single {
            if let Some(value) = value {
                opts.push((key.to_string(), value.clone()));
            }
        }

        let lists = [
            ("tap", &self.tap),
            ("interpreter_args", &self.interpreter_args),
            ("var", &self.var),
            ("skip", &self.skip),
            ("skip_unless", &self.skip_unless),
            ("require", &self.require),
        ];
        for (key, values) in lists {
            opts.extend(values.iter().map(|v| (key.to_string(), v.clone())));
        }

        if self.junit {
            opts.push(("junit".to_string(), "true".to_string()));
        }
        if self.unstable {
            opts.push(("unstable".to_string(), "true".to_string()));
        }
        opts
    }
}

/// Arguments for the annotate command
#[derive(Parser, Debug)]
pub struct AnnotateArgs {
    /// Summary log, run directory or event log
    pub log_file: PathBuf,

    /// Also render every event log referenced by a summary log
    #[arg(short, long)]
    pub recursive: bool,

    /// Console verbosity (silent, summary, brief, verbose)
    #[arg(short, long, default_value = "brief")]
    pub progress: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_options() {
        let args = Args::try_parse_from([
            "suite-runner",
            "run",
            "--mode",
            "validate",
            "--var",
            "A=1",
            "--var",
            "B=2",
            "--junit",
            "suite",
        ])
        .unwrap();

        match args.command {
            Command::Run(run) => {
                assert_eq!(run.files, vec![PathBuf::from("suite")]);
                assert_eq!(
                    run.user_opts(),
                    vec![
                        ("mode".to_string(), "validate".to_string()),
                        ("var".to_string(), "A=1".to_string()),
                        ("var".to_string(), "B=2".to_string()),
                        ("junit".to_string(), "true".to_string()),
                    ]
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_annotate() {
        let args =
            Args::try_parse_from(["suite-runner", "annotate", "-r", "logs/run_1"]).unwrap();
        match args.command {
            Command::Annotate(annotate) => {
                assert!(annotate.recursive);
                assert_eq!(annotate.log_file, PathBuf::from("logs/run_1"));
                assert_eq!(annotate.progress, "brief");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(args.log_level, "info");
    }

    #[test]
    fn test_no_options_is_empty() {
        assert!(RunArgs::default().user_opts().is_empty());
    }
}
