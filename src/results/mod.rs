//! Run logs and reporting sinks
//!
//! Summary and config logs, the TAP stream, HTML annotation and JUnit
//! export. All artifacts of one run live in its log directory.

mod html;
mod junit;
mod summary;
mod tap;

pub use html::{annotate, html_path, publish_final, publish_snapshot};
pub use junit::write_junit;
pub use summary::{
    locate, read_summary, write_config_log, SuiteFooter, SuiteHeader, SummaryLog,
};
pub use tap::{TapPreamble, TapSink};

pub const SUMMARY_LOG: &str = "summary.log";
pub const CONFIG_LOG: &str = "config.log";
pub const TAP_LOG: &str = "tap.log";
pub const JUNIT_FILE: &str = "junit.xml";
pub const EVENT_SUFFIX: &str = ".event.log";
pub const HTML_EXT: &str = ".html";
pub const SNAPSHOT_HTML: &str = "summary.log.tmp.html";
/// Link in the log root to the most recent run directory
pub const LATEST_RUN: &str = "latest_run";
