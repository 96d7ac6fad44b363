//! ## Herald
//!
//! Operator-facing output for nudge runs. Every line goes to stderr so that
//! stdout stays free for JSON reports.
//!
//! - Level functions: `info()`, `warn()`, `error()`, `debug()`, `verbose()`, `success()`
//! - Timestamped events: `event_info()`, `event_warn()`, `event_error()`, `event_success()`
//! - Banners: `announce()` for run starts, `flourish()` for run summaries
//!
//! `debug` and `verbose` lines are dropped unless verbose output was switched on
//! with [`set_verbose`]. [`set_quiet`] silences everything except errors.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Local;
use colored::*;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static VERBOSE: AtomicBool = AtomicBool::new(false);
static QUIET: AtomicBool = AtomicBool::new(false);

/// Install the tracing subscriber used by library internals.
///
/// `RUST_LOG` wins when set; otherwise `nudge=debug` in verbose mode and
/// `nudge=warn` elsewhere. Calling this twice is harmless.
pub fn init_tracing(verbose: bool) {
  set_verbose(verbose);

  let fallback = if verbose { "nudge=debug,herald=debug" } else { "nudge=warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

  let installed = tracing_subscriber::registry()
    .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
    .with(filter)
    .try_init()
    .is_ok();
  tracing::debug!(installed, verbose, "tracing initialised");
}

pub fn set_verbose(enabled: bool) {
  VERBOSE.store(enabled, Ordering::Relaxed);
}

pub fn is_verbose() -> bool {
  VERBOSE.load(Ordering::Relaxed)
}

pub fn set_quiet(enabled: bool) {
  QUIET.store(enabled, Ordering::Relaxed);
}

pub fn is_quiet() -> bool {
  QUIET.load(Ordering::Relaxed)
}

/// Write each line of `message` to stderr.
pub fn log(message: &str) {
  for line in message.lines() {
    eprintln!("{line}");
  }
}

fn format_prefix(color: Color, prefix: &str) -> String {
  format!("[{}]{:<width$}", prefix.color(color).bold(), "", width = 7 - prefix.len() - 2)
}

fn emit(color: Color, prefix: &str, message: &str) {
  let prefix = format_prefix(color, prefix);
  for line in message.lines() {
    log(&format!("{prefix} {line}"));
  }
}

fn emit_event(color: Color, message: &str) {
  let timestamp = Local::now().format("%H:%M:%S").to_string();
  let prefix = format!("[{}] [{}]", "event".color(color).bold(), timestamp.cyan());
  for line in message.lines() {
    log(&format!("{prefix} {line}"));
  }
}

pub fn banner_line(length: usize, char: char) -> String {
  char.to_string().repeat(length)
}

/// Frame `message` between two border lines.
pub fn as_banner<F>(log_fn: F, message: &str, width: Option<usize>, border_char: Option<char>)
where
  F: Fn(&str),
{
  let width = width.unwrap_or(50);
  let banner = banner_line(width, border_char.unwrap_or('='));

  log_fn(&banner);
  log_fn(message);
  log_fn(&banner);
}

pub fn info(message: &str) {
  if !is_quiet() {
    emit(Color::Blue, "info", message);
  }
}

pub fn warn(message: &str) {
  if !is_quiet() {
    emit(Color::Yellow, "warn", message);
  }
}

pub fn error(message: &str) {
  emit(Color::Red, "error", message);
}

pub fn success(message: &str) {
  if !is_quiet() {
    emit(Color::Green, "sccs", message);
  }
}

pub fn debug(message: &str) {
  if is_verbose() && !is_quiet() {
    emit(Color::Magenta, "debug", message);
  }
}

pub fn verbose(message: &str) {
  if is_verbose() && !is_quiet() {
    emit(Color::Cyan, "verb", message);
  }
}

pub fn event_info(message: &str) {
  if !is_quiet() {
    emit_event(Color::Blue, message);
  }
}

pub fn event_warn(message: &str) {
  if !is_quiet() {
    emit_event(Color::Yellow, message);
  }
}

pub fn event_error(message: &str) {
  emit_event(Color::Red, message);
}

pub fn event_success(message: &str) {
  if !is_quiet() {
    emit_event(Color::Green, message);
  }
}

/// Banner for the start of a long-running job.
pub fn announce(message: &str) {
  if !is_quiet() {
    as_banner(|msg| log(&msg.blue().bold().to_string()), message, Some(50), Some('-'));
  }
}

/// Banner for a finished job summary.
pub fn flourish(message: &str) {
  if !is_quiet() {
    as_banner(|msg| log(&msg.green().bold().to_string()), message, Some(45), Some('~'));
  }
}

#[macro_export]
macro_rules! info {
  ($msg:expr) => {
    $crate::info($msg);
  };
}

#[macro_export]
macro_rules! warn {
  ($msg:expr) => {
    $crate::warn($msg);
  };
}

#[macro_export]
macro_rules! error {
  ($msg:expr) => {
    $crate::error($msg);
  };
}

#[macro_export]
macro_rules! success {
  ($msg:expr) => {
    $crate::success($msg);
  };
}

#[macro_export]
macro_rules! debug {
  ($msg:expr) => {
    $crate::debug($msg);
  };
}

#[macro_export]
macro_rules! verbose {
  ($msg:expr) => {
    $crate::verbose($msg);
  };
}

#[macro_export]
macro_rules! announce {
  ($msg:expr) => {
    $crate::announce($msg);
  };
}

#[macro_export]
macro_rules! flourish {
  ($msg:expr) => {
    $crate::flourish($msg);
  };
}

#[macro_export]
macro_rules! event_info {
  ($msg:expr) => {
    $crate::event_info($msg);
  };
}

#[macro_export]
macro_rules! event_warn {
  ($msg:expr) => {
    $crate::event_warn($msg);
  };
}

#[macro_export]
macro_rules! event_error {
  ($msg:expr) => {
    $crate::event_error($msg);
  };
}

#[macro_export]
macro_rules! event_success {
  ($msg:expr) => {
    $crate::event_success($msg);
  };
}
