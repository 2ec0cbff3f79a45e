//! CLI output formatting utilities.
//!
//! Colored status lines, build values and durations for the terminal.

use std::time::Duration;

use anyhow::Context;
use laze_lib::value::Value;
use owo_colors::{OwoColorize, Stream};

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  if secs >= 60 {
    let mins = secs / 60;
    let remaining_secs = secs % 60;
    format!("{}m {}s", mins, remaining_secs)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, millis / 10)
  } else {
    format!("{}ms", millis)
  }
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

/// Render a build value for humans: scalars inline, files by path, collections as indented
/// lines.
pub fn format_value(value: &Value) -> String {
  let mut out = String::new();
  write_value(&mut out, value, 0);
  out
}

fn write_value(out: &mut String, value: &Value, depth: usize) {
  let indent = "  ".repeat(depth);
  match value {
    Value::Nil => out.push_str("nil"),
    Value::Bool(b) => out.push_str(&b.to_string()),
    Value::Int(i) => out.push_str(&i.to_string()),
    Value::Float(f) => out.push_str(&f.to_string()),
    Value::String(s) => out.push_str(s),
    Value::File(info) => out.push_str(&info.path),
    Value::Target(target) => {
      out.push_str(&format!("{} {} ", target.label, symbols::ARROW));
      write_value(out, &target.value, depth);
    }
    Value::List(items) if items.is_empty() => out.push_str("[]"),
    Value::List(items) => {
      for item in items {
        out.push_str(&format!("\n{}  - ", indent));
        write_value(out, item, depth + 1);
      }
    }
    Value::Map(map) if map.is_empty() => out.push_str("{}"),
    Value::Map(map) => {
      for (key, item) in map {
        out.push_str(&format!("\n{}  {}: ", indent, key));
        write_value(out, item, depth + 1);
      }
    }
  }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}
