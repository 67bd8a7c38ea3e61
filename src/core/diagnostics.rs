//! Translation of low-level parser failures into positional diagnostics.

use once_cell::sync::Lazy;
use regex::Regex;

/// `name:36:` as emitted by most template parsers.
static LINE_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r":\d+:").expect("valid line marker regex"));

/// ` --> 3:14` as emitted by pest-based parsers (Tera).
static PEST_LOCATION: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"-->\s*(\d+):(\d+)").expect("valid location regex"));

/// Parses the template name, line and description from an error message like:
///
/// `html/template:Application/Register.html:36: no such template "footer.html"`
///
/// Without a `:<digits>:` fragment the name is empty, the line is `None`, and
/// the whole message is kept as the description.
pub fn parse_template_error(message: &str) -> (String, Option<usize>, String) {
  let Some(found) = LINE_MARKER.find(message) else {
    return (String::new(), None, message.to_string());
  };

  let line = match message[found.start() + 1..found.end() - 1].parse::<usize>() {
    Ok(line) => Some(line),
    Err(e) => {
      log::error!("Failed to parse line number from error message: {}", e);
      None
    }
  };

  let prefix = &message[..found.start()];
  let name = match prefix.rfind(':') {
    Some(colon) => &prefix[colon + 1..],
    None => prefix,
  };

  let rest = &message[found.end()..];
  let description = rest.strip_prefix(char::is_whitespace).unwrap_or(rest);

  (name.trim().to_string(), line, description.to_string())
}

/// Line and column of a pest `-->` location marker, if the message has one.
pub(crate) fn pest_location(message: &str) -> Option<(usize, usize)> {
  let caps = PEST_LOCATION.captures(message)?;
  let line = caps.get(1)?.as_str().parse().ok()?;
  let column = caps.get(2)?.as_str().parse().ok()?;
  Some((line, column))
}

/// The `= expected ...` summary line of a pest report.
pub(crate) fn pest_summary(message: &str) -> Option<String> {
  message
    .lines()
    .map(str::trim)
    .find_map(|l| l.strip_prefix("= "))
    .map(str::to_string)
}

/// Flattens an error and its sources into one newline-separated message.
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
  let mut message = err.to_string();
  let mut source = err.source();
  while let Some(cause) = source {
    message.push('\n');
    message.push_str(&cause.to_string());
    source = cause.source();
  }
  message
}
