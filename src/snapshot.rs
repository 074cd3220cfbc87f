//! Snapshot persistence for completed runs
//!
//! A snapshot is a small XML-like textual tree: a root element carrying the
//! profile name, a fixed-format timestamp, and the tool version; one child
//! element per metric present in the run, keyed by the metric's portable
//! identity; one grandchild per measured object with its value as a
//! culture-invariant decimal string. Reading re-posts every value through
//! the same path a live run uses, so a reloaded run behaves identically to
//! a fresh one except that anchors are absent.
//!
//! The format is narrow enough that the reader is a small hand-written
//! element/attribute parser rather than a full XML dependency. One known
//! producer emitted measured-object keys with unescaped `<` characters;
//! when parsing fails, a single byte-level repair pass escapes stray `<`
//! and retries before giving up.

use std::fs;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use log::{debug, warn};
use thiserror::Error;

use crate::metric::{MetricCategory, MetricRepository};
use crate::run::MetricsRun;

/// Timestamp pattern used in the root element, e.g.
/// `Wed, 4 Jun 2025 10:15:30 UTC`.
const WRITE_TIMESTAMP_FORMAT: &str = "%a, %-d %b %Y %H:%M:%S UTC";
const READ_TIMESTAMP_FORMAT: &str = "%a, %d %b %Y %H:%M:%S UTC";

/// Errors that can occur while reading or writing a snapshot
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Failed to access snapshot file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Malformed snapshot at byte {offset}: {message}")]
    ParseError { message: String, offset: usize },

    #[error("Unexpected root element '{0}'")]
    UnexpectedRoot(String),

    #[error("Snapshot is missing required attribute '{0}'")]
    MissingAttribute(&'static str),
}

/// Serialize a run to the snapshot format.
///
/// Output order is deterministic: categories in storage order, metrics by
/// id, measured objects by key.
pub fn write_to_string(run: &MetricsRun) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "<snapshot profile=\"{}\" timestamp=\"{}\" version=\"{}\">\n",
        escape(run.profile_name()),
        run.timestamp().format(WRITE_TIMESTAMP_FORMAT),
        env!("CARGO_PKG_VERSION"),
    ));
    for category in MetricCategory::ALL {
        let result = run.results_for(category);
        for metric in result.metrics() {
            out.push_str(&format!(
                "  <metric calculator=\"{}\">\n",
                escape(metric.id())
            ));
            for (measured, fraction) in result.values_for(metric.id()) {
                out.push_str(&format!(
                    "    <value measured=\"{}\" value=\"{}\"/>\n",
                    escape(measured),
                    fraction.value(),
                ));
            }
            out.push_str("  </metric>\n");
        }
    }
    out.push_str("</snapshot>\n");
    out
}

pub fn write_to_file(run: &MetricsRun, path: &Path) -> Result<(), SnapshotError> {
    fs::write(path, write_to_string(run))?;
    Ok(())
}

/// Reconstruct a run from snapshot text.
///
/// Metric identities are resolved through the repository; an identity the
/// repository does not know skips that metric's values with a warning
/// instead of failing the whole read.
pub fn read_from_str(
    content: &str,
    repository: &dyn MetricRepository,
) -> Result<MetricsRun, SnapshotError> {
    let root = match parse_document(content) {
        Ok(root) => root,
        Err(first) => {
            debug!("snapshot parse failed ({first}), attempting repair");
            let repaired = repair(content);
            match parse_document(&repaired) {
                Ok(root) => root,
                Err(_) => return Err(first),
            }
        }
    };

    if root.name != "snapshot" {
        return Err(SnapshotError::UnexpectedRoot(root.name));
    }
    let profile = root
        .attr("profile")
        .ok_or(SnapshotError::MissingAttribute("profile"))?;
    let timestamp = root
        .attr("timestamp")
        .and_then(parse_timestamp)
        .unwrap_or_else(|| {
            warn!("snapshot has a missing or malformed timestamp");
            DateTime::UNIX_EPOCH
        });

    // The scope reference, like anchors, does not survive persistence.
    let mut run = MetricsRun::with_timestamp(profile, "", timestamp);
    for metric_element in root.children.iter().filter(|e| e.name == "metric") {
        let Some(id) = metric_element.attr("calculator") else {
            warn!("snapshot metric element without identity, skipping");
            continue;
        };
        let Some(metric) = repository.metric_for_id(id) else {
            warn!("snapshot references unknown metric '{}', skipping its values", id);
            continue;
        };
        for value_element in metric_element.children.iter().filter(|e| e.name == "value") {
            let (Some(measured), Some(raw)) =
                (value_element.attr("measured"), value_element.attr("value"))
            else {
                warn!("snapshot value element missing attributes, skipping");
                continue;
            };
            match raw.parse::<f64>() {
                Ok(value) => {
                    run.results_for_mut(metric.category())
                        .post_value(&metric, measured, value, 1.0);
                }
                Err(_) => warn!("snapshot value '{}' is not a decimal, skipping", raw),
            }
        }
    }
    Ok(run)
}

pub fn read_from_file(
    path: &Path,
    repository: &dyn MetricRepository,
) -> Result<MetricsRun, SnapshotError> {
    let content = fs::read_to_string(path)?;
    read_from_str(&content, repository)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, READ_TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        let known = [
            ("&amp;", '&'),
            ("&lt;", '<'),
            ("&gt;", '>'),
            ("&quot;", '"'),
            ("&apos;", '\''),
        ]
        .into_iter()
        .find(|(entity, _)| rest.starts_with(entity));
        match known {
            Some((entity, replacement)) => {
                out.push(replacement);
                rest = &rest[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Escape stray `<` characters that do not begin recognized markup.
///
/// This is the one repair attempted for snapshots from the known producer
/// that wrote measured-object keys (generic signatures and the like)
/// without escaping.
fn repair(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    for (i, c) in content.char_indices() {
        if c == '<' {
            let rest = &content[i + 1..];
            let markup = ["snapshot", "metric", "value", "/snapshot", "/metric", "/value"]
                .iter()
                .any(|name| rest.starts_with(name))
                || rest.starts_with('?')
                || rest.starts_with('!');
            if markup {
                out.push('<');
            } else {
                out.push_str("&lt;");
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[derive(Debug)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
}

impl Element {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(attr, _)| attr == name)
            .map(|(_, value)| value.as_str())
    }
}

fn parse_document(content: &str) -> Result<Element, SnapshotError> {
    let mut parser = Parser {
        input: content.as_bytes(),
        pos: 0,
    };
    parser.skip_misc();
    parser.parse_element()
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, message: &str) -> SnapshotError {
        SnapshotError::ParseError {
            message: message.to_string(),
            offset: self.pos,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn starts_with(&self, prefix: &[u8]) -> bool {
        self.input[self.pos..].starts_with(prefix)
    }

    fn expect(&mut self, byte: u8) -> Result<(), SnapshotError> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", byte as char)))
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    /// Skip whitespace, processing instructions, and comments.
    fn skip_misc(&mut self) {
        loop {
            self.skip_whitespace();
            if self.starts_with(b"<?") {
                while self.peek().is_some() && !self.starts_with(b"?>") {
                    self.pos += 1;
                }
                self.pos = (self.pos + 2).min(self.input.len());
            } else if self.starts_with(b"<!--") {
                while self.peek().is_some() && !self.starts_with(b"-->") {
                    self.pos += 1;
                }
                self.pos = (self.pos + 3).min(self.input.len());
            } else {
                return;
            }
        }
    }

    fn read_name(&mut self) -> Result<String, SnapshotError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b':'))
        {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("expected a name"));
        }
        Ok(String::from_utf8_lossy(&self.input[start..self.pos]).into_owned())
    }

    fn read_quoted(&mut self) -> Result<String, SnapshotError> {
        self.expect(b'"')?;
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == b'"' {
                let raw = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
                self.pos += 1;
                return Ok(unescape(&raw));
            }
            self.pos += 1;
        }
        Err(self.error("unterminated attribute value"))
    }

    fn parse_element(&mut self) -> Result<Element, SnapshotError> {
        self.expect(b'<')?;
        let name = self.read_name()?;
        let mut attributes = Vec::new();

        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b'/') => {
                    self.pos += 1;
                    self.expect(b'>')?;
                    return Ok(Element {
                        name,
                        attributes,
                        children: Vec::new(),
                    });
                }
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => {
                    let attr_name = self.read_name()?;
                    self.skip_whitespace();
                    self.expect(b'=')?;
                    self.skip_whitespace();
                    let attr_value = self.read_quoted()?;
                    attributes.push((attr_name, attr_value));
                }
                None => return Err(self.error("unexpected end of input inside tag")),
            }
        }

        let mut children = Vec::new();
        loop {
            // Text content carries no data in this format; skip to markup.
            while self.peek().is_some_and(|b| b != b'<') {
                self.pos += 1;
            }
            if self.peek().is_none() {
                return Err(self.error("unexpected end of input, unclosed element"));
            }
            if self.starts_with(b"</") {
                self.pos += 2;
                let closing = self.read_name()?;
                if closing != name {
                    return Err(self.error(&format!(
                        "mismatched closing tag '{closing}' for '{name}'"
                    )));
                }
                self.skip_whitespace();
                self.expect(b'>')?;
                return Ok(Element {
                    name,
                    attributes,
                    children,
                });
            }
            if self.starts_with(b"<!--") || self.starts_with(b"<?") {
                self.skip_misc();
                continue;
            }
            children.push(self.parse_element()?);
        }
    }
}
