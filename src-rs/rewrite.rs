//! The file boundary: parse, normalize, serialize canonically and replace
//! the file only when its text would change.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::ser::{Formatter, PrettyFormatter};
use serde_json::Value;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::normalize::{normalize, NormalizeOptions};

/// What happened to one dashboard file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewriteOutcome {
    pub path: PathBuf,
    /// The canonical text differs from what is on disk.
    pub changed: bool,
    pub rewritten: bool,
    pub dry_run: bool,
}

/// Two-space indent, sorted keys, ASCII only, one trailing newline.
pub fn canonical_text(document: &Value) -> Result<String> {
    let mut out = Vec::new();
    // serde_json's default map is ordered by key, which gives the sorting.
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, AsciiFormatter::default());
    document.serialize(&mut serializer)?;
    let mut text = String::from_utf8(out)?;
    text.push('\n');
    Ok(text)
}

/// Pretty printing with every character outside printable ASCII written as
/// `\uXXXX` (UTF-16 code units, so astral characters become a surrogate
/// pair).
#[derive(Default)]
struct AsciiFormatter {
    inner: PrettyFormatter<'static>,
}

impl Formatter for AsciiFormatter {
    fn begin_array<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_array(writer)
    }

    fn end_array<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_array(writer)
    }

    fn begin_array_value<W: ?Sized + Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.inner.begin_array_value(writer, first)
    }

    fn end_array_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_array_value(writer)
    }

    fn begin_object<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_object(writer)
    }

    fn end_object<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_object(writer)
    }

    fn begin_object_key<W: ?Sized + Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.inner.begin_object_key(writer, first)
    }

    fn end_object_key<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_object_key(writer)
    }

    fn begin_object_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_object_value(writer)
    }

    fn end_object_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_object_value(writer)
    }

    fn write_string_fragment<W: ?Sized + Write>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()> {
        let mut start = 0;
        for (offset, ch) in fragment.char_indices() {
            if matches!(ch, ' '..='~') {
                continue;
            }
            writer.write_all(fragment[start..offset].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{unit:04x}")?;
            }
            start = offset + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

/// Parses, normalizes and re-serializes one dashboard.
pub fn render_dashboard(original_text: &str, options: &NormalizeOptions) -> Result<String> {
    let mut document: Value = serde_json::from_str(original_text).context("invalid dashboard JSON")?;
    if !document.is_object() {
        bail!("dashboard JSON must be an object at the top level");
    }
    if normalize(&mut document, options) {
        debug!("fixes applied");
    }
    canonical_text(&document)
}

/// Normalizes the dashboard at `path` and replaces the file when the
/// canonical text differs from its current content. With `dry_run` the
/// file is never written.
pub fn rewrite_dashboard(path: &Path, options: &NormalizeOptions, dry_run: bool) -> Result<RewriteOutcome> {
    debug!(path = %path.display(), "handling dashboard");
    if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
        bail!("not a .json file: {}", path.display());
    }
    let original_text = fs::read_to_string(path)
        .with_context(|| format!("failed to read dashboard: {}", path.display()))?;
    let text = render_dashboard(&original_text, options)
        .with_context(|| format!("failed to normalize dashboard: {}", path.display()))?;

    let changed = text != original_text;
    let rewritten = changed && !dry_run;
    if rewritten {
        replace_file(path, &text)?;
    }
    Ok(RewriteOutcome {
        path: path.to_path_buf(),
        changed,
        rewritten,
        dry_run,
    })
}

/// `<name>.json` -> `<name>.json.tmp`, next to the original.
pub fn temp_path_for(path: &Path) -> PathBuf {
    path.with_extension("json.tmp")
}

/// Writes a sibling temp file and renames it over `path`, so readers see
/// either the old or the new content.
fn replace_file(path: &Path, text: &str) -> Result<()> {
    let temp = temp_path_for(path);
    fs::write(&temp, text).with_context(|| format!("failed to write temp file: {}", temp.display()))?;
    fs::rename(&temp, path)
        .with_context(|| format!("failed to replace {} with {}", path.display(), temp.display()))?;
    Ok(())
}
