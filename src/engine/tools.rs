//! Path, ordering and template utilities

use anyhow::{Context, Result, bail};
use chrono::{NaiveDateTime, Timelike};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// Convert absolute path to relative path from base
pub fn path_relative_to(path: &Path, base: &Path) -> Option<PathBuf> {
    path.strip_prefix(base).ok().map(|p| p.to_path_buf())
}

/// Path shown in logs and status lines: relative to `root` when it is inside it, as-is otherwise.
pub fn display_relative(path: &Path, root: Option<&Path>) -> String {
    root.and_then(|r| path_relative_to(path, r))
        .filter(|rel| !rel.as_os_str().is_empty())
        .unwrap_or_else(|| path.to_path_buf())
        .display()
        .to_string()
}

/// Check if a file should be excluded based on OS-specific hidden files
pub fn is_os_hidden_file(path: &Path) -> bool {
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        match name {
            // macOS
            ".DS_Store" | ".AppleDouble" | ".LSOverride" => true,
            // Windows
            "Thumbs.db" | "ehthumbs.db" | "Desktop.ini" | "$RECYCLE.BIN" => true,
            // Linux
            ".directory" => true,
            _ => {
                // macOS resource fork files start with ._
                name.starts_with("._") || name.starts_with(".Trash-")
            }
        }
    } else {
        false
    }
}

/// True if `path`'s extension (lowercased, with dot) is in `allowed`.
pub fn has_allowed_extension(path: &Path, allowed: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext = format!(".{}", ext.to_lowercase());
    allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext))
}

/// `JPG`, `.jpg` and ` .Jpg ` all become `.jpg`. Empty entries are dropped.
pub fn normalize_extensions<S: AsRef<str>>(exts: &[S]) -> Vec<String> {
    exts.iter()
        .map(|e| e.as_ref().trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .map(|e| format!(".{e}"))
        .collect()
}

/// Canonicalize and require a directory.
pub fn canonicalize_dir(path: &Path) -> Result<PathBuf> {
    let canonical = path
        .canonicalize()
        .with_context(|| format!("canonicalize {}", path.display()))?;
    if !canonical.is_dir() {
        bail!("not a directory: {}", canonical.display());
    }
    Ok(canonical)
}

// ---- Artifact layout ----

/// Maps an input file to its primary and error artifacts:
/// `<input_root>/rel/x.jpg` -> `<output_root>/rel/x.jpg<suffix>`.
#[derive(Clone, Debug)]
pub struct ArtifactLayout {
    input_root: PathBuf,
    output_root: PathBuf,
    suffix: String,
    error_suffix: String,
}

impl ArtifactLayout {
    pub fn new(
        input_root: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
        suffix: impl Into<String>,
        error_suffix: impl Into<String>,
    ) -> Self {
        Self {
            input_root: input_root.into(),
            output_root: output_root.into(),
            suffix: suffix.into(),
            error_suffix: error_suffix.into(),
        }
    }

    /// Same roots, different suffixes (e.g. the enhance pipeline reading describe artifacts).
    pub fn with_suffixes(&self, suffix: &str, error_suffix: &str) -> Self {
        Self::new(
            self.input_root.clone(),
            self.output_root.clone(),
            suffix,
            error_suffix,
        )
    }

    pub fn input_root(&self) -> &Path {
        &self.input_root
    }

    fn with_suffix(&self, input: &Path, suffix: &str) -> PathBuf {
        // Files outside the input root get their artifact next to themselves.
        let base = match path_relative_to(input, &self.input_root) {
            Some(rel) => self.output_root.join(rel),
            None => input.to_path_buf(),
        };
        let mut name = base.into_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }

    pub fn primary(&self, input: &Path) -> PathBuf {
        self.with_suffix(input, &self.suffix)
    }

    pub fn error(&self, input: &Path) -> PathBuf {
        self.with_suffix(input, &self.error_suffix)
    }
}

// ---- Ordering ----

#[derive(Debug, PartialEq, Eq)]
enum Chunk<'a> {
    Text(String),
    Number(&'a str),
}

fn chunks(s: &str) -> Vec<Chunk<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut digits = false;
    for (i, c) in s.char_indices() {
        let d = c.is_ascii_digit();
        if i > start && d != digits {
            out.push(chunk(&s[start..i], digits));
            start = i;
        }
        if i == start {
            digits = d;
        }
    }
    if start < s.len() {
        out.push(chunk(&s[start..], digits));
    }
    out
}

fn chunk(s: &str, digits: bool) -> Chunk<'_> {
    if digits {
        Chunk::Number(s)
    } else {
        Chunk::Text(s.to_lowercase())
    }
}

fn cmp_numbers(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Case-insensitive comparison where digit runs compare by value: `img2` < `img10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (ca, cb) = (chunks(a), chunks(b));
    for (x, y) in ca.iter().zip(cb.iter()) {
        let ord = match (x, y) {
            (Chunk::Number(x), Chunk::Number(y)) => cmp_numbers(x, y),
            (Chunk::Text(x), Chunk::Text(y)) => x.cmp(y),
            (Chunk::Number(_), Chunk::Text(_)) => Ordering::Less,
            (Chunk::Text(_), Chunk::Number(_)) => Ordering::Greater,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    ca.len().cmp(&cb.len())
}

/// Case-insensitive plain string comparison.
pub fn lexicographic_cmp(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

// ---- Templates ----

/// Replace each `{key}` in `template` with its value. Unknown placeholders are left untouched.
/// Single pass, so substituted values are never expanded again.
pub fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let value = tail.find('}').and_then(|close| {
            let key = &tail[1..close];
            values
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v, close))
        });
        match value {
            Some((v, close)) => {
                out.push_str(v);
                rest = &tail[close + 1..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// First `max_chars` characters of `s`, with `...` appended when anything was cut.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// `YYYY-MM-DD HH:MM:SS`, or just the date when the time is exactly midnight.
pub fn format_datetime(dt: &NaiveDateTime) -> String {
    if dt.hour() == 0 && dt.minute() == 0 && dt.second() == 0 {
        dt.format("%Y-%m-%d").to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

