//! Run directory naming, resolved-config dump and the scalar metrics log.

use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// `runs/exp` if free, else `runs/exp{n}` with `n` one past the largest
/// existing numeric suffix (starting at 2).
pub fn increment_path(base: &Path) -> anyhow::Result<PathBuf> {
    if !base.exists() {
        return Ok(base.to_path_buf());
    }
    let stem = base
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow::anyhow!("run path {} has no usable name", base.display()))?;
    let parent = match base.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut max_suffix: Option<u64> = None;
    for entry in fs::read_dir(&parent)? {
        let name = entry?.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(suffix) = name.strip_prefix(stem) else {
            continue;
        };
        if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        if let Ok(n) = suffix.parse::<u64>() {
            max_suffix = Some(max_suffix.map_or(n, |m| m.max(n)));
        }
    }
    let next = max_suffix.map_or(2, |m| m + 1);
    Ok(parent.join(format!("{stem}{next}")))
}

pub fn write_config<T: Serialize>(dir: &Path, config: &T) -> anyhow::Result<PathBuf> {
    let path = dir.join("config.json");
    let json = serde_json::to_string_pretty(config)?;
    fs::write(&path, json)?;
    Ok(path)
}

/// Appends `{"tag", "value", "step"}` JSON lines to `<run_dir>/metrics.jsonl`.
pub struct MetricsSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl MetricsSink {
    pub fn open(dir: &Path) -> anyhow::Result<Self> {
        let path = dir.join("metrics.jsonl");
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn scalar(&mut self, tag: &str, value: f32, step: usize) -> anyhow::Result<()> {
        let record = serde_json::json!({ "tag": tag, "value": value, "step": step });
        writeln!(self.writer, "{record}")?;
        Ok(())
    }

    pub fn flush(&mut self) -> anyhow::Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
