//! Write-once run directories.
//!
//! Every run gets a fresh `run-<UTC timestamp>` directory. Files inside are
//! written to a temporary name and then hard-linked into place, so a reader
//! either sees a complete file or none, and an existing artifact is never
//! overwritten.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::debug;

use crate::error::{AppError, EXIT_INTERNAL};

#[derive(Debug, Clone)]
pub struct RunDirectory {
    root: PathBuf,
}

impl RunDirectory {
    /// Create `<out_dir>/run-<timestamp>`, adding a numeric suffix if that name is taken.
    pub fn create(out_dir: &Path) -> Result<Self, AppError> {
        fs::create_dir_all(out_dir).map_err(|e| {
            AppError::new(
                EXIT_INTERNAL,
                format!("Failed to create output directory '{}': {e}", out_dir.display()),
            )
        })?;

        let stamp = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        for attempt in 0..1000 {
            let name = if attempt == 0 {
                format!("run-{stamp}")
            } else {
                format!("run-{stamp}-{attempt}")
            };
            let root = out_dir.join(name);
            match fs::create_dir(&root) {
                Ok(()) => return Ok(Self { root }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(AppError::new(
                        EXIT_INTERNAL,
                        format!("Failed to create run directory '{}': {e}", root.display()),
                    ));
                }
            }
        }
        Err(AppError::new(
            EXIT_INTERNAL,
            format!("Could not find a free run directory name under '{}'.", out_dir.display()),
        ))
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn write_json<T: Serialize + ?Sized>(&self, rel: &str, value: &T) -> Result<PathBuf, AppError> {
        self.write_with(rel, |w| {
            serde_json::to_writer_pretty(&mut *w, value).map_err(|e| e.to_string())?;
            writeln!(w).map_err(|e| e.to_string())
        })
    }

    pub fn write_csv<T: Serialize>(&self, rel: &str, rows: &[T]) -> Result<PathBuf, AppError> {
        self.write_with(rel, |w| {
            let mut writer = csv::Writer::from_writer(w);
            for row in rows {
                writer.serialize(row).map_err(|e| e.to_string())?;
            }
            writer.flush().map_err(|e| e.to_string())
        })
    }

    /// Write with a header row even when `rows` is empty.
    pub fn write_csv_with_header<T: Serialize>(
        &self,
        rel: &str,
        header: &[&str],
        rows: &[T],
    ) -> Result<PathBuf, AppError> {
        if !rows.is_empty() {
            return self.write_csv(rel, rows);
        }
        self.write_with(rel, |w| {
            let mut writer = csv::Writer::from_writer(w);
            writer.write_record(header).map_err(|e| e.to_string())?;
            writer.flush().map_err(|e| e.to_string())
        })
    }

    fn write_with(
        &self,
        rel: &str,
        body: impl FnOnce(&mut BufWriter<File>) -> Result<(), String>,
    ) -> Result<PathBuf, AppError> {
        let target = self.root.join(rel);
        let fail = |what: &str, e: &dyn std::fmt::Display| {
            AppError::new(
                EXIT_INTERNAL,
                format!("Failed to {what} '{}': {e}", target.display()),
            )
        };

        let dir = target.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir).map_err(|e| fail("create directory for", &e))?;

        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = dir.join(format!(".{file_name}.{}.tmp", std::process::id()));

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp)
            .map_err(|e| fail("create temporary file for", &e))?;
        let mut writer = BufWriter::new(file);
        let written = body(&mut writer)
            .and_then(|()| writer.flush().map_err(|e| e.to_string()))
            .and_then(|()| {
                writer
                    .get_ref()
                    .sync_all()
                    .map_err(|e| e.to_string())
            });
        drop(writer);

        let linked = written.and_then(|()| fs::hard_link(&tmp, &target).map_err(|e| e.to_string()));
        let _ = fs::remove_file(&tmp);
        linked.map_err(|e| fail("write", &e))?;

        debug!(path = %target.display(), "artifact written");
        Ok(target)
    }
}
