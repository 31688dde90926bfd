use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone};
use tracing::info;

use crate::capture::Frame;
use crate::error::{CaptureError, Result};
use crate::{SnapshotConfig, SnapshotFormat};

/// Second-precision name, e.g. `2024-05-01-07-30-12AI.png`.
pub fn snapshot_name<Tz: TimeZone>(at: &DateTime<Tz>, ai_triggered: bool, extension: &str) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{}{}.{}",
        at.format("%Y-%m-%d-%H-%M-%S"),
        if ai_triggered { "AI" } else { "" },
        extension
    )
}

/// Writes frames as timestamped image files into one directory.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    directory: PathBuf,
    format: SnapshotFormat,
}

impl SnapshotWriter {
    pub fn new(config: &SnapshotConfig) -> Self {
        Self {
            directory: config.directory.clone(),
            format: config.format,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Write `frame` stamped with the current local time.
    pub fn write(&self, frame: &Frame, ai_triggered: bool) -> Result<PathBuf> {
        self.write_at(frame, ai_triggered, &Local::now())
    }

    /// Write `frame` stamped with `at`. A file already holding that second
    /// is left alone; the new one gets a `-1`, `-2`, … suffix.
    pub fn write_at<Tz: TimeZone>(
        &self,
        frame: &Frame,
        ai_triggered: bool,
        at: &DateTime<Tz>,
    ) -> Result<PathBuf>
    where
        Tz::Offset: std::fmt::Display,
    {
        fs::create_dir_all(&self.directory)?;

        let image = frame.to_rgb_image()?;
        let extension = self.format.extension();
        let name = snapshot_name(at, ai_triggered, extension);
        let stem = name.trim_end_matches(&format!(".{extension}")).to_string();

        let mut attempt = 0u32;
        let (path, file) = loop {
            let path = if attempt == 0 {
                self.directory.join(&name)
            } else {
                self.directory.join(format!("{stem}-{attempt}.{extension}"))
            };
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break (path, file),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(CaptureError::Io(e)),
            }
        };

        let mut out = BufWriter::new(file);
        if let Err(e) = image.write_to(&mut out, self.format.image_format()) {
            drop(out);
            let _ = fs::remove_file(&path);
            return Err(e.into());
        }
        out.into_inner().map_err(|e| CaptureError::Io(e.into_error()))?;

        info!(
            "image successfully saved to {}, ai_triggered={}",
            path.display(),
            ai_triggered
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::PixelFormat;
    use chrono::NaiveDate;

    fn frame() -> Frame {
        Frame::from_rgb(vec![90u8; 4 * 3 * 3], 4, 3, 1, PixelFormat::Rgb24).unwrap()
    }

    fn instant() -> DateTime<Local> {
        let naive = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(7, 30, 12)
            .unwrap();
        Local.from_local_datetime(&naive).earliest().unwrap()
    }

    fn writer(dir: &Path, format: SnapshotFormat) -> SnapshotWriter {
        SnapshotWriter::new(&SnapshotConfig {
            directory: dir.to_path_buf(),
            format,
            ..SnapshotConfig::default()
        })
    }

    #[test]
    fn ai_snapshot_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = writer(dir.path(), SnapshotFormat::Png)
            .write_at(&frame(), true, &instant())
            .unwrap();

        assert_eq!(path.file_name().unwrap(), "2024-05-01-07-30-12AI.png");
        let decoded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (4, 3));
        assert_eq!(decoded.get_pixel(0, 0).0, [90, 90, 90]);
    }

    #[test]
    fn manual_snapshot_has_no_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = writer(dir.path(), SnapshotFormat::Jpeg)
            .write_at(&frame(), false, &instant())
            .unwrap();
        assert_eq!(path.file_name().unwrap(), "2024-05-01-07-30-12.jpg");
    }

    #[test]
    fn same_second_collisions_get_a_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(dir.path(), SnapshotFormat::Png);

        let first = writer.write_at(&frame(), true, &instant()).unwrap();
        let second = writer.write_at(&frame(), true, &instant()).unwrap();
        let third = writer.write_at(&frame(), true, &instant()).unwrap();

        assert_eq!(first.file_name().unwrap(), "2024-05-01-07-30-12AI.png");
        assert_eq!(second.file_name().unwrap(), "2024-05-01-07-30-12AI-1.png");
        assert_eq!(third.file_name().unwrap(), "2024-05-01-07-30-12AI-2.png");
    }

    #[test]
    fn creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("images").join("garden");
        let path = writer(&nested, SnapshotFormat::Png).write(&frame(), false).unwrap();
        assert!(path.starts_with(&nested));
        assert!(path.exists());
    }

    #[test]
    fn unwritable_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let err = writer(&blocker, SnapshotFormat::Png)
            .write(&frame(), true)
            .unwrap_err();
        assert!(matches!(err, CaptureError::Io(_)));
    }
}
