//! Snapshot persistence.
//!
//! Snapshots are named `snapshot_<YYYYMMDD_HHMMSS>.jpg` from the local wall
//! clock. Two captures inside the same second get `_1`, `_2`, ... suffixes.
//! Each JPEG is written and synced under a hidden temporary name, then
//! hard-linked to its final name, so readers never observe a partial or
//! empty snapshot.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::frame::Frame;

const JPEG_QUALITY: u8 = 90;
const MAX_COLLISION_SUFFIX: u32 = 10_000;

pub struct SnapshotWriter {
    dir: PathBuf,
    quality: u8,
}

impl SnapshotWriter {
    /// Create the writer, creating `dir` if needed.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create snapshot directory {}", dir.display()))?;
        Ok(Self {
            dir,
            quality: JPEG_QUALITY,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Encode and persist `frame`, named after the current local time.
    pub fn write(&self, frame: &Frame) -> Result<PathBuf> {
        self.write_at(frame, Local::now())
    }

    /// Encode and persist `frame` under a name derived from `taken_at`.
    pub fn write_at(&self, frame: &Frame, taken_at: DateTime<Local>) -> Result<PathBuf> {
        let jpeg = self.encode(frame)?;
        let stem = snapshot_stem(&taken_at);
        let tmp = self.write_temp(&stem, &jpeg)?;
        let published = self.publish(&tmp, &stem);
        let _ = fs::remove_file(&tmp);
        published
    }

    fn encode(&self, frame: &Frame) -> Result<Vec<u8>> {
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.quality)
            .encode(
                frame.as_bytes(),
                frame.width(),
                frame.height(),
                ExtendedColorType::Rgb8,
            )
            .context("failed to encode snapshot as JPEG")?;
        Ok(jpeg)
    }

    /// Write the complete JPEG under a hidden name no other writer holds.
    fn write_temp(&self, stem: &str, jpeg: &[u8]) -> Result<PathBuf> {
        for n in 0..MAX_COLLISION_SUFFIX {
            let tmp = self.dir.join(format!(".{}.{}.tmp", stem, n));
            match OpenOptions::new().write(true).create_new(true).open(&tmp) {
                Ok(file) => {
                    if let Err(e) = write_file(file, &tmp, jpeg) {
                        let _ = fs::remove_file(&tmp);
                        return Err(e);
                    }
                    return Ok(tmp);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(e).with_context(|| format!("failed to create {}", tmp.display()))
                }
            }
        }
        Err(anyhow!(
            "no free temporary name for {} in {}",
            stem,
            self.dir.display()
        ))
    }

    /// Link the finished temp file to the first free snapshot name.
    /// `hard_link` refuses an existing target, so names never collide and a
    /// visible snapshot is always complete.
    fn publish(&self, tmp: &Path, stem: &str) -> Result<PathBuf> {
        for n in 0..MAX_COLLISION_SUFFIX {
            let name = if n == 0 {
                format!("{}.jpg", stem)
            } else {
                format!("{}_{}.jpg", stem, n)
            };
            let target = self.dir.join(name);
            match fs::hard_link(tmp, &target) {
                Ok(()) => return Ok(target),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("failed to publish {}", target.display()))
                }
            }
        }
        Err(anyhow!(
            "no free snapshot name for {} in {}",
            stem,
            self.dir.display()
        ))
    }
}

fn write_file(file: File, path: &Path, bytes: &[u8]) -> Result<()> {
    let mut writer = BufWriter::new(file);
    writer
        .write_all(bytes)
        .and_then(|()| writer.flush())
        .with_context(|| format!("failed to write {}", path.display()))?;
    writer
        .get_ref()
        .sync_all()
        .with_context(|| format!("failed to sync {}", path.display()))?;
    Ok(())
}

/// `snapshot_YYYYMMDD_HHMMSS`
pub fn snapshot_stem(taken_at: &DateTime<Local>) -> String {
    format!("snapshot_{}", taken_at.format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn stem_uses_local_timestamp() {
        assert_eq!(snapshot_stem(&fixed_time()), "snapshot_20240309_140507");
    }

    #[test]
    fn same_second_gets_unique_names() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(dir.path()).unwrap();
        let frame = Frame::solid(16, 8, [200, 10, 10]).unwrap();

        let a = writer.write_at(&frame, fixed_time()).unwrap();
        let b = writer.write_at(&frame, fixed_time()).unwrap();
        let c = writer.write_at(&frame, fixed_time()).unwrap();

        assert_eq!(a.file_name().unwrap(), "snapshot_20240309_140507.jpg");
        assert_eq!(b.file_name().unwrap(), "snapshot_20240309_140507_1.jpg");
        assert_eq!(c.file_name().unwrap(), "snapshot_20240309_140507_2.jpg");
    }

    #[test]
    fn written_file_is_a_decodable_jpeg_without_temp_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(dir.path().join("snaps")).unwrap();
        let frame = Frame::solid(32, 24, [20, 120, 220]).unwrap();

        let path = writer.write(&frame).unwrap();
        let decoded = image::open(&path).unwrap().into_rgb8();
        assert_eq!(decoded.dimensions(), (32, 24));

        let entries: Vec<_> = fs::read_dir(writer.dir()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn taken_names_are_skipped_without_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(dir.path()).unwrap();
        let frame = Frame::solid(16, 8, [10, 200, 10]).unwrap();
        let existing = dir.path().join("snapshot_20240309_140507.jpg");
        fs::write(&existing, b"earlier").unwrap();

        let path = writer.write_at(&frame, fixed_time()).unwrap();
        assert_eq!(path.file_name().unwrap(), "snapshot_20240309_140507_1.jpg");
        assert_eq!(fs::read(&existing).unwrap(), b"earlier");

        let mut names = Vec::new();
        for entry in fs::read_dir(dir.path()).unwrap() {
            let entry = entry.unwrap();
            assert!(entry.metadata().unwrap().len() > 0);
            names.push(entry.file_name().into_string().unwrap());
        }
        names.sort();
        assert_eq!(
            names,
            ["snapshot_20240309_140507.jpg", "snapshot_20240309_140507_1.jpg"]
        );
    }
}
