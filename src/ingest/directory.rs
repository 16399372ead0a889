//! Image-directory replay source.
//!
//! Plays back the JPEG/PNG files of a local directory in file-name order, one
//! frame per file. Useful for replaying recorded drops on a bench without a
//! camera attached. The source is exhausted after the last file.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use super::{CaptureSource, SourceStats};
use crate::frame::Frame;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

pub struct DirectorySource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next_index: usize,
    frame_count: u64,
    connected: bool,
}

impl DirectorySource {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            files: Vec::new(),
            next_index: 0,
            frame_count: 0,
            connected: false,
        }
    }

    /// Files queued for replay, in playback order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

impl CaptureSource for DirectorySource {
    fn name(&self) -> &str {
        "directory"
    }

    fn connect(&mut self) -> Result<()> {
        let mut files = Vec::new();
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("failed to read image directory {}", self.dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && is_image_file(&path) {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(anyhow!("no images found in {}", self.dir.display()));
        }
        files.sort();
        log::info!(
            "DirectorySource: replaying {} images from {}",
            files.len(),
            self.dir.display()
        );
        self.files = files;
        self.next_index = 0;
        self.connected = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.connected {
            return Err(anyhow!("directory source not connected; call connect() first"));
        }
        let Some(path) = self.files.get(self.next_index).cloned() else {
            return Ok(None);
        };
        self.next_index += 1;

        // A bad file is reported once and skipped; the replay stays healthy.
        let image = image::open(&path)
            .with_context(|| format!("failed to decode {}", path.display()))?;
        let frame = Frame::from_image(image.into_rgb8())?;
        self.frame_count += 1;
        Ok(Some(frame))
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.dir.display().to_string(),
        }
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_image(dir: &Path, name: &str, rgb: [u8; 3]) {
        image::RgbImage::from_pixel(16, 12, image::Rgb(rgb))
            .save(dir.join(name))
            .unwrap();
    }

    #[test]
    fn replays_images_in_name_order_then_ends() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "b.png", [0, 255, 0]);
        write_image(dir.path(), "a.png", [255, 0, 0]);
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut source = DirectorySource::new(dir.path());
        source.connect().unwrap();
        assert_eq!(source.files().len(), 2);

        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.pixel(0, 0), [255, 0, 0]);
        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(second.pixel(0, 0), [0, 255, 0]);
        assert!(source.next_frame().unwrap().is_none());
        assert_eq!(source.stats().frames_captured, 2);
    }

    #[test]
    fn empty_directory_fails_to_connect() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = DirectorySource::new(dir.path());
        assert!(source.connect().is_err());
    }

    #[test]
    fn corrupt_image_is_an_error_and_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"not an image").unwrap();
        write_image(dir.path(), "b.png", [1, 2, 3]);

        let mut source = DirectorySource::new(dir.path());
        source.connect().unwrap();
        assert!(source.next_frame().is_err());
        assert!(source.is_healthy());
        assert_eq!(source.next_frame().unwrap().unwrap().pixel(0, 0), [1, 2, 3]);
        assert!(source.next_frame().unwrap().is_none());
    }
}
