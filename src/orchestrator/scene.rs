//! Temporary on-disk handle for the currently displayed scene image

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;

/// The scene image, materialized as a temp file for the UI to display
///
/// Handles are released explicitly with [`SceneImage::release`] before a
/// replacement is created. Dropping one also removes the file.
#[derive(Debug)]
pub struct SceneImage {
    file: NamedTempFile,
    data: Arc<[u8]>,
    mime_type: String,
}

impl SceneImage {
    pub fn create(dir: &Path, data: Arc<[u8]>, mime_type: &str) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let mut file = tempfile::Builder::new()
            .prefix("scene-")
            .suffix(extension_for(mime_type))
            .tempfile_in(dir)?;
        file.write_all(&data)?;
        file.flush()?;
        Ok(Self {
            file,
            data,
            mime_type: mime_type.to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn data(&self) -> Arc<[u8]> {
        Arc::clone(&self.data)
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Close and delete the backing file
    pub fn release(self) -> io::Result<()> {
        self.file.close()
    }
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" => ".jpg",
        "image/webp" => ".webp",
        "image/gif" => ".gif",
        _ => ".png",
    }
}
