//! Directory-backed gallery of reference face images.
//!
//! One directory per identity under the gallery root, numbered image
//! files within:
//!
//! ```text
//! known_faces/
//!   Alice/
//!     1.jpg
//!     2.jpg
//!   Bob/
//!     1.png
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use image::ImageFormat;
use thiserror::Error;

use rollcall_core::{Identity, IdentityError, ReferenceImage};

#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("invalid identity: {0}")]
    InvalidIdentity(#[from] IdentityError),
    #[error("no reference images supplied")]
    NoImage,
    #[error("image {image_index} is not JPEG or PNG")]
    UnsupportedImage { image_index: usize },
    #[error("gallery storage at {}: {source}", .path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl GalleryError {
    fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GalleryError::Storage { path: path.into(), source }
    }
}

/// Repository interface over reference-image storage.
pub trait GalleryStore: Send + Sync {
    /// Store `images` under `name`, appending to any existing set.
    /// Returns how many files were written. A refused registration
    /// leaves the gallery unchanged.
    fn register(&self, name: &str, images: &[Vec<u8>]) -> Result<usize, GalleryError>;

    /// Identities currently present, sorted by name.
    fn list_identities(&self) -> Result<Vec<Identity>, GalleryError>;

    /// Every reference image of every identity, identity-sorted, files
    /// in numeric order.
    fn load_all(&self) -> Result<Vec<ReferenceImage>, GalleryError>;
}

/// Galleries rooted in a local directory.
pub struct FsGallery {
    root: PathBuf,
}

impl FsGallery {
    /// Open a gallery rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, GalleryError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| GalleryError::storage(&root, e))?;
        Ok(FsGallery { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn identity_dir(&self, identity: &Identity) -> PathBuf {
        self.root.join(identity.as_str())
    }
}

impl GalleryStore for FsGallery {
    fn register(&self, name: &str, images: &[Vec<u8>]) -> Result<usize, GalleryError> {
        let identity = Identity::new(name)?;
        if images.is_empty() {
            return Err(GalleryError::NoImage);
        }
        // Validate every image before the first write so a refused
        // registration leaves no trace.
        let extensions = images
            .iter()
            .enumerate()
            .map(|(i, bytes)| image_extension(bytes).ok_or(GalleryError::UnsupportedImage { image_index: i }))
            .collect::<Result<Vec<_>, _>>()?;

        let dir = self.identity_dir(&identity);
        fs::create_dir_all(&dir).map_err(|e| GalleryError::storage(&dir, e))?;
        let start = next_index(&dir)?;

        for (offset, (bytes, ext)) in images.iter().zip(extensions).enumerate() {
            let path = dir.join(format!("{}.{ext}", start + offset as u32));
            fs::write(&path, bytes).map_err(|e| GalleryError::storage(&path, e))?;
        }
        tracing::info!(
            identity = %identity,
            count = images.len(),
            "registered reference images"
        );
        Ok(images.len())
    }

    fn list_identities(&self) -> Result<Vec<Identity>, GalleryError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(|e| GalleryError::storage(&self.root, e))? {
            let entry = entry.map_err(|e| GalleryError::storage(&self.root, e))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let dir_name = entry.file_name();
            let Some(dir_name) = dir_name.to_str() else { continue };
            match Identity::new(dir_name) {
                // A directory whose name does not survive validation
                // unchanged was not created by us; leave it alone.
                Ok(identity) if identity.as_str() == dir_name => names.push(identity),
                _ => tracing::warn!(directory = dir_name, "ignoring foreign directory in gallery"),
            }
        }
        names.sort();
        Ok(names)
    }

    fn load_all(&self) -> Result<Vec<ReferenceImage>, GalleryError> {
        let mut images = Vec::new();
        for identity in self.list_identities()? {
            let dir = self.identity_dir(&identity);
            for (path, file_name) in image_files(&dir)? {
                let bytes = fs::read(&path).map_err(|e| GalleryError::storage(&path, e))?;
                images.push(ReferenceImage {
                    identity: identity.clone(),
                    label: format!("{identity}/{file_name}"),
                    bytes,
                });
            }
        }
        Ok(images)
    }
}

/// File extension for recognized image data, `None` for anything that is
/// not JPEG or PNG.
fn image_extension(bytes: &[u8]) -> Option<&'static str> {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) => Some("jpg"),
        Ok(ImageFormat::Png) => Some("png"),
        _ => None,
    }
}

/// Next free image index: one past the highest numeric stem present.
/// Indices continue past gaps so a deleted file's name is never reused.
fn next_index(dir: &Path) -> Result<u32, GalleryError> {
    let mut max = 0u32;
    for entry in fs::read_dir(dir).map_err(|e| GalleryError::storage(dir, e))? {
        let entry = entry.map_err(|e| GalleryError::storage(dir, e))?;
        if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
            if let Ok(n) = stem.parse::<u32>() {
                max = max.max(n);
            }
        }
    }
    Ok(max + 1)
}

/// Image files in `dir`, numeric stems first in numeric order, anything
/// else after in name order.
fn image_files(dir: &Path) -> Result<Vec<(PathBuf, String)>, GalleryError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| GalleryError::storage(dir, e))? {
        let entry = entry.map_err(|e| GalleryError::storage(dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("jpg" | "jpeg" | "png") => files.push((path, file_name)),
            _ => tracing::debug!(file = %file_name, "ignoring non-image file in gallery"),
        }
    }
    files.sort_by_key(|(_, name)| file_sort_key(name));
    Ok(files)
}

fn file_sort_key(file_name: &str) -> (u32, String) {
    let stem = file_name.split('.').next().unwrap_or(file_name);
    match stem.parse::<u32>() {
        Ok(n) => (n, String::new()),
        Err(_) => (u32::MAX, file_name.to_string()),
    }
}
