//! Blob storage and SFX asset resolution.
//!
//! URIs are opaque strings to the rest of the pipeline. The local-filesystem
//! implementation treats them as paths relative to a root directory, which
//! is enough for chunk tests and the offline debug binary.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::debug;

use crate::audio::AudioClip;

#[derive(Debug, Clone)]
pub enum AudioStore {
    LocalFs { root: PathBuf },
}

impl AudioStore {
    pub fn local(root: impl Into<PathBuf>) -> Self {
        AudioStore::LocalFs { root: root.into() }
    }

    fn resolve(&self, uri: &str) -> Result<PathBuf> {
        if uri.is_empty() {
            bail!("Empty storage URI");
        }
        match self {
            AudioStore::LocalFs { root } => Ok(root.join(uri)),
        }
    }

    pub async fn download(&self, uri: &str) -> Result<Vec<u8>> {
        let path = self.resolve(uri)?;
        std::fs::read(&path).with_context(|| format!("Failed to download {}", uri))
    }

    /// Store bytes at a caller-chosen URI and return the URI that can be
    /// used to retrieve them. Uploads to an existing URI overwrite it.
    pub async fn upload(&self, bytes: &[u8], uri: &str, _content_type: &str) -> Result<String> {
        let path = self.resolve(uri)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory for {}", uri))?;
        }
        // Write to a sidecar first, then move into place, so a poller never
        // sees a half-written artifact.
        let tmp = path.with_extension("partial");
        std::fs::write(&tmp, bytes).with_context(|| format!("Failed to upload {}", uri))?;
        std::fs::rename(&tmp, &path).with_context(|| format!("Failed to finalize {}", uri))?;
        debug!("uploaded {} bytes to {}", bytes.len(), uri);
        Ok(uri.to_string())
    }

    pub async fn exists(&self, uri: &str) -> bool {
        self.resolve(uri).map(|p| p.exists()).unwrap_or(false)
    }
}

/// Maps configured SFX file names to audio clips under a media root.
#[derive(Debug, Clone)]
pub struct SfxStore {
    media_root: PathBuf,
}

impl SfxStore {
    pub fn new(media_root: impl Into<PathBuf>) -> Self {
        SfxStore { media_root: media_root.into() }
    }

    pub fn path_for(&self, file: &str) -> PathBuf {
        self.media_root.join(file)
    }

    pub fn load(&self, file: &str) -> Result<AudioClip> {
        let path = self.path_for(file);
        let bytes = std::fs::read(&path)
            .with_context(|| format!("Failed to read SFX asset {}", path.display()))?;
        AudioClip::from_wav_bytes(&bytes)
            .with_context(|| format!("Failed to decode SFX asset {}", file))
    }
}

/// Absolute-path convenience used by the debug binary.
pub fn read_wav_file(path: &Path) -> Result<AudioClip> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    AudioClip::from_wav_bytes(&bytes)
        .with_context(|| format!("Failed to decode {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_store_round_trip() {
        let dir = std::env::temp_dir().join(format!("podtrim_store_{}", uuid::Uuid::new_v4()));
        let store = AudioStore::local(&dir);

        assert!(!store.exists("a/b.bin").await);
        let uri = store.upload(b"hello", "a/b.bin", "application/octet-stream").await.unwrap();
        assert_eq!(uri, "a/b.bin");
        assert!(store.exists("a/b.bin").await);
        assert_eq!(store.download("a/b.bin").await.unwrap(), b"hello");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn empty_uri_is_rejected() {
        let store = AudioStore::local(std::env::temp_dir());
        assert!(store.upload(b"x", "", "audio/wav").await.is_err());
        assert!(!store.exists("").await);
    }

    #[test]
    fn sfx_store_missing_asset_errors() {
        let sfx = SfxStore::new(std::env::temp_dir().join("podtrim_missing_media"));
        assert!(sfx.load("nope.wav").is_err());
    }
}
