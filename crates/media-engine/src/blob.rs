//! In-memory media content.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use cliprelay_common::error::{RelayError, RelayResult};

/// Binary media content with an optional MIME type.
///
/// Cloning is cheap; the bytes are shared.
#[derive(Clone, PartialEq, Eq)]
pub struct MediaBlob {
    data: Arc<[u8]>,
    content_type: Option<String>,
}

impl MediaBlob {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Arc::from(data.into()),
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Read a local file, guessing the content type from its extension.
    pub async fn from_file(path: &Path) -> RelayResult<Self> {
        let data = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => RelayError::FileNotFound {
                path: path.to_path_buf(),
            },
            _ => RelayError::Io(e),
        })?;
        let blob = Self::new(data);
        Ok(match content_type_for_path(path) {
            Some(ct) => blob.with_content_type(ct),
            None => blob,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Container used for this blob's input and extracted segments.
    pub fn container(&self) -> Container {
        Container::detect(self.content_type(), self.bytes())
    }

    pub fn size_mb(&self) -> f64 {
        self.len() as f64 / 1024.0 / 1024.0
    }
}

impl fmt::Debug for MediaBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaBlob")
            .field("len", &self.len())
            .field("content_type", &self.content_type)
            .finish()
    }
}

/// Output container family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Container {
    Mp4,
    Webm,
}

impl Container {
    /// MP4/QuickTime by MIME type or `ftyp` box; everything else is treated
    /// as WebM/Matroska.
    pub fn detect(content_type: Option<&str>, bytes: &[u8]) -> Self {
        match content_type {
            Some("video/mp4") | Some("video/quicktime") => return Self::Mp4,
            Some("video/webm") | Some("video/x-matroska") => return Self::Webm,
            _ => {}
        }
        if bytes.len() >= 8 && &bytes[4..8] == b"ftyp" {
            Self::Mp4
        } else {
            Self::Webm
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Mp4 => "video/mp4",
            Self::Webm => "video/webm",
        }
    }
}

/// MIME type for common video file extensions.
pub fn content_type_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "mp4" | "m4v" => Some("video/mp4"),
        "mov" => Some("video/quicktime"),
        "webm" => Some("video/webm"),
        "mkv" => Some("video/x-matroska"),
        _ => None,
    }
}
