use anyhow::Result;
use std::path::PathBuf;
use tokio::fs;
use tracing::info;

/// On-disk storage for uploaded image/audio payloads.
///
/// Each upload is written once under `{dir}/{uuid}-{original name}`; the
/// returned path string is what gets persisted as the submission's content
/// reference. Files are never deleted (submissions have no retention logic).
pub struct MediaStore {
    dir: PathBuf,
}

impl MediaStore {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Media storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    /// Write an upload to disk and return its stored path.
    ///
    /// The original filename is kept (sanitized) so the extension survives
    /// for MIME guessing; a UUID prefix keeps names collision-free.
    pub async fn save(&self, original_name: &str, bytes: &[u8]) -> Result<String> {
        let name = format!("{}-{}", uuid::Uuid::new_v4(), sanitize(original_name));
        let path = self.dir.join(&name);
        fs::write(&path, bytes).await?;
        Ok(path.to_string_lossy().into_owned())
    }
}

/// Keep only the final path component and drop anything shell-hostile.
fn sanitize(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("upload");
    let cleaned: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}
