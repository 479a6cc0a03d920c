//! Applications and goods: external executables the engine tracks.
//!
//! Neither takes part in dispatch. An application is registered on load and
//! started on demand (or at boot with `auto_start`); goods are companion
//! processes started as soon as they are loaded and killed on removal.

pub mod process;

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::domain::{AppDefinition, GoodsDefinition};

pub use process::ManagedProcess;

/// A registered application
#[derive(Debug)]
pub struct App {
    pub definition: AppDefinition,

    /// SHA-256 fingerprint (first 12 hex chars) of the file at load time
    pub digest: Option<String>,

    pub process: ManagedProcess,
}

impl App {
    pub async fn new(definition: AppDefinition) -> Self {
        let digest = compute_file_hash(&definition.path).await.ok();
        let process = ManagedProcess::new(
            definition.path.to_string_lossy().into_owned(),
            definition.args.clone(),
        );
        Self {
            definition,
            digest,
            process,
        }
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }
}

/// A loaded goods process
#[derive(Debug)]
pub struct Goods {
    pub definition: GoodsDefinition,
    pub process: ManagedProcess,
}

impl Goods {
    pub fn new(definition: GoodsDefinition) -> Self {
        let process = ManagedProcess::new(definition.addr.clone(), definition.args.clone());
        Self {
            definition,
            process,
        }
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }
}

/// Compute a short SHA-256 fingerprint of a file
pub async fn compute_file_hash(path: &Path) -> Result<String, std::io::Error> {
    let content = tokio::fs::read(path).await?;
    let mut hasher = Sha256::new();
    hasher.update(&content);
    let result = hasher.finalize();

    Ok(format!("{:x}", result)[..12].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_compute_file_hash() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"test content").unwrap();

        let hash = compute_file_hash(file.path()).await.unwrap();
        assert_eq!(hash.len(), 12);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, compute_file_hash(file.path()).await.unwrap());
    }

    #[tokio::test]
    async fn test_app_without_file_has_no_digest() {
        let app = App::new(AppDefinition {
            id: "APP1".to_string(),
            name: "ghost".to_string(),
            version: String::new(),
            path: "/nonexistent/app.sh".into(),
            args: Vec::new(),
            auto_start: false,
            description: String::new(),
        })
        .await;

        assert!(app.digest.is_none());
        assert!(!app.process.is_running().await);
    }
}
