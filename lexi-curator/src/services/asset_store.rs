//! Download and on-disk storage of selected images
//!
//! Layout: `<library>/<category>/<sanitized_word>.<ext>` with a JSON sidecar
//! `<file>.<ext>.json` carrying full provenance. The sidecar can be
//! regenerated from the curation record at any time.

use async_trait::async_trait;
use chrono::Utc;
use lexi_common::Result;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::CurationError;
use crate::models::CurationRecord;

const SIDECAR_VERSION: &str = "1.0";
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];
const UNCATEGORIZED: &str = "uncategorized";

/// Raw downloaded image
#[derive(Debug, Clone)]
pub struct FetchedAsset {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Fetches image bytes by URL
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> std::result::Result<FetchedAsset, CurationError>;
}

pub struct HttpAssetFetcher {
    http_client: reqwest::Client,
}

impl HttpAssetFetcher {
    pub fn new(timeout: Duration) -> std::result::Result<Self, CurationError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("lexi-curator/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| CurationError::InitializationFailure(format!("HTTP client: {}", e)))?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<FetchedAsset, CurationError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| CurationError::DownloadFailure(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(CurationError::DownloadFailure(format!(
                "{}: HTTP {}",
                url,
                response.status().as_u16()
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CurationError::DownloadFailure(format!("{}: {}", url, e)))?;

        Ok(FetchedAsset {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}

/// Where an asset landed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAsset {
    pub path: PathBuf,
    pub format: String,
    pub file_size: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryUsage {
    pub count: u64,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageStats {
    pub total_images: u64,
    pub total_size_bytes: u64,
    pub total_size_mb: f64,
    pub by_category: BTreeMap<String, CategoryUsage>,
    pub by_format: BTreeMap<String, u64>,
}

/// Image library rooted at one directory
pub struct LocalAssetStore {
    root: PathBuf,
}

impl LocalAssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write the image and its sidecar, returning the final location
    ///
    /// The file name is derived from the word; an existing file is never
    /// overwritten, a numeric suffix is appended instead.
    pub async fn store(&self, asset: &FetchedAsset, record: &CurationRecord) -> Result<StoredAsset> {
        let format = detect_format(&asset.bytes, asset.content_type.as_deref(), &record.url);
        let category = record
            .category
            .as_deref()
            .map(sanitize_filename)
            .filter(|c| c != "unnamed")
            .unwrap_or_else(|| UNCATEGORIZED.to_string());
        let dir = self.root.join(category);
        tokio::fs::create_dir_all(&dir).await?;

        let stem = sanitize_filename(&record.word);
        let mut path = dir.join(format!("{}.{}", stem, format));
        let mut suffix = 1;
        while tokio::fs::try_exists(&path).await? {
            path = dir.join(format!("{}_{}.{}", stem, suffix, format));
            suffix += 1;
        }

        tokio::fs::write(&path, &asset.bytes).await?;
        tracing::info!(word = %record.word, path = %path.display(), "Stored image");

        let stored = StoredAsset {
            path,
            format,
            file_size: asset.bytes.len() as u64,
        };
        self.write_sidecar(record, &stored).await?;
        Ok(stored)
    }

    /// `<file>.<ext>.json`
    pub fn sidecar_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(".json");
        PathBuf::from(name)
    }

    /// (Re)generate the provenance sidecar for a stored asset
    pub async fn write_sidecar(&self, record: &CurationRecord, asset: &StoredAsset) -> Result<PathBuf> {
        let sidecar = sidecar_json(record, asset);
        let path = Self::sidecar_path(&asset.path);
        tokio::fs::write(&path, serde_json::to_vec_pretty(&sidecar)?).await?;
        Ok(path)
    }

    /// Remove an image and its sidecar; false when the image was already gone
    pub async fn delete(&self, path: &Path) -> Result<bool> {
        let existed = match tokio::fs::remove_file(path).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        match tokio::fs::remove_file(Self::sidecar_path(path)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(existed)
    }

    /// Image counts and sizes per category directory and format
    pub async fn stats(&self) -> Result<StorageStats> {
        let mut stats = StorageStats::default();

        let mut categories = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(stats),
            Err(e) => return Err(e.into()),
        };

        while let Some(category) = categories.next_entry().await? {
            if !category.file_type().await?.is_dir() {
                continue;
            }
            let category_name = category.file_name().to_string_lossy().to_string();
            let mut files = tokio::fs::read_dir(category.path()).await?;

            while let Some(file) = files.next_entry().await? {
                let path = file.path();
                let Some(ext) = path.extension().and_then(|e| e.to_str()).map(str::to_lowercase) else {
                    continue;
                };
                if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
                    continue;
                }
                let size = file.metadata().await?.len();

                stats.total_images += 1;
                stats.total_size_bytes += size;
                let usage = stats.by_category.entry(category_name.clone()).or_default();
                usage.count += 1;
                usage.size_bytes += size;
                *stats.by_format.entry(ext).or_default() += 1;
            }
        }

        stats.total_size_mb = (stats.total_size_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0;
        Ok(stats)
    }
}

fn sidecar_json(record: &CurationRecord, asset: &StoredAsset) -> serde_json::Value {
    json!({
        "version": SIDECAR_VERSION,
        "generated_at": Utc::now().to_rfc3339(),
        "image": {
            "id": record.id,
            "word": record.word,
            "word_id": record.word_id,
            "lesson_id": record.lesson_id,
            "category": record.category,
            "filename": asset.path.file_name().map(|n| n.to_string_lossy().to_string()),
            "format": asset.format,
            "width": record.width,
            "height": record.height,
            "file_size": asset.file_size,
        },
        "source": {
            "provider": record.provider,
            "source_id": record.source_id,
            "url": record.url,
            "thumbnail_url": record.thumbnail_url,
            "photographer": record.photographer,
            "attribution": record.attribution,
            "license": record.license,
            "alt_text": record.alt_text,
            "tags": record.tags,
        },
        "scoring": {
            "model": record.scoring_model,
            "scored_at": record.scored_at.map(|t| t.to_rfc3339()),
            "scores": {
                "relevance": record.score_relevance,
                "clarity": record.score_clarity,
                "appropriateness": record.score_appropriateness,
                "quality": record.score_quality,
                "total": record.score_total,
            },
            "reason": record.score_reason,
        },
        "status": {
            "current": record.status.as_str(),
            "manually_verified": record.manually_verified,
            "verified_by": record.verified_by,
            "verified_at": record.verified_at.map(|t| t.to_rfc3339()),
        },
        "timestamps": {
            "created_at": record.created_at.to_rfc3339(),
            "updated_at": record.updated_at.to_rfc3339(),
        },
    })
}

/// Lowercase, spaces to underscores, only alphanumerics and underscores
pub fn sanitize_filename(word: &str) -> String {
    let sanitized: String = word
        .trim()
        .to_lowercase()
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect();

    if sanitized.is_empty() {
        "unnamed".to_string()
    } else {
        sanitized
    }
}

/// Image format: magic bytes, then content type, then URL extension, then jpg
pub fn detect_format(bytes: &[u8], content_type: Option<&str>, url: &str) -> String {
    if let Some(kind) = infer::get(bytes) {
        if kind.matcher_type() == infer::MatcherType::Image {
            return normalize_extension(kind.extension());
        }
    }

    if let Some(content_type) = content_type {
        let content_type = content_type.to_lowercase();
        for (needle, ext) in [("png", "png"), ("gif", "gif"), ("webp", "webp"), ("jpeg", "jpg"), ("jpg", "jpg")] {
            if content_type.contains(needle) {
                return ext.to_string();
            }
        }
    }

    let path = url.split(['?', '#']).next().unwrap_or(url);
    if let Some((_, ext)) = path.rsplit_once('.') {
        let ext = ext.to_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            return normalize_extension(&ext);
        }
    }

    "jpg".to_string()
}

fn normalize_extension(ext: &str) -> String {
    match ext {
        "jpeg" => "jpg".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CurationStatus;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    fn record(word: &str, category: Option<&str>, url: &str) -> CurationRecord {
        let now = Utc::now();
        CurationRecord {
            id: 7,
            word: word.to_string(),
            word_id: Some("w-3".to_string()),
            lesson_id: Some("lesson_02_numbers".to_string()),
            category: category.map(str::to_string),
            provider: "pexels".to_string(),
            source_id: Some("pexels_1".to_string()),
            url: url.to_string(),
            thumbnail_url: None,
            local_path: None,
            format: None,
            file_size: None,
            width: Some(640),
            height: Some(480),
            photographer: Some("Ana".to_string()),
            attribution: Some("Photo by Ana on Pexels".to_string()),
            license: Some("Pexels License".to_string()),
            alt_text: None,
            tags: vec!["three".to_string()],
            score_relevance: Some(10),
            score_clarity: Some(10),
            score_appropriateness: Some(10),
            score_quality: Some(10),
            score_total: Some(40),
            score_reason: Some("perfect".to_string()),
            scoring_model: Some("llava".to_string()),
            scored_at: Some(now),
            status: CurationStatus::Selected,
            manually_verified: false,
            verified_by: None,
            verified_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Bom Dia!"), "bom_dia");
        assert_eq!(sanitize_filename("três"), "três");
        assert_eq!(sanitize_filename("  ?! "), "unnamed");
    }

    #[test]
    fn test_detect_format_order() {
        assert_eq!(detect_format(PNG_MAGIC, Some("image/jpeg"), "https://x/a.gif"), "png");
        assert_eq!(detect_format(b"????", Some("image/webp"), "https://x/a.gif"), "webp");
        assert_eq!(detect_format(b"????", None, "https://x/a.JPEG?w=640"), "jpg");
        assert_eq!(detect_format(b"????", None, "https://x/photo"), "jpg");
    }

    #[tokio::test]
    async fn test_store_writes_image_and_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalAssetStore::new(dir.path());
        let asset = FetchedAsset {
            bytes: PNG_MAGIC.to_vec(),
            content_type: None,
        };

        let stored = store
            .store(&asset, &record("três", Some("numbers"), "https://x/1"))
            .await
            .unwrap();
        assert_eq!(stored.path, dir.path().join("numbers").join("três.png"));
        assert_eq!(stored.file_size, PNG_MAGIC.len() as u64);

        let sidecar_path = LocalAssetStore::sidecar_path(&stored.path);
        assert!(sidecar_path.ends_with("três.png.json"));
        let sidecar: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&sidecar_path).unwrap()).unwrap();
        assert_eq!(sidecar["version"], "1.0");
        assert_eq!(sidecar["source"]["license"], "Pexels License");
        assert_eq!(sidecar["scoring"]["scores"]["total"], 40);
        assert_eq!(sidecar["status"]["current"], "selected");
    }

    #[tokio::test]
    async fn test_collisions_get_numeric_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalAssetStore::new(dir.path());
        let asset = FetchedAsset {
            bytes: b"jpeg-ish".to_vec(),
            content_type: Some("image/jpeg".to_string()),
        };
        let rec = record("bom dia", None, "https://x/1");

        let first = store.store(&asset, &rec).await.unwrap();
        let second = store.store(&asset, &rec).await.unwrap();
        let third = store.store(&asset, &rec).await.unwrap();
        assert!(first.path.ends_with("uncategorized/bom_dia.jpg"));
        assert!(second.path.ends_with("uncategorized/bom_dia_1.jpg"));
        assert!(third.path.ends_with("uncategorized/bom_dia_2.jpg"));
    }

    #[tokio::test]
    async fn test_stats_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalAssetStore::new(dir.path());
        let png = FetchedAsset {
            bytes: PNG_MAGIC.to_vec(),
            content_type: None,
        };

        let a = store.store(&png, &record("um", Some("numbers"), "u1")).await.unwrap();
        store.store(&png, &record("olá", Some("greetings"), "u2")).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_images, 2, "sidecars are not counted");
        assert_eq!(stats.by_format.get("png"), Some(&2));
        assert_eq!(stats.by_category["numbers"].count, 1);

        assert!(store.delete(&a.path).await.unwrap());
        assert!(!LocalAssetStore::sidecar_path(&a.path).exists());
        assert!(!store.delete(&a.path).await.unwrap());
        assert_eq!(store.stats().await.unwrap().total_images, 1);
    }
}
