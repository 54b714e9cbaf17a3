//! Lead Image Service
//!
//! Stores uploaded photos under `<image_dir>/lead_<id>/<hash>.<ext>` and
//! hands out time-limited signed URLs for them:
//!
//! ```text
//! lead-image://<file ref>?expires=<unix secs>&sig=<base64url blake3 keyed hash>
//! ```

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::domain::{DomainError, DomainResult, LeadId, LeadImage, LeadImageView, SignedUrl};
use crate::repository::{ImageRepository, Repository};

pub const URL_SCHEME: &str = "lead-image://";

const KEY_CONTEXT: &str = "roof-finder 2024 lead image url signing";

/// Keep path separators readable in file refs
const FILE_REF: &AsciiSet = &NON_ALPHANUMERIC.remove(b'/').remove(b'.').remove(b'_').remove(b'-');

pub struct ImageService {
    repo: Arc<ImageRepository>,
    storage_dir: PathBuf,
    signing_key: [u8; 32],
    url_ttl_secs: i64,
}

impl ImageService {
    pub fn new(
        repo: Arc<ImageRepository>,
        storage_dir: impl Into<PathBuf>,
        signing_secret: &str,
        url_ttl_secs: u64,
    ) -> Self {
        Self {
            repo,
            storage_dir: storage_dir.into(),
            signing_key: blake3::derive_key(KEY_CONTEXT, signing_secret.as_bytes()),
            url_ttl_secs: i64::try_from(url_ttl_secs).unwrap_or(i64::MAX / 2),
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Store a photo for a lead
    ///
    /// The content type is guessed from `file_name` and must be an image.
    pub async fn upload(
        &self,
        lead_id: LeadId,
        file_name: &str,
        bytes: Vec<u8>,
        description: Option<String>,
    ) -> DomainResult<LeadImageView> {
        if bytes.is_empty() {
            return Err(DomainError::Validation("Image file is empty".into()));
        }
        let mime = mime_guess::from_path(file_name)
            .first()
            .filter(|mime| mime.type_() == mime_guess::mime::IMAGE)
            .ok_or_else(|| {
                DomainError::Validation(format!("{} is not a supported image file", file_name))
            })?;
        if !self.repo.lead_exists(lead_id).await? {
            return Err(DomainError::NotFound(format!("Lead {} not found", lead_id)));
        }

        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_else(|| mime.subtype().as_str().to_string());
        let mut hasher = blake3::Hasher::new();
        hasher.update(&bytes);
        hasher.update(&chrono::Utc::now().timestamp_millis().to_le_bytes());
        let hash = hasher.finalize().to_hex();
        let file_ref = format!("lead_{}/{}.{}", lead_id, &hash.as_str()[..32], extension);

        let path = self.storage_dir.join(&file_ref);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&path, &bytes).await.map_err(io_err)?;

        let mut record = LeadImage::new(0, lead_id, file_ref, mime.essence_str().to_string());
        record.description = description.filter(|d| !d.trim().is_empty());
        let image = match self.repo.create(&record).await {
            Ok(image) => image,
            Err(e) => {
                remove_file(&path).await;
                return Err(e);
            }
        };

        log::info!("Stored image {} for lead {} ({} bytes)", image.id, lead_id, bytes.len());
        Ok(self.view(image))
    }

    /// A lead's images with fresh signed URLs
    pub async fn list(&self, lead_id: LeadId) -> DomainResult<Vec<LeadImageView>> {
        if !self.repo.lead_exists(lead_id).await? {
            return Err(DomainError::NotFound(format!("Lead {} not found", lead_id)));
        }
        let images = self.repo.list_for_lead(lead_id).await?;
        Ok(images.into_iter().map(|image| self.view(image)).collect())
    }

    /// Delete one image; it must belong to `lead_id`
    pub async fn delete(&self, lead_id: LeadId, image_id: i64) -> DomainResult<()> {
        let image = self
            .repo
            .find_by_id(image_id)
            .await?
            .filter(|image| image.lead_id == lead_id)
            .ok_or_else(|| {
                DomainError::NotFound(format!("Image {} not found on lead {}", image_id, lead_id))
            })?;

        self.repo.delete(image.id).await?;
        remove_file(&self.storage_dir.join(&image.file_ref)).await;
        log::info!("Deleted image {} of lead {}", image_id, lead_id);
        Ok(())
    }

    /// Remove every file of a lead before the lead itself is deleted
    ///
    /// Rows go with the lead (cascade); returns how many images there were.
    pub async fn delete_all_for_lead(&self, lead_id: LeadId) -> DomainResult<usize> {
        let images = self.repo.list_for_lead(lead_id).await?;
        for image in &images {
            remove_file(&self.storage_dir.join(&image.file_ref)).await;
        }
        let dir = self.storage_dir.join(format!("lead_{}", lead_id));
        if tokio::fs::metadata(&dir).await.is_ok() {
            if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
                log::warn!("Failed to remove image dir {}: {}", dir.display(), e);
            }
        }
        Ok(images.len())
    }

    pub fn sign(&self, file_ref: &str) -> SignedUrl {
        self.sign_at(file_ref, chrono::Utc::now().timestamp())
    }

    /// Check a signed URL and map it to the file on disk
    pub fn resolve_signed_url(&self, url: &str) -> DomainResult<PathBuf> {
        self.resolve_at(url, chrono::Utc::now().timestamp())
    }

    fn view(&self, image: LeadImage) -> LeadImageView {
        let signed_url = self.sign(&image.file_ref);
        LeadImageView { image, signed_url }
    }

    fn sign_at(&self, file_ref: &str, now: i64) -> SignedUrl {
        let expires_at = now.saturating_add(self.url_ttl_secs);
        let signature = self.signature(file_ref, expires_at);
        SignedUrl {
            url: format!(
                "{}{}?expires={}&sig={}",
                URL_SCHEME,
                utf8_percent_encode(file_ref, FILE_REF),
                expires_at,
                URL_SAFE_NO_PAD.encode(signature.as_bytes())
            ),
            expires_at,
        }
    }

    fn resolve_at(&self, url: &str, now: i64) -> DomainResult<PathBuf> {
        let rest = url
            .strip_prefix(URL_SCHEME)
            .ok_or_else(|| invalid_url("unknown scheme"))?;
        let (encoded_ref, query) = rest.split_once('?').ok_or_else(|| invalid_url("missing query"))?;

        let mut expires = None;
        let mut sig = None;
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("expires", value)) => expires = value.parse::<i64>().ok(),
                Some(("sig", value)) => sig = Some(value),
                _ => {}
            }
        }
        let expires = expires.ok_or_else(|| invalid_url("missing expiry"))?;
        let sig = sig.ok_or_else(|| invalid_url("missing signature"))?;

        let file_ref = percent_decode_str(encoded_ref)
            .decode_utf8()
            .map_err(|_| invalid_url("file reference is not UTF-8"))?;

        let provided: [u8; 32] = URL_SAFE_NO_PAD
            .decode(sig)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| invalid_url("malformed signature"))?;
        // blake3::Hash equality is constant-time
        if blake3::Hash::from(provided) != self.signature(&file_ref, expires) {
            return Err(invalid_url("bad signature"));
        }
        if now > expires {
            return Err(DomainError::Validation("Image URL has expired".into()));
        }

        let relative = Path::new(&*file_ref);
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(invalid_url("file reference escapes storage"));
        }
        Ok(self.storage_dir.join(relative))
    }

    fn signature(&self, file_ref: &str, expires_at: i64) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new_keyed(&self.signing_key);
        hasher.update(file_ref.as_bytes());
        hasher.update(b"\n");
        hasher.update(&expires_at.to_le_bytes());
        hasher.finalize()
    }
}

async fn remove_file(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        log::warn!("Failed to remove image file {}: {}", path.display(), e);
    }
}

fn io_err(e: std::io::Error) -> DomainError {
    DomainError::Transport(format!("Image storage failed: {}", e))
}

fn invalid_url(reason: &str) -> DomainError {
    DomainError::Validation(format!("Invalid image URL: {}", reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Geometry, Lead};
    use crate::repository::{init_db, LeadRepository};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        leads: LeadRepository,
        service: ImageService,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let db = init_db(Path::new(":memory:")).await.unwrap();
        let service = ImageService::new(
            Arc::new(ImageRepository::new(db.conn.clone())),
            dir.path().join("images"),
            "test secret",
            3600,
        );
        Fixture {
            _dir: dir,
            leads: LeadRepository::new(db.conn.clone()),
            service,
        }
    }

    async fn seed(leads: &LeadRepository) -> LeadId {
        let lead = Lead::new(0, "Depot".into(), Geometry::point(-95.0, 29.0));
        leads.create(&lead).await.unwrap().id
    }

    #[tokio::test]
    async fn test_upload_stores_file_and_signs_url() {
        let f = fixture().await;
        let lead_id = seed(&f.leads).await;

        let view = f
            .service
            .upload(lead_id, "Roof.JPG", b"jpeg bytes".to_vec(), Some("north side".into()))
            .await
            .unwrap();
        assert_eq!(view.image.content_type, "image/jpeg");
        assert!(view.image.file_ref.starts_with(&format!("lead_{}/", lead_id)));
        assert!(view.image.file_ref.ends_with(".jpg"));
        assert!(view.signed_url.url.starts_with(URL_SCHEME));

        let path = f.service.resolve_signed_url(&view.signed_url.url).unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"jpeg bytes");
    }

    #[tokio::test]
    async fn test_upload_rejections() {
        let f = fixture().await;
        let lead_id = seed(&f.leads).await;

        let err = f.service.upload(lead_id, "a.png", Vec::new(), None).await.unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
        let err = f.service.upload(lead_id, "notes.txt", b"x".to_vec(), None).await.unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
        let err = f.service.upload(999, "a.png", b"x".to_vec(), None).await.unwrap_err();
        assert_eq!(err.kind(), "ReferenceError");
    }

    #[tokio::test]
    async fn test_delete_checks_owner_and_removes_file() {
        let f = fixture().await;
        let lead_id = seed(&f.leads).await;
        let other = seed(&f.leads).await;
        let view = f.service.upload(lead_id, "a.png", b"png".to_vec(), None).await.unwrap();
        let path = f.service.storage_dir().join(&view.image.file_ref);

        let err = f.service.delete(other, view.image.id).await.unwrap_err();
        assert_eq!(err.kind(), "ReferenceError");
        assert!(path.exists());

        f.service.delete(lead_id, view.image.id).await.unwrap();
        assert!(!path.exists());
        assert!(f.service.list(lead_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_all_for_lead_removes_directory() {
        let f = fixture().await;
        let lead_id = seed(&f.leads).await;
        f.service.upload(lead_id, "a.png", b"one".to_vec(), None).await.unwrap();
        f.service.upload(lead_id, "b.webp", b"two".to_vec(), None).await.unwrap();

        assert_eq!(f.service.delete_all_for_lead(lead_id).await.unwrap(), 2);
        assert!(!f.service.storage_dir().join(format!("lead_{}", lead_id)).exists());
    }

    #[tokio::test]
    async fn test_signed_url_tampering_and_expiry() {
        let f = fixture().await;
        let signed = f.service.sign_at("lead_1/abc.png", 1_000);

        assert!(f.service.resolve_at(&signed.url, 1_000 + 3600).is_ok());
        assert!(f.service.resolve_at(&signed.url, 1_000 + 3601).is_err());

        let tampered = signed.url.replace("abc.png", "abd.png");
        assert!(f.service.resolve_at(&tampered, 1_000).is_err());

        let extended = signed.url.replace("expires=4600", "expires=9999");
        assert!(f.service.resolve_at(&extended, 1_000).is_err());

        assert!(f.service.resolve_at("https://example.com/a.png", 1_000).is_err());
    }

    #[tokio::test]
    async fn test_signature_depends_on_secret() {
        let f = fixture().await;
        let other = ImageService::new(
            Arc::new(ImageRepository::new(init_db(Path::new(":memory:")).await.unwrap().conn)),
            f.service.storage_dir().to_path_buf(),
            "another secret",
            3600,
        );
        let signed = other.sign_at("lead_1/abc.png", 1_000);
        assert!(f.service.resolve_at(&signed.url, 1_000).is_err());
    }
}
