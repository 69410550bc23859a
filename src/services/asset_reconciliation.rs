use axum::body::Bytes;
use serde::Serialize;
use std::collections::BTreeMap;

pub const MAX_BROCHURE_BYTES: usize = 10 * 1024 * 1024;
const PDF_CONTENT_TYPE: &str = "application/pdf";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AssetError {
    #[error("{0}")]
    InvalidBrochure(String),
    #[error("'{0}' is not an image file.")]
    InvalidImage(String),
    #[error("Asset '{0}' is not part of this property.")]
    UnknownAsset(String),
    #[error("No staged file at position {0}.")]
    UnknownPendingFile(usize),
}

/// A file chosen during the session that has not been uploaded yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl PendingFile {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn extension(&self) -> String {
        let from_name = self
            .file_name
            .rsplit_once('.')
            .map(|(_, extension)| extension.trim().to_ascii_lowercase())
            .filter(|extension| {
                !extension.is_empty()
                    && extension.len() <= 8
                    && extension.chars().all(|c| c.is_ascii_alphanumeric())
            });
        if let Some(extension) = from_name {
            return extension;
        }
        match base_content_type(&self.content_type).as_str() {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/webp" => "webp",
            "image/gif" => "gif",
            PDF_CONTENT_TYPE => "pdf",
            _ => "bin",
        }
        .to_string()
    }

    fn view(&self) -> PendingFileView {
        PendingFileView {
            file_name: self.file_name.clone(),
            content_type: self.content_type.clone(),
            size_bytes: self.size(),
        }
    }
}

fn base_content_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Brochures must declare a PDF content type and stay within 10MB.
pub fn validate_brochure(file: &PendingFile) -> Result<(), AssetError> {
    if base_content_type(&file.content_type) != PDF_CONTENT_TYPE {
        return Err(AssetError::InvalidBrochure(
            "Brochure must be a PDF file.".to_string(),
        ));
    }
    if file.size() > MAX_BROCHURE_BYTES {
        return Err(AssetError::InvalidBrochure(
            "Brochure must be 10MB or smaller.".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_image(file: &PendingFile) -> Result<(), AssetError> {
    if base_content_type(&file.content_type).starts_with("image/") {
        return Ok(());
    }
    Err(AssetError::InvalidImage(file.file_name.clone()))
}

/// Single-slot asset (cover image, brochure): the stored URL plus an optional
/// replacement waiting for upload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SingleAsset {
    existing: Option<String>,
    replacement: Option<PendingFile>,
}

impl SingleAsset {
    pub fn from_existing(url: Option<String>) -> Self {
        Self {
            existing: url,
            replacement: None,
        }
    }

    pub fn existing(&self) -> Option<&str> {
        self.existing.as_deref()
    }

    pub fn replacement(&self) -> Option<&PendingFile> {
        self.replacement.as_ref()
    }

    pub fn replace(&mut self, file: PendingFile) {
        self.replacement = Some(file);
    }

    pub fn is_present(&self) -> bool {
        self.replacement.is_some() || self.existing.is_some()
    }
}

/// Gallery bookkeeping for one editing session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GallerySet {
    existing: Vec<String>,
    to_remove: Vec<String>,
    to_add: Vec<PendingFile>,
}

impl GallerySet {
    pub fn from_existing(urls: Vec<String>) -> Self {
        Self {
            existing: urls,
            ..Self::default()
        }
    }

    /// Existing URLs not marked for removal, in their original order.
    pub fn kept(&self) -> Vec<String> {
        self.existing
            .iter()
            .filter(|url| !self.to_remove.contains(url))
            .cloned()
            .collect()
    }

    pub fn to_add(&self) -> &[PendingFile] {
        &self.to_add
    }

    pub fn to_remove(&self) -> &[String] {
        &self.to_remove
    }

    pub fn stage(&mut self, file: PendingFile) {
        self.to_add.push(file);
    }

    pub fn unstage(&mut self, index: usize) -> Result<PendingFile, AssetError> {
        if index >= self.to_add.len() {
            return Err(AssetError::UnknownPendingFile(index));
        }
        Ok(self.to_add.remove(index))
    }

    pub fn mark_removed(&mut self, url: &str) -> Result<(), AssetError> {
        let url = url.trim();
        if !self.existing.iter().any(|existing| existing == url) {
            return Err(AssetError::UnknownAsset(url.to_string()));
        }
        if !self.to_remove.iter().any(|removed| removed == url) {
            self.to_remove.push(url.to_string());
        }
        Ok(())
    }

    /// The list to persist once every staged file has been uploaded, with
    /// `uploaded` in staging order.
    pub fn final_list(&self, uploaded: &[String]) -> Vec<String> {
        let mut urls = self.kept();
        urls.extend(uploaded.iter().cloned());
        urls
    }
}

/// Every asset change of one wizard session. Nothing here touches storage;
/// the submit pipeline materializes it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetSession {
    pub cover: SingleAsset,
    pub gallery: GallerySet,
    pub brochure: SingleAsset,
    /// Staged per-building brochures keyed by building number.
    pub building_brochures: BTreeMap<u32, PendingFile>,
}

impl AssetSession {
    pub fn from_existing(
        cover_image_url: Option<String>,
        gallery_image_urls: Vec<String>,
        brochure_url: Option<String>,
    ) -> Self {
        Self {
            cover: SingleAsset::from_existing(cover_image_url),
            gallery: GallerySet::from_existing(gallery_image_urls),
            brochure: SingleAsset::from_existing(brochure_url),
            building_brochures: BTreeMap::new(),
        }
    }

    pub fn stage_cover(&mut self, file: PendingFile) -> Result<(), AssetError> {
        validate_image(&file)?;
        self.cover.replace(file);
        Ok(())
    }

    pub fn stage_gallery(&mut self, file: PendingFile) -> Result<(), AssetError> {
        validate_image(&file)?;
        self.gallery.stage(file);
        Ok(())
    }

    pub fn stage_brochure(&mut self, file: PendingFile) -> Result<(), AssetError> {
        validate_brochure(&file)?;
        self.brochure.replace(file);
        Ok(())
    }

    pub fn stage_building_brochure(
        &mut self,
        building_number: u32,
        file: PendingFile,
    ) -> Result<(), AssetError> {
        validate_brochure(&file)?;
        self.building_brochures.insert(building_number, file);
        Ok(())
    }

    pub fn pending_upload_count(&self) -> usize {
        usize::from(self.cover.replacement.is_some())
            + self.gallery.to_add.len()
            + usize::from(self.brochure.replacement.is_some())
            + self.building_brochures.len()
    }

    pub fn view(&self) -> AssetSessionView {
        AssetSessionView {
            cover_image_url: self.cover.existing.clone(),
            pending_cover: self.cover.replacement.as_ref().map(PendingFile::view),
            kept_gallery_urls: self.gallery.kept(),
            removed_gallery_urls: self.gallery.to_remove.clone(),
            pending_gallery: self.gallery.to_add.iter().map(PendingFile::view).collect(),
            brochure_url: self.brochure.existing.clone(),
            pending_brochure: self.brochure.replacement.as_ref().map(PendingFile::view),
            pending_building_brochures: self
                .building_brochures
                .iter()
                .map(|(number, file)| (*number, file.view()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingFileView {
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetSessionView {
    pub cover_image_url: Option<String>,
    pub pending_cover: Option<PendingFileView>,
    pub kept_gallery_urls: Vec<String>,
    pub removed_gallery_urls: Vec<String>,
    pub pending_gallery: Vec<PendingFileView>,
    pub brochure_url: Option<String>,
    pub pending_brochure: Option<PendingFileView>,
    pub pending_building_brochures: BTreeMap<u32, PendingFileView>,
}

#[cfg(test)]
pub(crate) fn pending(file_name: &str, content_type: &str, size: usize) -> PendingFile {
    PendingFile {
        file_name: file_name.to_string(),
        content_type: content_type.to_string(),
        bytes: Bytes::from(vec![0_u8; size]),
    }
}
