//! File intake: validation and staging of uploads tied to file fields.
//!
//! Validation happens while the submission is ingested; the accepted file
//! stays in its temporary location until the owning row has been written,
//! then [`commit_moves`] moves it into the field's storage path.

use crate::catalog::{FieldMapping, FileSpec};
use crate::changeset::{ErrorToken, ValidationErrors};
use crate::error::{OrmError, OrmResult};
use crate::sanitize::FieldAlias;
use crate::submission::UploadedFile;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use serde::Serialize;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Finalized value of a file field: the stored name plus metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Size in bytes.
    pub size: u64,
}

/// A file waiting to be moved once the row write succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedMove {
    pub field: String,
    pub from: PathBuf,
    pub to: PathBuf,
}

fn extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

fn same_format(a: &str, b: &str) -> bool {
    let norm = |s: &str| if s == "jpg" { "jpeg".to_string() } else { s.to_string() };
    norm(a) == norm(b)
}

fn is_image(file: &UploadedFile) -> bool {
    match &file.content_type {
        Some(ct) => ct.trim().to_ascii_lowercase().starts_with("image/"),
        None => mime_guess::from_path(&file.original_name)
            .first()
            .is_some_and(|m| m.type_() == mime_guess::mime::IMAGE),
    }
}

/// The extension has to be on the allow-list. A declared content type and,
/// for image formats, the file's own signature may only narrow that.
fn format_allowed(spec: &FileSpec, file: &UploadedFile) -> OrmResult<bool> {
    if spec.allowed_formats.is_empty() {
        return Ok(true);
    }
    let Some(ext) = extension(&file.original_name) else {
        return Ok(false);
    };
    if !spec.allowed_formats.iter().any(|allowed| same_format(allowed, &ext)) {
        return Ok(false);
    }
    if !declared_type_matches(file, &ext) {
        return Ok(false);
    }
    match ImageFormat::from_extension(&ext) {
        Some(expected) => {
            let temp = &file.temp_path;
            let sniffed = ImageReader::open(temp)
                .map_err(|e| OrmError::filesystem(temp, e))?
                .with_guessed_format()
                .map_err(|e| OrmError::filesystem(temp, e))?
                .format();
            Ok(sniffed == Some(expected))
        }
        None => Ok(true),
    }
}

/// A declared type must be one the extension maps to. Generic binary and
/// unknown extensions say nothing either way.
fn declared_type_matches(file: &UploadedFile, ext: &str) -> bool {
    let Some(declared) = file.content_type.as_deref() else {
        return true;
    };
    let declared = declared
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let guessed = mime_guess::from_ext(ext);
    declared == "application/octet-stream"
        || guessed.is_empty()
        || guessed.iter().any(|m| m.essence_str() == declared)
}

/// Keep only characters that are safe in a stored file name.
fn safe_name(original: &str) -> String {
    let base = Path::new(original)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");
    base.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn unique_name(original: &str, alias: &FieldAlias) -> String {
    let stem = format!("{}{}", Uuid::new_v4().simple(), alias.fix_string());
    match extension(original) {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem,
    }
}

enum DimensionCheck {
    Fits(u32, u32),
    Resized(DynamicImage),
    Rejected,
}

fn check_dimensions(spec: &FileSpec, bounds: (u32, u32), img: DynamicImage) -> DimensionCheck {
    let (max_w, max_h) = bounds;
    let (w, h) = (img.width(), img.height());
    if spec.exact_dimensions {
        if (w, h) == bounds {
            DimensionCheck::Fits(w, h)
        } else if spec.resize_allowed {
            DimensionCheck::Resized(img.resize_exact(max_w, max_h, FilterType::Lanczos3))
        } else {
            DimensionCheck::Rejected
        }
    } else if w <= max_w && h <= max_h {
        DimensionCheck::Fits(w, h)
    } else if spec.resize_allowed {
        DimensionCheck::Resized(img.resize(max_w, max_h, FilterType::Lanczos3))
    } else {
        DimensionCheck::Rejected
    }
}

/// Validate one uploaded file against its field's spec.
///
/// Validation failures are pushed to `errors` under the field name and yield
/// `Ok(None)` with the temporary file untouched. An unreadable temporary
/// file, or a resized image that cannot be written back, is fatal.
pub(crate) fn intake(
    field: &FieldMapping,
    spec: &FileSpec,
    file: &UploadedFile,
    alias: &FieldAlias,
    errors: &mut ValidationErrors,
) -> OrmResult<Option<(FileInfo, StagedMove)>> {
    let temp = &file.temp_path;
    std::fs::metadata(temp).map_err(|e| OrmError::filesystem(temp, e))?;

    let mut failed = false;
    let mut reject = |errors: &mut ValidationErrors, token| {
        errors.push(field.name.as_str(), token);
        failed = true;
    };

    if !format_allowed(spec, file)? {
        reject(errors, ErrorToken::Format);
    }

    let (mut width, mut height) = (0, 0);
    let mut resized: Option<Vec<u8>> = None;
    if let Some(bounds) = spec.bounds().filter(|_| is_image(file)) {
        let decoded = ImageReader::open(temp)
            .map_err(|e| OrmError::filesystem(temp, e))?
            .with_guessed_format()
            .map_err(|e| OrmError::filesystem(temp, e))?
            .decode();
        match decoded.map(|img| check_dimensions(spec, bounds, img)) {
            Ok(DimensionCheck::Fits(w, h)) => (width, height) = (w, h),
            Ok(DimensionCheck::Resized(img)) => {
                (width, height) = (img.width(), img.height());
                let format = ImageFormat::from_path(&file.original_name)
                    .or_else(|_| ImageFormat::from_path(temp))
                    .unwrap_or(ImageFormat::Png);
                let mut encoded = Cursor::new(Vec::new());
                img.write_to(&mut encoded, format).map_err(|e| {
                    OrmError::filesystem(temp, std::io::Error::other(e.to_string()))
                })?;
                resized = Some(encoded.into_inner());
            }
            Ok(DimensionCheck::Rejected) | Err(_) => reject(errors, ErrorToken::Dimension),
        }
    }

    let size = match &resized {
        Some(bytes) => bytes.len() as u64,
        None => std::fs::metadata(temp)
            .map_err(|e| OrmError::filesystem(temp, e))?
            .len(),
    };
    if let Some(kb) = spec.max_size_kb
        && size > kb.saturating_mul(1024)
    {
        reject(errors, ErrorToken::Weight);
    }

    if failed {
        tracing::debug!(
            target: "adminorm.validate",
            field = %field.name,
            file = %file.original_name,
            "upload rejected"
        );
        return Ok(None);
    }

    if let Some(bytes) = resized {
        std::fs::write(temp, bytes).map_err(|e| OrmError::filesystem(temp, e))?;
    }

    let name = if spec.unique_name {
        unique_name(&file.original_name, alias)
    } else {
        safe_name(&file.original_name)
    };
    let staged = StagedMove {
        field: field.name.clone(),
        from: temp.clone(),
        to: spec.storage_path.join(&name),
    };
    Ok(Some((
        FileInfo {
            name,
            width,
            height,
            size,
        },
        staged,
    )))
}

/// Reject names that would escape the storage directory.
fn stored_path(spec: &FileSpec, name: &str) -> OrmResult<PathBuf> {
    let plain = Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name);
    if !plain || name == "." || name == ".." {
        return Err(OrmError::statement(format!(
            "'{name}' is not a plain file name"
        )));
    }
    Ok(spec.storage_path.join(name))
}

/// Metadata of an already stored file. A missing file is logged and reads
/// as zeros.
pub(crate) fn stored_info(spec: &FileSpec, name: &str) -> OrmResult<FileInfo> {
    let path = stored_path(spec, name)?;
    let mut info = FileInfo {
        name: name.to_string(),
        ..FileInfo::default()
    };
    match std::fs::metadata(&path) {
        Ok(meta) => info.size = meta.len(),
        Err(_) => {
            tracing::warn!(target: "adminorm.upload", path = %path.display(), "stored file does not exist");
            return Ok(info);
        }
    }
    if spec.bounds().is_some()
        && let Ok((w, h)) = image::image_dimensions(&path)
    {
        info.width = w;
        info.height = h;
    }
    Ok(info)
}

/// Move staged files into place. Cross-device moves fall back to copy.
pub(crate) async fn commit_moves(moves: &[StagedMove]) -> OrmResult<()> {
    for staged in moves {
        if tokio::fs::rename(&staged.from, &staged.to).await.is_err() {
            tokio::fs::copy(&staged.from, &staged.to)
                .await
                .map_err(|e| OrmError::filesystem(&staged.to, e))?;
            tokio::fs::remove_file(&staged.from)
                .await
                .map_err(|e| OrmError::filesystem(&staged.from, e))?;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&staged.to, std::fs::Permissions::from_mode(0o755))
                .await
                .map_err(|e| OrmError::filesystem(&staged.to, e))?;
        }
        tracing::info!(
            target: "adminorm.upload",
            field = %staged.field,
            to = %staged.to.display(),
            "stored upload"
        );
    }
    Ok(())
}

/// Remove a stored file. Returns whether a file was removed.
pub(crate) async fn remove_stored(spec: &FileSpec, name: &str) -> OrmResult<bool> {
    let path = stored_path(spec, name)?;
    match tokio::fs::remove_file(&path).await {
        Ok(()) => {
            tracing::info!(target: "adminorm.upload", path = %path.display(), "removed stored file");
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(OrmError::filesystem(path, e)),
    }
}
