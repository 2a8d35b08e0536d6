//! Filename hygiene for uploads and image references.

use crate::error::{AppError, Result};
use std::path::Path;

/// Makes a client-declared filename safe to embed in a stored filename.
///
/// Characters outside `[A-Za-z0-9._-]` become `_`, then `..` is stripped until none is left
/// (a single pass would turn `....` back into `..`).
pub fn sanitize_filename(declared: &str) -> Result<String> {
    if declared.trim().is_empty() {
        return Err(AppError::InvalidOperation(
            "filename cannot be blank".into(),
        ));
    }

    let mut sanitized: String = declared
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    while sanitized.contains("..") {
        sanitized = sanitized.replace("..", "");
    }

    if sanitized.trim().is_empty() {
        return Err(AppError::InvalidOperation(
            "filename cannot be blank after sanitization".into(),
        ));
    }

    Ok(sanitized)
}

/// Pulls the bare filename out of an image reference.
///
/// Accepts plain tokens (`abc_cat.png`), root-relative references (`images/temp/abc_cat.png`)
/// and full URLs (`https://host/uploads/images/temp/abc_cat.png?v=2`).
pub fn extract_filename(reference: &str) -> Result<String> {
    let invalid = || AppError::InvalidOperation(format!("cannot extract a filename from '{reference}'"));

    if reference.trim().is_empty() {
        return Err(invalid());
    }

    let cleaned = reference
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .replace('\\', "/");

    let filename = if is_remote_url(&cleaned) {
        cleaned.rsplit('/').next().map(str::to_owned)
    } else {
        Path::new(&cleaned)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    };

    match filename {
        Some(name) if !name.is_empty() && name != "." && name != ".." => Ok(name),
        _ => Err(invalid()),
    }
}

/// Points a staged reference at its permanent location.
///
/// The staging directory segment is swapped for the permanent one so URL prefixes survive;
/// references that never mentioned the staging directory become `<permanent>/<filename>`.
pub fn rewrite_reference(reference: &str, staging_dir: &Path, permanent_dir: &Path, filename: &str) -> String {
    let staging = format!("{}/", slashed(staging_dir));
    let permanent = slashed(permanent_dir);

    if reference.contains(&staging) {
        reference.replacen(&staging, &format!("{permanent}/"), 1)
    } else {
        format!("{permanent}/{filename}")
    }
}

fn slashed(dir: &Path) -> String {
    dir.to_string_lossy()
        .replace('\\', "/")
        .trim_end_matches('/')
        .to_owned()
}

fn is_remote_url(reference: &str) -> bool {
    ["http://", "https://", "blob:"]
        .iter()
        .any(|scheme| reference.starts_with(scheme))
}
