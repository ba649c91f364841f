use std::{fs, path::Path};

use curl::easy::Easy;
use sha2::{Digest, Sha256};

/// Downloads `url` to `dest`, checking that the SHA-256 digest of the body
/// starts with `sha256_prefix`.
///
/// The body is written to a `.part` sibling first and renamed into place, so
/// an interrupted download never leaves a truncated `dest` behind.
pub fn download_to<P: AsRef<Path>>(
    dest: P,
    url: &str,
    sha256_prefix: &str,
) -> Result<(), DownloadError> {
    let dest = dest.as_ref();
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut body = Vec::new();
    let mut easy = Easy::new();
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.fail_on_error(true)?;
    easy.progress(true)?;

    tracing::info!(url, "downloading");
    {
        let mut dl = easy.transfer();
        let pb = indicatif::ProgressBar::new(1);
        dl.progress_function(move |total_dl, cur_dl, _, _| {
            pb.set_length(total_dl as u64);
            pb.set_position(cur_dl as u64);
            true
        })?;
        dl.write_function(|data| {
            body.extend_from_slice(data);
            Ok(data.len())
        })?;
        dl.perform()?;
    }

    tracing::info!(expected = sha256_prefix, "verifying hash");
    verify(&body, sha256_prefix)?;

    let part = dest.with_extension("part");
    tracing::info!(bytes = body.len(), path = %dest.display(), "writing");
    fs::write(&part, &body)?;
    fs::rename(&part, dest)?;
    Ok(())
}

fn verify(body: &[u8], sha256_prefix: &str) -> Result<(), DownloadError> {
    let digest = format!("{:x}", Sha256::digest(body));
    if digest.starts_with(&sha256_prefix.to_ascii_lowercase()) {
        Ok(())
    } else {
        Err(DownloadError::HashMismatch {
            expected: sha256_prefix.to_owned(),
            found: digest,
        })
    }
}

/// The hash prefix torch hub embeds in checkpoint names, `name-<hex>.pth`.
pub fn hash_prefix_from_url(url: &str) -> Option<&str> {
    let file = url.rsplit('/').next()?;
    let stem = file.split('.').next()?;
    let (_, hash) = stem.rsplit_once('-')?;
    (!hash.is_empty() && hash.chars().all(|c| c.is_ascii_hexdigit())).then_some(hash)
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("curl error: {0}")]
    CurlError(#[from] curl::Error),
    #[error("sha256 mismatch: expected prefix {expected}, got {found}")]
    HashMismatch { expected: String, found: String },
}
