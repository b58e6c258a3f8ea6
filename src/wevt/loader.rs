//! Directory loader: extract templates from provider binaries and preseed
//! the GUID-keyed template cache.

use std::fs;
use std::path::Path;

use log::{debug, warn};

use super::{WevtError, extract_wevt_template_resources, parse_crim};
use crate::template::GuidCache;

/// Load every PE file (`*.dll`, `*.exe`) under `dir` into `cache`.
///
/// Returns the number of templates newly inserted. Loading the same
/// directory twice inserts everything the first time and nothing the
/// second (first-wins). Files that are not PEs, have no `WEVT_TEMPLATE`
/// resource, or carry unparseable manifests are skipped with a warning.
pub fn load_dir(cache: &GuidCache, dir: impl AsRef<Path>) -> Result<usize, WevtError> {
    let dir = dir.as_ref();
    let mut inserted = 0;

    for pattern in ["*.dll", "*.exe", "*.DLL", "*.EXE"] {
        let full_pattern = dir.join(pattern);
        let Some(pattern_str) = full_pattern.to_str() else {
            continue;
        };

        let paths = glob::glob(pattern_str).map_err(|e| {
            WevtError::IO {
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
            }
        })?;

        for entry in paths {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    warn!("skipping unreadable directory entry: {e}");
                    continue;
                }
            };

            match load_file(cache, &path) {
                Ok(count) => {
                    debug!("loaded {count} templates from {}", path.display());
                    inserted += count;
                }
                Err(e) => warn!("skipping {}: {e}", path.display()),
            }
        }
    }

    Ok(inserted)
}

/// Load one PE file into `cache`, returning the number of new templates.
pub fn load_file(cache: &GuidCache, path: &Path) -> Result<usize, WevtError> {
    let bytes = fs::read(path)?;

    if bytes.get(..2) != Some(b"MZ".as_slice()) {
        return Ok(0);
    }

    let mut inserted = 0;
    for resource in extract_wevt_template_resources(&bytes)? {
        match parse_crim(&resource.data) {
            Ok(templates) => {
                inserted += cache.populate_from_manifest(
                    templates.into_iter().map(|t| (t.guid, t.bytes)),
                );
            }
            Err(e) => {
                warn!(
                    "unparseable WEVT_TEMPLATE resource (lang {}) in {}: {e}",
                    resource.lang_id,
                    path.display()
                );
            }
        }
    }

    Ok(inserted)
}
