//! WEVT_TEMPLATE manifest loading.
//!
//! Providers ship template definitions as `WEVT_TEMPLATE` PE resources
//! (CRIM blobs), not inside EVTX files. This module extracts those blobs,
//! parses out per-template `{guid, bytes}` pairs and preseeds the
//! process-wide template cache, first-wins.

mod extract;
mod loader;
mod manifest;

pub use extract::{extract_wevt, extract_wevt_template_resources, WevtTemplateResource};
pub use loader::{load_dir, load_file};
pub use manifest::{parse_crim, WevtTemplateBlob};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WevtError {
    #[error("input is not a valid PE file: {message}")]
    InvalidPe { message: &'static str },

    #[error("malformed PE file: {message}")]
    MalformedPe { message: &'static str },

    #[error("failed to map RVA 0x{rva:08x} to a file offset")]
    UnmappedRva { rva: u32 },

    #[error("resource directory is malformed: {message}")]
    MalformedResource { message: &'static str },

    #[error("failed to decode UTF-16 resource name")]
    InvalidResourceName,

    #[error("malformed CRIM manifest at offset {offset}: {message}")]
    MalformedManifest { message: &'static str, offset: usize },

    #[error("An I/O error has occurred")]
    IO {
        #[from]
        source: std::io::Error,
    },
}
