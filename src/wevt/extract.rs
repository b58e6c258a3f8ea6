//! PE resource extraction for `WEVT_TEMPLATE` blobs (via `goblin`).
//!
//! Only the PE header, the section table and the resource data directory
//! are needed, so this avoids `goblin::pe::PE::parse`: the eager full
//! parse hard-fails on minimal images whose other data directories violate
//! stricter invariants, and those images are still fine for resource
//! extraction. The resource tree itself is an 8-byte-entry trie walked
//! manually.

use goblin::pe::header;
use goblin::pe::options::ParseOptions;

use super::WevtError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WevtTemplateResource {
    /// Language ID of the resource data entry.
    pub lang_id: u32,
    /// Raw resource bytes (typically starting with `CRIM`).
    pub data: Vec<u8>,
}

/// Extract every `WEVT_TEMPLATE` resource slice from a PE image.
///
/// Returns an empty vector when the PE has no resource directory or no
/// `WEVT_TEMPLATE` resource type. The resource type is matched by *name*,
/// not by id.
pub fn extract_wevt_template_resources(
    pe_bytes: &[u8],
) -> Result<Vec<WevtTemplateResource>, WevtError> {
    let pe_header = header::Header::parse(pe_bytes).map_err(|_| WevtError::InvalidPe {
        message: "failed to parse PE headers",
    })?;

    let Some(optional_header) = pe_header.optional_header else {
        return Err(WevtError::InvalidPe {
            message: "missing optional header",
        });
    };

    let Some(resource_table) = optional_header.data_directories.get_resource_table() else {
        return Ok(Vec::new());
    };
    if resource_table.virtual_address == 0 || resource_table.size == 0 {
        return Ok(Vec::new());
    }

    let file_alignment = optional_header.windows_fields.file_alignment;
    let opts = ParseOptions::default();

    let optional_header_offset = pe_header.dos_header.pe_pointer as usize
        + header::SIZEOF_PE_MAGIC
        + header::SIZEOF_COFF_HEADER;
    let mut sections_offset =
        optional_header_offset + pe_header.coff_header.size_of_optional_header as usize;
    let sections = pe_header
        .coff_header
        .sections(pe_bytes, &mut sections_offset)
        .map_err(|_| WevtError::MalformedPe {
            message: "failed to parse section headers",
        })?;

    let rva_to_offset = |rva: u32| -> Result<usize, WevtError> {
        goblin::pe::utils::find_offset(rva as usize, &sections, file_alignment, &opts)
            .ok_or(WevtError::UnmappedRva { rva })
    };

    let rsrc_offset = rva_to_offset(resource_table.virtual_address)?;
    let rsrc_end = rsrc_offset
        .checked_add(resource_table.size as usize)
        .ok_or(WevtError::MalformedPe {
            message: "resource directory overflow",
        })?;
    let rsrc = pe_bytes
        .get(rsrc_offset..rsrc_end)
        .ok_or(WevtError::MalformedPe {
            message: "resource directory out of bounds",
        })?;

    let root = ResourceDir::read(rsrc, 0)?;
    let Some(wevt_entry) = root.find_named_child(rsrc, "WEVT_TEMPLATE")? else {
        return Ok(Vec::new());
    };
    if !wevt_entry.is_directory() {
        return Ok(Vec::new());
    }

    let mut out = Vec::new();

    // Tree layout: root / "WEVT_TEMPLATE" / <resource-id> / <lang-id> -> data
    let type_dir = ResourceDir::read(rsrc, wevt_entry.child_offset())?;
    for resource_entry in &type_dir.entries {
        if !resource_entry.is_directory() {
            continue;
        }

        let lang_dir = ResourceDir::read(rsrc, resource_entry.child_offset())?;
        for lang_entry in &lang_dir.entries {
            if lang_entry.has_name() || lang_entry.is_directory() {
                continue;
            }

            let data_offset = lang_entry.child_offset();
            let data_rva = read_u32(rsrc, data_offset).ok_or(WevtError::MalformedResource {
                message: "resource data entry RVA out of bounds",
            })?;
            let data_size = read_u32(rsrc, data_offset + 4).ok_or(WevtError::MalformedResource {
                message: "resource data entry size out of bounds",
            })? as usize;
            if data_size == 0 {
                continue;
            }

            let file_offset = rva_to_offset(data_rva)?;
            let end = file_offset
                .checked_add(data_size)
                .ok_or(WevtError::MalformedPe {
                    message: "resource data overflow",
                })?;
            let data = pe_bytes
                .get(file_offset..end)
                .ok_or(WevtError::MalformedPe {
                    message: "resource data out of bounds",
                })?
                .to_vec();

            out.push(WevtTemplateResource {
                lang_id: lang_entry.id_value(),
                data,
            });
        }
    }

    Ok(out)
}

/// Emit the first `WEVT_TEMPLATE` resource slice of the image, if any.
pub fn extract_wevt(pe_bytes: &[u8]) -> Result<Option<Vec<u8>>, WevtError> {
    Ok(extract_wevt_template_resources(pe_bytes)?
        .into_iter()
        .next()
        .map(|resource| resource.data))
}

struct ResourceDir {
    entries: Vec<ResourceDirEntry>,
}

#[derive(Debug, Clone, Copy)]
struct ResourceDirEntry {
    id: u32,
    offset: u32,
}

impl ResourceDir {
    fn read(rsrc: &[u8], offset: usize) -> Result<ResourceDir, WevtError> {
        // [characteristics:u32][timestamp:u32][major:u16][minor:u16]
        // [named_count:u16][id_count:u16], entries follow.
        let named_count = read_u16(rsrc, offset + 12).ok_or(WevtError::MalformedResource {
            message: "resource directory header out of bounds",
        })? as usize;
        let id_count = read_u16(rsrc, offset + 14).ok_or(WevtError::MalformedResource {
            message: "resource directory header out of bounds",
        })? as usize;

        let mut entries = Vec::with_capacity(named_count + id_count);
        let mut entry_offset = offset + 16;
        for _ in 0..named_count + id_count {
            let id = read_u32(rsrc, entry_offset).ok_or(WevtError::MalformedResource {
                message: "resource directory entry out of bounds",
            })?;
            let child = read_u32(rsrc, entry_offset + 4).ok_or(WevtError::MalformedResource {
                message: "resource directory entry out of bounds",
            })?;
            entries.push(ResourceDirEntry { id, offset: child });
            entry_offset += 8;
        }

        Ok(ResourceDir { entries })
    }

    fn find_named_child(
        &self,
        rsrc: &[u8],
        wanted: &str,
    ) -> Result<Option<ResourceDirEntry>, WevtError> {
        for entry in &self.entries {
            if !entry.has_name() {
                continue;
            }
            if read_resource_name(rsrc, entry.id_value() as usize)? == wanted {
                return Ok(Some(*entry));
            }
        }
        Ok(None)
    }
}

impl ResourceDirEntry {
    fn has_name(&self) -> bool {
        self.id & 0x8000_0000 != 0
    }

    fn id_value(&self) -> u32 {
        self.id & 0x7fff_ffff
    }

    fn is_directory(&self) -> bool {
        self.offset & 0x8000_0000 != 0
    }

    fn child_offset(&self) -> usize {
        (self.offset & 0x7fff_ffff) as usize
    }
}

/// `[char_count:u16][utf16 chars]`, relative to the resource section.
fn read_resource_name(rsrc: &[u8], offset: usize) -> Result<String, WevtError> {
    let char_count = read_u16(rsrc, offset).ok_or(WevtError::MalformedResource {
        message: "resource name length out of bounds",
    })? as usize;

    let start = offset + 2;
    let end = start
        .checked_add(char_count * 2)
        .ok_or(WevtError::MalformedResource {
            message: "resource name length overflow",
        })?;
    let bytes = rsrc.get(start..end).ok_or(WevtError::MalformedResource {
        message: "resource name out of bounds",
    })?;

    let mut units = Vec::with_capacity(char_count);
    for pair in bytes.chunks_exact(2) {
        units.push(u16::from_le_bytes([pair[0], pair[1]]));
    }

    String::from_utf16(&units).map_err(|_| WevtError::InvalidResourceName)
}

#[inline]
fn read_u16(buf: &[u8], offset: usize) -> Option<u16> {
    buf.get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
}

#[inline]
fn read_u32(buf: &[u8], offset: usize) -> Option<u32> {
    buf.get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}
