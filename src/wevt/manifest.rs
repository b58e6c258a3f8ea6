//! CRIM/WEVT manifest parsing.
//!
//! A `WEVT_TEMPLATE` resource blob is a `CRIM` manifest: a provider list
//! whose `WEVT` subsections carry element directories; the `TTBL` element
//! holds `TEMP` structures, each a GUID-keyed BinXml template body. All
//! offsets inside the blob are relative to the start of the `CRIM` header.
//!
//! Layout reference: libfwevt, "Windows Event manifest binary format".

use log::warn;

use super::WevtError;
use crate::guid::Guid;

/// CRIM header: `[sig:4][size:u32][major:u16][minor:u16][provider_count:u32]`.
const CRIM_HEADER_SIZE: usize = 16;
/// Provider descriptor: `[guid:16][data_offset:u32]`.
const PROVIDER_DESCRIPTOR_SIZE: usize = 20;
/// WEVT header: `[sig:4][size:u32][message_table_id:u32][descriptor_count:u32][unknown_count:u32]`.
const WEVT_HEADER_SIZE: usize = 20;
/// TTBL header: `[sig:4][size:u32][template_count:u32]`.
const TTBL_HEADER_SIZE: usize = 12;
/// TEMP header; the BinXml fragment starts right after it.
const TEMP_HEADER_SIZE: usize = 40;

/// One template extracted from a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WevtTemplateBlob {
    pub guid: Guid,
    /// The BinXml template body.
    pub bytes: Vec<u8>,
}

/// Parse a CRIM blob into its template list.
///
/// Duplicate GUIDs are preserved; the template cache resolves them
/// first-wins on insertion.
pub fn parse_crim(blob: &[u8]) -> Result<Vec<WevtTemplateBlob>, WevtError> {
    if blob.get(..4) != Some(b"CRIM".as_slice()) {
        return Err(WevtError::MalformedManifest {
            message: "missing CRIM signature",
            offset: 0,
        });
    }

    let declared_size = read_u32(blob, 4)? as usize;
    if declared_size > blob.len() {
        return Err(WevtError::MalformedManifest {
            message: "declared size exceeds blob length",
            offset: 4,
        });
    }

    let provider_count = read_u32(blob, 12)? as usize;

    let mut templates = Vec::new();

    for index in 0..provider_count {
        let descriptor_offset = CRIM_HEADER_SIZE + index * PROVIDER_DESCRIPTOR_SIZE;
        let data_offset = read_u32(blob, descriptor_offset + 16)? as usize;

        if let Err(e) = parse_provider(blob, data_offset, &mut templates) {
            // A single unparseable provider does not invalidate the rest.
            warn!("provider {index} in CRIM manifest failed to parse: {e}");
        }
    }

    Ok(templates)
}

fn parse_provider(
    blob: &[u8],
    wevt_offset: usize,
    templates: &mut Vec<WevtTemplateBlob>,
) -> Result<(), WevtError> {
    if blob.get(wevt_offset..wevt_offset + 4) != Some(b"WEVT".as_slice()) {
        return Err(WevtError::MalformedManifest {
            message: "missing WEVT signature",
            offset: wevt_offset,
        });
    }

    let descriptor_count = read_u32(blob, wevt_offset + 12)? as usize;

    for index in 0..descriptor_count {
        // Element descriptors are `[offset:u32][unknown:u32]`.
        let descriptor_offset = wevt_offset + WEVT_HEADER_SIZE + index * 8;
        let element_offset = read_u32(blob, descriptor_offset)? as usize;

        if blob.get(element_offset..element_offset + 4) == Some(b"TTBL".as_slice()) {
            parse_ttbl(blob, element_offset, templates)?;
        }
    }

    Ok(())
}

fn parse_ttbl(
    blob: &[u8],
    ttbl_offset: usize,
    templates: &mut Vec<WevtTemplateBlob>,
) -> Result<(), WevtError> {
    let ttbl_size = read_u32(blob, ttbl_offset + 4)? as usize;
    let ttbl_end = ttbl_offset
        .checked_add(ttbl_size)
        .filter(|&end| end <= blob.len())
        .ok_or(WevtError::MalformedManifest {
            message: "TTBL size out of bounds",
            offset: ttbl_offset,
        })?;
    let template_count = read_u32(blob, ttbl_offset + 8)? as usize;

    let mut temp_offset = ttbl_offset + TTBL_HEADER_SIZE;
    for _ in 0..template_count {
        if temp_offset + TEMP_HEADER_SIZE > ttbl_end {
            return Err(WevtError::MalformedManifest {
                message: "TEMP extends past its TTBL",
                offset: temp_offset,
            });
        }
        if blob.get(temp_offset..temp_offset + 4) != Some(b"TEMP".as_slice()) {
            return Err(WevtError::MalformedManifest {
                message: "missing TEMP signature",
                offset: temp_offset,
            });
        }

        let temp_size = read_u32(blob, temp_offset + 4)? as usize;
        if temp_size < TEMP_HEADER_SIZE || temp_offset + temp_size > ttbl_end {
            return Err(WevtError::MalformedManifest {
                message: "TEMP size out of bounds",
                offset: temp_offset + 4,
            });
        }

        // `template_items_offset` is relative to the CRIM blob and marks
        // where the item descriptors begin; the BinXml body runs from the
        // end of the TEMP header up to it.
        let items_offset = read_u32(blob, temp_offset + 12)? as usize;
        let binxml_start = temp_offset + TEMP_HEADER_SIZE;
        let binxml_end = if items_offset > binxml_start && items_offset <= temp_offset + temp_size {
            items_offset
        } else {
            temp_offset + temp_size
        };

        let mut guid_bytes = [0u8; 16];
        guid_bytes.copy_from_slice(blob.get(temp_offset + 24..temp_offset + 40).ok_or(
            WevtError::MalformedManifest {
                message: "TEMP guid out of bounds",
                offset: temp_offset + 24,
            },
        )?);

        templates.push(WevtTemplateBlob {
            guid: Guid::from_le_bytes(&guid_bytes),
            bytes: blob[binxml_start..binxml_end].to_vec(),
        });

        temp_offset += temp_size;
    }

    Ok(())
}

fn read_u32(blob: &[u8], offset: usize) -> Result<u32, WevtError> {
    blob.get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(WevtError::MalformedManifest {
            message: "read out of bounds",
            offset,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal CRIM: one provider, one TTBL, one TEMP with a 4-byte body.
    fn synthetic_crim(guid_bytes: [u8; 16], binxml: &[u8]) -> Vec<u8> {
        let provider_data_off: u32 = (CRIM_HEADER_SIZE + PROVIDER_DESCRIPTOR_SIZE) as u32;
        let wevt_size: u32 = (WEVT_HEADER_SIZE + 8) as u32;
        let ttbl_off: u32 = provider_data_off + wevt_size;
        let temp_off: u32 = ttbl_off + TTBL_HEADER_SIZE as u32;
        let temp_size: u32 = TEMP_HEADER_SIZE as u32 + binxml.len() as u32;
        let ttbl_size: u32 = TTBL_HEADER_SIZE as u32 + temp_size;
        let total = (ttbl_off + ttbl_size) as usize;

        let mut blob = Vec::with_capacity(total);
        blob.extend_from_slice(b"CRIM");
        blob.extend_from_slice(&(total as u32).to_le_bytes());
        blob.extend_from_slice(&3u16.to_le_bytes());
        blob.extend_from_slice(&1u16.to_le_bytes());
        blob.extend_from_slice(&1u32.to_le_bytes()); // provider count

        blob.extend_from_slice(&[0u8; 16]); // provider guid
        blob.extend_from_slice(&provider_data_off.to_le_bytes());

        blob.extend_from_slice(b"WEVT");
        blob.extend_from_slice(&wevt_size.to_le_bytes());
        blob.extend_from_slice(&0xffff_ffffu32.to_le_bytes()); // message table id
        blob.extend_from_slice(&1u32.to_le_bytes()); // descriptor count
        blob.extend_from_slice(&0u32.to_le_bytes()); // unknown count
        blob.extend_from_slice(&ttbl_off.to_le_bytes());
        blob.extend_from_slice(&0u32.to_le_bytes());

        blob.extend_from_slice(b"TTBL");
        blob.extend_from_slice(&ttbl_size.to_le_bytes());
        blob.extend_from_slice(&1u32.to_le_bytes()); // template count

        blob.extend_from_slice(b"TEMP");
        blob.extend_from_slice(&temp_size.to_le_bytes());
        blob.extend_from_slice(&0u32.to_le_bytes()); // item descriptor count
        blob.extend_from_slice(&0u32.to_le_bytes()); // item name count
        blob.extend_from_slice(&(temp_off + temp_size).to_le_bytes()); // items offset
        blob.extend_from_slice(&1u32.to_le_bytes()); // event type
        blob.extend_from_slice(&guid_bytes);
        blob.extend_from_slice(binxml);

        assert_eq!(blob.len(), total);
        blob
    }

    #[test]
    fn parses_synthetic_crim() {
        let guid_bytes = [0x11u8; 16];
        let binxml = [0x0f, 0x01, 0x01, 0x00];
        let blob = synthetic_crim(guid_bytes, &binxml);

        let templates = parse_crim(&blob).unwrap();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].guid, Guid::from_le_bytes(&guid_bytes));
        assert_eq!(templates[0].bytes, binxml);
    }

    #[test]
    fn rejects_missing_magic() {
        assert!(matches!(
            parse_crim(b"NOPE"),
            Err(WevtError::MalformedManifest { offset: 0, .. })
        ));
    }
}
