#![cfg(feature = "wevt_templates")]

mod fixtures;

use fixtures::*;
use pretty_assertions::assert_eq;

use std::fs;

use evtxr::wevt::{extract_wevt, extract_wevt_template_resources, load_dir, parse_crim};
use evtxr::{Guid, GuidCache};

fn sample_templates() -> Vec<([u8; 16], Vec<u8>)> {
    vec![
        ([0x11; 16], vec![0x0f, 0x01, 0x01, 0x00, 0x00]),
        ([0x22; 16], vec![0x0f, 0x01, 0x01, 0x00, 0x00]),
        // Duplicate GUID; the cache resolves first-wins.
        ([0x11; 16], vec![0x0f, 0x01, 0x01, 0x00, 0x00]),
    ]
}

#[test]
fn extracts_wevt_resource_from_minimal_pe() {
    ensure_env_logger_initialized();

    let blob = synthetic_crim_blob(&sample_templates());
    let pe = minimal_pe_with_wevt_resource(&blob);

    let resources = extract_wevt_template_resources(&pe).unwrap();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].lang_id, 1033);
    assert_eq!(resources[0].data, blob);

    let first = extract_wevt(&pe).unwrap().unwrap();
    assert_eq!(&first[..4], b"CRIM");
}

#[test]
fn pe_without_wevt_resource_yields_nothing() {
    let mut pe = minimal_pe_with_wevt_resource(b"CRIM");
    // Rename the resource type so the lookup misses.
    let rsrc_name_offset = 0x400 + 0x58 + 2;
    pe[rsrc_name_offset] = b'X';

    assert_eq!(extract_wevt(&pe).unwrap(), None);
}

#[test]
fn non_pe_input_is_an_error() {
    assert!(extract_wevt(b"definitely not a PE").is_err());
}

#[test]
fn parses_crim_blob_into_guid_keyed_templates() {
    ensure_env_logger_initialized();

    let blob = synthetic_crim_blob(&sample_templates());
    let templates = parse_crim(&blob).unwrap();

    assert_eq!(templates.len(), 3);
    assert_eq!(templates[0].guid, Guid::from_le_bytes(&[0x11; 16]));
    assert_eq!(templates[1].guid, Guid::from_le_bytes(&[0x22; 16]));
    assert_eq!(templates[2].guid, Guid::from_le_bytes(&[0x11; 16]));
    assert_eq!(templates[0].bytes, vec![0x0f, 0x01, 0x01, 0x00, 0x00]);

    let unique: std::collections::HashSet<_> = templates.iter().map(|t| t.guid).collect();
    assert_eq!(unique.len(), 2);
}

#[test]
fn loading_the_same_directory_twice_inserts_nothing_new() {
    ensure_env_logger_initialized();

    let dir = tempfile::tempdir().unwrap();
    let blob = synthetic_crim_blob(&sample_templates());
    let pe = minimal_pe_with_wevt_resource(&blob);

    fs::write(dir.path().join("provider.dll"), &pe).unwrap();
    // A non-PE file in the directory is skipped, not fatal.
    fs::write(dir.path().join("readme.dll"), b"not a pe").unwrap();

    let cache = GuidCache::new();
    let first_load = load_dir(&cache, dir.path()).unwrap();
    assert_eq!(first_load, 2); // two unique GUIDs
    assert_eq!(cache.len(), 2);

    let second_load = load_dir(&cache, dir.path()).unwrap();
    assert_eq!(second_load, 0);
    assert_eq!(cache.len(), 2);
}

#[test]
fn manifest_preseed_wins_over_chunk_definitions() {
    ensure_env_logger_initialized();

    const TEMPLATE_GUID: [u8; 16] = [0x11; 16];

    let cache = std::sync::Arc::new(GuidCache::new());
    cache.populate_from_manifest(vec![(
        Guid::from_le_bytes(&TEMPLATE_GUID),
        vec![0xaa, 0xbb],
    )]);

    let mut chunk = ChunkBuilder::new();
    chunk.record_with(1, 0, |w| {
        w.fragment_header();
        w.template_instance(
            TEMPLATE_GUID,
            |f| {
                f.fragment_header();
                f.open_element("Event", false);
                f.close_start();
                f.substitution(0, 0x01, false);
                f.end_element();
                f.eof();
            },
            vec![Sub::utf16("from-chunk")],
        );
        w.eof();
    });

    let image = EvtxImageBuilder::new().chunk(chunk.build()).build();
    let parser = evtxr::EvtxParser::from_buffer(image).with_template_cache(cache.clone());
    let result = parser.parse().unwrap();

    // The chunk renders with the definition it observed, while the global
    // cache keeps the manifest entry (first-wins).
    assert_eq!(result.record_xmls, vec!["<Event>from-chunk</Event>".to_string()]);
    let blob = cache.get(&Guid::from_le_bytes(&TEMPLATE_GUID)).unwrap();
    assert_eq!(blob.bytes, vec![0xaa, 0xbb]);
    assert_eq!(cache.len(), 1);
}
