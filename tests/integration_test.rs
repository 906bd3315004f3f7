use hapi::builder::{build_buffer, build_context, BuildOptions, Node};
use hapi::{HapiContext, HapiError, ItemFilter};
use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use tempfile::NamedTempFile;

/// xorshift bytes; incompressible enough to defeat deflate.
fn noise(len: usize, mut seed: u32) -> Vec<u8> {
    (0..len)
        .map(|_| {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            seed as u8
        })
        .collect()
}

fn text(len: usize) -> Vec<u8> {
    b"[UNITINFO] { Name=Commander; } ".iter().copied().cycle().take(len).collect()
}

/// The forest together with the `path -> content` map it should load as.
fn sample() -> (Vec<Node>, BTreeMap<String, Vec<u8>>) {
    let files: Vec<(&str, Vec<u8>)> = vec![
        ("/empty.txt", Vec::new()),
        ("/tiny.txt", b"tiny".to_vec()),
        ("/units/exact19.bin", text(19)),
        ("/units/just20.bin", text(20)),
        ("/units/armcom.fbi", text(5000)),
        ("/units/deep/noise.bin", noise(3000, 7)),
        ("/units/deep/corcom.fbi", text(70_000)),
        ("/anims/empty/", Vec::new()),
    ];
    let forest = vec![
        Node::file("empty.txt", Vec::new()),
        Node::directory("units", vec![
            Node::file("exact19.bin", text(19)),
            Node::directory("deep", vec![
                Node::reader("noise.bin", 3000, Cursor::new(noise(3000, 7))),
                Node::file("corcom.fbi", text(70_000)),
            ]),
            Node::file("just20.bin", text(20)),
            Node::file("armcom.fbi", text(5000)),
        ]),
        Node::directory("anims", vec![Node::directory("empty", Vec::new())]),
        Node::file("tiny.txt", b"tiny".to_vec()),
    ];
    let expected = files
        .into_iter()
        .filter(|(path, _)| !path.ends_with('/'))
        .map(|(path, data)| (path.to_owned(), data))
        .collect();
    (forest, expected)
}

fn contents(ctx: &HapiContext) -> BTreeMap<String, Vec<u8>> {
    ctx.find_children("*", None, ItemFilter::EntryOnly, true)
        .into_iter()
        .map(|id| (ctx.item(id).path().to_owned(), ctx.extract_as_buffer(id).unwrap().into_owned()))
        .collect()
}

#[test]
fn build_load_extract_round_trip() {
    let (forest, expected) = sample();
    let bytes = build_buffer(forest, &BuildOptions::default()).unwrap();
    let ctx = HapiContext::load(bytes).unwrap();

    assert_eq!(contents(&ctx), expected);
    assert!(ctx.find_child_at("/anims/empty/").is_some());
    assert_eq!(ctx.tree().entries().count(), expected.len());
}

#[test]
fn built_and_loaded_contexts_agree() {
    let (forest, _) = sample();
    let built = build_context(forest, &BuildOptions::default()).unwrap();
    let loaded = HapiContext::load(built.file().to_vec()).unwrap();

    assert_eq!(contents(&built), contents(&loaded));
    assert_eq!(built.tree().to_string(), loaded.tree().to_string());
    assert_eq!(built.header(), loaded.header());
    assert_eq!(built.directory_buffer(), loaded.directory_buffer());
    assert_eq!(built.names_buffer(), loaded.names_buffer());
}

#[test]
fn non_ascii_names_are_stripped_not_lost() {
    let forest = vec![Node::directory("dossiér", vec![Node::file("héllo✓.txt", text(100))])];
    let ctx = HapiContext::load(build_buffer(forest, &BuildOptions::default()).unwrap()).unwrap();

    let entries: Vec<_> = ctx.tree().entries().collect();
    assert_eq!(entries.len(), 1);
    let item = ctx.item(entries[0]);
    assert!(item.path().is_ascii());
    assert_eq!(item.path(), "/dossir/hllo.txt");
    assert_eq!(ctx.extract_as_buffer(entries[0]).unwrap().as_ref(), text(100).as_slice());
}

#[test]
fn incompressible_files_are_stored_raw() {
    let data = noise(4096, 99);
    let forest = vec![Node::file("noise.bin", data.clone())];
    let ctx = HapiContext::load(build_buffer(forest, &BuildOptions::default()).unwrap()).unwrap();

    let id = ctx.find_child_at("/noise.bin").unwrap();
    let record = ctx.item(id).entry_record().copied().unwrap();
    assert_eq!(record.compressed_size, 0);
    assert_eq!(record.flat_size, 4096);
    let start = record.data_start_ptr as usize;
    assert_eq!(&ctx.file()[start..start + 4096], data.as_slice());
    assert_eq!(ctx.extract_as_buffer(id).unwrap().as_ref(), data.as_slice());
}

#[test]
fn streaming_matches_whole_buffer() {
    let (forest, _) = sample();
    let ctx = HapiContext::load(build_buffer(forest, &BuildOptions::default()).unwrap()).unwrap();

    for id in ctx.tree().entries() {
        let mut streamed = Vec::new();
        for chunk in ctx.item_reader(id).unwrap() {
            streamed.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(streamed, ctx.extract_as_buffer(id).unwrap().as_ref(), "{}", ctx.item(id).path());
        let (stored, computed) = ctx.verify_entry(id).unwrap();
        assert_eq!(stored, computed, "{}", ctx.item(id).path());
    }
}

#[test]
fn glob_lookup_honours_limit_and_filter() {
    let mut units = Vec::new();
    for i in 0..4 {
        units.push(Node::file(format!("unit{i}.fbi"), text(40)));
    }
    units.push(Node::directory("nested.fbi", vec![
        Node::file("ARMCOM.FBI", text(40)),
        Node::file("corcom.fbi", text(40)),
    ]));
    let forest = vec![Node::directory("unitscb", units), Node::file("verpar.fbi", text(40))];
    let ctx = HapiContext::load(build_buffer(forest, &BuildOptions::default()).unwrap()).unwrap();

    let found = ctx.find_children("*.fbi", Some(5), ItemFilter::EntryOnly, true);
    assert_eq!(found.len(), 5);
    for id in &found {
        let item = ctx.item(*id);
        assert!(!item.is_directory());
        assert!(item.name().to_lowercase().ends_with(".fbi"));
    }
    assert_eq!(ctx.find_children("*.fbi", None, ItemFilter::EntryOnly, true).len(), 7);
    assert_eq!(ctx.find_children("*.fbi", None, ItemFilter::Any, true).len(), 8);
}

#[test]
fn path_lookup_on_built_archive() {
    let forest = vec![
        Node::directory("unitscb", vec![Node::file("verpar.fbi", text(40))]),
        Node::file("somedir", text(10)),
    ];
    let ctx = HapiContext::load(build_buffer(forest, &BuildOptions::default()).unwrap()).unwrap();

    assert!(ctx.find_child_at("/unitscb/missing.fbi").is_none());
    let verpar = ctx.find_child_at("/unitscb/verpar.fbi").unwrap();
    let item = ctx.item(verpar);
    assert_eq!(item.name(), "verpar.fbi");
    assert_eq!(ctx.item(item.parent().unwrap()).name(), "unitscb");

    assert!(ctx.find_child_at("/somedir").is_some());
    assert!(ctx.find_child_at("/somedir/").is_none());
}

#[test]
fn open_from_disk() {
    let (forest, expected) = sample();
    let bytes = build_buffer(forest, &BuildOptions::default()).unwrap();

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&bytes).unwrap();
    file.flush().unwrap();

    let ctx = HapiContext::open(file.path()).unwrap();
    assert_eq!(contents(&ctx), expected);
    assert_eq!(ctx.into_bytes(), bytes);
}

#[test]
fn corrupted_payload_is_detected() {
    let forest = vec![Node::file("armcom.fbi", text(5000))];
    let bytes = build_buffer(forest, &BuildOptions::default()).unwrap();
    let ctx = HapiContext::load(bytes.clone()).unwrap();
    let id = ctx.find_child_at("/armcom.fbi").unwrap();
    let start = ctx.item(id).entry_record().unwrap().data_start_ptr as usize;

    let mut corrupt = bytes;
    corrupt[start + 19 + 3] ^= 0x40;
    let ctx = HapiContext::load(corrupt).unwrap();
    assert!(matches!(ctx.extract_as_buffer(id), Err(HapiError::ChecksumMismatch { .. })));
    let mut reader = ctx.item_reader(id).unwrap();
    assert!(matches!(reader.next_chunk(), Err(HapiError::ChecksumMismatch { .. })));
    assert!(reader.next_chunk().unwrap().is_none());
}

#[test]
fn truncated_archive_fails_to_load() {
    let (forest, _) = sample();
    let bytes = build_buffer(forest, &BuildOptions::default()).unwrap();
    for len in [0, 7, 20, 31, bytes.len() - 1] {
        assert!(HapiContext::load(bytes[..len].to_vec()).is_err(), "prefix of {len} bytes loaded");
    }
}

#[test]
fn directories_cannot_be_extracted() {
    let (forest, _) = sample();
    let ctx = build_context(forest, &BuildOptions::default()).unwrap();
    let units = ctx.find_child_at("/units/").unwrap();
    assert!(matches!(ctx.extract_as_buffer(units), Err(HapiError::NotAnEntry { .. })));
    assert!(matches!(ctx.item_reader(units), Err(HapiError::NotAnEntry { .. })));
}
