//! Property-based tests for the universal extraction invariants.

#![allow(clippy::unwrap_used)]

use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use proptest::prelude::*;
use tempfile::TempDir;
use unpax::Config;
use unpax::extract;
use unpax::target::DiskTarget;
use unpax::target::MemoryFs;

fn raw_tar(entries: &[(String, tar::EntryType, String, Vec<u8>)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, entry_type, link, data) in entries {
        if name.len() >= 100 || link.len() >= 100 {
            continue;
        }
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(*entry_type);
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        {
            let gnu = header.as_gnu_mut().unwrap();
            gnu.name[..name.len()].copy_from_slice(name.as_bytes());
            gnu.linkname[..link.len()].copy_from_slice(link.as_bytes());
        }
        header.set_cksum();
        builder.append(&header, data.as_slice()).unwrap();
    }
    builder.into_inner().unwrap()
}

/// Entry names mixing benign relative paths with traversal and
/// absolute-prefix attempts.
fn name_strategy() -> impl Strategy<Value = String> {
    let component = "[a-z]{1,6}";
    let benign = proptest::collection::vec(component, 1..4).prop_map(|c| c.join("/"));
    prop_oneof![
        3 => benign.clone(),
        1 => benign.clone().prop_map(|n| format!("../{n}")),
        1 => benign.clone().prop_map(|n| format!("../../../{n}")),
        1 => benign.clone().prop_map(|n| format!("/{n}")),
        1 => benign.prop_map(|n| format!("a/../../{n}")),
    ]
}

fn jailed_dest() -> (TempDir, PathBuf) {
    let outer = TempDir::new().unwrap();
    let dest = outer.path().join("dest");
    fs::create_dir(&dest).unwrap();
    (outer, dest)
}

fn walk_files(root: &Path, out: &mut Vec<PathBuf>) {
    for entry in fs::read_dir(root).unwrap() {
        let entry = entry.unwrap();
        let path = entry.path();
        let file_type = entry.file_type().unwrap();
        if file_type.is_dir() {
            walk_files(&path, out);
        } else {
            out.push(path);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    // Invariant 1: no created path escapes the destination root.
    #[test]
    fn no_file_escapes_destination(
        names in proptest::collection::vec(name_strategy(), 1..8),
        payload in proptest::collection::vec(any::<u8>(), 0..64),
    ) {
        let entries: Vec<_> = names
            .into_iter()
            .map(|n| (n, tar::EntryType::Regular, String::new(), payload.clone()))
            .collect();
        let archive = raw_tar(&entries);

        let (outer, dest) = jailed_dest();
        let config = Config { continue_on_error: true, overwrite: true, ..Config::default() };
        let _ = extract(&archive[..], &dest, &DiskTarget::new(), &config);

        let mut outer_names: Vec<String> = fs::read_dir(outer.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        outer_names.sort();
        prop_assert_eq!(outer_names, vec!["dest".to_owned()]);
    }

    // Invariant 2: every created symlink's resolved target stays inside
    // the destination root.
    #[test]
    fn no_symlink_resolves_outside_destination(
        names in proptest::collection::vec(name_strategy(), 1..6),
        targets in proptest::collection::vec(name_strategy(), 1..6),
    ) {
        let entries: Vec<_> = names
            .iter()
            .zip(targets.iter())
            .map(|(n, t)| (n.clone(), tar::EntryType::Symlink, t.clone(), Vec::new()))
            .collect();
        let archive = raw_tar(&entries);

        let (_outer, dest) = jailed_dest();
        let config = Config { continue_on_error: true, overwrite: true, ..Config::default() };
        let _ = extract(&archive[..], &dest, &DiskTarget::new(), &config);

        let canonical_dest = dest.canonicalize().unwrap();
        let mut created = Vec::new();
        walk_files(&dest, &mut created);
        for path in created {
            if path.symlink_metadata().unwrap().is_symlink() {
                let target = fs::read_link(&path).unwrap();
                let resolved = path.parent().unwrap().join(&target);
                // Lexical normalisation mirroring the boundary's check.
                let mut stack = Vec::new();
                for comp in resolved.components() {
                    match comp {
                        std::path::Component::ParentDir => { stack.pop(); }
                        std::path::Component::CurDir => {}
                        other => stack.push(other),
                    }
                }
                let normalised: PathBuf = stack.iter().collect();
                prop_assert!(
                    normalised.starts_with(&canonical_dest) || normalised.starts_with(&dest),
                    "symlink {} -> {} escapes dest",
                    path.display(),
                    target.display()
                );
            }
        }
    }

    // Invariant 3: bytes written never exceed max_extraction_size.
    #[test]
    fn extraction_size_cap_holds(
        sizes in proptest::collection::vec(0usize..512, 1..8),
        cap in 0i64..1024,
    ) {
        let entries: Vec<_> = sizes
            .iter()
            .enumerate()
            .map(|(i, size)| {
                (format!("file-{i}"), tar::EntryType::Regular, String::new(), vec![7u8; *size])
            })
            .collect();
        let archive = raw_tar(&entries);

        let (_outer, dest) = jailed_dest();
        let config = Config {
            continue_on_error: true,
            max_extraction_size: cap,
            ..Config::default()
        };
        let _ = extract(&archive[..], &dest, &DiskTarget::new(), &config);

        let mut created = Vec::new();
        walk_files(&dest, &mut created);
        let total: u64 = created
            .iter()
            .map(|p| p.symlink_metadata().unwrap().len())
            .sum();
        prop_assert!(total <= u64::try_from(cap).unwrap());
    }

    // Invariant 4: the number of created entries never exceeds max_files.
    #[test]
    fn file_count_cap_holds(count in 1usize..12, cap in 0i64..8) {
        let entries: Vec<_> = (0..count)
            .map(|i| (format!("f{i}"), tar::EntryType::Regular, String::new(), b"x".to_vec()))
            .collect();
        let archive = raw_tar(&entries);

        let (_outer, dest) = jailed_dest();
        let config = Config { max_files: cap, ..Config::default() };
        let _ = extract(&archive[..], &dest, &DiskTarget::new(), &config);

        let mut created = Vec::new();
        walk_files(&dest, &mut created);
        prop_assert!(created.len() as i64 <= cap);
    }

    // Invariant 5: telemetry is emitted exactly once per run, for valid
    // and garbage inputs alike.
    #[test]
    fn telemetry_emitted_exactly_once(input in proptest::collection::vec(any::<u8>(), 0..512)) {
        let calls = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&calls);
        let config = Config {
            telemetry_hook: Some(Arc::new(move |_: &unpax::Telemetry| {
                *sink.lock().unwrap() += 1;
            })),
            ..Config::default()
        };

        let fs = MemoryFs::new();
        let _ = extract(&input[..], Path::new("."), &fs, &config);
        prop_assert_eq!(*calls.lock().unwrap(), 1);
    }

    // Invariant 6: decompression round-trip derives `X` from `X.<ext>`
    // and preserves the exact bytes.
    #[test]
    fn output_name_roundtrip(
        base in "[a-z]{1,10}",
        content in proptest::collection::vec(any::<u8>(), 0..256),
    ) {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&content).unwrap();
        let gz = encoder.finish().unwrap();

        let outer = TempDir::new().unwrap();
        let input_path = outer.path().join(format!("{base}.gz"));
        fs::write(&input_path, &gz).unwrap();

        let fs_target = MemoryFs::new();
        unpax::extract_file(&input_path, Path::new("."), &fs_target, &Config::default())
            .unwrap();
        prop_assert_eq!(fs_target.read_file(&base).unwrap(), content);
    }
}
