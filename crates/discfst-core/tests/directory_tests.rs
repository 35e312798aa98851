//! Path resolution and directory iteration over a mounted disc.

mod common;

use common::{Disc, mount, sample_image};
use discfst_core::mount::{DirFd, FsDevice};
use discfst_core::testing::assert_errno;

fn drain(disc: &mut Disc, dir: DirFd) -> Vec<(String, discfst_core::fs::Stat)> {
    let mut out = Vec::new();
    while let Ok(entry) = disc.dirnext(dir) {
        out.push(entry);
    }
    out
}

/// Every name from `dirnext` resolves back to a child with the same stat,
/// recursively.
fn check_roundtrip(disc: &mut Disc, path: &str) -> usize {
    let dir = disc.diropen(path).unwrap();
    let entries = drain(disc, dir);
    disc.dirclose(dir).unwrap();

    let mut seen = entries.len();
    for (name, stat) in entries {
        let child = if path.ends_with('/') {
            format!("{path}{name}")
        } else {
            format!("{path}/{name}")
        };
        assert_eq!(disc.stat(&child).unwrap(), stat, "{child}");
        if stat.is_dir() {
            seen += check_roundtrip(disc, &child);
        }
    }
    seen
}

#[test]
fn test_iteration_roundtrips_whole_tree() {
    let image = sample_image();
    let mut disc = mount(&image);
    let seen = check_roundtrip(&mut disc, "fst:/");
    // 2 top-level dirs, 6 metadata files, 7 FST entries below the root
    assert_eq!(seen, 2 + 6 + 7);
}

#[test]
fn test_children_keep_disc_order() {
    let image = sample_image();
    let mut disc = mount(&image);
    let dir = disc.diropen("/0/data").unwrap();
    let names: Vec<String> = drain(&mut disc, dir).into_iter().map(|(n, _)| n).collect();
    assert_eq!(names, ["big.bin", "nested", "Readme"]);
}

#[test]
fn test_empty_directory() {
    let image = sample_image();
    let mut disc = mount(&image);
    let dir = disc.diropen("/0/empty").unwrap();
    assert_errno(disc.dirnext(dir), libc::ENOENT, "empty dir");
}

#[test]
fn test_case_insensitive_paths() {
    let image = sample_image();
    let mut disc = mount(&image);
    let expected = disc.stat("/0/data/nested/deep.txt").unwrap();
    // The device prefix itself is case-sensitive
    assert!(disc.stat("FST:/0/DATA/Nested/DEEP.TXT").is_err());
    assert_eq!(disc.stat("fst:/0/DATA/Nested/DEEP.TXT").unwrap(), expected);
    assert_eq!(disc.read_to_end("/0/data/readme").unwrap(), b"read me");
}

#[test]
fn test_relative_paths_after_chdir() {
    let image = sample_image();
    let mut disc = mount(&image);
    disc.chdir("fst:/0/data").unwrap();
    assert_eq!(disc.read_to_end("nested/deep.txt").unwrap(), b"deep");
    let dir = disc.diropen("nested").unwrap();
    assert_eq!(drain(&mut disc, dir).len(), 1);
    // Absolute paths ignore the current directory
    assert_eq!(disc.read_to_end("/0/A.TXT").unwrap().len(), 26);
}

#[test]
fn test_root_aliases() {
    let image = sample_image();
    let disc = mount(&image);
    for path in ["/", "fst:/", "//", "."] {
        assert!(disc.stat(path).unwrap().is_dir(), "{path}");
    }
}

#[test]
fn test_walk_lists_everything() {
    let image = sample_image();
    let disc = mount(&image);
    let files: Vec<String> = disc
        .walk("/0")
        .unwrap()
        .filter(|(_, stat)| !stat.is_dir())
        .map(|(path, _)| path)
        .collect();
    let mut expected: Vec<&str> = image.files.iter().map(|f| f.path.as_str()).collect();
    expected.sort_unstable();
    let mut files = files;
    files.sort_unstable();
    assert_eq!(files, expected);
}
