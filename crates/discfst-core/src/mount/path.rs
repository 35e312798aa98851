//! Path resolution against the entry tree.

use crate::fs::{EntryId, EntryTree, MAX_NAME_LEN};

const SEPARATOR: char = '/';

/// Strip an optional `device:` prefix. A prefix naming another device fails.
pub fn strip_device<'a>(path: &'a str, device: &str) -> Option<&'a str> {
    match path.split_once(':') {
        None => Some(path),
        Some((prefix, rest)) if prefix == device => Some(rest),
        Some(_) => None,
    }
}

/// Resolve `path` to an entry.
///
/// Absolute paths start at the root and relative ones at `cwd`. Names match
/// case-insensitively (ASCII). A component followed by more path only
/// matches directories, so a file sharing a directory's name is skipped.
/// A trailing separator after a directory is accepted.
pub fn resolve(tree: &EntryTree, cwd: EntryId, device: &str, path: &str) -> Option<EntryId> {
    let path = strip_device(path, device)?;
    let root = tree.root();

    let (mut dir, mut rest) = match path.strip_prefix(SEPARATOR) {
        Some(after) => {
            let after = after.trim_start_matches(SEPARATOR);
            if after.is_empty() {
                return Some(root);
            }
            (root, after)
        }
        None => (cwd, path),
    };
    if dir == root && rest == "." {
        return Some(root);
    }

    loop {
        let (component, remainder) = match rest.split_once(SEPARATOR) {
            Some((component, remainder)) => (component, Some(remainder)),
            None => (rest, None),
        };
        if component.len() >= MAX_NAME_LEN {
            return None;
        }

        let entry = tree.children(dir).iter().copied().find(|&id| {
            let entry = &tree[id];
            entry.name.eq_ignore_ascii_case(component) && (remainder.is_none() || entry.is_dir())
        })?;

        match remainder.map(|r| r.trim_start_matches(SEPARATOR)) {
            None | Some("") => return Some(entry),
            Some(next) => {
                dir = entry;
                rest = next;
            }
        }
    }
}

/// Absolute path of `id`, built by searching down from the root.
pub fn path_of(tree: &EntryTree, id: EntryId) -> Option<String> {
    if id == tree.root() {
        return Some("/".to_string());
    }
    let mut stack = vec![(tree.root(), String::new())];
    while let Some((dir, prefix)) = stack.pop() {
        for &child in tree.children(dir) {
            let path = format!("{prefix}/{}", tree[child].name);
            if child == id {
                return Some(path);
            }
            if tree[child].is_dir() {
                stack.push((child, path));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::EntryKind;

    fn dir() -> EntryKind {
        EntryKind::Directory {
            children: Vec::new(),
            fst_index: None,
        }
    }

    fn file() -> EntryKind {
        EntryKind::EncryptedFile {
            plaintext_offset: 0,
            size: 4,
        }
    }

    /// /0/{Sys (file), sys/, A.TXT}, /0/sys/main.dol, /0_metadata/
    fn sample() -> (EntryTree, EntryId, EntryId, EntryId, EntryId) {
        let mut tree = EntryTree::new();
        let root = tree.root();
        let part = tree.add_child(root, "0", 0, dir()).unwrap();
        tree.add_child(root, "0_metadata", 0, dir()).unwrap();
        let sys_file = tree.add_child(part, "Sys", 0, file()).unwrap();
        let sys_dir = tree.add_child(part, "sys", 0, dir()).unwrap();
        tree.add_child(part, "A.TXT", 0, file()).unwrap();
        let dol = tree.add_child(sys_dir, "main.dol", 0, file()).unwrap();
        (tree, part, sys_file, sys_dir, dol)
    }

    #[test]
    fn test_root_forms() {
        let (tree, part, ..) = sample();
        let root = tree.root();
        assert_eq!(resolve(&tree, part, "fst", "/"), Some(root));
        assert_eq!(resolve(&tree, part, "fst", "///"), Some(root));
        assert_eq!(resolve(&tree, part, "fst", "fst:/"), Some(root));
        assert_eq!(resolve(&tree, root, "fst", "."), Some(root));
        // "." only means the root when already there
        assert_eq!(resolve(&tree, part, "fst", "."), None);
    }

    #[test]
    fn test_case_insensitive() {
        let (tree, ..) = sample();
        let a = resolve(&tree, tree.root(), "fst", "/0/A.TXT").unwrap();
        assert_eq!(resolve(&tree, tree.root(), "fst", "/0/a.txt"), Some(a));
        assert_eq!(resolve(&tree, tree.root(), "fst", "fst:/0/A.tXt"), Some(a));
    }

    #[test]
    fn test_file_skipped_for_intermediate_component() {
        let (tree, _, sys_file, _, dol) = sample();
        // "Sys" the file comes first, but "sys/..." needs a directory
        assert_eq!(
            resolve(&tree, tree.root(), "fst", "/0/SYS/main.dol"),
            Some(dol)
        );
        // As the last component the first case-insensitive match wins
        assert_eq!(resolve(&tree, tree.root(), "fst", "/0/sys"), Some(sys_file));
    }

    #[test]
    fn test_trailing_and_repeated_separators() {
        let (tree, _, _, sys_dir, dol) = sample();
        assert_eq!(resolve(&tree, tree.root(), "fst", "/0/sys/"), Some(sys_dir));
        assert_eq!(
            resolve(&tree, tree.root(), "fst", "//0//sys///main.dol"),
            Some(dol)
        );
    }

    #[test]
    fn test_relative_to_cwd() {
        let (tree, part, _, _, dol) = sample();
        assert_eq!(resolve(&tree, part, "fst", "sys/main.dol"), Some(dol));
        assert_eq!(resolve(&tree, part, "fst", ""), None);
    }

    #[test]
    fn test_wrong_device_prefix() {
        let (tree, ..) = sample();
        assert_eq!(resolve(&tree, tree.root(), "fst", "sd:/0"), None);
        assert_eq!(resolve(&tree, tree.root(), "fst", "FST:/0"), None);
    }

    #[test]
    fn test_missing_and_overlong() {
        let (tree, ..) = sample();
        assert_eq!(resolve(&tree, tree.root(), "fst", "/1"), None);
        assert_eq!(resolve(&tree, tree.root(), "fst", "/0/A.TXT/x"), None);
        let long = format!("/{}", "a".repeat(MAX_NAME_LEN));
        assert_eq!(resolve(&tree, tree.root(), "fst", &long), None);
    }

    #[test]
    fn test_path_of() {
        let (tree, _, _, _, dol) = sample();
        assert_eq!(path_of(&tree, tree.root()).unwrap(), "/");
        assert_eq!(path_of(&tree, dol).unwrap(), "/0/sys/main.dol");
    }
}
