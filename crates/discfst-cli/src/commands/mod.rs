pub mod cat;
pub mod completions;
pub mod extract;
pub mod info;
pub mod ls;
pub mod tree;

/// Normalize a disc path to ensure it starts with `/`.
/// This makes paths like `0/file.bin` work the same as `/0/file.bin`.
/// Paths carrying a `device:` prefix are left alone.
pub fn normalize_path(path: &str) -> String {
    let has_device = path
        .split_once(':')
        .is_some_and(|(device, _)| !device.contains('/'));
    if path.starts_with('/') || has_device {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Append `name` to a normalized directory path.
pub fn join_path(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    format!("{dir}/{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("0/a.bin"), "/0/a.bin");
        assert_eq!(normalize_path("/0"), "/0");
        assert_eq!(normalize_path("fst:/0/a.bin"), "fst:/0/a.bin");
        assert_eq!(normalize_path("0/odd:name"), "/0/odd:name");
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/", "0"), "/0");
        assert_eq!(join_path("/0/", "a"), "/0/a");
        assert_eq!(join_path("/0/data", "b"), "/0/data/b");
    }
}
