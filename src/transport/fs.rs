use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::constants::layout::{NAME_DELIMITER, TEMP_SUFFIX};
use crate::errors::CurationError;
use crate::types::ItemId;

/// Directory name for one exported unit: `<attempt>_<main_id>`.
pub fn batch_dir_name(attempt: usize, main_id: &str) -> String {
    format!("{attempt}{NAME_DELIMITER}{main_id}")
}

/// File name for one member of an exported unit: `<position>_<id>.<extension>`.
pub fn member_file_name(position: usize, id: &str, extension: &str) -> String {
    format!("{position}{NAME_DELIMITER}{id}.{extension}")
}

/// Whether `id` can be embedded in a directory or file name under the export root.
///
/// Rejects empty ids, `.`/`..`, path separators, and NUL.
pub fn is_path_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\', '\0'])
}

/// Split `<number>_<id>` into its parts. The id may itself contain the delimiter.
pub fn parse_prefixed_name(name: &str) -> Option<(usize, ItemId)> {
    let (prefix, id) = name.split_once(NAME_DELIMITER)?;
    if id.is_empty() {
        return None;
    }
    let number = prefix.parse().ok()?;
    Some((number, id.to_string()))
}

/// Parse a member file name, dropping its final extension.
pub fn parse_member_file_name(name: &str) -> Option<(usize, ItemId)> {
    let stem = Path::new(name).file_stem()?.to_str()?;
    parse_prefixed_name(stem)
}

/// One exported unit found under the export root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportedDir {
    /// Absolute or root-relative directory path.
    pub path: PathBuf,
    /// Attempt index parsed from the directory name.
    pub attempt: usize,
    /// Main item id parsed from the directory name.
    pub main_id: ItemId,
}

/// Entry directly under the export root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RootEntry {
    /// A well-formed unit directory.
    Batch(ExportedDir),
    /// A non-directory entry (the manifest, stray files).
    NotADirectory(PathBuf),
    /// A directory whose name does not follow `<attempt>_<main_id>`.
    Unrecognized(PathBuf),
}

/// One file inside an exported unit directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemberEntry {
    /// A file named `<position>_<id>.<ext>`.
    Member {
        /// Position parsed from the name.
        position: usize,
        /// Item id parsed from the name.
        id: ItemId,
        /// File path.
        path: PathBuf,
    },
    /// A file whose name cannot be parsed.
    Unrecognized(PathBuf),
}

/// List the entries directly under `root`, sorted by file name.
pub fn scan_export_root(root: &Path) -> Result<Vec<RootEntry>, CurationError> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(walk_err)?;
        let path = entry.path().to_path_buf();
        if !entry.file_type().is_dir() {
            entries.push(RootEntry::NotADirectory(path));
            continue;
        }
        let parsed = entry
            .file_name()
            .to_str()
            .and_then(parse_prefixed_name);
        match parsed {
            Some((attempt, main_id)) => entries.push(RootEntry::Batch(ExportedDir {
                path,
                attempt,
                main_id,
            })),
            None => entries.push(RootEntry::Unrecognized(path)),
        }
    }
    Ok(entries)
}

/// List the files inside one unit directory, sorted by file name.
pub fn list_member_files(dir: &Path) -> Result<Vec<MemberEntry>, CurationError> {
    let mut members = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(walk_err)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path().to_path_buf();
        match entry.file_name().to_str().and_then(parse_member_file_name) {
            Some((position, id)) => members.push(MemberEntry::Member { position, id, path }),
            None => members.push(MemberEntry::Unrecognized(path)),
        }
    }
    Ok(members)
}

/// Create `root` if missing; fail when it exists and already has entries.
pub fn prepare_export_root(root: &Path) -> Result<(), CurationError> {
    if root.exists() {
        if !root.is_dir() {
            return Err(CurationError::Layout(format!(
                "export root {} exists and is not a directory",
                root.display()
            )));
        }
        if fs::read_dir(root)?.next().is_some() {
            return Err(CurationError::Layout(format!(
                "export root {} already has content; choose an empty directory",
                root.display()
            )));
        }
        return Ok(());
    }
    fs::create_dir_all(root)?;
    Ok(())
}

/// Write `payload` to `path` through a temp file and rename.
pub fn write_atomic(path: &Path, payload: &[u8]) -> Result<(), CurationError> {
    ensure_parent_dir(path)?;
    let temp = path.with_extension(TEMP_SUFFIX);
    fs::write(&temp, payload)?;
    fs::rename(&temp, path)?;
    Ok(())
}

/// Serialize `value` as pretty JSON with 4-space indentation and write it atomically.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), CurationError> {
    let mut payload = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut payload, formatter);
    value.serialize(&mut serializer)?;
    write_atomic(path, &payload)
}

fn ensure_parent_dir(path: &Path) -> Result<(), CurationError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn walk_err(err: walkdir::Error) -> CurationError {
    match err.into_io_error() {
        Some(io) => CurationError::Io(io),
        None => CurationError::Layout("filesystem loop while scanning export root".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn names_round_trip_through_parsers() {
        assert_eq!(batch_dir_name(3, "abc"), "3_abc");
        assert_eq!(member_file_name(0, "abc", "jpg"), "0_abc.jpg");
        assert_eq!(parse_prefixed_name("3_abc"), Some((3, "abc".to_string())));
        assert_eq!(
            parse_member_file_name("2_id_with_underscores.jpg"),
            Some((2, "id_with_underscores".to_string()))
        );
    }

    #[test]
    fn malformed_names_are_rejected() {
        assert_eq!(parse_prefixed_name("samples.json"), None);
        assert_eq!(parse_prefixed_name("x_abc"), None);
        assert_eq!(parse_prefixed_name("4_"), None);
        assert_eq!(parse_member_file_name(".DS_Store"), None);
    }

    #[test]
    fn ids_that_would_escape_the_unit_directory_are_unsafe() {
        for id in ["", ".", "..", "../etc", "a/b", "a\\b", "nul\0id"] {
            assert!(!is_path_safe_id(id), "{id:?} accepted");
        }
        for id in ["abc", "a.b", "..hidden", "id_with_underscores", "9f1c-uuid"] {
            assert!(is_path_safe_id(id), "{id:?} rejected");
        }
    }

    #[test]
    fn scan_classifies_root_entries_in_name_order() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::create_dir(root.join("1_bbb")).unwrap();
        fs::create_dir(root.join("0_aaa")).unwrap();
        fs::create_dir(root.join("scratch")).unwrap();
        fs::write(root.join("samples.json"), b"{}").unwrap();

        let entries = scan_export_root(root).unwrap();
        assert_eq!(entries.len(), 4);
        assert!(matches!(&entries[0], RootEntry::Batch(dir) if dir.main_id == "aaa" && dir.attempt == 0));
        assert!(matches!(&entries[1], RootEntry::Batch(dir) if dir.main_id == "bbb"));
        assert!(matches!(&entries[2], RootEntry::NotADirectory(_)));
        assert!(matches!(&entries[3], RootEntry::Unrecognized(_)));
    }

    #[test]
    fn member_listing_parses_positions_and_flags_strays() {
        let temp = tempdir().unwrap();
        let dir = temp.path();
        fs::write(dir.join("0_main.jpg"), b"m").unwrap();
        fs::write(dir.join("2_other.jpg"), b"o").unwrap();
        fs::write(dir.join("notes.txt"), b"n").unwrap();

        let members = list_member_files(dir).unwrap();
        assert_eq!(members.len(), 3);
        assert!(matches!(&members[0], MemberEntry::Member { position: 0, id, .. } if id == "main"));
        assert!(matches!(&members[1], MemberEntry::Member { position: 2, id, .. } if id == "other"));
        assert!(matches!(&members[2], MemberEntry::Unrecognized(_)));
    }

    #[test]
    fn prepare_export_root_requires_empty_directory() {
        let temp = tempdir().unwrap();
        let fresh = temp.path().join("fresh");
        prepare_export_root(&fresh).unwrap();
        assert!(fresh.is_dir());
        prepare_export_root(&fresh).unwrap();

        fs::write(fresh.join("leftover"), b"x").unwrap();
        let err = prepare_export_root(&fresh).unwrap_err();
        assert!(matches!(err, CurationError::Layout(_)));
    }

    #[test]
    fn write_json_atomic_uses_four_space_indent_and_leaves_no_temp() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nested").join("log.json");
        write_json_atomic(&path, &vec![1, 2]).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        assert_eq!(raw, "[\n    1,\n    2\n]");
        assert!(!path.with_extension(TEMP_SUFFIX).exists());
    }
}
