//! Path classification.
//!
//! Decides what kind of database object a path holds from the names of its
//! immediate children, without opening any of them. Files are probed for
//! archives and, when one matches, classified by the archive's contents.

use std::sync::LazyLock;

use regex::Regex;
use strand_types::{ContentSignature, PathType, StructuralType};

use crate::archive::{ArchiveFormat, open_archive};
use crate::config::ArchiveConfig;
use crate::vfs::{VfsResult, VirtualDirectory, path};

static IDX_N: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^idx[0-9]+$").expect("static regex"));
static DATA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^data[0-9]*$").expect("static regex"));
static REV: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^r[0-9]{3}$").expect("static regex"));

/// Outcome of classifying one path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Classification {
    pub ty: PathType,
    /// Deleted-but-unreclaimed entries were seen. Never affects `ty`.
    pub zombies: bool,
}

impl Classification {
    fn new(ty: PathType) -> Self {
        Self { ty, zombies: false }
    }
}

/// Classification plus the archive directory a file was unwrapped into.
pub(crate) struct Resolved {
    pub class: Classification,
    pub archive: Option<VirtualDirectory>,
}

fn dir_bit(name: &str) -> ContentSignature {
    match name {
        "db" => ContentSignature::DB_DIR,
        "tbl" => ContentSignature::TBL_DIR,
        "idx" => ContentSignature::IDX_DIR,
        "col" => ContentSignature::COL_DIR,
        "md" => ContentSignature::MD_DIR,
        _ => ContentSignature::OTHER_DIR,
    }
}

fn file_bit(name: &str) -> ContentSignature {
    match name {
        "cur" => ContentSignature::CUR,
        "meta" => ContentSignature::META,
        "skey" => ContentSignature::SKEY,
        "sealed" => ContentSignature::SEALED,
        "lock" => ContentSignature::LOCK,
        n if IDX_N.is_match(n) => ContentSignature::IDX_N,
        n if DATA.is_match(n) => ContentSignature::DATA,
        n if REV.is_match(n) => ContentSignature::REV,
        _ => ContentSignature::OTHER_FILE,
    }
}

/// Fold the immediate children of `path` into a signature.
pub fn scan_signature(dir: &VirtualDirectory, path: &str) -> VfsResult<ContentSignature> {
    let mut sig = ContentSignature::empty();
    for entry in dir.list(path)? {
        sig |= match entry.kind.ty {
            StructuralType::Directory => dir_bit(&entry.name),
            StructuralType::ZombieFile => ContentSignature::ZOMBIE,
            _ => file_bit(&entry.name),
        };
    }
    Ok(sig)
}

/// Second-to-last component of `path` as the medium names it.
fn parent_component(dir: &VirtualDirectory, path: &str) -> Option<String> {
    let full = dir
        .resolve_path(path)
        .ok()
        .or_else(|| path::normalize(path).ok())?;
    let parts: Vec<&str> = full
        .split(['/', '\\'])
        .filter(|c| !c.is_empty() && *c != ".")
        .collect();
    let i = parts.len().checked_sub(2)?;
    Some(parts[i].to_string())
}

fn join(path: &str, name: &str) -> String {
    match path {
        "" | "." => name.to_string(),
        p => format!("{}/{name}", p.trim_end_matches('/')),
    }
}

/// Applies the directory rules and unwraps archives.
#[derive(Debug, Clone)]
pub struct Classifier {
    formats: Vec<ArchiveFormat>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(&ArchiveConfig::default())
    }
}

impl Classifier {
    pub fn new(config: &ArchiveConfig) -> Self {
        Self {
            formats: config.formats.clone(),
        }
    }

    pub fn formats(&self) -> &[ArchiveFormat] {
        &self.formats
    }

    /// Classify `path` relative to `dir`.
    ///
    /// Never fails: unreadable directories classify as plain directories and
    /// unreadable files as plain files.
    pub fn classify(&self, dir: &VirtualDirectory, path: &str) -> Classification {
        self.resolve(dir, path).class
    }

    pub(crate) fn resolve(&self, dir: &VirtualDirectory, path: &str) -> Resolved {
        let raw = dir.path_type(path);
        match raw.ty {
            StructuralType::Directory => {
                let (ty, sig) = self.classify_directory(dir, path);
                tracing::debug!(path, %ty, signature = ?sig, "classified directory");
                Resolved {
                    class: Classification {
                        ty: raw.with_type(ty),
                        zombies: sig.has_zombies(),
                    },
                    archive: None,
                }
            }
            StructuralType::File => self.classify_file(dir, path, raw),
            _ => Resolved {
                class: Classification::new(raw),
                archive: None,
            },
        }
    }

    fn classify_directory(&self, dir: &VirtualDirectory, path: &str) -> (StructuralType, ContentSignature) {
        let sig = match scan_signature(dir, path) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::warn!(path, error = %e, "cannot list directory, treating as plain");
                return (StructuralType::Directory, ContentSignature::empty());
            }
        };
        (self.apply_rules(dir, path, sig), sig)
    }

    fn apply_rules(&self, dir: &VirtualDirectory, path: &str, sig: ContentSignature) -> StructuralType {
        use ContentSignature as S;

        if sig.looks_like_column() {
            return StructuralType::Column;
        }
        if sig.contains(S::COL_DIR) && !sig.intersects(S::DB_DIR | S::TBL_DIR) {
            let prerelease = (sig.contains(S::META) && !sig.contains(S::MD_DIR))
                || (sig.contains(S::SKEY) && !sig.contains(S::IDX_DIR));
            return if prerelease {
                StructuralType::PrereleaseTable
            } else {
                StructuralType::Table
            };
        }
        if sig.intersects(S::CUR | S::REV) && !sig.intersects(S::OBJECT_DIRS) {
            return StructuralType::Metadata;
        }
        if sig.contains(S::TBL_DIR) && !sig.contains(S::COL_DIR) {
            return StructuralType::Database;
        }
        if sig.only_other_dirs()
            && parent_component(dir, path).as_deref() == Some("col")
            && self.has_column_child(dir, path)
        {
            return StructuralType::Column;
        }
        StructuralType::Directory
    }

    /// One level down, no further.
    fn has_column_child(&self, dir: &VirtualDirectory, path: &str) -> bool {
        let entries = match dir.list(path) {
            Ok(entries) => entries,
            Err(_) => return false,
        };
        entries
            .iter()
            .filter(|e| e.kind.ty == StructuralType::Directory)
            .any(|e| {
                let child = join(path, &e.name);
                match scan_signature(dir, &child) {
                    Ok(sig) => sig.looks_like_column(),
                    Err(err) => {
                        tracing::warn!(path = %child, error = %err, "cannot list column child");
                        false
                    }
                }
            })
    }

    fn classify_file(&self, dir: &VirtualDirectory, path: &str, raw: PathType) -> Resolved {
        if !self.formats.is_empty() {
            let unwrapped = dir
                .open_file_read(path)
                .and_then(|file| open_archive(file, &self.formats));
            match unwrapped {
                Ok(Some(archive)) => {
                    let inner = self.resolve(&archive, ".");
                    tracing::debug!(path, inner = %inner.class.ty, "classified archive");
                    return Resolved {
                        class: Classification {
                            ty: raw.with_type(inner.class.ty.ty),
                            zombies: inner.class.zombies,
                        },
                        archive: Some(archive),
                    };
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(path, error = %e, "archive probe failed"),
            }
        }

        let ty = if parent_component(dir, path).as_deref() == Some("idx") {
            StructuralType::Index
        } else {
            StructuralType::File
        };
        Resolved {
            class: Classification::new(raw.with_type(ty)),
            archive: None,
        }
    }
}

/// Classify with the default archive formats.
pub fn classify(dir: &VirtualDirectory, path: &str) -> Classification {
    Classifier::default().classify(dir, path)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::archive::KarBuilder;
    use crate::vfs::MemoryDir;

    fn memory() -> (MemoryDir, VirtualDirectory) {
        let mem = MemoryDir::new();
        let dir = VirtualDirectory::new(Arc::new(mem.clone())).unwrap();
        (mem, dir)
    }

    #[test]
    fn test_name_patterns() {
        assert_eq!(file_bit("idx1"), ContentSignature::IDX_N);
        assert_eq!(file_bit("idx"), ContentSignature::OTHER_FILE);
        assert_eq!(file_bit("data"), ContentSignature::DATA);
        assert_eq!(file_bit("data12"), ContentSignature::DATA);
        assert_eq!(file_bit("database"), ContentSignature::OTHER_FILE);
        assert_eq!(file_bit("r001"), ContentSignature::REV);
        assert_eq!(file_bit("r0001"), ContentSignature::OTHER_FILE);
        assert_eq!(dir_bit("col"), ContentSignature::COL_DIR);
        assert_eq!(dir_bit("cols"), ContentSignature::OTHER_DIR);
    }

    #[test]
    fn test_table_with_column() {
        let (mem, dir) = memory();
        mem.write_file("run/col/READ/idx3", Vec::new()).unwrap();
        mem.write_file("run/col/READ/data", Vec::new()).unwrap();
        mem.mkdir("run/idx").unwrap();

        assert_eq!(classify(&dir, "run").ty, StructuralType::Table);
        assert_eq!(classify(&dir, "run/col/READ").ty, StructuralType::Column);
    }

    #[test]
    fn test_prerelease_table() {
        let (mem, dir) = memory();
        mem.mkdir("old/col").unwrap();
        mem.write_file("old/meta", Vec::new()).unwrap();
        assert_eq!(classify(&dir, "old").ty, StructuralType::PrereleaseTable);

        mem.mkdir("old/md").unwrap();
        assert_eq!(classify(&dir, "old").ty, StructuralType::Table);

        mem.write_file("old/skey", Vec::new()).unwrap();
        assert_eq!(classify(&dir, "old").ty, StructuralType::PrereleaseTable);
    }

    #[test]
    fn test_metadata_and_database() {
        let (mem, dir) = memory();
        mem.write_file("md/cur", Vec::new()).unwrap();
        mem.mkdir("db1/tbl").unwrap();
        mem.write_file("rev/r002", Vec::new()).unwrap();

        assert_eq!(classify(&dir, "md").ty, StructuralType::Metadata);
        assert_eq!(classify(&dir, "rev").ty, StructuralType::Metadata);
        assert_eq!(classify(&dir, "db1").ty, StructuralType::Database);
    }

    #[test]
    fn test_structured_column_only_under_col() {
        let (mem, dir) = memory();
        for parent in ["tbl/col", "tbl/other"] {
            mem.write_file(&format!("{parent}/QUALITY/part/idx1"), Vec::new()).unwrap();
            mem.write_file(&format!("{parent}/QUALITY/part/data"), Vec::new()).unwrap();
        }

        assert_eq!(classify(&dir, "tbl/col/QUALITY").ty, StructuralType::Column);
        assert_eq!(classify(&dir, "tbl/other/QUALITY").ty, StructuralType::Directory);
    }

    #[test]
    fn test_structured_column_is_one_level() {
        let (mem, dir) = memory();
        mem.write_file("col/DEEP/a/b/idx1", Vec::new()).unwrap();
        mem.write_file("col/DEEP/a/b/data", Vec::new()).unwrap();
        assert_eq!(classify(&dir, "col/DEEP").ty, StructuralType::Directory);
    }

    #[test]
    fn test_index_file_and_plain_file() {
        let (mem, dir) = memory();
        mem.write_file("tbl/idx/by_name", b"x".to_vec()).unwrap();
        mem.write_file("tbl/notes", b"x".to_vec()).unwrap();

        assert_eq!(classify(&dir, "tbl/idx/by_name").ty, StructuralType::Index);
        assert_eq!(classify(&dir, "tbl/notes").ty, StructuralType::File);
        assert_eq!(classify(&dir, "tbl/missing").ty, StructuralType::NotFound);
        assert_eq!(classify(&dir, "tbl/notes/x").ty, StructuralType::BadPath);
    }

    #[test]
    fn test_zombie_bit_is_reported_not_decisive() {
        let (mem, dir) = memory();
        mem.write_file("c/idx1", Vec::new()).unwrap();
        mem.write_file("c/data", Vec::new()).unwrap();
        let before = classify(&dir, "c");
        assert!(!before.zombies);

        mem.write_file("c/stale", Vec::new()).unwrap();
        mem.mark_zombie("c/stale").unwrap();
        let after = classify(&dir, "c");
        assert_eq!(after.ty, before.ty);
        assert!(after.zombies);
    }

    #[test]
    fn test_zombie_index_file_does_not_make_a_column() {
        let (mem, dir) = memory();
        mem.write_file("c/data", Vec::new()).unwrap();
        let before = classify(&dir, "c");
        assert_eq!(before.ty, StructuralType::Directory);

        mem.write_file("c/idx1", Vec::new()).unwrap();
        mem.mark_zombie("c/idx1").unwrap();
        let after = classify(&dir, "c");
        assert_eq!(after.ty, before.ty);
        assert!(after.zombies);
    }

    #[test]
    fn test_zombie_does_not_block_structured_column() {
        let (mem, dir) = memory();
        mem.write_file("col/QUALITY/part/idx1", Vec::new()).unwrap();
        mem.write_file("col/QUALITY/part/data", Vec::new()).unwrap();
        assert_eq!(classify(&dir, "col/QUALITY").ty, StructuralType::Column);

        mem.write_file("col/QUALITY/stale", Vec::new()).unwrap();
        mem.mark_zombie("col/QUALITY/stale").unwrap();
        let after = classify(&dir, "col/QUALITY");
        assert_eq!(after.ty, StructuralType::Column);
        assert!(after.zombies);
    }

    #[test]
    fn test_classification_is_idempotent() {
        let (mem, dir) = memory();
        mem.write_file("t/col/A/idx1", Vec::new()).unwrap();
        mem.write_file("t/col/A/data1", Vec::new()).unwrap();
        for path in ["t", "t/col", "t/col/A", "t/col/A/idx1"] {
            assert_eq!(classify(&dir, path), classify(&dir, path));
        }
    }

    #[test]
    fn test_archive_reclassified_with_alias() {
        let (mem, dir) = memory();
        let mut builder = KarBuilder::new();
        builder.add_dir("col").add_file("md/cur", b"1".to_vec());
        mem.write_file("run.kar", builder.to_bytes()).unwrap();
        mem.symlink("latest", "run.kar").unwrap();

        assert_eq!(classify(&dir, "run.kar").ty, PathType::new(StructuralType::Table));
        assert_eq!(classify(&dir, "latest").ty, PathType::aliased(StructuralType::Table));

        let plain = Classifier::new(&ArchiveConfig { formats: Vec::new() });
        assert_eq!(plain.classify(&dir, "run.kar").ty, StructuralType::File);
    }
}
