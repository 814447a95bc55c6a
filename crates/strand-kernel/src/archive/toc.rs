//! Table of contents shared by every archive format.

use std::collections::BTreeMap;

use strand_types::StructuralType;

use crate::vfs::{VfsError, VfsResult, path};

/// Kind of an archive member.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberKind {
    File,
    Directory,
    /// Listed but its bytes are gone.
    Zombie,
}

impl MemberKind {
    pub fn structural_type(self) -> StructuralType {
        match self {
            MemberKind::File => StructuralType::File,
            MemberKind::Directory => StructuralType::Directory,
            MemberKind::Zombie => StructuralType::ZombieFile,
        }
    }
}

/// One member. `offset` is absolute within the container file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Member {
    pub kind: MemberKind,
    pub offset: u64,
    pub size: u64,
}

impl Member {
    pub fn directory() -> Self {
        Self {
            kind: MemberKind::Directory,
            offset: 0,
            size: 0,
        }
    }
}

/// Members keyed by normalized path. The root is `""`.
#[derive(Debug, Clone)]
pub struct Toc {
    members: BTreeMap<String, Member>,
}

impl Default for Toc {
    fn default() -> Self {
        Self::new()
    }
}

impl Toc {
    pub fn new() -> Self {
        let mut members = BTreeMap::new();
        members.insert(String::new(), Member::directory());
        Self { members }
    }

    /// Add a member, creating implied parent directories.
    pub fn insert(&mut self, name: &str, member: Member) -> VfsResult<()> {
        let full = path::normalize(name)
            .map_err(|_| VfsError::corrupt_archive(format!("bad member name {name:?}")))?;
        if full.is_empty() {
            // Some writers list the root explicitly
            return Ok(());
        }

        let mut parent = path::parent(&full);
        while let Some(p) = parent {
            match self.members.get(p) {
                Some(m) if m.kind == MemberKind::Directory => {}
                Some(_) => {
                    return Err(VfsError::corrupt_archive(format!(
                        "member {full:?} lies under non-directory {p:?}"
                    )));
                }
                None => {
                    self.members.insert(p.to_string(), Member::directory());
                }
            }
            parent = path::parent(p);
        }

        if let Some(existing) = self.members.get(&full) {
            if existing.kind == MemberKind::Directory && member.kind == MemberKind::Directory {
                return Ok(());
            }
            return Err(VfsError::corrupt_archive(format!("duplicate member {full:?}")));
        }
        self.members.insert(full, member);
        Ok(())
    }

    pub fn get(&self, full: &str) -> Option<&Member> {
        self.members.get(full)
    }

    /// Immediate children of a directory, in name order.
    pub fn children<'a>(&'a self, dir: &'a str) -> impl Iterator<Item = (&'a str, &'a Member)> + 'a {
        self.members.iter().filter_map(move |(key, member)| {
            if key.is_empty() || path::parent(key) != Some(dir) {
                return None;
            }
            path::file_name(key).map(|name| (name, member))
        })
    }

    /// Number of members, implied directories and the root included.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.len() <= 1
    }

    pub fn has_zombies(&self) -> bool {
        self.members.values().any(|m| m.kind == MemberKind::Zombie)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(offset: u64, size: u64) -> Member {
        Member {
            kind: MemberKind::File,
            offset,
            size,
        }
    }

    #[test]
    fn test_implied_parents() {
        let mut toc = Toc::new();
        toc.insert("col/READ/data", file(0, 4)).unwrap();

        assert_eq!(toc.get("col").unwrap().kind, MemberKind::Directory);
        assert_eq!(toc.get("col/READ").unwrap().kind, MemberKind::Directory);
        let names: Vec<_> = toc.children("col/READ").map(|(n, _)| n).collect();
        assert_eq!(names, vec!["data"]);
    }

    #[test]
    fn test_rejects_escape_and_duplicates() {
        let mut toc = Toc::new();
        assert!(toc.insert("../etc/passwd", file(0, 1)).is_err());

        toc.insert("a", file(0, 1)).unwrap();
        assert!(toc.insert("a", file(1, 1)).is_err());
        assert!(toc.insert("a/b", file(2, 1)).is_err());

        toc.insert("d/", Member::directory()).unwrap();
        toc.insert("d", Member::directory()).unwrap();
    }
}
