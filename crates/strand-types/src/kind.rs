//! Structural path kinds.
//!
//! A path on a storage medium is either a plain filesystem entry (file,
//! directory, device, ...) or one of the database objects recognized by
//! directory layout. The numeric codes are stable and shared with the
//! on-disk tooling, so they must never be reordered.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter, EnumString, IntoStaticStr};

/// Modifier bit set on a raw code when the path was reached through a link.
pub const ALIAS_BIT: u32 = 0x80;

/// What a path structurally is.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum StructuralType {
    NotFound,
    BadPath,
    File,
    #[strum(to_string = "directory", serialize = "dir")]
    Directory,
    CharDevice,
    BlockDevice,
    Fifo,
    Socket,
    #[strum(to_string = "database", serialize = "db")]
    Database,
    #[strum(to_string = "table", serialize = "tbl")]
    Table,
    PrereleaseTable,
    #[strum(to_string = "column", serialize = "col")]
    Column,
    #[strum(to_string = "index", serialize = "idx")]
    Index,
    #[strum(to_string = "metadata", serialize = "meta")]
    Metadata,
    ZombieFile,
}

impl StructuralType {
    /// Stable numeric code (without the alias bit).
    pub fn code(self) -> u32 {
        match self {
            StructuralType::NotFound => 0,
            StructuralType::BadPath => 1,
            StructuralType::File => 2,
            StructuralType::Directory => 3,
            StructuralType::CharDevice => 4,
            StructuralType::BlockDevice => 5,
            StructuralType::Fifo => 6,
            StructuralType::Socket => 7,
            StructuralType::Database => 8,
            StructuralType::Table => 9,
            StructuralType::PrereleaseTable => 10,
            StructuralType::Column => 11,
            StructuralType::Index => 12,
            StructuralType::Metadata => 13,
            StructuralType::ZombieFile => 14,
        }
    }

    /// Inverse of [`code`](Self::code).
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => StructuralType::NotFound,
            1 => StructuralType::BadPath,
            2 => StructuralType::File,
            3 => StructuralType::Directory,
            4 => StructuralType::CharDevice,
            5 => StructuralType::BlockDevice,
            6 => StructuralType::Fifo,
            7 => StructuralType::Socket,
            8 => StructuralType::Database,
            9 => StructuralType::Table,
            10 => StructuralType::PrereleaseTable,
            11 => StructuralType::Column,
            12 => StructuralType::Index,
            13 => StructuralType::Metadata,
            14 => StructuralType::ZombieFile,
            _ => return None,
        })
    }

    /// Parse from string (case-insensitive, accepts short aliases like `tbl`).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Canonical lowercase name.
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// True for kinds recognized from directory layout.
    pub fn is_database_object(self) -> bool {
        matches!(
            self,
            StructuralType::Database
                | StructuralType::Table
                | StructuralType::PrereleaseTable
                | StructuralType::Column
                | StructuralType::Index
                | StructuralType::Metadata
        )
    }

    /// True for kinds that exist on the medium (anything but not-found / bad path).
    pub fn exists(self) -> bool {
        !matches!(self, StructuralType::NotFound | StructuralType::BadPath)
    }

    /// True when a caller expecting `self` should accept `found`.
    ///
    /// Prerelease tables open wherever a table is expected.
    pub fn accepts(self, found: StructuralType) -> bool {
        self == found
            || (self == StructuralType::Table && found == StructuralType::PrereleaseTable)
    }
}

impl fmt::Display for StructuralType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structural type plus the alias modifier.
///
/// The alias bit is orthogonal to the type: a symlink to a table directory
/// is a `Table` reached through an alias.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathType {
    pub ty: StructuralType,
    #[serde(default)]
    pub alias: bool,
}

impl PathType {
    pub fn new(ty: StructuralType) -> Self {
        Self { ty, alias: false }
    }

    pub fn aliased(ty: StructuralType) -> Self {
        Self { ty, alias: true }
    }

    /// Same alias bit, different type.
    pub fn with_type(self, ty: StructuralType) -> Self {
        Self { ty, ..self }
    }

    /// Raw code with the alias bit folded in.
    pub fn to_raw(self) -> u32 {
        if self.alias {
            self.ty.code() | ALIAS_BIT
        } else {
            self.ty.code()
        }
    }

    pub fn from_raw(raw: u32) -> Option<Self> {
        let ty = StructuralType::from_code(raw & !ALIAS_BIT)?;
        Some(Self {
            ty,
            alias: raw & ALIAS_BIT != 0,
        })
    }
}

impl From<StructuralType> for PathType {
    fn from(ty: StructuralType) -> Self {
        Self::new(ty)
    }
}

impl PartialEq<StructuralType> for PathType {
    fn eq(&self, other: &StructuralType) -> bool {
        self.ty == *other
    }
}

impl fmt::Display for PathType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.alias {
            write!(f, "{} (alias)", self.ty)
        } else {
            write!(f, "{}", self.ty)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_codes_round_trip_for_every_kind() {
        for ty in StructuralType::iter() {
            assert_eq!(StructuralType::from_code(ty.code()), Some(ty));
        }
        assert_eq!(StructuralType::from_code(15), None);
    }

    #[test]
    fn test_alias_bit_is_orthogonal() {
        let raw = PathType::aliased(StructuralType::Table).to_raw();
        assert_eq!(raw, 9 | ALIAS_BIT);

        let parsed = PathType::from_raw(raw).unwrap();
        assert!(parsed.alias);
        assert_eq!(parsed, StructuralType::Table);
        assert_eq!(PathType::from_raw(ALIAS_BIT | 99), None);
    }

    #[test]
    fn test_parse_short_names() {
        assert_eq!(StructuralType::from_str("tbl"), Some(StructuralType::Table));
        assert_eq!(StructuralType::from_str("COLUMN"), Some(StructuralType::Column));
        assert_eq!(
            StructuralType::from_str("prerelease_table"),
            Some(StructuralType::PrereleaseTable)
        );
        assert_eq!(StructuralType::from_str("nope"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(StructuralType::ZombieFile.to_string(), "zombie_file");
        assert_eq!(PathType::aliased(StructuralType::Column).to_string(), "column (alias)");
    }

    #[test]
    fn test_table_accepts_prerelease() {
        assert!(StructuralType::Table.accepts(StructuralType::PrereleaseTable));
        assert!(!StructuralType::PrereleaseTable.accepts(StructuralType::Table));
        assert!(!StructuralType::Column.accepts(StructuralType::Table));
    }

    #[test]
    fn test_database_object_kinds() {
        assert!(StructuralType::Metadata.is_database_object());
        assert!(!StructuralType::Directory.is_database_object());
        assert!(!StructuralType::ZombieFile.is_database_object());
    }
}
