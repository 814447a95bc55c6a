//! Directory content signatures.
//!
//! One scan of a directory's immediate children folds every child name into
//! a [`ContentSignature`]. Classification rules then read the signature
//! instead of re-listing the directory.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Reserved child names and patterns observed in one directory.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ContentSignature: u32 {
        /// `db/` subdirectory.
        const DB_DIR     = 1 << 0;
        /// `tbl/` subdirectory.
        const TBL_DIR    = 1 << 1;
        /// `idx/` subdirectory.
        const IDX_DIR    = 1 << 2;
        /// `col/` subdirectory.
        const COL_DIR    = 1 << 3;
        /// `md/` subdirectory.
        const MD_DIR     = 1 << 4;
        /// `idx<digits>` file.
        const IDX_N      = 1 << 5;
        /// `data` or `data<digits>` file.
        const DATA       = 1 << 6;
        /// `cur` file.
        const CUR        = 1 << 7;
        /// `r<3 digits>` file.
        const REV        = 1 << 8;
        /// `meta` file.
        const META       = 1 << 9;
        /// `skey` file.
        const SKEY       = 1 << 10;
        /// `sealed` file.
        const SEALED     = 1 << 11;
        /// `lock` file.
        const LOCK       = 1 << 12;
        /// Any other subdirectory.
        const OTHER_DIR  = 1 << 13;
        /// Any other file.
        const OTHER_FILE = 1 << 14;
        /// A deleted-but-not-reclaimed entry.
        const ZOMBIE     = 1 << 15;
    }
}

impl ContentSignature {
    /// Subdirectories that rule out a column or metadata directory.
    pub const OBJECT_DIRS: ContentSignature = ContentSignature::DB_DIR
        .union(ContentSignature::TBL_DIR)
        .union(ContentSignature::IDX_DIR)
        .union(ContentSignature::COL_DIR);

    /// Index files alongside data files, with no object subdirectories.
    pub fn looks_like_column(self) -> bool {
        self.contains(ContentSignature::IDX_N | ContentSignature::DATA)
            && !self.intersects(Self::OBJECT_DIRS)
    }

    /// Only unreserved subdirectories (zombie markers ignored).
    pub fn only_other_dirs(self) -> bool {
        self.difference(ContentSignature::ZOMBIE) == ContentSignature::OTHER_DIR
    }

    pub fn has_zombies(self) -> bool {
        self.contains(ContentSignature::ZOMBIE)
    }
}
