//! Shared structural types for strand.
//!
//! This crate is the vocabulary the storage kernel speaks: what a path *is*
//! ([`StructuralType`], [`PathType`]), what a directory scan *saw*
//! ([`ContentSignature`]), and where a row lives ([`BlockLocation`]).
//! It has **no internal strand dependencies**.
//!
//! # Key Types
//!
//! |----------------------|----------------------------------------------|
//! | Type                 | Purpose                                      |
//! |----------------------|----------------------------------------------|
//! | [`StructuralType`]   | Database object kind or plain fs entry kind  |
//! | [`PathType`]         | Structural type plus the alias (symlink) bit |
//! | [`ContentSignature`] | Reserved child names seen in one directory   |
//! | [`BlockLocation`]    | Row-id interval bound to a physical block    |
//! |----------------------|----------------------------------------------|

pub mod block;
pub mod kind;
pub mod signature;

pub use block::BlockLocation;
pub use kind::{PathType, StructuralType, ALIAS_BIT};
pub use signature::ContentSignature;
