//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use strand_kernel::archive::tar;
use strand_kernel::vfs::LocalDir;
use strand_kernel::{BlockLocation, FileOrder, IndexWriter, StructuralType, VirtualDirectory};
use tempfile::TempDir;

/// Blocks written into every fixture column.
pub fn blocks() -> Vec<BlockLocation> {
    vec![
        BlockLocation::new(1, 39, 0, 1),
        BlockLocation::new(40, 60, 4096, 1),
        BlockLocation::new(100, 100, 8192, 2),
    ]
}

pub fn index_writer(version: u32, order: FileOrder) -> IndexWriter {
    let mut writer = IndexWriter::new(version).with_order(order).with_eofs(12288, 0);
    for loc in blocks() {
        writer.push(loc);
    }
    writer
}

pub fn write(root: &Path, rel: &str, bytes: &[u8]) -> anyhow::Result<()> {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))
}

/// A database on disk:
///
/// ```text
/// db/tbl/run/col/READ/{idx1, idx, data}
/// db/tbl/run/col/QUALITY/part/{idx1, data}
/// db/tbl/run/md/cur
/// db/tbl/run/idx/by_name
/// ```
pub fn database(order: FileOrder) -> anyhow::Result<(TempDir, VirtualDirectory)> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path();
    let files = index_writer(3, order).encode();

    let read = "db/tbl/run/col/READ";
    let idx = files.idx.as_deref().context("v3 index has a secondary header")?;
    write(root, &format!("{read}/idx1"), &files.idx1)?;
    write(root, &format!("{read}/idx"), idx)?;
    write(root, &format!("{read}/data"), &[0u8; 64])?;

    let v1 = index_writer(1, order).encode();
    write(root, "db/tbl/run/col/QUALITY/part/idx1", &v1.idx1)?;
    write(root, "db/tbl/run/col/QUALITY/part/data", b"")?;

    write(root, "db/tbl/run/md/cur", b"1")?;
    write(root, "db/tbl/run/idx/by_name", b"name index")?;

    let dir = local(root);
    Ok((tmp, dir))
}

pub fn local(root: &Path) -> VirtualDirectory {
    VirtualDirectory::new(Arc::new(LocalDir::new(root))).unwrap()
}

/// Pack everything under `path` into a ustar archive.
pub fn tar_of(dir: &VirtualDirectory, path: &str) -> Vec<u8> {
    let mut out = Vec::new();
    dir.visit(path, true, &mut |rel, entry| {
        match entry.kind.ty {
            StructuralType::Directory => {
                out.extend_from_slice(&tar::header(&format!("{rel}/"), 0, true)?);
            }
            StructuralType::File => {
                let data = dir.open_file_read(&format!("{path}/{rel}"))?.read_to_end()?;
                out.extend_from_slice(&tar::header(rel, data.len() as u64, false)?);
                out.extend_from_slice(&data);
                let pad = (tar::BLOCK - data.len() as u64 % tar::BLOCK) % tar::BLOCK;
                out.resize(out.len() + pad as usize, 0);
            }
            _ => {}
        }
        Ok(())
    })
    .unwrap();
    out.resize(out.len() + 2 * tar::BLOCK as usize, 0);
    out
}

/// Every path under `path`, relative to it, parents first.
pub fn walk(dir: &VirtualDirectory, path: &str) -> Vec<String> {
    let mut paths = Vec::new();
    dir.visit(path, true, &mut |rel, _| {
        paths.push(rel.to_string());
        Ok(())
    })
    .unwrap();
    paths
}
