//! POSIX ustar and v7 tar archives.
//!
//! Only regular files and directories become members; links, devices and
//! extension headers are skipped along with their data.

use super::toc::{Member, MemberKind, Toc};
use crate::vfs::{VfsError, VfsResult, VirtualFile};

pub const BLOCK: u64 = 512;

const NAME: std::ops::Range<usize> = 0..100;
const SIZE: std::ops::Range<usize> = 124..136;
const CHECKSUM: std::ops::Range<usize> = 148..156;
const TYPEFLAG: usize = 156;
const MAGIC: std::ops::Range<usize> = 257..263;
const PREFIX: std::ops::Range<usize> = 345..500;

fn corrupt(msg: impl Into<String>) -> VfsError {
    VfsError::corrupt_archive(format!("tar: {}", msg.into()))
}

/// NUL-terminated string field.
fn cstr(field: &[u8]) -> &[u8] {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    &field[..end]
}

/// Octal numeric field, or base-256 when the high bit is set.
fn number(field: &[u8]) -> Option<u64> {
    if field.first().is_some_and(|b| b & 0x80 != 0) {
        let mut value: u64 = u64::from(field[0] & 0x7f);
        for &b in &field[1..] {
            value = value.checked_mul(256)?.checked_add(u64::from(b))?;
        }
        return Some(value);
    }
    let digits = cstr(field);
    let digits: Vec<u8> = digits
        .iter()
        .copied()
        .skip_while(|b| *b == b' ')
        .take_while(|b| *b != b' ')
        .collect();
    if digits.is_empty() {
        return Some(0);
    }
    let text = std::str::from_utf8(&digits).ok()?;
    u64::from_str_radix(text, 8).ok()
}

fn checksum_ok(block: &[u8; BLOCK as usize]) -> bool {
    let Some(stored) = number(&block[CHECKSUM]) else {
        return false;
    };
    let sum: u64 = block
        .iter()
        .enumerate()
        .map(|(i, &b)| if CHECKSUM.contains(&i) { u64::from(b' ') } else { u64::from(b) })
        .sum();
    sum == stored
}

fn is_zero(block: &[u8]) -> bool {
    block.iter().all(|&b| b == 0)
}

fn member_name(block: &[u8; BLOCK as usize]) -> VfsResult<String> {
    let name = cstr(&block[NAME]);
    let ustar = &block[MAGIC.start..MAGIC.start + 5] == b"ustar";
    let prefix = if ustar { cstr(&block[PREFIX]) } else { &[][..] };
    let full = if prefix.is_empty() {
        name.to_vec()
    } else {
        [prefix, b"/", name].concat()
    };
    String::from_utf8(full).map_err(|_| corrupt("member name is not utf-8"))
}

/// Read the member list, or `None` if the file does not start with a tar
/// header.
pub fn probe(file: &VirtualFile, container_size: u64) -> VfsResult<Option<Toc>> {
    let mut block = [0u8; BLOCK as usize];
    let n = file.read_all_at(0, &mut block)?;
    if n < BLOCK as usize || is_zero(&block) || !checksum_ok(&block) {
        return Ok(None);
    }

    let mut toc = Toc::new();
    let mut offset = 0u64;
    loop {
        let n = file.read_all_at(offset, &mut block)?;
        if n < BLOCK as usize {
            tracing::warn!(offset, "tar archive ends without end-of-archive marker");
            break;
        }
        if is_zero(&block) {
            let mut next = [0u8; BLOCK as usize];
            let n = file.read_all_at(offset + BLOCK, &mut next)?;
            if n < BLOCK as usize || is_zero(&next) {
                break;
            }
            return Err(corrupt(format!("lone zero block at {offset}")));
        }
        if !checksum_ok(&block) {
            return Err(corrupt(format!("header checksum mismatch at {offset}")));
        }

        let size = number(&block[SIZE]).ok_or_else(|| corrupt(format!("bad size at {offset}")))?;
        let name = member_name(&block)?;
        let data = offset + BLOCK;
        let end = data
            .checked_add(size)
            .ok_or_else(|| corrupt(format!("size overflows at {offset}")))?;

        match block[TYPEFLAG] {
            b'0' | 0 | b'7' if name.ends_with('/') => toc.insert(&name, Member::directory())?,
            b'0' | 0 | b'7' => {
                let kind = if end > container_size {
                    MemberKind::Zombie
                } else {
                    MemberKind::File
                };
                toc.insert(
                    &name,
                    Member {
                        kind,
                        offset: data,
                        size,
                    },
                )?;
            }
            b'5' => toc.insert(&name, Member::directory())?,
            other => {
                tracing::debug!(name = %name, typeflag = other, "skipping tar member");
            }
        }

        if end > container_size {
            break;
        }
        offset = end.div_ceil(BLOCK) * BLOCK;
    }
    Ok(Some(toc))
}

/// Encode a header block for a regular file or directory.
///
/// Names longer than 100 bytes are split into the ustar prefix.
pub fn header(name: &str, size: u64, is_dir: bool) -> VfsResult<[u8; BLOCK as usize]> {
    if size >= 1 << 33 {
        return Err(VfsError::other(format!("{name}: {size} bytes exceeds the octal size field")));
    }
    let mut block = [0u8; BLOCK as usize];
    let bytes = name.as_bytes();
    let (prefix, name) = if bytes.len() <= NAME.len() {
        (&[][..], bytes)
    } else {
        let split = bytes[..bytes.len().min(PREFIX.len() + 1)]
            .iter()
            .rposition(|&b| b == b'/')
            .filter(|&i| bytes.len() - i - 1 <= NAME.len())
            .ok_or_else(|| VfsError::invalid_path(name))?;
        (&bytes[..split], &bytes[split + 1..])
    };
    block[..name.len()].copy_from_slice(name);
    block[PREFIX.start..PREFIX.start + prefix.len()].copy_from_slice(prefix);

    let mode = if is_dir { 0o755 } else { 0o644 };
    block[100..108].copy_from_slice(format!("{mode:07o}\0").as_bytes());
    block[108..116].copy_from_slice(b"0000000\0");
    block[116..124].copy_from_slice(b"0000000\0");
    block[SIZE].copy_from_slice(format!("{size:011o}\0").as_bytes());
    block[136..148].copy_from_slice(b"00000000000\0");
    block[TYPEFLAG] = if is_dir { b'5' } else { b'0' };
    block[MAGIC].copy_from_slice(b"ustar\0");
    block[263..265].copy_from_slice(b"00");

    block[CHECKSUM].fill(b' ');
    let sum: u64 = block.iter().map(|&b| u64::from(b)).sum();
    block[CHECKSUM].copy_from_slice(format!("{sum:06o}\0 ").as_bytes());
    Ok(block)
}
