//! x86 boot protocol setup header.
//!
//! The header starts at 0x200 into the image. `HdrS` sits at 0x202 and the
//! 16-bit `kernel_version` field at 0x20E holds a pointer, relative to
//! 0x200, to a NUL-terminated string like
//! `6.6.13-gentoo (root@host) #1 SMP ...`.

use std::io::{Read, Seek, SeekFrom};

use super::{read_field, read_up_to, ImageError};

pub const SIGNATURE: &[u8; 4] = b"HdrS";

const SETUP_HEADER: u64 = 0x200;
const SIGNATURE_AT: u64 = 0x202;
const HEADER_PROBE_LEN: usize = 0x10;
const VERSION_POINTER_AT: usize = 0x0E;
const VERSION_WINDOW: usize = 0x100;

/// Whether `HdrS` appears at `start + 0x202`.
pub fn has_signature<R: Read + Seek>(reader: &mut R, start: u64) -> Result<bool, ImageError> {
    reader.seek(SeekFrom::Start(start + SIGNATURE_AT))?;
    let mut sig = [0u8; 4];
    let n = read_up_to(reader, &mut sig)?;
    Ok(n == sig.len() && &sig == SIGNATURE)
}

/// Follow the `kernel_version` pointer of the image starting at `start`.
pub fn read_version<R: Read + Seek>(reader: &mut R, start: u64) -> Result<String, ImageError> {
    reader.seek(SeekFrom::Start(start + SETUP_HEADER))?;
    let mut header = [0u8; HEADER_PROBE_LEN];
    read_field(reader, &mut header, "the boot setup header")?;
    if &header[2..6] != SIGNATURE {
        return Err(ImageError::Unrecognized(
            "no HdrS signature in boot setup header".to_string(),
        ));
    }

    let pointer = u16::from_le_bytes([header[VERSION_POINTER_AT], header[VERSION_POINTER_AT + 1]]);
    reader.seek(SeekFrom::Start(start + SETUP_HEADER + u64::from(pointer)))?;
    let mut buf = [0u8; VERSION_WINDOW];
    let n = read_up_to(reader, &mut buf)?;
    if n == 0 {
        return Err(ImageError::Unrecognized(format!(
            "image terminates before expected version string position ({:#x})",
            SETUP_HEADER + u64::from(pointer)
        )));
    }

    let text = &buf[..n];
    let end = text
        .iter()
        .position(|&b| b == b' ' || b == 0)
        .unwrap_or(text.len());
    let version = std::str::from_utf8(&text[..end]).map_err(|_| {
        ImageError::Unrecognized("version string in setup header is not valid UTF-8".to_string())
    })?;
    if version.is_empty() {
        return Err(ImageError::Unrecognized(
            "empty version string in setup header".to_string(),
        ));
    }
    Ok(version.to_string())
}
