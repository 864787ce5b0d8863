//! Kernel version extraction from image bytes.
//!
//! Images come in three shapes:
//!
//! - [`container`] - EFI-stub images wrapped in an `MZ`/PE executable,
//!   with the kernel proper in a `.linux` section (or at offset 0)
//! - [`setup_header`] - images carrying the x86 boot protocol header
//!   (`HdrS`), which points straight at the version string
//! - [`compressed`] - raw or compressed payloads, searched for the
//!   `Linux version ` boot banner
//!
//! # Example
//!
//! ```rust,ignore
//! use kernel_inventory::image::parse_version;
//! use std::io::BufReader;
//!
//! let mut f = BufReader::new(std::fs::File::open("/boot/vmlinuz-6.6.13-gentoo")?);
//! assert_eq!(parse_version(&mut f)?, "6.6.13-gentoo");
//! ```

use std::io::{self, Read, Seek, SeekFrom};
use thiserror::Error;

pub mod compressed;
pub mod container;
pub mod setup_header;

pub use compressed::Codec;

/// Why a kernel image could not yield a version.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("unrecognized kernel image: {0}")]
    Unrecognized(String),

    #[error("kernel image is compressed with {0}, but the required decompressor is not available")]
    MissingDecompressor(Codec),

    #[error("I/O error reading kernel image: {0}")]
    Io(#[from] io::Error),
}

/// Extract the kernel's self-reported version from an image.
///
/// The whole stream is treated as the image; the reader is rewound first.
pub fn parse_version<R: Read + Seek>(reader: &mut R) -> Result<String, ImageError> {
    reader.seek(SeekFrom::Start(0))?;
    let mut magic = [0u8; 2];
    let n = read_up_to(reader, &mut magic)?;

    let payload = if n == magic.len() && &magic == container::MAGIC {
        container::locate_payload(reader)?
    } else {
        0
    };
    parse_payload(reader, payload)
}

fn parse_payload<R: Read + Seek>(reader: &mut R, start: u64) -> Result<String, ImageError> {
    if setup_header::has_signature(reader, start)? {
        log::trace!("boot setup header at {:#x}", start);
        return setup_header::read_version(reader, start);
    }
    reader.seek(SeekFrom::Start(start))?;
    compressed::read_version(reader)
}

/// Read until `buf` is full or the stream ends.
pub(crate) fn read_up_to<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Fill `buf` completely; a short read means the image is truncated.
pub(crate) fn read_field<R: Read + ?Sized>(
    reader: &mut R,
    buf: &mut [u8],
    what: &str,
) -> Result<(), ImageError> {
    if read_up_to(reader, buf)? < buf.len() {
        return Err(ImageError::Unrecognized(format!(
            "image terminates before {}",
            what
        )));
    }
    Ok(())
}
