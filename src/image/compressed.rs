//! Raw and compressed kernel payloads.
//!
//! A raw image has no header that carries the version, so the boot banner
//! (`Linux version 6.6.13-gentoo (...)`) is searched for instead, after
//! undoing whatever compression the payload uses.

use std::fmt;
use std::io::{self, Read};

use super::{read_up_to, ImageError};

const BANNER: &[u8] = b"Linux version ";
const VERSION_WINDOW: usize = 0x100;
const CHUNK_LEN: usize = 64 * 1024;

/// Compression formats recognized by their leading magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    Gzip,
    Bzip2,
    Xz,
    /// Legacy `.lzma` (LZMA-alone) stream.
    Lzma,
    Lz4,
    Zstd,
    Lzo,
}

impl Codec {
    const MAGIC: [(Codec, &'static [u8]); 7] = [
        (Codec::Gzip, b"\x1f\x8b\x08"),
        (Codec::Bzip2, b"\x42\x5a\x68"),
        (Codec::Xz, b"\xfd\x37\x7a\x58\x5a\x00"),
        (Codec::Lzma, b"\x5d\x00\x00"),
        (Codec::Lz4, b"\x04\x22\x4d\x18"),
        (Codec::Zstd, b"\x28\xb5\x2f\xfd"),
        (Codec::Lzo, b"\x89\x4c\x5a\x4f\x00\x0d\x0a\x1a\x0a"),
    ];

    /// Longest magic prefix; peeking this many bytes is enough to detect.
    pub const MAGIC_LEN: usize = 9;

    /// Codec whose magic starts `prefix`, if any.
    pub fn detect(prefix: &[u8]) -> Option<Codec> {
        Self::MAGIC
            .iter()
            .find(|(_, magic)| prefix.starts_with(magic))
            .map(|(codec, _)| *codec)
    }

    pub fn name(self) -> &'static str {
        match self {
            Codec::Gzip => "gzip",
            Codec::Bzip2 => "bzip2",
            Codec::Xz => "xz",
            Codec::Lzma => "lzma",
            Codec::Lz4 => "lz4",
            Codec::Zstd => "zstd",
            Codec::Lzo => "lzo",
        }
    }

    /// Whether this build can decompress the codec.
    pub fn is_available(self) -> bool {
        match self {
            Codec::Gzip => cfg!(feature = "gzip"),
            Codec::Bzip2 => cfg!(feature = "bzip2"),
            Codec::Xz | Codec::Lzma => cfg!(feature = "xz"),
            Codec::Lz4 => cfg!(feature = "lz4"),
            Codec::Zstd => cfg!(feature = "zstd"),
            Codec::Lzo => false,
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Read the banner version from a payload starting at the current position.
pub fn read_version<R: Read>(reader: &mut R) -> Result<String, ImageError> {
    let mut head = [0u8; Codec::MAGIC_LEN];
    let n = read_up_to(reader, &mut head)?;
    let head = &head[..n];

    match Codec::detect(head) {
        Some(codec) => {
            log::debug!("payload is {}-compressed", codec);
            let decoder = decoder(codec, head.chain(reader))?;
            find_banner(decoder, true)
        }
        None => find_banner(head.chain(reader), false),
    }
}

fn decoder<'a, R: Read + 'a>(codec: Codec, reader: R) -> Result<Box<dyn Read + 'a>, ImageError> {
    match codec {
        #[cfg(feature = "gzip")]
        Codec::Gzip => Ok(Box::new(flate2::read::MultiGzDecoder::new(reader))),
        #[cfg(feature = "bzip2")]
        Codec::Bzip2 => Ok(Box::new(bzip2::read::MultiBzDecoder::new(reader))),
        #[cfg(feature = "xz")]
        Codec::Xz => Ok(Box::new(xz2::read::XzDecoder::new_multi_decoder(reader))),
        #[cfg(feature = "xz")]
        Codec::Lzma => {
            let stream = xz2::stream::Stream::new_lzma_decoder(u64::MAX).map_err(|e| {
                ImageError::Unrecognized(format!("cannot set up lzma decoder: {}", e))
            })?;
            Ok(Box::new(xz2::read::XzDecoder::new_stream(reader, stream)))
        }
        #[cfg(feature = "lz4")]
        Codec::Lz4 => Ok(Box::new(lz4_flex::frame::FrameDecoder::new(reader))),
        #[cfg(feature = "zstd")]
        Codec::Zstd => Ok(Box::new(zstd::stream::Decoder::new(reader)?)),
        other => Err(ImageError::MissingDecompressor(other)),
    }
}

/// Stream `reader` until the banner and the window after it are seen.
///
/// Only a banner-sized tail is retained while searching, so multi-megabyte
/// kernels are never held in memory at once.
fn find_banner<R: Read>(mut reader: R, compressed: bool) -> Result<String, ImageError> {
    let mut window: Vec<u8> = Vec::with_capacity(CHUNK_LEN + BANNER.len());
    let mut chunk = vec![0u8; CHUNK_LEN];
    let mut found: Option<usize> = None;

    loop {
        if let Some(start) = found {
            if window.len() >= start + VERSION_WINDOW {
                break;
            }
        }

        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            // Trailing junk after the stream; the banner is already in hand.
            Err(_) if found.is_some() => break,
            Err(e) if compressed => {
                return Err(ImageError::Unrecognized(format!(
                    "corrupt compressed payload: {}",
                    e
                )))
            }
            Err(e) => return Err(e.into()),
        };
        window.extend_from_slice(&chunk[..n]);

        if found.is_none() {
            match window.windows(BANNER.len()).position(|w| w == BANNER) {
                Some(pos) => found = Some(pos + BANNER.len()),
                None => {
                    let keep = BANNER.len() - 1;
                    if window.len() > keep {
                        let cut = window.len() - keep;
                        window.drain(..cut);
                    }
                }
            }
        }
    }

    let start = found.ok_or_else(|| {
        ImageError::Unrecognized(
            "no version string found, or the compression format was not recognized".to_string(),
        )
    })?;
    let end = window.len().min(start + VERSION_WINDOW);
    let text = &window[start..end];
    let space = text.iter().position(|&b| b == b' ').ok_or_else(|| {
        ImageError::Unrecognized("image terminates before end of version string".to_string())
    })?;

    std::str::from_utf8(&text[..space])
        .map(str::to_string)
        .map_err(|_| ImageError::Unrecognized("version string is not valid UTF-8".to_string()))
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::kernel_body;
    use super::*;
    use proptest::prelude::*;
    use std::io::{Cursor, Write};

    fn parse(bytes: &[u8]) -> Result<String, ImageError> {
        read_version(&mut Cursor::new(bytes))
    }

    #[test]
    fn detects_codecs_by_magic() {
        assert_eq!(Codec::detect(b"\x1f\x8b\x08\x00"), Some(Codec::Gzip));
        assert_eq!(Codec::detect(b"BZh91AY&SY"), Some(Codec::Bzip2));
        assert_eq!(Codec::detect(b"\xfd7zXZ\x00\x00"), Some(Codec::Xz));
        assert_eq!(Codec::detect(b"\x5d\x00\x00\x80\x00"), Some(Codec::Lzma));
        assert_eq!(Codec::detect(b"\x04\x22\x4d\x18\x64"), Some(Codec::Lz4));
        assert_eq!(Codec::detect(b"\x28\xb5\x2f\xfd\x00"), Some(Codec::Zstd));
        assert_eq!(
            Codec::detect(b"\x89LZO\x00\r\n\x1a\n\x10"),
            Some(Codec::Lzo)
        );
        assert_eq!(Codec::detect(b"\x1f\x8b"), None);
        assert_eq!(Codec::detect(b"\x7fELF"), None);
        assert_eq!(Codec::detect(b""), None);
    }

    #[test]
    fn uncompressed_banner() {
        assert_eq!(parse(&kernel_body("6.6.13-gentoo", 100)).unwrap(), "6.6.13-gentoo");
    }

    #[test]
    fn banner_across_chunk_boundary() {
        let body = kernel_body("5.4.0-150-generic", CHUNK_LEN - 8);
        assert_eq!(parse(&body).unwrap(), "5.4.0-150-generic");
    }

    #[test]
    fn missing_banner() {
        let err = parse(&vec![0x55u8; 3 * CHUNK_LEN]).unwrap_err();
        assert!(matches!(err, ImageError::Unrecognized(_)));
    }

    #[test]
    fn truncated_version_string() {
        let err = parse(b"\0\0\0Linux version 6.1.0-no-space-follows").unwrap_err();
        assert!(matches!(err, ImageError::Unrecognized(ref m) if m.contains("terminates")));
    }

    #[test]
    fn version_longer_than_window() {
        let mut body = b"Linux version ".to_vec();
        body.extend(std::iter::repeat(b'9').take(VERSION_WINDOW + 10));
        body.extend_from_slice(b" (gcc)");
        assert!(matches!(parse(&body), Err(ImageError::Unrecognized(_))));
    }

    #[test]
    fn lzo_has_no_decompressor() {
        let mut body = b"\x89LZO\x00\r\n\x1a\n".to_vec();
        body.extend_from_slice(&[0u8; 64]);
        let err = parse(&body).unwrap_err();
        assert!(matches!(err, ImageError::MissingDecompressor(Codec::Lzo)));
        assert!(!Codec::Lzo.is_available());
    }

    #[cfg(feature = "gzip")]
    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[cfg(feature = "gzip")]
    #[test]
    fn gzip_payload_is_searched() {
        let img = gzip(&kernel_body("6.1.55-gentoo", 200_000));
        assert_eq!(parse(&img).unwrap(), "6.1.55-gentoo");
    }

    #[cfg(feature = "gzip")]
    #[test]
    fn gzip_trailing_garbage() {
        let mut img = gzip(&kernel_body("6.1.55-gentoo", 1_000));
        img.extend_from_slice(b"\x00\x01\x02 appended by the bootloader installer");
        assert_eq!(parse(&img).unwrap(), "6.1.55-gentoo");
    }

    #[cfg(feature = "gzip")]
    #[test]
    fn gzip_corrupt_before_banner() {
        let mut img = gzip(&kernel_body("6.1.55", 100_000));
        img.truncate(40);
        img.extend_from_slice(&[0xFF; 64]);
        assert!(matches!(parse(&img), Err(ImageError::Unrecognized(_))));
    }

    #[cfg(feature = "bzip2")]
    #[test]
    fn bzip2_payload_is_searched() {
        let mut enc = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        enc.write_all(&kernel_body("4.14.336", 50_000)).unwrap();
        assert_eq!(parse(&enc.finish().unwrap()).unwrap(), "4.14.336");
    }

    #[cfg(feature = "xz")]
    #[test]
    fn xz_payload_is_searched() {
        let mut enc = xz2::write::XzEncoder::new(Vec::new(), 6);
        enc.write_all(&kernel_body("6.8.9-arch1-1", 50_000)).unwrap();
        assert_eq!(parse(&enc.finish().unwrap()).unwrap(), "6.8.9-arch1-1");
    }

    #[cfg(feature = "xz")]
    #[test]
    fn legacy_lzma_payload_is_searched() {
        let opts = xz2::stream::LzmaOptions::new_preset(6).unwrap();
        let stream = xz2::stream::Stream::new_lzma_encoder(&opts).unwrap();
        let mut enc = xz2::write::XzEncoder::new_stream(Vec::new(), stream);
        enc.write_all(&kernel_body("3.10.0-1160.el7", 20_000)).unwrap();
        let img = enc.finish().unwrap();

        assert_eq!(Codec::detect(&img), Some(Codec::Lzma));
        assert_eq!(parse(&img).unwrap(), "3.10.0-1160.el7");
    }

    #[cfg(feature = "lz4")]
    #[test]
    fn lz4_frame_payload_is_searched() {
        let mut enc = lz4_flex::frame::FrameEncoder::new(Vec::new());
        enc.write_all(&kernel_body("5.10.209", 50_000)).unwrap();
        assert_eq!(parse(&enc.finish().unwrap()).unwrap(), "5.10.209");
    }

    #[cfg(feature = "zstd")]
    #[test]
    fn zstd_payload_is_searched() {
        let img = zstd::stream::encode_all(&kernel_body("6.7.0-rc3", 50_000)[..], 3).unwrap();
        assert_eq!(parse(&img).unwrap(), "6.7.0-rc3");
    }

    #[cfg(feature = "zstd")]
    #[test]
    fn zstd_without_banner() {
        let img = zstd::stream::encode_all(&[0x42u8; 10_000][..], 3).unwrap();
        assert!(matches!(parse(&img), Err(ImageError::Unrecognized(_))));
    }

    proptest! {
        #[test]
        fn prop_raw_banner_version_recovered(
            major in 2u32..8,
            minor in 0u32..30,
            patch in 0u32..400,
            padding in 0usize..(2 * CHUNK_LEN),
        ) {
            let version = format!("{}.{}.{}", major, minor, patch);
            let body = kernel_body(&version, padding);
            prop_assert_eq!(parse(&body).unwrap(), version);
        }
    }

    #[cfg(feature = "gzip")]
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_gzip_banner_version_recovered(
            major in 2u32..8,
            minor in 0u32..30,
            patch in 0u32..400,
            padding in 0usize..20_000,
        ) {
            let version = format!("{}.{}.{}", major, minor, patch);
            let img = gzip(&kernel_body(&version, padding));
            prop_assert_eq!(parse(&img).unwrap(), version);
        }
    }

    #[cfg(feature = "bzip2")]
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_bzip2_banner_version_recovered(
            major in 2u32..8,
            minor in 0u32..30,
            patch in 0u32..400,
            padding in 0usize..20_000,
        ) {
            let version = format!("{}.{}.{}", major, minor, patch);
            let body = kernel_body(&version, padding);
            let mut enc = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::fast());
            enc.write_all(&body).unwrap();
            let img = enc.finish().unwrap();
            prop_assert_eq!(parse(&img).unwrap(), version);
        }
    }

    #[cfg(feature = "xz")]
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_xz_banner_version_recovered(
            major in 2u32..8,
            minor in 0u32..30,
            patch in 0u32..400,
            padding in 0usize..20_000,
        ) {
            let version = format!("{}.{}.{}", major, minor, patch);
            let body = kernel_body(&version, padding);
            let mut enc = xz2::write::XzEncoder::new(Vec::new(), 1);
            enc.write_all(&body).unwrap();
            let img = enc.finish().unwrap();
            prop_assert_eq!(parse(&img).unwrap(), version);
        }
    }

    #[cfg(feature = "lz4")]
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_lz4_banner_version_recovered(
            major in 2u32..8,
            minor in 0u32..30,
            patch in 0u32..400,
            padding in 0usize..20_000,
        ) {
            let version = format!("{}.{}.{}", major, minor, patch);
            let body = kernel_body(&version, padding);
            let mut enc = lz4_flex::frame::FrameEncoder::new(Vec::new());
            enc.write_all(&body).unwrap();
            let img = enc.finish().unwrap();
            prop_assert_eq!(parse(&img).unwrap(), version);
        }
    }

    #[cfg(feature = "zstd")]
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_zstd_banner_version_recovered(
            major in 2u32..8,
            minor in 0u32..30,
            patch in 0u32..400,
            padding in 0usize..20_000,
        ) {
            let version = format!("{}.{}.{}", major, minor, patch);
            let body = kernel_body(&version, padding);
            let img = zstd::stream::encode_all(&body[..], 1).unwrap();
            prop_assert_eq!(parse(&img).unwrap(), version);
        }
    }
}
