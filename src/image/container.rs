//! PE executable wrapper used by EFI-stub kernels.
//!
//! Only the handful of fields needed to find the `.linux` section are
//! read: the PE header offset, the COFF section count, the optional header
//! size and each section's name and raw data pointer.

use std::io::{Read, Seek, SeekFrom};

use super::{read_field, ImageError};

pub const MAGIC: &[u8; 2] = b"MZ";

/// One-byte pointer to the PE signature.
const PE_OFFSET_FIELD: u64 = 0x3C;
const PE_SIGNATURE_LEN: u64 = 4;
const COFF_HEADER_LEN: usize = 20;
const SECTION_ENTRY_LEN: u64 = 40;
const SECTION_NAME_LEN: usize = 8;
const POINTER_TO_RAW_DATA: u64 = 20;
const LINUX_SECTION: &[u8] = b".linux";

/// File offset of the embedded kernel, or 0 if there is no `.linux` section.
pub fn locate_payload<R: Read + Seek>(reader: &mut R) -> Result<u64, ImageError> {
    reader.seek(SeekFrom::Start(PE_OFFSET_FIELD))?;
    let mut pe_offset = [0u8; 1];
    read_field(reader, &mut pe_offset, "the PE header offset")?;

    let coff = u64::from(pe_offset[0]) + PE_SIGNATURE_LEN;
    reader.seek(SeekFrom::Start(coff))?;
    let mut header = [0u8; COFF_HEADER_LEN];
    read_field(reader, &mut header, "the COFF file header")?;

    let sections = u16::from_le_bytes([header[2], header[3]]);
    let optional_header_len = u16::from_le_bytes([header[16], header[17]]);
    let table = coff + COFF_HEADER_LEN as u64 + u64::from(optional_header_len);

    for index in 0..u64::from(sections) {
        let entry = table + index * SECTION_ENTRY_LEN;
        reader.seek(SeekFrom::Start(entry))?;
        let mut name = [0u8; SECTION_NAME_LEN];
        read_field(reader, &mut name, "the end of the section table")?;

        if name
            .windows(LINUX_SECTION.len())
            .any(|w| w == LINUX_SECTION)
        {
            reader.seek(SeekFrom::Start(entry + POINTER_TO_RAW_DATA))?;
            let mut pointer = [0u8; 4];
            read_field(reader, &mut pointer, "the .linux section pointer")?;
            let pointer = u32::from_le_bytes(pointer);
            log::trace!(".linux section {} at {:#x}", index, pointer);
            return Ok(u64::from(pointer));
        }
    }

    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{container, CONTAINER_PAYLOAD_AT};
    use super::*;
    use std::io::Cursor;

    #[test]
    fn locates_linux_section() {
        let img = container(b".linux\0\0", b"payload");
        let offset = locate_payload(&mut Cursor::new(img)).unwrap();
        assert_eq!(offset, CONTAINER_PAYLOAD_AT as u64);
    }

    #[test]
    fn missing_linux_section_defaults_to_zero() {
        let img = container(b".reloc\0\0", b"payload");
        assert_eq!(locate_payload(&mut Cursor::new(img)).unwrap(), 0);
    }

    #[test]
    fn section_name_substring_match() {
        let img = container(b"x.linux\0", b"payload");
        let offset = locate_payload(&mut Cursor::new(img)).unwrap();
        assert_eq!(offset, CONTAINER_PAYLOAD_AT as u64);
    }

    #[test]
    fn pe_offset_past_end() {
        let mut img = vec![0u8; 0x40];
        img[0..2].copy_from_slice(MAGIC);
        img[0x3C] = 0xF0;
        let err = locate_payload(&mut Cursor::new(img)).unwrap_err();
        assert!(matches!(err, ImageError::Unrecognized(_)));
    }
}
