//! Entry names of RAR5 archives, read without extracting anything.
//!
//! `rar::Archive::extract_all` creates each entry as soon as its header is
//! parsed, so names are collected here first by walking the block headers
//! and seeking over the data areas.

use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use geointake_fs::{open_utf8_file, utf8_path};

const RAR5_SIGNATURE: [u8; 8] = *b"Rar!\x1a\x07\x01\x00";
const RAR4_SIGNATURE: [u8; 7] = *b"Rar!\x1a\x07\x00";
const MAX_HEADER_SIZE: u64 = 2 * 1024 * 1024;

const HEADER_FILE: u64 = 2;
const HEADER_ENCRYPTION: u64 = 4;
const HEADER_END: u64 = 5;

const HAS_EXTRA_AREA: u64 = 0x0001;
const HAS_DATA_AREA: u64 = 0x0002;
const FILE_HAS_MTIME: u64 = 0x0002;
const FILE_HAS_CRC: u64 = 0x0004;

/// Names of the file and directory entries in `archive`, in archive order.
///
/// # Errors
/// Fails for unreadable files, RAR4 archives, encrypted headers and
/// malformed blocks.
pub(super) fn entry_names(archive: &Path) -> io::Result<Vec<String>> {
    let file = open_utf8_file(utf8_path(archive)?)?;
    read_entry_names(BufReader::new(file))
}

pub(super) fn read_entry_names<R: Read + Seek>(mut reader: R) -> io::Result<Vec<String>> {
    let mut signature = [0_u8; 8];
    reader.read_exact(&mut signature)?;
    if signature.starts_with(&RAR4_SIGNATURE) {
        return Err(invalid("RAR4 archives cannot be listed"));
    }
    if signature != RAR5_SIGNATURE {
        return Err(invalid("missing RAR5 signature"));
    }

    let mut names = Vec::new();
    loop {
        let mut crc = [0_u8; 4];
        match reader.read_exact(&mut crc) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(err),
        }
        let size = read_vint(&mut reader)?;
        if size == 0 || size > MAX_HEADER_SIZE {
            return Err(invalid("block header size is out of range"));
        }
        let mut header = vec![0_u8; usize::try_from(size).map_err(|_| too_large())?];
        reader.read_exact(&mut header)?;

        let mut fields = Fields { rest: &header };
        let kind = fields.vint()?;
        let flags = fields.vint()?;
        if flags & HAS_EXTRA_AREA != 0 {
            fields.vint()?;
        }
        let data_size = if flags & HAS_DATA_AREA == 0 {
            0
        } else {
            fields.vint()?
        };
        match kind {
            HEADER_FILE => names.push(fields.file_name()?),
            HEADER_ENCRYPTION => return Err(invalid("archive headers are encrypted")),
            HEADER_END => break,
            _ => {}
        }
        let skip = i64::try_from(data_size).map_err(|_| too_large())?;
        reader.seek(SeekFrom::Current(skip))?;
    }
    Ok(names)
}

fn read_vint<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut value = 0_u64;
    for shift in (0..64).step_by(7) {
        let mut byte = [0_u8; 1];
        reader.read_exact(&mut byte)?;
        let [byte] = byte;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(invalid("variable-length integer is too long"))
}

struct Fields<'a> {
    rest: &'a [u8],
}

impl<'a> Fields<'a> {
    fn vint(&mut self) -> io::Result<u64> {
        let mut value = 0_u64;
        for shift in (0..64).step_by(7) {
            let (&byte, rest) = self.rest.split_first().ok_or_else(truncated)?;
            self.rest = rest;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(invalid("variable-length integer is too long"))
    }

    fn take(&mut self, len: usize) -> io::Result<&'a [u8]> {
        let (head, rest) = self.rest.split_at_checked(len).ok_or_else(truncated)?;
        self.rest = rest;
        Ok(head)
    }

    fn file_name(&mut self) -> io::Result<String> {
        let file_flags = self.vint()?;
        // unpacked size, attributes
        self.vint()?;
        self.vint()?;
        if file_flags & FILE_HAS_MTIME != 0 {
            self.take(4)?;
        }
        if file_flags & FILE_HAS_CRC != 0 {
            self.take(4)?;
        }
        // compression info, host OS
        self.vint()?;
        self.vint()?;
        let len = usize::try_from(self.vint()?).map_err(|_| too_large())?;
        let name = self.take(len)?;
        String::from_utf8(name.to_vec()).map_err(|_| invalid("entry name is not valid UTF-8"))
    }
}

fn invalid(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.to_owned())
}

fn truncated() -> io::Error {
    invalid("block header is truncated")
}

fn too_large() -> io::Error {
    invalid("block size does not fit in memory")
}
