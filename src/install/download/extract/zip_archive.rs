//! Streaming zip extraction
//!
//! Zip archives are normally read through the central directory at the end of
//! the file, which needs a seekable source. Release downloads are consumed
//! as they arrive, so entries are read from their local headers instead.
//!
//! Writers that stream their output leave the CRC and sizes out of the local
//! header and append them in a data descriptor after the entry data. Deflate
//! data is self-delimiting, so such entries are inflated until the deflate
//! stream ends and then checked against the descriptor. Local headers carry
//! no external attributes, so entries come out as plain files and directories.

use std::fs;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::CrcReader;
use flate2::bufread::DeflateDecoder;

use super::{ArchiveExtractor, ExtractError, ensure_parent, sanitize};

const LOCAL_FILE_HEADER: u32 = 0x0403_4b50;
const CENTRAL_DIRECTORY_HEADER: u32 = 0x0201_4b50;
const END_OF_CENTRAL_DIRECTORY: u32 = 0x0605_4b50;
const ZIP64_END_OF_CENTRAL_DIRECTORY: u32 = 0x0606_4b50;
const DATA_DESCRIPTOR: u32 = 0x0807_4b50;

const FLAG_ENCRYPTED: u16 = 1;
const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATED: u16 = 8;

const ZIP64_EXTRA_FIELD: u16 = 0x0001;

/// Extracts `.zip` release archives, as published for Windows.
#[derive(Debug, Clone)]
pub struct ZipExtractor {
    entry_point: PathBuf,
}

impl ZipExtractor {
    /// `entry_point` is the managed executable relative to the archive root.
    pub fn new(entry_point: impl Into<PathBuf>) -> Self {
        Self {
            entry_point: entry_point.into(),
        }
    }
}

impl ArchiveExtractor for ZipExtractor {
    fn entry_point(&self, dest: &Path) -> PathBuf {
        dest.join(&self.entry_point)
    }

    fn unpack(&self, source: &mut dyn Read, dest: &Path) -> Result<(), ExtractError> {
        let mut source = BufReader::new(source);
        loop {
            match read_u32(&mut source)? {
                LOCAL_FILE_HEADER => {}
                // entries are done once the central directory starts
                CENTRAL_DIRECTORY_HEADER | END_OF_CENTRAL_DIRECTORY | ZIP64_END_OF_CENTRAL_DIRECTORY => {
                    return Ok(());
                }
                other => {
                    return Err(ExtractError::MalformedZip(format!(
                        "unexpected record signature {other:#010x}"
                    )));
                }
            }
            let header = LocalHeader::read(&mut source)?;
            extract_entry(&mut source, &header, dest)?;
        }
    }
}

/// Fields of a local file header that extraction needs.
#[derive(Debug)]
struct LocalHeader {
    name: String,
    flags: u16,
    method: u16,
    crc32: u32,
    compressed_size: u64,
    size: u64,
    zip64: bool,
}

impl LocalHeader {
    /// Read the header that follows a local file header signature.
    fn read<R: Read>(source: &mut R) -> Result<Self, ExtractError> {
        let mut fixed = [0u8; 26];
        read_exact(source, &mut fixed)?;
        let flags = le_u16(&fixed[2..]);
        let method = le_u16(&fixed[4..]);
        let crc32 = le_u32(&fixed[10..]);
        let mut compressed_size = u64::from(le_u32(&fixed[14..]));
        let mut size = u64::from(le_u32(&fixed[18..]));

        let mut name = vec![0u8; usize::from(le_u16(&fixed[22..]))];
        read_exact(source, &mut name)?;
        let mut extra = vec![0u8; usize::from(le_u16(&fixed[24..]))];
        read_exact(source, &mut extra)?;

        let mut zip64 = false;
        if let Some(field) = extra_field(&extra, ZIP64_EXTRA_FIELD)
            && field.len() >= 16
        {
            size = le_u64(&field[0..]);
            compressed_size = le_u64(&field[8..]);
            zip64 = true;
        }

        Ok(Self {
            name: String::from_utf8_lossy(&name).into_owned(),
            flags,
            method,
            crc32,
            compressed_size,
            size,
            zip64,
        })
    }

    fn has_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }

    fn unsupported(&self, kind: impl Into<String>) -> ExtractError {
        ExtractError::UnsupportedEntry {
            entry: self.name.clone(),
            kind: kind.into(),
        }
    }
}

fn extract_entry<R: BufRead>(source: &mut R, header: &LocalHeader, dest: &Path) -> Result<(), ExtractError> {
    let name = header.name.as_str();
    // zip names always use '/', a backslash is an attempt to smuggle a Windows separator
    if name.contains('\\') {
        return Err(ExtractError::UnsafePath {
            entry: name.to_string(),
        });
    }
    if header.flags & FLAG_ENCRYPTED != 0 {
        return Err(header.unsupported("encrypted"));
    }
    let out_path = sanitize::entry_path(dest, Path::new(name))?;

    let mut body = entry_data(source, header)?;
    let written = if header.is_dir() {
        fs::create_dir_all(&out_path)
            .map_err(|e| ExtractError::io(format!("error extracting {name}: failed to make directory"), e))?;
        io::copy(&mut body, &mut io::sink())
    } else {
        ensure_parent(&out_path)
            .map_err(|e| ExtractError::io(format!("failed to create parent of {name}"), e))?;
        let mut file = fs::File::create(&out_path)
            .map_err(|e| ExtractError::io(format!("failed to create {name}"), e))?;
        io::copy(&mut body, &mut file)
    }
    .map_err(|e| ExtractError::io(format!("failed to copy {name}"), e))?;
    let crc32 = body.crc().sum();
    drop(body);

    let (expected_crc, declared) = if header.has_descriptor() {
        read_descriptor(source, header.zip64)?
    } else {
        (header.crc32, header.size)
    };
    if written < declared {
        return Err(ExtractError::Truncated {
            entry: name.to_string(),
            written,
            declared,
        });
    }
    if written != declared || crc32 != expected_crc {
        return Err(ExtractError::Corrupt {
            entry: name.to_string(),
        });
    }
    Ok(())
}

/// Entry data as stored in the archive, decompressed, with a running CRC.
fn entry_data<'a, R: BufRead>(
    source: &'a mut R,
    header: &LocalHeader,
) -> Result<CrcReader<Box<dyn Read + 'a>>, ExtractError> {
    let data: Box<dyn Read + 'a> = match header.method {
        METHOD_DEFLATED => Box::new(DeflateDecoder::new(source)),
        METHOD_STORED if !header.has_descriptor() => Box::new(source.take(header.compressed_size)),
        // directories carry no data even when their sizes are deferred
        METHOD_STORED if header.is_dir() => Box::new(source.take(0)),
        METHOD_STORED => return Err(header.unsupported("stored data with deferred size")),
        other => return Err(header.unsupported(format!("compression method {other}"))),
    };
    Ok(CrcReader::new(data))
}

/// Read a data descriptor, returning `(crc32, uncompressed size)`.
///
/// The leading signature is optional.
fn read_descriptor<R: Read>(source: &mut R, zip64: bool) -> Result<(u32, u64), ExtractError> {
    let mut crc32 = read_u32(source)?;
    if crc32 == DATA_DESCRIPTOR {
        crc32 = read_u32(source)?;
    }
    let size = if zip64 {
        let _compressed = read_u64(source)?;
        read_u64(source)?
    } else {
        let _compressed = read_u32(source)?;
        u64::from(read_u32(source)?)
    };
    Ok((crc32, size))
}

/// Find the extra field with `id` in a local header's extra block.
fn extra_field(mut extra: &[u8], id: u16) -> Option<&[u8]> {
    while extra.len() >= 4 {
        let field_id = le_u16(extra);
        let len = usize::from(le_u16(&extra[2..]));
        let data = extra.get(4..4 + len)?;
        if field_id == id {
            return Some(data);
        }
        extra = &extra[4 + len..];
    }
    None
}

fn read_exact<R: Read>(source: &mut R, buf: &mut [u8]) -> Result<(), ExtractError> {
    source
        .read_exact(buf)
        .map_err(|e| ExtractError::io("error reading zip archive", e))
}

fn read_u32<R: Read>(source: &mut R) -> Result<u32, ExtractError> {
    let mut buf = [0u8; 4];
    read_exact(source, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(source: &mut R) -> Result<u64, ExtractError> {
    let mut buf = [0u8; 8];
    read_exact(source, &mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn le_u16(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn le_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}
