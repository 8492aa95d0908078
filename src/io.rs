use std::{
    convert::TryInto,
    fs::{File, OpenOptions},
    io::{Cursor, Read, Seek, SeekFrom, Write},
    mem::size_of,
    path::Path,
};

use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use log::debug;

use crate::{error::CoreError, types::SmallResult};

/// A small binary-framed file, wrapping a plain [`File`] with the
/// read/seek/write primitives the log and temp-file modules build on.
pub struct SmallFile {
    file: File,
}

impl SmallFile {
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        let file = OpenOptions::new()
            .write(true)
            .read(true)
            .create(true)
            .open(file_path)
            .unwrap();

        Self { file }
    }

    pub fn write<T: Encodeable>(&mut self, obj: &T) -> SmallResult {
        self.file.write_all(&obj.encode())?;
        Ok(())
    }

    pub fn read<T: Decodeable>(&mut self) -> Result<T, CoreError> {
        Ok(T::decode_from(&mut self.file))
    }

    pub fn get_size(&self) -> Result<u64, CoreError> {
        let metadata = self.file.metadata()?;
        Ok(metadata.len())
    }

    pub fn get_current_position(&mut self) -> Result<u64, CoreError> {
        Ok(self.file.seek(SeekFrom::Current(0))?)
    }

    pub fn set_len(&self, len: u64) -> SmallResult {
        self.file.set_len(len)?;
        Ok(())
    }

    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64, CoreError> {
        Ok(self.file.seek(pos)?)
    }

    pub fn flush(&mut self) -> SmallResult {
        self.file.flush()?;
        Ok(())
    }

    pub fn sync_all(&self) -> SmallResult {
        self.file.sync_all()?;
        Ok(())
    }

    /// Write `bytes` verbatim, with no length prefix. Used for fixed-size
    /// framing (log pages) where the caller owns the layout.
    pub fn write_raw(&mut self, bytes: &[u8]) -> SmallResult {
        self.file.write_all(bytes)?;
        Ok(())
    }

    /// Read exactly `len` bytes, with no length prefix. Unlike
    /// [`read_exact`] this surfaces a short read as an `Err` rather than
    /// panicking, since callers probe for not-yet-written pages.
    pub fn read_raw(&mut self, len: usize) -> Result<Vec<u8>, CoreError> {
        let mut buffer = vec![0u8; len];
        self.file.read_exact(&mut buffer)?;
        Ok(buffer)
    }
}

pub fn read_into<T: Decodeable, R: Read>(reader: &mut R) -> T {
    T::decode_from(reader)
}

pub fn read_exact<R: Read>(reader: &mut R, bytes_count: usize) -> Vec<u8> {
    let mut buffer = vec![0u8; bytes_count];
    reader
        .read_exact(&mut buffer)
        .unwrap_or_else(|e| panic!("io error, expected {} bytes: {}", bytes_count, e));
    buffer
}

/// Append-only scratch buffer used to assemble a record before it is
/// written to the log file in one call: records must not become visible
/// half-written.
pub struct SmallWriter {
    buf: Vec<u8>,
}

impl SmallWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn write<T: Encodeable>(&mut self, obj: &T) {
        self.buf.extend_from_slice(obj.encode().as_slice());
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.buf.clone()
    }

    pub fn size(&self) -> usize {
        self.buf.len()
    }
}

impl Default for SmallWriter {
    fn default() -> Self {
        Self::new()
    }
}

pub trait Encodeable {
    fn encode(&self) -> Vec<u8>;
}

pub trait Decodeable {
    fn decode_from<R: Read>(reader: &mut R) -> Self;
}

/// # Format
/// - 1 byte (0 for false, 1 for true)
impl Encodeable for bool {
    fn encode(&self) -> Vec<u8> {
        vec![*self as u8]
    }
}

impl Decodeable for bool {
    fn decode_from<R: Read>(reader: &mut R) -> Self {
        u8::decode_from(reader) == 1
    }
}

/// # Format
/// - 4 bytes: length (little endian)
/// - n bytes: payload
impl Encodeable for Vec<u8> {
    fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(4 + self.len());
        buffer.extend_from_slice(&(self.len() as u32).to_le_bytes());
        buffer.extend_from_slice(self);
        buffer
    }
}

impl Decodeable for Vec<u8> {
    fn decode_from<R: Read>(reader: &mut R) -> Self {
        let len = u32::from_le_bytes(read_exact(reader, 4).try_into().unwrap());
        read_exact(reader, len as usize)
    }
}

impl Encodeable for String {
    fn encode(&self) -> Vec<u8> {
        self.clone().into_bytes().encode()
    }
}

impl Decodeable for String {
    fn decode_from<R: Read>(reader: &mut R) -> Self {
        let bytes = Vec::<u8>::decode_from(reader);
        String::from_utf8(bytes).unwrap_or_default()
    }
}

macro_rules! impl_serialization {
    (for $($t:ty),+) => {
        $(
            impl Encodeable for $t {
                fn encode(&self) -> Vec<u8> {
                    self.to_le_bytes().to_vec()
                }
            }

            impl Decodeable for $t {
                fn decode_from<R: Read>(reader: &mut R) -> Self {
                    let bytes = read_exact(reader, size_of::<Self>());
                    Self::from_le_bytes(bytes.try_into().unwrap())
                }
            }
        )*
    }
}

impl_serialization!(for u8, u16, u32, u64, u128, i8, i16, i32, i64, i128, isize, usize, f32, f64);

/// High bit of a stored payload length signals that the bytes following
/// are zlib-compressed; the remaining 31 bits give the *compressed*
/// length. Writers and readers must agree on this framing.
const COMPRESSED_FLAG: u32 = 1 << 31;

/// Payloads at or above this many bytes are stored compressed; small
/// tuple-update payloads bypass the zlib round-trip entirely.
pub const COMPRESSION_THRESHOLD: usize = 256;

/// Encode `payload`, compressing it first if doing so is worth it. Wire
/// format: `[len_and_flag: u32][bytes]`, where `bytes` is either the raw
/// payload or its zlib stream depending on the high bit of `len_and_flag`.
pub fn encode_payload(payload: &[u8]) -> Vec<u8> {
    if payload.len() >= COMPRESSION_THRESHOLD {
        let compressed = zip(payload);
        if compressed.len() < payload.len() {
            let mut buf = Vec::with_capacity(4 + compressed.len());
            let len_and_flag = (compressed.len() as u32) | COMPRESSED_FLAG;
            buf.extend_from_slice(&len_and_flag.to_le_bytes());
            buf.extend_from_slice(&compressed);
            return buf;
        }
    }

    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(payload);
    buf
}

pub fn decode_payload<R: Read>(reader: &mut R) -> Vec<u8> {
    let len_and_flag = u32::from_le_bytes(read_exact(reader, 4).try_into().unwrap());
    let compressed = len_and_flag & COMPRESSED_FLAG != 0;
    let len = (len_and_flag & !COMPRESSED_FLAG) as usize;
    let bytes = read_exact(reader, len);

    if compressed {
        unzip(&bytes)
    } else {
        bytes
    }
}

/// DEFLATE-compress `data`.
pub fn zip(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("in-memory zlib write cannot fail");
    encoder.finish().expect("in-memory zlib finish cannot fail")
}

/// Inverse of [`zip`].
pub fn unzip(data: &[u8]) -> Vec<u8> {
    let mut decoder = ZlibDecoder::new(Cursor::new(data));
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .unwrap_or_else(|e| panic!("corrupted compressed log payload: {}", e));
    out
}

/// Byte-wise XOR of two buffers, padding the shorter one with zero bytes.
/// Used both to produce a DIFF_UNDOREDO record's stored diff and, at redo
/// time, to reconstruct the after-image: `redo = undo XOR xor_payload`.
pub fn xor_bytes(a: &[u8], b: &[u8]) -> Vec<u8> {
    let len = a.len().max(b.len());
    let mut out = Vec::with_capacity(len);
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        out.push(x ^ y);
    }
    out
}

pub fn trace_bytes(label: &str, bytes: &[u8]) {
    debug!(
        "{}: {} bytes, head={:02x?}",
        label,
        bytes.len(),
        &bytes[..bytes.len().min(16)]
    );
}
