use std::{
    io::{Read, Seek, SeekFrom},
    path::Path,
};

use crate::{
    error::CoreError,
    io::{Decodeable, Encodeable, SmallFile},
    types::{CoreResult, SmallResult},
    utils::now_millis,
};

use super::{
    lsa::{Lsa, NULL_LSA},
    record::Trid,
};

/// Header stamped at the start of every page after page 0.
pub struct LogPageHeader {
    pub logical_pageid: i64,
    pub offset: i32,
}

impl Encodeable for LogPageHeader {
    fn encode(&self) -> Vec<u8> {
        let mut buf = self.logical_pageid.encode();
        buf.extend(self.offset.encode());
        buf
    }
}

impl Decodeable for LogPageHeader {
    fn decode_from<R: Read>(reader: &mut R) -> Self {
        LogPageHeader {
            logical_pageid: i64::decode_from(reader),
            offset: i32::decode_from(reader),
        }
    }
}

pub const LOG_PAGE_HEADER_SIZE: usize = 8 + 4;

/// Default physical log page size; overridable per [`LogPageStore::open`].
pub const DEFAULT_LOG_PAGE_SIZE: usize = 4096;

const LOG_HEADER_MAGIC: [u8; 8] = *b"ARIESLOG";

/// Page 0's fixed-layout header (spec §6's "active log" header page).
#[derive(Debug, Clone)]
pub struct LogHeader {
    magic: [u8; 8],
    pub db_creation_time: u64,
    pub log_pagesize: u32,
    pub next_trid: Trid,
    pub append_lsa: Lsa,
    pub chkpt_lsa: Lsa,
    pub fpageid: i64,
    pub nxarv_num: i32,
    pub nxarv_pageid: i64,
    pub last_deleted_arv_num: i32,
    pub nvols: i32,
}

impl LogHeader {
    /// A freshly-initialized header: `append_lsa = (0,0)` as required for
    /// an empty log; `fpageid` stays `1` since page 0 is reserved for the
    /// header itself, so the first byte actually appended lands on page 1.
    fn new_empty(log_pagesize: u32) -> Self {
        LogHeader {
            magic: LOG_HEADER_MAGIC,
            db_creation_time: now_millis(),
            log_pagesize,
            next_trid: 1,
            append_lsa: Lsa::new(0, 0),
            chkpt_lsa: NULL_LSA,
            fpageid: 1,
            nxarv_num: 0,
            nxarv_pageid: 1,
            last_deleted_arv_num: -1,
            nvols: 0,
        }
    }

    pub fn is_magic_valid(&self) -> bool {
        self.magic == LOG_HEADER_MAGIC
    }
}

impl Encodeable for LogHeader {
    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.magic);
        buf.extend(self.db_creation_time.encode());
        buf.extend(self.log_pagesize.encode());
        buf.extend(self.next_trid.encode());
        buf.extend(self.append_lsa.encode());
        buf.extend(self.chkpt_lsa.encode());
        buf.extend(self.fpageid.encode());
        buf.extend(self.nxarv_num.encode());
        buf.extend(self.nxarv_pageid.encode());
        buf.extend(self.last_deleted_arv_num.encode());
        buf.extend(self.nvols.encode());
        buf
    }
}

impl Decodeable for LogHeader {
    fn decode_from<R: Read>(reader: &mut R) -> Self {
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic).expect("log header truncated");
        LogHeader {
            magic,
            db_creation_time: u64::decode_from(reader),
            log_pagesize: u32::decode_from(reader),
            next_trid: Trid::decode_from(reader),
            append_lsa: Lsa::decode_from(reader),
            chkpt_lsa: Lsa::decode_from(reader),
            fpageid: i64::decode_from(reader),
            nxarv_num: i32::decode_from(reader),
            nxarv_pageid: i64::decode_from(reader),
            last_deleted_arv_num: i32::decode_from(reader),
            nvols: i32::decode_from(reader),
        }
    }
}

/// Fixed-size-page backing store for the write-ahead log.
///
/// Archive rotation (spec §6's `_lgar<nnn>` files) is out of this crate's
/// scope per §1's "backup, archiving administration ... beyond the
/// scheduling contract"; this store models the active log as one file
/// whose logical page ids grow without bound, which is sufficient for
/// every recovery scenario in §8 — archive-file switching is a pure
/// capacity-management concern layered on top.
pub struct LogPageStore {
    file: SmallFile,
    page_size: usize,
    header: LogHeader,
    active_page_id: i64,
    active_area: Vec<u8>,
}

impl LogPageStore {
    pub fn open<P: AsRef<Path>>(path: P, page_size: usize) -> CoreResult<Self> {
        let mut file = SmallFile::new(path);
        let size = file.get_size()?;

        if size == 0 {
            let header = LogHeader::new_empty(page_size as u32);
            let mut store = LogPageStore {
                file,
                page_size,
                active_page_id: header.fpageid,
                header,
                active_area: Vec::new(),
            };
            store.persist_header()?;
            return Ok(store);
        }

        file.seek(SeekFrom::Start(0))?;
        let header: LogHeader = file.read()?;
        if !header.is_magic_valid() {
            return Err(CoreError::fatal("log header magic mismatch"));
        }

        // An empty log's persisted `append_lsa` reads `(0,0)` (the header's
        // never-appended sentinel) while data actually starts at `fpageid`;
        // clamp so a log that was created but never appended to reopens
        // onto its real first page instead of colliding with the header.
        let active_page_id = header.append_lsa.page_id.max(header.fpageid);
        let offset = header.append_lsa.offset as usize;
        let area_capacity = page_size - LOG_PAGE_HEADER_SIZE;
        let mut active_area = vec![0u8; area_capacity];
        let byte_offset = active_page_id as u64 * page_size as u64 + LOG_PAGE_HEADER_SIZE as u64;
        if file.get_size()? >= byte_offset + area_capacity as u64 {
            file.seek(SeekFrom::Start(byte_offset))?;
            active_area = file.read_raw(area_capacity)?;
        }
        active_area.truncate(offset);

        Ok(LogPageStore {
            file,
            page_size,
            header,
            active_page_id,
            active_area,
        })
    }

    pub fn header(&self) -> &LogHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut LogHeader {
        &mut self.header
    }

    pub fn area_capacity(&self) -> usize {
        self.page_size - LOG_PAGE_HEADER_SIZE
    }

    fn page_byte_offset(&self, page_id: i64) -> u64 {
        page_id as u64 * self.page_size as u64
    }

    /// Append `bytes` at the current append LSA, splitting across page
    /// boundaries as needed. Returns the LSA the bytes start at.
    pub fn append_bytes(&mut self, bytes: &[u8]) -> CoreResult<Lsa> {
        // Derived from the active page/area rather than trusted straight
        // off `header.append_lsa`: on a log that was persisted but never
        // appended to, that field still holds the `(0,0)` empty sentinel,
        // which doesn't match `active_page_id` (clamped to `fpageid`).
        let start_lsa = Lsa::new(self.active_page_id, self.active_area.len() as i32);
        let mut remaining = bytes;

        loop {
            let capacity = self.area_capacity() - self.active_area.len();
            if capacity == 0 {
                self.flush_active_page()?;
                self.active_page_id += 1;
                self.active_area = Vec::new();
                self.header.append_lsa = Lsa::new(self.active_page_id, 0);
                continue;
            }

            let take = remaining.len().min(capacity);
            self.active_area.extend_from_slice(&remaining[..take]);
            remaining = &remaining[take..];
            self.header.append_lsa = Lsa::new(self.active_page_id, self.active_area.len() as i32);

            if remaining.is_empty() {
                break;
            }
        }

        Ok(start_lsa)
    }

    fn flush_active_page(&mut self) -> SmallResult {
        let page_header = LogPageHeader {
            logical_pageid: self.active_page_id,
            offset: self.active_area.len() as i32,
        };
        let offset_bytes = self.page_byte_offset(self.active_page_id);
        self.file.seek(SeekFrom::Start(offset_bytes))?;
        self.file.write(&page_header)?;

        let mut area = self.active_area.clone();
        area.resize(self.area_capacity(), 0);
        self.file.write_raw(&area)?;
        Ok(())
    }

    pub fn persist_header(&mut self) -> SmallResult {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write(&self.header)?;
        Ok(())
    }

    /// Flush the in-memory tail page and the header. Must precede any
    /// "flush log up to LSA" acknowledgment the page buffer relies on
    /// (the write-ahead rule, spec §4.1).
    pub fn flush(&mut self) -> SmallResult {
        self.flush_active_page()?;
        self.persist_header()?;
        Ok(())
    }

    pub fn sync(&mut self) -> SmallResult {
        self.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    fn read_page_header(&mut self, page_id: i64) -> CoreResult<LogPageHeader> {
        let offset_bytes = self.page_byte_offset(page_id);
        self.file.seek(SeekFrom::Start(offset_bytes))?;
        self.file.read()
    }

    /// Full stored area for `page_id`, truncated to the bytes actually
    /// written (per that page's own header).
    fn read_page_area(&mut self, page_id: i64) -> CoreResult<Vec<u8>> {
        let page_header = self.read_page_header(page_id)?;
        let offset_bytes = self.page_byte_offset(page_id) + LOG_PAGE_HEADER_SIZE as u64;
        self.file.seek(SeekFrom::Start(offset_bytes))?;
        let bytes = self.file.read_raw(self.area_capacity())?;
        Ok(bytes[..page_header.offset as usize].to_vec())
    }

    fn area_for_cursor(&mut self, page_id: i64) -> CoreResult<Vec<u8>> {
        if page_id == self.active_page_id {
            return Ok(self.active_area.clone());
        }
        if page_id > self.active_page_id {
            return Ok(Vec::new());
        }
        self.read_page_area(page_id)
    }

    /// Open a forward-reading cursor at `start`; the returned cursor
    /// implements [`Read`] and crosses page boundaries transparently,
    /// matching spec §4.1's continuation mechanism for records that span
    /// a page.
    pub fn cursor(&mut self, start: Lsa) -> CoreResult<LogCursor<'_>> {
        let area = self.area_for_cursor(start.page_id)?;
        Ok(LogCursor {
            store: self,
            page_id: start.page_id,
            offset: start.offset as usize,
            area,
        })
    }
}

/// A forward-only byte stream over a [`LogPageStore`], advancing to the
/// next physical page transparently when the current page is exhausted.
pub struct LogCursor<'a> {
    store: &'a mut LogPageStore,
    page_id: i64,
    offset: usize,
    area: Vec<u8>,
}

impl<'a> LogCursor<'a> {
    pub fn lsa(&self) -> Lsa {
        Lsa::new(self.page_id, self.offset as i32)
    }

    /// True once the cursor has run past the last page with any content.
    pub fn at_end(&self) -> bool {
        self.offset >= self.area.len() && self.page_id >= self.store.active_page_id
    }
}

impl<'a> Read for LogCursor<'a> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut written = 0;
        while written < buf.len() {
            if self.offset >= self.area.len() {
                if self.page_id >= self.store.active_page_id {
                    break;
                }
                self.page_id += 1;
                self.offset = 0;
                self.area = self
                    .store
                    .area_for_cursor(self.page_id)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
                if self.area.is_empty() {
                    break;
                }
            }

            let avail = self.area.len() - self.offset;
            let take = (buf.len() - written).min(avail);
            buf[written..written + take].copy_from_slice(&self.area[self.offset..self.offset + take]);
            self.offset += take;
            written += take;
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read as _;
    use tempfile::NamedTempFile;

    fn store_with_page_size(page_size: usize) -> (LogPageStore, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        std::fs::remove_file(file.path()).ok();
        let store = LogPageStore::open(file.path(), page_size).unwrap();
        (store, file)
    }

    #[test]
    fn empty_log_append_lsa_is_zero_zero() {
        let (store, _f) = store_with_page_size(DEFAULT_LOG_PAGE_SIZE);
        assert_eq!(store.header().append_lsa, Lsa::new(0, 0));
    }

    #[test]
    fn first_append_into_an_empty_log_lands_on_fpageid() {
        let (mut store, _f) = store_with_page_size(DEFAULT_LOG_PAGE_SIZE);
        let fpageid = store.header().fpageid;
        let lsa = store.append_bytes(&[1, 2, 3]).unwrap();
        assert_eq!(lsa, Lsa::new(fpageid, 0));
    }

    #[test]
    fn append_and_read_back_small_record() {
        let (mut store, _f) = store_with_page_size(DEFAULT_LOG_PAGE_SIZE);
        let payload = vec![1u8, 2, 3, 4, 5];
        let lsa = store.append_bytes(&payload).unwrap();
        store.flush().unwrap();

        let mut cursor = store.cursor(lsa).unwrap();
        let mut got = vec![0u8; payload.len()];
        cursor.read_exact(&mut got).unwrap();
        assert_eq!(got, payload);
    }

    #[test]
    fn append_spanning_page_boundary_reads_back_contiguous() {
        // tiny page forces a split quickly
        let (mut store, _f) = store_with_page_size(LOG_PAGE_HEADER_SIZE + 8);
        let first = vec![9u8; 6];
        let second = vec![7u8; 20];
        store.append_bytes(&first).unwrap();
        let lsa = store.append_bytes(&second).unwrap();
        store.flush().unwrap();

        let mut cursor = store.cursor(lsa).unwrap();
        let mut got = vec![0u8; second.len()];
        cursor.read_exact(&mut got).unwrap();
        assert_eq!(got, second);
    }

    #[test]
    fn header_persists_across_reopen() {
        let file = NamedTempFile::new().unwrap();
        std::fs::remove_file(file.path()).ok();
        {
            let mut store = LogPageStore::open(file.path(), DEFAULT_LOG_PAGE_SIZE).unwrap();
            store.header_mut().next_trid = 42;
            store.append_bytes(&[1, 2, 3]).unwrap();
            store.sync().unwrap();
        }
        let store = LogPageStore::open(file.path(), DEFAULT_LOG_PAGE_SIZE).unwrap();
        assert_eq!(store.header().next_trid, 42);
        assert_eq!(store.header().append_lsa, Lsa::new(1, 3));
    }
}
