// Copyright 2025 Recoshard Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Preference file - the binary store of preference sets
//!
//! The file is a [`FileHeader`] followed directly by the records, packed
//! back to back. Every record reserves `capacity` entity slots so that a set
//! can grow in place until it runs out of slots.
//!
//! Record layout (big-endian):
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ Owner ID       (8 bytes)                                        │
//! │ Capacity       (4 bytes)  i32, reserved entity slots            │
//! │ Count          (4 bytes)  i32, used entity slots (<= capacity)  │
//! │ Entity IDs     (8 bytes x count) ascending                      │
//! │ Reserved       (8 bytes x (capacity - count)) never read        │
//! └─────────────────────────────────────────────────────────────────┘
//!
//! There is no write-ahead log: a failure in the middle of a delete or an
//! append leaves the file inconsistent.

use std::collections::{BTreeSet, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::core::{Error, PreferenceSet, Result, ENTITY_SLOT_SIZE, RECORD_PREFIX_SIZE};

use super::config::{StoreConfig, SyncMode};
use super::header::{be4, be8, read_header, FileHeader, HEADER_SIZE};
use super::traits::PreferenceSource;

/// Computes the capacity of a record that is about to be (re)written
///
/// The result is the smallest multiple of `unit` strictly greater than
/// `count`, so every grown record has at least one free slot.
pub fn grow_capacity(count: usize, unit: u32) -> Result<u32> {
    let unit = unit.max(1) as u64;
    let count64 = count as u64;
    let capacity = unit * (count64 / unit) + unit;
    if capacity > i32::MAX as u64 {
        return Err(Error::CapacityOverflow { count });
    }
    Ok(capacity as u32)
}

/// File-backed [`PreferenceSource`]
#[derive(Debug)]
pub struct PreferenceFile {
    path: PathBuf,
    /// None once closed
    file: Option<File>,
    header: FileHeader,
    sync_mode: SyncMode,
    min_capacity: u32,
    read_ahead: usize,
    /// Records read ahead but not yet handed out
    buffered: VecDeque<PreferenceSet>,
    /// Number of records read from disk in the current scan
    scan_index: u64,
    /// Offset of the next record to read from disk
    scan_offset: u64,
    move_buffer: Vec<u8>,
}

impl PreferenceFile {
    /// Opens (or creates) a preference file with default settings
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(&StoreConfig::new(path.as_ref()))
    }

    /// Opens (or creates) the preference file named by `config`
    ///
    /// An empty file gets a fresh header. A non-empty file must start with a
    /// valid header, otherwise [`Error::Format`] is returned.
    pub fn open_with_config(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let path = config.path.clone();

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| Error::io(format!("cannot open {}: {}", path.display(), e)))?;

        let file_len = file.metadata()?.len();
        let header = if file_len == 0 {
            let header = FileHeader::default();
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&header.encode())?;
            log::debug!("Initialized preference file {}", path.display());
            header
        } else {
            let mut buf = vec![0u8; (HEADER_SIZE.min(file_len)) as usize];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut buf)?;
            let header = read_header(&path, &buf)?;
            if header.data_end() > file_len {
                return Err(Error::format(
                    path.display().to_string(),
                    format!(
                        "header claims {} data bytes but the file holds {}",
                        header.data_size,
                        file_len.saturating_sub(HEADER_SIZE)
                    ),
                ));
            }
            log::debug!(
                "Opened preference file {} ({} sets, {} preferences)",
                path.display(),
                header.preference_set_count,
                header.preference_count
            );
            header
        };

        Ok(Self {
            path,
            file: Some(file),
            header,
            sync_mode: config.sync_mode,
            min_capacity: config.min_capacity,
            read_ahead: config.read_ahead,
            buffered: VecDeque::with_capacity(config.read_ahead),
            scan_index: 0,
            scan_offset: HEADER_SIZE,
            move_buffer: vec![0u8; config.move_buffer_size],
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes of record data after the header
    pub fn data_size(&self) -> u64 {
        self.header.data_size
    }

    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    fn file_mut(&mut self) -> Result<&mut File> {
        self.file.as_mut().ok_or(Error::StoreClosed)
    }

    fn write_header(&mut self) -> Result<()> {
        let encoded = self.header.encode();
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&encoded)?;
        Ok(())
    }

    /// Reads up to `read_ahead` records into the buffer
    fn fill_buffer(&mut self) -> Result<()> {
        let remaining = self
            .header
            .preference_set_count
            .saturating_sub(self.scan_index);
        if remaining == 0 {
            return Ok(());
        }
        let batch = remaining.min(self.read_ahead as u64);
        let data_end = self.header.data_end();

        let file = self.file.as_mut().ok_or(Error::StoreClosed)?;
        file.seek(SeekFrom::Start(self.scan_offset))?;
        let mut reader = BufReader::new(file);

        let mut offset = self.scan_offset;
        for _ in 0..batch {
            let set = read_record(&mut reader, offset, data_end)?;
            offset += set.disk_size();
            self.buffered.push_back(set);
        }

        self.scan_index += batch;
        self.scan_offset = offset;
        Ok(())
    }

    /// Copies `len` bytes from `from` to `to` through the move buffer
    ///
    /// Only used to shift data towards the start of the file (`to < from`),
    /// so copying chunks front to back never overwrites unread source bytes.
    fn move_block(&mut self, to: u64, from: u64, len: u64) -> Result<()> {
        if len == 0 || to == from {
            return Ok(());
        }
        debug_assert!(to < from);

        let file = self.file.as_mut().ok_or(Error::StoreClosed)?;
        let chunk_size = self.move_buffer.len() as u64;
        let mut moved = 0u64;
        while moved < len {
            let chunk = (len - moved).min(chunk_size) as usize;
            let buf = &mut self.move_buffer[..chunk];
            file.seek(SeekFrom::Start(from + moved))?;
            file.read_exact(buf)?;
            file.seek(SeekFrom::Start(to + moved))?;
            file.write_all(buf)?;
            moved += chunk as u64;
        }
        Ok(())
    }

    fn check_region(&self, offset: u64, size: u64) -> Result<()> {
        match offset.checked_add(size) {
            Some(end) if offset >= HEADER_SIZE && end <= self.header.data_end() => Ok(()),
            _ => Err(Error::InvalidOffset { offset }),
        }
    }
}

impl PreferenceSource for PreferenceFile {
    fn rewind(&mut self) -> Result<()> {
        if self.file.is_none() {
            return Err(Error::StoreClosed);
        }
        self.buffered.clear();
        self.scan_index = 0;
        self.scan_offset = HEADER_SIZE;
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool> {
        if self.buffered.is_empty() {
            self.fill_buffer()?;
        }
        Ok(!self.buffered.is_empty())
    }

    fn next(&mut self) -> Result<Option<PreferenceSet>> {
        if self.buffered.is_empty() {
            self.fill_buffer()?;
        }
        Ok(self.buffered.pop_front())
    }

    fn try_quick_rewrite(
        &mut self,
        original: &PreferenceSet,
        modified: &PreferenceSet,
    ) -> Result<bool> {
        if modified.len() > original.capacity() as usize {
            return Ok(false);
        }
        if modified.owner_id() != original.owner_id() {
            return Err(Error::invalid_argument(format!(
                "cannot rewrite owner {} with the set of owner {}",
                original.owner_id(),
                modified.owner_id()
            )));
        }
        self.check_region(original.offset(), original.disk_size())?;

        let mut buf =
            Vec::with_capacity((RECORD_PREFIX_SIZE + ENTITY_SLOT_SIZE * modified.len() as u64) as usize);
        encode_record(&mut buf, modified, original.capacity(), false)?;

        // Explicit offsets keep the scan cursor untouched
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(original.offset()))?;
        file.write_all(&buf)?;

        if let Some(pending) = self
            .buffered
            .iter_mut()
            .find(|set| set.offset() == original.offset())
        {
            *pending = PreferenceSet::new(
                original.owner_id(),
                original.capacity(),
                modified.entity_ids().clone(),
                original.offset(),
            );
        }

        self.header.preference_count = self
            .header
            .preference_count
            .saturating_sub(original.len() as u64)
            + modified.len() as u64;
        self.header.touch();
        Ok(true)
    }

    fn delete(&mut self, originals: &[PreferenceSet]) -> Result<()> {
        if originals.is_empty() {
            return Ok(());
        }

        // (offset, size, entity count)
        let mut holes: Vec<(u64, u64, u64)> = originals
            .iter()
            .map(|set| (set.offset(), set.disk_size(), set.len() as u64))
            .collect();
        holes.sort_by_key(|hole| hole.0);
        holes.dedup_by_key(|hole| hole.0);

        let data_end = self.header.data_end();
        let mut previous_end = HEADER_SIZE;
        for &(offset, size, _) in &holes {
            previous_end = match offset.checked_add(size) {
                Some(end) if offset >= previous_end && end <= data_end => end,
                _ => return Err(Error::InvalidOffset { offset }),
            };
        }

        let mut removed_bytes = 0u64;
        let mut removed_preferences = 0u64;
        for (i, &(offset, size, count)) in holes.iter().enumerate() {
            let from = offset + size;
            let end = holes.get(i + 1).map_or(data_end, |next| next.0);
            removed_bytes += size;
            removed_preferences += count;
            self.move_block(from - removed_bytes, from, end - from)?;
        }

        self.header.preference_set_count = self
            .header
            .preference_set_count
            .saturating_sub(holes.len() as u64);
        self.header.preference_count = self
            .header
            .preference_count
            .saturating_sub(removed_preferences);
        self.header.data_size -= removed_bytes;
        self.header.touch();

        let new_len = self.header.data_end();
        self.file_mut()?.set_len(new_len)?;

        log::debug!(
            "Deleted {} preference sets, reclaimed {} bytes",
            holes.len(),
            removed_bytes
        );
        self.rewind()
    }

    fn add(&mut self, records: &mut [PreferenceSet]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let start = self.header.data_end();
        let min_capacity = self.min_capacity;
        let file = self.file.as_mut().ok_or(Error::StoreClosed)?;
        file.seek(SeekFrom::Start(start))?;
        let mut writer = BufWriter::new(file);

        let mut offset = start;
        let mut added_preferences = 0u64;
        let mut buf = Vec::new();
        for record in records.iter_mut() {
            if !record.fits_capacity() {
                record.set_capacity(grow_capacity(record.len(), min_capacity)?);
            }
            record.set_offset(offset);

            buf.clear();
            encode_record(&mut buf, record, record.capacity(), true)?;
            writer.write_all(&buf)?;

            offset += record.disk_size();
            added_preferences += record.len() as u64;
        }
        writer.flush()?;
        drop(writer);

        self.header.preference_set_count += records.len() as u64;
        self.header.preference_count += added_preferences;
        self.header.data_size += offset - start;
        self.header.touch();

        log::debug!(
            "Appended {} preference sets ({} bytes)",
            records.len(),
            offset - start
        );
        self.rewind()
    }

    fn flush(&mut self) -> Result<()> {
        match self.sync_mode {
            SyncMode::None => Ok(()),
            SyncMode::Normal => self.write_header(),
            SyncMode::Full => {
                self.write_header()?;
                self.file_mut()?.sync_all()?;
                Ok(())
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.file.is_none() {
            return Ok(());
        }
        self.write_header()?;
        if let Some(file) = self.file.take() {
            if self.sync_mode == SyncMode::Full {
                file.sync_all()?;
            }
        }
        self.buffered.clear();
        log::debug!("Closed preference file {}", self.path.display());
        Ok(())
    }

    fn header(&self) -> FileHeader {
        self.header
    }
}

impl Drop for PreferenceFile {
    fn drop(&mut self) {
        if self.file.is_some() {
            if let Err(e) = self.close() {
                log::warn!(
                    "Failed to close preference file {}: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}

/// Serializes a record, optionally zero-filling the reserved slots
fn encode_record(
    buf: &mut Vec<u8>,
    set: &PreferenceSet,
    capacity: u32,
    fill_reserved: bool,
) -> Result<()> {
    let count = set.len();
    if count > i32::MAX as usize || capacity > i32::MAX as u32 {
        return Err(Error::CapacityOverflow { count });
    }

    buf.extend_from_slice(&set.owner_id().to_be_bytes());
    buf.extend_from_slice(&(capacity as i32).to_be_bytes());
    buf.extend_from_slice(&(count as i32).to_be_bytes());
    for entity_id in set.entity_ids() {
        buf.extend_from_slice(&entity_id.to_be_bytes());
    }
    if fill_reserved {
        let reserved = (capacity as usize).saturating_sub(count) * ENTITY_SLOT_SIZE as usize;
        buf.resize(buf.len() + reserved, 0);
    }
    Ok(())
}

/// Reads one record starting at `offset`, skipping its reserved slots
fn fits_region(offset: u64, size: u64, data_end: u64) -> bool {
    offset.checked_add(size).is_some_and(|end| end <= data_end)
}

fn read_record<R: Read + Seek>(
    reader: &mut BufReader<R>,
    offset: u64,
    data_end: u64,
) -> Result<PreferenceSet> {
    if !fits_region(offset, RECORD_PREFIX_SIZE, data_end) {
        return Err(Error::corrupt_record(offset, "record runs past the data region"));
    }

    let mut prefix = [0u8; RECORD_PREFIX_SIZE as usize];
    reader.read_exact(&mut prefix)?;
    let owner_id = u64::from_be_bytes(be8(&prefix[0..8]));
    let capacity = i32::from_be_bytes(be4(&prefix[8..12]));
    let count = i32::from_be_bytes(be4(&prefix[12..16]));

    if capacity < 0 || count < 0 {
        return Err(Error::corrupt_record(
            offset,
            format!("negative capacity {} or count {}", capacity, count),
        ));
    }
    if count > capacity {
        return Err(Error::corrupt_record(
            offset,
            format!("count {} exceeds capacity {}", count, capacity),
        ));
    }
    let size = RECORD_PREFIX_SIZE + ENTITY_SLOT_SIZE * capacity as u64;
    if !fits_region(offset, size, data_end) {
        return Err(Error::corrupt_record(offset, "record runs past the data region"));
    }

    let mut ids = vec![0u8; count as usize * ENTITY_SLOT_SIZE as usize];
    reader.read_exact(&mut ids)?;
    let entity_ids: BTreeSet<u64> = ids
        .chunks_exact(ENTITY_SLOT_SIZE as usize)
        .map(|slot| u64::from_be_bytes(be8(slot)))
        .collect();

    let reserved = (capacity - count) as i64 * ENTITY_SLOT_SIZE as i64;
    if reserved > 0 {
        reader.seek_relative(reserved)?;
    }

    Ok(PreferenceSet::new(
        owner_id,
        capacity as u32,
        entity_ids,
        offset,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn set(owner_id: u64, ids: &[u64]) -> PreferenceSet {
        PreferenceSet::new(owner_id, 0, ids.iter().copied().collect(), 0)
    }

    fn scan(store: &mut PreferenceFile) -> Vec<PreferenceSet> {
        store.rewind().unwrap();
        let mut out = Vec::new();
        while store.has_next().unwrap() {
            out.push(store.next().unwrap().unwrap());
        }
        out
    }

    #[test]
    fn test_grow_capacity() {
        assert_eq!(grow_capacity(0, 2).unwrap(), 2);
        assert_eq!(grow_capacity(1, 2).unwrap(), 2);
        assert_eq!(grow_capacity(2, 2).unwrap(), 4);
        assert_eq!(grow_capacity(3, 2).unwrap(), 4);
        assert_eq!(grow_capacity(7, 4).unwrap(), 8);
        assert_eq!(grow_capacity(8, 4).unwrap(), 12);
        assert!(grow_capacity(i32::MAX as usize, 2).is_err());
    }

    #[test]
    fn test_open_empty_writes_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prefs.dat");
        let mut store = PreferenceFile::open(&path).unwrap();
        assert_eq!(store.preference_set_count(), 0);
        assert_eq!(store.data_size(), 0);
        assert!(!store.has_next().unwrap());
        store.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len() as u64, HEADER_SIZE);
        assert_eq!(&bytes[0..4], b"PREF");
    }

    #[test]
    fn test_open_rejects_foreign_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("foreign.dat");
        std::fs::write(&path, b"NOT A PREFERENCE FILE AT ALL, REALLY!!").unwrap();
        assert!(matches!(
            PreferenceFile::open(&path),
            Err(Error::Format { .. })
        ));

        std::fs::write(&path, b"PR").unwrap();
        assert!(matches!(
            PreferenceFile::open(&path),
            Err(Error::Format { .. })
        ));
    }

    #[test]
    fn test_open_rejects_overflowing_data_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("huge.dat");
        let header = FileHeader {
            data_size: u64::MAX - 8,
            ..FileHeader::default()
        };
        std::fs::write(&path, header.encode()).unwrap();

        match PreferenceFile::open(&path) {
            Err(Error::Format { reason, .. }) => {
                assert!(reason.contains("overflows"), "got {}", reason)
            }
            other => panic!("expected a format error, got {:?}", other),
        }
        // The file is left as it was
        assert_eq!(std::fs::read(&path).unwrap(), header.encode());
    }

    #[test]
    fn test_add_and_scan() {
        let dir = tempdir().unwrap();
        let mut store = PreferenceFile::open(dir.path().join("p.dat")).unwrap();

        let mut records = vec![set(1, &[10, 20]), set(2, &[30]), set(3, &[])];
        store.add(&mut records).unwrap();

        assert_eq!(records[0].capacity(), 4);
        assert_eq!(records[1].capacity(), 2);
        // An empty set already fits its zero capacity
        assert_eq!(records[2].capacity(), 0);
        assert_eq!(records[0].offset(), HEADER_SIZE);
        assert_eq!(records[1].offset(), HEADER_SIZE + 16 + 32);

        assert_eq!(store.preference_set_count(), 3);
        assert_eq!(store.preference_count(), 3);
        assert_eq!(store.data_size(), (16 + 32) + (16 + 16) + 16);
        assert!(store.change_time_millis() > 0);

        let scanned = scan(&mut store);
        assert_eq!(scanned, records);
    }

    #[test]
    fn test_read_ahead_refills() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::new(dir.path().join("p.dat")).with_read_ahead(2);
        let mut store = PreferenceFile::open_with_config(&config).unwrap();

        let mut records: Vec<_> = (1..=5).map(|i| set(i, &[i * 10])).collect();
        store.add(&mut records).unwrap();

        let owners: Vec<u64> = scan(&mut store).iter().map(|s| s.owner_id()).collect();
        assert_eq!(owners, vec![1, 2, 3, 4, 5]);
        assert!(store.next().unwrap().is_none());
    }

    #[test]
    fn test_quick_rewrite_in_place() {
        let dir = tempdir().unwrap();
        let mut store = PreferenceFile::open(dir.path().join("p.dat")).unwrap();
        store
            .add(&mut vec![set(1, &[10]), set(2, &[20, 21]), set(3, &[30])])
            .unwrap();

        let before = scan(&mut store);
        let original = before[0].clone();
        assert_eq!(original.capacity(), 2);

        let mut modified = original.clone();
        modified.insert(11);
        assert!(store.try_quick_rewrite(&original, &modified).unwrap());
        assert_eq!(store.preference_count(), 5);

        let after = scan(&mut store);
        assert_eq!(after[0].entity_ids(), modified.entity_ids());
        for (b, a) in before.iter().zip(after.iter()) {
            assert_eq!(b.offset(), a.offset());
        }

        // Shrinking leaves stale reserved slots that are never read back
        let mut shrunk = after[0].clone();
        shrunk.remove(10);
        shrunk.remove(11);
        assert!(store.try_quick_rewrite(&after[0], &shrunk).unwrap());
        let again = scan(&mut store);
        assert!(again[0].is_empty());
        assert_eq!(again[1].entity_ids(), before[1].entity_ids());
        assert_eq!(store.preference_count(), 3);
    }

    #[test]
    fn test_quick_rewrite_refuses_overflow() {
        let dir = tempdir().unwrap();
        let mut store = PreferenceFile::open(dir.path().join("p.dat")).unwrap();
        store.add(&mut vec![set(1, &[10])]).unwrap();

        let original = scan(&mut store).remove(0);
        let mut modified = original.clone();
        modified.insert(11);
        modified.insert(12);
        let time = store.change_time_millis();

        assert!(!store.try_quick_rewrite(&original, &modified).unwrap());
        assert_eq!(store.preference_count(), 1);
        assert_eq!(store.change_time_millis(), time);
        assert_eq!(scan(&mut store)[0].entity_ids(), original.entity_ids());
    }

    #[test]
    fn test_quick_rewrite_keeps_scan_position() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::new(dir.path().join("p.dat")).with_read_ahead(1);
        let mut store = PreferenceFile::open_with_config(&config).unwrap();
        store
            .add(&mut vec![set(1, &[10]), set(2, &[20]), set(3, &[30])])
            .unwrap();

        store.rewind().unwrap();
        let first = store.next().unwrap().unwrap();
        let mut modified = first.clone();
        modified.insert(11);
        assert!(store.try_quick_rewrite(&first, &modified).unwrap());

        assert_eq!(store.next().unwrap().unwrap().owner_id(), 2);
        assert_eq!(store.next().unwrap().unwrap().owner_id(), 3);
        assert!(store.next().unwrap().is_none());
    }

    #[test]
    fn test_quick_rewrite_patches_buffered_record() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::new(dir.path().join("p.dat")).with_read_ahead(3);
        let mut store = PreferenceFile::open_with_config(&config).unwrap();
        store
            .add(&mut vec![
                set(1, &[10]),
                set(2, &[20]),
                set(3, &[30]),
                set(4, &[40]),
            ])
            .unwrap();
        let stored = scan(&mut store);

        // Records 2 and 3 sit in the read-ahead buffer after the first read
        store.rewind().unwrap();
        assert_eq!(store.next().unwrap().unwrap().owner_id(), 1);

        let mut modified = stored[1].clone();
        modified.insert(21);
        assert!(store.try_quick_rewrite(&stored[1], &modified).unwrap());

        let second = store.next().unwrap().unwrap();
        assert_eq!(second.owner_id(), 2);
        assert_eq!(second.entity_ids(), modified.entity_ids());
        assert_eq!(second.capacity(), stored[1].capacity());
        assert_eq!(second.offset(), stored[1].offset());

        assert_eq!(store.next().unwrap().unwrap().entity_ids(), stored[2].entity_ids());
        assert_eq!(store.next().unwrap().unwrap().owner_id(), 4);
        assert!(store.next().unwrap().is_none());

        // Disk and buffer agree
        assert_eq!(scan(&mut store)[1].entity_ids(), modified.entity_ids());
    }

    #[test]
    fn test_delete_compacts_with_small_buffer() {
        let dir = tempdir().unwrap();
        // Buffer smaller than any record forces multi-chunk moves
        let config = StoreConfig::new(dir.path().join("p.dat")).with_move_buffer_size(7);
        let mut store = PreferenceFile::open_with_config(&config).unwrap();

        let mut records: Vec<_> = (1..=6u64)
            .map(|i| set(i, &(0..i).map(|j| i * 100 + j).collect::<Vec<_>>()))
            .collect();
        store.add(&mut records).unwrap();

        let scanned = scan(&mut store);
        let doomed = vec![scanned[0].clone(), scanned[3].clone(), scanned[4].clone()];
        store.delete(&doomed).unwrap();

        let survivors = scan(&mut store);
        let owners: Vec<u64> = survivors.iter().map(|s| s.owner_id()).collect();
        assert_eq!(owners, vec![2, 3, 6]);
        for s in &survivors {
            assert_eq!(s.entity_ids(), records[s.owner_id() as usize - 1].entity_ids());
        }

        let expected_data: u64 = survivors.iter().map(|s| s.disk_size()).sum();
        let expected_prefs: u64 = survivors.iter().map(|s| s.len() as u64).sum();
        assert_eq!(store.preference_set_count(), 3);
        assert_eq!(store.preference_count(), expected_prefs);
        assert_eq!(store.data_size(), expected_data);

        let path = store.path().to_path_buf();
        store.close().unwrap();
        assert_eq!(
            std::fs::metadata(&path).unwrap().len(),
            HEADER_SIZE + expected_data
        );
    }

    #[test]
    fn test_delete_rejects_bad_offsets() {
        let dir = tempdir().unwrap();
        let mut store = PreferenceFile::open(dir.path().join("p.dat")).unwrap();
        store.add(&mut vec![set(1, &[10])]).unwrap();

        let bogus = PreferenceSet::new(9, 2, BTreeSet::new(), 3);
        assert_eq!(
            store.delete(&[bogus]),
            Err(Error::InvalidOffset { offset: 3 })
        );

        // Offset plus record size past the end of the u64 range
        let far = u64::MAX - 4;
        let wrapping = PreferenceSet::new(9, 2, BTreeSet::new(), far);
        assert_eq!(
            store.delete(&[wrapping.clone()]),
            Err(Error::InvalidOffset { offset: far })
        );
        let mut modified = wrapping.clone();
        modified.insert(1);
        assert_eq!(
            store.try_quick_rewrite(&wrapping, &modified),
            Err(Error::InvalidOffset { offset: far })
        );
        assert_eq!(store.preference_set_count(), 1);
        assert_eq!(store.preference_count(), 1);
    }

    #[test]
    fn test_reopen_preserves_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("p.dat");
        {
            let mut store = PreferenceFile::open(&path).unwrap();
            store
                .add(&mut vec![set(5, &[3, 1, 2]), set(6, &[9])])
                .unwrap();
            store.close().unwrap();
        }

        let mut store = PreferenceFile::open(&path).unwrap();
        assert_eq!(store.preference_set_count(), 2);
        assert_eq!(store.preference_count(), 4);
        let sets = scan(&mut store);
        assert_eq!(sets[0].clone().into_entity_ids(), vec![1, 2, 3]);
        assert_eq!(sets[1].clone().into_entity_ids(), vec![9]);
    }

    #[test]
    fn test_corrupt_record_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("p.dat");

        let header = FileHeader {
            preference_set_count: 1,
            preference_count: 3,
            data_size: 16 + 16,
            ..FileHeader::default()
        };
        let mut bytes = header.encode().to_vec();
        bytes.extend_from_slice(&1u64.to_be_bytes());
        bytes.extend_from_slice(&2i32.to_be_bytes());
        bytes.extend_from_slice(&3i32.to_be_bytes());
        bytes.extend_from_slice(&[0u8; 16]);
        std::fs::write(&path, bytes).unwrap();

        let mut store = PreferenceFile::open(&path).unwrap();
        store.rewind().unwrap();
        assert!(matches!(
            store.next(),
            Err(Error::CorruptRecord { offset, .. }) if offset == HEADER_SIZE
        ));
    }

    #[test]
    fn test_closed_store_rejects_calls() {
        let dir = tempdir().unwrap();
        let mut store = PreferenceFile::open(dir.path().join("p.dat")).unwrap();
        store.close().unwrap();
        assert!(store.is_closed());
        assert_eq!(store.rewind(), Err(Error::StoreClosed));
        assert_eq!(store.add(&mut vec![set(1, &[1])]), Err(Error::StoreClosed));
        // Closing twice is harmless
        assert!(store.close().is_ok());
    }
}
