use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use tracing::{debug, error};

use crate::cache::{FileId, PageCache};
use crate::encoding::LazyRecord;
use crate::errdata;
use crate::error::Result;

/// Size of one index entry: an 8-byte key and an 8-byte value, both
/// big-endian.
pub const ENTRY_SIZE: u64 = 16;

/// Append buffer size in bytes.
const APPEND_BUF: usize = 64 * 1024;

/// Write buffer size for sort and group output, in bytes.
const OUT_BUF: usize = 256 * 1024;

/// How the key words of an index are ordered.
pub enum KeyOrder {
    /// The key word is the comparison key itself: an id or a packed
    /// date-time, compared as a raw u64.
    Id,
    /// The key word is the offset of a length-prefixed string in a keys
    /// file; keys compare by length, then bytes, read through the cache.
    Text { keys: FileId },
}

/// A search key supplied by a caller.
pub enum ProbeKey {
    Id(u64),
    Text(String),
}

impl KeyOrder {
    /// Compares two stored key words.
    fn cmp_keys(&self, cache: &PageCache, a: u64, b: u64) -> Ordering {
        match self {
            KeyOrder::Id => a.cmp(&b),
            KeyOrder::Text { keys } => {
                let len_a = cache.get_u32(*keys, a) as usize;
                let len_b = cache.get_u32(*keys, b) as usize;
                match len_a.cmp(&len_b) {
                    Ordering::Equal => cmp_stored_bytes(cache, *keys, a + 4, b + 4, len_a),
                    order => order,
                }
            }
        }
    }

    /// Compares a probe key against a stored key word.
    fn cmp_probe(&self, cache: &PageCache, probe: &ProbeKey, stored: u64) -> Ordering {
        match (self, probe) {
            (KeyOrder::Id, ProbeKey::Id(id)) => id.cmp(&stored),
            (KeyOrder::Text { keys }, ProbeKey::Text(text)) => {
                let stored_len = cache.get_u32(*keys, stored) as usize;
                match text.len().cmp(&stored_len) {
                    Ordering::Equal => cmp_probe_bytes(cache, *keys, text.as_bytes(), stored + 4),
                    order => order,
                }
            }
            _ => panic!("probe key does not match the index key order"),
        }
    }
}

fn cmp_stored_bytes(cache: &PageCache, keys: FileId, mut a: u64, mut b: u64, len: usize) -> Ordering {
    let mut buf_a = [0u8; 16];
    let mut buf_b = [0u8; 16];
    let mut rest = len;
    while rest > 0 {
        let n = rest.min(16);
        cache.read_bytes(keys, a, &mut buf_a[..n]);
        cache.read_bytes(keys, b, &mut buf_b[..n]);
        match buf_a[..n].cmp(&buf_b[..n]) {
            Ordering::Equal => {}
            order => return order,
        }
        a += n as u64;
        b += n as u64;
        rest -= n;
    }
    Ordering::Equal
}

fn cmp_probe_bytes(cache: &PageCache, keys: FileId, probe: &[u8], mut stored: u64) -> Ordering {
    let mut buf = [0u8; 16];
    let mut read = 0;
    while read < probe.len() {
        let n = (probe.len() - read).min(16);
        cache.read_bytes(keys, stored, &mut buf[..n]);
        match probe[read..read + n].cmp(&buf[..n]) {
            Ordering::Equal => {}
            order => return order,
        }
        stored += n as u64;
        read += n;
    }
    Ordering::Equal
}

/// A file of `(key, value)` entries supporting ordered lookup and
/// grouping.
///
/// Entries are appended unsorted; `sort` establishes key order with an
/// external k-way merge, and `group` optionally rewrites the index as one
/// entry per distinct key whose value is the offset of a posting list in
/// a side file. All lookups read through the block cache; inserts bypass
/// it and invalidate the index's cached pages before the next read.
pub struct Indexer {
    file: Arc<File>,
    file_id: FileId,
    entries: u64,
    append_buf: Vec<u8>,
    /// Bytes of the index file already written out.
    synced: u64,
    /// Whether cached pages of the index file may be stale.
    changed: bool,
    order: KeyOrder,
    /// The records file that values address; lazy views bind to it.
    records: Option<FileId>,
    /// Posting lists, present after grouping.
    postings: Option<FileId>,
}

impl Indexer {
    /// Creates an empty index. With no path the index lives in an
    /// unlinked temporary file.
    pub fn create(
        path: Option<&Path>,
        order: KeyOrder,
        records: Option<FileId>,
        cache: &PageCache,
    ) -> Result<Self> {
        let file = match path {
            Some(path) => File::options().read(true).write(true).create(true).truncate(true).open(path)?,
            None => tempfile::tempfile()?,
        };
        let file = Arc::new(file);
        let file_id = cache.register(file.clone());
        Ok(Indexer {
            file,
            file_id,
            entries: 0,
            append_buf: Vec::with_capacity(APPEND_BUF),
            synced: 0,
            changed: false,
            order,
            records,
            postings: None,
        })
    }

    /// Opens a persisted, sorted index; the entry count comes from the
    /// file length.
    pub fn open(path: &Path, order: KeyOrder, records: Option<FileId>, cache: &PageCache) -> Result<Self> {
        let file = Arc::new(File::options().read(true).write(true).open(path)?);
        let len = file.metadata()?.len();
        let file_id = cache.register(file.clone());
        Ok(Indexer {
            file,
            file_id,
            entries: len / ENTRY_SIZE,
            append_buf: Vec::new(),
            synced: len,
            changed: false,
            order,
            records,
            postings: None,
        })
    }

    /// Opens a persisted, grouped index together with its posting file.
    pub fn open_grouped(
        path: &Path,
        postings_path: &Path,
        order: KeyOrder,
        records: Option<FileId>,
        cache: &PageCache,
    ) -> Result<Self> {
        let mut indexer = Self::open(path, order, records, cache)?;
        let postings = Arc::new(File::options().read(true).write(true).open(postings_path)?);
        indexer.postings = Some(cache.register(postings));
        Ok(indexer)
    }

    /// Appends an entry. Entries accumulate unsorted; concurrent inserts
    /// into the same index are not allowed.
    pub fn insert(&mut self, key: u64, value: u64) -> Result<()> {
        self.append_buf.write_u64::<BigEndian>(key)?;
        self.append_buf.write_u64::<BigEndian>(value)?;
        self.entries += 1;
        self.changed = true;
        if self.append_buf.len() >= APPEND_BUF {
            self.flush_appends()?;
        }
        Ok(())
    }

    fn flush_appends(&mut self) -> Result<()> {
        if !self.append_buf.is_empty() {
            self.file.write_all_at(&self.append_buf, self.synced)?;
            self.synced += self.append_buf.len() as u64;
            self.append_buf.clear();
        }
        Ok(())
    }

    /// Number of entries; after grouping, the number of distinct keys.
    pub fn element_count(&self) -> u64 {
        self.entries
    }

    /// Sorts the index by key with an external k-way merge: runs of at
    /// most `run_entries` entries are sorted in memory and spilled to
    /// temporary files, then merged through a min-heap driven by the key
    /// order. Cached pages of the index file are invalidated.
    pub fn sort(&mut self, cache: &PageCache, run_entries: usize) -> Result<()> {
        self.flush_appends()?;
        cache.refresh_file(self.file_id);
        if self.entries <= 1 {
            self.changed = false;
            return Ok(());
        }

        let run_entries = run_entries.max(1) as u64;
        let run_count = self.entries.div_ceil(run_entries);

        if run_count == 1 {
            let mut entries = self.read_entries(0, self.entries)?;
            entries.sort_by(|a, b| self.order.cmp_keys(cache, a.0, b.0));
            self.write_entries(0, &entries)?;
        } else {
            let mut runs = Vec::with_capacity(run_count as usize);
            for r in 0..run_count {
                let start = r * run_entries;
                let count = run_entries.min(self.entries - start);
                let mut entries = self.read_entries(start, count)?;
                entries.sort_by(|a, b| self.order.cmp_keys(cache, a.0, b.0));

                let mut tmp = tempfile::tempfile()?;
                let mut buf = Vec::with_capacity(entries.len() * ENTRY_SIZE as usize);
                for (key, value) in &entries {
                    buf.write_u64::<BigEndian>(*key)?;
                    buf.write_u64::<BigEndian>(*value)?;
                }
                tmp.write_all(&buf)?;
                tmp.seek(SeekFrom::Start(0))?;
                runs.push(BufReader::new(tmp));
            }
            self.merge_runs(cache, runs)?;
        }

        debug!(entries = self.entries, runs = run_count, "index sorted");
        cache.refresh_file(self.file_id);
        self.changed = false;
        Ok(())
    }

    fn merge_runs(&mut self, cache: &PageCache, mut runs: Vec<BufReader<File>>) -> Result<()> {
        let mut heads = vec![(0u64, 0u64); runs.len()];
        let mut heap: Vec<usize> = Vec::with_capacity(runs.len());
        for (j, run) in runs.iter_mut().enumerate() {
            if let Some(entry) = read_run_entry(run)? {
                heads[j] = entry;
                heap_push(&mut heap, &heads, &self.order, cache, j);
            }
        }

        let mut out = Vec::with_capacity(OUT_BUF);
        let mut out_pos = 0u64;
        while let Some(j) = heap_pop(&mut heap, &heads, &self.order, cache) {
            out.write_u64::<BigEndian>(heads[j].0)?;
            out.write_u64::<BigEndian>(heads[j].1)?;
            if out.len() >= OUT_BUF {
                self.file.write_all_at(&out, out_pos)?;
                out_pos += out.len() as u64;
                out.clear();
            }
            if let Some(entry) = read_run_entry(&mut runs[j])? {
                heads[j] = entry;
                heap_push(&mut heap, &heads, &self.order, cache, j);
            }
        }
        self.file.write_all_at(&out, out_pos)?;
        Ok(())
    }

    /// Groups a sorted index: writes one posting list per distinct key to
    /// the postings file (`u32` count followed by that many `u64`
    /// payloads) and rewrites the index in place as `(key, posting
    /// offset)` entries. With `dedup` each posting list is sorted and
    /// deduplicated first. A descending key means the index was not
    /// sorted: the call fails before any further output.
    pub fn group(&mut self, cache: &PageCache, postings_path: Option<&Path>, dedup: bool) -> Result<()> {
        self.flush_appends()?;
        cache.refresh_file(self.file_id);

        let postings = match postings_path {
            Some(path) => File::options().read(true).write(true).create(true).truncate(true).open(path)?,
            None => tempfile::tempfile()?,
        };
        let postings = Arc::new(postings);

        let mut writer = GroupWriter {
            index: &self.file,
            postings: &postings,
            index_buf: Vec::with_capacity(OUT_BUF),
            index_pos: 0,
            postings_buf: Vec::with_capacity(OUT_BUF),
            postings_pos: 0,
            groups: 0,
        };

        if self.entries > 0 {
            let mut current_key = 0u64;
            let mut values: Vec<u64> = Vec::new();

            let chunk_entries = (OUT_BUF as u64 / ENTRY_SIZE).max(1);
            let mut consumed = 0u64;
            while consumed < self.entries {
                let count = chunk_entries.min(self.entries - consumed);
                let chunk = self.read_entries(consumed, count)?;
                for (key, value) in chunk {
                    if values.is_empty() {
                        current_key = key;
                        values.push(value);
                        continue;
                    }
                    match self.order.cmp_keys(cache, key, current_key) {
                        Ordering::Less => {
                            error!(key, current_key, "descending key during grouping");
                            return errdata!("index must be sorted before grouping");
                        }
                        Ordering::Equal => values.push(value),
                        Ordering::Greater => {
                            writer.emit(current_key, &mut values, dedup)?;
                            current_key = key;
                            values.push(value);
                        }
                    }
                }
                consumed += count;
            }
            writer.emit(current_key, &mut values, dedup)?;
        }

        let groups = writer.finish()?;
        self.file.set_len(groups * ENTRY_SIZE)?;
        self.entries = groups;
        self.synced = groups * ENTRY_SIZE;
        self.postings = Some(cache.register(postings));
        cache.refresh_file(self.file_id);
        self.changed = false;
        debug!(groups, "index grouped");
        Ok(())
    }

    /// The key word at an ordinal.
    pub fn key_at(&self, cache: &PageCache, ord: u64) -> u64 {
        debug_assert!(ord < self.entries && !self.changed);
        cache.get_u64(self.file_id, ord * ENTRY_SIZE)
    }

    /// The value word at an ordinal. After grouping this is the posting
    /// list offset.
    pub fn value_at(&self, cache: &PageCache, ord: u64) -> u64 {
        debug_assert!(ord < self.entries && !self.changed);
        cache.get_u64(self.file_id, ord * ENTRY_SIZE + 8)
    }

    /// The smallest ordinal whose key is >= the probe, or
    /// `element_count()` if none.
    pub fn lower_bound(&self, cache: &PageCache, probe: &ProbeKey) -> u64 {
        debug_assert!(!self.changed);
        let (mut lo, mut hi) = (0u64, self.entries);
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.order.cmp_probe(cache, probe, self.key_at(cache, mid)) == Ordering::Greater {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// The ordinal of the entry matching the probe, if any.
    pub fn find_key(&self, cache: &PageCache, probe: &ProbeKey) -> Option<u64> {
        let ord = self.lower_bound(cache, probe);
        if ord < self.entries && self.order.cmp_probe(cache, probe, self.key_at(cache, ord)) == Ordering::Equal {
            Some(ord)
        } else {
            None
        }
    }

    /// Binds the lazy view to the record addressed by the value at an
    /// ordinal.
    pub fn value_as_view(&self, cache: &PageCache, ord: u64, view: &mut LazyRecord) {
        let records = self.records.expect("index has no records file");
        view.rebind(records, self.value_at(cache, ord));
    }

    /// Looks up a key and binds the lazy view to its record. Returns
    /// whether the key was found.
    pub fn find_value_as_view(&self, cache: &PageCache, probe: &ProbeKey, view: &mut LazyRecord) -> bool {
        match self.find_key(cache, probe) {
            Some(ord) => {
                self.value_as_view(cache, ord, view);
                true
            }
            None => false,
        }
    }

    /// Number of payloads in the posting list at `group_offset`.
    pub fn group_size(&self, cache: &PageCache, group_offset: u64) -> u32 {
        let postings = self.postings.expect("index is not grouped");
        cache.get_u32(postings, group_offset)
    }

    /// The i-th payload of the posting list at `group_offset`.
    pub fn group_elem(&self, cache: &PageCache, group_offset: u64, i: u32) -> u64 {
        let postings = self.postings.expect("index is not grouped");
        cache.get_u64(postings, group_offset + 4 + 8 * i as u64)
    }

    /// Binds the lazy view to the record addressed by the i-th payload of
    /// the posting list at `group_offset`.
    pub fn group_elem_as_view(&self, cache: &PageCache, group_offset: u64, i: u32, view: &mut LazyRecord) {
        let records = self.records.expect("index has no records file");
        view.rebind(records, self.group_elem(cache, group_offset, i));
    }

    fn read_entries(&self, start_entry: u64, count: u64) -> Result<Vec<(u64, u64)>> {
        let mut buf = vec![0u8; (count * ENTRY_SIZE) as usize];
        self.file.read_exact_at(&mut buf, start_entry * ENTRY_SIZE)?;
        Ok(buf
            .chunks_exact(ENTRY_SIZE as usize)
            .map(|e| (BigEndian::read_u64(&e[..8]), BigEndian::read_u64(&e[8..])))
            .collect())
    }

    fn write_entries(&self, start_entry: u64, entries: &[(u64, u64)]) -> Result<()> {
        let mut buf = Vec::with_capacity(entries.len() * ENTRY_SIZE as usize);
        for (key, value) in entries {
            buf.write_u64::<BigEndian>(*key)?;
            buf.write_u64::<BigEndian>(*value)?;
        }
        self.file.write_all_at(&buf, start_entry * ENTRY_SIZE)?;
        Ok(())
    }
}

/// Buffered writer for group output: posting lists and the rewritten
/// index entries. The index is rewritten in place; writes always trail
/// the read cursor because a group is never larger than its input.
struct GroupWriter<'a> {
    index: &'a File,
    postings: &'a File,
    index_buf: Vec<u8>,
    index_pos: u64,
    postings_buf: Vec<u8>,
    postings_pos: u64,
    groups: u64,
}

impl GroupWriter<'_> {
    fn emit(&mut self, key: u64, values: &mut Vec<u64>, dedup: bool) -> Result<()> {
        if dedup {
            values.sort_unstable();
            values.dedup();
        }
        let offset = self.postings_pos + self.postings_buf.len() as u64;
        self.postings_buf.write_u32::<BigEndian>(values.len() as u32)?;
        for value in values.iter() {
            self.postings_buf.write_u64::<BigEndian>(*value)?;
        }
        self.index_buf.write_u64::<BigEndian>(key)?;
        self.index_buf.write_u64::<BigEndian>(offset)?;
        self.groups += 1;
        values.clear();

        if self.postings_buf.len() >= OUT_BUF {
            self.postings.write_all_at(&self.postings_buf, self.postings_pos)?;
            self.postings_pos += self.postings_buf.len() as u64;
            self.postings_buf.clear();
        }
        if self.index_buf.len() >= OUT_BUF {
            self.index.write_all_at(&self.index_buf, self.index_pos)?;
            self.index_pos += self.index_buf.len() as u64;
            self.index_buf.clear();
        }
        Ok(())
    }

    fn finish(mut self) -> Result<u64> {
        self.postings.write_all_at(&self.postings_buf, self.postings_pos)?;
        self.index.write_all_at(&self.index_buf, self.index_pos)?;
        Ok(self.groups)
    }
}

fn read_run_entry(run: &mut BufReader<File>) -> Result<Option<(u64, u64)>> {
    let mut buf = [0u8; ENTRY_SIZE as usize];
    match run.read_exact(&mut buf) {
        Ok(()) => Ok(Some((BigEndian::read_u64(&buf[..8]), BigEndian::read_u64(&buf[8..])))),
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn heap_less(heads: &[(u64, u64)], order: &KeyOrder, cache: &PageCache, a: usize, b: usize) -> bool {
    order.cmp_keys(cache, heads[a].0, heads[b].0) == Ordering::Less
}

fn heap_push(heap: &mut Vec<usize>, heads: &[(u64, u64)], order: &KeyOrder, cache: &PageCache, val: usize) {
    heap.push(val);
    let mut pos = heap.len() - 1;
    while pos > 0 {
        let parent = (pos - 1) / 2;
        if !heap_less(heads, order, cache, heap[pos], heap[parent]) {
            break;
        }
        heap.swap(pos, parent);
        pos = parent;
    }
}

fn heap_pop(heap: &mut Vec<usize>, heads: &[(u64, u64)], order: &KeyOrder, cache: &PageCache) -> Option<usize> {
    if heap.is_empty() {
        return None;
    }
    let top = heap.swap_remove(0);
    let mut pos = 0;
    loop {
        let (left, right) = (2 * pos + 1, 2 * pos + 2);
        let mut smallest = pos;
        if left < heap.len() && heap_less(heads, order, cache, heap[left], heap[smallest]) {
            smallest = left;
        }
        if right < heap.len() && heap_less(heads, order, cache, heap[right], heap[smallest]) {
            smallest = right;
        }
        if smallest == pos {
            break;
        }
        heap.swap(pos, smallest);
        pos = smallest;
    }
    Some(top)
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    fn new_cache() -> PageCache {
        PageCache::new(64)
    }

    #[test]
    fn test_sort_orders_by_embedded_key() {
        let cache = new_cache();
        let mut index = Indexer::create(None, KeyOrder::Id, None, &cache).unwrap();

        let n = 1000u64;
        for i in 0..n {
            let key = (i * 7919) % n;
            index.insert(key, key * 2).unwrap();
        }
        // A small run size forces a real multi-run merge.
        index.sort(&cache, 64).unwrap();

        assert_eq!(index.element_count(), n);
        for i in 0..n {
            assert_eq!(index.key_at(&cache, i), i);
            assert_eq!(index.value_at(&cache, i), i * 2);
        }
    }

    #[test]
    fn test_sort_is_stable_under_single_run() {
        let cache = new_cache();
        let mut index = Indexer::create(None, KeyOrder::Id, None, &cache).unwrap();
        for key in [5u64, 3, 9, 3, 1] {
            index.insert(key, key + 100).unwrap();
        }
        index.sort(&cache, 1024).unwrap();

        let keys: Vec<u64> = (0..5).map(|i| index.key_at(&cache, i)).collect();
        assert_eq!(keys, vec![1, 3, 3, 5, 9]);
    }

    #[test]
    fn test_lower_bound_and_find() {
        let cache = new_cache();
        let mut index = Indexer::create(None, KeyOrder::Id, None, &cache).unwrap();
        for key in [10u64, 20, 20, 30] {
            index.insert(key, key).unwrap();
        }
        index.sort(&cache, 1024).unwrap();

        assert_eq!(index.lower_bound(&cache, &ProbeKey::Id(5)), 0);
        assert_eq!(index.lower_bound(&cache, &ProbeKey::Id(10)), 0);
        assert_eq!(index.lower_bound(&cache, &ProbeKey::Id(11)), 1);
        assert_eq!(index.lower_bound(&cache, &ProbeKey::Id(20)), 1);
        assert_eq!(index.lower_bound(&cache, &ProbeKey::Id(25)), 3);
        assert_eq!(index.lower_bound(&cache, &ProbeKey::Id(31)), 4);

        assert_eq!(index.find_key(&cache, &ProbeKey::Id(20)), Some(1));
        assert_eq!(index.find_key(&cache, &ProbeKey::Id(25)), None);
    }

    #[test]
    fn test_group_builds_posting_lists() {
        let cache = new_cache();
        let mut index = Indexer::create(None, KeyOrder::Id, None, &cache).unwrap();
        for (key, value) in [(1u64, 10u64), (1, 11), (2, 20), (3, 30), (3, 31), (3, 32)] {
            index.insert(key, value).unwrap();
        }
        index.sort(&cache, 1024).unwrap();
        index.group(&cache, None, false).unwrap();

        assert_eq!(index.element_count(), 3);
        assert_eq!(index.key_at(&cache, 0), 1);
        assert_eq!(index.key_at(&cache, 1), 2);
        assert_eq!(index.key_at(&cache, 2), 3);

        let g0 = index.value_at(&cache, 0);
        assert_eq!(index.group_size(&cache, g0), 2);
        assert_eq!(index.group_elem(&cache, g0, 0), 10);
        assert_eq!(index.group_elem(&cache, g0, 1), 11);

        let g2 = index.value_at(&cache, 2);
        assert_eq!(index.group_size(&cache, g2), 3);
        assert_eq!(index.group_elem(&cache, g2, 2), 32);
    }

    #[test]
    fn test_group_dedup_sorts_and_removes_duplicates() {
        let cache = new_cache();
        let mut index = Indexer::create(None, KeyOrder::Id, None, &cache).unwrap();
        for value in [30u64, 10, 30, 20, 10] {
            index.insert(7, value).unwrap();
        }
        index.sort(&cache, 1024).unwrap();
        index.group(&cache, None, true).unwrap();

        assert_eq!(index.element_count(), 1);
        let g = index.value_at(&cache, 0);
        assert_eq!(index.group_size(&cache, g), 3);
        assert_eq!(
            (0..3).map(|i| index.group_elem(&cache, g, i)).collect::<Vec<_>>(),
            vec![10, 20, 30]
        );
    }

    #[test]
    fn test_group_rejects_unsorted_index() {
        let cache = new_cache();
        let mut index = Indexer::create(None, KeyOrder::Id, None, &cache).unwrap();
        index.insert(5, 0).unwrap();
        index.insert(3, 0).unwrap();
        assert!(index.group(&cache, None, false).is_err());
    }

    #[test]
    fn test_text_keys_sort_and_probe() {
        let cache = new_cache();

        // Keys file: length-prefixed strings.
        let mut bytes = Vec::new();
        let mut offsets = Vec::new();
        for s in ["rust", "c", "python", "go", "ada"] {
            offsets.push(bytes.len() as u64);
            bytes.write_u32::<BigEndian>(s.len() as u32).unwrap();
            bytes.extend_from_slice(s.as_bytes());
        }
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("keys");
        std::fs::write(&path, &bytes).unwrap();
        let keys = cache.register(Arc::new(File::open(&path).unwrap()));

        let mut index = Indexer::create(None, KeyOrder::Text { keys }, None, &cache).unwrap();
        for (i, offset) in offsets.iter().enumerate() {
            index.insert(*offset, i as u64).unwrap();
        }
        index.sort(&cache, 2).unwrap();

        // Length-first order: c < go < ada < rust < python.
        let sorted: Vec<u64> = (0..5).map(|i| index.value_at(&cache, i)).collect();
        assert_eq!(sorted, vec![1, 3, 4, 0, 2]);

        let ord = index.find_key(&cache, &ProbeKey::Text("python".into()));
        assert_eq!(ord, Some(4));
        assert_eq!(index.find_key(&cache, &ProbeKey::Text("perl".into())), None);
    }

    #[test]
    fn test_persisted_index_reopens() {
        let cache = new_cache();
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ids.indx");

        let mut index = Indexer::create(Some(&path), KeyOrder::Id, None, &cache).unwrap();
        for key in [4u64, 2, 9] {
            index.insert(key, key * 10).unwrap();
        }
        index.sort(&cache, 1024).unwrap();
        drop(index);

        let cache2 = new_cache();
        let index = Indexer::open(&path, KeyOrder::Id, None, &cache2).unwrap();
        assert_eq!(index.element_count(), 3);
        assert_eq!(index.key_at(&cache2, 0), 2);
        assert_eq!(index.value_at(&cache2, 2), 90);
    }
}
