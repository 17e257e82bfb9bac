use std::collections::HashMap;
use std::fs::File;
use std::os::unix::fs::FileExt;
use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

/// Size of one cache page. Pages cover 1024-byte aligned regions of a
/// backing file.
pub const PAGE_SIZE: usize = 1024;

/// Handle to a file registered with the cache.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct FileId(u32);

/// Identifies one page: a registered file and a page-aligned offset.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
struct PageKey {
    file: FileId,
    offset: u64,
}

impl PageKey {
    fn containing(file: FileId, offset: u64) -> Self {
        PageKey { file, offset: offset - offset % PAGE_SIZE as u64 }
    }
}

/// Bookkeeping for one frame, guarded by the global lock.
///
/// `writeback` holds the previous identity of the frame when it was
/// evicted while dirty: the next thread to load the frame writes the
/// buffer back to that address before reusing it. A loaded frame never
/// has a pending write-back.
#[derive(Default)]
struct FrameMeta {
    key: Option<PageKey>,
    loaded: bool,
    dirty: bool,
    writeback: Option<PageKey>,
}

/// Map, recency list and frame metadata, all guarded by one mutex.
struct CacheIndex {
    map: HashMap<PageKey, usize>,
    meta: Vec<FrameMeta>,
    lru: LruList,
    hits: u64,
    misses: u64,
}

/// A fixed-capacity write-back page cache over a set of registered files.
///
/// Locking: the global mutex guards the key map, the recency list and all
/// frame metadata; each frame's byte buffer has its own mutex. A frame
/// lock is never acquired while the global lock is held, and the global
/// lock is never held across file I/O. Taking the global lock while a
/// frame lock is held is safe under that discipline (no cycle is
/// possible), and is how loads are committed and writes marked dirty.
pub struct PageCache {
    files: RwLock<Vec<Arc<File>>>,
    frames: Vec<Mutex<Box<[u8; PAGE_SIZE]>>>,
    index: Mutex<CacheIndex>,
}

impl PageCache {
    /// Creates a cache with the given number of page frames.
    pub fn new(frames: usize) -> Self {
        let frames = frames.max(1);
        PageCache {
            files: RwLock::new(Vec::new()),
            frames: (0..frames).map(|_| Mutex::new(Box::new([0u8; PAGE_SIZE]))).collect(),
            index: Mutex::new(CacheIndex {
                map: HashMap::new(),
                meta: (0..frames).map(|_| FrameMeta::default()).collect(),
                lru: LruList::new(frames),
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Registers a backing file and returns its handle. All cache
    /// operations address registered files only.
    pub fn register(&self, file: Arc<File>) -> FileId {
        let mut files = self.files.write();
        files.push(file);
        FileId(files.len() as u32 - 1)
    }

    /// Panics on an unregistered handle: that is a programmer error.
    fn file(&self, id: FileId) -> Arc<File> {
        self.files.read()[id.0 as usize].clone()
    }

    /// Copies exactly `buf.len()` bytes starting at `offset`. Bytes past
    /// the end of the file read as zero.
    pub fn read_bytes(&self, file: FileId, offset: u64, buf: &mut [u8]) {
        let mut pos = offset;
        let mut rest = buf;
        while !rest.is_empty() {
            let in_page = (pos % PAGE_SIZE as u64) as usize;
            let n = rest.len().min(PAGE_SIZE - in_page);
            let (chunk, tail) = std::mem::take(&mut rest).split_at_mut(n);
            self.with_page(PageKey::containing(file, pos), false, |page| {
                chunk.copy_from_slice(&page[in_page..in_page + n]);
            });
            rest = tail;
            pos += n as u64;
        }
    }

    /// Copies bytes starting at `offset` into `buf` until a newline, a
    /// zero byte, or `buf.len() - 1` bytes, whichever comes first. A
    /// single carriage return before the newline is dropped. The buffer
    /// is zero-terminated after the content. Returns the content length.
    pub fn read_line(&self, file: FileId, offset: u64, buf: &mut [u8]) -> usize {
        if buf.is_empty() {
            return 0;
        }
        let max = buf.len() - 1;
        let mut written = 0;
        let mut terminator = None;
        while written < max && terminator.is_none() {
            let pos = offset + written as u64;
            let in_page = (pos % PAGE_SIZE as u64) as usize;
            let take = (max - written).min(PAGE_SIZE - in_page);
            terminator = self.with_page(PageKey::containing(file, pos), false, |page| {
                for &b in &page[in_page..in_page + take] {
                    if b == b'\n' || b == 0 {
                        return Some(b);
                    }
                    buf[written] = b;
                    written += 1;
                }
                None
            });
        }
        if terminator == Some(b'\n') && written > 0 && buf[written - 1] == b'\r' {
            written -= 1;
        }
        buf[written] = 0;
        written
    }

    /// Reads the big-endian u32 at `offset`.
    pub fn get_u32(&self, file: FileId, offset: u64) -> u32 {
        let mut buf = [0u8; 4];
        self.read_bytes(file, offset, &mut buf);
        BigEndian::read_u32(&buf)
    }

    /// Reads the big-endian u64 at `offset`.
    pub fn get_u64(&self, file: FileId, offset: u64) -> u64 {
        let mut buf = [0u8; 8];
        self.read_bytes(file, offset, &mut buf);
        BigEndian::read_u64(&buf)
    }

    /// Writes `buf` at `offset`, marking every touched frame dirty. No
    /// fsync is issued; the bytes reach disk on eviction or flush.
    pub fn write_bytes(&self, file: FileId, offset: u64, buf: &[u8]) {
        let mut pos = offset;
        let mut rest = buf;
        while !rest.is_empty() {
            let in_page = (pos % PAGE_SIZE as u64) as usize;
            let n = rest.len().min(PAGE_SIZE - in_page);
            let (chunk, tail) = rest.split_at(n);
            self.with_page(PageKey::containing(file, pos), true, |page| {
                page[in_page..in_page + n].copy_from_slice(chunk);
            });
            rest = tail;
            pos += n as u64;
        }
    }

    /// Writes back all dirty frames of the given file.
    pub fn flush_file(&self, file: FileId) {
        self.flush_matching(|key| key.file == file);
    }

    /// Writes back all dirty frames.
    pub fn flush_all(&self) {
        self.flush_matching(|_| true);
    }

    /// Evicts all frames of the given file without writing them back:
    /// pending writes are discarded.
    pub fn refresh_file(&self, file: FileId) {
        self.refresh_matching(|key| key.file == file);
    }

    /// Evicts all frames without writing them back.
    pub fn refresh_all(&self) {
        self.refresh_matching(|_| true);
    }

    /// Flushes then evicts all frames of the given file.
    pub fn clear_file(&self, file: FileId) {
        self.flush_file(file);
        self.refresh_file(file);
    }

    /// Flushes then evicts all frames.
    pub fn clear_all(&self) {
        self.flush_all();
        self.refresh_all();
    }

    /// Hit and miss counts since creation.
    pub fn stats(&self) -> (u64, u64) {
        let idx = self.index.lock();
        (idx.hits, idx.misses)
    }

    /// Runs `f` on the page covering `key`, loading it (and completing a
    /// pending write-back) first if necessary. With `write` set the frame
    /// is marked dirty before `f` runs, so a concurrent eviction records
    /// the write-back.
    fn with_page<R>(&self, key: PageKey, write: bool, f: impl FnOnce(&mut [u8; PAGE_SIZE]) -> R) -> R {
        loop {
            let fid = {
                let mut idx = self.index.lock();
                match idx.map.get(&key).copied() {
                    Some(fid) => {
                        idx.hits += 1;
                        idx.lru.promote(fid);
                        fid
                    }
                    None => {
                        idx.misses += 1;
                        let fid = idx.lru.tail();
                        if let Some(old) = idx.meta[fid].key.take() {
                            idx.map.remove(&old);
                            if idx.meta[fid].loaded && idx.meta[fid].dirty {
                                idx.meta[fid].writeback = Some(old);
                            }
                        }
                        let meta = &mut idx.meta[fid];
                        meta.key = Some(key);
                        meta.loaded = false;
                        meta.dirty = false;
                        idx.map.insert(key, fid);
                        idx.lru.promote(fid);
                        fid
                    }
                }
            };

            let mut page = self.frames[fid].lock();

            let (valid, loaded, writeback) = {
                let mut idx = self.index.lock();
                let meta = &mut idx.meta[fid];
                if meta.key != Some(key) {
                    (false, false, None)
                } else if meta.loaded {
                    if write {
                        meta.dirty = true;
                    }
                    (true, true, None)
                } else {
                    (true, false, meta.writeback.take())
                }
            };
            if !valid {
                continue;
            }

            if !loaded {
                if let Some(old) = writeback {
                    // The frame still holds the evicted page's bytes.
                    if let Err(err) = self.write_page(old, &page[..]) {
                        warn!(file = ?old.file, offset = old.offset, %err, "page write-back failed, data lost");
                    }
                }
                self.read_page(key, &mut page[..]);
                let mut idx = self.index.lock();
                let meta = &mut idx.meta[fid];
                if meta.key != Some(key) {
                    continue;
                }
                meta.loaded = true;
                if write {
                    meta.dirty = true;
                }
            }

            return f(&mut page);
        }
    }

    /// Reads one page from disk, zero-filling anything past end of file.
    fn read_page(&self, key: PageKey, buf: &mut [u8]) {
        let file = self.file(key.file);
        let mut filled = 0;
        while filled < buf.len() {
            match file.read_at(&mut buf[filled..], key.offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(file = ?key.file, offset = key.offset, %err, "page read failed");
                    break;
                }
            }
        }
        buf[filled..].fill(0);
    }

    fn write_page(&self, key: PageKey, buf: &[u8]) -> std::io::Result<()> {
        self.file(key.file).write_all_at(buf, key.offset)
    }

    fn flush_matching(&self, matches: impl Fn(&PageKey) -> bool) {
        let targets: Vec<(usize, PageKey, bool)> = {
            let idx = self.index.lock();
            idx.meta
                .iter()
                .enumerate()
                .filter_map(|(fid, m)| {
                    if m.loaded && m.dirty && m.key.map_or(false, |k| matches(&k)) {
                        Some((fid, m.key.unwrap(), false))
                    } else if m.writeback.map_or(false, |k| matches(&k)) {
                        Some((fid, m.writeback.unwrap(), true))
                    } else {
                        None
                    }
                })
                .collect()
        };

        for (fid, key, pending) in targets {
            let page = self.frames[fid].lock();
            let proceed = {
                let mut idx = self.index.lock();
                let meta = &mut idx.meta[fid];
                if pending && meta.writeback == Some(key) {
                    meta.writeback = None;
                    true
                } else if !pending && meta.key == Some(key) && meta.dirty {
                    meta.dirty = false;
                    true
                } else {
                    false
                }
            };
            if !proceed {
                continue;
            }
            if let Err(err) = self.write_page(key, &page[..]) {
                warn!(file = ?key.file, offset = key.offset, %err, "flush failed, frame left dirty");
                let mut idx = self.index.lock();
                let meta = &mut idx.meta[fid];
                if pending {
                    meta.writeback = Some(key);
                } else if meta.key == Some(key) {
                    meta.dirty = true;
                }
            }
        }
    }

    fn refresh_matching(&self, matches: impl Fn(&PageKey) -> bool) {
        let mut idx = self.index.lock();
        let idx = &mut *idx;
        for (fid, meta) in idx.meta.iter_mut().enumerate() {
            if meta.writeback.map_or(false, |k| matches(&k)) {
                meta.writeback = None;
            }
            if meta.key.map_or(false, |k| matches(&k)) {
                idx.map.remove(&meta.key.take().unwrap());
                meta.loaded = false;
                meta.dirty = false;
                idx.lru.demote(fid);
            }
        }
    }
}

impl Drop for PageCache {
    fn drop(&mut self) {
        self.flush_all();
        let (hits, misses) = self.stats();
        debug!(hits, misses, frames = self.frames.len(), "page cache dropped");
    }
}

const NIL: usize = usize::MAX;

/// Doubly linked recency list over frame ordinals. Head is the most
/// recently used frame, tail the eviction candidate.
struct LruList {
    head: usize,
    tail: usize,
    prev: Vec<usize>,
    next: Vec<usize>,
}

impl LruList {
    fn new(n: usize) -> Self {
        LruList {
            head: 0,
            tail: n - 1,
            prev: (0..n).map(|i| if i == 0 { NIL } else { i - 1 }).collect(),
            next: (0..n).map(|i| if i == n - 1 { NIL } else { i + 1 }).collect(),
        }
    }

    fn tail(&self) -> usize {
        self.tail
    }

    fn unlink(&mut self, i: usize) {
        let (p, n) = (self.prev[i], self.next[i]);
        if p != NIL {
            self.next[p] = n;
        } else {
            self.head = n;
        }
        if n != NIL {
            self.prev[n] = p;
        } else {
            self.tail = p;
        }
    }

    /// Moves the frame to the head (most recently used).
    fn promote(&mut self, i: usize) {
        if self.head == i {
            return;
        }
        self.unlink(i);
        self.prev[i] = NIL;
        self.next[i] = self.head;
        self.prev[self.head] = i;
        self.head = i;
    }

    /// Moves the frame to the tail (next eviction candidate).
    fn demote(&mut self, i: usize) {
        if self.tail == i {
            return;
        }
        self.unlink(i);
        self.next[i] = NIL;
        self.prev[i] = self.tail;
        self.next[self.tail] = i;
        self.tail = i;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fixture(bytes: &[u8]) -> (tempfile::TempDir, Arc<File>) {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("data");
        let mut f = File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        let f = File::options().read(true).write(true).open(&path).unwrap();
        (dir, Arc::new(f))
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8 + 1).collect()
    }

    #[test]
    fn test_reads_match_direct_reads_at_any_capacity() {
        let data = pattern(PAGE_SIZE * 3 + 100);
        for frames in [1, 8, 1024] {
            let (_dir, file) = fixture(&data);
            let cache = PageCache::new(frames);
            let id = cache.register(file);

            for (offset, len) in [(0, 10), (1000, 100), (1023, 2), (2048, PAGE_SIZE), (100, 2500)] {
                let mut buf = vec![0u8; len];
                cache.read_bytes(id, offset as u64, &mut buf);
                assert_eq!(buf, &data[offset..offset + len], "frames={frames} offset={offset} len={len}");
            }
        }
    }

    #[test]
    fn test_reads_past_eof_are_zero() {
        let data = pattern(10);
        let (_dir, file) = fixture(&data);
        let cache = PageCache::new(4);
        let id = cache.register(file);

        let mut buf = vec![0xffu8; 20];
        cache.read_bytes(id, 0, &mut buf);
        assert_eq!(&buf[..10], &data[..]);
        assert_eq!(&buf[10..], &[0u8; 10]);
    }

    #[test]
    fn test_big_endian_scalars() {
        let mut data = Vec::new();
        data.extend_from_slice(&0xDEADBEEFu32.to_be_bytes());
        data.extend_from_slice(&0x0102030405060708u64.to_be_bytes());
        let (_dir, file) = fixture(&data);
        let cache = PageCache::new(4);
        let id = cache.register(file);

        assert_eq!(cache.get_u32(id, 0), 0xDEADBEEF);
        assert_eq!(cache.get_u64(id, 4), 0x0102030405060708);
    }

    #[test]
    fn test_read_line() {
        let (_dir, file) = fixture(b"first\nsecond line\r\nthird");
        let cache = PageCache::new(4);
        let id = cache.register(file);

        let mut buf = [0xffu8; 64];
        assert_eq!(cache.read_line(id, 0, &mut buf), 5);
        assert_eq!(&buf[..6], b"first\0");

        assert_eq!(cache.read_line(id, 6, &mut buf), 11);
        assert_eq!(&buf[..12], b"second line\0");

        // Last line ends at EOF (zero sentinel).
        assert_eq!(cache.read_line(id, 19, &mut buf), 5);
        assert_eq!(&buf[..6], b"third\0");
    }

    #[test]
    fn test_read_line_crosses_pages() {
        let mut data = vec![b'a'; PAGE_SIZE + 10];
        data.push(b'\n');
        data.extend_from_slice(b"next\n");
        let (_dir, file) = fixture(&data);
        let cache = PageCache::new(4);
        let id = cache.register(file);

        let mut buf = vec![0u8; PAGE_SIZE * 2];
        let n = cache.read_line(id, 0, &mut buf);
        assert_eq!(n, PAGE_SIZE + 10);
        assert!(buf[..n].iter().all(|&b| b == b'a'));

        let n = cache.read_line(id, PAGE_SIZE as u64 + 11, &mut buf);
        assert_eq!(&buf[..n], b"next");
    }

    #[test]
    fn test_read_line_respects_buffer_cap() {
        let (_dir, file) = fixture(b"a long line without end in sight\n");
        let cache = PageCache::new(4);
        let id = cache.register(file);

        let mut buf = [0u8; 7];
        assert_eq!(cache.read_line(id, 0, &mut buf), 6);
        assert_eq!(&buf, b"a long\0");
    }

    #[test]
    fn test_write_back_on_flush() {
        let data = pattern(PAGE_SIZE * 2);
        let (dir, file) = fixture(&data);
        let cache = PageCache::new(4);
        let id = cache.register(file);

        cache.write_bytes(id, 1000, b"hello across a page boundary");
        cache.flush_file(id);

        let on_disk = std::fs::read(dir.path().join("data")).unwrap();
        assert_eq!(&on_disk[1000..1028], b"hello across a page boundary");
        assert_eq!(&on_disk[..1000], &data[..1000]);
    }

    #[test]
    fn test_write_back_on_eviction() {
        let data = pattern(PAGE_SIZE * 3);
        let (dir, file) = fixture(&data);
        let cache = PageCache::new(1);
        let id = cache.register(file);

        cache.write_bytes(id, 0, b"dirty");
        // Touching another page evicts the dirty frame; the next load
        // performs the write-back.
        let mut buf = [0u8; 4];
        cache.read_bytes(id, 2 * PAGE_SIZE as u64, &mut buf);

        let on_disk = std::fs::read(dir.path().join("data")).unwrap();
        assert_eq!(&on_disk[..5], b"dirty");
    }

    #[test]
    fn test_refresh_discards_pending_writes() {
        let data = pattern(PAGE_SIZE);
        let (dir, file) = fixture(&data);
        let cache = PageCache::new(4);
        let id = cache.register(file);

        cache.write_bytes(id, 0, b"discarded");
        cache.refresh_file(id);
        cache.flush_file(id);

        let on_disk = std::fs::read(dir.path().join("data")).unwrap();
        assert_eq!(on_disk, data);

        // And the cache re-reads from disk, not from the stale frame.
        let mut buf = [0u8; 9];
        cache.read_bytes(id, 0, &mut buf);
        assert_eq!(&buf, &data[..9]);
    }

    #[test]
    fn test_clear_flushes_then_evicts() {
        let data = pattern(PAGE_SIZE);
        let (dir, file) = fixture(&data);
        let cache = PageCache::new(4);
        let id = cache.register(file);

        cache.write_bytes(id, 0, b"kept");
        cache.clear_file(id);

        let on_disk = std::fs::read(dir.path().join("data")).unwrap();
        assert_eq!(&on_disk[..4], b"kept");
        // The frames were evicted: the next read misses again.
        let (_, misses_before) = cache.stats();
        let mut buf = [0u8; 4];
        cache.read_bytes(id, 0, &mut buf);
        let (_, misses_after) = cache.stats();
        assert_eq!(misses_after, misses_before + 1);
        assert_eq!(&buf, b"kept");
    }

    #[test]
    fn test_dirty_read_sees_pending_write() {
        let data = pattern(PAGE_SIZE);
        let (_dir, file) = fixture(&data);
        let cache = PageCache::new(4);
        let id = cache.register(file);

        cache.write_bytes(id, 10, b"pending");
        let mut buf = [0u8; 7];
        cache.read_bytes(id, 10, &mut buf);
        assert_eq!(&buf, b"pending");
    }

    #[test]
    fn test_hit_and_miss_counters() {
        let data = pattern(PAGE_SIZE * 2);
        let (_dir, file) = fixture(&data);
        let cache = PageCache::new(4);
        let id = cache.register(file);

        let mut buf = [0u8; 1];
        cache.read_bytes(id, 0, &mut buf);
        cache.read_bytes(id, 1, &mut buf);
        cache.read_bytes(id, PAGE_SIZE as u64, &mut buf);

        let (hits, misses) = cache.stats();
        assert_eq!(hits, 1);
        assert_eq!(misses, 2);
    }

    #[test]
    fn test_concurrent_reads() {
        let data = pattern(PAGE_SIZE * 8);
        let (_dir, file) = fixture(&data);
        let cache = PageCache::new(2);
        let id = cache.register(file);

        std::thread::scope(|s| {
            for t in 0..4 {
                let cache = &cache;
                let data = &data;
                s.spawn(move || {
                    for i in 0..200 {
                        let offset = ((t * 997 + i * 131) % (PAGE_SIZE * 8 - 8)) as u64;
                        let mut buf = [0u8; 8];
                        cache.read_bytes(id, offset, &mut buf);
                        assert_eq!(&buf, &data[offset as usize..offset as usize + 8]);
                    }
                });
            }
        });
    }
}
