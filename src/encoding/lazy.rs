use std::sync::Arc;

use crate::cache::{FileId, PageCache};
use crate::date::Timestamp;
use crate::encoding::format::{decode_field, encode_field, AccountKind, Format, Value};
use crate::error::Result;

/// A view of one binary record resident in a backing file.
///
/// Fields are decoded on demand: reading a field computes its offset
/// (loading any length fields it depends on), reads exactly its bytes
/// through the cache, and caches the decoded value. Altered fields are
/// written back on `flush_to_file`. Rebinding the view to another offset
/// resets it, so one view can iterate a whole file of records.
///
/// Views are not thread-safe; each task allocates its own.
pub struct LazyRecord {
    format: Arc<Format>,
    file: FileId,
    pos: u64,
    values: Vec<Option<Value>>,
    altered: Vec<bool>,
    /// ends[i] is the file offset just past field i; the first `known`
    /// entries are valid.
    ends: Vec<u64>,
    known: usize,
}

impl LazyRecord {
    pub fn new(format: Arc<Format>, file: FileId, pos: u64) -> Self {
        debug_assert!(format.is_binary(), "lazy views require a binary format");
        let n = format.len();
        LazyRecord {
            format,
            file,
            pos,
            values: vec![None; n],
            altered: vec![false; n],
            ends: vec![0; n],
            known: 0,
        }
    }

    /// Moves the view to a new record address, dropping any decoded
    /// fields and pending alterations.
    pub fn rebind(&mut self, file: FileId, pos: u64) {
        self.file = file;
        self.pos = pos;
        self.values.fill(None);
        self.altered.fill(false);
        self.known = 0;
    }

    /// Reads a field, decoding it through the cache if not yet loaded.
    pub fn get(&mut self, field: usize, cache: &PageCache) -> Result<&Value> {
        if self.values[field].is_none() {
            self.ensure_end(field, cache)?;
            let start = self.start(field);
            let len = (self.ends[field] - start) as usize;
            let mut buf = vec![0u8; len];
            cache.read_bytes(self.file, start, &mut buf);
            self.values[field] = Some(decode_field(self.format.kind_of(field), &buf)?);
        }
        Ok(self.values[field].as_ref().unwrap())
    }

    /// Replaces a field value and marks it for write-back. Only
    /// fixed-size fields may be altered: a size change would shift every
    /// later field.
    pub fn set(&mut self, field: usize, value: Value) {
        debug_assert!(
            self.format.kind_of(field).binary_size().is_some(),
            "only fixed-size fields can be altered"
        );
        self.values[field] = Some(value);
        self.altered[field] = true;
    }

    /// Encodes every altered field and writes it back through the cache.
    pub fn flush_to_file(&mut self, cache: &PageCache) -> Result<()> {
        for field in 0..self.format.len() {
            if !self.altered[field] {
                continue;
            }
            self.ensure_end(field, cache)?;
            let start = self.start(field);
            let mut buf = Vec::new();
            encode_field(self.format.kind_of(field), self.values[field].as_ref().unwrap(), &mut buf)?;
            debug_assert_eq!(buf.len() as u64, self.ends[field] - start);
            cache.write_bytes(self.file, start, &buf);
            self.altered[field] = false;
        }
        Ok(())
    }

    /// The offset just past this record, materialising all field offsets.
    pub fn position_after(&mut self, cache: &PageCache) -> Result<u64> {
        let last = self.format.len() - 1;
        self.ensure_end(last, cache)?;
        Ok(self.ends[last])
    }

    /// The file offset of a field.
    pub fn position_of(&mut self, field: usize, cache: &PageCache) -> Result<u64> {
        self.ensure_end(field, cache)?;
        Ok(self.start(field))
    }

    fn start(&self, field: usize) -> u64 {
        if field == 0 {
            self.pos
        } else {
            self.ends[field - 1]
        }
    }

    /// Computes field end offsets up to and including `field`, loading
    /// length fields as needed for variable-size fields.
    fn ensure_end(&mut self, field: usize, cache: &PageCache) -> Result<()> {
        while self.known <= field {
            let i = self.known;
            let kind = self.format.kind_of(i);
            let size = match kind.binary_size() {
                Some(size) => size as u64,
                None => {
                    let pair = self.format.pair_for(i).expect("checked at construction");
                    self.get_int(pair.length, cache)? as u64 * kind.elem_size() as u64
                }
            };
            self.ends[i] = self.start(i) + size;
            self.known = i + 1;
        }
        Ok(())
    }

    pub fn get_int(&mut self, field: usize, cache: &PageCache) -> Result<u32> {
        match self.get(field, cache)? {
            Value::Int(v) => Ok(*v),
            other => panic!("field {field} is {other:?}, expected Int"),
        }
    }

    pub fn get_bool(&mut self, field: usize, cache: &PageCache) -> Result<bool> {
        match self.get(field, cache)? {
            Value::Bool(v) => Ok(*v),
            other => panic!("field {field} is {other:?}, expected Bool"),
        }
    }

    pub fn get_kind(&mut self, field: usize, cache: &PageCache) -> Result<AccountKind> {
        match self.get(field, cache)? {
            Value::Kind(v) => Ok(*v),
            other => panic!("field {field} is {other:?}, expected Kind"),
        }
    }

    pub fn get_timestamp(&mut self, field: usize, cache: &PageCache) -> Result<Timestamp> {
        match self.get(field, cache)? {
            Value::DateTime(v) => Ok(*v),
            other => panic!("field {field} is {other:?}, expected DateTime"),
        }
    }

    pub fn get_str(&mut self, field: usize, cache: &PageCache) -> Result<&str> {
        match self.get(field, cache)? {
            Value::Str(v) => Ok(v),
            other => panic!("field {field} is {other:?}, expected Str"),
        }
    }

    pub fn get_opt_str(&mut self, field: usize, cache: &PageCache) -> Result<Option<&str>> {
        match self.get(field, cache)? {
            Value::StrNull(v) => Ok(v.as_deref()),
            other => panic!("field {field} is {other:?}, expected StrNull"),
        }
    }

    pub fn get_int_list(&mut self, field: usize, cache: &PageCache) -> Result<&[u32]> {
        match self.get(field, cache)? {
            Value::IntList(v) => Ok(v),
            other => panic!("field {field} is {other:?}, expected IntList"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::format::{FieldKind, ListPair, Record};
    use std::fs::File;
    use std::io::Write;

    fn test_format() -> Arc<Format> {
        Arc::new(
            Format::binary(
                vec![
                    FieldKind::Int,
                    FieldKind::Bool,
                    FieldKind::Int,
                    FieldKind::IntList,
                    FieldKind::Int,
                    FieldKind::Str,
                ],
                vec![ListPair { list: 3, length: 2 }, ListPair { list: 5, length: 4 }],
            )
            .unwrap(),
        )
    }

    fn record(id: u32, flag: bool, list: Vec<u32>, name: &str) -> Record {
        Record(vec![
            Value::Int(id),
            Value::Bool(flag),
            Value::Int(list.len() as u32),
            Value::IntList(list),
            Value::Int(name.len() as u32),
            Value::Str(name.to_string()),
        ])
    }

    fn setup(records: &[Record]) -> (tempfile::TempDir, PageCache, FileId, Arc<Format>) {
        let format = test_format();
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("records.dat");
        let mut out = Vec::new();
        for r in records {
            format.write_binary(r, &mut out).unwrap();
        }
        let mut f = File::create(&path).unwrap();
        f.write_all(&out).unwrap();
        drop(f);

        let cache = PageCache::new(8);
        let file = File::options().read(true).write(true).open(&path).unwrap();
        let id = cache.register(Arc::new(file));
        (dir, cache, id, format)
    }

    #[test]
    fn test_reads_individual_fields() {
        let records = [record(7, true, vec![1, 2, 3], "seven")];
        let (_dir, cache, file, format) = setup(&records);

        let mut lazy = LazyRecord::new(format, file, 0);
        assert_eq!(lazy.get_int(0, &cache).unwrap(), 7);
        assert!(lazy.get_bool(1, &cache).unwrap());
        // Variable fields load their length field on demand.
        assert_eq!(lazy.get_int_list(3, &cache).unwrap(), &[1, 2, 3]);
        assert_eq!(lazy.get_str(5, &cache).unwrap(), "seven");
    }

    #[test]
    fn test_position_after_and_rebind() {
        let records = [
            record(1, false, vec![10], "a"),
            record(2, true, vec![], "bb"),
        ];
        let (_dir, cache, file, format) = setup(&records);

        let mut lazy = LazyRecord::new(format, file, 0);
        assert_eq!(lazy.get_int(0, &cache).unwrap(), 1);
        let next = lazy.position_after(&cache).unwrap();
        assert_eq!(next, (4 + 1 + 4 + 4 + 4 + 1) as u64);

        lazy.rebind(file, next);
        assert_eq!(lazy.get_int(0, &cache).unwrap(), 2);
        assert_eq!(lazy.get_str(5, &cache).unwrap(), "bb");
        assert_eq!(lazy.get_int_list(3, &cache).unwrap(), &[] as &[u32]);
    }

    #[test]
    fn test_set_and_flush_writes_back() {
        let records = [record(1, false, vec![10], "a")];
        let (dir, cache, file, format) = setup(&records);

        let mut lazy = LazyRecord::new(format.clone(), file, 0);
        lazy.set(1, Value::Bool(true));
        lazy.flush_to_file(&cache).unwrap();
        cache.flush_file(file);

        let bytes = std::fs::read(dir.path().join("records.dat")).unwrap();
        let decoded = format.read_binary(&mut bytes.as_slice()).unwrap();
        assert!(decoded.boolean(1));
        assert_eq!(decoded.int(0), 1);
        assert_eq!(decoded.str(5), "a");
    }

    #[test]
    fn test_loads_only_touched_pages() {
        // A record whose string spans far into the file: reading the id
        // must not fault in the string's pages.
        let big = "x".repeat(8 * 1024);
        let records = [record(9, false, vec![], &big)];
        let (_dir, cache, file, format) = setup(&records);

        let mut lazy = LazyRecord::new(format, file, 0);
        assert_eq!(lazy.get_int(0, &cache).unwrap(), 9);
        let (_, misses) = cache.stats();
        assert_eq!(misses, 1);
    }
}
