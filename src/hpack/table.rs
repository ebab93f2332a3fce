//! Static and dynamic header tables. Grounded on the teacher's
//! `TableEntry`/`static_table!` macro/`Table` skeleton (`Atte-http2/src/hpack.rs`),
//! completed with real FIFO eviction accounting and combined indexing across
//! the 61-entry static table and the per-connection dynamic table.

use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    pub name: Box<[u8]>,
    pub value: Box<[u8]>,
}

impl TableEntry {
    fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.as_bytes().into(),
            value: value.as_bytes().into(),
        }
    }

    /// RFC 7541 §4.1: each entry costs `len(name) + len(value) + 32` octets.
    #[must_use]
    pub fn size(&self) -> usize {
        self.name.len() + self.value.len() + 32
    }
}

/// The fixed 61-entry table from RFC 7541 Appendix A, 0-indexed here; wire
/// indices are 1-based (`STATIC_TABLE[i - 1]`).
pub fn static_table() -> Vec<TableEntry> {
    vec![
        TableEntry::new(":authority", ""),
        TableEntry::new(":method", "GET"),
        TableEntry::new(":method", "POST"),
        TableEntry::new(":path", "/"),
        TableEntry::new(":path", "/index.html"),
        TableEntry::new(":scheme", "http"),
        TableEntry::new(":scheme", "https"),
        TableEntry::new(":status", "200"),
        TableEntry::new(":status", "204"),
        TableEntry::new(":status", "206"),
        TableEntry::new(":status", "304"),
        TableEntry::new(":status", "400"),
        TableEntry::new(":status", "404"),
        TableEntry::new(":status", "500"),
        TableEntry::new("accept-charset", ""),
        TableEntry::new("accept-encoding", "gzip, deflate"),
        TableEntry::new("accept-language", ""),
        TableEntry::new("accept-ranges", ""),
        TableEntry::new("accept", ""),
        TableEntry::new("access-control-allow-origin", ""),
        TableEntry::new("age", ""),
        TableEntry::new("allow", ""),
        TableEntry::new("authorization", ""),
        TableEntry::new("cache-control", ""),
        TableEntry::new("content-disposition", ""),
        TableEntry::new("content-encoding", ""),
        TableEntry::new("content-language", ""),
        TableEntry::new("content-length", ""),
        TableEntry::new("content-location", ""),
        TableEntry::new("content-range", ""),
        TableEntry::new("content-type", ""),
        TableEntry::new("cookie", ""),
        TableEntry::new("date", ""),
        TableEntry::new("etag", ""),
        TableEntry::new("expect", ""),
        TableEntry::new("expires", ""),
        TableEntry::new("from", ""),
        TableEntry::new("host", ""),
        TableEntry::new("if-match", ""),
        TableEntry::new("if-modified-since", ""),
        TableEntry::new("if-none-match", ""),
        TableEntry::new("if-range", ""),
        TableEntry::new("if-unmodified-since", ""),
        TableEntry::new("last-modified", ""),
        TableEntry::new("link", ""),
        TableEntry::new("location", ""),
        TableEntry::new("max-forwards", ""),
        TableEntry::new("proxy-authenticate", ""),
        TableEntry::new("proxy-authorization", ""),
        TableEntry::new("range", ""),
        TableEntry::new("referer", ""),
        TableEntry::new("refresh", ""),
        TableEntry::new("retry-after", ""),
        TableEntry::new("server", ""),
        TableEntry::new("set-cookie", ""),
        TableEntry::new("strict-transport-security", ""),
        TableEntry::new("transfer-encoding", ""),
        TableEntry::new("user-agent", ""),
        TableEntry::new("vary", ""),
        TableEntry::new("via", ""),
        TableEntry::new("www-authenticate", ""),
    ]
}

pub const STATIC_TABLE_LEN: usize = 61;

/// Per-connection dynamic table, FIFO-evicted from the oldest end whenever
/// inserting or shrinking would exceed `max_size`.
#[derive(Debug, Clone)]
pub struct DynamicTable {
    entries: VecDeque<TableEntry>,
    size: usize,
    max_size: usize,
}

impl DynamicTable {
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            size: 0,
            max_size,
        }
    }

    #[must_use]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Applies a dynamic-table-size-update opcode. The caller is responsible
    /// for rejecting a `new_max` above the last advertised
    /// `SETTINGS_HEADER_TABLE_SIZE` before calling this.
    pub fn set_max_size(&mut self, new_max: usize) {
        self.max_size = new_max;
        self.evict_to_fit();
    }

    pub fn push(&mut self, entry: TableEntry) {
        self.size += entry.size();
        self.entries.push_front(entry);
        self.evict_to_fit();
    }

    fn evict_to_fit(&mut self) {
        while self.size > self.max_size {
            match self.entries.pop_back() {
                Some(evicted) => self.size -= evicted.size(),
                None => break,
            }
        }
    }

    /// `index` is 0-based, newest-first, as used internally; callers
    /// converting from wire indices must first subtract `STATIC_TABLE_LEN + 1`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&TableEntry> {
        self.entries.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Combines the static table with a per-connection dynamic table behind
/// RFC 7541's single address space: indices `1..=61` are static,
/// `62..` are dynamic, newest dynamic entry first.
#[derive(Debug, Clone)]
pub struct Table {
    static_table: Vec<TableEntry>,
    pub dynamic: DynamicTable,
}

impl Table {
    #[must_use]
    pub fn new(dynamic_max_size: usize) -> Self {
        Self {
            static_table: static_table(),
            dynamic: DynamicTable::new(dynamic_max_size),
        }
    }

    /// `index` is the 1-based wire index from HPACK integer decoding.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&TableEntry> {
        if index == 0 {
            return None;
        }
        if index <= STATIC_TABLE_LEN {
            return self.static_table.get(index - 1);
        }
        self.dynamic.get(index - STATIC_TABLE_LEN - 1)
    }

    /// Finds the lowest wire index for an exact (name, value) match, and
    /// separately the lowest index for a name-only match, scanning the
    /// static table first as RFC 7541 recommends for encoder implementations.
    #[must_use]
    pub fn find(&self, name: &[u8], value: &[u8]) -> (Option<usize>, Option<usize>) {
        let mut exact = None;
        let mut name_only = None;
        for (i, entry) in self.static_table.iter().enumerate() {
            if &*entry.name == name {
                if name_only.is_none() {
                    name_only = Some(i + 1);
                }
                if &*entry.value == value {
                    exact = Some(i + 1);
                    break;
                }
            }
        }
        if exact.is_none() {
            for (i, entry) in self.dynamic.entries.iter().enumerate() {
                if &*entry.name == name {
                    if name_only.is_none() {
                        name_only = Some(STATIC_TABLE_LEN + i + 1);
                    }
                    if &*entry.value == value {
                        exact = Some(STATIC_TABLE_LEN + i + 1);
                        break;
                    }
                }
            }
        }
        (exact, name_only)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_table_has_61_entries() {
        assert_eq!(static_table().len(), STATIC_TABLE_LEN);
    }

    #[test]
    fn static_index_2_is_method_get() {
        let table = Table::new(4096);
        let entry = table.get(2).unwrap();
        assert_eq!(&*entry.name, b":method");
        assert_eq!(&*entry.value, b"GET");
    }

    #[test]
    fn dynamic_table_evicts_oldest_first() {
        let mut table = DynamicTable::new(64);
        table.push(TableEntry::new("a", "1")); // size 34
        table.push(TableEntry::new("b", "2")); // size 34, total 68 > 64, evict "a"
        assert_eq!(table.len(), 1);
        assert_eq!(&*table.get(0).unwrap().name, b"b");
    }

    #[test]
    fn shrinking_max_size_evicts() {
        let mut table = DynamicTable::new(256);
        table.push(TableEntry::new("name", "value"));
        assert_eq!(table.len(), 1);
        table.set_max_size(8);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn combined_indexing_crosses_static_into_dynamic() {
        let mut table = Table::new(4096);
        table.dynamic.push(TableEntry::new("x-custom", "v"));
        let entry = table.get(STATIC_TABLE_LEN + 1).unwrap();
        assert_eq!(&*entry.name, b"x-custom");
    }
}
