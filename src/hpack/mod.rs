//! HPACK (RFC 7541) header compression: variable-length integers, the four
//! field-encoding representations, and the `Encoder`/`Decoder` pair that
//! wrap them around [`table::Table`] and [`huffman`]. Completes the
//! teacher's `Encoder`/`Decoder` skeleton (`Atte-http2/src/hpack.rs`), whose
//! `encode` stub discarded its input and whose `encode_integer` had no body.

pub mod huffman;
pub mod table;

use crate::error::ConnectionError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use table::{Table, TableEntry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: Bytes,
    pub value: Bytes,
    /// Never-indexed fields (e.g. `authorization`) bypass the dynamic table
    /// even on the encode side, so a compromised table dump can't replay them.
    pub sensitive: bool,
}

impl HeaderField {
    #[must_use]
    pub fn new(name: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            sensitive: false,
        }
    }

    /// RFC 7540 §6.5.2 accounting: name + value + 32 octets of overhead.
    #[must_use]
    pub fn size(&self) -> usize {
        self.name.len() + self.value.len() + 32
    }
}

/// Result of decoding one header block. Decoding always runs to completion
/// so the two peers' dynamic tables stay in sync, even when the header list
/// turns out to be too large or contains a malformed name — see
/// SPEC_FULL.md §4.2.
#[derive(Debug, Default)]
pub struct DecodedHeaders {
    pub fields: Vec<HeaderField>,
    /// Cumulative `SETTINGS_MAX_HEADER_LIST_SIZE` was exceeded; `fields` was
    /// truncated at the point of overflow and the stream should be rejected.
    pub size_exceeded: bool,
    /// A header name contained an uppercase ASCII character, a connection
    /// (stream-scope) `PROTOCOL_ERROR` per RFC 7540 §8.1.2.
    pub malformed_name: bool,
}

fn write_integer(out: &mut BytesMut, pattern: u8, prefix_bits: u8, value: usize) {
    let max_prefix = ((1u32 << prefix_bits) - 1) as usize;
    if value < max_prefix {
        out.put_u8(pattern | value as u8);
        return;
    }
    out.put_u8(pattern | max_prefix as u8);
    let mut remaining = value - max_prefix;
    while remaining >= 128 {
        out.put_u8(((remaining % 128) as u8) | 0x80);
        remaining /= 128;
    }
    out.put_u8(remaining as u8);
}

fn read_integer(buf: &mut Bytes, prefix_bits: u8) -> Result<u64, ConnectionError> {
    if buf.is_empty() {
        return Err(ConnectionError::compression());
    }
    let prefix_mask = (1u16 << prefix_bits) - 1;
    let first = buf.get_u8();
    let mut value = u64::from(first) & prefix_mask as u64;
    if value < prefix_mask as u64 {
        return Ok(value);
    }
    let mut shift = 0u32;
    loop {
        if buf.is_empty() {
            return Err(ConnectionError::compression());
        }
        let b = buf.get_u8();
        value = value
            .checked_add((u64::from(b) & 0x7f) << shift)
            .ok_or_else(ConnectionError::compression)?;
        // RFC 7541 §5.1: a decoded value greater than 2^32-1 is a decoding error.
        if value > u64::from(u32::MAX) {
            return Err(ConnectionError::compression());
        }
        shift += 7;
        if b & 0x80 == 0 {
            break;
        }
    }
    Ok(value)
}

fn write_string(out: &mut BytesMut, value: &[u8]) {
    let huffman_len = huffman::encoded_len(value);
    if huffman_len < value.len() {
        write_integer(out, 0x80, 7, huffman_len);
        huffman::encode(value, out);
    } else {
        write_integer(out, 0x00, 7, value.len());
        out.put_slice(value);
    }
}

fn read_string(buf: &mut Bytes) -> Result<Bytes, ConnectionError> {
    if buf.is_empty() {
        return Err(ConnectionError::compression());
    }
    let huffman_coded = buf[0] & 0x80 != 0;
    let len = read_integer(buf, 7)? as usize;
    if buf.len() < len {
        return Err(ConnectionError::compression());
    }
    let raw = buf.split_to(len);
    if huffman_coded {
        huffman::decode(&raw).map_err(|_| ConnectionError::compression())
    } else {
        Ok(raw)
    }
}

fn has_uppercase_ascii(name: &[u8]) -> bool {
    name.iter().any(u8::is_ascii_uppercase)
}

/// Per-connection HPACK decoder: owns the peer's view of our dynamic table.
pub struct Decoder {
    table: Table,
    max_header_list_size: usize,
    /// Ceiling a dynamic-table-size-update opcode may not exceed: our own
    /// last-advertised `SETTINGS_HEADER_TABLE_SIZE`.
    table_size_limit: usize,
}

impl Decoder {
    #[must_use]
    pub fn new(initial_dynamic_table_size: usize, max_header_list_size: usize) -> Self {
        Self {
            table: Table::new(initial_dynamic_table_size),
            max_header_list_size,
            table_size_limit: initial_dynamic_table_size,
        }
    }

    pub fn decode(&mut self, mut block: Bytes) -> Result<DecodedHeaders, ConnectionError> {
        let mut result = DecodedHeaders::default();
        let mut total_size = 0usize;

        while !block.is_empty() {
            let first = block[0];
            if first & 0x80 != 0 {
                let index = read_integer(&mut block, 7)?;
                let entry = self
                    .table
                    .get(index as usize)
                    .ok_or_else(ConnectionError::compression)?
                    .clone();
                self.record(
                    &mut result,
                    &mut total_size,
                    Bytes::from(Vec::from(entry.name)),
                    Bytes::from(Vec::from(entry.value)),
                    false,
                );
            } else if first & 0x40 != 0 {
                let index = read_integer(&mut block, 6)?;
                let (name, value) = self.read_name_value(&mut block, index as usize)?;
                self.table.dynamic.push(TableEntry {
                    name: name.to_vec().into_boxed_slice(),
                    value: value.to_vec().into_boxed_slice(),
                });
                self.record(&mut result, &mut total_size, name, value, false);
            } else if first & 0x20 != 0 {
                let new_size = read_integer(&mut block, 5)? as usize;
                if new_size > self.table_size_limit {
                    return Err(ConnectionError::compression());
                }
                self.table.dynamic.set_max_size(new_size);
            } else {
                let never_indexed = first & 0x10 != 0;
                let index = read_integer(&mut block, 4)?;
                let (name, value) = self.read_name_value(&mut block, index as usize)?;
                self.record(&mut result, &mut total_size, name, value, never_indexed);
            }
        }

        Ok(result)
    }

    fn read_name_value(
        &mut self,
        block: &mut Bytes,
        index: usize,
    ) -> Result<(Bytes, Bytes), ConnectionError> {
        let name = if index == 0 {
            read_string(block)?
        } else {
            self.table
                .get(index)
                .ok_or_else(ConnectionError::compression)?
                .name
                .to_vec()
                .into()
        };
        let value = read_string(block)?;
        Ok((name, value))
    }

    fn record(
        &self,
        result: &mut DecodedHeaders,
        total_size: &mut usize,
        name: Bytes,
        value: Bytes,
        sensitive: bool,
    ) {
        if has_uppercase_ascii(&name) {
            result.malformed_name = true;
        }
        *total_size += name.len() + value.len() + 32;
        if *total_size > self.max_header_list_size {
            result.size_exceeded = true;
        }
        if !result.size_exceeded {
            result.fields.push(HeaderField {
                name,
                value,
                sensitive,
            });
        }
    }
}

/// Per-connection HPACK encoder: owns our view of the peer's dynamic table.
pub struct Encoder {
    table: Table,
    /// A new `SETTINGS_HEADER_TABLE_SIZE` from the peer, staged until the
    /// next `encode()` call. RFC 7541 §6.3 requires the size-update opcode
    /// be the first bytes of the *next* header block, not emitted the
    /// instant the peer's SETTINGS frame arrives.
    pending_size_update: Option<usize>,
}

impl Encoder {
    #[must_use]
    pub fn new(initial_dynamic_table_size: usize) -> Self {
        Self {
            table: Table::new(initial_dynamic_table_size),
            pending_size_update: None,
        }
    }

    /// Records that the peer's advertised `SETTINGS_HEADER_TABLE_SIZE`
    /// changed. Bounds what we may use when encoding headers *to* the peer —
    /// this is the encoder's ceiling, never the decoder's (the decoder is
    /// bounded by our own advertised value, which we choose and never learn
    /// from the peer).
    pub fn set_max_dynamic_table_size(&mut self, new_max: usize) {
        self.pending_size_update = Some(new_max);
    }

    pub fn encode(&mut self, fields: &[HeaderField]) -> Bytes {
        let mut out = BytesMut::new();
        if let Some(new_max) = self.pending_size_update.take() {
            write_integer(&mut out, 0x20, 5, new_max);
            self.table.dynamic.set_max_size(new_max);
        }
        for field in fields {
            self.encode_field(field, &mut out);
        }
        out.freeze()
    }

    fn encode_field(&mut self, field: &HeaderField, out: &mut BytesMut) {
        let (exact, name_only) = self.table.find(&field.name, &field.value);
        if let Some(index) = exact {
            write_integer(out, 0x80, 7, index);
            return;
        }
        if field.sensitive {
            self.write_literal(out, 0x10, 4, name_only, field);
            return;
        }
        self.write_literal(out, 0x40, 6, name_only, field);
        self.table.dynamic.push(TableEntry {
            name: field.name.to_vec().into_boxed_slice(),
            value: field.value.to_vec().into_boxed_slice(),
        });
    }

    fn write_literal(
        &self,
        out: &mut BytesMut,
        pattern: u8,
        prefix_bits: u8,
        name_index: Option<usize>,
        field: &HeaderField,
    ) {
        match name_index {
            Some(index) => write_integer(out, pattern, prefix_bits, index),
            None => {
                write_integer(out, pattern, prefix_bits, 0);
                write_string(out, &field.name);
            }
        }
        write_string(out, &field.value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip_is_identity_modulo_case() {
        let mut encoder = Encoder::new(4096);
        let mut decoder = Decoder::new(4096, 8192);
        let fields = vec![
            HeaderField::new(&b":method"[..], &b"GET"[..]),
            HeaderField::new(&b":path"[..], &b"/index.html"[..]),
            HeaderField::new(&b"x-custom"[..], &b"value"[..]),
        ];
        let block = encoder.encode(&fields);
        let decoded = decoder.decode(block).unwrap();
        assert!(!decoded.size_exceeded);
        assert!(!decoded.malformed_name);
        assert_eq!(decoded.fields, fields);
    }

    #[test]
    fn repeated_field_hits_dynamic_table_on_second_pass() {
        let mut encoder = Encoder::new(4096);
        let mut decoder = Decoder::new(4096, 8192);
        let fields = vec![HeaderField::new(&b"x-trace-id"[..], &b"abc123"[..])];
        let first_block = encoder.encode(&fields);
        let second_block = encoder.encode(&fields);
        assert!(second_block.len() < first_block.len());
        decoder.decode(first_block).unwrap();
        let decoded = decoder.decode(second_block).unwrap();
        assert_eq!(decoded.fields, fields);
    }

    #[test]
    fn size_exceeded_is_flagged_but_decoding_completes() {
        let mut encoder = Encoder::new(4096);
        let mut decoder = Decoder::new(4096, 10);
        let fields = vec![HeaderField::new(&b"name"[..], &b"a-much-longer-value"[..])];
        let block = encoder.encode(&fields);
        let decoded = decoder.decode(block).unwrap();
        assert!(decoded.size_exceeded);
        assert!(decoded.fields.is_empty());
    }

    #[test]
    fn uppercase_header_name_is_flagged_malformed() {
        let mut decoder = Decoder::new(4096, 8192);
        let mut raw = BytesMut::new();
        write_integer(&mut raw, 0x40, 6, 0);
        write_string(&mut raw, b"Content-Type");
        write_string(&mut raw, b"text/plain");
        let decoded = decoder.decode(raw.freeze()).unwrap();
        assert!(decoded.malformed_name);
    }

    #[test]
    fn dynamic_table_size_update_above_limit_is_compression_error() {
        let mut decoder = Decoder::new(100, 8192);
        let mut raw = BytesMut::new();
        write_integer(&mut raw, 0x20, 5, 5000);
        assert!(decoder.decode(raw.freeze()).is_err());
    }

    #[test]
    fn integer_roundtrip_across_prefix_boundary() {
        let mut buf = BytesMut::new();
        write_integer(&mut buf, 0, 5, 31);
        write_integer(&mut buf, 0, 5, 1337);
        let mut bytes = buf.freeze();
        assert_eq!(read_integer(&mut bytes, 5).unwrap(), 31);
        assert_eq!(read_integer(&mut bytes, 5).unwrap(), 1337);
    }
}
