//! Byte encoding of values and of the full plaintext payload.
//!
//! Value encoding (`tag` is one byte, see `ValueType::tag`):
//!
//! ```text
//! Boolean : tag | 0x00 or 0x01
//! Integer : tag | i64, 8 bytes LE
//! Float   : tag | IEEE-754 binary64 bits, 8 bytes LE
//! String  : tag | len (varint) | UTF-8 bytes
//! ```
//!
//! Payload encoding (domains and keys in sorted order, so the encoding
//! of a given store is unique):
//!
//! ```text
//! domain_count (varint)
//!   { name_len (varint) | name | key_count (varint)
//!       { key_len (varint) | key | value } }
//! ```
//!
//! Varints are unsigned LEB128 with overlong forms rejected.

use super::store::{DomainMap, DomainStore};
use super::value::{Value, ValueType};
use crate::errors::{Result, VaultError};

/// Longest possible LEB128 encoding of a `u64`.
const MAX_VARINT_LEN: usize = 10;

// ---------------------------------------------------------------------------
// Single values
// ---------------------------------------------------------------------------

/// Encode one value as `tag | bytes`.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_value(&mut out, value);
    out
}

/// Decode a value produced by `encode`, requiring the tag `expected`.
///
/// A well-formed value with a different tag fails with `TypeMismatch`;
/// malformed bytes fail with `Corruption`.
pub fn decode(bytes: &[u8], expected: ValueType) -> Result<Value> {
    let mut reader = Reader::new(bytes);
    let value = reader.value()?;
    reader.finish()?;
    value.expect_type(expected)?;
    Ok(value)
}

fn write_value(out: &mut Vec<u8>, value: &Value) {
    out.push(value.value_type().tag());
    match value {
        Value::Boolean(b) => out.push(u8::from(*b)),
        Value::Integer(i) => out.extend_from_slice(&i.to_le_bytes()),
        Value::Float(f) => out.extend_from_slice(&f.to_bits().to_le_bytes()),
        Value::String(s) => write_bytes(out, s.as_bytes()),
    }
}

// ---------------------------------------------------------------------------
// Full payload
// ---------------------------------------------------------------------------

/// Serialize the whole store.
pub fn encode_payload(store: &DomainStore) -> Vec<u8> {
    let mut out = Vec::new();
    write_varint(&mut out, store.len() as u64);
    for (domain, entries) in store.iter() {
        write_bytes(&mut out, domain.as_bytes());
        write_varint(&mut out, entries.len() as u64);
        for (key, value) in entries {
            write_bytes(&mut out, key.as_bytes());
            write_value(&mut out, value);
        }
    }
    out
}

/// Parse a payload produced by `encode_payload`.
pub fn decode_payload(bytes: &[u8]) -> Result<DomainStore> {
    let mut reader = Reader::new(bytes);
    let mut store = DomainStore::new();

    let domain_count = reader.varint()?;
    for _ in 0..domain_count {
        let domain = reader.string()?;
        if domain.is_empty() {
            return Err(malformed("empty domain name"));
        }
        if store.contains_domain(&domain) {
            return Err(malformed("duplicate domain"));
        }

        let key_count = reader.varint()?;
        if key_count == 0 {
            return Err(malformed("domain without keys"));
        }

        let mut entries = DomainMap::new();
        for _ in 0..key_count {
            let key = reader.string()?;
            if key.is_empty() {
                return Err(malformed("empty key name"));
            }
            let value = reader.value()?;
            if entries.insert(key, value).is_some() {
                return Err(malformed("duplicate key"));
            }
        }
        store.replace_domain(&domain, entries);
    }

    reader.finish()?;
    Ok(store)
}

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

fn write_varint(out: &mut Vec<u8>, mut n: u64) {
    while n >= 0x80 {
        out.push((n as u8 & 0x7F) | 0x80);
        n >>= 7;
    }
    out.push(n as u8);
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_varint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

fn malformed(what: &str) -> VaultError {
    VaultError::Corruption(format!("malformed payload: {what}"))
}

/// Bounds-checked cursor over a payload.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| malformed("unexpected end of data"))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn byte(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn array8(&mut self) -> Result<[u8; 8]> {
        let mut arr = [0u8; 8];
        arr.copy_from_slice(self.take(8)?);
        Ok(arr)
    }

    fn varint(&mut self) -> Result<u64> {
        let mut result = 0u64;
        for i in 0..MAX_VARINT_LEN {
            let byte = self.byte()?;
            let bits = u64::from(byte & 0x7F);
            if i == MAX_VARINT_LEN - 1 && bits > 1 {
                return Err(malformed("varint overflow"));
            }
            result |= bits << (7 * i);
            if byte & 0x80 == 0 {
                if i > 0 && byte == 0 {
                    return Err(malformed("overlong varint"));
                }
                return Ok(result);
            }
        }
        Err(malformed("varint too long"))
    }

    fn length(&mut self) -> Result<usize> {
        let len = self.varint()?;
        usize::try_from(len).map_err(|_| malformed("length exceeds address space"))
    }

    fn string(&mut self) -> Result<String> {
        let len = self.length()?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| malformed("invalid UTF-8"))
    }

    fn value(&mut self) -> Result<Value> {
        let tag = self.byte()?;
        let ty = ValueType::from_tag(tag)
            .ok_or_else(|| malformed(&format!("unknown type tag 0x{tag:02x}")))?;
        Ok(match ty {
            ValueType::Boolean => match self.byte()? {
                0 => Value::Boolean(false),
                1 => Value::Boolean(true),
                _ => return Err(malformed("non-canonical boolean")),
            },
            ValueType::Integer => Value::Integer(i64::from_le_bytes(self.array8()?)),
            ValueType::Float => Value::Float(f64::from_bits(u64::from_le_bytes(self.array8()?))),
            ValueType::String => Value::String(self.string()?),
        })
    }

    fn finish(&self) -> Result<()> {
        if self.pos == self.buf.len() {
            Ok(())
        } else {
            Err(malformed("trailing bytes"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<bool>().prop_map(Value::Boolean),
            any::<i64>().prop_map(Value::Integer),
            any::<f64>().prop_map(Value::Float),
            ".*".prop_map(Value::String),
        ]
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(v in any_value()) {
            let decoded = decode(&encode(&v), v.value_type()).unwrap();
            prop_assert_eq!(decoded, v);
        }

        #[test]
        fn varint_roundtrip(n in any::<u64>()) {
            let mut out = Vec::new();
            write_varint(&mut out, n);
            let mut reader = Reader::new(&out);
            prop_assert_eq!(reader.varint().unwrap(), n);
            prop_assert!(reader.finish().is_ok());
        }
    }

    #[test]
    fn encoding_layout_is_fixed() {
        assert_eq!(encode(&Value::Boolean(true)), vec![0x01, 0x01]);
        assert_eq!(
            encode(&Value::Integer(5)),
            vec![0x02, 5, 0, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(encode(&Value::from("hi")), vec![0x04, 2, b'h', b'i']);
    }

    #[test]
    fn decode_with_wrong_tag_is_type_mismatch() {
        let bytes = encode(&Value::Integer(5));
        let err = decode(&bytes, ValueType::Float).unwrap_err();
        assert!(matches!(
            err,
            VaultError::TypeMismatch {
                expected: ValueType::Float,
                found: ValueType::Integer
            }
        ));
    }

    #[test]
    fn decode_rejects_noncanonical_bool_and_trailing_bytes() {
        assert!(matches!(
            decode(&[0x01, 0x02], ValueType::Boolean),
            Err(VaultError::Corruption(_))
        ));
        assert!(matches!(
            decode(&[0x01, 0x01, 0x00], ValueType::Boolean),
            Err(VaultError::Corruption(_))
        ));
    }

    #[test]
    fn overlong_varint_is_rejected() {
        let mut reader = Reader::new(&[0x80, 0x00]);
        assert!(reader.varint().is_err());
    }

    #[test]
    fn payload_roundtrip_and_determinism() {
        let mut store = DomainStore::new();
        store.put("limits", "maxRetries", Value::Integer(5));
        store.put("api", "token", Value::from("secret123"));
        store.put("api", "ratio", Value::Float(0.25));
        store.put("flags", "beta", Value::Boolean(false));

        let bytes = encode_payload(&store);
        assert_eq!(decode_payload(&bytes).unwrap(), store);

        // Insertion order does not matter.
        let mut other = DomainStore::new();
        other.put("flags", "beta", Value::Boolean(false));
        other.put("api", "ratio", Value::Float(0.25));
        other.put("api", "token", Value::from("secret123"));
        other.put("limits", "maxRetries", Value::Integer(5));
        assert_eq!(encode_payload(&other), bytes);
    }

    #[test]
    fn empty_store_is_a_single_zero_byte() {
        let bytes = encode_payload(&DomainStore::new());
        assert_eq!(bytes, vec![0x00]);
        assert!(decode_payload(&bytes).unwrap().is_empty());
    }

    #[test]
    fn payload_rejects_domain_without_keys() {
        // 1 domain, name "a", 0 keys.
        let bytes = [0x01, 0x01, b'a', 0x00];
        assert!(matches!(
            decode_payload(&bytes),
            Err(VaultError::Corruption(_))
        ));
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let mut store = DomainStore::new();
        store.put("api", "token", Value::from("secret"));
        let bytes = encode_payload(&store);

        for cut in 0..bytes.len() {
            assert!(decode_payload(&bytes[..cut]).is_err(), "cut at {cut}");
        }
    }
}
