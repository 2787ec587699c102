// Netlink attribute (TLV) codec
use netlink_packet_utils::nla::{NLA_TYPE_MASK, Nla, NlasIterator};
use netlink_packet_utils::traits::Emitable;

use crate::error::NlError;

/// One decoded attribute with an owned payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    kind: u16,
    nested: bool,
    payload: Vec<u8>,
}

impl Attribute {
    pub fn kind(&self) -> u16 {
        self.kind
    }

    /// Whether the sender set the nested flag; payloads decode as nests either way.
    pub fn is_nested(&self) -> bool {
        self.nested
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn fixed<const N: usize>(&self) -> Result<[u8; N], NlError> {
        self.payload.as_slice().try_into().map_err(|_| NlError::Width {
            kind: self.kind,
            expected: N,
            actual: self.payload.len(),
        })
    }

    pub fn as_u8(&self) -> Result<u8, NlError> {
        Ok(self.fixed::<1>()?[0])
    }

    /// Big-endian, as nf_tables sends every integer attribute.
    pub fn as_u32(&self) -> Result<u32, NlError> {
        Ok(u32::from_be_bytes(self.fixed()?))
    }

    pub fn as_i32(&self) -> Result<i32, NlError> {
        Ok(i32::from_be_bytes(self.fixed()?))
    }

    pub fn as_u64(&self) -> Result<u64, NlError> {
        Ok(u64::from_be_bytes(self.fixed()?))
    }

    /// NUL-terminated string payload.
    pub fn as_str(&self) -> Result<&str, NlError> {
        let end = self
            .payload
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(self.payload.len());
        std::str::from_utf8(&self.payload[..end]).map_err(|_| NlError::InvalidString(self.kind))
    }

    pub fn nested(&self) -> Result<Attributes, NlError> {
        Attributes::parse(&self.payload)
    }
}

/// Ordered attribute list of one message or nest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(Vec<Attribute>);

impl Attributes {
    pub fn parse(buf: &[u8]) -> Result<Self, NlError> {
        let mut attrs = Vec::new();
        for nla in NlasIterator::new(buf) {
            let nla = nla?;
            attrs.push(Attribute {
                kind: nla.kind() & NLA_TYPE_MASK,
                nested: nla.nested_flag(),
                payload: nla.value().to_vec(),
            });
        }
        Ok(Self(attrs))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Last occurrence wins, matching kernel attribute parsing.
    pub fn get(&self, kind: u16) -> Option<&Attribute> {
        self.0.iter().rev().find(|a| a.kind == kind)
    }

    pub fn contains(&self, kind: u16) -> bool {
        self.get(kind).is_some()
    }

    pub fn u8(&self, kind: u16) -> Result<Option<u8>, NlError> {
        self.get(kind).map(Attribute::as_u8).transpose()
    }

    pub fn u32(&self, kind: u16) -> Result<Option<u32>, NlError> {
        self.get(kind).map(Attribute::as_u32).transpose()
    }

    pub fn u64(&self, kind: u16) -> Result<Option<u64>, NlError> {
        self.get(kind).map(Attribute::as_u64).transpose()
    }

    pub fn string(&self, kind: u16) -> Result<Option<&str>, NlError> {
        self.get(kind).map(Attribute::as_str).transpose()
    }

    pub fn bytes(&self, kind: u16) -> Option<&[u8]> {
        self.get(kind).map(Attribute::payload)
    }

    pub fn nested(&self, kind: u16) -> Result<Option<Attributes>, NlError> {
        self.get(kind).map(Attribute::nested).transpose()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrValue {
    Bytes(Vec<u8>),
    Nested(Vec<Attr>),
}

/// Attribute to be emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    kind: u16,
    value: AttrValue,
}

impl Attr {
    pub fn bytes(kind: u16, value: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            value: AttrValue::Bytes(value.into()),
        }
    }

    pub fn string(kind: u16, value: &str) -> Self {
        let mut bytes = value.as_bytes().to_vec();
        bytes.push(0);
        Self::bytes(kind, bytes)
    }

    pub fn u8(kind: u16, value: u8) -> Self {
        Self::bytes(kind, vec![value])
    }

    pub fn u32(kind: u16, value: u32) -> Self {
        Self::bytes(kind, value.to_be_bytes())
    }

    pub fn i32(kind: u16, value: i32) -> Self {
        Self::bytes(kind, value.to_be_bytes())
    }

    pub fn u64(kind: u16, value: u64) -> Self {
        Self::bytes(kind, value.to_be_bytes())
    }

    pub fn nested(kind: u16, attrs: Vec<Attr>) -> Self {
        Self {
            kind,
            value: AttrValue::Nested(attrs),
        }
    }

    pub fn attr_kind(&self) -> u16 {
        self.kind
    }
}

impl Nla for Attr {
    fn value_len(&self) -> usize {
        match &self.value {
            AttrValue::Bytes(bytes) => bytes.len(),
            AttrValue::Nested(attrs) => attrs.as_slice().buffer_len(),
        }
    }

    fn kind(&self) -> u16 {
        self.kind
    }

    fn emit_value(&self, buffer: &mut [u8]) {
        match &self.value {
            AttrValue::Bytes(bytes) => buffer[..bytes.len()].copy_from_slice(bytes),
            AttrValue::Nested(attrs) => attrs.as_slice().emit(buffer),
        }
    }

    fn is_nested(&self) -> bool {
        matches!(self.value, AttrValue::Nested(_))
    }
}

/// Serialize attributes back to back, each padded to 4 bytes.
pub fn emit_attributes(attrs: &[Attr]) -> Vec<u8> {
    let mut buf = vec![0u8; attrs.buffer_len()];
    attrs.emit(&mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use netlink_packet_utils::nla::NLA_F_NESTED;
    use proptest::prelude::*;

    #[test]
    fn strings_are_nul_terminated_and_padded() {
        let buf = emit_attributes(&[Attr::string(1, "abc")]);
        // 4 byte header + "abc\0"
        assert_eq!(buf.len(), 8);
        assert_eq!(&buf[4..], b"abc\0");

        let attrs = Attributes::parse(&buf).unwrap();
        assert_eq!(attrs.string(1).unwrap(), Some("abc"));
    }

    #[test]
    fn integers_are_big_endian() {
        let buf = emit_attributes(&[Attr::u32(2, 0x0102_0304), Attr::u64(3, 7)]);
        assert_eq!(&buf[4..8], &[1, 2, 3, 4]);

        let attrs = Attributes::parse(&buf).unwrap();
        assert_eq!(attrs.u32(2).unwrap(), Some(0x0102_0304));
        assert_eq!(attrs.u64(3).unwrap(), Some(7));
        assert_eq!(attrs.u32(9).unwrap(), None);
    }

    #[test]
    fn wrong_width_is_rejected() {
        let buf = emit_attributes(&[Attr::u8(2, 8)]);
        let attrs = Attributes::parse(&buf).unwrap();
        assert!(matches!(attrs.u32(2), Err(NlError::Width { expected: 4, actual: 1, .. })));
        assert_eq!(attrs.u8(2).unwrap(), Some(8));
    }

    #[test]
    fn nested_attributes_carry_flag_and_decode_on_demand() {
        let buf = emit_attributes(&[Attr::nested(
            4,
            vec![Attr::u32(1, 3), Attr::i32(2, -250)],
        )]);
        let raw_kind = u16::from_ne_bytes([buf[2], buf[3]]);
        assert_eq!(raw_kind, 4 | NLA_F_NESTED);

        let attrs = Attributes::parse(&buf).unwrap();
        let outer = attrs.get(4).unwrap();
        assert!(outer.is_nested());
        let inner = outer.nested().unwrap();
        assert_eq!(inner.u32(1).unwrap(), Some(3));
        assert_eq!(inner.get(2).unwrap().as_i32().unwrap(), -250);
    }

    #[test]
    fn length_beyond_buffer_fails() {
        let mut buf = emit_attributes(&[Attr::string(1, "table")]);
        buf[0] = 200;
        assert!(Attributes::parse(&buf).is_err());
    }

    #[test]
    fn length_shorter_than_header_fails() {
        let buf = [2u8, 0, 1, 0];
        assert!(Attributes::parse(&buf).is_err());
    }

    #[test]
    fn last_duplicate_wins() {
        let buf = emit_attributes(&[Attr::u32(1, 1), Attr::u32(1, 2)]);
        let attrs = Attributes::parse(&buf).unwrap();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs.u32(1).unwrap(), Some(2));
    }

    proptest! {
        #[test]
        fn parsing_arbitrary_bytes_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            if let Ok(attrs) = Attributes::parse(&bytes) {
                for attr in attrs.iter() {
                    let _ = attr.nested();
                    let _ = attr.as_str();
                }
            }
        }
    }
}
