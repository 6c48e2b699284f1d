//! The embedded metadata header.
//!
//! ```text
//! [3 bytes: marker 0x12 0x34 <version>]
//! [4 bytes: payload length (u32 LE)]
//! [N bytes: payload (MessagePack map of strings to strings)]
//! [content ...]
//! ```
//!
//! The first marker byte decides whether a header is present at all; a
//! stream that starts with anything else is plain content.

use std::io::Read;

use stowage_core::Properties;
use tracing::debug;

use crate::error::{MetaError, MetaResult};

/// Current format version, the third marker byte.
pub const FORMAT_VERSION: u8 = 0x01;

/// Marker written at the start of every header.
pub const MAGIC: [u8; 3] = [0x12, 0x34, FORMAT_VERSION];

pub const MARKER_LEN: u64 = 3;
pub const LENGTH_LEN: u64 = 4;

/// Bytes in front of the payload.
pub const PREFIX_LEN: u64 = MARKER_LEN + LENGTH_LEN;

/// Outcome of [`decode`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Decoded {
    /// Embedded metadata, empty when no header is present.
    pub properties: Properties,
    /// Header bytes consumed, `0` when no header is present.
    pub consumed: u64,
}

impl Decoded {
    pub fn is_present(&self) -> bool {
        self.consumed > 0
    }
}

/// Serialize `properties` into a complete header.
pub fn encode(properties: &Properties) -> MetaResult<Vec<u8>> {
    let payload = rmp_serde::to_vec(properties).map_err(|e| MetaError::Encode(e.to_string()))?;
    let length = u32::try_from(payload.len()).map_err(|_| MetaError::TooLarge(payload.len()))?;

    let mut out = Vec::with_capacity(PREFIX_LEN as usize + payload.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&length.to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Total header size for a payload of `payload_len` bytes.
pub fn header_size(payload_len: u64) -> u64 {
    PREFIX_LEN + payload_len
}

/// Read a header from the start of `reader`.
///
/// When the first byte is not the marker, nothing counts as consumed and the
/// caller is responsible for rewinding. Otherwise the version byte is checked
/// first, then the rest of the marker, then the declared payload length.
pub fn decode<R: Read>(reader: &mut R) -> MetaResult<Decoded> {
    let mut marker = [0u8; MARKER_LEN as usize];
    let got = read_up_to(reader, &mut marker)?;

    if got == 0 || marker[0] != MAGIC[0] {
        return Ok(Decoded::default());
    }
    if got < marker.len() {
        return Err(MetaError::Truncated {
            declared: MARKER_LEN,
            available: got as u64,
        });
    }
    if marker[2] != FORMAT_VERSION {
        return Err(MetaError::IncompatibleFormat { version: marker[2] });
    }
    if marker[1] != MAGIC[1] {
        return Err(MetaError::Corrupt(format!(
            "unexpected marker {:02x} {:02x} {:02x}",
            marker[0], marker[1], marker[2]
        )));
    }

    let mut length = [0u8; LENGTH_LEN as usize];
    let got = read_up_to(reader, &mut length)?;
    if got < length.len() {
        return Err(MetaError::Truncated {
            declared: LENGTH_LEN,
            available: got as u64,
        });
    }
    let declared = u64::from(u32::from_le_bytes(length));

    let mut payload = Vec::new();
    reader.take(declared).read_to_end(&mut payload)?;
    if (payload.len() as u64) < declared {
        return Err(MetaError::Truncated {
            declared,
            available: payload.len() as u64,
        });
    }

    let properties: Properties =
        rmp_serde::from_slice(&payload).map_err(|e| MetaError::Corrupt(e.to_string()))?;
    debug!(keys = properties.len(), payload = declared, "decoded metadata header");

    Ok(Decoded {
        properties,
        consumed: header_size(declared),
    })
}

// Like read_exact, but reports how much arrived before end of stream.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> MetaResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    fn props(pairs: &[(&str, &str)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn header_layout() {
        let header = encode(&props(&[("a", "b")])).unwrap();
        assert_eq!(&header[..3], &MAGIC);
        let len = u32::from_le_bytes([header[3], header[4], header[5], header[6]]) as usize;
        assert_eq!(header.len(), 7 + len);
    }

    #[test]
    fn empty_map_still_gets_a_header() {
        let header = encode(&Properties::new()).unwrap();
        assert!(header.len() as u64 >= PREFIX_LEN);
        let decoded = decode(&mut Cursor::new(&header)).unwrap();
        assert!(decoded.is_present());
        assert!(decoded.properties.is_empty());
        assert_eq!(decoded.consumed, header.len() as u64);
    }

    #[test]
    fn content_type_is_ordinary_metadata() {
        let p = props(&[("content-type", "text/plain"), ("owner", "ops")]);
        let header = encode(&p).unwrap();
        let decoded = decode(&mut Cursor::new(&header)).unwrap();
        assert_eq!(decoded.properties, p);
    }

    #[test]
    fn plain_content_has_no_header() {
        let decoded = decode(&mut Cursor::new(b"hello world")).unwrap();
        assert!(!decoded.is_present());
        assert_eq!(decoded.consumed, 0);

        let decoded = decode(&mut Cursor::new(Vec::<u8>::new())).unwrap();
        assert!(!decoded.is_present());
    }

    #[test]
    fn writes_the_established_layout() {
        let header = encode(&props(&[("a", "b")])).unwrap();
        assert_eq!(
            header,
            [0x12, 0x34, 0x01, 5, 0, 0, 0, 0x81, 0xa1, b'a', 0xa1, b'b']
        );
    }

    #[test]
    fn reads_existing_msgpack_header() {
        let mut bytes = vec![0x12, 0x34, 0x01, 5, 0, 0, 0, 0x81, 0xa1, b'a', 0xa1, b'b'];
        bytes.extend_from_slice(b"content");
        let mut cursor = Cursor::new(bytes);
        let decoded = decode(&mut cursor).unwrap();
        assert_eq!(decoded.properties, props(&[("a", "b")]));
        assert_eq!(decoded.consumed, 12);
        assert_eq!(cursor.position(), 12);
    }

    #[test]
    fn unknown_version_is_incompatible() {
        let mut header = encode(&props(&[("k", "v")])).unwrap();
        header[2] = 0x02;
        let err = decode(&mut Cursor::new(&header)).unwrap_err();
        assert!(matches!(err, MetaError::IncompatibleFormat { version: 0x02 }));
    }

    #[test]
    fn version_is_checked_before_second_marker_byte() {
        let err = decode(&mut Cursor::new([0x12, 0x00, 0x07, 0, 0, 0, 0])).unwrap_err();
        assert!(matches!(err, MetaError::IncompatibleFormat { version: 0x07 }));

        let err = decode(&mut Cursor::new([0x12, 0x00, FORMAT_VERSION, 0, 0, 0, 0])).unwrap_err();
        assert!(matches!(err, MetaError::Corrupt(_)));
    }

    #[test]
    fn short_payload_is_truncated() {
        let header = encode(&props(&[("key", "a fairly long value")])).unwrap();
        let cut = &header[..header.len() - 5];
        let err = decode(&mut Cursor::new(cut)).unwrap_err();
        match err {
            MetaError::Truncated {
                declared,
                available,
            } => {
                assert_eq!(declared, header.len() as u64 - PREFIX_LEN);
                assert_eq!(available, declared - 5);
            }
            other => panic!("expected truncation, got {other:?}"),
        }
    }

    #[test]
    fn cut_marker_is_truncated() {
        let err = decode(&mut Cursor::new(&MAGIC[..2])).unwrap_err();
        assert!(matches!(err, MetaError::Truncated { declared: 3, available: 2 }));
    }

    #[test]
    fn garbage_payload_is_corrupt() {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(&[0xff, 0xff, 0xff, 0xff]);
        let err = decode(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, MetaError::Corrupt(_)));
    }

    #[test]
    fn decode_stops_at_content() {
        let mut bytes = encode(&props(&[("x", "1")])).unwrap();
        let header_len = bytes.len() as u64;
        bytes.extend_from_slice(b"CONTENT");
        let mut cursor = Cursor::new(bytes);
        let decoded = decode(&mut cursor).unwrap();
        assert_eq!(decoded.consumed, header_len);
        assert_eq!(cursor.position(), header_len);
    }

    #[test]
    fn errors_map_into_core_taxonomy() {
        use stowage_core::ErrorKind;
        let err: stowage_core::Error = MetaError::IncompatibleFormat { version: 7 }.into();
        assert!(matches!(err, stowage_core::Error::IncompatibleFormat { version: 7 }));
        let err = MetaError::Corrupt("bad".into()).for_item("a.txt");
        assert_eq!(err.kind(), ErrorKind::CorruptMetadata);
        assert!(err.to_string().contains("a.txt"));
    }

    proptest! {
        #[test]
        fn roundtrip_reports_encoded_length(
            map in proptest::collection::btree_map(".{0,12}", ".{0,40}", 0..8)
        ) {
            let header = encode(&map).unwrap();
            let decoded = decode(&mut Cursor::new(&header)).unwrap();
            prop_assert_eq!(decoded.consumed, header.len() as u64);
            prop_assert_eq!(decoded.properties, map);
        }
    }
}
