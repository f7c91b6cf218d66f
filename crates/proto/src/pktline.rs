//! Pkt-line framing and sideband-64k demultiplexing
//!
//! A pkt-line is a 4-hex-digit length header (counting itself) followed by
//! the payload. Three lengths are reserved: `0000` flush, `0001` section
//! delimiter, `0002` end of a stateless response.

use crate::error::WireError;
use std::io::Read;

/// Largest payload a single data pkt-line may carry.
pub const MAX_PAYLOAD: usize = 65516;

/// One decoded pkt-line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// `0000`
    Flush,
    /// `0001`
    Delim,
    /// `0002`
    ResponseEnd,
    /// A data pkt-line payload
    Data(Vec<u8>),
}

/// Incremental pkt-line reader over any byte stream
pub struct PktReader<R> {
    inner: R,
}

impl<R: Read> PktReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Read the next packet; `None` at a clean end of stream.
    pub fn read_packet(&mut self) -> Result<Option<Packet>, WireError> {
        let mut header = [0u8; 4];
        match read_full(&mut self.inner, &mut header) {
            Ok(true) => {}
            Ok(false) => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let header_str = std::str::from_utf8(&header)
            .map_err(|_| WireError::PktLine(format!("non-ascii length header {:?}", header)))?;
        let len = usize::from_str_radix(header_str, 16)
            .map_err(|_| WireError::PktLine(format!("invalid length header {:?}", header_str)))?;
        match len {
            0 => Ok(Some(Packet::Flush)),
            1 => Ok(Some(Packet::Delim)),
            2 => Ok(Some(Packet::ResponseEnd)),
            3 => Err(WireError::PktLine("reserved length 0003".to_string())),
            _ => {
                let mut payload = vec![0u8; len - 4];
                self.inner
                    .read_exact(&mut payload)
                    .map_err(|e| WireError::PktLine(format!("truncated payload: {}", e)))?;
                Ok(Some(Packet::Data(payload)))
            }
        }
    }
}

/// Read exactly `buf.len()` bytes; `false` if the stream ended before the
/// first byte, an error if it ended in the middle.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "stream ended inside a pkt-line header",
            ));
        }
        filled += n;
    }
    Ok(true)
}

/// Append a data pkt-line to `out`
pub fn write_data(out: &mut Vec<u8>, payload: &[u8]) {
    debug_assert!(payload.len() <= MAX_PAYLOAD);
    out.extend_from_slice(format!("{:04x}", payload.len() + 4).as_bytes());
    out.extend_from_slice(payload);
}

/// Append a flush packet (`0000`)
pub fn write_flush(out: &mut Vec<u8>) {
    out.extend_from_slice(b"0000");
}

/// Append a delimiter packet (`0001`)
pub fn write_delim(out: &mut Vec<u8>) {
    out.extend_from_slice(b"0001");
}

/// Sideband-64k band tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    /// Pack data
    Data,
    /// Progress text, loggable but not part of the payload
    Progress,
    /// Fatal error reported by the remote
    Error,
}

/// Split a sideband-framed payload into its band tag and content.
pub fn parse_sideband(payload: &[u8]) -> Result<(Band, &[u8]), WireError> {
    let (&tag, rest) = payload.split_first().ok_or(WireError::Sideband)?;
    let band = match tag {
        1 => Band::Data,
        2 => Band::Progress,
        3 => Band::Error,
        _ => return Err(WireError::Sideband),
    };
    Ok((band, rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read_all(data: &[u8]) -> Vec<Packet> {
        let mut reader = PktReader::new(Cursor::new(data.to_vec()));
        let mut packets = Vec::new();
        while let Some(pkt) = reader.read_packet().unwrap() {
            packets.push(pkt);
        }
        packets
    }

    #[test]
    fn test_roundtrip_chunks() {
        let mut buf = Vec::new();
        write_data(&mut buf, b"command=ls-refs\n");
        write_delim(&mut buf);
        write_data(&mut buf, b"peel\n");
        write_flush(&mut buf);

        let packets = read_all(&buf);
        assert_eq!(
            packets,
            vec![
                Packet::Data(b"command=ls-refs\n".to_vec()),
                Packet::Delim,
                Packet::Data(b"peel\n".to_vec()),
                Packet::Flush,
            ]
        );
    }

    #[test]
    fn test_special_lengths() {
        let packets = read_all(b"000000010002");
        assert_eq!(packets, vec![Packet::Flush, Packet::Delim, Packet::ResponseEnd]);
    }

    #[test]
    fn test_empty_stream() {
        assert!(read_all(b"").is_empty());
    }

    #[test]
    fn test_known_encoding() {
        // "0006a\n" from the pkt-line documentation.
        let mut buf = Vec::new();
        write_data(&mut buf, b"a\n");
        assert_eq!(buf, b"0006a\n");
    }

    #[test]
    fn test_truncated_payload_errors() {
        let mut reader = PktReader::new(Cursor::new(b"0008ab".to_vec()));
        assert!(reader.read_packet().is_err());
    }

    #[test]
    fn test_bad_length_header_errors() {
        let mut reader = PktReader::new(Cursor::new(b"zzzz".to_vec()));
        assert!(reader.read_packet().is_err());
    }

    #[test]
    fn test_reserved_length_errors() {
        let mut reader = PktReader::new(Cursor::new(b"0003".to_vec()));
        assert!(reader.read_packet().is_err());
    }

    #[test]
    fn test_sideband_bands() {
        assert_eq!(parse_sideband(&[1, b'x']).unwrap(), (Band::Data, &b"x"[..]));
        assert_eq!(parse_sideband(&[2, b'p']).unwrap(), (Band::Progress, &b"p"[..]));
        assert_eq!(parse_sideband(&[3, b'e']).unwrap(), (Band::Error, &b"e"[..]));
        assert!(parse_sideband(&[]).is_err());
        assert!(parse_sideband(&[9, b'x']).is_err());
    }
}
