//! Command framing over the decrypted channel stream.
//!
//! Wire layout: `{name_len: u8}{name}{payload_len: u32 LE}{payload}`.
//! The three stages of a frame can arrive in separate reads, so the reader
//! keeps partial state (its buffer) across calls. A zero-length payload
//! completes as soon as the header does, without waiting for more bytes.

use crate::error::CommandError;

/// Upper bound on a single command payload; a length field above this is a
/// protocol violation from the peer, not an allocation request.
pub const MAX_COMMAND_PAYLOAD: usize = 16 * 1024 * 1024; // 16 MiB

/// One complete command frame.
///
/// Names are raw bytes on the wire; handlers register UTF-8 names and
/// dispatch compares byte-wise, so a non-UTF-8 name simply matches nothing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandFrame {
    pub name: Vec<u8>,
    pub payload: Vec<u8>,
}

impl CommandFrame {
    pub fn name_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.name).ok()
    }
}

/// Encode a command frame for transmission.
pub fn encode_command(name: &str, payload: &[u8]) -> Result<Vec<u8>, CommandError> {
    if name.len() > u8::MAX as usize {
        return Err(CommandError::NameTooLong);
    }
    let mut out = Vec::with_capacity(1 + name.len() + 4 + payload.len());
    out.push(name.len() as u8);
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Incremental command-frame parser.
#[derive(Default)]
pub struct CommandReader {
    buf: Vec<u8>,
}

impl CommandReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly decrypted bytes.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Extract the next complete frame, if the buffer holds one.
    ///
    /// `Err` means the peer sent an impossible length field; the caller
    /// should disconnect it.
    pub fn next_frame(&mut self) -> Result<Option<CommandFrame>, CommandError> {
        if self.buf.is_empty() {
            return Ok(None);
        }
        let name_len = self.buf[0] as usize;
        let header_len = 1 + name_len + 4;
        if self.buf.len() < header_len {
            return Ok(None);
        }
        let payload_len = u32::from_le_bytes(
            self.buf[1 + name_len..header_len]
                .try_into()
                .expect("sized slice"),
        );
        if payload_len as usize > MAX_COMMAND_PAYLOAD {
            return Err(CommandError::OversizedPayload(payload_len));
        }
        let total = header_len + payload_len as usize;
        if self.buf.len() < total {
            return Ok(None);
        }
        let name = self.buf[1..1 + name_len].to_vec();
        let payload = self.buf[header_len..total].to_vec();
        self.buf.drain(..total);
        Ok(Some(CommandFrame { name, payload }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_parse_reproduces_name_and_payload() {
        let bytes = encode_command("getpeers", b"some payload").unwrap();
        let mut reader = CommandReader::new();
        reader.feed(&bytes);
        let frame = reader.next_frame().unwrap().unwrap();
        assert_eq!(frame.name, b"getpeers".to_vec());
        assert_eq!(frame.payload, b"some payload".to_vec());
        assert!(reader.next_frame().unwrap().is_none());
    }

    #[test]
    fn roundtrip_at_name_length_limit() {
        let name = "x".repeat(255);
        let bytes = encode_command(&name, &[]).unwrap();
        let mut reader = CommandReader::new();
        reader.feed(&bytes);
        let frame = reader.next_frame().unwrap().unwrap();
        assert_eq!(frame.name.len(), 255);
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn name_over_255_bytes_is_rejected_at_encode() {
        let name = "x".repeat(256);
        assert_eq!(encode_command(&name, &[]), Err(CommandError::NameTooLong));
    }

    #[test]
    fn zero_length_payload_completes_without_more_bytes() {
        let bytes = encode_command("ping", &[]).unwrap();
        let mut reader = CommandReader::new();
        reader.feed(&bytes);
        let frame = reader.next_frame().unwrap().unwrap();
        assert_eq!(frame.name, b"ping".to_vec());
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn frame_split_across_three_reads() {
        let bytes = encode_command("peers", b"abcdef").unwrap();
        let mut reader = CommandReader::new();

        // name-length + partial name
        reader.feed(&bytes[..3]);
        assert!(reader.next_frame().unwrap().is_none());
        // rest of name + length field
        reader.feed(&bytes[3..10]);
        assert!(reader.next_frame().unwrap().is_none());
        // payload
        reader.feed(&bytes[10..]);
        let frame = reader.next_frame().unwrap().unwrap();
        assert_eq!(frame.name, b"peers".to_vec());
        assert_eq!(frame.payload, b"abcdef".to_vec());
    }

    #[test]
    fn consecutive_frames_parse_in_order() {
        let mut bytes = encode_command("first", b"1").unwrap();
        bytes.extend_from_slice(&encode_command("second", b"22").unwrap());
        let mut reader = CommandReader::new();
        reader.feed(&bytes);
        assert_eq!(reader.next_frame().unwrap().unwrap().name, b"first".to_vec());
        assert_eq!(
            reader.next_frame().unwrap().unwrap().payload,
            b"22".to_vec()
        );
        assert!(reader.next_frame().unwrap().is_none());
    }

    #[test]
    fn oversized_payload_length_is_rejected() {
        let mut bytes = vec![4u8];
        bytes.extend_from_slice(b"evil");
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        let mut reader = CommandReader::new();
        reader.feed(&bytes);
        assert_eq!(
            reader.next_frame(),
            Err(CommandError::OversizedPayload(u32::MAX))
        );
    }
}
