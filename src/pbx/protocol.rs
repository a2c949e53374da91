//! Binary sub-protocol of the PBX push channel.
//!
//! The webclient talks to the PBX with small length-prefixed frames POSTed to
//! a plain HTTP endpoint, while responses arrive asynchronously on the
//! websocket push bus. Nothing here is documented upstream; the constants are
//! carried verbatim from a capture of the stock webclient and must not be
//! regenerated or "cleaned up".

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// HTTP endpoint every binary frame is POSTed to.
pub const BINARY_RPC_PATH: &str = "/MyPhone/MPWebService.asmx";

/// Session-correlation header the binary RPC endpoint expects.
pub const SESSION_HEADER: &str = "myphonesession";

/// Content type of every binary RPC body.
pub const BINARY_CONTENT_TYPE: &str = "application/octet-stream";

/// Field separator used throughout the push framing.
const FIELD_SEPARATOR: u8 = 0x1a;

/// First five bytes of the push frame announcing the registered phone.
const PHONE_ANNOUNCEMENT_MARKER: [u8; 5] = [0x08, 0xc9, 0x01, 0xca, 0x0c];

/// Fixed header of the outbound dial command.
const DIAL_COMMAND_HEADER: [u8; 4] = [0x08, 0x77, 0xba, 0x07];

/// Tag byte opening the dial command body.
const DIAL_BODY_TAG: u8 = 0x0a;

/// Prefix of the frame field carrying the registered line.
const LINE_PREFIX: &[u8] = b"(sip:";

/// State queries the PBX wants to have seen before it announces the phone,
/// in the order the stock webclient sends them. Opaque capture constants.
pub const QUERY_FRAMES: [&[u8]; 7] = [
    &[0x08, 0x7a, 0xd2, 0x07, 0x00],
    &[0x08, 0x66, 0xb2, 0x06, 0x00],
    &[0x08, 0x83, 0x01, 0x9a, 0x08, 0x00],
    &[0x08, 0xf4, 0x03, 0xa2, 0x1f, 0x00],
    &[
        0x08, 0x68, 0xc2, 0x06, 0x0e, 0x10, 0x00, 0x18, 0x01, 0x20, 0x00, 0x40, 0x00, 0x48, 0x00,
        0x50, 0x00, 0x58, 0x20,
    ],
    &[0x08, 0x80, 0x01, 0x82, 0x08, 0x02, 0x08, 0x04],
    &[0x08, 0xa5, 0x01, 0xaa, 0x0a, 0x00],
];

/// Dial command rejected before encoding.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum EncodeError {
    #[error("destination number is {0} digits, the frame caps it at 255")]
    NumberTooLong(usize),

    #[error("dial command body is {0} bytes, the frame caps it at 255")]
    BodyTooLong(usize),
}

/// True for the push frame that announces the registered phone.
pub fn is_phone_announcement(frame: &[u8]) -> bool {
    frame.starts_with(&PHONE_ANNOUNCEMENT_MARKER)
}

/// Pulls the registered line out of a phone announcement frame.
///
/// The line rides in a `(sip:`-prefixed field and is terminated by a `"`
/// byte; everything after the quote is display garbage.
pub fn extract_phone_line(frame: &[u8]) -> Option<String> {
    let field = frame
        .split(|&byte| byte == FIELD_SEPARATOR)
        .filter(|part| part.starts_with(LINE_PREFIX))
        .last()?;

    let line = match field.iter().position(|&byte| byte == b'"') {
        Some(quote) => &field[..quote],
        None => field,
    };
    String::from_utf8(line.to_vec()).ok()
}

/// Builds the dial command frame, bit for bit.
///
/// Layout: `08 77 ba 07`, one body-length byte, then the body: `0x0a`, one
/// digit-count byte, the ASCII digits, `0x1a`, the line identifier. Both
/// single-byte lengths cap their field at 255.
pub fn encode_dial_command(digits: &str, phone_line: &str) -> Result<Bytes, EncodeError> {
    let digit_count =
        u8::try_from(digits.len()).map_err(|_| EncodeError::NumberTooLong(digits.len()))?;
    let body_size = 3 + digits.len() + phone_line.len();
    let body_len = u8::try_from(body_size).map_err(|_| EncodeError::BodyTooLong(body_size))?;

    let mut frame = BytesMut::with_capacity(DIAL_COMMAND_HEADER.len() + 1 + body_size);
    frame.put_slice(&DIAL_COMMAND_HEADER);
    frame.put_u8(body_len);
    frame.put_u8(DIAL_BODY_TAG);
    frame.put_u8(digit_count);
    frame.put_slice(digits.as_bytes());
    frame.put_u8(FIELD_SEPARATOR);
    frame.put_slice(phone_line.as_bytes());
    Ok(frame.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Re-parses an encoded dial command per the framing rules.
    fn decode_dial_command(frame: &[u8]) -> (usize, String, String) {
        assert_eq!(&frame[..4], &DIAL_COMMAND_HEADER);
        let body = &frame[5..];
        assert_eq!(body.len(), frame[4] as usize);
        assert_eq!(body[0], DIAL_BODY_TAG);
        let digit_count = body[1] as usize;
        let digits = String::from_utf8(body[2..2 + digit_count].to_vec()).unwrap();
        assert_eq!(body[2 + digit_count], FIELD_SEPARATOR);
        let line = String::from_utf8(body[3 + digit_count..].to_vec()).unwrap();
        (frame[4] as usize, digits, line)
    }

    #[test]
    fn dial_command_round_trips() {
        let frame = encode_dial_command("12345", "(sip:10.0.0.5:5060;line=1").unwrap();
        let (body_len, digits, line) = decode_dial_command(&frame);
        assert_eq!(frame[6], 5); // digit-count byte
        assert_eq!(body_len, 3 + 5 + 25);
        assert_eq!(digits, "12345");
        assert_eq!(line, "(sip:10.0.0.5:5060;line=1");
    }

    #[test]
    fn oversized_number_is_rejected() {
        let digits = "1".repeat(300);
        assert_eq!(
            encode_dial_command(&digits, "(sip:x").unwrap_err(),
            EncodeError::NumberTooLong(300)
        );
    }

    #[test]
    fn oversized_body_is_rejected() {
        let digits = "1".repeat(200);
        let line = format!("(sip:{}", "a".repeat(100));
        assert!(matches!(
            encode_dial_command(&digits, &line).unwrap_err(),
            EncodeError::BodyTooLong(_)
        ));
    }

    #[test]
    fn phone_line_extraction_stops_at_the_quote() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&PHONE_ANNOUNCEMENT_MARKER);
        frame.extend_from_slice(b"...\x1a");
        frame.extend_from_slice(b"(sip:10.0.0.5:5060\"garbage");
        frame.extend_from_slice(b"\x1a...");

        assert!(is_phone_announcement(&frame));
        assert_eq!(
            extract_phone_line(&frame).as_deref(),
            Some("(sip:10.0.0.5:5060")
        );
    }

    #[test]
    fn unquoted_line_runs_to_the_field_end() {
        let frame = b"\x08\xc9\x01\xca\x0c\x1a(sip:10.0.0.5:5060;line=1\x1atrailer";
        assert_eq!(
            extract_phone_line(frame).as_deref(),
            Some("(sip:10.0.0.5:5060;line=1")
        );
    }

    #[test]
    fn frame_without_line_yields_nothing() {
        assert_eq!(extract_phone_line(b"\x08\xc9\x01\xca\x0cnothing here"), None);
    }
}
