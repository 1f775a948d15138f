use crate::error::ProtocolError;
use crate::message::IrcMessage;
use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

/// Lines longer than this (without a terminator) are rejected.
pub const MAX_LINE_LEN: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Not currently inside a terminator sequence.
    None,
    /// Just saw a bare `\r`; waiting to see whether `\n` follows.
    SawCr,
}

/// Incremental IRC line decoder: `None -> InLine -> WaitLf -> None`.
///
/// Lines terminate on `\r\n` (preferred) or a bare `\n`; a bare `\r` not
/// followed by `\n` is a parse error. Once an error occurs the codec latches
/// permanently and every subsequent `decode` call returns the same error.
pub struct LineCodec {
    max_len: usize,
    next_index: usize,
    state: ScanState,
    latched: Option<ProtocolError>,
}

impl Default for LineCodec {
    fn default() -> Self {
        Self {
            max_len: MAX_LINE_LEN,
            next_index: 0,
            state: ScanState::None,
            latched: None,
        }
    }
}

impl LineCodec {
    pub fn new() -> Self {
        Self::default()
    }

    fn latch<T>(&mut self, err: ProtocolError) -> Result<T, ProtocolError> {
        self.latched = Some(err.clone());
        Err(err)
    }
}

impl Decoder for LineCodec {
    type Item = IrcMessage;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(err) = &self.latched {
            return Err(err.clone());
        }

        while self.next_index < src.len() {
            let byte = src[self.next_index];
            match self.state {
                ScanState::SawCr => {
                    if byte == b'\n' {
                        let line_end = self.next_index - 1;
                        let consumed = self.next_index + 1;
                        return self.emit(src, line_end, consumed);
                    }
                    return self.latch(ProtocolError::BareCarriageReturn);
                }
                ScanState::None => {
                    if byte == b'\r' {
                        self.state = ScanState::SawCr;
                        self.next_index += 1;
                    } else if byte == b'\n' {
                        let line_end = self.next_index;
                        let consumed = self.next_index + 1;
                        return self.emit(src, line_end, consumed);
                    } else {
                        self.next_index += 1;
                    }
                }
            }
        }

        if src.len() > self.max_len {
            return self.latch(ProtocolError::LineTooLong { max: self.max_len });
        }

        Ok(None)
    }
}

impl LineCodec {
    fn emit(
        &mut self,
        src: &mut BytesMut,
        line_end: usize,
        consumed: usize,
    ) -> Result<Option<IrcMessage>, ProtocolError> {
        let line_bytes = src.split_to(consumed);
        let line = &line_bytes[..line_end];
        self.next_index = 0;
        self.state = ScanState::None;

        if line.is_empty() {
            return Ok(None);
        }
        let line = String::from_utf8_lossy(line);
        match IrcMessage::parse(&line) {
            Ok(msg) => Ok(Some(msg)),
            Err(err) => self.latch(err),
        }
    }
}

impl Encoder<IrcMessage> for LineCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: IrcMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let encoded = item.encode();
        dst.reserve(encoded.len() + 2);
        dst.extend_from_slice(encoded.as_bytes());
        dst.extend_from_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_crlf_terminated_line() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"PING :13722\r\n"[..]);
        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg.command, "PING");
        assert!(buf.is_empty());
    }

    #[test]
    fn decodes_bare_lf_terminated_line() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"PING :13722\n"[..]);
        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg.command, "PING");
    }

    #[test]
    fn partial_line_yields_none() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"PING :137"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 9);
    }

    #[test]
    fn bare_cr_is_rejected_once_next_byte_known() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"PING :x\rY"[..]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert_eq!(err, ProtocolError::BareCarriageReturn);
        // latched: further decode calls keep failing
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn oversize_line_without_terminator_is_rejected() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(vec![b'a'; MAX_LINE_LEN + 1].as_slice());
        let err = codec.decode(&mut buf).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::LineTooLong {
                max: MAX_LINE_LEN
            }
        );
    }

    #[test]
    fn encode_appends_crlf() {
        let mut codec = LineCodec::new();
        let mut dst = BytesMut::new();
        codec
            .encode(IrcMessage::new("PONG", vec!["13722".to_string()]), &mut dst)
            .unwrap();
        assert_eq!(&dst[..], b"PONG :13722\r\n");
    }

    #[test]
    fn multiple_lines_decode_one_at_a_time() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"NICK a\r\nNICK b\r\n"[..]);
        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.params, vec!["a".to_string()]);
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(second.params, vec!["b".to_string()]);
        assert!(buf.is_empty());
    }
}
