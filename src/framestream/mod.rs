//! The Frame Streams wire codec (spec.md §4.D), the transport dnstap rides
//! on. Grounded on the public Frame Streams protocol
//! (<https://github.com/farsightsec/fstrm>) since the teacher's stack has no
//! analog and the original collector delegates to an external
//! `go-framestream` library that isn't part of the kept source.
//!
//! Two frame kinds share one length-prefixed wire shape:
//! - a *data frame*: a 4-byte big-endian length (`> 0`) followed by that
//!   many payload bytes;
//! - a *control frame*, signalled by an "escape" length of `0x00000000`,
//!   followed by a 4-byte control-frame length and then the control frame
//!   itself (a 4-byte type plus zero or more TLV fields).

pub mod client;
pub mod server;

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{DcError, DcResult};

/// Deadline for the READY/ACCEPT/START handshake on either side (§4.D).
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Frame Streams caps a single frame at 1 MiB in `go-framestream`'s reader;
/// kept as a sane upper bound here too.
pub const MAX_FRAME_LEN: u32 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlType {
    Accept,
    Start,
    Stop,
    Finish,
    Ready,
}

impl ControlType {
    fn to_u32(self) -> u32 {
        match self {
            Self::Accept => 0x01,
            Self::Start => 0x02,
            Self::Stop => 0x03,
            Self::Finish => 0x04,
            Self::Ready => 0x05,
        }
    }

    fn from_u32(v: u32) -> DcResult<Self> {
        Ok(match v {
            0x01 => Self::Accept,
            0x02 => Self::Start,
            0x03 => Self::Stop,
            0x04 => Self::Finish,
            0x05 => Self::Ready,
            other => return Err(DcError::msg(format!("unknown control frame type {other}"))),
        })
    }
}

const FIELD_CONTENT_TYPE: u32 = 0x01;

#[derive(Debug, Clone, Default)]
pub struct ControlFrame {
    pub kind: Option<ControlType>,
    pub content_types: Vec<String>,
}

impl ControlFrame {
    fn new(kind: ControlType) -> Self {
        Self {
            kind: Some(kind),
            content_types: Vec::new(),
        }
    }

    fn with_content_type(kind: ControlType, content_type: impl Into<String>) -> Self {
        Self {
            kind: Some(kind),
            content_types: vec![content_type.into()],
        }
    }

    fn encode(&self) -> Vec<u8> {
        let kind = self.kind.expect("control frame must have a type to encode");
        let mut body = Vec::new();
        body.extend_from_slice(&kind.to_u32().to_be_bytes());
        for ct in &self.content_types {
            body.extend_from_slice(&FIELD_CONTENT_TYPE.to_be_bytes());
            body.extend_from_slice(&(ct.len() as u32).to_be_bytes());
            body.extend_from_slice(ct.as_bytes());
        }
        body
    }

    fn decode(buf: &[u8]) -> DcResult<Self> {
        if buf.len() < 4 {
            return Err(DcError::msg("control frame too short"));
        }
        let kind = ControlType::from_u32(u32::from_be_bytes(buf[0..4].try_into().unwrap()))?;
        let mut content_types = Vec::new();
        let mut pos = 4;
        while pos + 8 <= buf.len() {
            let field_type = u32::from_be_bytes(buf[pos..pos + 4].try_into().unwrap());
            let len = u32::from_be_bytes(buf[pos + 4..pos + 8].try_into().unwrap()) as usize;
            pos += 8;
            if pos + len > buf.len() {
                return Err(DcError::msg("control frame field length overruns frame"));
            }
            if field_type == FIELD_CONTENT_TYPE {
                let ct = String::from_utf8_lossy(&buf[pos..pos + len]).into_owned();
                content_types.push(ct);
            }
            pos += len;
        }
        Ok(Self {
            kind: Some(kind),
            content_types,
        })
    }
}

/// Writes one data frame (non-empty payload, escape-free).
pub async fn write_data_frame<W: AsyncWrite + Unpin>(w: &mut W, payload: &[u8]) -> DcResult<()> {
    if payload.is_empty() {
        return Err(DcError::msg("data frame payload must not be empty"));
    }
    w.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    w.write_all(payload).await?;
    Ok(())
}

async fn write_control_frame<W: AsyncWrite + Unpin>(w: &mut W, frame: &ControlFrame) -> DcResult<()> {
    let body = frame.encode();
    w.write_all(&0u32.to_be_bytes()).await?; // escape
    w.write_all(&(body.len() as u32).to_be_bytes()).await?;
    w.write_all(&body).await?;
    w.flush().await?;
    Ok(())
}

/// The next frame off the wire: either payload bytes or a parsed control
/// frame (the escape was consumed transparently).
pub enum Frame {
    Data(Vec<u8>),
    Control(ControlFrame),
}

async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> DcResult<Frame> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);

    if len == 0 {
        let mut clen_buf = [0u8; 4];
        r.read_exact(&mut clen_buf).await?;
        let clen = u32::from_be_bytes(clen_buf);
        if clen > MAX_FRAME_LEN {
            return Err(DcError::msg("control frame exceeds maximum length"));
        }
        let mut body = vec![0u8; clen as usize];
        r.read_exact(&mut body).await?;
        Ok(Frame::Control(ControlFrame::decode(&body)?))
    } else {
        if len > MAX_FRAME_LEN {
            return Err(DcError::msg("data frame exceeds maximum length"));
        }
        let mut body = vec![0u8; len as usize];
        r.read_exact(&mut body).await?;
        Ok(Frame::Data(body))
    }
}

async fn read_control_frame<R: AsyncRead + Unpin>(
    r: &mut R,
    expect: ControlType,
) -> DcResult<ControlFrame> {
    match read_frame(r).await? {
        Frame::Control(cf) if cf.kind == Some(expect) => Ok(cf),
        Frame::Control(cf) => Err(DcError::msg(format!(
            "expected {expect:?} control frame, got {:?}",
            cf.kind
        ))),
        Frame::Data(_) => Err(DcError::msg(format!("expected {expect:?} control frame, got data frame"))),
    }
}

async fn with_handshake_timeout<T>(
    fut: impl std::future::Future<Output = DcResult<T>>,
) -> DcResult<T> {
    tokio::time::timeout(HANDSHAKE_TIMEOUT, fut)
        .await
        .map_err(|_| DcError::msg("frame streams handshake timed out"))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_frame_round_trips_content_type() {
        let frame = ControlFrame::with_content_type(ControlType::Start, "protobuf:dnstap.Dnstap");
        let encoded = frame.encode();
        let decoded = ControlFrame::decode(&encoded).unwrap();
        assert_eq!(decoded.kind, Some(ControlType::Start));
        assert_eq!(decoded.content_types, vec!["protobuf:dnstap.Dnstap"]);
    }

    #[tokio::test]
    async fn data_frame_round_trips_over_an_in_memory_duplex() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        write_data_frame(&mut a, b"hello").await.unwrap();
        match read_frame(&mut b).await.unwrap() {
            Frame::Data(payload) => assert_eq!(payload, b"hello"),
            Frame::Control(_) => panic!("expected data frame"),
        }
    }

    #[tokio::test]
    async fn empty_payload_is_rejected() {
        let (mut a, _b) = tokio::io::duplex(64);
        assert!(write_data_frame(&mut a, &[]).await.is_err());
    }

    proptest::proptest! {
        #[test]
        fn data_frame_round_trips_any_payload_size(payload in proptest::collection::vec(proptest::prelude::any::<u8>(), 1..=65536)) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let (mut a, mut b) = tokio::io::duplex(1 << 20);
                write_data_frame(&mut a, &payload).await.unwrap();
                match read_frame(&mut b).await.unwrap() {
                    Frame::Data(got) => assert_eq!(got, payload),
                    Frame::Control(_) => panic!("expected data frame"),
                }
            });
        }
    }
}
