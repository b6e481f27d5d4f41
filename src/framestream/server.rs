//! Server-side (receiver) half of the handshake: READY -> ACCEPT/FINISH ->
//! START -> data frames -> STOP -> FINISH (§4.D).

use tokio::io::{AsyncRead, AsyncWrite};

use super::{
    read_control_frame, read_frame, with_handshake_timeout, write_control_frame, ControlFrame,
    ControlType, Frame,
};
use crate::error::{DcError, DcResult};

pub const DNSTAP_CONTENT_TYPE: &str = "protobuf:dnstap.Dnstap";

/// Performs the receiver-side handshake, rejecting any content type other
/// than `accepted`. On success the stream is positioned to read data
/// frames.
pub async fn accept_handshake<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    accepted: &str,
) -> DcResult<()> {
    with_handshake_timeout(async {
        let ready = read_control_frame(stream, ControlType::Ready).await?;
        if !ready.content_types.iter().any(|ct| ct == accepted) {
            write_control_frame(stream, &ControlFrame::new(ControlType::Finish)).await?;
            return Err(DcError::msg(format!(
                "peer offered unsupported content types: {:?}",
                ready.content_types
            )));
        }

        write_control_frame(
            stream,
            &ControlFrame::with_content_type(ControlType::Accept, accepted),
        )
        .await?;

        let start = read_control_frame(stream, ControlType::Start).await?;
        if !start.content_types.iter().any(|ct| ct == accepted) {
            return Err(DcError::msg("START content type mismatch"));
        }

        Ok(())
    })
    .await
}

/// Reads the next data frame, or `None` once the peer sends STOP (at which
/// point FINISH has already been written back and the connection should be
/// closed).
pub async fn next_frame<S: AsyncRead + AsyncWrite + Unpin>(stream: &mut S) -> DcResult<Option<Vec<u8>>> {
    match read_frame(stream).await? {
        Frame::Data(payload) => Ok(Some(payload)),
        Frame::Control(cf) if cf.kind == Some(ControlType::Stop) => {
            write_control_frame(stream, &ControlFrame::new(ControlType::Finish)).await?;
            Ok(None)
        }
        Frame::Control(cf) => Err(DcError::msg(format!(
            "unexpected control frame in data phase: {:?}",
            cf.kind
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framestream::client;

    #[tokio::test]
    async fn handshake_then_single_frame_round_trips() {
        let (mut server_side, mut client_side) = tokio::io::duplex(8192);

        let server = tokio::spawn(async move {
            accept_handshake(&mut server_side, DNSTAP_CONTENT_TYPE).await.unwrap();
            let frame = next_frame(&mut server_side).await.unwrap();
            assert_eq!(frame, Some(b"payload".to_vec()));
            assert_eq!(next_frame(&mut server_side).await.unwrap(), None);
        });

        client::connect_handshake(&mut client_side, DNSTAP_CONTENT_TYPE)
            .await
            .unwrap();
        client::send_frame(&mut client_side, b"payload").await.unwrap();
        client::send_stop(&mut client_side).await.unwrap();

        server.await.unwrap();
    }
}
