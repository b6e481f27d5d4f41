//! Client-side (sender) half of the handshake: READY -> ACCEPT -> START ->
//! data frames -> STOP -> FINISH (§4.D, §4.H).

use tokio::io::{AsyncRead, AsyncWrite};

use super::{
    read_control_frame, with_handshake_timeout, write_control_frame, write_data_frame,
    ControlFrame, ControlType,
};
use crate::error::{DcError, DcResult};

/// Performs the sender-side handshake, offering a single content type.
pub async fn connect_handshake<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    content_type: &str,
) -> DcResult<()> {
    with_handshake_timeout(async {
        write_control_frame(
            stream,
            &ControlFrame::with_content_type(ControlType::Ready, content_type),
        )
        .await?;

        let accept = read_control_frame(stream, ControlType::Accept).await?;
        if !accept.content_types.iter().any(|ct| ct == content_type) {
            return Err(DcError::msg("peer did not ACCEPT our content type"));
        }

        write_control_frame(
            stream,
            &ControlFrame::with_content_type(ControlType::Start, content_type),
        )
        .await?;

        Ok(())
    })
    .await
}

pub async fn send_frame<S: AsyncWrite + Unpin>(stream: &mut S, payload: &[u8]) -> DcResult<()> {
    write_data_frame(stream, payload).await
}

pub async fn send_stop<S: AsyncWrite + Unpin>(stream: &mut S) -> DcResult<()> {
    write_control_frame(stream, &ControlFrame::new(ControlType::Stop)).await
}
