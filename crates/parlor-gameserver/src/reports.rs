//! Carrying process reports back to the supervisor.

use parlor_protocol::{Codec, JsonCodec, ProcessReport};
use parlor_transport::{FrameConfig, FrameWriter};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;

use crate::GameServerError;

/// Writes every report as one frame on `out` until the channel closes,
/// then shuts `out` down.
///
/// A game-server binary points this at its stdout, which the
/// supervisor's `CommandLauncher` reads.
pub async fn forward_reports<W: AsyncWrite + Unpin>(
    mut reports: mpsc::UnboundedReceiver<ProcessReport>,
    out: W,
    config: FrameConfig,
) -> Result<(), GameServerError> {
    let mut writer = FrameWriter::new(out, config);
    while let Some(report) = reports.recv().await {
        let bytes = JsonCodec.encode(&report)?;
        writer.write_frame(&bytes).await?;
    }
    writer.shutdown().await?;
    Ok(())
}
