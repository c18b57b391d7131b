//! `multipart/x-mixed-replace` stream built from periodic snapshots.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use futures_util::Stream;
use log::debug;

use crate::entity::CameraEntity;

pub const BOUNDARY: &str = "hikframe";

pub fn content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={BOUNDARY}")
}

/// One multipart part carrying a JPEG.
pub fn part(jpeg: &[u8]) -> Bytes {
    let head = format!(
        "--{BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        jpeg.len()
    );
    let mut buf = BytesMut::with_capacity(head.len() + jpeg.len() + 2);
    buf.put_slice(head.as_bytes());
    buf.put_slice(jpeg);
    buf.put_slice(b"\r\n");
    buf.freeze()
}

/// Snapshot every `interval` until a capture fails or the client goes away.
pub fn snapshot_stream(
    entity:   Arc<CameraEntity>,
    interval: Duration,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
    futures_util::stream::unfold((entity, true), move |(entity, first)| async move {
        if !first {
            tokio::time::sleep(interval).await;
        }
        match entity.camera_image(None, None).await {
            Some(jpeg) => Some((Ok(part(&jpeg)), (entity, false))),
            None => {
                debug!("{}: MJPEG stream ended", entity.name());
                None
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_layout() {
        let p = part(&[1, 2, 3]);
        assert_eq!(
            &p[..],
            b"--hikframe\r\nContent-Type: image/jpeg\r\nContent-Length: 3\r\n\r\n\x01\x02\x03\r\n"
        );
        assert_eq!(content_type(), "multipart/x-mixed-replace; boundary=hikframe");
    }
}
