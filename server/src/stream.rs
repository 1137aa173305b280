//! multipart/x-mixed-replace framing and per-client pacing.

use bytes::{BufMut, Bytes, BytesMut};
use futures_util::Stream;
use std::convert::Infallible;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::preview::PreviewReader;
use crate::state::PipelineStats;

pub const BOUNDARY: &str = "boundarydonotcross";
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=boundarydonotcross";
pub const CACHE_CONTROL: &str =
    "no-store, no-cache, must-revalidate, pre-check=0, post-check=0, max-age=0";
pub const EXPIRES: &str = "Mon, 3 Jan 2000 12:34:56 GMT";

/// One part of the multipart body:
///
/// ```text
/// --boundarydonotcross\r\n
/// Content-Type: image/jpeg\r\n
/// Content-Length: <n>\r\n
/// \r\n
/// <n bytes>\r\n
/// ```
pub fn encode_part(jpeg: &[u8]) -> Bytes {
    let header = format!(
        "--{BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        jpeg.len()
    );
    let mut part = BytesMut::with_capacity(header.len() + jpeg.len() + 2);
    part.put_slice(header.as_bytes());
    part.put_slice(jpeg);
    part.put_slice(b"\r\n");
    part.freeze()
}

/// A single client's view of the preview.
///
/// The session is `Streaming` while it exists. Dropping it (client went
/// away, write failed, or the server is shutting down) is the only way to
/// `Closed`.
pub struct StreamSession {
    id: u64,
    preview: PreviewReader,
    pacing: Duration,
    last_served: Option<Instant>,
    last_sequence: u64,
    frames_served: u64,
    stats: Arc<PipelineStats>,
}

impl StreamSession {
    pub fn new(preview: PreviewReader, pacing: Duration, stats: Arc<PipelineStats>) -> Self {
        let id = stats.next_session_id();
        let active = stats.active_sessions.fetch_add(1, Ordering::Relaxed) + 1;
        info!(session = id, active, "preview session opened");
        Self {
            id,
            preview,
            pacing,
            last_served: None,
            last_sequence: 0,
            frames_served: 0,
            stats,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn frames_served(&self) -> u64 {
        self.frames_served
    }

    /// Sequence of the frame most recently handed out, 0 before the first.
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Wait until the next part may be sent and return it.
    ///
    /// Consecutive parts are at least one pacing interval apart. While
    /// nothing has been published the session polls once per interval.
    pub async fn next_part(&mut self) -> Bytes {
        loop {
            if let Some(last) = self.last_served {
                let due = last + self.pacing;
                if Instant::now() < due {
                    tokio::time::sleep_until(due).await;
                }
            }

            let snapshot = self.preview.read();
            let Some(frame) = snapshot.frame else {
                debug!(session = self.id, "no frame published yet");
                tokio::time::sleep(self.pacing).await;
                continue;
            };

            self.last_sequence = snapshot.sequence;
            self.frames_served += 1;
            self.last_served = Some(Instant::now());
            return encode_part(&frame.jpeg());
        }
    }

    /// Endless body stream for the HTTP response.
    pub fn into_body_stream(self) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
        futures_util::stream::unfold(self, |mut session| async move {
            let part = session.next_part().await;
            Some((Ok::<_, Infallible>(part), session))
        })
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        let active = self.stats.active_sessions.fetch_sub(1, Ordering::Relaxed) - 1;
        info!(
            session = self.id,
            frames = self.frames_served,
            last_sequence = self.last_sequence,
            active,
            "preview session closed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preview::{self, PreviewFrame};
    use futures_util::StreamExt;
    use motion_preview_common::frame::Frame;

    fn preview_frame(jpeg: &'static [u8]) -> PreviewFrame {
        PreviewFrame::new(Frame::solid_bgr(4, 4, [0, 0, 0]), Bytes::from_static(jpeg), false)
    }

    #[test]
    fn part_layout() {
        let part = encode_part(b"\xFF\xD8ab\xFF\xD9");
        assert_eq!(
            &part[..],
            &b"--boundarydonotcross\r\nContent-Type: image/jpeg\r\nContent-Length: 6\r\n\r\n\xFF\xD8ab\xFF\xD9\r\n"[..]
        );
        assert!(CONTENT_TYPE.ends_with(BOUNDARY));
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_first_publish() {
        let (publisher, reader) = preview::channel();
        let stats = Arc::new(PipelineStats::default());
        let mut session = StreamSession::new(reader, Duration::from_millis(100), Arc::clone(&stats));
        assert_eq!(stats.active_sessions.load(Ordering::Relaxed), 1);

        let start = Instant::now();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            publisher.publish(preview_frame(b"first"));
            publisher
        });

        let part = session.next_part().await;
        assert!(start.elapsed() >= Duration::from_millis(250));
        assert_eq!(part, encode_part(b"first"));
        assert_eq!(session.last_sequence(), 1);
        writer.await.unwrap();

        drop(session);
        assert_eq!(stats.active_sessions.load(Ordering::Relaxed), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn parts_are_paced() {
        let pacing = Duration::from_millis(100);
        let (publisher, reader) = preview::channel();
        publisher.publish(preview_frame(b"jpeg"));
        let writer = tokio::spawn(async move {
            loop {
                tokio::time::sleep(pacing / 2).await;
                publisher.publish(preview_frame(b"jpeg"));
            }
        });

        let mut session = StreamSession::new(reader, pacing, Arc::new(PipelineStats::default()));
        let mut last_at = None;
        let mut last_seq = 0;
        for _ in 0..5 {
            session.next_part().await;
            let now = Instant::now();
            if let Some(prev) = last_at {
                assert!(now - prev >= pacing, "served after {:?}", now - prev);
            }
            assert!(session.last_sequence() >= last_seq);
            last_seq = session.last_sequence();
            last_at = Some(now);
        }
        assert_eq!(session.frames_served(), 5);
        writer.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn sessions_are_independent() {
        let (publisher, reader) = preview::channel();
        publisher.publish(preview_frame(b"shared"));
        let stats = Arc::new(PipelineStats::default());

        let a = StreamSession::new(reader.clone(), Duration::from_millis(100), Arc::clone(&stats));
        let b = StreamSession::new(reader, Duration::from_millis(100), Arc::clone(&stats));
        assert_ne!(a.id(), b.id());
        assert_eq!(stats.active_sessions.load(Ordering::Relaxed), 2);

        let mut a = Box::pin(a.into_body_stream());
        let mut b = Box::pin(b.into_body_stream());
        let from_a = a.next().await.unwrap().unwrap();
        let from_b = b.next().await.unwrap().unwrap();
        assert_eq!(from_a, from_b);

        drop(a);
        assert_eq!(stats.active_sessions.load(Ordering::Relaxed), 1);
        drop(b);
        assert_eq!(stats.active_sessions.load(Ordering::Relaxed), 0);
    }
}
