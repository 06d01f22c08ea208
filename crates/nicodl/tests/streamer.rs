use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use nicodl_engine::{DownloadStreamer, NicoConfig, NicoError, create_client};
use tokio::io::AsyncWrite;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Sink that accepts `limit` bytes and then fails every write.
struct ShortSink {
    data: Vec<u8>,
    limit: usize,
}

impl AsyncWrite for ShortSink {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let room = self.limit - self.data.len();
        if room == 0 {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::StorageFull, "disk full")));
        }
        let n = room.min(buf.len());
        self.data.extend_from_slice(&buf[..n]);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

fn streamer() -> DownloadStreamer {
    let config = NicoConfig::default();
    DownloadStreamer::new(create_client(&config).unwrap(), &config)
}

#[tokio::test]
async fn request_without_token_has_no_auth_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/video.mp4"))
        .and(query_param_is_missing("ht2_nicovideo"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"abc".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let mut sink = Vec::new();
    let written = streamer()
        .stream(
            &format!("{}/video.mp4", server.uri()),
            None,
            &mut sink,
            1,
            |_| {},
        )
        .await
        .unwrap();
    assert_eq!(written, 3);
    assert_eq!(sink, b"abc");
}

#[tokio::test]
async fn token_is_appended_to_existing_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/video.mp4"))
        .and(query_param("e", "1"))
        .and(query_param("ht2_nicovideo", "6-abc_def"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
        .expect(1)
        .mount(&server)
        .await;

    let mut sink = Vec::new();
    let written = streamer()
        .stream(
            &format!("{}/video.mp4?e=1", server.uri()),
            Some("6-abc_def"),
            &mut sink,
            1024,
            |_| {},
        )
        .await
        .unwrap();
    assert_eq!(written, 4096);
}

#[tokio::test]
async fn failing_sink_keeps_partial_output() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/video.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 8192]))
        .mount(&server)
        .await;

    let mut sink = ShortSink {
        data: Vec::new(),
        limit: 3000,
    };
    let err = streamer()
        .stream(
            &format!("{}/video.mp4", server.uri()),
            Some("tok"),
            &mut sink,
            1024,
            |_| {},
        )
        .await
        .unwrap_err();

    assert!(matches!(err, NicoError::Transfer { .. }), "{err}");
    assert!(err.is_retryable());
    assert_eq!(sink.data.len(), 3000);
}

#[tokio::test]
async fn unreachable_host_is_a_transfer_error() {
    let mut sink = Vec::new();
    let err = streamer()
        .stream("http://127.0.0.1:1/video.mp4", None, &mut sink, 1024, |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, NicoError::Transfer { .. }));
}
