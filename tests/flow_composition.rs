mod common;

use common::{counted_upper, counter, fails_first, suffix};
use flowkit::{
    Cache, Context, Error, Fallback, Flow, Logging, RateLimit, ReaderInput, Retry, RetryConfig,
    Timeout, WriterOutput,
};
use std::time::Duration;

#[tokio::test]
async fn test_suffixes_follow_registration_order() {
    for k in 1..=6 {
        const TAGS: [&str; 6] = ["-a", "-b", "-c", "-d", "-e", "-f"];
        let flow = TAGS[..k]
            .iter()
            .fold(Flow::new(), |flow, tag| flow.use_handler(suffix(tag)));

        let mut out = String::new();
        flow.run(&Context::background(), "test", &mut out)
            .await
            .unwrap();
        assert_eq!(out, format!("test{}", TAGS[..k].concat()));
    }
}

#[tokio::test]
async fn test_empty_flow_returns_input() {
    let mut out = Vec::new();
    Flow::new()
        .run(&Context::background(), b"raw bytes".to_vec(), &mut out)
        .await
        .unwrap();
    assert_eq!(out, b"raw bytes");
}

#[tokio::test]
async fn test_reader_and_writer_boundaries() {
    let flow = Flow::new().use_handler(suffix("!"));
    let source: &'static [u8] = b"from a reader";
    let mut sink = WriterOutput(Vec::new());
    flow.run(&Context::background(), ReaderInput(source), &mut sink)
        .await
        .unwrap();
    assert_eq!(sink.into_inner(), b"from a reader!");
}

#[tokio::test]
async fn test_middleware_stack_in_one_flow() {
    let calls = counter();
    let flaky_calls = counter();

    let flow = Flow::new()
        .use_handler(Logging::new(suffix("-logged")))
        .use_handler(Cache::new(counted_upper(calls.clone()), Duration::from_secs(60)))
        .use_handler(RateLimit::new(suffix("-limited"), 100, Duration::from_secs(1)))
        .use_handler(Retry::with_config(
            fails_first(1, flaky_calls.clone()),
            RetryConfig::new(3).with_base_delay(Duration::from_millis(1)),
        ))
        .use_handler(Timeout::new(suffix("-timed"), Duration::from_secs(1)))
        .use_handler(Fallback::new().with_handler(suffix("-fallback")));

    for _ in 0..2 {
        let mut out = String::new();
        flow.run(&Context::background(), "in", &mut out)
            .await
            .unwrap();
        assert_eq!(out, "IN-LOGGED-limited-timed-fallback");
    }
    // the cache served the second run
    assert_eq!(common::count(&calls), 1);
    // one failure, then one success per run
    assert_eq!(common::count(&flaky_calls), 3);
}

#[tokio::test]
async fn test_timeout_inside_flow() {
    let slow = flowkit::handler_fn(|_ctx, _input, _output| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
    });
    let flow = Flow::new().use_handler(Timeout::new(slow, Duration::from_millis(20)));

    let mut out = String::new();
    let err = flow
        .run(&Context::background(), "x", &mut out)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DeadlineExceeded));
}

#[tokio::test]
async fn test_chunked_stream_source() {
    let chunks = vec!["stre", "amed ", "in chunks"]
        .into_iter()
        .map(|c| Ok::<_, std::io::Error>(bytes::Bytes::from_static(c.as_bytes())));
    let reader = tokio_util::io::StreamReader::new(tokio_stream::iter(chunks));

    let flow = Flow::new().use_handler(suffix("."));
    let mut out = String::new();
    flow.run(&Context::background(), ReaderInput(reader), &mut out)
        .await
        .unwrap();
    assert_eq!(out, "streamed in chunks.");
}

#[tokio::test]
async fn test_source_read_error_fails_the_run() {
    let source = tokio_test::io::Builder::new()
        .read(b"partial ")
        .read_error(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer went away"))
        .build();

    let flow = Flow::new().use_handler(suffix("!"));
    let mut out = String::new();
    let err = flow
        .run(&Context::background(), ReaderInput(source), &mut out)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Io(ref e) if e.kind() == std::io::ErrorKind::ConnectionReset));
}

#[tokio::test]
async fn test_output_written_to_mock_writer() {
    let sink = tokio_test::io::Builder::new().write(b"abc-done").build();
    let flow = Flow::new().use_handler(suffix("-done"));
    let mut out = WriterOutput(sink);
    flow.run(&Context::background(), "abc", &mut out)
        .await
        .unwrap();
}
