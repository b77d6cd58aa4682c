#[macro_export]
macro_rules! assert_next {
    ($stream: expr, None) => {
        let message = tokio_stream::StreamExt::next(&mut $stream).await;
        assert!(message.is_none(), "Expected end of stream, got: {message:?}")
    };
    ($stream: expr, $expected: expr) => {
        let message = tokio_stream::StreamExt::next(&mut $stream).await;
        if let Some(msg) = message {
            assert_eq!(msg, $expected)
        } else {
            panic!("Expected {:?}, got: {message:?}", $expected)
        }
    };
}

/// Awaits the next message and returns its items, panicking on anything else.
#[macro_export]
macro_rules! next_items {
    ($stream: expr) => {{
        match tokio_stream::StreamExt::next(&mut $stream).await {
            Some($crate::ScannerMessage::Data(items)) => items,
            other => panic!("Expected data message, got: {other:?}"),
        }
    }};
}

#[macro_export]
macro_rules! assert_empty {
    ($stream: expr) => {{
        let inner = $stream.into_inner();
        assert!(inner.is_empty(), "Stream should have no pending messages");
        tokio_stream::wrappers::ReceiverStream::new(inner)
    }};
}
