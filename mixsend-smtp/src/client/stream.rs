use tokio::io::{AsyncRead, AsyncWrite};

/// A bidirectional byte stream an SMTP session can run over.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Type-erased stream, so direct and proxied connections share one client.
pub type BoxedStream = Box<dyn AsyncStream>;
