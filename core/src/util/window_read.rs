use std::pin::Pin;
use std::task::{Context, Poll};

use pin_project::pin_project;
use tokio::io::{AsyncRead, ReadBuf};

use super::window::Window;

/// Wrapper around an [`AsyncRead`]. Every byte read through it is also fed
/// into an internal [`Window`] so the exact input bytes can be extracted
/// again later by absolute position.
#[pin_project]
pub struct WindowRead<R> {
    #[pin]
    inner: R,
    window: Window,
}

impl<R: AsyncRead> AsyncRead for WindowRead<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.project();
        let old_len = buf.filled().len();
        let result = this.inner.poll_read(cx, buf);
        let new_len = buf.filled().len();
        this.window.extend(&buf.filled()[old_len..new_len]);
        result
    }
}

impl<R> WindowRead<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            window: Window::default(),
        }
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn window_mut(&mut self) -> &mut Window {
        &mut self.window
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use tokio::io::AsyncReadExt;

    use super::WindowRead;

    /// Read from a cursor and compare the full contents of the window
    #[tokio::test]
    async fn full() {
        let cursor = Cursor::new("Hello world!".to_string());
        let mut wr = WindowRead::new(cursor);

        let mut buf = Vec::new();
        wr.read_to_end(&mut buf).await.unwrap();

        let window_buf = wr.window().get_bytes(0..buf.len()).unwrap();
        assert_eq!(window_buf, buf);
    }

    /// Compare a range of bytes after advancing
    #[tokio::test]
    async fn range() {
        let cursor = Cursor::new("Hello world!".to_string());
        let mut wr = WindowRead::new(cursor);

        let mut buf = Vec::new();
        wr.read_to_end(&mut buf).await.unwrap();

        wr.window_mut().advance_to(6).unwrap();

        assert!(wr.window().get_bytes(0..4).is_err());
        assert_eq!(wr.window().get_bytes(6..11).unwrap(), b"world");
        assert_eq!(wr.window().get_bytes(11..12).unwrap(), b"!");
    }
}
