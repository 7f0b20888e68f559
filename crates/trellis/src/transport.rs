//! HTTP/1.1 response serialization over any [`AsyncWrite`].
//!
//! Bodies with a known length are written as is after the head, others are framed with
//! `Transfer-Encoding: chunked`.

use crate::body::ResponseBody;
use crate::error::SendError;
use crate::writer::Transport;
use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use http::response::Parts;
use http::{HeaderValue, Response, header};
use http_body_util::BodyExt;
use std::io::{self, Write};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

const INIT_HEAD_SIZE: usize = 1024;
const CHUNKED: HeaderValue = HeaderValue::from_static("chunked");

#[derive(Debug)]
pub struct IoTransport<W> {
    writer: W,
    buf: BytesMut,
}

impl<W> IoTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self { writer, buf: BytesMut::with_capacity(INIT_HEAD_SIZE) }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    async fn flush_buf(&mut self) -> io::Result<()> {
        let buf = self.buf.split().freeze();
        self.writer.write_all(&buf).await
    }
}

#[async_trait]
impl<W> Transport for IoTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write(&mut self, response: Response<ResponseBody>) -> Result<(), SendError> {
        let (mut parts, mut body) = response.into_parts();

        match body.exact_len() {
            Some(len) => {
                parts.headers.remove(header::TRANSFER_ENCODING);
                parts.headers.insert(header::CONTENT_LENGTH, len.into());
                encode_head(&parts, &mut self.buf)?;
                self.flush_buf().await?;

                if let Some(bytes) = body.as_bytes() {
                    self.writer.write_all(bytes).await?;
                }
                trace!(status = %parts.status, len, "fixed length response written");
            }
            None => {
                parts.headers.remove(header::CONTENT_LENGTH);
                parts.headers.insert(header::TRANSFER_ENCODING, CHUNKED);
                encode_head(&parts, &mut self.buf)?;
                self.flush_buf().await?;

                while let Some(frame) = body.frame().await {
                    let frame = frame.map_err(SendError::invalid_body)?;
                    let Ok(data) = frame.into_data() else {
                        // trailers are not sent
                        continue;
                    };
                    if data.is_empty() {
                        continue;
                    }

                    write!(Writer(&mut self.buf), "{:X}\r\n", data.len())?;
                    self.flush_buf().await?;
                    self.writer.write_all(&data).await?;
                    self.writer.write_all(b"\r\n").await?;
                }
                self.writer.write_all(b"0\r\n\r\n").await?;
                trace!(status = %parts.status, "chunked response written");
            }
        }

        self.writer.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SendError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

fn encode_head(parts: &Parts, dst: &mut BytesMut) -> Result<(), SendError> {
    write!(
        Writer(dst),
        "HTTP/1.1 {} {}\r\n",
        parts.status.as_str(),
        parts.status.canonical_reason().unwrap_or("Unknown")
    )?;

    for (name, value) in &parts.headers {
        dst.put_slice(name.as_str().as_bytes());
        dst.put_slice(b": ");
        dst.put_slice(value.as_bytes());
        dst.put_slice(b"\r\n");
    }
    dst.put_slice(b"\r\n");
    Ok(())
}

struct Writer<'a>(&'a mut BytesMut);

impl Write for Writer<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
