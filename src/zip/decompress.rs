//! Raw deflate decoding as an async stream stage.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use flate2::{Decompress, FlushDecompress, Status};
use tokio::io::{AsyncRead, ReadBuf};

use crate::io::RangeStream;

const INPUT_BUFFER_SIZE: usize = 32 * 1024;

/// Turns a stream of compressed bytes into a stream of plain bytes.
///
/// Only entries with compression method 8 are routed through the
/// decompressor. Errors must surface as stream read errors.
pub trait Decompressor: Send + Sync {
    fn decompress(&self, input: RangeStream) -> RangeStream;
}

impl<F> Decompressor for F
where
    F: Fn(RangeStream) -> RangeStream + Send + Sync,
{
    fn decompress(&self, input: RangeStream) -> RangeStream {
        self(input)
    }
}

/// Raw DEFLATE (RFC 1951, no zlib header) via `flate2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawDeflate;

impl Decompressor for RawDeflate {
    fn decompress(&self, input: RangeStream) -> RangeStream {
        Box::pin(Inflate::new(input))
    }
}

/// Streaming inflater over any `AsyncRead`.
///
/// Malformed input is reported as `InvalidData`; running out of input
/// before the final block is `UnexpectedEof`.
pub struct Inflate<R> {
    inner: R,
    state: Decompress,
    input: Box<[u8]>,
    pos: usize,
    len: usize,
    input_done: bool,
    finished: bool,
}

impl<R> Inflate<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            state: Decompress::new(false),
            input: vec![0u8; INPUT_BUFFER_SIZE].into_boxed_slice(),
            pos: 0,
            len: 0,
            input_done: false,
            finished: false,
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for Inflate<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.finished || buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        loop {
            if this.pos == this.len && !this.input_done {
                this.pos = 0;
                this.len = 0;
                let mut input = ReadBuf::new(&mut this.input);
                ready!(Pin::new(&mut this.inner).poll_read(cx, &mut input))?;
                this.len = input.filled().len();
                if this.len == 0 {
                    this.input_done = true;
                }
            }

            let before_in = this.state.total_in();
            let before_out = this.state.total_out();
            let flush = if this.input_done {
                FlushDecompress::Finish
            } else {
                FlushDecompress::None
            };
            let status = this
                .state
                .decompress(&this.input[this.pos..this.len], buf.initialize_unfilled(), flush)
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
            let consumed = (this.state.total_in() - before_in) as usize;
            let produced = (this.state.total_out() - before_out) as usize;
            this.pos += consumed;
            buf.advance(produced);

            if status == Status::StreamEnd {
                this.finished = true;
                return Poll::Ready(Ok(()));
            }
            if produced > 0 {
                return Poll::Ready(Ok(()));
            }
            if this.input_done && consumed == 0 {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "unexpected end of deflate stream",
                )));
            }
            if consumed == 0 && this.pos < this.len {
                if this.pos == 0 && this.len == this.input.len() {
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "deflate decoder made no progress",
                    )));
                }
                // the decoder wants more than the buffered tail; keep it and refill
                this.input.copy_within(this.pos..this.len, 0);
                this.len -= this.pos;
                this.pos = 0;
                let mut input = ReadBuf::new(&mut this.input[this.len..]);
                ready!(Pin::new(&mut this.inner).poll_read(cx, &mut input))?;
                let n = input.filled().len();
                if n == 0 {
                    this.input_done = true;
                }
                this.len += n;
            }
        }
    }
}
