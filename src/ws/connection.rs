//! WebSocket connection (C8): close handshake, ping/pong, fragmentation
//! reassembly, and RPC dispatch over Text frames.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use super::frame::{Frame, Opcode, WsFrameCodec};
use super::rpc::{MethodTable, SudaGureumRequest, SudaGureumResponse};
use crate::net::OrderedWriter;

const READ_CHUNK: usize = 8192;

pub struct WsConnection {
    writer: OrderedWriter,
    close_sent: Mutex<bool>,
    close_timer: Mutex<Option<JoinHandle<()>>>,
    read_handle: Mutex<Option<JoinHandle<()>>>,
    close_timeout: Duration,
    methods: MethodTable,
}

impl WsConnection {
    /// `leftover` is whatever bytes the HTTP parser had already buffered past
    /// the end of the Upgrade request when the handoff happened.
    pub fn spawn<T>(transport: T, leftover: BytesMut, close_timeout: Duration, methods: MethodTable) -> Arc<Self>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(transport);
        let writer = OrderedWriter::spawn(write_half);

        let conn = Arc::new(Self {
            writer,
            close_sent: Mutex::new(false),
            close_timer: Mutex::new(None),
            read_handle: Mutex::new(None),
            close_timeout,
            methods,
        });

        let read_conn = conn.clone();
        let handle = tokio::spawn(async move {
            read_conn.read_loop(read_half, leftover).await;
        });
        *conn.read_handle.lock() = Some(handle);

        conn
    }

    async fn read_loop<R: AsyncRead + Unpin>(self: &Arc<Self>, mut read_half: R, mut buf: BytesMut) {
        let mut codec = WsFrameCodec::new();
        let mut reassembly: Option<(Opcode, Vec<u8>)> = None;
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            loop {
                match codec.decode(&mut buf) {
                    Ok(Some(frame)) => self.handle_frame(frame, &mut reassembly).await,
                    Ok(None) => break,
                    Err(err) => {
                        warn!(error = %err, "websocket frame error, closing");
                        self.send_frame(Frame::new(true, Opcode::Close, Vec::new())).await;
                        self.force_close();
                        return;
                    }
                }
            }
            match read_half.read(&mut chunk).await {
                Ok(0) => {
                    self.force_close();
                    return;
                }
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                Err(err) => {
                    warn!(error = %err, "websocket read error");
                    self.force_close();
                    return;
                }
            }
        }
    }

    async fn handle_frame(self: &Arc<Self>, frame: Frame, reassembly: &mut Option<(Opcode, Vec<u8>)>) {
        match frame.opcode {
            Opcode::Close => self.handle_close(frame.payload).await,
            Opcode::Ping => self.send_frame(Frame::new(true, Opcode::Pong, frame.payload)).await,
            Opcode::Pong => {}
            Opcode::Text | Opcode::Binary => {
                if frame.fin {
                    self.handle_message(frame.opcode, frame.payload).await;
                } else {
                    *reassembly = Some((frame.opcode, frame.payload));
                }
            }
            Opcode::Continuation => {
                let Some((opcode, mut payload)) = reassembly.take() else {
                    warn!("continuation frame with no fragmented message in progress");
                    return;
                };
                payload.extend_from_slice(&frame.payload);
                if frame.fin {
                    self.handle_message(opcode, payload).await;
                } else {
                    *reassembly = Some((opcode, payload));
                }
            }
        }
    }

    async fn handle_message(&self, opcode: Opcode, payload: Vec<u8>) {
        if opcode != Opcode::Text {
            return;
        }
        let text = String::from_utf8_lossy(&payload);
        let response = match SudaGureumRequest::parse(&text) {
            Ok(request) => self.methods.dispatch(&request),
            Err(err) => SudaGureumResponse::error(0, err.to_string()),
        };
        self.send_frame(Frame::new(true, Opcode::Text, response.encode().into_bytes()))
            .await;
    }

    async fn handle_close(self: &Arc<Self>, payload: Vec<u8>) {
        let already_sent = *self.close_sent.lock();
        if already_sent {
            if let Some(handle) = self.close_timer.lock().take() {
                handle.abort();
            }
            self.force_close();
            return;
        }

        self.send_frame(Frame::new(true, Opcode::Close, payload)).await;
        *self.close_sent.lock() = true;

        let timeout = self.close_timeout;
        let timer_conn = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            timer_conn.force_close();
        });
        *self.close_timer.lock() = Some(handle);
    }

    async fn send_frame(&self, frame: Frame) {
        let mut codec = WsFrameCodec::new();
        let mut dst = BytesMut::new();
        if codec.encode(frame, &mut dst).is_ok() {
            if let Err(err) = self.writer.enqueue(dst.to_vec()) {
                warn!(error = %err, "websocket write queue error");
            }
        }
    }

    fn force_close(&self) {
        if let Some(handle) = self.close_timer.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.read_handle.lock().take() {
            handle.abort();
        }
    }
}
