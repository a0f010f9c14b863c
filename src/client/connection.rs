// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Async I/O adapter around a [`Session`].
//!
//! The transport core is I/O-free; this adapter owns the socket halves
//! and does three things: the identification-string exchange that
//! precedes binary packets (RFC 4253 § 4.2), a read loop feeding
//! [`Session::on_bytes`], and draining the session's outbound queue
//! into the socket (notifying channels once it ran dry).

use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use bytes::{Buf, BytesMut};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::Mutex,
    time::timeout,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    cfg::config::Config,
    session::{Session, phases::Role},
};

/// Largest identification line we accept from a peer (RFC 4253 § 4.2:
/// 255 bytes including CR LF).
const MAX_IDENT_LINE: usize = 255;

/// One SSH connection: a session plus the socket halves that drive it.
pub struct TransportConnection<R, W> {
    reader: Mutex<R>,
    writer: Mutex<W>,
    /// The transport session.  Hosts lock it to stage payloads,
    /// register handlers and inspect state.
    pub session: Mutex<Session>,
    cfg: Config,
    /// Hard stop: read and write paths abort immediately.
    cancel: CancellationToken,
}

impl TransportConnection<OwnedReadHalf, OwnedWriteHalf> {
    /// Connect over TCP and wrap the stream.  The identification
    /// exchange is a separate step so callers can interleave their own
    /// setup.
    pub async fn connect(
        addr: &str,
        role: Role,
        cfg: Config,
        cancel: CancellationToken,
    ) -> Result<Arc<Self>> {
        let stream = timeout(cfg.connect_timeout(), TcpStream::connect(addr))
            .await
            .map_err(|_| anyhow!("connect timeout to {addr}"))?
            .with_context(|| format!("failed to connect to {addr}"))?;
        stream.set_nodelay(cfg.runtime.nodelay.into())?;

        let (r, w) = stream.into_split();
        Ok(Self::from_split(r, w, role, cfg, cancel))
    }
}

impl<R, W> TransportConnection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Wrap already-split stream halves (also used by the loopback
    /// tests over an in-memory duplex).
    pub fn from_split(
        r: R,
        w: W,
        role: Role,
        cfg: Config,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        let mut session = Session::new(role);
        session.set_max_packet_len(cfg.transport.max_packet_len);
        Arc::new(Self {
            reader: Mutex::new(r),
            writer: Mutex::new(w),
            session: Mutex::new(session),
            cfg,
            cancel,
        })
    }

    #[inline]
    pub fn cancel_now(&self) {
        self.cancel.cancel();
    }

    /// Race one I/O future against the connection deadline and the
    /// hard-cancel token.  Cancellation wins over a simultaneous
    /// completion so a killed connection never reports progress.
    async fn timed<T, F>(&self, what: &'static str, io: F) -> Result<T>
    where
        F: Future<Output = std::io::Result<T>>,
    {
        let deadline = tokio::time::sleep(self.cfg.io_timeout());
        tokio::pin!(deadline);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => bail!("cancelled during {what}"),
            () = &mut deadline => {
                bail!("{what} took longer than {:?}", self.cfg.io_timeout())
            },
            res = io => res.with_context(|| what),
        }
    }

    /// Send our identification string and read the peer's.  Lines
    /// before the `SSH-` one (server banners) are skipped.  Returns
    /// the peer's identification line without CR LF.
    pub async fn exchange_identification(&self) -> Result<String> {
        {
            let mut w = self.writer.lock().await;
            let line = format!("{}\r\n", self.cfg.runtime.identification);
            self.timed("write identification", w.write_all(line.as_bytes()))
                .await?;
        }

        let mut r = self.reader.lock().await;
        loop {
            let mut line = Vec::with_capacity(64);
            loop {
                let b = self.timed("read identification", r.read_u8()).await?;
                if b == b'\n' {
                    break;
                }
                line.push(b);
                if line.len() > MAX_IDENT_LINE {
                    bail!("peer identification line too long");
                }
            }
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line).into_owned();
            if line.starts_with("SSH-") {
                if !line.starts_with("SSH-2.0-") && !line.starts_with("SSH-1.99-")
                {
                    bail!("unsupported protocol version: {line}");
                }
                info!(peer = %line, "identification exchanged");
                return Ok(line);
            }
            debug!(banner = %line, "skipping pre-identification line");
        }
    }

    /// Pump loop: read socket bytes into the session, drain the
    /// outbound queue after every feed.  Returns on EOF, cancellation
    /// or a fatal transport condition.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let mut pending = BytesMut::with_capacity(16 * 1024);
        let mut scratch = vec![0u8; 16 * 1024];

        loop {
            self.flush_outbound().await?;

            let n = {
                let mut r = self.reader.lock().await;
                tokio::select! {
                    _ = self.cancel.cancelled() => bail!("cancelled"),
                    res = r.read(&mut scratch) => res.context("socket read")?,
                }
            };
            if n == 0 {
                info!("peer closed the connection");
                return Ok(());
            }
            pending.extend_from_slice(&scratch[..n]);

            let fed = {
                let mut s = self.session.lock().await;
                s.on_bytes(&pending)
            };
            match fed {
                Ok(consumed) => pending.advance(consumed),
                Err(e) => {
                    warn!(error = %e, "fatal transport condition");
                    // Best effort: a DISCONNECT queued by the session
                    // should still reach the peer.
                    self.flush_outbound().await.ok();
                    return Err(e.into());
                },
            }

            self.flush_outbound().await?;
        }
    }

    /// Write everything the packetizer queued; once the queue is
    /// empty, tell the channels the transport is writable again.
    async fn flush_outbound(&self) -> Result<()> {
        loop {
            let chunk: Vec<u8> = {
                let s = self.session.lock().await;
                if s.out_wire().is_empty() {
                    return Ok(());
                }
                s.out_wire().to_vec()
            };

            {
                let mut w = self.writer.lock().await;
                self.timed("write packet", w.write_all(&chunk)).await?;
            }

            let mut s = self.session.lock().await;
            s.consume_out_wire(chunk.len());
            s.on_writable();
        }
    }

    /// Half-close the write side after draining; irreversible.
    pub async fn half_close_writes(&self) -> Result<()> {
        let mut w = self.writer.lock().await;
        let _ = w.shutdown().await; // ignore errors if already closed
        Ok(())
    }
}
