//! Peer-to-peer transfer over TCP: per-content listeners, the serving side of a
//! download session (D -> C* F | E), and the fetching side.

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use peershare_core::chunk::{self, ChunkOutcome, CHUNK_SIZE};
use peershare_core::protocol::DownloadRequest;
use peershare_core::wire::{stream_framing, StreamFraming};
use peershare_core::{Name, Pdu, PduType};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::PeerError;

pub const MSG_INVALID_REQUEST: &str = "Invalid download request";
pub const MSG_NOT_FOUND: &str = "Content not found";
pub const MSG_READ_ERROR: &str = "Read error";

/// Conventional local name of downloaded content; also the fallback source path.
pub fn download_file_name(content: &Name) -> String {
    format!("downloaded_{}", content)
}

/// A session accepted on some content's listener, handed to the controller.
pub struct Accepted {
    pub content: Name,
    pub stream: TcpStream,
    pub from: SocketAddr,
}

/// A bound listener that is not accepting yet. Dropping it closes the port at once.
pub struct TransferListener {
    content: Name,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TransferListener {
    /// Bind on an OS-assigned port.
    pub async fn bind(content: Name) -> io::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", 0)).await?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            content,
            listener,
            local_addr,
        })
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Start accepting, forwarding every session to `accepted_tx`.
    pub fn start(self, accepted_tx: mpsc::UnboundedSender<Accepted>) -> TransferServer {
        let Self {
            content,
            listener,
            local_addr,
        } = self;
        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, from)) => {
                        debug!("accepted {} for '{}'", from, content);
                        let accepted = Accepted {
                            content: content.clone(),
                            stream,
                            from,
                        };
                        if accepted_tx.send(accepted).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("accept on listener for '{}' failed: {}", content, e);
                        break;
                    }
                }
            }
        });
        TransferServer {
            local_addr,
            accept_task,
        }
    }
}

/// Accepting endpoint for one published content. Dropping it closes the listener.
pub struct TransferServer {
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl TransferServer {
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }
}

impl Drop for TransferServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

/// Why a serving session ended without sending the whole content.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid download request")]
    InvalidRequest,
    #[error("content '{0}' not served here")]
    NotFound(String),
    #[error("cannot open '{}' for content '{content}': {source}", .path.display())]
    Open {
        path: PathBuf,
        content: Name,
        source: io::Error,
    },
    #[error("read error after {sent} bytes: {source}")]
    Read { sent: u64, source: io::Error },
}

/// Read one PDU from a transfer session using the stream framing rules.
/// `Ok(None)` on a clean close before any tag byte.
pub async fn read_pdu<R: AsyncRead + Unpin>(r: &mut R) -> io::Result<Option<Pdu>> {
    let mut tag = [0u8; 1];
    if r.read(&mut tag).await? == 0 {
        return Ok(None);
    }
    let kind = PduType::from_tag(tag[0]);
    let payload = match stream_framing(kind) {
        Some(StreamFraming::Exact(n)) => {
            let mut buf = BytesMut::zeroed(n);
            r.read_exact(&mut buf).await?;
            buf
        }
        Some(StreamFraming::UntilClose(max)) => {
            let mut buf = Vec::with_capacity(max);
            (&mut *r).take(max as u64).read_to_end(&mut buf).await?;
            BytesMut::from(&buf[..])
        }
        None => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected {:?} PDU on transfer session", kind),
            ))
        }
    };
    Ok(Some(Pdu {
        kind,
        payload: payload.freeze(),
    }))
}

/// Fill `buf` from `r`, stopping early only at EOF.
async fn read_chunk<R: AsyncRead + Unpin>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

async fn send_error<W: AsyncWrite + Unpin>(w: &mut W, message: &str) {
    if let Err(e) = w.write_all(&Pdu::error(message).encode()).await {
        debug!("could not send error '{}': {}", message, e);
    }
    let _ = w.shutdown().await;
}

/// Stream `source` as C* F chunks. Returns the number of content bytes sent.
/// A read failure sends `E "Read error"` and no final chunk.
pub async fn stream_content<R, W>(source: &mut R, w: &mut W) -> Result<u64, SessionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; CHUNK_SIZE];
    let mut sent = 0u64;
    loop {
        let n = match read_chunk(source, &mut buf).await {
            Ok(n) => n,
            Err(source) => {
                send_error(w, MSG_READ_ERROR).await;
                return Err(SessionError::Read { sent, source });
            }
        };
        let pdu = chunk::chunk_pdu(&buf[..n]);
        w.write_all(&pdu.encode()).await?;
        sent += n as u64;
        if pdu.kind == PduType::Final {
            break;
        }
    }
    w.flush().await?;
    w.shutdown().await?;
    Ok(sent)
}

/// Serve one download session for the listener's `content`. `source` is the
/// published file (if the content is still published); `fallback` is tried when it
/// cannot be opened.
pub async fn serve_session<S>(
    stream: &mut S,
    content: &Name,
    source: Option<&Path>,
    fallback: &Path,
) -> Result<u64, SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = match read_pdu(stream).await {
        Ok(Some(pdu)) if pdu.kind == PduType::Download => DownloadRequest::decode(&pdu).ok(),
        _ => None,
    };
    let request = match request {
        Some(r) => r,
        None => {
            send_error(stream, MSG_INVALID_REQUEST).await;
            return Err(SessionError::InvalidRequest);
        }
    };
    let path = match source {
        Some(path) if request.content == *content => path,
        _ => {
            send_error(stream, MSG_NOT_FOUND).await;
            return Err(SessionError::NotFound(request.content.to_string()));
        }
    };
    let mut file = match tokio::fs::File::open(path).await {
        Ok(f) => f,
        Err(primary) => {
            debug!("open {} failed ({}), trying {}", path.display(), primary, fallback.display());
            match tokio::fs::File::open(fallback).await {
                Ok(f) => f,
                Err(source) => {
                    let message = format!(
                        "Cannot open file '{}' for content '{}'",
                        path.display(),
                        content
                    );
                    send_error(stream, &message).await;
                    return Err(SessionError::Open {
                        path: path.to_path_buf(),
                        content: content.clone(),
                        source,
                    });
                }
            }
        }
    };
    stream_content(&mut file, stream).await
}

/// Send a download request for `content` and write the received chunks to `out`
/// until the final chunk. Returns the byte count. A remote `E` aborts with its message.
pub async fn fetch_content<S, W>(stream: &mut S, content: &Name, out: &mut W) -> Result<u64, PeerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    W: AsyncWrite + Unpin,
{
    let request = DownloadRequest {
        content: content.clone(),
    };
    stream.write_all(&request.encode().encode()).await?;
    stream.flush().await?;

    let mut total = 0u64;
    loop {
        let pdu = read_pdu(stream).await?.ok_or(PeerError::Incomplete)?;
        match chunk::classify(&pdu) {
            ChunkOutcome::More => {
                out.write_all(&pdu.payload).await?;
                total += pdu.payload.len() as u64;
            }
            ChunkOutcome::Last => {
                out.write_all(&pdu.payload).await?;
                total += pdu.payload.len() as u64;
                out.flush().await?;
                return Ok(total);
            }
            ChunkOutcome::Aborted(message) => return Err(PeerError::TransferAborted(message)),
            ChunkOutcome::Unexpected(kind) => {
                return Err(PeerError::InvalidReply(format!(
                    "unexpected {:?} during transfer",
                    kind
                )))
            }
        }
    }
}
