//! Peer controller: owns the local publications and their listeners, talks to the
//! index, and multiplexes console input, accepted transfer sessions and the index socket.

use std::future::Future;
use std::net::{SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};

use peershare_core::protocol::{DeregisterRequest, RegisterRequest, SearchReply, SearchRequest};
use peershare_core::{Name, Pdu, PduType};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::console::{self, Command};
use crate::error::PeerError;
use crate::index_client::IndexClient;
use crate::transfer::{
    download_file_name, fetch_content, serve_session, Accepted, SessionError, TransferListener,
    TransferServer,
};

/// One content this peer serves.
struct Publication {
    content: Name,
    filename: PathBuf,
    server: TransferServer,
}

/// Outcome of one served transfer session.
pub struct TransferReport {
    pub content: Name,
    pub from: SocketAddr,
    pub result: Result<u64, SessionError>,
}

/// Outcome of a completed download, including the automatic re-registration.
#[derive(Debug)]
pub struct DownloadReport {
    pub source: SocketAddrV4,
    pub path: PathBuf,
    pub bytes: u64,
    /// Port now serving the downloaded copy, or why it could not be published.
    pub replication: Result<u16, PeerError>,
}

pub struct Controller {
    peer: Name,
    index: IndexClient,
    download_dir: PathBuf,
    publications: Vec<Publication>,
    accepted_tx: mpsc::UnboundedSender<Accepted>,
    accepted_rx: mpsc::UnboundedReceiver<Accepted>,
    workers: JoinSet<TransferReport>,
}

impl Controller {
    pub fn new(peer: Name, index: IndexClient, download_dir: PathBuf) -> Self {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        Self {
            peer,
            index,
            download_dir,
            publications: Vec::new(),
            accepted_tx,
            accepted_rx,
            workers: JoinSet::new(),
        }
    }

    pub fn peer(&self) -> &Name {
        &self.peer
    }

    fn publication(&self, content: &Name) -> Option<&Publication> {
        self.publications.iter().find(|p| p.content == *content)
    }

    /// Publish `filename` under `content`. Returns the transfer port on success.
    pub async fn register(&mut self, content: &str, filename: &Path) -> Result<u16, PeerError> {
        let content = Name::new(content)?;
        if self.publication(&content).is_some() {
            return Err(PeerError::AlreadyPublished(content));
        }
        tokio::fs::File::open(filename)
            .await
            .map_err(|source| PeerError::FileOpen {
                path: filename.to_path_buf(),
                source,
            })?;
        // Dropping `listener` on any error below releases the port.
        let listener = TransferListener::bind(content.clone())
            .await
            .map_err(PeerError::Listener)?;
        let port = listener.port();
        let ip = self.index.local_ip()?;
        let request = RegisterRequest {
            peer: self.peer.clone(),
            content: content.clone(),
            addr: SocketAddrV4::new(ip, port),
        };
        let reply = self.index.request(&request.encode()).await?;
        match reply.kind {
            PduType::Ack => {
                let server = listener.start(self.accepted_tx.clone());
                info!(
                    "registered '{}' from {} on {}:{}",
                    content,
                    filename.display(),
                    ip,
                    port
                );
                self.publications.push(Publication {
                    content,
                    filename: filename.to_path_buf(),
                    server,
                });
                Ok(port)
            }
            PduType::Error => Err(PeerError::Rejected(reply.text_payload())),
            other => Err(PeerError::InvalidReply(format!(
                "unexpected {:?} reply to registration",
                other
            ))),
        }
    }

    /// Find the least-used source of `content`, download it to `downloaded_<content>`
    /// in the download directory and publish the copy.
    pub async fn search_and_download(&mut self, content: &str) -> Result<DownloadReport, PeerError> {
        let content = Name::new(content)?;
        let reply = self
            .index
            .request(&SearchRequest {
                content: content.clone(),
            }
            .encode())
            .await?;
        if reply.kind == PduType::Error {
            return Err(PeerError::Rejected(reply.text_payload()));
        }
        let source = SearchReply::decode(&reply)?.addr;

        let path = self.download_dir.join(download_file_name(&content));
        let partial = self
            .download_dir
            .join(format!("{}.part", download_file_name(&content)));
        info!("downloading '{}' from {}", content, source);
        let fetched = self
            .pump_while(download(source, content.clone(), partial.clone()))
            .await;
        let bytes = match fetched {
            Ok(bytes) => bytes,
            Err(e) => {
                discard_partial(&partial).await;
                return Err(e);
            }
        };
        if let Err(e) = tokio::fs::rename(&partial, &path).await {
            discard_partial(&partial).await;
            return Err(e.into());
        }
        info!("downloaded '{}' ({} bytes) to {}", content, bytes, path.display());

        let replication = self.register(content.as_str(), &path).await;
        if let Err(e) = &replication {
            warn!("auto-registration of '{}' failed: {}", content, e);
        }
        Ok(DownloadReport {
            source,
            path,
            bytes,
            replication,
        })
    }

    /// The index's listing text, verbatim.
    pub async fn list_contents(&self) -> Result<String, PeerError> {
        let reply = self.index.request(&Pdu::empty(PduType::List)).await?;
        match reply.kind {
            PduType::List | PduType::Ack => Ok(reply.text_payload()),
            PduType::Error => Err(PeerError::Rejected(reply.text_payload())),
            other => Err(PeerError::InvalidReply(format!(
                "unexpected {:?} reply to list",
                other
            ))),
        }
    }

    /// Withdraw a local publication. The local record is kept if the index refuses.
    pub async fn deregister(&mut self, content: &str) -> Result<(), PeerError> {
        let content = Name::new(content)?;
        let pos = self
            .publications
            .iter()
            .position(|p| p.content == content)
            .ok_or_else(|| PeerError::NotPublished(content.clone()))?;
        let request = DeregisterRequest {
            peer: self.peer.clone(),
            content: content.clone(),
        };
        let reply = self.index.request(&request.encode()).await?;
        match reply.kind {
            PduType::Ack => {
                let publication = self.publications.remove(pos);
                info!(
                    "deregistered '{}' (listener on port {} closed)",
                    content,
                    publication.server.port()
                );
                Ok(())
            }
            PduType::Error => Err(PeerError::Rejected(reply.text_payload())),
            other => Err(PeerError::InvalidReply(format!(
                "unexpected {:?} reply to deregistration",
                other
            ))),
        }
    }

    /// Deregister every local publication in turn, then release whatever is left.
    pub async fn deregister_all(&mut self) -> Vec<(Name, Result<(), PeerError>)> {
        let contents: Vec<Name> = self.publications.iter().map(|p| p.content.clone()).collect();
        let mut results = Vec::with_capacity(contents.len());
        for content in contents {
            let result = self.deregister(content.as_str()).await;
            results.push((content, result));
        }
        self.publications.clear();
        results
    }

    /// Hand an accepted session to its own task.
    fn dispatch(&mut self, accepted: Accepted) {
        let Accepted {
            content,
            mut stream,
            from,
        } = accepted;
        let source = self.publication(&content).map(|p| p.filename.clone());
        let fallback = self.download_dir.join(download_file_name(&content));
        debug!("serving '{}' to {}", content, from);
        self.workers.spawn(async move {
            let result = serve_session(&mut stream, &content, source.as_deref(), &fallback).await;
            TransferReport {
                content,
                from,
                result,
            }
        });
    }

    fn reap(&mut self, joined: Result<TransferReport, JoinError>) {
        match joined {
            Ok(TransferReport {
                content,
                from,
                result: Ok(bytes),
            }) => info!("sent '{}' to {} ({} bytes)", content, from, bytes),
            Ok(TransferReport {
                content,
                from,
                result: Err(e),
            }) => warn!("transfer of '{}' to {} failed: {}", content, from, e),
            Err(e) => warn!("transfer worker ended abnormally: {}", e),
        }
    }

    /// Drive `fut` to completion while still serving accepted sessions.
    async fn pump_while<F: Future>(&mut self, fut: F) -> F::Output {
        tokio::pin!(fut);
        loop {
            tokio::select! {
                out = &mut fut => return out,
                Some(accepted) = self.accepted_rx.recv() => self.dispatch(accepted),
                Some(joined) = self.workers.join_next(), if !self.workers.is_empty() => self.reap(joined),
                _ = self.index.drain_unsolicited() => {}
            }
        }
    }

    /// Execute one console line. Returns false when the operator asked to quit.
    pub async fn handle_line(&mut self, line: &str) -> bool {
        let command = match console::parse(line) {
            None => return true,
            Some(Ok(command)) => command,
            Some(Err(message)) => {
                println!("{}", message);
                return true;
            }
        };
        match command {
            Command::Register { content, filename } => {
                match self.register(&content, Path::new(&filename)).await {
                    Ok(port) => println!("Registered '{}' (serving on port {})", content, port),
                    Err(e) => println!("Error: {}", e),
                }
            }
            Command::Download { content } => match self.search_and_download(&content).await {
                Ok(report) => {
                    println!(
                        "Downloaded '{}' from {} ({} bytes) to {}",
                        content,
                        report.source,
                        report.bytes,
                        report.path.display()
                    );
                    match report.replication {
                        Ok(port) => println!("Now serving '{}' on port {}", content, port),
                        Err(e) => println!("Auto-registration failed: {}", e),
                    }
                }
                Err(e) => println!("Error: {}", e),
            },
            Command::List => match self.list_contents().await {
                Ok(text) => println!("{}", text),
                Err(e) => println!("Error: {}", e),
            },
            Command::Deregister { content } => match self.deregister(&content).await {
                Ok(()) => println!("Deregistered '{}'", content),
                Err(e) => println!("Error: {}", e),
            },
            Command::Help => println!("{}", console::HELP),
            Command::Quit => return false,
        }
        true
    }

    /// Main loop: until `quit`, console EOF or `shutdown`, then deregister everything.
    pub async fn run(
        &mut self,
        mut console_rx: mpsc::Receiver<String>,
        shutdown: impl Future<Output = ()>,
    ) {
        tokio::pin!(shutdown);
        console::prompt();
        loop {
            tokio::select! {
                line = console_rx.recv() => match line {
                    Some(line) => {
                        if !self.handle_line(&line).await {
                            break;
                        }
                        console::prompt();
                    }
                    None => {
                        println!();
                        info!("console closed");
                        break;
                    }
                },
                Some(accepted) = self.accepted_rx.recv() => self.dispatch(accepted),
                Some(joined) = self.workers.join_next(), if !self.workers.is_empty() => self.reap(joined),
                _ = self.index.drain_unsolicited() => {}
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
            }
        }
        self.shutdown().await;
    }

    async fn shutdown(&mut self) {
        for (content, result) in self.deregister_all().await {
            match result {
                Ok(()) => println!("Deregistered '{}'", content),
                Err(e) => warn!("deregistering '{}' at shutdown failed: {}", content, e),
            }
        }
        if !self.workers.is_empty() {
            warn!("abandoning {} transfer(s) in progress", self.workers.len());
            self.workers.abort_all();
        }
    }
}

async fn download(source: SocketAddrV4, content: Name, partial: PathBuf) -> Result<u64, PeerError> {
    let mut stream = TcpStream::connect(source).await?;
    let mut file = tokio::fs::File::create(&partial).await?;
    fetch_content(&mut stream, &content, &mut file).await
}

async fn discard_partial(partial: &Path) {
    if let Err(e) = tokio::fs::remove_file(partial).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("could not remove {}: {}", partial.display(), e);
        }
    }
}
