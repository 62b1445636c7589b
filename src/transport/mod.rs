//! The framed TCP transport: converts a byte stream into a sequence of whole
//! JSON envelope documents and vice versa, performs in-band TLS upgrade
//! without reconnecting, and reports lifecycle events.

pub mod framing;
pub mod io_stream;
pub mod pem;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use http::Uri;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_rustls::{rustls, webpki, TlsConnector};
use tracing::{debug, error, warn};

use self::framing::FrameBuffer;
use self::io_stream::IoStream;
use crate::envelope::Envelope;
use crate::error::{LimeError, Result};
use crate::trace::{TraceDirection, TraceWriter};
use crate::wire;

/// The two encryption levels a transport can run at, per spec.md §4.B.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encryption {
    None,
    Tls,
}

/// A non-blocking observer of complete inbound envelopes.
///
/// Invoked on the transport's reader task; implementations must not block.
pub trait EnvelopeListener: Send + Sync {
    fn on_receive(&self, envelope: Envelope);
}

impl<F: Fn(Envelope) + Send + Sync> EnvelopeListener for F {
    fn on_receive(&self, envelope: Envelope) {
        self(envelope)
    }
}

/// A non-blocking observer of transport lifecycle events.
pub trait StateListener: Send + Sync {
    fn on_closing(&self) {}
    fn on_closed(&self) {}
    fn on_exception(&self, error: &LimeError) {
        let _ = error;
    }
}

/// Configuration for the client TLS connector, grounded on the teacher's
/// `transport/client.rs` root-of-trust setup.
pub struct TlsSettings {
    pub config: rustls::ClientConfig,
}

impl Default for TlsSettings {
    fn default() -> Self {
        let mut config = rustls::ClientConfig::new();
        config
            .root_store
            .add_server_trust_anchors(&webpki_roots::TLS_SERVER_ROOTS);
        TlsSettings { config }
    }
}

impl TlsSettings {
    /// Add an additional explicitly-trusted certificate, bypassing the
    /// normal CA chain of trust. Only available when the crate is built
    /// with `allow_explicit_certificate_trust`, mirroring the teacher's
    /// release-build guard.
    #[cfg(feature = "allow_explicit_certificate_trust")]
    pub fn trust_explicit_certificate(&mut self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let cert = pem::read_single_certificate(path)
            .map_err(|e| LimeError::invalid_argument(format!("invalid trust certificate: {}", e)))?;
        self.config
            .root_store
            .add(&cert)
            .map_err(|e| LimeError::invalid_argument(format!("invalid trust certificate: {}", e)))?;
        Ok(())
    }
}

#[cfg(all(not(debug_assertions), feature = "allow_explicit_certificate_trust"))]
compile_error!(
    "crate cannot be built for release with the `allow_explicit_certificate_trust` feature enabled"
);

const DEFAULT_BUFFER_CAPACITY: usize = 8192;

struct UpgradeRequest {
    read_half_tx: oneshot::Sender<ReadHalf<IoStream>>,
    new_read_half_rx: oneshot::Receiver<ReadHalf<IoStream>>,
}

struct Shared {
    write_half: Mutex<Option<WriteHalf<IoStream>>>,
    upgrade_tx: Mutex<Option<mpsc::Sender<UpgradeRequest>>>,
    envelope_listener: Mutex<Option<Arc<dyn EnvelopeListener>>>,
    state_listener: Mutex<Option<Arc<dyn StateListener>>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    trace: Arc<dyn TraceWriter>,
    open: AtomicBool,
    closed: AtomicBool,
    encryption: Mutex<Encryption>,
    tls: TlsSettings,
    buffer_capacity: usize,
    host: Mutex<Option<webpki::DNSName>>,
}

/// The asynchronous duplex envelope stream over a TCP (or TLS-on-TCP)
/// connection.
pub struct Transport {
    shared: Arc<Shared>,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("open", &self.shared.open.load(Ordering::SeqCst))
            .finish()
    }
}

impl Transport {
    /// Create a new, unopened transport.
    pub fn new(trace: Arc<dyn TraceWriter>) -> Self {
        Self::with_capacity(trace, DEFAULT_BUFFER_CAPACITY, TlsSettings::default())
    }

    pub fn with_capacity(trace: Arc<dyn TraceWriter>, buffer_capacity: usize, tls: TlsSettings) -> Self {
        Transport {
            shared: Arc::new(Shared {
                write_half: Mutex::new(None),
                upgrade_tx: Mutex::new(None),
                envelope_listener: Mutex::new(None),
                state_listener: Mutex::new(None),
                reader_task: Mutex::new(None),
                trace,
                open: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                encryption: Mutex::new(Encryption::None),
                tls,
                buffer_capacity,
                host: Mutex::new(None),
            }),
        }
    }

    /// The encryption levels this transport can negotiate.
    pub fn get_supported_encryption() -> Vec<Encryption> {
        vec![Encryption::None, Encryption::Tls]
    }

    pub async fn set_envelope_listener(&self, listener: Option<Arc<dyn EnvelopeListener>>) {
        *self.shared.envelope_listener.lock().await = listener;
    }

    pub async fn set_state_listener(&self, listener: Option<Arc<dyn StateListener>>) {
        *self.shared.state_listener.lock().await = listener;
    }

    /// Connect to `uri` (scheme `net.tcp`) and start the background reader.
    pub async fn open(&self, uri: &str) -> Result<()> {
        if self.shared.open.swap(true, Ordering::SeqCst) {
            return Err(LimeError::invalid_state("transport is already open"));
        }

        let parsed: Uri = uri
            .parse()
            .map_err(|e| LimeError::invalid_argument(format!("invalid URI `{}`: {}", uri, e)))?;
        if parsed.scheme_str() != Some("net.tcp") {
            self.shared.open.store(false, Ordering::SeqCst);
            return Err(LimeError::invalid_argument(format!(
                "unsupported URI scheme, expected `net.tcp`: {}",
                uri
            )));
        }
        let host = parsed.host().ok_or_else(|| {
            self.shared.open.store(false, Ordering::SeqCst);
            LimeError::invalid_argument(format!("missing host in URI: {}", uri))
        })?;
        let port = parsed.port_u16().unwrap_or(55321);

        let stream = TcpStream::connect((host, port)).await.map_err(|e| {
            self.shared.open.store(false, Ordering::SeqCst);
            LimeError::Io(e)
        })?;
        let dns_name = webpki::DNSNameRef::try_from_ascii_str(host)
            .map_err(|e| LimeError::invalid_argument(format!("invalid hostname `{}`: {}", host, e)))?
            .to_owned();
        *self.shared.host.lock().await = Some(dns_name);

        let io: IoStream = stream.into();
        let (read_half, write_half) = tokio::io::split(io);
        *self.shared.write_half.lock().await = Some(write_half);

        let (upgrade_tx, upgrade_rx) = mpsc::channel(1);
        *self.shared.upgrade_tx.lock().await = Some(upgrade_tx);

        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(run_reader(shared, read_half, upgrade_rx));
        *self.shared.reader_task.lock().await = Some(handle);

        debug!(%uri, "transport opened");
        Ok(())
    }

    /// Serialize `envelope` to JSON and write it, flushing immediately.
    pub async fn send(&self, envelope: &Envelope) -> Result<()> {
        if !self.shared.open.load(Ordering::SeqCst) || self.shared.closed.load(Ordering::SeqCst) {
            return Err(LimeError::invalid_state("transport is not open"));
        }

        let json = wire::serialize(envelope)?;
        let mut guard = self.shared.write_half.lock().await;
        let write_half = guard
            .as_mut()
            .ok_or_else(|| LimeError::invalid_state("transport is not open"))?;
        let result = async {
            write_half.write_all(json.as_bytes()).await?;
            write_half.flush().await?;
            Ok::<(), std::io::Error>(())
        }
        .await;
        drop(guard);

        match result {
            Ok(()) => {
                self.shared.trace.trace(TraceDirection::Send, &json);
                Ok(())
            }
            Err(e) => {
                let error = LimeError::Io(e);
                self.fail(&error).await;
                Err(error)
            }
        }
    }

    /// Upgrade (or downgrade) the transport's encryption in-band, without
    /// reconnecting. Re-setting the current value is a no-op.
    pub async fn set_encryption(&self, encryption: Encryption) -> Result<()> {
        {
            let current = *self.shared.encryption.lock().await;
            if current == encryption {
                return Ok(());
            }
        }

        if encryption != Encryption::Tls {
            return Err(LimeError::invalid_argument(
                "only upgrading to tls is supported in-band",
            ));
        }

        let upgrade_tx = {
            let guard = self.shared.upgrade_tx.lock().await;
            guard
                .clone()
                .ok_or_else(|| LimeError::invalid_state("transport is not open"))?
        };

        let (read_half_tx, read_half_rx) = oneshot::channel();
        let (new_read_half_tx, new_read_half_rx) = oneshot::channel();
        upgrade_tx
            .send(UpgradeRequest {
                read_half_tx,
                new_read_half_rx,
            })
            .await
            .map_err(|_| LimeError::invalid_state("transport reader is not running"))?;

        let read_half = read_half_rx
            .await
            .map_err(|_| LimeError::invalid_state("transport reader did not yield control"))?;

        // Take the write half too so no send can race the handshake.
        let mut write_guard = self.shared.write_half.lock().await;
        let write_half = write_guard
            .take()
            .ok_or_else(|| LimeError::invalid_state("transport is not open"))?;

        let io = read_half.unsplit(write_half);
        let tcp = match io {
            IoStream::Tcp(tcp) => tcp,
            IoStream::Tls(_) => {
                // Already upgraded by a racing caller; nothing to do.
                return Ok(());
            }
        };

        let host = self
            .shared
            .host
            .lock()
            .await
            .clone()
            .ok_or_else(|| LimeError::invalid_state("transport is not open"))?;
        let connector = TlsConnector::from(Arc::new(self.shared.tls.config.clone()));
        let tls_stream = connector.connect(host.as_ref(), tcp).await.map_err(|e| {
            LimeError::Io(e)
        })?;

        let new_io: IoStream = tls_stream.into();
        let (new_read_half, new_write_half) = tokio::io::split(new_io);
        *write_guard = Some(new_write_half);
        drop(write_guard);

        new_read_half_tx
            .send(new_read_half)
            .map_err(|_| LimeError::invalid_state("transport reader stopped mid-upgrade"))?;

        *self.shared.encryption.lock().await = Encryption::Tls;
        debug!("transport upgraded to tls");
        Ok(())
    }

    /// Close the transport. Idempotent after the first call.
    pub async fn close(&self) -> Result<()> {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(listener) = self.shared.state_listener.lock().await.as_ref() {
            listener.on_closing();
        }

        *self.shared.upgrade_tx.lock().await = None;
        if let Some(mut write_half) = self.shared.write_half.lock().await.take() {
            let _ = write_half.shutdown().await;
        }

        if let Some(handle) = self.shared.reader_task.lock().await.take() {
            let _ = handle.await;
        }

        self.shared.open.store(false, Ordering::SeqCst);
        if let Some(listener) = self.shared.state_listener.lock().await.as_ref() {
            listener.on_closed();
        }
        Ok(())
    }

    async fn fail(&self, error: &LimeError) {
        error!(%error, "transport failed");
        if let Some(listener) = self.shared.state_listener.lock().await.as_ref() {
            listener.on_exception(error);
        }
        let _ = self.close().await;
    }

    /// Report `error` to the state listener without touching the socket or
    /// the reader task. Used by the channel to surface a rejected out-of-state
    /// dispatch; unlike [`Transport::fail`], the transport itself is healthy
    /// and keeps running.
    pub async fn notify_exception(&self, error: &LimeError) {
        if let Some(listener) = self.shared.state_listener.lock().await.as_ref() {
            listener.on_exception(error);
        }
    }
}

async fn run_reader(shared: Arc<Shared>, mut read_half: ReadHalf<IoStream>, mut upgrade_rx: mpsc::Receiver<UpgradeRequest>) {
    let mut buffer = FrameBuffer::new(shared.buffer_capacity);
    let mut scratch = vec![0u8; shared.buffer_capacity];

    loop {
        if let Err(error) = buffer.compact_or_overflow() {
            handle_terminal_error(&shared, error).await;
            return;
        }

        let write_slice_len = buffer.write_slice().len();
        scratch.resize(write_slice_len, 0);

        tokio::select! {
            biased;

            request = upgrade_rx.recv() => {
                match request {
                    Some(request) => {
                        if request.read_half_tx.send(read_half).is_err() {
                            return;
                        }
                        match request.new_read_half_rx.await {
                            Ok(new_half) => {
                                read_half = new_half;
                                continue;
                            }
                            Err(_) => return,
                        }
                    }
                    None => continue,
                }
            }

            result = read_half.read(&mut scratch) => {
                match result {
                    Ok(0) => {
                        debug!("transport reached end of stream");
                        return;
                    }
                    Ok(n) => {
                        buffer.write_slice()[..n].copy_from_slice(&scratch[..n]);
                        buffer.commit(n);
                        loop {
                            match buffer.next_envelope() {
                                Ok(Some(bytes)) => {
                                    match wire::deserialize(&bytes) {
                                        Ok(envelope) => {
                                            let json = String::from_utf8_lossy(&bytes);
                                            shared.trace.trace(TraceDirection::Receive, &json);
                                            if let Some(listener) = shared.envelope_listener.lock().await.as_ref() {
                                                listener.on_receive(envelope);
                                            }
                                        }
                                        Err(error) => {
                                            warn!(%error, "failed to parse envelope");
                                            handle_terminal_error(&shared, error).await;
                                            return;
                                        }
                                    }
                                }
                                Ok(None) => break,
                                Err(error) => {
                                    handle_terminal_error(&shared, error).await;
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        handle_terminal_error(&shared, LimeError::Io(e)).await;
                        return;
                    }
                }
            }
        }
    }
}

/// Reached on a reader-side io error, parse error, or buffer overflow. Closes
/// the socket itself (rather than delegating to [`Transport::close`], which
/// would `.await` this very reader task and deadlock), then reports the
/// failure in order: `onException`, then `onClosed`.
async fn handle_terminal_error(shared: &Arc<Shared>, error: LimeError) {
    error!(%error, "transport reader failed");

    shared.closed.store(true, Ordering::SeqCst);
    *shared.upgrade_tx.lock().await = None;
    if let Some(mut write_half) = shared.write_half.lock().await.take() {
        let _ = write_half.shutdown().await;
    }
    shared.open.store(false, Ordering::SeqCst);

    if let Some(listener) = shared.state_listener.lock().await.as_ref() {
        listener.on_exception(&error);
    }
    if let Some(listener) = shared.state_listener.lock().await.as_ref() {
        listener.on_closed();
    }
}
