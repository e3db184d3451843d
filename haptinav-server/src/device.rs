//! Link to the haptic device
//!
//! [`DeviceLink`] is the only writer to the device. Everything that wants to
//! reach the device goes through a [`DeviceHandle`], so messages leave in the
//! order they were queued and never interleave on the wire.
//!
//! While the device is unreachable queued messages are dropped, not kept:
//! after a reconnect the guidance loop sends a fresh state instead, triggered
//! by [`DeviceEvent::Connected`].

use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use haptinav_core::telemetry::{encode_frame, FrameDecoder, TelemetryMessage};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_graceful_shutdown::SubsystemHandle;
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::GuidanceError;

const RECONNECT_INTERVAL: Duration = Duration::from_millis(1000);

// Messages waiting for the writer; beyond this new ones are dropped
const QUEUE_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceTarget {
    Stdout,
    Serial(PathBuf),
    Tcp(String),
}

impl FromStr for DeviceTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Err("empty device target".to_string()),
            "-" => Ok(DeviceTarget::Stdout),
            s => match s.strip_prefix("tcp:") {
                Some(addr) if !addr.is_empty() => Ok(DeviceTarget::Tcp(addr.to_string())),
                Some(_) => Err(format!("missing address in \"{}\"", s)),
                None => Ok(DeviceTarget::Serial(PathBuf::from(s))),
            },
        }
    }
}

impl std::fmt::Display for DeviceTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceTarget::Stdout => write!(f, "stdout"),
            DeviceTarget::Serial(path) => write!(f, "{}", path.display()),
            DeviceTarget::Tcp(addr) => write!(f, "tcp:{}", addr),
        }
    }
}

/// Frames telemetry messages on a byte stream
#[derive(Debug, Default)]
pub struct TelemetryCodec {
    decoder: FrameDecoder,
}

impl Encoder<TelemetryMessage> for TelemetryCodec {
    type Error = io::Error;

    fn encode(&mut self, item: TelemetryMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(encode_frame(&item).as_bytes());
        Ok(())
    }
}

impl Decoder for TelemetryCodec {
    type Item = TelemetryMessage;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !src.is_empty() {
            self.decoder.push(&src.split());
        }
        loop {
            match self.decoder.next_message() {
                Some(Ok(message)) => return Ok(Some(message)),
                Some(Err(e)) => log::debug!("Skipping bad frame: {}", e),
                None => return Ok(None),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    Connected,
    Disconnected,
}

/// Queues messages for the device
#[derive(Clone)]
pub struct DeviceHandle {
    tx: mpsc::Sender<TelemetryMessage>,
}

impl DeviceHandle {
    pub fn new(tx: mpsc::Sender<TelemetryMessage>) -> Self {
        DeviceHandle { tx }
    }

    /// Queue `messages` in order; never waits
    pub fn send(&self, messages: Vec<TelemetryMessage>) {
        for message in messages {
            if let Err(e) = self.tx.try_send(message) {
                log::warn!("Device queue: dropping message: {}", e);
            }
        }
    }
}

type BoxReader = Box<dyn AsyncRead + Unpin + Send>;
type BoxWriter = Box<dyn AsyncWrite + Unpin + Send>;

pub struct DeviceLink {
    target: DeviceTarget,
    rx: mpsc::Receiver<TelemetryMessage>,
    event_tx: mpsc::Sender<DeviceEvent>,
}

/// Create the device link, the handle that feeds it and its event stream
pub fn channel(target: DeviceTarget) -> (DeviceLink, DeviceHandle, mpsc::Receiver<DeviceEvent>) {
    let (tx, rx) = mpsc::channel(QUEUE_LEN);
    let (event_tx, event_rx) = mpsc::channel(8);
    (
        DeviceLink {
            target,
            rx,
            event_tx,
        },
        DeviceHandle::new(tx),
        event_rx,
    )
}

impl DeviceLink {
    async fn connect(&self) -> io::Result<(BoxReader, BoxWriter)> {
        match &self.target {
            DeviceTarget::Stdout => Ok((Box::new(tokio::io::empty()), Box::new(tokio::io::stdout()))),
            DeviceTarget::Serial(path) => {
                let file = tokio::fs::OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(path)
                    .await?;
                // A tokio File runs one blocking call at a time, so a read
                // waiting on a silent device would hold up every write.
                let reader = file.try_clone().await?;
                Ok((Box::new(reader), Box::new(file)))
            }
            DeviceTarget::Tcp(addr) => {
                let stream = TcpStream::connect(addr).await?;
                stream.set_nodelay(true)?;
                let (reader, writer) = stream.into_split();
                Ok((Box::new(reader), Box::new(writer)))
            }
        }
    }

    fn event(&self, event: DeviceEvent) {
        if self.event_tx.try_send(event).is_err() {
            log::debug!("{}: nobody listening for {:?}", self.target, event);
        }
    }

    /// Write queued messages to the device until it fails or `token` fires
    ///
    /// Frames the device sends back are decoded and logged. Returns `Ok`
    /// when every [`DeviceHandle`] is gone.
    pub async fn pump<R, W>(
        &mut self,
        reader: R,
        writer: W,
        token: &CancellationToken,
    ) -> Result<(), GuidanceError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut reader = FramedRead::new(reader, TelemetryCodec::default());
        let mut writer = FramedWrite::new(writer, TelemetryCodec::default());
        let mut reading = true;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    log::debug!("{}: shutdown", self.target);
                    return Err(GuidanceError::Shutdown);
                },

                message = self.rx.recv() => {
                    let message = match message {
                        Some(message) => message,
                        None => return Ok(()),
                    };
                    if log::log_enabled!(log::Level::Trace) {
                        log::trace!("{}: > {}", self.target, encode_frame(&message).trim_end());
                    }
                    writer
                        .send(message)
                        .await
                        .map_err(|e| GuidanceError::Device(self.target.to_string(), e))?;
                },

                r = reader.next(), if reading => {
                    match r {
                        Some(Ok(message)) => log::debug!("{}: < {:?}", self.target, message),
                        Some(Err(e)) => {
                            return Err(GuidanceError::Device(self.target.to_string(), e));
                        }
                        None => reading = false,
                    }
                }
            }
        }
    }

    /// Drop queued messages until the next connection attempt
    ///
    /// False when the link should stop instead.
    async fn drain(&mut self, token: &CancellationToken) -> bool {
        let retry = sleep(RECONNECT_INTERVAL);
        tokio::pin!(retry);
        let mut dropped = 0;
        loop {
            tokio::select! {
                _ = token.cancelled() => return false,
                _ = &mut retry => break,
                message = self.rx.recv() => match message {
                    Some(_) => dropped += 1,
                    None => return false,
                }
            }
        }
        if dropped > 0 {
            log::trace!("{}: dropped {} messages while disconnected", self.target, dropped);
        }
        true
    }

    pub async fn run_until(&mut self, token: &CancellationToken) -> Result<(), GuidanceError> {
        loop {
            match self.connect().await {
                Ok((reader, writer)) => {
                    log::info!("{}: connected", self.target);
                    self.event(DeviceEvent::Connected);
                    match self.pump(reader, writer, token).await {
                        Ok(()) | Err(GuidanceError::Shutdown) => return Ok(()),
                        Err(e) => {
                            log::warn!("{}", e);
                            self.event(DeviceEvent::Disconnected);
                        }
                    }
                }
                Err(e) => {
                    log::debug!("{}: cannot connect: {}", self.target, e);
                }
            }
            if !self.drain(token).await {
                return Ok(());
            }
        }
    }

    pub async fn run(mut self, subsys: SubsystemHandle) -> Result<(), GuidanceError> {
        let token = subsys.create_cancellation_token();
        self.run_until(&token).await
    }
}
