//! Position fixes
//!
//! Fixes arrive as JSON lines:
//!
//! ```text
//! {"latitude": 52.3702, "longitude": 4.8952, "bearing": 87.5, "timestamp": 1718000000000}
//! ```
//!
//! `bearing` and `timestamp` are optional; a missing timestamp is replaced by
//! the time of arrival. Blank lines and lines starting with `#` are skipped.
//!
//! Only the newest fix matters, so fixes are published on a `watch` channel
//! and a slow consumer simply misses the superseded ones. When the source
//! ends the channel stays open without new values: guidance pauses until the
//! source comes back.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use haptinav_core::session::Fix;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_graceful_shutdown::SubsystemHandle;
use tokio_util::sync::CancellationToken;

use crate::GuidanceError;

const RECONNECT_INTERVAL: Duration = Duration::from_millis(1000);

// Replay never waits longer than this between two fixes
const MAX_REPLAY_GAP: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixSource {
    Stdin,
    File(PathBuf),
    Tcp(String),
}

impl FromStr for FixSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Err("empty fix source".to_string()),
            "-" => Ok(FixSource::Stdin),
            s => match s.strip_prefix("tcp:") {
                Some(addr) if !addr.is_empty() => Ok(FixSource::Tcp(addr.to_string())),
                Some(_) => Err(format!("missing address in \"{}\"", s)),
                None => Ok(FixSource::File(PathBuf::from(s))),
            },
        }
    }
}

impl std::fmt::Display for FixSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FixSource::Stdin => write!(f, "stdin"),
            FixSource::File(path) => write!(f, "{}", path.display()),
            FixSource::Tcp(addr) => write!(f, "tcp:{}", addr),
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Parse one input line; `Ok(None)` for lines without a fix
pub fn parse_fix_line(line: &str) -> Result<Option<Fix>, GuidanceError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut fix: Fix = serde_json::from_str(line).map_err(|e| GuidanceError::Location {
        line: line.to_string(),
        reason: e.to_string(),
    })?;
    if fix.timestamp == 0 {
        fix.timestamp = now_ms();
    }
    Ok(Some(fix))
}

/// Publish every fix read from `reader` until it ends
///
/// Lines that do not parse are logged and skipped. With `replay` the gaps
/// between fix timestamps are reproduced. Returns the number of fixes sent.
pub async fn forward_fixes<R>(
    reader: R,
    fix_tx: &watch::Sender<Option<Fix>>,
    replay: bool,
) -> Result<usize, GuidanceError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut previous: Option<u64> = None;
    let mut count = 0;

    while let Some(line) = lines.next_line().await? {
        let fix = match parse_fix_line(&line) {
            Ok(Some(fix)) => fix,
            Ok(None) => continue,
            Err(e) => {
                log::warn!("{}", e);
                continue;
            }
        };
        if replay {
            if let Some(previous) = previous {
                let gap = Duration::from_millis(fix.timestamp.saturating_sub(previous));
                sleep(gap.min(MAX_REPLAY_GAP)).await;
            }
            previous = Some(fix.timestamp);
        }
        log::trace!("Fix {:?}", fix);
        fix_tx.send_replace(Some(fix));
        count += 1;
    }
    Ok(count)
}

pub struct LocationReceiver {
    source: FixSource,
    replay: bool,
    fix_tx: watch::Sender<Option<Fix>>,
}

impl LocationReceiver {
    pub fn new(source: FixSource, replay: bool) -> (Self, watch::Receiver<Option<Fix>>) {
        let (fix_tx, fix_rx) = watch::channel(None);
        (
            LocationReceiver {
                source,
                replay,
                fix_tx,
            },
            fix_rx,
        )
    }

    async fn read_source(&self) -> Result<usize, GuidanceError> {
        match &self.source {
            FixSource::Stdin => {
                forward_fixes(BufReader::new(tokio::io::stdin()), &self.fix_tx, false).await
            }
            FixSource::File(path) => {
                let file = tokio::fs::File::open(path).await?;
                forward_fixes(BufReader::new(file), &self.fix_tx, self.replay).await
            }
            FixSource::Tcp(addr) => {
                let stream = TcpStream::connect(addr).await?;
                log::info!("{}: connected", self.source);
                forward_fixes(BufReader::new(stream), &self.fix_tx, false).await
            }
        }
    }

    pub async fn run_until(&self, token: &CancellationToken) -> Result<(), GuidanceError> {
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    log::debug!("{}: shutdown", self.source);
                    return Ok(());
                },
                r = self.read_source() => {
                    match r {
                        Ok(count) => log::info!("{}: ended after {} fixes, guidance paused", self.source, count),
                        Err(e) => log::warn!("{}: {}, guidance paused", self.source, e),
                    }
                }
            }

            // Only a network source can come back
            if !matches!(self.source, FixSource::Tcp(_)) {
                token.cancelled().await;
                return Ok(());
            }
            tokio::select! {
                _ = token.cancelled() => return Ok(()),
                _ = sleep(RECONNECT_INTERVAL) => {}
            }
        }
    }

    pub async fn run(self, subsys: SubsystemHandle) -> Result<(), GuidanceError> {
        let token = subsys.create_cancellation_token();
        self.run_until(&token).await
    }
}
