//! The guidance loop
//!
//! Single owner of the [`NavigationSession`]. Fixes are processed one at a
//! time in arrival order and their messages are queued for the device before
//! the next fix is looked at.
//!
//! Route computations run in a background task so a slow routing service
//! never holds up fix processing. At most one is in flight. Its result comes
//! back through a channel and is applied between two fixes; a result that
//! was overtaken by a newer route is discarded by the session.

use std::sync::Arc;
use std::time::{Duration, Instant};

use haptinav_core::config::GuidanceConfig;
use haptinav_core::route::{RouteModel, RouteRequest, RouteVersions};
use haptinav_core::session::{Fix, NavigationSession, RoutingTarget};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_graceful_shutdown::SubsystemHandle;
use tokio_util::sync::CancellationToken;

use crate::device::{DeviceEvent, DeviceHandle};
use crate::routing::RoutingProvider;
use crate::GuidanceError;

/// Result of a background route computation
struct RouteResult {
    /// Version of the route that was left; `None` for the initial route
    based_on_version: Option<u64>,
    result: Result<RouteModel, GuidanceError>,
}

pub struct Guidance {
    config: GuidanceConfig,
    target: RoutingTarget,
    provider: Arc<dyn RoutingProvider>,
    versions: Arc<RouteVersions>,
    fix_rx: watch::Receiver<Option<Fix>>,
    device: DeviceHandle,
    device_events: mpsc::Receiver<DeviceEvent>,
    result_tx: mpsc::Sender<RouteResult>,
    result_rx: mpsc::Receiver<RouteResult>,
    session: Option<NavigationSession>,
    route_task: Option<JoinHandle<()>>,
    last_initial_attempt: Option<Instant>,
}

impl Guidance {
    pub fn new(
        config: GuidanceConfig,
        target: RoutingTarget,
        provider: Arc<dyn RoutingProvider>,
        fix_rx: watch::Receiver<Option<Fix>>,
        device: DeviceHandle,
        device_events: mpsc::Receiver<DeviceEvent>,
    ) -> Self {
        let (result_tx, result_rx) = mpsc::channel(4);
        Guidance {
            config,
            target,
            provider,
            versions: Arc::new(RouteVersions::new()),
            fix_rx,
            device,
            device_events,
            result_tx,
            result_rx,
            session: None,
            route_task: None,
            last_initial_attempt: None,
        }
    }

    pub fn session(&self) -> Option<&NavigationSession> {
        self.session.as_ref()
    }

    fn route_in_flight(&self) -> bool {
        self.route_task
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// False when another request is still running
    fn spawn_route_request(&mut self, request: RouteRequest, based_on_version: Option<u64>) -> bool {
        if self.route_in_flight() {
            log::debug!("Route request already in flight, not starting another");
            return false;
        }
        let provider = self.provider.clone();
        let versions = self.versions.clone();
        let result_tx = self.result_tx.clone();

        self.route_task = Some(tokio::spawn(async move {
            let result = match provider.fetch(&request).await {
                Ok(response) => response
                    .into_route(versions.next())
                    .map_err(GuidanceError::Route),
                Err(e) => Err(e),
            };
            let _ = result_tx
                .send(RouteResult {
                    based_on_version,
                    result,
                })
                .await;
        }));
        true
    }

    fn process_fix(&mut self, fix: Fix) {
        let outcome = match self.session.as_mut() {
            Some(session) => session.process_fix(&fix),
            None => {
                self.request_initial_route(fix);
                return;
            }
        };

        self.device.send(outcome.messages);
        if let Some(recalc) = outcome.recalculation {
            log::info!(
                "Off route on v{}, requesting a new route",
                recalc.based_on_version
            );
            if !self.spawn_route_request(recalc.request, Some(recalc.based_on_version)) {
                // Let the tracker ask again on a later fix
                if let Some(session) = &mut self.session {
                    session.recalculation_failed();
                }
            }
        }
    }

    fn request_initial_route(&mut self, fix: Fix) {
        let origin = fix.position();
        if !origin.is_valid() {
            log::warn!("Ignoring fix with invalid position {:?}", origin);
            return;
        }
        let retry_after = Duration::from_millis(self.config.recalc.min_interval_ms);
        if let Some(last) = self.last_initial_attempt {
            if last.elapsed() < retry_after {
                return;
            }
        }
        let request = self.target.request_from(origin);
        if self.spawn_route_request(request, None) {
            self.last_initial_attempt = Some(Instant::now());
            log::info!("Requesting route to {:?}", self.target.destination);
        }
    }

    fn apply_route_result(&mut self, route_result: RouteResult) {
        // The task is done once its result is here
        self.route_task = None;
        let RouteResult {
            based_on_version,
            result,
        } = route_result;

        let route = match result {
            Ok(route) => Arc::new(route),
            Err(e) => {
                log::error!("Route calculation failed: {}", e);
                if let Some(session) = &mut self.session {
                    session.recalculation_failed();
                }
                return;
            }
        };

        let session = match self.session.as_mut() {
            Some(session) => session,
            None => {
                let (session, messages) =
                    NavigationSession::start(self.config.clone(), self.target.clone(), route);
                self.device.send(messages);
                self.session = Some(session);
                return;
            }
        };
        let applied = match based_on_version {
            Some(version) => session.apply_recalculated(version, route),
            None => session.replace_route(route),
        };
        match applied {
            Ok(messages) => self.device.send(messages),
            Err(e) => log::debug!("Discarding route: {}", e),
        }
    }

    fn device_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::Connected => {
                if let Some(session) = &mut self.session {
                    log::debug!("Device connected, resending state");
                    self.device.send(session.resync_telemetry());
                }
            }
            DeviceEvent::Disconnected => {
                log::info!("Device disconnected, telemetry is dropped until it is back");
            }
        }
    }

    /// Run until `token` is cancelled
    pub async fn run_until(&mut self, token: &CancellationToken) -> Result<(), GuidanceError> {
        let mut fixes_open = true;
        let mut events_open = true;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    log::debug!("Guidance: shutdown");
                    break;
                },

                r = self.fix_rx.changed(), if fixes_open => {
                    if r.is_err() {
                        log::warn!("Location source closed, guidance paused");
                        fixes_open = false;
                        continue;
                    }
                    let fix = *self.fix_rx.borrow_and_update();
                    if let Some(fix) = fix {
                        self.process_fix(fix);
                    }
                },

                Some(route_result) = self.result_rx.recv() => {
                    self.apply_route_result(route_result);
                },

                event = self.device_events.recv(), if events_open => {
                    match event {
                        Some(event) => self.device_event(event),
                        None => events_open = false,
                    }
                }
            }
        }

        if let Some(task) = self.route_task.take() {
            task.abort();
        }
        Ok(())
    }

    pub async fn run(mut self, subsys: SubsystemHandle) -> Result<(), GuidanceError> {
        let token = subsys.create_cancellation_token();
        self.run_until(&token).await
    }
}
