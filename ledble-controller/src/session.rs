//! Session lifecycle: discovery, connection, GATT resolution and the write channel

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ledble_proto::{Command, Packet, ble};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::transport::{AdapterGuard, CharacteristicOf};
use crate::{
    Bluetooth, Characteristic, Device, DeviceAddress, ResolveError, SendError, Service,
    SessionError, TransportError,
};

const SERVICE_UUID: Uuid = Uuid::from_u128(ble::SERVICE_UUID);
const CONTROL_UUID: Uuid = Uuid::from_u128(ble::CONTROL_UUID);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailReason {
    Discovery,
    Connect,
    Resolve,
    Disconnected,
    Cancelled,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Discovering,
    DeviceAcquired,
    Connected,
    ServiceResolved,
    Ready,
    Failed(FailReason),
}

impl SessionState {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(reason) => write!(f, "Failed({reason:?})"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Cancels a session from outside, e.g. when a caller-side timeout expires
#[derive(Debug, Clone)]
pub struct AbortHandle {
    flag: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self {
            flag: Arc::new(flag),
        }
    }

    pub fn cancel(&self) {
        self.flag.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.flag.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.flag.subscribe()
    }
}

/// A single connection to the light controller
///
/// States advance `Idle → Discovering → DeviceAcquired → Connected →
/// ServiceResolved → Ready`; any failure moves to the terminal `Failed`.
/// The adapter is released exactly once: on the first failure, in
/// [`Session::close`], or when the session is dropped. A failed
/// [`Session::start`] also disconnects a device it tried to connect to.
pub struct Session<B: Bluetooth> {
    adapter: AdapterGuard<B>,
    address: DeviceAddress,
    device: Option<B::Device>,
    // set from the first connect attempt until the device is disconnected
    link: AtomicBool,
    // fair mutex: queued writes go out in FIFO order
    channel: Mutex<Option<CharacteristicOf<B>>>,
    state: watch::Sender<SessionState>,
    abort: AbortHandle,
}

impl<B: Bluetooth> Session<B> {
    pub fn new(bluetooth: B, address: DeviceAddress) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            adapter: AdapterGuard::new(bluetooth),
            address,
            device: None,
            link: AtomicBool::new(false),
            channel: Mutex::new(None),
            state,
            abort: AbortHandle::new(),
        }
    }

    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Fail the session on request. No-op once it has already failed.
    ///
    /// The adapter is released without waiting; prefer [`AbortHandle::cancel`]
    /// when a task is driving the session.
    pub fn abort(&self) {
        if self.mark_failed(FailReason::Aborted) {
            self.adapter.release();
        }
    }

    /// Drive the session from `Idle` to `Ready`
    pub async fn start(&mut self) -> Result<(), SessionError> {
        let state = self.state();
        if state != SessionState::Idle {
            return Err(SessionError::InvalidState(state));
        }

        match self.establish().await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(address = %self.address, error = %e, "session failed");
                if let Err(disconnect) = self.drop_link().await {
                    warn!(error = %disconnect, "disconnect after failed start");
                }
                if let Some(reason) = e.reason() {
                    self.fail(reason).await;
                }
                Err(e)
            }
        }
    }

    async fn establish(&mut self) -> Result<(), SessionError> {
        if self.abort.is_cancelled() {
            return Err(SessionError::Cancelled);
        }
        self.transition(SessionState::Discovering);

        let discovering = self
            .suspend(self.adapter.get().is_discovering(), SessionError::Discovery)
            .await?;
        if discovering {
            debug!("adapter already discovering");
        } else {
            self.suspend(self.adapter.get().start_discovery(), SessionError::Discovery)
                .await?;
        }

        info!(address = %self.address, "waiting for device");
        let device = self
            .suspend(self.adapter.get().wait_device(self.address), SessionError::Discovery)
            .await?;
        self.device = Some(device);
        self.transition(SessionState::DeviceAcquired);

        let characteristic = {
            let Some(device) = self.device.as_ref() else {
                return Err(SessionError::InvalidState(self.state()));
            };

            self.link.store(true, Ordering::SeqCst);
            if let Err(e) = self.suspend(device.connect(), SessionError::Connect).await {
                if matches!(e, SessionError::Connect(_)) {
                    self.link.store(false, Ordering::SeqCst);
                }
                return Err(e);
            }
            self.transition(SessionState::Connected);

            let service = self
                .suspend(device.primary_service(SERVICE_UUID), resolve_error)
                .await?
                .ok_or(ResolveError::ServiceNotFound(SERVICE_UUID))?;
            self.suspend(service.characteristic(CONTROL_UUID), resolve_error)
                .await?
                .ok_or(ResolveError::CharacteristicNotFound(CONTROL_UUID))?
        };

        *self.channel.get_mut() = Some(characteristic);
        self.transition(SessionState::ServiceResolved);
        self.transition(SessionState::Ready);
        Ok(())
    }

    /// Encode `command` and write it to the control characteristic.
    ///
    /// Concurrent calls are written one at a time in the order they were
    /// issued. Encode and write failures leave the session `Ready`.
    pub async fn send(&self, command: &Command) -> Result<(), SendError> {
        let state = self.state();
        if state != SessionState::Ready {
            return Err(SendError::NotReady(state));
        }
        let packet = ledble_proto::encode(command)?;

        let mut cancelled = self.abort.subscribe();
        let outcome = tokio::select! {
            biased;
            Ok(_) = cancelled.wait_for(|c| *c) => None,
            result = self.write(&packet) => Some(result),
        };

        match outcome {
            Some(result) => result,
            None => {
                self.fail(FailReason::Cancelled).await;
                Err(SendError::Cancelled)
            }
        }
    }

    async fn write(&self, packet: &Packet) -> Result<(), SendError> {
        let channel = self.channel.lock().await;

        // state may have moved on while this write was queued
        let state = self.state();
        let characteristic = match (state, channel.as_ref()) {
            (SessionState::Ready, Some(characteristic)) => characteristic,
            _ => return Err(SendError::NotReady(state)),
        };

        debug!(kind = %packet.kind(), "write {:02X?}", packet.as_bytes());
        match characteristic.write_value(packet.as_bytes()).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "write failed");
                if self.link_lost().await {
                    self.fail(FailReason::Disconnected).await;
                    return Err(SendError::Disconnected);
                }
                Err(SendError::Transport(e))
            }
        }
    }

    async fn link_lost(&self) -> bool {
        match self.device.as_ref() {
            Some(device) => matches!(device.is_connected().await, Ok(false)),
            None => true,
        }
    }

    /// Disconnect from the device and release the adapter
    pub async fn close(self) -> Result<(), SessionError> {
        let result = self.drop_link().await.map_err(SessionError::Disconnect);
        self.adapter.shutdown().await;
        result
    }

    async fn drop_link(&self) -> Result<(), TransportError> {
        if !self.link.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        match self.device.as_ref() {
            Some(device) => {
                info!(address = %self.address, "disconnecting");
                device.disconnect().await
            }
            None => Ok(()),
        }
    }

    /// Race `fut` against cancellation
    async fn suspend<T>(
        &self,
        fut: impl Future<Output = Result<T, TransportError>>,
        map_err: impl FnOnce(TransportError) -> SessionError,
    ) -> Result<T, SessionError> {
        let mut cancelled = self.abort.subscribe();
        tokio::select! {
            biased;
            Ok(_) = cancelled.wait_for(|c| *c) => Err(SessionError::Cancelled),
            result = fut => result.map_err(map_err),
        }
    }

    fn transition(&self, next: SessionState) {
        let previous = self.state.send_replace(next);
        info!(from = %previous, to = %next, "session state");
    }

    async fn fail(&self, reason: FailReason) {
        if self.mark_failed(reason) {
            self.adapter.shutdown().await;
        }
    }

    /// Move to `Failed(reason)` unless already failed; true if this call did
    fn mark_failed(&self, reason: FailReason) -> bool {
        let next = SessionState::Failed(reason);
        let mut previous = None;
        self.state.send_if_modified(|state| {
            if state.is_failed() {
                return false;
            }
            previous = Some(std::mem::replace(state, next));
            true
        });

        match previous {
            Some(previous) => {
                info!(from = %previous, to = %next, "session state");
                true
            }
            None => false,
        }
    }
}

fn resolve_error(e: TransportError) -> SessionError {
    SessionError::Resolve(ResolveError::Transport(e))
}
