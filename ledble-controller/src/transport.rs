//! Platform seam for the session controller
//!
//! [`crate::ble`] implements these traits on btleplug. Each method that talks
//! to the radio is a suspension point; the session races every one of them
//! against cancellation.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use uuid::Uuid;

use crate::{DeviceAddress, TransportError};

/// Local Bluetooth adapter
pub trait Bluetooth: Send + Sync {
    type Device: Device;

    fn is_discovering(&self) -> impl Future<Output = Result<bool, TransportError>> + Send;

    fn start_discovery(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Resolve once a device advertising `address` is seen. Never times out.
    fn wait_device(
        &self,
        address: DeviceAddress,
    ) -> impl Future<Output = Result<Self::Device, TransportError>> + Send;

    /// Stop a discovery this adapter started and wait until it has stopped.
    /// Per session, either this or [`Bluetooth::release`] runs, once.
    fn stop_discovery(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Synchronous fallback for [`Bluetooth::stop_discovery`] when a session is
    /// dropped or aborted without being awaited
    fn release(&self);
}

pub trait Device: Send + Sync {
    type Service: Service;

    fn connect(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn disconnect(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn is_connected(&self) -> impl Future<Output = Result<bool, TransportError>> + Send;

    /// Look up a primary service by UUID. `Ok(None)` when the device does not expose it.
    fn primary_service(
        &self,
        uuid: Uuid,
    ) -> impl Future<Output = Result<Option<Self::Service>, TransportError>> + Send;
}

pub trait Service: Send + Sync {
    type Characteristic: Characteristic;

    fn characteristic(
        &self,
        uuid: Uuid,
    ) -> impl Future<Output = Result<Option<Self::Characteristic>, TransportError>> + Send;
}

pub trait Characteristic: Send + Sync {
    /// Write `bytes` and wait for the device to acknowledge
    fn write_value(&self, bytes: &[u8]) -> impl Future<Output = Result<(), TransportError>> + Send;
}

pub(crate) type ServiceOf<B> = <<B as Bluetooth>::Device as Device>::Service;
pub(crate) type CharacteristicOf<B> = <ServiceOf<B> as Service>::Characteristic;

/// Owns the adapter and releases it exactly once: awaited through
/// [`AdapterGuard::shutdown`], or synchronously on [`AdapterGuard::release`] and drop
pub(crate) struct AdapterGuard<B: Bluetooth> {
    bluetooth: B,
    released: AtomicBool,
}

impl<B: Bluetooth> AdapterGuard<B> {
    pub(crate) fn new(bluetooth: B) -> Self {
        Self {
            bluetooth,
            released: AtomicBool::new(false),
        }
    }

    pub(crate) fn get(&self) -> &B {
        &self.bluetooth
    }

    pub(crate) async fn shutdown(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!("releasing Bluetooth adapter");
        if let Err(e) = self.bluetooth.stop_discovery().await {
            tracing::warn!(error = %e, "failed to stop discovery");
        }
    }

    pub(crate) fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            tracing::debug!("releasing Bluetooth adapter without waiting");
            self.bluetooth.release();
        }
    }
}

impl<B: Bluetooth> Drop for AdapterGuard<B> {
    fn drop(&mut self) {
        self.release();
    }
}
