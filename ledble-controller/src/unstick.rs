use tracing::info;

use crate::transport::AdapterGuard;
use crate::{Bluetooth, Device, DeviceAddress, SessionError};

/// Connect to the device and immediately disconnect again.
///
/// Some controllers keep a stale link after the last client went away and stop
/// advertising until a fresh connection is opened and closed properly.
pub async fn unstick<B: Bluetooth>(bluetooth: B, address: DeviceAddress) -> Result<(), SessionError> {
    let adapter = AdapterGuard::new(bluetooth);
    let result = reconnect(adapter.get(), address).await;
    adapter.shutdown().await;
    result
}

async fn reconnect<B: Bluetooth>(bluetooth: &B, address: DeviceAddress) -> Result<(), SessionError> {
    if !bluetooth.is_discovering().await.map_err(SessionError::Discovery)? {
        bluetooth.start_discovery().await.map_err(SessionError::Discovery)?;
    }

    let device = bluetooth
        .wait_device(address)
        .await
        .map_err(SessionError::Discovery)?;

    info!(%address, "connecting to device");
    device.connect().await.map_err(SessionError::Connect)?;
    device.disconnect().await.map_err(SessionError::Disconnect)?;
    info!(%address, "connection is no longer stuck");
    Ok(())
}
