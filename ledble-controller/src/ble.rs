//! btleplug backend for the session controller
//!
//! Releasing the adapter means stopping a scan this adapter started. btleplug
//! has no adapter teardown call of its own. `stop_discovery` waits for the
//! scan to stop; `release` can only hand `stop_scan` to the runtime.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use btleplug::api::{
    Central, CentralEvent, Characteristic as GattCharacteristic, Manager as _, Peripheral as _,
    ScanFilter, Service as GattService, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::{Stream, StreamExt};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{Bluetooth, Characteristic, Device, DeviceAddress, Service, TransportError};

/// The platform's Bluetooth adapter
pub struct BtleBluetooth {
    adapter: Adapter,
    scanning: AtomicBool,
}

impl BtleBluetooth {
    pub fn new(adapter: Adapter) -> Self {
        Self {
            adapter,
            scanning: AtomicBool::new(false),
        }
    }

    /// Get the first adapter the system reports
    pub async fn default_adapter() -> Result<Self, TransportError> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        let adapter = adapters
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::new("no Bluetooth adapter found"))?;
        Ok(Self::new(adapter))
    }
}

fn is_target(peripheral: &Peripheral, address: DeviceAddress) -> bool {
    peripheral.address().into_inner() == address.octets()
}

/// Look up each id in turn and return the first item `accept` takes.
/// Failed lookups are skipped. `None` once `ids` ends.
async fn first_match<I, T, E, Fut>(
    ids: impl Stream<Item = I>,
    mut lookup: impl FnMut(I) -> Fut,
    accept: impl Fn(&T) -> bool,
) -> Option<T>
where
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut ids = std::pin::pin!(ids);
    while let Some(id) = ids.next().await {
        match lookup(id).await {
            Ok(item) if accept(&item) => return Some(item),
            Ok(_) => {}
            Err(e) => debug!(error = %e, "skipping peripheral"),
        }
    }
    None
}

impl Bluetooth for BtleBluetooth {
    type Device = BtleDevice;

    async fn is_discovering(&self) -> Result<bool, TransportError> {
        Ok(self.scanning.load(Ordering::SeqCst))
    }

    async fn start_discovery(&self) -> Result<(), TransportError> {
        self.adapter.start_scan(ScanFilter::default()).await?;
        self.scanning.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn wait_device(&self, address: DeviceAddress) -> Result<BtleDevice, TransportError> {
        // subscribe before listing so an advertisement in between is not lost
        let events = self.adapter.events().await?;

        if let Some(peripheral) = self
            .adapter
            .peripherals()
            .await?
            .into_iter()
            .find(|p| is_target(p, address))
        {
            return Ok(BtleDevice { peripheral });
        }

        let ids = events.filter_map(|event| async move {
            match event {
                CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => Some(id),
                _ => None,
            }
        });
        let adapter = &self.adapter;
        let peripheral = first_match(
            ids,
            |id| async move { adapter.peripheral(&id).await },
            |p: &Peripheral| is_target(p, address),
        )
        .await
        .ok_or_else(|| TransportError::new("adapter event stream closed"))?;

        debug!(%address, "device found");
        Ok(BtleDevice { peripheral })
    }

    async fn stop_discovery(&self) -> Result<(), TransportError> {
        if self.scanning.swap(false, Ordering::SeqCst) {
            self.adapter.stop_scan().await?;
        }
        Ok(())
    }

    fn release(&self) {
        if !self.scanning.swap(false, Ordering::SeqCst) {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no runtime to stop the scan on");
            return;
        };
        let adapter = self.adapter.clone();
        runtime.spawn(async move {
            if let Err(e) = adapter.stop_scan().await {
                warn!(error = %e, "failed to stop scan");
            }
        });
    }
}

pub struct BtleDevice {
    peripheral: Peripheral,
}

impl Device for BtleDevice {
    type Service = BtleService;

    async fn connect(&self) -> Result<(), TransportError> {
        Ok(self.peripheral.connect().await?)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(self.peripheral.disconnect().await?)
    }

    async fn is_connected(&self) -> Result<bool, TransportError> {
        Ok(self.peripheral.is_connected().await?)
    }

    async fn primary_service(&self, uuid: Uuid) -> Result<Option<BtleService>, TransportError> {
        self.peripheral.discover_services().await?;

        let service = self
            .peripheral
            .services()
            .into_iter()
            .find(|s| s.primary && s.uuid == uuid);

        Ok(service.map(|service| BtleService {
            peripheral: self.peripheral.clone(),
            service,
        }))
    }
}

pub struct BtleService {
    peripheral: Peripheral,
    service: GattService,
}

impl Service for BtleService {
    type Characteristic = BtleCharacteristic;

    async fn characteristic(&self, uuid: Uuid) -> Result<Option<BtleCharacteristic>, TransportError> {
        let characteristic = self.service.characteristics.iter().find(|c| c.uuid == uuid);

        Ok(characteristic.map(|characteristic| BtleCharacteristic {
            peripheral: self.peripheral.clone(),
            characteristic: characteristic.clone(),
        }))
    }
}

pub struct BtleCharacteristic {
    peripheral: Peripheral,
    characteristic: GattCharacteristic,
}

impl Characteristic for BtleCharacteristic {
    async fn write_value(&self, bytes: &[u8]) -> Result<(), TransportError> {
        self.peripheral
            .write(&self.characteristic, bytes, WriteType::WithResponse)
            .await?;
        Ok(())
    }
}
