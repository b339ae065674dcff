//! In-memory transport used by the controller tests

use std::sync::{Arc, Mutex, MutexGuard};

use ledble_proto::ble;
use uuid::Uuid;

use crate::{Bluetooth, Characteristic, Device, DeviceAddress, Service, TransportError};

#[derive(Debug)]
struct Radio {
    advertised: DeviceAddress,
    discovering: bool,
    fail_discovery: bool,
    fail_connect: bool,
    has_service: bool,
    has_characteristic: bool,
    // Some(drop_link) fails the next write
    fail_next_write: Option<bool>,
    // suspend forever in the named step
    hang_discovery_start: bool,
    hang_connect: bool,
    hang_service_lookup: bool,
    connected: bool,

    start_requests: usize,
    connects: usize,
    disconnects: usize,
    releases: usize,
    detached_releases: usize,
    writes: Vec<Vec<u8>>,
    events: Vec<String>,
}

/// Fake adapter with one device. Clones share state, so a test keeps a clone
/// to inspect what the session did.
#[derive(Debug, Clone)]
pub struct FakeBluetooth {
    radio: Arc<Mutex<Radio>>,
}

impl FakeBluetooth {
    pub fn new(advertised: DeviceAddress) -> Self {
        Self {
            radio: Arc::new(Mutex::new(Radio {
                advertised,
                discovering: false,
                fail_discovery: false,
                fail_connect: false,
                has_service: true,
                has_characteristic: true,
                fail_next_write: None,
                hang_discovery_start: false,
                hang_connect: false,
                hang_service_lookup: false,
                connected: false,
                start_requests: 0,
                connects: 0,
                disconnects: 0,
                releases: 0,
                detached_releases: 0,
                writes: Vec::new(),
                events: Vec::new(),
            })),
        }
    }

    fn radio(&self) -> MutexGuard<'_, Radio> {
        self.radio.lock().unwrap()
    }

    pub fn set_discovering(&self, discovering: bool) {
        self.radio().discovering = discovering;
    }

    pub fn fail_discovery(&self) {
        self.radio().fail_discovery = true;
    }

    pub fn fail_connect(&self) {
        self.radio().fail_connect = true;
    }

    pub fn remove_service(&self) {
        self.radio().has_service = false;
    }

    pub fn remove_characteristic(&self) {
        self.radio().has_characteristic = false;
    }

    pub fn fail_next_write(&self, drop_link: bool) {
        self.radio().fail_next_write = Some(drop_link);
    }

    pub fn hang_discovery_start(&self) {
        self.radio().hang_discovery_start = true;
    }

    pub fn hang_connect(&self) {
        self.radio().hang_connect = true;
    }

    pub fn hang_service_lookup(&self) {
        self.radio().hang_service_lookup = true;
    }

    pub fn start_requests(&self) -> usize {
        self.radio().start_requests
    }

    pub fn connects(&self) -> usize {
        self.radio().connects
    }

    pub fn disconnects(&self) -> usize {
        self.radio().disconnects
    }

    pub fn releases(&self) -> usize {
        self.radio().releases
    }

    /// Releases that went through the synchronous drop fallback
    pub fn detached_releases(&self) -> usize {
        self.radio().detached_releases
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.radio().writes.clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.radio().events.clone()
    }
}

impl Bluetooth for FakeBluetooth {
    type Device = FakeDevice;

    async fn is_discovering(&self) -> Result<bool, TransportError> {
        Ok(self.radio().discovering)
    }

    async fn start_discovery(&self) -> Result<(), TransportError> {
        let hang = {
            let mut radio = self.radio();
            radio.start_requests += 1;
            if radio.fail_discovery {
                return Err(TransportError::new("adapter unavailable"));
            }
            radio.discovering = !radio.hang_discovery_start;
            radio.hang_discovery_start
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn wait_device(&self, address: DeviceAddress) -> Result<FakeDevice, TransportError> {
        let advertised = self.radio().advertised;
        if advertised != address {
            std::future::pending::<()>().await;
        }
        Ok(FakeDevice {
            radio: self.radio.clone(),
        })
    }

    async fn stop_discovery(&self) -> Result<(), TransportError> {
        let mut radio = self.radio();
        radio.releases += 1;
        radio.discovering = false;
        Ok(())
    }

    fn release(&self) {
        let mut radio = self.radio();
        radio.releases += 1;
        radio.detached_releases += 1;
    }
}

pub struct FakeDevice {
    radio: Arc<Mutex<Radio>>,
}

impl Device for FakeDevice {
    type Service = FakeService;

    async fn connect(&self) -> Result<(), TransportError> {
        let hang = {
            let mut radio = self.radio.lock().unwrap();
            if radio.fail_connect {
                return Err(TransportError::new("device unreachable"));
            }
            radio.connects += 1;
            radio.connected = !radio.hang_connect;
            radio.hang_connect
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let mut radio = self.radio.lock().unwrap();
        radio.disconnects += 1;
        radio.connected = false;
        Ok(())
    }

    async fn is_connected(&self) -> Result<bool, TransportError> {
        Ok(self.radio.lock().unwrap().connected)
    }

    async fn primary_service(&self, uuid: Uuid) -> Result<Option<FakeService>, TransportError> {
        let (hang, has_service) = {
            let radio = self.radio.lock().unwrap();
            (radio.hang_service_lookup, radio.has_service)
        };
        if hang {
            std::future::pending::<()>().await;
        }
        let found = has_service && uuid == Uuid::from_u128(ble::SERVICE_UUID);
        Ok(found.then(|| FakeService {
            radio: self.radio.clone(),
        }))
    }
}

pub struct FakeService {
    radio: Arc<Mutex<Radio>>,
}

impl Service for FakeService {
    type Characteristic = FakeCharacteristic;

    async fn characteristic(&self, uuid: Uuid) -> Result<Option<FakeCharacteristic>, TransportError> {
        let found = self.radio.lock().unwrap().has_characteristic
            && uuid == Uuid::from_u128(ble::CONTROL_UUID);
        Ok(found.then(|| FakeCharacteristic {
            radio: self.radio.clone(),
        }))
    }
}

pub struct FakeCharacteristic {
    radio: Arc<Mutex<Radio>>,
}

impl Characteristic for FakeCharacteristic {
    async fn write_value(&self, bytes: &[u8]) -> Result<(), TransportError> {
        self.radio
            .lock()
            .unwrap()
            .events
            .push(format!("begin {bytes:02X?}"));

        // give a concurrent writer the chance to interleave
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }

        let mut radio = self.radio.lock().unwrap();
        radio.events.push(format!("end {bytes:02X?}"));
        if let Some(drop_link) = radio.fail_next_write.take() {
            if drop_link {
                radio.connected = false;
            }
            return Err(TransportError::new("write rejected"));
        }
        radio.writes.push(bytes.to_vec());
        Ok(())
    }
}
