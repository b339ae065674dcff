//! BLE GATT identifiers of the light controller
//!
//! The controller exposes one primary service with a single writable control
//! characteristic. Encoded packets are written there as-is.

/// Primary service UUID: 00001000-0000-1000-8000-00805f9b34fb
pub const SERVICE_UUID: u128 = 0x00001000_0000_1000_8000_00805f9b34fb;

/// Control characteristic UUID (write): 00001001-0000-1000-8000-00805f9b34fb
pub const CONTROL_UUID: u128 = 0x00001001_0000_1000_8000_00805f9b34fb;

pub const SERVICE_UUID_STR: &str = "00001000-0000-1000-8000-00805f9b34fb";

pub const CONTROL_UUID_STR: &str = "00001001-0000-1000-8000-00805f9b34fb";
