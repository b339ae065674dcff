//! ledble controller
//!
//! Session controller for BLE RGB light controllers: finds the device by
//! address, connects, resolves the control characteristic and writes encoded
//! command packets to it, one at a time.
//!
//! # Example
//!
//! ```ignore
//! use ledble_controller::{ble::BtleBluetooth, Session};
//! use ledble_proto::Command;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bluetooth = BtleBluetooth::default_adapter().await?;
//!     let mut session = Session::new(bluetooth, "24:71:89:1D:64:52".parse()?);
//!
//!     session.start().await?;
//!     session.send(&Command::power(true)).await?;
//!     session.send(&Command::color(1.0, 0.5, 0.0)).await?;
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```

mod address;
pub mod ble;
mod error;
mod session;
pub mod transport;
mod unstick;

#[cfg(test)]
mod fake;

pub use address::{AddressParseError, DeviceAddress};
pub use error::{ResolveError, SendError, SessionError, TransportError};
pub use session::{AbortHandle, FailReason, Session, SessionState};
pub use transport::{Bluetooth, Characteristic, Device, Service};
pub use unstick::unstick;
