//! Infrastructure layer: everything that touches the OS or the network.
//!
//! - **`network`** – PDV UDP sockets and the two WebSocket listeners.
//! - **`storage`** – loading the device configuration file.
//! - **`media`** – media relay engines and the capture worker.

pub mod media;
pub mod network;
pub mod storage;
