//! Local port availability checks
//!
//! The probe binds a port and releases it right away. Nothing is reserved:
//! another process can take the port between the probe and the moment the
//! proxy engine binds it for real. The result is a hint that avoids writing
//! relays on ports known to be taken, not an allocation. The engine is
//! expected to fail loudly when one of its inbounds cannot bind.

use std::net::{Ipv4Addr, TcpListener};

use log::debug;

pub trait PortProbe {
    /// Returns `true` if `port` looked bindable at the time of the call.
    fn is_free(&self, port: u16) -> bool;
}

/// Probes by binding a TCP listener on all interfaces, like the relay inbounds do.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpBindProbe;

impl PortProbe for TcpBindProbe {
    fn is_free(&self, port: u16) -> bool {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)) {
            Ok(_) => true,
            Err(e) => {
                debug!("Port {} probe failed: {}", port, e);
                false
            }
        }
    }
}

/// Accepts every port. Used when probing is turned off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProbe;

impl PortProbe for NoProbe {
    fn is_free(&self, _port: u16) -> bool {
        true
    }
}
