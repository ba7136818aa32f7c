pub mod port_probe;
pub mod xray;

pub use port_probe::{NoProbe, PortProbe, TcpBindProbe};
pub use xray::{
    proxy_to_xray, proxy_to_xray_with_probe, PortUnavailable, RelayOptions, SkippedNode, Synthesis,
};
