//! Shared test utilities for the ITv2/TLink panel protocol: a mock panel
//! peer that drives the client side of the handshake and the ongoing
//! wire protocol over a real or in-memory duplex connection, for
//! integration tests of `itv2-engine` and the bridge service.

pub mod mock_panel_peer;

pub use mock_panel_peer::MockPanelPeer;
