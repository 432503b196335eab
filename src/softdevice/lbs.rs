//! LED Button Service (LBS) GATT definitions.
//!
//! The peripheral hosts the service; the central discovers it after
//! connecting.  Neither side uses the characteristics for control - the
//! service UUID is what the central filters on.

/// nrf-softdevice GATT client for the LBS.
#[nrf_softdevice::gatt_client(uuid = "00001523-1212-efde-1523-785feabcd123")]
pub struct LbsClient {
    /// Button state - notifications on press/release.
    #[characteristic(uuid = "00001524-1212-efde-1523-785feabcd123", read, notify)]
    pub button: u8,

    /// LED state - written by the central.
    #[characteristic(uuid = "00001525-1212-efde-1523-785feabcd123", write)]
    pub led: u8,
}

#[nrf_softdevice::gatt_service(uuid = "00001523-1212-efde-1523-785feabcd123")]
pub struct LedButtonService {
    #[characteristic(uuid = "00001524-1212-efde-1523-785feabcd123", read, notify)]
    pub button: u8,

    #[characteristic(uuid = "00001525-1212-efde-1523-785feabcd123", read, write)]
    pub led: u8,
}

#[nrf_softdevice::gatt_server]
pub struct LinkServer {
    pub lbs: LedButtonService,
}
