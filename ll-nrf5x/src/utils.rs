//! Small helpers related to running the Link Layer on the nRF52810.

use {
    ll_core::link::{AddressKind, DeviceAddress},
    nrf52810_hal::nrf52810_pac::{ficr::deviceaddrtype::DEVICEADDRTYPE_A, FICR},
};

/// Reads the device address factory-programmed into FICR.
///
/// Every nRF52810 ships with a unique address in its Factory Information Configuration
/// Registers; using it means the stack doesn't need its own persistent storage for a device
/// address.
pub fn get_device_address() -> DeviceAddress {
    // FICR is read-only, so accessing it directly should be safe
    let ficr = unsafe { &*FICR::ptr() };

    let mut devaddr = [0u8; 6];
    let devaddr_lo = ficr.deviceaddr[0].read().bits();
    let devaddr_hi = ficr.deviceaddr[1].read().bits() as u16;
    devaddr[..4].copy_from_slice(&devaddr_lo.to_le_bytes());
    devaddr[4..].copy_from_slice(&devaddr_hi.to_le_bytes());

    let devaddr_type = match ficr.deviceaddrtype.read().deviceaddrtype().variant() {
        DEVICEADDRTYPE_A::PUBLIC => AddressKind::Public,
        DEVICEADDRTYPE_A::RANDOM => AddressKind::Random,
    };

    DeviceAddress::new(devaddr, devaddr_type)
}
