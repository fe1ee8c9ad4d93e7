use crate::mac_address::MacAddress;
use crate::scanner::Advertisement;
use std::collections::HashMap;

/// A stable MAC address for unit tests.
pub const TEST_MAC: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

/// Another address that is never the configured target.
pub const OTHER_MAC: MacAddress = MacAddress([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);

/// SwitchBot's Bluetooth SIG company identifier.
pub const SWITCHBOT_COMPANY_ID: u16 = 0x0969;

/// Build manufacturer data with `leading` filler bytes followed by an 8-byte
/// decode window carrying the given tenths digit, integer byte and humidity byte.
pub fn meter_payload(leading: usize, tenths: u8, integer: u8, humidity: u8) -> Vec<u8> {
    let mut data = vec![0u8; leading];
    data.extend_from_slice(&[0, 0, 0, 0, 0, tenths & 0x0f, integer, humidity]);
    data
}

/// Parse an even-length hex string into bytes.
pub fn payload_from_hex(hex: &str) -> Vec<u8> {
    assert!(hex.len() % 2 == 0, "hex payload must have even length");
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).unwrap())
        .collect()
}

/// Advertisement carrying a single SwitchBot manufacturer-data entry.
pub fn advertisement(address: MacAddress, data: Vec<u8>) -> Advertisement {
    let mut manufacturer_data = HashMap::new();
    manufacturer_data.insert(SWITCHBOT_COMPANY_ID, data);
    Advertisement {
        address,
        manufacturer_data,
    }
}
