//! GATT keyboard profile served over `trouble-host`.
//!
//! The profile owns the attribute table (HID, battery and device information
//! services) and the advertisement payloads. The BLE task in the runtime
//! drives the connection itself; this module only shapes what the host sees.

use core::{
    fmt,
    hint::spin_loop,
    sync::atomic::{AtomicBool, Ordering},
};

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};
use trouble_host::advertise::{AdStructure, BR_EDR_NOT_SUPPORTED, LE_GENERAL_DISCOVERABLE};
use trouble_host::prelude::{
    FromGatt, GapConfig, PeripheralConfig, appearance, characteristic, descriptors, gatt_server,
    gatt_service, service,
};

use super::core::HID_REPORT_SIZE;
use crate::config::MANUFACTURER;

pub const REPORT_ID: u8 = 0x01;

const REPORT_DESCRIPTOR_LEN: usize = 65;
/// Boot keyboard with report id 1: modifier byte, reserved byte, six keys,
/// and a five-bit LED output report.
pub const REPORT_DESCRIPTOR: [u8; REPORT_DESCRIPTOR_LEN] = [
    0x05, 0x01, 0x09, 0x06, 0xA1, 0x01, 0x85, REPORT_ID, 0x05, 0x07, 0x19, 0xE0, 0x29, 0xE7,
    0x15, 0x00, 0x25, 0x01, 0x75, 0x01, 0x95, 0x08, 0x81, 0x02, 0x95, 0x01, 0x75, 0x08, 0x81,
    0x01, 0x95, 0x06, 0x75, 0x08, 0x15, 0x00, 0x25, 0x65, 0x05, 0x07, 0x19, 0x00, 0x29, 0x65,
    0x81, 0x00, 0x95, 0x05, 0x75, 0x01, 0x05, 0x08, 0x19, 0x01, 0x29, 0x05, 0x91, 0x02, 0x95,
    0x01, 0x75, 0x03, 0x91, 0x01, 0xC0,
];
/// bcdHID 1.11, no country code, normally connectable.
const HID_INFORMATION: [u8; 4] = [0x11, 0x01, 0x00, 0x02];
const INPUT_REPORT_REFERENCE: [u8; 2] = [REPORT_ID, 0x01];
const OUTPUT_REPORT_REFERENCE: [u8; 2] = [REPORT_ID, 0x02];

pub const BATTERY_LEVEL_PERCENT: u8 = 7;

const MANUFACTURER_NAME_LEN: usize = MANUFACTURER.len();
const MANUFACTURER_NAME: [u8; MANUFACTURER_NAME_LEN] = manufacturer_name();
/// Vendor id source 0x02 (USB-IF), vendor 0xE502, product 0xA111, version 0x0210.
pub const PNP_ID_VALUE: [u8; 7] = [0x02, 0x02, 0xE5, 0x11, 0xA1, 0x10, 0x02];

const HID_SERVICE_UUID16: [u8; 2] = [0x12, 0x18];
const AD_TYPE_APPEARANCE: u8 = 0x19;
const KEYBOARD_APPEARANCE: [u8; 2] = [0xC1, 0x03];

const ADV_BUFFER_LEN: usize = 31;
const ATTRIBUTE_TABLE_SIZE: usize = 96;
const CCCD_TABLE_SIZE: usize = 4;
const CONNECTIONS_MAX: usize = 1;

static SERVER_POOL: Mutex<CriticalSectionRawMutex, Option<HidServer<'static>>> =
    Mutex::new(None);
static SERVER_INITIALIZED: AtomicBool = AtomicBool::new(false);

#[gatt_service(uuid = service::HUMAN_INTERFACE_DEVICE)]
pub struct HidService {
    #[characteristic(uuid = characteristic::HID_INFORMATION, read, value = HID_INFORMATION)]
    pub information: [u8; 4],
    #[characteristic(uuid = characteristic::REPORT_MAP, read, value = REPORT_DESCRIPTOR)]
    pub report_map: [u8; REPORT_DESCRIPTOR_LEN],
    #[descriptor(uuid = descriptors::REPORT_REFERENCE, read, value = INPUT_REPORT_REFERENCE)]
    #[characteristic(uuid = characteristic::REPORT, read, notify, value = [0u8; HID_REPORT_SIZE])]
    pub input_report: [u8; HID_REPORT_SIZE],
    #[descriptor(uuid = descriptors::REPORT_REFERENCE, read, value = OUTPUT_REPORT_REFERENCE)]
    #[characteristic(uuid = characteristic::REPORT, read, write, write_without_response, value = 0u8)]
    pub output_report: u8,
    #[characteristic(uuid = characteristic::HID_CONTROL_POINT, write_without_response, value = 0u8)]
    pub control_point: u8,
    #[characteristic(uuid = characteristic::PROTOCOL_MODE, read, write_without_response, value = 1u8)]
    pub protocol_mode: u8,
}

#[gatt_service(uuid = service::BATTERY)]
pub struct BatteryService {
    #[characteristic(uuid = characteristic::BATTERY_LEVEL, read, notify, value = BATTERY_LEVEL_PERCENT)]
    pub level: u8,
}

#[gatt_service(uuid = service::DEVICE_INFORMATION)]
pub struct DeviceInfoService {
    #[characteristic(uuid = characteristic::MANUFACTURER_NAME_STRING, read, value = MANUFACTURER_NAME)]
    pub manufacturer: [u8; MANUFACTURER_NAME_LEN],
    #[characteristic(uuid = characteristic::PNP_ID, read, value = PNP_ID_VALUE)]
    pub pnp_id: [u8; 7],
}

#[gatt_server(
    connections_max = CONNECTIONS_MAX,
    mutex_type = NoopRawMutex,
    attribute_table_size = ATTRIBUTE_TABLE_SIZE,
    cccd_table_size = CCCD_TABLE_SIZE
)]
pub struct HidServer {
    pub hid: HidService,
    pub battery: BatteryService,
    pub device_info: DeviceInfoService,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileError {
    InvalidConfig(&'static str),
    AdvertisementTooLong,
    ServerUnavailable,
}

impl fmt::Display for ProfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileError::InvalidConfig(reason) => write!(f, "invalid GAP config: {reason}"),
            ProfileError::AdvertisementTooLong => write!(f, "advertisement does not fit"),
            ProfileError::ServerUnavailable => write!(f, "GATT server already released"),
        }
    }
}

pub struct HidProfile {
    pub name: &'static str,
    server: Option<HidServer<'static>>,
    adv_data: [u8; ADV_BUFFER_LEN],
    adv_len: usize,
    scan_data: [u8; ADV_BUFFER_LEN],
    scan_len: usize,
}

impl HidProfile {
    pub fn new(name: &'static str) -> Result<Self, ProfileError> {
        let (adv_data, adv_len) = encode_advertisement(name)?;
        let (scan_data, scan_len) = encode_scan_response(name)?;
        let server = acquire_server(name)?;
        Ok(Self {
            name,
            server: Some(server),
            adv_data,
            adv_len,
            scan_data,
            scan_len,
        })
    }

    pub fn descriptor(&self) -> &[u8; REPORT_DESCRIPTOR_LEN] {
        &REPORT_DESCRIPTOR
    }

    /// Advertising data and scan response, in that order.
    pub fn advertisement(&self) -> (&[u8], &[u8]) {
        (
            &self.adv_data[..self.adv_len],
            &self.scan_data[..self.scan_len],
        )
    }

    pub fn server(&self) -> Result<&HidServer<'static>, ProfileError> {
        self.server.as_ref().ok_or(ProfileError::ServerUnavailable)
    }
}

impl fmt::Debug for HidProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HidProfile")
            .field("name", &self.name)
            .finish()
    }
}

impl Drop for HidProfile {
    fn drop(&mut self) {
        if let Some(server) = self.server.take() {
            unsafe {
                SERVER_POOL.lock_mut(|pool| {
                    if pool.is_none() {
                        *pool = Some(server);
                    }
                });
            }
        }
    }
}

const fn manufacturer_name() -> [u8; MANUFACTURER_NAME_LEN] {
    let source = MANUFACTURER.as_bytes();
    let mut name = [0u8; MANUFACTURER_NAME_LEN];
    let mut index = 0;
    while index < MANUFACTURER_NAME_LEN {
        name[index] = source[index];
        index += 1;
    }
    name
}

fn encode_advertisement(name: &'static str) -> Result<([u8; ADV_BUFFER_LEN], usize), ProfileError> {
    let mut buffer = [0u8; ADV_BUFFER_LEN];
    let len = AdStructure::encode_slice(
        &[
            AdStructure::Flags(LE_GENERAL_DISCOVERABLE | BR_EDR_NOT_SUPPORTED),
            AdStructure::ServiceUuids16(&[HID_SERVICE_UUID16]),
            AdStructure::Unknown {
                ty: AD_TYPE_APPEARANCE,
                data: &KEYBOARD_APPEARANCE,
            },
            AdStructure::CompleteLocalName(name.as_bytes()),
        ],
        &mut buffer,
    )
    .map_err(|_| ProfileError::AdvertisementTooLong)?;
    Ok((buffer, len))
}

fn encode_scan_response(name: &'static str) -> Result<([u8; ADV_BUFFER_LEN], usize), ProfileError> {
    let mut buffer = [0u8; ADV_BUFFER_LEN];
    let len = AdStructure::encode_slice(
        &[AdStructure::ShortenedLocalName(name.as_bytes())],
        &mut buffer,
    )
    .map_err(|_| ProfileError::AdvertisementTooLong)?;
    Ok((buffer, len))
}

fn acquire_server(name: &'static str) -> Result<HidServer<'static>, ProfileError> {
    loop {
        if let Some(server) = unsafe { SERVER_POOL.lock_mut(|pool| pool.take()) } {
            return Ok(server);
        }

        if SERVER_INITIALIZED
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let gap_config = GapConfig::Peripheral(PeripheralConfig {
                name,
                appearance: &appearance::human_interface_device::KEYBOARD,
            });
            return HidServer::new_with_config(gap_config).map_err(ProfileError::InvalidConfig);
        }

        spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_information_carries_pnp_id_and_manufacturer() {
        let profile = HidProfile::new("Unit HID").expect("profile");
        let server = profile.server().expect("server");

        assert_eq!(
            server.get(&server.device_info.pnp_id).expect("pnp id"),
            PNP_ID_VALUE
        );
        assert_eq!(
            &server
                .get(&server.device_info.manufacturer)
                .expect("manufacturer"),
            MANUFACTURER.as_bytes()
        );
        assert_eq!(server.get(&server.battery.level).expect("level"), 7);
        assert_eq!(
            server.get(&server.hid.report_map).expect("report map"),
            REPORT_DESCRIPTOR
        );
    }
}
