use serde::{Deserialize, Serialize};
use std::fmt;

/// Device family derived from the USB product id at connect time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Model {
    H1,
    H1E,
    P1,
}

impl Model {
    pub fn from_product_id(product_id: u16) -> Option<Model> {
        match product_id {
            0xB00C => Some(Model::H1),
            0xB00D => Some(Model::H1E),
            0xB00E => Some(Model::P1),
            _ => None,
        }
    }

    /// Whether this profile exposes the Bluetooth command family at all.
    pub fn is_bluetooth_capable(self) -> bool {
        matches!(self, Model::P1)
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Model::H1 => write!(f, "H1"),
            Model::H1E => write!(f, "H1E"),
            Model::P1 => write!(f, "P1"),
        }
    }
}

/// Jensen-family vendor id. Fixed regardless of model.
pub const VENDOR_ID: u16 = 0x10E6;

/// Device profile resolved once at connect time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub model: Model,
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceProfile {
    pub fn from_ids(vendor_id: u16, product_id: u16) -> Option<DeviceProfile> {
        if vendor_id != VENDOR_ID {
            return None;
        }
        Model::from_product_id(product_id).map(|model| DeviceProfile {
            model,
            vendor_id,
            product_id,
        })
    }
}

/// A packed 32-bit firmware version plus its dotted display form.
///
/// The wire representation is a plain decimal integer (e.g. `327714`); the
/// dotted form is derived for display purposes only and carries no parsing
/// semantics of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FirmwareVersion(pub u32);

impl FirmwareVersion {
    pub fn number(self) -> u32 {
        self.0
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;
        write!(f, "{}.{}.{}", v / 10000, (v / 100) % 100, v % 100)
    }
}

/// Device identity reported by `GetDeviceInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub version_code: u8,
    pub version_number: u32,
    pub serial_number: String,
}

/// A logical file record parsed out of a file-list stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub filename: String,
    pub size_bytes: u64,
    pub created_at: Option<String>,
    pub recording_type: u32,
    pub signature: [u8; 16],
}

/// Card usage/capacity snapshot from `GetCardInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardInfo {
    pub used_bytes: u64,
    pub capacity_bytes: u64,
    pub status_raw: u32,
}

/// Device settings payload decoded per-bit. Layout is opaque beyond the
/// fields the spec calls out explicitly (the Bluetooth prompt bit is
/// intentionally inverted: `1` means disabled, `2` means enabled).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub raw: [u8; 16],
    pub bluetooth_prompt_enabled: bool,
}

impl Settings {
    pub fn decode(raw: [u8; 16]) -> Settings {
        let bluetooth_prompt_enabled = raw[0] == 2;
        Settings {
            raw,
            bluetooth_prompt_enabled,
        }
    }

    pub fn encode(self) -> [u8; 16] {
        let mut raw = self.raw;
        raw[0] = if self.bluetooth_prompt_enabled { 2 } else { 1 };
        raw
    }
}

/// Generic success/failure/contextual status returned by single-byte-status
/// commands. The same raw value means different things in different
/// contexts, so callers interpret it per-command rather than through one
/// shared enum of meanings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode(pub u8);

impl StatusCode {
    pub const SUCCESS: StatusCode = StatusCode(0);

    pub fn is_success(self) -> bool {
        self.0 == 0
    }
}

/// Kind of long-running operation tracked by the operations manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Download,
    Delete,
    BatchDownload,
    BatchDelete,
}

/// Lifecycle state of an operation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    Pending,
    Active,
    Completed,
    Failed,
    Cancelled,
}

impl OperationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperationStatus::Completed | OperationStatus::Failed | OperationStatus::Cancelled
        )
    }
}
