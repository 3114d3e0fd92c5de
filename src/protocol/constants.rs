#![allow(dead_code)]

use std::time::Duration;

// USB identity (spec.md §6).
pub const USB_CONFIGURATION: u8 = 1;
pub const USB_INTERFACE: u8 = 0;
pub const USB_ALT_SETTING: u8 = 0;
pub const USB_ENDPOINT_OUT: u8 = 0x01;
pub const USB_ENDPOINT_IN: u8 = 0x82;

// Transport defaults.
pub const USB_READ_BUFFER_CAP: usize = 50 * 1024;
pub const USB_DEFAULT_TIMEOUT: Duration = Duration::from_millis(5_000);

// Wire framing (spec.md §4.2 / §6).
pub const SYNC_BYTES: [u8; 2] = [0x12, 0x34];
pub const FRAME_HEADER_LEN: usize = 12;
pub const MAX_BODY_LEN: usize = 100 * 1024;

// Command codes (spec.md §6).
pub const CMD_GET_DEVICE_INFO: u16 = 0x01;
pub const CMD_GET_TIME: u16 = 0x02;
pub const CMD_SET_TIME: u16 = 0x03;
pub const CMD_LIST_FILES: u16 = 0x04;
pub const CMD_STREAM_FILE: u16 = 0x05;
pub const CMD_GET_FILE_COUNT: u16 = 0x06;
pub const CMD_DELETE_FILE: u16 = 0x07;
pub const CMD_REQUEST_FIRMWARE_UPGRADE: u16 = 0x08;
pub const CMD_FIRMWARE_UPLOAD: u16 = 0x09;
pub const CMD_GET_SETTINGS: u16 = 0x0B;
pub const CMD_SET_SETTINGS: u16 = 0x0C;
pub const CMD_GET_CARD_INFO: u16 = 0x10;
pub const CMD_FORMAT_CARD: u16 = 0x11;
pub const CMD_GET_RECORDING_FILE: u16 = 0x12;
pub const CMD_BLUETOOTH_SCAN: u16 = 0x1001;
pub const CMD_BLUETOOTH_CMD: u16 = 0x1002;
pub const CMD_BLUETOOTH_STATUS: u16 = 0x1003;
pub const CMD_FACTORY_RESET: u16 = 0xF00B;

// Status byte values (spec.md §6).
pub const STATUS_SUCCESS: u8 = 0;
pub const STATUS_NOT_EXISTS: u8 = 1;
pub const STATUS_BUSY_OR_FAILED: u8 = 2;
pub const STATUS_CARD_FULL: u8 = 3;
pub const STATUS_CARD_ERROR: u8 = 4;

// Format-card magic body (spec.md §4.3).
pub const FORMAT_CARD_MAGIC: [u8; 4] = [1, 2, 3, 4];

// File-list stream framing (spec.md §4.4).
pub const FILE_LIST_HEADER_MARKER: [u8; 2] = [0xFF, 0xFF];
pub const FILE_LIST_MIN_ENTRY_LEN: usize = 23;
pub const FILE_LIST_SIGNATURE_LEN: usize = 16;

// Streaming no-progress timeout (spec.md §5).
pub const STREAM_STALL_THRESHOLD: u32 = 5;
pub const STREAM_STALL_INTERVAL: Duration = Duration::from_secs(2);

// Feature gate firmware thresholds (spec.md §4.3), keyed by (model, feature).
pub const FW_SETTINGS_H1: u32 = 327714;
pub const FW_SETTINGS_H1E: u32 = 327714;
pub const FW_FACTORY_RESET_H1: u32 = 327705;
pub const FW_FACTORY_RESET_H1E: u32 = 327705;
pub const FW_STORAGE_OPS_H1: u32 = 327733;
pub const FW_STORAGE_OPS_H1E: u32 = 327733;
pub const FW_BLUETOOTH_AUDIO_PROMPT_H1: u32 = 327940;
pub const FW_BLUETOOTH_AUDIO_PROMPT_H1E: u32 = 393476;
pub const FW_RESTORE_FACTORY_SETTINGS_H1: u32 = 327944;
pub const FW_RESTORE_FACTORY_SETTINGS_H1E: u32 = 393476;

// Firmware firmware-vs-legacy cutover for the ListFiles count-header
// announcement (spec.md §8 scenario 2: 327700 omits it, 327800 includes it).
pub const FW_LIST_FILES_COUNT_HEADER: u32 = 327722;

pub const CANCEL_DRAIN_TIMEOUT: Duration = Duration::from_millis(250);
