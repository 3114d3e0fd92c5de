//! Claim a USB interface and move bytes in and out of it (spec.md §4.1).
//!
//! Grounded on `libusb-async`'s `rusb`-backed async wrapper: all blocking
//! libusb calls run on `spawn_blocking` and the handle itself is cheaply
//! cloneable, so unlike the teacher's gs_usb driver (which serializes every
//! call through a dedicated OS thread because gs_usb's multi-channel
//! bookkeeping is not thread-safe) Jensen's single-channel, single-session
//! transport can issue calls directly from the Session's task.

use std::time::Duration;

use libusb_async::{DeviceHandle, Direction, Recipient, RequestType, UsbAsyncError, devices, request_type};
use log::{debug, info, warn};

use crate::error::{JensenError, JensenResult};
use crate::model::{DeviceProfile, VENDOR_ID};
use crate::protocol::constants::{
    USB_ALT_SETTING, USB_CONFIGURATION, USB_ENDPOINT_IN, USB_ENDPOINT_OUT, USB_INTERFACE,
    USB_READ_BUFFER_CAP,
};

/// Result of a bulk read: either data, or an explicit empty-on-timeout
/// marker so callers can tell "nothing arrived in time" apart from "the
/// device sent a genuinely empty packet" (relevant for EOF-style sentinels
/// elsewhere in the protocol).
#[derive(Debug)]
pub enum ReadOutcome {
    Data(Vec<u8>),
    TimedOut,
}

/// A framed byte pipe to one Jensen device.
pub struct Transport {
    handle: DeviceHandle,
    released: bool,
}

impl Transport {
    /// Open the first device matching the Jensen vendor id and a recognized
    /// product id, claim configuration 1 / interface 0 / alt 0. If `serial`
    /// is given, only a device whose serial-number string descriptor
    /// matches exactly is claimed; other Jensen devices found along the way
    /// are left untouched.
    pub async fn claim(serial: Option<&str>) -> JensenResult<(Transport, DeviceProfile)> {
        let candidates = devices().await.map_err(JensenError::from)?;

        for device in candidates {
            let descriptor = match device.device_descriptor().await {
                Ok(d) => d,
                Err(_) => continue,
            };

            let Some(profile) = DeviceProfile::from_ids(descriptor.vendor_id(), descriptor.product_id())
            else {
                continue;
            };

            let handle = match device.open().await {
                Ok(h) => h,
                Err(UsbAsyncError::Usb(rusb::Error::Access)) => return Err(JensenError::AccessDenied),
                Err(_) => continue,
            };

            if let Some(wanted) = serial {
                match handle.read_serial_number_string_ascii(&descriptor).await {
                    Ok(found) if found == wanted => {}
                    _ => {
                        debug!("skipping {} not matching configured serial {wanted}", profile.model);
                        continue;
                    }
                }
            }

            let _ = handle.set_auto_detach_kernel_driver(true).await;
            handle
                .set_active_configuration(USB_CONFIGURATION)
                .await
                .map_err(JensenError::from)?;
            handle
                .claim_interface(USB_INTERFACE)
                .await
                .map_err(JensenError::from)?;

            info!(
                "claimed {} (vid={:#06x} pid={:#06x}) iface={} alt={}",
                profile.model, VENDOR_ID, profile.product_id, USB_INTERFACE, USB_ALT_SETTING
            );

            return Ok((
                Transport {
                    handle,
                    released: false,
                },
                profile,
            ));
        }

        Err(JensenError::NotFound)
    }

    pub async fn write(&self, bytes: &[u8]) -> JensenResult<()> {
        let written = self
            .handle
            .write_bulk(USB_ENDPOINT_OUT, bytes, Duration::from_secs(5))
            .await
            .map_err(JensenError::from)?;

        if written != bytes.len() {
            warn!("short write: {written}/{} bytes", bytes.len());
            return Err(JensenError::Io(std::io::ErrorKind::WriteZero));
        }
        Ok(())
    }

    /// Read up to [`USB_READ_BUFFER_CAP`] bytes, retrying once after
    /// clearing a stall. Returns [`ReadOutcome::TimedOut`] (not an error) if
    /// no data arrives within `timeout`.
    pub async fn read(&self, timeout: Duration) -> JensenResult<ReadOutcome> {
        let mut buf = vec![0u8; USB_READ_BUFFER_CAP];

        match self.handle.read_bulk(USB_ENDPOINT_IN, &mut buf, timeout).await {
            Ok(n) => {
                buf.truncate(n);
                debug!("read {n} bytes");
                Ok(ReadOutcome::Data(buf))
            }
            Err(UsbAsyncError::Usb(rusb::Error::Timeout)) => Ok(ReadOutcome::TimedOut),
            Err(UsbAsyncError::Usb(rusb::Error::Pipe)) => {
                warn!("IN endpoint stalled, clearing halt and retrying once");
                self.handle
                    .clear_halt(USB_ENDPOINT_IN)
                    .await
                    .map_err(JensenError::from)?;

                let mut retry_buf = vec![0u8; USB_READ_BUFFER_CAP];
                match self
                    .handle
                    .read_bulk(USB_ENDPOINT_IN, &mut retry_buf, timeout)
                    .await
                {
                    Ok(n) => {
                        retry_buf.truncate(n);
                        Ok(ReadOutcome::Data(retry_buf))
                    }
                    Err(UsbAsyncError::Usb(rusb::Error::Timeout)) => Ok(ReadOutcome::TimedOut),
                    Err(e) => Err(JensenError::from(e)),
                }
            }
            Err(e) => Err(JensenError::from(e)),
        }
    }

    /// Close the interface. Idempotent.
    pub async fn release(&mut self) -> JensenResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.handle
            .release_interface(USB_INTERFACE)
            .await
            .map_err(JensenError::from)
    }
}

/// Helper mirroring `libusb-async`'s `request_type` re-export, kept here so
/// callers configuring vendor control transfers (firmware upload handshakes
/// on some models) don't need to import `rusb` directly.
pub fn vendor_out_request_type() -> u8 {
    request_type(Direction::Out, RequestType::Vendor, Recipient::Interface)
}
