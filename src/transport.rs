//! Byte sinks for framed print jobs.
//!
//! The pipeline only needs "write this buffer to device (vendor, product)".
//! [`UsbTransport`] does that over a USB bulk OUT endpoint; the other
//! transports let jobs be captured in memory or dumped to a file.

use log::{debug, info};
use rusb::{Context, Device, DeviceHandle, Direction, TransferType, UsbContext};
use std::{io::Write, time::Duration};

use crate::error::Error;

pub trait Transport {
    /// Writes one complete job in a single attempt.
    fn send(&mut self, vendor_id: u16, product_id: u16, data: &[u8]) -> Result<(), Error>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, vendor_id: u16, product_id: u16, data: &[u8]) -> Result<(), Error> {
        (**self).send(vendor_id, product_id, data)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, vendor_id: u16, product_id: u16, data: &[u8]) -> Result<(), Error> {
        (**self).send(vendor_id, product_id, data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub iface: u8,
    pub setting: u8,
    pub address: u8,
}

/// One interface alternate setting, with its bulk OUT endpoint if it has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub iface: u8,
    pub setting: u8,
    pub bulk_out: Option<u8>,
}

/// Progress of the search for a claimable bulk OUT endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// Next candidate to try.
    Searching(usize),
    Claimed(Endpoint),
    Exhausted,
}

/// Tries each candidate in order until `attempt` succeeds on one that has a
/// bulk OUT endpoint. Candidates without such an endpoint are never claimed.
pub fn claim_first<F>(candidates: &[Candidate], mut attempt: F) -> Claim
where
    F: FnMut(&Candidate) -> Result<(), rusb::Error>,
{
    let mut state = Claim::Searching(0);
    loop {
        state = match state {
            Claim::Searching(i) => match candidates.get(i) {
                None => Claim::Exhausted,
                Some(candidate) => match candidate.bulk_out {
                    None => {
                        debug!("interface {} has no bulk OUT endpoint", candidate.iface);
                        Claim::Searching(i + 1)
                    }
                    Some(address) => match attempt(candidate) {
                        Ok(()) => Claim::Claimed(Endpoint {
                            iface: candidate.iface,
                            setting: candidate.setting,
                            address,
                        }),
                        Err(err) => {
                            debug!(
                                "interface {} error, trying next one: {}",
                                candidate.iface, err
                            );
                            Claim::Searching(i + 1)
                        }
                    },
                },
            },
            done => return done,
        };
    }
}

/// An opened USB device, not yet claimed.
pub struct UsbDevice {
    device: Device<Context>,
    handle: DeviceHandle<Context>,
}

/// A claimed interface and its bulk OUT endpoint. The interface is released
/// on drop.
pub struct BulkOut {
    handle: DeviceHandle<Context>,
    endpoint: Endpoint,
}

impl BulkOut {
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }
}

impl Drop for BulkOut {
    fn drop(&mut self) {
        if let Err(err) = self.handle.release_interface(self.endpoint.iface) {
            debug!(
                "failed to release interface {}: {:?}",
                self.endpoint.iface, err
            );
        }
    }
}

pub struct UsbTransport {
    context: Context,
    timeout: Duration,
}

impl UsbTransport {
    pub fn new() -> Result<Self, Error> {
        Ok(UsbTransport {
            context: Context::new()?,
            timeout: Duration::from_secs(10),
        })
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        UsbTransport { timeout, ..self }
    }

    pub fn open(&self, vendor_id: u16, product_id: u16) -> Result<UsbDevice, Error> {
        let devices = self.context.devices()?;

        if devices.is_empty() {
            debug!("device list is empty");
        }

        let mut open_error = None;
        for device in devices.iter() {
            let device_desc = match device.device_descriptor() {
                Ok(d) => d,
                Err(err) => {
                    debug!("{:?}", err);
                    continue;
                }
            };

            if device_desc.vendor_id() == vendor_id && device_desc.product_id() == product_id {
                match device.open() {
                    Ok(handle) => {
                        info!(
                            "opened {:04x}:{:04x} on bus {} address {}",
                            vendor_id,
                            product_id,
                            device.bus_number(),
                            device.address()
                        );
                        return Ok(UsbDevice { device, handle });
                    }
                    Err(err) => {
                        debug!("Failed to open device: {:?}", err);
                        open_error = Some(err);
                    }
                }
            }
        }

        Err(unopened(open_error, vendor_id, product_id))
    }

    /// Claims the first interface of the active configuration that exposes a
    /// bulk OUT endpoint, detaching the kernel driver where the platform
    /// allows it.
    pub fn claim_bulk_out_endpoint(&self, device: UsbDevice) -> Result<BulkOut, Error> {
        let UsbDevice { device, handle } = device;
        let candidates = Self::candidates(&device)?;
        let detach = rusb::supports_detach_kernel_driver();

        let claim = claim_first(&candidates, |candidate| {
            if detach && handle.kernel_driver_active(candidate.iface).unwrap_or(false) {
                handle.detach_kernel_driver(candidate.iface)?;
                info!("Detached kernel driver from interface {}", candidate.iface);
            }
            handle.claim_interface(candidate.iface)?;
            if candidate.setting != 0 {
                if let Err(err) = handle.set_alternate_setting(candidate.iface, candidate.setting) {
                    handle.release_interface(candidate.iface).ok();
                    return Err(err);
                }
            }
            Ok(())
        });

        match claim {
            Claim::Claimed(endpoint) => {
                info!(
                    "claimed interface {} endpoint {:#04x}",
                    endpoint.iface, endpoint.address
                );
                Ok(BulkOut { handle, endpoint })
            }
            _ => Err(Error::NoEndpoint),
        }
    }

    fn candidates(device: &Device<Context>) -> Result<Vec<Candidate>, Error> {
        let config_desc = match device.active_config_descriptor() {
            Ok(c) => c,
            Err(err) => {
                debug!("no active configuration ({:?}), using the first", err);
                device.config_descriptor(0)?
            }
        };

        let mut candidates = Vec::new();
        for interface in config_desc.interfaces() {
            for interface_desc in interface.descriptors() {
                let bulk_out = interface_desc
                    .endpoint_descriptors()
                    .find(|endpoint_desc| {
                        endpoint_desc.direction() == Direction::Out
                            && endpoint_desc.transfer_type() == TransferType::Bulk
                    })
                    .map(|endpoint_desc| endpoint_desc.address());
                candidates.push(Candidate {
                    iface: interface_desc.interface_number(),
                    setting: interface_desc.setting_number(),
                    bulk_out,
                });
            }
        }
        Ok(candidates)
    }

    pub fn write(&self, endpoint: &BulkOut, data: &[u8]) -> Result<(), Error> {
        let written = endpoint
            .handle
            .write_bulk(endpoint.endpoint.address, data, self.timeout)
            .map_err(Error::TransferError)?;
        if written != data.len() {
            debug!(
                "write error: bytes wrote {} != bytes supplied {}, possibly timeout ?",
                written,
                data.len()
            );
            return Err(Error::ShortWrite {
                written,
                expected: data.len(),
            });
        }
        Ok(())
    }
}

impl Transport for UsbTransport {
    fn send(&mut self, vendor_id: u16, product_id: u16, data: &[u8]) -> Result<(), Error> {
        let device = self.open(vendor_id, product_id)?;
        let endpoint = self.claim_bulk_out_endpoint(device)?;
        self.write(&endpoint, data)
    }
}

/// A job captured by [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentJob {
    pub vendor_id: u16,
    pub product_id: u16,
    pub data: Vec<u8>,
}

/// Keeps every job in memory instead of sending it.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    writes: Vec<SentJob>,
    unplugged: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose device is never found.
    pub fn unplugged() -> Self {
        MemoryTransport {
            writes: Vec::new(),
            unplugged: true,
        }
    }

    pub fn writes(&self) -> &[SentJob] {
        &self.writes
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, vendor_id: u16, product_id: u16, data: &[u8]) -> Result<(), Error> {
        if self.unplugged {
            return Err(Error::DeviceNotFound {
                vendor_id,
                product_id,
            });
        }
        self.writes.push(SentJob {
            vendor_id,
            product_id,
            data: data.to_vec(),
        });
        Ok(())
    }
}

/// Writes jobs to any `Write`, e.g. a file to be replayed later.
pub struct WriterTransport<W: Write>(W);

impl<W: Write> WriterTransport<W> {
    pub fn new(writer: W) -> Self {
        WriterTransport(writer)
    }

    pub fn into_inner(self) -> W {
        self.0
    }
}

impl<W: Write> Transport for WriterTransport<W> {
    fn send(&mut self, vendor_id: u16, product_id: u16, data: &[u8]) -> Result<(), Error> {
        debug!(
            "writing {} bytes for {:04x}:{:04x}",
            data.len(),
            vendor_id,
            product_id
        );
        self.0.write_all(data)?;
        self.0.flush()?;
        Ok(())
    }
}

// An empty bus and a bus without the device both end up here.
fn unopened(open_error: Option<rusb::Error>, vendor_id: u16, product_id: u16) -> Error {
    match open_error {
        // the device is there but we may not touch it
        Some(err) => Error::UsbError(err),
        None => Error::DeviceNotFound {
            vendor_id,
            product_id,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_device_is_not_found() {
        match unopened(None, 0x04F9, 0x2028) {
            Error::DeviceNotFound {
                vendor_id,
                product_id,
            } => {
                assert_eq!(vendor_id, 0x04F9);
                assert_eq!(product_id, 0x2028);
            }
            other => panic!("expected DeviceNotFound, got {:?}", other),
        }
        assert!(matches!(
            unopened(Some(rusb::Error::Access), 0x04F9, 0x2028),
            Error::UsbError(rusb::Error::Access)
        ));
    }

    fn candidate(iface: u8, bulk_out: Option<u8>) -> Candidate {
        Candidate {
            iface,
            setting: 0,
            bulk_out,
        }
    }

    #[test]
    fn claims_first_interface_with_bulk_out() {
        let candidates = [candidate(0, None), candidate(1, Some(0x02)), candidate(2, Some(0x03))];
        let mut tried = Vec::new();
        let claim = claim_first(&candidates, |c| {
            tried.push(c.iface);
            Ok(())
        });

        assert_eq!(
            claim,
            Claim::Claimed(Endpoint {
                iface: 1,
                setting: 0,
                address: 0x02
            })
        );
        assert_eq!(tried, vec![1]);
    }

    #[test]
    fn moves_past_interfaces_that_fail_to_claim() {
        let candidates = [candidate(0, Some(0x01)), candidate(1, Some(0x02))];
        let claim = claim_first(&candidates, |c| {
            if c.iface == 0 {
                Err(rusb::Error::Busy)
            } else {
                Ok(())
            }
        });

        assert!(matches!(claim, Claim::Claimed(Endpoint { iface: 1, .. })));
    }

    #[test]
    fn exhausted_when_nothing_can_be_claimed() {
        let candidates = [candidate(0, Some(0x01)), candidate(1, None)];
        assert_eq!(
            claim_first(&candidates, |_| Err(rusb::Error::Access)),
            Claim::Exhausted
        );
        assert_eq!(claim_first(&[], |_| Ok(())), Claim::Exhausted);
    }

    #[test]
    fn memory_transport_records_jobs() {
        let mut transport = MemoryTransport::new();
        transport.send(0x04F9, 0x2028, &[1, 2, 3]).unwrap();

        assert_eq!(
            transport.writes(),
            &[SentJob {
                vendor_id: 0x04F9,
                product_id: 0x2028,
                data: vec![1, 2, 3]
            }]
        );
    }

    #[test]
    fn unplugged_memory_transport_reports_missing_device() {
        let mut transport = MemoryTransport::unplugged();
        let result = (&mut transport).send(0x04F9, 0x2028, &[1]);
        assert!(matches!(
            result,
            Err(Error::DeviceNotFound {
                vendor_id: 0x04F9,
                product_id: 0x2028
            })
        ));
        assert!(transport.writes().is_empty());
    }

    #[test]
    fn writer_transport_writes_everything() {
        let mut transport = WriterTransport::new(Vec::new());
        transport.send(0x04F9, 0x2028, &[0x1B, 0x40]).unwrap();
        transport.send(0x04F9, 0x2028, &[0x1A]).unwrap();
        assert_eq!(transport.into_inner(), vec![0x1B, 0x40, 0x1A]);
    }
}
