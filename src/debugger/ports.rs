//! Debug port ownership.
//!
//! A debug port belongs to exactly one live run. Reservations go through a
//! process-wide set so concurrent runs cannot collide even before either has
//! bound its listener; the bind probe catches ports taken by other processes.

use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::net::TcpListener;
use std::sync::Mutex;
use tracing::debug;

static RESERVED: Lazy<Mutex<HashSet<u16>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Exclusive claim on a debug port for the duration of one run. Released on
/// drop.
#[derive(Debug)]
pub struct PortReservation {
    port: u16,
}

impl PortReservation {
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for PortReservation {
    fn drop(&mut self) {
        RESERVED.lock().expect("port set lock").remove(&self.port);
        debug!(port = self.port, "debug port released");
    }
}

fn try_claim(port: u16) -> Option<PortReservation> {
    let mut reserved = RESERVED.lock().expect("port set lock");
    if reserved.contains(&port) {
        return None;
    }
    // Probe that the port is actually bindable right now; the listener is
    // dropped immediately, the set keeps other runs off the port.
    if TcpListener::bind(("127.0.0.1", port)).is_err() {
        return None;
    }
    reserved.insert(port);
    Some(PortReservation { port })
}

/// Reserve a caller-supplied port.
pub fn reserve(port: u16) -> Result<PortReservation> {
    match try_claim(port) {
        Some(reservation) => Ok(reservation),
        None => bail!("debug port {port} is already in use"),
    }
}

/// Allocate a free port from the configured range.
pub fn allocate(range_start: u16, range_end: u16) -> Result<PortReservation> {
    for port in range_start..=range_end {
        if let Some(reservation) = try_claim(port) {
            debug!(port, "debug port allocated");
            return Ok(reservation);
        }
    }
    bail!("no free debug port in {range_start}–{range_end}")
}
