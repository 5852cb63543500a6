// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The enumeration handshake that populates a [`SlaveTable`] at startup.
//!
//! Walks stack addresses `0, 1, 2, ...`, each time sending a synthetic
//! enumerate request until it is accepted, then polling until a response
//! arrives. The first address that fails either retry budget ends discovery
//! — the no-holes invariant the table itself enforces.

use std::thread;

use drv_slave_table::SlaveTable;
use drv_spi_frame::{decode, encode, Decoded, Packet, FRAME_SIZE};

use crate::config::{SpiEngineConfig, STACK_ENUMERATE};
use crate::transceive::Transceiver;

/// Parses an enumerate response payload into its ordered UID list.
///
/// The list is little-endian `u32`s, terminated by a zero-valued UID or by
/// running out of payload, whichever comes first.
pub fn parse_uid_list(payload: &[u8]) -> Vec<u32> {
    payload
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .take_while(|&uid| uid != 0)
        .collect()
}

/// Runs the full enumeration handshake, populating `slaves` in place.
///
/// Returns once the no-holes boundary is hit (or the table is full); this
/// never fails outright, since "zero slaves found" is a normal, logged
/// outcome (§8 scenario 1), not an engine init error.
pub fn enumerate<T: Transceiver>(
    transceiver: &mut T,
    slaves: &mut SlaveTable,
    config: &SpiEngineConfig,
) {
    for index in 0..drv_slave_table::MAX_SLAVES {
        let select_line = slaves
            .get(index)
            .expect("index within MAX_SLAVES")
            .select_line();
        select_line.assert();

        let request = Packet::new(0, STACK_ENUMERATE, 0, true, 0, &[])
            .expect("empty-payload enumerate request is always well-formed");

        let sent = send_with_retries(transceiver, &request, config);
        if !sent {
            log::info!("no SPI slave answered enumeration at stack address {index}");
            select_line.deassert();
            break;
        }

        match poll_for_response(transceiver, config) {
            Some(packet) => {
                let uids = parse_uid_list(packet.payload());
                log::info!("stack address {index} enumerated with {} UID(s)", uids.len());
                select_line.deassert();
                slaves.mark_present(index, &uids);
            }
            None => {
                log::info!("stack address {index} accepted the enumerate request but never replied");
                select_line.deassert();
                break;
            }
        }
    }

    if slaves.slave_num() == 0 {
        log::warn!("no SPI slaves found during enumeration");
    }
}

fn send_with_retries<T: Transceiver>(
    transceiver: &mut T,
    request: &Packet,
    config: &SpiEngineConfig,
) -> bool {
    let tx = match encode(Some(request), false) {
        Ok(frame) => frame,
        Err(err) => {
            log::error!("enumerate request did not encode: {err}");
            return false;
        }
    };
    let mut rx = [0u8; FRAME_SIZE];

    for attempt in 0..config.enumerate_attempts {
        match transceiver.transceive(&tx, &mut rx) {
            Ok(()) => return true,
            Err(err) => {
                log::debug!("enumerate send attempt {attempt} failed: {err}");
                thread::sleep(config.enumerate_pause);
            }
        }
    }
    false
}

fn poll_for_response<T: Transceiver>(
    transceiver: &mut T,
    config: &SpiEngineConfig,
) -> Option<Packet> {
    let tx = encode(None, false).expect("empty frame always encodes");
    let mut rx = [0u8; FRAME_SIZE];

    for attempt in 0..config.enumerate_attempts {
        if let Err(err) = transceiver.transceive(&tx, &mut rx) {
            log::debug!("enumerate poll attempt {attempt} failed: {err}");
            thread::sleep(config.enumerate_pause);
            continue;
        }
        match decode(&rx) {
            Ok(Decoded::Packet { packet, .. }) => return Some(packet),
            Ok(Decoded::None { .. }) => thread::sleep(config.enumerate_pause),
            Err(err) => log::debug!("enumerate poll attempt {attempt}: {err}"),
        }
    }
    None
}
