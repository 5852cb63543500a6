// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The steady-state polling loop: owns the SPI device and the slave table,
//! arbitrates send-vs-poll against the outbound queue, and forwards
//! received packets through the event bridge.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use drv_slave_table::{SelectLine, Slave, SlaveTable};
use drv_spi_frame::{decode, encode, Decoded, DecodeError, EncodeError, Packet, FRAME_SIZE};

use crate::bridge::{event_bridge, BridgeConsumer, BridgeProducer};
use crate::config::SpiEngineConfig;
use crate::enumerate::enumerate;
use crate::error::EngineError;
use crate::outbound::OutboundQueue;
use crate::transceive::{SpidevTransceiver, Transceiver};

/// Everything outside the SPI thread needs to talk to the engine: the
/// outbound queue to push onto, the slave table to resolve UIDs against
/// (see `drv-router`'s SPI `Stack`), the event-bridge read end to register
/// with the event loop, and the flag that requests shutdown.
///
/// The slave table is read-only after enumeration except for the busy bit,
/// which the SPI thread alone flips every tick; the mutex exists so the
/// router can share the table safely, not because contention is expected.
pub struct EngineHandle {
    pub outbound: Arc<OutboundQueue>,
    pub slaves: Arc<Mutex<SlaveTable>>,
    pub running: Arc<AtomicBool>,
    pub bridge_consumer: BridgeConsumer,
}

enum TickOutcome {
    /// The transaction completed and its reply decoded cleanly (which may
    /// still be `Decoded::None`, i.e. `READ_NONE`).
    Sent(Decoded),
    /// The reply failed to decode: `READ_ERROR`.
    ReadError(DecodeError),
    /// The outbound packet was malformed before it ever reached the bus.
    EncodeError(EncodeError),
    /// The ioctl transaction itself failed.
    IoError(io::Error),
}

/// Owns the SPI device and drives the 500 µs steady-state loop described in
/// §4.3. Constructed via [`SpiEngine::init`]; consumed by [`SpiEngine::run`]
/// on its own thread.
pub struct SpiEngine<T: Transceiver> {
    transceiver: T,
    slaves: Arc<Mutex<SlaveTable>>,
    outbound: Arc<OutboundQueue>,
    bridge: BridgeProducer,
    running: Arc<AtomicBool>,
    config: SpiEngineConfig,
    cycle: usize,
}

impl SpiEngine<SpidevTransceiver> {
    /// Opens the real spidev device, runs enumeration, and wires up the
    /// event bridge and outbound queue.
    ///
    /// `select_lines` must have exactly [`drv_slave_table::MAX_SLAVES`]
    /// entries, one GPIO (or null) line per stack address.
    pub fn init(
        config: SpiEngineConfig,
        select_lines: Vec<Box<dyn SelectLine>>,
    ) -> Result<(Self, EngineHandle), EngineError> {
        let transceiver = SpidevTransceiver::open(&config)?;
        Self::init_with_transceiver(transceiver, config, select_lines)
    }
}

impl<T: Transceiver> SpiEngine<T> {
    /// Same as [`SpiEngine::init`] but against a caller-supplied
    /// transceiver; this is how engine-level tests run the real enumeration
    /// and polling logic against [`crate::transceive::fake::FakeTransceiver`]
    /// without a real bus.
    pub fn init_with_transceiver(
        mut transceiver: T,
        config: SpiEngineConfig,
        select_lines: Vec<Box<dyn SelectLine>>,
    ) -> Result<(Self, EngineHandle), EngineError> {
        assert_eq!(
            select_lines.len(),
            drv_slave_table::MAX_SLAVES,
            "one select line per stack address"
        );
        let slaves: Vec<Slave> = select_lines
            .into_iter()
            .enumerate()
            .map(|(i, line)| Slave::new(i as u8, line))
            .collect();
        let mut slave_table = SlaveTable::new(slaves);

        enumerate(&mut transceiver, &mut slave_table, &config);

        let (producer, consumer) =
            event_bridge().map_err(|source| EngineError::BridgePipe { source })?;
        let outbound = Arc::new(OutboundQueue::new());
        let slaves = Arc::new(Mutex::new(slave_table));
        let running = Arc::new(AtomicBool::new(true));

        let engine = SpiEngine {
            transceiver,
            slaves: slaves.clone(),
            outbound: outbound.clone(),
            bridge: producer,
            running: running.clone(),
            config,
            cycle: 0,
        };
        let handle = EngineHandle {
            outbound,
            slaves,
            running,
            bridge_consumer: consumer,
        };
        Ok((engine, handle))
    }

    /// Runs the steady-state loop until `running` is cleared. Intended to be
    /// the body of the dedicated SPI thread.
    ///
    /// If enumeration found zero slaves, there is nothing this loop could
    /// ever usefully poll, so it logs and returns immediately instead of
    /// spinning at the poll period forever (§8 scenario 1: "SPI thread logs
    /// 'no SPI slaves' and exits").
    pub fn run(mut self) {
        if self.slaves.lock().unwrap().slave_num() == 0 {
            log::warn!("no SPI slaves found; SPI thread exiting");
            return;
        }

        let mut deadline = Instant::now() + self.config.poll_period;
        while self.running.load(Ordering::Acquire) {
            self.tick();

            deadline += self.config.poll_period;
            if let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
                thread::sleep(remaining);
            }
            // Otherwise we're already late; the loop proceeds immediately
            // and the deadline naturally catches up on the next tick.
        }
    }

    /// One iteration of the loop body: arbitrate send-vs-poll, run one
    /// duplex transaction, and act on the result. Exposed at crate level so
    /// tests can drive the loop deterministically without sleeping.
    pub(crate) fn tick(&mut self) {
        let slave_num = self.slaves.lock().unwrap().slave_num();
        if slave_num == 0 && self.outbound.is_empty() {
            return;
        }

        let head = self.outbound.peek();
        let (select_index, packet_to_send) = match head {
            Some(entry) => (entry.slave_index, Some(entry.packet)),
            None => match next_poll_index(self.cycle, slave_num) {
                Some(index) => (index, None),
                None => return,
            },
        };

        let busy_known = packet_to_send.is_some() && {
            let slaves = self.slaves.lock().unwrap();
            slaves.get(select_index).map(|s| s.is_busy()).unwrap_or(false)
        };

        self.with_select_line(select_index, |line| line.assert());
        let outcome = self.transceive_one(packet_to_send.as_ref(), busy_known);
        self.with_select_line(select_index, |line| line.deassert());

        match &outcome {
            TickOutcome::Sent(_) if packet_to_send.is_some() && !busy_known => {
                self.outbound.pop();
            }
            TickOutcome::Sent(_) => {
                if busy_known {
                    log::debug!("slave {select_index} still busy; retrying next tick");
                }
            }
            TickOutcome::EncodeError(err) => {
                log::error!("SEND_ERROR dropping queued packet: {err}");
                if packet_to_send.is_some() {
                    self.outbound.pop();
                }
            }
            TickOutcome::IoError(err) => {
                log::error!("SEND_ERROR transceive failed: {err}");
                if packet_to_send.is_some() {
                    self.outbound.pop();
                }
            }
            TickOutcome::ReadError(err) => {
                log::error!("READ_ERROR: {err}");
            }
        }

        if let TickOutcome::Sent(decoded) = outcome {
            self.slaves
                .lock()
                .unwrap()
                .mark_busy(select_index, decoded.busy());
            match decoded {
                Decoded::Packet { packet, .. } => {
                    log::debug!("DATA_RECEIVED from slave {select_index}");
                    if let Err(err) = self.bridge.hand_off(packet) {
                        log::error!("event bridge hand-off failed: {err}");
                    }
                }
                Decoded::None { .. } => {
                    log::trace!("READ_NONE from slave {select_index}");
                }
            }
        }

        if packet_to_send.is_none() {
            self.cycle = (self.cycle + 1) % slave_num.max(1);
        }
    }

    fn with_select_line(&self, index: usize, f: impl FnOnce(&dyn SelectLine)) {
        let slaves = self.slaves.lock().unwrap();
        if let Some(slave) = slaves.get(index) {
            f(slave.select_line());
        }
    }

    fn transceive_one(&mut self, packet: Option<&Packet>, busy_known: bool) -> TickOutcome {
        let tx = match encode(packet, busy_known) {
            Ok(frame) => frame,
            Err(err) => return TickOutcome::EncodeError(err),
        };
        let mut rx = [0u8; FRAME_SIZE];
        if let Err(err) = self.transceiver.transceive(&tx, &mut rx) {
            return TickOutcome::IoError(err);
        }
        match decode(&rx) {
            Ok(decoded) => TickOutcome::Sent(decoded),
            Err(err) => TickOutcome::ReadError(err),
        }
    }
}

fn next_poll_index(cycle: usize, slave_num: usize) -> Option<usize> {
    if slave_num == 0 {
        None
    } else {
        Some(cycle % slave_num)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::QueuedPacket;
    use crate::transceive::fake::FakeTransceiver;
    use drv_slave_table::NullSelectLine;

    fn null_select_lines() -> Vec<Box<dyn SelectLine>> {
        (0..drv_slave_table::MAX_SLAVES)
            .map(|_| Box::new(NullSelectLine) as Box<dyn SelectLine>)
            .collect()
    }

    fn frame_with_payload(uid: u32, payload: &[u8]) -> [u8; FRAME_SIZE] {
        let packet = Packet::new(uid, 1, 0, false, 0, payload).unwrap();
        encode(Some(&packet), false).unwrap()
    }

    fn test_config() -> SpiEngineConfig {
        SpiEngineConfig {
            enumerate_attempts: 1,
            enumerate_pause: std::time::Duration::from_millis(1),
            poll_period: std::time::Duration::from_micros(1),
            ..Default::default()
        }
    }

    #[test]
    fn empty_stack_and_empty_queue_tick_is_a_no_op() {
        let fake = FakeTransceiver::new();
        let (mut engine, _handle) =
            SpiEngine::init_with_transceiver(fake, test_config(), null_select_lines()).unwrap();
        engine.tick();
        assert_eq!(engine.transceiver.sent.len(), 0);
    }

    #[test]
    fn queued_packet_is_popped_once_sent() {
        let fake = FakeTransceiver::new();
        let (mut engine, handle) =
            SpiEngine::init_with_transceiver(fake, test_config(), null_select_lines()).unwrap();
        // Enumeration found nothing, but the queue doesn't require a slave
        // to exist in the table to be addressed by index for this test.
        handle.outbound.push(QueuedPacket {
            slave_index: 0,
            packet: Packet::new(1, 0, 0, false, 0, &[1, 2, 3]).unwrap(),
        });

        engine.tick();

        assert!(handle.outbound.is_empty());
        assert_eq!(engine.transceiver.sent.len(), 1);
    }

    #[test]
    fn busy_slave_is_not_popped_until_it_clears() {
        let fake = FakeTransceiver::new();
        let (mut engine, handle) =
            SpiEngine::init_with_transceiver(fake, test_config(), null_select_lines()).unwrap();
        // Manually mark slave 0 present+busy to exercise the busy path
        // without depending on enumeration timing in this unit test.
        {
            let mut slaves = engine.slaves.lock().unwrap();
            slaves.mark_present(0, &[0x42]);
            slaves.mark_busy(0, true);
        }

        handle.outbound.push(QueuedPacket {
            slave_index: 0,
            packet: Packet::new(0x42, 0, 0, false, 0, &[9]).unwrap(),
        });

        engine.tick();

        // Busy: the packet must still be queued, and the frame actually put
        // on the wire must have been the empty keep-alive, not the packet.
        assert_eq!(handle.outbound.len(), 1);
        let sent = engine.transceiver.sent.last().unwrap();
        assert_eq!(sent[1], drv_spi_frame::EMPTY_FRAME_LEN);
    }

    #[test]
    fn received_packet_reaches_the_bridge_consumer() {
        let mut fake = FakeTransceiver::new();
        fake.push_response(frame_with_payload(0x0000_ABCD, &[7, 7, 7]));
        let (mut engine, handle) =
            SpiEngine::init_with_transceiver(fake, test_config(), null_select_lines()).unwrap();
        engine.slaves.lock().unwrap().mark_present(0, &[0x0000_ABCD]);

        let received = Arc::new(std::sync::Mutex::new(None));
        let received2 = received.clone();
        let consumer_thread = {
            let consumer = handle.bridge_consumer;
            std::thread::spawn(move || {
                consumer
                    .consume(|packet| {
                        *received2.lock().unwrap() = Some(packet);
                    })
                    .unwrap();
            })
        };

        // Round-robin will poll slave 0 first since it's the only present
        // slave and `cycle` starts at 0.
        engine.tick();
        consumer_thread.join().unwrap();

        let packet = received.lock().unwrap().take().unwrap();
        assert_eq!(packet.payload(), &[7, 7, 7]);
    }

    #[test]
    fn corrupted_reply_is_logged_and_dropped_and_the_next_tick_still_runs() {
        let mut fake = FakeTransceiver::new();
        let mut corrupted = frame_with_payload(0x0000_ABCD, &[1, 2, 3]);
        corrupted[4] ^= 0x01; // flips a payload byte, breaking the trailing hash
        fake.push_response(corrupted);
        let (mut engine, _handle) =
            SpiEngine::init_with_transceiver(fake, test_config(), null_select_lines()).unwrap();
        engine.slaves.lock().unwrap().mark_present(0, &[0x0000_ABCD]);

        // `BridgeProducer::hand_off` blocks on its semaphore until the event
        // loop consumes the packet; there is no consumer here, so if this
        // tick wrongly handed the corrupted frame to the bridge it would
        // never return. Both ticks completing is itself the assertion that
        // nothing reached the bridge, on top of the explicit checks below.
        engine.tick();
        assert!(
            !engine.slaves.lock().unwrap().get(0).unwrap().is_busy(),
            "a read error must not be mistaken for a busy reply"
        );

        // The engine itself must be unaffected: the next tick runs normally
        // rather than getting stuck on the previous read error.
        engine.tick();
        assert_eq!(engine.transceiver.sent.len(), 2);
    }

    #[test]
    fn run_exits_immediately_when_no_slaves_were_enumerated() {
        let fake = FakeTransceiver::new();
        let (engine, _handle) =
            SpiEngine::init_with_transceiver(fake, test_config(), null_select_lines()).unwrap();
        assert_eq!(engine.slaves.lock().unwrap().slave_num(), 0);

        // If `run` ever went back to spinning the poll loop on an empty
        // stack, this join would never return.
        let thread = std::thread::spawn(move || engine.run());
        thread.join().unwrap();
    }
}
