use std::thread;

use embedded_hal::spi::{ErrorType, SpiBus};

use super::{Shared, Trace};
use crate::{spi::SpiClock, HostError};

/// Mock SPI bus
///
/// Answers every byte with its bitwise inverse unless a reply was queued with
/// [`MockChip::respond_with`](super::MockChip::respond_with).
#[derive(Debug, Clone)]
pub struct MockBus {
    pub(crate) state: Shared,
}

impl ErrorType for MockBus {
    type Error = HostError;
}

impl SpiBus for MockBus {
    fn read(&mut self, words: &mut [u8]) -> Result<(), HostError> {
        let out = vec![0; words.len()];
        self.transfer(words, &out)
    }

    fn write(&mut self, words: &[u8]) -> Result<(), HostError> {
        let mut sink = vec![0; words.len()];
        self.transfer(&mut sink, words)
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), HostError> {
        let delay = {
            let mut state = self.state.get();
            if std::mem::take(&mut state.fail_next_transfer) {
                return Err(HostError::Simulated("transfer failed"));
            }
            state.trace.push(Trace::Transfer {
                out: write.to_vec(),
            });

            let reply = state.reply.take();
            for (i, byte) in read.iter_mut().enumerate() {
                let sent = write.get(i).copied().unwrap_or(0);
                *byte = match &reply {
                    Some(reply) => reply.get(i).copied().unwrap_or(0),
                    None => !sent,
                };
            }
            state.transfer_delay
        };

        if !delay.is_zero() {
            thread::sleep(delay);
        }
        Ok(())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), HostError> {
        let out = words.to_vec();
        self.transfer(words, &out)
    }

    fn flush(&mut self) -> Result<(), HostError> {
        Ok(())
    }
}

impl SpiClock for MockBus {
    fn set_speed_hz(&mut self, hz: u32) -> Result<(), HostError> {
        let mut state = self.state.get();
        state.speed_hz = hz;
        state.trace.push(Trace::Speed(hz));
        Ok(())
    }
}
