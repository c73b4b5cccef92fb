//! Linux host backends
//!
//! - [`CdevChip`]: GPIO lines from `/dev/gpiochipN` through the character device
//!   interface, with rising-edge event lines for the DIOs ([`CdevEdges`])
//! - [`SpidevBus`]: an SPI bus from a `/dev/spidevB.C` node
//!
//! Both implement the `embedded-hal` traits used by the rest of the crate.

mod gpio;
mod spi;

pub use gpio::*;
pub use spi::*;
