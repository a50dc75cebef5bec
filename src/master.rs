//! # Serial Peripheral Interface - Software Master
//!
//! ## Overview
//!
//! The driver produces the SPI waveform by toggling the clock and data
//! lines of a board-supplied [`Instance`] implementation, one bit at a
//! time. The frequency cannot be controlled precisely this way: a
//! requested frequency is converted into a per-half-cycle hold time in
//! whole microseconds, after accounting for the board's fixed per-bit
//! software overhead ([`Instance::PER_BIT_NS`]). [`Spi::set_frequency`]
//! returns the frequency the quantized timing actually produces, which at
//! high requested rates is limited by the overhead alone.
//!
//! ## Configuration
//!
//! The bus is configured with a [`Config`] at construction time and can be
//! reconfigured later through [`Spi::apply_config`] or the individual
//! setters. Words of 1 to 16 bits are exchanged MSB first through
//! [`Spi::exchange`]; [`Spi::exchange_u8`] is the unrolled 8-bit fast path
//! that also backs the [`embedded_hal::spi::SpiBus`] and
//! [`embedded_hal_nb::spi::FullDuplex`] implementations.
//!
//! ## Usage
//!
//! ```rust, no_run
//! # use spi_bitbang::{master::{Config, Spi}, Mode};
//! # fn run<B: spi_bitbang::master::Instance>(board: B) {
//! let mut spi = Spi::new(
//!     board,
//!     Config::default()
//!         .with_frequency(fugit::HertzU32::kHz(400))
//!         .with_mode(Mode::Mode0),
//! )
//! .unwrap();
//!
//! let mut buffer = [0xde, 0xad, 0xbe, 0xef];
//! spi.transfer(&mut buffer);
//! # }
//! ```

use core::convert::Infallible;

use fugit::HertzU32;

use crate::{DeviceId, Error, Mode, StatusFlags};

/// Stuffing byte clocked out when more bytes are read than written.
const EMPTY_WRITE_PAD: u8 = 0x00;

const NSEC_PER_SEC: u32 = 1_000_000_000;

/// Pin control and board services the software master runs on.
///
/// An implementation wraps the GPIO lines wired up as SCK, MOSI and MISO,
/// the chip-select lines of the devices sharing the bus, and the platform's
/// busy-wait primitive. The driver takes no ownership of any pin beyond
/// holding the implementing value.
pub trait Instance {
    /// Minimum time to transfer one bit, in nanoseconds.
    ///
    /// This is the inherent software overhead of executing one bit-exchange
    /// waveform on the target, with zero hold time. It bounds the maximum
    /// achievable bus frequency and must be non-zero.
    const PER_BIT_NS: u32;

    /// Drive the clock line high or low.
    fn set_sck(&mut self, high: bool);

    /// Drive the master-out (MOSI) line high or low.
    fn set_mosi(&mut self, high: bool);

    /// Sample the master-in (MISO) line.
    fn miso(&mut self) -> bool;

    /// Assert or deassert the chip select of `device`.
    fn select(&mut self, device: DeviceId, selected: bool);

    /// Report board-defined status flags for `device`.
    fn status(&mut self, device: DeviceId) -> StatusFlags;

    /// Switch command/data framing for `device`, on buses that have such a
    /// line. Boards without one keep the default, which reports
    /// [`Error::Unsupported`].
    fn cmd_data(&mut self, device: DeviceId, is_command: bool) -> Result<(), Error> {
        let _ = (device, is_command);
        Err(Error::Unsupported)
    }

    /// Busy-wait for `micros` microseconds.
    fn delay_us(&mut self, micros: u32);
}

/// Software SPI bus configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub struct Config {
    /// The bus clock frequency to request.
    ///
    /// The frequency actually produced is quantized, see
    /// [`Spi::set_frequency`].
    pub frequency: HertzU32,

    /// The clock polarity/phase mode.
    pub mode: Mode,

    /// Word width in bits for [`Spi::exchange`], `1..=16`.
    pub word_width: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            frequency: HertzU32::MHz(1),
            mode: Mode::Mode0,
            word_width: 8,
        }
    }
}

impl Config {
    /// Assign the frequency to request.
    pub fn with_frequency(mut self, frequency: HertzU32) -> Self {
        self.frequency = frequency;
        self
    }

    /// Assign the clock polarity/phase mode.
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Assign the word width in bits.
    pub fn with_word_width(mut self, word_width: u32) -> Self {
        self.word_width = word_width;
        self
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum ConfigError {
    /// The requested word width is outside the supported `1..=16` range.
    UnsupportedWordWidth,
}

/// Software SPI master driver.
///
/// One value drives one bus. Instances are fully independent of each other,
/// but a single instance must not be used from more than one execution
/// context at a time: every operation is blocking, and a word exchange
/// keeps the calling context busy for the whole waveform, roughly
/// `word_width * 2 * hold_time` microseconds plus the fixed per-bit
/// overhead.
pub struct Spi<B> {
    bus: B,
    mode: Mode,
    hold_time: u32,
    word_width: u32,
    frequency: HertzU32,
    read_word: Option<u8>,
}

impl<B> Spi<B>
where
    B: Instance,
{
    /// Constructs a software SPI master on the given board capability and
    /// applies `config`.
    ///
    /// The clock line is driven to the idle level of the configured mode
    /// before this returns.
    pub fn new(bus: B, config: Config) -> Result<Self, ConfigError> {
        let mut this = Spi {
            bus,
            mode: config.mode,
            hold_time: 0,
            word_width: 8,
            frequency: HertzU32::from_raw(0),
            read_word: None,
        };
        this.apply_config(&config)?;

        Ok(this)
    }

    /// Change the bus configuration.
    pub fn apply_config(&mut self, config: &Config) -> Result<(), ConfigError> {
        self.set_word_width(config.word_width)?;
        self.set_mode(config.mode);
        self.set_frequency(config.frequency);

        Ok(())
    }

    /// Release the board capability.
    pub fn free(self) -> B {
        self.bus
    }

    /// Set the bus frequency, returning the frequency the quantized timing
    /// actually produces.
    ///
    /// The full bit period implied by `frequency` is reduced by the per-bit
    /// software overhead and the remainder is halved and rounded into the
    /// whole-microsecond hold time applied on each side of the sampling
    /// edge. At high requested rates nothing remains to wait for; the hold
    /// time becomes zero and the waveform runs unthrottled, limited by
    /// [`Instance::PER_BIT_NS`] alone. The returned value reflects the real
    /// timing, not the request.
    ///
    /// A zero `frequency` is a caller error and fails fast.
    pub fn set_frequency(&mut self, frequency: HertzU32) -> HertzU32 {
        let requested = frequency.raw();
        debug_assert!(requested > 0);

        // Full bit period in nanoseconds, rounded to nearest.
        let pnsec = (NSEC_PER_SEC + (requested >> 1)) / requested;

        // Minus the bit transfer overhead.
        let pnsec = pnsec.saturating_sub(B::PER_BIT_NS);

        // The hold time applies twice per bit, so it is half the remaining
        // period, converted to microseconds.
        self.hold_time = (((pnsec + 1) >> 1) + 500) / 1000;

        let achieved = NSEC_PER_SEC / (2_000 * self.hold_time + B::PER_BIT_NS);
        self.frequency = HertzU32::from_raw(achieved);

        debug!(
            "requested={}Hz achieved={}Hz hold_time={}us",
            requested, achieved, self.hold_time
        );

        self.frequency
    }

    /// The frequency produced by the current quantized timing.
    pub fn frequency(&self) -> HertzU32 {
        self.frequency
    }

    /// The per-half-cycle hold time in microseconds.
    ///
    /// Zero means the waveform runs as fast as the pin operations allow.
    pub fn hold_time(&self) -> u32 {
        self.hold_time
    }

    /// Select the clock polarity/phase mode and drive the clock line to its
    /// idle level.
    ///
    /// Panics if the waveform for `mode` is compiled out (see the `mode0`
    /// through `mode3` cargo features). There is no safe waveform to fall
    /// back to; a wrong idle level or sampling edge would corrupt every
    /// following transfer.
    pub fn set_mode(&mut self, mode: Mode) {
        trace!("mode={:?}", mode);

        match mode {
            Mode::Mode0 => {
                cfg_if::cfg_if! {
                    if #[cfg(feature = "mode0")] {
                        // Resting level of the clock is low
                        self.bus.set_sck(false);
                    } else {
                        panic!("SPI mode 0 is compiled out");
                    }
                }
            }
            Mode::Mode1 => {
                cfg_if::cfg_if! {
                    if #[cfg(feature = "mode1")] {
                        // Resting level of the clock is low
                        self.bus.set_sck(false);
                    } else {
                        panic!("SPI mode 1 is compiled out");
                    }
                }
            }
            Mode::Mode2 => {
                cfg_if::cfg_if! {
                    if #[cfg(feature = "mode2")] {
                        // Resting level of the clock is high
                        self.bus.set_sck(true);
                    } else {
                        panic!("SPI mode 2 is compiled out");
                    }
                }
            }
            Mode::Mode3 => {
                cfg_if::cfg_if! {
                    if #[cfg(feature = "mode3")] {
                        // Resting level of the clock is high
                        self.bus.set_sck(true);
                    } else {
                        panic!("SPI mode 3 is compiled out");
                    }
                }
            }
        }

        self.mode = mode;
    }

    /// The currently selected mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Set the word width in bits for [`Spi::exchange`].
    pub fn set_word_width(&mut self, word_width: u32) -> Result<(), ConfigError> {
        if !(1..=16).contains(&word_width) {
            return Err(ConfigError::UnsupportedWordWidth);
        }
        self.word_width = word_width;

        Ok(())
    }

    /// The configured word width in bits.
    pub fn word_width(&self) -> u32 {
        self.word_width
    }

    /// Assert or deassert the chip select of `device`.
    pub fn select(&mut self, device: DeviceId, selected: bool) {
        trace!("select device={:?} selected={}", device, selected);
        self.bus.select(device, selected);
    }

    /// Report board-defined status flags for `device`.
    ///
    /// The driver forwards the flags unchanged; reacting to them (retrying
    /// a transaction from chip select onward, refusing writes, ...) is the
    /// caller's policy. A transfer cannot be resumed mid-word.
    pub fn status(&mut self, device: DeviceId) -> StatusFlags {
        self.bus.status(device)
    }

    /// Switch command/data framing for `device`.
    pub fn cmd_data(&mut self, device: DeviceId, is_command: bool) -> Result<(), Error> {
        trace!("cmd_data device={:?} is_command={}", device, is_command);
        self.bus.cmd_data(device, is_command)
    }

    /// Exchange one word of the configured width with the slave, MSB
    /// first. Returns the word received.
    ///
    /// Bits above the configured width are ignored and not transmitted.
    pub fn exchange(&mut self, data_out: u16) -> u16 {
        let mut data_in = 0;

        for shift in (0..self.word_width).rev() {
            // Make room for the next, less significant bit, then exchange
            // bits with the slave and OR in the response bit.
            data_in <<= 1;
            data_in |= self.exchange_bit(data_out & (1 << shift) != 0) as u16;
        }

        data_in
    }

    /// Exchange one 8-bit word with the slave, MSB first. Returns the byte
    /// received.
    ///
    /// Unlike [`Spi::exchange`] this ignores the configured word width.
    pub fn exchange_u8(&mut self, data_out: u8) -> u8 {
        // Straight-line on purpose: loop overhead comes on top of
        // PER_BIT_NS and lowers the maximum transfer rate.
        let mut data_in = self.exchange_bit(data_out & (1 << 7) != 0) as u8;

        data_in = (data_in << 1) | self.exchange_bit(data_out & (1 << 6) != 0) as u8;
        data_in = (data_in << 1) | self.exchange_bit(data_out & (1 << 5) != 0) as u8;
        data_in = (data_in << 1) | self.exchange_bit(data_out & (1 << 4) != 0) as u8;
        data_in = (data_in << 1) | self.exchange_bit(data_out & (1 << 3) != 0) as u8;
        data_in = (data_in << 1) | self.exchange_bit(data_out & (1 << 2) != 0) as u8;
        data_in = (data_in << 1) | self.exchange_bit(data_out & (1 << 1) != 0) as u8;
        data_in = (data_in << 1) | self.exchange_bit(data_out & (1 << 0) != 0) as u8;

        data_in
    }

    /// Write `words` out on the bus, discarding the responses.
    pub fn write_bytes(&mut self, words: &[u8]) {
        for &word in words {
            self.exchange_u8(word);
        }
    }

    /// Fill `words` from the bus, clocking out the stuffing byte for every
    /// byte read.
    pub fn read_bytes(&mut self, words: &mut [u8]) {
        for word in words.iter_mut() {
            *word = self.exchange_u8(EMPTY_WRITE_PAD);
        }
    }

    /// Sends `words` to the slave. Returns the `words` received from the
    /// slave.
    pub fn transfer<'w>(&mut self, words: &'w mut [u8]) -> &'w [u8] {
        for word in words.iter_mut() {
            *word = self.exchange_u8(*word);
        }

        words
    }

    /// Exchange one bit through the waveform of the selected mode.
    fn exchange_bit(&mut self, bit: bool) -> bool {
        match self.mode {
            #[cfg(feature = "mode0")]
            Mode::Mode0 => self.exchange_bit_mode0(bit),
            #[cfg(feature = "mode1")]
            Mode::Mode1 => self.exchange_bit_mode1(bit),
            #[cfg(feature = "mode2")]
            Mode::Mode2 => self.exchange_bit_mode2(bit),
            #[cfg(feature = "mode3")]
            Mode::Mode3 => self.exchange_bit_mode3(bit),
            // set_mode refuses modes whose waveform is compiled out
            #[cfg(not(all(
                feature = "mode0",
                feature = "mode1",
                feature = "mode2",
                feature = "mode3"
            )))]
            _ => unreachable!(),
        }
    }

    /// CPOL=0, CPHA=0: drive while the clock is idle, sample on the rising
    /// edge.
    #[cfg(feature = "mode0")]
    fn exchange_bit_mode0(&mut self, bit: bool) -> bool {
        // No clock transition before driving the data out
        self.bus.set_mosi(bit);

        // Clock transition before sampling
        self.bus.set_sck(true);
        let data_in = self.bus.miso();
        self.hold();

        // Return the clock to its resting state after sampling
        self.bus.set_sck(false);
        self.hold();

        data_in
    }

    /// CPOL=0, CPHA=1: drive on the rising edge, sample on the falling
    /// edge.
    #[cfg(feature = "mode1")]
    fn exchange_bit_mode1(&mut self, bit: bool) -> bool {
        // Clock transition before driving the data out
        self.bus.set_sck(true);
        self.bus.set_mosi(bit);
        self.hold();

        // Clock transition before sampling; this is also the resting state
        self.bus.set_sck(false);
        let data_in = self.bus.miso();
        self.hold();

        data_in
    }

    /// CPOL=1, CPHA=0: drive while the clock is idle, sample on the falling
    /// edge.
    #[cfg(feature = "mode2")]
    fn exchange_bit_mode2(&mut self, bit: bool) -> bool {
        // No clock transition before driving the data out
        self.bus.set_mosi(bit);

        // Clock transition before sampling
        self.bus.set_sck(false);
        let data_in = self.bus.miso();
        self.hold();

        // Return the clock to its resting state after sampling
        self.bus.set_sck(true);
        self.hold();

        data_in
    }

    /// CPOL=1, CPHA=1: drive on the falling edge, sample on the rising
    /// edge.
    #[cfg(feature = "mode3")]
    fn exchange_bit_mode3(&mut self, bit: bool) -> bool {
        // Clock transition before driving the data out
        self.bus.set_sck(false);
        self.bus.set_mosi(bit);
        self.hold();

        // Clock transition before sampling; this is also the resting state
        self.bus.set_sck(true);
        let data_in = self.bus.miso();
        self.hold();

        data_in
    }

    /// Busy-wait for one half-cycle hold time, if any.
    fn hold(&mut self) {
        if self.hold_time != 0 {
            self.bus.delay_us(self.hold_time);
        }
    }
}

impl<B> embedded_hal::spi::ErrorType for Spi<B> {
    type Error = Infallible;
}

/// 8-bit bus access, independent of the configured word width.
impl<B> embedded_hal::spi::SpiBus<u8> for Spi<B>
where
    B: Instance,
{
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        self.read_bytes(words);
        Ok(())
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        self.write_bytes(words);
        Ok(())
    }

    /// Write out data from `write`, read the response into `read`.
    ///
    /// If `write` is longer, the extra responses are discarded; if `read`
    /// is longer, [`EMPTY_WRITE_PAD`] is clocked out for the remainder.
    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        let common = read.len().min(write.len());

        for (data_in, &data_out) in read[..common].iter_mut().zip(&write[..common]) {
            *data_in = self.exchange_u8(data_out);
        }
        for &data_out in &write[common..] {
            self.exchange_u8(data_out);
        }
        for data_in in &mut read[common..] {
            *data_in = self.exchange_u8(EMPTY_WRITE_PAD);
        }

        Ok(())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        self.transfer(words);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        // Every exchange completes on the wire before returning; there is
        // nothing buffered to wait for.
        Ok(())
    }
}

/// Word-at-a-time 8-bit access. A `write` performs the full blocking
/// exchange; the response is picked up by the following `read`.
impl<B> embedded_hal_nb::spi::FullDuplex<u8> for Spi<B>
where
    B: Instance,
{
    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        self.read_word.take().ok_or(nb::Error::WouldBlock)
    }

    fn write(&mut self, word: u8) -> nb::Result<(), Self::Error> {
        self.read_word = Some(self.exchange_u8(word));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::vec::Vec;

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Event {
        Sck(bool),
        Mosi(bool),
        Sample,
        Delay(u32),
    }

    /// Records every pin operation and echoes MOSI back into MISO.
    #[derive(Default)]
    struct Loopback {
        mosi: bool,
        events: Vec<Event>,
        selects: Vec<(DeviceId, bool)>,
        cmds: Vec<(DeviceId, bool)>,
    }

    impl Instance for Loopback {
        const PER_BIT_NS: u32 = 100;

        fn set_sck(&mut self, high: bool) {
            self.events.push(Event::Sck(high));
        }

        fn set_mosi(&mut self, high: bool) {
            self.mosi = high;
            self.events.push(Event::Mosi(high));
        }

        fn miso(&mut self) -> bool {
            self.events.push(Event::Sample);
            self.mosi
        }

        fn select(&mut self, device: DeviceId, selected: bool) {
            self.selects.push((device, selected));
        }

        fn status(&mut self, device: DeviceId) -> StatusFlags {
            if device == DeviceId(1) {
                StatusFlags::PRESENT
            } else {
                StatusFlags::empty()
            }
        }

        fn cmd_data(&mut self, device: DeviceId, is_command: bool) -> Result<(), Error> {
            self.cmds.push((device, is_command));
            Ok(())
        }

        fn delay_us(&mut self, micros: u32) {
            self.events.push(Event::Delay(micros));
        }
    }

    /// A board that keeps the default command/data implementation.
    struct Minimal;

    impl Instance for Minimal {
        const PER_BIT_NS: u32 = 100;

        fn set_sck(&mut self, _high: bool) {}

        fn set_mosi(&mut self, _high: bool) {}

        fn miso(&mut self) -> bool {
            false
        }

        fn select(&mut self, _device: DeviceId, _selected: bool) {}

        fn status(&mut self, _device: DeviceId) -> StatusFlags {
            StatusFlags::empty()
        }

        fn delay_us(&mut self, _micros: u32) {}
    }

    fn spi(mode: Mode, frequency: HertzU32) -> Spi<Loopback> {
        let mut spi = Spi::new(
            Loopback::default(),
            Config::default().with_frequency(frequency).with_mode(mode),
        )
        .unwrap();
        spi.bus.events.clear();
        spi
    }

    #[test]
    fn frequency_quantization_400khz() {
        // 2500ns period - 100ns overhead = 2400ns, hold 1us per half cycle,
        // real timing 2100ns per bit.
        let mut spi = spi(Mode::Mode0, HertzU32::kHz(400));

        assert_eq!(spi.hold_time(), 1);
        assert_eq!(spi.frequency(), HertzU32::from_raw(476_190));
        assert_eq!(spi.set_frequency(HertzU32::kHz(400)), HertzU32::from_raw(476_190));
    }

    #[test]
    fn frequency_quantization_20mhz() {
        // The overhead exceeds the 50ns period; nothing is left to hold.
        let mut spi = spi(Mode::Mode0, HertzU32::MHz(20));

        assert_eq!(spi.hold_time(), 0);
        assert_eq!(spi.frequency(), HertzU32::MHz(10));
        assert_eq!(spi.set_frequency(HertzU32::MHz(20)), HertzU32::MHz(10));
    }

    #[test]
    fn achieved_frequency_matches_quantized_timing() {
        let mut spi = spi(Mode::Mode0, HertzU32::MHz(1));

        for requested in [100, 1_000, 10_000, 400_000, 1_000_000, 20_000_000] {
            let achieved = spi.set_frequency(HertzU32::from_raw(requested)).raw();
            let expected = 1_000_000_000 / (2_000 * spi.hold_time() + Loopback::PER_BIT_NS);
            assert_eq!(achieved, expected);
        }
    }

    #[test]
    fn achieved_frequency_is_monotonic() {
        let mut spi = spi(Mode::Mode0, HertzU32::MHz(1));

        let requests = [
            50_000_000, 20_000_000, 5_000_000, 1_000_000, 400_000, 100_000, 10_000, 1_000, 100,
        ];
        let mut previous = u32::MAX;
        for requested in requests {
            let achieved = spi.set_frequency(HertzU32::from_raw(requested)).raw();
            assert!(
                achieved <= previous,
                "achieved {achieved} for request {requested} exceeds {previous}"
            );
            previous = achieved;
        }
    }

    #[test]
    #[should_panic]
    fn zero_frequency_fails_fast() {
        let mut spi = spi(Mode::Mode0, HertzU32::MHz(1));
        spi.set_frequency(HertzU32::from_raw(0));
    }

    #[test]
    fn mode0_bit_waveform() {
        let mut spi = spi(Mode::Mode0, HertzU32::kHz(400));

        assert!(spi.exchange_bit(true));
        assert_eq!(
            spi.bus.events,
            [
                Event::Mosi(true),
                Event::Sck(true),
                Event::Sample,
                Event::Delay(1),
                Event::Sck(false),
                Event::Delay(1),
            ]
        );
    }

    #[test]
    fn mode1_bit_waveform() {
        let mut spi = spi(Mode::Mode1, HertzU32::kHz(400));

        assert!(spi.exchange_bit(true));
        assert_eq!(
            spi.bus.events,
            [
                Event::Sck(true),
                Event::Mosi(true),
                Event::Delay(1),
                Event::Sck(false),
                Event::Sample,
                Event::Delay(1),
            ]
        );
    }

    #[test]
    fn mode2_bit_waveform() {
        let mut spi = spi(Mode::Mode2, HertzU32::kHz(400));

        assert!(spi.exchange_bit(true));
        assert_eq!(
            spi.bus.events,
            [
                Event::Mosi(true),
                Event::Sck(false),
                Event::Sample,
                Event::Delay(1),
                Event::Sck(true),
                Event::Delay(1),
            ]
        );
    }

    #[test]
    fn mode3_bit_waveform() {
        let mut spi = spi(Mode::Mode3, HertzU32::kHz(400));

        assert!(spi.exchange_bit(true));
        assert_eq!(
            spi.bus.events,
            [
                Event::Sck(false),
                Event::Mosi(true),
                Event::Delay(1),
                Event::Sck(true),
                Event::Sample,
                Event::Delay(1),
            ]
        );
    }

    #[test]
    fn construction_drives_clock_idle_level() {
        for (mode, idle) in [
            (Mode::Mode0, false),
            (Mode::Mode1, false),
            (Mode::Mode2, true),
            (Mode::Mode3, true),
        ] {
            let spi = Spi::new(
                Loopback::default(),
                Config::default().with_mode(mode),
            )
            .unwrap();
            assert_eq!(spi.bus.events[0], Event::Sck(idle), "mode {mode:?}");
        }
    }

    #[test]
    fn zero_hold_time_runs_unthrottled() {
        let mut spi = spi(Mode::Mode0, HertzU32::MHz(20));

        spi.exchange_u8(0xa5);
        assert!(!spi.bus.events.iter().any(|e| matches!(e, Event::Delay(_))));
    }

    #[test]
    fn loopback_roundtrip_u8() {
        let mut spi = spi(Mode::Mode0, HertzU32::kHz(400));

        for word in 0..=255u8 {
            assert_eq!(spi.exchange_u8(word), word);
        }
    }

    #[test]
    fn loopback_roundtrip_all_modes() {
        for mode in [Mode::Mode0, Mode::Mode1, Mode::Mode2, Mode::Mode3] {
            let mut spi = spi(mode, HertzU32::kHz(400));
            assert_eq!(spi.exchange_u8(0x36), 0x36, "mode {mode:?}");
        }
    }

    #[test]
    fn variable_width_exchange() {
        let mut spi = spi(Mode::Mode0, HertzU32::kHz(400));
        spi.set_word_width(4).unwrap();

        // Only the low 4 bits take part in the exchange.
        assert_eq!(spi.exchange(0xab), 0xb);

        // One rising edge per bit in mode 0.
        let rising = spi
            .bus
            .events
            .iter()
            .filter(|e| **e == Event::Sck(true))
            .count();
        assert_eq!(rising, 4);
    }

    #[test]
    fn variable_width_accumulator_starts_empty() {
        let mut spi = spi(Mode::Mode0, HertzU32::kHz(400));

        spi.set_word_width(16).unwrap();
        assert_eq!(spi.exchange(0xffff), 0xffff);
        assert_eq!(spi.exchange(0x8001), 0x8001);

        spi.set_word_width(1).unwrap();
        assert_eq!(spi.exchange(0x1), 0x1);
        assert_eq!(spi.exchange(0x0), 0x0);
    }

    #[test]
    fn word_width_bounds() {
        let mut spi = spi(Mode::Mode0, HertzU32::kHz(400));

        assert_eq!(
            spi.set_word_width(0),
            Err(ConfigError::UnsupportedWordWidth)
        );
        assert_eq!(
            spi.set_word_width(17),
            Err(ConfigError::UnsupportedWordWidth)
        );
        assert_eq!(spi.set_word_width(16), Ok(()));
        assert_eq!(spi.word_width(), 16);
    }

    #[test]
    fn config_word_width_is_validated() {
        let result = Spi::new(
            Loopback::default(),
            Config::default().with_word_width(0),
        );
        assert!(matches!(result, Err(ConfigError::UnsupportedWordWidth)));
    }

    #[test]
    fn select_and_status_pass_through() {
        let mut spi = spi(Mode::Mode0, HertzU32::kHz(400));

        spi.select(DeviceId(2), true);
        spi.select(DeviceId(2), false);
        assert_eq!(spi.bus.selects, [(DeviceId(2), true), (DeviceId(2), false)]);

        assert_eq!(spi.status(DeviceId(1)), StatusFlags::PRESENT);
        assert_eq!(spi.status(DeviceId(7)), StatusFlags::empty());
    }

    #[test]
    fn cmd_data_pass_through_and_default() {
        let mut spi = spi(Mode::Mode0, HertzU32::kHz(400));
        assert_eq!(spi.cmd_data(DeviceId(3), true), Ok(()));
        assert_eq!(spi.bus.cmds, [(DeviceId(3), true)]);

        let mut minimal = Spi::new(Minimal, Config::default()).unwrap();
        assert_eq!(minimal.cmd_data(DeviceId(0), true), Err(Error::Unsupported));
    }

    #[test]
    fn spi_bus_transfer_lengths() {
        use embedded_hal::spi::SpiBus;

        let mut spi = spi(Mode::Mode0, HertzU32::kHz(400));

        // Loopback: the common part echoes, the tail reads the stuffing
        // byte.
        let mut read = [0xff; 4];
        SpiBus::transfer(&mut spi, &mut read, &[0x12, 0x34]).unwrap();
        assert_eq!(read, [0x12, 0x34, EMPTY_WRITE_PAD, EMPTY_WRITE_PAD]);

        let mut read = [0xff; 1];
        SpiBus::transfer(&mut spi, &mut read, &[0x56, 0x78]).unwrap();
        assert_eq!(read, [0x56]);

        let mut words = [0x9a, 0xbc];
        SpiBus::transfer_in_place(&mut spi, &mut words).unwrap();
        assert_eq!(words, [0x9a, 0xbc]);

        SpiBus::flush(&mut spi).unwrap();
    }

    #[test]
    fn full_duplex_word_at_a_time() {
        use embedded_hal_nb::spi::FullDuplex;

        let mut spi = spi(Mode::Mode0, HertzU32::kHz(400));

        assert_eq!(FullDuplex::read(&mut spi), Err(nb::Error::WouldBlock));
        FullDuplex::write(&mut spi, 0x5a).unwrap();
        assert_eq!(FullDuplex::read(&mut spi), Ok(0x5a));
        assert_eq!(FullDuplex::read(&mut spi), Err(nb::Error::WouldBlock));
    }
}
