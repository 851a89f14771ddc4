//! The debug session
//!
//! A [DebugPort] owns the [Connection] to a machine for its whole lifetime and
//! exposes every operation of the debug protocol. It tracks whether debug mode
//! is active, and refuses memory and flash operations outside of it unless the
//! CPU was left stopped by an earlier `stop` command.

use std::{fmt, thread, time::Duration};

use log::{debug, info};

use crate::{
    alignment::write_aligned,
    connection::{
        command::{Command, MAX_ADDRESS},
        transport::Transport,
        Connection,
    },
    error::Error,
    loader::WriteSink,
    run_state::RunState,
    target::TargetConfig,
};

/// Settling time after erasing one 4 KB flash block
pub const ERASE_SECTOR_DELAY: Duration = Duration::from_secs(1);
/// Settling time after programming one flash sector
pub const PROGRAM_SECTOR_DELAY: Duration = Duration::from_secs(2);

/// Where the machine boots from on its next reset
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum BootSource {
    Ram,
    Flash,
}

/// Session state, from the host's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, CPU run state untouched
    Open,
    /// `EnterDebug` succeeded
    DebugActive,
}

type Sleeper = Box<dyn FnMut(Duration) + Send>;

/// Erase address of the `half`th 4 KB block of a logical sector
fn sector_block_address(sector: u32, half: u32) -> Result<u32, Error> {
    let address = (u64::from(sector) * 2 + u64::from(half)) << 16;
    let address = u32::try_from(address).unwrap_or(u32::MAX);

    if address > MAX_ADDRESS {
        return Err(Error::AddressOutOfRange(address));
    }

    Ok(address)
}

/// A debug session on an open transport
pub struct DebugPort {
    connection: Connection,
    config: TargetConfig,
    run_state: Box<dyn RunState>,
    state: SessionState,
    sleep: Sleeper,
}

impl fmt::Debug for DebugPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugPort")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("stopped", &self.run_state.is_stopped())
            .finish_non_exhaustive()
    }
}

impl DebugPort {
    pub fn new(connection: Connection, config: TargetConfig, run_state: Box<dyn RunState>) -> Self {
        Self {
            connection,
            config,
            run_state,
            state: SessionState::Open,
            sleep: Box::new(thread::sleep),
        }
    }

    /// Replace the function used for the fixed flash settling delays
    pub fn with_sleeper(mut self, sleep: impl FnMut(Duration) + Send + 'static) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    pub fn config(&self) -> &TargetConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the CPU was left stopped by an earlier command
    pub fn is_stopped(&self) -> bool {
        self.run_state.is_stopped()
    }

    /// First status byte of the most recent response
    pub fn status0(&self) -> u8 {
        self.connection.status0()
    }

    /// Second status byte of the most recent response
    pub fn status1(&self) -> u8 {
        self.connection.status1()
    }

    fn ensure_debug(&self) -> Result<(), Error> {
        if self.state == SessionState::DebugActive || self.run_state.is_stopped() {
            Ok(())
        } else {
            Err(Error::NotInDebugMode)
        }
    }

    fn simple(&mut self, command: Command<'_>) -> Result<(), Error> {
        self.connection.transfer(command)?;
        Ok(())
    }

    pub fn enter_debug(&mut self) -> Result<(), Error> {
        self.simple(Command::EnterDebug)?;
        self.state = SessionState::DebugActive;
        Ok(())
    }

    /// Leave debug mode; this resets the CPU
    pub fn exit_debug(&mut self) -> Result<(), Error> {
        self.simple(Command::ExitDebug)?;
        self.state = SessionState::Open;
        Ok(())
    }

    pub fn stop_cpu(&mut self) -> Result<(), Error> {
        self.simple(Command::StopCpu)
    }

    pub fn start_cpu(&mut self) -> Result<(), Error> {
        self.simple(Command::StartCpu)
    }

    /// Query the debug port revision
    pub fn revision(&mut self) -> Result<u8, Error> {
        self.simple(Command::Revision)?;
        Ok(self.connection.status1())
    }

    pub fn read_block(&mut self, address: u32, length: u16) -> Result<Vec<u8>, Error> {
        self.ensure_debug()?;
        self.connection.read_mem(address, length)
    }

    /// Write a block, widening it to aligned bus cycles when the CPU needs it
    pub fn write_block(&mut self, address: u32, data: &[u8]) -> Result<(), Error> {
        self.ensure_debug()?;

        if self.config.cpu.requires_alignment() {
            write_aligned(&mut self.connection, address, data)
        } else {
            self.connection.write_mem(address, data)
        }
    }

    /// Write any amount of data as a series of `chunk_size` blocks
    pub fn write_chunked(&mut self, address: u32, data: &[u8]) -> Result<(), Error> {
        let mut offset = address;
        for chunk in data.chunks(self.config.chunk_size()) {
            self.write_block(offset, chunk)?;
            offset += chunk.len() as u32;
        }
        Ok(())
    }

    /// Erase the whole flash chip
    pub fn erase_flash(&mut self) -> Result<(), Error> {
        self.ensure_debug()?;
        self.simple(Command::EraseFlash)
    }

    /// Erase one logical sector, as two 4 KB blocks
    pub fn erase_sector(&mut self, sector: u32) -> Result<(), Error> {
        self.ensure_debug()?;

        let addresses = [
            sector_block_address(sector, 0)?,
            sector_block_address(sector, 1)?,
        ];
        for address in addresses {
            debug!("Erasing flash block at {address:#08x}");

            self.simple(Command::EraseSector { address })?;
            (self.sleep)(ERASE_SECTOR_DELAY);
        }

        Ok(())
    }

    /// Copy the staged image at `address` into flash
    pub fn program_flash(&mut self, address: u32) -> Result<(), Error> {
        self.ensure_debug()?;
        self.simple(Command::ProgramFlash { address })
    }

    /// Copy the RAM staging buffer into one logical sector
    pub fn program_sector(&mut self, sector: u32) -> Result<(), Error> {
        self.ensure_debug()?;

        let address = sector_block_address(sector, 0)?;
        debug!("Programming flash sector at {address:#08x}");

        self.simple(Command::ProgramSector { address })?;
        (self.sleep)(PROGRAM_SECTOR_DELAY);

        Ok(())
    }

    pub fn set_boot_source(&mut self, source: BootSource) -> Result<(), Error> {
        self.ensure_debug()?;

        match source {
            BootSource::Ram => self.simple(Command::BootRam),
            BootSource::Flash => self.simple(Command::BootFlash),
        }
    }

    /// Stop the CPU and remember it across invocations
    pub fn halt(&mut self) -> Result<(), Error> {
        self.enter_debug()?;
        info!("Stopping CPU");
        self.stop_cpu()?;
        self.run_state.set_stopped(true)
    }

    /// Restart a CPU stopped by [DebugPort::halt]
    ///
    /// Returns `false` without touching the machine when it was not stopped.
    pub fn resume(&mut self) -> Result<bool, Error> {
        if !self.run_state.is_stopped() {
            return Ok(false);
        }

        info!("Starting CPU");
        self.start_cpu()?;
        self.exit_debug()?;
        self.run_state.set_stopped(false)?;

        Ok(true)
    }

    /// Run `f` inside debug mode
    ///
    /// Debug mode is entered unless the CPU is already stopped, and left again
    /// afterwards if it was entered here, even when `f` fails.
    pub fn run_in_debug<T, F>(&mut self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut DebugPort) -> Result<T, Error>,
    {
        let entered = !self.run_state.is_stopped();
        if entered {
            self.enter_debug()?;
        }

        let result = f(self);

        if entered {
            let exited = self.exit_debug();
            if result.is_ok() {
                exited?;
            } else if let Err(err) = exited {
                debug!("Failed to leave debug mode after error: {err}");
            }
        }

        result
    }

    /// Close the session and give back the transport
    pub fn into_transport(self) -> Box<dyn Transport> {
        self.connection.into_transport()
    }
}

impl WriteSink for DebugPort {
    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), Error> {
        debug!("Writing {} bytes at {address:#08x}", data.len());
        self.write_chunked(address, data)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        connection::{command::CommandType, mock::MockDevice},
        run_state::InMemoryRunState,
        target::{Cpu, TargetConfig},
    };

    /// A session on a mock device which never sleeps
    pub(crate) fn debug_port(device: &MockDevice, config: TargetConfig) -> DebugPort {
        DebugPort::new(
            Connection::new(Box::new(device.clone())),
            config,
            Box::new(InMemoryRunState::default()),
        )
        .with_sleeper(|_| {})
    }

    #[test]
    fn test_requires_debug_mode() {
        let device = MockDevice::new();
        let mut port = debug_port(&device, TargetConfig::default());

        assert!(matches!(port.read_block(0, 4), Err(Error::NotInDebugMode)));
        assert!(matches!(port.erase_flash(), Err(Error::NotInDebugMode)));
        assert!(device.requests().is_empty());

        port.enter_debug().unwrap();
        assert_eq!(port.state(), SessionState::DebugActive);
        port.read_block(0, 4).unwrap();

        port.exit_debug().unwrap();
        assert_eq!(port.state(), SessionState::Open);
    }

    #[test]
    fn test_revision_without_debug() {
        let device = MockDevice::new().with_revision(0x07);
        let mut port = debug_port(&device, TargetConfig::default());

        assert_eq!(port.revision().unwrap(), 0x07);
        assert_eq!(port.status0(), 0x00);
    }

    #[test]
    fn test_sector_addressing() {
        let device = MockDevice::new();
        let delays = Arc::new(Mutex::new(Vec::new()));
        let recorded = delays.clone();

        let mut port = debug_port(&device, TargetConfig::default())
            .with_sleeper(move |delay| recorded.lock().unwrap().push(delay));
        port.enter_debug().unwrap();

        port.erase_sector(3).unwrap();
        port.program_sector(3).unwrap();

        let requests: Vec<_> = device
            .requests()
            .into_iter()
            .skip(1)
            .map(|r| (r.command, r.address))
            .collect();
        assert_eq!(
            requests,
            vec![
                (CommandType::EraseSector, 0x06_0000),
                (CommandType::EraseSector, 0x07_0000),
                (CommandType::ProgramSector, 0x06_0000),
            ]
        );
        assert_eq!(
            *delays.lock().unwrap(),
            vec![ERASE_SECTOR_DELAY, ERASE_SECTOR_DELAY, PROGRAM_SECTOR_DELAY]
        );
    }

    #[test]
    fn test_high_sectors_do_not_wrap() {
        let device = MockDevice::new();
        let mut port = debug_port(&device, TargetConfig::default());
        port.enter_debug().unwrap();

        port.erase_sector(0x7F).unwrap();
        let addresses: Vec<u32> = device.requests().iter().skip(1).map(|r| r.address).collect();
        assert_eq!(addresses, vec![0xFE_0000, 0xFF_0000]);

        assert!(matches!(
            port.erase_sector(0x80),
            Err(Error::AddressOutOfRange(0x0100_0000))
        ));
        assert!(matches!(
            port.erase_sector(0x8000),
            Err(Error::AddressOutOfRange(u32::MAX))
        ));
        assert!(matches!(
            port.program_sector(0x4000),
            Err(Error::AddressOutOfRange(0x8000_0000))
        ));
        assert!(matches!(
            port.erase_sector(u32::MAX),
            Err(Error::AddressOutOfRange(u32::MAX))
        ));
        assert_eq!(device.requests().len(), 3);
    }

    #[test]
    fn test_aligned_cpu_uses_read_modify_write() {
        let device = MockDevice::new();
        device.load(0x1000, &[1, 2, 3, 4]);

        let mut port = debug_port(&device, TargetConfig::new(Cpu::M68040));
        port.enter_debug().unwrap();
        port.write_block(0x1001, &[0xFF]).unwrap();

        assert_eq!(device.memory(0x1000, 4), vec![1, 0xFF, 3, 4]);
        assert_eq!(
            device.commands(),
            vec![
                CommandType::EnterDebug,
                CommandType::ReadMem,
                CommandType::WriteMem
            ]
        );
    }

    #[test]
    fn test_plain_cpu_writes_directly() {
        let device = MockDevice::new();
        let mut port = debug_port(&device, TargetConfig::new(Cpu::M68000));
        port.enter_debug().unwrap();
        port.write_block(0x1001, &[0xFF]).unwrap();

        assert_eq!(
            device.commands(),
            vec![CommandType::EnterDebug, CommandType::WriteMem]
        );
    }

    #[test]
    fn test_chunked_writes() {
        let device = MockDevice::new();
        let config = TargetConfig::default().with_chunk_size(4);
        let mut port = debug_port(&device, config);
        port.enter_debug().unwrap();

        port.write_chunked(0x100, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]).unwrap();

        let writes: Vec<_> = device
            .requests()
            .into_iter()
            .filter(|r| r.command == CommandType::WriteMem)
            .map(|r| (r.address, r.data.len()))
            .collect();
        assert_eq!(writes, vec![(0x100, 4), (0x104, 4), (0x108, 2)]);
        assert_eq!(device.memory(0x100, 10), vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
    }

    #[test]
    fn test_halt_and_resume() {
        let device = MockDevice::new();
        let mut port = debug_port(&device, TargetConfig::default());

        assert!(!port.resume().unwrap());
        assert!(device.requests().is_empty());

        port.halt().unwrap();
        assert!(port.is_stopped());

        // memory access is allowed while stopped, without entering debug mode
        let mut port = DebugPort::new(
            Connection::new(Box::new(device.clone())),
            TargetConfig::default(),
            Box::new(InMemoryRunState::stopped()),
        );
        port.run_in_debug(|port| port.read_block(0, 2)).unwrap();
        assert!(port.resume().unwrap());
        assert!(!port.is_stopped());

        assert_eq!(
            device.commands(),
            vec![
                CommandType::EnterDebug,
                CommandType::StopCpu,
                CommandType::ReadMem,
                CommandType::StartCpu,
                CommandType::ExitDebug,
            ]
        );
    }

    #[test]
    fn test_run_in_debug_exits_after_error() {
        let device = MockDevice::new();
        let mut port = debug_port(&device, TargetConfig::default());

        let result: Result<(), Error> = port.run_in_debug(|_| Err(Error::Cancelled));
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(port.state(), SessionState::Open);
        assert_eq!(
            device.commands(),
            vec![CommandType::EnterDebug, CommandType::ExitDebug]
        );
    }
}
