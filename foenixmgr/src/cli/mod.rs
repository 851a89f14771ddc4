//! Types and functions for the command-line interface
//!
//! The contents of this module are intended for use with the [foenixmgr]
//! command-line application, and are likely not useful otherwise.
//!
//! Every function which talks to a machine takes an open [DebugPort] and runs
//! inside [DebugPort::run_in_debug], so the machine is reset when the command
//! ends unless its CPU was stopped with the `stop` command.
//!
//! [foenixmgr]: https://crates.io/crates/foenixmgr

use std::{fs, path::Path};

use clap::Args;
use dialoguer::{theme::ColorfulTheme, Confirm};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;

use self::config::Config;
use crate::{
    connection::{transport, Connection},
    error::Error,
    flasher::{check_sector_image, parse_bulk_list, BulkEntry, Flasher, ProgressCallbacks},
    loader::{Loader, LoaderKind},
    run_state::StopFile,
    session::{BootSource, DebugPort},
    target::Machine,
};

pub mod config;

/// Size of the reset vector table at the start of a 680x0 binary
const M68K_VECTOR_TABLE_LEN: usize = 8;

/// Establish a connection with a target device
#[derive(Debug, Args)]
#[non_exhaustive]
pub struct ConnectArgs {
    /// Serial port or `host:port` of a TCP relay (e.g. /dev/ttyUSB0, COM3,
    /// 192.168.1.114:2560)
    #[arg(long, global = true, env = "FOENIXMGR_PORT")]
    pub port: Option<String>,
    /// Target machine, enables flash sector programming on f256jr, f256k and
    /// fnx1591
    #[arg(long, global = true, value_enum)]
    pub target: Option<Machine>,
}

impl ConnectArgs {
    /// The port to use; the command line wins over the configuration file
    pub fn port_name(&self, config: &Config) -> Result<String, Error> {
        self.port
            .clone()
            .or_else(|| config.port.clone())
            .ok_or(Error::NoPort)
    }
}

/// Open the configured port and start a debug session on it
pub fn connect(args: &ConnectArgs, config: &Config) -> Result<DebugPort, Error> {
    let port = args.port_name(config)?;
    let settings = config.port_settings();

    info!("Connecting to {port}");
    let transport = transport::open(&port, &settings)?;

    Ok(DebugPort::new(
        Connection::new(transport),
        config.target_config(args.target),
        Box::new(StopFile::default()),
    ))
}

/// Ask before a destructive operation, unless `assume_yes` is set
pub fn confirm(prompt: &str, assume_yes: bool) -> Result<(), Error> {
    if assume_yes {
        return Ok(());
    }

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact_opt()?
        .unwrap_or_default();

    if confirmed {
        Ok(())
    } else {
        Err(Error::Cancelled)
    }
}

/// Progress bar for flash uploads
#[derive(Debug, Default)]
pub struct FoenixProgress {
    pb: Option<ProgressBar>,
}

impl ProgressCallbacks for FoenixProgress {
    fn init(&mut self, addr: u32, len: usize) {
        let style = ProgressStyle::with_template(
            "[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}",
        )
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());

        let pb = ProgressBar::new(len as u64)
            .with_message(format!("{addr:#08x}"))
            .with_style(style);

        self.pb = Some(pb);
    }

    fn update(&mut self, current: usize) {
        if let Some(ref pb) = self.pb {
            pb.set_position(current as u64);
        }
    }

    fn finish(&mut self) {
        if let Some(ref pb) = self.pb {
            pb.finish();
        }
    }
}

/// Read a whole input file
pub fn read_file(path: &Path) -> Result<Vec<u8>, Error> {
    fs::read(path).map_err(|e| Error::FileOpenError(path.display().to_string(), e))
}

/// Read a raw binary, checking that a 680x0 vector table fits when
/// `m68k_vectors` is set
pub fn read_binary(path: &Path, m68k_vectors: bool) -> Result<Vec<u8>, Error> {
    let data = read_file(path)?;
    if m68k_vectors && data.len() < M68K_VECTOR_TABLE_LEN {
        return Err(Error::BinaryTooSmall(data.len()));
    }

    Ok(data)
}

/// Read and check a `sector,filename` list
///
/// Relative filenames are resolved against the directory of the list.
pub fn read_bulk_list(path: &Path) -> Result<Vec<BulkEntry>, Error> {
    let text = fs::read_to_string(path)
        .map_err(|e| Error::FileOpenError(path.display().to_string(), e))?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

    parse_bulk_list(&text, base_dir)
}

/// Print the debug port revision
pub fn revision(port: &mut DebugPort) -> Result<u8, Error> {
    port.run_in_debug(|port| port.revision())
}

/// Decode a file with `kind` and write it to memory
pub fn upload_file(port: &mut DebugPort, path: &Path, kind: LoaderKind) -> Result<(), Error> {
    let data = read_file(path)?;
    let cpu = port.config().cpu;

    port.run_in_debug(|port| {
        let mut loader = Loader::new(kind, cpu);
        loader.open_bytes(data)?;
        loader.set_write_sink(|address, data: &[u8]| port.write_chunked(address, data));

        info!("Uploading {}", path.display());
        let result = loader.process();
        loader.close();
        result
    })
}

/// Write a raw binary to memory
///
/// With `m68k_vectors`, the first 8 bytes of the binary are also copied to
/// address 0 so that the CPU picks up its stack pointer and entry address
/// from the binary on the next reset.
pub fn upload_binary(
    port: &mut DebugPort,
    data: &[u8],
    address: u32,
    m68k_vectors: bool,
) -> Result<(), Error> {
    if m68k_vectors && data.len() < M68K_VECTOR_TABLE_LEN {
        return Err(Error::BinaryTooSmall(data.len()));
    }

    port.run_in_debug(|port| {
        info!("Uploading {} bytes to {address:#08x}", data.len());
        port.write_chunked(address, data)?;

        if m68k_vectors {
            info!("Setting up reset vectors at address 0");
            port.write_block(0, &data[..M68K_VECTOR_TABLE_LEN])?;
        }

        Ok(())
    })
}

/// Read memory and format it as a hex dump
pub fn dump(port: &mut DebugPort, address: u32, count: u16) -> Result<String, Error> {
    let data = port.run_in_debug(|port| port.read_block(address, count))?;

    Ok(hex_dump(&data, address))
}

/// Format memory as 16 bytes per line: address, hex bytes, then ASCII
pub fn hex_dump(data: &[u8], start: u32) -> String {
    const BYTES_PER_LINE: usize = 16;

    data.chunks(BYTES_PER_LINE)
        .enumerate()
        .map(|(line, bytes)| {
            let address = start.wrapping_add((line * BYTES_PER_LINE) as u32);
            let hex: String = bytes.iter().map(|b| format!("{b:02X} ")).collect();
            let ascii: String = bytes
                .iter()
                .map(|&b| if (32..=126).contains(&b) { b as char } else { '.' })
                .collect();

            format!(
                "{address:06X}: {hex:<width$} | {ascii}",
                width = BYTES_PER_LINE * 3
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn set_boot_source(port: &mut DebugPort, source: BootSource) -> Result<(), Error> {
    port.run_in_debug(|port| {
        info!("Setting boot source to {source}");
        port.set_boot_source(source)
    })
}

pub fn erase_flash(port: &mut DebugPort) -> Result<(), Error> {
    port.run_in_debug(|port| {
        info!("Erasing flash memory");
        port.erase_flash()
    })
}

/// Program a full flash image, or a single sector when `sector` is given
pub fn flash(
    port: &mut DebugPort,
    image: &[u8],
    staging_address: u32,
    sector: Option<u32>,
    progress: &mut dyn ProgressCallbacks,
) -> Result<(), Error> {
    if sector.is_some() {
        check_sector_image(port.config(), image)?;
    }

    port.run_in_debug(|port| {
        let mut flasher = Flasher::new(port);
        match sector {
            Some(sector) => flasher.flash_sector(sector, image, progress),
            None => flasher.flash_image(image, staging_address, progress),
        }
    })
}

/// Program every sector of a bulk list
pub fn flash_bulk(
    port: &mut DebugPort,
    entries: &[BulkEntry],
    erase_all: bool,
    progress: &mut dyn ProgressCallbacks,
) -> Result<(), Error> {
    port.run_in_debug(|port| Flasher::new(port).flash_bulk(entries, erase_all, progress))
}
