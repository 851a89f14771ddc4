//! Write flash images to a target machine
//!
//! The [Flasher] struct drives the three flash workflows on top of an open
//! [DebugPort]:
//!
//! - a full image, staged in RAM and then copied to flash by the debug port
//! - a single sector, streamed page by page through the RAM staging buffer
//! - a list of sectors, each staged at RAM address 0 and programmed in turn
//!
//! Every workflow expects debug mode to be active (or the CPU to be stopped),
//! and aborts on the first failure. Flash contents after a failure are
//! undefined.

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};

use crate::{
    error::{Error, ResultExt},
    session::DebugPort,
    target::{FlashGeometry, TargetConfig},
};

/// Progress update callbacks
pub trait ProgressCallbacks {
    /// Initialize some progress report
    fn init(&mut self, addr: u32, total: usize);
    /// Update some progress report
    fn update(&mut self, current: usize);
    /// Finish some progress report
    fn finish(&mut self);
}

/// An empty implementation of [ProgressCallbacks] that does nothing
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DefaultProgressCallback;

impl ProgressCallbacks for DefaultProgressCallback {
    fn init(&mut self, _addr: u32, _total: usize) {}
    fn update(&mut self, _current: usize) {}
    fn finish(&mut self) {}
}

/// RAM address used to stage sector images
pub const SECTOR_STAGING_ADDRESS: u32 = 0;

/// One line of a bulk programming list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkEntry {
    pub sector: u32,
    pub path: PathBuf,
}

/// Parse a bulk programming list of `sector_hex,filename` lines
///
/// Relative filenames are resolved against `base_dir`.
pub fn parse_bulk_list(text: &str, base_dir: &Path) -> Result<Vec<BulkEntry>, Error> {
    let mut entries = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let invalid = |reason: &str| Error::InvalidBulkEntry {
            line: index + 1,
            reason: reason.to_string(),
        };

        let (sector, file) = line
            .split_once(',')
            .ok_or_else(|| invalid("expected `sector,filename`"))?;
        let (sector, file) = (sector.trim(), file.trim().trim_matches('"'));

        let sector = u8::from_str_radix(sector.trim_start_matches("0x"), 16)
            .map_err(|_| invalid("sector must be a hex number between 00 and FF"))?;
        if file.is_empty() {
            return Err(invalid("missing filename"));
        }

        entries.push(BulkEntry {
            sector: u32::from(sector),
            path: base_dir.join(file),
        });
    }

    if entries.is_empty() {
        return Err(Error::InvalidBulkEntry {
            line: 0,
            reason: "the list is empty".into(),
        });
    }

    Ok(entries)
}

/// Check that `data` can be programmed as one sector of the configured machine
pub fn check_sector_image(config: &TargetConfig, data: &[u8]) -> Result<FlashGeometry, Error> {
    let geometry = config
        .geometry
        .ok_or(Error::SectorProgrammingUnsupported)?;

    if data.len() != geometry.sector_bytes() {
        return Err(Error::SectorSizeMismatch {
            expected: geometry.sector_bytes(),
            actual: data.len(),
        });
    }

    Ok(geometry)
}

/// Flash programming workflows
#[derive(Debug)]
pub struct Flasher<'a> {
    port: &'a mut DebugPort,
}

impl<'a> Flasher<'a> {
    pub fn new(port: &'a mut DebugPort) -> Self {
        Self { port }
    }

    /// Upload `data` to RAM at `address` in `chunk_size` blocks
    pub fn upload(
        &mut self,
        address: u32,
        data: &[u8],
        progress: &mut dyn ProgressCallbacks,
    ) -> Result<(), Error> {
        let chunk_size = self.port.config().chunk_size();
        progress.init(address, data.len());

        let mut written = 0;
        for chunk in data.chunks(chunk_size) {
            self.port
                .write_block(address + written as u32, chunk)
                .flashing()?;
            written += chunk.len();
            progress.update(written);
        }

        progress.finish();
        Ok(())
    }

    /// Program a whole flash image
    ///
    /// The image is staged in RAM at `staging_address`, the chip is erased and
    /// the debug port then copies the staged image into flash.
    pub fn flash_image(
        &mut self,
        image: &[u8],
        staging_address: u32,
        progress: &mut dyn ProgressCallbacks,
    ) -> Result<(), Error> {
        let flash_size = self.port.config().flash_size;
        if image.len() != flash_size {
            warn!(
                "Image size ({} bytes) does not match the configured flash size ({flash_size} bytes)",
                image.len()
            );
        }

        info!("Uploading {} bytes to {staging_address:#08x}", image.len());
        self.upload(staging_address, image, progress)?;

        info!("Erasing flash");
        self.port.erase_flash().flashing()?;

        info!("Programming flash");
        self.port.program_flash(staging_address).flashing()
    }

    /// Program one logical sector, page by page
    pub fn flash_sector(
        &mut self,
        sector: u32,
        data: &[u8],
        progress: &mut dyn ProgressCallbacks,
    ) -> Result<(), Error> {
        let config = *self.port.config();
        let geometry = check_sector_image(&config, data)?;

        let ram_size = geometry.ram_bytes();
        let mut page = geometry.start_page(sector);
        let mut ram_offset = 0usize;
        let mut written = 0usize;

        debug!(
            "Sector {sector:#04x}: {} pages per sector, starting at page {page}",
            geometry.pages_per_sector()
        );
        progress.init(SECTOR_STAGING_ADDRESS, data.len());

        while written < data.len() {
            let len = config
                .chunk_size()
                .min(data.len() - written)
                .min(ram_size - ram_offset);
            let chunk = &data[written..written + len];

            self.port
                .write_block(SECTOR_STAGING_ADDRESS + ram_offset as u32, chunk)
                .flashing()?;
            written += len;
            ram_offset += len;
            progress.update(written);

            if ram_offset >= ram_size {
                self.commit_page(page)?;
                page += 1;
                ram_offset = 0;
            }
        }

        if ram_offset > 0 {
            self.commit_page(page)?;
        }

        progress.finish();
        Ok(())
    }

    fn commit_page(&mut self, page: u32) -> Result<(), Error> {
        info!("Erasing and programming flash page {page}");
        self.port.erase_sector(page).flashing()?;
        self.port.program_sector(page).flashing()
    }

    /// Program every sector of a bulk list, in list order
    ///
    /// All files are read before the machine is touched. With `erase_all` the
    /// whole chip is erased once up-front and the per-sector erase is skipped.
    pub fn flash_bulk(
        &mut self,
        entries: &[BulkEntry],
        erase_all: bool,
        progress: &mut dyn ProgressCallbacks,
    ) -> Result<(), Error> {
        let images = entries
            .iter()
            .map(|entry| {
                fs::read(&entry.path)
                    .map(|data| (entry.sector, data))
                    .map_err(|e| Error::FileOpenError(entry.path.display().to_string(), e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if erase_all {
            info!("Erasing flash");
            self.port.erase_flash().flashing()?;
        }

        for (sector, data) in images {
            info!("Programming sector {sector:#04x} ({} bytes)", data.len());
            self.upload(SECTOR_STAGING_ADDRESS, &data, progress)?;

            if !erase_all {
                self.port.erase_sector(sector).flashing()?;
            }
            self.port.program_sector(sector).flashing()?;
        }

        Ok(())
    }
}
