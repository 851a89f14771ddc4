use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use foenixmgr::{
    cli::{
        self,
        config::{parse_hex_u32, Config},
        connect, ConnectArgs, FoenixProgress,
    },
    connection::transport,
    loader::LoaderKind,
    logging::initialize_logger,
    relay::Relay,
    session::BootSource,
};
use log::{debug, info, LevelFilter};
use miette::Result;

/// Manage Foenix retro computers through their debug port
#[derive(Debug, Parser)]
#[command(about, propagate_version = true, version)]
struct Cli {
    #[command(subcommand)]
    subcommand: Commands,

    #[command(flatten)]
    connect_args: ConnectArgs,

    /// Only print warnings and errors
    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the debug port revision code
    Revision,
    /// Stop the CPU, leaving it stopped across later commands
    Stop,
    /// Restart a CPU stopped with `stop`
    Start,
    /// Select whether the machine boots from RAM or flash
    Boot {
        #[arg(value_enum)]
        source: BootSource,
    },
    /// Erase the entire flash memory
    Erase(ConfirmArgs),
    /// Program flash memory from a binary image
    Flash(FlashArgs),
    /// Program several flash sectors listed in a CSV file
    FlashBulk(FlashBulkArgs),
    /// Upload an Intel HEX file
    Upload(FileArgs),
    /// Upload a Motorola S-record file
    UploadSrec(FileArgs),
    /// Upload a WDC tools binary
    UploadWdc(FileArgs),
    /// Upload a PGX executable and point the reset vector at it
    RunPgx(FileArgs),
    /// Upload a PGZ executable and point the reset vector at its entry
    RunPgz(FileArgs),
    /// Upload a raw binary file to RAM
    Binary(BinaryArgs),
    /// Upload a 680x0 binary and copy its vector table to address 0
    RunM68kBin(BinaryArgs),
    /// Read memory and print it as a hex dump
    Dump(DumpArgs),
    /// Relay debug port traffic from TCP clients to the serial port
    TcpBridge {
        /// Address to listen on, e.g. localhost:2560 or 0.0.0.0:2560
        listen: String,
    },
    /// List the available serial ports
    ListPorts,
}

#[derive(Debug, Args)]
struct ConfirmArgs {
    /// Do not ask for confirmation
    #[arg(long, short)]
    yes: bool,
}

#[derive(Debug, Args)]
struct FileArgs {
    file: PathBuf,
}

#[derive(Debug, Args)]
struct FlashArgs {
    /// Binary image to program
    image: PathBuf,
    /// RAM address used to stage the image (hex)
    #[arg(long, value_parser = parse_address)]
    address: Option<u32>,
    /// Program a single sector (hex) instead of the whole chip
    #[arg(long, value_parser = parse_sector)]
    flash_sector: Option<u32>,
    #[command(flatten)]
    confirm: ConfirmArgs,
}

#[derive(Debug, Args)]
struct FlashBulkArgs {
    /// CSV file of `sector_hex,filename` lines
    list: PathBuf,
    /// Erase the whole chip first instead of erasing each sector
    #[arg(long)]
    erase: bool,
    #[command(flatten)]
    confirm: ConfirmArgs,
}

#[derive(Debug, Args)]
struct BinaryArgs {
    file: PathBuf,
    /// Load address (hex)
    #[arg(long, value_parser = parse_address)]
    address: Option<u32>,
}

#[derive(Debug, Args)]
struct DumpArgs {
    /// Start address (hex)
    #[arg(long, value_parser = parse_address)]
    address: Option<u32>,
    /// Number of bytes to read (hex)
    #[arg(long, value_parser = parse_count, default_value = "10")]
    count: u16,
}

fn parse_address(input: &str) -> Result<u32, String> {
    parse_hex_u32(input).map_err(|e| format!("invalid hex address: {e}"))
}

fn parse_count(input: &str) -> Result<u16, String> {
    let count = parse_hex_u32(input).map_err(|e| format!("invalid hex count: {e}"))?;
    u16::try_from(count).map_err(|_| "count must not exceed FFFF".to_string())
}

fn parse_sector(input: &str) -> Result<u32, String> {
    let sector = parse_hex_u32(input).map_err(|e| format!("invalid hex sector: {e}"))?;
    u8::try_from(sector)
        .map(u32::from)
        .map_err(|_| "sector must be between 00 and FF".to_string())
}

fn main() -> Result<()> {
    miette::set_panic_hook();

    let args = Cli::parse();
    initialize_logger(if args.quiet {
        LevelFilter::Warn
    } else {
        LevelFilter::Info
    });
    debug!("{:#?}", args);

    let config = Config::load()?;
    let connect_args = &args.connect_args;

    match args.subcommand {
        Commands::Revision => {
            let revision = cli::revision(&mut connect(connect_args, &config)?)?;
            println!("{revision:X}");
        }
        Commands::Stop => {
            connect(connect_args, &config)?.halt()?;
            info!("CPU stopped, use `start` to resume");
        }
        Commands::Start => {
            if connect(connect_args, &config)?.resume()? {
                info!("CPU started");
            } else {
                info!("CPU is not stopped");
            }
        }
        Commands::Boot { source } => {
            cli::set_boot_source(&mut connect(connect_args, &config)?, source)?
        }
        Commands::Erase(confirm) => {
            cli::confirm("Erase the entire flash memory?", confirm.yes)?;
            cli::erase_flash(&mut connect(connect_args, &config)?)?;
        }
        Commands::Flash(args) => {
            let image = cli::read_file(&args.image)?;
            cli::confirm("Overwrite flash memory?", args.confirm.yes)?;
            cli::flash(
                &mut connect(connect_args, &config)?,
                &image,
                args.address.unwrap_or(config.address),
                args.flash_sector,
                &mut FoenixProgress::default(),
            )?;
            info!("Flashing has completed");
        }
        Commands::FlashBulk(args) => {
            let entries = cli::read_bulk_list(&args.list)?;
            cli::confirm("Overwrite flash memory?", args.confirm.yes)?;
            cli::flash_bulk(
                &mut connect(connect_args, &config)?,
                &entries,
                args.erase,
                &mut FoenixProgress::default(),
            )?;
            info!("Flashing has completed");
        }
        Commands::Upload(args) => upload(connect_args, &config, args, LoaderKind::IntelHex)?,
        Commands::UploadSrec(args) => upload(connect_args, &config, args, LoaderKind::Srec)?,
        Commands::UploadWdc(args) => upload(connect_args, &config, args, LoaderKind::Wdc)?,
        Commands::RunPgx(args) => upload(connect_args, &config, args, LoaderKind::Pgx)?,
        Commands::RunPgz(args) => upload(connect_args, &config, args, LoaderKind::Pgz)?,
        Commands::Binary(args) => binary(connect_args, &config, args, false)?,
        Commands::RunM68kBin(args) => binary(connect_args, &config, args, true)?,
        Commands::Dump(args) => {
            let text = cli::dump(
                &mut connect(connect_args, &config)?,
                args.address.unwrap_or(config.address),
                args.count,
            )?;
            println!("{text}");
        }
        Commands::TcpBridge { listen } => tcp_bridge(connect_args, &config, &listen)?,
        Commands::ListPorts => list_ports()?,
    }

    Ok(())
}

fn upload(
    connect_args: &ConnectArgs,
    config: &Config,
    args: FileArgs,
    kind: LoaderKind,
) -> Result<()> {
    let mut port = connect(connect_args, config)?;
    cli::upload_file(&mut port, &args.file, kind)?;
    info!("Upload complete");

    Ok(())
}

fn binary(
    connect_args: &ConnectArgs,
    config: &Config,
    args: BinaryArgs,
    m68k_vectors: bool,
) -> Result<()> {
    let data = cli::read_binary(&args.file, m68k_vectors)?;
    let address = args.address.unwrap_or(config.address);

    let mut port = connect(connect_args, config)?;
    cli::upload_binary(&mut port, &data, address, m68k_vectors)?;
    info!("Upload complete");

    Ok(())
}

fn tcp_bridge(connect_args: &ConnectArgs, config: &Config, listen: &str) -> Result<()> {
    let port = connect_args.port_name(config)?;
    let settings = config.port_settings();

    info!(
        "Starting TCP bridge on {listen} -> {port} ({} baud, {}s timeout)",
        settings.data_rate,
        settings.timeout.as_secs()
    );

    let relay = Relay::bind(listen, move || transport::open(&port, &settings))?;
    relay.serve()?;

    Ok(())
}

fn list_ports() -> Result<()> {
    let ports = transport::available_ports()?;

    if ports.is_empty() {
        println!("No serial ports found");
    } else {
        println!("Available serial ports:");
        for port in ports {
            println!("  {port}");
        }
    }

    Ok(())
}
