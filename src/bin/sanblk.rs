//! sanblk CLI
//!
//! Discovers storage nodes, inspects disks and partitions, performs
//! single-sector I/O and attaches a partition as a local block device.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sanblk::network::{load_write_payload, PartitionAddress};
use sanblk::{Client, Config, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// sanblk
#[derive(Parser, Debug)]
#[command(name = "sanblk")]
#[command(about = "Client for UDP storage-area-network nodes")]
#[command(version)]
struct Args {
    /// Bind the protocol socket to this network interface
    #[arg(short, long)]
    interface: Option<String>,

    /// Log protocol activity
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List every disk and partition on the network
    Listall,

    /// Print the address serving a partition
    Resolve {
        /// Partition identifier
        id: String,
    },

    /// Dump the 512 byte sector containing a byte offset
    Read {
        /// Partition identifier
        id: String,

        /// Byte offset
        offset: u64,
    },

    /// Write a file's contents at a byte offset
    Write {
        /// Partition identifier
        id: String,

        /// Byte offset
        offset: u64,

        /// Payload file; its size must be a power of two from 512 to 32768
        file: PathBuf,
    },

    /// Serve a partition through an NBD device
    Attach {
        /// Partition identifier
        id: String,

        /// NBD device, e.g. /dev/nbd0
        device: PathBuf,
    },
}

fn main() {
    let args = Args::parse();

    let default_filter = if args.verbose { "info,sanblk=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_env_filter(filter)
        .with_target(args.verbose)
        .with_writer(std::io::stderr)
        .init();

    let mut builder = Config::builder();
    if let Some(interface) = &args.interface {
        builder = builder.interface(interface);
    }
    let config = builder.build();

    if let Err(e) = run(args.command, config) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands, config: Config) -> Result<()> {
    let mut client = Client::open(config)?;

    match command {
        Commands::Listall => listall(&mut client),
        Commands::Resolve { id } => {
            match client.resolve(&id)? {
                Some(part) => println!("{}", part.serving.ip()),
                None => eprintln!("{}: not found", id),
            }
            Ok(())
        }
        Commands::Read { id, offset } => {
            let Some(part) = resolve_or_report(&mut client, &id)? else {
                return Ok(());
            };
            match client.read(part.serving, offset)? {
                Some(sector) => dump_hex(&sector),
                None => eprintln!("read timed out"),
            }
            Ok(())
        }
        Commands::Write { id, offset, file } => {
            let Some(part) = resolve_or_report(&mut client, &id)? else {
                return Ok(());
            };
            let data = load_write_payload(&file)?;
            let acknowledged = client.write(part.serving, offset, &data)?;
            eprintln!("{}", if acknowledged { "OK" } else { "FAILED" });
            Ok(())
        }
        Commands::Attach { id, device } => attach(client, &id, &device),
    }
}

fn resolve_or_report(client: &mut Client, id: &str) -> Result<Option<PartitionAddress>> {
    let part = client.resolve(id)?;
    if part.is_none() {
        eprintln!("{}: not found", id);
    }
    Ok(part)
}

// =============================================================================
// listall
// =============================================================================

const RULE: &str =
    "===============================================================================";
const SEPARATOR: &str =
    "- - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -";

fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / 1024.0 / 1024.0
}

fn listall(client: &mut Client) -> Result<()> {
    let disks = client.discover()?;

    for root in disks {
        let Some(disk) = client.query_disk(root)? else {
            tracing::warn!("Disk at {} did not answer", root);
            continue;
        };

        println!("{}", RULE);
        println!("VERSION  : {:<16}              ROOT IP ADDR : {:<16}", disk.version, root.ip());
        println!(
            "TOTAL(MB): {:<6.0}                        # PARTITIONS : {}",
            megabytes(disk.total_size),
            disk.partitions
        );
        println!("FREE (MB): {:<6.0}", megabytes(disk.free_size));

        if disk.partitions > 0 {
            println!("{}", SEPARATOR);
            println!("PARTITION                                LABEL           IP ADDR      SIZE (MB)");
        }

        for index in 1..=u32::from(disk.partitions) {
            let Some(part) = client.query_root_partition(root, index)? else {
                continue;
            };
            let Some(addr) = client.resolve(&part.id)? else {
                continue;
            };
            println!(
                "{:<40} {:<15} {:<15} {:>6.0}",
                part.id,
                part.label,
                addr.serving.ip().to_string(),
                megabytes(part.size)
            );
        }
    }

    println!("{}", RULE);
    Ok(())
}

// =============================================================================
// read
// =============================================================================

/// 32 bytes per line: hex, then printable ASCII
fn dump_hex(data: &[u8]) {
    println!("DUMP:");
    for line in data.chunks(32) {
        let hex: String = line.iter().map(|b| format!("{:02x}", b)).collect();
        let text: String = line
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        println!("{:<64}\t{}", hex, text);
    }
}

// =============================================================================
// attach
// =============================================================================

#[cfg(target_os = "linux")]
fn attach(mut client: Client, id: &str, device: &std::path::Path) -> Result<()> {
    use sanblk::device::nbd::NbdBinding;
    use sanblk::{Proxy, SanError};

    let Some(part) = resolve_or_report(&mut client, id)? else {
        return Ok(());
    };
    let info = client
        .query_partition(part.serving)?
        .ok_or_else(|| SanError::Network(format!("partition {} did not identify itself", id)))?;

    tracing::info!(
        "Attaching {} ({}, {} bytes) served by {} (root {})",
        info.id,
        info.label,
        info.size,
        part.serving,
        part.root
    );

    let config = client.config().clone();
    let (binding, channel) = NbdBinding::attach(device, info.size, &config)?;
    let kernel = binding.serve()?;

    let (socket, sequencer) = client.into_parts();
    let mut proxy = Proxy::new(socket, channel, part.serving, sequencer, &config)?;
    proxy.run()?;

    match kernel.join() {
        Ok(result) => result,
        Err(_) => Err(SanError::DeviceProtocol("NBD thread panicked".to_string())),
    }
}

#[cfg(not(target_os = "linux"))]
fn attach(_client: Client, _id: &str, _device: &std::path::Path) -> Result<()> {
    Err(sanblk::SanError::Config("attach needs the Linux NBD driver".to_string()))
}
