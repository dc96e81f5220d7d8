//! blz - bottom LZ codec and DSi ROM ARM9 optimizer

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use blz_rs::rom::{self, Arm9Options, SecureAreaStatus};
use blz_rs::*;

#[derive(Parser, Debug)]
#[command(name = "blz")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Show progress
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compress a raw file
    Encode {
        input: PathBuf,
        output: PathBuf,
        /// Use the lookahead parser (slower, usually smaller)
        #[arg(long)]
        best: bool,
        /// Keep the first 16 KiB uncompressed, as an ARM9 binary needs
        #[arg(long)]
        arm9: bool,
    },
    /// Decompress a file
    Decode {
        input: PathBuf,
        output: PathBuf,
        /// Decoded size, needed to strip the padding of stored files
        #[arg(long)]
        expected_len: Option<usize>,
    },
    /// Compress the ARM9 binary of each ROM and collect donor ARM7 binaries
    Optimize {
        #[arg(required = true)]
        roms: Vec<PathBuf>,
        /// Use the lookahead parser (slower, usually smaller)
        #[arg(long)]
        best: bool,
        /// Fix a wrong secure area CRC before compressing
        #[arg(long)]
        fix_secure_crc: bool,
        #[arg(long, default_value = "out")]
        out_dir: PathBuf,
        /// Directory holding sdkXY.nds donor ROMs
        #[arg(long, default_value = "a7donors/dsiware")]
        donor_dir: PathBuf,
    },
}

fn mode(best: bool) -> CompressionMode {
    if best {
        CompressionMode::Best
    } else {
        CompressionMode::Normal
    }
}

fn encode(input: &Path, output: &Path, opts: &CompressOptions, verbose: bool) -> Result<()> {
    let inp = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    if verbose {
        println!("- encoding '{}'", input.display());
    }
    let outp = compress_with_options(&inp, opts)?;
    fs::write(output, &outp).with_context(|| format!("writing {}", output.display()))?;
    if verbose {
        println!("  {} -> {} bytes", inp.len(), outp.len());
    }
    Ok(())
}

fn decode(input: &Path, output: &Path, expected_len: Option<usize>, verbose: bool) -> Result<()> {
    let inp = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    if verbose {
        println!("- decoding '{}'", input.display());
    }
    let out = decompress_to_vec(&inp, expected_len)?;
    if out.warnings.contains(DecodeWarnings::NOT_COMPRESSED) {
        eprintln!("WARNING: '{}' is not a coded file", input.display());
    }
    if out.warnings.contains(DecodeWarnings::OVERLONG_MATCH) {
        eprintln!("WARNING: wrong decoded length in '{}'", input.display());
    }
    if out.warnings.contains(DecodeWarnings::TRUNCATED_STREAM) {
        eprintln!("WARNING: unexpected end of encoded file '{}'", input.display());
    }
    fs::write(output, &out.data).with_context(|| format!("writing {}", output.display()))?;
    Ok(())
}

/// Find the closest donor ROM for an SDK version
fn find_donor(donor_dir: &Path, sdk_major: u8, sdk_minor: u8) -> Option<PathBuf> {
    rom::donor_names(sdk_major, sdk_minor)
        .into_iter()
        .map(|name| donor_dir.join(name))
        .find(|path| path.is_file())
}

fn optimize(
    rom_path: &Path,
    opts: &Arm9Options,
    out_dir: &Path,
    donor_dir: &Path,
    verbose: bool,
) -> Result<()> {
    let stem = rom_path
        .file_stem()
        .with_context(|| format!("no file name in {}", rom_path.display()))?;
    let folder = out_dir.join(stem);
    fs::create_dir_all(&folder).with_context(|| format!("creating {}", folder.display()))?;

    if verbose {
        println!("- loading '{}'", rom_path.display());
    }
    let mut base = fs::read(rom_path).with_context(|| format!("reading {}", rom_path.display()))?;

    if verbose {
        println!("- compressing ARM9 binary");
    }
    let arm9 = rom::compress_arm9(&base, opts)?;
    match arm9.secure_area {
        SecureAreaStatus::CrcMismatch { stored, computed } => {
            let fixed = if opts.repair_secure_area_crc { ", fixed" } else { "" };
            eprintln!(
                "WARNING: secure area CRC {:04X} should be {:04X}{}",
                stored, computed, fixed
            );
        }
        status if verbose => println!("  secure area: {:?}", status),
        _ => {}
    }
    if verbose {
        if arm9.gba_slot_patched {
            println!("  GBA slot init stubbed out");
        }
        println!(
            "  {} -> {} bytes, SDK {}.{}",
            arm9.header.arm9_size,
            arm9.packed.len(),
            arm9.params.sdk_major,
            arm9.params.sdk_minor
        );
    }
    let arm9_path = folder.join("arm9.bin");
    fs::write(&arm9_path, &arm9.packed)
        .with_context(|| format!("writing {}", arm9_path.display()))?;

    let (sdk_major, sdk_minor) = (arm9.params.sdk_major, arm9.params.sdk_minor);
    match find_donor(donor_dir, sdk_major, sdk_minor) {
        Some(donor_path) => dump_donor(&donor_path, &folder, &mut base, verbose)?,
        None => eprintln!(
            "WARNING: no donor ROM for SDK {}.{} in {}, base.nds left unpatched",
            sdk_major,
            sdk_minor,
            donor_dir.display()
        ),
    }

    let base_path = folder.join("base.nds");
    if verbose {
        println!("- writing {}", base_path.display());
    }
    fs::write(&base_path, &base).with_context(|| format!("writing {}", base_path.display()))?;

    Ok(())
}

/// Write the donor's ARM7 binaries and copy its MBK6 and device list words into `base`
fn dump_donor(donor_path: &Path, folder: &Path, base: &mut [u8], verbose: bool) -> Result<()> {
    if verbose {
        println!("- loading donor '{}'", donor_path.display());
    }
    let donor =
        fs::read(donor_path).with_context(|| format!("reading {}", donor_path.display()))?;
    let donor_header = rom::RomHeader::parse(&donor)?;
    for (name, bin) in [
        ("arm7.bin", donor_header.arm7(&donor)?),
        ("arm7i.bin", donor_header.arm7i(&donor)?),
    ] {
        let path = folder.join(name);
        if verbose {
            println!("- dumping {}", path.display());
        }
        fs::write(&path, bin).with_context(|| format!("writing {}", path.display()))?;
    }

    rom::patch_base_header(base, donor_header.a7mbk6, donor_header.device_list_address)?;
    Ok(())
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Encode {
            input,
            output,
            best,
            arm9,
        } => {
            let opts = if arm9 {
                CompressOptions::arm9(mode(best))
            } else {
                CompressOptions::new(mode(best))
            };
            encode(&input, &output, &opts, args.verbose)
        }
        Command::Decode {
            input,
            output,
            expected_len,
        } => decode(&input, &output, expected_len, args.verbose),
        Command::Optimize {
            roms,
            best,
            fix_secure_crc,
            out_dir,
            donor_dir,
        } => {
            let opts = Arm9Options {
                mode: mode(best),
                repair_secure_area_crc: fix_secure_crc,
            };
            let mut failed = 0;
            for rom_path in &roms {
                if let Err(e) = optimize(rom_path, &opts, &out_dir, &donor_dir, args.verbose) {
                    eprintln!("{}: {:#}", rom_path.display(), e);
                    failed += 1;
                }
            }
            if failed > 0 {
                bail!("{} of {} ROMs failed", failed, roms.len());
            }
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
