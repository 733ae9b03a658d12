use anyhow::{bail, Context, Result};
use bootimg::hash::DIGEST_SIZE;
use bootimg::prelude::*;
use clap::{ArgAction, Parser, Subcommand};
use std::{
    fs::{self, File},
    io::{BufWriter, Cursor, Write},
    path::{Path, PathBuf},
};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
struct Args {
    /// More output, repeat for even more
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the header fields of a boot image
    Info {
        image: PathBuf,
    },
    /// Copy sections out of a boot image
    Extract {
        image: PathBuf,
        #[arg(short, long)]
        kernel: Option<PathBuf>,
        #[arg(short, long)]
        ramdisk: Option<PathBuf>,
        #[arg(short, long)]
        second: Option<PathBuf>,
    },
    /// Pack sections into a new boot image
    Make {
        #[arg(short, long)]
        kernel: PathBuf,
        #[arg(short, long)]
        ramdisk: PathBuf,
        #[arg(short, long)]
        second: Option<PathBuf>,
        #[arg(long, value_parser = parse_int)]
        page_size: Option<u32>,
        #[arg(long, value_parser = parse_int)]
        base_addr: Option<u32>,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        args: Option<String>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Check the content digest stored in a boot image
    Verify {
        image: PathBuf,
    },
}

/// Accepts decimal, `0x` hex and `0o` octal
fn parse_int(s: &str) -> Result<u32> {
    let s = s.trim();
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else if let Some(oct) = s.strip_prefix("0o") {
        u32::from_str_radix(oct, 8)
    } else {
        s.parse()
    };
    parsed.with_context(|| format!("Invalid number: {s}"))
}

fn open(path: &Path) -> Result<File> {
    File::open(path).with_context(|| format!("Failed to open {}", path.display()))
}

fn info_cmd(image: &Path, out: &mut impl Write) -> Result<()> {
    let header = read_header(&mut open(image)?)
        .with_context(|| format!("Failed to read boot image {}", image.display()))?;
    for (key, value) in header.properties() {
        writeln!(out, "{key}={value}")?;
    }
    Ok(())
}

fn extract_cmd(image: &Path, targets: [Option<PathBuf>; 3]) -> Result<()> {
    info!("Reading boot image: {}", image.display());
    let mut file = open(image)?;
    let header = read_header(&mut file)
        .with_context(|| format!("Failed to read boot image {}", image.display()))?;
    let layout = header.layout();

    for (section, target) in Section::ALL.into_iter().zip(targets) {
        let Some(target) = target else { continue };
        info!("Extracting {section}: {}", target.display());
        let out = File::create(&target)
            .with_context(|| format!("Failed to create {}", target.display()))?;
        let mut out = BufWriter::new(out);
        extract_section(&mut file, layout.section(section), &mut out)
            .with_context(|| format!("Failed to extract {section}"))?;
        out.flush()?;
    }
    Ok(())
}

fn make_cmd(
    kernel: &Path,
    ramdisk: &Path,
    second: Option<&Path>,
    options: &BootImageOptions,
    output: &Path,
) -> Result<BootImageHeader> {
    let (kernel, ramdisk) = (open(kernel)?, open(ramdisk)?);
    let second = second.map(open).transpose()?;

    // output is only touched once the whole image is built
    let mut out = Cursor::new(Vec::new());
    let header = build_container(kernel, ramdisk, second, options, &mut out)
        .with_context(|| format!("Failed to build boot image {}", output.display()))?;
    info!("Writing boot image: {}", output.display());
    fs::write(output, out.into_inner())
        .with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(header)
}

fn verify_cmd(image: &Path) -> Result<()> {
    let data = fs::read(image)
        .with_context(|| format!("Failed to read {}", image.display()))?;
    let image = BootImage::from_bytes(&data)
        .context("Failed to parse boot image")?;
    if !image.hash_ok() {
        bail!("Content digest does not match, the image was modified after it was built");
    }
    info!("Content digest OK: {}", hex::encode(&image.header().id()[..DIGEST_SIZE]));
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match args.cmd {
        Commands::Info { image } => {
            info_cmd(&image, &mut std::io::stdout().lock())?;
        },
        Commands::Extract { image, kernel, ramdisk, second } => {
            extract_cmd(&image, [kernel, ramdisk, second])?;
        },
        Commands::Make {
            kernel, ramdisk, second, page_size, base_addr, name, args, output,
        } => {
            let options = BootImageOptions { page_size, base_addr, name, args };
            make_cmd(&kernel, &ramdisk, second.as_deref(), &options, &output)?;
        },
        Commands::Verify { image } => {
            verify_cmd(&image)?;
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn parse_int_notations() {
        assert_eq!(parse_int("2048").unwrap(), 2048);
        assert_eq!(parse_int("0x10000000").unwrap(), 0x1000_0000);
        assert_eq!(parse_int("0X800").unwrap(), 0x800);
        assert_eq!(parse_int("0o4000").unwrap(), 2048);
        assert!(parse_int("0xZZ").is_err());
        assert!(parse_int("-1").is_err());
    }

    #[test]
    fn make_extract_verify() {
        let dir = TempDir::new().unwrap();
        let kernel = write(&dir, "zImage", &[0xAA; 5000]);
        let ramdisk = write(&dir, "ramdisk.cpio.gz", &[0xBB; 300]);
        let image = dir.path().join("boot.img");

        let options = BootImageOptions {
            name: Some("test".into()),
            args: Some("console=ttyS0".into()),
            ..Default::default()
        };
        let header = make_cmd(&kernel, &ramdisk, None, &options, &image).unwrap();
        assert_eq!(std::fs::metadata(&image).unwrap().len(), header.layout().total_size);
        verify_cmd(&image).unwrap();

        let out_kernel = dir.path().join("kernel.out");
        let out_second = dir.path().join("second.out");
        extract_cmd(&image, [Some(out_kernel.clone()), None, Some(out_second.clone())]).unwrap();
        assert_eq!(std::fs::read(out_kernel).unwrap(), vec![0xAA; 5000]);
        assert!(std::fs::read(out_second).unwrap().is_empty());
    }

    #[test]
    fn info_lists_properties() {
        let dir = TempDir::new().unwrap();
        let kernel = write(&dir, "kernel", b"kernel");
        let ramdisk = write(&dir, "ramdisk", b"ramdisk");
        let image = dir.path().join("boot.img");
        let options = BootImageOptions { base_addr: Some(0x8000_0000), ..Default::default() };
        make_cmd(&kernel, &ramdisk, None, &options, &image).unwrap();

        let mut out = Vec::new();
        info_cmd(&image, &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("baseAddr=0x80000000\n"));
        assert!(out.contains("kernelAddr=0x80008000\n"));
        assert!(out.contains("kernelSize=0x00000006\n"));
        assert!(out.contains("pageSize=0x00000800\n"));
    }

    #[test]
    fn verify_catches_tampering() {
        let dir = TempDir::new().unwrap();
        let kernel = write(&dir, "kernel", b"kernel");
        let ramdisk = write(&dir, "ramdisk", b"ramdisk");
        let image = dir.path().join("boot.img");
        make_cmd(&kernel, &ramdisk, None, &BootImageOptions::default(), &image).unwrap();

        let mut data = std::fs::read(&image).unwrap();
        data[2048] = b'K';
        std::fs::write(&image, data).unwrap();
        assert!(verify_cmd(&image).is_err());
    }

    #[test]
    fn failed_make_keeps_existing_image() {
        let dir = TempDir::new().unwrap();
        let kernel = write(&dir, "kernel", b"kernel");
        let ramdisk = write(&dir, "ramdisk", b"ramdisk");
        let empty = write(&dir, "empty", b"");
        let image = dir.path().join("boot.img");
        make_cmd(&kernel, &ramdisk, None, &BootImageOptions::default(), &image).unwrap();
        let before = std::fs::read(&image).unwrap();
        assert_eq!(before.len(), 6144);

        assert!(make_cmd(&empty, &ramdisk, None, &BootImageOptions::default(), &image).is_err());
        let long_name = BootImageOptions { name: Some("n".repeat(17)), ..Default::default() };
        assert!(make_cmd(&kernel, &ramdisk, None, &long_name, &image).is_err());
        assert!(make_cmd(&dir.path().join("missing"), &ramdisk, None, &BootImageOptions::default(), &image).is_err());
        assert_eq!(std::fs::read(&image).unwrap(), before);
    }

    #[test]
    fn make_rejects_missing_input() {
        let dir = TempDir::new().unwrap();
        let ramdisk = write(&dir, "ramdisk", b"ramdisk");
        let err = make_cmd(
            &dir.path().join("missing"),
            &ramdisk,
            None,
            &BootImageOptions::default(),
            &dir.path().join("boot.img"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
