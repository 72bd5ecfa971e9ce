use anyhow::Context;
use clap::{Parser, Subcommand};
use rust_fat12::FatDisk;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "fat12")]
#[command(about = "Inspect and modify FAT12 disk images", long_about = None)]
struct Cli {
    /// Log engine activity at debug level (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show volume information
    Info {
        /// Disk image
        image: PathBuf,
    },
    /// List every file and directory
    List {
        /// Disk image
        image: PathBuf,
    },
    /// Copy a file out of the image
    Get {
        /// Disk image
        image: PathBuf,
        /// Path inside the image, e.g. SUBDIR/FILE.TXT
        name: String,
        /// Local destination, defaults to the file name in the current directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Copy a local file into the root directory of the image
    Put {
        /// Disk image
        image: PathBuf,
        /// Local file
        file: PathBuf,
        /// 8.3 name to store it under, defaults to the local file name
        #[arg(short, long)]
        name: Option<String>,
    },
}

fn open_image(image: &Path, writable: bool) -> anyhow::Result<FatDisk<File>> {
    let file = OpenOptions::new()
        .read(true)
        .write(writable)
        .open(image)
        .with_context(|| format!("cannot open {}", image.display()))?;
    FatDisk::open(file).with_context(|| format!("cannot read FAT12 volume {}", image.display()))
}

fn file_name(path: &Path) -> anyhow::Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| anyhow::anyhow!("{} has no file name", path.display()))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    let mut logger = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));
    if cli.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    match cli.command {
        Commands::Info { image } => {
            let mut disk = open_image(&image, false)?;
            println!("{}", disk.info()?);
        }
        Commands::List { image } => {
            let mut disk = open_image(&image, false)?;
            for entry in disk.list_tree() {
                println!("{}", entry?);
            }
        }
        Commands::Get { image, name, output } => {
            let mut disk = open_image(&image, false)?;
            let data = disk.extract_file(&name)?;
            let output = match output {
                Some(path) => path,
                None => PathBuf::from(file_name(Path::new(&name))?),
            };
            fs::write(&output, &data).with_context(|| format!("cannot write {}", output.display()))?;
            println!("Copied {} ({} bytes) to {}", name, data.len(), output.display());
        }
        Commands::Put { image, file, name } => {
            let data = fs::read(&file).with_context(|| format!("cannot read {}", file.display()))?;
            let name = match name {
                Some(name) => name,
                None => file_name(&file)?,
            };
            let mut disk = open_image(&image, true)?;
            disk.insert_file(&name, &data)?;
            println!("Copied {} ({} bytes) into {}", name, data.len(), image.display());
        }
    }

    Ok(())
}
