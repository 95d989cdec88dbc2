//! Standalone CLI front end over the `polyscene` library: parse-and-summarize,
//! archive extraction, and single-image PNG dumping for development and
//! regression testing. Contains no scene-assembly or rendering logic of
//! its own.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::exit;

use clap::{Parser, Subcommand};
use log::{error, info};

use polyscene::error::Result;
use polyscene::formats::{aar, mot, opr, pol, qnt};
use polyscene::logger;

#[derive(Parser)]
#[command(name = "polyscene", about = "Decode and inspect AAR/QNT/POL/MOT/OPR game assets")]
struct Cli {
    /// Increase logging verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse one or more files and print a structural summary.
    Info { files: Vec<PathBuf> },
    /// Unpack every entry of an AAR archive to a directory.
    Extract {
        archive: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
    /// Decode a QNT image and save it as a PNG.
    DumpPng { qnt_file: PathBuf, out_png: PathBuf },
}

fn main() {
    let cli = Cli::parse();
    logger::init(logger::level_for_verbosity(cli.verbose));

    let result = match cli.command {
        Command::Info { files } => cmd_info(&files),
        Command::Extract { archive, output } => cmd_extract(&archive, &output),
        Command::DumpPng { qnt_file, out_png } => cmd_dump_png(&qnt_file, &out_png),
    };

    if let Err(e) = result {
        error!("{}", e);
        exit(1);
    }
}

fn cmd_info(files: &[PathBuf]) -> Result<()> {
    for path in files {
        let buf = fs::read(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
        println!("{}:", path.display());
        match ext.as_str() {
            "aar" => {
                let archive = aar::AarArchive::open(&buf)?;
                println!("  AAR archive, {} entries", archive.filenames().len());
            }
            "qnt" => {
                let image = qnt::decode(&buf)?;
                println!("  QNT image {}x{}, has_alpha={}", image.width, image.height, image.has_alpha);
            }
            "pol" => {
                let model = pol::decode(&buf)?;
                println!(
                    "  POL v{} model: {} materials, {} meshes, {} bones",
                    model.version,
                    model.materials.len(),
                    model.meshes.len(),
                    model.bones.len()
                );
            }
            "mot" => {
                let motion = mot::decode(&buf)?;
                println!("  MOT motion: {} frames, {} bones", motion.frame_count, motion.bones.len());
            }
            "opr" => {
                let overlay = opr::decode(&buf)?;
                println!("  OPR overlay: {} meshes", overlay.meshes.len());
            }
            other => {
                println!("  unrecognized extension {:?}; skipping", other);
            }
        }
    }
    Ok(())
}

fn cmd_extract(archive_path: &Path, output: &Path) -> Result<()> {
    let buf = fs::read(archive_path)?;
    let archive = aar::AarArchive::open(&buf)?;
    fs::create_dir_all(output)?;

    for name in archive.filenames() {
        let data = archive.load(name)?;
        let dest = output.join(name.replace('\\', std::path::MAIN_SEPARATOR_STR));
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&dest, &data)?;
        info!("extracted {}", name);
    }
    Ok(())
}

fn cmd_dump_png(qnt_path: &Path, out_path: &Path) -> Result<()> {
    let buf = fs::read(qnt_path)?;
    let image = qnt::decode(&buf)?;

    let file = fs::File::create(out_path)?;
    let writer = std::io::BufWriter::new(file);
    let mut encoder = png::Encoder::new(writer, image.width, image.height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&image.pixels)?;
    Ok(())
}
