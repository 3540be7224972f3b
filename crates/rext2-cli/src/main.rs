#![forbid(unsafe_code)]

use anyhow::{Context, Result, bail};
use rext2_core::{Ext2Fs, FileType};
use rext2_error::Ext2Error;
use serde::Serialize;
use std::env;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Serialize)]
struct InspectOutput {
    block_size: u32,
    blocks_count: u32,
    inodes_count: u32,
    groups_count: u32,
    inode_size: u16,
    first_ino: u32,
    rev_level: u32,
    volume_name: String,
}

#[derive(Debug, Serialize)]
struct StatOutput {
    ino: u32,
    kind: FileType,
    size: u64,
    blocks: u64,
    perm: String,
    nlink: u32,
    uid: u32,
    gid: u32,
}

#[derive(Debug, Serialize)]
struct ListEntry {
    name: String,
    ino: u32,
    file_type: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut args = env::args().skip(1);
    let Some(command) = args.next() else {
        print_usage();
        return Ok(());
    };

    match command.as_str() {
        "inspect" => {
            let Some(path) = args.next() else {
                bail!("inspect requires an image path");
            };
            let json = args.any(|arg| arg == "--json");
            inspect(Path::new(&path), json)
        }
        "ls" => {
            let (image, inner, json) = image_and_path(&mut args, "ls")?;
            ls(Path::new(&image), &inner, json)
        }
        "stat" => {
            let (image, inner, json) = image_and_path(&mut args, "stat")?;
            stat(Path::new(&image), &inner, json)
        }
        "cat" => {
            let (image, inner, _) = image_and_path(&mut args, "cat")?;
            cat(Path::new(&image), &inner)
        }
        "resolve" => {
            let (image, inner, _) = image_and_path(&mut args, "resolve")?;
            resolve(Path::new(&image), &inner)
        }
        "--help" | "-h" | "help" => {
            print_usage();
            Ok(())
        }
        _ => {
            print_usage();
            bail!("unknown command: {command}")
        }
    }
}

fn image_and_path(
    args: &mut impl Iterator<Item = String>,
    command: &str,
) -> Result<(String, String, bool)> {
    let Some(image) = args.next() else {
        bail!("{command} requires <image-path> <path>");
    };
    let Some(inner) = args.next() else {
        bail!("{command} requires <image-path> <path>");
    };
    let json = args.any(|arg| arg == "--json");
    Ok((image, inner, json))
}

fn print_usage() {
    println!("rext2\n");
    println!("USAGE:");
    println!("  rext2 inspect <image-path> [--json]");
    println!("  rext2 ls <image-path> <path> [--json]");
    println!("  rext2 stat <image-path> <path> [--json]");
    println!("  rext2 cat <image-path> <path>");
    println!("  rext2 resolve <image-path> <path>");
}

fn open_image(path: &Path) -> Result<Ext2Fs> {
    Ext2Fs::open(path)
        .with_context(|| format!("failed to open ext2 image {}", path.display()))
}

fn inspect(path: &Path, json: bool) -> Result<()> {
    let fs = open_image(path)?;
    let sb = fs.superblock();
    let geometry = fs.geometry();

    let output = InspectOutput {
        block_size: geometry.block_size,
        blocks_count: geometry.blocks_count,
        inodes_count: geometry.inodes_count,
        groups_count: geometry.groups_count,
        inode_size: geometry.inode_size,
        first_ino: geometry.first_ino,
        rev_level: sb.rev_level,
        volume_name: sb.volume_name.clone(),
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("serialize output")?
        );
    } else {
        println!("block_size: {}", output.block_size);
        println!("blocks_count: {}", output.blocks_count);
        println!("inodes_count: {}", output.inodes_count);
        println!("groups_count: {}", output.groups_count);
        println!("inode_size: {}", output.inode_size);
        println!("first_ino: {}", output.first_ino);
        println!("rev_level: {}", output.rev_level);
        println!("volume_name: {}", output.volume_name);
    }

    Ok(())
}

fn ls(path: &Path, inner: &str, json: bool) -> Result<()> {
    let fs = open_image(path)?;
    let (_, inode) = fs
        .resolve_path(inner)
        .with_context(|| format!("failed to resolve {inner}"))?;

    let entries = fs
        .read_dir(&inode)
        .map_err(|e| describe(e, inner))?
        .into_iter()
        .map(|entry| ListEntry {
            name: entry.name,
            ino: entry.inode,
            file_type: entry.file_type.as_str().to_owned(),
        })
        .collect::<Vec<_>>();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&entries).context("serialize output")?
        );
    } else {
        for entry in entries {
            println!("{:>8}  {:8}  {}", entry.ino, entry.file_type, entry.name);
        }
    }

    Ok(())
}

fn stat(path: &Path, inner: &str, json: bool) -> Result<()> {
    let fs = open_image(path)?;
    let (ino, _) = fs
        .resolve_path(inner)
        .with_context(|| format!("failed to resolve {inner}"))?;
    let attr = fs.read_inode_attr(ino)?;

    let output = StatOutput {
        ino: attr.ino.0,
        kind: attr.kind,
        size: attr.size,
        blocks: attr.blocks,
        perm: format!("{:o}", attr.perm),
        nlink: attr.nlink,
        uid: attr.uid,
        gid: attr.gid,
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("serialize output")?
        );
    } else {
        println!("ino: {}", output.ino);
        println!("kind: {:?}", output.kind);
        println!("size: {}", output.size);
        println!("blocks: {}", output.blocks);
        println!("perm: {}", output.perm);
        println!("nlink: {}", output.nlink);
        println!("uid: {}", output.uid);
        println!("gid: {}", output.gid);
    }

    Ok(())
}

fn cat(path: &Path, inner: &str) -> Result<()> {
    let fs = open_image(path)?;
    let (ino, _) = fs
        .resolve_path(inner)
        .with_context(|| format!("failed to resolve {inner}"))?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    fs.copy_file_to(ino, &mut out)
        .map_err(|e| describe(e, inner))?;
    out.flush().context("flush stdout")?;
    Ok(())
}

fn resolve(path: &Path, inner: &str) -> Result<()> {
    let fs = open_image(path)?;
    let ino = fs
        .inode_number_by_path(inner)
        .with_context(|| format!("failed to resolve {inner}"))?;
    println!("{}", ino.0);
    Ok(())
}

fn describe(error: Ext2Error, inner: &str) -> anyhow::Error {
    anyhow::anyhow!("{inner}: {error} (errno {})", error.to_errno())
}
