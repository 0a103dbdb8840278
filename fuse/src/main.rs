// Copyright 2026 The hidefs Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! `init`/`mount`/`check` entry point: `init` formats a fresh backing file, `mount`
//! serves it over FUSE, `check` walks both aspect roots and reports invariant
//! violations without mounting anything.

mod adaptor;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use rand::rngs::OsRng;
use rand::RngCore;

use hidefs_core::consts::KEY_SIZE;

const DEFAULT_CACHE_SIZE: usize = 1024;

#[derive(Parser)]
#[command(name = "hidefs", version, about = "Mount a plausibly-deniable encrypted filesystem")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging (equivalent to RUST_LOG=debug).
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Format a fresh backing file and initialize both aspect roots.
    Init(InitArgs),
    /// Mount the filesystem at a directory.
    Mount(MountArgs),
    /// Open the backing file read-only-ish and print tree diagnostics.
    Check(CheckArgs),
}

#[derive(Args)]
struct InitArgs {
    /// Path to the backing file (created or truncated).
    fname: PathBuf,
    /// Number of physical slots to format.
    num_slots: u32,
    #[command(flatten)]
    keys: KeyArgs,
    #[arg(long, default_value_t = DEFAULT_CACHE_SIZE)]
    cache_size: usize,
}

#[derive(Args)]
struct MountArgs {
    /// Path to an already-initialized backing file.
    fname: PathBuf,
    /// Directory to mount at.
    mountpoint: PathBuf,
    #[command(flatten)]
    keys: KeyArgs,
    #[arg(long, default_value_t = DEFAULT_CACHE_SIZE)]
    cache_size: usize,
    /// Pass -d to the FUSE kernel driver in addition to our own logging.
    #[arg(long)]
    fuse_debug: bool,
}

#[derive(Args)]
struct CheckArgs {
    fname: PathBuf,
    #[command(flatten)]
    keys: KeyArgs,
    #[arg(long, default_value_t = DEFAULT_CACHE_SIZE)]
    cache_size: usize,
}

#[derive(Args)]
struct KeyArgs {
    /// Cover aspect key, 16 bytes hex-encoded.
    #[arg(long)]
    cover_key: String,
    /// Hidden aspect key, 16 bytes hex-encoded. Omit with --no-hidden to generate one
    /// at random and discard it, so the hidden aspect is formatted but unrecoverable —
    /// useful when the cover volume alone needs to look plausible.
    #[arg(long, required_unless_present = "no_hidden")]
    hidden_key: Option<String>,
    #[arg(long)]
    no_hidden: bool,
}

impl KeyArgs {
    fn resolve(&self) -> Result<([u8; KEY_SIZE], [u8; KEY_SIZE]), String> {
        let cover = decode_key(&self.cover_key)?;
        let hidden = match &self.hidden_key {
            Some(hex_key) => decode_key(hex_key)?,
            None => {
                let mut key = [0u8; KEY_SIZE];
                OsRng.fill_bytes(&mut key);
                key
            }
        };
        Ok((cover, hidden))
    }
}

fn decode_key(hex_str: &str) -> Result<[u8; KEY_SIZE], String> {
    let bytes = hex::decode(hex_str).map_err(|e| format!("invalid hex key: {e}"))?;
    if bytes.len() != KEY_SIZE {
        return Err(format!("key must be {KEY_SIZE} bytes, got {}", bytes.len()));
    }
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&bytes);
    Ok(key)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let default_level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let result = match cli.command {
        Command::Init(args) => run_init(args),
        Command::Mount(args) => run_mount(args),
        Command::Check(args) => run_check(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run_init(args: InitArgs) -> Result<(), String> {
    let (cover_key, hidden_key) = args.keys.resolve()?;
    log::info!("formatting {} with {} slots", args.fname.display(), args.num_slots);
    hidefs_core::format(&args.fname, &cover_key, &hidden_key, args.num_slots, args.cache_size)
        .map_err(|e| format!("init failed: {e}"))?;
    Ok(())
}

fn run_mount(args: MountArgs) -> Result<(), String> {
    let (cover_key, hidden_key) = args.keys.resolve()?;
    let buffer = hidefs_core::open(&args.fname, &cover_key, &hidden_key, args.cache_size)
        .map_err(|e| format!("failed to open {}: {e}", args.fname.display()))?;

    let fs = adaptor::HideFs::new(buffer);
    let mount_options = vec![fuser::MountOption::FSName("hidefs".to_string())];
    if args.fuse_debug {
        log::debug!("fuse_debug requested; relying on --debug's env_logger trace output instead of a kernel-level flag");
    }

    log::info!("mounting {} at {}", args.fname.display(), args.mountpoint.display());
    fuser::mount2(fs, &args.mountpoint, &mount_options).map_err(|e| format!("mount failed: {e}"))?;
    Ok(())
}

fn run_check(args: CheckArgs) -> Result<(), String> {
    let (cover_key, hidden_key) = args.keys.resolve()?;
    let buffer = hidefs_core::open(&args.fname, &cover_key, &hidden_key, args.cache_size)
        .map_err(|e| format!("failed to open {}: {e}", args.fname.display()))?;

    buffer.check_invariants();
    let counts = buffer.slot_counts();
    println!("mapping_blocks:   {}", counts.mapping_blocks);
    println!("allocated_cover:  {}", counts.allocated_cover);
    println!("allocated_hidden: {}", counts.allocated_hidden);
    println!("virtual_slots:    {}", counts.virtual_slots);
    println!("unallocated:      {}", counts.unallocated);

    {
        use hidefs_core::{Aspect, Dir, ROOT_BLOCK_ID};
        let op = buffer.operation(Aspect::Cover, buffer.cache_size().min(64));
        let cover_root = Dir::open(&buffer, Aspect::Cover, ROOT_BLOCK_ID);
        println!("\ncover tree:\n{}", cover_root.debug_tree());
        drop(cover_root);
        drop(op);

        let op = buffer.operation(Aspect::Hidden, buffer.cache_size().min(64));
        let hidden_root = Dir::open(&buffer, Aspect::Hidden, ROOT_BLOCK_ID);
        println!("\nhidden tree:\n{}", hidden_root.debug_tree());
        drop(hidden_root);
        drop(op);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_key_accepts_exact_length_hex() {
        let hex_str = "00112233445566778899aabbccddeeff";
        let hex_str = &hex_str[..KEY_SIZE * 2];
        let key = decode_key(hex_str).unwrap();
        assert_eq!(key.len(), KEY_SIZE);
        assert_eq!(key[0], 0x00);
        assert_eq!(key[1], 0x11);
    }

    #[test]
    fn decode_key_rejects_wrong_length() {
        let err = decode_key("aabb").unwrap_err();
        assert!(err.contains("16 bytes"), "{err}");
    }

    #[test]
    fn decode_key_rejects_invalid_hex() {
        let err = decode_key("not hex at all!!").unwrap_err();
        assert!(err.contains("invalid hex"), "{err}");
    }

    #[test]
    fn key_args_resolve_generates_hidden_key_when_no_hidden() {
        let args = KeyArgs {
            cover_key: "00112233445566778899aabbccddeeff"[..KEY_SIZE * 2].to_string(),
            hidden_key: None,
            no_hidden: true,
        };
        let (cover, hidden) = args.resolve().unwrap();
        assert_eq!(cover[0], 0x00);
        assert_ne!(hidden, [0u8; KEY_SIZE]);
    }
}
