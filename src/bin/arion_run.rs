//! Minimal CLI driver: loads a raw shellcode file as a baremetal guest and
//! runs it. A real build would accept ELF binaries too, once a concrete
//! [`arion::engine::CpuEngine`]/ELF parser binding is wired in — this binary
//! only demonstrates the in-crate wiring, so it runs against
//! [`arion::engine::FakeCpuEngine`].

use anyhow::{bail, Context, Result};
use arion::baremetal::BaremetalManager;
use arion::engine::FakeCpuEngine;
use arion::guest::Arion;
use arion::types::CpuArch;
use arion::Config;
use std::path::PathBuf;

struct Args {
    shellcode_path: PathBuf,
    arch: CpuArch,
    load_addr: u64,
    fs_root: PathBuf,
}

fn parse_args() -> Result<Args> {
    let mut shellcode_path = None;
    let mut arch = CpuArch::X8664;
    let mut load_addr = 0x400000u64;
    let mut fs_root = PathBuf::from("/tmp/arion-root");

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--arch" => {
                let v = it.next().context("--arch needs a value")?;
                arch = CpuArch::from_name(&v).with_context(|| format!("unknown arch '{v}'"))?;
            }
            "--load-addr" => {
                let v = it.next().context("--load-addr needs a value")?;
                load_addr = u64::from_str_radix(v.trim_start_matches("0x"), 16).context("bad --load-addr")?;
            }
            "--fs-root" => {
                fs_root = PathBuf::from(it.next().context("--fs-root needs a value")?);
            }
            path => shellcode_path = Some(PathBuf::from(path)),
        }
    }

    Ok(Args {
        shellcode_path: shellcode_path.context("usage: arion-run [--arch NAME] [--load-addr HEX] [--fs-root DIR] <shellcode-file>")?,
        arch,
        load_addr,
        fs_root,
    })
}

fn main() -> Result<()> {
    let config = Config::default().with_env_overrides();
    env_logger::Builder::new().filter_level(config.log_lvl.to_log_level_filter()).init();

    let args = parse_args()?;
    let code = std::fs::read(&args.shellcode_path).with_context(|| format!("reading {}", args.shellcode_path.display()))?;
    if code.is_empty() {
        bail!("shellcode file is empty");
    }

    let handle = Arion::new_instance(args.arch, Box::new(FakeCpuEngine::default()), args.fs_root, config);
    let manager = BaremetalManager::with_entry_at_load(args.arch, code, args.load_addr);
    let params = handle.borrow_mut().load_baremetal(vec![args.shellcode_path.display().to_string()], vec![], manager)?;

    log::info!("entry point: {:#x}", params.entry_addr);
    handle.borrow_mut().run()?;

    println!("{}", handle.borrow().mem().mappings_str());
    Ok(())
}
