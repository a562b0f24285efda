use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use alu_vm::{Vm, VmError, VmResult};
use clap::Parser;

/// Run a compiled bytecode program.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the compiled program to execute.
    path: PathBuf,

    /// Log every decoded instruction and jump taken to stderr.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let interrupt = Arc::new(AtomicBool::new(false));
    let handler_flag = interrupt.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    }) {
        log::warn!("failed to install interrupt handler: {err}");
    }

    let mut vm = Vm::new(interrupt);
    vm.verbose = args.verbose;

    let status = match load_program(&args.path) {
        Ok(bytes) => vm.run(&bytes),
        Err(err) => vm.fail(err),
    };
    ExitCode::from(status as u8)
}

/// Loads a program file, routing host failures through `VmError` so the
/// CLI reports them via the same `Vm::close()` path as execution errors.
fn load_program(path: &Path) -> VmResult<Vec<u8>> {
    match fs::metadata(path) {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(VmError::NoFile),
        Err(err) => return Err(VmError::HostStat(err.to_string())),
    }
    Ok(fs::read(path)?)
}
