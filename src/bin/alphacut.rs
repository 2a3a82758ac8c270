//! alphacut command line tool
//!
//! Removes the background of an image and writes a transparent PNG.
//! `main` stays synchronous: the task runner owns its own runtime and the
//! main thread blocks on it while waiting for the result.

#[cfg(feature = "cli")]
use alphacut::cli;

#[cfg(feature = "cli")]
fn main() -> anyhow::Result<()> {
    cli::main()
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
