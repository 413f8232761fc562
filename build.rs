#![deny(clippy::implicit_return)]
#![allow(clippy::needless_return)]

use anyhow::Result;
use vergen::EmitBuilder;

fn main() -> Result<()> {
    // Falls back to idempotent values when the sources are not a git checkout.
    EmitBuilder::builder().build_date().all_git().emit()?;

    return Ok(());
}
