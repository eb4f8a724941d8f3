//! netfast - DNS filter enforcement agent
//!
//! Keeps the machine resolving through a filtering provider and holds the
//! user accountable when it stops doing so.

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    netfast_cli::run().await
}
