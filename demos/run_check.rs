//! # Example: run_check
//!
//! Runs one check image with the Docker CLI backend and prints its outcome.
//!
//! Demonstrates how to:
//! - Resolve the checktype of an image and apply its defaults to a [`Check`].
//! - Start a [`Runtime`] with its push server.
//! - Stop everything on SIGINT/SIGTERM.
//!
//! ## Flow
//! ```text
//! Checktype::from_image_ref(docker, image) ──► Check::with_checktype_defaults
//! Runtime::start(cfg, docker) ──► push server on cfg.push.listen
//!     ├─► Runtime::run(check)          → CheckOutcome
//!     └─► Runtime::shutdown_on_signal  → every run KILLED
//! Runtime::shutdown ──► push server drains and stops
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=info cargo run --example run_check -- vulcansec/vulcan-exposed-http:latest example.com Hostname
//! ```
//!
//! The push server listens on `0.0.0.0:8080`; containers reach it through
//! `CHECKVISOR_PUSH_ADDRESS` (default `http://host.docker.internal:8080`).

use std::sync::Arc;

use checkvisor::{Check, Checktype, Config, DockerCli, Runtime};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(image), Some(target)) = (args.next(), args.next()) else {
        eprintln!("usage: run_check <image> <target> [asset type]");
        std::process::exit(2);
    };
    let asset_type = args.next();

    // 1. Configuration
    let mut cfg = Config::default();
    cfg.push.listen = "0.0.0.0:8080".into();
    cfg.push.address = Some(
        std::env::var("CHECKVISOR_PUSH_ADDRESS")
            .unwrap_or_else(|_| "http://host.docker.internal:8080".into()),
    );

    // 2. Checktype defaults from the image labels
    let docker = Arc::new(DockerCli::new());
    let checktype = Checktype::from_image_ref(docker.as_ref(), &image).await?;
    println!("checktype {} {}", checktype.name, checktype.version);

    let mut check = Check::new(image, target).with_checktype_defaults(&checktype);
    if let Some(asset_type) = asset_type {
        check = check.with_asset_type(asset_type);
    }

    // 3. Runtime with its push server
    let (runtime, push) = Runtime::start(cfg, docker).await?;

    // 4. Run until done or interrupted
    let handle = runtime.submit(check);
    println!("check {} submitted", handle.id());
    tokio::select! {
        outcome = handle.outcome() => {
            let outcome = outcome?;
            println!("check {} finished: {}", outcome.id, outcome.state);
            if let Some(report) = outcome.report {
                println!("{report}");
            }
            if let Some(err) = outcome.error {
                eprintln!("{err}");
            }
            runtime.shutdown().await?;
        }
        res = runtime.shutdown_on_signal() => res?,
    }

    push.stopped().await?;
    Ok(())
}
