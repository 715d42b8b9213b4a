// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;
use std::process;

use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use tuf_updater::{Updater, UpdaterEnv};

#[tokio::main]
pub async fn main() {
    let settings = UpdaterEnv::from_os_env();

    let env_filter = format!(
        "h2=off,hyper=off,rustls=off,{}",
        settings.log_level.to_lowercase()
    );

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let targets: Vec<String> = env::args().skip(1).collect();
    if targets.is_empty() {
        error!("usage: tuf-fetch <target-path>...");
        process::exit(2);
    }

    let config = match settings.load_config() {
        Ok(config) => config,
        Err(err) => {
            error!("invalid configuration: {err}");
            process::exit(1);
        }
    };
    debug!(?config, "starting tuf-fetch");

    let mut updater = match Updater::new(config) {
        Ok(updater) => updater,
        Err(err) => {
            error!("failed to load trusted root: {err}");
            process::exit(1);
        }
    };
    if let Err(err) = updater.refresh().await {
        error!("metadata refresh failed: {err}");
        process::exit(1);
    }

    let mut failed = false;
    for target_path in &targets {
        match fetch(&mut updater, target_path).await {
            Ok(path) => println!("{path}"),
            Err(err) => {
                error!(target_path, "{err}");
                failed = true;
            }
        }
    }
    if failed {
        process::exit(1);
    }
}

/// Resolves one target and returns where its verified bytes live.
async fn fetch(updater: &mut Updater, target_path: &str) -> tuf_updater::Result<String> {
    let target = updater.get_target_info(target_path).await?;
    if let Some((path, _)) = updater.find_cached_target(&target, None)? {
        info!(target_path, "target already cached");
        return Ok(path.display().to_string());
    }
    let (path, _) = updater.download_target(&target, None, None).await?;
    Ok(path.display().to_string())
}
