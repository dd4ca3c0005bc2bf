pub mod audio;
pub mod config;
pub mod server;
pub mod statistics;

use std::sync::Arc;

use self::{config::Config, statistics::Statistics};

#[rustfmt::skip]
static SOFTWARE: &str = concat!(
    "rtp-stream.",
    env!("CARGO_PKG_VERSION")
);

/// In order to let integration tests use the rtp-stream crate and run a
/// whole session, a function is opened to replace the main function to
/// directly start the server.
pub async fn startup(config: Arc<Config>) -> anyhow::Result<()> {
    log::info!("{} starting: mode={:?}", SOFTWARE, config.mode);

    let statistics = Statistics::default();
    server::start(&config, &statistics).await
}
