//! streamgate - a caching reverse proxy for streaming media
//!
//! fetches remote m3u/hls playlists and media segments for a client:
//! - playlists are rewritten so every url points back through the proxy
//! - segments and single streams are relayed as they arrive
//! - complete responses are cached in memory
//!

mod cache;
mod channels;
mod config;
mod fetcher;
mod headers;
mod home;
mod playlist;
mod rewriter;
mod router;
mod server;
mod stream;
#[cfg(test)]
mod testing;
mod tls;
mod util;

use config::Config;
use util::Result;

#[actix_web::main]
async fn main() -> Result<()> {
    util::setup_logger();
    let config = Config::load()?;
    server::run(config).await
}
