pub mod api;
pub mod ws;

use anyhow::Result;

use crate::config::Config;

pub async fn start(config: Config) -> Result<()> {
    api::serve(config).await
}
