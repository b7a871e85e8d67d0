use clap::Parser;

use culprit::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	culprit::run(Args::parse()).await
}
