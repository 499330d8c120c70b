use anyhow::{Context, Result};
use datareg_core::{Layer, RegistryLedger, RunConfig};

pub fn run(config: &RunConfig) -> Result<()> {
    let layout = &config.layout;
    layout
        .ensure_layout()
        .with_context(|| format!("Failed to create data layout under {}", layout.root().display()))?;
    RegistryLedger::open(layout.registry_path())
        .ensure_header()
        .context("Failed to create registry")?;

    println!("Data layout ready at {}", layout.root().display());
    for layer in Layer::ALL {
        println!("  data/{layer}/");
    }
    println!("  secrets/   (put credentials in secrets/.env; keep it out of version control)");
    println!();
    println!("Next steps:");
    println!("  datareg download --name <name> --url <url> --dest-subdir raw");
    println!("  datareg log");
    Ok(())
}
