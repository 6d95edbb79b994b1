//! Driver listing command.

use clap::Args;
use conduit_registry::{DriverCategory, DriverRegistry};

#[derive(Args)]
pub struct DriversArgs {
    /// Show details for a specific driver
    #[arg(value_name = "TYPE")]
    driver: Option<String>,
}

pub fn run(args: DriversArgs) -> anyhow::Result<()> {
    let registry = DriverRegistry::new();

    if let Some(tag) = &args.driver {
        let driver = registry
            .get(&tag.to_ascii_lowercase())
            .ok_or_else(|| anyhow::anyhow!("Unknown driver: {}", tag))?;

        println!("{}", driver.name);
        println!("{}", "=".repeat(driver.name.len()));
        println!();
        println!("{}", driver.description);
        println!();
        println!("Type:      {}", driver.tag);
        println!("Category:  {}", driver.category.name());
        if driver.params.is_empty() {
            println!("Params:    none");
        } else {
            println!("Params:    {}", driver.params.join(", "));
        }
        return Ok(());
    }

    println!("Available Drivers");
    println!("=================");

    for category in [DriverCategory::Endpoint, DriverCategory::Processing, DriverCategory::Analysis] {
        println!();
        println!("{} - {}", category.name(), category.description());
        for driver in registry.drivers_in_category(category) {
            println!("  {:8} - {}", driver.tag, driver.description);
        }
    }

    println!();
    println!("Use 'conduit drivers <type>' for parameter info.");
    Ok(())
}
