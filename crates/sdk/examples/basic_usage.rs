//! Basic SDK usage example.
//!
//! Lists the wikis and projects visible to the token owner.
//!
//! Run with: DOORAY_API_KEY=... cargo run --example basic_usage

use dooray_sdk::{DoorayClient, DoorayResult, Paging};

#[tokio::main]
async fn main() -> DoorayResult<()> {
    tracing_subscriber::fmt::init();

    // Reads DOORAY_API_KEY and, optionally, DOORAY_BASE_URL
    let client = DoorayClient::from_env()?;

    println!("Listing wikis...");
    let wikis = client.wiki().list(Paging::new(0, 20)).await?;
    println!("Found {} wikis", wikis.len());

    for wiki in wikis.items.iter().take(5) {
        println!("  Wiki: {} ({})", wiki["name"], wiki["id"]);
    }

    println!("\nListing projects...");
    let projects = client.projects().list(Paging::new(0, 20)).await?;
    println!("Found {} projects", projects.len());

    for project in projects.items.iter().take(5) {
        println!("  Project: {} ({})", project["code"], project["id"]);
    }

    Ok(())
}
