//! Dry run: read an interface from a recorded session and print the lines
//! that would move it to a desired state.
//!
//! ```text
//! cargo run --example plan_from_fixture
//! ```

use anyhow::Context;
use clisync::path::Path;
use clisync::reader::ReadContext;
use clisync::templates;
use clisync::transport::ReplayTransport;
use clisync::writer::ContextSnapshot;

const FIXTURE: &str = include_str!("../tests/fixtures/ios_interfaces.jsonl");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    for meta in templates::profile_catalog() {
        println!(
            "profile {} ({} {}): {}",
            meta.name,
            meta.vendor,
            meta.family,
            meta.entity_types.join(", ")
        );
    }

    let registry = templates::by_name("ios")?;
    let path = Path::root().child("interface", "GigabitEthernet0/1");
    let handler = registry.resolve(&path)?;

    let mut transport = ReplayTransport::from_jsonl(FIXTURE)?;
    let mut ctx = ReadContext::new(&mut transport);
    let before = handler.read_entity(&path, &mut ctx).await?;
    println!("current {path}: {}", serde_json::to_string(&before)?);

    let after = before
        .clone()
        .with_field("description", "uplink to core (migrated)")
        .with_field("mtu", 1500)
        .with_field("enabled", true);
    let writer = handler
        .writer()
        .context("interface handler has no write forms")?;

    let diff = writer.diff(Some(&before), Some(&after));
    println!("diff: {}", serde_json::to_string_pretty(&diff)?);

    let batch = writer.plan_update(&path, &before, &after, &ContextSnapshot::new())?;
    println!("planned {:?} ({} lines):", batch.kind, batch.lines.len());
    for line in &batch.lines {
        println!("  {line}");
    }
    Ok(())
}
