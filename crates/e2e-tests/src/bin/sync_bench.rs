use std::time::Instant;

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde_json::json;

use e2e_tests::{define_attributes, joined_at, TestHarness};
use member_types::MemberSnapshot;

#[derive(Parser, Debug)]
#[command(name = "sync_bench", about = "member-sync resync and cleanup benchmark")]
struct Args {
    /// Members to generate
    #[arg(long, default_value = "2000")]
    members: usize,
    /// Segments per member
    #[arg(long, default_value = "2")]
    segments: usize,
    #[arg(long, default_value = "200")]
    batch_size: usize,
    #[arg(long, default_value = "500")]
    page_size: usize,
    /// Delete every n-th member before cleanup (0 = none)
    #[arg(long, default_value = "10")]
    orphan_every: usize,
    #[arg(long, default_value = "42")]
    seed: u64,
}

#[derive(Serialize)]
struct Report {
    members: usize,
    snapshots: usize,
    ingest_ms: u128,
    resync_ms: u128,
    resync_batches: usize,
    documents_indexed: usize,
    cleanup_ms: u128,
    cleanup_pages: usize,
    orphans_removed: usize,
}

fn generate(args: &Args, rng: &mut StdRng) -> Vec<MemberSnapshot> {
    let mut rows = Vec::with_capacity(args.members * args.segments.max(1));
    for n in 0..args.members {
        for s in 0..args.segments.max(1) {
            let mut row = MemberSnapshot::new(
                format!("m-{:07}", n),
                "bench",
                format!("segment-{}", s),
                format!("Member {}", n),
                joined_at(n),
            )
            .with_attribute("location", json!({ "default": format!("City {}", rng.random_range(0..50)) }))
            .with_attribute("karma", json!({ "default": rng.random_range(0..10_000) }))
            .with_attribute("verified", json!({ "default": rng.random_bool(0.3) }));
            row.activity_count = rng.random_range(0..500);
            row.emails = vec![format!("member{}@example.com", n)];
            rows.push(row);
        }
    }
    rows
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let mut rng = StdRng::seed_from_u64(args.seed);
    let harness = TestHarness::new();

    define_attributes(
        &harness.storage,
        "bench",
        &[("location", "STRING"), ("karma", "NUMBER"), ("verified", "BOOLEAN")],
    );
    let rows = generate(&args, &mut rng);

    let start = Instant::now();
    for row in &rows {
        harness.storage.put_member_snapshot(row)?;
    }
    let ingest_ms = start.elapsed().as_millis();

    let start = Instant::now();
    let resync = harness
        .orchestrator()
        .full_resync("bench", true, args.batch_size)
        .await?;
    let resync_ms = start.elapsed().as_millis();

    if args.orphan_every > 0 {
        for n in (0..args.members).step_by(args.orphan_every) {
            harness.storage.delete_member(&format!("m-{:07}", n))?;
        }
    }

    let start = Instant::now();
    let cleanup = harness.reconciler(args.page_size).cleanup("bench").await?;
    let cleanup_ms = start.elapsed().as_millis();

    let report = Report {
        members: args.members,
        snapshots: rows.len(),
        ingest_ms,
        resync_ms,
        resync_batches: resync.batches,
        documents_indexed: resync.documents_indexed,
        cleanup_ms,
        cleanup_pages: cleanup.pages,
        orphans_removed: cleanup.removed.len(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
