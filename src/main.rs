use anyhow::Result;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use keytree::btree::BTree;

//-------------------------------------------------------------------------

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let dir = std::env::temp_dir().join("keytree-demo");
    std::fs::create_dir_all(&dir)?;
    let store = dir.join("demo.flraf");

    let mut tree = BTree::create(8, 256, &store, 4)?;
    for key in [
        "alpha", "bravo", "charlie", "delta", "echo", "foxtrot", "golf", "hotel",
    ] {
        tree.add(key)?;
    }

    info!(
        nr_keys = tree.len(),
        size = tree.size_in_bytes(),
        "loaded demo keys"
    );

    let hotel = tree.contains("hotel")?;
    let india = tree.contains("india")?;
    info!(hotel, india, "membership");

    tree.close()?;
    Ok(())
}

//-------------------------------------------------------------------------
