//! `elt state ...` — direct operator access to the State Store (§4.6),
//! independent of any running sync: inspect, export/import, and reset
//! replication state for a source.

use anyhow::Result;
use elt_db::state_store::StateStore;

pub async fn show(store: &dyn StateStore, source_id: &str) -> Result<()> {
    match store.get(source_id).await? {
        Some(state) => super::print_json(&serde_json::to_value(&state)?),
        None => {
            println!("no state recorded for source '{source_id}'");
            Ok(())
        }
    }
}

pub async fn list(store: &dyn StateStore) -> Result<()> {
    let sources = store.list().await?;
    for source in &sources {
        println!(
            "{}  {}  streams={}  version={}",
            source.source_id,
            source.source_name,
            source.streams.len(),
            source.version
        );
    }
    Ok(())
}

pub async fn summary(store: &dyn StateStore) -> Result<()> {
    let summary = store.summary().await?;
    println!("total_sources={}", summary.total_sources);
    println!("total_streams={}", summary.total_streams);
    println!("total_records_synced={}", summary.total_records_synced);
    Ok(())
}

pub async fn reset(store: &dyn StateStore, source_id: &str, stream: Option<&str>) -> Result<()> {
    match stream {
        Some(stream) => {
            store.reset_stream(source_id, stream).await?;
            println!("reset stream '{stream}' on source '{source_id}'");
        }
        None => {
            store.reset_source(source_id).await?;
            println!("reset source '{source_id}'");
        }
    }
    Ok(())
}

pub async fn delete(store: &dyn StateStore, source_id: &str) -> Result<()> {
    store.delete(source_id).await?;
    println!("deleted state for source '{source_id}'");
    Ok(())
}

pub async fn export(store: &dyn StateStore, source_id: &str) -> Result<()> {
    let exported = store.export(source_id).await?;
    super::print_json(&exported)
}

pub async fn import(store: &dyn StateStore, source_id: &str, path: &std::path::Path) -> Result<()> {
    let data = super::read_json_file(path)?;
    store.import(source_id, data).await?;
    println!("imported state for source '{source_id}' from {}", path.display());
    Ok(())
}
