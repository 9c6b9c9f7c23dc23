use anyhow::Result;
use std::path::PathBuf;

use shelfsnap::{validate, FsPath, FsStorage};

use super::cli::RegistryArgs;
use super::util::build_registry;

pub fn exec(file: PathBuf, json: bool, registry: RegistryArgs) -> Result<()> {
    let reg = build_registry(&registry);
    let report = validate(&FsStorage, &FsPath::new(file), &reg)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("manga:      {}", report.manga_count);
    println!("categories: {}", report.category_count);
    if report.missing_trackers.is_empty() {
        println!("trackers:   ok");
    } else {
        for t in &report.missing_trackers {
            println!("not logged in: {} (id={})", t.name, t.service_id);
        }
    }
    if !report.references_primary_source {
        println!("warning: no manga from source {}", registry.primary_source);
    }
    Ok(())
}
