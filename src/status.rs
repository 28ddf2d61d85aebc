use anyhow::Result;

use crate::backend::SearchBackend;
use crate::models::EntityKind;

/// Print a status table of every kind's index: alias, the physical index
/// behind it, and the document count. A backend that is down shows up as
/// per-row errors rather than aborting the listing.
pub async fn list_indices(backend: &dyn SearchBackend) -> Result<()> {
    let reachable = backend.ping().await.unwrap_or(false);
    println!("backend reachable: {}", reachable);
    println!();
    println!("{:<12} {:<12} {:<28} {:>10}", "KIND", "ALIAS", "INDEX", "DOCS");

    for kind in EntityKind::all() {
        let physical = match backend.resolve_alias(kind.alias()).await {
            Ok(Some(name)) => name,
            Ok(None) => "MISSING".to_string(),
            Err(e) => format!("ERROR ({})", e),
        };
        let docs = match backend.doc_count(kind).await {
            Ok(n) => n.to_string(),
            Err(_) => "-".to_string(),
        };
        println!(
            "{:<12} {:<12} {:<28} {:>10}",
            kind.as_str(),
            kind.alias(),
            physical,
            docs
        );
    }

    Ok(())
}
