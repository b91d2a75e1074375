use hermitcrab::{config, DirectoryStore, ProjectRegistry, SurfFetcher};
use rusty_curator_core::backend::{ArchiveStore, RegistryBackend, RemoteFetcher};
use rusty_curator_core::manifest::CatalogDocument;
use std::error::Error;

#[async_std::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let settings = config::load_settings()?;
    println!("Project: {:?}", settings.project_dir);

    println!("--- Registry packages ---");
    let registry = ProjectRegistry::new(&settings.project_dir);
    for package in registry.list_installed().await? {
        let note = if package.has_update() { " (update available)" } else { "" };
        println!(
            "{} {} at {}{}",
            package.identifier, package.installed_version, package.backend_path, note
        );
    }

    println!("--- Catalog ---");
    let fetcher = SurfFetcher::new();
    let body = fetcher.fetch_text(&settings.catalog_url).await?;
    let document: CatalogDocument = serde_json::from_str(&body)?;
    println!("{} curated, {} other", document.curated.len(), document.other.len());

    let store = DirectoryStore::new(&settings.project_dir)?;
    for raw in document.curated.iter().chain(document.other.iter()) {
        if !raw.reference_id.is_empty() && store.exists(&raw.reference_id) {
            println!("Imported: {} ({:?})", raw.display_name, store.locate(&raw.reference_id));
        }
    }

    Ok(())
}
