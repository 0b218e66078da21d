use std::env;
use std::path::PathBuf;

use kgq_core::adapters::read_entities;
use kgq_core::config::QueryConfig;
use kgq_core::table::num_rows;
use kgq_query::lancedb_uri;
use kgq_vector::artifacts::{load_artifacts, ARTIFACT_TABLES};
use kgq_vector::table::{open_db, read_table};
use kgq_vector::{bind_embedding_store, StoreSettings};

const USAGE: &str = "Usage: kgq <tables|embed|lookup> [args...]
  kgq tables [root]
  kgq embed [root] [--level N]
  kgq lookup <entity_id> [root]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("kgq=info".parse()?))
        .init();

    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() { eprintln!("{USAGE}"); std::process::exit(1); }
    let cmd = args.remove(0);
    match cmd.as_str() {
        "tables" => {
            let root = root_arg(args.first());
            let config = QueryConfig::load(&root)?;
            let db_uri = lancedb_uri(Some(&root), &config)?;
            let conn = open_db(&db_uri.to_string_lossy()).await?;
            println!("Artifacts in {}", db_uri.display());
            for name in ARTIFACT_TABLES {
                match read_table(&conn, name).await? {
                    Some(table) => println!("  {:<34} {:>8} rows", name, num_rows(&table)),
                    None => println!("  {:<34} {:>8}", name, "missing"),
                }
            }
        }
        "embed" => {
            let mut root = None;
            let mut level = 2u32;
            let mut i = 0; while i < args.len() { match args[i].as_str() {
                "--level" => { match args.get(i + 1).and_then(|l| l.parse::<u32>().ok()) { Some(l) => { level = l; i += 1; } None => { eprintln!("Error: --level requires a number"); std::process::exit(1); } } }
                other if !other.starts_with('-') => root = Some(PathBuf::from(other)),
                other => { eprintln!("Unknown flag: {other}"); std::process::exit(1); }
            } i += 1; }
            let root = root.unwrap_or_else(|| PathBuf::from("."));
            let config = QueryConfig::load(&root)?;
            let db_uri = lancedb_uri(Some(&root), &config)?;
            let artifacts = load_artifacts(&db_uri.to_string_lossy()).await?;
            let entities = read_entities(&artifacts.nodes, &artifacts.entities, level)?;
            let mut settings = StoreSettings::from_config(&config.vector_store())?.with_db_uri(db_uri.to_string_lossy());
            settings.overwrite = true;
            let store = bind_embedding_store(&entities, &settings).await?;
            println!("✅ Indexed entity descriptions into '{}' ({} entities at level <= {})", store.collection_name(), entities.len(), level);
        }
        "lookup" => {
            let Some(id) = args.first() else { eprintln!("{USAGE}"); std::process::exit(1) };
            let root = root_arg(args.get(1));
            let config = QueryConfig::load(&root)?;
            let db_uri = lancedb_uri(Some(&root), &config)?;
            let mut settings = StoreSettings::from_config(&config.vector_store())?.with_db_uri(db_uri.to_string_lossy());
            settings.overwrite = false;
            let store = bind_embedding_store(&[], &settings).await?;
            match store.search_by_id(id).await? {
                Some(doc) => {
                    println!("id={}  dim={}  attributes={}", doc.id, doc.vector.len(), format_attributes(&doc.attributes));
                    println!("     📝 {}", doc.text.unwrap_or_default());
                }
                None => println!("No document with id '{id}' in '{}'", store.collection_name()),
            }
        }
        _ => { eprintln!("Unknown command: {cmd}\n{USAGE}"); std::process::exit(1); }
    }
    Ok(())
}

fn root_arg(arg: Option<&String>) -> PathBuf {
    arg.map_or_else(|| PathBuf::from("."), PathBuf::from)
}

fn format_attributes(attributes: &kgq_core::types::Attributes) -> String {
    attributes.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(",")
}
