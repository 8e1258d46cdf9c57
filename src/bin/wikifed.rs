//! wikifed command-line front end.
//!
//! Stores are files: the source is a Wikibase JSON dump, the target a
//! snapshot written by a previous run. The target is created when missing
//! and saved after every command that writes to it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use wikifed::labels::IdLabelTable;
use wikifed::storage::wbjson;
use wikifed::{
    editing, render, ClaimId, EntityId, EntityImporter, ImportConfig, InMemoryStore,
    KnowledgeStore, Merged,
};

const DEFAULT_THROTTLE_MS: u64 = 1000;

/// Import Wikibase entities between knowledge stores.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import entities, their claims and referenced entities.
    Import(ImportArgs),
    /// Print an entity with labels instead of ids.
    Show(ShowArgs),
    /// Search labels and aliases.
    Search(SearchArgs),
    /// Remove every claim of a property.
    RemoveClaims(EntityPropertyArgs),
    /// Remove qualifiers of a property from every claim of another.
    RemoveQualifier(NestedArgs),
    /// Remove source values of a property from every claim of another.
    RemoveReference(NestedArgs),
    /// Add a "retrieved" date reference to a claim.
    AddReferenceDate(ReferenceDateArgs),
    /// Set a label; an empty value removes it.
    SetLabel(TermArgs),
    /// Set a description; an empty value removes it.
    SetDescription(TermArgs),
    /// Replace the aliases of one language.
    SetAliases(AliasArgs),
    /// Link an entity to a page on a site.
    SetSitelink(SitelinkArgs),
    /// Remove the link to a site.
    RemoveSitelink(SiteArgs),
}

#[derive(Args, Debug)]
struct ImportArgs {
    /// Wikibase JSON dump to import from.
    #[arg(long)]
    source: PathBuf,

    /// Identifier of the source store.
    #[arg(long, default_value = "wikidata")]
    source_id: String,

    /// Target snapshot; created when missing.
    #[arg(long)]
    target: PathBuf,

    /// TOML import configuration.
    #[arg(long, env = "WIKIFED_CONFIG")]
    config: Option<PathBuf>,

    /// Minimum milliseconds between writes [default: 1000, or the config file value].
    #[arg(long)]
    throttle_ms: Option<u64>,

    /// Also import claims of referenced entities up to this many hops.
    #[arg(long)]
    depth: Option<usize>,

    /// Print the reports as JSON.
    #[arg(long)]
    json: bool,

    /// Source ids to import.
    #[arg(required = true)]
    ids: Vec<String>,
}

#[derive(Args, Debug)]
struct StoreArgs {
    /// Snapshot or Wikibase JSON dump.
    #[arg(long)]
    store: PathBuf,

    #[arg(long, default_value = "en")]
    language: String,
}

#[derive(Args, Debug)]
struct ShowArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Dump providing property labels, when the store lacks properties.
    #[arg(long)]
    properties: Option<PathBuf>,

    #[arg(long)]
    json: bool,

    id: String,
}

#[derive(Args, Debug)]
struct SearchArgs {
    #[command(flatten)]
    store: StoreArgs,

    query: String,
}

#[derive(Args, Debug)]
struct EntityPropertyArgs {
    /// Snapshot to edit.
    #[arg(long)]
    store: PathBuf,

    entity: String,
    property: String,
}

#[derive(Args, Debug)]
struct NestedArgs {
    #[command(flatten)]
    claims: EntityPropertyArgs,

    /// Qualifier or source property to remove.
    nested: String,
}

#[derive(Args, Debug)]
struct ReferenceDateArgs {
    /// Snapshot to edit.
    #[arg(long)]
    store: PathBuf,

    claim: String,

    /// Retrieval date (YYYY-MM-DD); today when omitted.
    #[arg(long)]
    date: Option<NaiveDate>,
}

#[derive(Args, Debug)]
struct TermArgs {
    /// Snapshot to edit.
    #[arg(long)]
    store: PathBuf,

    entity: String,
    language: String,
    value: String,
}

#[derive(Args, Debug)]
struct AliasArgs {
    /// Snapshot to edit.
    #[arg(long)]
    store: PathBuf,

    entity: String,
    language: String,

    /// New aliases; none clears the language.
    aliases: Vec<String>,
}

#[derive(Args, Debug)]
struct SiteArgs {
    /// Snapshot to edit.
    #[arg(long)]
    store: PathBuf,

    entity: String,

    /// Site id, such as enwiki.
    site: String,
}

#[derive(Args, Debug)]
struct SitelinkArgs {
    #[command(flatten)]
    site: SiteArgs,

    title: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Import(args) => import(args),
        Command::Show(args) => show(&args),
        Command::Search(args) => search(&args),
        Command::RemoveClaims(args) => {
            let store = InMemoryStore::load(&args.store)?;
            let entity = parse_id(&args.entity)?;
            let n = editing::remove_claims(&store, &entity, &parse_id(&args.property)?)?;
            println!("removed {n} claims");
            save(&store, &args.store)
        }
        Command::RemoveQualifier(args) => {
            let store = InMemoryStore::load(&args.claims.store)?;
            let n = editing::remove_qualifier(
                &store,
                &parse_id(&args.claims.entity)?,
                &parse_id(&args.claims.property)?,
                &parse_id(&args.nested)?,
            )?;
            println!("removed {n} qualifiers");
            save(&store, &args.claims.store)
        }
        Command::RemoveReference(args) => {
            let store = InMemoryStore::load(&args.claims.store)?;
            let n = editing::remove_reference(
                &store,
                &parse_id(&args.claims.entity)?,
                &parse_id(&args.claims.property)?,
                &parse_id(&args.nested)?,
            )?;
            println!("removed {n} source values");
            save(&store, &args.claims.store)
        }
        Command::AddReferenceDate(args) => {
            let store = InMemoryStore::load(&args.store)?;
            let claim = ClaimId::parse(&args.claim)?;
            let merged = editing::add_reference_date(&store, &claim, args.date)?;
            report(&merged, "reference added", "already referenced");
            save(&store, &args.store)
        }
        Command::SetLabel(args) => {
            let store = InMemoryStore::load(&args.store)?;
            let entity = parse_id(&args.entity)?;
            let merged = editing::set_label(&store, &entity, &args.language, &args.value)?;
            report(&merged, "label set", "label unchanged");
            save(&store, &args.store)
        }
        Command::SetDescription(args) => {
            let store = InMemoryStore::load(&args.store)?;
            let entity = parse_id(&args.entity)?;
            let merged = editing::set_description(&store, &entity, &args.language, &args.value)?;
            report(&merged, "description set", "description unchanged");
            save(&store, &args.store)
        }
        Command::SetAliases(args) => {
            let store = InMemoryStore::load(&args.store)?;
            editing::set_aliases(&store, &parse_id(&args.entity)?, &args.language, &args.aliases)?;
            println!("aliases set");
            save(&store, &args.store)
        }
        Command::SetSitelink(args) => {
            let store = InMemoryStore::load(&args.site.store)?;
            let entity = parse_id(&args.site.entity)?;
            let merged = editing::set_sitelink(&store, &entity, &args.site.site, &args.title)?;
            report(&merged, "sitelink set", "sitelink unchanged");
            save(&store, &args.site.store)
        }
        Command::RemoveSitelink(args) => {
            let store = InMemoryStore::load(&args.store)?;
            if !editing::remove_sitelink(&store, &parse_id(&args.entity)?, &args.site)? {
                println!("no {} sitelink", args.site);
                return Ok(());
            }
            println!("sitelink removed");
            save(&store, &args.store)
        }
    }
}

fn report<T>(merged: &Merged<T>, added: &str, existing: &str) {
    println!("{}", if merged.is_added() { added } else { existing });
}

fn parse_id(s: &str) -> Result<EntityId> {
    Ok(EntityId::parse(s)?)
}

/// Opens a snapshot, falling back to reading a Wikibase dump.
fn open_store(path: &Path, store_id: &str) -> Result<InMemoryStore> {
    match InMemoryStore::load(path) {
        Ok(store) => Ok(store),
        Err(_) => {
            let entities = wbjson::read_entities(path)
                .with_context(|| format!("reading {}", path.display()))?;
            Ok(InMemoryStore::from_entities(store_id, entities)?)
        }
    }
}

fn save(store: &InMemoryStore, path: &Path) -> Result<()> {
    store.save(path).with_context(|| format!("saving {}", path.display()))
}

fn import(args: ImportArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => ImportConfig::from_file(path)?,
        None => ImportConfig::default().with_write_throttle_ms(DEFAULT_THROTTLE_MS),
    };
    if let Some(ms) = args.throttle_ms {
        config = config.with_write_throttle_ms(ms);
    }
    if let Some(depth) = args.depth {
        config = config.with_transitive_depth(depth);
    }

    let entities = wbjson::read_entities(&args.source)
        .with_context(|| format!("reading {}", args.source.display()))?;
    let source = Arc::new(InMemoryStore::from_entities(args.source_id.as_str(), entities)?);
    let target = Arc::new(if args.target.exists() {
        InMemoryStore::load(&args.target)?
    } else {
        info!(path = %args.target.display(), "creating new target store");
        InMemoryStore::new("local")
    });
    let importer = EntityImporter::new(source, target.clone(), config);

    let mut failures = 0;
    for raw in &args.ids {
        let remote = parse_id(raw)?;
        match importer.import_entity(&remote) {
            Ok(outcome) => {
                if args.json {
                    println!("{}", serde_json::to_string_pretty(&outcome)?);
                } else {
                    let r = &outcome.report;
                    println!(
                        "{remote} -> {} {}: {} created, {} claims added, {} qualifiers added, \
                         {} reference groups added, {} skipped",
                        outcome.id,
                        outcome.label,
                        r.entities_created.len(),
                        r.claims_added,
                        r.qualifiers_added,
                        r.source_groups_added,
                        r.skipped.len(),
                    );
                }
            }
            Err(err) => {
                warn!(remote = %remote, error = %err, "import failed");
                failures += 1;
            }
        }
    }

    save(&target, &args.target)?;
    if failures > 0 {
        bail!("{failures} of {} imports failed", args.ids.len());
    }
    Ok(())
}

fn show(args: &ShowArgs) -> Result<()> {
    let store = open_store(&args.store.store, "local")?;
    let id = parse_id(&args.id)?;
    let Some(entity) = store.fetch_entity(&id)? else {
        bail!("{id} not found");
    };

    let properties = match &args.properties {
        Some(path) => Some(open_store(path, "properties")?),
        None => None,
    };
    let property_store: &dyn KnowledgeStore = properties.as_ref().map_or(&store, |p| p);
    let table = IdLabelTable::build(&entity, &store, property_store, &args.store.language)?;

    let view = render(&entity, &table);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print!("{}", view.to_text());
    }
    Ok(())
}

fn search(args: &SearchArgs) -> Result<()> {
    let store = open_store(&args.store.store, "local")?;
    for hit in store.search_entities(&args.query, &args.store.language)? {
        let name = hit.label.clone().unwrap_or_else(|| hit.aliases.join(", "));
        match hit.description {
            Some(description) => println!("{}\t{name}\t{description}", hit.id),
            None => println!("{}\t{name}", hit.id),
        }
    }
    Ok(())
}
