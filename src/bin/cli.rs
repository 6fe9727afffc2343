use std::path::PathBuf;
use flatdoc::sdk::{self, Config};
use flatdoc::{Document, Filter, Update};
use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Embedded data directory (defaults to FLATDOC_DATA_DIR or ./data).
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone)]
enum Commands {
    Find { db: String, collection: String, filter: Option<String> },
    FindOne { db: String, collection: String, filter: Option<String> },
    Insert { db: String, collection: String, document: String },
    InsertMany { db: String, collection: String, documents: String },
    /// Accepts `{"$set": {...}}` or a bare document; both merge fields.
    Update { db: String, collection: String, filter: String, update: String },
    Replace { db: String, collection: String, filter: String, document: String },
    Delete {
        db: String,
        collection: String,
        filter: String,
        #[arg(long)]
        many: bool,
    },
    Drop { db: String, collection: String },
    Count { db: String, collection: String, filter: Option<String> },
    Distinct { db: String, collection: String, field: String },
}

fn parse_filter(raw: Option<&str>) -> anyhow::Result<Filter> {
    match raw {
        Some(raw) => Ok(Filter::try_from(serde_json::from_str::<Value>(raw)?)?),
        None => Ok(Filter::all()),
    }
}

fn parse_document(raw: &str) -> anyhow::Result<Document> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(doc) => Ok(doc),
        _ => anyhow::bail!("document must be a JSON object"),
    }
}

fn print(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    let store = sdk::new(&config).await?;

    match cli.command {
        Commands::Find { db, collection, filter } => {
            let docs = store.collection(&db, &collection).find(&parse_filter(filter.as_deref())?).await?;
            print(&docs)?;
        }
        Commands::FindOne { db, collection, filter } => {
            let doc = store.collection(&db, &collection).find_one(&parse_filter(filter.as_deref())?).await?;
            print(&doc)?;
        }
        Commands::Insert { db, collection, document } => {
            let res = store.collection(&db, &collection).insert_one(parse_document(&document)?).await?;
            print(&res)?;
        }
        Commands::InsertMany { db, collection, documents } => {
            let docs: Vec<Document> = serde_json::from_str(&documents)?;
            let res = store.collection(&db, &collection).insert_many(docs).await?;
            print(&res)?;
        }
        Commands::Update { db, collection, filter, update } => {
            let update = Update::from_value(serde_json::from_str(&update)?)?;
            let res = store
                .collection(&db, &collection)
                .update_one(&parse_filter(Some(&filter))?, update)
                .await?;
            print(&res)?;
        }
        Commands::Replace { db, collection, filter, document } => {
            let update = Update::Replace(parse_document(&document)?);
            let res = store
                .collection(&db, &collection)
                .update_one(&parse_filter(Some(&filter))?, update)
                .await?;
            print(&res)?;
        }
        Commands::Delete { db, collection, filter, many } => {
            let coll = store.collection(&db, &collection);
            let filter = parse_filter(Some(&filter))?;
            let res = if many {
                coll.delete_many(&filter).await?
            } else {
                coll.delete_one(&filter).await?
            };
            print(&res)?;
        }
        Commands::Drop { db, collection } => {
            store.collection(&db, &collection).drop_collection().await?;
            println!("OK");
        }
        Commands::Count { db, collection, filter } => {
            let n = store.collection(&db, &collection).count_documents(&parse_filter(filter.as_deref())?).await?;
            println!("{}", n);
        }
        Commands::Distinct { db, collection, field } => {
            let values = store.collection(&db, &collection).distinct(&field).await?;
            print(&values)?;
        }
    }

    Ok(())
}
