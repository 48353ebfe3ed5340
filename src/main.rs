//! Command line access to review indices

use std::{error::Error, path::PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use serde::Serialize;

use review_index::{
    builder::{BuilderOptions, Indexer},
    corpus::ReviewFile,
    reader::IndexReader,
    search::{language_model_search, product_search, vector_space_search},
    wildcard::WildcardKind,
};

#[derive(Parser)]
#[command(name = "review-index", about = "Builds and queries review indices", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct IndexArgs {
    /// Index directory
    #[arg(short, long)]
    index: PathBuf,

    /// Wildcard structure the index was built with
    #[arg(short, long, default_value = "bigram")]
    wildcard: WildcardKind,

    /// Read posting files in memory instead of mapping them
    #[arg(long)]
    in_memory: bool,
}

impl IndexArgs {
    fn open(&self) -> Result<IndexReader, Box<dyn Error>> {
        Ok(IndexReader::open(&self.index, self.wildcard, self.in_memory)?)
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Method {
    /// Vector space model (lnn.ltc)
    Vector,
    /// Mixture of review and collection language models
    LanguageModel,
    /// Products ranked by their matching reviews
    Product,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an index from a SNAP formatted review file
    Build {
        /// Review file
        #[arg(long)]
        input: PathBuf,

        /// Output directory
        #[arg(long)]
        output: PathBuf,

        #[arg(long, default_value = "bigram")]
        wildcard: WildcardKind,

        /// Number of terms per dictionary block
        #[arg(long, default_value = "10")]
        block_size: usize,

        /// Memory (in bytes) used when sorting
        #[arg(long, default_value = "5000000")]
        memory_budget: usize,

        /// Size (in bytes) of I/O blocks
        #[arg(long, default_value = "4000")]
        io_block_size: usize,

        #[arg(long)]
        progress: bool,
    },

    /// Remove an index directory
    Remove {
        /// Index directory
        #[arg(long)]
        index: PathBuf,
    },

    /// Number of reviews and occurrences of a token
    Frequency {
        #[command(flatten)]
        index: IndexArgs,
        token: String,
    },

    /// Reviews containing a token, with counts
    Postings {
        #[command(flatten)]
        index: IndexArgs,
        token: String,
    },

    /// Reviews of a product
    Product {
        #[command(flatten)]
        index: IndexArgs,
        product_id: String,
    },

    /// Metadata of a review
    Review {
        #[command(flatten)]
        index: IndexArgs,
        review_id: u32,
    },

    /// Tokens matching a wildcard pattern
    Terms {
        #[command(flatten)]
        index: IndexArgs,
        pattern: String,
    },

    /// Ranks reviews (or products) for a query
    Search {
        #[command(flatten)]
        index: IndexArgs,

        #[arg(short, long, value_enum, default_value = "vector")]
        method: Method,

        /// Weight of the review model (language model only)
        #[arg(long, default_value = "0.5")]
        lambda: f64,

        /// Number of results
        #[arg(short, long, default_value = "10")]
        k: usize,

        #[arg(required = true)]
        query: Vec<String>,
    },
}

#[derive(Serialize)]
struct Frequencies {
    token: String,
    document_frequency: u64,
    collection_frequency: u64,
}

fn print<T: Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            output,
            wildcard,
            block_size,
            memory_budget,
            io_block_size,
            progress,
        } => {
            let options = BuilderOptions {
                dictionary_block_size: block_size,
                memory_budget,
                io_block_size,
                wildcard,
                progress,
            };
            info!("Indexing {} into {}", input.display(), output.display());
            let information = Indexer::new(&output, &options).build(&ReviewFile::new(&input))?;
            print(&information)
        }
        Commands::Remove { index } => {
            Indexer::new(&index, &BuilderOptions::default()).remove()?;
            Ok(())
        }
        Commands::Frequency { index, token } => {
            let reader = index.open()?;
            print(&Frequencies {
                document_frequency: reader.term_frequency(&token),
                collection_frequency: reader.term_collection_frequency(&token),
                token,
            })
        }
        Commands::Postings { index, token } => print(&index.open()?.postings(&token)),
        Commands::Product { index, product_id } => {
            print(&index.open()?.product_reviews(&product_id))
        }
        Commands::Review { index, review_id } => print(&index.open()?.review_metadata(review_id)),
        Commands::Terms { index, pattern } => print(&index.open()?.matching_terms(&pattern)),
        Commands::Search {
            index,
            method,
            lambda,
            k,
            query,
        } => {
            let reader = index.open()?;
            let query: Vec<&str> = query.iter().map(|s| s.as_str()).collect();
            match method {
                Method::Vector => print(&vector_space_search(&reader, &query, k)),
                Method::LanguageModel => {
                    print(&language_model_search(&reader, &query, lambda, k))
                }
                Method::Product => print(&product_search(&reader, &query, k)),
            }
        }
    }
}
