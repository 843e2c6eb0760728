//! CLI argument definitions for the Racer demo binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Racer: drive a path-addressed, in-memory data model from the command
/// line against a local, file-persisted `DocStore` stand-in.
#[derive(Parser, Debug)]
#[command(name = "racer")]
#[command(about = "Racer: a synchronized, path-addressed in-memory data model")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format instead of human-readable text
    #[arg(long, global = true)]
    pub json: bool,

    /// Where the local model's bundle is persisted between invocations
    #[arg(short = 'D', long, env = "RACER_DATA_FILE", default_value = "racer.bundle.json")]
    pub data_file: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read the value at a path
    Get(PathArgs),
    /// Write a value at a path, unconditionally
    Set(SetArgs),
    /// Write a value at a path, skipping the write if it already matches
    SetDiff(SetArgs),
    /// Write a value at a path, skipping the write if it already deeply matches
    SetDiffDeep(SetArgs),
    /// Write a value at a path only if the current value is null/absent
    SetNull(SetArgs),
    /// Delete the value at a path
    Del(PathArgs),
    /// Add `by` to the number at a path (default 1, absent treated as 0)
    Increment(IncrementArgs),
    /// Append a value to the array at a path
    Push(SetArgs),
    /// Insert a value into the array at a path at a given index
    Insert(InsertArgs),
    /// Remove `count` elements from the array at a path, starting at `index`
    Remove(RemoveArgs),
    /// Create a new document in a collection, generating an id if absent
    Add(AddArgs),
    /// Print the whole resident tree
    Dump,
}

/// A bare path argument, dotted-string form (`users.1.name`).
#[derive(clap::Args, Debug)]
pub struct PathArgs {
    /// Dotted path, e.g. `users.1.name`
    pub path: String,
}

/// A path plus a JSON-encoded value.
#[derive(clap::Args, Debug)]
pub struct SetArgs {
    /// Dotted path, e.g. `users.1.name`
    pub path: String,
    /// JSON-encoded value, e.g. `"ada"` or `{"x":1}`
    pub value: String,
}

#[derive(clap::Args, Debug)]
pub struct IncrementArgs {
    pub path: String,
    /// Amount to add
    #[arg(default_value_t = 1.0)]
    pub by: f64,
}

#[derive(clap::Args, Debug)]
pub struct InsertArgs {
    pub path: String,
    pub index: usize,
    pub value: String,
}

#[derive(clap::Args, Debug)]
pub struct RemoveArgs {
    pub path: String,
    pub index: usize,
    #[arg(default_value_t = 1)]
    pub count: usize,
}

#[derive(clap::Args, Debug)]
pub struct AddArgs {
    /// Collection name, e.g. `users`
    pub collection: String,
    /// JSON-encoded document, e.g. `{"name":"ada"}`
    pub doc: String,
}
