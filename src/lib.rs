//! # clisync - Configuration reconciliation for CLI-only network devices
//!
//! `clisync` keeps a structured configuration model in sync with devices that
//! only speak a text CLI. It reads by issuing `show` commands and extracting
//! fields from the output with declarative regex tables, and writes by diffing
//! the current and desired snapshots and rendering the minimal set of
//! configuration lines from per-vendor command skeletons.
//!
//! ## Features
//!
//! - **Declarative Extraction**: Pattern tables of trigger regex, extractor and target
//! - **Field-level Diff**: Every field classified as unchanged, set, cleared or changed
//! - **Command Skeletons**: Placeholders, conditionals and zipped loops rendered to CLI lines
//! - **Vendor Profiles**: Serializable profiles compiled once into a handler registry
//! - **Offline Replay**: Record transport exchanges as JSONL and replay them in tests
//! - **Async/Await**: Transport calls are async and built on Tokio
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use clisync::path::Path;
//! use clisync::reader::ReadContext;
//! use clisync::transport::ReplayTransport;
//! use clisync::writer::ContextSnapshot;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Compile a built-in vendor profile
//!     let registry = clisync::templates::by_name("ios")?;
//!
//!     // Any transport works; a recorded session is the simplest
//!     let fixture = std::fs::read_to_string("session.jsonl")?;
//!     let mut transport = ReplayTransport::from_jsonl(&fixture)?;
//!
//!     // Read the current state of one interface
//!     let path = Path::root().child("interface", "GigabitEthernet0/1");
//!     let handler = registry.resolve(&path)?;
//!     let mut ctx = ReadContext::new(&mut transport);
//!     let before = handler.read_entity(&path, &mut ctx).await?;
//!
//!     // Plan the lines that would move it to the desired state
//!     let after = before.clone().with_field("mtu", 9000);
//!     if let Some(writer) = handler.writer() {
//!         let batch = writer.plan_update(&path, &before, &after, &ContextSnapshot::new())?;
//!         for line in &batch.lines {
//!             println!("{line}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Main Components
//!
//! - [`extract::PatternTable`] - Regex-driven field extraction
//! - [`diff::diff`] - Snapshot pair classification
//! - [`skeleton::Skeleton`] - Command templater
//! - [`handler::HandlerRegistry`] - Entity type dispatch
//! - [`transport::Transport`] - The device session seam
//! - [`error::ReconcileError`] - Error types for every stage

pub mod config;
pub mod diff;
pub mod error;
pub mod extract;
pub mod handler;
pub mod model;
pub mod path;
pub mod reader;
pub mod skeleton;
pub mod templates;
pub mod transport;
pub mod writer;
