//! # Tabula Architecture
//!
//! Tabula is a **schema-driven record table engine**. A record type is
//! declared once, as a [`schema::Schema`], and the same engine lists,
//! filters, creates, edits and deletes records of any declared type. The
//! data lives in a remote store reached through a single action dispatcher;
//! the engine only ever sees whole-collection snapshots.
//!
//! The engine is UI-agnostic. The bundled CLI is one client of it.
//!
//! ## Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  CLI Layer (cli/, wired by main.rs)                         │
//! │  - Parses arguments, renders tables, handles terminal I/O   │
//! │  - The ONLY place that knows about stdout/stderr/exit codes │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Record Store (store.rs)                                    │
//! │  - Loading state, filters, dropdown cache, open form        │
//! │  - Replaces its collection with every snapshot it receives  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!              ┌───────────────┼────────────────┐
//!              ▼               ▼                ▼
//! ┌──────────────────┐ ┌──────────────┐ ┌──────────────────┐
//! │ compute.rs       │ │ filter.rs    │ │ edit.rs          │
//! │ derived fields   │ │ client-side  │ │ form values,     │
//! │ on every record  │ │ narrowing    │ │ date coercion    │
//! └──────────────────┘ └──────────────┘ └──────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Dispatch Layer (dispatch/)                                 │
//! │  - Abstract Dispatcher trait + ActionClient adapter         │
//! │  - FileDispatcher (CLI), MemDispatcher (testing)            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Principle: Schemas Are Data
//!
//! Nothing below the CLI knows about tasks or budgets. Field kinds, rules,
//! filters and compute functions are all declared in the schema; the two
//! record types that ship with tabula live in [`schema::builtin`] and go
//! through exactly the same code paths as a user-defined schema would.
//!
//! ## Key Principle: No I/O Assumptions in Core
//!
//! Apart from the dispatchers themselves, the core:
//! - Takes and returns regular Rust types
//! - **Never** writes to stdout/stderr (diagnostics go through `tracing`)
//! - **Never** calls `std::process::exit`
//!
//! ## Testing Strategy
//!
//! 1. **Pure modules** (`compute`, `filter`, `edit`, `schema`): unit tests next
//!    to the code.
//! 2. **Record store**: async tests against [`dispatch::memory::MemDispatcher`],
//!    which can fail, delay and record requests.
//! 3. **CLI**: integration tests in `tests/` run the binary against a
//!    temporary data directory.
//!
//! ## Module Overview
//!
//! - **[`schema`]**: Field kinds, rules, filters, validation and the built-ins
//! - **[`model`]**: The [`model::Record`] type and value/date coercions
//! - **[`compute`]**: Computed-field evaluation
//! - **[`filter`]**: Filter state and matching
//! - **[`edit`]**: Edit preparation and form values
//! - **[`dispatch`]**: The dispatcher trait, client and implementations
//! - **[`store`]**: The record store state machine
//! - **[`config`]**: Persistent user settings
//! - **[`error`]**: Error types

pub mod compute;
pub mod config;
pub mod dispatch;
pub mod edit;
pub mod error;
pub mod filter;
pub mod model;
pub mod schema;
pub mod store;
