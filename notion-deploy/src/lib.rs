//! notion-deploy - YAML to Notion deployment engine
//!
//! Turns a directory of YAML files describing pages, databases, letters and
//! acceptance checklists into a Notion workspace, idempotently:
//! - Files are merged in name order, then `${VAR}` placeholders substituted
//! - Pages are created parents-first with cycle detection
//! - Databases are created in two passes so relations and rollups can point
//!   at databases created later in the same run
//! - Everything created is recorded in a checkpoint file; re-runs skip it
//!
//! # Architecture
//!
//! ```text
//! YAML dir ─► loader ─► vars ─► model::Document
//!                                    │
//!                                    ▼
//!                               engine::Deployer
//!        ┌──────────────┬───────────┼────────────┬──────────────┐
//!        ▼              ▼           ▼            ▼              ▼
//!    pages (blocks)  databases   patches     rows (rows)     links
//!        └──────────────┴──── NotionApi (client / dry run / mock) ┘
//! ```

pub mod blocks;
pub mod config;
pub mod engine;
pub mod error;
pub mod loader;
pub mod model;
pub mod properties;
pub mod report;
pub mod resolver;
pub mod rows;
pub mod state;
pub mod text;
pub mod validate;
pub mod vars;

// Re-export main types for convenience
pub use blocks::{build_block, build_blocks, Block, BlockBuilder};
pub use config::DeployConfig;
pub use engine::{Deployer, ACCEPTANCE_PAGE_TITLE};
pub use error::{DeployError, Result};
pub use loader::{load_directory, load_document, LoadOutcome, Loaded};
pub use model::{AcceptanceRow, DatabaseDef, Document, LetterDef, PageDef};
pub use properties::{build_property_schema, PropertySpec};
pub use report::DeployReport;
pub use resolver::{plan_page_order, DeployOptions};
pub use state::{load_state, DeploymentState};
pub use vars::{process_variable_substitution, UnresolvedPolicy, Variables};
