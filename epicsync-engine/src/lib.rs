//! Epic-to-sub-issue status propagation over a remote project board.
//!
//! The [`BoardClient`] trait is the only seam to the remote side. Everything
//! else here (epic resolution, the rule-driven propagation and the board scan)
//! runs against any implementation of it, including [`InMemoryBoard`].

pub mod board;
pub mod error;
pub mod memory;
pub mod pagination;
pub mod propagate;
pub mod resolver;
pub mod retry;
pub mod run;
pub mod scan;

pub use board::BoardClient;
pub use error::{SyncError, SyncResult};
pub use memory::{CallCounts, InMemoryBoard};
pub use pagination::{Page, PageWalker};
pub use propagate::{ChildOutcome, ChildReport, PropagationOptions, PropagationReport, Propagator};
pub use resolver::{resolve_epic, Resolution, ResolutionKind};
pub use retry::RetryPolicy;
pub use run::{sync_issue, RunReport};
pub use scan::{sync_board, EpicReport, ScanReport};
