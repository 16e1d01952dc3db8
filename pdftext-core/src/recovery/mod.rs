//! PDF error recovery
//!
//! Rebuilds the cross-reference map for files whose xref sections are
//! missing, truncated or byte-shifted. The reader falls back to this module
//! automatically; it can also be used directly to inspect what a scan finds.
//!
//! # Example
//!
//! ```rust
//! use pdftext::recovery::XRefRecovery;
//!
//! let data = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n";
//! let (table, stats) = XRefRecovery::recover(data);
//! assert_eq!(stats.objects_found, 1);
//! assert!(table.trailer().contains_key("Root"));
//! ```

pub mod xref_recovery;

pub use xref_recovery::{RecoveryStats, XRefRecovery};
