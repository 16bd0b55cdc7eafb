//! Run reports written after each batch.
//!
//! ```text
//! report_dir/
//! └── 2025-05-06/
//!     ├── 08-00-12.json
//!     └── 17-42-03.json
//! ```

pub mod json;
