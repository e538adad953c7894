//! Pipeline stages for web-page-to-PDF conversion.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render (× concurrency) ──▶ aggregate ──▶ merge
//! (CSV)      (renderer process)        (by index)    (lopdf)
//! ```
//!
//! 1. [`input`]: read the URL list, dropping rows that are not URLs
//! 2. [`render`]: one renderer process per URL, with deadline and cancel
//! 3. [`aggregate`]: order the settled results and place the artifacts
//! 4. [`merge`]: concatenate the rendered PDFs; runs in `spawn_blocking`

pub mod aggregate;
pub mod input;
pub mod merge;
pub mod render;
