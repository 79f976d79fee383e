// SPDX-License-Identifier: MPL-2.0

//! Processing pipelines
//!
//! Fusion work runs on blocking worker threads so frame delivery and the
//! request surface never wait on decode, alignment or encoding.
//!
//! # Pipeline Architecture
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │  Raw Frames  │ ──▶ │  Burst Pipeline   │ ──▶ │  JPEG File   │
//! │  (N blobs)   │     │  - Decode         │     │ (+ raw file) │
//! │              │     │  - Align / Merge  │     │              │
//! │              │     │  - Tone / Encode  │     │              │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`photo`]: Burst collection, fusion and JPEG encoding

pub mod photo;
