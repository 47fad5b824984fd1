// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    rustdoc::missing_crate_level_docs,
    rustdoc::broken_intra_doc_links,
    rust_2018_idioms
)]
#![deny(unsafe_code)]

//! # Pipeline
//!
//! ```text
//! syn::File ──▶ Driver::add_source          (one call per round)
//!                 │  populate carriers        snippet::*
//!                 │  characterize             validate, resolve, render
//!                 │  synthesize               synth (operator derivation)
//!                 ▼
//!               Driver::finish
//!                 │  build both graphs        schedule (tags → edges)
//!                 │  topological drain        graph (arena vertices)
//!                 │  lexability check         emit
//!                 ▼
//!               Output { descriptor, … }
//! ```
//!
//! The submodules are public for anyone building tooling on top of the
//! model — the supported entry points are [`Driver`], [`Options`], and
//! [`Output`].

pub mod attrs;
pub mod dbtype;
pub mod driver;
pub mod emit;
pub mod graph;
pub mod ident;
pub mod report;
pub mod schedule;
pub mod snippet;
pub mod synth;
pub mod tag;
pub mod typemap;
pub mod utils;

pub use driver::{Driver, Options, Output};
