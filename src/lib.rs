//! # Sahayak
//!
//! A notes assistant that answers questions from a student's own lecture
//! material.
//!
//! Notes live on disk as `<root>/<subject>/<file>` (PDF or PPTX). Ingestion
//! turns every new file into overlapping text chunks, embeds them, and stores
//! them in one vector collection per subject. Questions are answered by
//! retrieving the closest chunks and asking a language model to answer from
//! that context alone.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────┐   ┌────────────────┐
//! │ Notes tree  │──▶│ Ingest pipeline  │──▶│ Vector store   │
//! │ subj/file   │   │ load→chunk→embed │   │ per subject    │
//! └─────────────┘   └────────┬─────────┘   └───────┬────────┘
//!                            ▼                     │
//!                     ┌─────────────┐              ▼
//!                     │ Metadata DB │        ┌───────────┐
//!                     │ status      │        │ Responder │
//!                     └─────────────┘        └─────┬─────┘
//!                                       ┌──────────┴──────────┐
//!                                       ▼                     ▼
//!                                  ┌─────────┐          ┌──────────┐
//!                                  │   CLI   │          │   HTTP   │
//!                                  └─────────┘          └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! sahayak init                                  # create databases
//! sahayak ingest                                # ingest new notes
//! sahayak ask Physics "What is Newton's second law?"
//! sahayak serve                                 # start HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`content_id`] | Path-derived document ids |
//! | [`extract`] | PDF and PPTX text extraction |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`llm`] | Language model clients |
//! | [`vector_store`] | Per-subject vector collections |
//! | [`metadata`] | Subject and document status records |
//! | [`ingest`] | Ingestion pipeline |
//! | [`rag`] | Retrieval-augmented answering |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod config;
pub mod content_id;
pub mod db;
pub mod embedding;
pub mod extract;
mod http;
pub mod ingest;
pub mod llm;
pub mod metadata;
pub mod migrate;
pub mod models;
pub mod rag;
pub mod server;
pub mod vector_store;
