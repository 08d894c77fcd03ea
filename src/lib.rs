//! # Docsift
//!
//! A document understanding pipeline for everyday paperwork.
//!
//! Docsift extracts text from uploaded files (plain text, PDF, images via a
//! vision model, Word, PowerPoint) into a uniform page model, classifies the
//! document, and layers analysis on top: translation, jargon explanations,
//! consequence and risk reports, and multi-turn Q&A with bounded history.
//! Outbound model calls rotate API keys and retry transient failures with
//! exponential backoff.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────┐
//! │  Extractors  │──▶│   Ingest     │──▶│  SQLite   │
//! │ txt/pdf/img/ │   │ classify +  │   │ documents │
//! │ docx/pptx    │   │ persist     │   │ analyses  │
//! └──────────────┘   └─────────────┘   └────┬─────┘
//!                                           │
//!                       ┌───────────────────┤
//!                       ▼                   ▼
//!                  ┌──────────┐       ┌──────────┐
//!                  │ Analysis │       │   Chat   │
//!                  │ (cached) │       │ (window) │
//!                  └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! dsift init                         # create database
//! dsift ingest lease.pdf --owner me  # extract, classify, persist
//! dsift analyze <id> --kind risks    # cached risk report
//! dsift ask <id> "What is the rent?" # multi-turn Q&A
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Page model and core data types |
//! | [`extract`] | Per-format text extraction |
//! | [`rotate`] | Round-robin API key rotation |
//! | [`retry`] | Classified retry with exponential backoff |
//! | [`inference`] | Chat/vision model providers |
//! | [`analysis`] | Classification, translation, terms, risk, benefits, legality |
//! | [`chat`] | Bounded conversation history and Q&A |
//! | [`ingest`] | Upload validation and pipeline orchestration |
//! | [`store`] | Document and analysis persistence |
//! | [`video`] | Educational video search |
//! | [`db`] | Database connection and schema |

pub mod analysis;
pub mod chat;
pub mod config;
pub mod db;
pub mod extract;
pub mod inference;
pub mod ingest;
pub mod models;
pub mod retry;
pub mod rotate;
pub mod store;
pub mod video;
