//! Credit Risk Scoring API Library
//!
//! This library provides the core functionality for the credit risk
//! scoring service: data integration of loan applications with credit
//! bureau history, model training and evaluation, and the HTTP scoring
//! endpoint that turns default probabilities into loan decisions.
//!
//! # Modules
//!
//! - `bureau`: Credit bureau history aggregation.
//! - `classifier`: Class-weighted logistic regression.
//! - `config`: Configuration management.
//! - `errors`: Error handling types.
//! - `evaluate`: Offline evaluation of trained models.
//! - `features`: Feature engineering shared by training and serving.
//! - `handlers`: HTTP request handlers.
//! - `integrate`: Master table construction.
//! - `models`: API request and response models.
//! - `pipeline`: Training pipeline and artifact persistence.
//! - `scoring`: Decision thresholds and the scoring service.
//! - `table`: Columnar table with Parquet persistence.

// Re-export primary modules for shared use in tests and other binaries
pub mod bureau;
pub mod classifier;
pub mod config;
pub mod errors;
pub mod evaluate;
pub mod features;
pub mod handlers;
pub mod integrate;
pub mod models;
pub mod pipeline;
pub mod scoring;
pub mod table;
