//! calibra-core: Psychometric analysis of assessment response data.
//!
//! The analyzers ([`ctt`], [`reliability`], [`irt`], [`dif`], [`equating`],
//! [`certification`]) are pure functions over a validated
//! [`model::ResponseMatrix`]. Around them sit dataset parsing, configuration,
//! the batch [`engine`] and the persisted [`report`].

pub mod certification;
pub mod config;
pub mod ctt;
pub mod dif;
pub mod engine;
pub mod equating;
pub mod error;
pub mod irt;
pub mod model;
pub mod parser;
pub mod reliability;
pub mod report;
pub mod statistics;
