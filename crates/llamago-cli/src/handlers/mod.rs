//! Command handlers. Each takes the finished [`llamago_core::Config`].

pub mod embedding;
pub mod run;
