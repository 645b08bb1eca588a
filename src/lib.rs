pub mod agent;
pub mod batch;
pub mod config;
pub mod domain;
pub mod error;
pub mod filter;
pub mod fs_util;
pub mod logging;
pub mod lookup;
pub mod model_species;
pub mod ncbi;
pub mod output;
pub mod pipeline;
pub mod pubmed;
pub mod pubtator;
pub mod recovery;
pub mod runner;
pub mod store;
pub mod worker;
pub mod xml;
