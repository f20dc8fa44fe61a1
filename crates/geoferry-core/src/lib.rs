pub mod enrich;
pub mod error;
pub mod fetch;
pub mod import;
pub mod jobs;
pub mod poll;
