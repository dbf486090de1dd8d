pub mod agent;
pub mod config;
pub mod evaluators;
pub mod evidence;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod report;
pub mod scheduler;
pub mod types;
pub mod verdict;

#[cfg(test)]
pub(crate) mod tests;
