//! Semantic job matching: embed job postings and free text into one vector space,
//! store the job vectors, and rank jobs by cosine similarity to a query or résumé.

pub mod embedder;
pub mod errors;
pub mod extractors;
pub mod handlers;
pub mod indexing;
pub mod prompts;
pub mod query_enhancer;
pub mod queue;
pub mod ranking;
pub mod repository;
pub mod search;
pub mod similarity;
pub mod store;

#[cfg(test)]
pub mod test_support;
