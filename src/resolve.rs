pub mod builder;
pub mod error;
pub mod graph;
pub mod mediator;
pub mod metadata;
pub mod orchestrator;

#[cfg(test)]
pub mod test_support;
