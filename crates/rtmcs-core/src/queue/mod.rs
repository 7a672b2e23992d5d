//! Queue module: write serialization and the background drain loop.

mod drain_loop;
mod mutation;

pub use drain_loop::{DEFAULT_DRAIN_INTERVAL, DrainLoop};
pub use mutation::{Applied, Mutation, MutationQueue, mutation};
