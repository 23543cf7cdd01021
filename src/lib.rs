//! Personal catalog of knitting and crochet projects.
//!
//! Photos are normalized by [`photo::ImageCodec`], stored by one of the
//! [`store::Backend`] variants, and the in-memory catalog is owned by
//! [`state::repository::ProjectRepository`].

pub mod config;
pub mod error;
pub mod photo;
pub mod state;
pub mod store;

pub use error::{CatalogError, CatalogResult};
pub use state::repository::{ProjectRepository, SaveFailure};
