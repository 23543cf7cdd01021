/// State management module
///
/// This module handles all catalog state, including:
/// - Shared data structures (data.rs)
/// - Edit sessions and pending photo edits (edit.rs)
/// - The change feed observed by the display layer (feed.rs)
/// - The repository that ties photos and backends together (repository.rs)

pub mod data;
pub mod edit;
pub mod feed;
pub mod repository;
