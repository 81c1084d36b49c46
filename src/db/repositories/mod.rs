//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for one entity; `relation` covers the
//! favorite and follow edges.

pub mod article;
pub mod comment;
pub mod relation;
pub mod tag;
pub mod user;

pub use article::{ArticleRepository, SqlxArticleRepository};
pub use comment::{CommentRepository, SqlxCommentRepository};
pub use relation::{Relation, RelationRepository, SqlxRelationRepository};
pub use tag::{SqlxTagRepository, TagRepository};
pub use user::{SqlxUserRepository, UserRepository};
