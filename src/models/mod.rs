//! Data models
//!
//! Database entities (User, Article, Tag, Comment), viewer-relative views
//! returned by the API, and the patch/filter types services hand to
//! repositories.

mod article;
mod comment;
mod tag;
mod user;

pub use article::{Article, ArticleFilter, ArticlePatch, ArticleView, CreatedArticle};
pub use comment::{Comment, CommentAuthor, CommentWithAuthor};
pub use tag::{normalize_tag_names, Tag, TagWithCount};
pub use user::{CurrentUser, Profile, User, UserPatch};
