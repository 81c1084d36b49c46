//! Services layer - Business logic
//!
//! Each service owns the rules for one area of the API: input validation,
//! ownership, slug derivation and the mapping of store outcomes to typed
//! errors. Services receive the caller id explicitly; nothing here reads
//! request state.

pub mod article;
pub mod comment;
pub mod password;
pub mod slug;
pub mod tag;
pub mod token;
pub mod user;
pub mod validation;

pub use article::{ArticleService, ArticleServiceError, CreateArticleInput, UpdateArticleInput};
pub use comment::{CommentService, CommentServiceError};
pub use password::{hash_password, verify_password};
pub use slug::derive_slug;
pub use tag::{TagService, TagServiceError, POPULAR_TAG_LIMIT};
pub use token::TokenService;
pub use user::{
    AuthenticatedUser, LoginInput, RegisterInput, UpdateUserInput, UserService, UserServiceError,
};
pub use validation::FieldError;
