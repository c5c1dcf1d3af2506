// Persisted documents. Field names go out over the wire in camelCase with a
// Mongo-style `_id`, which is what the single-page client reads.

pub mod annotation;
pub mod depmap;
pub mod post;
pub mod resume;
pub mod user;
pub mod validation;

pub use annotation::AnnotationRow;
pub use depmap::{Deps, DependencyMapRow};
pub use post::PostRow;
pub use resume::ResumeRow;
pub use user::UserRow;
pub use validation::{Vote, ValidationKind, ValidationRow};
