//! Services layer - Business logic
//!
//! Services sit between the HTTP views and the repositories. They are
//! responsible for:
//! - Implementing business rules (publication, archives, tree invariants)
//! - Cleaning admin form submissions
//! - Preparing entries and categories for templates

pub mod archives;
pub mod auth;
pub mod category;
pub mod entry;
pub mod forms;
#[cfg(feature = "markdown")]
pub mod markdown;

pub use archives::{
    previous_next_published, ArchiveNavigator, ArchivePeriod, PeriodError, PreviousNext,
    TemplateParts,
};
pub use auth::{
    authenticate_admin, hash_password, sign_entry_access, verify_entry_access, verify_password,
    BasicCredentials,
};
pub use category::{
    generate_slug, CategoryForm, CategoryListItem, CategoryService, CategoryServiceError,
};
pub use entry::{
    ArchivePage, ArchiveSettings, EntryForm, EntryService, EntryServiceError, EntryView,
};
pub use forms::{FieldError, FormData, FormErrors};
#[cfg(feature = "markdown")]
pub use markdown::{MarkdownRenderer, RenderedMarkdown, TocEntry};
