//! Notebook document model surface.
//!
//! Defines the identity types, the resolved [`NotebookModel`], and the
//! collaborator interfaces (providers, controllers, working copies) the
//! resolver core composes. The resolution and lifetime machinery itself
//! lives in `folio-resolver`.

mod content;
mod key;
mod listeners;
mod model;
mod provider;

pub use content::ContentContainer;
pub use key::{CELL_SCHEME, DocumentKey, NotebookKind};
pub use listeners::Listeners;
pub use model::NotebookModel;
pub use provider::{
	ExternalController, FileWorkingCopy, ProviderDescriptor, ProviderInfo, ProviderRegistry,
	WorkingCopyManager,
};
