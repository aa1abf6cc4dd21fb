pub mod allow_list;
pub mod error;
pub mod publish;
pub mod reconcile;
pub mod update;
pub mod window;

pub use allow_list::AllowList;
pub use error::CoreError;
pub use publish::{PostDraft, select_for_publishing, select_for_removal};
pub use reconcile::{MergeOutcome, Reconciler, merge, reconcile};
pub use update::{BILL_TYPES, Update, UpdateKey};
pub use window::DateWindow;
