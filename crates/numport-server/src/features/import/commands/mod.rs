pub mod cancel;
pub mod reset;
pub mod start;

pub use cancel::{CancelImportCommand, CancelImportResponse};
pub use reset::ResetImportCommand;
pub use start::{StartImportCommand, StartImportError};
