pub mod commands;
pub mod queries;
pub mod routes;

pub use commands::{
    CancelImportCommand, CancelImportResponse, ResetImportCommand, StartImportCommand,
    StartImportError,
};
pub use queries::{ImportStatusQuery, ImportStatusResponse};

pub use routes::import_routes;
